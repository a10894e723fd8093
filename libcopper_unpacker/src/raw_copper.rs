use super::block_index::{BlockIndex, BlockOffsets, BlockSpan};
use super::buffer::BufferView;
use super::error::{DecodeError, IntegrityError};
use super::finesse::{ChannelSpan, FinesseExtractor};
use super::format::FormatVersion;
use super::header::{HeaderFields, TrailerFields};
use super::integrity::IntegrityChecker;

/// RawCopper is the entry point for decoding a buffer of `num_events * num_nodes` blocks.
///
/// Blocks are located either one at a time with [`RawCopper::block`], which walks the buffer
/// from the start on every call, or all at once with [`RawCopper::blocks`], which walks it
/// once. Every returned block has been bounds checked and its RawHeader version matches the
/// format the decoder was created for.
#[derive(Debug, Clone, Copy)]
pub struct RawCopper<'a> {
    index: BlockIndex<'a>,
}

impl<'a> RawCopper<'a> {
    pub fn new(
        words: &'a [u32],
        num_events: usize,
        num_nodes: usize,
        format: FormatVersion,
    ) -> Self {
        Self {
            index: BlockIndex::new(BufferView::new(words), num_events, num_nodes, format),
        }
    }

    pub fn num_blocks(&self) -> usize {
        self.index.num_blocks()
    }

    pub fn format(&self) -> FormatVersion {
        self.index.format()
    }

    pub fn nwords(&self) -> usize {
        self.index.view().nwords()
    }

    pub fn block(&self, n: usize) -> Result<CopperBlock<'a>, DecodeError> {
        let span = self.index.span_of(n)?;
        self.block_at(span)
    }

    /// Locate every block in a single pass
    pub fn scan(&self) -> Result<BlockOffsets, DecodeError> {
        self.index.scan()
    }

    pub fn blocks(&self) -> Result<Vec<CopperBlock<'a>>, DecodeError> {
        self.scan()?
            .iter()
            .map(|span| self.block_at(*span))
            .collect()
    }

    /// Build a block from a span found by [`RawCopper::scan`], checking its format version
    pub fn block_at(&self, span: BlockSpan) -> Result<CopperBlock<'a>, DecodeError> {
        let view = self.index.view();
        let format = self.format();
        let found = HeaderFields::new(view, format).format_version_code(span.offset)?;
        if found != format.version_code() {
            return Err(DecodeError::FormatMismatch {
                offset: span.offset,
                found,
                expected: format,
            });
        }
        Ok(CopperBlock {
            view,
            format,
            words: view.slice(span.offset, span.nwords)?,
            span,
        })
    }
}

/// One node's data for one event, borrowed from the buffer it was decoded from
#[derive(Debug, Clone, Copy)]
pub struct CopperBlock<'a> {
    view: BufferView<'a>,
    format: FormatVersion,
    words: &'a [u32],
    span: BlockSpan,
}

impl<'a> CopperBlock<'a> {
    /// Word offset of the block in the buffer
    pub fn offset(&self) -> usize {
        self.span.offset
    }

    pub fn nwords(&self) -> usize {
        self.span.nwords
    }

    pub fn words(&self) -> &'a [u32] {
        self.words
    }

    pub fn format(&self) -> FormatVersion {
        self.format
    }

    pub fn header(&self) -> HeaderFields<'a> {
        HeaderFields::new(self.view, self.format)
    }

    pub fn trailer(&self) -> TrailerFields<'a> {
        TrailerFields::new(self.view, self.format)
    }

    pub fn finesse(&self) -> FinesseExtractor<'a> {
        FinesseExtractor::new(self.view, self.format)
    }

    pub fn event_number(&self) -> Result<u32, DecodeError> {
        self.header().event_number(self.offset())
    }

    pub fn exp_no(&self) -> Result<u32, DecodeError> {
        self.header().exp_no(self.offset())
    }

    pub fn run_no(&self) -> Result<u32, DecodeError> {
        self.header().run_no(self.offset())
    }

    pub fn subrun_no(&self) -> Result<u32, DecodeError> {
        self.header().subrun_no(self.offset())
    }

    pub fn ctime(&self) -> Result<u32, DecodeError> {
        self.header().ctime(self.offset())
    }

    pub fn trigger_type(&self) -> Result<u32, DecodeError> {
        self.header().trigger_type(self.offset())
    }

    pub fn utime(&self) -> Result<u32, DecodeError> {
        self.header().utime(self.offset())
    }

    pub fn node_id(&self) -> Result<u32, DecodeError> {
        self.header().node_id(self.offset())
    }

    pub fn sub_channel_count(&self) -> Result<usize, DecodeError> {
        self.finesse().sub_channel_count(self.offset())
    }

    pub fn channels(&self) -> Result<Vec<ChannelSpan>, DecodeError> {
        self.finesse().channels(self.offset())
    }

    pub fn channel_nwords(&self, slot: usize) -> Result<usize, DecodeError> {
        self.finesse().channel_nwords(self.offset(), slot)
    }

    pub fn detector_data(&self, slot: usize) -> Result<&'a [u32], DecodeError> {
        self.finesse().detector_data(self.offset(), slot)
    }

    /// Run every integrity check on the block
    pub fn check_integrity(&self) -> Result<(), IntegrityError> {
        IntegrityChecker::new(self.view, self.format).check_all(self.offset())
    }
}
