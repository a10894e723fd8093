use super::buffer::BufferView;
use super::constants::*;
use super::error::{Corruption, DecodeError, Extent};
use super::format::FormatVersion;

/// Location of one event block inside a raw buffer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockSpan {
    pub offset: usize,
    pub nwords: usize,
}

impl BlockSpan {
    pub fn end(&self) -> usize {
        self.offset + self.nwords
    }
}

/// BlockIndex locates event blocks in a raw buffer.
///
/// A raw buffer holds `num_events * num_nodes` blocks back to back. Block sizes are written
/// inside each block, so the start of block n is only known after reading the sizes of all
/// blocks before it. [`BlockIndex::offset_of`] re-walks the buffer on every call; callers
/// which visit more than a handful of blocks should use [`BlockIndex::scan`] once and keep
/// the resulting [`BlockOffsets`].
#[derive(Debug, Clone, Copy)]
pub struct BlockIndex<'a> {
    view: BufferView<'a>,
    num_blocks: usize,
    format: FormatVersion,
}

impl<'a> BlockIndex<'a> {
    pub fn new(
        view: BufferView<'a>,
        num_events: usize,
        num_nodes: usize,
        format: FormatVersion,
    ) -> Self {
        Self {
            view,
            num_blocks: num_events.saturating_mul(num_nodes),
            format,
        }
    }

    pub fn num_blocks(&self) -> usize {
        self.num_blocks
    }

    pub fn format(&self) -> FormatVersion {
        self.format
    }

    pub fn view(&self) -> BufferView<'a> {
        self.view
    }

    /// Get the word offset at which block n begins
    ///
    /// Fails with OutOfRange if n is not a valid block number (or the buffer is empty) and
    /// with CorruptBuffer if a length word sends the walk outside of the buffer.
    pub fn offset_of(&self, n: usize) -> Result<usize, DecodeError> {
        self.check_block_number(n)?;
        let nwords = self.view.nwords();
        let mut position: usize = 0;
        for block in 1..=n {
            position = position.saturating_add(self.block_nwords_at(position)?);
            if position >= nwords {
                return Err(Corruption::BlockStartBeyondBuffer {
                    block,
                    position,
                    nwords,
                }
                .into());
            }
        }
        Ok(position)
    }

    /// Get the size of the block starting at offset, as declared by the block itself
    ///
    /// COPPER blocks derive their size from the COPPER data length word, PCIe40 blocks carry
    /// it in the first RawHeader word. This does not check that the block fits in the buffer;
    /// see [`BlockIndex::checked_block_nwords`] for that.
    pub fn block_nwords_at(&self, offset: usize) -> Result<usize, DecodeError> {
        let nwords = self.view.nwords();
        let position = match self.format {
            FormatVersion::Copper => offset
                .saturating_add(self.format.raw_header_nwords())
                .saturating_add(POS_DATA_LENGTH),
            FormatVersion::Pcie40 => offset.saturating_add(POS_NWORDS),
        };
        let length = self
            .view
            .word_at(position)
            .map_err(|_| Corruption::TruncatedLength { position, nwords })?
            as usize;

        let block_nwords = match self.format {
            // The COPPER data length covers the FPGA part of the COPPER header and trailer,
            // but neither the driver parts nor the RawHeader/RawTrailer.
            FormatVersion::Copper => length.saturating_add(
                self.format.raw_header_nwords()
                    + SIZE_COPPER_DRIVER_HEADER
                    + SIZE_COPPER_DRIVER_TRAILER
                    + self.format.raw_trailer_nwords(),
            ),
            FormatVersion::Pcie40 => length,
        };

        let minimum = self.format.fixed_overhead_nwords();
        if block_nwords < minimum {
            return Err(Corruption::BlockTooShort {
                start: offset,
                block_nwords,
                minimum,
            }
            .into());
        }
        Ok(block_nwords)
    }

    /// Get the size of the block starting at offset, making sure the whole block lies inside
    /// the buffer
    pub fn checked_block_nwords(&self, offset: usize) -> Result<usize, DecodeError> {
        let block_nwords = self.block_nwords_at(offset)?;
        let nwords = self.view.nwords();
        if offset.saturating_add(block_nwords) > nwords {
            return Err(Corruption::BlockOverrun {
                start: offset,
                block_nwords,
                nwords,
            }
            .into());
        }
        Ok(block_nwords)
    }

    /// Locate block n and make sure it fits in the buffer
    pub fn span_of(&self, n: usize) -> Result<BlockSpan, DecodeError> {
        let offset = self.offset_of(n)?;
        let nwords = self.checked_block_nwords(offset)?;
        Ok(BlockSpan { offset, nwords })
    }

    /// Walk the buffer once and record where every block starts
    ///
    /// Unlike [`BlockIndex::offset_of`] this also requires the final block to end inside the
    /// buffer, so a buffer truncated in the middle of a block is reported as corrupted.
    pub fn scan(&self) -> Result<BlockOffsets, DecodeError> {
        let nwords = self.view.nwords();
        if nwords == 0 {
            return Err(DecodeError::OutOfRange {
                extent: Extent::Word,
                index: 0,
                limit: 0,
            });
        }

        // The block count is read from untrusted headers; no more blocks fit than this
        let capacity = self
            .num_blocks
            .min(nwords / self.format.fixed_overhead_nwords());
        let mut spans = Vec::with_capacity(capacity);
        let mut position: usize = 0;
        for block in 0..self.num_blocks {
            if position >= nwords {
                return Err(Corruption::BlockStartBeyondBuffer {
                    block,
                    position,
                    nwords,
                }
                .into());
            }
            let block_nwords = self.checked_block_nwords(position)?;
            spans.push(BlockSpan {
                offset: position,
                nwords: block_nwords,
            });
            position += block_nwords;
        }

        Ok(BlockOffsets {
            spans,
            covered_nwords: position,
        })
    }

    fn check_block_number(&self, n: usize) -> Result<(), DecodeError> {
        if self.view.is_empty() {
            return Err(DecodeError::OutOfRange {
                extent: Extent::Word,
                index: 0,
                limit: 0,
            });
        }
        if n >= self.num_blocks {
            return Err(DecodeError::OutOfRange {
                extent: Extent::Block,
                index: n,
                limit: self.num_blocks,
            });
        }
        Ok(())
    }
}

/// Offsets and sizes of every block in a buffer, extracted in a single pass
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BlockOffsets {
    spans: Vec<BlockSpan>,
    covered_nwords: usize,
}

impl BlockOffsets {
    pub fn len(&self) -> usize {
        self.spans.len()
    }

    pub fn is_empty(&self) -> bool {
        self.spans.is_empty()
    }

    pub fn get(&self, n: usize) -> Result<BlockSpan, DecodeError> {
        self.spans
            .get(n)
            .copied()
            .ok_or(DecodeError::OutOfRange {
                extent: Extent::Block,
                index: n,
                limit: self.spans.len(),
            })
    }

    pub fn offset(&self, n: usize) -> Result<usize, DecodeError> {
        Ok(self.get(n)?.offset)
    }

    pub fn nwords(&self, n: usize) -> Result<usize, DecodeError> {
        Ok(self.get(n)?.nwords)
    }

    /// Number of buffer words taken up by the blocks. Anything past this is unclaimed.
    pub fn covered_nwords(&self) -> usize {
        self.covered_nwords
    }

    pub fn iter(&self) -> std::slice::Iter<'_, BlockSpan> {
        self.spans.iter()
    }
}

impl<'b> IntoIterator for &'b BlockOffsets {
    type Item = &'b BlockSpan;
    type IntoIter = std::slice::Iter<'b, BlockSpan>;
    fn into_iter(self) -> Self::IntoIter {
        self.spans.iter()
    }
}
