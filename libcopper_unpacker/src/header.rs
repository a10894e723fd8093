use super::block_index::BlockIndex;
use super::buffer::BufferView;
use super::constants::*;
use super::error::DecodeError;
use super::format::FormatVersion;

/// HeaderFields reads named fields out of the RawHeader and the COPPER front header of a block.
///
/// Every method takes the word offset at which the block begins (see [`BlockIndex`]). Nothing
/// is validated here: magic words are returned as found, and it is up to the caller to decide
/// what to do with an unexpected value.
#[derive(Debug, Clone, Copy)]
pub struct HeaderFields<'a> {
    view: BufferView<'a>,
    format: FormatVersion,
}

impl<'a> HeaderFields<'a> {
    pub fn new(view: BufferView<'a>, format: FormatVersion) -> Self {
        Self { view, format }
    }

    fn raw_header_word(&self, block_offset: usize, pos: usize) -> Result<u32, DecodeError> {
        self.view.word_at(block_offset.saturating_add(pos))
    }

    fn copper_header_word(&self, block_offset: usize, pos: usize) -> Result<u32, DecodeError> {
        if !self.format.has_copper_regions() {
            return Err(DecodeError::InvalidArgument(format!(
                "the {} format has no COPPER header",
                self.format
            )));
        }
        self.view.word_at(
            block_offset
                .saturating_add(self.format.raw_header_nwords())
                .saturating_add(pos),
        )
    }

    /// Total block size as written in the RawHeader
    pub fn nwords(&self, block_offset: usize) -> Result<u32, DecodeError> {
        self.raw_header_word(block_offset, POS_NWORDS)
    }

    pub fn version_word(&self, block_offset: usize) -> Result<u32, DecodeError> {
        self.raw_header_word(block_offset, POS_VERSION_HDRNWORDS)
    }

    pub fn format_version_code(&self, block_offset: usize) -> Result<u32, DecodeError> {
        Ok((self.version_word(block_offset)? & FORMAT_VERSION_MASK) >> FORMAT_VERSION_SHIFT)
    }

    pub fn header_nwords(&self, block_offset: usize) -> Result<u32, DecodeError> {
        Ok(self.version_word(block_offset)? & HDR_NWORDS_MASK)
    }

    pub fn exp_run_subrun(&self, block_offset: usize) -> Result<u32, DecodeError> {
        self.raw_header_word(block_offset, POS_EXP_RUN_NO)
    }

    pub fn exp_no(&self, block_offset: usize) -> Result<u32, DecodeError> {
        Ok((self.exp_run_subrun(block_offset)? & EXP_MASK) >> EXP_SHIFT)
    }

    pub fn run_no(&self, block_offset: usize) -> Result<u32, DecodeError> {
        Ok((self.exp_run_subrun(block_offset)? & RUNNO_MASK) >> RUNNO_SHIFT)
    }

    pub fn subrun_no(&self, block_offset: usize) -> Result<u32, DecodeError> {
        Ok(self.exp_run_subrun(block_offset)? & SUBRUNNO_MASK)
    }

    /// The 32-bit event number of the block
    pub fn event_number(&self, block_offset: usize) -> Result<u32, DecodeError> {
        self.raw_header_word(block_offset, POS_EVE_NO)
    }

    pub fn ctime_trgtype(&self, block_offset: usize) -> Result<u32, DecodeError> {
        self.raw_header_word(block_offset, POS_TTCTIME_TRGTYPE)
    }

    pub fn ctime(&self, block_offset: usize) -> Result<u32, DecodeError> {
        Ok((self.ctime_trgtype(block_offset)? >> CTIME_SHIFT) & CTIME_MASK)
    }

    pub fn trigger_type(&self, block_offset: usize) -> Result<u32, DecodeError> {
        Ok(self.ctime_trgtype(block_offset)? & TRGTYPE_MASK)
    }

    pub fn utime(&self, block_offset: usize) -> Result<u32, DecodeError> {
        self.raw_header_word(block_offset, POS_TTUTIME)
    }

    pub fn node_id(&self, block_offset: usize) -> Result<u32, DecodeError> {
        self.raw_header_word(block_offset, POS_NODE_ID)
    }

    pub fn trunc_mask_datatype(&self, block_offset: usize) -> Result<u32, DecodeError> {
        self.raw_header_word(block_offset, POS_TRUNC_MASK_DATATYPE)
    }

    /// COPPER driver header magic word, 0x7FFF0008 in a healthy block
    pub fn magic_word_1(&self, block_offset: usize) -> Result<u32, DecodeError> {
        self.copper_header_word(block_offset, POS_MAGIC_COPPER_1)
    }

    /// COPPER FPGA header magic word, 0xFFFFFAFA in a healthy block
    pub fn magic_word_2(&self, block_offset: usize) -> Result<u32, DecodeError> {
        self.copper_header_word(block_offset, POS_MAGIC_COPPER_2)
    }

    /// Event counter kept by the COPPER board itself
    pub fn copper_counter(&self, block_offset: usize) -> Result<u32, DecodeError> {
        self.copper_header_word(block_offset, POS_EVE_NUM_COPPER)
    }

    pub fn subsystem_id(&self, block_offset: usize) -> Result<u32, DecodeError> {
        self.copper_header_word(block_offset, POS_SUBSYSTEM_ID)
    }

    pub fn crate_id(&self, block_offset: usize) -> Result<u32, DecodeError> {
        self.copper_header_word(block_offset, POS_CRATE_ID)
    }

    pub fn slot_id(&self, block_offset: usize) -> Result<u32, DecodeError> {
        self.copper_header_word(block_offset, POS_SLOT_ID)
    }

    pub fn data_length(&self, block_offset: usize) -> Result<u32, DecodeError> {
        self.copper_header_word(block_offset, POS_DATA_LENGTH)
    }

    /// Raw length field of a COPPER FINESSE slot (A=0 .. D=3)
    pub fn channel_length_field(
        &self,
        block_offset: usize,
        slot: usize,
    ) -> Result<u32, DecodeError> {
        match POS_CH_DATA_LENGTH.get(slot) {
            Some(pos) => self.copper_header_word(block_offset, *pos),
            None => Err(DecodeError::InvalidArgument(format!(
                "FINESSE slot {slot} does not exist; COPPER has slots 0..{MAX_COPPER_CH}"
            ))),
        }
    }

    /// Entry of the PCIe40 channel position table, relative to the block start
    pub fn channel_position(
        &self,
        block_offset: usize,
        channel: usize,
    ) -> Result<u32, DecodeError> {
        if self.format != FormatVersion::Pcie40 {
            return Err(DecodeError::InvalidArgument(format!(
                "the {} format has no channel position table",
                self.format
            )));
        }
        if channel >= MAX_PCIE40_CH {
            return Err(DecodeError::InvalidArgument(format!(
                "channel {channel} does not exist; PCIe40 has channels 0..{MAX_PCIE40_CH}"
            )));
        }
        self.raw_header_word(block_offset, POS_CH_POS_TABLE + channel)
    }
}

/// TrailerFields reads the COPPER trailer and the RawTrailer at the end of a block.
///
/// The block end is found from the block's own size, so every read goes through the same
/// length checks as [`BlockIndex`].
#[derive(Debug, Clone, Copy)]
pub struct TrailerFields<'a> {
    index: BlockIndex<'a>,
}

impl<'a> TrailerFields<'a> {
    pub fn new(view: BufferView<'a>, format: FormatVersion) -> Self {
        Self {
            index: BlockIndex::new(view, 1, 1, format),
        }
    }

    fn format(&self) -> FormatVersion {
        self.index.format()
    }

    /// Word offset of the RawTrailer of the block at block_offset
    pub fn raw_trailer_offset(&self, block_offset: usize) -> Result<usize, DecodeError> {
        let block_nwords = self.index.checked_block_nwords(block_offset)?;
        Ok(block_offset + block_nwords - self.format().raw_trailer_nwords())
    }

    fn copper_trailer_word(&self, block_offset: usize, pos: usize) -> Result<u32, DecodeError> {
        if !self.format().has_copper_regions() {
            return Err(DecodeError::InvalidArgument(format!(
                "the {} format has no COPPER trailer",
                self.format()
            )));
        }
        let copper_trailer = self.raw_trailer_offset(block_offset)? - SIZE_COPPER_TRAILER;
        self.index.view().word_at(copper_trailer + pos)
    }

    fn raw_trailer_word(&self, block_offset: usize, pos: usize) -> Result<u32, DecodeError> {
        let raw_trailer = self.raw_trailer_offset(block_offset)?;
        self.index.view().word_at(raw_trailer + pos)
    }

    /// COPPER driver trailer magic word, 0x7FFF0009 in a healthy block
    pub fn trailer_magic(&self, block_offset: usize) -> Result<u32, DecodeError> {
        self.copper_trailer_word(block_offset, POS_MAGIC_COPPER_4)
    }

    /// COPPER FPGA trailer magic word, 0xFFFFF5F5 in a healthy block
    pub fn fpga_trailer_magic(&self, block_offset: usize) -> Result<u32, DecodeError> {
        self.copper_trailer_word(block_offset, POS_MAGIC_COPPER_3)
    }

    /// Checksum written by the COPPER driver
    pub fn driver_checksum(&self, block_offset: usize) -> Result<u32, DecodeError> {
        self.copper_trailer_word(block_offset, POS_CHKSUM_COPPER)
    }

    /// XOR checksum of the block, excluding the RawTrailer
    pub fn raw_checksum(&self, block_offset: usize) -> Result<u32, DecodeError> {
        self.raw_trailer_word(block_offset, POS_RAW_CHKSUM)
    }

    /// Termination word, 0x7FFF0006 in a healthy block
    pub fn term_word(&self, block_offset: usize) -> Result<u32, DecodeError> {
        self.raw_trailer_word(block_offset, POS_TERM_WORD)
    }
}
