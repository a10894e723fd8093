use super::buffer::BufferView;
use super::constants::*;
use super::crc16::crc16_words;
use super::error::{DecodeError, IntegrityError};
use super::finesse::{ChannelSpan, FinesseExtractor};
use super::format::FormatVersion;
use super::header::{HeaderFields, TrailerFields};

type FieldReader<'a> = fn(&FinesseExtractor<'a>, &ChannelSpan) -> Result<u32, DecodeError>;

fn xor_words(words: &[u32]) -> u32 {
    words.iter().fold(0, |acc, word| acc ^ word)
}

/// IntegrityChecker runs the optional consistency checks on a block: magic words, checksums,
/// the B2L CRC16 of each channel, and agreement of the trigger information over channels.
///
/// None of these checks are needed to decode a block; the decoder only relies on the length
/// fields. They exist to catch data that decodes fine but is wrong.
#[derive(Debug, Clone, Copy)]
pub struct IntegrityChecker<'a> {
    view: BufferView<'a>,
    format: FormatVersion,
    header: HeaderFields<'a>,
    trailer: TrailerFields<'a>,
    finesse: FinesseExtractor<'a>,
}

impl<'a> IntegrityChecker<'a> {
    pub fn new(view: BufferView<'a>, format: FormatVersion) -> Self {
        Self {
            view,
            format,
            header: HeaderFields::new(view, format),
            trailer: TrailerFields::new(view, format),
            finesse: FinesseExtractor::new(view, format),
        }
    }

    /// Check the four COPPER magic words. PCIe40 blocks have none and always pass.
    pub fn check_copper_magic(&self, block_offset: usize) -> Result<(), IntegrityError> {
        if !self.format.has_copper_regions() {
            return Ok(());
        }
        let header_start = block_offset + self.format.raw_header_nwords();
        let trailer_start = self.trailer.raw_trailer_offset(block_offset)? - SIZE_COPPER_TRAILER;
        let expected = [
            (header_start + POS_MAGIC_COPPER_1, COPPER_MAGIC_DRIVER_HEADER),
            (header_start + POS_MAGIC_COPPER_2, COPPER_MAGIC_FPGA_HEADER),
            (trailer_start + POS_MAGIC_COPPER_3, COPPER_MAGIC_FPGA_TRAILER),
            (trailer_start + POS_MAGIC_COPPER_4, COPPER_MAGIC_DRIVER_TRAILER),
        ];
        for (position, magic) in expected {
            let found = self.view.word_at(position)?;
            if found != magic {
                return Err(IntegrityError::BadCopperMagic {
                    position: position - block_offset,
                    found,
                    expected: magic,
                });
            }
        }
        Ok(())
    }

    pub fn check_term_word(&self, block_offset: usize) -> Result<(), IntegrityError> {
        let term = self.trailer.term_word(block_offset)?;
        if term != MAGIC_WORD_TERM_TRAILER {
            return Err(IntegrityError::BadTermWord(term));
        }
        Ok(())
    }

    /// XOR of every block word before the RawTrailer must equal the RawTrailer checksum
    pub fn check_raw_checksum(&self, block_offset: usize) -> Result<(), IntegrityError> {
        let raw_trailer = self.trailer.raw_trailer_offset(block_offset)?;
        let calculated = xor_words(self.view.slice(block_offset, raw_trailer - block_offset)?);
        let stored = self.trailer.raw_checksum(block_offset)?;
        if stored != calculated {
            return Err(IntegrityError::RawChecksum { stored, calculated });
        }
        Ok(())
    }

    /// XOR of the words from the COPPER header through the FPGA trailer must equal the
    /// checksum in the driver trailer. PCIe40 blocks always pass.
    pub fn check_driver_checksum(&self, block_offset: usize) -> Result<(), IntegrityError> {
        if !self.format.has_copper_regions() {
            return Ok(());
        }
        let begin = block_offset + self.format.raw_header_nwords();
        let end = self.trailer.raw_trailer_offset(block_offset)? - SIZE_COPPER_DRIVER_TRAILER;
        let calculated = xor_words(self.view.slice(begin, end - begin)?);
        let stored = self.trailer.driver_checksum(block_offset)?;
        if stored != calculated {
            return Err(IntegrityError::DriverChecksum { stored, calculated });
        }
        Ok(())
    }

    fn hslb_magic(&self, span: &ChannelSpan) -> Result<(), IntegrityError> {
        let header = self.finesse.hslb_header_word(span)?;
        let trailer = self.finesse.hslb_trailer_word(span)?;
        if header & B2LHSLB_MAGIC_MASK != B2LHSLB_HEADER_MAGIC
            || trailer & B2LHSLB_MAGIC_MASK != B2LHSLB_TRAILER_MAGIC
        {
            return Err(IntegrityError::BadHslbMagic {
                channel: span.slot(),
                header,
                trailer,
            });
        }
        Ok(())
    }

    pub fn check_hslb_magic(&self, block_offset: usize, slot: usize) -> Result<(), IntegrityError> {
        let span = self.finesse.locate(block_offset, slot)?;
        self.hslb_magic(&span)
    }

    fn crc16(&self, span: &ChannelSpan) -> Result<(), IntegrityError> {
        let covered = self.view.slice(
            span.offset() + SIZE_B2LHSLB_HEADER,
            SIZE_B2LFEE_HEADER + span.detector_nwords(),
        )?;
        let calculated = crc16_words(covered);
        let stored = (self.finesse.b2l_crc16_word(span)? & 0xFFFF) as u16;
        if stored != calculated {
            return Err(IntegrityError::Crc16 {
                channel: span.slot(),
                stored,
                calculated,
            });
        }
        Ok(())
    }

    /// Compare the CRC16 over the B2LFEE header and detector data with the one in the B2LFEE
    /// trailer
    pub fn check_crc16(&self, block_offset: usize, slot: usize) -> Result<(), IntegrityError> {
        let span = self.finesse.locate(block_offset, slot)?;
        self.crc16(&span)
    }

    fn present_channels(&self, block_offset: usize) -> Result<Vec<ChannelSpan>, IntegrityError> {
        let spans = self.finesse.channels(block_offset)?;
        if spans.is_empty() {
            return Err(IntegrityError::NoChannels);
        }
        Ok(spans)
    }

    /// Get the trigger event tag shared by all channels of the block
    pub fn b2l_event_number(&self, block_offset: usize) -> Result<u32, IntegrityError> {
        let spans = self.present_channels(block_offset)?;
        let first = &spans[0];
        let tag = self.finesse.b2l_tt_tag(first)?;
        for span in spans.iter().skip(1) {
            let found = self.finesse.b2l_tt_tag(span)?;
            if found != tag {
                return Err(IntegrityError::EventNumberMismatch {
                    first_channel: first.slot(),
                    first: tag,
                    channel: span.slot(),
                    found,
                });
            }
        }
        Ok(tag)
    }

    /// Check that the B2LFEE headers of all channels agree with each other, and that the
    /// RawHeader event number is the one the channels were tagged with
    pub fn check_header_consistency(&self, block_offset: usize) -> Result<(), IntegrityError> {
        let spans = self.present_channels(block_offset)?;
        let first = &spans[0];
        let fields: [(&'static str, FieldReader<'a>); 3] = [
            ("ctime/trigger type", FinesseExtractor::b2l_ctime_trgtype),
            ("utime", FinesseExtractor::b2l_utime),
            ("exp/run", FinesseExtractor::b2l_exp_run),
        ];
        for (field, read) in fields {
            let expected = read(&self.finesse, first)?;
            for span in spans.iter().skip(1) {
                let found = read(&self.finesse, span)?;
                if found != expected {
                    return Err(IntegrityError::HeaderMismatch {
                        field,
                        first_channel: first.slot(),
                        first: expected,
                        channel: span.slot(),
                        found,
                    });
                }
            }
        }

        let b2l = self.b2l_event_number(block_offset)?;
        let raw_header = self.header.event_number(block_offset)?;
        if raw_header != b2l {
            return Err(IntegrityError::RawHeaderEventMismatch { raw_header, b2l });
        }
        Ok(())
    }

    /// Run every check on the block, stopping at the first failure
    pub fn check_all(&self, block_offset: usize) -> Result<(), IntegrityError> {
        self.check_term_word(block_offset)?;
        self.check_copper_magic(block_offset)?;
        self.check_raw_checksum(block_offset)?;
        self.check_driver_checksum(block_offset)?;
        for span in self.present_channels(block_offset)? {
            self.hslb_magic(&span)?;
            self.crc16(&span)?;
        }
        self.check_header_consistency(block_offset)
    }
}
