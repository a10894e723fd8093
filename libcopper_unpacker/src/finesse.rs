use super::block_index::BlockIndex;
use super::buffer::BufferView;
use super::constants::*;
use super::error::{Corruption, DecodeError};
use super::format::FormatVersion;
use super::header::HeaderFields;

/// Location of one FINESSE (or PCIe40 link) channel inside the buffer.
///
/// `offset` points at the HSLB header of the channel, `nwords` covers the HSLB header, the
/// B2LFEE header, the detector data and both trailers. Spans are only handed out by
/// [`FinesseExtractor::locate`] and [`FinesseExtractor::channels`], after checking that the
/// channel holds at least its B2L headers and trailers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChannelSpan {
    slot: usize,
    offset: usize,
    nwords: usize,
}

impl ChannelSpan {
    pub fn slot(&self) -> usize {
        self.slot
    }

    pub fn offset(&self) -> usize {
        self.offset
    }

    pub fn nwords(&self) -> usize {
        self.nwords
    }

    pub fn end(&self) -> usize {
        self.offset + self.nwords
    }

    /// Offset of the first detector data word
    pub fn detector_offset(&self) -> usize {
        self.offset + SIZE_B2LHSLB_HEADER + SIZE_B2LFEE_HEADER
    }

    pub fn detector_nwords(&self) -> usize {
        self.nwords - SIZE_B2L_HEADERS_TRAILERS
    }

    fn fee_header(&self, pos: usize) -> usize {
        self.offset + SIZE_B2LHSLB_HEADER + pos
    }

    fn fee_trailer(&self, pos: usize) -> usize {
        self.end() - SIZE_B2LHSLB_TRAILER - SIZE_B2LFEE_TRAILER + pos
    }
}

/// FinesseExtractor locates and sizes the FINESSE channels of a block.
///
/// COPPER blocks carry up to 4 channels (slots A to D) whose lengths sit in the COPPER
/// header; a channel starts where the previous slot ended, so offsets are cumulative.
/// PCIe40 blocks carry up to 48 channels located through the RawHeader position table.
/// A channel with zero length is absent.
#[derive(Debug, Clone, Copy)]
pub struct FinesseExtractor<'a> {
    index: BlockIndex<'a>,
    header: HeaderFields<'a>,
}

impl<'a> FinesseExtractor<'a> {
    pub fn new(view: BufferView<'a>, format: FormatVersion) -> Self {
        Self {
            index: BlockIndex::new(view, 1, 1, format),
            header: HeaderFields::new(view, format),
        }
    }

    fn format(&self) -> FormatVersion {
        self.index.format()
    }

    fn view(&self) -> BufferView<'a> {
        self.index.view()
    }

    fn check_slot(&self, slot: usize) -> Result<(), DecodeError> {
        let max = self.format().max_channels();
        if slot >= max {
            return Err(DecodeError::InvalidArgument(format!(
                "channel {slot} does not exist; the {} format has channels 0..{max}",
                self.format()
            )));
        }
        Ok(())
    }

    /// Length of a channel in words, 0 when the channel is absent
    pub fn channel_nwords(&self, block_offset: usize, slot: usize) -> Result<usize, DecodeError> {
        self.check_slot(slot)?;
        match self.format() {
            FormatVersion::Copper => {
                Ok(self.header.channel_length_field(block_offset, slot)? as usize)
            }
            FormatVersion::Pcie40 => {
                let begin = self.header.channel_position(block_offset, slot)? as usize;
                let end = if slot + 1 < MAX_PCIE40_CH {
                    self.header.channel_position(block_offset, slot + 1)? as usize
                } else {
                    self.index.checked_block_nwords(block_offset)? - RAWTRAILER_NWORDS
                };
                if end < begin {
                    return Err(Corruption::ChannelOverrun {
                        start: block_offset,
                        channel: slot,
                        begin,
                        end,
                        limit: begin,
                    }
                    .into());
                }
                Ok(end - begin)
            }
        }
    }

    /// Number of channels present in the block
    pub fn sub_channel_count(&self, block_offset: usize) -> Result<usize, DecodeError> {
        let mut count = 0;
        for slot in 0..self.format().max_channels() {
            if self.channel_nwords(block_offset, slot)? > 0 {
                count += 1;
            }
        }
        Ok(count)
    }

    /// Locate a present channel, checking that it lies inside the payload area of its block
    pub fn locate(&self, block_offset: usize, slot: usize) -> Result<ChannelSpan, DecodeError> {
        let nwords = self.channel_nwords(block_offset, slot)?;
        if nwords == 0 {
            return Err(DecodeError::InvalidArgument(format!(
                "channel {slot} is not present in the block at word {block_offset}"
            )));
        }

        let relative = match self.format() {
            FormatVersion::Copper => {
                let mut position = self.format().raw_header_nwords() + SIZE_COPPER_HEADER;
                for previous in 0..slot {
                    position =
                        position.saturating_add(self.channel_nwords(block_offset, previous)?);
                }
                position
            }
            FormatVersion::Pcie40 => self.header.channel_position(block_offset, slot)? as usize,
        };

        let span = ChannelSpan {
            slot,
            offset: block_offset.saturating_add(relative),
            nwords,
        };
        self.check_span(block_offset, span)?;
        Ok(span)
    }

    /// Locate all present channels of a block in one pass
    pub fn channels(&self, block_offset: usize) -> Result<Vec<ChannelSpan>, DecodeError> {
        let mut spans = Vec::new();
        let mut position = block_offset.saturating_add(
            self.format().raw_header_nwords() + self.format().copper_header_nwords(),
        );
        for slot in 0..self.format().max_channels() {
            let nwords = self.channel_nwords(block_offset, slot)?;
            if nwords == 0 {
                continue;
            }
            if self.format() == FormatVersion::Pcie40 {
                position = block_offset
                    .saturating_add(self.header.channel_position(block_offset, slot)? as usize);
            }
            let span = ChannelSpan {
                slot,
                offset: position,
                nwords,
            };
            self.check_span(block_offset, span)?;
            spans.push(span);
            position = span.end();
        }
        Ok(spans)
    }

    fn check_span(&self, block_offset: usize, span: ChannelSpan) -> Result<(), DecodeError> {
        let block_nwords = self.index.checked_block_nwords(block_offset)?;
        let payload_begin = block_offset
            + self.format().raw_header_nwords()
            + self.format().copper_header_nwords();
        let payload_end = block_offset + block_nwords
            - self.format().copper_trailer_nwords()
            - self.format().raw_trailer_nwords();
        let end = span.offset.saturating_add(span.nwords);
        if span.offset < payload_begin || end > payload_end {
            return Err(Corruption::ChannelOverrun {
                start: block_offset,
                channel: span.slot,
                begin: span.offset,
                end,
                limit: payload_end,
            }
            .into());
        }
        if span.nwords < SIZE_B2L_HEADERS_TRAILERS {
            return Err(Corruption::ChannelTooShort {
                start: block_offset,
                channel: span.slot,
                nwords: span.nwords,
                minimum: SIZE_B2L_HEADERS_TRAILERS,
            }
            .into());
        }
        Ok(())
    }

    /// Word offset of the HSLB header of a channel
    pub fn sub_channel_offset(
        &self,
        block_offset: usize,
        slot: usize,
    ) -> Result<usize, DecodeError> {
        Ok(self.locate(block_offset, slot)?.offset)
    }

    /// Word offset of the first detector data word of a channel
    pub fn sub_channel_detector_data(
        &self,
        block_offset: usize,
        slot: usize,
    ) -> Result<usize, DecodeError> {
        Ok(self.locate(block_offset, slot)?.detector_offset())
    }

    pub fn detector_nwords(&self, block_offset: usize, slot: usize) -> Result<usize, DecodeError> {
        Ok(self.locate(block_offset, slot)?.detector_nwords())
    }

    /// The complete channel, B2L headers and trailers included
    pub fn channel(&self, block_offset: usize, slot: usize) -> Result<&'a [u32], DecodeError> {
        let span = self.locate(block_offset, slot)?;
        self.view().slice(span.offset, span.nwords)
    }

    /// Only the detector data words of a channel
    pub fn detector_data(
        &self,
        block_offset: usize,
        slot: usize,
    ) -> Result<&'a [u32], DecodeError> {
        let span = self.locate(block_offset, slot)?;
        self.view()
            .slice(span.detector_offset(), span.detector_nwords())
    }

    pub fn hslb_header_word(&self, span: &ChannelSpan) -> Result<u32, DecodeError> {
        self.view().word_at(span.offset + POS_MAGIC_B2LHSLB)
    }

    pub fn hslb_trailer_word(&self, span: &ChannelSpan) -> Result<u32, DecodeError> {
        self.view()
            .word_at(span.end() - SIZE_B2LHSLB_TRAILER + POS_CHKSUM_B2LHSLB)
    }

    pub fn b2l_ctime_trgtype(&self, span: &ChannelSpan) -> Result<u32, DecodeError> {
        self.view().word_at(span.fee_header(POS_TT_CTIME_TYPE))
    }

    /// 32-bit event number attached by the trigger timing receiver
    pub fn b2l_tt_tag(&self, span: &ChannelSpan) -> Result<u32, DecodeError> {
        self.view().word_at(span.fee_header(POS_TT_TAG))
    }

    pub fn b2l_utime(&self, span: &ChannelSpan) -> Result<u32, DecodeError> {
        self.view().word_at(span.fee_header(POS_TT_UTIME))
    }

    pub fn b2l_exp_run(&self, span: &ChannelSpan) -> Result<u32, DecodeError> {
        self.view().word_at(span.fee_header(POS_EXP_RUN))
    }

    pub fn b2l_ctime(&self, span: &ChannelSpan) -> Result<u32, DecodeError> {
        self.view().word_at(span.fee_header(POS_B2L_CTIME))
    }

    pub fn b2l_trailer_ctime(&self, span: &ChannelSpan) -> Result<u32, DecodeError> {
        self.view().word_at(span.fee_trailer(POS_TT_CTIME_B2LFEE))
    }

    /// Trailer word holding the low 16 bits of the event number and the B2L CRC16
    pub fn b2l_crc16_word(&self, span: &ChannelSpan) -> Result<u32, DecodeError> {
        self.view().word_at(span.fee_trailer(POS_CHKSUM_B2LFEE))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::packer::{pack_detector_buffers, PackerInfo};

    #[test]
    fn test_single_channel() {
        let payload: Vec<u32> = (100..110).collect();
        let buffer =
            pack_detector_buffers(FormatVersion::Copper, &PackerInfo::default(), &[&payload])
                .unwrap();
        let finesse = FinesseExtractor::new(BufferView::new(&buffer), FormatVersion::Copper);

        assert_eq!(finesse.sub_channel_count(0), Ok(1));
        assert_eq!(
            finesse.sub_channel_offset(0, 0),
            Ok(COPPER_RAWHEADER_NWORDS + SIZE_COPPER_HEADER)
        );
        assert!(matches!(
            finesse.sub_channel_offset(0, 1),
            Err(DecodeError::InvalidArgument(_))
        ));
        assert!(matches!(
            finesse.sub_channel_offset(0, 4),
            Err(DecodeError::InvalidArgument(_))
        ));
        assert_eq!(
            finesse.sub_channel_detector_data(0, 0),
            Ok(COPPER_RAWHEADER_NWORDS + SIZE_COPPER_HEADER + 6)
        );
        assert_eq!(finesse.detector_data(0, 0).unwrap(), payload.as_slice());
    }

    #[test]
    fn test_offsets_are_cumulative() {
        let a: Vec<u32> = vec![0xA; 10];
        let c: Vec<u32> = vec![0xC; 4];
        let d: Vec<u32> = vec![0xD; 7];
        let buffer = pack_detector_buffers(
            FormatVersion::Copper,
            &PackerInfo::default(),
            &[&a, &[], &c, &d],
        )
        .unwrap();
        let finesse = FinesseExtractor::new(BufferView::new(&buffer), FormatVersion::Copper);
        assert_eq!(finesse.sub_channel_count(0), Ok(3));

        let first = finesse.sub_channel_offset(0, 0).unwrap();
        let third = finesse.sub_channel_offset(0, 2).unwrap();
        let fourth = finesse.sub_channel_offset(0, 3).unwrap();
        assert_eq!(third, first + a.len() + SIZE_B2L_HEADERS_TRAILERS);
        assert_eq!(fourth, third + c.len() + SIZE_B2L_HEADERS_TRAILERS);
        assert_eq!(finesse.detector_data(0, 2).unwrap(), c.as_slice());
        assert_eq!(finesse.detector_data(0, 3).unwrap(), d.as_slice());
        assert_eq!(finesse.detector_nwords(0, 3), Ok(d.len()));

        let spans = finesse.channels(0).unwrap();
        assert_eq!(
            spans.iter().map(|s| s.slot()).collect::<Vec<_>>(),
            vec![0, 2, 3]
        );
        assert_eq!(spans[1].offset(), third);
    }

    #[test]
    fn test_b2l_fields() {
        let info = PackerInfo {
            event_number: 0x0001_2345,
            tt_ctime: 77,
            tt_utime: 1_650_000_000,
            b2l_ctime: 99,
            ..Default::default()
        };
        let buffer =
            pack_detector_buffers(FormatVersion::Copper, &info, &[&[1, 2], &[3]]).unwrap();
        let finesse = FinesseExtractor::new(BufferView::new(&buffer), FormatVersion::Copper);
        for span in finesse.channels(0).unwrap() {
            assert_eq!(finesse.b2l_tt_tag(&span), Ok(0x0001_2345));
            assert_eq!(finesse.b2l_utime(&span), Ok(1_650_000_000));
            assert_eq!(finesse.b2l_ctime_trgtype(&span), Ok(77 << 4));
            assert_eq!(finesse.b2l_trailer_ctime(&span), Ok(77 << 4));
            assert_eq!(finesse.b2l_ctime(&span), Ok(99 << 4));
            assert_eq!(
                finesse.hslb_header_word(&span).unwrap() & B2LHSLB_MAGIC_MASK,
                B2LHSLB_HEADER_MAGIC
            );
            assert_eq!(
                finesse.hslb_trailer_word(&span).unwrap() & B2LHSLB_MAGIC_MASK,
                B2LHSLB_TRAILER_MAGIC
            );
            assert_eq!(finesse.b2l_crc16_word(&span).unwrap() >> 16, 0x2345);
        }
    }

    #[test]
    fn test_channel_overrun_is_corrupt() {
        let mut buffer =
            pack_detector_buffers(FormatVersion::Copper, &PackerInfo::default(), &[&[1; 10]])
                .unwrap();
        buffer[COPPER_RAWHEADER_NWORDS + POS_CH_A_DATA_LENGTH] = 500;
        let finesse = FinesseExtractor::new(BufferView::new(&buffer), FormatVersion::Copper);
        assert!(matches!(
            finesse.sub_channel_offset(0, 0),
            Err(DecodeError::CorruptBuffer(
                Corruption::ChannelOverrun { .. }
            ))
        ));

        buffer[COPPER_RAWHEADER_NWORDS + POS_CH_A_DATA_LENGTH] = 3;
        let finesse = FinesseExtractor::new(BufferView::new(&buffer), FormatVersion::Copper);
        assert!(matches!(
            finesse.locate(0, 0),
            Err(DecodeError::CorruptBuffer(
                Corruption::ChannelTooShort { .. }
            ))
        ));
    }

    #[test]
    fn test_short_channel_gives_no_span() {
        let mut buffer = pack_detector_buffers(
            FormatVersion::Copper,
            &PackerInfo::default(),
            &[&[1; 10], &[2; 4]],
        )
        .unwrap();
        // Give slot A's words to slot B, leaving slot A shorter than its B2L regions
        buffer[COPPER_RAWHEADER_NWORDS + POS_CH_A_DATA_LENGTH] = 5;
        buffer[COPPER_RAWHEADER_NWORDS + POS_CH_B_DATA_LENGTH] = 27;
        let finesse = FinesseExtractor::new(BufferView::new(&buffer), FormatVersion::Copper);
        assert!(matches!(
            finesse.channels(0),
            Err(DecodeError::CorruptBuffer(
                Corruption::ChannelTooShort { channel: 0, .. }
            ))
        ));
        assert!(matches!(
            finesse.detector_nwords(0, 0),
            Err(DecodeError::CorruptBuffer(
                Corruption::ChannelTooShort { .. }
            ))
        ));
        assert_eq!(finesse.locate(0, 1).unwrap().detector_nwords(), 18);
    }

    #[test]
    fn test_pcie40_decreasing_position_is_corrupt() {
        let mut channels: Vec<&[u32]> = vec![&[]; MAX_PCIE40_CH];
        channels[0] = &[1, 2, 3];
        channels[2] = &[4, 5];
        let mut buffer =
            pack_detector_buffers(FormatVersion::Pcie40, &PackerInfo::default(), &channels)
                .unwrap();
        let first = buffer[POS_CH_POS_TABLE];
        buffer[POS_CH_POS_TABLE + 1] = first - 1;
        let finesse = FinesseExtractor::new(BufferView::new(&buffer), FormatVersion::Pcie40);
        assert!(matches!(
            finesse.channel_nwords(0, 0),
            Err(DecodeError::CorruptBuffer(
                Corruption::ChannelOverrun { channel: 0, .. }
            ))
        ));
        assert!(finesse.channels(0).is_err());
        assert!(finesse.sub_channel_count(0).is_err());
    }

    #[test]
    fn test_pcie40_channels() {
        let ch0: Vec<u32> = vec![1; 3];
        let ch2: Vec<u32> = vec![2; 5];
        let ch47: Vec<u32> = vec![3; 2];
        let mut channels: Vec<&[u32]> = vec![&[]; MAX_PCIE40_CH];
        channels[0] = &ch0;
        channels[2] = &ch2;
        channels[47] = &ch47;
        let buffer =
            pack_detector_buffers(FormatVersion::Pcie40, &PackerInfo::default(), &channels)
                .unwrap();
        let finesse = FinesseExtractor::new(BufferView::new(&buffer), FormatVersion::Pcie40);
        assert_eq!(finesse.sub_channel_count(0), Ok(3));
        assert_eq!(finesse.channel_nwords(0, 1), Ok(0));
        assert_eq!(finesse.detector_data(0, 2).unwrap(), ch2.as_slice());
        assert_eq!(finesse.detector_data(0, 47).unwrap(), ch47.as_slice());
        assert!(finesse.sub_channel_offset(0, 48).is_err());
        assert_eq!(finesse.channels(0).unwrap().len(), 3);
    }
}
