use super::constants::*;
use super::crc16::crc16_words;
use super::error::PackerError;
use super::format::FormatVersion;

/// Event level information written into the headers of a packed block
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PackerInfo {
    pub exp_number: u32,
    /// Run number in bits 8..22, sub-run number in bits 0..8
    pub run_subrun_number: u32,
    pub event_number: u32,
    pub tt_ctime: u32,
    pub tt_utime: u32,
    pub node_id: u32,
    pub b2l_ctime: u32,
}

impl PackerInfo {
    fn exp_run_word(&self) -> u32 {
        (self.exp_number << EXP_SHIFT) | (self.run_subrun_number & RUN_SUBRUN_MASK)
    }

    fn ctime_word(&self) -> u32 {
        (self.tt_ctime & CTIME_MASK) << CTIME_SHIFT
    }

    fn b2l_ctime_word(&self) -> u32 {
        (self.b2l_ctime & CTIME_MASK) << CTIME_SHIFT
    }

    fn event_tag_low(&self) -> u32 {
        self.event_number & 0xFFFF
    }
}

fn channel_nwords(detector: &[u32]) -> usize {
    if detector.is_empty() {
        0
    } else {
        detector.len() + SIZE_B2L_HEADERS_TRAILERS
    }
}

fn xor_words(words: &[u32]) -> u32 {
    words.iter().fold(0, |acc, word| acc ^ word)
}

/// Wrap one detector buffer in its HSLB and B2LFEE headers and trailers
fn pack_channel(packed: &mut Vec<u32>, info: &PackerInfo, detector: &[u32]) {
    packed.push(B2LHSLB_HEADER_MAGIC | info.event_tag_low());

    let crc_start = packed.len();
    packed.push(info.ctime_word());
    packed.push(info.event_number);
    packed.push(info.tt_utime);
    packed.push(info.exp_run_word());
    packed.push(info.b2l_ctime_word());
    packed.extend_from_slice(detector);
    let crc16 = crc16_words(&packed[crc_start..]);

    packed.push(info.ctime_word());
    packed.push((info.event_tag_low() << 16) | crc16 as u32);
    packed.push(B2LHSLB_TRAILER_MAGIC);
}

/// Build a single block of the given format around a set of detector buffers.
///
/// Each entry of `detector_buffers` is the detector data of one channel, in slot order; an
/// empty slice leaves the channel absent. The returned block is complete: lengths, magic
/// words, the B2L CRC16 of every channel and all checksums are filled in.
pub fn pack_detector_buffers(
    format: FormatVersion,
    info: &PackerInfo,
    detector_buffers: &[&[u32]],
) -> Result<Vec<u32>, PackerError> {
    if detector_buffers.len() > format.max_channels() {
        return Err(PackerError::TooManyChannels(detector_buffers.len(), format));
    }

    let lengths: Vec<usize> = (0..format.max_channels())
        .map(|ch| detector_buffers.get(ch).map_or(0, |buf| channel_nwords(buf)))
        .collect();
    let block_nwords = format.fixed_overhead_nwords() + lengths.iter().sum::<usize>();
    let block_nwords_word =
        u32::try_from(block_nwords).map_err(|_| PackerError::BlockTooLarge(block_nwords))?;
    let raw_header_nwords = format.raw_header_nwords();

    let mut packed: Vec<u32> = Vec::with_capacity(block_nwords);
    packed.push(block_nwords_word);
    packed.push(
        RAWHEADER_VERSION_WORD_BASE
            | ((format.version_code() << FORMAT_VERSION_SHIFT) & FORMAT_VERSION_MASK)
            | raw_header_nwords as u32,
    );
    packed.push(info.exp_run_word());
    packed.push(info.event_number);
    packed.push(info.ctime_word());
    packed.push(info.tt_utime);
    packed.push(info.node_id);
    packed.push(0);

    // Channel positions relative to the block start; absent channels share the position of
    // the next present one
    let mut position = raw_header_nwords + format.copper_header_nwords();
    for length in lengths.iter() {
        packed.push(position as u32);
        position += length;
    }

    if format.has_copper_regions() {
        let mut header = [0u32; SIZE_COPPER_HEADER];
        header[POS_MAGIC_COPPER_1] = COPPER_MAGIC_DRIVER_HEADER;
        header[POS_EVE_NUM_COPPER] = info.event_number;
        header[POS_MAGIC_COPPER_2] = COPPER_MAGIC_FPGA_HEADER;
        for (pos, length) in POS_CH_DATA_LENGTH.iter().zip(lengths.iter()) {
            header[*pos] = *length as u32;
        }
        // The data length covers the FPGA parts of the COPPER header and trailer
        header[POS_DATA_LENGTH] = (lengths.iter().sum::<usize>()
            + (SIZE_COPPER_HEADER - SIZE_COPPER_DRIVER_HEADER)
            + (SIZE_COPPER_TRAILER - SIZE_COPPER_DRIVER_TRAILER))
            as u32;
        packed.extend_from_slice(&header);
    }

    for detector in detector_buffers.iter().filter(|buf| !buf.is_empty()) {
        pack_channel(&mut packed, info, detector);
    }

    if format.has_copper_regions() {
        packed.push(COPPER_MAGIC_FPGA_TRAILER);
        let driver_checksum = xor_words(&packed[raw_header_nwords..]);
        packed.push(driver_checksum);
        packed.push(COPPER_MAGIC_DRIVER_TRAILER);
    }

    let raw_checksum = xor_words(&packed);
    packed.push(raw_checksum);
    packed.push(MAGIC_WORD_TERM_TRAILER);

    Ok(packed)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_copper_layout() {
        let info = PackerInfo {
            event_number: 0x0002_0010,
            ..Default::default()
        };
        let packed =
            pack_detector_buffers(FormatVersion::Copper, &info, &[&[1, 2, 3], &[], &[4, 5]])
                .unwrap();
        assert_eq!(packed.len(), 30 + 12 + 11);
        assert_eq!(packed[POS_NWORDS] as usize, packed.len());
        assert_eq!(packed[POS_VERSION_HDRNWORDS], 0x7F7F_810C);

        // FINESSE offsets: slot B is absent and shares the offset of slot C
        assert_eq!(
            &packed[POS_OFFSET_1ST_FINESSE..COPPER_RAWHEADER_NWORDS],
            &[25, 37, 37, 48]
        );

        let copper = &packed[COPPER_RAWHEADER_NWORDS..];
        assert_eq!(copper[POS_DATA_LENGTH], 12 + 11 + 7);
        assert_eq!(copper[POS_CH_A_DATA_LENGTH], 12);
        assert_eq!(copper[POS_CH_B_DATA_LENGTH], 0);
        assert_eq!(copper[POS_CH_C_DATA_LENGTH], 11);

        let slot_a = &packed[25..37];
        assert_eq!(slot_a[0], 0xFFAA_0010);
        assert_eq!(&slot_a[6..9], &[1, 2, 3]);
        assert_eq!(slot_a[11], 0xFF55_0000);
        let crc = crc16_words(&slot_a[1..9]);
        assert_eq!(slot_a[10], 0x0010_0000 | crc as u32);

        let n = packed.len();
        assert_eq!(packed[n - 1], MAGIC_WORD_TERM_TRAILER);
        assert_eq!(packed[n - 2], xor_words(&packed[..n - 2]));
        assert_eq!(packed[n - 5], COPPER_MAGIC_FPGA_TRAILER);
        assert_eq!(packed[n - 4], xor_words(&packed[COPPER_RAWHEADER_NWORDS..n - 4]));
        assert_eq!(packed[n - 3], COPPER_MAGIC_DRIVER_TRAILER);
    }

    #[test]
    fn test_pcie40_layout() {
        let packed = pack_detector_buffers(
            FormatVersion::Pcie40,
            &PackerInfo::default(),
            &[&[], &[9; 4]],
        )
        .unwrap();
        assert_eq!(packed.len(), 58 + 13);
        assert_eq!(packed[POS_NWORDS] as usize, packed.len());
        assert_eq!(packed[POS_VERSION_HDRNWORDS], 0x7F7F_8438);
        assert_eq!(packed[POS_CH_POS_TABLE], 56);
        assert_eq!(packed[POS_CH_POS_TABLE + 1], 56);
        assert_eq!(packed[POS_CH_POS_TABLE + 2], 69);
        assert_eq!(packed[POS_CH_POS_TABLE + 47], 69);
        assert_eq!(packed[56] & B2LHSLB_MAGIC_MASK, B2LHSLB_HEADER_MAGIC);
    }

    #[test]
    fn test_too_many_channels() {
        let channels: Vec<&[u32]> = vec![&[1]; 5];
        assert_eq!(
            pack_detector_buffers(FormatVersion::Copper, &PackerInfo::default(), &channels),
            Err(PackerError::TooManyChannels(5, FormatVersion::Copper))
        );
        assert!(
            pack_detector_buffers(FormatVersion::Pcie40, &PackerInfo::default(), &channels)
                .is_ok()
        );
    }

    #[test]
    fn test_header_words() {
        let info = PackerInfo {
            exp_number: 3,
            run_subrun_number: 0xFFFF_FFFF,
            tt_ctime: 0xFFFF_FFFF,
            ..Default::default()
        };
        let packed =
            pack_detector_buffers(FormatVersion::Copper, &info, &[&[0]]).unwrap();
        assert_eq!(packed[POS_EXP_RUN_NO], (3 << 22) | 0x003F_FFFF);
        assert_eq!(packed[POS_TTCTIME_TRGTYPE], 0x7FFF_FFF0);
    }
}
