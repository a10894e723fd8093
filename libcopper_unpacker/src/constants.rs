// Word positions, region sizes and magic words of the COPPER/PCIe40 raw data format.
// Every position is in 32-bit words, relative to the start of the region it belongs to.

// RawHeader, common to both formats
pub const POS_NWORDS: usize = 0;
pub const POS_VERSION_HDRNWORDS: usize = 1;
pub const POS_EXP_RUN_NO: usize = 2;
pub const POS_EVE_NO: usize = 3;
pub const POS_TTCTIME_TRGTYPE: usize = 4;
pub const POS_TTUTIME: usize = 5;
pub const POS_NODE_ID: usize = 6;
pub const POS_TRUNC_MASK_DATATYPE: usize = 7;

// COPPER RawHeader keeps the offsets of the 4 FINESSE slots
pub const POS_OFFSET_1ST_FINESSE: usize = 8;
pub const COPPER_RAWHEADER_NWORDS: usize = 12;

// PCIe40 RawHeader keeps a table of channel positions instead
pub const POS_CH_POS_TABLE: usize = 8;
pub const MAX_PCIE40_CH: usize = 48;
pub const PCIE40_RAWHEADER_NWORDS: usize = POS_CH_POS_TABLE + MAX_PCIE40_CH;

pub const MAX_COPPER_CH: usize = 4;

pub const RAWHEADER_MAGIC: u32 = 0x7F7F_0000;
pub const RAWHEADER_MAGIC_MASK: u32 = 0xFFFF_0000;
pub const RAWHEADER_VERSION_WORD_BASE: u32 = 0x7F7F_8000;
pub const FORMAT_VERSION_MASK: u32 = 0x0000_7F00;
pub const FORMAT_VERSION_SHIFT: u32 = 8;
pub const HDR_NWORDS_MASK: u32 = 0x0000_00FF;

pub const EXP_MASK: u32 = 0xFFC0_0000;
pub const EXP_SHIFT: u32 = 22;
pub const RUNNO_MASK: u32 = 0x003F_FF00;
pub const RUNNO_SHIFT: u32 = 8;
pub const SUBRUNNO_MASK: u32 = 0x0000_00FF;
pub const RUN_SUBRUN_MASK: u32 = 0x003F_FFFF;

pub const CTIME_MASK: u32 = 0x07FF_FFFF;
pub const CTIME_SHIFT: u32 = 4;
pub const TRGTYPE_MASK: u32 = 0x0000_000F;

// COPPER front header, located right after the RawHeader
pub const POS_MAGIC_COPPER_1: usize = 0;
pub const POS_EVE_NUM_COPPER: usize = 1;
pub const POS_SUBSYSTEM_ID: usize = 2;
pub const POS_CRATE_ID: usize = 3;
pub const POS_SLOT_ID: usize = 4;
pub const POS_MAGIC_COPPER_2: usize = 7;
pub const POS_DATA_LENGTH: usize = 8;
pub const POS_CH_A_DATA_LENGTH: usize = 9;
pub const POS_CH_B_DATA_LENGTH: usize = 10;
pub const POS_CH_C_DATA_LENGTH: usize = 11;
pub const POS_CH_D_DATA_LENGTH: usize = 12;
pub const SIZE_COPPER_DRIVER_HEADER: usize = 7;
pub const SIZE_COPPER_HEADER: usize = 13;

pub const POS_CH_DATA_LENGTH: [usize; MAX_COPPER_CH] = [
    POS_CH_A_DATA_LENGTH,
    POS_CH_B_DATA_LENGTH,
    POS_CH_C_DATA_LENGTH,
    POS_CH_D_DATA_LENGTH,
];

// COPPER trailer, located right before the RawTrailer
pub const POS_MAGIC_COPPER_3: usize = 0;
pub const POS_CHKSUM_COPPER: usize = 1;
pub const POS_MAGIC_COPPER_4: usize = 2;
pub const SIZE_COPPER_DRIVER_TRAILER: usize = 2;
pub const SIZE_COPPER_TRAILER: usize = 3;

pub const COPPER_MAGIC_DRIVER_HEADER: u32 = 0x7FFF_0008;
pub const COPPER_MAGIC_FPGA_HEADER: u32 = 0xFFFF_FAFA;
pub const COPPER_MAGIC_FPGA_TRAILER: u32 = 0xFFFF_F5F5;
pub const COPPER_MAGIC_DRIVER_TRAILER: u32 = 0x7FFF_0009;

// RawTrailer
pub const POS_RAW_CHKSUM: usize = 0;
pub const POS_TERM_WORD: usize = 1;
pub const RAWTRAILER_NWORDS: usize = 2;
pub const MAGIC_WORD_TERM_TRAILER: u32 = 0x7FFF_0006;

// Belle2Link HSLB and front-end (B2LFEE) regions inside each channel
pub const POS_MAGIC_B2LHSLB: usize = 0;
pub const SIZE_B2LHSLB_HEADER: usize = 1;
pub const POS_TT_CTIME_TYPE: usize = 0;
pub const POS_TT_TAG: usize = 1;
pub const POS_TT_UTIME: usize = 2;
pub const POS_EXP_RUN: usize = 3;
pub const POS_B2L_CTIME: usize = 4;
pub const SIZE_B2LFEE_HEADER: usize = 5;
pub const POS_TT_CTIME_B2LFEE: usize = 0;
pub const POS_CHKSUM_B2LFEE: usize = 1;
pub const SIZE_B2LFEE_TRAILER: usize = 2;
pub const POS_CHKSUM_B2LHSLB: usize = 0;
pub const SIZE_B2LHSLB_TRAILER: usize = 1;

/// Words added around the detector data of every present channel
pub const SIZE_B2L_HEADERS_TRAILERS: usize =
    SIZE_B2LHSLB_HEADER + SIZE_B2LFEE_HEADER + SIZE_B2LFEE_TRAILER + SIZE_B2LHSLB_TRAILER;

pub const B2LHSLB_HEADER_MAGIC: u32 = 0xFFAA_0000;
pub const B2LHSLB_TRAILER_MAGIC: u32 = 0xFF55_0000;
pub const B2LHSLB_MAGIC_MASK: u32 = 0xFFFF_0000;

// SendHeader/SendTrailer wrapping a group of blocks in a file record
pub const POS_SEND_NWORDS: usize = 0;
pub const POS_SEND_HDR_NWORDS: usize = 1;
pub const POS_NUM_EVE_NUM_NODES: usize = 2;
pub const POS_SEND_EXP_RUN: usize = 3;
pub const POS_SEND_EVE_NO: usize = 4;
pub const POS_SEND_NODE_ID: usize = 5;
pub const SENDHDR_NWORDS: usize = 6;
pub const POS_SEND_CHKSUM: usize = 0;
pub const POS_SEND_TERM_WORD: usize = 1;
pub const SENDTRL_NWORDS: usize = 2;
pub const MAGIC_WORD_SEND_TRAILER: u32 = 0x7FFF_0007;
/// Largest block payload accepted in a single send record
pub const MAX_SEND_BODY_NWORDS: usize = 2_500_000;

/// Size of a single word in bytes
pub const WORD_SIZE: usize = 4;
