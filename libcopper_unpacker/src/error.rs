use std::fmt::Display;
use std::path::PathBuf;
use thiserror::Error;

use super::constants::*;
use super::format::FormatVersion;
use super::worker_status::WorkerStatus;

/// What an out-of-range index was counting
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Extent {
    Word,
    Block,
}

impl Display for Extent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Word => write!(f, "word"),
            Self::Block => write!(f, "block"),
        }
    }
}

/// The internal inconsistency that made a buffer unreadable
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Corruption {
    #[error("block {block} would start at word {position}, but the buffer holds only {nwords} words")]
    BlockStartBeyondBuffer {
        block: usize,
        position: usize,
        nwords: usize,
    },
    #[error("block at word {start} claims {block_nwords} words, running past the {nwords} words of the buffer")]
    BlockOverrun {
        start: usize,
        block_nwords: usize,
        nwords: usize,
    },
    #[error("length word at {position} lies outside the {nwords} words of the buffer")]
    TruncatedLength { position: usize, nwords: usize },
    #[error("block at word {start} claims {block_nwords} words, fewer than the {minimum} words of its fixed regions")]
    BlockTooShort {
        start: usize,
        block_nwords: usize,
        minimum: usize,
    },
    #[error("channel {channel} of the block at word {start} spans words {begin}..{end}, outside the payload area ending at {limit}")]
    ChannelOverrun {
        start: usize,
        channel: usize,
        begin: usize,
        end: usize,
        limit: usize,
    },
    #[error("channel {channel} of the block at word {start} holds {nwords} words, fewer than its {minimum} header and trailer words")]
    ChannelTooShort {
        start: usize,
        channel: usize,
        nwords: usize,
        minimum: usize,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    #[error("Raw buffer {extent} index {index} is out of range; the buffer holds {limit}")]
    OutOfRange {
        extent: Extent,
        index: usize,
        limit: usize,
    },
    #[error("Raw buffer is corrupted: {0}")]
    CorruptBuffer(#[from] Corruption),
    #[error("Invalid argument given to the raw buffer decoder: {0}")]
    InvalidArgument(String),
    #[error("Block at word {offset} has data format version {found}; the decoder was set up for {expected} (version {code})", code=.expected.version_code())]
    FormatMismatch {
        offset: usize,
        found: u32,
        expected: FormatVersion,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum IntegrityError {
    #[error("Integrity check could not decode the block: {0}")]
    Decode(#[from] DecodeError),
    #[error("Invalid COPPER magic word at block word {position}: found {found:#010x}, expected {expected:#010x}")]
    BadCopperMagic {
        position: usize,
        found: u32,
        expected: u32,
    },
    #[error("Invalid RawTrailer termination word {0:#010x}; expected {exp:#010x}", exp=MAGIC_WORD_TERM_TRAILER)]
    BadTermWord(u32),
    #[error("RawTrailer checksum {stored:#010x} differs from the calculated {calculated:#010x}")]
    RawChecksum { stored: u32, calculated: u32 },
    #[error("COPPER driver checksum {stored:#010x} differs from the calculated {calculated:#010x}")]
    DriverChecksum { stored: u32, calculated: u32 },
    #[error("Invalid B2LHSLB magic words in channel {channel}: header {header:#010x} (expected ffaa****), trailer {trailer:#010x} (expected ff55****)")]
    BadHslbMagic {
        channel: usize,
        header: u32,
        trailer: u32,
    },
    #[error("B2LCRC16 {stored:#06x} of channel {channel} differs from the calculated {calculated:#06x}")]
    Crc16 {
        channel: usize,
        stored: u16,
        calculated: u16,
    },
    #[error("Block contains no FINESSE data")]
    NoChannels,
    #[error("Different event numbers over FINESSE channels: channel {first_channel} has {first:#x}, channel {channel} has {found:#x}")]
    EventNumberMismatch {
        first_channel: usize,
        first: u32,
        channel: usize,
        found: u32,
    },
    #[error("Mismatched B2LFEE {field} over FINESSE channels: channel {first_channel} has {first:#010x}, channel {channel} has {found:#010x}")]
    HeaderMismatch {
        field: &'static str,
        first_channel: usize,
        first: u32,
        channel: usize,
        found: u32,
    },
    #[error("Event number in the RawHeader {raw_header:#x} differs from the B2LFEE event number {b2l:#x}")]
    RawHeaderEventMismatch { raw_header: u32, b2l: u32 },
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PackerError {
    #[error("Packer was given {0} channels but the {1} format holds at most {max}", max=.1.max_channels())]
    TooManyChannels(usize, FormatVersion),
    #[error("Packed block of {0} words does not fit the length fields of the format")]
    BlockTooLarge(usize),
}

#[derive(Debug, Error)]
pub enum SendBlockError {
    #[error("SendBlock file failed due to IO error: {0}")]
    IOError(#[from] std::io::Error),
    #[error("Could not open SendBlock file because file {0:?} does not exist")]
    BadFilePath(PathBuf),
    #[error("SendHeader declares {0} words; a record holds {min} to {max} words", min=SENDHDR_NWORDS + SENDTRL_NWORDS, max=SENDHDR_NWORDS + SENDTRL_NWORDS + MAX_SEND_BODY_NWORDS)]
    BadRecordLength(u32),
    #[error("SendHeader declares a header length of {0} words; expected {exp}", exp=SENDHDR_NWORDS)]
    BadHeaderLength(u32),
    #[error("SendBlock file ended in the middle of a record")]
    TruncatedRecord,
    #[error("Invalid SendTrailer termination word {0:#010x}; expected {exp:#010x}", exp=MAGIC_WORD_SEND_TRAILER)]
    BadTermWord(u32),
    #[error("SendTrailer checksum {stored:#010x} differs from the calculated {calculated:#010x}")]
    BadChecksum { stored: u32, calculated: u32 },
    #[error("SendBlock record failed to decode: {0}")]
    Decode(#[from] DecodeError),
    #[error("SendBlock stack did not find any matching files in the input directory")]
    NoMatchingFiles,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to load configuration as file {0:?} does not exist")]
    BadFilePath(PathBuf),
    #[error("Config failed due to IO error: {0}")]
    IOError(#[from] std::io::Error),
    #[error("Config failed to parse YAML: {0}")]
    ParsingError(#[from] serde_yaml::Error),
    #[error("Unknown raw data format {0}; expected copper or pcie40")]
    BadFormat(String),
}

#[derive(Debug, Error)]
pub enum SummaryError {
    #[error("Summary failed due to IO error: {0}")]
    IOError(#[from] std::io::Error),
    #[error("Summary failed to convert to yaml: {0}")]
    ParsingError(#[from] serde_yaml::Error),
    #[error("Summary failed to format the time stamp: {0}")]
    TimeError(#[from] time::error::Format),
}

#[derive(Debug, Error)]
pub enum ProcessorError {
    #[error("Processor failed due to SendBlock error: {0}")]
    SendBlockError(#[from] SendBlockError),
    #[error("Processor failed due to decode error: {0}")]
    DecodeError(#[from] DecodeError),
    #[error("Processor failed due to integrity error: {0}")]
    IntegrityError(#[from] IntegrityError),
    #[error("Processor failed due to Config error: {0}")]
    ConfigError(#[from] ConfigError),
    #[error("Processor failed due to Summary error: {0}")]
    SummaryError(#[from] SummaryError),
    #[error("Processor failed due to Send error: {0}")]
    SendError(#[from] std::sync::mpsc::SendError<WorkerStatus>),
    #[error("Processor failed due to IO error: {0}")]
    IoError(#[from] std::io::Error),
}
