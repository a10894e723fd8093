use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use std::collections::VecDeque;
use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, ErrorKind, Write};
use std::path::{Path, PathBuf};

use super::buffer::BufferView;
use super::constants::*;
use super::error::SendBlockError;
use super::format::FormatVersion;
use super::header::HeaderFields;
use super::raw_copper::RawCopper;

/// One file record: a SendHeader, the blocks of `num_events * num_nodes` event/node pairs, and
/// a SendTrailer.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SendBlock {
    pub num_events: u32,
    pub num_nodes: u32,
    pub exp_run: u32,
    pub event_number: u32,
    pub node_id: u32,
    pub checksum: u32,
    pub body: Vec<u32>,
}

impl SendBlock {
    /// Total size of the record in words, headers included
    pub fn nwords(&self) -> usize {
        SENDHDR_NWORDS + self.body.len() + SENDTRL_NWORDS
    }

    pub fn num_blocks(&self) -> usize {
        self.num_events as usize * self.num_nodes as usize
    }

    /// Decoder over the blocks of this record
    pub fn as_raw_copper(&self, format: FormatVersion) -> RawCopper<'_> {
        RawCopper::new(
            &self.body,
            self.num_events as usize,
            self.num_nodes as usize,
            format,
        )
    }
}

/// XOR of every body word, stored in the SendTrailer
pub fn xor_checksum(words: &[u32]) -> u32 {
    words.iter().fold(0, |acc, word| acc ^ word)
}

fn read_word<R: ReadBytesExt>(reader: &mut R) -> Result<u32, SendBlockError> {
    reader.read_u32::<LittleEndian>().map_err(eof_is_truncation)
}

fn eof_is_truncation(error: std::io::Error) -> SendBlockError {
    if error.kind() == ErrorKind::UnexpectedEof {
        SendBlockError::TruncatedRecord
    } else {
        SendBlockError::IOError(error)
    }
}

/// A file of little-endian send records
#[derive(Debug)]
pub struct SendBlockFile {
    reader: BufReader<File>,
    path: PathBuf,
    size_bytes: u64,
    bytes_read: u64,
}

impl SendBlockFile {
    pub fn open(path: &Path) -> Result<Self, SendBlockError> {
        if !path.exists() {
            return Err(SendBlockError::BadFilePath(path.to_path_buf()));
        }
        let file = File::open(path)?;
        let size_bytes = file.metadata()?.len();
        Ok(Self {
            reader: BufReader::new(file),
            path: path.to_path_buf(),
            size_bytes,
            bytes_read: 0,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn size_bytes(&self) -> u64 {
        self.size_bytes
    }

    pub fn bytes_read(&self) -> u64 {
        self.bytes_read
    }

    /// Read the next record
    ///
    /// Returns `Ok(None)` when the file ends cleanly between records. A file ending inside a
    /// record is a [`SendBlockError::TruncatedRecord`].
    pub fn next_record(&mut self) -> Result<Option<SendBlock>, SendBlockError> {
        if self.reader.fill_buf()?.is_empty() {
            return Ok(None);
        }

        let mut header = [0u32; SENDHDR_NWORDS];
        self.reader
            .read_u32_into::<LittleEndian>(&mut header)
            .map_err(eof_is_truncation)?;

        let nwords = header[POS_SEND_NWORDS];
        let overhead = SENDHDR_NWORDS + SENDTRL_NWORDS;
        let body_nwords = (nwords as usize)
            .checked_sub(overhead)
            .filter(|n| *n <= MAX_SEND_BODY_NWORDS)
            .ok_or(SendBlockError::BadRecordLength(nwords))?;
        if header[POS_SEND_HDR_NWORDS] as usize != SENDHDR_NWORDS {
            return Err(SendBlockError::BadHeaderLength(header[POS_SEND_HDR_NWORDS]));
        }

        let mut body = vec![0u32; body_nwords];
        self.reader
            .read_u32_into::<LittleEndian>(&mut body)
            .map_err(eof_is_truncation)?;
        let checksum = read_word(&mut self.reader)?;
        let term = read_word(&mut self.reader)?;
        if term != MAGIC_WORD_SEND_TRAILER {
            return Err(SendBlockError::BadTermWord(term));
        }
        self.bytes_read += (nwords as usize * WORD_SIZE) as u64;

        // The record was consumed whole, so the file stays readable past a bad checksum
        let calculated = xor_checksum(&body);
        if checksum != calculated {
            return Err(SendBlockError::BadChecksum {
                stored: checksum,
                calculated,
            });
        }

        let num_eve_num_nodes = header[POS_NUM_EVE_NUM_NODES];
        Ok(Some(SendBlock {
            num_events: num_eve_num_nodes >> 16,
            num_nodes: num_eve_num_nodes & 0xFFFF,
            exp_run: header[POS_SEND_EXP_RUN],
            event_number: header[POS_SEND_EVE_NO],
            node_id: header[POS_SEND_NODE_ID],
            checksum,
            body,
        }))
    }
}

/// Writes send records, taking the header information from the first block of each record
#[derive(Debug)]
pub struct SendBlockWriter {
    writer: BufWriter<File>,
    format: FormatVersion,
    records_written: u64,
}

impl SendBlockWriter {
    pub fn create(path: &Path, format: FormatVersion) -> Result<Self, SendBlockError> {
        Ok(Self {
            writer: BufWriter::new(File::create(path)?),
            format,
            records_written: 0,
        })
    }

    pub fn records_written(&self) -> u64 {
        self.records_written
    }

    /// Write one record holding the concatenated blocks of num_events * num_nodes pairs
    pub fn write_record(
        &mut self,
        num_events: u16,
        num_nodes: u16,
        blocks: &[u32],
    ) -> Result<(), SendBlockError> {
        if blocks.len() > MAX_SEND_BODY_NWORDS {
            return Err(SendBlockError::BadRecordLength(u32::MAX));
        }
        let header_fields = HeaderFields::new(BufferView::new(blocks), self.format);
        let nwords = (SENDHDR_NWORDS + blocks.len() + SENDTRL_NWORDS) as u32;

        let mut header = [0u32; SENDHDR_NWORDS];
        header[POS_SEND_NWORDS] = nwords;
        header[POS_SEND_HDR_NWORDS] = SENDHDR_NWORDS as u32;
        header[POS_NUM_EVE_NUM_NODES] = ((num_events as u32) << 16) | num_nodes as u32;
        header[POS_SEND_EXP_RUN] = header_fields.exp_run_subrun(0)?;
        header[POS_SEND_EVE_NO] = header_fields.event_number(0)?;
        header[POS_SEND_NODE_ID] = header_fields.node_id(0)?;

        let trailer = [xor_checksum(blocks), MAGIC_WORD_SEND_TRAILER];
        for word in header.iter().chain(blocks).chain(&trailer) {
            self.writer.write_u32::<LittleEndian>(*word)?;
        }
        self.records_written += 1;
        Ok(())
    }

    pub fn flush(&mut self) -> Result<(), SendBlockError> {
        self.writer.flush()?;
        Ok(())
    }
}

/// The collection of send record files handled by one worker, read one after another
#[derive(Debug)]
pub struct SendBlockStack {
    pub file_stack: VecDeque<PathBuf>,
    active_file: SendBlockFile,
    pub total_stack_size_bytes: u64,
    finished_bytes: u64,
    is_ended: bool,
}

impl SendBlockStack {
    pub fn new(files: Vec<PathBuf>) -> Result<Self, SendBlockError> {
        let mut stack: VecDeque<PathBuf> = files.into();
        let mut total_stack_size_bytes = 0;
        for path in stack.iter() {
            if !path.exists() {
                return Err(SendBlockError::BadFilePath(path.clone()));
            }
            total_stack_size_bytes += path.metadata()?.len();
        }
        if let Some(file_path) = stack.pop_front() {
            log::info!("Opening {}", file_path.to_string_lossy());
            Ok(Self {
                file_stack: stack,
                active_file: SendBlockFile::open(&file_path)?,
                total_stack_size_bytes,
                finished_bytes: 0,
                is_ended: false,
            })
        } else {
            Err(SendBlockError::NoMatchingFiles)
        }
    }

    /// Path of the file currently being read
    pub fn active_path(&self) -> &Path {
        self.active_file.path()
    }

    /// Bytes of the stack consumed so far
    pub fn bytes_read(&self) -> u64 {
        if self.is_ended {
            self.finished_bytes
        } else {
            self.finished_bytes + self.active_file.bytes_read()
        }
    }

    /// Get the next record in the stack, `None` once every file is exhausted
    pub fn next_record(&mut self) -> Result<Option<SendBlock>, SendBlockError> {
        loop {
            if self.is_ended {
                return Ok(None);
            }
            match self.active_file.next_record()? {
                Some(record) => return Ok(Some(record)),
                None => self.move_to_next_file()?,
            }
        }
    }

    /// Abandon the rest of the active file, for when a record cannot be read
    pub fn skip_active_file(&mut self) -> Result<(), SendBlockError> {
        log::warn!(
            "Skipping the rest of {}",
            self.active_file.path().to_string_lossy()
        );
        self.move_to_next_file()
    }

    fn move_to_next_file(&mut self) -> Result<(), SendBlockError> {
        self.finished_bytes += self.active_file.size_bytes();
        if let Some(next_path) = self.file_stack.pop_front() {
            log::info!("Opening {}", next_path.to_string_lossy());
            self.active_file = SendBlockFile::open(&next_path)?;
        } else {
            self.is_ended = true;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::DecodeError;
    use crate::packer::{pack_detector_buffers, PackerInfo};

    fn temp_path(name: &str) -> PathBuf {
        std::env::temp_dir().join(format!("copper_unpacker_{}_{name}", std::process::id()))
    }

    fn record_body(first_event: u32, num_events: u32, num_nodes: u32) -> Vec<u32> {
        let mut body = Vec::new();
        for event in first_event..first_event + num_events {
            for node in 0..num_nodes {
                let info = PackerInfo {
                    exp_number: 5,
                    run_subrun_number: 77 << 8,
                    event_number: event,
                    node_id: 0x0100_0000 + node,
                    ..Default::default()
                };
                let data: Vec<u32> = (0..(event % 5 + node)).collect();
                body.extend(
                    pack_detector_buffers(FormatVersion::Copper, &info, &[&data, &[1, 2]])
                        .unwrap(),
                );
            }
        }
        body
    }

    #[test]
    fn test_write_then_read() {
        let path = temp_path("roundtrip.dat");
        let first = record_body(10, 2, 3);
        let second = record_body(12, 1, 3);
        {
            let mut writer = SendBlockWriter::create(&path, FormatVersion::Copper).unwrap();
            writer.write_record(2, 3, &first).unwrap();
            writer.write_record(1, 3, &second).unwrap();
            writer.flush().unwrap();
            assert_eq!(writer.records_written(), 2);
        }

        let mut file = SendBlockFile::open(&path).unwrap();
        let record = file.next_record().unwrap().unwrap();
        assert_eq!(record.num_events, 2);
        assert_eq!(record.num_nodes, 3);
        assert_eq!(record.event_number, 10);
        assert_eq!(record.node_id, 0x0100_0000);
        assert_eq!(record.exp_run, (5 << 22) | (77 << 8));
        assert_eq!(record.body, first);

        let raw = record.as_raw_copper(FormatVersion::Copper);
        let blocks = raw.blocks().unwrap();
        assert_eq!(blocks.len(), 6);
        assert_eq!(blocks[4].event_number(), Ok(11));
        assert_eq!(blocks[4].node_id(), Ok(0x0100_0001));

        let record = file.next_record().unwrap().unwrap();
        assert_eq!(record.body, second);
        assert!(file.next_record().unwrap().is_none());
        assert_eq!(file.bytes_read(), file.size_bytes());

        std::fs::remove_file(&path).unwrap();
    }

    #[test]
    fn test_truncated_file() {
        let path = temp_path("truncated.dat");
        {
            let mut writer = SendBlockWriter::create(&path, FormatVersion::Copper).unwrap();
            writer.write_record(1, 1, &record_body(0, 1, 1)).unwrap();
            writer.flush().unwrap();
        }
        let bytes = std::fs::read(&path).unwrap();
        std::fs::write(&path, &bytes[..bytes.len() - 6]).unwrap();

        let mut file = SendBlockFile::open(&path).unwrap();
        assert!(matches!(
            file.next_record(),
            Err(SendBlockError::TruncatedRecord)
        ));
        std::fs::remove_file(&path).unwrap();
    }

    #[test]
    fn test_bad_records() {
        let path = temp_path("bad.dat");
        let mut bytes = Vec::new();
        for word in [4u32, 6, 0, 0, 0, 0] {
            bytes.write_u32::<LittleEndian>(word).unwrap();
        }
        std::fs::write(&path, &bytes).unwrap();
        let mut file = SendBlockFile::open(&path).unwrap();
        assert!(matches!(
            file.next_record(),
            Err(SendBlockError::BadRecordLength(4))
        ));

        let mut bytes = Vec::new();
        for word in [8u32, 6, 0, 0, 0, 0, 0, 0x7FFF_0006] {
            bytes.write_u32::<LittleEndian>(word).unwrap();
        }
        std::fs::write(&path, &bytes).unwrap();
        let mut file = SendBlockFile::open(&path).unwrap();
        assert!(matches!(
            file.next_record(),
            Err(SendBlockError::BadTermWord(0x7FFF_0006))
        ));
        std::fs::remove_file(&path).unwrap();

        assert!(matches!(
            SendBlockFile::open(&temp_path("missing.dat")),
            Err(SendBlockError::BadFilePath(_))
        ));
    }

    fn write_single_record(path: &Path) {
        let mut writer = SendBlockWriter::create(path, FormatVersion::Copper).unwrap();
        writer.write_record(1, 2, &record_body(0, 1, 2)).unwrap();
        writer.write_record(1, 2, &record_body(1, 1, 2)).unwrap();
        writer.flush().unwrap();
    }

    #[test]
    fn test_flipped_body_word() {
        let path = temp_path("checksum.dat");
        write_single_record(&path);
        let mut bytes = std::fs::read(&path).unwrap();
        // Low byte of the fourth body word
        bytes[(SENDHDR_NWORDS + 3) * WORD_SIZE] ^= 0x10;
        std::fs::write(&path, &bytes).unwrap();

        let mut file = SendBlockFile::open(&path).unwrap();
        match file.next_record() {
            Err(SendBlockError::BadChecksum { stored, calculated }) => {
                assert_eq!(stored ^ calculated, 0x10);
            }
            other => panic!("expected a bad checksum, got {other:?}"),
        }
        let record = file.next_record().unwrap().unwrap();
        assert_eq!(record.event_number, 1);
        assert!(file.next_record().unwrap().is_none());
        std::fs::remove_file(&path).unwrap();
    }

    #[test]
    fn test_corrupt_block_count_in_header() {
        let path = temp_path("count.dat");
        write_single_record(&path);
        let mut bytes = std::fs::read(&path).unwrap();
        let start = POS_NUM_EVE_NUM_NODES * WORD_SIZE;
        bytes[start..start + WORD_SIZE].copy_from_slice(&0xFFFF_FFFFu32.to_le_bytes());
        std::fs::write(&path, &bytes).unwrap();

        let mut file = SendBlockFile::open(&path).unwrap();
        let record = file.next_record().unwrap().unwrap();
        assert_eq!(record.num_blocks(), 0xFFFF_usize * 0xFFFF);
        let raw = record.as_raw_copper(FormatVersion::Copper);
        assert!(matches!(raw.scan(), Err(DecodeError::CorruptBuffer(_))));
        assert!(raw.blocks().is_err());
        std::fs::remove_file(&path).unwrap();
    }

    #[test]
    fn test_stack_reads_every_file() {
        let paths = [temp_path("stack_0.dat"), temp_path("stack_1.dat")];
        for (n, path) in paths.iter().enumerate() {
            let mut writer = SendBlockWriter::create(path, FormatVersion::Copper).unwrap();
            writer
                .write_record(1, 2, &record_body(n as u32, 1, 2))
                .unwrap();
            writer.flush().unwrap();
        }
        let mut stack = SendBlockStack::new(paths.to_vec()).unwrap();
        let total = stack.total_stack_size_bytes;
        let mut events = Vec::new();
        while let Some(record) = stack.next_record().unwrap() {
            events.push(record.event_number);
        }
        assert_eq!(events, vec![0, 1]);
        assert_eq!(stack.bytes_read(), total);
        for path in paths.iter() {
            std::fs::remove_file(path).unwrap();
        }

        assert!(matches!(
            SendBlockStack::new(Vec::new()),
            Err(SendBlockError::NoMatchingFiles)
        ));
    }
}
