use std::path::PathBuf;
use std::sync::mpsc::Sender;

use super::block_index::BlockSpan;
use super::buffer::BufferView;
use super::config::Config;
use super::error::{ProcessorError, SendBlockError};
use super::header::HeaderFields;
use super::raw_copper::{CopperBlock, RawCopper};
use super::send_block::{SendBlock, SendBlockStack};
use super::summary::Summary;
use super::worker_status::{BarColor, WorkerStatus};

/// What a successfully decoded block contributes to the summary
struct BlockStats {
    node_id: u32,
    event_number: u32,
    channels: usize,
    detector_words: usize,
}

fn inspect_block(block: &CopperBlock, check_integrity: bool) -> Result<BlockStats, ProcessorError> {
    if check_integrity {
        block.check_integrity()?;
    }
    let channels = block.channels()?;
    Ok(BlockStats {
        node_id: block.node_id()?,
        event_number: block.event_number()?,
        channels: channels.len(),
        detector_words: channels.iter().map(|c| c.detector_nwords()).sum(),
    })
}

fn inspect_span(
    config: &Config,
    raw: &RawCopper,
    span: BlockSpan,
) -> Result<BlockStats, ProcessorError> {
    let block = raw.block_at(span)?;
    inspect_block(&block, config.check_integrity)
}

/// Decode every block of a record
///
/// Bad blocks are logged and counted, then skipped, unless the config asks to stop on error.
/// A record whose length chain is broken is skipped as a whole, since the blocks after the
/// break cannot be located.
fn process_record(
    config: &Config,
    record: &SendBlock,
    record_number: u64,
    summary: &mut Summary,
) -> Result<(), ProcessorError> {
    let raw = record.as_raw_copper(config.format);
    let offsets = match raw.scan() {
        Ok(offsets) => offsets,
        Err(e) => {
            if config.stop_on_error {
                return Err(e.into());
            }
            log::warn!(
                "Skipping record {record_number} (event {}): {e}",
                record.event_number
            );
            summary.bad_records += 1;
            return Ok(());
        }
    };

    let trailing = record.body.len() - offsets.covered_nwords();
    if trailing > 0 {
        log::warn!(
            "Record {record_number} (event {}) has {trailing} words after its last block",
            record.event_number
        );
        summary.trailing_words += trailing as u64;
    }

    for (n, span) in offsets.iter().enumerate() {
        match inspect_span(config, &raw, *span) {
            Ok(stats) => summary.add_block(
                stats.node_id,
                stats.event_number,
                stats.channels,
                stats.detector_words,
            ),
            Err(e) => {
                if config.stop_on_error {
                    return Err(e);
                }
                let node_id = HeaderFields::new(BufferView::new(&record.body), config.format)
                    .node_id(span.offset)
                    .ok();
                log::warn!(
                    "Skipping block {n} of record {record_number} (event {}): {e}",
                    record.event_number
                );
                summary.add_bad_block(node_id);
            }
        }
    }
    Ok(())
}

/// Decode a list of files in order, reporting progress over tx
fn process_files(
    config: &Config,
    files: Vec<PathBuf>,
    tx: &Sender<WorkerStatus>,
    worker_id: usize,
) -> Result<Summary, ProcessorError> {
    let mut stack = SendBlockStack::new(files.clone())?;
    let mut summary = Summary::new(config.format);
    summary.files = files;
    summary.total_bytes = stack.total_stack_size_bytes;
    log::info!(
        "Worker {worker_id} has {} to decode",
        human_bytes::human_bytes(stack.total_stack_size_bytes as f64)
    );

    let total_bytes = stack.total_stack_size_bytes.max(1);
    let flush_frac: f32 = 0.01;
    let flush_val = (total_bytes as f64 * flush_frac as f64) as u64;
    let mut last_flush: u64 = 0;

    tx.send(WorkerStatus::new(0.0, 0, worker_id, BarColor::CYAN))?;
    loop {
        if config.is_record_limit_reached(summary.records) {
            log::info!("Worker {worker_id} reached the record limit");
            break;
        }

        let record = match stack.next_record() {
            Ok(Some(record)) => record,
            Ok(None) => break,
            Err(e @ SendBlockError::BadChecksum { .. }) => {
                if config.stop_on_error {
                    return Err(e.into());
                }
                log::warn!(
                    "Skipping a record of {}: {e}",
                    stack.active_path().to_string_lossy()
                );
                summary.bad_records += 1;
                continue;
            }
            Err(e) => {
                if config.stop_on_error {
                    return Err(e.into());
                }
                log::warn!(
                    "Could not read a record from {}: {e}",
                    stack.active_path().to_string_lossy()
                );
                summary.bad_records += 1;
                stack.skip_active_file()?;
                continue;
            }
        };
        summary.records += 1;
        process_record(config, &record, summary.records, &mut summary)?;

        let bytes_read = stack.bytes_read();
        if bytes_read - last_flush > flush_val {
            last_flush = bytes_read;
            tx.send(WorkerStatus::new(
                bytes_read as f32 / total_bytes as f32,
                summary.records,
                worker_id,
                BarColor::CYAN,
            ))?;
        }
    }

    tx.send(WorkerStatus::new(
        1.0,
        summary.records,
        worker_id,
        BarColor::GREEN,
    ))?;
    log::info!(
        "Worker {worker_id} decoded {} records holding {} blocks, {} bad blocks",
        summary.records,
        summary.total_blocks(),
        summary.total_bad_blocks()
    );
    Ok(summary)
}

/// Decode every input file on a single worker and write the summary to the configured
/// output path.
pub fn process(
    config: Config,
    tx: Sender<WorkerStatus>,
    worker_id: usize,
) -> Result<Summary, ProcessorError> {
    let files = config.get_input_files()?;
    let summary = process_subset(config.clone(), tx, worker_id, files)?;
    summary.write(&config.get_summary_file_name()?)?;
    Ok(summary)
}

/// Process a subset of the input files
///
/// The returned summary only covers the subset; merge the summaries of all workers with
/// [`Summary::merge`] before writing it.
pub fn process_subset(
    config: Config,
    tx: Sender<WorkerStatus>,
    worker_id: usize,
    subset: Vec<PathBuf>,
) -> Result<Summary, ProcessorError> {
    let result = process_files(&config, subset, &tx, worker_id);
    if result.is_err() {
        // The receiver may already be gone; the error itself is what matters
        let _ = tx.send(WorkerStatus::new(1.0, 0, worker_id, BarColor::RED));
    }
    result
}

/// Divide the input files in to a set of subsets (per thread/worker)
pub fn create_subsets(config: &Config) -> Result<Vec<Vec<PathBuf>>, ProcessorError> {
    let files = config.get_input_files()?;
    let mut subsets: Vec<Vec<PathBuf>> = vec![Vec::new(); config.n_threads.max(1) as usize];
    let n_subsets = subsets.len();

    for (idx, file) in files.into_iter().enumerate() {
        subsets[idx % n_subsets].push(file)
    }
    subsets.retain(|subset| !subset.is_empty());

    Ok(subsets)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::*;
    use crate::format::FormatVersion;
    use crate::packer::{pack_detector_buffers, PackerInfo};
    use crate::send_block::SendBlockWriter;
    use std::path::Path;
    use std::sync::mpsc::channel;

    fn block(event: u32, node: u32) -> Vec<u32> {
        let info = PackerInfo {
            event_number: event,
            node_id: node,
            ..Default::default()
        };
        pack_detector_buffers(FormatVersion::Copper, &info, &[&[event; 4], &[node; 2]]).unwrap()
    }

    /// Two records of 2 events x 2 nodes. The second block of the first record has a bad
    /// CRC16 when `corrupt` is set.
    fn write_run(path: &Path, corrupt: bool) {
        let mut writer = SendBlockWriter::create(path, FormatVersion::Copper).unwrap();
        for first_event in [0, 2] {
            let mut body = Vec::new();
            for event in first_event..first_event + 2 {
                for node in 0..2 {
                    let mut words = block(event, node);
                    if corrupt && event == 0 && node == 1 {
                        // first detector word of slot A
                        words[COPPER_RAWHEADER_NWORDS + SIZE_COPPER_HEADER + 6] ^= 1;
                    }
                    body.extend(words);
                }
            }
            writer.write_record(2, 2, &body).unwrap();
        }
        writer.flush().unwrap();
    }

    fn test_dir(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!(
            "copper_unpacker_process_{}_{name}",
            std::process::id()
        ));
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    #[test]
    fn test_bad_blocks_are_skipped() {
        let dir = test_dir("skip");
        write_run(&dir.join("run_0.dat"), true);
        write_run(&dir.join("run_1.dat"), false);
        let config = Config {
            input_path: dir.clone(),
            output_path: dir.join("summary.yaml"),
            ..Default::default()
        };

        let (tx, rx) = channel();
        let summary = process(config, tx, 0).unwrap();
        assert_eq!(summary.records, 4);
        assert_eq!(summary.total_blocks(), 15);
        assert_eq!(summary.total_bad_blocks(), 1);
        assert_eq!(summary.nodes[&1].bad_blocks, 1);
        assert_eq!(summary.nodes[&0].first_event, Some(0));
        assert_eq!(summary.nodes[&0].last_event, Some(3));
        assert!(dir.join("summary.yaml").exists());

        let statuses: Vec<WorkerStatus> = rx.iter().collect();
        assert_eq!(statuses.last().map(|s| s.color.clone()), Some(BarColor::GREEN));
        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn test_stop_on_error() {
        let dir = test_dir("stop");
        write_run(&dir.join("run_0.dat"), true);
        let config = Config {
            input_path: dir.clone(),
            output_path: dir.join("summary.yaml"),
            stop_on_error: true,
            ..Default::default()
        };
        let (tx, rx) = channel();
        let files = config.get_input_files().unwrap();
        let result = process_subset(config, tx, 3, files);
        assert!(matches!(result, Err(ProcessorError::IntegrityError(_))));
        let statuses: Vec<WorkerStatus> = rx.iter().collect();
        assert_eq!(statuses.last().map(|s| s.color.clone()), Some(BarColor::RED));
        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn test_bad_send_checksum_skips_record() {
        let dir = test_dir("checksum");
        let path = dir.join("run_0.dat");
        write_run(&path, false);
        let mut bytes = std::fs::read(&path).unwrap();
        bytes[(SENDHDR_NWORDS + 3) * WORD_SIZE] ^= 0x01;
        std::fs::write(&path, &bytes).unwrap();
        let config = Config {
            input_path: dir.clone(),
            check_integrity: false,
            ..Default::default()
        };

        let (tx, _rx) = channel();
        let files = config.get_input_files().unwrap();
        let summary = process_subset(config, tx, 0, files).unwrap();
        assert_eq!(summary.bad_records, 1);
        assert_eq!(summary.records, 1);
        assert_eq!(summary.total_blocks(), 4);
        assert_eq!(summary.nodes[&0].first_event, Some(2));
        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn test_record_limit_and_subsets() {
        let dir = test_dir("limit");
        for n in 0..3 {
            write_run(&dir.join(format!("run_{n}.dat")), false);
        }
        let config = Config {
            input_path: dir.clone(),
            max_records: Some(3),
            n_threads: 2,
            ..Default::default()
        };
        let subsets = create_subsets(&config).unwrap();
        assert_eq!(subsets.len(), 2);
        assert_eq!(subsets[0].len(), 2);
        assert_eq!(subsets[1].len(), 1);

        let (tx, _rx) = channel();
        let summary = process_subset(config, tx, 0, subsets[0].clone()).unwrap();
        assert_eq!(summary.records, 3);
        assert_eq!(summary.total_blocks(), 12);
        std::fs::remove_dir_all(&dir).unwrap();
    }
}
