//! # copper_unpacker
//!
//! copper_unpacker decodes the raw readout buffers of the Belle II data acquisition. A
//! buffer holds one block per event and readout node, each produced either by a COPPER
//! board (up to 4 FINESSE channels) or by a PCIe40 board (up to 48 link channels). The
//! library locates the blocks in a buffer, reads the fields of their headers and trailers,
//! and hands out the detector data of every channel as slices borrowed from the buffer.
//!
//! The decoder never copies, never logs and never aborts: every accessor returns a
//! `Result`, and a malformed buffer produces a [`error::DecodeError`] describing what was
//! wrong with it.
//!
//! ## Decoding a buffer
//!
//! ```no_run
//! use libcopper_unpacker::format::FormatVersion;
//! use libcopper_unpacker::raw_copper::RawCopper;
//!
//! # fn run(words: &[u32]) -> Result<(), libcopper_unpacker::error::DecodeError> {
//! let raw = RawCopper::new(words, 1, 4, FormatVersion::Copper);
//! for block in raw.blocks()? {
//!     for channel in block.channels()? {
//!         let data = block.detector_data(channel.slot())?;
//!         println!("node {:#x} slot {}: {} words", block.node_id()?, channel.slot(), data.len());
//!     }
//! }
//! # Ok(())
//! # }
//! ```
//!
//! The format is always given by the caller. [`raw_copper::RawCopper`] rejects blocks
//! whose RawHeader carries a different format version.
//!
//! ## Installation
//!
//! The only method of install is from source. To build and install the CLI use
//! `cargo install --path ./copper_unpacker_cli` from the top level repository.
//!
//! ## Configuration
//!
//! The CLI reads send record files from a directory and writes a YAML summary of what it
//! found. The YAML format of a configuration file is as follows:
//!
//! ```yml
//! input_path: /path/to/records
//! file_pattern: .dat
//! format: copper
//! output_path: /path/to/summary.yaml
//! check_integrity: true
//! stop_on_error: false
//! max_records: null
//! n_threads: 1
//! ```
//!
//! - `format` is `copper` or `pcie40`
//! - `check_integrity` runs the magic word, checksum and CRC16 checks on every block
//! - `stop_on_error` makes the first bad block fatal. Otherwise bad blocks are logged as
//! warnings, counted in the summary and skipped.
//! - `max_records` limits the number of records each worker reads
//! - `n_threads` is the number of parallel workers to divide the files amongst. Only the
//! workers that would have files to read are created.
//!
//! A template configuration can be made with `copper_unpacker_cli new -p config.yaml`.
//!
//! ## Send record files
//!
//! A file is a sequence of little-endian records. Each record holds a 6 word SendHeader,
//! the blocks of `num_events * num_nodes` event/node pairs, and a 2 word SendTrailer.
pub mod block_index;
pub mod buffer;
pub mod config;
pub mod constants;
pub mod crc16;
pub mod error;
pub mod finesse;
pub mod format;
pub mod header;
pub mod integrity;
pub mod packer;
pub mod process;
pub mod raw_copper;
pub mod send_block;
pub mod summary;
pub mod worker_status;
