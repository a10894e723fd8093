use fxhash::FxHashMap;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;

use super::error::SummaryError;
use super::format::FormatVersion;

/// Tallies for a single readout node
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeSummary {
    pub blocks: u64,
    pub channels: u64,
    pub detector_words: u64,
    pub bad_blocks: u64,
    pub first_event: Option<u32>,
    pub last_event: Option<u32>,
}

impl NodeSummary {
    fn merge(&mut self, other: &NodeSummary) {
        self.blocks += other.blocks;
        self.channels += other.channels;
        self.detector_words += other.detector_words;
        self.bad_blocks += other.bad_blocks;
        self.first_event = match (self.first_event, other.first_event) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        };
        self.last_event = match (self.last_event, other.last_event) {
            (Some(a), Some(b)) => Some(a.max(b)),
            (a, b) => a.or(b),
        };
    }
}

/// Running statistics of a decoding pass, kept per worker and merged at the end
#[derive(Debug, Clone, Default)]
pub struct Summary {
    pub format: FormatVersion,
    pub files: Vec<PathBuf>,
    pub records: u64,
    pub bad_records: u64,
    pub total_bytes: u64,
    /// Blocks whose node could not be read at all
    pub unreadable_blocks: u64,
    pub trailing_words: u64,
    pub nodes: FxHashMap<u32, NodeSummary>,
}

/// The YAML layout of a written summary
#[derive(Debug, Serialize, Deserialize)]
pub struct SummaryReport {
    pub created: String,
    pub format: FormatVersion,
    pub files: Vec<PathBuf>,
    pub records: u64,
    pub bad_records: u64,
    pub total_size: String,
    pub unreadable_blocks: u64,
    pub trailing_words: u64,
    pub nodes: BTreeMap<String, NodeSummary>,
}

impl Summary {
    pub fn new(format: FormatVersion) -> Self {
        Self {
            format,
            ..Default::default()
        }
    }

    pub fn add_block(
        &mut self,
        node_id: u32,
        event_number: u32,
        channels: usize,
        detector_words: usize,
    ) {
        let node = self.nodes.entry(node_id).or_default();
        node.blocks += 1;
        node.channels += channels as u64;
        node.detector_words += detector_words as u64;
        node.first_event = Some(node.first_event.map_or(event_number, |e| e.min(event_number)));
        node.last_event = Some(node.last_event.map_or(event_number, |e| e.max(event_number)));
    }

    pub fn add_bad_block(&mut self, node_id: Option<u32>) {
        match node_id {
            Some(id) => self.nodes.entry(id).or_default().bad_blocks += 1,
            None => self.unreadable_blocks += 1,
        }
    }

    pub fn total_blocks(&self) -> u64 {
        self.nodes.values().map(|n| n.blocks).sum()
    }

    pub fn total_bad_blocks(&self) -> u64 {
        self.nodes.values().map(|n| n.bad_blocks).sum::<u64>() + self.unreadable_blocks
    }

    /// Fold the statistics of another worker into this one
    pub fn merge(&mut self, other: Summary) {
        self.files.extend(other.files);
        self.records += other.records;
        self.bad_records += other.bad_records;
        self.total_bytes += other.total_bytes;
        self.unreadable_blocks += other.unreadable_blocks;
        self.trailing_words += other.trailing_words;
        for (id, node) in other.nodes.iter() {
            self.nodes.entry(*id).or_default().merge(node);
        }
    }

    pub fn to_report(&self) -> Result<SummaryReport, SummaryError> {
        let mut files = self.files.clone();
        files.sort();
        Ok(SummaryReport {
            created: OffsetDateTime::now_utc().format(&Rfc3339)?,
            format: self.format,
            files,
            records: self.records,
            bad_records: self.bad_records,
            total_size: human_bytes::human_bytes(self.total_bytes as f64),
            unreadable_blocks: self.unreadable_blocks,
            trailing_words: self.trailing_words,
            nodes: self
                .nodes
                .iter()
                .map(|(id, node)| (format!("{id:#010x}"), node.clone()))
                .collect(),
        })
    }

    /// Write the summary as YAML
    pub fn write(&self, path: &Path) -> Result<(), SummaryError> {
        let yaml_str = serde_yaml::to_string(&self.to_report()?)?;
        std::fs::write(path, yaml_str)?;
        Ok(())
    }
}
