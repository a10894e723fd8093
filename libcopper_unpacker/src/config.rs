use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use super::error::ConfigError;
use super::format::FormatVersion;

/// Structure representing the application configuration. Contains pathing and decoding options
/// Configs are seralizable and deserializable to YAML using serde and serde_yaml
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Directory holding the send record files
    pub input_path: PathBuf,
    /// Only files whose name contains this pattern are read
    pub file_pattern: String,
    pub format: FormatVersion,
    /// Where the YAML summary is written
    pub output_path: PathBuf,
    pub check_integrity: bool,
    pub stop_on_error: bool,
    /// Stop each worker after this many records
    pub max_records: Option<u64>,
    pub n_threads: i32,
}

impl Default for Config {
    /// Generate a new Config object. All paths will be empty/invalid
    fn default() -> Self {
        Self {
            input_path: PathBuf::from("None"),
            file_pattern: String::from(".dat"),
            format: FormatVersion::Copper,
            output_path: PathBuf::from("None"),
            check_integrity: true,
            stop_on_error: false,
            max_records: None,
            n_threads: 1,
        }
    }
}

impl Config {
    /// Read the configuration in a YAML file
    /// Returns a Config if successful
    pub fn read_config_file(config_path: &Path) -> Result<Self, ConfigError> {
        if !config_path.exists() {
            return Err(ConfigError::BadFilePath(config_path.to_path_buf()));
        }

        let yaml_str = std::fs::read_to_string(config_path)?;

        Ok(serde_yaml::from_str::<Self>(&yaml_str)?)
    }

    /// Get every input file matching the pattern, sorted by name
    pub fn get_input_files(&self) -> Result<Vec<PathBuf>, ConfigError> {
        if !self.input_path.is_dir() {
            return Err(ConfigError::BadFilePath(self.input_path.clone()));
        }
        let mut file_list: Vec<PathBuf> = Vec::new();
        for item in self.input_path.read_dir()? {
            let item_path = item?.path();
            let matches = item_path
                .file_name()
                .map(|name| name.to_string_lossy().contains(&self.file_pattern))
                .unwrap_or(false);
            if item_path.is_file() && matches {
                file_list.push(item_path);
            }
        }
        file_list.sort();
        Ok(file_list)
    }

    /// Get the path to the output summary file. Its directory must already exist.
    pub fn get_summary_file_name(&self) -> Result<PathBuf, ConfigError> {
        let parent = match self.output_path.parent() {
            Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
            _ => PathBuf::from("."),
        };
        if parent.exists() {
            Ok(self.output_path.clone())
        } else {
            Err(ConfigError::BadFilePath(parent))
        }
    }

    pub fn is_n_threads_valid(&self) -> bool {
        self.n_threads >= 1
    }

    pub fn is_record_limit_reached(&self, records: u64) -> bool {
        self.max_records.is_some_and(|max| records >= max)
    }
}
