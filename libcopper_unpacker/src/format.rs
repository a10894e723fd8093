use serde::{Deserialize, Serialize};
use std::fmt::Display;
use std::str::FromStr;

use super::constants::*;
use super::error::ConfigError;

/// The wire-format era of a raw buffer.
///
/// COPPER boards wrap up to 4 FINESSE channels between a COPPER front header and trailer,
/// with the block size carried by the COPPER data length word. PCIe40 boards drop the COPPER
/// regions, carry the block size in the RawHeader and locate up to 48 channels through a
/// position table. The format is always chosen by the caller and never guessed from the data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FormatVersion {
    #[default]
    Copper,
    Pcie40,
}

impl FormatVersion {
    /// The version code written into the RawHeader version word
    pub fn version_code(&self) -> u32 {
        match self {
            Self::Copper => 1,
            Self::Pcie40 => 4,
        }
    }

    pub fn raw_header_nwords(&self) -> usize {
        match self {
            Self::Copper => COPPER_RAWHEADER_NWORDS,
            Self::Pcie40 => PCIE40_RAWHEADER_NWORDS,
        }
    }

    pub fn copper_header_nwords(&self) -> usize {
        match self {
            Self::Copper => SIZE_COPPER_HEADER,
            Self::Pcie40 => 0,
        }
    }

    pub fn copper_trailer_nwords(&self) -> usize {
        match self {
            Self::Copper => SIZE_COPPER_TRAILER,
            Self::Pcie40 => 0,
        }
    }

    pub fn raw_trailer_nwords(&self) -> usize {
        RAWTRAILER_NWORDS
    }

    /// Maximum number of FINESSE/link channels in one block
    pub fn max_channels(&self) -> usize {
        match self {
            Self::Copper => MAX_COPPER_CH,
            Self::Pcie40 => MAX_PCIE40_CH,
        }
    }

    /// Words of a block which are not channel data
    pub fn fixed_overhead_nwords(&self) -> usize {
        self.raw_header_nwords()
            + self.copper_header_nwords()
            + self.copper_trailer_nwords()
            + self.raw_trailer_nwords()
    }

    pub fn has_copper_regions(&self) -> bool {
        matches!(self, Self::Copper)
    }
}

impl Display for FormatVersion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Copper => write!(f, "COPPER"),
            Self::Pcie40 => write!(f, "PCIe40"),
        }
    }
}

impl FromStr for FormatVersion {
    type Err = ConfigError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "copper" => Ok(Self::Copper),
            "pcie40" => Ok(Self::Pcie40),
            _ => Err(ConfigError::BadFormat(s.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_overheads() {
        // 12 header + 13 COPPER header + 3 COPPER trailer + 2 trailer
        assert_eq!(FormatVersion::Copper.fixed_overhead_nwords(), 30);
        assert_eq!(FormatVersion::Pcie40.fixed_overhead_nwords(), 58);
    }

    #[test]
    fn test_from_str() {
        assert_eq!(
            FormatVersion::from_str("PCIe40").unwrap(),
            FormatVersion::Pcie40
        );
        assert_eq!(
            FormatVersion::from_str("copper").unwrap(),
            FormatVersion::Copper
        );
        assert!(FormatVersion::from_str("belle1").is_err());
    }
}
