use std::path::Path;

use anyhow::{Context, Result};

/// How binary mappings are keyed when they are pooled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum MappingKeyPolicy {
    /// Key on the exact start address, limit address and file offset.
    #[default]
    Exact,
    /// Key on the mapping size rounded up to a 4 KiB boundary and the file offset, so that the
    /// same binary loaded at different (randomized) base addresses collapses to one entry. The
    /// pooled entry keeps the start and limit of the first capture that introduced it.
    RoundedSize,
}

/// A configuration bundle for a merge session and the codec shell
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// How mappings are keyed in the mapping pool. Default: `exact`.
    pub mapping_key: MappingKeyPolicy,
    /// gzip level used by `write_compressed`, from 0 (store) to 9 (best). Default: `6`.
    pub compression_level: u32,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            mapping_key: MappingKeyPolicy::Exact,
            compression_level: flate2::Compression::default().level(),
        }
    }
}

impl Config {
    /// Loads a configuration from a JSON file. Missing fields take their default values.
    pub fn from_json_file(path: &Path) -> Result<Config> {
        let file = std::fs::File::open(path)
            .context(format!("Failed to open config file {}", path.display()))?;
        let config = serde_json::from_reader(std::io::BufReader::new(file))
            .context(format!("Failed to parse config file {}", path.display()))?;
        Ok(config)
    }

    pub fn compression(&self) -> flate2::Compression {
        flate2::Compression::new(self.compression_level.min(9))
    }
}
