use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::{Error, Result};

const MAX_TABLE_NAME_BYTES: usize = 128;

/// Compression applied to newly written files.
///
/// Each stored row records whether it was compressed, so changing this
/// setting never affects how existing files are read back.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Compression {
    #[default]
    #[serde(alias = "off")]
    None,
    #[serde(alias = "low")]
    Fast,
    #[serde(alias = "medium")]
    Default,
    #[serde(alias = "high")]
    Best,
}

impl Compression {
    /// zlib level for this preset, `None` when compression is disabled.
    pub fn level(self) -> Option<u32> {
        match self {
            Compression::None => None,
            Compression::Fast => Some(1),
            Compression::Default => Some(6),
            Compression::Best => Some(9),
        }
    }

    pub fn is_enabled(self) -> bool {
        !matches!(self, Compression::None)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Compression::None => "none",
            Compression::Fast => "fast",
            Compression::Default => "default",
            Compression::Best => "best",
        }
    }

    pub const ALL: [Compression; 4] = [
        Compression::None,
        Compression::Fast,
        Compression::Default,
        Compression::Best,
    ];
}

impl fmt::Display for Compression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Compression {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "none" | "off" => Ok(Compression::None),
            "fast" | "low" => Ok(Compression::Fast),
            "default" | "medium" => Ok(Compression::Default),
            "best" | "high" => Ok(Compression::Best),
            other => Err(Error::InvalidArgument(format!(
                "unknown compression preset: {other:?}"
            ))),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case", deny_unknown_fields)]
pub enum BlobExtractorConfig {
    Direct,
    #[default]
    MemoryBuffered,
    FileBuffered {
        /// Where buffer files are created; the OS temp dir when unset.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        buffer_dir: Option<PathBuf>,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StoreConfig {
    pub table_name: String,
    #[serde(default)]
    pub compression: Compression,
    #[serde(default)]
    pub blob_extractor: BlobExtractorConfig,
}

impl StoreConfig {
    pub fn new(table_name: impl Into<String>) -> Self {
        Self {
            table_name: table_name.into(),
            compression: Compression::default(),
            blob_extractor: BlobExtractorConfig::default(),
        }
    }

    pub fn validate(&self) -> Result<()> {
        validate_table_name(&self.table_name)
    }
}

pub fn validate_table_name(table_name: &str) -> Result<()> {
    if table_name.trim().is_empty() {
        return Err(Error::InvalidArgument("table_name is empty".to_string()));
    }
    if table_name.len() > MAX_TABLE_NAME_BYTES {
        return Err(Error::InvalidArgument(format!(
            "table_name is too large ({} bytes; max {} bytes)",
            table_name.len(),
            MAX_TABLE_NAME_BYTES
        )));
    }
    if table_name.contains('\0') {
        return Err(Error::InvalidArgument(
            "table_name must not contain NUL bytes".to_string(),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn compression_levels() {
        assert_eq!(Compression::None.level(), None);
        assert_eq!(Compression::Fast.level(), Some(1));
        assert_eq!(Compression::Default.level(), Some(6));
        assert_eq!(Compression::Best.level(), Some(9));
    }

    #[test]
    fn compression_parses_aliases() {
        assert_eq!("HIGH".parse::<Compression>().unwrap(), Compression::Best);
        assert_eq!(" low ".parse::<Compression>().unwrap(), Compression::Fast);
        assert_eq!("medium".parse::<Compression>().unwrap(), Compression::Default);
        assert!("zstd".parse::<Compression>().is_err());
    }

    #[test]
    fn config_defaults_from_json() {
        let config: StoreConfig = serde_json::from_str(r#"{"table_name":"storage"}"#).unwrap();
        assert_eq!(config.compression, Compression::None);
        assert_eq!(config.blob_extractor, BlobExtractorConfig::MemoryBuffered);
        config.validate().unwrap();
    }

    #[test]
    fn config_parses_file_buffered_extractor() {
        let config: StoreConfig = serde_json::from_str(
            r#"{
                "table_name": "storage",
                "compression": "best",
                "blob_extractor": {"kind": "file_buffered", "buffer_dir": "/var/tmp/blobs"}
            }"#,
        )
        .unwrap();
        assert_eq!(config.compression, Compression::Best);
        assert_eq!(
            config.blob_extractor,
            BlobExtractorConfig::FileBuffered {
                buffer_dir: Some(PathBuf::from("/var/tmp/blobs"))
            }
        );
    }

    #[test]
    fn config_rejects_unknown_fields() {
        let err = serde_json::from_str::<StoreConfig>(r#"{"table_name":"t","cache":true}"#);
        assert!(err.is_err());
    }

    #[test]
    fn validate_rejects_bad_table_names() {
        assert!(StoreConfig::new("").validate().is_err());
        assert!(StoreConfig::new("   ").validate().is_err());
        assert!(StoreConfig::new("a\0b").validate().is_err());
        assert!(StoreConfig::new("x".repeat(200)).validate().is_err());
        StoreConfig::new("my \"odd\" table").validate().unwrap();
    }
}
