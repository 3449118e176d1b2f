use serde::{Deserialize, Serialize};

use crate::error::IngestError;
use crate::splitter::SplitterConfig;

pub const DEFAULT_CHUNK_SIZE: usize = 1000;
pub const DEFAULT_CHUNK_OVERLAP: usize = 100;

/// Options bag shared by every handler's extraction call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtractOptions {
    pub chunk_size: usize,
    pub chunk_overlap: usize,
    #[serde(alias = "preserve_paragraphs")]
    pub preserve_structure: bool,
    /// Text decoding override, as a WHATWG encoding label.
    pub encoding: Option<String>,
}

impl Default for ExtractOptions {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            chunk_overlap: DEFAULT_CHUNK_OVERLAP,
            preserve_structure: true,
            encoding: None,
        }
    }
}

impl ExtractOptions {
    #[must_use]
    pub fn with_chunking(mut self, chunk_size: usize, chunk_overlap: usize) -> Self {
        self.chunk_size = chunk_size;
        self.chunk_overlap = chunk_overlap;
        self
    }

    #[must_use]
    pub fn with_encoding(mut self, label: impl Into<String>) -> Self {
        self.encoding = Some(label.into());
        self
    }

    /// # Errors
    ///
    /// Returns [`IngestError::InvalidOptions`] when `chunk_size` is zero or
    /// `chunk_overlap` is not smaller than `chunk_size`.
    pub fn validate(&self) -> Result<(), IngestError> {
        if self.chunk_size == 0 {
            return Err(IngestError::InvalidOptions(
                "chunk_size must be positive".into(),
            ));
        }
        if self.chunk_overlap >= self.chunk_size {
            return Err(IngestError::InvalidOptions(format!(
                "chunk_overlap ({}) must be smaller than chunk_size ({})",
                self.chunk_overlap, self.chunk_size
            )));
        }
        Ok(())
    }

    /// Splitter settings for paragraph-preserving chunking.
    #[must_use]
    pub fn splitter(&self) -> SplitterConfig {
        SplitterConfig {
            chunk_size: self.chunk_size,
            chunk_overlap: self.chunk_overlap,
            preserve_paragraphs: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let opts = ExtractOptions::default();
        assert_eq!(opts.chunk_size, 1000);
        assert_eq!(opts.chunk_overlap, 100);
        assert!(opts.preserve_structure);
        assert!(opts.encoding.is_none());
        assert!(opts.validate().is_ok());
    }

    #[test]
    fn zero_chunk_size_rejected() {
        let opts = ExtractOptions::default().with_chunking(0, 0);
        assert!(matches!(
            opts.validate(),
            Err(IngestError::InvalidOptions(_))
        ));
    }

    #[test]
    fn overlap_must_be_smaller() {
        let opts = ExtractOptions::default().with_chunking(100, 100);
        let err = opts.validate().unwrap_err();
        assert!(err.to_string().contains("chunk_overlap"));
        assert!(ExtractOptions::default().with_chunking(100, 99).validate().is_ok());
    }

    #[test]
    fn deserialize_accepts_paragraph_alias() {
        let opts: ExtractOptions =
            serde_json::from_str(r#"{"chunk_size": 500, "preserve_paragraphs": false}"#).unwrap();
        assert_eq!(opts.chunk_size, 500);
        assert_eq!(opts.chunk_overlap, 100);
        assert!(!opts.preserve_structure);
    }

    #[test]
    fn splitter_config_always_preserves_paragraphs() {
        let mut opts = ExtractOptions::default().with_encoding("latin1");
        opts.preserve_structure = false;
        let cfg = opts.splitter();
        assert!(cfg.preserve_paragraphs);
        assert_eq!(cfg.chunk_size, 1000);
        assert_eq!(opts.encoding.as_deref(), Some("latin1"));
    }
}
