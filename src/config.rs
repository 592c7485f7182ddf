/// LiveBuffer Configuration
///
/// `BufferConfig` tunes how views fetch and store rows. It deserializes from
/// JSON with every key optional.
///
/// # Examples
///
/// ```
/// use livebuffer::{BufferConfig, StorageHint};
///
/// let config = BufferConfig::from_json(r#"{"request_size": 40, "storage": "fast_reads"}"#).unwrap();
/// assert_eq!(config.request_size, 40);
/// assert_eq!(config.bucket_page_size, 20);
/// assert_eq!(config.storage, StorageHint::FastReads);
/// ```

use crate::error::{Error, Result};
use crate::range::VisibleRange;
use serde::{Deserialize, Serialize};

/// Hint for selecting the slot storage strategy of a buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StorageHint {
    /// Contiguous array. O(1) access, O(N) insert/delete in the middle.
    /// Fine for small tables.
    FastReads,

    /// Tiered vector. O(√N) insert/delete anywhere. Suited to large sparse
    /// buffers that receive creates and deletes at arbitrary positions.
    #[default]
    FastUpdates,
}

impl StorageHint {
    /// Accepts: "fast_reads", "fast_updates"
    pub fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "fast_reads" | "fastreads" => Ok(StorageHint::FastReads),
            "fast_updates" | "fastupdates" => Ok(StorageHint::FastUpdates),
            _ => Err(Error::Config(format!(
                "Unknown storage hint: '{}'. Use 'fast_reads' or 'fast_updates'",
                s
            ))),
        }
    }

    pub(crate) fn use_tiered_vector(&self) -> bool {
        matches!(self, StorageHint::FastUpdates)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BufferConfig {
    /// Ideal number of rows per range request.
    pub request_size: usize,
    /// Page size for bucket initial loads and fetch-more.
    pub bucket_page_size: usize,
    pub storage: StorageHint,
    /// Window assumed before the rendering layer reports one.
    pub initial_window: VisibleRange,
}

impl Default for BufferConfig {
    fn default() -> Self {
        BufferConfig {
            request_size: 100,
            bucket_page_size: 20,
            storage: StorageHint::default(),
            initial_window: VisibleRange::new(0, 99),
        }
    }
}

impl BufferConfig {
    pub fn from_json(json: &str) -> Result<Self> {
        let config: BufferConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.request_size == 0 {
            return Err(Error::Config("request_size must be greater than 0".to_string()));
        }
        if self.bucket_page_size == 0 {
            return Err(Error::Config(
                "bucket_page_size must be greater than 0".to_string(),
            ));
        }
        if self.initial_window.start > self.initial_window.end {
            return Err(Error::Config(format!(
                "initial_window start {} is after end {}",
                self.initial_window.start, self.initial_window.end
            )));
        }
        Ok(())
    }

    pub fn with_request_size(mut self, request_size: usize) -> Self {
        self.request_size = request_size;
        self
    }

    pub fn with_bucket_page_size(mut self, bucket_page_size: usize) -> Self {
        self.bucket_page_size = bucket_page_size;
        self
    }

    pub fn with_storage(mut self, storage: StorageHint) -> Self {
        self.storage = storage;
        self
    }

    pub fn with_initial_window(mut self, window: VisibleRange) -> Self {
        self.initial_window = window;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_storage_hint_from_str() {
        assert_eq!(StorageHint::from_str("fast_reads").unwrap(), StorageHint::FastReads);
        assert_eq!(StorageHint::from_str("FastUpdates").unwrap(), StorageHint::FastUpdates);
        assert!(StorageHint::from_str("fast").is_err());
    }

    #[test]
    fn test_empty_json_uses_defaults() {
        let config = BufferConfig::from_json("{}").unwrap();
        assert_eq!(config, BufferConfig::default());
    }

    #[test]
    fn test_zero_request_size_rejected() {
        let err = BufferConfig::from_json(r#"{"request_size": 0}"#).unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn test_malformed_json_is_json_error() {
        let err = BufferConfig::from_json("{not json").unwrap_err();
        assert!(matches!(err, Error::Json(_)));
    }
}
