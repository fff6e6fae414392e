use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Limits applied while decoding a source image.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SegmenterConfig {
    pub max_input_bytes: usize,
    pub max_dimension: u32,
    pub max_alloc_bytes: u64,
    pub max_image_pixels: u64,
}

impl Default for SegmenterConfig {
    fn default() -> Self {
        Self {
            max_input_bytes: 50 * 1024 * 1024,
            max_dimension: 15_000,
            max_alloc_bytes: 512 * 1024 * 1024,
            max_image_pixels: 100_000_000,
        }
    }
}

/// Serving-layer settings.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    /// Where uploads are persisted for the lifetime of a request
    pub upload_dir: PathBuf,
    /// Lower-case, without the dot
    pub allowed_extensions: Vec<String>,
    pub max_concurrent_ops: usize,
    pub segmenter: SegmenterConfig,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            upload_dir: std::env::temp_dir().join("waterseg-uploads"),
            allowed_extensions: ["jpg", "jpeg", "png", "tif", "tiff"]
                .into_iter()
                .map(String::from)
                .collect(),
            max_concurrent_ops: 4,
            segmenter: SegmenterConfig::default(),
        }
    }
}

impl ServiceConfig {
    /// Parses a JSON document; absent keys keep their defaults.
    ///
    /// # Errors
    ///
    /// Returns error if `json` is malformed or a value has the wrong type.
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }
}
