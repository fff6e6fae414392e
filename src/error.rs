use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::backend::BackendError;

#[derive(Debug, Error)]
pub enum SegmentationError {
    #[error("non-finite value in `{field}` of detection {index}")]
    Validation { index: usize, field: &'static str },

    #[error("failed to decode image: {source}")]
    ImageDecode {
        #[from]
        source: image::ImageError,
    },

    #[error("no image supplied")]
    EmptyInput,

    #[error("input too large: {size} bytes, max {max_size}")]
    InputTooLarge { size: usize, max_size: usize },

    #[error("image too large: {width}x{height} = {pixels} pixels, max {max_pixels}")]
    ImageTooLarge {
        width: u32,
        height: u32,
        pixels: u64,
        max_pixels: u64,
    },

    #[error("unsupported image format")]
    UnsupportedFormat,

    #[error("image encoding failed: format={format:?}, reason={reason}")]
    Encode {
        format: image::ImageFormat,
        reason: String,
    },

    #[error("inference backend failed: {0}")]
    Backend(#[from] BackendError),
}

impl SegmentationError {
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::Validation { .. } => ErrorKind::Validation,
            Self::ImageDecode { .. } => ErrorKind::ImageDecode,
            Self::EmptyInput => ErrorKind::EmptyInput,
            Self::InputTooLarge { .. } | Self::ImageTooLarge { .. } => ErrorKind::ImageTooLarge,
            Self::UnsupportedFormat => ErrorKind::ImageFormatUnsupported,
            Self::Encode { .. } => ErrorKind::Encode,
            Self::Backend(_) => ErrorKind::Backend,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorKind {
    Validation,
    ImageDecode,
    EmptyInput,
    ImageTooLarge,
    ImageFormatUnsupported,
    Encode,
    Backend,
}

impl ErrorKind {
    #[must_use]
    pub const fn code(self) -> &'static str {
        match self {
            Self::Validation => "VALIDATION_ERROR",
            Self::ImageDecode => "IMAGE_DECODE_ERROR",
            Self::EmptyInput => "EMPTY_INPUT",
            Self::ImageTooLarge => "IMAGE_TOO_LARGE",
            Self::ImageFormatUnsupported => "IMAGE_FORMAT_UNSUPPORTED",
            Self::Encode => "IMAGE_ENCODE_ERROR",
            Self::Backend => "BACKEND_ERROR",
        }
    }

    /// Status the serving layer should answer with.
    #[must_use]
    pub const fn http_status_hint(self) -> u16 {
        match self {
            Self::Validation
            | Self::ImageDecode
            | Self::EmptyInput
            | Self::ImageFormatUnsupported => 400,
            Self::ImageTooLarge => 413,
            Self::Backend => 502,
            Self::Encode => 500,
        }
    }
}

/// A per-image error with the offending image's identifier attached.
#[derive(Debug, Error)]
#[error("{image}: {error}")]
pub struct ImageFailure {
    pub image: String,
    #[source]
    pub error: SegmentationError,
}

impl ImageFailure {
    pub fn new(image: impl Into<String>, error: SegmentationError) -> Self {
        Self {
            image: image.into(),
            error,
        }
    }

    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        self.error.kind()
    }
}
