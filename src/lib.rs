//! Water-body segmentation core.
//!
//! Raw, backend-specific detections are normalized into one canonical
//! schema ([`ImageResult`]), and per-instance probability masks are
//! composited onto the source image with a fixed, deterministic palette.
//! Both outputs share the backend's emission order, so the JSON response and
//! the overlay colors always agree.

#![forbid(unsafe_code)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::cast_sign_loss)]
#![allow(clippy::cast_precision_loss)]

pub mod backend;
pub mod config;
pub mod detection;
pub mod error;
pub mod image_io;
pub mod mask;
pub mod normalize;
pub mod palette;
pub mod pipeline;
pub mod render;
pub mod service;
pub mod upload;

pub use backend::{parse_prediction_records, BackendError, InferenceBackend};
pub use config::{SegmenterConfig, ServiceConfig};
pub use detection::{BatchResponse, BoundingBox, Detection, ImageResult, Point};
pub use error::{ErrorKind, ImageFailure, SegmentationError};
pub use mask::{RawMaskBuffer, MASK_THRESHOLD};
pub use normalize::{normalize, RawDetection, RawInstance};
pub use palette::{color_for, RgbColor, PALETTE};
pub use pipeline::{BatchOutcome, ImageOutcome, Segmentation, Segmenter};
pub use render::{blend, render, render_encoded, render_indexed, OVERLAY_ALPHA};
pub use service::{RenderedUpload, SegmentationService, ServiceError};
pub use upload::{TempFile, UploadArea, UploadRejection, UploadValidator, UploadedFile};
