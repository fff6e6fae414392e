//! Conversion of backend-specific raw detections into the canonical schema.
//!
//! Backends disagree on what they return per instance: some give explicit
//! contour points, some a raw probability buffer, some only a box. Each shape
//! is a variant of [`RawDetection`] carrying exactly the fields that backend
//! guarantees, and [`normalize`] matches on it exhaustively.

use tracing::{debug, instrument};

use crate::detection::{BoundingBox, Detection, ImageResult, Point};
use crate::error::SegmentationError;
use crate::mask::RawMaskBuffer;

/// Minimum contour length for an explicit polygon to be kept.
pub const MIN_POLYGON_POINTS: usize = 3;

/// Fields every backend supplies for every instance.
#[derive(Debug, Clone, PartialEq)]
pub struct RawInstance {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
    pub confidence: f64,
    pub class_name: String,
    pub class_id: i64,
}

/// One raw detection as emitted by a backend.
#[derive(Debug, Clone, PartialEq)]
pub enum RawDetection {
    /// Explicit contours; the first one is the outermost.
    Polygon {
        instance: RawInstance,
        contours: Vec<Vec<Point>>,
    },
    /// Per-instance probability buffer, no contour.
    MaskBuffer {
        instance: RawInstance,
        mask: RawMaskBuffer,
    },
    /// Box, class and confidence only.
    BoxOnly(RawInstance),
}

impl RawDetection {
    #[must_use]
    pub fn instance(&self) -> &RawInstance {
        match self {
            Self::Polygon { instance, .. } | Self::MaskBuffer { instance, .. } => instance,
            Self::BoxOnly(instance) => instance,
        }
    }
}

/// Normalizes one image's raw detections, preserving emission order.
///
/// Out-of-range but finite values are clamped, never rejected.
///
/// # Errors
///
/// Returns [`SegmentationError::Validation`] if any box coordinate, the
/// confidence, or a point of the used contour is NaN or infinite.
#[instrument(skip(detections), fields(count = detections.len()))]
pub fn normalize(
    image: &str,
    detections: &[RawDetection],
) -> Result<ImageResult, SegmentationError> {
    let predictions = detections
        .iter()
        .enumerate()
        .map(|(index, raw)| normalize_one(index, raw))
        .collect::<Result<Vec<_>, _>>()?;

    debug!(
        predictions = predictions.len(),
        with_polygon = predictions.iter().filter(|d| d.points.is_some()).count(),
        "normalized detections"
    );

    Ok(ImageResult {
        image: basename(image).to_owned(),
        predictions,
    })
}

fn normalize_one(index: usize, raw: &RawDetection) -> Result<Detection, SegmentationError> {
    let inst = raw.instance();

    for (field, value) in [
        ("x", inst.x),
        ("y", inst.y),
        ("width", inst.width),
        ("height", inst.height),
        ("confidence", inst.confidence),
    ] {
        require_finite(index, field, value)?;
    }

    // A box hanging off the top/left edge is cropped, not shifted.
    let x = inst.x.max(0.0);
    let y = inst.y.max(0.0);
    let bbox = BoundingBox {
        x,
        y,
        width: ((inst.x + inst.width.max(0.0)) - x).max(0.0),
        height: ((inst.y + inst.height.max(0.0)) - y).max(0.0),
    };
    let class_id = clamp_class_id(inst.class_id);

    let points = match raw {
        RawDetection::Polygon { contours, .. } => match contours.first() {
            Some(outer) => {
                for p in outer {
                    require_finite(index, "points", p.x)?;
                    require_finite(index, "points", p.y)?;
                }
                if outer.len() >= MIN_POLYGON_POINTS {
                    Some(outer.clone())
                } else {
                    Some(bbox.corners())
                }
            }
            None => Some(bbox.corners()),
        },
        RawDetection::MaskBuffer { .. } => None,
        RawDetection::BoxOnly(_) => Some(bbox.corners()),
    };

    Ok(Detection {
        bbox,
        confidence: inst.confidence.clamp(0.0, 1.0),
        class_name: inst.class_name.clone(),
        class_id,
        detection_id: detection_id(index, class_id),
        points,
    })
}

/// Deterministic id from position and class.
#[must_use]
pub fn detection_id(index: usize, class_id: u32) -> String {
    format!("{index}_{class_id}")
}

fn clamp_class_id(raw: i64) -> u32 {
    u32::try_from(raw.max(0)).unwrap_or(u32::MAX)
}

fn require_finite(index: usize, field: &'static str, value: f64) -> Result<(), SegmentationError> {
    if value.is_finite() {
        Ok(())
    } else {
        Err(SegmentationError::Validation { index, field })
    }
}

/// Final path component, accepting either separator.
#[must_use]
pub fn basename(path: &str) -> &str {
    path.rsplit(['/', '\\']).next().unwrap_or(path)
}
