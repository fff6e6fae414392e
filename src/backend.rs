//! The inference collaborator.
//!
//! A backend turns a decoded image into raw detections in whatever shape it
//! natively produces. It is opaque to the rest of the crate and is never
//! assumed to be safe for concurrent use: [`InferenceBackend::infer`] takes
//! `&mut self`, and the pipeline serializes calls behind a lock.

use image::RgbImage;
use serde::Deserialize;
use thiserror::Error;

use crate::detection::Point;
use crate::normalize::{RawDetection, RawInstance};

type BoxedSource = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Opaque failure reported by a backend.
#[derive(Debug, Error)]
#[error("{message}")]
pub struct BackendError {
    message: String,
    #[source]
    source: Option<BoxedSource>,
}

impl BackendError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            source: None,
        }
    }

    pub fn with_source(message: impl Into<String>, source: impl Into<BoxedSource>) -> Self {
        Self {
            message: message.into(),
            source: Some(source.into()),
        }
    }

    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }
}

pub trait InferenceBackend: Send {
    /// Runs the model once. No retries happen above this call.
    ///
    /// # Errors
    ///
    /// Returns error if the model could not produce a result for `image`.
    fn infer(&mut self, image: &RgbImage) -> Result<Vec<RawDetection>, BackendError>;
}

impl<F> InferenceBackend for F
where
    F: FnMut(&RgbImage) -> Result<Vec<RawDetection>, BackendError> + Send,
{
    fn infer(&mut self, image: &RgbImage) -> Result<Vec<RawDetection>, BackendError> {
        self(image)
    }
}

// ============================================================================
// Flat prediction records (hosted-API backends)
// ============================================================================

#[derive(Debug, Deserialize)]
struct PredictionRecord {
    x: f64,
    y: f64,
    width: f64,
    height: f64,
    confidence: f64,
    #[serde(rename = "class", default)]
    class_name: String,
    #[serde(default)]
    class_id: i64,
    #[serde(default)]
    points: Option<Vec<Point>>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum PredictionPayload {
    Wrapped { predictions: Vec<PredictionRecord> },
    Bare(Vec<PredictionRecord>),
}

impl From<PredictionRecord> for RawDetection {
    fn from(r: PredictionRecord) -> Self {
        let instance = RawInstance {
            x: r.x,
            y: r.y,
            width: r.width,
            height: r.height,
            confidence: r.confidence,
            class_name: r.class_name,
            class_id: r.class_id,
        };
        match r.points {
            Some(points) => RawDetection::Polygon {
                instance,
                contours: vec![points],
            },
            None => RawDetection::BoxOnly(instance),
        }
    }
}

/// Decodes a JSON list of flat prediction records, bare or wrapped in a
/// `{"predictions": [...]}` object. Records carrying `points` become polygon
/// detections, the rest box-only ones.
///
/// # Errors
///
/// Returns error if `json` does not match either layout.
pub fn parse_prediction_records(json: &str) -> Result<Vec<RawDetection>, BackendError> {
    let payload: PredictionPayload = serde_json::from_str(json)
        .map_err(|e| BackendError::with_source("malformed prediction payload", e))?;

    let records = match payload {
        PredictionPayload::Wrapped { predictions } => predictions,
        PredictionPayload::Bare(records) => records,
    };

    Ok(records.into_iter().map(RawDetection::from).collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wrapped_records_keep_order_and_shape() {
        let json = r#"{"predictions": [
            {"x": 1, "y": 2, "width": 3, "height": 4, "confidence": 0.9, "class": "water", "class_id": 0,
             "points": [{"x": 1, "y": 2}, {"x": 4, "y": 2}, {"x": 4, "y": 6}]},
            {"x": 5, "y": 6, "width": 7, "height": 8, "confidence": 0.4, "class": "water", "class_id": 0}
        ]}"#;
        let raws = parse_prediction_records(json).unwrap();

        assert_eq!(raws.len(), 2);
        match &raws[0] {
            RawDetection::Polygon { instance, contours } => {
                assert_eq!(instance.class_name, "water");
                assert_eq!(contours.len(), 1);
                assert_eq!(contours[0][1], Point::new(4.0, 2.0));
            }
            other => panic!("expected polygon, got {other:?}"),
        }
        assert!(matches!(&raws[1], RawDetection::BoxOnly(inst) if inst.x == 5.0));
    }

    #[test]
    fn bare_array_is_accepted() {
        let json = r#"[{"x": 0, "y": 0, "width": 1, "height": 1, "confidence": 1.5}]"#;
        let raws = parse_prediction_records(json).unwrap();
        assert_eq!(raws.len(), 1);
        assert_eq!(raws[0].instance().class_id, 0);
        assert_eq!(raws[0].instance().confidence, 1.5);
    }

    #[test]
    fn malformed_payload_is_a_backend_error() {
        let err = parse_prediction_records(r#"{"detections": 3}"#).unwrap_err();
        assert_eq!(err.message(), "malformed prediction payload");
        assert!(std::error::Error::source(&err).is_some());
    }

    #[test]
    fn closures_act_as_backends() {
        let mut calls = 0;
        let mut backend = |_: &RgbImage| -> Result<Vec<RawDetection>, BackendError> {
            calls += 1;
            Ok(Vec::new())
        };
        let img = RgbImage::new(2, 2);
        assert!(backend.infer(&img).unwrap().is_empty());
        assert!(backend.infer(&img).unwrap().is_empty());
        assert_eq!(calls, 2);
    }
}
