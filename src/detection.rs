use serde::{Deserialize, Serialize};

/// Image-space pixel coordinate, origin top-left.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    #[must_use]
    pub const fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

/// Axis-aligned box: top-left corner plus extent, all non-negative.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl BoundingBox {
    /// Corners clockwise from top-left.
    #[must_use]
    pub fn corners(&self) -> Vec<Point> {
        let right = self.x + self.width;
        let bottom = self.y + self.height;
        vec![
            Point::new(self.x, self.y),
            Point::new(right, self.y),
            Point::new(right, bottom),
            Point::new(self.x, bottom),
        ]
    }
}

/// One recognized instance in the canonical schema.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[must_use]
pub struct Detection {
    #[serde(flatten)]
    pub bbox: BoundingBox,
    /// Always within [0.0, 1.0]
    pub confidence: f64,
    #[serde(rename = "class")]
    pub class_name: String,
    pub class_id: u32,
    /// `"<local_index>_<class_id>"`, unique within its image
    pub detection_id: String,
    /// Outer contour with at least three points. Absent for mask-only
    /// detections, whose shape lives in the raw buffer.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub points: Option<Vec<Point>>,
}

impl Detection {
    /// Polygon outline, falling back to the box corners when no contour exists.
    #[must_use]
    pub fn outline(&self) -> Vec<Point> {
        match &self.points {
            Some(points) => points.clone(),
            None => self.bbox.corners(),
        }
    }
}

/// Detections for a single image, in backend emission order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[must_use]
pub struct ImageResult {
    /// Basename only, never a path
    pub image: String,
    pub predictions: Vec<Detection>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[must_use]
pub struct BatchResponse {
    pub results: Vec<ImageResult>,
}
