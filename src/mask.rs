//! Per-instance raw activation buffers and their conversion into binary
//! pixel masks at the source image resolution.

use ndarray::Array2;

/// A resized activation must be strictly greater than this to count as "on".
pub const MASK_THRESHOLD: f32 = 0.5;

/// Floating-point activation grid for one instance, pre-binarization.
///
/// Stored row-major as `(height, width)`. Dimensions are independent of the
/// source image and of other instances' buffers.
#[derive(Debug, Clone, PartialEq)]
pub struct RawMaskBuffer {
    data: Array2<f32>,
}

impl RawMaskBuffer {
    pub fn new(data: Array2<f32>) -> Self {
        Self { data }
    }

    /// Builds a buffer from row-major values.
    ///
    /// # Errors
    ///
    /// Returns error if `values.len() != width * height`.
    pub fn from_shape_vec(
        width: usize,
        height: usize,
        values: Vec<f32>,
    ) -> Result<Self, ndarray::ShapeError> {
        Array2::from_shape_vec((height, width), values).map(Self::new)
    }

    pub fn filled(width: usize, height: usize, value: f32) -> Self {
        Self::new(Array2::from_elem((height, width), value))
    }

    #[must_use]
    pub fn width(&self) -> usize {
        self.data.ncols()
    }

    #[must_use]
    pub fn height(&self) -> usize {
        self.data.nrows()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Bilinear resample to `width` x `height`.
    ///
    /// Uses pixel-center alignment with edge clamping, so a 2x upscale of a
    /// hard edge produces a 0.75 / 0.25 ramp across it.
    #[must_use]
    pub fn resized(&self, width: usize, height: usize) -> Array2<f32> {
        if self.is_empty() {
            return Array2::zeros((height, width));
        }
        if self.width() == width && self.height() == height {
            return self.data.clone();
        }

        let rows = axis_samples(self.height(), height);
        let cols = axis_samples(self.width(), width);
        let src = &self.data;

        Array2::from_shape_fn((height, width), |(y, x)| {
            let sy = rows[y];
            let sx = cols[x];
            let top = lerp(src[[sy.lo, sx.lo]], src[[sy.lo, sx.hi]], sx.frac);
            let bottom = lerp(src[[sy.hi, sx.lo]], src[[sy.hi, sx.hi]], sx.frac);
            lerp(top, bottom, sy.frac)
        })
    }

    /// Binary mask at `width` x `height`, resizing first when dimensions differ.
    ///
    /// Non-finite activations are never "on".
    #[must_use]
    pub fn binarize(&self, width: usize, height: usize) -> Array2<bool> {
        self.resized(width, height).mapv(|v| v > MASK_THRESHOLD)
    }
}

impl From<Array2<f32>> for RawMaskBuffer {
    fn from(data: Array2<f32>) -> Self {
        Self::new(data)
    }
}

#[derive(Debug, Clone, Copy)]
struct AxisSample {
    lo: usize,
    hi: usize,
    frac: f32,
}

/// Source neighbours and blend weight for every destination index on one axis.
fn axis_samples(src_len: usize, dst_len: usize) -> Vec<AxisSample> {
    let scale = src_len as f64 / dst_len.max(1) as f64;
    let last = src_len - 1;

    (0..dst_len)
        .map(|d| {
            let pos = ((d as f64 + 0.5) * scale - 0.5).max(0.0);
            let lo = (pos.floor() as usize).min(last);
            if lo >= last {
                AxisSample { lo: last, hi: last, frac: 0.0 }
            } else {
                AxisSample {
                    lo,
                    hi: lo + 1,
                    frac: (pos - lo as f64) as f32,
                }
            }
        })
        .collect()
}

#[inline]
fn lerp(a: f32, b: f32, t: f32) -> f32 {
    a + (b - a) * t
}
