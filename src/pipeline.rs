use std::sync::Mutex;

use image::RgbImage;
use metrics::counter;
use tracing::{debug, instrument, warn};

use crate::backend::{BackendError, InferenceBackend};
use crate::config::SegmenterConfig;
use crate::detection::{BatchResponse, ImageResult};
use crate::error::{ImageFailure, SegmentationError};
use crate::image_io;
use crate::mask::RawMaskBuffer;
use crate::normalize::{basename, normalize, RawDetection};
use crate::render::render_indexed;

/// Runs decode, inference, normalization and rendering for single images.
///
/// # Thread Safety
///
/// The backend is not assumed to tolerate concurrent calls. It is owned by a
/// `Mutex` and every `infer()` runs under the lock, so a `Segmenter` can be
/// shared across threads while inference itself is serialized. Everything
/// outside the lock is pure and runs concurrently.
pub struct Segmenter<B> {
    backend: Mutex<B>,
    config: SegmenterConfig,
}

/// Output of one image: the canonical result plus what is needed to render it.
#[derive(Debug, Clone)]
#[must_use]
pub struct Segmentation {
    pub result: ImageResult,
    pub image: RgbImage,
    /// Raw masks tagged with their detection's index, in emission order
    pub masks: Vec<(usize, RawMaskBuffer)>,
}

impl Segmentation {
    /// Overlay with each mask colored by its detection's position.
    #[must_use]
    pub fn render(&self) -> RgbImage {
        render_indexed(&self.image, self.masks.iter().map(|(i, m)| (*i, m)))
    }

    /// Renders and encodes in the format implied by `ext`.
    ///
    /// # Errors
    ///
    /// Returns error if the codec rejects the rendered image.
    pub fn render_encoded(&self, ext: &str) -> Result<Vec<u8>, SegmentationError> {
        image_io::encode_as(&self.render(), image_io::format_for_extension(ext))
    }
}

impl<B: InferenceBackend> Segmenter<B> {
    pub fn new(backend: B, config: SegmenterConfig) -> Self {
        Self {
            backend: Mutex::new(backend),
            config,
        }
    }

    pub fn with_defaults(backend: B) -> Self {
        Self::new(backend, SegmenterConfig::default())
    }

    /// Segments one encoded image.
    ///
    /// # Errors
    ///
    /// Returns the first decode, backend or validation error, tagged with the
    /// image's basename.
    #[instrument(skip(self, bytes), fields(input_size = bytes.len()))]
    pub fn segment(&self, name: &str, bytes: &[u8]) -> Result<Segmentation, ImageFailure> {
        self.segment_inner(name, bytes)
            .map_err(|e| ImageFailure::new(basename(name), e))
    }

    fn segment_inner(&self, name: &str, bytes: &[u8]) -> Result<Segmentation, SegmentationError> {
        let image = image_io::decode(&self.config, bytes)?;
        let raws = self.infer(&image)?;
        let result = normalize(name, &raws)?;

        let masks: Vec<(usize, RawMaskBuffer)> = raws
            .into_iter()
            .enumerate()
            .filter_map(|(i, raw)| match raw {
                RawDetection::MaskBuffer { mask, .. } => Some((i, mask)),
                RawDetection::Polygon { .. } | RawDetection::BoxOnly(_) => None,
            })
            .collect();

        debug!(
            width = image.width(),
            height = image.height(),
            detections = result.predictions.len(),
            masks = masks.len(),
            "segmentation completed"
        );

        Ok(Segmentation {
            result,
            image,
            masks,
        })
    }

    fn infer(&self, image: &RgbImage) -> Result<Vec<RawDetection>, BackendError> {
        let mut backend = self.backend.lock().unwrap_or_else(|poisoned| {
            warn!("inference backend panicked on an earlier call, reusing it");
            self.backend.clear_poison();
            poisoned.into_inner()
        });
        backend.infer(image)
    }

    /// Segments every item independently, in input order. A failing item
    /// never stops the rest.
    pub fn segment_batch<I, N, D>(&self, items: I) -> BatchOutcome
    where
        I: IntoIterator<Item = (N, D)>,
        N: AsRef<str>,
        D: AsRef<[u8]>,
    {
        let items = items
            .into_iter()
            .map(|(name, bytes)| {
                self.segment(name.as_ref(), bytes.as_ref())
                    .map(|seg| seg.result)
            })
            .collect();

        BatchOutcome { items }
    }

    /// Segments one image and returns the overlay encoded like the input,
    /// judged by the extension of `name` (PNG when it has none).
    ///
    /// # Errors
    ///
    /// Returns any segmentation or encoding error, tagged with the basename.
    pub fn visualize(&self, name: &str, bytes: &[u8]) -> Result<Vec<u8>, ImageFailure> {
        let segmentation = self.segment(name, bytes)?;
        let ext = image_io::extension_of(name).unwrap_or_else(|| "png".to_owned());
        segmentation
            .render_encoded(&ext)
            .map_err(|e| ImageFailure::new(basename(name), e))
    }
}

pub type ImageOutcome = Result<ImageResult, ImageFailure>;

/// Per-item results of a batch, in input order.
#[derive(Debug)]
#[must_use]
pub struct BatchOutcome {
    pub items: Vec<ImageOutcome>,
}

impl BatchOutcome {
    #[must_use]
    pub fn succeeded_count(&self) -> usize {
        self.items.iter().filter(|o| o.is_ok()).count()
    }

    #[must_use]
    pub fn failed_count(&self) -> usize {
        self.items.len() - self.succeeded_count()
    }

    /// Splits into the response for successful images and the failures.
    ///
    /// Every failure is logged and counted.
    pub fn into_response(self) -> (BatchResponse, Vec<ImageFailure>) {
        let mut results = Vec::with_capacity(self.items.len());
        let mut failures = Vec::new();

        for outcome in self.items {
            match outcome {
                Ok(result) => results.push(result),
                Err(failure) => {
                    warn!(
                        image = %failure.image,
                        code = failure.kind().code(),
                        error = %failure.error,
                        "image excluded from batch"
                    );
                    counter!("segment.image_failures").increment(1);
                    failures.push(failure);
                }
            }
        }

        (BatchResponse { results }, failures)
    }
}
