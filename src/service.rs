use std::io;
use std::sync::Arc;
use std::time::Instant;

use metrics::{counter, histogram};
use thiserror::Error;
use tokio::sync::Semaphore;
use tracing::{instrument, warn};

use crate::backend::InferenceBackend;
use crate::config::ServiceConfig;
use crate::detection::BatchResponse;
use crate::error::ImageFailure;
use crate::image_io::{extension_of, media_type, segmented_file_name};
use crate::normalize::basename;
use crate::pipeline::{BatchOutcome, Segmenter};
use crate::upload::{TempFile, UploadArea, UploadRejection, UploadValidator, UploadedFile};

#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("upload rejected: {0}")]
    Rejected(#[from] UploadRejection),

    #[error("failed to stage upload: {0}")]
    Staging(#[from] io::Error),

    #[error("segmentation failed: {0}")]
    Segmentation(#[from] ImageFailure),

    #[error("service overloaded, try again later")]
    Overloaded,

    #[error("segmentation worker stopped unexpectedly")]
    Worker,
}

/// Rendered overlay ready to hand back to a client.
#[derive(Debug, Clone)]
pub struct RenderedUpload {
    pub file_name: String,
    pub media_type: String,
    pub bytes: Vec<u8>,
}

/// Async front for the serving layer.
///
/// Uploads are validated, staged as request-scoped temp files and processed
/// on the blocking pool. At most `max_concurrent_ops` requests run at once;
/// beyond that calls fail fast with [`ServiceError::Overloaded`].
pub struct SegmentationService<B> {
    segmenter: Arc<Segmenter<B>>,
    validator: UploadValidator,
    uploads: UploadArea,
    semaphore: Arc<Semaphore>,
}

impl<B: InferenceBackend + 'static> SegmentationService<B> {
    pub fn new(backend: B, config: ServiceConfig) -> Self {
        Self {
            segmenter: Arc::new(Segmenter::new(backend, config.segmenter)),
            validator: UploadValidator::new(&config.allowed_extensions),
            uploads: UploadArea::new(config.upload_dir),
            semaphore: Arc::new(Semaphore::new(config.max_concurrent_ops)),
        }
    }

    /// Segments every upload; failing images are returned separately instead
    /// of aborting the request.
    ///
    /// # Errors
    ///
    /// Returns error if the upload set is rejected, staging fails, or the
    /// service is saturated.
    #[instrument(skip_all, fields(files = files.len()))]
    pub async fn segment_uploads(
        &self,
        files: Vec<UploadedFile>,
    ) -> Result<(BatchResponse, Vec<ImageFailure>), ServiceError> {
        let start = Instant::now();
        counter!("segment.requests").increment(1);

        self.validator.validate(&files)?;
        let _permit = self.acquire()?;
        let staged = self.stage(&files)?;

        let segmenter = Arc::clone(&self.segmenter);
        let result = tokio::task::spawn_blocking(move || -> io::Result<BatchOutcome> {
            let mut items = Vec::with_capacity(staged.len());
            for (name, file) in &staged {
                items.push((name.clone(), file.read()?));
            }
            Ok(segmenter.segment_batch(items))
        })
        .await
        .map_err(|_| ServiceError::Worker)
        .and_then(|r| r.map_err(ServiceError::from));

        histogram!("segment.duration_ms").record(start.elapsed().as_secs_f64() * 1000.0);

        match result {
            Ok(outcome) => Ok(outcome.into_response()),
            Err(e) => {
                counter!("segment.errors").increment(1);
                warn!(error = %e, "segment_uploads failed");
                Err(e)
            }
        }
    }

    /// Segments a single upload and returns the overlay encoded like the input.
    ///
    /// # Errors
    ///
    /// Returns error if the upload is rejected, the service is saturated, or
    /// the image cannot be segmented.
    #[instrument(skip_all, fields(file = %file.file_name, input_size = file.bytes.len()))]
    pub async fn render_upload(&self, file: UploadedFile) -> Result<RenderedUpload, ServiceError> {
        let start = Instant::now();
        counter!("segment.requests").increment(1);

        self.validator.validate(std::slice::from_ref(&file))?;
        let _permit = self.acquire()?;
        let mut staged = self.stage(std::slice::from_ref(&file))?;

        let segmenter = Arc::clone(&self.segmenter);
        let result = tokio::task::spawn_blocking(move || -> Result<Vec<u8>, ServiceError> {
            let (name, temp) = staged.pop().ok_or(ServiceError::Worker)?;
            let bytes = temp.read()?;
            Ok(segmenter.visualize(&name, &bytes)?)
        })
        .await
        .map_err(|_| ServiceError::Worker)
        .and_then(|r| r);

        histogram!("segment.duration_ms").record(start.elapsed().as_secs_f64() * 1000.0);

        match result {
            Ok(bytes) => {
                let ext = extension_of(&file.file_name).unwrap_or_else(|| "png".to_owned());
                Ok(RenderedUpload {
                    file_name: segmented_file_name(&file.file_name),
                    media_type: media_type(&ext),
                    bytes,
                })
            }
            Err(e) => {
                counter!("segment.errors").increment(1);
                warn!(error = %e, "render_upload failed");
                Err(e)
            }
        }
    }

    fn acquire(&self) -> Result<tokio::sync::SemaphorePermit<'_>, ServiceError> {
        self.semaphore.try_acquire().map_err(|_| {
            counter!("segment.rejected").increment(1);
            ServiceError::Overloaded
        })
    }

    /// Persists each upload; the guards delete the files when dropped.
    fn stage(&self, files: &[UploadedFile]) -> io::Result<Vec<(String, TempFile)>> {
        files
            .iter()
            .map(|f| {
                let ext = extension_of(&f.file_name).unwrap_or_default();
                let temp = self.uploads.persist(&ext, &f.bytes)?;
                Ok((basename(&f.file_name).to_owned(), temp))
            })
            .collect()
    }
}
