use std::io::Cursor;
use std::path::Path;

use image::{ImageFormat, ImageReader, Limits, RgbImage};

use crate::config::SegmenterConfig;
use crate::error::SegmentationError;
use crate::normalize::basename;

/// Decodes `raw_bytes` into 8-bit RGB, enforcing the configured limits.
///
/// One reader both sniffs the format and decodes under the limits. Whatever
/// the source layout (gray, 16-bit, RGBA), the result is RGB8 with alpha
/// dropped, which is what the backends and the overlay blend consume.
///
/// # Errors
///
/// Returns [`SegmentationError::EmptyInput`] for an empty buffer, a size or
/// format error when a guard trips, or [`SegmentationError::ImageDecode`] when
/// the bytes are not a readable raster image.
pub fn decode(config: &SegmenterConfig, raw_bytes: &[u8]) -> Result<RgbImage, SegmentationError> {
    if raw_bytes.is_empty() {
        return Err(SegmentationError::EmptyInput);
    }

    if raw_bytes.len() > config.max_input_bytes {
        return Err(SegmentationError::InputTooLarge {
            size: raw_bytes.len(),
            max_size: config.max_input_bytes,
        });
    }

    let mut reader = ImageReader::new(Cursor::new(raw_bytes))
        .with_guessed_format()
        .map_err(|e| SegmentationError::ImageDecode { source: e.into() })?;

    if reader.format().is_none() {
        return Err(SegmentationError::UnsupportedFormat);
    }

    let mut limits = Limits::default();
    limits.max_image_width = Some(config.max_dimension);
    limits.max_image_height = Some(config.max_dimension);
    limits.max_alloc = Some(config.max_alloc_bytes);
    reader.limits(limits);

    let img = reader.decode()?;
    let (w, h) = (img.width(), img.height());
    let pixels = u64::from(w) * u64::from(h);

    if pixels > config.max_image_pixels {
        return Err(SegmentationError::ImageTooLarge {
            width: w,
            height: h,
            pixels,
            max_pixels: config.max_image_pixels,
        });
    }

    Ok(img.to_rgb8())
}

/// Output format for a file extension, PNG when unknown.
#[must_use]
pub fn format_for_extension(ext: &str) -> ImageFormat {
    match ImageFormat::from_extension(ext) {
        Some(
            format @ (ImageFormat::Jpeg
            | ImageFormat::Png
            | ImageFormat::Tiff
            | ImageFormat::Bmp
            | ImageFormat::WebP),
        ) => format,
        _ => ImageFormat::Png,
    }
}

/// Lower-cased extension of `name`, if any.
#[must_use]
pub fn extension_of(name: &str) -> Option<String> {
    Path::new(name)
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase)
}

/// Encodes `img` in `format`. Lossy formats re-encode at the codec default.
///
/// # Errors
///
/// Returns [`SegmentationError::Encode`] if the codec rejects the image.
pub fn encode_as(img: &RgbImage, format: ImageFormat) -> Result<Vec<u8>, SegmentationError> {
    if img.width() == 0 || img.height() == 0 {
        return Err(SegmentationError::Encode {
            format,
            reason: "zero dimension".into(),
        });
    }

    let mut buffer = Cursor::new(Vec::with_capacity(img.as_raw().len() / 4));
    img.write_to(&mut buffer, format)
        .map_err(|e| SegmentationError::Encode {
            format,
            reason: e.to_string(),
        })?;

    Ok(buffer.into_inner())
}

/// Download name for an overlay: `dir/lake.png` becomes `segmented_lake.png`.
#[must_use]
pub fn segmented_file_name(source: &str) -> String {
    format!("segmented_{}", basename(source))
}

/// `image/<ext>` media type for a rendered upload.
#[must_use]
pub fn media_type(ext: &str) -> String {
    format!("image/{}", ext.to_ascii_lowercase())
}

#[cfg(test)]
pub(crate) mod test_support {
    use image::{ImageFormat, Rgb, RgbImage};

    pub fn uniform(width: u32, height: u32, color: [u8; 3]) -> RgbImage {
        RgbImage::from_pixel(width, height, Rgb(color))
    }

    pub fn png_bytes(img: &RgbImage) -> Vec<u8> {
        let mut buffer = std::io::Cursor::new(Vec::new());
        img.write_to(&mut buffer, ImageFormat::Png).unwrap();
        buffer.into_inner()
    }
}
