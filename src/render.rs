//! Mask overlay compositing.
//!
//! Each instance's mask is resized to the source resolution, binarized, and
//! its palette color blended into the covered pixels at a fixed alpha. The
//! blend is always against the untouched source pixel: where instances
//! overlap, the later one overwrites the earlier one outright.

use image::{Rgb, RgbImage};
use tracing::{instrument, trace};

use crate::config::SegmenterConfig;
use crate::error::SegmentationError;
use crate::image_io;
use crate::mask::RawMaskBuffer;
use crate::palette::{color_for, RgbColor};

/// Weight of the overlay color in a covered pixel.
pub const OVERLAY_ALPHA: f64 = 0.6;

/// `base * (1 - alpha) + color * alpha`, rounded per channel.
#[must_use]
pub fn blend(base: Rgb<u8>, color: RgbColor) -> Rgb<u8> {
    let mut out = [0u8; 3];
    for ((dst, &b), c) in out.iter_mut().zip(base.0.iter()).zip(color.channels()) {
        let mixed = f64::from(b) * (1.0 - OVERLAY_ALPHA) + f64::from(c) * OVERLAY_ALPHA;
        *dst = mixed.round().clamp(0.0, 255.0) as u8;
    }
    Rgb(out)
}

/// Composites `masks` onto a copy of `source`, instance `i` colored with
/// `color_for(i)`.
#[must_use]
pub fn render(source: &RgbImage, masks: &[RawMaskBuffer]) -> RgbImage {
    render_indexed(source, masks.iter().enumerate())
}

/// Like [`render`], with an explicit color index per mask.
///
/// Used when only some detections carry a mask, so each mask keeps the color
/// of its detection's position.
#[must_use]
#[instrument(skip_all, fields(width = source.width(), height = source.height()))]
pub fn render_indexed<'a, I>(source: &RgbImage, masks: I) -> RgbImage
where
    I: IntoIterator<Item = (usize, &'a RawMaskBuffer)>,
{
    let mut out = source.clone();
    let (width, height) = (source.width() as usize, source.height() as usize);

    for (index, mask) in masks {
        let color = color_for(index);
        let binary = mask.binarize(width, height);
        let mut covered = 0usize;

        for ((dst, src), _) in out
            .pixels_mut()
            .zip(source.pixels())
            .zip(binary.iter())
            .filter(|(_, &on)| on)
        {
            *dst = blend(*src, color);
            covered += 1;
        }

        trace!(
            index,
            mask_w = mask.width(),
            mask_h = mask.height(),
            covered,
            "composited instance mask"
        );
    }

    out
}

/// Decodes `source` and composites `masks` onto it.
///
/// # Errors
///
/// Returns [`SegmentationError::EmptyInput`] when no image is supplied and
/// [`SegmentationError::ImageDecode`] when it cannot be decoded.
pub fn render_encoded(
    config: &SegmenterConfig,
    source: Option<&[u8]>,
    masks: &[RawMaskBuffer],
) -> Result<RgbImage, SegmentationError> {
    let bytes = source.ok_or(SegmentationError::EmptyInput)?;
    let img = image_io::decode(config, bytes)?;
    Ok(render(&img, masks))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::image_io::test_support::{png_bytes, uniform};
    use crate::palette::PALETTE;
    use ndarray::Array2;

    fn single_pixel_mask(width: usize, height: usize, x: usize, y: usize) -> RawMaskBuffer {
        let mut data = Array2::<f32>::zeros((height, width));
        data[[y, x]] = 1.0;
        RawMaskBuffer::new(data)
    }

    #[test]
    fn no_masks_returns_unmodified_copy() {
        let src = uniform(5, 5, [9, 8, 7]);
        assert_eq!(render(&src, &[]), src);
    }

    #[test]
    fn full_coverage_tints_every_pixel() {
        let src = uniform(100, 100, [100, 150, 200]);
        let out = render(&src, &[RawMaskBuffer::filled(100, 100, 1.0)]);

        let expected = Rgb([40, 60, 233]);
        assert_eq!(blend(Rgb([100, 150, 200]), PALETTE[0]), expected);
        assert!(out.pixels().all(|p| *p == expected));
    }

    #[test]
    fn blend_uses_fixed_alpha() {
        assert_eq!(blend(Rgb([0, 0, 0]), RgbColor::new(255, 255, 255)), Rgb([153, 153, 153]));
        assert_eq!(blend(Rgb([255, 255, 255]), RgbColor::new(0, 0, 0)), Rgb([102, 102, 102]));
    }

    #[test]
    fn later_instance_wins_overlap_without_mixing() {
        let src = uniform(3, 3, [50, 50, 50]);
        let masks = vec![single_pixel_mask(3, 3, 1, 1), single_pixel_mask(3, 3, 1, 1)];
        let out = render(&src, &masks);

        let px = *out.get_pixel(1, 1);
        assert_eq!(px, blend(Rgb([50, 50, 50]), PALETTE[1]));
        assert_ne!(px, blend(blend(Rgb([50, 50, 50]), PALETTE[0]), PALETTE[1]));
        assert_eq!(*out.get_pixel(0, 0), Rgb([50, 50, 50]));
    }

    #[test]
    fn small_mask_is_resized_to_source() {
        let src = uniform(4, 4, [0, 0, 0]);
        let mask = RawMaskBuffer::from_shape_vec(2, 2, vec![1.0, 1.0, 0.0, 0.0]).unwrap();
        let out = render(&src, &[mask]);

        let tinted = blend(Rgb([0, 0, 0]), PALETTE[0]);
        for (_, y, px) in out.enumerate_pixels() {
            if y < 2 {
                assert_eq!(*px, tinted);
            } else {
                assert_eq!(*px, Rgb([0, 0, 0]));
            }
        }
    }

    #[test]
    fn indexed_render_uses_given_color_slot() {
        let src = uniform(2, 2, [0, 0, 0]);
        let mask = RawMaskBuffer::filled(2, 2, 1.0);
        let out = render_indexed(&src, [(14usize, &mask)]);
        assert_eq!(*out.get_pixel(0, 0), blend(Rgb([0, 0, 0]), PALETTE[2]));
    }

    #[test]
    fn rendering_is_deterministic() {
        let src = uniform(16, 9, [10, 200, 30]);
        let masks: Vec<RawMaskBuffer> = (0..14)
            .map(|i| single_pixel_mask(8, 8, i % 8, (i * 3) % 8))
            .collect();
        assert_eq!(render(&src, &masks), render(&src, &masks));
    }

    #[test]
    fn missing_source_is_empty_input() {
        let result = render_encoded(&SegmenterConfig::default(), None, &[]);
        assert!(matches!(result, Err(SegmentationError::EmptyInput)));
    }

    #[test]
    fn undecodable_source_is_decode_error() {
        let result = render_encoded(&SegmenterConfig::default(), Some(&b"not an image at all"[..]), &[]);
        assert!(matches!(
            result,
            Err(SegmentationError::ImageDecode { .. } | SegmentationError::UnsupportedFormat)
        ));
    }

    #[test]
    fn encoded_source_is_decoded_then_rendered() {
        let src = uniform(6, 6, [100, 100, 100]);
        let png = png_bytes(&src);
        let out = render_encoded(
            &SegmenterConfig::default(),
            Some(png.as_slice()),
            &[RawMaskBuffer::filled(3, 3, 0.9)],
        )
        .unwrap();
        assert!(out.pixels().all(|p| *p == blend(Rgb([100, 100, 100]), PALETTE[0])));
    }
}
