//! Region cropping with a blank-image fallback.

use image::{DynamicImage, RgbImage};
use tracing::warn;

use super::{Point2D, to_axis_aligned_bbox};
use crate::error::GeometryError;

/// Crop the axis-aligned bounding box of `bbox` out of `image`.
///
/// Coordinates are truncated; when the truncated box has zero area they are
/// rounded instead. Each coordinate is then clamped to `[1, dimension]`. If
/// the crop is still empty a black `width` x `height` image is returned
/// together with `true`.
pub fn crop_with_fallback(
    image: &DynamicImage,
    height: u32,
    width: u32,
    bbox: &[Point2D],
) -> Result<(bool, DynamicImage), GeometryError> {
    let flat: Vec<f32> = bbox.iter().flat_map(|p| [p.x, p.y]).collect();
    let rect = to_axis_aligned_bbox(&flat)?;

    let truncated = [rect.x_min, rect.y_min, rect.x_max, rect.y_max].map(|v| v as i64);
    let [mut x_min, mut y_min, mut x_max, mut y_max] = truncated;
    if (x_max - x_min) * (y_max - y_min) == 0 {
        [x_min, y_min, x_max, y_max] =
            [rect.x_min, rect.y_min, rect.x_max, rect.y_max].map(|v| v.round() as i64);
    }

    let (w, h) = (width as i64, height as i64);
    let x_min = x_min.min(w).max(1);
    let y_min = y_min.min(h).max(1);
    let x_max = x_max.min(w).max(1);
    let y_max = y_max.min(h).max(1);

    // The image itself may be smaller than the requested dimensions.
    let x_max = x_max.min(image.width() as i64);
    let y_max = y_max.min(image.height() as i64);

    if x_max <= x_min || y_max <= y_min {
        warn!(
            "Empty crop for bbox ({:.1}, {:.1}, {:.1}, {:.1}), using blank {}x{} image",
            rect.x_min, rect.y_min, rect.x_max, rect.y_max, width, height
        );
        let blank = RgbImage::new(width.max(1), height.max(1));
        return Ok((true, DynamicImage::ImageRgb8(blank)));
    }

    let cropped = image.crop_imm(
        x_min as u32,
        y_min as u32,
        (x_max - x_min) as u32,
        (y_max - y_min) as u32,
    );
    Ok((false, cropped))
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::GenericImageView;

    fn test_image() -> DynamicImage {
        DynamicImage::ImageRgb8(RgbImage::from_pixel(100, 50, image::Rgb([200, 10, 10])))
    }

    fn rect(x_min: f32, y_min: f32, x_max: f32, y_max: f32) -> Vec<Point2D> {
        vec![
            Point2D::new(x_min, y_min),
            Point2D::new(x_max, y_min),
            Point2D::new(x_max, y_max),
            Point2D::new(x_min, y_max),
        ]
    }

    #[test]
    fn test_crop_inside() {
        let image = test_image();
        let (blank, crop) = crop_with_fallback(&image, 50, 100, &rect(10.7, 5.2, 40.9, 20.9)).unwrap();
        assert!(!blank);
        assert_eq!(crop.dimensions(), (30, 15));
    }

    #[test]
    fn test_crop_clamps_to_bounds() {
        let image = test_image();
        let (blank, crop) = crop_with_fallback(&image, 50, 100, &rect(-20.0, -5.0, 150.0, 80.0)).unwrap();
        assert!(!blank);
        // Lower bound is clamped to 1, never 0.
        assert_eq!(crop.dimensions(), (99, 49));
    }

    #[test]
    fn test_zero_area_truncation_recovers_by_rounding() {
        let image = test_image();
        // Truncation gives x_min == x_max == 10, rounding gives 10..11.
        let (blank, crop) = crop_with_fallback(&image, 50, 100, &rect(10.2, 5.0, 10.6, 20.0)).unwrap();
        assert!(!blank);
        assert_eq!(crop.dimensions(), (1, 15));
    }

    #[test]
    fn test_outside_bounds_falls_back_to_blank() {
        let image = test_image();
        for bbox in [
            rect(200.0, 10.0, 300.0, 20.0),
            rect(-50.0, -40.0, -10.0, -5.0),
            rect(10.0, 60.0, 20.0, 90.0),
        ] {
            let (blank, crop) = crop_with_fallback(&image, 50, 100, &bbox).unwrap();
            assert!(blank);
            assert_eq!(crop.dimensions(), (100, 50));
            assert!(crop.to_rgb8().pixels().all(|p| p.0 == [0, 0, 0]));
        }
    }

    #[test]
    fn test_invalid_bbox() {
        let image = test_image();
        assert!(crop_with_fallback(&image, 50, 100, &[Point2D::new(1.0, 1.0)]).is_err());
    }
}
