//! Image preprocessing for the detector and recognizer.

use image::imageops::FilterType;
use image::{DynamicImage, GenericImageView};
use ndarray::{Array4, s};
use tracing::trace;

use crate::error::OcrError;

/// Min-max normalise all channels to `[0, 1]` and lay out as NCHW with a
/// batch of one. A constant image becomes all zeros.
pub fn normalize_image(image: &DynamicImage) -> Array4<f32> {
    let rgb = image.to_rgb8();
    let (width, height) = rgb.dimensions();

    let (min, max) = rgb
        .as_raw()
        .iter()
        .fold((u8::MAX, u8::MIN), |(lo, hi), &v| (lo.min(v), hi.max(v)));
    let range = max.saturating_sub(min) as f32;
    let scale = if range > 0.0 { 1.0 / range } else { 0.0 };

    let mut tensor = Array4::<f32>::zeros((1, 3, height as usize, width as usize));
    for (x, y, pixel) in rgb.enumerate_pixels() {
        for c in 0..3 {
            tensor[[0, c, y as usize, x as usize]] = (pixel[c] as f32 - min as f32) * scale;
        }
    }
    tensor
}

/// Resize to `height` x `width` and normalise.
///
/// Without `pad` the image is stretched to the exact size. With `pad` it is
/// scaled to `height` keeping its aspect ratio, capped at `width`, and the
/// remaining columns on the right are zero.
pub fn resize_norm_image(
    image: &DynamicImage,
    height: u32,
    width: u32,
    pad: bool,
) -> Result<Array4<f32>, OcrError> {
    let (src_width, src_height) = image.dimensions();
    if src_width == 0 || src_height == 0 {
        return Err(OcrError::InvalidImage(format!(
            "cannot resize empty image {}x{}",
            src_width, src_height
        )));
    }
    if height == 0 || width == 0 {
        return Err(OcrError::Preprocessing(format!(
            "invalid target size {}x{}",
            width, height
        )));
    }

    if !pad {
        let resized = image.resize_exact(width, height, FilterType::Triangle);
        return Ok(normalize_image(&resized));
    }

    let ratio = src_width as f32 / src_height as f32;
    let resized_width = ((height as f32 * ratio).ceil() as u32).clamp(1, width);
    trace!(
        "Resizing {}x{} to {}x{} padded to {}",
        src_width, src_height, resized_width, height, width
    );

    let resized = image.resize_exact(resized_width, height, FilterType::Triangle);
    let normalized = normalize_image(&resized);

    let mut tensor = Array4::<f32>::zeros((1, 3, height as usize, width as usize));
    tensor
        .slice_mut(s![.., .., .., ..resized_width as usize])
        .assign(&normalized);
    Ok(tensor)
}

/// Input shaping for both models.
#[derive(Debug, Clone)]
pub struct ImagePreprocessor {
    det_height: u32,
    det_width: u32,
    rec_height: u32,
    rec_width: Option<u32>,
}

impl Default for ImagePreprocessor {
    fn default() -> Self {
        Self {
            det_height: 640,
            det_width: 640,
            rec_height: 32,
            rec_width: None,
        }
    }
}

impl ImagePreprocessor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the detector input size.
    pub fn with_detection_size(mut self, height: u32, width: u32) -> Self {
        self.det_height = height;
        self.det_width = width;
        self
    }

    /// Set the recognizer input height and optional fixed width.
    pub fn with_recognition_size(mut self, height: u32, width: Option<u32>) -> Self {
        self.rec_height = height;
        self.rec_width = width;
        self
    }

    /// Detector input: a strict resize to the detector's fixed size.
    pub fn preprocess_for_detection(&self, image: &DynamicImage) -> Result<Array4<f32>, OcrError> {
        resize_norm_image(image, self.det_height, self.det_width, false)
    }

    /// Recognizer input for a cropped region.
    ///
    /// With a fixed width the crop is stretched to it. Otherwise the crop's
    /// own width is the target and the crop is scaled to height then padded.
    pub fn preprocess_for_recognition(&self, crop: &DynamicImage) -> Result<Array4<f32>, OcrError> {
        match self.rec_width {
            Some(width) => resize_norm_image(crop, self.rec_height, width, false),
            None => resize_norm_image(crop, self.rec_height, crop.width(), true),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgb, RgbImage};

    fn gradient(width: u32, height: u32) -> DynamicImage {
        DynamicImage::ImageRgb8(RgbImage::from_fn(width, height, |x, _| {
            let v = (50 + x * 100 / width.max(1)) as u8;
            Rgb([v, v, v])
        }))
    }

    #[test]
    fn test_normalize_min_max() {
        let image = DynamicImage::ImageRgb8(RgbImage::from_fn(2, 1, |x, _| {
            if x == 0 { Rgb([10, 20, 30]) } else { Rgb([110, 60, 10]) }
        }));
        let tensor = normalize_image(&image);
        assert_eq!(tensor.shape(), &[1, 3, 1, 2]);
        assert_eq!(tensor[[0, 0, 0, 0]], 0.0);
        assert_eq!(tensor[[0, 0, 0, 1]], 1.0);
        assert_eq!(tensor[[0, 2, 0, 1]], 0.0);
        assert!((tensor[[0, 1, 0, 0]] - 0.1).abs() < 1e-6);
    }

    #[test]
    fn test_normalize_constant_image() {
        let image = DynamicImage::ImageRgb8(RgbImage::from_pixel(4, 4, Rgb([128, 128, 128])));
        assert!(normalize_image(&image).iter().all(|v| *v == 0.0));
    }

    #[test]
    fn test_strict_resize() {
        let tensor = resize_norm_image(&gradient(100, 20), 32, 64, false).unwrap();
        assert_eq!(tensor.shape(), &[1, 3, 32, 64]);
    }

    #[test]
    fn test_padded_resize() {
        // 40x20 scaled to height 32 is 64 wide, padded to 100.
        let tensor = resize_norm_image(&gradient(40, 20), 32, 100, true).unwrap();
        assert_eq!(tensor.shape(), &[1, 3, 32, 100]);
        assert!(tensor.slice(s![.., .., .., 64..]).iter().all(|v| *v == 0.0));
        assert!(tensor.slice(s![.., .., .., 60..64]).iter().any(|v| *v > 0.0));

        // Wider than allowed: capped at the target width, no padding.
        let tensor = resize_norm_image(&gradient(400, 20), 32, 100, true).unwrap();
        assert_eq!(tensor.shape(), &[1, 3, 32, 100]);
    }

    #[test]
    fn test_empty_image_rejected() {
        let empty = DynamicImage::ImageRgb8(RgbImage::new(0, 10));
        assert!(matches!(
            resize_norm_image(&empty, 32, 32, false),
            Err(OcrError::InvalidImage(_))
        ));
    }

    #[test]
    fn test_preprocessor_shapes() {
        let preprocessor = ImagePreprocessor::new();
        let image = gradient(320, 180);
        assert_eq!(
            preprocessor.preprocess_for_detection(&image).unwrap().shape(),
            &[1, 3, 640, 640]
        );

        let crop = gradient(120, 16);
        assert_eq!(
            preprocessor.preprocess_for_recognition(&crop).unwrap().shape(),
            &[1, 3, 32, 120]
        );

        let fixed = ImagePreprocessor::new().with_recognition_size(48, Some(200));
        assert_eq!(
            fixed.preprocess_for_recognition(&crop).unwrap().shape(),
            &[1, 3, 48, 200]
        );
    }
}
