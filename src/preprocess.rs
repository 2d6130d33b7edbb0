//! Image decoding, center crop, resize, and NHWC tensor conversion.

use image::{imageops, DynamicImage, RgbImage};
use ndarray::{Array4, ArrayD};

use crate::error::PipelineError;
use crate::types::{InputScale, InputSpec, ModelCfg, ResizeFilter};

/// Crop bounds `(left, top, right, bottom)` of the largest centered square.
pub fn center_square(width: u32, height: u32) -> (u32, u32, u32, u32) {
    let side = width.min(height);
    let left = (width - side) / 2;
    let top = (height - side) / 2;
    (left, top, left + side, top + side)
}

/// Decoding and resizing settings taken from the model section of the config.
#[derive(Debug, Clone, Copy)]
pub struct ImageNormalizer {
    pub width: u32,
    pub height: u32,
    pub center_crop: bool,
    pub filter: ResizeFilter,
}

impl ImageNormalizer {
    pub fn from_cfg(cfg: &ModelCfg) -> Self {
        Self {
            width: cfg.width as u32,
            height: cfg.height as u32,
            center_crop: cfg.center_crop,
            filter: cfg.resize_filter,
        }
    }

    pub fn decode(&self, bytes: &[u8]) -> Result<DynamicImage, PipelineError> {
        if bytes.is_empty() {
            return Err(PipelineError::Decode("empty upload".to_string()));
        }
        Ok(image::load_from_memory(bytes)?)
    }

    /// Converts any decoded image to a `width x height` RGB image.
    pub fn normalize(&self, image: &DynamicImage) -> RgbImage {
        let mut rgb = image.to_rgb8();
        if self.center_crop {
            let (left, top, right, _) = center_square(rgb.width(), rgb.height());
            let side = right - left;
            rgb = imageops::crop_imm(&rgb, left, top, side, side).to_image();
        }
        if rgb.dimensions() == (self.width, self.height) {
            return rgb;
        }
        imageops::resize(&rgb, self.width, self.height, self.filter.into())
    }

    pub fn run(&self, bytes: &[u8]) -> Result<RgbImage, PipelineError> {
        let decoded = self.decode(bytes)?;
        Ok(self.normalize(&decoded))
    }
}

/// Builds the `(1, H, W, 3)` batch the model consumes.
#[derive(Debug, Clone, Copy)]
pub struct TensorAdapter {
    pub spec: InputSpec,
    pub scale: InputScale,
}

impl TensorAdapter {
    pub fn new(spec: InputSpec, scale: InputScale) -> Self {
        Self { spec, scale }
    }

    pub fn run(&self, image: &RgbImage) -> Result<ArrayD<f32>, PipelineError> {
        let (w, h) = image.dimensions();
        if (h as usize, w as usize) != (self.spec.height, self.spec.width) {
            return Err(PipelineError::Inference(format!(
                "normalized image is {}x{}, model expects {}x{}",
                w, h, self.spec.width, self.spec.height
            )));
        }

        let factor = self.scale.factor();
        let tensor = Array4::from_shape_fn(
            (1, self.spec.height, self.spec.width, self.spec.channels),
            |(_, y, x, c)| image.get_pixel(x as u32, y as u32)[c] as f32 * factor,
        );
        Ok(tensor.into_dyn())
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use image::{GrayImage, ImageFormat, Luma, Rgba, RgbaImage};
    use std::io::Cursor;

    pub(crate) fn png_bytes(image: &DynamicImage) -> Vec<u8> {
        let mut buf = Cursor::new(Vec::new());
        image.write_to(&mut buf, ImageFormat::Png).unwrap();
        buf.into_inner()
    }

    fn normalizer(size: u32, center_crop: bool) -> ImageNormalizer {
        ImageNormalizer { width: size, height: size, center_crop, filter: ResizeFilter::Triangle }
    }

    #[test]
    fn test_center_square_bounds() {
        assert_eq!(center_square(400, 200), (100, 0, 300, 200));
        assert_eq!(center_square(200, 400), (0, 100, 200, 300));
        assert_eq!(center_square(300, 300), (0, 0, 300, 300));
        // odd remainder truncates toward the top-left
        assert_eq!(center_square(401, 200), (100, 0, 300, 200));
    }

    #[test]
    fn test_output_shape_for_any_input() {
        let inputs = [
            DynamicImage::ImageRgb8(RgbImage::new(640, 480)),
            DynamicImage::ImageRgb8(RgbImage::new(100, 900)),
            DynamicImage::ImageLuma8(GrayImage::from_pixel(50, 50, Luma([128]))),
            DynamicImage::ImageRgba8(RgbaImage::from_pixel(31, 17, Rgba([1, 2, 3, 0]))),
        ];
        for crop in [false, true] {
            for size in [224, 300] {
                let n = normalizer(size, crop);
                for img in &inputs {
                    let out = n.run(&png_bytes(img)).unwrap();
                    assert_eq!(out.dimensions(), (size, size));
                }
            }
        }
    }

    #[test]
    fn test_grayscale_expands_to_three_channels() {
        let gray = DynamicImage::ImageLuma8(GrayImage::from_pixel(10, 10, Luma([200])));
        let out = normalizer(10, false).run(&png_bytes(&gray)).unwrap();
        assert_eq!(out.get_pixel(3, 3).0, [200, 200, 200]);
    }

    #[test]
    fn test_center_crop_keeps_middle() {
        // 30x10: left third red, middle green, right blue
        let img = RgbImage::from_fn(30, 10, |x, _| match x {
            0..=9 => image::Rgb([255, 0, 0]),
            10..=19 => image::Rgb([0, 255, 0]),
            _ => image::Rgb([0, 0, 255]),
        });
        let out = normalizer(10, true).normalize(&DynamicImage::ImageRgb8(img));
        assert!(out.pixels().all(|p| p.0 == [0, 255, 0]));
    }

    #[test]
    fn test_decode_rejects_garbage() {
        let n = normalizer(224, false);
        assert!(matches!(n.run(b"definitely not a png"), Err(PipelineError::Decode(_))));
        assert!(matches!(n.run(&[]), Err(PipelineError::Decode(_))));
    }

    #[test]
    fn test_tensor_shape_and_scaling() {
        let img = RgbImage::from_pixel(4, 2, image::Rgb([255, 51, 0]));
        let spec = InputSpec::new(2, 4);

        let raw = TensorAdapter::new(spec, InputScale::Raw).run(&img).unwrap();
        assert_eq!(raw.shape(), &[1, 2, 4, 3]);
        assert_eq!(raw[[0, 1, 3, 0]], 255.0);
        assert_eq!(raw[[0, 1, 3, 1]], 51.0);

        let unit = TensorAdapter::new(spec, InputScale::Unit).run(&img).unwrap();
        assert_eq!(unit.shape()[0], 1);
        assert!((unit[[0, 0, 0, 0]] - 1.0).abs() < 1e-6);
        assert!((unit[[0, 0, 0, 1]] - 0.2).abs() < 1e-6);
        assert!(unit.iter().all(|v| (0.0..=1.0).contains(v)));
    }

    #[test]
    fn test_tensor_rejects_wrong_size() {
        let img = RgbImage::new(3, 3);
        let adapter = TensorAdapter::new(InputSpec::new(4, 4), InputScale::Raw);
        assert!(matches!(adapter.run(&img), Err(PipelineError::Inference(_))));
    }
}
