use crate::error::{Error, Result};
use image::imageops::FilterType;
use image::{DynamicImage, RgbaImage};
use ndarray::Array4;
use std::path::Path;

/// Decoded RGBA8 pixels, row-major.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RgbaBitmap {
    pub width: u32,
    pub height: u32,
    pub pixels: Vec<u8>,
}

impl RgbaBitmap {
    pub fn new(width: u32, height: u32, pixels: Vec<u8>) -> Self {
        Self {
            width,
            height,
            pixels,
        }
    }

    pub fn from_image(img: &DynamicImage) -> Self {
        let rgba = img.to_rgba8();
        Self {
            width: rgba.width(),
            height: rgba.height(),
            pixels: rgba.into_raw(),
        }
    }

    pub fn open(path: &Path) -> Result<Self> {
        let img = image::open(path)?;
        Ok(Self::from_image(&img))
    }

    fn validate(&self) -> Result<()> {
        if self.width == 0 || self.height == 0 {
            return Err(Error::InvalidImage(format!(
                "bitmap has zero dimension ({}x{})",
                self.width, self.height
            )));
        }
        let expected = self.width as usize * self.height as usize * 4;
        if self.pixels.len() != expected {
            return Err(Error::InvalidImage(format!(
                "pixel buffer has {} bytes, expected {expected} for {}x{} RGBA",
                self.pixels.len(),
                self.width,
                self.height
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Resampling {
    #[default]
    Nearest,
    Triangle,
}

/// Channel-first `[1, 3, H, W]` model input.
#[derive(Debug, Clone, PartialEq)]
pub struct Tensor {
    data: Array4<f32>,
}

impl Tensor {
    pub fn zeros(size: usize) -> Self {
        Self {
            data: Array4::zeros((1, 3, size, size)),
        }
    }

    pub fn shape(&self) -> &[usize] {
        self.data.shape()
    }

    pub fn as_array(&self) -> &Array4<f32> {
        &self.data
    }

    pub fn as_slice(&self) -> Option<&[f32]> {
        self.data.as_slice()
    }
}

pub fn preprocess(
    bitmap: &RgbaBitmap,
    target_size: usize,
    channel_means: [f32; 3],
    channel_stds: [f32; 3],
) -> Result<Tensor> {
    preprocess_with(
        bitmap,
        target_size,
        channel_means,
        channel_stds,
        Resampling::Nearest,
    )
}

pub fn preprocess_with(
    bitmap: &RgbaBitmap,
    target_size: usize,
    channel_means: [f32; 3],
    channel_stds: [f32; 3],
    resampling: Resampling,
) -> Result<Tensor> {
    bitmap.validate()?;
    if target_size == 0 {
        return Err(Error::InvalidImage("target size must be positive".into()));
    }
    if let Some(std) = channel_stds.iter().find(|s| **s == 0.0 || !s.is_finite()) {
        return Err(Error::InvalidImage(format!(
            "channel std must be finite and non-zero, got {std}"
        )));
    }

    let input = match resampling {
        Resampling::Nearest => rgba_to_nchw_nearest(bitmap, target_size, channel_means, channel_stds),
        Resampling::Triangle => {
            let side = u32::try_from(target_size)
                .map_err(|_| Error::InvalidImage(format!("target size {target_size} too large")))?;
            let img = RgbaImage::from_raw(bitmap.width, bitmap.height, bitmap.pixels.clone())
                .ok_or_else(|| Error::InvalidImage("pixel buffer does not match dimensions".into()))?;
            let resized = image::imageops::resize(&img, side, side, FilterType::Triangle);
            rgba_to_nchw(resized.as_raw(), target_size, channel_means, channel_stds)
        }
    };

    let data = Array4::from_shape_vec((1, 3, target_size, target_size), input)
        .map_err(|e| Error::InvalidImage(format!("Invalid tensor shape: {e}")))?;
    Ok(Tensor { data })
}

fn rgba_to_nchw_nearest(
    bitmap: &RgbaBitmap,
    size: usize,
    means: [f32; 3],
    stds: [f32; 3],
) -> Vec<f32> {
    let src_w = bitmap.width as usize;
    let src_h = bitmap.height as usize;
    let plane = size * size;
    let mut input = vec![0.0; plane * 3];
    for y in 0..size {
        let sy = y * src_h / size;
        for x in 0..size {
            let sx = x * src_w / size;
            let src = (sy * src_w + sx) * 4;
            let idx = y * size + x;
            for c in 0..3 {
                input[idx + plane * c] = normalize(bitmap.pixels[src + c], means[c], stds[c]);
            }
        }
    }
    input
}

fn rgba_to_nchw(raw: &[u8], size: usize, means: [f32; 3], stds: [f32; 3]) -> Vec<f32> {
    let plane = size * size;
    let mut input = vec![0.0; plane * 3];
    for (idx, pixel) in raw.chunks_exact(4).enumerate().take(plane) {
        for c in 0..3 {
            input[idx + plane * c] = normalize(pixel[c], means[c], stds[c]);
        }
    }
    input
}

fn normalize(raw: u8, mean: f32, std: f32) -> f32 {
    (raw as f32 / 255.0 - mean) / std
}

#[cfg(test)]
mod tests {
    use super::*;

    const IDENTITY_MEANS: [f32; 3] = [0.0, 0.0, 0.0];
    const IDENTITY_STDS: [f32; 3] = [1.0, 1.0, 1.0];

    fn solid(width: u32, height: u32, rgba: [u8; 4]) -> RgbaBitmap {
        let pixels = rgba
            .iter()
            .copied()
            .cycle()
            .take(width as usize * height as usize * 4)
            .collect();
        RgbaBitmap::new(width, height, pixels)
    }

    #[test]
    fn output_is_channel_first_with_alpha_dropped() {
        let bitmap = solid(3, 2, [255, 0, 51, 7]);
        let tensor = preprocess(&bitmap, 4, IDENTITY_MEANS, IDENTITY_STDS).unwrap();
        assert_eq!(tensor.shape(), &[1, 3, 4, 4]);
        let data = tensor.as_slice().unwrap();
        assert!(data[..16].iter().all(|v| (*v - 1.0).abs() < 1e-6));
        assert!(data[16..32].iter().all(|v| v.abs() < 1e-6));
        assert!(data[32..].iter().all(|v| (*v - 0.2).abs() < 1e-6));
    }

    #[test]
    fn normalization_applies_mean_and_std() {
        let bitmap = solid(1, 1, [255, 255, 255, 255]);
        let tensor = preprocess(&bitmap, 1, [0.5, 0.5, 0.5], [0.25, 0.5, 1.0]).unwrap();
        let data = tensor.as_slice().unwrap();
        assert!((data[0] - 2.0).abs() < 1e-6);
        assert!((data[1] - 1.0).abs() < 1e-6);
        assert!((data[2] - 0.5).abs() < 1e-6);
    }

    #[test]
    fn nearest_neighbor_uses_floor_mapping() {
        // 2x1 source: left pixel red = 0, right pixel red = 255.
        let bitmap = RgbaBitmap::new(2, 1, vec![0, 0, 0, 255, 255, 0, 0, 255]);
        let tensor = preprocess(&bitmap, 4, IDENTITY_MEANS, IDENTITY_STDS).unwrap();
        let red_row: Vec<f32> = tensor.as_slice().unwrap()[..4].to_vec();
        // x * 2 / 4 -> 0, 0, 1, 1
        assert_eq!(red_row, vec![0.0, 0.0, 1.0, 1.0]);
    }

    #[test]
    fn rejects_zero_dimensions() {
        let bitmap = RgbaBitmap::new(0, 4, Vec::new());
        let err = preprocess(&bitmap, 8, IDENTITY_MEANS, IDENTITY_STDS).unwrap_err();
        assert!(matches!(err, Error::InvalidImage(_)));
    }

    #[test]
    fn rejects_short_pixel_buffer() {
        let bitmap = RgbaBitmap::new(2, 2, vec![0; 15]);
        let err = preprocess(&bitmap, 8, IDENTITY_MEANS, IDENTITY_STDS).unwrap_err();
        assert!(matches!(err, Error::InvalidImage(_)));
    }

    #[test]
    fn triangle_resampling_is_deterministic() {
        let pixels: Vec<u8> = (0..(16 * 16 * 4)).map(|i| (i % 251) as u8).collect();
        let bitmap = RgbaBitmap::new(16, 16, pixels);
        let a = preprocess_with(&bitmap, 5, IDENTITY_MEANS, IDENTITY_STDS, Resampling::Triangle)
            .unwrap();
        let b = preprocess_with(&bitmap, 5, IDENTITY_MEANS, IDENTITY_STDS, Resampling::Triangle)
            .unwrap();
        assert_eq!(a.shape(), &[1, 3, 5, 5]);
        assert_eq!(a, b);
    }

    #[test]
    fn from_image_keeps_dimensions() {
        let img = DynamicImage::new_rgb8(7, 3);
        let bitmap = RgbaBitmap::from_image(&img);
        assert_eq!((bitmap.width, bitmap.height), (7, 3));
        assert_eq!(bitmap.pixels.len(), 7 * 3 * 4);
    }
}
