//! 灰度图像帧
//!
//! Single-channel luminance raster, rows x cols, intensities in 0..=255.

use image::{DynamicImage, GrayImage, RgbImage};
use ndarray::Array2;

const LUMA_R: f32 = 0.299;
const LUMA_G: f32 = 0.587;
const LUMA_B: f32 = 0.114;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Frame {
    luma: Array2<f32>,
}

impl Frame {
    pub fn from_luma(luma: Array2<f32>) -> Self {
        Self { luma }
    }

    pub fn from_gray(img: &GrayImage) -> Self {
        let (w, h) = img.dimensions();
        let luma = Array2::from_shape_fn((h as usize, w as usize), |(r, c)| {
            img.get_pixel(c as u32, r as u32)[0] as f32
        });
        Self { luma }
    }

    /// Rec.601 luminance, the same weights OpenCV uses for BGR2GRAY.
    pub fn from_rgb(img: &RgbImage) -> Self {
        let (w, h) = img.dimensions();
        let luma = Array2::from_shape_fn((h as usize, w as usize), |(r, c)| {
            let p = img.get_pixel(c as u32, r as u32);
            LUMA_R * p[0] as f32 + LUMA_G * p[1] as f32 + LUMA_B * p[2] as f32
        });
        Self { luma }
    }

    pub fn from_image(img: &DynamicImage) -> Self {
        match img {
            DynamicImage::ImageLuma8(gray) => Self::from_gray(gray),
            other => Self::from_rgb(&other.to_rgb8()),
        }
    }

    pub fn luma(&self) -> &Array2<f32> {
        &self.luma
    }

    pub fn width(&self) -> usize {
        self.luma.ncols()
    }

    pub fn height(&self) -> usize {
        self.luma.nrows()
    }

    pub fn is_empty(&self) -> bool {
        self.luma.is_empty()
    }

    pub fn same_size(&self, other: &Frame) -> bool {
        self.luma.dim() == other.luma.dim()
    }

    /// Downscale to `max_width` keeping the aspect ratio.
    /// Frames already narrower are returned unchanged.
    pub fn downscaled(&self, max_width: usize) -> Frame {
        if max_width == 0 || self.width() <= max_width {
            return self.clone();
        }
        let scale = max_width as f64 / self.width() as f64;
        let height = ((self.height() as f64 * scale).round() as usize).max(1);
        self.resized(max_width, height)
    }

    /// Area-average resampling to `width` x `height`.
    pub fn resized(&self, width: usize, height: usize) -> Frame {
        let (src_h, src_w) = self.luma.dim();
        let sx = src_w as f64 / width as f64;
        let sy = src_h as f64 / height as f64;

        let luma = Array2::from_shape_fn((height, width), |(r, c)| {
            let y0 = r as f64 * sy;
            let y1 = y0 + sy;
            let x0 = c as f64 * sx;
            let x1 = x0 + sx;

            let mut sum = 0.0;
            let mut area = 0.0;
            let mut y = y0.floor() as usize;
            while (y as f64) < y1 && y < src_h {
                let wy = (y1.min(y as f64 + 1.0) - y0.max(y as f64)).max(0.0);
                let mut x = x0.floor() as usize;
                while (x as f64) < x1 && x < src_w {
                    let wx = (x1.min(x as f64 + 1.0) - x0.max(x as f64)).max(0.0);
                    sum += self.luma[(y, x)] as f64 * wx * wy;
                    area += wx * wy;
                    x += 1;
                }
                y += 1;
            }
            if area > 0.0 {
                (sum / area) as f32
            } else {
                0.0
            }
        });
        Frame { luma }
    }
}
