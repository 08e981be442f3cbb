//! 像素到地面距离的比例
//!
//! Nadir camera over flat ground: a field of view `fov` at height `h` covers
//! `2 h tan(fov / 2)` metres along the image dimension it spans.

/// Which image dimension the field of view spans.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ScaleAxis {
    #[default]
    Height,
    Diagonal,
}

impl ScaleAxis {
    pub fn extent_px(&self, width: usize, height: usize) -> f64 {
        match self {
            ScaleAxis::Height => height as f64,
            ScaleAxis::Diagonal => ((width * width + height * height) as f64).sqrt(),
        }
    }
}

/// Ground metres covered by one pixel.
///
/// No validation: callers make sure `altitude_m > 0` and `image_dim_px > 0`.
#[inline]
pub fn meters_per_pixel(altitude_m: f64, fov_deg: f64, image_dim_px: f64) -> f64 {
    let fov_rad = fov_deg.to_radians();
    2.0 * altitude_m * (fov_rad / 2.0).tan() / image_dim_px
}

/// Field of view [deg] of a pinhole with focal length `focal_length_px`.
#[inline]
pub fn fov_from_focal_length(image_dim_px: f64, focal_length_px: f64) -> f64 {
    (2.0 * (0.5 * image_dim_px / focal_length_px).atan()).to_degrees()
}
