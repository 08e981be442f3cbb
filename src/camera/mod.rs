//! 相机模型
//!
//! Only what ground-speed estimation needs: the lens angle and the
//! resolution it was specified at.

pub mod scale;

use std::path::Path;

use serde::{Deserialize, Serialize};

pub use scale::{fov_from_focal_length, meters_per_pixel, ScaleAxis};

use crate::error::{NavError, Result};

/// How the lens angle is given.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LensSpec {
    /// Field of view in degrees along the scale axis.
    FieldOfView(f64),
    /// Focal length in pixels at the configured resolution.
    FocalLength(f64),
}

impl LensSpec {
    /// Field of view [deg] for an image whose scale-axis extent is `extent_px`.
    pub fn fov_deg(&self, extent_px: f64) -> f64 {
        match *self {
            LensSpec::FieldOfView(fov) => fov,
            LensSpec::FocalLength(focal) => fov_from_focal_length(extent_px, focal),
        }
    }

    fn value(&self) -> f64 {
        match *self {
            LensSpec::FieldOfView(v) | LensSpec::FocalLength(v) => v,
        }
    }
}

/// 相机参数的trait
pub trait CameraParametersTrait: Sized {
    const CAMERA_TYPE: &'static str;
    fn read_from_json(path: &Path) -> Result<Self>;
    fn write_to_json(&self, path: &Path) -> Result<()>;
}

/// Camera parameters as stored on disk.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CameraParameters {
    pub model_type: String,
    pub camera_name: String,
    pub image_width: u32,
    pub image_height: u32,
    pub lens: LensSpec,
}

impl CameraParameters {
    pub fn new(camera_name: &str, lens: LensSpec, resolution: (u32, u32)) -> Self {
        Self {
            model_type: Self::CAMERA_TYPE.to_string(),
            camera_name: camera_name.to_string(),
            image_width: resolution.0,
            image_height: resolution.1,
            lens,
        }
    }

    pub fn resolution(&self) -> (u32, u32) {
        (self.image_width, self.image_height)
    }

    /// Usable for metric scaling: positive finite lens value and resolution.
    pub fn is_configured(&self) -> bool {
        let v = self.lens.value();
        v.is_finite() && v > 0.0 && self.image_width > 0 && self.image_height > 0
    }
}

impl CameraParametersTrait for CameraParameters {
    const CAMERA_TYPE: &'static str = "NADIR_PINHOLE";

    fn read_from_json(path: &Path) -> Result<Self> {
        let file = std::fs::File::open(path).map_err(|source| NavError::Input {
            path: path.to_path_buf(),
            source,
        })?;
        let parameters: Self = serde_json::from_reader(std::io::BufReader::new(file))?;
        if parameters.model_type != Self::CAMERA_TYPE {
            log::error!("model type is not {}", Self::CAMERA_TYPE);
            return Err(NavError::Config(format!(
                "{:?}: unsupported camera model {}",
                path, parameters.model_type
            )));
        }
        if !parameters.is_configured() {
            return Err(NavError::Config(format!(
                "{:?}: lens and resolution must be positive",
                path
            )));
        }
        log::info!("camera {} loaded from {:?}", parameters.camera_name, path);
        Ok(parameters)
    }

    fn write_to_json(&self, path: &Path) -> Result<()> {
        let file = std::fs::File::create(path).map_err(|source| NavError::Output {
            path: path.to_path_buf(),
            source,
        })?;
        let mut writer = std::io::BufWriter::new(file);
        serde_json::to_writer_pretty(&mut writer, self)?;
        std::io::Write::flush(&mut writer).map_err(|source| NavError::Output {
            path: path.to_path_buf(),
            source,
        })
    }
}
