use nalgebra::Vector3;

use super::{DenseFlow, HornSchunck, VelocityProcessor};
use crate::camera::{meters_per_pixel, LensSpec, ScaleAxis};
use crate::config::WORKING_WIDTH;
use crate::filter::ScalarKalman;
use crate::frame::Frame;

/// Tunables of the speed estimator.
#[derive(Debug, Clone)]
pub struct FlowSettings {
    /// Downscale frames to this width before computing flow. `None` keeps
    /// the native resolution.
    pub working_width: Option<usize>,
    pub scale_axis: ScaleAxis,
    /// Multiplies the raw speed.
    pub calibration: f64,
}

impl Default for FlowSettings {
    fn default() -> Self {
        Self {
            working_width: Some(WORKING_WIDTH),
            scale_axis: ScaleAxis::Height,
            calibration: 1.0,
        }
    }
}

/// Ground speed from dense optical flow of a nadir camera.
#[derive(Debug)]
pub struct OpticalFlowProcessor<F = HornSchunck>
where
    F: DenseFlow,
{
    flow: F,
    settings: FlowSettings,
    lens: Option<LensSpec>,
    resolution: (u32, u32),
    fps: f64,
    /// 上一帧 (working resolution)
    prev_frame: Option<Frame>,
    kalman: ScalarKalman,
    velocity: Vector3<f64>,
    raw_speed: f64,
    confidence: f64,
}

impl Default for OpticalFlowProcessor<HornSchunck> {
    fn default() -> Self {
        Self::new(HornSchunck::default())
    }
}

impl<F> OpticalFlowProcessor<F>
where
    F: DenseFlow,
{
    pub fn new(flow: F) -> Self {
        Self::with_settings(flow, FlowSettings::default(), ScalarKalman::default())
    }

    pub fn with_settings(flow: F, settings: FlowSettings, kalman: ScalarKalman) -> Self {
        Self {
            flow,
            settings,
            lens: None,
            resolution: (0, 0),
            fps: 0.0,
            prev_frame: None,
            kalman,
            velocity: Vector3::zeros(),
            raw_speed: 0.0,
            confidence: 0.0,
        }
    }

    pub fn frame_rate(&self) -> f64 {
        self.fps
    }

    /// Speed before smoothing, from the last successful update.
    pub fn raw_speed(&self) -> f64 {
        self.raw_speed
    }

    pub fn filter(&self) -> &ScalarKalman {
        &self.kalman
    }

    fn is_configured(&self) -> bool {
        let lens_ok = match self.lens {
            Some(LensSpec::FieldOfView(v)) | Some(LensSpec::FocalLength(v)) => v.is_finite() && v > 0.0,
            None => false,
        };
        lens_ok && self.resolution.0 > 0 && self.resolution.1 > 0 && self.fps.is_finite() && self.fps > 0.0
    }

    /// Field of view along the scale axis.
    ///
    /// A focal length is given at the configured resolution, so the angle is
    /// derived there; downscaling changes pixels, not the angle.
    fn fov_deg(&self, lens: LensSpec) -> f64 {
        let (w, h) = self.resolution;
        let extent = self.settings.scale_axis.extent_px(w as usize, h as usize);
        lens.fov_deg(extent)
    }

    fn to_working(&self, frame: &Frame) -> Frame {
        match self.settings.working_width {
            Some(width) => frame.downscaled(width),
            None => frame.clone(),
        }
    }
}

impl<F> VelocityProcessor for OpticalFlowProcessor<F>
where
    F: DenseFlow,
{
    fn set_camera_params(&mut self, lens: LensSpec, resolution: (u32, u32)) {
        self.lens = Some(lens);
        self.resolution = resolution;
    }

    fn set_frame_rate(&mut self, fps: f64) {
        self.fps = fps;
    }

    fn update(&mut self, frame: &Frame, altitude: f64) -> bool {
        if frame.is_empty() {
            log::warn!("empty frame");
            return false;
        }
        let lens = match self.lens {
            Some(lens) if self.is_configured() => lens,
            _ => {
                log::warn!("camera parameters or frame rate not set");
                return false;
            }
        };

        let cur = self.to_working(frame);
        let prev = match self.prev_frame.take() {
            Some(prev) => prev,
            None => {
                log::debug!("first frame stored, no estimate yet");
                self.prev_frame = Some(cur);
                return false;
            }
        };
        if !prev.same_size(&cur) {
            log::warn!(
                "frame size changed {}x{} -> {}x{}, restarting flow",
                prev.width(),
                prev.height(),
                cur.width(),
                cur.height()
            );
            self.prev_frame = Some(cur);
            return false;
        }
        if !(altitude.is_finite() && altitude > 0.0) {
            log::debug!("altitude {} not usable, frame skipped", altitude);
            self.prev_frame = Some(cur);
            return false;
        }

        let field = match self.flow.compute(&prev, &cur) {
            Some(field) => field,
            None => {
                self.prev_frame = Some(cur);
                return false;
            }
        };
        let magnitude = field.mean_magnitude();

        let extent = self.settings.scale_axis.extent_px(cur.width(), cur.height());
        let mpp = meters_per_pixel(altitude, self.fov_deg(lens), extent);

        self.raw_speed = magnitude * mpp * self.fps * self.settings.calibration;
        let speed = self.kalman.update(self.raw_speed);
        log::debug!(
            "flow {:.4} px, {:.5} m/px, raw {:.3} m/s, filtered {:.3} m/s",
            magnitude,
            mpp,
            self.raw_speed,
            speed
        );

        self.velocity = Vector3::new(speed, 0.0, 0.0);
        self.confidence = 1.0;
        self.prev_frame = Some(cur);
        true
    }

    fn velocity(&self) -> Vector3<f64> {
        self.velocity
    }

    fn confidence(&self) -> f64 {
        self.confidence
    }
}
