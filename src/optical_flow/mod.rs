//! 光流测速
//!
//! Dense flow between consecutive frames, reduced to one magnitude and
//! converted to ground speed.

#[cfg(feature = "cv")]
mod farneback;
mod horn_schunck;
mod processor;

#[cfg(feature = "cv")]
pub use farneback::Farneback;
pub use horn_schunck::HornSchunck;
pub use processor::{FlowSettings, OpticalFlowProcessor};

use nalgebra::Vector3;
use ndarray::{Array2, Zip};

use crate::camera::LensSpec;
use crate::frame::Frame;

/// Per-pixel displacement between two frames, in pixels.
#[derive(Debug, Clone, Default)]
pub struct FlowField {
    pub u: Array2<f32>,
    pub v: Array2<f32>,
}

impl FlowField {
    /// Mean of `sqrt(u^2 + v^2)` over the whole field.
    pub fn mean_magnitude(&self) -> f64 {
        if self.u.is_empty() {
            return 0.0;
        }
        let sum = Zip::from(&self.u)
            .and(&self.v)
            .fold(0.0f64, |acc, &u, &v| acc + ((u * u + v * v) as f64).sqrt());
        sum / self.u.len() as f64
    }

    /// Mean displacement vector (u, v).
    pub fn mean_vector(&self) -> (f64, f64) {
        let u = self.u.mean().unwrap_or(0.0) as f64;
        let v = self.v.mean().unwrap_or(0.0) as f64;
        (u, v)
    }
}

/// A dense optical-flow algorithm. Frames are equally sized.
///
/// `None` is a degenerate frame pair; the caller skips that step.
pub trait DenseFlow {
    fn compute(&mut self, prev: &Frame, cur: &Frame) -> Option<FlowField>;
}

/// 光流处理器的trait
pub trait VelocityProcessor {
    fn set_camera_params(&mut self, lens: LensSpec, resolution: (u32, u32));
    fn set_frame_rate(&mut self, fps: f64);
    /// Feed one frame. `false` means no estimate for this frame.
    fn update(&mut self, frame: &Frame, altitude: f64) -> bool;
    /// Only `x` (forward speed, m/s) is populated.
    fn velocity(&self) -> Vector3<f64>;
    fn confidence(&self) -> f64;
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn mean_magnitude_of_uniform_field() {
        let field = FlowField {
            u: Array2::from_elem((4, 5), 3.0),
            v: Array2::from_elem((4, 5), -4.0),
        };
        assert_abs_diff_eq!(field.mean_magnitude(), 5.0, epsilon = 1e-9);
        assert_eq!(field.mean_vector(), (3.0, -4.0));
    }

    #[test]
    fn magnitude_ignores_direction() {
        // opposite halves cancel in the mean vector but not in the magnitude
        let u = Array2::from_shape_fn((2, 2), |(r, _)| if r == 0 { 1.0 } else { -1.0 });
        let field = FlowField {
            u,
            v: Array2::zeros((2, 2)),
        };
        assert_abs_diff_eq!(field.mean_magnitude(), 1.0, epsilon = 1e-9);
        assert_abs_diff_eq!(field.mean_vector().0, 0.0, epsilon = 1e-9);
    }

    #[test]
    fn empty_field() {
        assert_eq!(FlowField::default().mean_magnitude(), 0.0);
    }
}
