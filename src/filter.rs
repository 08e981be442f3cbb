//! 一维卡尔曼滤波
//!
//! Random-walk model for a scalar signal. The speed estimator keeps one for
//! the whole session; there is no reset.

use crate::config::*;

#[derive(Debug, Clone, PartialEq)]
pub struct ScalarKalman {
    /// estimate
    x: f64,
    /// error covariance
    p: f64,
    /// process noise
    q: f64,
    /// measurement noise
    r: f64,
    /// last gain
    k: f64,
}

impl Default for ScalarKalman {
    fn default() -> Self {
        Self::new(
            FILTER_PROCESS_NOISE,
            FILTER_MEASUREMENT_NOISE,
            FILTER_INITIAL_COVARIANCE,
            FILTER_INITIAL_ESTIMATE,
        )
    }
}

impl ScalarKalman {
    pub fn new(process_noise: f64, measurement_noise: f64, initial_covariance: f64, initial_estimate: f64) -> Self {
        Self {
            x: initial_estimate,
            p: initial_covariance,
            q: process_noise,
            r: measurement_noise,
            k: 0.0,
        }
    }

    /// Predict then correct with one measurement; returns the new estimate.
    pub fn update(&mut self, measurement: f64) -> f64 {
        self.p += self.q;
        self.k = self.p / (self.p + self.r);
        self.x += self.k * (measurement - self.x);
        self.p *= 1.0 - self.k;
        self.x
    }

    pub fn estimate(&self) -> f64 {
        self.x
    }

    pub fn covariance(&self) -> f64 {
        self.p
    }

    pub fn gain(&self) -> f64 {
        self.k
    }
}
