//! 航位推算
//!
//! Integrates speed and heading into an ENU offset from one fixed origin and
//! converts the whole offset back to geodetic coordinates on every step.
//! Re-centring on the previous estimate would compound the linearisation
//! error, so the origin is never moved.

use nalgebra::Vector3;

use crate::config::{HEADING_CORRECTION_DEG, MIN_FIX_MAGNITUDE_DEG};
use crate::global_types::GeodeticPosition;

/// 位置处理器的trait
pub trait PositionProcessor {
    /// One integration step. `false` means the step was not applied.
    fn update(&mut self, reference: &GeodeticPosition, altitude: f64, heading_rad: f64, speed: f64, dt: f64) -> bool;
    /// Current estimate, `None` until an origin is accepted.
    fn position(&self) -> Option<&GeodeticPosition>;
}

/// Position memory of a run.
#[derive(Debug, Clone, PartialEq)]
pub struct DeadReckoningState {
    pub origin: GeodeticPosition,
    pub current: GeodeticPosition,
    /// East, North, Up offset from `origin` [m].
    pub enu: Vector3<f64>,
    pub last_altitude: f64,
    pub last_heading_rad: f64,
    pub last_speed: f64,
}

impl DeadReckoningState {
    pub fn new(origin: GeodeticPosition, altitude: f64, heading_rad: f64, speed: f64) -> Self {
        Self {
            current: origin.clone(),
            origin,
            enu: Vector3::zeros(),
            last_altitude: altitude,
            last_heading_rad: heading_rad,
            last_speed: speed,
        }
    }
}

/// Compass bearing [deg, clockwise from North] of an estimator heading.
#[inline]
pub fn heading_to_bearing_deg(heading_rad: f64) -> f64 {
    -heading_rad.to_degrees() + HEADING_CORRECTION_DEG
}

/// ENU displacement of one step.
pub fn step_displacement(heading_rad: f64, speed: f64, dt: f64, delta_up: f64) -> Vector3<f64> {
    let bearing = heading_to_bearing_deg(heading_rad).to_radians();
    let distance = speed * dt;
    Vector3::new(distance * bearing.sin(), distance * bearing.cos(), delta_up)
}

/// Usable as an origin: a valid fix with no zero (unset) coordinate.
pub fn is_plausible_origin(fix: &GeodeticPosition) -> bool {
    fix.is_valid()
        && fix.latitude_deg.abs() >= MIN_FIX_MAGNITUDE_DEG
        && fix.longitude_deg.abs() >= MIN_FIX_MAGNITUDE_DEG
}

/// Advance `state` by one step. Rejects non-positive altitude and leaves
/// the state untouched in that case.
pub fn integrate(state: &mut DeadReckoningState, altitude: f64, heading_rad: f64, speed: f64, dt: f64) -> bool {
    if altitude.is_nan() || altitude <= 0.0 {
        return false;
    }
    let delta = step_displacement(heading_rad, speed, dt, altitude - state.last_altitude);
    state.enu += delta;
    state.current = GeodeticPosition::from_enu(&state.enu, &state.origin);

    state.last_altitude = altitude;
    state.last_heading_rad = heading_rad;
    state.last_speed = speed;
    true
}

#[derive(Debug, Default)]
pub struct DeadReckoningProcessor {
    state: Option<DeadReckoningState>,
}

impl DeadReckoningProcessor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> Option<&DeadReckoningState> {
        self.state.as_ref()
    }

    pub fn is_initialized(&self) -> bool {
        self.state.is_some()
    }

    /// Chord distance between the estimate and an observed fix.
    pub fn drift_from(&self, observed: &GeodeticPosition) -> Option<f64> {
        self.position().map(|p| p.distance_to(observed))
    }
}

impl PositionProcessor for DeadReckoningProcessor {
    fn update(&mut self, reference: &GeodeticPosition, altitude: f64, heading_rad: f64, speed: f64, dt: f64) -> bool {
        match self.state.as_mut() {
            Some(state) => {
                let applied = integrate(state, altitude, heading_rad, speed, dt);
                if !applied {
                    log::debug!("dead reckoning step rejected, altitude {}", altitude);
                }
                applied
            }
            None => {
                if !is_plausible_origin(reference) {
                    log::warn!(
                        "initial fix ({}, {}) is invalid",
                        reference.latitude_deg,
                        reference.longitude_deg
                    );
                    return false;
                }
                log::info!(
                    "dead reckoning origin ({:.7}, {:.7}, {:.1} m)",
                    reference.latitude_deg,
                    reference.longitude_deg,
                    reference.altitude_m
                );
                self.state = Some(DeadReckoningState::new(reference.clone(), altitude, heading_rad, speed));
                true
            }
        }
    }

    fn position(&self) -> Option<&GeodeticPosition> {
        self.state.as_ref().map(|s| &s.current)
    }
}
