//! 默认参数
//!
//! Compile-time defaults shared by the estimators and the CLI.

/// Initial estimate of the speed filter.
pub const FILTER_INITIAL_ESTIMATE: f64 = 0.0;
/// Initial error covariance of the speed filter.
pub const FILTER_INITIAL_COVARIANCE: f64 = 1.0;
/// Process noise `q`.
pub const FILTER_PROCESS_NOISE: f64 = 0.01;
/// Measurement noise `r`.
pub const FILTER_MEASUREMENT_NOISE: f64 = 0.1;

/// Horn-Schunck smoothness weight.
pub const HS_ALPHA: f32 = 1.0;
/// Horn-Schunck Jacobi iterations per frame pair.
pub const HS_ITERATIONS: usize = 100;

/// Flow is computed on frames downscaled to this width.
pub const WORKING_WIDTH: usize = 480;

/// Optical-flow heading axis is rotated against the compass bearing.
/// bearing = -heading + HEADING_CORRECTION_DEG
pub const HEADING_CORRECTION_DEG: f64 = 90.0;

/// A dead-reckoning origin needs |lat| and |lon| at least this large.
/// One LSB of the 1e-7 degree integer encoding in the GPS log.
pub const MIN_FIX_MAGNITUDE_DEG: f64 = 1e-7;

/// GPS log stores lat/lon as degrees * 1e7.
pub const GPS_DEGREE_SCALE: f64 = 1e7;
/// GPS log stores altitude in millimetres.
pub const GPS_ALTITUDE_SCALE: f64 = 1e3;
/// Log timestamps are microseconds.
pub const LOG_TIMESTAMP_SCALE: f64 = 1e-6;

/// Decimal digits of floating output columns.
pub const OUTPUT_PRECISION: usize = 10;

pub const DEFAULT_FPS: f64 = 30.0;
pub const DEFAULT_FOV_DEG: f64 = 91.0;
pub const DEFAULT_WIDTH_PX: u32 = 1920;
pub const DEFAULT_HEIGHT_PX: u32 = 1080;
pub const DEFAULT_ALTITUDE_M: f64 = 100.0;
