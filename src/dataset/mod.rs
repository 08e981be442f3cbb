//! 数据集处理
//!
//! Flight logs exported from PX4 ulog to CSV, and the camera frames recorded
//! during the same flight.
pub mod frames;
pub mod logs;

use std::path::{Path, PathBuf};

pub use frames::{FrameBuffer, FrameSource, ImageSequence};
#[cfg(feature = "cv")]
pub use frames::VideoFile;
pub use logs::{AttitudeRecord, GpsRecord};

use crate::error::Result;

/// Record streams of one flight.
pub trait DatasetTrait {
    fn attitude(&self) -> &[AttitudeRecord];
    fn gps(&self) -> &[GpsRecord];

    /// Attitude log rate [Hz] from its timestamps.
    fn attitude_rate(&self) -> Option<f64> {
        logs::sample_rate_hz(self.attitude().iter().map(|r| r.time()))
    }

    /// GPS log rate [Hz], when the log carries timestamps.
    fn gps_rate(&self) -> Option<f64> {
        logs::sample_rate_hz(self.gps().iter().filter_map(|r| r.time()))
    }
}

/// Attitude and GPS logs loaded fully into memory.
#[derive(Debug, Default, Clone)]
pub struct FlightLogs {
    pub attitude: Vec<AttitudeRecord>,
    pub gps: Vec<GpsRecord>,
}

impl FlightLogs {
    pub fn new(attitude: Vec<AttitudeRecord>, gps: Vec<GpsRecord>) -> Self {
        Self { attitude, gps }
    }

    /// The GPS log is optional in optical-flow-only runs.
    pub fn load(attitude_path: &Path, gps_path: Option<&Path>) -> Result<Self> {
        let attitude = logs::read_records_from_path(attitude_path)?;
        let gps = match gps_path {
            Some(path) => logs::read_records_from_path(path)?,
            None => Vec::new(),
        };
        Ok(Self { attitude, gps })
    }
}

impl DatasetTrait for FlightLogs {
    fn attitude(&self) -> &[AttitudeRecord] {
        &self.attitude
    }

    fn gps(&self) -> &[GpsRecord] {
        &self.gps
    }
}

/// Companion files of `<dir>/<name>` laid out the way the flight recorder
/// writes them: `<name>_converted_trimmed/<name>_vehicle_local_position_0.csv`,
/// `..._vehicle_gps_position_0.csv` and `video_<name without 4-char prefix>.mp4`.
#[derive(Debug, Clone, PartialEq)]
pub struct FlightDirectory {
    pub attitude_log: PathBuf,
    pub gps_log: PathBuf,
    pub video: PathBuf,
    pub basename: String,
}

impl FlightDirectory {
    pub fn resolve(dir: &Path) -> Option<Self> {
        let basename = dir.file_name()?.to_str()?.to_string();
        let logs = dir.join(format!("{}_converted_trimmed", basename));
        let video_suffix = basename.get(4..).unwrap_or("");
        Some(Self {
            attitude_log: logs.join(format!("{}_vehicle_local_position_0.csv", basename)),
            gps_log: logs.join(format!("{}_vehicle_gps_position_0.csv", basename)),
            video: dir.join(format!("video_{}.mp4", video_suffix)),
            basename,
        })
    }
}
