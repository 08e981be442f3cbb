//! 飞行日志
//!
//! PX4 topics exported to CSV. Columns are matched by header name, extra
//! columns are ignored and a missing required column is a load error.

use std::io::Read;
use std::path::Path;

use serde::{de::DeserializeOwned, Deserialize};

use crate::config::{GPS_ALTITUDE_SCALE, GPS_DEGREE_SCALE};
use crate::error::{NavError, Result};
use crate::global_types::{FixType, GeodeticPosition, Timestamp};

/// One row of the local-position topic.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct AttitudeRecord {
    /// Microseconds.
    pub timestamp: f64,
    /// North velocity [m/s].
    pub vx: f64,
    /// East velocity [m/s].
    pub vy: f64,
    /// Down position [m].
    pub z: f64,
    #[serde(default)]
    pub ref_lat: Option<f64>,
    #[serde(default)]
    pub ref_lon: Option<f64>,
}

impl AttitudeRecord {
    /// Height above the local origin: the log stores NED down.
    pub fn altitude(&self) -> f64 {
        -self.z
    }

    /// `atan2(vx, vy)`: 0 when flying East, pi/2 when flying North.
    pub fn heading_rad(&self) -> f64 {
        self.vx.atan2(self.vy)
    }

    /// Heading for display, in [0, 360).
    pub fn heading_deg(&self) -> f64 {
        let deg = self.heading_rad().to_degrees();
        if deg < 0.0 {
            deg + 360.0
        } else {
            deg
        }
    }

    pub fn time(&self) -> Timestamp {
        Timestamp(self.timestamp)
    }
}

/// One row of the GPS topic. Latitude and longitude are degrees * 1e7.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct GpsRecord {
    pub lat: f64,
    pub lon: f64,
    pub vel_m_s: f64,
    #[serde(default)]
    pub timestamp: Option<f64>,
    /// Millimetres above MSL.
    #[serde(default)]
    pub alt: Option<f64>,
    #[serde(default)]
    pub eph: Option<f64>,
    #[serde(default)]
    pub fix_type: Option<i64>,
    #[serde(default)]
    pub satellites_used: Option<u32>,
}

impl GpsRecord {
    pub fn latitude_deg(&self) -> f64 {
        self.lat / GPS_DEGREE_SCALE
    }

    pub fn longitude_deg(&self) -> f64 {
        self.lon / GPS_DEGREE_SCALE
    }

    pub fn altitude_m(&self) -> Option<f64> {
        self.alt.map(|mm| mm / GPS_ALTITUDE_SCALE)
    }

    /// The observation as a fix; `fallback_altitude` is used when the log
    /// has no altitude column.
    pub fn to_fix(&self, fallback_altitude: f64) -> GeodeticPosition {
        GeodeticPosition {
            latitude_deg: self.latitude_deg(),
            longitude_deg: self.longitude_deg(),
            altitude_m: self.altitude_m().unwrap_or(fallback_altitude),
            accuracy_m: self.eph,
            fix_type: self.fix_type.map(FixType::from_px4),
            satellites: self.satellites_used,
        }
    }

    pub fn time(&self) -> Option<Timestamp> {
        self.timestamp.map(Timestamp)
    }
}

/// 读取 csv
pub fn read_records<T, R>(reader: R) -> Result<Vec<T>>
where
    T: DeserializeOwned,
    R: Read,
{
    let mut reader = csv::ReaderBuilder::new().trim(csv::Trim::All).from_reader(reader);
    let records = reader.deserialize().collect::<std::result::Result<Vec<T>, _>>()?;
    Ok(records)
}

pub fn read_records_from_path<T>(path: &Path) -> Result<Vec<T>>
where
    T: DeserializeOwned,
{
    let file = std::fs::File::open(path).map_err(|source| NavError::Input {
        path: path.to_path_buf(),
        source,
    })?;
    let records: Vec<T> = read_records(std::io::BufReader::new(file))?;
    log::info!("{} rows read from {:?}", records.len(), path);
    Ok(records)
}

/// Mean sample rate [Hz] from microsecond timestamps.
pub fn sample_rate_hz<I>(timestamps: I) -> Option<f64>
where
    I: IntoIterator<Item = Timestamp>,
{
    let mut first = None;
    let mut last = None;
    let mut count = 0usize;
    for t in timestamps {
        if first.is_none() {
            first = Some(t);
        }
        last = Some(t);
        count += 1;
    }
    let span = last?.duration_since(&first?);
    if count < 2 || span <= 0.0 {
        return None;
    }
    Some((count - 1) as f64 / span)
}
