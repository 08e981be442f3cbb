use serde::{Deserialize, Serialize};

/// GPS 定位类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum FixType {
    NoFix,
    Fix2D,
    Fix3D,
    RtkFloat,
    RtkFixed,
}

impl FixType {
    /// PX4 `fix_type` field: 0-1 no fix, 2 2D, 3 3D, 4 DGPS/RTK float, 5 RTK fixed.
    pub fn from_px4(code: i64) -> Self {
        match code {
            2 => FixType::Fix2D,
            3 => FixType::Fix3D,
            4 => FixType::RtkFloat,
            c if c >= 5 => FixType::RtkFixed,
            _ => FixType::NoFix,
        }
    }
}

/// 大地坐标 (WGS84)
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct GeodeticPosition {
    pub latitude_deg: f64,
    pub longitude_deg: f64,
    pub altitude_m: f64,
    /// Horizontal accuracy estimate.
    pub accuracy_m: Option<f64>,
    pub fix_type: Option<FixType>,
    pub satellites: Option<u32>,
}

impl GeodeticPosition {
    pub const MIN_ALTITUDE_M: f64 = -500.0;
    pub const MAX_ALTITUDE_M: f64 = 9000.0;
    const MIN_SATELLITES: u32 = 3;

    pub fn new(latitude_deg: f64, longitude_deg: f64, altitude_m: f64) -> Self {
        Self {
            latitude_deg,
            longitude_deg,
            altitude_m,
            ..Default::default()
        }
    }

    pub fn with_fix(mut self, fix_type: FixType, satellites: u32, accuracy_m: f64) -> Self {
        self.fix_type = Some(fix_type);
        self.satellites = Some(satellites);
        self.accuracy_m = Some(accuracy_m);
        self
    }

    /// Latitude/longitude inside their ranges.
    pub fn in_range(&self) -> bool {
        self.latitude_deg.is_finite()
            && self.longitude_deg.is_finite()
            && (-90.0..=90.0).contains(&self.latitude_deg)
            && (-180.0..=180.0).contains(&self.longitude_deg)
    }

    /// Full plausibility check. Fix metadata is only checked when present.
    pub fn is_valid(&self) -> bool {
        if !self.in_range() {
            return false;
        }
        if !(Self::MIN_ALTITUDE_M..=Self::MAX_ALTITUDE_M).contains(&self.altitude_m) {
            return false;
        }
        if self.fix_type == Some(FixType::NoFix) {
            return false;
        }
        if let Some(satellites) = self.satellites {
            if satellites < Self::MIN_SATELLITES {
                return false;
            }
        }
        true
    }
}

/// Microsecond log timestamp.
#[derive(Debug, Clone, Copy, Default, PartialEq, PartialOrd)]
pub struct Timestamp(pub f64);

impl Timestamp {
    pub fn as_sec(&self) -> f64 {
        self.0 * crate::config::LOG_TIMESTAMP_SCALE
    }
    /// dt
    pub fn duration_since(&self, other: &Timestamp) -> f64 {
        (self.0 - other.0) * crate::config::LOG_TIMESTAMP_SCALE
    }
}
