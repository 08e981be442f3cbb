//! 命令行参数
use std::path::{Path, PathBuf};

use clap::{ArgAction, Parser};

use crate::camera::{CameraParameters, CameraParametersTrait, LensSpec};
use crate::config::{DEFAULT_ALTITUDE_M, DEFAULT_FOV_DEG, DEFAULT_HEIGHT_PX, DEFAULT_WIDTH_PX, WORKING_WIDTH};
use crate::dataset::FlightDirectory;
use crate::error::{NavError, Result};
use crate::optical_flow::FlowSettings;
use crate::session::{Mode, SessionConfig};

/// Ground speed from nadir video and dead-reckoned position from flight logs.
#[derive(Parser, Debug, Clone)]
#[command(name = "flora-nav", version, disable_version_flag = true)]
pub struct Args {
    /// Flight directory holding `<name>_converted_trimmed/` logs and `video_*.mp4`
    #[arg(long)]
    pub flight_dir: Option<PathBuf>,

    /// Attitude log (vehicle_local_position CSV)
    #[arg(short = 'f', long = "file")]
    pub attitude_log: Option<PathBuf>,

    /// GPS log (vehicle_gps_position CSV)
    #[arg(short = 'g', long = "gps")]
    pub gps_log: Option<PathBuf>,

    /// Video file or directory of numbered images
    #[arg(short = 'c', long)]
    pub video: Option<PathBuf>,

    /// Output CSV, stdout when omitted
    #[arg(short = 'o', long)]
    pub output: Option<PathBuf>,

    /// Frames per second, overrides the video's own rate
    #[arg(short = 'F', long)]
    pub fps: Option<f64>,

    /// Camera field of view in degrees
    #[arg(short = 'V', long, default_value_t = DEFAULT_FOV_DEG)]
    pub fov: f64,

    /// Focal length in pixels, used instead of --fov
    #[arg(long)]
    pub focal_length: Option<f64>,

    /// Video width in pixels
    #[arg(short = 'W', long, default_value_t = DEFAULT_WIDTH_PX)]
    pub width: u32,

    /// Video height in pixels
    #[arg(short = 'H', long, default_value_t = DEFAULT_HEIGHT_PX)]
    pub height: u32,

    /// Altitude in meters for --only-of
    #[arg(short = 'A', long = "alt", default_value_t = DEFAULT_ALTITUDE_M)]
    pub altitude: f64,

    /// Only process optical flow
    #[arg(short = 'O', long, conflicts_with = "only_dr")]
    pub only_of: bool,

    /// Only process dead reckoning
    #[arg(short = 'D', long)]
    pub only_dr: bool,

    /// Camera parameter JSON, replaces --fov/--focal-length/--width/--height
    #[arg(long)]
    pub camera: Option<PathBuf>,

    /// ESRI ASCII elevation grid for the origin altitude
    #[arg(long)]
    pub dem: Option<PathBuf>,

    /// Width flow is computed at, 0 keeps the native resolution
    #[arg(long, default_value_t = WORKING_WIDTH)]
    pub working_width: usize,

    /// Common rate [Hz] the streams are decimated to
    #[arg(long)]
    pub target_hz: Option<f64>,

    /// Multiplier applied to the raw optical-flow speed
    #[arg(long, default_value_t = 1.0)]
    pub calibration: f64,

    /// Use OpenCV Farneback flow instead of Horn-Schunck
    #[cfg(feature = "cv")]
    #[arg(long)]
    pub farneback: bool,

    /// Show version
    #[arg(short = 'v', long, action = ArgAction::Version)]
    #[allow(dead_code)]
    version: Option<bool>,
}

/// Input files after combining `--flight-dir` with explicit paths.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Inputs {
    pub attitude_log: Option<PathBuf>,
    pub gps_log: Option<PathBuf>,
    pub video: Option<PathBuf>,
}

fn existing(path: PathBuf) -> Option<PathBuf> {
    path.exists().then_some(path)
}

fn required<'a>(path: &'a Option<PathBuf>, what: &str) -> Result<&'a Path> {
    path.as_deref()
        .ok_or_else(|| NavError::Config(format!("{} is required in this mode", what)))
}

impl Args {
    pub fn mode(&self) -> Mode {
        if self.only_of {
            Mode::OpticalFlowOnly
        } else if self.only_dr {
            Mode::DeadReckoningOnly
        } else {
            Mode::Both
        }
    }

    pub fn camera_parameters(&self) -> Result<CameraParameters> {
        if let Some(path) = &self.camera {
            return CameraParameters::read_from_json(path);
        }
        let lens = match self.focal_length {
            Some(focal) => LensSpec::FocalLength(focal),
            None => LensSpec::FieldOfView(self.fov),
        };
        let camera = CameraParameters::new("cli", lens, (self.width, self.height));
        if !camera.is_configured() {
            return Err(NavError::Config(format!(
                "lens {:?} at {}x{} is not usable",
                lens, self.width, self.height
            )));
        }
        if let LensSpec::FieldOfView(fov) = lens {
            if fov >= 180.0 {
                return Err(NavError::Config(format!("field of view {} must be below 180", fov)));
            }
        }
        Ok(camera)
    }

    pub fn session_config(&self) -> Result<SessionConfig> {
        if let Some(fps) = self.fps {
            if !(fps.is_finite() && fps > 0.0) {
                return Err(NavError::Config(format!("fps {} must be positive", fps)));
            }
        }
        if !(self.calibration.is_finite() && self.calibration > 0.0) {
            return Err(NavError::Config(format!(
                "calibration {} must be positive",
                self.calibration
            )));
        }
        let mode = self.mode();
        if mode == Mode::OpticalFlowOnly && !(self.altitude.is_finite() && self.altitude > 0.0) {
            return Err(NavError::Config(format!("altitude {} must be positive", self.altitude)));
        }
        Ok(SessionConfig {
            mode,
            camera: self.camera_parameters()?,
            fps: self.fps,
            altitude_m: self.altitude,
            flow: FlowSettings {
                working_width: (self.working_width > 0).then_some(self.working_width),
                calibration: self.calibration,
                ..Default::default()
            },
            target_hz: self.target_hz,
        })
    }

    /// Explicit paths win over the flight-directory layout; layout paths are
    /// only used when the file exists.
    pub fn inputs(&self) -> Result<Inputs> {
        let layout = self.flight_dir.as_deref().and_then(FlightDirectory::resolve);
        let (attitude, gps, video) = match layout {
            Some(l) => (existing(l.attitude_log), existing(l.gps_log), existing(l.video)),
            None => (None, None, None),
        };
        let inputs = Inputs {
            attitude_log: self.attitude_log.clone().or(attitude),
            gps_log: self.gps_log.clone().or(gps),
            video: self.video.clone().or(video),
        };

        match self.mode() {
            Mode::Both => {
                required(&inputs.attitude_log, "attitude log (-f)")?;
                required(&inputs.video, "video (-c)")?;
            }
            Mode::OpticalFlowOnly => {
                required(&inputs.video, "video (-c)")?;
            }
            Mode::DeadReckoningOnly => {
                required(&inputs.attitude_log, "attitude log (-f)")?;
                required(&inputs.gps_log, "GPS log (-g)")?;
            }
        }
        Ok(inputs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    fn parse(args: &[&str]) -> Args {
        Args::try_parse_from(std::iter::once("flora-nav").chain(args.iter().copied())).unwrap()
    }

    #[test]
    fn command_is_well_formed() {
        Args::command().debug_assert();
    }

    #[test]
    fn defaults() {
        let args = parse(&["-f", "log.csv", "-c", "frames"]);
        assert_eq!(args.mode(), Mode::Both);
        let config = args.session_config().unwrap();
        assert_eq!(config.camera.resolution(), (1920, 1080));
        assert_eq!(config.camera.lens, LensSpec::FieldOfView(91.0));
        assert_eq!(config.altitude_m, 100.0);
        assert_eq!(config.flow.working_width, Some(480));
        assert!(config.fps.is_none());
    }

    #[test]
    fn short_flags() {
        let args = parse(&[
            "-c", "v.mp4", "-o", "out.csv", "-F", "25", "-V", "80", "-W", "1280", "-H", "720", "-A", "50", "-O",
        ]);
        assert_eq!(args.mode(), Mode::OpticalFlowOnly);
        let config = args.session_config().unwrap();
        assert_eq!(config.fps, Some(25.0));
        assert_eq!(config.camera.resolution(), (1280, 720));
        assert_eq!(config.camera.lens, LensSpec::FieldOfView(80.0));
        assert_eq!(config.altitude_m, 50.0);
        assert_eq!(args.output.as_deref(), Some(Path::new("out.csv")));
    }

    #[test]
    fn exclusive_modes() {
        let both = std::iter::once("flora-nav").chain(["-O", "-D"]);
        assert!(Args::try_parse_from(both).is_err());
        assert_eq!(parse(&["-D"]).mode(), Mode::DeadReckoningOnly);
    }

    #[test]
    fn focal_length_and_native_width() {
        let args = parse(&["--focal-length", "1000", "--working-width", "0"]);
        let config = args.session_config().unwrap();
        assert_eq!(config.camera.lens, LensSpec::FocalLength(1000.0));
        assert_eq!(config.flow.working_width, None);
    }

    #[test]
    fn rejects_bad_values() {
        assert!(parse(&["-F", "0"]).session_config().is_err());
        assert!(parse(&["-V", "0"]).session_config().is_err());
        assert!(parse(&["-V", "180"]).session_config().is_err());
        assert!(parse(&["-W", "0"]).session_config().is_err());
        assert!(parse(&["--calibration=-1"]).session_config().is_err());
        assert!(parse(&["-O", "-A", "0"]).session_config().is_err());
    }

    #[test]
    fn required_inputs_per_mode() {
        assert!(parse(&["-c", "v.mp4"]).inputs().is_err());
        assert!(parse(&["-O", "-c", "v.mp4"]).inputs().is_ok());
        assert!(parse(&["-D", "-f", "log.csv"]).inputs().is_err());
        let inputs = parse(&["-D", "-f", "log.csv", "-g", "gps.csv"]).inputs().unwrap();
        assert_eq!(inputs.gps_log.as_deref(), Some(Path::new("gps.csv")));
        assert!(inputs.video.is_none());
    }
}
