//! 导航会话
//!
//! Drives the optical-flow speed estimator and the dead-reckoning integrator
//! over synchronized log and video streams and writes one CSV row per
//! processed step.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use crate::camera::{CameraParameters, LensSpec};
use crate::config::{
    DEFAULT_ALTITUDE_M, DEFAULT_FOV_DEG, DEFAULT_HEIGHT_PX, DEFAULT_WIDTH_PX, OUTPUT_PRECISION,
};
use crate::dataset::{AttitudeRecord, DatasetTrait, FlightLogs, FrameSource, GpsRecord};
use crate::dead_reckoning::{DeadReckoningProcessor, PositionProcessor};
use crate::error::{NavError, Result};
use crate::filter::ScalarKalman;
use crate::frame::Frame;
use crate::global_types::{GeodeticPosition, Timestamp};
use crate::optical_flow::{DenseFlow, FlowSettings, HornSchunck, OpticalFlowProcessor, VelocityProcessor};
use crate::sync::{slowest_rate, strides_from_counts, strides_from_rates, SyncSchedule};
use crate::terrain::TerrainOracle;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Mode {
    /// Video speed fed into dead reckoning.
    #[default]
    Both,
    /// Video only, at a fixed altitude.
    OpticalFlowOnly,
    /// Logs only, GPS ground speed fed into dead reckoning.
    DeadReckoningOnly,
}

#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub mode: Mode,
    pub camera: CameraParameters,
    /// Overrides the frame source rate.
    pub fps: Option<f64>,
    /// Altitude of optical-flow-only runs.
    pub altitude_m: f64,
    pub flow: FlowSettings,
    /// Common rate the streams are decimated to. `None` decimates by
    /// sample counts.
    pub target_hz: Option<f64>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            mode: Mode::Both,
            camera: CameraParameters::new(
                "nadir",
                LensSpec::FieldOfView(DEFAULT_FOV_DEG),
                (DEFAULT_WIDTH_PX, DEFAULT_HEIGHT_PX),
            ),
            fps: None,
            altitude_m: DEFAULT_ALTITUDE_M,
            flow: FlowSettings::default(),
            target_hz: None,
        }
    }
}

/// One output line.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct OutputRow {
    pub frame_number: usize,
    pub speed_mps: f64,
    pub altitude: f64,
    pub heading_deg: f64,
    pub dr_lat: f64,
    pub dr_lon: f64,
    pub gps_lat: f64,
    pub gps_lon: f64,
    pub gps_vel: Option<f64>,
}

pub const FULL_HEADER: [&str; 9] = [
    "frame_number",
    "speed_mps",
    "altitude",
    "heading_deg",
    "dr_lat",
    "dr_lon",
    "gps_lat",
    "gps_lon",
    "gps_vel",
];
pub const SPEED_HEADER: [&str; 2] = ["frame_number", "speed_mps"];

fn fixed(value: f64) -> String {
    format!("{:.*}", OUTPUT_PRECISION, value)
}

/// CSV sink with a header row and fixed-precision floats.
pub struct OutputWriter<W: Write> {
    writer: csv::Writer<W>,
    speed_only: bool,
    target: PathBuf,
    rows: usize,
}

impl OutputWriter<BufWriter<File>> {
    pub fn create(path: &Path, mode: Mode) -> Result<Self> {
        let file = File::create(path).map_err(|source| NavError::Output {
            path: path.to_path_buf(),
            source,
        })?;
        let mut writer = Self::new(BufWriter::new(file), mode)?;
        writer.target = path.to_path_buf();
        Ok(writer)
    }
}

impl<W: Write> OutputWriter<W> {
    pub fn new(inner: W, mode: Mode) -> Result<Self> {
        let mut writer = Self {
            writer: csv::Writer::from_writer(inner),
            speed_only: mode == Mode::OpticalFlowOnly,
            target: PathBuf::from("-"),
            rows: 0,
        };
        if writer.speed_only {
            writer.write_fields(&SPEED_HEADER)?;
        } else {
            writer.write_fields(&FULL_HEADER)?;
        }
        Ok(writer)
    }

    fn output_error(&self, e: csv::Error) -> NavError {
        NavError::Output {
            path: self.target.clone(),
            source: e.into(),
        }
    }

    fn write_fields<T: AsRef<[u8]>>(&mut self, fields: &[T]) -> Result<()> {
        self.writer.write_record(fields).map_err(|e| self.output_error(e))
    }

    pub fn write_row(&mut self, row: &OutputRow) -> Result<()> {
        if self.speed_only {
            self.write_fields(&[row.frame_number.to_string(), fixed(row.speed_mps)])?;
        } else {
            self.write_fields(&[
                row.frame_number.to_string(),
                fixed(row.speed_mps),
                fixed(row.altitude),
                fixed(row.heading_deg),
                fixed(row.dr_lat),
                fixed(row.dr_lon),
                fixed(row.gps_lat),
                fixed(row.gps_lon),
                row.gps_vel.map(fixed).unwrap_or_default(),
            ])?;
        }
        self.rows += 1;
        Ok(())
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn flush(&mut self) -> Result<()> {
        self.writer.flush().map_err(|source| NavError::Output {
            path: self.target.clone(),
            source,
        })
    }

    pub fn into_inner(self) -> Result<W> {
        let target = self.target;
        self.writer.into_inner().map_err(|e| NavError::Output {
            path: target,
            source: e.into_error(),
        })
    }
}

/// Running statistics of the distance between dead reckoning and GPS.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct DriftStats {
    pub samples: usize,
    pub mean_m: f64,
    pub max_m: f64,
    pub last_m: f64,
}

impl DriftStats {
    pub fn push(&mut self, distance_m: f64) {
        self.samples += 1;
        self.mean_m += (distance_m - self.mean_m) / self.samples as f64;
        self.max_m = self.max_m.max(distance_m);
        self.last_m = distance_m;
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct RunSummary {
    pub steps: usize,
    pub rows_written: usize,
    pub flow_skipped: usize,
    pub dead_reckoning_skipped: usize,
    pub drift: DriftStats,
    pub final_position: Option<GeodeticPosition>,
}

/// Reads frames at increasing indices, skipping the ones in between.
struct FrameCursor<'a> {
    source: &'a mut dyn FrameSource,
    next_index: usize,
}

impl<'a> FrameCursor<'a> {
    fn new(source: &'a mut dyn FrameSource) -> Self {
        Self { source, next_index: 0 }
    }

    fn frame_at(&mut self, index: usize) -> Result<Option<Frame>> {
        if index > self.next_index {
            self.next_index += self.source.skip(index - self.next_index)?;
            if self.next_index < index {
                return Ok(None);
            }
        }
        let frame = self.source.next_frame()?;
        if frame.is_some() {
            self.next_index += 1;
        }
        Ok(frame)
    }
}

pub struct NavSession<F = HornSchunck>
where
    F: DenseFlow,
{
    config: SessionConfig,
    optical_flow: OpticalFlowProcessor<F>,
    dead_reckoning: DeadReckoningProcessor,
    terrain: Option<Box<dyn TerrainOracle>>,
}

impl NavSession<HornSchunck> {
    pub fn new(config: SessionConfig) -> Self {
        Self::with_flow(config, HornSchunck::default())
    }
}

impl<F> NavSession<F>
where
    F: DenseFlow,
{
    pub fn with_flow(config: SessionConfig, flow: F) -> Self {
        let mut optical_flow = OpticalFlowProcessor::with_settings(flow, config.flow.clone(), ScalarKalman::default());
        optical_flow.set_camera_params(config.camera.lens, config.camera.resolution());
        Self {
            config,
            optical_flow,
            dead_reckoning: DeadReckoningProcessor::new(),
            terrain: None,
        }
    }

    /// Ground height for the origin when the GPS log has no altitude.
    pub fn with_terrain(mut self, terrain: Box<dyn TerrainOracle>) -> Self {
        self.terrain = Some(terrain);
        self
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn optical_flow(&self) -> &OpticalFlowProcessor<F> {
        &self.optical_flow
    }

    pub fn dead_reckoning(&self) -> &DeadReckoningProcessor {
        &self.dead_reckoning
    }

    /// Process every synchronized step. `frames` is required unless the
    /// session runs dead reckoning only.
    pub fn run<W: Write>(
        &mut self,
        logs: &FlightLogs,
        frames: Option<&mut dyn FrameSource>,
        out: &mut OutputWriter<W>,
    ) -> Result<RunSummary> {
        let mut summary = match (self.config.mode, frames) {
            (Mode::DeadReckoningOnly, _) => self.run_dead_reckoning_only(logs, out)?,
            (Mode::OpticalFlowOnly, Some(frames)) => self.run_optical_flow_only(frames, out)?,
            (Mode::Both, Some(frames)) => self.run_both(logs, frames, out)?,
            (mode, None) => {
                return Err(NavError::Config(format!("{:?} mode needs a frame source", mode)));
            }
        };
        out.flush()?;
        summary.final_position = self.dead_reckoning.position().cloned();

        log::info!(
            "{} steps, {} rows written, {} without speed, {} without position",
            summary.steps,
            summary.rows_written,
            summary.flow_skipped,
            summary.dead_reckoning_skipped
        );
        if summary.drift.samples > 0 {
            log::info!(
                "drift from GPS: mean {:.2} m, max {:.2} m, last {:.2} m",
                summary.drift.mean_m,
                summary.drift.max_m,
                summary.drift.last_m
            );
        }
        Ok(summary)
    }

    fn resolve_fps(&self, frames: &dyn FrameSource) -> Result<f64> {
        let fps = self.config.fps.unwrap_or_else(|| frames.fps());
        if !(fps.is_finite() && fps > 0.0) {
            return Err(NavError::Config(format!("frame rate {} must be positive", fps)));
        }
        Ok(fps)
    }

    /// Streams in order: attitude, video (if any), GPS (if any).
    fn schedule(&self, logs: &FlightLogs, video: Option<(f64, Option<usize>)>) -> SyncSchedule {
        let mut rates = vec![logs.attitude_rate().unwrap_or(f64::NAN)];
        let mut counts = vec![Some(logs.attitude.len())];
        if let Some((fps, count)) = video {
            rates.push(fps);
            counts.push(count);
        }
        if !logs.gps.is_empty() {
            rates.push(logs.gps_rate().unwrap_or(f64::NAN));
            counts.push(Some(logs.gps.len()));
        }

        let known_counts: Option<Vec<usize>> = counts.iter().copied().collect();
        let strides = match (self.config.target_hz, known_counts) {
            (Some(target), _) => strides_from_rates(&rates, target),
            (None, Some(counts)) => strides_from_counts(&counts),
            (None, None) => match slowest_rate(&rates) {
                Some(target) => strides_from_rates(&rates, target),
                None => vec![1; rates.len()],
            },
        };
        log::info!("stream strides {:?}", strides);
        SyncSchedule::new(strides, counts)
    }

    /// Fix that anchors dead reckoning and is reported as `gps_*`.
    fn reference_fix(
        &self,
        record: &AttitudeRecord,
        gps: Option<&GpsRecord>,
        altitude: f64,
    ) -> Option<GeodeticPosition> {
        let (lat, lon) = match gps {
            Some(gps) => (gps.latitude_deg(), gps.longitude_deg()),
            None => (record.ref_lat?, record.ref_lon?),
        };
        let has_gps_altitude = gps.and_then(GpsRecord::altitude_m).is_some();
        // terrain only anchors the origin; afterwards follow the estimate
        let fallback_altitude = match (self.dead_reckoning.position(), self.terrain.as_ref()) {
            _ if has_gps_altitude => altitude,
            (Some(position), _) => position.altitude_m,
            (None, Some(terrain)) => terrain
                .sample_lat_lon(lat, lon)
                .map(|ground| ground + altitude)
                .unwrap_or(altitude),
            (None, None) => altitude,
        };
        Some(match gps {
            Some(gps) => gps.to_fix(fallback_altitude),
            None => GeodeticPosition::new(lat, lon, fallback_altitude),
        })
    }

    fn integrate_and_write<W: Write>(
        &mut self,
        step: Step<'_>,
        summary: &mut RunSummary,
        out: &mut OutputWriter<W>,
    ) -> Result<()> {
        let altitude = step.record.altitude();
        let Some(reference) = self.reference_fix(step.record, step.gps, altitude) else {
            summary.dead_reckoning_skipped += 1;
            return Ok(());
        };
        if !self
            .dead_reckoning
            .update(&reference, altitude, step.record.heading_rad(), step.speed, step.dt)
        {
            log::debug!("step {}: dead reckoning skipped", step.frame_number);
            summary.dead_reckoning_skipped += 1;
            return Ok(());
        }
        let Some(position) = self.dead_reckoning.position() else {
            summary.dead_reckoning_skipped += 1;
            return Ok(());
        };
        let row = OutputRow {
            frame_number: step.frame_number,
            speed_mps: step.speed,
            altitude,
            heading_deg: step.record.heading_deg(),
            dr_lat: position.latitude_deg,
            dr_lon: position.longitude_deg,
            gps_lat: reference.latitude_deg,
            gps_lon: reference.longitude_deg,
            gps_vel: step.gps.map(|g| g.vel_m_s),
        };
        if step.gps.is_some() {
            summary.drift.push(position.distance_to(&reference));
        }
        log::debug!(
            "step {}: {:.3} m/s, dr ({:.7}, {:.7})",
            row.frame_number,
            row.speed_mps,
            row.dr_lat,
            row.dr_lon
        );
        out.write_row(&row)?;
        summary.rows_written += 1;
        Ok(())
    }

    fn run_both<W: Write>(
        &mut self,
        logs: &FlightLogs,
        frames: &mut dyn FrameSource,
        out: &mut OutputWriter<W>,
    ) -> Result<RunSummary> {
        if logs.attitude.is_empty() {
            return Err(NavError::Config("attitude log is empty".into()));
        }
        let has_gps = !logs.gps.is_empty();
        if !has_gps && logs.attitude[0].ref_lat.is_none() {
            return Err(NavError::Config(
                "no GPS log and no ref_lat/ref_lon in the attitude log".into(),
            ));
        }
        let fps = self.resolve_fps(frames)?;
        self.optical_flow.set_frame_rate(fps);

        let schedule = self.schedule(logs, Some((fps, frames.frame_count())));
        let dt = schedule.strides()[1] as f64 / fps;
        let mut cursor = FrameCursor::new(frames);
        let mut summary = RunSummary::default();

        for indices in schedule {
            let Some(frame) = cursor.frame_at(indices[1])? else {
                break;
            };
            summary.steps += 1;
            let record = &logs.attitude[indices[0]];
            let frame_number = indices[1] + 1;
            if !self.optical_flow.update(&frame, record.altitude()) {
                log::debug!("frame {}: no speed estimate", frame_number);
                summary.flow_skipped += 1;
                continue;
            }
            let step = Step {
                frame_number,
                record,
                gps: has_gps.then(|| &logs.gps[indices[2]]),
                speed: self.optical_flow.velocity().x,
                dt,
            };
            self.integrate_and_write(step, &mut summary, out)?;
        }
        Ok(summary)
    }

    fn run_optical_flow_only<W: Write>(
        &mut self,
        frames: &mut dyn FrameSource,
        out: &mut OutputWriter<W>,
    ) -> Result<RunSummary> {
        let fps = self.resolve_fps(frames)?;
        self.optical_flow.set_frame_rate(fps);
        let altitude = self.config.altitude_m;
        let mut summary = RunSummary::default();

        while let Some(frame) = frames.next_frame()? {
            summary.steps += 1;
            if !self.optical_flow.update(&frame, altitude) {
                summary.flow_skipped += 1;
                continue;
            }
            let row = OutputRow {
                frame_number: summary.steps,
                speed_mps: self.optical_flow.velocity().x,
                altitude,
                ..Default::default()
            };
            log::debug!("frame {}: {:.3} m/s", row.frame_number, row.speed_mps);
            out.write_row(&row)?;
            summary.rows_written += 1;
        }
        Ok(summary)
    }

    fn run_dead_reckoning_only<W: Write>(
        &mut self,
        logs: &FlightLogs,
        out: &mut OutputWriter<W>,
    ) -> Result<RunSummary> {
        if logs.attitude.is_empty() || logs.gps.is_empty() {
            return Err(NavError::Config(
                "dead reckoning without video needs attitude and GPS logs".into(),
            ));
        }
        let schedule = self.schedule(logs, None);
        let mut summary = RunSummary::default();
        let mut last_time: Option<Timestamp> = None;

        for indices in schedule {
            summary.steps += 1;
            let record = &logs.attitude[indices[0]];
            let gps = &logs.gps[indices[1]];
            let dt = last_time
                .map(|t| record.time().duration_since(&t).max(0.0))
                .unwrap_or(0.0);
            last_time = Some(record.time());

            let step = Step {
                frame_number: indices[0] + 1,
                record,
                gps: Some(gps),
                speed: gps.vel_m_s,
                dt,
            };
            self.integrate_and_write(step, &mut summary, out)?;
        }
        Ok(summary)
    }
}

/// Inputs of one dead-reckoning step.
struct Step<'a> {
    frame_number: usize,
    record: &'a AttitudeRecord,
    gps: Option<&'a GpsRecord>,
    speed: f64,
    dt: f64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::logs::read_records;
    use crate::dataset::FrameBuffer;
    use crate::optical_flow::FlowField;
    use crate::terrain::{AsciiGrid, GeoTransform};
    use approx::assert_abs_diff_eq;
    use ndarray::Array2;
    use std::cell::Cell;
    use std::rc::Rc;

    /// Every pixel moves `1` px per frame.
    struct UnitFlow;

    impl DenseFlow for UnitFlow {
        fn compute(&mut self, prev: &Frame, _cur: &Frame) -> Option<FlowField> {
            let dim = prev.luma().dim();
            Some(FlowField {
                u: Array2::from_elem(dim, 1.0),
                v: Array2::zeros(dim),
            })
        }
    }

    fn frames(n: usize) -> FrameBuffer {
        let frame = Frame::from_luma(Array2::from_shape_fn((12, 16), |(r, c)| (r * 16 + c) as f32));
        FrameBuffer::new(vec![frame; n], 10.0)
    }

    /// Flying East at 30 m, 10 Hz.
    fn attitude(n: usize) -> Vec<AttitudeRecord> {
        let mut text = String::from("timestamp,vx,vy,z,ref_lat,ref_lon\n");
        for i in 0..n {
            text.push_str(&format!("{},0.0,4.0,-30.0,52.2297,21.0122\n", i * 100_000));
        }
        read_records(text.as_bytes()).unwrap()
    }

    fn gps(n: usize) -> Vec<GpsRecord> {
        let mut text = String::from("timestamp,lat,lon,alt,vel_m_s\n");
        for i in 0..n {
            text.push_str(&format!("{},522297000,210122000,130000,4.0\n", i * 100_000));
        }
        read_records(text.as_bytes()).unwrap()
    }

    fn config(mode: Mode) -> SessionConfig {
        SessionConfig {
            mode,
            camera: CameraParameters::new("test", LensSpec::FieldOfView(90.0), (16, 12)),
            flow: FlowSettings {
                working_width: None,
                ..Default::default()
            },
            altitude_m: 6.0,
            ..Default::default()
        }
    }

    fn output<W: Write>(out: OutputWriter<W>) -> String
    where
        W: Into<Vec<u8>>,
    {
        String::from_utf8(out.into_inner().unwrap().into()).unwrap()
    }

    #[test]
    fn fixed_precision_rows() {
        let mut out = OutputWriter::new(Vec::new(), Mode::Both).unwrap();
        out.write_row(&OutputRow {
            frame_number: 7,
            speed_mps: 1.5,
            altitude: 30.0,
            heading_deg: 90.0,
            dr_lat: 52.2297,
            dr_lon: 21.0122,
            gps_lat: 52.2297,
            gps_lon: 21.0122,
            gps_vel: None,
        })
        .unwrap();
        assert_eq!(out.rows(), 1);
        let text = output(out);
        let mut lines = text.lines();
        assert_eq!(lines.next().unwrap(), FULL_HEADER.join(","));
        assert_eq!(
            lines.next().unwrap(),
            "7,1.5000000000,30.0000000000,90.0000000000,52.2297000000,21.0122000000,52.2297000000,21.0122000000,"
        );
    }

    #[test]
    fn both_mode_integrates_video_speed() {
        let logs = FlightLogs::new(attitude(5), gps(5));
        let mut source = frames(5);
        let mut session = NavSession::with_flow(config(Mode::Both), UnitFlow);
        let mut out = OutputWriter::new(Vec::new(), Mode::Both).unwrap();
        let summary = session.run(&logs, Some(&mut source), &mut out).unwrap();

        // first frame only primes the estimator
        assert_eq!(summary.steps, 5);
        assert_eq!(summary.flow_skipped, 1);
        assert_eq!(summary.rows_written, 4);
        assert_eq!(summary.drift.samples, 4);

        // 1 px * (2 * 30 * tan 45 / 12) m/px * 10 fps
        let raw = 50.0;
        assert_abs_diff_eq!(session.optical_flow().raw_speed(), raw, epsilon = 1e-9);

        let state = session.dead_reckoning().state().unwrap();
        assert_eq!(state.origin.latitude_deg, 52.2297);
        assert_abs_diff_eq!(state.origin.altitude_m, 130.0, epsilon = 1e-9);
        // heading East, first accepted step only anchors the origin
        assert!(state.enu.x > 0.0);
        assert_abs_diff_eq!(state.enu.y, 0.0, epsilon = 1e-6);
        let final_position = summary.final_position.unwrap();
        assert!(final_position.longitude_deg > 21.0122);
        assert_abs_diff_eq!(summary.drift.last_m, state.enu.norm(), epsilon = 1e-3);

        let text = output(out);
        let rows: Vec<&str> = text.lines().collect();
        assert_eq!(rows.len(), 5);
        assert!(rows[1].starts_with("2,"));
        assert!(rows[1].ends_with(",4.0000000000"));
    }

    #[test]
    fn optical_flow_only_writes_speed_column() {
        let mut source = frames(3);
        let mut session = NavSession::with_flow(config(Mode::OpticalFlowOnly), UnitFlow);
        let mut out = OutputWriter::new(Vec::new(), Mode::OpticalFlowOnly).unwrap();
        let summary = session
            .run(&FlightLogs::default(), Some(&mut source), &mut out)
            .unwrap();
        assert_eq!(summary.rows_written, 2);
        assert!(summary.final_position.is_none());

        let text = output(out);
        let rows: Vec<&str> = text.lines().collect();
        assert_eq!(rows[0], "frame_number,speed_mps");
        assert!(rows[1].starts_with("2,"));
        assert_eq!(rows[1].split(',').count(), 2);
    }

    #[test]
    fn dead_reckoning_only_uses_gps_speed_and_log_time() {
        let logs = FlightLogs::new(attitude(11), gps(11));
        let mut session = NavSession::new(config(Mode::DeadReckoningOnly));
        let mut out = OutputWriter::new(Vec::new(), Mode::DeadReckoningOnly).unwrap();
        let summary = session.run(&logs, None, &mut out).unwrap();

        assert_eq!(summary.steps, 11);
        assert_eq!(summary.rows_written, 11);
        // 10 steps of 0.1 s at 4 m/s towards East
        let enu = session.dead_reckoning().state().unwrap().enu;
        assert_abs_diff_eq!(enu.x, 4.0, epsilon = 1e-9);
        assert_abs_diff_eq!(summary.drift.max_m, 4.0, epsilon = 1e-3);
    }

    #[test]
    fn attitude_reference_without_gps_log() {
        let logs = FlightLogs::new(attitude(3), Vec::new());
        let mut source = frames(3);
        let mut session = NavSession::with_flow(config(Mode::Both), UnitFlow);
        let mut out = OutputWriter::new(Vec::new(), Mode::Both).unwrap();
        let summary = session.run(&logs, Some(&mut source), &mut out).unwrap();
        assert_eq!(summary.rows_written, 2);
        assert_eq!(summary.drift.samples, 0);
        // no altitude anywhere: the origin sits at the flight altitude
        let origin = &session.dead_reckoning().state().unwrap().origin;
        assert_eq!(origin.altitude_m, 30.0);
    }

    #[test]
    fn terrain_fills_missing_gps_altitude() {
        let gps: Vec<GpsRecord> = read_records("lat,lon,vel_m_s\n522297000,210122000,4.0\n".as_bytes()).unwrap();
        let logs = FlightLogs::new(attitude(1), gps);
        let grid = AsciiGrid::new(
            Array2::from_elem((1, 1), 95.0),
            GeoTransform {
                origin_x: 21.0,
                pixel_x: 1.0,
                origin_y: 53.0,
                pixel_y: -1.0,
            },
            None,
        );
        let mut session = NavSession::new(config(Mode::DeadReckoningOnly)).with_terrain(Box::new(grid));
        let mut out = OutputWriter::new(Vec::new(), Mode::DeadReckoningOnly).unwrap();
        session.run(&logs, None, &mut out).unwrap();
        let origin = &session.dead_reckoning().state().unwrap().origin;
        assert_eq!(origin.altitude_m, 125.0);
    }

    /// Flat ground that counts its lookups.
    struct CountingTerrain(Rc<Cell<usize>>);

    impl TerrainOracle for CountingTerrain {
        fn sample_lat_lon(&self, _latitude_deg: f64, _longitude_deg: f64) -> Option<f64> {
            self.0.set(self.0.get() + 1);
            Some(95.0)
        }
    }

    #[test]
    fn terrain_sampled_only_for_the_origin() {
        let mut text = String::from("lat,lon,vel_m_s\n");
        for _ in 0..6 {
            text.push_str("522297000,210122000,4.0\n");
        }
        let gps: Vec<GpsRecord> = read_records(text.as_bytes()).unwrap();
        let logs = FlightLogs::new(attitude(6), gps);
        let lookups = Rc::new(Cell::new(0));
        let mut session =
            NavSession::new(config(Mode::DeadReckoningOnly)).with_terrain(Box::new(CountingTerrain(lookups.clone())));
        let mut out = OutputWriter::new(Vec::new(), Mode::DeadReckoningOnly).unwrap();
        let summary = session.run(&logs, None, &mut out).unwrap();

        assert_eq!(summary.rows_written, 6);
        assert_eq!(lookups.get(), 1);
        let state = session.dead_reckoning().state().unwrap();
        assert_eq!(state.origin.altitude_m, 125.0);
        // level flight: drift is the horizontal distance flown
        assert_abs_diff_eq!(summary.drift.last_m, 2.0, epsilon = 1e-3);
    }

    /// Frame source that counts decoded frames separately from skipped ones.
    struct CountingSource {
        inner: FrameBuffer,
        decoded: usize,
        skipped: usize,
    }

    impl FrameSource for CountingSource {
        fn fps(&self) -> f64 {
            self.inner.fps()
        }

        fn frame_count(&self) -> Option<usize> {
            self.inner.frame_count()
        }

        fn next_frame(&mut self) -> Result<Option<Frame>> {
            self.decoded += 1;
            self.inner.next_frame()
        }

        fn skip(&mut self, n: usize) -> Result<usize> {
            let n = self.inner.skip(n)?;
            self.skipped += n;
            Ok(n)
        }
    }

    #[test]
    fn decimated_frames_are_skipped_not_decoded() {
        let logs = FlightLogs::new(attitude(5), gps(5));
        let mut source = CountingSource {
            inner: frames(10),
            decoded: 0,
            skipped: 0,
        };
        let mut session = NavSession::with_flow(config(Mode::Both), UnitFlow);
        let mut out = OutputWriter::new(Vec::new(), Mode::Both).unwrap();
        session.run(&logs, Some(&mut source), &mut out).unwrap();
        assert_eq!(source.decoded, 5);
        assert_eq!(source.skipped, 4);
    }

    #[test]
    fn missing_inputs_are_config_errors() {
        let mut out = OutputWriter::new(Vec::new(), Mode::Both).unwrap();
        let mut session = NavSession::new(config(Mode::Both));
        let err = session.run(&FlightLogs::new(attitude(2), gps(2)), None, &mut out).unwrap_err();
        assert!(matches!(err, NavError::Config(_)));

        let mut session = NavSession::new(config(Mode::DeadReckoningOnly));
        let err = session.run(&FlightLogs::new(attitude(2), Vec::new()), None, &mut out).unwrap_err();
        assert_eq!(err.exit_code(), 1);

        let mut source = FrameBuffer::new(Vec::new(), 0.0);
        let mut session = NavSession::new(config(Mode::OpticalFlowOnly));
        let err = session
            .run(&FlightLogs::default(), Some(&mut source), &mut out)
            .unwrap_err();
        assert!(matches!(err, NavError::Config(_)));
    }

    #[test]
    fn video_decimated_to_log_count() {
        // 10 frames against 5 log rows: every other frame is used
        let logs = FlightLogs::new(attitude(5), gps(5));
        let mut source = frames(10);
        let mut session = NavSession::with_flow(config(Mode::Both), UnitFlow);
        let mut out = OutputWriter::new(Vec::new(), Mode::Both).unwrap();
        let summary = session.run(&logs, Some(&mut source), &mut out).unwrap();
        assert_eq!(summary.steps, 5);
        let text = output(out);
        let numbers: Vec<&str> = text.lines().skip(1).map(|l| l.split(',').next().unwrap()).collect();
        assert_eq!(numbers, ["3", "5", "7", "9"]);
    }

    #[test]
    fn drift_stats_running_mean() {
        let mut stats = DriftStats::default();
        for d in [1.0, 2.0, 6.0] {
            stats.push(d);
        }
        assert_eq!(stats.samples, 3);
        assert_abs_diff_eq!(stats.mean_m, 3.0, epsilon = 1e-12);
        assert_eq!(stats.max_m, 6.0);
        assert_eq!(stats.last_m, 6.0);
    }
}
