use std::io::Write;
use std::path::Path;
use std::process::ExitCode;

use anyhow::Context;
use clap::Parser;

use flora_nav::cli::Args;
use flora_nav::dataset::{self, FlightLogs, FrameSource};
use flora_nav::optical_flow::DenseFlow;
use flora_nav::session::{Mode, NavSession, OutputWriter, RunSummary, SessionConfig};
use flora_nav::terrain::AsciiGrid;
use flora_nav::NavError;

fn main() -> ExitCode {
    env_logger::builder()
        .filter_level(log::LevelFilter::Info)
        .format_timestamp_nanos()
        .parse_default_env()
        .init();

    let args = Args::parse();
    match run(&args) {
        Ok(_) => ExitCode::SUCCESS,
        Err(e) => {
            log::error!("{:#}", e);
            let code = e.downcast_ref::<NavError>().map_or(1, NavError::exit_code);
            ExitCode::from(code)
        }
    }
}

fn run(args: &Args) -> anyhow::Result<RunSummary> {
    let config = args.session_config()?;
    let inputs = args.inputs()?;
    log::info!("mode: {:?}", config.mode);
    log::info!(
        "camera: {:?} at {}x{}",
        config.camera.lens,
        config.camera.image_width,
        config.camera.image_height
    );
    log::info!("inputs: {:?}", inputs);

    let logs = match (config.mode, inputs.attitude_log.as_deref()) {
        (Mode::OpticalFlowOnly, _) | (_, None) => FlightLogs::default(),
        (_, Some(attitude)) => FlightLogs::load(attitude, inputs.gps_log.as_deref())
            .with_context(|| format!("loading logs {:?}", attitude))?,
    };
    let frames = match (config.mode, inputs.video.as_deref()) {
        (Mode::DeadReckoningOnly, _) | (_, None) => None,
        (_, Some(video)) => {
            Some(dataset::frames::open(video, args.fps).with_context(|| format!("opening {:?}", video))?)
        }
    };
    let terrain = match args.dem.as_deref() {
        Some(path) => Some(AsciiGrid::from_path(path)?),
        None => None,
    };

    dispatch(args, config, terrain, &logs, frames)
}

fn drive<F: DenseFlow>(
    session: NavSession<F>,
    terrain: Option<AsciiGrid>,
    logs: &FlightLogs,
    mut frames: Option<Box<dyn FrameSource>>,
    output: Option<&Path>,
) -> anyhow::Result<RunSummary> {
    let mut session = match terrain {
        Some(grid) => session.with_terrain(Box::new(grid)),
        None => session,
    };
    let source: Option<&mut dyn FrameSource> = match frames.as_mut() {
        Some(f) => Some(&mut **f),
        None => None,
    };
    let mode = session.config().mode;
    let summary = match output {
        Some(path) => {
            let mut out = OutputWriter::create(path, mode)?;
            let summary = session.run(logs, source, &mut out)?;
            log::info!("{} rows written to {:?}", out.rows(), path);
            summary
        }
        None => {
            let mut out = OutputWriter::new(std::io::stdout().lock(), mode)?;
            let summary = session.run(logs, source, &mut out)?;
            out.into_inner()?.flush().context("flushing stdout")?;
            summary
        }
    };
    Ok(summary)
}

#[cfg(feature = "cv")]
fn dispatch(
    args: &Args,
    config: SessionConfig,
    terrain: Option<AsciiGrid>,
    logs: &FlightLogs,
    frames: Option<Box<dyn FrameSource>>,
) -> anyhow::Result<RunSummary> {
    if args.farneback {
        let session = NavSession::with_flow(config, flora_nav::optical_flow::Farneback::default());
        return drive(session, terrain, logs, frames, args.output.as_deref());
    }
    drive(NavSession::new(config), terrain, logs, frames, args.output.as_deref())
}

#[cfg(not(feature = "cv"))]
fn dispatch(
    args: &Args,
    config: SessionConfig,
    terrain: Option<AsciiGrid>,
    logs: &FlightLogs,
    frames: Option<Box<dyn FrameSource>>,
) -> anyhow::Result<RunSummary> {
    drive(NavSession::new(config), terrain, logs, frames, args.output.as_deref())
}
