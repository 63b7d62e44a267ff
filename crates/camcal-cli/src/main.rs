//! `camcal` CLI entry point.
//!
//! Parses the run configuration, wires the capture source, detector, operator
//! input, and frame sink together, and drives the library's capture →
//! calibrate → persist pipeline. Usage errors exit with clap's code (2);
//! runtime failures print a diagnostic and exit 1.

use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

use clap::Parser;
use log::info;

use camcal::calibrate::{calibrate_samples, CalibConstraints, CalibrateError, PlanarCalibrator};
use camcal::capture::{CaptureError, CaptureSource, DirSource};
use camcal::config::{BoardConfig, CaptureConfig};
use camcal::detect::{CharucoBoardDetector, DetectorError};
use camcal::display::{FrameSink, NullSink, PngSink, SinkError};
use camcal::report::{CameraReport, ReportError, ReportWriter, YamlReportWriter};
use camcal::samples::DEFAULT_SAMPLE_CAP;
use camcal::session::{
    run_capture, run_review, AutoAccept, OperatorInput, SessionError, TerminalInput,
};

#[cfg(feature = "live")]
use camcal::live::V4lSource;

#[derive(Parser, Debug)]
#[command(name = "camcal")]
#[command(about = "Interactive ChArUco camera calibration")]
#[command(version)]
struct Args {
    /// Output YAML report path.
    #[arg(default_value = "cam.yml")]
    output: PathBuf,

    /// V4L2 device index for live capture.
    #[arg(long, default_value_t = 0)]
    camera_id: u32,

    /// Calibrate from a directory of still frames instead of a live camera.
    #[arg(long)]
    input_dir: Option<PathBuf>,

    /// JSON file overriding the full detector parameter set.
    #[arg(long)]
    detector_params: Option<PathBuf>,

    /// Number of board squares horizontally.
    #[arg(long, default_value_t = 5)]
    squares_x: u32,

    /// Number of board squares vertically.
    #[arg(long, default_value_t = 7)]
    squares_y: u32,

    /// Square side length in millimeters.
    #[arg(long, default_value_t = 30.0)]
    square_size: f32,

    /// Marker side length as a fraction of the square side.
    #[arg(long, default_value_t = 0.78)]
    marker_scale: f32,

    /// ArUco dictionary name; the DICT_ prefix is optional.
    #[arg(long, default_value = "DICT_4X4_50")]
    dictionary: String,

    /// Sweep extra detector presets per frame to recover marginal boards.
    #[arg(long)]
    refine: bool,

    /// Hold tangential distortion (p1, p2) at zero during the solve.
    #[arg(long)]
    zero_tangential: bool,

    /// Pin the principal point to the image center during the solve.
    #[arg(long)]
    fix_principal_point: bool,

    /// Fix the fx/fy ratio to this value.
    #[arg(long)]
    aspect_ratio: Option<f64>,

    /// Replay accepted frames with corner overlays after calibration.
    #[arg(long)]
    show_corners: bool,

    /// Stop after this many accepted samples.
    #[arg(long, default_value_t = DEFAULT_SAMPLE_CAP)]
    max_samples: usize,

    /// Write annotated PNG frames into this directory.
    #[arg(long)]
    frames_dir: Option<PathBuf>,

    /// Accept every detectable frame without prompting.
    #[arg(long)]
    auto_accept: bool,

    /// Frame-wait timeout in milliseconds.
    #[arg(long, default_value_t = 1000)]
    timeout_ms: u64,
}

impl Args {
    fn into_config(self) -> CaptureConfig {
        CaptureConfig {
            output: self.output,
            camera_id: self.camera_id,
            input_dir: self.input_dir,
            detector_params: self.detector_params,
            board: BoardConfig {
                squares_x: self.squares_x,
                squares_y: self.squares_y,
                square_size: self.square_size,
                marker_scale: self.marker_scale,
                dictionary: self.dictionary,
            },
            refine: self.refine,
            zero_tangential: self.zero_tangential,
            fix_principal_point: self.fix_principal_point,
            aspect_ratio: self.aspect_ratio,
            show_corners: self.show_corners,
            max_samples: self.max_samples,
            frames_dir: self.frames_dir,
            auto_accept: self.auto_accept,
            timeout_ms: self.timeout_ms,
        }
    }
}

#[derive(Debug, thiserror::Error)]
enum CliError {
    #[error("live capture is not built in; rebuild with --features live or pass --input-dir")]
    LiveUnavailable,
    #[error("no frames captured, nothing to calibrate")]
    NoFrames,
    #[error(transparent)]
    Detector(#[from] DetectorError),
    #[error(transparent)]
    Capture(#[from] CaptureError),
    #[error(transparent)]
    Session(#[from] SessionError),
    #[error(transparent)]
    Sink(#[from] SinkError),
    #[error(transparent)]
    Calibrate(#[from] CalibrateError),
    #[error(transparent)]
    Report(#[from] ReportError),
}

fn main() -> ExitCode {
    env_logger::init();
    let config = Args::parse().into_config();
    match run(config) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("error: {err}");
            ExitCode::FAILURE
        }
    }
}

fn open_source(config: &CaptureConfig) -> Result<Box<dyn CaptureSource>, CliError> {
    if let Some(dir) = &config.input_dir {
        return Ok(Box::new(DirSource::new(dir)?));
    }
    #[cfg(feature = "live")]
    {
        Ok(Box::new(V4lSource::new(config.camera_id)?))
    }
    #[cfg(not(feature = "live"))]
    {
        let _ = config.camera_id;
        Err(CliError::LiveUnavailable)
    }
}

fn run(config: CaptureConfig) -> Result<(), CliError> {
    let detector = CharucoBoardDetector::new(
        &config.board,
        config.detector_params.as_deref(),
        config.refine,
    )?;
    let mut source = open_source(&config)?;
    let mut sink: Box<dyn FrameSink> = match &config.frames_dir {
        Some(dir) => Box::new(PngSink::new(dir)?),
        None => Box::new(NullSink),
    };
    let mut input: Box<dyn OperatorInput> = if config.auto_accept {
        Box::new(AutoAccept)
    } else {
        println!("keys: c = accept frame, q = stop and calibrate, Enter = next frame");
        Box::new(TerminalInput)
    };

    let outcome = run_capture(
        source.as_mut(),
        &detector,
        input.as_mut(),
        sink.as_mut(),
        config.max_samples,
        Duration::from_millis(config.timeout_ms),
    )?;
    let image_size = outcome.image_size.ok_or(CliError::NoFrames)?;
    info!(
        "capture finished: {} samples at {}x{}",
        outcome.samples.len(),
        image_size.0,
        image_size.1
    );

    let constraints = CalibConstraints {
        aspect_ratio: config.aspect_ratio,
        zero_tangential: config.zero_tangential,
        fix_principal_point: config.fix_principal_point,
    };
    let calibration = calibrate_samples(&outcome.samples, image_size, &constraints, &PlanarCalibrator)?;
    println!(
        "calibrated from {} samples, mean reprojection error {:.4} px",
        outcome.samples.len(),
        calibration.reproj_error
    );

    let report = CameraReport::new(&calibration, image_size, &constraints);
    YamlReportWriter.write(&report, &config.output)?;
    println!("wrote {}", config.output.display());

    if config.show_corners {
        run_review(&outcome.samples, input.as_mut(), sink.as_mut())?;
    }
    Ok(())
}
