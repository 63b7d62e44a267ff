//! Interactive ChArUco camera-calibration workflow.
//!
//! This crate drives a single-camera intrinsic calibration session: pull
//! frames from a capture source, detect a ChArUco board in each frame, let an
//! operator accept the good ones, then fit a pinhole model with Brown-Conrady
//! distortion to the accumulated 2D/3D correspondences and persist the result
//! as a YAML document.
//!
//! The heavy lifting stays in external crates: board detection comes from
//! `calib-targets`, the nonlinear solve from `vision-calibration`. The code
//! here is the driver in between — a capture/accept loop, a bounded sample
//! accumulator, constraint mapping onto the solver, and report I/O.
//!
//! ## Capability seams
//!
//! Every external collaborator sits behind a narrow trait so the loop (and
//! its tests) can substitute scripted implementations:
//! - [`capture::CaptureSource`] — "pull one frame with bounded blocking".
//! - [`detect::BoardDetector`] — per-frame corner detection + point matching.
//! - [`calibrate::Calibrator`] — correspondences in, camera model out.
//! - [`display::FrameSink`] — where annotated frames go.
//! - [`session::OperatorInput`] — where accept/abort keys come from.
//!
//! ## Quickstart
//!
//! ```no_run
//! use std::time::Duration;
//! use camcal::calibrate::{calibrate_samples, CalibConstraints, PlanarCalibrator};
//! use camcal::capture::DirSource;
//! use camcal::config::{BoardConfig, CaptureConfig};
//! use camcal::detect::CharucoBoardDetector;
//! use camcal::display::NullSink;
//! use camcal::report::{write_report, CameraReport};
//! use camcal::session::{run_capture, AutoAccept};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let config = CaptureConfig::default();
//! let detector = CharucoBoardDetector::new(&BoardConfig::default(), None, false)?;
//! let mut source = DirSource::new("frames".as_ref())?;
//!
//! let outcome = run_capture(
//!     &mut source,
//!     &detector,
//!     &mut AutoAccept,
//!     &mut NullSink,
//!     config.max_samples,
//!     Duration::from_millis(1000),
//! )?;
//!
//! let size = outcome.image_size.ok_or("no frames captured")?;
//! let constraints = CalibConstraints::default();
//! let calib = calibrate_samples(&outcome.samples, size, &constraints, &PlanarCalibrator)?;
//! write_report(&CameraReport::new(&calib, size, &constraints), "cam.yml".as_ref())?;
//! # Ok(())
//! # }
//! ```
#![deny(missing_docs)]

pub mod calibrate;
pub mod capture;
pub mod config;
pub mod detect;
pub mod display;
#[cfg(feature = "live")]
pub mod live;
pub mod report;
pub mod samples;
pub mod session;

pub use calibrate::{CalibConstraints, CameraCalibration};
pub use capture::{CaptureSource, Frame};
pub use config::CaptureConfig;
pub use detect::{BoardDetection, BoardDetector, Correspondences};
pub use report::{CameraReport, ReportWriter};
pub use samples::{Sample, SampleSet, MIN_CORNERS, MIN_SAMPLES};
pub use session::{run_capture, run_review, CaptureOutcome};
