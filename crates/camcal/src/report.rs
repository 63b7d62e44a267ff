//! Persisted calibration report: YAML serialization and round-trip reading.
//!
//! The document carries the fitted model plus enough run metadata to
//! interpret it later: image size, the constraint flag bitmask, the fixed
//! aspect ratio when one was requested, and a unix timestamp.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use nalgebra::Matrix3;
use serde::{Deserialize, Serialize};

use crate::calibrate::{CalibConstraints, CameraCalibration};

/// The persisted calibration document.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CameraReport {
    /// Unix timestamp (seconds) of the calibration run.
    pub calibration_time: u64,
    /// Calibrated image width in pixels.
    pub image_width: u32,
    /// Calibrated image height in pixels.
    pub image_height: u32,
    /// The fixed fx/fy ratio, when one was requested.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub aspect_ratio: Option<f64>,
    /// OpenCV-style constraint flag bitmask (see [`crate::calibrate`]).
    pub flags: u32,
    /// Row-major 3×3 intrinsic matrix.
    pub camera_matrix: [[f64; 3]; 3],
    /// Brown-Conrady coefficients in `[k1, k2, p1, p2, k3]` order.
    pub distortion_coefficients: [f64; 5],
    /// Mean reprojection error over all accepted samples, in pixels.
    pub avg_reprojection_error: f64,
}

impl CameraReport {
    /// Assemble the report for a finished run.
    pub fn new(
        calibration: &CameraCalibration,
        image_size: (u32, u32),
        constraints: &CalibConstraints,
    ) -> Self {
        let mut camera_matrix = [[0.0; 3]; 3];
        for (r, row) in camera_matrix.iter_mut().enumerate() {
            for (c, value) in row.iter_mut().enumerate() {
                *value = calibration.camera_matrix[(r, c)];
            }
        }
        Self {
            calibration_time: unix_now(),
            image_width: image_size.0,
            image_height: image_size.1,
            aspect_ratio: constraints.aspect_ratio,
            flags: constraints.bits(),
            camera_matrix,
            distortion_coefficients: calibration.distortion,
            avg_reprojection_error: calibration.reproj_error,
        }
    }

    /// The intrinsic matrix as an `nalgebra` matrix.
    pub fn camera_matrix(&self) -> Matrix3<f64> {
        Matrix3::from_fn(|r, c| self.camera_matrix[r][c])
    }
}

fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

/// Persistence failures.
#[non_exhaustive]
#[derive(Debug, thiserror::Error)]
pub enum ReportError {
    /// The report file could not be written or read.
    #[error("failed to access {path}: {source}")]
    Io {
        /// The report path.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// The document is not valid report YAML.
    #[error("invalid report document: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

/// Persists finished reports. The seam exists so the CLI and the loop tests
/// can swap in scripted writers.
pub trait ReportWriter {
    /// Write `report` at `path`.
    ///
    /// # Errors
    ///
    /// Propagates serialization and file-system failures.
    fn write(&self, report: &CameraReport, path: &Path) -> Result<(), ReportError>;
}

/// The shipped [`ReportWriter`]: YAML via [`write_report`].
#[derive(Debug, Default)]
pub struct YamlReportWriter;

impl ReportWriter for YamlReportWriter {
    fn write(&self, report: &CameraReport, path: &Path) -> Result<(), ReportError> {
        write_report(report, path)
    }
}

/// Serialize `report` as YAML at `path`.
///
/// # Errors
///
/// Fails when the file cannot be written; the calibration result is lost in
/// that case, so callers surface this as a fatal error.
pub fn write_report(report: &CameraReport, path: &Path) -> Result<(), ReportError> {
    let text = serde_yaml::to_string(report)?;
    fs::write(path, text).map_err(|source| ReportError::Io {
        path: path.to_path_buf(),
        source,
    })
}

/// Read a report previously written by [`write_report`].
///
/// # Errors
///
/// Fails when the file cannot be read or does not parse as a report.
pub fn read_report(path: &Path) -> Result<CameraReport, ReportError> {
    let text = fs::read_to_string(path).map_err(|source| ReportError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(serde_yaml::from_str(&text)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_calibration() -> CameraCalibration {
        CameraCalibration {
            camera_matrix: Matrix3::new(800.0, 0.0, 512.0, 0.0, 810.0, 384.0, 0.0, 0.0, 1.0),
            distortion: [0.1, -0.05, 0.001, -0.002, 0.0],
            reproj_error: 0.42,
        }
    }

    #[test]
    fn yaml_round_trip_preserves_every_field() {
        let constraints = CalibConstraints {
            aspect_ratio: Some(1.0),
            zero_tangential: true,
            fix_principal_point: false,
        };
        let report = CameraReport::new(&sample_calibration(), (1024, 768), &constraints);

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cam.yml");
        write_report(&report, &path).unwrap();
        let back = read_report(&path).unwrap();

        assert_eq!(back, report);
        assert_eq!(back.camera_matrix(), sample_calibration().camera_matrix);
        assert_eq!(back.image_width, 1024);
        assert_eq!(back.image_height, 768);
        assert_eq!(back.flags, constraints.bits());
        assert_eq!(back.aspect_ratio, Some(1.0));
    }

    #[test]
    fn aspect_ratio_is_omitted_when_unset() {
        let report = CameraReport::new(
            &sample_calibration(),
            (640, 480),
            &CalibConstraints::default(),
        );
        let text = serde_yaml::to_string(&report).unwrap();
        assert!(!text.contains("aspect_ratio"));
        assert!(text.contains("camera_matrix"));
    }

    #[test]
    fn unwritable_path_is_fatal_with_context() {
        let report = CameraReport::new(
            &sample_calibration(),
            (640, 480),
            &CalibConstraints::default(),
        );
        let err = write_report(&report, Path::new("/nonexistent-dir/cam.yml")).unwrap_err();
        assert!(err.to_string().contains("/nonexistent-dir/cam.yml"));
    }
}
