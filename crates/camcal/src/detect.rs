//! ChArUco board detection behind the [`BoardDetector`] seam.
//!
//! A detector turns a frame into labelled corner observations and, on demand,
//! matches them against the board's known planar layout to produce the 2D/3D
//! correspondence lists the calibrator consumes. A frame without a visible
//! board is an empty detection, never an error — the capture loop treats thin
//! or missing detections as soft rejections.

use std::fs;
use std::path::{Path, PathBuf};

use calib_targets::aruco::resolve_dictionary;
use calib_targets::charuco::{CharucoBoardSpec, CharucoParams};
use calib_targets::detect::{detect_charuco, detect_charuco_best};
use image::GrayImage;
use log::debug;
use nalgebra::Point2;
use vision_calibration::core::{Pt2, Pt3};

use crate::config::BoardConfig;

/// One detected inner corner with its board-relative identity.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct DetectedCorner {
    /// Sub-pixel image position.
    pub position: Point2<f32>,
    /// Logical ChArUco corner ID.
    pub id: u32,
    /// Physical board-plane position, in the board's world units.
    pub board_position: Point2<f32>,
}

/// All corners detected in a single frame. Empty when no board is visible.
#[derive(Clone, Debug, Default)]
pub struct BoardDetection {
    /// Labelled corner observations.
    pub corners: Vec<DetectedCorner>,
}

impl BoardDetection {
    /// Number of detected corners.
    pub fn len(&self) -> usize {
        self.corners.len()
    }

    /// Whether the frame held no detectable board.
    pub fn is_empty(&self) -> bool {
        self.corners.is_empty()
    }
}

/// Matched object/image point lists for one accepted frame.
///
/// Board corners lie in the z = 0 plane of the target frame; positions are
/// promoted to `f64` to match the calibration backend's scalar type. Both
/// lists are always the same length by construction.
#[derive(Clone, Debug, Default)]
pub struct Correspondences {
    /// 3D points in the board/target frame.
    pub object_points: Vec<Pt3>,
    /// Matching 2D pixel observations.
    pub image_points: Vec<Pt2>,
}

impl Correspondences {
    /// Number of matched point pairs.
    pub fn len(&self) -> usize {
        self.object_points.len()
    }

    /// Whether matching produced nothing.
    pub fn is_empty(&self) -> bool {
        self.object_points.is_empty()
    }
}

/// Detector construction errors.
#[non_exhaustive]
#[derive(Debug, thiserror::Error)]
pub enum DetectorError {
    /// The configured dictionary name matches no built-in dictionary.
    #[error("unknown ArUco dictionary {name:?}")]
    UnknownDictionary {
        /// The rejected dictionary name.
        name: String,
    },

    /// The detector-parameter override file could not be read.
    #[error("failed to read detector parameters from {path}: {source}")]
    ParamsFile {
        /// Path of the unreadable file.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// The detector-parameter override file is not valid parameter JSON.
    #[error("invalid detector parameter JSON: {0}")]
    ParamsJson(#[from] serde_json::Error),
}

/// Per-frame board detection plus 2D→3D point matching.
pub trait BoardDetector {
    /// Detect board corners in `frame`. A frame with no visible board yields
    /// an empty detection, never an error.
    fn detect(&self, frame: &GrayImage) -> BoardDetection;

    /// Match detected corners against the board layout. `None` when the
    /// detection carries nothing usable.
    fn match_points(&self, detection: &BoardDetection) -> Option<Correspondences>;
}

/// [`BoardDetector`] backed by the `calib-targets` ChArUco pipeline.
#[derive(Debug)]
pub struct CharucoBoardDetector {
    params: CharucoParams,
    /// Extra presets swept per frame when refinement is requested; empty
    /// otherwise.
    sweep: Vec<CharucoParams>,
}

impl CharucoBoardDetector {
    /// Build a detector for `board`.
    ///
    /// When `params_file` is given it must hold a full detector parameter
    /// document (JSON) and replaces the board-derived defaults wholesale.
    /// `refine` enables a per-frame sweep over an additional, more permissive
    /// preset to recover marginal boards at some runtime cost.
    ///
    /// # Errors
    ///
    /// Fails on an unknown dictionary name or an unreadable/invalid parameter
    /// file.
    pub fn new(
        board: &BoardConfig,
        params_file: Option<&Path>,
        refine: bool,
    ) -> Result<Self, DetectorError> {
        let params: CharucoParams = match params_file {
            Some(path) => {
                let text =
                    fs::read_to_string(path).map_err(|source| DetectorError::ParamsFile {
                        path: path.to_path_buf(),
                        source,
                    })?;
                serde_json::from_str(&text)?
            }
            None => {
                let dictionary = resolve_dictionary(&board.dictionary).ok_or_else(|| {
                    DetectorError::UnknownDictionary {
                        name: board.dictionary.clone(),
                    }
                })?;
                let spec = CharucoBoardSpec::new(
                    board.squares_y,
                    board.squares_x,
                    board.square_size,
                    board.marker_scale,
                    dictionary,
                );
                CharucoParams::for_board(spec)
            }
        };

        let sweep = if refine {
            let mut relaxed = params.clone();
            relaxed.min_marker_inliers = relaxed.min_marker_inliers.saturating_sub(1).max(2);
            vec![params.clone(), relaxed]
        } else {
            Vec::new()
        };

        Ok(Self { params, sweep })
    }
}

impl BoardDetector for CharucoBoardDetector {
    fn detect(&self, frame: &GrayImage) -> BoardDetection {
        let result = if self.sweep.is_empty() {
            detect_charuco(frame, &self.params)
        } else {
            detect_charuco_best(frame, &self.sweep)
        };
        match result {
            Ok(detection) => BoardDetection {
                corners: detection
                    .corners
                    .iter()
                    .map(|corner| DetectedCorner {
                        position: Point2::new(corner.position.x, corner.position.y),
                        id: corner.id,
                        board_position: Point2::new(
                            corner.target_position.x,
                            corner.target_position.y,
                        ),
                    })
                    .collect(),
            },
            Err(err) => {
                debug!("no board in frame: {err}");
                BoardDetection::default()
            }
        }
    }

    fn match_points(&self, detection: &BoardDetection) -> Option<Correspondences> {
        if detection.is_empty() {
            return None;
        }
        let object_points = detection
            .corners
            .iter()
            .map(|c| Pt3::new(c.board_position.x as f64, c.board_position.y as f64, 0.0))
            .collect();
        let image_points = detection
            .corners
            .iter()
            .map(|c| Pt2::new(c.position.x as f64, c.position.y as f64))
            .collect();
        Some(Correspondences {
            object_points,
            image_points,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_dictionary_is_rejected() {
        let board = BoardConfig {
            dictionary: "DICT_DOES_NOT_EXIST".to_string(),
            ..BoardConfig::default()
        };
        assert!(matches!(
            CharucoBoardDetector::new(&board, None, false),
            Err(DetectorError::UnknownDictionary { .. })
        ));
    }

    #[test]
    fn unprefixed_dictionary_name_resolves() {
        let board = BoardConfig {
            dictionary: "4X4_50".to_string(),
            ..BoardConfig::default()
        };
        assert!(CharucoBoardDetector::new(&board, None, false).is_ok());
    }

    #[test]
    fn match_points_on_empty_detection_is_none() {
        let board = BoardConfig::default();
        let detector = CharucoBoardDetector::new(&board, None, false).unwrap();
        assert!(detector.match_points(&BoardDetection::default()).is_none());
    }

    #[test]
    fn match_points_promotes_board_plane_to_3d() {
        let detector = CharucoBoardDetector::new(&BoardConfig::default(), None, false).unwrap();
        let detection = BoardDetection {
            corners: vec![DetectedCorner {
                position: Point2::new(10.5, 20.25),
                id: 3,
                board_position: Point2::new(30.0, 60.0),
            }],
        };
        let corr = detector.match_points(&detection).unwrap();
        assert_eq!(corr.len(), 1);
        assert_eq!(corr.object_points[0], Pt3::new(30.0, 60.0, 0.0));
        assert_eq!(corr.image_points[0], Pt2::new(10.5, 20.25));
    }

    #[test]
    fn detector_state_is_debuggable() {
        let detector = CharucoBoardDetector::new(&BoardConfig::default(), None, true).unwrap();
        assert!(format!("{detector:?}").contains("CharucoBoardDetector"));
    }

    #[test]
    fn missing_params_file_is_reported_with_path() {
        let err = CharucoBoardDetector::new(
            &BoardConfig::default(),
            Some(Path::new("/does/not/exist.json")),
            false,
        )
        .unwrap_err();
        assert!(err.to_string().contains("/does/not/exist.json"));
    }
}
