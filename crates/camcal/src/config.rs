//! Immutable run configuration.
//!
//! The CLI parses flags into a [`CaptureConfig`] once at startup; nothing
//! mutates it afterwards. Board geometry lives in its own [`BoardConfig`] so
//! the detector can be built from it without dragging the rest of the run
//! options along.

use std::path::PathBuf;

use crate::samples::DEFAULT_SAMPLE_CAP;

/// ChArUco board geometry, in square counts and physical units.
///
/// `squares_x` / `squares_y` count board squares (not inner corners), matching
/// the convention of the printable-target tooling. `square_size` is in the
/// caller's world units (typically millimetres); calibration results are
/// invariant to the unit as long as it is used consistently.
#[derive(Clone, Debug, PartialEq)]
pub struct BoardConfig {
    /// Number of board squares horizontally.
    pub squares_x: u32,
    /// Number of board squares vertically.
    pub squares_y: u32,
    /// Side length of one square, in world units.
    pub square_size: f32,
    /// Marker side length as a fraction of the square side, in `(0, 1]`.
    pub marker_scale: f32,
    /// ArUco dictionary name, e.g. `"DICT_4X4_50"` (the `DICT_` prefix is
    /// optional).
    pub dictionary: String,
}

impl Default for BoardConfig {
    fn default() -> Self {
        Self {
            squares_x: 5,
            squares_y: 7,
            square_size: 30.0,
            marker_scale: 0.78,
            dictionary: "DICT_4X4_50".to_string(),
        }
    }
}

/// Everything a calibration run needs, parsed once at startup.
#[derive(Clone, Debug, PartialEq)]
pub struct CaptureConfig {
    /// Path of the YAML report to write.
    pub output: PathBuf,
    /// V4L2 device index for live capture.
    pub camera_id: u32,
    /// Directory of still frames to use instead of a live camera.
    pub input_dir: Option<PathBuf>,
    /// Optional JSON file overriding the full detector parameter set.
    pub detector_params: Option<PathBuf>,
    /// Board geometry the detector is built from.
    pub board: BoardConfig,
    /// Sweep extra detector presets per frame to recover marginal boards.
    pub refine: bool,
    /// Hold tangential distortion (p1, p2) at zero during the solve.
    pub zero_tangential: bool,
    /// Pin the principal point to the image centre during the solve.
    pub fix_principal_point: bool,
    /// Fixed fx/fy ratio; `None` leaves both focal lengths free.
    pub aspect_ratio: Option<f64>,
    /// Replay the accepted frames with corner overlays after calibration.
    pub show_corners: bool,
    /// Hard cap on accepted samples; the loop stops when it is reached.
    pub max_samples: usize,
    /// Directory for annotated PNG frames; `None` discards them.
    pub frames_dir: Option<PathBuf>,
    /// Accept every detectable frame without waiting for the operator.
    pub auto_accept: bool,
    /// Bounded wait for a single frame, in milliseconds.
    pub timeout_ms: u64,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            output: PathBuf::from("cam.yml"),
            camera_id: 0,
            input_dir: None,
            detector_params: None,
            board: BoardConfig::default(),
            refine: false,
            zero_tangential: false,
            fix_principal_point: false,
            aspect_ratio: None,
            show_corners: false,
            max_samples: DEFAULT_SAMPLE_CAP,
            frames_dir: None,
            auto_accept: false,
            timeout_ms: 1000,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_contract() {
        let config = CaptureConfig::default();
        assert_eq!(config.output, PathBuf::from("cam.yml"));
        assert_eq!(config.camera_id, 0);
        assert_eq!(config.max_samples, DEFAULT_SAMPLE_CAP);
        assert_eq!(config.timeout_ms, 1000);
        assert!(config.aspect_ratio.is_none());
        assert!(!config.show_corners);
    }

    #[test]
    fn default_board_is_five_by_seven() {
        let board = BoardConfig::default();
        assert_eq!((board.squares_x, board.squares_y), (5, 7));
        assert!(board.marker_scale > 0.0 && board.marker_scale <= 1.0);
    }
}
