//! Camera-model fitting behind the [`Calibrator`] seam.
//!
//! The solve itself is delegated to the planar-intrinsics session of the
//! calibration backend; this module's job is assembling correctly-shaped
//! input and mapping the run's constraint toggles onto the solver's seed and
//! fix-mask vocabulary:
//!
//! - a fixed aspect ratio `a` seeds fx = a·fy from the linear init and holds
//!   fx fixed through the refinement,
//! - zero tangential distortion seeds p1 = p2 = 0 and holds both fixed,
//! - a fixed principal point pins cx, cy to the image centre.
//!
//! The constraint set also renders itself as an OpenCV-style flag bitmask for
//! the persisted report, so downstream consumers of the YAML document can
//! interpret the run the way they would a classic calibration output.

use log::{debug, info};
use nalgebra::Matrix3;
use vision_calibration::core::{CorrespondenceView, PlanarDataset, View};
use vision_calibration::planar_intrinsics::{
    step_init, step_init_with_seed, step_optimize, PlanarManualInit,
};
use vision_calibration::prelude::{CalibrationSession, PlanarIntrinsicsProblem};

use crate::samples::{SampleSet, MIN_SAMPLES};

/// Flag bit: the fx/fy ratio was fixed during the solve.
pub const FLAG_FIX_ASPECT_RATIO: u32 = 0x2;
/// Flag bit: the principal point was pinned to the image centre.
pub const FLAG_FIX_PRINCIPAL_POINT: u32 = 0x4;
/// Flag bit: tangential distortion was held at zero.
pub const FLAG_ZERO_TANGENTIAL: u32 = 0x8;

/// Constraint toggles forwarded to the calibrator.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct CalibConstraints {
    /// Fixed fx/fy ratio; `None` leaves both focal lengths free.
    pub aspect_ratio: Option<f64>,
    /// Hold tangential distortion (p1, p2) at zero.
    pub zero_tangential: bool,
    /// Pin the principal point to the image centre.
    pub fix_principal_point: bool,
}

impl CalibConstraints {
    /// Whether any constraint requires reseeding the initial estimate.
    pub fn any(&self) -> bool {
        self.aspect_ratio.is_some() || self.zero_tangential || self.fix_principal_point
    }

    /// OpenCV-style flag bitmask for the persisted report.
    pub fn bits(&self) -> u32 {
        let mut bits = 0;
        if self.aspect_ratio.is_some() {
            bits |= FLAG_FIX_ASPECT_RATIO;
        }
        if self.fix_principal_point {
            bits |= FLAG_FIX_PRINCIPAL_POINT;
        }
        if self.zero_tangential {
            bits |= FLAG_ZERO_TANGENTIAL;
        }
        bits
    }

    /// The nominal intrinsic seed matrix implied by the constraints: identity
    /// with the fixed aspect ratio (when set) in the (0,0) slot.
    pub fn seed_matrix(&self) -> Matrix3<f64> {
        let mut seed = Matrix3::identity();
        if let Some(ratio) = self.aspect_ratio {
            seed[(0, 0)] = ratio;
        }
        seed
    }
}

/// The fitted camera model.
#[derive(Clone, Debug, PartialEq)]
pub struct CameraCalibration {
    /// 3×3 intrinsic matrix (row-major `[[fx, skew, cx], [0, fy, cy], [0, 0, 1]]`).
    pub camera_matrix: Matrix3<f64>,
    /// Brown-Conrady coefficients in `[k1, k2, p1, p2, k3]` order.
    pub distortion: [f64; 5],
    /// Mean reprojection error over all accepted samples, in pixels.
    pub reproj_error: f64,
}

/// Calibration failures.
#[non_exhaustive]
#[derive(Debug, thiserror::Error)]
pub enum CalibrateError {
    /// Fewer than [`MIN_SAMPLES`] samples were accepted; calibration never
    /// ran and no output exists.
    #[error("need at least {MIN_SAMPLES} accepted samples to calibrate, got {got}")]
    NotEnoughSamples {
        /// Accepted sample count at the time of the attempt.
        got: usize,
    },

    /// The solver backend rejected the data or failed to converge.
    #[error("calibration failed: {0}")]
    Backend(#[from] vision_calibration::Error),
}

/// Fits a camera model to accumulated correspondences.
pub trait Calibrator {
    /// Run the full solve over every sample in `samples`.
    ///
    /// # Errors
    ///
    /// Surfaces backend failures; the sample-count precondition is the
    /// caller's job (see [`calibrate_samples`]).
    fn calibrate(
        &self,
        samples: &SampleSet,
        image_size: (u32, u32),
        constraints: &CalibConstraints,
    ) -> Result<CameraCalibration, CalibrateError>;
}

/// Guard the [`MIN_SAMPLES`] precondition, then delegate to `calibrator`.
///
/// # Errors
///
/// Returns [`CalibrateError::NotEnoughSamples`] without invoking the
/// calibrator when too few samples accumulated.
pub fn calibrate_samples<C: Calibrator + ?Sized>(
    samples: &SampleSet,
    image_size: (u32, u32),
    constraints: &CalibConstraints,
    calibrator: &C,
) -> Result<CameraCalibration, CalibrateError> {
    if !samples.has_enough() {
        return Err(CalibrateError::NotEnoughSamples {
            got: samples.len(),
        });
    }
    calibrator.calibrate(samples, image_size, constraints)
}

/// [`Calibrator`] backed by the planar-intrinsics session of
/// `vision-calibration`: Zhang-style linear init, optional constraint
/// reseeding, then nonlinear refinement.
#[derive(Debug, Default)]
pub struct PlanarCalibrator;

impl Calibrator for PlanarCalibrator {
    fn calibrate(
        &self,
        samples: &SampleSet,
        image_size: (u32, u32),
        constraints: &CalibConstraints,
    ) -> Result<CameraCalibration, CalibrateError> {
        let mut views = Vec::with_capacity(samples.len());
        for sample in samples.iter() {
            let obs = CorrespondenceView::new(
                sample.correspondences.object_points.clone(),
                sample.correspondences.image_points.clone(),
            )
            .map_err(vision_calibration::Error::from)?;
            views.push(View::without_meta(obs));
        }
        let dataset = PlanarDataset::new(views).map_err(vision_calibration::Error::from)?;

        let mut session = CalibrationSession::<PlanarIntrinsicsProblem>::new();
        session.set_input(dataset)?;
        session.update_config(|config| {
            if constraints.aspect_ratio.is_some() {
                config.fix_camera.intrinsics.fx = true;
            }
            if constraints.fix_principal_point {
                config.fix_camera.intrinsics.cx = true;
                config.fix_camera.intrinsics.cy = true;
            }
            if constraints.zero_tangential {
                config.fix_camera.distortion.p1 = true;
                config.fix_camera.distortion.p2 = true;
            }
        })?;

        let init = step_init(&mut session, None)?;
        debug!(
            "linear init: fx={:.2} fy={:.2} cx={:.2} cy={:.2}",
            init.intrinsics.fx, init.intrinsics.fy, init.intrinsics.cx, init.intrinsics.cy
        );

        if constraints.any() {
            let mut intrinsics = init.intrinsics;
            if let Some(ratio) = constraints.aspect_ratio {
                intrinsics.fx = ratio * intrinsics.fy;
            }
            if constraints.fix_principal_point {
                intrinsics.cx = f64::from(image_size.0) / 2.0;
                intrinsics.cy = f64::from(image_size.1) / 2.0;
            }
            let mut distortion = init.distortion;
            if constraints.zero_tangential {
                distortion.p1 = 0.0;
                distortion.p2 = 0.0;
            }
            let mut manual = PlanarManualInit::default();
            manual.intrinsics = Some(intrinsics);
            manual.distortion = Some(distortion);
            step_init_with_seed(&mut session, manual, None)?;
        }

        let optimized = step_optimize(&mut session, None)?;
        info!(
            "calibration converged in {} iterations, mean reprojection error {:.4} px",
            optimized.iterations, optimized.mean_reproj_error
        );

        let export = session.export()?;
        let k = export.params.intrinsics();
        let dist = export.params.distortion().unwrap_or_default();

        let camera_matrix = Matrix3::new(
            k.fx, k.skew, k.cx, //
            0.0, k.fy, k.cy, //
            0.0, 0.0, 1.0,
        );
        Ok(CameraCalibration {
            camera_matrix,
            distortion: [dist.k1, dist.k2, dist.p1, dist.p2, dist.k3],
            reproj_error: export.mean_reproj_error,
        })
    }
}
