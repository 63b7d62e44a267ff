//! Bounded accumulator for operator-accepted calibration samples.
//!
//! One [`SampleSet`] owns every accepted frame's correspondences, replacing
//! the parallel corner/point/image lists such workflows tend to grow. The
//! insertion gate enforces the acceptance invariants in one place: a sample
//! carries at least [`MIN_CORNERS`] matched pairs with equal-length lists, and
//! the set never exceeds its cap.

use image::GrayImage;

use crate::detect::{Correspondences, DetectedCorner};

/// Minimum detected corners for a frame to be acceptable.
pub const MIN_CORNERS: usize = 4;

/// Minimum accepted samples before calibration may run.
pub const MIN_SAMPLES: usize = 4;

/// Default cap on accepted samples.
pub const DEFAULT_SAMPLE_CAP: usize = 50;

/// One accepted frame: its correspondences plus what the review pass needs to
/// redraw it.
#[derive(Clone, Debug)]
pub struct Sample {
    /// Matched 2D/3D point lists; non-empty and equal-length by construction.
    pub correspondences: Correspondences,
    /// The source frame, kept for the post-hoc review display.
    pub frame: GrayImage,
    /// The detected corners, kept for overlay redraw.
    pub corners: Vec<DetectedCorner>,
}

/// Why a sample was refused at the insertion gate.
#[non_exhaustive]
#[derive(Debug, PartialEq, Eq, thiserror::Error)]
pub enum SampleError {
    /// The set already holds its configured cap of samples.
    #[error("sample cap reached ({cap})")]
    Full {
        /// The configured cap.
        cap: usize,
    },

    /// The sample carries fewer matched pairs than [`MIN_CORNERS`].
    #[error("too few correspondences (need >= {MIN_CORNERS}, got {got})")]
    TooFewPoints {
        /// Matched pair count of the rejected sample.
        got: usize,
    },

    /// Object and image point lists differ in length.
    #[error("correspondence lists out of step ({object} object vs {image} image points)")]
    LengthMismatch {
        /// Object point count.
        object: usize,
        /// Image point count.
        image: usize,
    },
}

/// Ordered, capped collection of accepted samples.
///
/// The count only ever grows, one successful insertion at a time; rejected
/// frames leave it untouched.
#[derive(Clone, Debug)]
pub struct SampleSet {
    samples: Vec<Sample>,
    cap: usize,
}

impl SampleSet {
    /// Create an empty set holding at most `cap` samples.
    pub fn new(cap: usize) -> Self {
        Self {
            samples: Vec::new(),
            cap,
        }
    }

    /// Number of accepted samples.
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    /// Whether no sample has been accepted yet.
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Whether the cap has been reached.
    pub fn is_full(&self) -> bool {
        self.samples.len() >= self.cap
    }

    /// The configured cap.
    pub fn cap(&self) -> usize {
        self.cap
    }

    /// Whether enough samples have accumulated for calibration.
    pub fn has_enough(&self) -> bool {
        self.samples.len() >= MIN_SAMPLES
    }

    /// Iterate over accepted samples in acceptance order.
    pub fn iter(&self) -> impl Iterator<Item = &Sample> {
        self.samples.iter()
    }

    /// Validate and append `sample`.
    ///
    /// # Errors
    ///
    /// Rejects the sample without mutating the set when the cap is reached,
    /// the correspondence lists are shorter than [`MIN_CORNERS`], or the
    /// lists disagree in length.
    pub fn try_insert(&mut self, sample: Sample) -> Result<(), SampleError> {
        if self.is_full() {
            return Err(SampleError::Full { cap: self.cap });
        }
        let object = sample.correspondences.object_points.len();
        let image = sample.correspondences.image_points.len();
        if object != image {
            return Err(SampleError::LengthMismatch { object, image });
        }
        if object < MIN_CORNERS {
            return Err(SampleError::TooFewPoints { got: object });
        }
        self.samples.push(sample);
        Ok(())
    }
}
