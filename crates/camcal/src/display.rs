//! Annotated-frame presentation behind the [`FrameSink`] seam.
//!
//! A GUI surface is deliberately out of scope; the loop hands every display
//! frame to a [`FrameSink`] and moves on. The shipped sinks either discard
//! frames ([`NullSink`]) or write them as numbered PNGs ([`PngSink`]) for
//! inspection after the run.
//!
//! Annotation draws a cross on every detected corner and a progress strip
//! along the top edge: one filled block per accepted sample, hollow blocks up
//! to the cap.

use std::path::{Path, PathBuf};

use image::{GrayImage, Rgb, RgbImage};

use crate::detect::DetectedCorner;

const CORNER_COLOR: Rgb<u8> = Rgb([220, 40, 40]);
const STRIP_FILLED: Rgb<u8> = Rgb([40, 200, 40]);
const STRIP_EMPTY: Rgb<u8> = Rgb([90, 90, 90]);
const CROSS_ARM: i64 = 4;
const BLOCK: u32 = 5;

/// One display frame plus the loop state it was annotated with.
#[derive(Clone, Debug)]
pub struct AnnotatedFrame {
    /// RGB copy of the frame with overlays burned in.
    pub image: RgbImage,
    /// Accepted-sample count at annotation time.
    pub accepted: usize,
    /// Configured sample cap.
    pub cap: usize,
    /// Corners detected in this frame.
    pub corner_count: usize,
}

/// Errors surfaced when presenting a frame.
#[non_exhaustive]
#[derive(Debug, thiserror::Error)]
pub enum SinkError {
    /// Creating the output directory failed.
    #[error("failed to create frame directory {dir}: {source}")]
    CreateDir {
        /// The directory that could not be created.
        dir: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// Writing a frame image failed.
    #[error("failed to write frame: {0}")]
    Image(#[from] image::ImageError),
}

/// Consumer of annotated display frames.
pub trait FrameSink {
    /// Present one frame. Implementations decide what "present" means.
    fn present(&mut self, frame: &AnnotatedFrame) -> Result<(), SinkError>;
}

/// Discards every frame. The default for headless runs.
#[derive(Debug, Default)]
pub struct NullSink;

impl FrameSink for NullSink {
    fn present(&mut self, _frame: &AnnotatedFrame) -> Result<(), SinkError> {
        Ok(())
    }
}

/// Writes each presented frame as `frame_NNNNN.png` under a directory.
#[derive(Debug)]
pub struct PngSink {
    dir: PathBuf,
    written: u64,
}

impl PngSink {
    /// Create the sink, creating `dir` if needed.
    ///
    /// # Errors
    ///
    /// Returns [`SinkError::CreateDir`] when the directory cannot be created.
    pub fn new(dir: &Path) -> Result<Self, SinkError> {
        std::fs::create_dir_all(dir).map_err(|source| SinkError::CreateDir {
            dir: dir.to_path_buf(),
            source,
        })?;
        Ok(Self {
            dir: dir.to_path_buf(),
            written: 0,
        })
    }

    /// Number of frames written so far.
    pub fn written(&self) -> u64 {
        self.written
    }
}

impl FrameSink for PngSink {
    fn present(&mut self, frame: &AnnotatedFrame) -> Result<(), SinkError> {
        let path = self.dir.join(format!("frame_{:05}.png", self.written));
        frame.image.save(path)?;
        self.written += 1;
        Ok(())
    }
}

/// Build the display copy of a frame: RGB conversion, corner crosses, and the
/// progress strip.
pub fn annotate(
    frame: &GrayImage,
    corners: &[DetectedCorner],
    accepted: usize,
    cap: usize,
) -> AnnotatedFrame {
    let (width, height) = frame.dimensions();
    let mut image = RgbImage::from_fn(width, height, |x, y| {
        let v = frame.get_pixel(x, y)[0];
        Rgb([v, v, v])
    });

    for corner in corners {
        draw_cross(&mut image, corner.position.x, corner.position.y);
    }
    draw_progress_strip(&mut image, accepted, cap);

    AnnotatedFrame {
        image,
        accepted,
        cap,
        corner_count: corners.len(),
    }
}

fn draw_cross(image: &mut RgbImage, x: f32, y: f32) {
    let (cx, cy) = (x.round() as i64, y.round() as i64);
    for d in -CROSS_ARM..=CROSS_ARM {
        put_pixel_checked(image, cx + d, cy, CORNER_COLOR);
        put_pixel_checked(image, cx, cy + d, CORNER_COLOR);
    }
}

fn draw_progress_strip(image: &mut RgbImage, accepted: usize, cap: usize) {
    let (width, height) = image.dimensions();
    let rows = BLOCK.min(height.saturating_sub(1));
    for slot in 0..cap {
        let x0 = slot as u32 * (BLOCK + 1) + 1;
        if x0 + BLOCK >= width {
            break;
        }
        let color = if slot < accepted {
            STRIP_FILLED
        } else {
            STRIP_EMPTY
        };
        for dx in 0..BLOCK {
            for dy in 0..rows {
                image.put_pixel(x0 + dx, 1 + dy, color);
            }
        }
    }
}

fn put_pixel_checked(image: &mut RgbImage, x: i64, y: i64, color: Rgb<u8>) {
    if x >= 0 && y >= 0 && (x as u32) < image.width() && (y as u32) < image.height() {
        image.put_pixel(x as u32, y as u32, color);
    }
}
