//! Frame acquisition behind a narrow "pull one frame" seam.
//!
//! The capture loop only ever needs bounded blocking on the next frame, so the
//! whole camera stack hides behind [`CaptureSource`]. [`DirSource`] replays a
//! directory of still images and is always available; the V4L2 live source
//! lives in [`crate::live`] behind the `live` cargo feature.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use image::GrayImage;
use log::debug;

/// One grabbed frame: grayscale pixels plus its position in the stream.
#[derive(Clone, Debug)]
pub struct Frame {
    /// Grayscale image data.
    pub image: GrayImage,
    /// Zero-based index of this frame within the capture run.
    pub index: u64,
}

/// Errors surfaced by a capture source.
#[non_exhaustive]
#[derive(Debug, thiserror::Error)]
pub enum CaptureError {
    /// The source has no more frames to deliver. The capture loop treats this
    /// as a normal end of input, not a failure.
    #[error("capture source exhausted")]
    EndOfStream,

    /// No usable image files were found in the input directory.
    #[error("no image files found in {dir}")]
    EmptyDir {
        /// The directory that was scanned.
        dir: PathBuf,
    },

    /// An I/O error while opening the device or reading input files.
    #[error("capture I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A frame could not be decoded into an image.
    #[error("frame decode error: {0}")]
    Image(#[from] image::ImageError),

    /// An MJPG buffer from the camera could not be decompressed.
    #[cfg(feature = "live")]
    #[error("MJPG decode error: {0}")]
    Jpeg(#[from] zune_jpeg::errors::DecodeErrors),
}

/// Bounded-blocking frame supplier.
///
/// `next_frame` returns `Ok(None)` on a transient timeout (the loop retries
/// silently) and `Err(CaptureError::EndOfStream)` when the source is
/// exhausted. `stop` must be safe to call on every loop exit path, including
/// after an error.
pub trait CaptureSource {
    /// Begin streaming. Called exactly once before the first `next_frame`.
    fn start(&mut self) -> Result<(), CaptureError>;

    /// Block up to `timeout` for the next frame.
    fn next_frame(&mut self, timeout: Duration) -> Result<Option<Frame>, CaptureError>;

    /// Release the stream and any driver resources.
    fn stop(&mut self);
}

/// Replays a directory of still images in lexicographic filename order.
///
/// Recognised extensions: png, jpg, jpeg, bmp, tif, tiff. Decoding happens
/// lazily in `next_frame`, so a corrupt file surfaces as a capture error at
/// the frame it belongs to, not at construction.
#[derive(Debug)]
pub struct DirSource {
    files: Vec<PathBuf>,
    next: usize,
}

const IMAGE_EXTENSIONS: [&str; 6] = ["png", "jpg", "jpeg", "bmp", "tif", "tiff"];

impl DirSource {
    /// Scan `dir` for image files.
    ///
    /// # Errors
    ///
    /// Returns [`CaptureError::Io`] if the directory cannot be read and
    /// [`CaptureError::EmptyDir`] if it holds no recognised image files.
    pub fn new(dir: &Path) -> Result<Self, CaptureError> {
        let mut files: Vec<PathBuf> = fs::read_dir(dir)?
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|path| {
                path.extension()
                    .and_then(|ext| ext.to_str())
                    .map(|ext| {
                        let ext = ext.to_ascii_lowercase();
                        IMAGE_EXTENSIONS.iter().any(|known| *known == ext)
                    })
                    .unwrap_or(false)
            })
            .collect();
        files.sort();
        if files.is_empty() {
            return Err(CaptureError::EmptyDir {
                dir: dir.to_path_buf(),
            });
        }
        debug!("frame sequence: {} files from {}", files.len(), dir.display());
        Ok(Self { files, next: 0 })
    }

    /// Number of frames remaining.
    pub fn remaining(&self) -> usize {
        self.files.len() - self.next
    }
}

impl CaptureSource for DirSource {
    fn start(&mut self) -> Result<(), CaptureError> {
        Ok(())
    }

    fn next_frame(&mut self, _timeout: Duration) -> Result<Option<Frame>, CaptureError> {
        let Some(path) = self.files.get(self.next) else {
            return Err(CaptureError::EndOfStream);
        };
        let image = image::open(path)?.to_luma8();
        let index = self.next as u64;
        self.next += 1;
        Ok(Some(Frame { image, index }))
    }

    fn stop(&mut self) {}
}
