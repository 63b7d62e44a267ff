//! Live V4L2 capture source (cargo feature `live`).
//!
//! Streams MJPG from `/dev/video{id}` through mmap buffers and decompresses
//! each frame to grayscale. The stream runs at a fixed resolution and frame
//! rate; the driver may negotiate these down, in which case the negotiated
//! values win.

use std::io;
use std::time::Duration;

use image::GrayImage;
use log::{debug, info};
use v4l::buffer::Type;
use v4l::io::traits::CaptureStream;
use v4l::prelude::MmapStream;
use v4l::video::capture::Parameters;
use v4l::video::Capture;
use v4l::{Device, Format, FourCC, Fraction};
use zune_jpeg::JpegDecoder;

use crate::capture::{CaptureError, CaptureSource, Frame};

/// Requested stream width in pixels.
pub const STREAM_WIDTH: u32 = 1024;
/// Requested stream height in pixels.
pub const STREAM_HEIGHT: u32 = 768;
/// Requested frame rate.
pub const STREAM_FPS: u32 = 5;

/// [`CaptureSource`] over a V4L2 camera device.
pub struct V4lSource<'a> {
    device: Device,
    stream: Option<MmapStream<'a>>,
    width: u32,
    height: u32,
    rgb: Vec<u8>,
    frames: u64,
}

impl V4lSource<'_> {
    /// Open `/dev/video{camera_id}` without starting the stream.
    ///
    /// # Errors
    ///
    /// Fails when the device node cannot be opened.
    pub fn new(camera_id: u32) -> Result<Self, CaptureError> {
        let device = Device::new(camera_id as usize)?;
        Ok(Self {
            device,
            stream: None,
            width: STREAM_WIDTH,
            height: STREAM_HEIGHT,
            rgb: Vec::new(),
            frames: 0,
        })
    }

    /// Negotiated frame dimensions. Valid after [`CaptureSource::start`].
    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }
}

impl CaptureSource for V4lSource<'_> {
    fn start(&mut self) -> Result<(), CaptureError> {
        let mjpg = FourCC::new(b"MJPG");
        let format = self
            .device
            .set_format(&Format::new(self.width, self.height, mjpg))?;
        if format.fourcc != mjpg {
            return Err(io::Error::other("camera does not stream MJPG").into());
        }
        self.width = format.width;
        self.height = format.height;
        let params = self
            .device
            .set_params(&Parameters::new(Fraction::new(1, STREAM_FPS)))?;
        info!(
            "camera streaming {}x{} @ {} fps",
            self.width, self.height, params.interval.denominator
        );
        self.rgb = vec![0u8; (self.width * self.height * 3) as usize];
        self.stream = Some(MmapStream::new(&self.device, Type::VideoCapture)?);
        Ok(())
    }

    fn next_frame(&mut self, timeout: Duration) -> Result<Option<Frame>, CaptureError> {
        let Some(stream) = self.stream.as_mut() else {
            return Err(io::Error::other("camera stream not started").into());
        };
        stream.set_timeout(timeout);
        let (buffer, _meta) = match stream.next() {
            Ok(item) => item,
            Err(err) if err.kind() == io::ErrorKind::TimedOut => return Ok(None),
            Err(err) => return Err(err.into()),
        };

        let mut decoder = JpegDecoder::new(buffer);
        decoder.decode_into(&mut self.rgb)?;

        let mut gray = Vec::with_capacity((self.width * self.height) as usize);
        for px in self.rgb.chunks_exact(3) {
            let luma =
                (u32::from(px[0]) * 299 + u32::from(px[1]) * 587 + u32::from(px[2]) * 114) / 1000;
            gray.push(luma as u8);
        }
        let image = GrayImage::from_raw(self.width, self.height, gray)
            .ok_or_else(|| io::Error::other("decoded frame does not match stream dimensions"))
            .map_err(CaptureError::from)?;

        let index = self.frames;
        self.frames += 1;
        Ok(Some(Frame { image, index }))
    }

    fn stop(&mut self) {
        self.stream = None;
        debug!("camera stream released after {} frames", self.frames);
    }
}
