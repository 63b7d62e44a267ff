//! The capture/annotate/accept loop and the post-hoc review pass.
//!
//! This is the one piece of original control logic in the crate. Each
//! iteration pulls a frame with bounded blocking, runs detection, presents an
//! annotated copy, and reads one operator key. Accepting a frame with enough
//! corners and a successful point match appends a sample; everything else
//! leaves the accumulator untouched. The loop ends on the abort key, source
//! exhaustion, or the sample cap.

use std::collections::VecDeque;
use std::io::BufRead;
use std::time::Duration;

use log::{debug, info, warn};

use crate::capture::{CaptureError, CaptureSource};
use crate::detect::BoardDetector;
use crate::display::{annotate, FrameSink, SinkError};
use crate::samples::{Sample, SampleSet, MIN_CORNERS};

/// One operator decision.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Key {
    /// Accept the current frame as a calibration sample.
    Accept,
    /// Stop capturing and proceed.
    Abort,
    /// Skip to the next frame.
    Next,
}

/// Source of operator decisions, one per presented frame.
pub trait OperatorInput {
    /// Block for the next decision.
    fn read_key(&mut self) -> Key;
}

/// Line-buffered terminal input: `c` accepts, `q` or ESC aborts, anything
/// else (including a bare newline) advances. EOF aborts.
#[derive(Debug, Default)]
pub struct TerminalInput;

impl OperatorInput for TerminalInput {
    fn read_key(&mut self) -> Key {
        let mut line = String::new();
        match std::io::stdin().lock().read_line(&mut line) {
            Ok(0) | Err(_) => Key::Abort,
            Ok(_) => match line.trim().chars().next() {
                Some('c' | 'C') => Key::Accept,
                Some('q' | 'Q' | '\u{1b}') => Key::Abort,
                _ => Key::Next,
            },
        }
    }
}

/// Accepts every frame. Used for non-interactive batch runs over frame
/// sequences.
#[derive(Debug, Default)]
pub struct AutoAccept;

impl OperatorInput for AutoAccept {
    fn read_key(&mut self) -> Key {
        Key::Accept
    }
}

/// Replays a fixed key script, then aborts. Handy for tests and scripted
/// runs.
#[derive(Debug, Default)]
pub struct ScriptedInput {
    keys: VecDeque<Key>,
}

impl ScriptedInput {
    /// Build from the keys to replay, in order.
    pub fn new(keys: impl IntoIterator<Item = Key>) -> Self {
        Self {
            keys: keys.into_iter().collect(),
        }
    }
}

impl OperatorInput for ScriptedInput {
    fn read_key(&mut self) -> Key {
        self.keys.pop_front().unwrap_or(Key::Abort)
    }
}

/// Errors that abort the capture loop.
#[non_exhaustive]
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// The capture source failed in a non-transient way.
    #[error(transparent)]
    Capture(#[from] CaptureError),

    /// The frame sink failed.
    #[error(transparent)]
    Sink(#[from] SinkError),
}

/// What a capture run produced.
#[derive(Debug)]
pub struct CaptureOutcome {
    /// The accepted samples, in acceptance order.
    pub samples: SampleSet,
    /// Dimensions of the first captured frame; `None` when no frame arrived.
    pub image_size: Option<(u32, u32)>,
}

/// Run the capture/accept loop until abort, source exhaustion, or the sample
/// cap.
///
/// The source is started before the first frame and stopped on every exit
/// path, including errors. Frame-wait timeouts are retried silently;
/// low-quality frames are rejected with a diagnostic and never touch the
/// accumulator.
///
/// # Errors
///
/// Propagates non-transient capture failures and sink failures.
pub fn run_capture<S, D, I, K>(
    source: &mut S,
    detector: &D,
    input: &mut I,
    sink: &mut K,
    cap: usize,
    timeout: Duration,
) -> Result<CaptureOutcome, SessionError>
where
    S: CaptureSource + ?Sized,
    D: BoardDetector + ?Sized,
    I: OperatorInput + ?Sized,
    K: FrameSink + ?Sized,
{
    source.start()?;
    let result = capture_frames(source, detector, input, sink, cap, timeout);
    source.stop();
    result
}

fn capture_frames<S, D, I, K>(
    source: &mut S,
    detector: &D,
    input: &mut I,
    sink: &mut K,
    cap: usize,
    timeout: Duration,
) -> Result<CaptureOutcome, SessionError>
where
    S: CaptureSource + ?Sized,
    D: BoardDetector + ?Sized,
    I: OperatorInput + ?Sized,
    K: FrameSink + ?Sized,
{
    let mut samples = SampleSet::new(cap);
    let mut image_size = None;

    while !samples.is_full() {
        let frame = match source.next_frame(timeout) {
            Ok(Some(frame)) => frame,
            Ok(None) => {
                debug!("frame wait timed out, retrying");
                continue;
            }
            Err(CaptureError::EndOfStream) => {
                debug!("capture source exhausted");
                break;
            }
            Err(err) => return Err(err.into()),
        };
        image_size.get_or_insert_with(|| frame.image.dimensions());

        let detection = detector.detect(&frame.image);
        sink.present(&annotate(&frame.image, &detection.corners, samples.len(), cap))?;

        match input.read_key() {
            Key::Abort => {
                info!("capture aborted by operator after {} samples", samples.len());
                break;
            }
            Key::Next => continue,
            Key::Accept => {
                if detection.len() < MIN_CORNERS {
                    warn!(
                        "frame {} rejected: {} corners detected, need at least {}",
                        frame.index,
                        detection.len(),
                        MIN_CORNERS
                    );
                    continue;
                }
                let Some(correspondences) = detector.match_points(&detection) else {
                    warn!(
                        "frame {} rejected: corner/board point matching came up empty",
                        frame.index
                    );
                    continue;
                };
                let sample = Sample {
                    correspondences,
                    corners: detection.corners,
                    frame: frame.image,
                };
                match samples.try_insert(sample) {
                    Ok(()) => info!("sample {}/{} accepted", samples.len(), cap),
                    Err(err) => warn!("frame {} rejected: {err}", frame.index),
                }
            }
        }
    }

    if samples.is_full() {
        info!("sample cap ({cap}) reached");
    }
    Ok(CaptureOutcome {
        samples,
        image_size,
    })
}

/// Replay every accepted sample with its corner overlay, one key per frame.
///
/// Purely diagnostic; the abort key cuts the replay short and nothing is
/// mutated.
///
/// # Errors
///
/// Propagates sink failures.
pub fn run_review<I, K>(samples: &SampleSet, input: &mut I, sink: &mut K) -> Result<(), SinkError>
where
    I: OperatorInput + ?Sized,
    K: FrameSink + ?Sized,
{
    for (idx, sample) in samples.iter().enumerate() {
        sink.present(&annotate(
            &sample.frame,
            &sample.corners,
            idx + 1,
            samples.len(),
        ))?;
        if matches!(input.read_key(), Key::Abort) {
            break;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detect::{BoardDetection, Correspondences, DetectedCorner};
    use crate::display::NullSink;
    use image::GrayImage;
    use nalgebra::Point2;
    use std::cell::RefCell;
    use vision_calibration::core::{Pt2, Pt3};

    struct ScriptedSource {
        events: VecDeque<Result<Option<crate::capture::Frame>, CaptureError>>,
        started: bool,
        stopped: bool,
    }

    impl ScriptedSource {
        fn new(events: Vec<Result<Option<crate::capture::Frame>, CaptureError>>) -> Self {
            Self {
                events: events.into_iter().collect(),
                started: false,
                stopped: false,
            }
        }
    }

    impl CaptureSource for ScriptedSource {
        fn start(&mut self) -> Result<(), CaptureError> {
            self.started = true;
            Ok(())
        }

        fn next_frame(
            &mut self,
            _timeout: Duration,
        ) -> Result<Option<crate::capture::Frame>, CaptureError> {
            self.events
                .pop_front()
                .unwrap_or(Err(CaptureError::EndOfStream))
        }

        fn stop(&mut self) {
            self.stopped = true;
        }
    }

    fn frame(index: u64) -> Result<Option<crate::capture::Frame>, CaptureError> {
        Ok(Some(crate::capture::Frame {
            image: GrayImage::new(32, 24),
            index,
        }))
    }

    /// Yields a scripted corner count per detected frame, in call order.
    struct ScriptedDetector {
        counts: RefCell<VecDeque<usize>>,
    }

    impl ScriptedDetector {
        fn new(counts: Vec<usize>) -> Self {
            Self {
                counts: RefCell::new(counts.into_iter().collect()),
            }
        }
    }

    impl BoardDetector for ScriptedDetector {
        fn detect(&self, _frame: &GrayImage) -> BoardDetection {
            let n = self.counts.borrow_mut().pop_front().unwrap_or(0);
            BoardDetection {
                corners: (0..n)
                    .map(|i| DetectedCorner {
                        position: Point2::new(i as f32, i as f32),
                        id: i as u32,
                        board_position: Point2::new(i as f32 * 30.0, 0.0),
                    })
                    .collect(),
            }
        }

        fn match_points(&self, detection: &BoardDetection) -> Option<Correspondences> {
            if detection.is_empty() {
                return None;
            }
            Some(Correspondences {
                object_points: detection
                    .corners
                    .iter()
                    .map(|c| Pt3::new(c.board_position.x as f64, c.board_position.y as f64, 0.0))
                    .collect(),
                image_points: detection
                    .corners
                    .iter()
                    .map(|c| Pt2::new(c.position.x as f64, c.position.y as f64))
                    .collect(),
            })
        }
    }

    #[test]
    fn thin_detection_is_rejected_on_accept() {
        let mut source = ScriptedSource::new(vec![frame(0), frame(1)]);
        let detector = ScriptedDetector::new(vec![2, 8]);
        let mut input = AutoAccept;
        let outcome = run_capture(
            &mut source,
            &detector,
            &mut input,
            &mut NullSink,
            10,
            Duration::from_millis(1),
        )
        .unwrap();
        assert_eq!(outcome.samples.len(), 1);
        assert!(source.started && source.stopped);
    }

    #[test]
    fn abort_key_ends_the_loop() {
        let mut source = ScriptedSource::new(vec![frame(0), frame(1), frame(2)]);
        let detector = ScriptedDetector::new(vec![8, 8, 8]);
        let mut input = ScriptedInput::new([Key::Accept, Key::Abort]);
        let outcome = run_capture(
            &mut source,
            &detector,
            &mut input,
            &mut NullSink,
            10,
            Duration::from_millis(1),
        )
        .unwrap();
        assert_eq!(outcome.samples.len(), 1);
        assert!(source.stopped);
        // The third frame was never pulled.
        assert_eq!(source.events.len(), 1);
    }

    #[test]
    fn next_key_skips_without_inserting() {
        let mut source = ScriptedSource::new(vec![frame(0), frame(1)]);
        let detector = ScriptedDetector::new(vec![8, 8]);
        let mut input = ScriptedInput::new([Key::Next, Key::Accept]);
        let outcome = run_capture(
            &mut source,
            &detector,
            &mut input,
            &mut NullSink,
            10,
            Duration::from_millis(1),
        )
        .unwrap();
        assert_eq!(outcome.samples.len(), 1);
    }

    #[test]
    fn sample_cap_terminates_the_loop() {
        let mut source =
            ScriptedSource::new(vec![frame(0), frame(1), frame(2), frame(3), frame(4)]);
        let detector = ScriptedDetector::new(vec![8; 5]);
        let outcome = run_capture(
            &mut source,
            &detector,
            &mut AutoAccept,
            &mut NullSink,
            2,
            Duration::from_millis(1),
        )
        .unwrap();
        assert_eq!(outcome.samples.len(), 2);
        assert!(outcome.samples.is_full());
        // Frames beyond the cap stay in the source.
        assert_eq!(source.events.len(), 3);
    }

    #[test]
    fn timeouts_are_retried_silently() {
        let mut source = ScriptedSource::new(vec![Ok(None), Ok(None), frame(0)]);
        let detector = ScriptedDetector::new(vec![8]);
        let outcome = run_capture(
            &mut source,
            &detector,
            &mut AutoAccept,
            &mut NullSink,
            10,
            Duration::from_millis(1),
        )
        .unwrap();
        assert_eq!(outcome.samples.len(), 1);
        assert_eq!(outcome.image_size, Some((32, 24)));
    }

    #[test]
    fn hard_capture_errors_still_stop_the_source() {
        let mut source = ScriptedSource::new(vec![Err(CaptureError::Io(
            std::io::Error::other("device gone"),
        ))]);
        let detector = ScriptedDetector::new(vec![]);
        let err = run_capture(
            &mut source,
            &detector,
            &mut AutoAccept,
            &mut NullSink,
            10,
            Duration::from_millis(1),
        )
        .unwrap_err();
        assert!(matches!(err, SessionError::Capture(_)));
        assert!(source.stopped);
    }

    #[test]
    fn no_frames_means_no_image_size() {
        let mut source = ScriptedSource::new(vec![]);
        let detector = ScriptedDetector::new(vec![]);
        let outcome = run_capture(
            &mut source,
            &detector,
            &mut AutoAccept,
            &mut NullSink,
            10,
            Duration::from_millis(1),
        )
        .unwrap();
        assert!(outcome.samples.is_empty());
        assert_eq!(outcome.image_size, None);
    }

    #[test]
    fn review_replays_each_sample_until_abort() {
        let detector = ScriptedDetector::new(vec![8, 8, 8]);
        let mut source = ScriptedSource::new(vec![frame(0), frame(1), frame(2)]);
        let outcome = run_capture(
            &mut source,
            &detector,
            &mut AutoAccept,
            &mut NullSink,
            10,
            Duration::from_millis(1),
        )
        .unwrap();
        assert_eq!(outcome.samples.len(), 3);

        struct CountingSink(usize);
        impl FrameSink for CountingSink {
            fn present(&mut self, _frame: &crate::display::AnnotatedFrame) -> Result<(), SinkError> {
                self.0 += 1;
                Ok(())
            }
        }

        let mut sink = CountingSink(0);
        let mut input = ScriptedInput::new([Key::Next, Key::Abort]);
        run_review(&outcome.samples, &mut input, &mut sink).unwrap();
        assert_eq!(sink.0, 2);
    }
}
