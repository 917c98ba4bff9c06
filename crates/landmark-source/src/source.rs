//! Frame sources

use crate::frame::{Landmark, LandmarkFrame, SourceFrame};
use crate::SourceError;
use serde::Deserialize;
use std::collections::VecDeque;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;
use tracing::{debug, info};

/// Nominal frame rate assumed when a recording carries no timestamps
pub const DEFAULT_FPS: f64 = 30.0;

/// A producer of landmark frames.
///
/// `next_frame` may block on I/O. Returning an error ends the stream.
pub trait LandmarkSource: Send {
    /// Read the next frame
    fn next_frame(&mut self) -> Result<SourceFrame, SourceError>;

    /// Nominal frame rate of the underlying stream, if known
    fn nominal_fps(&self) -> Option<f64> {
        None
    }
}

impl<S: LandmarkSource + ?Sized> LandmarkSource for Box<S> {
    fn next_frame(&mut self) -> Result<SourceFrame, SourceError> {
        (**self).next_frame()
    }

    fn nominal_fps(&self) -> Option<f64> {
        (**self).nominal_fps()
    }
}

fn check_fps(fps: f64) -> Result<(), SourceError> {
    if fps.is_finite() && fps > 0.0 {
        Ok(())
    } else {
        Err(SourceError::Open(format!("invalid frame rate {}", fps)))
    }
}

fn frame_timestamp_ms(index: u64, fps: f64) -> u64 {
    ((index as f64) * 1000.0 / fps).round() as u64
}

/// In-memory source replaying a fixed list of frames
#[derive(Debug, Default)]
pub struct VecSource {
    frames: VecDeque<SourceFrame>,
    /// Error returned once frames run out, instead of end of stream
    failure: Option<String>,
    fps: Option<f64>,
}

impl VecSource {
    /// Create a source from prepared frames
    pub fn new(frames: Vec<SourceFrame>) -> Self {
        Self {
            frames: frames.into(),
            failure: None,
            fps: None,
        }
    }

    /// Create a source from per-frame detector output (`None` = no face),
    /// stamping frames at the given rate
    pub fn from_detections(
        detections: Vec<Option<Vec<Landmark>>>,
        fps: f64,
    ) -> Result<Self, SourceError> {
        check_fps(fps)?;
        let frames = detections
            .into_iter()
            .enumerate()
            .map(|(i, points)| {
                let timestamp_ms = frame_timestamp_ms(i as u64, fps);
                match points {
                    Some(points) => SourceFrame::Face(LandmarkFrame::new(points, timestamp_ms)),
                    None => SourceFrame::NoFace { timestamp_ms },
                }
            })
            .collect();
        Ok(Self {
            frames,
            failure: None,
            fps: Some(fps),
        })
    }

    /// Simulate a disconnection once the prepared frames are exhausted
    pub fn fail_when_exhausted(mut self, message: impl Into<String>) -> Self {
        self.failure = Some(message.into());
        self
    }
}

impl LandmarkSource for VecSource {
    fn next_frame(&mut self) -> Result<SourceFrame, SourceError> {
        match self.frames.pop_front() {
            Some(frame) => Ok(frame),
            None => match self.failure.take() {
                Some(message) => Err(SourceError::Disconnected(message)),
                None => Ok(SourceFrame::EndOfStream),
            },
        }
    }

    fn nominal_fps(&self) -> Option<f64> {
        self.fps
    }
}

/// One line of a landmark recording
#[derive(Debug, Deserialize)]
struct RecordedFrame {
    #[serde(default)]
    timestamp_ms: Option<u64>,
    #[serde(default)]
    landmarks: Option<Vec<[f64; 3]>>,
}

/// Replays a JSON-lines landmark recording.
///
/// Each non-blank line is `{"timestamp_ms": 33, "landmarks": [[x, y, z], ...]}`.
/// A missing or `null` `landmarks` field means no face was detected; a missing
/// timestamp is derived from the frame index and the nominal frame rate.
pub struct JsonLinesSource<R> {
    reader: R,
    fps: f64,
    line_number: usize,
    frame_index: u64,
    buffer: String,
}

impl JsonLinesSource<BufReader<File>> {
    /// Open a recording on disk
    pub fn open(path: impl AsRef<Path>, fps: f64) -> Result<Self, SourceError> {
        let path = path.as_ref();
        info!("Opening landmark recording {}", path.display());
        let file = File::open(path)
            .map_err(|e| SourceError::Open(format!("{}: {}", path.display(), e)))?;
        Self::from_reader(BufReader::new(file), fps)
    }
}

impl<R: BufRead> JsonLinesSource<R> {
    /// Wrap any buffered reader
    pub fn from_reader(reader: R, fps: f64) -> Result<Self, SourceError> {
        check_fps(fps)?;
        Ok(Self {
            reader,
            fps,
            line_number: 0,
            frame_index: 0,
            buffer: String::new(),
        })
    }

    fn parse_line(&self, line: &str) -> Result<SourceFrame, SourceError> {
        let recorded: RecordedFrame =
            serde_json::from_str(line).map_err(|e| SourceError::Parse {
                line: self.line_number,
                message: e.to_string(),
            })?;

        let timestamp_ms = recorded
            .timestamp_ms
            .unwrap_or_else(|| frame_timestamp_ms(self.frame_index, self.fps));

        Ok(match recorded.landmarks {
            Some(points) if !points.is_empty() => SourceFrame::Face(LandmarkFrame::new(
                points.into_iter().map(Landmark::from).collect(),
                timestamp_ms,
            )),
            _ => SourceFrame::NoFace { timestamp_ms },
        })
    }
}

impl<R: BufRead + Send> LandmarkSource for JsonLinesSource<R> {
    fn next_frame(&mut self) -> Result<SourceFrame, SourceError> {
        loop {
            self.buffer.clear();
            let read = self.reader.read_line(&mut self.buffer)?;
            if read == 0 {
                debug!("Recording exhausted after {} frames", self.frame_index);
                return Ok(SourceFrame::EndOfStream);
            }
            self.line_number += 1;

            let line = self.buffer.trim();
            if line.is_empty() {
                continue;
            }

            let frame = self.parse_line(line)?;
            self.frame_index += 1;
            return Ok(frame);
        }
    }

    fn nominal_fps(&self) -> Option<f64> {
        Some(self.fps)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn test_vec_source_stamps_frames() {
        let mut source = VecSource::from_detections(
            vec![Some(vec![Landmark::default()]), None, Some(vec![Landmark::default()])],
            25.0,
        )
        .unwrap();
        assert_eq!(source.nominal_fps(), Some(25.0));

        assert!(matches!(source.next_frame().unwrap(), SourceFrame::Face(f) if f.timestamp_ms() == 0));
        assert_eq!(source.next_frame().unwrap(), SourceFrame::NoFace { timestamp_ms: 40 });
        assert_eq!(source.next_frame().unwrap().timestamp_ms(), Some(80));
        assert_eq!(source.next_frame().unwrap(), SourceFrame::EndOfStream);
        assert_eq!(source.next_frame().unwrap(), SourceFrame::EndOfStream);
    }

    #[test]
    fn test_vec_source_disconnects() {
        let mut source = VecSource::new(vec![SourceFrame::NoFace { timestamp_ms: 0 }])
            .fail_when_exhausted("camera unplugged");

        assert!(source.next_frame().is_ok());
        assert!(matches!(source.next_frame(), Err(SourceError::Disconnected(_))));
    }

    #[test]
    fn test_json_lines_replay() {
        let recording = concat!(
            "{\"timestamp_ms\": 5, \"landmarks\": [[0.1, 0.2, 0.0], [0.3, 0.4, -0.1]]}\n",
            "\n",
            "{\"landmarks\": null}\n",
            "{}\n",
        );
        let mut source = JsonLinesSource::from_reader(Cursor::new(recording), 10.0).unwrap();

        match source.next_frame().unwrap() {
            SourceFrame::Face(frame) => {
                assert_eq!(frame.timestamp_ms(), 5);
                assert_eq!(frame.len(), 2);
                assert_eq!(frame.point(1), Some(&Landmark::new(0.3, 0.4, -0.1)));
            }
            other => panic!("expected face, got {:?}", other),
        }
        // Derived from frame index at 10 fps
        assert_eq!(source.next_frame().unwrap(), SourceFrame::NoFace { timestamp_ms: 100 });
        assert_eq!(source.next_frame().unwrap(), SourceFrame::NoFace { timestamp_ms: 200 });
        assert_eq!(source.next_frame().unwrap(), SourceFrame::EndOfStream);
    }

    #[test]
    fn test_json_lines_parse_error_reports_line() {
        let recording = "{\"landmarks\": []}\nnot json\n";
        let mut source = JsonLinesSource::from_reader(Cursor::new(recording), 30.0).unwrap();

        assert!(source.next_frame().is_ok());
        match source.next_frame() {
            Err(SourceError::Parse { line, .. }) => assert_eq!(line, 2),
            other => panic!("expected parse error, got {:?}", other),
        }
    }

    #[test]
    fn test_invalid_fps_rejected() {
        assert!(JsonLinesSource::from_reader(Cursor::new(""), 0.0).is_err());
        assert!(JsonLinesSource::from_reader(Cursor::new(""), f64::NAN).is_err());
        assert!(matches!(
            VecSource::from_detections(vec![None], 0.0),
            Err(SourceError::Open(_))
        ));
        assert!(VecSource::from_detections(vec![None], -30.0).is_err());
        assert_eq!(VecSource::new(vec![]).nominal_fps(), None);
    }
}
