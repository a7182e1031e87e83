// src/input.rs
//
// Detection frames from the upstream tracker, one JSON object per line:
//
//   {"frame_id": 12, "timestamp": 0.4, "detections": [{"id": 3, "bbox": [x1, y1, x2, y2]}]}
//
// Entries with no id, a negative id, no box or a degenerate box are dropped
// individually; the rest of the frame is still processed.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::time::Instant;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader, Lines};
use tracing::{debug, warn};

use crate::types::{ClockMode, Detection, Point, TrackId};

#[derive(Debug, Clone, Deserialize)]
pub struct RawDetection {
    #[serde(default)]
    pub id: Option<i64>,
    #[serde(default)]
    pub bbox: Option<[f32; 4]>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DetectionFrame {
    #[serde(default)]
    pub frame_id: Option<u64>,
    /// Seconds, used only with `input.clock: frame`
    #[serde(default)]
    pub timestamp: Option<f64>,
    #[serde(default)]
    pub detections: Vec<RawDetection>,
}

impl RawDetection {
    /// Validate into a detection with an integer center, or None if malformed.
    pub fn validate(&self) -> Option<Detection> {
        let id = TrackId::try_from(self.id?).ok()?;
        let [x1, y1, x2, y2] = self.bbox?;
        let coords = [x1, y1, x2, y2];
        let in_range = |v: &f32| v.is_finite() && *v >= i32::MIN as f32 && *v <= i32::MAX as f32;
        if !coords.iter().all(in_range) || x2 < x1 || y2 < y1 {
            return None;
        }
        // Truncate each coordinate first, matching the tracker's integer boxes
        let [x1, y1, x2, y2] = coords.map(|v| v as i64);
        Some(Detection {
            id,
            center: Point {
                x: i32::try_from((x1 + x2).div_euclid(2)).ok()?,
                y: i32::try_from((y1 + y2).div_euclid(2)).ok()?,
            },
        })
    }
}

impl DetectionFrame {
    pub fn parse(line: &str) -> Result<Self> {
        serde_json::from_str(line).context("Invalid detection frame")
    }

    /// Valid detections plus the number of entries skipped.
    pub fn validated(&self) -> (Vec<Detection>, usize) {
        let valid: Vec<Detection> = self
            .detections
            .iter()
            .filter_map(RawDetection::validate)
            .collect();
        let skipped = self.detections.len() - valid.len();
        if skipped > 0 {
            debug!(
                "Frame {:?}: skipped {} malformed detection(s)",
                self.frame_id, skipped
            );
        }
        (valid, skipped)
    }
}

/// Line-oriented frame reader. Undecodable lines are logged and skipped.
pub struct FrameReader<R> {
    lines: Lines<R>,
    line_no: u64,
}

impl<R: AsyncBufRead + Unpin> FrameReader<R> {
    pub fn new(reader: R) -> Self {
        Self {
            lines: reader.lines(),
            line_no: 0,
        }
    }

    /// Next decodable frame, or None at end of input.
    pub async fn next_frame(&mut self) -> Result<Option<DetectionFrame>> {
        while let Some(line) = self
            .lines
            .next_line()
            .await
            .context("Failed to read detection input")?
        {
            self.line_no += 1;
            let trimmed = line.trim();
            if trimmed.is_empty() {
                continue;
            }
            match DetectionFrame::parse(trimmed) {
                Ok(frame) => return Ok(Some(frame)),
                Err(e) => warn!("Skipping input line {}: {:#}", self.line_no, e),
            }
        }
        Ok(None)
    }
}

pub type StdinFrames = FrameReader<BufReader<tokio::io::Stdin>>;
pub type FileFrames = FrameReader<BufReader<tokio::fs::File>>;

pub fn stdin_frames() -> StdinFrames {
    FrameReader::new(BufReader::new(tokio::io::stdin()))
}

pub async fn file_frames(path: &str) -> Result<FileFrames> {
    let file = tokio::fs::File::open(path)
        .await
        .with_context(|| format!("Failed to open detection input {}", path))?;
    Ok(FrameReader::new(BufReader::new(file)))
}

/// Monotonic seconds since the stream started.
pub struct StreamClock {
    mode: ClockMode,
    started: Instant,
    first_frame_ts: Option<f64>,
    last: f64,
}

impl StreamClock {
    pub fn new(mode: ClockMode) -> Self {
        Self {
            mode,
            started: Instant::now(),
            first_frame_ts: None,
            last: 0.0,
        }
    }

    /// Time for a frame carrying `frame_ts`. Never goes backwards.
    pub fn on_frame(&mut self, frame_ts: Option<f64>) -> f64 {
        let t = match (self.mode, frame_ts) {
            (ClockMode::Frame, Some(ts)) if ts.is_finite() => {
                let first = *self.first_frame_ts.get_or_insert(ts);
                ts - first
            }
            (ClockMode::Frame, _) => self.last,
            (ClockMode::Wall, _) => self.started.elapsed().as_secs_f64(),
        };
        self.last = self.last.max(t);
        self.last
    }

    /// Time for timer-driven work.
    pub fn now(&mut self) -> f64 {
        if self.mode == ClockMode::Wall {
            self.last = self.last.max(self.started.elapsed().as_secs_f64());
        }
        self.last
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_center_from_bbox() {
        let raw = RawDetection {
            id: Some(4),
            bbox: Some([10.7, 100.9, 31.2, 201.5]),
        };
        let d = raw.validate().unwrap();
        assert_eq!(d.id, 4);
        assert_eq!(d.center, Point { x: 20, y: 150 });
    }

    #[test]
    fn test_malformed_entries_are_skipped() {
        let line = r#"{"frame_id": 1, "detections": [
            {"id": 1, "bbox": [0, 0, 10, 10]},
            {"bbox": [0, 0, 10, 10]},
            {"id": -3, "bbox": [0, 0, 10, 10]},
            {"id": 2},
            {"id": 5, "bbox": [10, 10, 0, 20]},
            {"id": 6, "bbox": [0, 0, 4, 8]}
        ]}"#;
        let frame = DetectionFrame::parse(line).unwrap();
        let (valid, skipped) = frame.validated();
        assert_eq!(skipped, 4);
        let ids: Vec<TrackId> = valid.iter().map(|d| d.id).collect();
        assert_eq!(ids, vec![1, 6]);
    }

    #[test]
    fn test_huge_coordinates_do_not_overflow() {
        let tall = RawDetection {
            id: Some(1),
            bbox: Some([0.0, 2.0e9, 10.0, 2.0e9]),
        };
        let d = tall.validate().unwrap();
        assert_eq!(d.center, Point { x: 5, y: 2_000_000_000 });

        let outside = RawDetection {
            id: Some(2),
            bbox: Some([0.0, 0.0, 10.0, 1.0e10]),
        };
        assert!(outside.validate().is_none());
    }

    #[test]
    fn test_frame_fields_are_optional() {
        let frame = DetectionFrame::parse("{}").unwrap();
        assert!(frame.detections.is_empty());
        assert!(frame.timestamp.is_none());
    }

    #[tokio::test]
    async fn test_reader_skips_bad_lines() {
        let input = b"{\"detections\": []}\nnot json\n\n{\"frame_id\": 2}\n";
        let mut reader = FrameReader::new(BufReader::new(&input[..]));
        let first = reader.next_frame().await.unwrap().unwrap();
        assert!(first.frame_id.is_none());
        let second = reader.next_frame().await.unwrap().unwrap();
        assert_eq!(second.frame_id, Some(2));
        assert!(reader.next_frame().await.unwrap().is_none());
    }

    #[test]
    fn test_frame_clock_is_relative_and_monotonic() {
        let mut clock = StreamClock::new(ClockMode::Frame);
        assert_eq!(clock.on_frame(Some(1000.0)), 0.0);
        assert_eq!(clock.on_frame(Some(1002.5)), 2.5);
        // Out-of-order timestamp does not rewind
        assert_eq!(clock.on_frame(Some(1001.0)), 2.5);
        assert_eq!(clock.on_frame(None), 2.5);
        assert_eq!(clock.now(), 2.5);
    }
}
