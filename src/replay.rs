//! Detection-stream replay
//!
//! Frame and detection sources backed by a pre-computed detection log
//! (JSONL, one frame record per line). Stands in for the decode and
//! inference collaborators in the replay binary and in scenario tests.

use crate::error::{Error, Result};
use crate::models::{BoundingBox, Detection};
use crate::pipeline::{DetectionSource, Frame, FrameSource};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;

/// One detection as serialized by the upstream detector
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReplayDetection {
    pub class: String,
    /// x, y, w, h in pixels
    pub bbox: [f32; 4],
    pub confidence: f32,
}

/// One frame record of the replay stream
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReplayFrame {
    pub frame_index: u64,
    /// Seconds from stream start; derived from the frame index and the
    /// fallback frame rate when the record carries none
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<f64>,
    #[serde(default)]
    pub detections: Vec<ReplayDetection>,
}

/// A parsed detection stream for one video
#[derive(Debug, Clone)]
pub struct ReplayScript {
    frames: Vec<ReplayFrame>,
}

impl ReplayScript {
    pub fn from_records(mut frames: Vec<ReplayFrame>) -> Self {
        frames.sort_by_key(|f| f.frame_index);
        Self { frames }
    }

    /// Parse a JSONL file, one frame record per non-empty line
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())?;
        let mut frames = Vec::new();
        for (line_no, line) in content.lines().enumerate() {
            if line.trim().is_empty() {
                continue;
            }
            let frame: ReplayFrame = serde_json::from_str(line).map_err(|e| {
                Error::Validation(format!(
                    "bad frame record on line {}: {e}",
                    line_no + 1
                ))
            })?;
            frames.push(frame);
        }
        Ok(Self::from_records(frames))
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    /// Split into the two collaborator roles the pipeline expects. Records
    /// without an explicit timestamp get `frame_index / fallback_fps`.
    pub fn split(self, fallback_fps: f64) -> (ReplayFrameSource, ReplayDetectionSource) {
        let mut detections: HashMap<u64, Vec<Detection>> = HashMap::new();
        let mut frames = Vec::with_capacity(self.frames.len());
        for frame in self.frames {
            let converted = frame
                .detections
                .iter()
                .map(|d| Detection {
                    class_label: d.class.clone(),
                    bbox: BoundingBox::new(d.bbox[0], d.bbox[1], d.bbox[2], d.bbox[3]),
                    confidence: d.confidence,
                    frame_index: frame.frame_index,
                })
                .collect();
            detections.insert(frame.frame_index, converted);
            let timestamp = frame
                .timestamp
                .unwrap_or(frame.frame_index as f64 / fallback_fps);
            frames.push((frame.frame_index, timestamp));
        }
        (
            ReplayFrameSource { frames, cursor: 0 },
            ReplayDetectionSource { detections },
        )
    }
}

/// Replays frame indices/timestamps in order
pub struct ReplayFrameSource {
    frames: Vec<(u64, f64)>,
    cursor: usize,
}

impl FrameSource for ReplayFrameSource {
    fn total_frames(&self) -> u64 {
        self.frames.len() as u64
    }

    async fn next_frame(&mut self) -> Result<Option<Frame>> {
        let Some(&(index, timestamp)) = self.frames.get(self.cursor) else {
            return Ok(None);
        };
        self.cursor += 1;
        Ok(Some(Frame {
            index,
            timestamp,
            image: None,
        }))
    }
}

/// Serves the recorded detections for each frame
pub struct ReplayDetectionSource {
    detections: HashMap<u64, Vec<Detection>>,
}

impl DetectionSource for ReplayDetectionSource {
    async fn detect(&mut self, frame: &Frame) -> Result<Vec<Detection>> {
        Ok(self.detections.get(&frame.index).cloned().unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_jsonl_lines() {
        let raw = concat!(
            r#"{"frame_index":0,"timestamp":0.0,"detections":[{"class":"person","bbox":[10,10,20,40],"confidence":0.9}]}"#,
            "\n",
            r#"{"frame_index":1,"timestamp":0.033}"#,
            "\n",
        );
        let frames: Vec<ReplayFrame> = raw
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect();
        let script = ReplayScript::from_records(frames);
        assert_eq!(script.len(), 2);

        let (frames, _) = script.split(30.0);
        assert_eq!(frames.total_frames(), 2);
    }

    #[tokio::test]
    async fn test_missing_timestamp_derived_from_frame_rate() {
        let script = ReplayScript::from_records(vec![ReplayFrame {
            frame_index: 15,
            timestamp: None,
            detections: vec![],
        }]);
        let (mut frames, _) = script.split(30.0);
        let frame = frames.next_frame().await.unwrap().unwrap();
        assert!((frame.timestamp - 0.5).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_sources_replay_in_order() {
        let script = ReplayScript::from_records(vec![
            ReplayFrame {
                frame_index: 1,
                timestamp: Some(1.0),
                detections: vec![],
            },
            ReplayFrame {
                frame_index: 0,
                timestamp: Some(0.0),
                detections: vec![ReplayDetection {
                    class: "person".to_string(),
                    bbox: [10.0, 10.0, 20.0, 40.0],
                    confidence: 0.9,
                }],
            },
        ]);
        let (mut frames, mut detections) = script.split(30.0);

        let first = frames.next_frame().await.unwrap().unwrap();
        assert_eq!(first.index, 0);
        let dets = detections.detect(&first).await.unwrap();
        assert_eq!(dets.len(), 1);
        assert_eq!(dets[0].class_label, "person");

        let second = frames.next_frame().await.unwrap().unwrap();
        assert_eq!(second.index, 1);
        assert!(frames.next_frame().await.unwrap().is_none());
    }
}
