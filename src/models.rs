//! Shared models and types for the vigil engine
//!
//! This module contains types shared across multiple modules
//! to avoid circular dependencies. In-video timestamps are seconds
//! from stream start (`frame_index / fps`); wall-clock fields use
//! `chrono::DateTime<Utc>`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Class label used by the person-gated rules
pub const PERSON_CLASS: &str = "person";

/// Axis-aligned bounding box in pixel space (x, y = top-left corner)
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x: f32,
    pub y: f32,
    pub w: f32,
    pub h: f32,
}

impl BoundingBox {
    pub fn new(x: f32, y: f32, w: f32, h: f32) -> Self {
        Self { x, y, w, h }
    }

    /// Center point of the box
    pub fn centroid(&self) -> (f32, f32) {
        (self.x + self.w / 2.0, self.y + self.h / 2.0)
    }

    pub fn area(&self) -> f32 {
        self.w * self.h
    }

    /// A box is usable for matching only if finite with positive area
    pub fn is_valid(&self) -> bool {
        self.x.is_finite()
            && self.y.is_finite()
            && self.w.is_finite()
            && self.h.is_finite()
            && self.w > 0.0
            && self.h > 0.0
    }

    /// Intersection-over-union with another box
    pub fn iou(&self, other: &BoundingBox) -> f32 {
        let x1 = self.x.max(other.x);
        let y1 = self.y.max(other.y);
        let x2 = (self.x + self.w).min(other.x + other.w);
        let y2 = (self.y + self.h).min(other.y + other.h);

        let intersection = (x2 - x1).max(0.0) * (y2 - y1).max(0.0);
        let union = self.area() + other.area() - intersection;

        if union <= f32::EPSILON {
            return 0.0;
        }
        intersection / union
    }
}

/// Euclidean distance between two points
pub fn distance(a: (f32, f32), b: (f32, f32)) -> f32 {
    ((a.0 - b.0).powi(2) + (a.1 - b.1).powi(2)).sqrt()
}

/// One detection from the detection source, transient per frame
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Detection {
    pub class_label: String,
    pub bbox: BoundingBox,
    pub confidence: f32,
    pub frame_index: u64,
}

/// Anomaly category
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnomalyType {
    Loitering,
    Abandonment,
    ErraticMovement,
}

impl AnomalyType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Loitering => "loitering",
            Self::Abandonment => "abandonment",
            Self::ErraticMovement => "erratic_movement",
        }
    }
}

impl std::fmt::Display for AnomalyType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Severity graded by how far a rule threshold was exceeded
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

impl Severity {
    /// Grade from the ratio of observed evidence to its trigger threshold.
    /// A ratio of 1.0 means the threshold was barely reached.
    pub fn from_ratio(ratio: f64) -> Self {
        if ratio >= 4.0 {
            Self::Critical
        } else if ratio >= 2.5 {
            Self::High
        } else if ratio >= 1.5 {
            Self::Medium
        } else {
            Self::Low
        }
    }
}

/// Alert level consumed by the dashboard
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertLevel {
    Info,
    Warning,
    Danger,
    Critical,
}

impl From<Severity> for AlertLevel {
    fn from(severity: Severity) -> Self {
        match severity {
            Severity::Low => Self::Info,
            Severity::Medium => Self::Warning,
            Severity::High => Self::Danger,
            Severity::Critical => Self::Critical,
        }
    }
}

/// Immutable anomaly record emitted by the classifier
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnomalyEvent {
    pub anomaly_type: AnomalyType,
    /// Primary subject track
    pub track_id: u64,
    /// Departing owner for abandonment
    pub related_track_id: Option<u64>,
    /// Start of the evidence window, seconds from stream start
    pub window_start: f64,
    /// End of the evidence window, seconds from stream start
    pub window_end: f64,
    pub severity: Severity,
    /// Representative frame snapshot
    pub frame_reference: u64,
    /// Human-readable evidence summary
    pub description: String,
}

/// Alert derived 1:1 from an AnomalyEvent at emission time
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Alert {
    pub id: u64,
    pub analysis_id: Uuid,
    pub anomaly_type: AnomalyType,
    pub level: AlertLevel,
    pub message: String,
    pub video_filename: String,
    pub created_time: DateTime<Utc>,
    pub is_acknowledged: bool,
    pub acknowledged_by: Option<String>,
    pub acknowledged_time: Option<DateTime<Utc>>,
}

/// Alert fields supplied by the pipeline at emission time; the storage
/// collaborator assigns id and timestamps
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewAlert {
    pub anomaly_type: AnomalyType,
    pub level: AlertLevel,
    pub message: String,
    pub video_filename: String,
}

/// Video processing lifecycle
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProcessingStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

/// Status surface polled per in-progress video
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusReport {
    pub status: ProcessingStatus,
    /// 0-100
    pub progress: f64,
    pub processed_frames: u64,
    pub total_frames: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure_reason: Option<String>,
}

/// Aggregate statistics surface for dashboard charts
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AggregateStats {
    pub total_videos: u64,
    pub processing_videos: u64,
    pub completed_videos: u64,
    pub failed_videos: u64,
    pub total_anomalies: u64,
    pub total_alerts: u64,
    pub unacknowledged_alerts: u64,
    pub anomaly_types: std::collections::HashMap<String, u64>,
}
