//! AnalysisRegistry - Video Processing Status
//!
//! ## Responsibilities
//!
//! - Register uploaded videos and their processing lifecycle
//!   (pending -> processing -> completed/failed)
//! - Atomic progress updates read by the status surface
//! - Cooperative cancellation: deleting an analysis mid-run cancels its worker

use crate::error::{Error, Result};
use crate::models::{ProcessingStatus, StatusReport};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tokio::sync::RwLock;
use uuid::Uuid;

/// One video's analysis record
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VideoAnalysis {
    pub id: Uuid,
    pub filename: String,
    pub upload_time: DateTime<Utc>,
    pub status: ProcessingStatus,
    pub failure_reason: Option<String>,
    pub total_frames: u64,
    pub processed_frames: u64,
    pub total_objects_detected: u64,
    pub total_persons_detected: u64,
    pub total_anomalies: u64,
    /// Set by cancel/remove; checked by the pipeline between frames
    #[serde(skip)]
    pub cancel_requested: bool,
}

/// Completion counters produced by one pipeline run
#[derive(Debug, Clone, Default)]
pub struct AnalysisSummary {
    pub processed_frames: u64,
    pub total_objects_detected: u64,
    pub total_persons_detected: u64,
    pub total_anomalies: u64,
}

/// Per-status counts for the statistics surface
#[derive(Debug, Clone, Copy, Default)]
pub struct StatusCounts {
    pub total: u64,
    pub processing: u64,
    pub completed: u64,
    pub failed: u64,
}

/// In-memory registry of video analyses
pub struct AnalysisRegistry {
    records: RwLock<HashMap<Uuid, VideoAnalysis>>,
}

impl AnalysisRegistry {
    pub fn new() -> Self {
        Self {
            records: RwLock::new(HashMap::new()),
        }
    }

    /// Register a new video, status `pending`
    pub async fn register(&self, filename: &str) -> Uuid {
        let id = Uuid::new_v4();
        let record = VideoAnalysis {
            id,
            filename: filename.to_string(),
            upload_time: Utc::now(),
            status: ProcessingStatus::Pending,
            failure_reason: None,
            total_frames: 0,
            processed_frames: 0,
            total_objects_detected: 0,
            total_persons_detected: 0,
            total_anomalies: 0,
            cancel_requested: false,
        };
        self.records.write().await.insert(id, record);
        tracing::info!(analysis_id = %id, filename, "Analysis registered");
        id
    }

    /// Transition to `processing`; returns the filename for alert messages
    pub async fn mark_processing(&self, id: Uuid, total_frames: u64) -> Result<String> {
        let mut records = self.records.write().await;
        let record = records
            .get_mut(&id)
            .ok_or_else(|| Error::NotFound(format!("analysis {id}")))?;
        record.status = ProcessingStatus::Processing;
        record.total_frames = total_frames;
        record.processed_frames = 0;
        Ok(record.filename.clone())
    }

    /// Atomic progress update; status reads see processed/total together
    pub async fn update_progress(&self, id: Uuid, processed_frames: u64) {
        if let Some(record) = self.records.write().await.get_mut(&id) {
            record.processed_frames = processed_frames;
        }
    }

    pub async fn mark_completed(&self, id: Uuid, summary: &AnalysisSummary) {
        if let Some(record) = self.records.write().await.get_mut(&id) {
            record.status = ProcessingStatus::Completed;
            record.processed_frames = summary.processed_frames;
            record.total_objects_detected = summary.total_objects_detected;
            record.total_persons_detected = summary.total_persons_detected;
            record.total_anomalies = summary.total_anomalies;
        }
    }

    pub async fn mark_failed(&self, id: Uuid, reason: &str) {
        if let Some(record) = self.records.write().await.get_mut(&id) {
            record.status = ProcessingStatus::Failed;
            record.failure_reason = Some(reason.to_string());
            tracing::error!(analysis_id = %id, reason, "Analysis failed");
        }
    }

    /// Request cooperative cancellation of an in-flight analysis
    pub async fn cancel(&self, id: Uuid) {
        if let Some(record) = self.records.write().await.get_mut(&id) {
            record.cancel_requested = true;
            tracing::info!(analysis_id = %id, "Cancellation requested");
        }
    }

    /// Delete an analysis. An in-flight worker observes this as cancellation.
    pub async fn remove(&self, id: Uuid) -> Result<VideoAnalysis> {
        self.records
            .write()
            .await
            .remove(&id)
            .ok_or_else(|| Error::NotFound(format!("analysis {id}")))
    }

    /// True when the record was cancelled or no longer exists
    pub async fn is_cancelled(&self, id: Uuid) -> bool {
        self.records
            .read()
            .await
            .get(&id)
            .map(|r| r.cancel_requested)
            .unwrap_or(true)
    }

    /// Status surface polled by the dashboard
    pub async fn status(&self, id: Uuid) -> Option<StatusReport> {
        self.records.read().await.get(&id).map(|record| {
            let progress = if record.total_frames == 0 {
                0.0
            } else {
                record.processed_frames as f64 / record.total_frames as f64 * 100.0
            };
            StatusReport {
                status: record.status.clone(),
                progress,
                processed_frames: record.processed_frames,
                total_frames: record.total_frames,
                failure_reason: record.failure_reason.clone(),
            }
        })
    }

    pub async fn get(&self, id: Uuid) -> Option<VideoAnalysis> {
        self.records.read().await.get(&id).cloned()
    }

    /// All records, newest upload first
    pub async fn list(&self) -> Vec<VideoAnalysis> {
        let mut records: Vec<VideoAnalysis> = self.records.read().await.values().cloned().collect();
        records.sort_by(|a, b| b.upload_time.cmp(&a.upload_time));
        records
    }

    pub async fn status_counts(&self) -> StatusCounts {
        let records = self.records.read().await;
        let mut counts = StatusCounts {
            total: records.len() as u64,
            ..StatusCounts::default()
        };
        for record in records.values() {
            match record.status {
                ProcessingStatus::Processing => counts.processing += 1,
                ProcessingStatus::Completed => counts.completed += 1,
                ProcessingStatus::Failed => counts.failed += 1,
                ProcessingStatus::Pending => {}
            }
        }
        counts
    }
}

impl Default for AnalysisRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_register_starts_pending() {
        let registry = AnalysisRegistry::new();
        let id = registry.register("a.mp4").await;
        let status = registry.status(id).await.unwrap();
        assert_eq!(status.status, ProcessingStatus::Pending);
        assert_eq!(status.progress, 0.0);
    }

    #[tokio::test]
    async fn test_progress_reflects_frames() {
        let registry = AnalysisRegistry::new();
        let id = registry.register("a.mp4").await;
        registry.mark_processing(id, 200).await.unwrap();
        registry.update_progress(id, 50).await;
        let status = registry.status(id).await.unwrap();
        assert_eq!(status.progress, 25.0);
        assert_eq!(status.processed_frames, 50);
        assert_eq!(status.total_frames, 200);
    }

    #[tokio::test]
    async fn test_unknown_id_is_cancelled() {
        let registry = AnalysisRegistry::new();
        assert!(registry.is_cancelled(Uuid::new_v4()).await);
    }

    #[tokio::test]
    async fn test_remove_acts_as_cancellation() {
        let registry = AnalysisRegistry::new();
        let id = registry.register("a.mp4").await;
        registry.mark_processing(id, 10).await.unwrap();
        assert!(!registry.is_cancelled(id).await);
        registry.remove(id).await.unwrap();
        assert!(registry.is_cancelled(id).await);
    }

    #[tokio::test]
    async fn test_mark_processing_unknown_id_errors() {
        let registry = AnalysisRegistry::new();
        assert!(registry.mark_processing(Uuid::new_v4(), 10).await.is_err());
    }

    #[tokio::test]
    async fn test_status_counts() {
        let registry = AnalysisRegistry::new();
        let a = registry.register("a.mp4").await;
        let b = registry.register("b.mp4").await;
        registry.register("c.mp4").await;
        registry.mark_processing(a, 10).await.unwrap();
        registry.mark_completed(a, &AnalysisSummary::default()).await;
        registry.mark_processing(b, 10).await.unwrap();
        registry.mark_failed(b, "decode error").await;

        let counts = registry.status_counts().await;
        assert_eq!(counts.total, 3);
        assert_eq!(counts.completed, 1);
        assert_eq!(counts.failed, 1);
        assert_eq!(counts.processing, 0);
    }
}
