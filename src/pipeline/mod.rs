//! PipelineOrchestrator - Per-Video Processing Loop
//!
//! ## Responsibilities
//!
//! - Drive one video: detection source -> tracker -> classifier, frame by frame
//! - Forward anomaly events to the alert sink (transactional per event,
//!   bounded retry with backoff)
//! - Track processing progress and completion statistics
//! - Cooperative cancellation checked between frames
//!
//! Each video is processed by one independent worker; within a video the loop
//! is strictly sequential. The tracker and classifier never block on I/O.

use crate::analysis_registry::{AnalysisRegistry, AnalysisSummary};
use crate::anomaly::AnomalyClassifier;
use crate::error::{Error, Result};
use crate::models::{AnomalyEvent, AnomalyType, Detection, NewAlert};
use crate::state::{AppConfig, EngineConfig};
use crate::tracker::{Track, Tracker};
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

/// One decoded frame handed to the detection source. The image buffer is
/// scoped to the frame's processing step and dropped right after detection.
#[derive(Debug, Clone)]
pub struct Frame {
    pub index: u64,
    /// Seconds from stream start
    pub timestamp: f64,
    pub image: Option<Vec<u8>>,
}

/// Frame decode collaborator
pub trait FrameSource {
    fn total_frames(&self) -> u64;
    fn next_frame(&mut self) -> impl std::future::Future<Output = Result<Option<Frame>>> + Send;
}

/// Detection model collaborator. Output is expected confidence-filtered;
/// the orchestrator applies the configured floor defensively anyway.
pub trait DetectionSource {
    fn detect(
        &mut self,
        frame: &Frame,
    ) -> impl std::future::Future<Output = Result<Vec<Detection>>> + Send;
}

/// Alert/storage collaborator. Each event and its derived alert must be
/// persisted atomically.
pub trait AlertSink {
    fn record(
        &self,
        analysis_id: Uuid,
        event: &AnomalyEvent,
        alert: NewAlert,
    ) -> impl std::future::Future<Output = Result<()>> + Send;
}

/// Drives videos through the detection/tracking/classification pipeline
pub struct PipelineOrchestrator {
    registry: Arc<AnalysisRegistry>,
    engine: EngineConfig,
    min_confidence: f32,
    retry_limit: u32,
    retry_base_ms: u64,
}

impl PipelineOrchestrator {
    pub fn new(registry: Arc<AnalysisRegistry>, engine: EngineConfig, config: &AppConfig) -> Self {
        Self {
            registry,
            engine,
            min_confidence: config.min_confidence,
            retry_limit: config.persist_retry_limit,
            retry_base_ms: config.persist_retry_base_ms,
        }
    }

    /// Process one registered video to completion.
    ///
    /// Returns `Error::Cancelled` if the analysis was cancelled or deleted
    /// mid-run; accumulated tracks and pending events are discarded.
    pub async fn process_video<F, D, S>(
        &self,
        analysis_id: Uuid,
        mut frames: F,
        mut detector: D,
        sink: &S,
    ) -> Result<AnalysisSummary>
    where
        F: FrameSource,
        D: DetectionSource,
        S: AlertSink,
    {
        let total_frames = frames.total_frames();
        let filename = self
            .registry
            .mark_processing(analysis_id, total_frames)
            .await?;

        tracing::info!(
            analysis_id = %analysis_id,
            filename = %filename,
            total_frames,
            "Starting video processing"
        );

        let mut tracker = Tracker::new(self.engine.tracker.clone());
        let mut classifier = AnomalyClassifier::new(self.engine.rules.clone());
        let mut summary = AnalysisSummary::default();
        let mut last_frame: Option<(u64, f64)> = None;
        // Tracks lost in frame N keep their rule state through frame N's
        // evaluation and the end-of-stream pass; retirement happens when the
        // next frame arrives
        let mut pending_retire: Vec<u64> = Vec::new();

        loop {
            // Cancellation point: between frames only, so no track or event
            // is ever left half-updated
            if self.registry.is_cancelled(analysis_id).await {
                tracing::info!(analysis_id = %analysis_id, "Processing cancelled, discarding state");
                return Err(Error::Cancelled(analysis_id));
            }

            let mut frame = match frames.next_frame().await {
                Ok(Some(frame)) => frame,
                Ok(None) => break,
                Err(e) => {
                    // Unrecoverable decode failure: fail the video, nothing
                    // partial is persisted
                    let reason = format!("frame source failed at frame {}: {e}", summary.processed_frames);
                    tracing::error!(analysis_id = %analysis_id, error = %e, "Frame source failed");
                    self.registry.mark_failed(analysis_id, &reason).await;
                    return Err(Error::FrameSource(reason));
                }
            };

            for track_id in pending_retire.drain(..) {
                classifier.retire(track_id);
            }

            let detections = match detector.detect(&frame).await {
                Ok(detections) => detections,
                Err(e) => {
                    // Single-frame detector failure: skip the frame, continue
                    tracing::warn!(
                        analysis_id = %analysis_id,
                        frame_index = frame.index,
                        error = %e,
                        "Detection failed for frame, continuing without detections"
                    );
                    Vec::new()
                }
            };
            // Decoded image buffer is scoped to the detection step
            frame.image = None;

            let detections: Vec<Detection> = detections
                .into_iter()
                .filter(|d| d.confidence >= self.min_confidence)
                .collect();

            summary.total_objects_detected += detections.len() as u64;
            summary.total_persons_detected += detections
                .iter()
                .filter(|d| d.class_label == crate::models::PERSON_CLASS)
                .count() as u64;

            let update = tracker.update(frame.index, frame.timestamp, &detections);

            let snapshot: Vec<&Track> = tracker.all_tracks().iter().collect();
            let events = classifier.evaluate(frame.index, frame.timestamp, &snapshot);
            pending_retire = update.lost;

            summary.total_anomalies += events.len() as u64;
            self.persist_events(analysis_id, &filename, &events, sink)
                .await?;

            summary.processed_frames += 1;
            last_frame = Some((frame.index, frame.timestamp));
            self.registry
                .update_progress(analysis_id, summary.processed_frames)
                .await;
        }

        // End-of-stream pass over every track, including just-lost ones, for
        // anomalies only resolvable when the video ends
        if let Some((frame_index, timestamp)) = last_frame {
            let snapshot: Vec<&Track> = tracker.all_tracks().iter().collect();
            let events = classifier.finalize(frame_index, timestamp, &snapshot);
            summary.total_anomalies += events.len() as u64;
            self.persist_events(analysis_id, &filename, &events, sink)
                .await?;
        }

        self.registry.mark_completed(analysis_id, &summary).await;
        tracing::info!(
            analysis_id = %analysis_id,
            frames = summary.processed_frames,
            anomalies = summary.total_anomalies,
            "Video processing completed"
        );

        Ok(summary)
    }

    /// Persist one frame's event batch. Transient sink failures are retried
    /// with exponential backoff; exhausted retries fail the video while
    /// preserving already-committed alerts.
    async fn persist_events<S: AlertSink>(
        &self,
        analysis_id: Uuid,
        filename: &str,
        events: &[AnomalyEvent],
        sink: &S,
    ) -> Result<()> {
        for event in events {
            let mut attempt = 0u32;
            loop {
                let alert = build_alert(event, filename);
                match sink.record(analysis_id, event, alert).await {
                    Ok(()) => break,
                    Err(e) if attempt < self.retry_limit => {
                        let backoff = self.retry_base_ms << attempt;
                        attempt += 1;
                        tracing::warn!(
                            analysis_id = %analysis_id,
                            attempt,
                            backoff_ms = backoff,
                            error = %e,
                            "Alert persistence failed, retrying"
                        );
                        tokio::time::sleep(Duration::from_millis(backoff)).await;
                    }
                    Err(e) => {
                        let reason = format!("alert persistence exhausted retries: {e}");
                        tracing::error!(analysis_id = %analysis_id, error = %e, "Alert persistence gave up");
                        self.registry.mark_failed(analysis_id, &reason).await;
                        return Err(Error::Storage(reason));
                    }
                }
            }
        }
        Ok(())
    }
}

/// Derive the dashboard alert for an event at emission time
fn build_alert(event: &AnomalyEvent, filename: &str) -> NewAlert {
    let title = match event.anomaly_type {
        AnomalyType::Loitering => "Loitering",
        AnomalyType::Abandonment => "Abandonment",
        AnomalyType::ErraticMovement => "Erratic movement",
    };
    NewAlert {
        anomaly_type: event.anomaly_type,
        level: event.severity.into(),
        message: format!("{title} detected: {}", event.description),
        video_filename: filename.to_string(),
    }
}
