//! AlertStore - Anomaly Event and Alert Persistence
//!
//! ## Responsibilities
//!
//! - Store anomaly events with their derived alerts, atomically per event
//! - Provide alert queries and the acknowledge/resolve lifecycle
//! - Feed the aggregate statistics surface
//!
//! Default in-memory implementation of the storage collaborator; a database
//! backend plugs in behind the same `AlertSink` seam.

use crate::analysis_registry::StatusCounts;
use crate::error::{Error, Result};
use crate::models::{AggregateStats, Alert, AnomalyEvent, NewAlert};
use crate::pipeline::AlertSink;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use uuid::Uuid;

/// Persisted anomaly event
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredEvent {
    pub id: u64,
    pub analysis_id: Uuid,
    pub event: AnomalyEvent,
    pub detected_time: DateTime<Utc>,
    pub is_resolved: bool,
}

#[derive(Default)]
struct StoreInner {
    events: Vec<StoredEvent>,
    alerts: Vec<Alert>,
    next_event_id: u64,
    next_alert_id: u64,
}

/// AlertStore instance
pub struct AlertStore {
    inner: RwLock<StoreInner>,
}

impl AlertStore {
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(StoreInner {
                next_event_id: 1,
                next_alert_id: 1,
                ..StoreInner::default()
            }),
        }
    }

    /// Append an event and its alert under one lock; a reader never sees one
    /// without the other
    pub async fn record_event(
        &self,
        analysis_id: Uuid,
        event: &AnomalyEvent,
        alert: NewAlert,
    ) -> (u64, u64) {
        let mut inner = self.inner.write().await;

        let event_id = inner.next_event_id;
        inner.next_event_id += 1;
        inner.events.push(StoredEvent {
            id: event_id,
            analysis_id,
            event: event.clone(),
            detected_time: Utc::now(),
            is_resolved: false,
        });

        let alert_id = inner.next_alert_id;
        inner.next_alert_id += 1;
        inner.alerts.push(Alert {
            id: alert_id,
            analysis_id,
            anomaly_type: alert.anomaly_type,
            level: alert.level,
            message: alert.message,
            video_filename: alert.video_filename,
            created_time: Utc::now(),
            is_acknowledged: false,
            acknowledged_by: None,
            acknowledged_time: None,
        });

        tracing::debug!(event_id, alert_id, analysis_id = %analysis_id, "Event and alert recorded");
        (event_id, alert_id)
    }

    /// Latest alerts, newest first
    pub async fn latest_alerts(&self, count: usize) -> Vec<Alert> {
        let inner = self.inner.read().await;
        inner.alerts.iter().rev().take(count).cloned().collect()
    }

    pub async fn unacknowledged_alerts(&self) -> Vec<Alert> {
        let inner = self.inner.read().await;
        inner
            .alerts
            .iter()
            .filter(|a| !a.is_acknowledged)
            .cloned()
            .collect()
    }

    pub async fn acknowledge_alert(&self, alert_id: u64, by: &str) -> Result<()> {
        let mut inner = self.inner.write().await;
        let alert = inner
            .alerts
            .iter_mut()
            .find(|a| a.id == alert_id)
            .ok_or_else(|| Error::NotFound(format!("alert {alert_id}")))?;
        alert.is_acknowledged = true;
        alert.acknowledged_by = Some(by.to_string());
        alert.acknowledged_time = Some(Utc::now());
        Ok(())
    }

    pub async fn resolve_event(&self, event_id: u64) -> Result<()> {
        let mut inner = self.inner.write().await;
        let event = inner
            .events
            .iter_mut()
            .find(|e| e.id == event_id)
            .ok_or_else(|| Error::NotFound(format!("event {event_id}")))?;
        event.is_resolved = true;
        Ok(())
    }

    pub async fn events_for_analysis(&self, analysis_id: Uuid) -> Vec<StoredEvent> {
        let inner = self.inner.read().await;
        inner
            .events
            .iter()
            .filter(|e| e.analysis_id == analysis_id)
            .cloned()
            .collect()
    }

    /// Drop everything recorded for one analysis (video deletion)
    pub async fn remove_analysis(&self, analysis_id: Uuid) {
        let mut inner = self.inner.write().await;
        inner.events.retain(|e| e.analysis_id != analysis_id);
        inner.alerts.retain(|a| a.analysis_id != analysis_id);
    }

    /// Aggregate statistics surface for dashboard charts
    pub async fn aggregate_stats(&self, videos: StatusCounts) -> AggregateStats {
        let inner = self.inner.read().await;
        let mut stats = AggregateStats {
            total_videos: videos.total,
            processing_videos: videos.processing,
            completed_videos: videos.completed,
            failed_videos: videos.failed,
            total_anomalies: inner.events.len() as u64,
            total_alerts: inner.alerts.len() as u64,
            unacknowledged_alerts: inner.alerts.iter().filter(|a| !a.is_acknowledged).count()
                as u64,
            ..AggregateStats::default()
        };
        for event in &inner.events {
            *stats
                .anomaly_types
                .entry(event.event.anomaly_type.as_str().to_string())
                .or_insert(0) += 1;
        }
        stats
    }
}

impl Default for AlertStore {
    fn default() -> Self {
        Self::new()
    }
}

impl AlertSink for AlertStore {
    async fn record(&self, analysis_id: Uuid, event: &AnomalyEvent, alert: NewAlert) -> Result<()> {
        self.record_event(analysis_id, event, alert).await;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{AlertLevel, AnomalyType, Severity};

    fn event(anomaly_type: AnomalyType) -> AnomalyEvent {
        AnomalyEvent {
            anomaly_type,
            track_id: 1,
            related_track_id: None,
            window_start: 0.0,
            window_end: 5.0,
            severity: Severity::Medium,
            frame_reference: 5,
            description: "test".to_string(),
        }
    }

    fn alert(anomaly_type: AnomalyType) -> NewAlert {
        NewAlert {
            anomaly_type,
            level: AlertLevel::Warning,
            message: "test alert".to_string(),
            video_filename: "a.mp4".to_string(),
        }
    }

    #[tokio::test]
    async fn test_event_and_alert_recorded_together() {
        let store = AlertStore::new();
        let id = Uuid::new_v4();
        let (event_id, alert_id) = store
            .record_event(id, &event(AnomalyType::Loitering), alert(AnomalyType::Loitering))
            .await;
        assert_eq!(event_id, 1);
        assert_eq!(alert_id, 1);
        assert_eq!(store.events_for_analysis(id).await.len(), 1);
        assert_eq!(store.latest_alerts(10).await.len(), 1);
    }

    #[tokio::test]
    async fn test_acknowledge_lifecycle() {
        let store = AlertStore::new();
        let id = Uuid::new_v4();
        let (_, alert_id) = store
            .record_event(id, &event(AnomalyType::Loitering), alert(AnomalyType::Loitering))
            .await;

        assert_eq!(store.unacknowledged_alerts().await.len(), 1);
        store.acknowledge_alert(alert_id, "operator").await.unwrap();
        assert!(store.unacknowledged_alerts().await.is_empty());

        let alert = &store.latest_alerts(1).await[0];
        assert_eq!(alert.acknowledged_by.as_deref(), Some("operator"));
        assert!(alert.acknowledged_time.is_some());
    }

    #[tokio::test]
    async fn test_acknowledge_unknown_alert_errors() {
        let store = AlertStore::new();
        assert!(store.acknowledge_alert(99, "operator").await.is_err());
    }

    #[tokio::test]
    async fn test_stats_break_down_by_type() {
        let store = AlertStore::new();
        let id = Uuid::new_v4();
        for _ in 0..2 {
            store
                .record_event(id, &event(AnomalyType::Loitering), alert(AnomalyType::Loitering))
                .await;
        }
        store
            .record_event(
                id,
                &event(AnomalyType::Abandonment),
                alert(AnomalyType::Abandonment),
            )
            .await;

        let stats = store.aggregate_stats(StatusCounts::default()).await;
        assert_eq!(stats.total_anomalies, 3);
        assert_eq!(stats.total_alerts, 3);
        assert_eq!(stats.anomaly_types.get("loitering"), Some(&2));
        assert_eq!(stats.anomaly_types.get("abandonment"), Some(&1));
    }

    #[tokio::test]
    async fn test_remove_analysis_drops_all_records() {
        let store = AlertStore::new();
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        store
            .record_event(a, &event(AnomalyType::Loitering), alert(AnomalyType::Loitering))
            .await;
        store
            .record_event(b, &event(AnomalyType::Loitering), alert(AnomalyType::Loitering))
            .await;

        store.remove_analysis(a).await;
        assert!(store.events_for_analysis(a).await.is_empty());
        assert_eq!(store.events_for_analysis(b).await.len(), 1);
        assert_eq!(store.latest_alerts(10).await.len(), 1);
    }
}
