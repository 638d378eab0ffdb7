//! Application state
//!
//! Holds all shared components and configuration

use crate::alert_store::AlertStore;
use crate::analysis_registry::AnalysisRegistry;
use crate::anomaly::RuleConfig;
use crate::tracker::TrackerConfig;
use std::sync::Arc;

/// Application configuration
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// Frame rate assumed when the source does not report one
    pub fallback_fps: f64,
    /// Minimum detection confidence fed to the tracker
    pub min_confidence: f32,
    /// Alert persistence retry attempts before the video is failed
    pub persist_retry_limit: u32,
    /// Base backoff between persistence retries (ms)
    pub persist_retry_base_ms: u64,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            fallback_fps: std::env::var("VIGIL_FPS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(30.0),
            min_confidence: std::env::var("VIGIL_MIN_CONFIDENCE")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(0.5),
            persist_retry_limit: std::env::var("VIGIL_PERSIST_RETRIES")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(3),
            persist_retry_base_ms: 100,
        }
    }
}

/// Per-video engine configuration (tracker + rule thresholds)
#[derive(Debug, Clone, Default)]
pub struct EngineConfig {
    pub tracker: TrackerConfig,
    pub rules: RuleConfig,
}

/// Application state shared across workers
#[derive(Clone)]
pub struct AppState {
    /// Application config
    pub config: AppConfig,
    /// Engine thresholds applied to new videos
    pub engine: EngineConfig,
    /// AnalysisRegistry (status/progress/cancellation)
    pub registry: Arc<AnalysisRegistry>,
    /// AlertStore (event + alert persistence, statistics)
    pub alerts: Arc<AlertStore>,
}

impl AppState {
    pub fn new(config: AppConfig) -> Self {
        Self {
            config,
            engine: EngineConfig::default(),
            registry: Arc::new(AnalysisRegistry::new()),
            alerts: Arc::new(AlertStore::new()),
        }
    }

    /// Combined dashboard statistics across registry and alert store
    pub async fn aggregate_stats(&self) -> crate::models::AggregateStats {
        let counts = self.registry.status_counts().await;
        self.alerts.aggregate_stats(counts).await
    }
}
