//! Vigil Replay - Detection-Stream Analysis Runner
//!
//! Runs one recorded detection stream (JSONL) through the full
//! tracking/classification pipeline and prints the resulting alerts
//! and statistics.

use vigil_engine::pipeline::PipelineOrchestrator;
use vigil_engine::replay::ReplayScript;
use vigil_engine::state::{AppConfig, AppState};

use anyhow::Context;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present
    dotenvy::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "vigil_engine=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting Vigil Replay v{}", env!("CARGO_PKG_VERSION"));

    let mut args = std::env::args().skip(1);
    let path = args
        .next()
        .context("usage: vigil-replay <detections.jsonl> [video-name]")?;
    let video_name = args.next().unwrap_or_else(|| {
        std::path::Path::new(&path)
            .file_stem()
            .map(|s| format!("{}.mp4", s.to_string_lossy()))
            .unwrap_or_else(|| path.clone())
    });

    let script = ReplayScript::from_path(&path)
        .with_context(|| format!("failed to load detection stream {path}"))?;
    tracing::info!(frames = script.len(), video = %video_name, "Detection stream loaded");

    let state = AppState::new(AppConfig::default());
    let analysis_id = state.registry.register(&video_name).await;

    let orchestrator = PipelineOrchestrator::new(
        state.registry.clone(),
        state.engine.clone(),
        &state.config,
    );
    let (frames, detections) = script.split(state.config.fallback_fps);
    let summary = orchestrator
        .process_video(analysis_id, frames, detections, &*state.alerts)
        .await
        .context("video processing failed")?;

    tracing::info!(
        frames = summary.processed_frames,
        objects = summary.total_objects_detected,
        persons = summary.total_persons_detected,
        anomalies = summary.total_anomalies,
        "Replay finished"
    );

    let alerts = state.alerts.latest_alerts(usize::MAX).await;
    for alert in alerts.iter().rev() {
        println!("{}", serde_json::to_string(alert)?);
    }

    let stats = state.aggregate_stats().await;
    println!("{}", serde_json::to_string_pretty(&stats)?);

    Ok(())
}
