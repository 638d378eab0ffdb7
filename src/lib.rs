//! Vigil Engine Library
//!
//! Behavioral anomaly detection for surveillance video
//!
//! ## Architecture (7 Components)
//!
//! 1. Tracker - Multi-object tracking across frames
//! 2. AnomalyClassifier - Loitering/abandonment/erratic movement rules
//! 3. PipelineOrchestrator - Per-video frame loop
//! 4. AnalysisRegistry - Processing status, progress, cancellation
//! 5. AlertStore - Anomaly event and alert persistence
//! 6. Replay - Detection-stream playback sources
//! 7. Models - Shared types
//!
//! ## Design Principles
//!
//! - Tracks and rule state live per video; nothing is shared across runs
//! - Collaborators (frames, detections, alerts) plug in behind traits
//! - MECE: Mutually exclusive, collectively exhaustive

pub mod alert_store;
pub mod analysis_registry;
pub mod anomaly;
pub mod error;
pub mod models;
pub mod pipeline;
pub mod replay;
pub mod state;
pub mod tracker;

pub use error::{Error, Result};
pub use state::AppState;
