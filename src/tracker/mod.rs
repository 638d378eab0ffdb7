//! Tracker - Multi-Object Track Lifecycle
//!
//! ## Responsibilities
//!
//! - Consume one frame's detections at a time
//! - Frame-to-frame association (pluggable strategy, greedy by default)
//! - Create tracks for unmatched detections, retire tracks after repeated misses
//! - Keep append-only position history per track
//!
//! Lost tracks stay addressable until the video's processing completes so
//! closing-frame rules can still fire against them.

mod association;

pub use association::{AssociationStrategy, GreedyAssociation};

use crate::models::{BoundingBox, Detection};

/// Tracker thresholds
#[derive(Debug, Clone)]
pub struct TrackerConfig {
    /// Eligibility floor for an association score (IoU/proximity blend)
    pub min_match_score: f32,
    /// Floor for the centroid proximity gate (pixels)
    pub min_match_radius_px: f32,
    /// Misses beyond which a STALE track becomes LOST (K)
    pub max_missed_frames: u32,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            min_match_score: 0.3,
            min_match_radius_px: 100.0,
            max_missed_frames: 30,
        }
    }
}

/// Track lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum TrackState {
    /// Matched in the most recent frame
    Active,
    /// Missed 1..K frames
    Stale,
    /// Terminal, missed more than K frames
    Lost,
}

/// One matched observation in a track's history
#[derive(Debug, Clone, Copy, serde::Serialize, serde::Deserialize)]
pub struct TrackPoint {
    pub frame_index: u64,
    pub bbox: BoundingBox,
    /// Seconds from stream start
    pub timestamp: f64,
}

/// Persistent identity tying detections of one physical object across frames
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct Track {
    /// Unique, monotonically assigned, never reused
    pub track_id: u64,
    pub class_label: String,
    /// Strictly increasing by frame_index; missed frames leave no entry
    pub position_history: Vec<TrackPoint>,
    pub state: TrackState,
    /// Frames since the last successful match
    pub missed_frames: u32,
    pub created_at: f64,
    pub last_seen_at: f64,
}

impl Track {
    pub fn new(
        track_id: u64,
        class_label: String,
        frame_index: u64,
        bbox: BoundingBox,
        timestamp: f64,
    ) -> Self {
        Self {
            track_id,
            class_label,
            position_history: vec![TrackPoint {
                frame_index,
                bbox,
                timestamp,
            }],
            state: TrackState::Active,
            missed_frames: 0,
            created_at: timestamp,
            last_seen_at: timestamp,
        }
    }

    pub fn last_point(&self) -> Option<&TrackPoint> {
        self.position_history.last()
    }

    /// Latest known centroid
    pub fn centroid(&self) -> Option<(f32, f32)> {
        self.last_point().map(|p| p.bbox.centroid())
    }

    pub fn is_live(&self) -> bool {
        self.state != TrackState::Lost
    }

    pub fn is_person(&self) -> bool {
        self.class_label == crate::models::PERSON_CLASS
    }

    /// Mean per-step centroid displacement over the last few matched frames,
    /// used to scale the association search radius.
    pub fn recent_mean_displacement(&self) -> f32 {
        let n = self.position_history.len();
        if n < 2 {
            return 0.0;
        }
        let window = &self.position_history[n.saturating_sub(6)..];
        let steps = window.windows(2).map(|w| {
            crate::models::distance(w[0].bbox.centroid(), w[1].bbox.centroid())
        });
        let (sum, count) = steps.fold((0.0f32, 0u32), |(s, c), d| (s + d, c + 1));
        if count == 0 {
            0.0
        } else {
            sum / count as f32
        }
    }

    fn append(&mut self, point: TrackPoint) {
        debug_assert!(
            self.position_history
                .last()
                .map(|p| point.frame_index > p.frame_index)
                .unwrap_or(true),
            "position history must be strictly increasing by frame index"
        );
        self.last_seen_at = point.timestamp;
        self.position_history.push(point);
    }
}

/// Deltas from one tracker update
#[derive(Debug, Clone, Default)]
pub struct TrackerUpdate {
    /// Tracks spawned this frame
    pub created: Vec<u64>,
    /// Tracks matched this frame
    pub updated: Vec<u64>,
    /// Tracks that transitioned to LOST this frame
    pub lost: Vec<u64>,
}

/// Multi-object tracker for one video stream.
///
/// Not thread-safe; owned by a single pipeline run and updated strictly
/// sequentially in frame order.
pub struct Tracker {
    config: TrackerConfig,
    association: Box<dyn AssociationStrategy>,
    next_id: u64,
    tracks: Vec<Track>,
}

impl Tracker {
    pub fn new(config: TrackerConfig) -> Self {
        Self::with_strategy(config, Box::new(GreedyAssociation))
    }

    pub fn with_strategy(config: TrackerConfig, association: Box<dyn AssociationStrategy>) -> Self {
        Self {
            config,
            association,
            next_id: 1,
            tracks: Vec::new(),
        }
    }

    /// Process one frame's detections.
    ///
    /// Detections are assumed confidence-filtered upstream. Malformed or
    /// zero-area bounding boxes are dropped here and logged, never creating
    /// a track.
    pub fn update(
        &mut self,
        frame_index: u64,
        timestamp: f64,
        detections: &[Detection],
    ) -> TrackerUpdate {
        let valid: Vec<Detection> = detections
            .iter()
            .filter(|d| {
                if d.bbox.is_valid() {
                    true
                } else {
                    tracing::warn!(
                        frame_index,
                        class = %d.class_label,
                        bbox = ?d.bbox,
                        "Dropping malformed detection bbox"
                    );
                    false
                }
            })
            .cloned()
            .collect();

        let mut update = TrackerUpdate::default();

        // Association runs over the live (ACTIVE/STALE) set only
        let live_indices: Vec<usize> = self
            .tracks
            .iter()
            .enumerate()
            .filter(|(_, t)| t.is_live())
            .map(|(i, _)| i)
            .collect();
        let live_refs: Vec<&Track> = live_indices.iter().map(|&i| &self.tracks[i]).collect();

        let pairs = self.association.associate(&live_refs, &valid, &self.config);

        let mut track_matched = vec![false; live_indices.len()];
        let mut detection_matched = vec![false; valid.len()];

        for (ti, di) in pairs {
            track_matched[ti] = true;
            detection_matched[di] = true;

            let track = &mut self.tracks[live_indices[ti]];
            track.append(TrackPoint {
                frame_index,
                bbox: valid[di].bbox,
                timestamp,
            });
            track.missed_frames = 0;
            track.state = TrackState::Active;
            update.updated.push(track.track_id);
        }

        // Unmatched live tracks age out: ACTIVE -> STALE -> LOST
        for (ti, &idx) in live_indices.iter().enumerate() {
            if track_matched[ti] {
                continue;
            }
            let track = &mut self.tracks[idx];
            track.missed_frames += 1;
            if track.missed_frames > self.config.max_missed_frames {
                track.state = TrackState::Lost;
                update.lost.push(track.track_id);
                tracing::debug!(
                    track_id = track.track_id,
                    class = %track.class_label,
                    missed = track.missed_frames,
                    "Track lost"
                );
            } else {
                track.state = TrackState::Stale;
            }
        }

        // Unmatched detections spawn fresh tracks
        for (di, detection) in valid.iter().enumerate() {
            if detection_matched[di] {
                continue;
            }
            let id = self.next_id;
            self.next_id += 1;
            self.tracks.push(Track::new(
                id,
                detection.class_label.clone(),
                frame_index,
                detection.bbox,
                timestamp,
            ));
            update.created.push(id);
            tracing::debug!(track_id = id, class = %detection.class_label, "Track created");
        }

        update
    }

    /// ACTIVE and STALE tracks
    pub fn live_tracks(&self) -> Vec<&Track> {
        self.tracks.iter().filter(|t| t.is_live()).collect()
    }

    /// Every track seen this video, including LOST ones
    pub fn all_tracks(&self) -> &[Track] {
        &self.tracks
    }

    pub fn get(&self, track_id: u64) -> Option<&Track> {
        self.tracks.iter().find(|t| t.track_id == track_id)
    }
}
