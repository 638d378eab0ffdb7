//! AnomalyClassifier - Behavioral Rule Evaluation
//!
//! ## Responsibilities
//!
//! - Evaluate loitering / abandonment / erratic-movement rules once per frame
//!   against the tracker's current track set
//! - Keep per-(track, rule) evaluation state in explicit maps, destroyed when
//!   a track retires
//! - Suppress duplicate emissions of the same (track, type) pair inside a
//!   cooldown window
//!
//! Rules never error on missing or short history; insufficient data is
//! treated as "not yet evaluable" and skipped.

mod abandonment;
mod erratic;
mod loitering;

pub use abandonment::AbandonmentRule;
pub use erratic::ErraticRule;
pub use loitering::LoiteringRule;

use crate::models::{AnomalyEvent, AnomalyType};
use crate::tracker::Track;
use std::collections::HashMap;

/// Behavioral rule thresholds
#[derive(Debug, Clone)]
pub struct RuleConfig {
    /// Dwell radius R (pixels)
    pub loiter_radius_px: f32,
    /// Dwell duration T_loiter (seconds)
    pub loiter_secs: f64,
    /// Stillness tolerance (pixels)
    pub stationary_tolerance_px: f32,
    /// Stillness window T_stationary (seconds)
    pub stationary_secs: f64,
    /// Owner separation distance D_separation (pixels)
    pub separation_px: f32,
    /// Owner separation duration T_separation (seconds)
    pub separation_secs: f64,
    /// Sliding window N_window (positions)
    pub erratic_window: usize,
    /// Heading variance threshold V_erratic (rad^2)
    pub erratic_heading_variance: f64,
    /// Motion floor excluding stationary jitter (px/s)
    pub erratic_min_speed_px_s: f64,
    /// Suppression window between same (track, type) emissions (seconds)
    pub cooldown_secs: f64,
}

impl Default for RuleConfig {
    fn default() -> Self {
        Self {
            loiter_radius_px: 20.0,
            loiter_secs: 10.0,
            stationary_tolerance_px: 20.0,
            stationary_secs: 5.0,
            separation_px: 150.0,
            separation_secs: 10.0,
            erratic_window: 10,
            erratic_heading_variance: 1.2,
            erratic_min_speed_px_s: 40.0,
            cooldown_secs: 30.0,
        }
    }
}

/// Rule state machines over the tracker's output.
///
/// Holds read-only references to tracks only for the duration of one
/// `evaluate` call; owns nothing but its per-rule evaluation state.
pub struct AnomalyClassifier {
    config: RuleConfig,
    loitering: LoiteringRule,
    abandonment: AbandonmentRule,
    erratic: ErraticRule,
    /// Last emission time per (track, type)
    cooldowns: HashMap<(u64, AnomalyType), f64>,
}

impl AnomalyClassifier {
    pub fn new(config: RuleConfig) -> Self {
        Self {
            config,
            loitering: LoiteringRule::default(),
            abandonment: AbandonmentRule::default(),
            erratic: ErraticRule::default(),
            cooldowns: HashMap::new(),
        }
    }

    /// Per-frame evaluation over the live track set
    pub fn evaluate(
        &mut self,
        frame_index: u64,
        timestamp: f64,
        tracks: &[&Track],
    ) -> Vec<AnomalyEvent> {
        self.evaluate_inner(frame_index, timestamp, tracks, false)
    }

    /// End-of-stream pass over all tracks, including those just lost, to
    /// catch anomalies only resolvable when the video ends.
    pub fn finalize(
        &mut self,
        frame_index: u64,
        timestamp: f64,
        tracks: &[&Track],
    ) -> Vec<AnomalyEvent> {
        self.evaluate_inner(frame_index, timestamp, tracks, true)
    }

    fn evaluate_inner(
        &mut self,
        frame_index: u64,
        timestamp: f64,
        tracks: &[&Track],
        include_lost: bool,
    ) -> Vec<AnomalyEvent> {
        let mut events = Vec::new();

        for track in tracks {
            if !include_lost && !track.is_live() {
                continue;
            }

            let candidates = [
                self.loitering.evaluate(track, frame_index, &self.config),
                self.abandonment
                    .evaluate(track, tracks, frame_index, &self.config),
                self.erratic.evaluate(track, frame_index, &self.config),
            ];

            for event in candidates.into_iter().flatten() {
                if self.in_cooldown(event.track_id, event.anomaly_type, timestamp) {
                    tracing::debug!(
                        track_id = event.track_id,
                        anomaly_type = %event.anomaly_type,
                        "Emission suppressed by cooldown"
                    );
                    continue;
                }
                self.cooldowns
                    .insert((event.track_id, event.anomaly_type), timestamp);
                tracing::info!(
                    track_id = event.track_id,
                    anomaly_type = %event.anomaly_type,
                    severity = ?event.severity,
                    window_start = event.window_start,
                    window_end = event.window_end,
                    "Anomaly detected"
                );
                events.push(event);
            }
        }

        events
    }

    fn in_cooldown(&self, track_id: u64, anomaly_type: AnomalyType, now: f64) -> bool {
        self.cooldowns
            .get(&(track_id, anomaly_type))
            .map(|last| now - last < self.config.cooldown_secs)
            .unwrap_or(false)
    }

    /// Destroy all evaluation state for a retired track
    pub fn retire(&mut self, track_id: u64) {
        self.loitering.retire(track_id);
        self.abandonment.retire(track_id);
        self.erratic.retire(track_id);
        self.cooldowns.retain(|(id, _), _| *id != track_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{AnomalyType, BoundingBox};
    use crate::tracker::{Track, TrackPoint};

    fn person_fixed(id: u64, until: u64) -> Track {
        let mut t = Track::new(
            id,
            "person".to_string(),
            0,
            BoundingBox::new(10.0, 10.0, 20.0, 40.0),
            0.0,
        );
        for frame in 1..=until {
            t.position_history.push(TrackPoint {
                frame_index: frame,
                bbox: BoundingBox::new(10.0, 10.0, 20.0, 40.0),
                timestamp: frame as f64,
            });
            t.last_seen_at = frame as f64;
        }
        t
    }

    fn classifier(cooldown: f64) -> AnomalyClassifier {
        AnomalyClassifier::new(RuleConfig {
            loiter_secs: 5.0,
            loiter_radius_px: 15.0,
            cooldown_secs: cooldown,
            ..RuleConfig::default()
        })
    }

    /// Person at (10,10,20,40) for frames 0-9, 1s apart,
    /// T_loiter = 5s, R = 15px. Exactly one LOITERING with window_start = t0.
    #[test]
    fn test_loitering_scenario_frames_0_to_9() {
        let mut classifier = classifier(30.0);
        let mut events = Vec::new();

        for frame in 0..10u64 {
            let track = person_fixed(1, frame);
            let tracks = [&track];
            events.extend(classifier.evaluate(frame, frame as f64, &tracks[..]));
        }

        assert_eq!(events.len(), 1);
        assert_eq!(events[0].anomaly_type, AnomalyType::Loitering);
        assert_eq!(events[0].track_id, 1);
        assert_eq!(events[0].window_start, 0.0);
    }

    /// Two triggering windows closer together than the cooldown yield one event
    #[test]
    fn test_cooldown_suppresses_second_window() {
        let mut classifier = classifier(60.0);
        let mut events = Vec::new();

        // Dwell 6s at one spot, step outside the radius, dwell 6s again:
        // the second window re-arms the rule but the cooldown blocks it.
        let mut positions: Vec<(f32, f32)> = vec![(10.0, 10.0); 7];
        positions.push((200.0, 10.0));
        positions.extend(vec![(200.0, 10.0); 7]);

        for frame in 0..positions.len() as u64 {
            let mut track = Track::new(
                1,
                "person".to_string(),
                0,
                BoundingBox::new(positions[0].0, positions[0].1, 20.0, 40.0),
                0.0,
            );
            for (i, &(x, y)) in positions[..frame as usize + 1].iter().enumerate().skip(1) {
                track.position_history.push(TrackPoint {
                    frame_index: i as u64,
                    bbox: BoundingBox::new(x, y, 20.0, 40.0),
                    timestamp: i as f64,
                });
                track.last_seen_at = i as f64;
            }
            let tracks = [&track];
            events.extend(classifier.evaluate(frame, frame as f64, &tracks[..]));
        }

        assert_eq!(events.len(), 1, "cooldown must swallow the second window");
    }

    /// Same shape as above but with a short cooldown: both windows emit
    #[test]
    fn test_elapsed_cooldown_allows_rearmed_window() {
        let mut classifier = classifier(2.0);
        let mut events = Vec::new();

        let mut positions: Vec<(f32, f32)> = vec![(10.0, 10.0); 7];
        positions.push((200.0, 10.0));
        positions.extend(vec![(200.0, 10.0); 7]);

        for frame in 0..positions.len() as u64 {
            let track = {
                let mut t = Track::new(
                    1,
                    "person".to_string(),
                    0,
                    BoundingBox::new(positions[0].0, positions[0].1, 20.0, 40.0),
                    0.0,
                );
                for (i, &(x, y)) in positions[..frame as usize + 1].iter().enumerate().skip(1) {
                    t.position_history.push(TrackPoint {
                        frame_index: i as u64,
                        bbox: BoundingBox::new(x, y, 20.0, 40.0),
                        timestamp: i as f64,
                    });
                    t.last_seen_at = i as f64;
                }
                t
            };
            let tracks = [&track];
            events.extend(classifier.evaluate(frame, frame as f64, &tracks[..]));
        }

        assert_eq!(events.len(), 2);
    }

    #[test]
    fn test_retire_clears_cooldown_and_state() {
        let mut classifier = classifier(60.0);
        for frame in 0..7u64 {
            let track = person_fixed(1, frame);
            let tracks = [&track];
            classifier.evaluate(frame, frame as f64, &tracks[..]);
        }
        assert!(!classifier.cooldowns.is_empty());
        classifier.retire(1);
        assert!(classifier.cooldowns.is_empty());
    }

    /// Window bounds stay inside the subject track's observed lifetime even
    /// when evaluation keeps running after the track stops being matched.
    #[test]
    fn test_event_window_within_track_lifetime() {
        let mut classifier = classifier(30.0);
        let mut events = Vec::new();
        for frame in 0..10u64 {
            // Unobserved after frame 6
            let track = person_fixed(4, frame.min(6));
            let tracks = [&track];
            events.extend(classifier.evaluate(frame, frame as f64, &tracks[..]));
        }
        assert_eq!(events.len(), 1);
        for e in &events {
            assert!(e.window_start <= e.window_end);
            assert!(e.window_start >= 0.0);
            assert!(e.window_end <= 6.0, "window_end {} past last observation", e.window_end);
        }
    }
}
