//! Loitering rule
//!
//! Sustained confinement of a person track within a bounded radius of an
//! anchor point. The anchor resets whenever the track moves beyond the
//! radius, so cumulative presence alone never fires.

use super::RuleConfig;
use crate::models::{distance, AnomalyEvent, AnomalyType, Severity};
use crate::tracker::Track;
use std::collections::HashMap;

/// Dwell-window state for one person track
#[derive(Debug, Clone)]
struct LoiterState {
    anchor: (f32, f32),
    anchor_ts: f64,
    /// Cleared on fire, set again once the track leaves the radius
    armed: bool,
}

#[derive(Debug, Default)]
pub struct LoiteringRule {
    states: HashMap<u64, LoiterState>,
}

impl LoiteringRule {
    pub fn evaluate(
        &mut self,
        track: &Track,
        frame_index: u64,
        config: &RuleConfig,
    ) -> Option<AnomalyEvent> {
        if !track.is_person() {
            return None;
        }
        let centroid = track.centroid()?;
        // Dwell accrues against observations only; an occluded track keeps
        // whatever dwell it had at its last match
        let observed = track.last_seen_at;

        let state = self.states.entry(track.track_id).or_insert(LoiterState {
            anchor: centroid,
            anchor_ts: observed,
            armed: true,
        });

        if distance(centroid, state.anchor) > config.loiter_radius_px {
            // Left the dwell radius: restart the window from here
            state.anchor = centroid;
            state.anchor_ts = observed;
            state.armed = true;
            return None;
        }

        let dwell = observed - state.anchor_ts;
        if dwell < config.loiter_secs || !state.armed {
            return None;
        }

        state.armed = false;
        Some(AnomalyEvent {
            anomaly_type: AnomalyType::Loitering,
            track_id: track.track_id,
            related_track_id: None,
            window_start: state.anchor_ts,
            window_end: observed,
            severity: Severity::from_ratio(dwell / config.loiter_secs),
            frame_reference: frame_index,
            description: format!(
                "Person stationary for {:.1}s within {:.0}px radius",
                dwell, config.loiter_radius_px
            ),
        })
    }

    pub fn retire(&mut self, track_id: u64) {
        self.states.remove(&track_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::BoundingBox;
    use crate::tracker::TrackPoint;

    fn person_at(positions: &[(f32, f32)]) -> Track {
        let mut t = Track::new(
            1,
            "person".to_string(),
            0,
            BoundingBox::new(positions[0].0, positions[0].1, 20.0, 40.0),
            0.0,
        );
        for (i, &(x, y)) in positions.iter().enumerate().skip(1) {
            t.position_history.push(TrackPoint {
                frame_index: i as u64,
                bbox: BoundingBox::new(x, y, 20.0, 40.0),
                timestamp: i as f64,
            });
            t.last_seen_at = i as f64;
        }
        t
    }

    fn config() -> RuleConfig {
        RuleConfig {
            loiter_secs: 5.0,
            loiter_radius_px: 15.0,
            ..RuleConfig::default()
        }
    }

    #[test]
    fn test_fixed_person_fires_once_with_window_start_t0() {
        let mut rule = LoiteringRule::default();
        let config = config();
        let mut fired = Vec::new();

        // Fixed position for frames 0..10, 1s apart
        for frame in 0..10u64 {
            let track = person_at(&vec![(10.0, 10.0); frame as usize + 1]);
            if let Some(e) = rule.evaluate(&track, frame, &config) {
                fired.push(e);
            }
        }

        assert_eq!(fired.len(), 1, "exactly one loitering event expected");
        assert_eq!(fired[0].window_start, 0.0);
        assert_eq!(fired[0].anomaly_type, AnomalyType::Loitering);
    }

    #[test]
    fn test_movement_beyond_radius_resets_window() {
        let mut rule = LoiteringRule::default();
        let config = config();

        // Dwell 4s, jump 100px away at t=4, dwell again
        let mut positions = vec![(10.0, 10.0); 4];
        positions.extend(vec![(110.0, 10.0); 4]);

        for frame in 0..8u64 {
            let track = person_at(&positions[..frame as usize + 1]);
            let e = rule.evaluate(&track, frame, &config);
            assert!(e.is_none(), "no single window reached 5s, got {e:?}");
        }
    }

    /// A person seen stationary for less than the threshold, then occluded,
    /// must not keep accruing dwell while unobserved.
    #[test]
    fn test_dwell_frozen_while_unobserved() {
        let mut rule = LoiteringRule::default();
        let config = config();

        // Observed at frames 0..=3 only, evaluation keeps running while the
        // track is unmatched
        for frame in 0..=8u64 {
            let track = person_at(&vec![(10.0, 10.0); frame.min(3) as usize + 1]);
            let e = rule.evaluate(&track, frame, &config);
            assert!(e.is_none(), "dwell accrued while unobserved: {e:?}");
        }
    }

    /// The emitted window never extends past the last observation
    #[test]
    fn test_window_end_capped_at_last_observation() {
        let mut rule = LoiteringRule::default();
        let config = config();

        // Observed at frames 0..=6, then evaluated unmatched through frame 10
        let mut fired = None;
        for frame in 0..=10u64 {
            let track = person_at(&vec![(10.0, 10.0); frame.min(6) as usize + 1]);
            if let Some(e) = rule.evaluate(&track, frame, &config) {
                fired = Some(e);
            }
        }
        let e = fired.expect("dwell of 5s must fire");
        assert_eq!(e.window_start, 0.0);
        assert_eq!(e.window_end, 5.0);
    }

    #[test]
    fn test_non_person_skipped() {
        let mut rule = LoiteringRule::default();
        let config = config();
        let mut track = person_at(&vec![(10.0, 10.0); 10]);
        track.class_label = "suitcase".to_string();
        assert!(rule.evaluate(&track, 9, &config).is_none());
    }

    #[test]
    fn test_rearms_after_leaving_radius() {
        let mut rule = LoiteringRule::default();
        let config = config();
        let mut fired = 0;

        // First dwell window
        let mut positions: Vec<(f32, f32)> = vec![(10.0, 10.0); 6];
        // Walk away, then a second dwell window elsewhere
        positions.push((300.0, 300.0));
        positions.extend(vec![(300.0, 300.0); 6]);

        for frame in 0..positions.len() as u64 {
            let track = person_at(&positions[..frame as usize + 1]);
            if rule.evaluate(&track, frame, &config).is_some() {
                fired += 1;
            }
        }
        assert_eq!(fired, 2);
    }
}
