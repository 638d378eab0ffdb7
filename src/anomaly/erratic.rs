//! Erratic-movement rule
//!
//! High variance in heading direction over a sliding window of recorded
//! positions, gated by a minimum average speed so stationary jitter never
//! qualifies. Tracks with less history than the window are skipped.

use super::RuleConfig;
use crate::models::{AnomalyEvent, AnomalyType, Severity};
use crate::tracker::Track;
use std::collections::HashMap;
use std::f64::consts::PI;

#[derive(Debug, Clone)]
struct ErraticState {
    armed: bool,
}

#[derive(Debug, Default)]
pub struct ErraticRule {
    states: HashMap<u64, ErraticState>,
}

impl ErraticRule {
    pub fn evaluate(
        &mut self,
        track: &Track,
        frame_index: u64,
        config: &RuleConfig,
    ) -> Option<AnomalyEvent> {
        let history = &track.position_history;
        if history.len() < config.erratic_window {
            // Not yet evaluable
            return None;
        }

        let window = &history[history.len() - config.erratic_window..];
        let Some((avg_speed, heading_variance)) = window_motion(window) else {
            return None;
        };

        let state = self
            .states
            .entry(track.track_id)
            .or_insert(ErraticState { armed: true });

        let triggering = avg_speed >= config.erratic_min_speed_px_s
            && heading_variance >= config.erratic_heading_variance;

        if !triggering {
            // Clean observation re-arms the rule
            state.armed = true;
            return None;
        }
        if !state.armed {
            return None;
        }
        state.armed = false;

        Some(AnomalyEvent {
            anomaly_type: AnomalyType::ErraticMovement,
            track_id: track.track_id,
            related_track_id: None,
            window_start: window[0].timestamp,
            window_end: window[window.len() - 1].timestamp,
            severity: Severity::from_ratio(heading_variance / config.erratic_heading_variance),
            frame_reference: frame_index,
            description: format!(
                "Erratic movement: heading variance {:.2} at {:.0}px/s over {} positions",
                heading_variance,
                avg_speed,
                config.erratic_window
            ),
        })
    }

    pub fn retire(&mut self, track_id: u64) {
        self.states.remove(&track_id);
    }
}

/// Average speed (px/s) and the mean squared angular change between
/// consecutive velocity vectors over one position window.
fn window_motion(window: &[crate::tracker::TrackPoint]) -> Option<(f64, f64)> {
    if window.len() < 3 {
        return None;
    }

    let mut speeds = Vec::with_capacity(window.len() - 1);
    let mut headings = Vec::with_capacity(window.len() - 1);
    for pair in window.windows(2) {
        let dt = pair[1].timestamp - pair[0].timestamp;
        if dt <= 0.0 {
            return None;
        }
        let (x0, y0) = pair[0].bbox.centroid();
        let (x1, y1) = pair[1].bbox.centroid();
        let dx = (x1 - x0) as f64;
        let dy = (y1 - y0) as f64;
        speeds.push((dx * dx + dy * dy).sqrt() / dt);
        headings.push(dy.atan2(dx));
    }

    let avg_speed = speeds.iter().sum::<f64>() / speeds.len() as f64;

    // Spread of turning about zero turn. A regular zigzag has constant
    // nonzero deltas; measuring about the mean would score it zero.
    let deltas: Vec<f64> = headings
        .windows(2)
        .map(|h| wrap_angle(h[1] - h[0]))
        .collect();
    let variance = deltas.iter().map(|d| d.powi(2)).sum::<f64>() / deltas.len() as f64;

    Some((avg_speed, variance))
}

/// Wrap to (-PI, PI]
fn wrap_angle(mut a: f64) -> f64 {
    while a > PI {
        a -= 2.0 * PI;
    }
    while a <= -PI {
        a += 2.0 * PI;
    }
    a
}
