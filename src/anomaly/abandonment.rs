//! Object abandonment rule
//!
//! A non-person track is watched for stillness; once stationary it is paired
//! with the person track that was nearest when its stillness window started
//! (the presumed owner). If the owner then stays beyond the separation
//! distance long enough, the object is flagged as abandoned. Without an
//! identifiable owner the rule stays silent for that object.

use super::RuleConfig;
use crate::models::{distance, AnomalyEvent, AnomalyType, Severity};
use crate::tracker::Track;
use std::collections::HashMap;

/// Per-object state machine
#[derive(Debug, Clone)]
enum AbandonPhase {
    /// Accumulating stillness; owner candidate picked at window start
    Watching {
        anchor: (f32, f32),
        since: f64,
        owner: Option<u64>,
    },
    /// Stillness confirmed, measuring separation from the owner
    Stationary {
        owner: u64,
        anchor: (f32, f32),
        separated_since: Option<f64>,
    },
    /// Fired, or no owner reference; silent until the object track retires
    Suppressed,
}

#[derive(Debug, Default)]
pub struct AbandonmentRule {
    states: HashMap<u64, AbandonPhase>,
}

impl AbandonmentRule {
    pub fn evaluate(
        &mut self,
        track: &Track,
        all_tracks: &[&Track],
        frame_index: u64,
        config: &RuleConfig,
    ) -> Option<AnomalyEvent> {
        if track.is_person() {
            return None;
        }
        let centroid = track.centroid()?;
        // Stillness and separation clocks advance with observations of the
        // object only; an occluded object holds whatever it had accrued
        let observed = track.last_seen_at;

        let phase = self
            .states
            .entry(track.track_id)
            .or_insert_with(|| AbandonPhase::Watching {
                anchor: centroid,
                since: track.last_seen_at,
                owner: nearest_person(all_tracks, centroid),
            });

        match phase {
            AbandonPhase::Watching { anchor, since, owner } => {
                if distance(centroid, *anchor) > config.stationary_tolerance_px {
                    // Moved: restart the stillness window and re-pick the owner
                    *anchor = centroid;
                    *since = observed;
                    *owner = nearest_person(all_tracks, centroid);
                    return None;
                }

                // Owner must survive until stillness is confirmed
                if let Some(owner_id) = *owner {
                    if !is_live(all_tracks, owner_id) {
                        tracing::debug!(
                            track_id = track.track_id,
                            owner_id,
                            "Owner lost before stillness confirmed, suppressing abandonment"
                        );
                        *phase = AbandonPhase::Suppressed;
                        return None;
                    }
                }

                if observed - *since >= config.stationary_secs {
                    match *owner {
                        Some(owner_id) => {
                            tracing::debug!(
                                track_id = track.track_id,
                                owner_id,
                                "Object stationary, watching owner separation"
                            );
                            *phase = AbandonPhase::Stationary {
                                owner: owner_id,
                                anchor: centroid,
                                separated_since: None,
                            };
                        }
                        None => {
                            // No identifiable owner: cannot abandon
                            *phase = AbandonPhase::Suppressed;
                        }
                    }
                }
                None
            }

            AbandonPhase::Stationary { owner, anchor, separated_since } => {
                if distance(centroid, *anchor) > config.stationary_tolerance_px {
                    // Object picked up or shifted: back to a clean watching state
                    *phase = AbandonPhase::Watching {
                        anchor: centroid,
                        since: observed,
                        owner: nearest_person(all_tracks, centroid),
                    };
                    return None;
                }

                // A lost owner keeps its last recorded position; a departed-
                // then-lost owner is still a departure.
                let owner_track = all_tracks.iter().find(|t| t.track_id == *owner)?;
                let owner_pos = owner_track.centroid()?;
                let d = distance(centroid, owner_pos);

                if d <= config.separation_px {
                    *separated_since = None;
                    return None;
                }

                let since = separated_since.get_or_insert(observed);
                if observed - *since < config.separation_secs {
                    return None;
                }

                let event = AnomalyEvent {
                    anomaly_type: AnomalyType::Abandonment,
                    track_id: track.track_id,
                    related_track_id: Some(*owner),
                    window_start: *since,
                    window_end: observed,
                    severity: Severity::from_ratio((d / config.separation_px) as f64),
                    frame_reference: frame_index,
                    description: format!(
                        "{} left unattended, owner {:.0}px away for {:.1}s",
                        track.class_label,
                        d,
                        observed - *since
                    ),
                };
                // One shot per object: no re-abandonment until the track retires
                *phase = AbandonPhase::Suppressed;
                Some(event)
            }

            AbandonPhase::Suppressed => None,
        }
    }

    pub fn retire(&mut self, track_id: u64) {
        self.states.remove(&track_id);
    }
}

/// Nearest live person track to a point; ties broken by lowest track id
fn nearest_person(tracks: &[&Track], point: (f32, f32)) -> Option<u64> {
    let mut best: Option<(f32, u64)> = None;
    for track in tracks {
        if !track.is_person() || !track.is_live() {
            continue;
        }
        let Some(centroid) = track.centroid() else {
            continue;
        };
        let d = distance(point, centroid);
        let candidate = (d, track.track_id);
        best = match best {
            None => Some(candidate),
            Some(current) if candidate < current => Some(candidate),
            Some(current) => Some(current),
        };
    }
    best.map(|(_, id)| id)
}

fn is_live(tracks: &[&Track], track_id: u64) -> bool {
    tracks
        .iter()
        .any(|t| t.track_id == track_id && t.is_live())
}
