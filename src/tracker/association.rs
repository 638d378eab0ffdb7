//! Frame-to-frame association strategies
//!
//! Matching existing tracks to new detections is pluggable so the greedy
//! matcher can be swapped for an optimal-assignment variant without touching
//! track lifecycle logic.

use super::{Track, TrackerConfig};
use crate::models::{distance, Detection};

/// Match score gate: proximity is normalized by a multiple of the track's
/// recent per-step displacement, floored so slow tracks still get a workable
/// search radius.
const DISPLACEMENT_GATE_FACTOR: f32 = 4.0;

/// Association algorithm seam
pub trait AssociationStrategy: Send + Sync {
    /// Returns matched `(track_index, detection_index)` pairs over the given
    /// slices. Indices refer to positions in the input slices. Each track and
    /// each detection appears in at most one pair.
    fn associate(
        &self,
        tracks: &[&Track],
        detections: &[Detection],
        config: &TrackerConfig,
    ) -> Vec<(usize, usize)>;
}

/// Greedy nearest-match association, single pass per frame.
///
/// Highest-scoring eligible pair is assigned first, then both are removed
/// from the candidate pools. An approximation of optimal bipartite matching;
/// ties broken by lowest track id for determinism.
#[derive(Debug, Default)]
pub struct GreedyAssociation;

impl GreedyAssociation {
    /// Blend of bounding-box overlap and centroid proximity
    fn match_score(track: &Track, detection: &Detection, config: &TrackerConfig) -> f32 {
        let last = match track.last_point() {
            Some(p) => p,
            None => return 0.0,
        };

        let iou = last.bbox.iou(&detection.bbox);

        let gate = (track.recent_mean_displacement() * DISPLACEMENT_GATE_FACTOR)
            .max(config.min_match_radius_px);
        let d = distance(last.bbox.centroid(), detection.bbox.centroid());
        let proximity = (1.0 - d / gate).clamp(0.0, 1.0);

        0.5 * iou + 0.5 * proximity
    }
}

impl AssociationStrategy for GreedyAssociation {
    fn associate(
        &self,
        tracks: &[&Track],
        detections: &[Detection],
        config: &TrackerConfig,
    ) -> Vec<(usize, usize)> {
        // Candidate pairs: same class, score above the eligibility floor
        let mut candidates: Vec<(f32, usize, usize)> = Vec::new();
        for (ti, track) in tracks.iter().enumerate() {
            for (di, detection) in detections.iter().enumerate() {
                if track.class_label != detection.class_label {
                    continue;
                }
                let score = Self::match_score(track, detection, config);
                if score >= config.min_match_score {
                    candidates.push((score, ti, di));
                }
            }
        }

        // Highest score first; ties by lowest track_id, then detection index
        candidates.sort_by(|a, b| {
            b.0.partial_cmp(&a.0)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| tracks[a.1].track_id.cmp(&tracks[b.1].track_id))
                .then_with(|| a.2.cmp(&b.2))
        });

        let mut track_taken = vec![false; tracks.len()];
        let mut detection_taken = vec![false; detections.len()];
        let mut pairs = Vec::new();

        for (_, ti, di) in candidates {
            if track_taken[ti] || detection_taken[di] {
                continue;
            }
            track_taken[ti] = true;
            detection_taken[di] = true;
            pairs.push((ti, di));
        }

        pairs
    }
}
