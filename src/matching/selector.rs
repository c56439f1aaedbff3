use std::cmp::Ordering;

use super::scorer::{NormalizedTarget, ScoringPolicy};
use super::types::{Candidate, MatchKind, ScoredCandidate, Selection, TrackDescriptor};

/// Pick the candidate most likely to be `target`.
///
/// Returns `None` only for an empty candidate list. Candidates inside the
/// duration tolerance band compete on score (first seen wins ties); if none is
/// inside the band the candidate with the smallest duration difference is
/// returned as a [`MatchKind::ClosestDuration`] fallback.
pub fn select_best(
    policy: &ScoringPolicy,
    target: &TrackDescriptor,
    candidates: &[Candidate],
) -> Option<Selection> {
    if candidates.is_empty() {
        return None;
    }

    let normalized = NormalizedTarget::new(target);
    let trace: Vec<ScoredCandidate> = candidates
        .iter()
        .map(|candidate| {
            let duration_diff = target.duration_diff(candidate);
            ScoredCandidate {
                candidate: candidate.clone(),
                score: policy.score_normalized(&normalized, candidate),
                duration_diff,
                within_tolerance: policy.is_within_tolerance(duration_diff),
            }
        })
        .collect();

    let best_in_band = first_max_by(
        trace.iter().enumerate().filter(|(_, s)| s.within_tolerance),
        |a, b| a.score.total_cmp(&b.score),
    );

    let (winner_index, kind) = match best_in_band {
        Some(index) => (index, MatchKind::Scored),
        None => {
            // Smallest diff is the max of the reversed ordering.
            let index = first_max_by(trace.iter().enumerate(), |a, b| {
                b.duration_diff.total_cmp(&a.duration_diff)
            })?;
            (index, MatchKind::ClosestDuration)
        }
    };

    Some(Selection {
        winner: candidates[winner_index].clone(),
        winner_index,
        kind,
        trace,
    })
}

/// Index of the maximum element, keeping the earliest on ties.
///
/// `Iterator::max_by` keeps the last of equal elements, which would make the
/// winner depend on search result order in the wrong direction.
fn first_max_by<'a, I, F>(items: I, mut compare: F) -> Option<usize>
where
    I: Iterator<Item = (usize, &'a ScoredCandidate)>,
    F: FnMut(&ScoredCandidate, &ScoredCandidate) -> Ordering,
{
    let mut best: Option<(usize, &ScoredCandidate)> = None;
    for (index, item) in items {
        match best {
            Some((_, current)) if compare(item, current) != Ordering::Greater => {}
            _ => best = Some((index, item)),
        }
    }
    best.map(|(index, _)| index)
}
