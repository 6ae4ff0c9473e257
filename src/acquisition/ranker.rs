/*!
 * Candidate ranking.
 *
 * Ordering key, descending: quality tier, popularity, match confidence.
 * The candidate identifier (ascending) breaks the remaining ties so the
 * result never depends on the order the provider returned.
 */

use std::cmp::Ordering;

use super::models::SubtitleCandidate;

/// Compare two candidates; `Ordering::Less` means `a` ranks first
pub fn compare(a: &SubtitleCandidate, b: &SubtitleCandidate) -> Ordering {
    b.tier
        .cmp(&a.tier)
        .then_with(|| b.popularity.total_cmp(&a.popularity))
        .then_with(|| b.match_confidence.total_cmp(&a.match_confidence))
        .then_with(|| a.id.cmp(&b.id))
}

/// Order candidates best first
pub fn rank(mut candidates: Vec<SubtitleCandidate>) -> Vec<SubtitleCandidate> {
    candidates.sort_by(compare);
    candidates
}
