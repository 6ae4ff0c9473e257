/*!
 * Subtitle timing synchronization.
 *
 * Aligns a target-language track to the timing of a reference track:
 * - `anchors`: sampling plan, anchor types, AI prompt/response codec
 * - `similarity`: local same-language anchor finder
 * - `mapping`: outlier rejection and piecewise-linear time mapping
 * - `engine`: the `SyncEngine` tying them together
 */

pub mod anchors;
pub mod similarity;
pub mod mapping;
pub mod engine;

pub use anchors::{AnchorLine, AnchorMatch, SamplingPlan, SyncAnchor};
pub use engine::{SyncEngine, SyncEstimate, SyncSettings, SyncStats};
pub use mapping::{OutlierFilter, TimeMapping};
pub use similarity::SimilarityAnchorFinder;
