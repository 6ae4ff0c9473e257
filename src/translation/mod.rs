/*!
 * Machine translation of subtitle tracks.
 *
 * - `batch`: index-tagged batching, retries, reassembly
 * - `estimate`: token and cost projection
 * - `queue`: the live pending-approval store
 * - `workflow`: the approval state machine and execution path
 */

pub use self::batch::{BatchPolicy, BatchTranslator};
pub use self::estimate::TranslationEstimate;
pub use self::queue::{PendingQueue, PendingTranslationRequest, QueueKey, RequestStatus, TranslationSource};
pub use self::workflow::{TranslationReport, TranslationWorkflow};

pub mod batch;
pub mod estimate;
pub mod queue;
pub mod workflow;
