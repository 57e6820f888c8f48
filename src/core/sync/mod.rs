/*!
 * Synchronization Primitives
 *
 * Lock-free building blocks for the single-logical-owner monitor model:
 * - CAS-based ownership sentinel with RAII release (no blocking mutex on the
 *   hot path; a losing thread gets an error, never a queue)
 * - Atomically swapped immutable snapshots for the process-wide filter state
 */

mod owner;
mod snapshot;

pub use owner::{current_thread_token, OwnerCell, OwnerToken};
pub use snapshot::SnapshotCell;
