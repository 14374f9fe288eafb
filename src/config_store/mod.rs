//! Layered configuration store with change tracking.
//!
//! [`ConfigStore`] merges an ordered set of sources into one immutable
//! [`MergedSnapshot`], buffers writes in per-source pending overlays until they
//! are saved, and runs a debounced reload pipeline that diffs snapshots and
//! publishes [`ChangeBatch`]es to subscribers.

mod broadcast;
mod builder;
mod cache;
mod changes;
mod diff;
mod file_watching;
mod history;
mod pending;
mod persist;
mod registry;
mod reload;
mod snapshot;
mod store;

#[cfg(test)]
mod tests;

pub use broadcast::{ChangeStream, HandlerSubscription, Subscription};
pub use builder::ConfigStoreBuilder;
pub use cache::ValueCache;
pub use changes::{ChangeBatch, ChangeEvent, ChangeKind, ChangeRecord, ReloadErrorRecord};
pub use diff::diff_snapshots;
pub use history::ChangeHistory;
pub use pending::{PendingEntry, PendingOverlay};
pub use registry::{ResolvedValue, SourceInfo};
pub use snapshot::MergedSnapshot;
pub use store::ConfigStore;
