use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument};

use super::{pending::CommitToken, registry::Descriptor};
use crate::{
    core::{ConfigError, Result},
    source::ValueMap,
};

/// Writes a descriptor's pending overlay to its backing store.
///
/// Saves of one descriptor are serialised by its save lock; `commit` runs
/// while the lock is still held and only after the backing store accepted the
/// delta. Returns the number of entries persisted.
///
/// # Errors
/// * `ConfigError::Cancelled` - If `cancel` fired first; the overlay is untouched
/// * `ConfigError::Persist` / `ConfigError::ReadOnlySource` - If the source rejected the delta
#[instrument(skip_all, fields(source = descriptor.name(), level = descriptor.level()))]
pub(crate) async fn persist<F>(descriptor: &Descriptor, cancel: &CancellationToken, commit: F) -> Result<usize>
where
    F: FnOnce(&ValueMap, &CommitToken),
{
    let cancelled = || ConfigError::Cancelled {
        name: descriptor.name().to_string(),
    };

    let _guard = tokio::select! {
        biased;
        _ = cancel.cancelled() => return Err(cancelled()),
        guard = descriptor.save_lock.lock() => guard,
    };

    let (delta, token) = descriptor.pending().delta();
    if delta.is_empty() {
        debug!("Nothing to persist");
        return Ok(0);
    }

    let result = tokio::select! {
        biased;
        _ = cancel.cancelled() => return Err(cancelled()),
        result = descriptor.source.save(&delta) => result,
    };

    result.map_err(|e| match e {
        ConfigError::Persist { .. } | ConfigError::ReadOnlySource { .. } => e,
        other => ConfigError::Persist {
            name: descriptor.name().to_string(),
            details: other.to_string(),
        },
    })?;

    commit(&delta, &token);
    debug!(entries = delta.len(), "Persisted pending overlay");
    Ok(delta.len())
}
