use std::{collections::HashSet, mem, sync::Weak, time::Duration};

use tokio::{sync::mpsc::UnboundedReceiver, task::JoinHandle, time::Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

use super::store::StoreInner;

/// Spawns the debounce loop that turns raw change signals into reload cycles.
///
/// Each signal names the descriptor that changed and restarts the debounce
/// timer; when the timer expires every descriptor signalled during the window
/// is reloaded in one cycle. The loop ends when `shutdown` fires, every
/// signal sender is gone, or the store has been dropped.
pub(crate) fn spawn_reload_loop(
    store: Weak<StoreInner>,
    mut signals: UnboundedReceiver<usize>,
    debounce: Duration,
    shutdown: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut pending: HashSet<usize> = HashSet::new();

        let debounce_sleep = tokio::time::sleep(debounce);
        tokio::pin!(debounce_sleep);

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,

                signal = signals.recv() => {
                    let Some(source_id) = signal else {
                        break;
                    };
                    trace!(source_id, "Change signal received");
                    pending.insert(source_id);
                    debounce_sleep.as_mut().reset(Instant::now() + debounce);
                }

                _ = &mut debounce_sleep, if !pending.is_empty() => {
                    let Some(store) = store.upgrade() else {
                        break;
                    };
                    let ids = mem::take(&mut pending);
                    store.run_reload_cycle(&ids).await;
                }
            }
        }

        debug!("Reload loop stopped");
    })
}
