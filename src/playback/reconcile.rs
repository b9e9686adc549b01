/// Position polling and the drag-lock rules
///
/// Both backends are polled through [`PlaybackBackend::poll_progress`]; push
/// position updates from either vendor are never written into the state.
use super::store::StateStore;
use crate::backends::BackendRegistry;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

/// Whether a volume change should reach the vendor clients
pub fn should_forward_volume(is_adjusting_volume: bool, force_commit: bool) -> bool {
    !is_adjusting_volume || force_commit
}

/// Sample the active backend once and publish its position.
///
/// Returns `true` when the state was written.
pub async fn poll_once(store: &StateStore, registry: &BackendRegistry) -> bool {
    let state = store.snapshot().await;
    let Some(active) = state.active_backend else {
        return false;
    };
    if !state.is_playing || state.is_seeking {
        return false;
    }
    let Some(backend) = registry.get(active) else {
        return false;
    };
    let Some(progress) = backend.poll_progress().await else {
        tracing::trace!("No progress available from {} backend", active);
        return false;
    };

    // the user may have grabbed the slider while the poll was in flight
    store
        .update(|s| {
            if s.is_seeking || s.active_backend != Some(active) || !s.is_playing {
                return false;
            }
            s.position_seconds = progress.position_seconds;
            if let Some(duration) = progress.duration_seconds.filter(|d| *d > 0.0) {
                s.duration_seconds = duration;
            }
            true
        })
        .await
}

/// Run [`poll_once`] on a fixed period until aborted
pub fn spawn_position_poller(
    store: StateStore,
    registry: Arc<BackendRegistry>,
    period: Duration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        loop {
            ticker.tick().await;
            poll_once(&store, &registry).await;
        }
    })
}
