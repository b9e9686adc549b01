/// The single owner of the unified playback state
use crate::models::PlaybackState;
use std::sync::Arc;
use tokio::sync::{watch, Mutex};

/// Shared playback state plus a change feed for UI subscribers.
///
/// Every mutation goes through [`StateStore::update`], which publishes the new
/// value only when something actually changed.
#[derive(Clone)]
pub struct StateStore {
    state: Arc<Mutex<PlaybackState>>,
    publisher: Arc<watch::Sender<PlaybackState>>,
}

impl StateStore {
    pub fn new(initial: PlaybackState) -> Self {
        let (publisher, _) = watch::channel(initial.clone());
        Self {
            state: Arc::new(Mutex::new(initial)),
            publisher: Arc::new(publisher),
        }
    }

    pub async fn snapshot(&self) -> PlaybackState {
        self.state.lock().await.clone()
    }

    /// Mutate the state under the lock and publish the result
    pub async fn update<R>(&self, f: impl FnOnce(&mut PlaybackState) -> R) -> R {
        let mut state = self.state.lock().await;
        let before = state.clone();
        let result = f(&mut state);
        if *state != before {
            self.publisher.send_replace(state.clone());
        }
        result
    }

    pub fn subscribe(&self) -> watch::Receiver<PlaybackState> {
        self.publisher.subscribe()
    }
}

impl Default for StateStore {
    fn default() -> Self {
        Self::new(PlaybackState::default())
    }
}
