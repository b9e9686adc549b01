/// Backend adapters and the uniform interface the coordinator drives them through
pub mod embed;
pub mod loader;
pub mod remote;

use crate::error::PlaybackError;
use crate::models::{Backend, BackendPhase, PolledProgress, Track};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;

pub use embed::EmbedAdapter;
pub use remote::RemoteAdapter;

/// Uniform control surface over both adapters
#[async_trait]
pub trait PlaybackBackend: Send + Sync {
    /// Which backend this adapter bridges
    fn kind(&self) -> Backend;

    /// Current connection phase
    async fn phase(&self) -> BackendPhase;

    /// Whether playback commands may be issued
    async fn is_ready(&self) -> bool;

    /// Whether the vendor handle has been constructed at all
    async fn has_handle(&self) -> bool;

    /// Start something new
    async fn start(&self, track: &Track) -> Result<(), PlaybackError>;

    async fn pause(&self) -> Result<(), PlaybackError>;

    async fn resume(&self) -> Result<(), PlaybackError>;

    /// Seek to a position in seconds
    async fn seek(&self, seconds: f64) -> Result<(), PlaybackError>;

    /// Set volume on the unified 0-100 scale
    async fn set_volume(&self, volume: u8) -> Result<(), PlaybackError>;

    /// Sample position/duration in seconds, `None` if nothing can be read
    async fn poll_progress(&self) -> Option<PolledProgress>;
}

/// Registry holding the two long-lived adapters
pub struct BackendRegistry {
    backends: HashMap<Backend, Arc<dyn PlaybackBackend>>,
    remote: Option<Arc<RemoteAdapter>>,
    embed: Option<Arc<EmbedAdapter>>,
}

impl BackendRegistry {
    pub fn new() -> Self {
        Self {
            backends: HashMap::new(),
            remote: None,
            embed: None,
        }
    }

    pub fn register_remote(&mut self, adapter: Arc<RemoteAdapter>) {
        self.backends.insert(Backend::Remote, adapter.clone());
        self.remote = Some(adapter);
    }

    pub fn register_embed(&mut self, adapter: Arc<EmbedAdapter>) {
        self.backends.insert(Backend::Embedded, adapter.clone());
        self.embed = Some(adapter);
    }

    pub fn get(&self, backend: Backend) -> Option<Arc<dyn PlaybackBackend>> {
        self.backends.get(&backend).cloned()
    }

    pub fn get_all(&self) -> Vec<Arc<dyn PlaybackBackend>> {
        self.backends.values().cloned().collect()
    }

    pub fn remote(&self) -> Option<Arc<RemoteAdapter>> {
        self.remote.clone()
    }

    pub fn embed(&self) -> Option<Arc<EmbedAdapter>> {
        self.embed.clone()
    }
}

impl Default for BackendRegistry {
    fn default() -> Self {
        Self::new()
    }
}
