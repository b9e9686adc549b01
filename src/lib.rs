/// Playdeck - unified playback over a remote streaming device and an embedded player
pub mod api;
pub mod backends;
pub mod config;
pub mod error;
pub mod events;
pub mod host;
pub mod logging;
pub mod models;
pub mod playback;
pub mod preferences;

#[cfg(test)]
pub(crate) mod testing;

pub use api::{HttpMediaApi, MediaApi, RemoteStatus};
pub use backends::{BackendRegistry, EmbedAdapter, PlaybackBackend, RemoteAdapter};
pub use config::Config;
pub use error::{ApiError, PlaybackError, VendorError};
pub use events::{NoticeBus, PlayerNotice};
pub use host::{PlayerDeps, PlayerHost};
pub use models::{Backend, BackendPhase, PlaybackState, RepeatMode, Track};
pub use playback::{PlayOptions, PlaybackCoordinator};
pub use preferences::{PreferenceStore, UiPreferences};
