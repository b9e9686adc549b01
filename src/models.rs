/// Data models shared by the coordinator, the adapters and UI subscribers
use serde::{Deserialize, Serialize};
use std::fmt;

/// The two interchangeable playback providers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    /// Remote-device streaming (virtual device, token + premium required)
    Remote,
    /// Embedded video-based player (no auth, pull-only telemetry)
    Embedded,
}

impl Backend {
    /// The backend that must be paused when this one becomes active
    pub fn other(self) -> Backend {
        match self {
            Backend::Remote => Backend::Embedded,
            Backend::Embedded => Backend::Remote,
        }
    }
}

impl fmt::Display for Backend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Backend::Remote => write!(f, "remote"),
            Backend::Embedded => write!(f, "embedded"),
        }
    }
}

/// A playable item as seen by the coordinator
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Track {
    pub id: String,
    pub title: String,
    pub artist: String,
    pub cover_url: Option<String>,
    pub duration_seconds: f64,
    /// Vendor URI (e.g. `spotify:track:...`) or embed video id
    pub backend_uri: Option<String>,
    pub backend: Backend,
}

impl Track {
    pub fn new(backend: Backend, id: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            artist: String::new(),
            cover_url: None,
            duration_seconds: 0.0,
            backend_uri: None,
            backend,
        }
    }

    pub fn with_artist(mut self, artist: impl Into<String>) -> Self {
        self.artist = artist.into();
        self
    }

    pub fn with_duration(mut self, seconds: f64) -> Self {
        self.duration_seconds = seconds.max(0.0);
        self
    }

    pub fn with_uri(mut self, uri: impl Into<String>) -> Self {
        self.backend_uri = Some(uri.into());
        self
    }

    pub fn with_cover(mut self, url: impl Into<String>) -> Self {
        self.cover_url = Some(url.into());
        self
    }

    /// The identifier handed to the backend's start primitive
    pub fn playable_ref(&self) -> &str {
        self.backend_uri.as_deref().unwrap_or(&self.id)
    }
}

/// Unified playback state. One instance lives for the whole session.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PlaybackState {
    pub active_backend: Option<Backend>,
    pub is_playing: bool,
    pub current_track: Option<Track>,
    pub position_seconds: f64,
    pub duration_seconds: f64,
    /// 0-100, independent of the backends' native scales
    pub volume: u8,
    #[serde(skip)]
    pub is_seeking: bool,
    #[serde(skip)]
    pub is_adjusting_volume: bool,
}

impl Default for PlaybackState {
    fn default() -> Self {
        Self {
            active_backend: None,
            is_playing: false,
            current_track: None,
            position_seconds: 0.0,
            duration_seconds: 0.0,
            volume: 50,
            is_seeking: false,
            is_adjusting_volume: false,
        }
    }
}

/// Repeat behaviour for queue-driven playback
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RepeatMode {
    #[default]
    Off,
    One,
    All,
}

/// Readiness of the remote-device backend, owned by its adapter
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RemoteReadiness {
    pub device_id: Option<String>,
    pub is_ready: bool,
    pub is_premium_required: bool,
}

/// Readiness of the embedded backend, owned by its adapter
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct EmbedReadiness {
    pub is_embed_ready: bool,
}

/// Lifecycle of a single backend connection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub enum BackendPhase {
    #[default]
    Uninitialized,
    Connecting,
    Ready,
    Playing,
    Paused,
    /// Transient; a reconnect is expected
    NotReady,
    /// Terminal until the account is upgraded
    EntitlementFailed,
}

impl BackendPhase {
    /// Whether the adapter is allowed to move from `self` to `next`
    pub fn can_transition_to(self, next: BackendPhase) -> bool {
        use BackendPhase::*;
        if self == next {
            return true;
        }
        match (self, next) {
            (Uninitialized, Connecting) => true,
            (Connecting, Ready) | (Connecting, NotReady) | (Connecting, EntitlementFailed) => true,
            (Ready, Playing) | (Ready, Paused) | (Ready, NotReady) => true,
            (Playing, Paused) | (Paused, Playing) => true,
            (Playing, Ready) | (Paused, Ready) => true,
            (Playing, NotReady) | (Paused, NotReady) => true,
            (NotReady, Connecting) | (NotReady, Ready) => true,
            // an entitlement failure only clears through a fresh connect attempt
            (EntitlementFailed, Connecting) => true,
            // the vendor may report the account tier at any point
            (_, EntitlementFailed) => true,
            _ => false,
        }
    }

    /// Whether playback commands may be issued in this phase
    pub fn accepts_commands(self) -> bool {
        matches!(
            self,
            BackendPhase::Ready | BackendPhase::Playing | BackendPhase::Paused
        )
    }
}

/// A normalized state change reported by an adapter.
///
/// Values are already in seconds; `None` means "not reported".
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StateDelta {
    pub is_playing: Option<bool>,
    pub position_seconds: Option<f64>,
    pub duration_seconds: Option<f64>,
    pub track: Option<Track>,
}

/// Progress sample returned by a backend poll
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PolledProgress {
    pub position_seconds: f64,
    pub duration_seconds: Option<f64>,
}

/// Vendor milliseconds to unified seconds
pub fn ms_to_seconds(ms: u64) -> f64 {
    ms as f64 / 1000.0
}

/// Unified seconds to vendor milliseconds
pub fn seconds_to_ms(seconds: f64) -> u64 {
    (seconds.max(0.0) * 1000.0).round() as u64
}

/// Unified 0-100 volume to the remote vendor's 0.0-1.0 scale
pub fn volume_to_unit(volume: u8) -> f64 {
    f64::from(volume.min(100)) / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unit_conversions() {
        assert_eq!(ms_to_seconds(1500), 1.5);
        assert_eq!(seconds_to_ms(2.25), 2250);
        assert_eq!(seconds_to_ms(-3.0), 0);
        assert_eq!(volume_to_unit(75), 0.75);
        assert_eq!(volume_to_unit(250), 1.0);
    }

    #[test]
    fn test_phase_transitions() {
        use BackendPhase::*;
        assert!(Uninitialized.can_transition_to(Connecting));
        assert!(Connecting.can_transition_to(EntitlementFailed));
        assert!(Ready.can_transition_to(EntitlementFailed));
        assert!(Uninitialized.can_transition_to(EntitlementFailed));
        assert!(Ready.can_transition_to(NotReady));
        assert!(Playing.can_transition_to(Paused));
        assert!(!Uninitialized.can_transition_to(Playing));
        assert!(!EntitlementFailed.can_transition_to(Ready));
        assert!(!NotReady.can_transition_to(Playing));
    }

    #[test]
    fn test_track_playable_ref_prefers_uri() {
        let track = Track::new(Backend::Remote, "abc", "Song").with_uri("spotify:track:abc");
        assert_eq!(track.playable_ref(), "spotify:track:abc");
        let bare = Track::new(Backend::Embedded, "v1", "Video");
        assert_eq!(bare.playable_ref(), "v1");
    }

    #[test]
    fn test_backend_other() {
        assert_eq!(Backend::Remote.other(), Backend::Embedded);
        assert_eq!(Backend::Embedded.other(), Backend::Remote);
        assert_eq!(Backend::Remote.to_string(), "remote");
    }
}
