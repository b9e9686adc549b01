/// Notices and adapter signals
///
/// `PlayerNotice` is broadcast to UI subscribers, which decide how to present
/// it. `AdapterSignal` flows from the adapters to the coordinator only.
use crate::backends::embed::EmbedErrorKind;
use crate::models::{Backend, StateDelta};
use serde::Serialize;
use tokio::sync::broadcast;

const NOTICE_CHANNEL_CAPACITY: usize = 64;

/// User-facing notices emitted by the coordinator and adapters
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PlayerNotice {
    /// Show an upsell; never retried automatically
    PremiumRequired,
    /// Generic account problem reported by the remote vendor
    AccountError { message: String },
    /// Token rejected; the user must reconnect
    ReconnectRequired { message: String },
    /// Backend dropped out; controls for it should be disabled until ready
    BackendUnavailable { backend: Backend },
    BackendReady { backend: Backend },
    /// Informational only, playback continues with the next track
    TrackSkipped {
        track_id: Option<String>,
        reason: EmbedErrorKind,
    },
    /// Fatal for the current track, no automatic recovery
    PlaybackFailed {
        track_id: Option<String>,
        reason: EmbedErrorKind,
    },
    CommandFailed { message: String },
    TrackCompleted { backend: Backend },
}

/// Signals raised by adapters and consumed by the coordinator
#[derive(Debug, Clone, PartialEq)]
pub enum AdapterSignal {
    Readiness { backend: Backend, ready: bool },
    State { backend: Backend, delta: StateDelta },
    TrackEnded { backend: Backend },
    PlaybackError { backend: Backend, kind: EmbedErrorKind },
    Notice(PlayerNotice),
}

/// Fan-out of notices to any number of UI subscribers
#[derive(Debug, Clone)]
pub struct NoticeBus {
    sender: broadcast::Sender<PlayerNotice>,
}

impl NoticeBus {
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(NOTICE_CHANNEL_CAPACITY);
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<PlayerNotice> {
        self.sender.subscribe()
    }

    /// Publish a notice. Having no subscribers is not an error.
    pub fn emit(&self, notice: PlayerNotice) {
        tracing::debug!(?notice, "Emitting player notice");
        let _ = self.sender.send(notice);
    }
}

impl Default for NoticeBus {
    fn default() -> Self {
        Self::new()
    }
}
