/// Embedded video player adapter
///
/// The vendor handle is constructed as soon as the surface exists but is not
/// usable until its ready callback fires, and even then some methods attach
/// late. Readiness is therefore only declared after a settle delay and a probe
/// of every method the coordinator relies on.
use super::loader::{LazyLibrary, ScriptHost};
use super::PlaybackBackend;
use crate::config::EmbedConfig;
use crate::error::{PlaybackError, VendorError};
use crate::events::{AdapterSignal, PlayerNotice};
use crate::models::{Backend, BackendPhase, EmbedReadiness, PolledProgress, StateDelta, Track};
use async_trait::async_trait;
use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use tokio::sync::{mpsc, watch, Mutex};
use tokio::task::JoinHandle;
use tokio::time::Instant;

/// Handle methods probed before the player is declared ready
pub const REQUIRED_METHODS: &[&str] = &[
    "loadVideoById",
    "playVideo",
    "pauseVideo",
    "seekTo",
    "setVolume",
    "getCurrentTime",
    "getDuration",
    "getPlayerState",
];

/// Vendor player states
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EmbedPlayerState {
    Unstarted,
    Ended,
    Playing,
    Paused,
    Buffering,
    Cued,
}

impl EmbedPlayerState {
    pub fn from_code(code: i32) -> Option<Self> {
        match code {
            -1 => Some(Self::Unstarted),
            0 => Some(Self::Ended),
            1 => Some(Self::Playing),
            2 => Some(Self::Paused),
            3 => Some(Self::Buffering),
            5 => Some(Self::Cued),
            _ => None,
        }
    }
}

/// Classified vendor error codes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EmbedErrorKind {
    /// 2
    InvalidParameter,
    /// 5
    Html5,
    /// 100
    VideoUnavailable,
    /// 101 and 150
    EmbeddingRestricted,
    Unknown(i32),
}

impl EmbedErrorKind {
    pub fn from_code(code: i32) -> Self {
        match code {
            2 => Self::InvalidParameter,
            5 => Self::Html5,
            100 => Self::VideoUnavailable,
            101 | 150 => Self::EmbeddingRestricted,
            other => Self::Unknown(other),
        }
    }

    /// Errors where the right move is to skip to the next track
    pub fn is_auto_skippable(self) -> bool {
        matches!(self, Self::VideoUnavailable | Self::EmbeddingRestricted)
    }
}

impl fmt::Display for EmbedErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidParameter => write!(f, "invalid parameter"),
            Self::Html5 => write!(f, "html5 player error"),
            Self::VideoUnavailable => write!(f, "video unavailable"),
            Self::EmbeddingRestricted => write!(f, "embedding restricted by owner"),
            Self::Unknown(code) => write!(f, "unknown error code {}", code),
        }
    }
}

/// Callbacks raised by the vendor handle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EmbedEvent {
    Ready,
    StateChange(i32),
    Error(i32),
}

/// The page or webview the player is embedded into
pub trait EmbedHost: Send + Sync {
    /// Whether the target surface exists yet
    fn has_surface(&self, element_id: &str) -> bool;

    /// Whether the vendor library has published its global
    fn vendor_global_present(&self) -> bool;

    fn create_player(
        &self,
        element_id: &str,
        events: mpsc::UnboundedSender<EmbedEvent>,
    ) -> Result<Arc<dyn EmbedPlayer>, VendorError>;
}

/// The vendor player handle. Calls are synchronous on the vendor side.
pub trait EmbedPlayer: Send + Sync {
    fn has_method(&self, name: &str) -> bool;
    fn load_video_by_id(&self, video_id: &str) -> Result<(), VendorError>;
    fn play_video(&self) -> Result<(), VendorError>;
    fn pause_video(&self) -> Result<(), VendorError>;
    fn seek_to(&self, seconds: f64, allow_seek_ahead: bool) -> Result<(), VendorError>;
    /// 0-100
    fn set_volume(&self, volume: u8) -> Result<(), VendorError>;
    fn get_current_time(&self) -> f64;
    fn get_duration(&self) -> f64;
    fn get_player_state(&self) -> i32;
}

struct EmbedShared {
    readiness: Mutex<EmbedReadiness>,
    phase: Mutex<BackendPhase>,
    signals: mpsc::UnboundedSender<AdapterSignal>,
    handle_ready: watch::Sender<bool>,
}

impl EmbedShared {
    fn signal(&self, signal: AdapterSignal) {
        if self.signals.send(signal).is_err() {
            tracing::debug!("Embed adapter signal dropped: coordinator is gone");
        }
    }

    async fn set_phase(&self, next: BackendPhase) {
        let mut phase = self.phase.lock().await;
        if phase.can_transition_to(next) {
            *phase = next;
        } else {
            tracing::warn!("Ignoring embed phase transition {:?} -> {:?}", *phase, next);
        }
    }

    async fn handle_event(&self, event: EmbedEvent) {
        match event {
            EmbedEvent::Ready => {
                tracing::debug!("Embedded player handle reported ready");
                self.handle_ready.send_replace(true);
            }
            EmbedEvent::StateChange(code) => {
                let ready = self.readiness.lock().await.is_embed_ready;
                match EmbedPlayerState::from_code(code) {
                    Some(EmbedPlayerState::Playing) => {
                        if ready {
                            self.set_phase(BackendPhase::Playing).await;
                        }
                        self.signal(AdapterSignal::State {
                            backend: Backend::Embedded,
                            delta: StateDelta {
                                is_playing: Some(true),
                                ..Default::default()
                            },
                        });
                    }
                    Some(EmbedPlayerState::Paused) => {
                        if ready {
                            self.set_phase(BackendPhase::Paused).await;
                        }
                        self.signal(AdapterSignal::State {
                            backend: Backend::Embedded,
                            delta: StateDelta {
                                is_playing: Some(false),
                                ..Default::default()
                            },
                        });
                    }
                    Some(EmbedPlayerState::Ended) => {
                        if ready {
                            self.set_phase(BackendPhase::Ready).await;
                        }
                        self.signal(AdapterSignal::TrackEnded {
                            backend: Backend::Embedded,
                        });
                    }
                    Some(other) => tracing::trace!("Embedded player state {:?}", other),
                    None => tracing::debug!("Unknown embedded player state code {}", code),
                }
            }
            EmbedEvent::Error(code) => {
                let kind = EmbedErrorKind::from_code(code);
                tracing::warn!("Embedded player error {}: {}", code, kind);
                self.signal(AdapterSignal::PlaybackError {
                    backend: Backend::Embedded,
                    kind,
                });
            }
        }
    }
}

/// Adapter for the embedded video backend
pub struct EmbedAdapter {
    config: EmbedConfig,
    library: LazyLibrary,
    host: Arc<dyn EmbedHost>,
    player: Mutex<Option<Arc<dyn EmbedPlayer>>>,
    shared: Arc<EmbedShared>,
    init_lock: Mutex<()>,
    pump: Mutex<Option<JoinHandle<()>>>,
}

impl EmbedAdapter {
    pub fn new(
        config: EmbedConfig,
        scripts: Arc<dyn ScriptHost>,
        host: Arc<dyn EmbedHost>,
        signals: mpsc::UnboundedSender<AdapterSignal>,
    ) -> Self {
        let library = LazyLibrary::new(config.script_url.clone(), scripts);
        let (handle_ready, _) = watch::channel(false);
        Self {
            config,
            library,
            host,
            player: Mutex::new(None),
            shared: Arc::new(EmbedShared {
                readiness: Mutex::new(EmbedReadiness::default()),
                phase: Mutex::new(BackendPhase::Uninitialized),
                signals,
                handle_ready,
            }),
            init_lock: Mutex::new(()),
            pump: Mutex::new(None),
        }
    }

    pub async fn readiness(&self) -> EmbedReadiness {
        *self.shared.readiness.lock().await
    }

    /// Feed a vendor callback through the adapter
    pub async fn handle_event(&self, event: EmbedEvent) {
        self.shared.handle_event(event).await;
    }

    /// Load the library, build the handle and wait until it is usable.
    ///
    /// Safe to call repeatedly; concurrent callers wait for the first one.
    pub async fn initialize(&self) -> Result<(), PlaybackError> {
        let _guard = self.init_lock.lock().await;
        if self.shared.readiness.lock().await.is_embed_ready {
            return Ok(());
        }

        if let Err(e) = self.library.ensure_loaded().await {
            tracing::error!("Failed to load embed vendor library {}: {}", self.library.src(), e);
            return Err(e.into());
        }
        self.shared.set_phase(BackendPhase::Connecting).await;

        let result = self.bring_up().await;
        if let Err(e) = &result {
            tracing::error!("Embedded player failed to initialize: {}", e);
            self.shared.set_phase(BackendPhase::NotReady).await;
            self.shared.signal(AdapterSignal::Readiness {
                backend: Backend::Embedded,
                ready: false,
            });
        }
        result
    }

    async fn bring_up(&self) -> Result<(), PlaybackError> {
        self.wait_for_surface().await?;
        let player = self.ensure_player().await?;

        let mut ready_rx = self.shared.handle_ready.subscribe();
        tokio::time::timeout(self.config.ready_timeout(), ready_rx.wait_for(|ready| *ready))
            .await
            .map_err(|_| {
                PlaybackError::Command("embedded player ready callback timed out".to_string())
            })?
            .map_err(|_| PlaybackError::NotReady(Backend::Embedded))?;

        // methods are attached after the ready callback
        tokio::time::sleep(self.config.settle_delay()).await;

        let missing: Vec<&str> = REQUIRED_METHODS
            .iter()
            .copied()
            .filter(|name| !player.has_method(name))
            .collect();
        if !missing.is_empty() {
            tracing::warn!("Embedded player handle missing methods: {:?}", missing);
            return Err(PlaybackError::NotReady(Backend::Embedded));
        }

        self.shared.readiness.lock().await.is_embed_ready = true;
        self.shared.set_phase(BackendPhase::Ready).await;
        self.shared.signal(AdapterSignal::Readiness {
            backend: Backend::Embedded,
            ready: true,
        });
        self.shared
            .signal(AdapterSignal::Notice(PlayerNotice::BackendReady {
                backend: Backend::Embedded,
            }));
        tracing::info!("Embedded player ready");
        Ok(())
    }

    async fn wait_for_surface(&self) -> Result<(), PlaybackError> {
        let deadline = Instant::now() + self.config.ready_timeout();
        loop {
            if self.host.has_surface(&self.config.element_id) && self.host.vendor_global_present()
            {
                return Ok(());
            }
            if Instant::now() >= deadline {
                return Err(PlaybackError::Command(format!(
                    "surface '{}' or vendor library not available",
                    self.config.element_id
                )));
            }
            tokio::time::sleep(self.config.poll_interval()).await;
        }
    }

    async fn ensure_player(&self) -> Result<Arc<dyn EmbedPlayer>, PlaybackError> {
        let mut slot = self.player.lock().await;
        if let Some(existing) = slot.as_ref() {
            return Ok(existing.clone());
        }

        let (tx, mut rx) = mpsc::unbounded_channel();
        let player = self.host.create_player(&self.config.element_id, tx)?;
        *slot = Some(player.clone());

        let shared = self.shared.clone();
        let task = tokio::spawn(async move {
            while let Some(event) = rx.recv().await {
                shared.handle_event(event).await;
            }
        });
        *self.pump.lock().await = Some(task);
        Ok(player)
    }

    async fn ready_player(&self) -> Result<Arc<dyn EmbedPlayer>, PlaybackError> {
        if !self.shared.readiness.lock().await.is_embed_ready {
            return Err(PlaybackError::NotReady(Backend::Embedded));
        }
        self.player
            .lock()
            .await
            .clone()
            .ok_or(PlaybackError::NotReady(Backend::Embedded))
    }

    pub async fn shutdown(&self) {
        if let Some(task) = self.pump.lock().await.take() {
            task.abort();
        }
    }
}

#[async_trait]
impl PlaybackBackend for EmbedAdapter {
    fn kind(&self) -> Backend {
        Backend::Embedded
    }

    async fn phase(&self) -> BackendPhase {
        *self.shared.phase.lock().await
    }

    async fn is_ready(&self) -> bool {
        self.shared.readiness.lock().await.is_embed_ready && self.player.lock().await.is_some()
    }

    async fn has_handle(&self) -> bool {
        self.player.lock().await.is_some()
    }

    async fn start(&self, track: &Track) -> Result<(), PlaybackError> {
        let player = self.ready_player().await?;
        player.load_video_by_id(track.playable_ref())?;
        tracing::info!("Loaded embedded video {}", track.playable_ref());
        Ok(())
    }

    async fn pause(&self) -> Result<(), PlaybackError> {
        Ok(self.ready_player().await?.pause_video()?)
    }

    async fn resume(&self) -> Result<(), PlaybackError> {
        Ok(self.ready_player().await?.play_video()?)
    }

    async fn seek(&self, seconds: f64) -> Result<(), PlaybackError> {
        Ok(self.ready_player().await?.seek_to(seconds.max(0.0), true)?)
    }

    async fn set_volume(&self, volume: u8) -> Result<(), PlaybackError> {
        Ok(self.ready_player().await?.set_volume(volume.min(100))?)
    }

    async fn poll_progress(&self) -> Option<PolledProgress> {
        let player = self.ready_player().await.ok()?;
        let duration = player.get_duration();
        Some(PolledProgress {
            position_seconds: player.get_current_time().max(0.0),
            duration_seconds: (duration > 0.0).then_some(duration),
        })
    }
}
