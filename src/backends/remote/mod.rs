/// Remote-device streaming adapter
///
/// Bridges a vendor client that registers a virtual playback device. Starting
/// something new goes over REST (our backend, or the vendor's Web API for
/// contexts); controlling what is already playing goes through the vendor
/// client. Nothing in this module returns an error out of an event handler:
/// failures become readiness changes or notices.
pub mod web_api;

use super::loader::{LazyLibrary, ScriptHost};
use super::PlaybackBackend;
use crate::api::MediaApi;
use crate::config::RemoteConfig;
use crate::error::{PlaybackError, VendorError};
use crate::events::{AdapterSignal, PlayerNotice};
use crate::models::{
    ms_to_seconds, seconds_to_ms, volume_to_unit, Backend, BackendPhase, PolledProgress,
    RemoteReadiness, StateDelta, Track,
};
use async_trait::async_trait;
use futures::future::BoxFuture;
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex, RwLock};
use tokio::task::JoinHandle;

pub use web_api::{context_kind, RemoteWebApi, SpotifyWebApi};

/// Callback the vendor client invokes whenever it needs a bearer token
pub type TokenSupplier = Arc<dyn Fn() -> BoxFuture<'static, Option<String>> + Send + Sync>;

/// Options handed to the vendor client constructor
#[derive(Clone)]
pub struct RemoteDeviceOptions {
    pub name: String,
    /// Vendor scale, 0.0-1.0
    pub volume: f64,
    pub token_supplier: TokenSupplier,
}

/// Track metadata as reported by the vendor
#[derive(Debug, Clone, PartialEq)]
pub struct RemoteVendorTrack {
    pub id: String,
    pub uri: String,
    pub name: String,
    pub artists: Vec<String>,
    pub album_image_url: Option<String>,
    pub duration_ms: u64,
}

/// Playback state as reported by the vendor (milliseconds)
#[derive(Debug, Clone, PartialEq)]
pub struct RemoteVendorState {
    pub position_ms: u64,
    pub duration_ms: u64,
    pub paused: bool,
    pub current_track: Option<RemoteVendorTrack>,
}

/// Asynchronous events raised by the vendor client
#[derive(Debug, Clone, PartialEq)]
pub enum RemoteDeviceEvent {
    Ready { device_id: String },
    NotReady { device_id: String },
    InitializationError { message: String },
    AuthenticationError { message: String },
    /// Account tier problem; the vendor gives a message, not a code
    AccountError { message: String },
    PlaybackError { message: String },
    /// `None` when this device is no longer the one playing
    StateChanged(Option<RemoteVendorState>),
}

/// Transport-level control of the virtual device
#[async_trait]
pub trait RemoteDeviceClient: Send + Sync {
    /// Register the device; `Ok(false)` when the vendor refused
    async fn connect(&self) -> Result<bool, VendorError>;
    async fn pause(&self) -> Result<(), VendorError>;
    async fn resume(&self) -> Result<(), VendorError>;
    async fn seek(&self, position_ms: u64) -> Result<(), VendorError>;
    async fn set_volume(&self, volume: f64) -> Result<(), VendorError>;
    async fn next_track(&self) -> Result<(), VendorError>;
    async fn previous_track(&self) -> Result<(), VendorError>;
    async fn get_current_state(&self) -> Option<RemoteVendorState>;
}

/// Constructs the vendor client; called at most once per adapter
pub trait RemoteDeviceConnector: Send + Sync {
    fn create(
        &self,
        options: RemoteDeviceOptions,
        events: mpsc::UnboundedSender<RemoteDeviceEvent>,
    ) -> Arc<dyn RemoteDeviceClient>;
}

/// The vendor reports entitlement problems as free text
pub fn is_premium_message(message: &str) -> bool {
    message.to_lowercase().contains("premium")
}

/// Convert vendor state into a unified delta
pub fn normalize_state(state: Option<&RemoteVendorState>) -> StateDelta {
    match state {
        None => StateDelta {
            is_playing: Some(false),
            ..Default::default()
        },
        Some(state) => StateDelta {
            is_playing: Some(!state.paused),
            position_seconds: Some(ms_to_seconds(state.position_ms)),
            duration_seconds: Some(ms_to_seconds(state.duration_ms)),
            track: state.current_track.as_ref().map(vendor_track_to_track),
        },
    }
}

fn vendor_track_to_track(track: &RemoteVendorTrack) -> Track {
    let converted = Track::new(Backend::Remote, track.id.clone(), track.name.clone())
        .with_artist(track.artists.join(", "))
        .with_duration(ms_to_seconds(track.duration_ms))
        .with_uri(track.uri.clone());
    match &track.album_image_url {
        Some(url) => converted.with_cover(url.clone()),
        None => converted,
    }
}

/// State shared between the adapter and its event pump
struct RemoteShared {
    readiness: Mutex<RemoteReadiness>,
    phase: Mutex<BackendPhase>,
    signals: mpsc::UnboundedSender<AdapterSignal>,
}

impl RemoteShared {
    fn signal(&self, signal: AdapterSignal) {
        if self.signals.send(signal).is_err() {
            tracing::debug!("Remote adapter signal dropped: coordinator is gone");
        }
    }

    async fn set_phase(&self, next: BackendPhase) {
        let mut phase = self.phase.lock().await;
        if phase.can_transition_to(next) {
            if *phase != next {
                tracing::debug!("Remote backend phase {:?} -> {:?}", *phase, next);
            }
            *phase = next;
        } else {
            tracing::warn!("Ignoring remote phase transition {:?} -> {:?}", *phase, next);
        }
    }

    async fn mark_not_ready(&self) {
        let was_ready = {
            let mut readiness = self.readiness.lock().await;
            std::mem::replace(&mut readiness.is_ready, false)
        };
        self.set_phase(BackendPhase::NotReady).await;
        self.signal(AdapterSignal::Readiness {
            backend: Backend::Remote,
            ready: false,
        });
        if was_ready {
            self.signal(AdapterSignal::Notice(PlayerNotice::BackendUnavailable {
                backend: Backend::Remote,
            }));
        }
    }

    async fn handle_event(&self, event: RemoteDeviceEvent) {
        match event {
            RemoteDeviceEvent::Ready { device_id } => {
                tracing::info!("Remote device ready with id {}", device_id);
                {
                    let mut readiness = self.readiness.lock().await;
                    readiness.device_id = Some(device_id);
                    readiness.is_ready = true;
                }
                self.set_phase(BackendPhase::Ready).await;
                self.signal(AdapterSignal::Readiness {
                    backend: Backend::Remote,
                    ready: true,
                });
                self.signal(AdapterSignal::Notice(PlayerNotice::BackendReady {
                    backend: Backend::Remote,
                }));
            }
            RemoteDeviceEvent::NotReady { device_id } => {
                // keep the id and the client; the vendor reconnects on its own
                tracing::warn!("Remote device {} went offline", device_id);
                self.mark_not_ready().await;
            }
            RemoteDeviceEvent::InitializationError { message } => {
                tracing::error!("Remote device failed to initialize: {}", message);
                self.mark_not_ready().await;
            }
            RemoteDeviceEvent::AuthenticationError { message } => {
                tracing::error!("Remote device rejected the token: {}", message);
                self.signal(AdapterSignal::Notice(PlayerNotice::ReconnectRequired { message }));
            }
            RemoteDeviceEvent::AccountError { message } => {
                if is_premium_message(&message) {
                    tracing::warn!("Remote playback requires premium: {}", message);
                    self.readiness.lock().await.is_premium_required = true;
                    self.set_phase(BackendPhase::EntitlementFailed).await;
                    self.signal(AdapterSignal::Notice(PlayerNotice::PremiumRequired));
                } else {
                    tracing::warn!("Remote account error: {}", message);
                    self.signal(AdapterSignal::Notice(PlayerNotice::AccountError { message }));
                }
            }
            RemoteDeviceEvent::PlaybackError { message } => {
                tracing::warn!("Remote playback error: {}", message);
                self.signal(AdapterSignal::Notice(PlayerNotice::CommandFailed { message }));
            }
            RemoteDeviceEvent::StateChanged(state) => {
                let next = match &state {
                    Some(s) if !s.paused => BackendPhase::Playing,
                    Some(_) => BackendPhase::Paused,
                    None => BackendPhase::Ready,
                };
                if self.phase.lock().await.accepts_commands() {
                    self.set_phase(next).await;
                }
                self.signal(AdapterSignal::State {
                    backend: Backend::Remote,
                    delta: normalize_state(state.as_ref()),
                });
            }
        }
    }
}

/// Adapter for the remote-device streaming backend
pub struct RemoteAdapter {
    config: RemoteConfig,
    library: LazyLibrary,
    connector: Arc<dyn RemoteDeviceConnector>,
    api: Arc<dyn MediaApi>,
    web_api: Arc<dyn RemoteWebApi>,
    client: Mutex<Option<Arc<dyn RemoteDeviceClient>>>,
    token: Arc<RwLock<Option<String>>>,
    shared: Arc<RemoteShared>,
    pump: Mutex<Option<JoinHandle<()>>>,
}

impl RemoteAdapter {
    pub fn new(
        config: RemoteConfig,
        scripts: Arc<dyn ScriptHost>,
        connector: Arc<dyn RemoteDeviceConnector>,
        api: Arc<dyn MediaApi>,
        web_api: Arc<dyn RemoteWebApi>,
        signals: mpsc::UnboundedSender<AdapterSignal>,
    ) -> Self {
        let library = LazyLibrary::new(config.sdk_url.clone(), scripts);
        Self {
            config,
            library,
            connector,
            api,
            web_api,
            client: Mutex::new(None),
            token: Arc::new(RwLock::new(None)),
            shared: Arc::new(RemoteShared {
                readiness: Mutex::new(RemoteReadiness::default()),
                phase: Mutex::new(BackendPhase::Uninitialized),
                signals,
            }),
            pump: Mutex::new(None),
        }
    }

    /// Read-only view of the readiness flags
    pub async fn readiness(&self) -> RemoteReadiness {
        self.shared.readiness.lock().await.clone()
    }

    pub async fn device_id(&self) -> Option<String> {
        self.shared.readiness.lock().await.device_id.clone()
    }

    /// Replace the token the vendor client pulls, without reconnecting
    pub async fn set_token(&self, token: String) {
        *self.token.write().await = Some(token);
        tracing::debug!("Remote access token refreshed");
    }

    /// Record an entitlement failure learned outside the vendor client
    pub async fn mark_entitlement_failed(&self) {
        self.shared.readiness.lock().await.is_premium_required = true;
        self.shared.set_phase(BackendPhase::EntitlementFailed).await;
        self.shared
            .signal(AdapterSignal::Notice(PlayerNotice::PremiumRequired));
    }

    /// Feed a vendor event through the adapter (the pump does this for real clients)
    pub async fn handle_event(&self, event: RemoteDeviceEvent) {
        self.shared.handle_event(event).await;
    }

    fn token_supplier(&self) -> TokenSupplier {
        let token = self.token.clone();
        let api = self.api.clone();
        Arc::new(move || {
            let token = token.clone();
            let api = api.clone();
            Box::pin(async move {
                if let Some(cached) = token.read().await.clone() {
                    return Some(cached);
                }
                match api.fetch_token().await {
                    Ok(fresh) => {
                        *token.write().await = Some(fresh.clone());
                        Some(fresh)
                    }
                    Err(e) => {
                        tracing::warn!("Token supplier could not fetch a token: {}", e);
                        None
                    }
                }
            })
        })
    }

    /// Construct the vendor client (first call only) and register the device.
    ///
    /// Returns whether the vendor accepted the connect request. Readiness is
    /// only reached when the `Ready` event arrives.
    pub async fn connect(&self, token: String) -> bool {
        self.set_token(token).await;

        if let Err(e) = self.library.ensure_loaded().await {
            tracing::error!(
                "Failed to load remote vendor library {}: {}",
                self.library.src(),
                e
            );
            self.shared.mark_not_ready().await;
            return false;
        }

        self.shared.set_phase(BackendPhase::Connecting).await;

        let client = {
            let mut slot = self.client.lock().await;
            match slot.as_ref() {
                Some(existing) => existing.clone(),
                None => {
                    let (tx, rx) = mpsc::unbounded_channel();
                    let options = RemoteDeviceOptions {
                        name: self.config.device_name.clone(),
                        volume: self.config.initial_volume,
                        token_supplier: self.token_supplier(),
                    };
                    let created = self.connector.create(options, tx);
                    *slot = Some(created.clone());
                    self.spawn_pump(rx).await;
                    created
                }
            }
        };

        match client.connect().await {
            Ok(true) => {
                tracing::info!("Remote device connect requested");
                true
            }
            Ok(false) => {
                tracing::warn!("Remote vendor refused to connect");
                self.shared.mark_not_ready().await;
                false
            }
            Err(e) => {
                tracing::error!("Remote vendor connect failed: {}", e);
                self.shared.mark_not_ready().await;
                false
            }
        }
    }

    async fn spawn_pump(&self, mut rx: mpsc::UnboundedReceiver<RemoteDeviceEvent>) {
        let shared = self.shared.clone();
        let task = tokio::spawn(async move {
            while let Some(event) = rx.recv().await {
                shared.handle_event(event).await;
            }
            tracing::debug!("Remote event pump finished");
        });
        *self.pump.lock().await = Some(task);
    }

    async fn client(&self) -> Result<Arc<dyn RemoteDeviceClient>, PlaybackError> {
        self.client
            .lock()
            .await
            .clone()
            .ok_or(PlaybackError::NotReady(Backend::Remote))
    }

    /// REST path for "start something new" on the virtual device.
    ///
    /// Context URIs (playlist, album, artist, show) go to the vendor's Web API,
    /// everything else to our `media/spotify/play` endpoint. A failed shuffle
    /// toggle is logged and ignored.
    pub async fn start_playback(
        &self,
        uri: &str,
        shuffle: Option<bool>,
    ) -> Result<(), PlaybackError> {
        let readiness = self.readiness().await;
        if readiness.is_premium_required {
            return Err(PlaybackError::PremiumRequired);
        }
        let device_id = readiness.device_id.ok_or(PlaybackError::MissingDevice)?;

        let token = self.api.fetch_token().await?;
        self.set_token(token.clone()).await;

        if let Some(state) = shuffle {
            if let Err(e) = self.web_api.set_shuffle(&token, &device_id, state).await {
                tracing::warn!("Shuffle toggle failed, continuing: {}", e);
            }
        }

        if context_kind(uri).is_some() {
            self.web_api.play_context(&token, &device_id, uri).await?;
        } else {
            self.api.start_remote_playback(uri, &device_id).await?;
        }
        Ok(())
    }

    pub async fn next(&self) -> Result<(), PlaybackError> {
        Ok(self.client().await?.next_track().await?)
    }

    pub async fn previous(&self) -> Result<(), PlaybackError> {
        Ok(self.client().await?.previous_track().await?)
    }

    /// Stop the event pump. Only used on hard teardown.
    pub async fn shutdown(&self) {
        if let Some(task) = self.pump.lock().await.take() {
            task.abort();
        }
    }
}

#[async_trait]
impl PlaybackBackend for RemoteAdapter {
    fn kind(&self) -> Backend {
        Backend::Remote
    }

    async fn phase(&self) -> BackendPhase {
        *self.shared.phase.lock().await
    }

    async fn is_ready(&self) -> bool {
        self.shared.readiness.lock().await.is_ready && self.client.lock().await.is_some()
    }

    async fn has_handle(&self) -> bool {
        self.client.lock().await.is_some()
    }

    async fn start(&self, track: &Track) -> Result<(), PlaybackError> {
        self.start_playback(track.playable_ref(), None).await
    }

    async fn pause(&self) -> Result<(), PlaybackError> {
        Ok(self.client().await?.pause().await?)
    }

    async fn resume(&self) -> Result<(), PlaybackError> {
        Ok(self.client().await?.resume().await?)
    }

    async fn seek(&self, seconds: f64) -> Result<(), PlaybackError> {
        Ok(self.client().await?.seek(seconds_to_ms(seconds)).await?)
    }

    async fn set_volume(&self, volume: u8) -> Result<(), PlaybackError> {
        Ok(self.client().await?.set_volume(volume_to_unit(volume)).await?)
    }

    async fn poll_progress(&self) -> Option<PolledProgress> {
        let client = self.client.lock().await.clone()?;
        let state = client.get_current_state().await?;
        Some(PolledProgress {
            position_seconds: ms_to_seconds(state.position_ms),
            duration_seconds: (state.duration_ms > 0).then(|| ms_to_seconds(state.duration_ms)),
        })
    }
}
