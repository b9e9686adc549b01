//! In-process fakes for the vendor clients and the REST backend
use crate::api::{MediaApi, RemoteStatus};
use crate::backends::embed::{EmbedAdapter, EmbedEvent, EmbedHost, EmbedPlayer};
use crate::backends::loader::ScriptHost;
use crate::backends::remote::{
    RemoteAdapter, RemoteDeviceClient, RemoteDeviceConnector, RemoteDeviceEvent,
    RemoteDeviceOptions, RemoteVendorState, RemoteVendorTrack, RemoteWebApi,
};
use crate::backends::BackendRegistry;
use crate::config::{EmbedConfig, ReconcileConfig, RemoteConfig};
use crate::error::{ApiError, VendorError};
use crate::events::{AdapterSignal, NoticeBus};
use crate::playback::PlaybackCoordinator;
use async_trait::async_trait;
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::{mpsc, Notify};

#[derive(Default)]
pub struct FakeScriptHost {
    injections: Mutex<Vec<String>>,
    failures_left: AtomicUsize,
}

impl FakeScriptHost {
    /// Every injection attempt, failed ones included
    pub fn injections(&self) -> Vec<String> {
        self.injections.lock().unwrap().clone()
    }

    pub fn fail_next(&self, count: usize) {
        self.failures_left.store(count, Ordering::SeqCst);
    }
}

#[async_trait]
impl ScriptHost for FakeScriptHost {
    async fn inject_script(&self, src: &str) -> Result<(), VendorError> {
        self.injections.lock().unwrap().push(src.to_string());
        let left = self.failures_left.load(Ordering::SeqCst);
        if left > 0 {
            self.failures_left.store(left - 1, Ordering::SeqCst);
            return Err(VendorError(format!("failed to load {}", src)));
        }
        Ok(())
    }
}

#[derive(Default)]
pub struct FakeMediaApi {
    status: Mutex<RemoteStatus>,
    token_fetches: AtomicUsize,
    fail_token: AtomicBool,
    fail_play: AtomicBool,
    hold_play: AtomicBool,
    play_gate: Notify,
    play_calls: Mutex<Vec<(String, String)>>,
    device: Mutex<Option<Arc<FakeRemoteClient>>>,
}

impl FakeMediaApi {
    pub fn with_status(is_connected: bool, is_premium: bool) -> Self {
        let api = Self::default();
        *api.status.lock().unwrap() = RemoteStatus {
            is_connected,
            is_premium,
        };
        api
    }

    /// Mark the fake device as playing whenever a start call succeeds
    pub fn attach_device(&self, client: Arc<FakeRemoteClient>) {
        *self.device.lock().unwrap() = Some(client);
    }

    pub fn fail_token(&self, fail: bool) {
        self.fail_token.store(fail, Ordering::SeqCst);
    }

    pub fn fail_play(&self, fail: bool) {
        self.fail_play.store(fail, Ordering::SeqCst);
    }

    /// Park start calls until [`FakeMediaApi::release_play`]
    pub fn hold_play(&self) {
        self.hold_play.store(true, Ordering::SeqCst);
    }

    pub fn release_play(&self) {
        self.hold_play.store(false, Ordering::SeqCst);
        self.play_gate.notify_one();
    }

    pub fn token_fetches(&self) -> usize {
        self.token_fetches.load(Ordering::SeqCst)
    }

    pub fn play_calls(&self) -> Vec<(String, String)> {
        self.play_calls.lock().unwrap().clone()
    }

    fn server_error() -> ApiError {
        ApiError::Status {
            status: reqwest::StatusCode::BAD_GATEWAY,
            body: "upstream unavailable".to_string(),
        }
    }
}

#[async_trait]
impl MediaApi for FakeMediaApi {
    async fn fetch_token(&self) -> Result<String, ApiError> {
        if self.fail_token.load(Ordering::SeqCst) {
            return Err(Self::server_error());
        }
        let n = self.token_fetches.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(format!("token-{}", n))
    }

    async fn fetch_status(&self) -> Result<RemoteStatus, ApiError> {
        Ok(*self.status.lock().unwrap())
    }

    async fn start_remote_playback(&self, uri: &str, device_id: &str) -> Result<(), ApiError> {
        self.play_calls
            .lock()
            .unwrap()
            .push((uri.to_string(), device_id.to_string()));
        if self.hold_play.load(Ordering::SeqCst) {
            self.play_gate.notified().await;
        }
        if self.fail_play.load(Ordering::SeqCst) {
            return Err(Self::server_error());
        }
        let device = self.device.lock().unwrap().clone();
        if let Some(device) = device {
            device.playing.store(true, Ordering::SeqCst);
        }
        Ok(())
    }
}

#[derive(Default)]
pub struct FakeWebApi {
    fail_shuffle: AtomicBool,
    shuffles: Mutex<Vec<bool>>,
    contexts: Mutex<Vec<(String, String)>>,
}

impl FakeWebApi {
    pub fn fail_shuffle(&self, fail: bool) {
        self.fail_shuffle.store(fail, Ordering::SeqCst);
    }

    pub fn shuffles(&self) -> Vec<bool> {
        self.shuffles.lock().unwrap().clone()
    }

    /// `(device_id, context_uri)` pairs
    pub fn contexts(&self) -> Vec<(String, String)> {
        self.contexts.lock().unwrap().clone()
    }
}

#[async_trait]
impl RemoteWebApi for FakeWebApi {
    async fn set_shuffle(
        &self,
        _access_token: &str,
        _device_id: &str,
        state: bool,
    ) -> Result<(), VendorError> {
        if self.fail_shuffle.load(Ordering::SeqCst) {
            return Err(VendorError("shuffle rejected".to_string()));
        }
        self.shuffles.lock().unwrap().push(state);
        Ok(())
    }

    async fn play_context(
        &self,
        _access_token: &str,
        device_id: &str,
        context_uri: &str,
    ) -> Result<(), VendorError> {
        self.contexts
            .lock()
            .unwrap()
            .push((device_id.to_string(), context_uri.to_string()));
        Ok(())
    }
}

#[derive(Default)]
pub struct FakeRemoteClient {
    connect_calls: AtomicUsize,
    fail_connect: AtomicBool,
    fail_commands: AtomicBool,
    playing: AtomicBool,
    calls: Mutex<Vec<String>>,
    volumes: Mutex<Vec<f64>>,
    seeks: Mutex<Vec<u64>>,
    state: Mutex<Option<RemoteVendorState>>,
}

impl FakeRemoteClient {
    pub fn fail_connect(&self, fail: bool) {
        self.fail_connect.store(fail, Ordering::SeqCst);
    }

    pub fn fail_commands(&self, fail: bool) {
        self.fail_commands.store(fail, Ordering::SeqCst);
    }

    pub fn connect_calls(&self) -> usize {
        self.connect_calls.load(Ordering::SeqCst)
    }

    /// Transport commands in order (pause, resume, next, previous)
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn clear_calls(&self) {
        self.calls.lock().unwrap().clear();
    }

    pub fn volumes(&self) -> Vec<f64> {
        self.volumes.lock().unwrap().clone()
    }

    pub fn seeks(&self) -> Vec<u64> {
        self.seeks.lock().unwrap().clone()
    }

    pub fn is_playing(&self) -> bool {
        self.playing.load(Ordering::SeqCst)
    }

    pub fn set_state(&self, state: Option<RemoteVendorState>) {
        *self.state.lock().unwrap() = state;
    }

    fn command(&self, name: &str) -> Result<(), VendorError> {
        if self.fail_commands.load(Ordering::SeqCst) {
            return Err(VendorError(format!("{} rejected", name)));
        }
        self.calls.lock().unwrap().push(name.to_string());
        Ok(())
    }
}

#[async_trait]
impl RemoteDeviceClient for FakeRemoteClient {
    async fn connect(&self) -> Result<bool, VendorError> {
        self.connect_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_connect.load(Ordering::SeqCst) {
            return Err(VendorError("connect refused".to_string()));
        }
        Ok(true)
    }

    async fn pause(&self) -> Result<(), VendorError> {
        self.command("pause")?;
        self.playing.store(false, Ordering::SeqCst);
        Ok(())
    }

    async fn resume(&self) -> Result<(), VendorError> {
        self.command("resume")?;
        self.playing.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn seek(&self, position_ms: u64) -> Result<(), VendorError> {
        self.seeks.lock().unwrap().push(position_ms);
        Ok(())
    }

    async fn set_volume(&self, volume: f64) -> Result<(), VendorError> {
        self.volumes.lock().unwrap().push(volume);
        Ok(())
    }

    async fn next_track(&self) -> Result<(), VendorError> {
        self.command("next")
    }

    async fn previous_track(&self) -> Result<(), VendorError> {
        self.command("previous")
    }

    async fn get_current_state(&self) -> Option<RemoteVendorState> {
        self.state.lock().unwrap().clone()
    }
}

pub struct FakeConnector {
    client: Arc<FakeRemoteClient>,
    created: AtomicUsize,
    options: Mutex<Option<RemoteDeviceOptions>>,
    events: Mutex<Option<mpsc::UnboundedSender<RemoteDeviceEvent>>>,
}

impl FakeConnector {
    pub fn new() -> Self {
        Self {
            client: Arc::new(FakeRemoteClient::default()),
            created: AtomicUsize::new(0),
            options: Mutex::new(None),
            events: Mutex::new(None),
        }
    }

    /// The single client every `create` hands out
    pub fn client(&self) -> Arc<FakeRemoteClient> {
        self.client.clone()
    }

    pub fn created_count(&self) -> usize {
        self.created.load(Ordering::SeqCst)
    }

    pub fn last_options(&self) -> Option<RemoteDeviceOptions> {
        self.options.lock().unwrap().clone()
    }

    /// Raise a vendor event as the real client would
    pub fn emit(&self, event: RemoteDeviceEvent) {
        if let Some(sender) = self.events.lock().unwrap().as_ref() {
            let _ = sender.send(event);
        }
    }
}

impl RemoteDeviceConnector for FakeConnector {
    fn create(
        &self,
        options: RemoteDeviceOptions,
        events: mpsc::UnboundedSender<RemoteDeviceEvent>,
    ) -> Arc<dyn RemoteDeviceClient> {
        self.created.fetch_add(1, Ordering::SeqCst);
        *self.options.lock().unwrap() = Some(options);
        *self.events.lock().unwrap() = Some(events);
        self.client.clone()
    }
}

#[derive(Default)]
pub struct FakeEmbedPlayer {
    missing: Mutex<HashSet<String>>,
    calls: Mutex<Vec<String>>,
    progress: Mutex<(f64, f64)>,
    playing: AtomicBool,
    fail_loads: AtomicBool,
}

impl FakeEmbedPlayer {
    pub fn fail_loads(&self, fail: bool) {
        self.fail_loads.store(fail, Ordering::SeqCst);
    }

    pub fn remove_method(&self, name: &str) {
        self.missing.lock().unwrap().insert(name.to_string());
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn set_progress(&self, position: f64, duration: f64) {
        *self.progress.lock().unwrap() = (position, duration);
    }

    pub fn is_playing(&self) -> bool {
        self.playing.load(Ordering::SeqCst)
    }

    fn record(&self, call: String) {
        self.calls.lock().unwrap().push(call);
    }
}

impl EmbedPlayer for FakeEmbedPlayer {
    fn has_method(&self, name: &str) -> bool {
        !self.missing.lock().unwrap().contains(name)
    }

    fn load_video_by_id(&self, video_id: &str) -> Result<(), VendorError> {
        if self.fail_loads.load(Ordering::SeqCst) {
            return Err(VendorError(format!("{} cannot be loaded", video_id)));
        }
        self.record(format!("loadVideoById:{}", video_id));
        self.playing.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn play_video(&self) -> Result<(), VendorError> {
        self.record("playVideo".to_string());
        self.playing.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn pause_video(&self) -> Result<(), VendorError> {
        self.record("pauseVideo".to_string());
        self.playing.store(false, Ordering::SeqCst);
        Ok(())
    }

    fn seek_to(&self, seconds: f64, _allow_seek_ahead: bool) -> Result<(), VendorError> {
        self.record(format!("seekTo:{}", seconds));
        Ok(())
    }

    fn set_volume(&self, volume: u8) -> Result<(), VendorError> {
        self.record(format!("setVolume:{}", volume));
        Ok(())
    }

    fn get_current_time(&self) -> f64 {
        self.progress.lock().unwrap().0
    }

    fn get_duration(&self) -> f64 {
        self.progress.lock().unwrap().1
    }

    fn get_player_state(&self) -> i32 {
        if self.is_playing() {
            1
        } else {
            2
        }
    }
}

/// Host whose player reports ready as soon as it is constructed
pub struct FakeEmbedHost {
    surface: AtomicBool,
    global: AtomicBool,
    created: AtomicUsize,
    player: Arc<FakeEmbedPlayer>,
    events: Mutex<Option<mpsc::UnboundedSender<EmbedEvent>>>,
}

impl FakeEmbedHost {
    pub fn new() -> Self {
        Self {
            surface: AtomicBool::new(true),
            global: AtomicBool::new(true),
            created: AtomicUsize::new(0),
            player: Arc::new(FakeEmbedPlayer::default()),
            events: Mutex::new(None),
        }
    }

    pub fn set_surface(&self, present: bool) {
        self.surface.store(present, Ordering::SeqCst);
    }

    pub fn player(&self) -> Arc<FakeEmbedPlayer> {
        self.player.clone()
    }

    pub fn created_count(&self) -> usize {
        self.created.load(Ordering::SeqCst)
    }

    pub fn emit(&self, event: EmbedEvent) {
        if let Some(sender) = self.events.lock().unwrap().as_ref() {
            let _ = sender.send(event);
        }
    }
}

impl EmbedHost for FakeEmbedHost {
    fn has_surface(&self, _element_id: &str) -> bool {
        self.surface.load(Ordering::SeqCst)
    }

    fn vendor_global_present(&self) -> bool {
        self.global.load(Ordering::SeqCst)
    }

    fn create_player(
        &self,
        _element_id: &str,
        events: mpsc::UnboundedSender<EmbedEvent>,
    ) -> Result<Arc<dyn EmbedPlayer>, VendorError> {
        self.created.fetch_add(1, Ordering::SeqCst);
        let _ = events.send(EmbedEvent::Ready);
        *self.events.lock().unwrap() = Some(events);
        Ok(self.player.clone())
    }
}

/// Vendor state for a two-artist track
pub fn vendor_state(position_ms: u64, duration_ms: u64, paused: bool) -> RemoteVendorState {
    RemoteVendorState {
        position_ms,
        duration_ms,
        paused,
        current_track: Some(RemoteVendorTrack {
            id: "t1".to_string(),
            uri: "spotify:track:t1".to_string(),
            name: "Song".to_string(),
            artists: vec!["Artist One".to_string(), "Artist Two".to_string()],
            album_image_url: Some("https://img.example.com/t1.jpg".to_string()),
            duration_ms,
        }),
    }
}

pub struct RemoteFixture {
    pub adapter: Arc<RemoteAdapter>,
    pub connector: Arc<FakeConnector>,
    pub api: Arc<FakeMediaApi>,
    pub web_api: Arc<FakeWebApi>,
    pub signals: mpsc::UnboundedReceiver<AdapterSignal>,
}

pub fn remote_fixture(api: FakeMediaApi) -> RemoteFixture {
    let (tx, signals) = mpsc::unbounded_channel();
    let api = Arc::new(api);
    let web_api = Arc::new(FakeWebApi::default());
    let connector = Arc::new(FakeConnector::new());
    let adapter = Arc::new(RemoteAdapter::new(
        RemoteConfig::default(),
        Arc::new(FakeScriptHost::default()),
        connector.clone(),
        api.clone(),
        web_api.clone(),
        tx,
    ));
    RemoteFixture {
        adapter,
        connector,
        api,
        web_api,
        signals,
    }
}

pub struct EmbedFixture {
    pub adapter: Arc<EmbedAdapter>,
    pub host: Arc<FakeEmbedHost>,
    pub scripts: Arc<FakeScriptHost>,
    pub signals: mpsc::UnboundedReceiver<AdapterSignal>,
}

pub fn embed_fixture() -> EmbedFixture {
    let (tx, signals) = mpsc::unbounded_channel();
    let host = Arc::new(FakeEmbedHost::new());
    let scripts = Arc::new(FakeScriptHost::default());
    let adapter = Arc::new(EmbedAdapter::new(
        EmbedConfig::default(),
        scripts.clone(),
        host.clone(),
        tx,
    ));
    EmbedFixture {
        adapter,
        host,
        scripts,
        signals,
    }
}

/// A coordinator over a connected remote device ("dev1") and a ready embed
pub struct Harness {
    pub coordinator: Arc<PlaybackCoordinator>,
    pub remote: Arc<RemoteAdapter>,
    pub embed: Arc<EmbedAdapter>,
    pub connector: Arc<FakeConnector>,
    pub embed_host: Arc<FakeEmbedHost>,
    pub api: Arc<FakeMediaApi>,
    pub web_api: Arc<FakeWebApi>,
    signals: tokio::sync::Mutex<Option<mpsc::UnboundedReceiver<AdapterSignal>>>,
}

impl Harness {
    /// Hand the signal feed to the coordinator and start its poller
    pub async fn start(&self) {
        if let Some(signals) = self.signals.lock().await.take() {
            self.coordinator.start(signals).await;
        }
    }

    /// Deliver pending adapter signals synchronously
    pub async fn drain_signals(&self) {
        let mut guard = self.signals.lock().await;
        let Some(signals) = guard.as_mut() else {
            return;
        };
        while let Ok(signal) = signals.try_recv() {
            self.coordinator.handle_signal(signal).await;
        }
    }
}

pub async fn harness() -> Harness {
    let (tx, mut signals) = mpsc::unbounded_channel();
    let scripts = Arc::new(FakeScriptHost::default());
    let api = Arc::new(FakeMediaApi::default());
    let web_api = Arc::new(FakeWebApi::default());
    let connector = Arc::new(FakeConnector::new());
    api.attach_device(connector.client());

    let remote = Arc::new(RemoteAdapter::new(
        RemoteConfig::default(),
        scripts.clone(),
        connector.clone(),
        api.clone(),
        web_api.clone(),
        tx.clone(),
    ));
    let embed_host = Arc::new(FakeEmbedHost::new());
    let embed = Arc::new(EmbedAdapter::new(
        EmbedConfig::default(),
        scripts,
        embed_host.clone(),
        tx,
    ));

    assert!(remote.connect("token-0".to_string()).await);
    remote
        .handle_event(RemoteDeviceEvent::Ready {
            device_id: "dev1".to_string(),
        })
        .await;
    embed.initialize().await.expect("embed initializes");
    while signals.try_recv().is_ok() {}

    let mut registry = BackendRegistry::new();
    registry.register_remote(remote.clone());
    registry.register_embed(embed.clone());
    let coordinator = Arc::new(PlaybackCoordinator::new(
        registry,
        NoticeBus::new(),
        ReconcileConfig::default(),
    ));

    Harness {
        coordinator,
        remote,
        embed,
        connector,
        embed_host,
        api,
        web_api,
        signals: tokio::sync::Mutex::new(Some(signals)),
    }
}
