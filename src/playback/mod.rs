/// Playback coordination across the remote-device and embedded backends
pub mod intent;
pub mod queue;
pub mod reconcile;
pub mod store;

use crate::backends::{BackendRegistry, PlaybackBackend};
use crate::config::ReconcileConfig;
use crate::error::PlaybackError;
use crate::events::{AdapterSignal, NoticeBus, PlayerNotice};
use crate::models::{
    Backend, EmbedReadiness, PlaybackState, RemoteReadiness, RepeatMode, StateDelta, Track,
};
use intent::{IntentClock, PlaybackSnapshot};
use queue::PlaybackQueue;
use std::sync::{Arc, Weak};
use store::StateStore;
use tokio::sync::{broadcast, mpsc, watch, Mutex};
use tokio::task::JoinHandle;

/// Restarting the current track instead of going back happens past this point
const RESTART_THRESHOLD_SECONDS: f64 = 3.0;

/// Options for [`PlaybackCoordinator::play_remote`]
#[derive(Debug, Clone, Copy, Default)]
pub struct PlayOptions {
    /// Toggle shuffle on the remote device before starting
    pub shuffle: Option<bool>,
}

/// The single control surface over both backends.
///
/// Owns the unified [`PlaybackState`]; adapters only report through
/// [`AdapterSignal`]s and never write it themselves.
pub struct PlaybackCoordinator {
    store: StateStore,
    registry: Arc<BackendRegistry>,
    intents: IntentClock,
    queue: Mutex<PlaybackQueue>,
    notices: NoticeBus,
    config: ReconcileConfig,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl PlaybackCoordinator {
    pub fn new(registry: BackendRegistry, notices: NoticeBus, config: ReconcileConfig) -> Self {
        Self {
            store: StateStore::default(),
            registry: Arc::new(registry),
            intents: IntentClock::new(),
            queue: Mutex::new(PlaybackQueue::new()),
            notices,
            config,
            tasks: Mutex::new(Vec::new()),
        }
    }

    /// Start consuming adapter signals and polling position
    pub async fn start(self: &Arc<Self>, mut signals: mpsc::UnboundedReceiver<AdapterSignal>) {
        let weak: Weak<Self> = Arc::downgrade(self);
        let signal_task = tokio::spawn(async move {
            while let Some(signal) = signals.recv().await {
                let Some(coordinator) = weak.upgrade() else {
                    break;
                };
                coordinator.handle_signal(signal).await;
            }
            tracing::debug!("Adapter signal loop finished");
        });

        let poller = reconcile::spawn_position_poller(
            self.store.clone(),
            self.registry.clone(),
            self.config.position_poll_interval(),
        );

        let mut tasks = self.tasks.lock().await;
        tasks.push(signal_task);
        tasks.push(poller);
        tracing::info!("Playback coordinator started");
    }

    pub async fn state(&self) -> PlaybackState {
        self.store.snapshot().await
    }

    /// Subscribe to unified state changes
    pub fn subscribe(&self) -> watch::Receiver<PlaybackState> {
        self.store.subscribe()
    }

    /// Subscribe to user-facing notices
    pub fn notices(&self) -> broadcast::Receiver<PlayerNotice> {
        self.notices.subscribe()
    }

    pub async fn remote_readiness(&self) -> Option<RemoteReadiness> {
        match self.registry.remote() {
            Some(remote) => Some(remote.readiness().await),
            None => None,
        }
    }

    pub async fn embed_readiness(&self) -> Option<EmbedReadiness> {
        match self.registry.embed() {
            Some(embed) => Some(embed.readiness().await),
            None => None,
        }
    }

    fn backend(&self, backend: Backend) -> Result<Arc<dyn PlaybackBackend>, PlaybackError> {
        self.registry
            .get(backend)
            .ok_or(PlaybackError::NotReady(backend))
    }

    /// Restore a snapshot unless a newer intent has taken over
    async fn rollback(&self, ticket: u64, snapshot: PlaybackSnapshot) {
        let applied = self
            .store
            .update(|s| {
                if self.intents.is_current(ticket) {
                    snapshot.restore(s);
                    true
                } else {
                    false
                }
            })
            .await;
        if applied {
            tracing::info!(
                "Rolled back to active={:?}, playing={}",
                snapshot.active_backend,
                snapshot.is_playing
            );
        } else {
            tracing::debug!("Skipping stale rollback for intent {}", ticket);
        }
    }

    /// Tell the other backend to stop at transport level.
    ///
    /// Called whenever `new_backend` is about to become active, regardless of
    /// what the state says the other backend is doing.
    pub async fn pause_inactive_service(&self, new_backend: Backend) {
        let other = new_backend.other();
        let Some(adapter) = self.registry.get(other) else {
            return;
        };
        if !adapter.has_handle().await {
            return;
        }
        match adapter.pause().await {
            Ok(()) => tracing::debug!("Paused inactive {} backend", other),
            Err(e) => tracing::debug!(?e, "Inactive {} backend did not accept pause", other),
        }
    }

    /// Play `track` on `backend`.
    ///
    /// The state switches optimistically; a failed start restores the previous
    /// track and `(active_backend, is_playing)`.
    pub async fn play_track(&self, backend: Backend, track: Track) -> Result<(), PlaybackError> {
        if backend != Backend::Embedded {
            return self.start_track(backend, track).await;
        }
        let (from, to) = {
            let mut queue = self.queue.lock().await;
            let from = queue.current_index;
            queue.focus_or_insert(&track);
            (from, queue.current_index)
        };
        self.start_queued(track, from, to).await
    }

    /// Start a track the queue cursor was just moved to (`from` -> `to`),
    /// putting the cursor back if the backend refuses it
    async fn start_queued(&self, track: Track, from: usize, to: usize) -> Result<(), PlaybackError> {
        let result = self.start_track(track.backend, track).await;
        if result.is_err() {
            let mut queue = self.queue.lock().await;
            // a newer command may already own the cursor
            if queue.current_index == to {
                queue.current_index = from;
            }
        }
        result
    }

    async fn start_track(&self, backend: Backend, track: Track) -> Result<(), PlaybackError> {
        let adapter = self.backend(backend)?;
        let ticket = self.intents.issue();

        self.pause_inactive_service(backend).await;

        let snapshot = self
            .store
            .update(|s| {
                let snapshot = PlaybackSnapshot::capture(s, true);
                s.active_backend = Some(backend);
                s.current_track = Some(track.clone());
                s.duration_seconds = track.duration_seconds;
                s.position_seconds = 0.0;
                s.is_playing = true;
                snapshot
            })
            .await;

        match adapter.start(&track).await {
            Ok(()) => {
                tracing::info!("Playing '{}' on {} backend", track.title, backend);
                Ok(())
            }
            Err(e) => {
                tracing::error!(?e, "Failed to start '{}' on {} backend", track.title, backend);
                self.rollback(ticket, snapshot).await;
                Err(e)
            }
        }
    }

    /// Start a URI or context on the remote device.
    ///
    /// `(active_backend, is_playing)` switches to the remote backend before the
    /// REST round trip; any failure restores the exact previous pair.
    pub async fn play_remote(&self, uri: &str, options: PlayOptions) -> Result<(), PlaybackError> {
        let remote = self
            .registry
            .remote()
            .ok_or(PlaybackError::NotReady(Backend::Remote))?;
        let ticket = self.intents.issue();

        let snapshot = self
            .store
            .update(|s| {
                let snapshot = PlaybackSnapshot::capture(s, false);
                s.active_backend = Some(Backend::Remote);
                s.is_playing = true;
                snapshot
            })
            .await;
        self.pause_inactive_service(Backend::Remote).await;

        match remote.start_playback(uri, options.shuffle).await {
            Ok(()) => {
                tracing::info!("Remote playback requested for {}", uri);
                Ok(())
            }
            Err(e) => {
                tracing::error!(?e, "Remote playback failed for {}", uri);
                self.rollback(ticket, snapshot).await;
                Err(e)
            }
        }
    }

    /// The active adapter, if it can take transport commands
    async fn transport_target(&self) -> Result<(Backend, Arc<dyn PlaybackBackend>), PlaybackError> {
        let active = self
            .store
            .snapshot()
            .await
            .active_backend
            .ok_or(PlaybackError::NoActiveBackend)?;
        let adapter = self.backend(active)?;
        if !adapter.has_handle().await {
            return Err(PlaybackError::NotReady(active));
        }
        Ok((active, adapter))
    }

    fn report_command_failure(&self, command: &str, error: &PlaybackError) {
        tracing::warn!(?error, "{} failed", command);
        self.notices.emit(PlayerNotice::CommandFailed {
            message: format!("{} failed: {}", command, error),
        });
    }

    /// Pause the active backend. A no-op when already paused.
    pub async fn pause(&self) -> Result<(), PlaybackError> {
        if !self.store.snapshot().await.is_playing {
            tracing::debug!("Pause requested while already paused");
            return Ok(());
        }
        let (active, adapter) = match self.transport_target().await {
            Ok(target) => target,
            Err(e) => {
                tracing::warn!("Ignoring pause: {}", e);
                return Ok(());
            }
        };
        self.intents.issue();

        if let Err(e) = adapter.pause().await {
            self.report_command_failure("Pause", &e);
            return Err(e);
        }
        self.store
            .update(|s| {
                if s.active_backend == Some(active) {
                    s.is_playing = false;
                }
            })
            .await;
        Ok(())
    }

    /// Resume the active backend. A no-op when already playing.
    pub async fn resume(&self) -> Result<(), PlaybackError> {
        if self.store.snapshot().await.is_playing {
            tracing::debug!("Resume requested while already playing");
            return Ok(());
        }
        let (active, adapter) = match self.transport_target().await {
            Ok(target) => target,
            Err(e) => {
                tracing::warn!("Ignoring resume: {}", e);
                return Ok(());
            }
        };
        self.intents.issue();

        if let Err(e) = adapter.resume().await {
            self.report_command_failure("Resume", &e);
            return Err(e);
        }
        self.store
            .update(|s| {
                if s.active_backend == Some(active) {
                    s.is_playing = true;
                }
            })
            .await;
        Ok(())
    }

    /// Seek the active backend. The position is written immediately and the
    /// seek lock released; the vendor call is not awaited for confirmation.
    pub async fn seek(&self, seconds: f64) {
        let seconds = seconds.max(0.0);
        self.store
            .update(|s| {
                s.position_seconds = if s.duration_seconds > 0.0 {
                    seconds.min(s.duration_seconds)
                } else {
                    seconds
                };
                s.is_seeking = false;
            })
            .await;

        let adapter = match self.transport_target().await {
            Ok((_, adapter)) => adapter,
            Err(e) => {
                tracing::warn!("Ignoring seek: {}", e);
                return;
            }
        };
        if let Err(e) = adapter.seek(seconds).await {
            self.report_command_failure("Seek", &e);
        }
    }

    /// Update the volume (0-100).
    ///
    /// The displayed value always changes; the backends only hear about it when
    /// no volume drag is in progress or `force_commit` ends the drag.
    pub async fn set_volume(&self, value: u8, force_commit: bool) {
        let value = value.min(100);
        let forward = self
            .store
            .update(|s| {
                s.volume = value;
                let forward = reconcile::should_forward_volume(s.is_adjusting_volume, force_commit);
                if force_commit {
                    s.is_adjusting_volume = false;
                }
                forward
            })
            .await;
        if !forward {
            return;
        }

        for adapter in self.registry.get_all() {
            if !adapter.has_handle().await {
                continue;
            }
            if let Err(e) = adapter.set_volume(value).await {
                tracing::debug!(?e, "{} backend did not accept volume", adapter.kind());
            }
        }
    }

    /// Drag lock for the seek slider
    pub async fn set_is_seeking(&self, seeking: bool) {
        self.store.update(|s| s.is_seeking = seeking).await;
    }

    /// Drag lock for the volume slider
    pub async fn set_is_adjusting_volume(&self, adjusting: bool) {
        self.store.update(|s| s.is_adjusting_volume = adjusting).await;
    }

    /// Skip forward: vendor queue for the remote device, local queue otherwise
    pub async fn next(&self) -> Result<(), PlaybackError> {
        let active = self.store.snapshot().await.active_backend;
        if active == Some(Backend::Remote) {
            let remote = self
                .registry
                .remote()
                .ok_or(PlaybackError::NotReady(Backend::Remote))?;
            return remote.next().await.map_err(|e| {
                self.report_command_failure("Next", &e);
                e
            });
        }

        let (upcoming, from, to) = {
            let mut queue = self.queue.lock().await;
            let from = queue.current_index;
            let wrap = queue.repeat_mode == RepeatMode::All;
            let upcoming = queue.next_track(wrap).cloned();
            (upcoming, from, queue.current_index)
        };
        match upcoming {
            Some(track) => self.start_queued(track, from, to).await,
            None => {
                tracing::debug!("Next requested at the end of the queue");
                Ok(())
            }
        }
    }

    /// Skip back; restarts the current embedded track when past a few seconds
    pub async fn previous(&self) -> Result<(), PlaybackError> {
        let state = self.store.snapshot().await;
        if state.active_backend == Some(Backend::Remote) {
            let remote = self
                .registry
                .remote()
                .ok_or(PlaybackError::NotReady(Backend::Remote))?;
            return remote.previous().await.map_err(|e| {
                self.report_command_failure("Previous", &e);
                e
            });
        }

        if state.position_seconds > RESTART_THRESHOLD_SECONDS {
            self.seek(0.0).await;
            return Ok(());
        }
        let (earlier, from, to) = {
            let mut queue = self.queue.lock().await;
            let from = queue.current_index;
            let earlier = queue.previous().cloned();
            (earlier, from, queue.current_index)
        };
        match earlier {
            Some(track) => self.start_queued(track, from, to).await,
            None => {
                self.seek(0.0).await;
                Ok(())
            }
        }
    }

    /// Append tracks to the local queue
    pub async fn queue_tracks(&self, tracks: Vec<Track>) {
        let mut queue = self.queue.lock().await;
        queue.add_tracks(tracks);
        tracing::debug!("Queue now holds {} tracks", queue.len());
    }

    pub async fn clear_queue(&self) {
        self.queue.lock().await.clear();
    }

    pub async fn queued_tracks(&self) -> Vec<Track> {
        self.queue.lock().await.tracks.clone()
    }

    pub async fn set_repeat_mode(&self, mode: RepeatMode) {
        self.queue.lock().await.repeat_mode = mode;
    }

    pub async fn repeat_mode(&self) -> RepeatMode {
        self.queue.lock().await.repeat_mode
    }

    /// Flip local queue shuffle; returns the new setting
    pub async fn toggle_shuffle(&self) -> bool {
        let mut queue = self.queue.lock().await;
        let enabled = !queue.is_shuffled();
        queue.set_shuffle(enabled);
        enabled
    }

    /// React to one adapter signal
    pub async fn handle_signal(self: &Arc<Self>, signal: AdapterSignal) {
        match signal {
            AdapterSignal::Readiness { backend, ready } => {
                tracing::info!("{} backend readiness changed: {}", backend, ready);
                if !ready {
                    self.store
                        .update(|s| {
                            if s.active_backend == Some(backend) {
                                s.is_playing = false;
                            }
                        })
                        .await;
                }
            }
            AdapterSignal::State { backend, delta } => self.apply_delta(backend, delta).await,
            AdapterSignal::TrackEnded { backend } => self.on_track_ended(backend).await,
            AdapterSignal::PlaybackError { backend, kind } => {
                let state = self.store.snapshot().await;
                if state.active_backend != Some(backend) {
                    tracing::debug!("Ignoring {} error from inactive {} backend", kind, backend);
                    return;
                }
                let track_id = state.current_track.as_ref().map(|t| t.id.clone());
                if kind.is_auto_skippable() {
                    tracing::info!("Skipping unplayable track {:?}: {}", track_id, kind);
                    self.notices.emit(PlayerNotice::TrackSkipped {
                        track_id,
                        reason: kind,
                    });
                    self.schedule_auto_skip().await;
                } else {
                    tracing::error!("Playback failed for {:?}: {}", track_id, kind);
                    self.notices.emit(PlayerNotice::PlaybackFailed {
                        track_id,
                        reason: kind,
                    });
                    self.store
                        .update(|s| {
                            if s.active_backend == Some(backend) {
                                s.is_playing = false;
                            }
                        })
                        .await;
                }
            }
            AdapterSignal::Notice(notice) => self.notices.emit(notice),
        }
    }

    async fn apply_delta(&self, backend: Backend, delta: StateDelta) {
        let state = self.store.snapshot().await;
        match state.active_backend {
            Some(active) if active == backend => {
                self.store
                    .update(|s| {
                        if s.active_backend != Some(backend) {
                            return;
                        }
                        Self::merge_delta(s, &delta);
                    })
                    .await;
            }
            None if delta.is_playing == Some(true) => {
                // playback started outside this session, e.g. from another app
                tracing::info!("Adopting {} backend as active", backend);
                self.intents.issue();
                self.pause_inactive_service(backend).await;
                self.store
                    .update(|s| {
                        s.active_backend = Some(backend);
                        Self::merge_delta(s, &delta);
                    })
                    .await;
            }
            _ if delta.is_playing == Some(true) => {
                tracing::warn!(
                    "Inactive {} backend reports playing, pausing it",
                    backend
                );
                if let Some(adapter) = self.registry.get(backend) {
                    if let Err(e) = adapter.pause().await {
                        tracing::debug!(?e, "Could not pause inactive {} backend", backend);
                    }
                }
            }
            _ => {}
        }
    }

    /// Positions are ignored here; only the poller writes them
    fn merge_delta(state: &mut PlaybackState, delta: &StateDelta) {
        if let Some(playing) = delta.is_playing {
            state.is_playing = playing;
        }
        if let Some(track) = &delta.track {
            if state.current_track.as_ref() != Some(track) {
                state.current_track = Some(track.clone());
            }
        }
        if let Some(duration) = delta.duration_seconds.filter(|d| *d > 0.0) {
            state.duration_seconds = duration;
        }
    }

    async fn on_track_ended(&self, backend: Backend) {
        if self.store.snapshot().await.active_backend != Some(backend) {
            return;
        }
        self.notices.emit(PlayerNotice::TrackCompleted { backend });

        let (upcoming, from, to) = {
            let mut queue = self.queue.lock().await;
            let from = queue.current_index;
            let upcoming = queue.advance_on_end();
            (upcoming, from, queue.current_index)
        };
        match upcoming {
            Some(track) => {
                if let Err(e) = self.start_queued(track, from, to).await {
                    self.report_command_failure("Advancing the queue", &e);
                }
            }
            None => {
                tracing::info!("Queue finished");
                self.store
                    .update(|s| {
                        s.is_playing = false;
                        s.position_seconds = s.duration_seconds;
                    })
                    .await;
            }
        }
    }

    /// Skip forward after a short delay unless the user acts first
    async fn schedule_auto_skip(self: &Arc<Self>) {
        let coordinator = Arc::downgrade(self);
        let delay = self.config.auto_skip_delay();
        let ticket = self.intents.latest();
        let task = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let Some(coordinator) = coordinator.upgrade() else {
                return;
            };
            if !coordinator.intents.is_current(ticket) {
                tracing::debug!("Auto-skip superseded by a newer command");
                return;
            }
            if let Err(e) = coordinator.next().await {
                tracing::warn!(?e, "Auto-skip could not advance");
            }
        });
        let mut tasks = self.tasks.lock().await;
        tasks.retain(|t| !t.is_finished());
        tasks.push(task);
    }

    /// Abort the poller and signal loop. Only for hard teardown.
    pub async fn shutdown(&self) {
        for task in self.tasks.lock().await.drain(..) {
            task.abort();
        }
        tracing::info!("Playback coordinator stopped");
    }
}
