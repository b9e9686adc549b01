/// Process-wide bootstrap and keepalive for the playback services
///
/// The adapters and the coordinator are built once and live until the process
/// exits; UI surfaces only subscribe to them. Tearing them down is reserved for
/// hard reloads and tests.
use crate::api::{HttpMediaApi, MediaApi};
use crate::backends::embed::{EmbedAdapter, EmbedHost};
use crate::backends::loader::ScriptHost;
use crate::backends::remote::{RemoteAdapter, RemoteDeviceConnector, RemoteWebApi, SpotifyWebApi};
use crate::backends::BackendRegistry;
use crate::config::Config;
use crate::error::ApiError;
use crate::events::{NoticeBus, PlayerNotice};
use crate::models::Backend;
use crate::playback::PlaybackCoordinator;
use crate::preferences::{PreferenceStore, UiPreferences};
use anyhow::Result;
use std::sync::{Arc, OnceLock};
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;

static HOST: OnceLock<Arc<PlayerHost>> = OnceLock::new();

/// Register the process-wide host. Fails if one is already installed.
pub fn install(host: Arc<PlayerHost>) -> Result<(), Arc<PlayerHost>> {
    HOST.set(host)
}

/// The installed host, if any
pub fn global() -> Option<Arc<PlayerHost>> {
    HOST.get().cloned()
}

/// Vendor bindings and REST clients the host wires together
pub struct PlayerDeps {
    pub api: Arc<dyn MediaApi>,
    pub web_api: Arc<dyn RemoteWebApi>,
    pub remote_connector: Arc<dyn RemoteDeviceConnector>,
    pub embed_host: Arc<dyn EmbedHost>,
    pub scripts: Arc<dyn ScriptHost>,
}

impl PlayerDeps {
    /// Use the HTTP media API and rspotify; the caller supplies the vendor bindings
    pub fn with_http(
        config: &Config,
        remote_connector: Arc<dyn RemoteDeviceConnector>,
        embed_host: Arc<dyn EmbedHost>,
        scripts: Arc<dyn ScriptHost>,
    ) -> Result<Self, ApiError> {
        Ok(Self {
            api: Arc::new(HttpMediaApi::new(&config.api)?),
            web_api: Arc::new(SpotifyWebApi::new()),
            remote_connector,
            embed_host,
            scripts,
        })
    }
}

pub struct PlayerHost {
    config: Config,
    coordinator: Arc<PlaybackCoordinator>,
    remote: Arc<RemoteAdapter>,
    embed: Arc<EmbedAdapter>,
    api: Arc<dyn MediaApi>,
    notices: NoticeBus,
    preferences: Option<PreferenceStore>,
    saved_preferences: Arc<Mutex<UiPreferences>>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl PlayerHost {
    /// Build every service, bring both backends up and schedule the timers
    pub async fn start(config: Config, deps: PlayerDeps) -> Result<Arc<Self>> {
        let host = Arc::new(Self::build(config, deps).await?);
        host.bring_up().await;
        host.spawn_token_refresh().await;
        host.spawn_preference_saver().await;
        tracing::info!("Player host started");
        Ok(host)
    }

    async fn build(config: Config, deps: PlayerDeps) -> Result<Self> {
        let (signals_tx, signals_rx) = mpsc::unbounded_channel();
        let notices = NoticeBus::new();

        let remote = Arc::new(RemoteAdapter::new(
            config.remote.clone(),
            deps.scripts.clone(),
            deps.remote_connector,
            deps.api.clone(),
            deps.web_api,
            signals_tx.clone(),
        ));
        let embed = Arc::new(EmbedAdapter::new(
            config.embed.clone(),
            deps.scripts,
            deps.embed_host,
            signals_tx,
        ));

        let mut registry = BackendRegistry::new();
        registry.register_remote(remote.clone());
        registry.register_embed(embed.clone());

        let coordinator = Arc::new(PlaybackCoordinator::new(
            registry,
            notices.clone(),
            config.reconcile.clone(),
        ));
        coordinator.start(signals_rx).await;

        let preferences = match config.data_dir() {
            Ok(dir) => Some(PreferenceStore::in_dir(&dir)),
            Err(e) => {
                tracing::warn!("UI preferences disabled, no data directory: {}", e);
                None
            }
        };
        let restored = match &preferences {
            Some(store) => match store.load().await {
                Ok(found) => found.unwrap_or_default(),
                Err(e) => {
                    tracing::warn!(?e, "Ignoring unreadable UI preferences");
                    UiPreferences::default()
                }
            },
            None => UiPreferences::default(),
        };
        coordinator.set_volume(restored.volume, true).await;

        Ok(Self {
            config,
            coordinator,
            remote,
            embed,
            api: deps.api,
            notices,
            preferences,
            saved_preferences: Arc::new(Mutex::new(restored)),
            tasks: Mutex::new(Vec::new()),
        })
    }

    pub fn coordinator(&self) -> Arc<PlaybackCoordinator> {
        self.coordinator.clone()
    }

    pub fn remote(&self) -> Arc<RemoteAdapter> {
        self.remote.clone()
    }

    pub fn embed(&self) -> Arc<EmbedAdapter> {
        self.embed.clone()
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Connect the remote device (when linked and entitled) and initialize
    /// the embedded player concurrently
    pub async fn bring_up(&self) {
        let remote = async {
            if self.config.remote.enabled {
                self.bring_up_remote().await;
            }
        };
        let embed = async {
            if self.config.embed.enabled {
                if let Err(e) = self.embed.initialize().await {
                    tracing::warn!(?e, "Embedded player unavailable");
                }
            }
        };
        futures::join!(remote, embed);

        // the vendors start at their own default volume
        let volume = self.coordinator.state().await.volume;
        self.coordinator.set_volume(volume, true).await;
    }

    async fn bring_up_remote(&self) {
        let status = match self.api.fetch_status().await {
            Ok(status) => status,
            Err(e) => {
                tracing::warn!(?e, "Could not read remote account status");
                return;
            }
        };
        if !status.is_connected {
            tracing::info!("No remote streaming account linked, skipping remote device");
            return;
        }
        if !status.is_premium {
            tracing::warn!("Remote streaming account is not premium");
            self.remote.mark_entitlement_failed().await;
            return;
        }

        match self.api.fetch_token().await {
            Ok(token) => {
                if !self.remote.connect(token).await {
                    tracing::warn!("Remote device did not connect");
                }
            }
            Err(ApiError::Unauthorized) => {
                self.notices.emit(PlayerNotice::ReconnectRequired {
                    message: "Remote streaming session expired".to_string(),
                });
            }
            Err(e) => tracing::warn!(?e, "Could not fetch remote access token"),
        }
    }

    /// Refetch the access token ahead of its expiry and hand it to the adapter
    async fn spawn_token_refresh(&self) {
        if !self.config.remote.enabled {
            return;
        }
        let api = self.api.clone();
        let remote = self.remote.clone();
        let notices = self.notices.clone();
        let period = self.config.api.token_refresh_interval();

        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
            loop {
                ticker.tick().await;
                if remote.readiness().await.is_premium_required {
                    continue;
                }
                match api.fetch_token().await {
                    Ok(token) => remote.set_token(token).await,
                    Err(ApiError::Unauthorized) => {
                        tracing::warn!("Token refresh rejected, user must reconnect");
                        notices.emit(PlayerNotice::ReconnectRequired {
                            message: "Remote streaming session expired".to_string(),
                        });
                    }
                    Err(e) => tracing::warn!(?e, "Token refresh failed"),
                }
            }
        });
        self.tasks.lock().await.push(task);
    }

    async fn spawn_preference_saver(&self) {
        let Some(store) = self.preferences.clone() else {
            return;
        };
        let coordinator = self.coordinator.clone();
        let saved = self.saved_preferences.clone();
        let period = self.config.reconcile.preference_save_interval();

        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
            loop {
                ticker.tick().await;
                if let Err(e) = persist_preferences(&store, &coordinator, &saved).await {
                    tracing::warn!(?e, "Failed to save UI preferences");
                }
            }
        });
        self.tasks.lock().await.push(task);
    }

    pub async fn preferences(&self) -> UiPreferences {
        self.saved_preferences.lock().await.clone()
    }

    pub async fn set_preferred_backend(&self, backend: Option<Backend>) -> Result<()> {
        self.saved_preferences.lock().await.preferred_backend = backend;
        self.save_preferences().await
    }

    pub async fn set_mini_player_expanded(&self, expanded: bool) -> Result<()> {
        self.saved_preferences.lock().await.mini_player_expanded = expanded;
        self.save_preferences().await
    }

    async fn save_preferences(&self) -> Result<()> {
        let Some(store) = &self.preferences else {
            return Ok(());
        };
        let current = self.saved_preferences.lock().await.clone();
        store.save(&current).await
    }

    /// Save preferences and stop every timer. Only for hard teardown.
    pub async fn shutdown(&self) {
        if let Some(store) = &self.preferences {
            if let Err(e) =
                persist_preferences(store, &self.coordinator, &self.saved_preferences).await
            {
                tracing::warn!(?e, "Failed to save UI preferences on shutdown");
            }
        }
        for task in self.tasks.lock().await.drain(..) {
            task.abort();
        }
        self.coordinator.shutdown().await;
        self.remote.shutdown().await;
        self.embed.shutdown().await;
        tracing::info!("Player host stopped");
    }
}

/// Write the committed volume if it differs from what is on disk
async fn persist_preferences(
    store: &PreferenceStore,
    coordinator: &PlaybackCoordinator,
    saved: &Mutex<UiPreferences>,
) -> Result<bool> {
    let state = coordinator.state().await;
    if state.is_adjusting_volume {
        return Ok(false);
    }
    let mut saved = saved.lock().await;
    if saved.volume == state.volume {
        return Ok(false);
    }
    let mut next = saved.clone();
    next.volume = state.volume;
    store.save(&next).await?;
    *saved = next;
    Ok(true)
}
