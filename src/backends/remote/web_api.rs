/// Native Spotify Web API calls issued against the remote device
use crate::error::VendorError;
use async_trait::async_trait;
use chrono::{Duration as ChronoDuration, Utc};
use rspotify::model::{AlbumId, ArtistId, PlayContextId, PlaylistId, ShowId};
use rspotify::{prelude::*, AuthCodeSpotify, Token};

/// Kind of a playable context URI
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContextKind {
    Playlist,
    Album,
    Artist,
    Show,
}

/// Classify a `spotify:<kind>:<id>` URI; tracks and episodes are not contexts
pub fn context_kind(uri: &str) -> Option<ContextKind> {
    let mut parts = uri.split(':');
    if parts.next() != Some("spotify") {
        return None;
    }
    match parts.next()? {
        "playlist" => Some(ContextKind::Playlist),
        "album" => Some(ContextKind::Album),
        "artist" => Some(ContextKind::Artist),
        "show" => Some(ContextKind::Show),
        _ => None,
    }
}

/// The vendor's own REST surface, authenticated with the bearer token
#[async_trait]
pub trait RemoteWebApi: Send + Sync {
    async fn set_shuffle(
        &self,
        access_token: &str,
        device_id: &str,
        state: bool,
    ) -> Result<(), VendorError>;

    async fn play_context(
        &self,
        access_token: &str,
        device_id: &str,
        context_uri: &str,
    ) -> Result<(), VendorError>;
}

/// rspotify-backed implementation
#[derive(Debug, Default, Clone)]
pub struct SpotifyWebApi;

impl SpotifyWebApi {
    pub fn new() -> Self {
        Self
    }

    /// Build a short-lived client around a token fetched from our backend
    fn client_for(access_token: &str) -> AuthCodeSpotify {
        let token = Token {
            access_token: access_token.to_string(),
            expires_in: ChronoDuration::minutes(55),
            expires_at: Some(Utc::now() + ChronoDuration::minutes(55)),
            refresh_token: None,
            scopes: Default::default(),
        };
        AuthCodeSpotify::from_token(token)
    }
}

#[async_trait]
impl RemoteWebApi for SpotifyWebApi {
    async fn set_shuffle(
        &self,
        access_token: &str,
        device_id: &str,
        state: bool,
    ) -> Result<(), VendorError> {
        let client = Self::client_for(access_token);
        client
            .shuffle(state, Some(device_id))
            .await
            .map_err(|e| VendorError(format!("Failed to toggle shuffle: {}", e)))
    }

    async fn play_context(
        &self,
        access_token: &str,
        device_id: &str,
        context_uri: &str,
    ) -> Result<(), VendorError> {
        let kind = context_kind(context_uri)
            .ok_or_else(|| VendorError(format!("Not a context URI: {}", context_uri)))?;
        let invalid = |e: rspotify::model::IdError| {
            VendorError(format!("Invalid context URI {}: {}", context_uri, e))
        };
        let context = match kind {
            ContextKind::Playlist => {
                PlayContextId::Playlist(PlaylistId::from_uri(context_uri).map_err(invalid)?)
            }
            ContextKind::Album => {
                PlayContextId::Album(AlbumId::from_uri(context_uri).map_err(invalid)?)
            }
            ContextKind::Artist => {
                PlayContextId::Artist(ArtistId::from_uri(context_uri).map_err(invalid)?)
            }
            ContextKind::Show => PlayContextId::Show(ShowId::from_uri(context_uri).map_err(invalid)?),
        };

        let client = Self::client_for(access_token);
        client
            .start_context_playback(context, Some(device_id), None, None)
            .await
            .map_err(|e| VendorError(format!("Failed to start context playback: {}", e)))?;
        tracing::info!("Started context {} on device {}", context_uri, device_id);
        Ok(())
    }
}
