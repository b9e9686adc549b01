/// Client for the application's own `/media/spotify/*` endpoints
use crate::config::ApiConfig;
use crate::error::ApiError;
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use url::Url;

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TokenResponse {
    access_token: String,
}

/// Whether the user linked a remote streaming account, and its tier
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteStatus {
    pub is_connected: bool,
    pub is_premium: bool,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct StartPlaybackRequest<'a> {
    uri: &'a str,
    device_id: &'a str,
}

/// The REST half of the remote backend
#[async_trait]
pub trait MediaApi: Send + Sync {
    /// `GET media/spotify/token`
    async fn fetch_token(&self) -> Result<String, ApiError>;

    /// `GET media/spotify/status`
    async fn fetch_status(&self) -> Result<RemoteStatus, ApiError>;

    /// `POST media/spotify/play` with `{ uri, deviceId }`
    async fn start_remote_playback(&self, uri: &str, device_id: &str) -> Result<(), ApiError>;
}

/// reqwest-backed implementation of [`MediaApi`]
pub struct HttpMediaApi {
    base_url: Url,
    session_token: Option<String>,
    client: Client,
}

impl HttpMediaApi {
    pub fn new(config: &ApiConfig) -> Result<Self, ApiError> {
        let client = Client::builder()
            .timeout(config.request_timeout())
            .build()?;
        Ok(Self {
            base_url: Self::normalize_base(&config.base_url)?,
            session_token: config.session_token.clone(),
            client,
        })
    }

    /// Join needs a trailing slash or the last path segment is dropped
    fn normalize_base(base: &str) -> Result<Url, ApiError> {
        if base.ends_with('/') {
            Ok(Url::parse(base)?)
        } else {
            Ok(Url::parse(&format!("{}/", base))?)
        }
    }

    fn endpoint(&self, path: &str) -> Result<Url, ApiError> {
        Ok(self.base_url.join(path)?)
    }

    fn authorize(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.session_token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    async fn check(response: reqwest::Response) -> Result<reqwest::Response, ApiError> {
        let status = response.status();
        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            return Err(ApiError::Unauthorized);
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ApiError::Status { status, body });
        }
        Ok(response)
    }
}

#[async_trait]
impl MediaApi for HttpMediaApi {
    async fn fetch_token(&self) -> Result<String, ApiError> {
        let url = self.endpoint("media/spotify/token")?;
        let response = self.authorize(self.client.get(url)).send().await?;
        let data: TokenResponse = Self::check(response).await?.json().await?;
        tracing::debug!("Fetched remote access token (len={})", data.access_token.len());
        Ok(data.access_token)
    }

    async fn fetch_status(&self) -> Result<RemoteStatus, ApiError> {
        let url = self.endpoint("media/spotify/status")?;
        let response = self.authorize(self.client.get(url)).send().await?;
        let status: RemoteStatus = Self::check(response).await?.json().await?;
        tracing::info!(
            "Remote account status: connected={}, premium={}",
            status.is_connected,
            status.is_premium
        );
        Ok(status)
    }

    async fn start_remote_playback(&self, uri: &str, device_id: &str) -> Result<(), ApiError> {
        let url = self.endpoint("media/spotify/play")?;
        let body = StartPlaybackRequest { uri, device_id };
        let response = self
            .authorize(self.client.post(url).json(&body))
            .send()
            .await?;
        // 204 No Content is the usual answer
        Self::check(response).await?;
        tracing::info!("Remote playback started for {} on device {}", uri, device_id);
        Ok(())
    }
}
