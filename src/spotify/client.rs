use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use reqwest::StatusCode;
use tracing::instrument;

use crate::error::{UpstreamError, UpstreamResult, error_for_response};
use crate::ports::spotify::{SpotifyApiTrack, TrackMetadataSource};
use crate::retry::{RetryError, RetryPolicy, with_retry};
use crate::spotify::auth::{SpotifyApiCredentials, request_client_credentials_token};
use crate::spotify::token_cache::TokenCache;
use crate::spotify::types::SpotifyTrack;

const SPOTIFY_API_URL: &str = "https://api.spotify.com/v1";
const SERVICE: &str = "Spotify";

/// Spotify Web API client using the client credentials flow
pub struct SpotifyClient {
    client: reqwest::Client,
    credentials: SpotifyApiCredentials,
    tokens: Arc<TokenCache>,
    retry: RetryPolicy,
    timeout: Duration,
}

impl SpotifyClient {
    pub fn new(
        client: reqwest::Client,
        credentials: SpotifyApiCredentials,
        tokens: Arc<TokenCache>,
        retry: RetryPolicy,
        timeout: Duration,
    ) -> Self {
        Self {
            client,
            credentials,
            tokens,
            retry,
            timeout,
        }
    }

    /// Cached token, or a fresh one from the accounts service.
    async fn access_token(&self) -> UpstreamResult<String> {
        if let Some(token) = self.tokens.get() {
            return Ok(token);
        }

        tracing::debug!("Spotify token missing or expired, requesting a new one");
        let requested_at = Instant::now();
        let response = with_retry(
            &self.retry,
            "Spotify token exchange",
            || request_client_credentials_token(&self.client, &self.credentials, self.timeout),
            UpstreamError::is_retryable,
        )
        .await?;

        self.tokens.set(
            response.access_token.clone(),
            requested_at + Duration::from_secs(response.expires_in),
        );
        Ok(response.access_token)
    }

    async fn fetch_track(&self, token: &str, track_id: &str) -> UpstreamResult<SpotifyTrack> {
        with_retry(
            &self.retry,
            "Spotify track lookup",
            || async {
                let response = self
                    .client
                    .get(format!("{SPOTIFY_API_URL}/tracks/{track_id}"))
                    .bearer_auth(token)
                    .timeout(self.timeout)
                    .send()
                    .await
                    .map_err(|error| UpstreamError::network(SERVICE, error))?;

                match response.status() {
                    status if status.is_success() => {
                        response
                            .json::<SpotifyTrack>()
                            .await
                            .map_err(|error| UpstreamError::Decode {
                                service: SERVICE,
                                reason: error.to_string(),
                            })
                    }
                    // Spotify also answers 400 for ids that are not valid base62
                    StatusCode::NOT_FOUND | StatusCode::BAD_REQUEST => {
                        Err(UpstreamError::NotFound {
                            service: SERVICE,
                            what: format!("track {track_id}"),
                        })
                    }
                    _ => Err(error_for_response(SERVICE, response).await),
                }
            },
            UpstreamError::is_retryable,
        )
        .await
    }
}

/// Run `fetch` with the current token. A rejected token may have been revoked
/// before its expiry, so the cache is cleared and `fetch` runs once more with
/// a fresh token.
async fn with_token_refresh<T, TokenFn, TokenFut, FetchFn, FetchFut>(
    tokens: &TokenCache,
    access_token: TokenFn,
    mut fetch: FetchFn,
) -> UpstreamResult<T>
where
    TokenFn: Fn() -> TokenFut,
    TokenFut: Future<Output = UpstreamResult<String>>,
    FetchFn: FnMut(String) -> FetchFut,
    FetchFut: Future<Output = UpstreamResult<T>>,
{
    let token = access_token().await?;
    match fetch(token).await {
        Err(RetryError::Terminal(UpstreamError::Auth { .. })) => {
            tracing::info!("Spotify rejected the cached token, refreshing");
            tokens.clear();
            let token = access_token().await?;
            fetch(token).await
        }
        other => other,
    }
}

#[async_trait::async_trait]
impl TrackMetadataSource for SpotifyClient {
    #[instrument(skip(self))]
    async fn track(&self, track_id: &str) -> UpstreamResult<SpotifyApiTrack> {
        let track = with_token_refresh(
            &self.tokens,
            || self.access_token(),
            |token| async move { self.fetch_track(&token, track_id).await },
        )
        .await?;

        tracing::debug!(
            "Spotify track {}: '{}' by '{}' ({} ms)",
            track.id,
            track.name,
            track
                .artists
                .iter()
                .map(|a| a.name.as_str())
                .collect::<Vec<_>>()
                .join(", "),
            track.duration_ms
        );
        Ok(track.into())
    }
}

/// Stand-in used when no Spotify credentials are configured, so YouTube
/// conversions keep working and Spotify URLs fail with a clear message.
pub struct UnconfiguredSpotify;

#[async_trait::async_trait]
impl TrackMetadataSource for UnconfiguredSpotify {
    async fn track(&self, _track_id: &str) -> UpstreamResult<SpotifyApiTrack> {
        Err(RetryError::Terminal(UpstreamError::Auth {
            service: SERVICE,
            reason: "no client id/secret configured (set SPOTIFY_CLIENT_ID and SPOTIFY_CLIENT_SECRET)"
                .to_string(),
        }))
    }
}
