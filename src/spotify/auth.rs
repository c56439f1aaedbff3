use std::time::Duration;

use reqwest::StatusCode;

use crate::error::{UpstreamError, error_for_response};
use crate::spotify::types::SpotifyTokenResponse;

pub const SPOTIFY_TOKEN_URL: &str = "https://accounts.spotify.com/api/token";
const SERVICE: &str = "Spotify accounts";

#[derive(Clone)]
pub struct SpotifyApiCredentials {
    client_id: String,
    client_secret: String,
}

impl SpotifyApiCredentials {
    pub fn new(client_id: String, client_secret: String) -> Self {
        Self {
            client_id,
            client_secret,
        }
    }

    pub fn client_id(&self) -> &str {
        &self.client_id
    }
}

// Keep the secret out of logs
impl std::fmt::Debug for SpotifyApiCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SpotifyApiCredentials")
            .field("client_id", &self.client_id)
            .finish_non_exhaustive()
    }
}

/// Exchange the app credentials for an access token (client credentials flow)
/// https://developer.spotify.com/documentation/web-api/tutorials/client-credentials-flow
pub async fn request_client_credentials_token(
    client: &reqwest::Client,
    credentials: &SpotifyApiCredentials,
    timeout: Duration,
) -> Result<SpotifyTokenResponse, UpstreamError> {
    let response = client
        .post(SPOTIFY_TOKEN_URL)
        // Serializes to x-www-form-urlencoded and sets the header (as required by spotify)
        .form(&[("grant_type", "client_credentials")])
        .basic_auth(&credentials.client_id, Some(&credentials.client_secret))
        .timeout(timeout)
        .send()
        .await
        .map_err(|error| UpstreamError::network(SERVICE, error))?;

    if !response.status().is_success() {
        return Err(classify_token_error(error_for_response(SERVICE, response).await));
    }

    response
        .json()
        .await
        .map_err(|error| UpstreamError::Decode {
            service: SERVICE,
            reason: error.to_string(),
        })
}

/// Spotify answers bad client credentials with 400 `invalid_client`.
fn classify_token_error(error: UpstreamError) -> UpstreamError {
    match error {
        UpstreamError::Status {
            service,
            status: StatusCode::BAD_REQUEST,
            body,
        } => UpstreamError::Auth {
            service,
            reason: body,
        },
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bad_request_is_auth_error() {
        let error = classify_token_error(UpstreamError::Status {
            service: SERVICE,
            status: StatusCode::BAD_REQUEST,
            body: r#"{"error":"invalid_client"}"#.into(),
        });
        assert!(matches!(error, UpstreamError::Auth { .. }));
        assert!(!error.is_retryable());
    }

    #[test]
    fn test_server_error_stays_retryable() {
        let error = classify_token_error(UpstreamError::Status {
            service: SERVICE,
            status: StatusCode::BAD_GATEWAY,
            body: String::new(),
        });
        assert!(error.is_retryable());
    }

    #[test]
    fn test_debug_hides_secret() {
        let credentials = SpotifyApiCredentials::new("id".into(), "hunter2".into());
        let debug = format!("{credentials:?}");
        assert!(debug.contains("id"));
        assert!(!debug.contains("hunter2"));
    }
}
