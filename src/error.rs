use std::time::Duration;

use reqwest::StatusCode;

use crate::retry::RetryError;

/// Result of an outbound call after the retry policy has run.
pub type UpstreamResult<T> = Result<T, RetryError<UpstreamError>>;

/// The caller sent something we can never serve; not retried.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum InputError {
    #[error("Missing URL")]
    MissingUrl,
    #[error("Malformed URL: {0}")]
    MalformedUrl(String),
    #[error("Unsupported URL, expected a YouTube video or a Spotify track: {0}")]
    UnsupportedPlatform(String),
    #[error("Invalid request: {0}")]
    Invalid(String),
}

/// A failed call to one of the external collaborators.
#[derive(Debug, thiserror::Error)]
pub enum UpstreamError {
    #[error("Failed to send {service} request: {source}")]
    Network {
        service: &'static str,
        #[source]
        source: reqwest::Error,
    },
    #[error("{service} responded with {status}: {body}")]
    Status {
        service: &'static str,
        status: StatusCode,
        body: String,
    },
    #[error("{service} rejected the configured credentials: {reason}")]
    Auth {
        service: &'static str,
        reason: String,
    },
    #[error("{service} has no {what}")]
    NotFound {
        service: &'static str,
        what: String,
    },
    #[error("Failed to parse {service} response: {reason}")]
    Decode {
        service: &'static str,
        reason: String,
    },
    #[error("Failed to run {tool}: {source}")]
    ToolSpawn {
        tool: &'static str,
        #[source]
        source: std::io::Error,
    },
    #[error("{tool} timed out after {timeout:?}")]
    ToolTimeout {
        tool: &'static str,
        timeout: Duration,
    },
    #[error("{tool} exited with {code:?}: {stderr}")]
    ToolFailed {
        tool: &'static str,
        code: Option<i32>,
        stderr: String,
        /// The tool reported a rate limit or server error from its upstream
        transient: bool,
    },
}

impl UpstreamError {
    pub fn network(service: &'static str, source: reqwest::Error) -> Self {
        UpstreamError::Network { service, source }
    }

    /// Network-level failures, HTTP 429 and HTTP 5xx are worth retrying;
    /// everything else will fail the same way again.
    pub fn is_retryable(&self) -> bool {
        match self {
            UpstreamError::Network { source, .. } => !source.is_decode() && !source.is_builder(),
            UpstreamError::Status { status, .. } => {
                *status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error()
            }
            UpstreamError::ToolTimeout { .. } => true,
            UpstreamError::ToolFailed { transient, .. } => *transient,
            UpstreamError::Auth { .. }
            | UpstreamError::NotFound { .. }
            | UpstreamError::Decode { .. }
            | UpstreamError::ToolSpawn { .. } => false,
        }
    }
}

/// Everything that can go wrong turning a URL into a playable source.
#[derive(Debug, thiserror::Error)]
pub enum ResolveError {
    #[error(transparent)]
    Input(#[from] InputError),
    #[error("Upstream unavailable after {attempts} attempts: {source}")]
    UpstreamUnavailable {
        attempts: u32,
        #[source]
        source: UpstreamError,
    },
    #[error("Service misconfigured: {0}")]
    Auth(#[source] UpstreamError),
    #[error("Not found: {0}")]
    NotFound(#[source] UpstreamError),
    #[error(transparent)]
    Upstream(UpstreamError),
    #[error("Could not find a matching source for \"{query}\"")]
    NoMatch { query: String },
}

impl From<RetryError<UpstreamError>> for ResolveError {
    fn from(error: RetryError<UpstreamError>) -> Self {
        match error {
            RetryError::Exhausted { attempts, source } => {
                ResolveError::UpstreamUnavailable { attempts, source }
            }
            RetryError::Terminal(error @ UpstreamError::Auth { .. }) => ResolveError::Auth(error),
            RetryError::Terminal(error @ UpstreamError::NotFound { .. }) => {
                ResolveError::NotFound(error)
            }
            RetryError::Terminal(error) => ResolveError::Upstream(error),
        }
    }
}

/// Map a non-success HTTP response into the matching [`UpstreamError`].
pub async fn error_for_response(
    service: &'static str,
    response: reqwest::Response,
) -> UpstreamError {
    let status = response.status();
    let body = response
        .text()
        .await
        .unwrap_or_else(|_| "Failed to get error text".to_string());
    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => UpstreamError::Auth {
            service,
            reason: body,
        },
        _ => UpstreamError::Status {
            service,
            status,
            body,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn status(status: StatusCode) -> UpstreamError {
        UpstreamError::Status {
            service: "test",
            status,
            body: String::new(),
        }
    }

    #[test]
    fn test_status_classification() {
        assert!(status(StatusCode::TOO_MANY_REQUESTS).is_retryable());
        assert!(status(StatusCode::INTERNAL_SERVER_ERROR).is_retryable());
        assert!(status(StatusCode::SERVICE_UNAVAILABLE).is_retryable());
        assert!(!status(StatusCode::NOT_FOUND).is_retryable());
        assert!(!status(StatusCode::BAD_REQUEST).is_retryable());
    }

    #[test]
    fn test_tool_classification() {
        let rate_limited = UpstreamError::ToolFailed {
            tool: "yt-dlp",
            code: Some(1),
            stderr: "HTTP Error 429".into(),
            transient: true,
        };
        let unavailable = UpstreamError::ToolFailed {
            tool: "yt-dlp",
            code: Some(1),
            stderr: "Video unavailable".into(),
            transient: false,
        };
        let timeout = UpstreamError::ToolTimeout {
            tool: "yt-dlp",
            timeout: Duration::from_secs(1),
        };
        assert!(rate_limited.is_retryable());
        assert!(!unavailable.is_retryable());
        assert!(timeout.is_retryable());
    }

    #[test]
    fn test_auth_is_terminal() {
        let error = UpstreamError::Auth {
            service: "Spotify",
            reason: "invalid_client".into(),
        };
        assert!(!error.is_retryable());
        assert!(matches!(
            ResolveError::from(RetryError::Terminal(error)),
            ResolveError::Auth(_)
        ));
    }

    #[test]
    fn test_exhausted_becomes_upstream_unavailable() {
        let error = RetryError::Exhausted {
            attempts: 3,
            source: status(StatusCode::BAD_GATEWAY),
        };
        assert!(matches!(
            ResolveError::from(error),
            ResolveError::UpstreamUnavailable { attempts: 3, .. }
        ));
    }

    #[test]
    fn test_terminal_not_found_maps_to_not_found() {
        let error = UpstreamError::NotFound {
            service: "Spotify",
            what: "track abc".into(),
        };
        assert!(matches!(
            ResolveError::from(RetryError::Terminal(error)),
            ResolveError::NotFound(_)
        ));
    }
}
