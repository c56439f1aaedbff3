use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;

use crate::error::{InputError, ResolveError, UpstreamError};
use crate::transcode::PipelineError;

/// Everything a route can fail with, rendered as `{"error": "..."}`.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error(transparent)]
    Resolve(#[from] ResolveError),
    #[error("Conversion failed: {0}")]
    Pipeline(#[from] PipelineError),
    #[error("Images from {0} are not allowed")]
    ImageHostNotAllowed(String),
    #[error("Failed to fetch image: {0}")]
    ImageFetch(#[source] UpstreamError),
    #[error("The requested url is not an image")]
    NotAnImage,
    #[error("Image is larger than {0} bytes")]
    ImageTooLarge(usize),
}

impl From<InputError> for ApiError {
    fn from(error: InputError) -> Self {
        ApiError::Resolve(ResolveError::Input(error))
    }
}

#[derive(Serialize)]
struct ErrorBody {
    error: String,
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::Resolve(error) => match error {
                ResolveError::Input(_) => StatusCode::BAD_REQUEST,
                ResolveError::UpstreamUnavailable { .. } => StatusCode::SERVICE_UNAVAILABLE,
                ResolveError::Auth(_) => StatusCode::BAD_GATEWAY,
                ResolveError::NotFound(_) | ResolveError::NoMatch { .. } => StatusCode::NOT_FOUND,
                ResolveError::Upstream(UpstreamError::ToolSpawn { .. }) => {
                    StatusCode::INTERNAL_SERVER_ERROR
                }
                ResolveError::Upstream(_) => StatusCode::BAD_GATEWAY,
            },
            ApiError::Pipeline(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ApiError::ImageHostNotAllowed(_) => StatusCode::BAD_REQUEST,
            ApiError::ImageFetch(UpstreamError::Status { status, .. })
                if *status == StatusCode::NOT_FOUND =>
            {
                StatusCode::NOT_FOUND
            }
            ApiError::ImageFetch(_) | ApiError::NotAnImage | ApiError::ImageTooLarge(_) => {
                StatusCode::BAD_GATEWAY
            }
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = self.to_string();

        match &self {
            ApiError::Resolve(ResolveError::Auth(_)) => {
                tracing::error!("Upstream credentials rejected: {}", message)
            }
            _ if status.is_server_error() => tracing::error!("{:?}", self),
            _ => tracing::warn!("Request failed with {}: {}", status, message),
        }

        (status, Json(ErrorBody { error: message })).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        let cases = [
            (ApiError::from(InputError::MissingUrl), StatusCode::BAD_REQUEST),
            (
                ApiError::Resolve(ResolveError::UpstreamUnavailable {
                    attempts: 3,
                    source: UpstreamError::Status {
                        service: "YouTube",
                        status: StatusCode::TOO_MANY_REQUESTS,
                        body: String::new(),
                    },
                }),
                StatusCode::SERVICE_UNAVAILABLE,
            ),
            (
                ApiError::Resolve(ResolveError::NoMatch {
                    query: "Dua Lipa - Levitating".into(),
                }),
                StatusCode::NOT_FOUND,
            ),
            (
                ApiError::Resolve(ResolveError::Auth(UpstreamError::Auth {
                    service: "Spotify",
                    reason: "invalid_client".into(),
                })),
                StatusCode::BAD_GATEWAY,
            ),
            (
                ApiError::Resolve(ResolveError::NotFound(UpstreamError::NotFound {
                    service: "Spotify",
                    what: "track abc".into(),
                })),
                StatusCode::NOT_FOUND,
            ),
            (
                ApiError::Pipeline(PipelineError::NoOutput),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
            (
                ApiError::ImageHostNotAllowed("evil.example".into()),
                StatusCode::BAD_REQUEST,
            ),
            (ApiError::ImageTooLarge(1024), StatusCode::BAD_GATEWAY),
        ];

        for (error, expected) in cases {
            assert_eq!(error.status(), expected, "{error}");
        }
    }

    #[tokio::test]
    async fn test_error_body_is_json() {
        let response = ApiError::Resolve(ResolveError::NoMatch {
            query: "Dua Lipa - Levitating".into(),
        })
        .into_response();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);

        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(
            json["error"],
            "Could not find a matching source for \"Dua Lipa - Levitating\""
        );
    }
}
