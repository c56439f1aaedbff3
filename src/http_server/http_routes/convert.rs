use std::sync::Arc;

use axum::{
    Json,
    body::Body,
    extract::{State, rejection::JsonRejection},
    http::{HeaderMap, HeaderName, HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
};
use futures::{StreamExt, stream};
use serde::Deserialize;

use crate::error::InputError;
use crate::matching::Selection;
use crate::http_server::{
    error::ApiError,
    http_routes::{attachment, sanitize_filename},
    state::AppState,
};
use crate::transcode::{PipelineError, ProcessSpec, TranscodePipeline};

static MATCH_KIND: HeaderName = HeaderName::from_static("x-match-kind");

#[derive(Debug, Deserialize)]
pub struct ConvertRequest {
    #[serde(default)]
    pub url: String,
    pub title: Option<String>,
}

/// Resolve the url and stream it back as WAV.
#[axum::debug_handler]
pub async fn convert(
    State(app_state): State<Arc<AppState>>,
    payload: Result<Json<ConvertRequest>, JsonRejection>,
) -> Result<Response, ApiError> {
    let Json(request) = payload.map_err(InputError::from)?;
    tracing::info!("Converting {}", request.url);

    let source = app_state
        .resolver
        .resolve(&request.url, request.title.as_deref())
        .await?;

    let tools = &app_state.config.tools;
    let pipeline = TranscodePipeline::spawn(
        &ProcessSpec::extractor(tools, &source.url),
        &ProcessSpec::transcoder(tools),
        tools.idle_timeout,
    )?;

    // Wait for audio before committing to a 200 so early failures get a real status
    let mut audio = Box::pin(pipeline.into_stream());
    let first = match audio.next().await {
        Some(Ok(chunk)) => chunk,
        Some(Err(error)) => return Err(error.into()),
        None => return Err(PipelineError::NoOutput.into()),
    };
    let body = Body::from_stream(stream::iter([Ok(first)]).chain(audio));

    let filename = format!("{}.wav", sanitize_filename(&source.title, "audio"));
    tracing::info!("Streaming {} from {}", filename, source.url);

    let mut response = (
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, HeaderValue::from_static("audio/wav")),
            (header::CACHE_CONTROL, HeaderValue::from_static("no-cache")),
        ],
        body,
    )
        .into_response();
    if let Ok(disposition) = HeaderValue::from_str(&attachment(&filename)) {
        response
            .headers_mut()
            .insert(header::CONTENT_DISPOSITION, disposition);
    }
    insert_match_kind(response.headers_mut(), source.selection.as_ref());

    Ok(response)
}

/// Tell the client how a Spotify track was matched; YouTube urls get nothing.
fn insert_match_kind(headers: &mut HeaderMap, selection: Option<&Selection>) {
    if let Some(selection) = selection {
        headers.insert(
            MATCH_KIND.clone(),
            HeaderValue::from_static(selection.kind.as_str()),
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::matching::{ScoringPolicy, select_best};
    use crate::test_utils::{candidate, target};

    fn selection(duration_seconds: f64) -> Selection {
        select_best(
            &ScoringPolicy::default(),
            &target("Levitating", "Dua Lipa", 203.0),
            &[candidate("Dua Lipa - Levitating", "Dua Lipa", duration_seconds)],
        )
        .unwrap()
    }

    #[test]
    fn test_scored_match_kind_header() {
        let mut headers = HeaderMap::new();
        insert_match_kind(&mut headers, Some(&selection(204.0)));
        assert_eq!(headers.get("x-match-kind").unwrap(), "scored");
    }

    #[test]
    fn test_closest_duration_match_kind_header() {
        let mut headers = HeaderMap::new();
        insert_match_kind(&mut headers, Some(&selection(400.0)));
        assert_eq!(headers.get("x-match-kind").unwrap(), "closest-duration");
    }

    #[test]
    fn test_no_match_kind_header_without_selection() {
        let mut headers = HeaderMap::new();
        insert_match_kind(&mut headers, None);
        assert!(headers.get("x-match-kind").is_none());
    }
}
