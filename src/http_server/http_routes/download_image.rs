use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::{Query, State},
    http::{HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
};
use reqwest::redirect;
use serde::Deserialize;
use url::Url;

use crate::config::HttpConfig;
use crate::error::{InputError, UpstreamError, error_for_response};
use crate::http_server::{
    error::ApiError,
    http_routes::{attachment, sanitize_filename},
    state::{AppState, USER_AGENT},
};

const SERVICE: &str = "image host";
const MAX_REDIRECTS: usize = 5;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImageKind {
    #[default]
    Thumbnail,
    Poster,
}

impl ImageKind {
    fn label(self) -> &'static str {
        match self {
            ImageKind::Thumbnail => "thumbnail",
            ImageKind::Poster => "poster",
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct DownloadImageQuery {
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub title: String,
    #[serde(rename = "type", default)]
    pub kind: ImageKind,
}

/// Proxy a thumbnail or poster so the browser downloads it as a file.
#[axum::debug_handler]
pub async fn download_image(
    State(app_state): State<Arc<AppState>>,
    Query(query): Query<DownloadImageQuery>,
) -> Result<Response, ApiError> {
    let url = allowed_image_url(&app_state.config.http.image_hosts, &query.url)?;

    tracing::debug!("Fetching {} image {}", query.kind.label(), url);
    let response = app_state
        .images
        .get(url.as_str())
        .timeout(app_state.config.http.request_timeout)
        .send()
        .await
        .map_err(|error| ApiError::ImageFetch(UpstreamError::network(SERVICE, error)))?;
    // Also covers a redirect the client refused to follow
    if !response.status().is_success() {
        return Err(ApiError::ImageFetch(error_for_response(SERVICE, response).await));
    }
    let bytes = read_limited(response, app_state.config.http.max_image_bytes).await?;

    let kind = infer::get(&bytes)
        .filter(|kind| kind.matcher_type() == infer::MatcherType::Image)
        .ok_or(ApiError::NotAnImage)?;

    let filename = format!(
        "{}_{}.{}",
        sanitize_filename(&query.title, "image"),
        query.kind.label(),
        kind.extension()
    );

    let mut response = (
        StatusCode::OK,
        [(header::CONTENT_TYPE, HeaderValue::from_static(kind.mime_type()))],
        bytes,
    )
        .into_response();
    if let Ok(disposition) = HeaderValue::from_str(&attachment(&filename)) {
        response
            .headers_mut()
            .insert(header::CONTENT_DISPOSITION, disposition);
    }
    Ok(response)
}

/// Client for the image proxy. Redirects are followed only while they stay
/// on allowed hosts.
pub fn image_client(config: &HttpConfig) -> reqwest::Result<reqwest::Client> {
    let allowed_hosts = config.image_hosts.clone();
    reqwest::Client::builder()
        .user_agent(USER_AGENT)
        .connect_timeout(config.request_timeout)
        .redirect(redirect::Policy::custom(move |attempt| {
            if follow_redirect(&allowed_hosts, attempt.url(), attempt.previous().len()) {
                attempt.follow()
            } else {
                tracing::warn!("Refusing image redirect to {}", attempt.url());
                attempt.stop()
            }
        }))
        .build()
}

/// `hops` is the number of urls visited before `next`.
fn follow_redirect(allowed_hosts: &[String], next: &Url, hops: usize) -> bool {
    hops <= MAX_REDIRECTS
        && matches!(next.scheme(), "http" | "https")
        && next
            .host_str()
            .is_some_and(|host| host_allowed(allowed_hosts, host))
}

/// Read the whole body, refusing anything over `limit` bytes.
async fn read_limited(mut response: reqwest::Response, limit: usize) -> Result<Bytes, ApiError> {
    if response
        .content_length()
        .is_some_and(|length| length > limit as u64)
    {
        return Err(ApiError::ImageTooLarge(limit));
    }

    let mut body = Vec::new();
    while let Some(chunk) = response
        .chunk()
        .await
        .map_err(|error| ApiError::ImageFetch(UpstreamError::network(SERVICE, error)))?
    {
        // Content-Length may be missing or wrong
        if body.len() + chunk.len() > limit {
            return Err(ApiError::ImageTooLarge(limit));
        }
        body.extend_from_slice(&chunk);
    }
    Ok(Bytes::from(body))
}

/// `*.example.com` matches any subdomain of `example.com`.
fn host_allowed(allowed_hosts: &[String], host: &str) -> bool {
    let host = host.to_ascii_lowercase();
    allowed_hosts.iter().any(|pattern| {
        let pattern = pattern.to_ascii_lowercase();
        match pattern.strip_prefix("*.") {
            Some(domain) => host
                .strip_suffix(domain)
                .is_some_and(|prefix| prefix.ends_with('.')),
            None => host == pattern,
        }
    })
}

/// Parse `raw` and check its host against the allowlist.
fn allowed_image_url(allowed_hosts: &[String], raw: &str) -> Result<Url, ApiError> {
    if raw.trim().is_empty() {
        return Err(InputError::MissingUrl.into());
    }
    let url = Url::parse(raw.trim()).map_err(|_| InputError::MalformedUrl(raw.to_string()))?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(InputError::MalformedUrl(raw.to_string()).into());
    }
    let host = url
        .host_str()
        .ok_or_else(|| InputError::MalformedUrl(raw.to_string()))?
        .to_ascii_lowercase();

    if host_allowed(allowed_hosts, &host) {
        Ok(url)
    } else {
        Err(ApiError::ImageHostNotAllowed(host))
    }
}
