use std::future::Future;
use std::num::NonZeroU32;
use std::sync::LazyLock;
use std::time::Duration;

use governor::{DefaultDirectRateLimiter, Quota, RateLimiter};
use regex::Regex;
use reqwest::Client;
use serde::Deserialize;

use crate::error::{UpstreamError, error_for_response};
use crate::ports::artwork::ArtworkSource;
use crate::retry::{RetryPolicy, with_retry};

const SERVICE: &str = "iTunes";
const ITUNES_SEARCH_URL: &str = "https://itunes.apple.com/search";
const POSTER_SIZE: &str = "3000x3000bb";

static ARTWORK_SIZE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\d+x\d+bb").unwrap());

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SearchResponse {
    #[serde(default)]
    results: Vec<SearchResult>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SearchResult {
    artwork_url100: Option<String>,
}

/// Full size cover art from the iTunes search API
pub struct ItunesArtwork {
    client: Client,
    limiter: DefaultDirectRateLimiter,
    timeout: Duration,
    retry: RetryPolicy,
}

impl ItunesArtwork {
    pub fn new(
        client: Client,
        requests_per_second: u32,
        timeout: Duration,
        retry: RetryPolicy,
    ) -> Self {
        let quota = Quota::per_second(NonZeroU32::new(requests_per_second).unwrap_or(NonZeroU32::MIN));
        Self {
            client,
            limiter: RateLimiter::direct(quota),
            timeout,
            retry,
        }
    }

    async fn search(&self, term: &str) -> Result<SearchResponse, UpstreamError> {
        log::debug!("Waiting for iTunes rate limiter");
        self.limiter.until_ready().await;

        let response = self
            .client
            .get(ITUNES_SEARCH_URL)
            .query(&[("term", term), ("entity", "song"), ("limit", "1")])
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| UpstreamError::network(SERVICE, e))?;

        if !response.status().is_success() {
            return Err(error_for_response(SERVICE, response).await);
        }

        response
            .json()
            .await
            .map_err(|e| UpstreamError::Decode {
                service: SERVICE,
                reason: e.to_string(),
            })
    }
}

/// Run `search` under the retry policy and pick the first poster. Failures
/// after the last attempt are logged and yield `None`.
async fn find_poster<F, Fut>(
    retry: &RetryPolicy,
    artist: &str,
    title: &str,
    search: F,
) -> Option<String>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<SearchResponse, UpstreamError>>,
{
    match with_retry(retry, "iTunes artwork lookup", search, UpstreamError::is_retryable).await {
        Ok(response) => response
            .results
            .into_iter()
            .find_map(|result| result.artwork_url100)
            .map(|url| poster_url(&url)),
        Err(error) => {
            tracing::warn!("Artwork lookup for '{} - {}' failed: {}", artist, title, error);
            None
        }
    }
}

/// Rewrite an artwork url to the largest size the CDN serves.
fn poster_url(artwork_url: &str) -> String {
    ARTWORK_SIZE.replace(artwork_url, POSTER_SIZE).into_owned()
}

#[async_trait::async_trait]
impl ArtworkSource for ItunesArtwork {
    async fn poster(&self, artist: &str, title: &str) -> Option<String> {
        let term = format!("{artist} {title}");
        find_poster(&self.retry, artist, title, || self.search(&term)).await
    }
}

/// Used when artwork lookups are turned off in the config.
pub struct NoArtwork;

#[async_trait::async_trait]
impl ArtworkSource for NoArtwork {
    async fn poster(&self, _artist: &str, _title: &str) -> Option<String> {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::fast_retry;
    use reqwest::StatusCode;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[test]
    fn test_poster_url_rewrites_size() {
        assert_eq!(
            poster_url(
                "https://is1-ssl.mzstatic.com/image/thumb/Music124/v4/aa/bb/cc/source/100x100bb.jpg"
            ),
            "https://is1-ssl.mzstatic.com/image/thumb/Music124/v4/aa/bb/cc/source/3000x3000bb.jpg"
        );
    }

    #[test]
    fn test_poster_url_without_size_is_unchanged() {
        assert_eq!(
            poster_url("https://example.com/cover.jpg"),
            "https://example.com/cover.jpg"
        );
    }

    #[test]
    fn test_parse_search_response() {
        let response: SearchResponse = serde_json::from_str(
            r#"{"resultCount": 1, "results": [{"trackName": "Levitating", "artworkUrl100": "https://is1-ssl.mzstatic.com/x/100x100bb.jpg"}]}"#,
        )
        .unwrap();
        assert_eq!(
            response.results[0].artwork_url100.as_deref(),
            Some("https://is1-ssl.mzstatic.com/x/100x100bb.jpg")
        );

        let empty: SearchResponse = serde_json::from_str(r#"{"resultCount": 0}"#).unwrap();
        assert!(empty.results.is_empty());
    }

    fn rate_limited() -> UpstreamError {
        UpstreamError::Status {
            service: SERVICE,
            status: StatusCode::TOO_MANY_REQUESTS,
            body: String::new(),
        }
    }

    #[tokio::test]
    async fn test_rate_limited_lookup_is_retried() {
        let calls = AtomicU32::new(0);
        let poster = find_poster(&fast_retry(3), "Dua Lipa", "Levitating", || async {
            if calls.fetch_add(1, Ordering::SeqCst) == 0 {
                Err(rate_limited())
            } else {
                Ok(SearchResponse {
                    results: vec![SearchResult {
                        artwork_url100: Some("https://is1-ssl.mzstatic.com/x/100x100bb.jpg".into()),
                    }],
                })
            }
        })
        .await;

        assert_eq!(
            poster.as_deref(),
            Some("https://is1-ssl.mzstatic.com/x/3000x3000bb.jpg")
        );
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_lookup_degrades_to_none_when_retries_run_out() {
        let calls = AtomicU32::new(0);
        let poster = find_poster(&fast_retry(3), "Dua Lipa", "Levitating", || async {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(rate_limited())
        })
        .await;

        assert_eq!(poster, None);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_lookup_decode_failure_is_not_retried() {
        let calls = AtomicU32::new(0);
        let poster = find_poster(&fast_retry(3), "Dua Lipa", "Levitating", || async {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(UpstreamError::Decode {
                service: SERVICE,
                reason: "expected value".into(),
            })
        })
        .await;

        assert_eq!(poster, None);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_no_artwork() {
        assert_eq!(NoArtwork.poster("Dua Lipa", "Levitating").await, None);
    }
}
