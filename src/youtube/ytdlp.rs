use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;

use serde::Deserialize;
use tokio::process::Command;
use tracing::instrument;

use crate::config::ToolsConfig;
use crate::error::{UpstreamError, UpstreamResult};
use crate::matching::Candidate;
use crate::ports::youtube::{VideoInfo, VideoSource};
use crate::retry::{RetryPolicy, with_retry};

const TOOL: &str = "yt-dlp";

/// One line of `--flat-playlist --dump-json` output
#[derive(Debug, Deserialize)]
struct FlatEntry {
    id: Option<String>,
    url: Option<String>,
    title: Option<String>,
    channel: Option<String>,
    uploader: Option<String>,
    duration: Option<f64>,
}

impl FlatEntry {
    fn into_candidate(self) -> Option<Candidate> {
        let url = match (self.url, self.id) {
            (Some(url), _) if url.starts_with("http") => url,
            (_, Some(id)) => format!("https://www.youtube.com/watch?v={id}"),
            _ => return None,
        };
        Some(Candidate {
            url,
            title: self.title.unwrap_or_default(),
            channel_name: self.channel.or(self.uploader).unwrap_or_default(),
            duration_seconds: self.duration.unwrap_or(0.0),
        })
    }
}

#[derive(Debug, Deserialize)]
struct VideoJson {
    title: String,
    channel: Option<String>,
    uploader: Option<String>,
    thumbnail: Option<String>,
    duration: Option<f64>,
}

/// Video search and metadata through the `yt-dlp` binary.
pub struct YtDlp {
    program: PathBuf,
    cookies_file: Option<PathBuf>,
    timeout: Duration,
    retry: RetryPolicy,
}

impl YtDlp {
    pub fn new(tools: &ToolsConfig, retry: RetryPolicy) -> Self {
        Self {
            program: tools.ytdlp_path.clone(),
            cookies_file: tools.cookies_file.clone(),
            timeout: tools.timeout,
            retry,
        }
    }

    /// Run yt-dlp once and return its stdout.
    async fn run(&self, args: &[String]) -> Result<String, UpstreamError> {
        let mut command = Command::new(&self.program);
        command
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(cookies) = &self.cookies_file {
            command.arg("--cookies").arg(cookies);
        }

        tracing::debug!("Running {} {}", self.program.display(), args.join(" "));
        let child = command
            .spawn()
            .map_err(|source| UpstreamError::ToolSpawn { tool: TOOL, source })?;

        // Dropping the future on timeout drops the child, which kills it
        let output = tokio::time::timeout(self.timeout, child.wait_with_output())
            .await
            .map_err(|_| UpstreamError::ToolTimeout {
                tool: TOOL,
                timeout: self.timeout,
            })?
            .map_err(|source| UpstreamError::ToolSpawn { tool: TOOL, source })?;

        if output.status.success() {
            return String::from_utf8(output.stdout).map_err(|error| UpstreamError::Decode {
                service: TOOL,
                reason: error.to_string(),
            });
        }

        let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
        Err(classify_failure(output.status.code(), stderr))
    }
}

/// Turn a failed yt-dlp run into an error, keeping rate limits and server
/// errors retryable.
fn classify_failure(code: Option<i32>, stderr: String) -> UpstreamError {
    let lowered = stderr.to_lowercase();
    if ["video unavailable", "private video", "this video has been removed"]
        .iter()
        .any(|needle| lowered.contains(needle))
    {
        return UpstreamError::NotFound {
            service: "YouTube",
            what: stderr,
        };
    }

    let transient = lowered.contains("too many requests")
        || lowered.contains("timed out")
        || http_error_status(&lowered).is_some_and(|status| status == 429 || status >= 500);

    UpstreamError::ToolFailed {
        tool: TOOL,
        code,
        stderr,
        transient,
    }
}

/// Status from yt-dlp's `HTTP Error 503: Service Unavailable` messages
fn http_error_status(stderr: &str) -> Option<u16> {
    let (_, rest) = stderr.split_once("http error ")?;
    rest.get(..3)?.parse().ok()
}

fn parse_search_output(stdout: &str) -> Vec<Candidate> {
    stdout
        .lines()
        .filter(|line| !line.trim().is_empty())
        .filter_map(|line| match serde_json::from_str::<FlatEntry>(line) {
            Ok(entry) => entry.into_candidate(),
            Err(error) => {
                tracing::warn!("Skipping unparseable yt-dlp search line: {}", error);
                None
            }
        })
        .collect()
}

fn parse_video_info(stdout: &str) -> Result<VideoInfo, UpstreamError> {
    let video: VideoJson = serde_json::from_str(stdout).map_err(|error| UpstreamError::Decode {
        service: TOOL,
        reason: error.to_string(),
    })?;
    Ok(VideoInfo {
        title: video.title,
        channel: video.channel.or(video.uploader).unwrap_or_default(),
        thumbnail: video.thumbnail,
        duration_seconds: video.duration.unwrap_or(0.0),
    })
}

#[async_trait::async_trait]
impl VideoSource for YtDlp {
    #[instrument(skip(self))]
    async fn search(&self, query: &str, limit: usize) -> UpstreamResult<Vec<Candidate>> {
        let args = vec![
            format!("ytsearch{limit}:{query}"),
            "--flat-playlist".to_string(),
            "--dump-json".to_string(),
            "--no-warnings".to_string(),
        ];
        let stdout = with_retry(
            &self.retry,
            "YouTube search",
            || self.run(&args),
            UpstreamError::is_retryable,
        )
        .await?;

        let candidates = parse_search_output(&stdout);
        tracing::debug!("Search '{}' returned {} candidates", query, candidates.len());
        Ok(candidates)
    }

    #[instrument(skip(self))]
    async fn video_info(&self, url: &str) -> UpstreamResult<VideoInfo> {
        let args = vec![
            "--dump-single-json".to_string(),
            "--no-playlist".to_string(),
            "--no-warnings".to_string(),
            url.to_string(),
        ];
        let stdout = with_retry(
            &self.retry,
            "YouTube video info",
            || self.run(&args),
            UpstreamError::is_retryable,
        )
        .await?;

        parse_video_info(&stdout).map_err(crate::retry::RetryError::Terminal)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_search_output() {
        let stdout = r#"{"id": "TUVcZfQe-Kw", "url": "https://www.youtube.com/watch?v=TUVcZfQe-Kw", "title": "Dua Lipa - Levitating (Official Audio)", "channel": "Dua Lipa", "duration": 203.0}
{"id": "abc123", "title": "Levitating (Live at Glastonbury)", "uploader": "BBC Music", "duration": 240}

not json
{"id": "nodur", "title": "Levitating", "channel": null}
"#;
        let candidates = parse_search_output(stdout);
        assert_eq!(candidates.len(), 3);

        assert_eq!(candidates[0].url, "https://www.youtube.com/watch?v=TUVcZfQe-Kw");
        assert_eq!(candidates[0].channel_name, "Dua Lipa");
        assert_eq!(candidates[0].duration_seconds, 203.0);

        assert_eq!(candidates[1].url, "https://www.youtube.com/watch?v=abc123");
        assert_eq!(candidates[1].channel_name, "BBC Music");

        assert_eq!(candidates[2].channel_name, "");
        assert_eq!(candidates[2].duration_seconds, 0.0);
    }

    #[test]
    fn test_parse_empty_search_output() {
        assert!(parse_search_output("").is_empty());
        assert!(parse_search_output("\n\n").is_empty());
    }

    #[test]
    fn test_entry_without_id_or_url_is_skipped() {
        assert!(parse_search_output(r#"{"title": "orphan"}"#).is_empty());
    }

    #[test]
    fn test_parse_video_info() {
        let info = parse_video_info(
            r#"{"id": "x", "title": "Levitating", "uploader": "Dua Lipa", "thumbnail": "https://i.ytimg.com/vi/x/maxresdefault.jpg", "duration": 203}"#,
        )
        .unwrap();
        assert_eq!(info.title, "Levitating");
        assert_eq!(info.channel, "Dua Lipa");
        assert_eq!(
            info.thumbnail.as_deref(),
            Some("https://i.ytimg.com/vi/x/maxresdefault.jpg")
        );
        assert_eq!(info.duration_seconds, 203.0);

        assert!(matches!(
            parse_video_info("{}"),
            Err(UpstreamError::Decode { .. })
        ));
    }

    #[test]
    fn test_classify_rate_limit_is_transient() {
        let error = classify_failure(
            Some(1),
            "ERROR: [youtube] x: Unable to download webpage: HTTP Error 429: Too Many Requests"
                .into(),
        );
        assert!(error.is_retryable());

        let error = classify_failure(Some(1), "ERROR: HTTP Error 503: Service Unavailable".into());
        assert!(error.is_retryable());
    }

    #[test]
    fn test_classify_unavailable_is_not_found() {
        let error = classify_failure(Some(1), "ERROR: [youtube] x: Video unavailable".into());
        assert!(matches!(error, UpstreamError::NotFound { .. }));
        assert!(!error.is_retryable());
    }

    #[test]
    fn test_classify_other_failure_is_terminal() {
        let error = classify_failure(Some(2), "ERROR: HTTP Error 403: Forbidden".into());
        assert!(matches!(
            error,
            UpstreamError::ToolFailed {
                transient: false,
                ..
            }
        ));
        assert_eq!(http_error_status("http error 403: forbidden"), Some(403));
        assert_eq!(http_error_status("nothing here"), None);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_missing_binary_is_spawn_error() {
        let tools = ToolsConfig {
            ytdlp_path: PathBuf::from("/nonexistent/yt-dlp"),
            ..ToolsConfig::default()
        };
        let ytdlp = YtDlp::new(&tools, crate::test_utils::fast_retry(3));
        let error = ytdlp.search("anything", 1).await.unwrap_err();
        assert!(matches!(
            error,
            crate::retry::RetryError::Terminal(UpstreamError::ToolSpawn { .. })
        ));
    }
}
