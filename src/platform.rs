use serde::Serialize;
use url::Url;

use crate::error::InputError;

const YOUTUBE_HOSTS: [&str; 5] = [
    "youtube.com",
    "www.youtube.com",
    "m.youtube.com",
    "music.youtube.com",
    "youtu.be",
];
const SPOTIFY_HOST: &str = "open.spotify.com";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    Youtube,
    Spotify,
}

/// A validated input URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceUrl {
    Youtube { url: String },
    SpotifyTrack { id: String },
}

impl SourceUrl {
    pub fn platform(&self) -> Platform {
        match self {
            SourceUrl::Youtube { .. } => Platform::Youtube,
            SourceUrl::SpotifyTrack { .. } => Platform::Spotify,
        }
    }
}

/// Classify a user supplied URL.
///
/// Accepts YouTube video URLs, `open.spotify.com/track/<id>` (optionally with
/// an `/intl-xx/` prefix) and `spotify:track:<id>` URIs.
pub fn detect(input: &str) -> Result<SourceUrl, InputError> {
    let input = input.trim();
    if input.is_empty() {
        return Err(InputError::MissingUrl);
    }

    if let Some(id) = input.strip_prefix("spotify:track:") {
        return spotify_track_id(id)
            .map(|id| SourceUrl::SpotifyTrack { id })
            .ok_or_else(|| InputError::MalformedUrl(input.to_string()));
    }

    let url = Url::parse(input).map_err(|_| InputError::MalformedUrl(input.to_string()))?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(InputError::MalformedUrl(input.to_string()));
    }
    let host = url
        .host_str()
        .ok_or_else(|| InputError::MalformedUrl(input.to_string()))?
        .to_ascii_lowercase();

    if YOUTUBE_HOSTS.contains(&host.as_str()) {
        return Ok(SourceUrl::Youtube {
            url: url.to_string(),
        });
    }

    if host == SPOTIFY_HOST {
        let segments: Vec<&str> = url
            .path_segments()
            .map(|segments| segments.filter(|s| !s.is_empty()).collect())
            .unwrap_or_default();
        let segments = match segments.as_slice() {
            [locale, rest @ ..] if locale.starts_with("intl-") => rest,
            all => all,
        };
        if let ["track", id] = segments {
            return spotify_track_id(id)
                .map(|id| SourceUrl::SpotifyTrack { id })
                .ok_or_else(|| InputError::MalformedUrl(input.to_string()));
        }
    }

    Err(InputError::UnsupportedPlatform(input.to_string()))
}

fn spotify_track_id(id: &str) -> Option<String> {
    let id = id.trim();
    (!id.is_empty() && id.chars().all(|c| c.is_ascii_alphanumeric())).then(|| id.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_youtube_urls() {
        for url in [
            "https://www.youtube.com/watch?v=TUVcZfQe-Kw",
            "https://youtu.be/TUVcZfQe-Kw",
            "https://music.youtube.com/watch?v=TUVcZfQe-Kw",
            "http://m.youtube.com/watch?v=TUVcZfQe-Kw",
            "  https://YOUTUBE.com/shorts/abc  ",
        ] {
            let source = detect(url).unwrap();
            assert_eq!(source.platform(), Platform::Youtube, "{url}");
        }
    }

    #[test]
    fn test_spotify_track_urls() {
        assert_eq!(
            detect("https://open.spotify.com/track/463CkQjx2Zk1yXoBuierM9?si=abc").unwrap(),
            SourceUrl::SpotifyTrack {
                id: "463CkQjx2Zk1yXoBuierM9".into()
            }
        );
        assert_eq!(
            detect("https://open.spotify.com/intl-de/track/463CkQjx2Zk1yXoBuierM9").unwrap(),
            SourceUrl::SpotifyTrack {
                id: "463CkQjx2Zk1yXoBuierM9".into()
            }
        );
        assert_eq!(
            detect("spotify:track:463CkQjx2Zk1yXoBuierM9").unwrap(),
            SourceUrl::SpotifyTrack {
                id: "463CkQjx2Zk1yXoBuierM9".into()
            }
        );
    }

    #[test]
    fn test_missing_url() {
        assert_eq!(detect(""), Err(InputError::MissingUrl));
        assert_eq!(detect("   "), Err(InputError::MissingUrl));
    }

    #[test]
    fn test_malformed_urls() {
        assert!(matches!(detect("not a url"), Err(InputError::MalformedUrl(_))));
        assert!(matches!(
            detect("ftp://youtube.com/watch?v=x"),
            Err(InputError::MalformedUrl(_))
        ));
        assert!(matches!(
            detect("spotify:track:"),
            Err(InputError::MalformedUrl(_))
        ));
        assert!(matches!(
            detect("https://open.spotify.com/track/abc-def"),
            Err(InputError::MalformedUrl(_))
        ));
    }

    #[test]
    fn test_unsupported_platforms() {
        assert!(matches!(
            detect("https://soundcloud.com/artist/track"),
            Err(InputError::UnsupportedPlatform(_))
        ));
        assert!(matches!(
            detect("https://open.spotify.com/album/4yP0hdKOZPNshxUOjY0cZj"),
            Err(InputError::UnsupportedPlatform(_))
        ));
        assert!(matches!(
            detect("https://open.spotify.com/playlist/37i9dQZF1DXcBWIGoYBM5M"),
            Err(InputError::UnsupportedPlatform(_))
        ));
    }
}
