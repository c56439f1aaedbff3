use crate::error::UpstreamResult;
use crate::matching::TrackDescriptor;

/// Decoupled representation of a Spotify track from the API.
#[derive(Debug, Clone, PartialEq)]
pub struct SpotifyApiTrack {
    pub id: String,
    pub name: String,
    pub duration_ms: u64,
    pub artists: Vec<String>,
    pub album_name: String,
    /// Largest album image
    pub album_art: Option<String>,
}

impl SpotifyApiTrack {
    pub fn artist_display(&self) -> String {
        self.artists.join(", ")
    }

    pub fn primary_artist(&self) -> &str {
        self.artists.first().map(String::as_str).unwrap_or_default()
    }

    pub fn descriptor(&self) -> TrackDescriptor {
        TrackDescriptor {
            title: self.name.clone(),
            artist: self.artist_display(),
            duration_seconds: self.duration_ms as f64 / 1000.0,
        }
    }
}

/// Port trait wrapping the music metadata lookup used by the resolver.
///
/// Implementations live in `spotify::client` (production) or test mocks.
/// Retries happen inside the implementation.
#[cfg_attr(test, mockall::automock)]
#[async_trait::async_trait]
pub trait TrackMetadataSource: Send + Sync {
    async fn track(&self, track_id: &str) -> UpstreamResult<SpotifyApiTrack>;
}
