use serde::{Deserialize, Serialize};

use crate::ports::spotify::SpotifyApiTrack;

/// Spotify client credentials token response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpotifyTokenResponse {
    pub access_token: String,
    pub token_type: String,
    /// Seconds
    pub expires_in: u64,
}

/// Spotify track from API
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpotifyTrack {
    pub id: String,
    pub name: String,
    pub artists: Vec<SpotifyArtist>,
    pub album: SpotifyAlbum,
    pub duration_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpotifyArtist {
    pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpotifyAlbum {
    pub name: String,
    #[serde(default)]
    pub images: Vec<SpotifyImage>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpotifyImage {
    pub url: String,
    pub width: Option<u32>,
    pub height: Option<u32>,
}

impl From<SpotifyTrack> for SpotifyApiTrack {
    fn from(track: SpotifyTrack) -> Self {
        let album_art = track
            .album
            .images
            .iter()
            .max_by_key(|image| image.width.unwrap_or(0))
            .map(|image| image.url.clone());
        SpotifyApiTrack {
            id: track.id,
            name: track.name,
            duration_ms: track.duration_ms,
            artists: track.artists.into_iter().map(|a| a.name).collect(),
            album_name: track.album.name,
            album_art,
        }
    }
}
