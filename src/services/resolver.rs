use std::sync::Arc;

use serde::Serialize;
use tracing::instrument;

use crate::error::{InputError, ResolveError};
use crate::matching::{MatchKind, ScoringPolicy, Selection, select_best};
use crate::platform::{self, Platform, SourceUrl};
use crate::ports::artwork::ArtworkSource;
use crate::ports::spotify::{SpotifyApiTrack, TrackMetadataSource};
use crate::ports::youtube::VideoSource;

/// Preview data for the UI (`/api/get-media-data`)
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MediaInfo {
    pub title: String,
    pub subtitle: String,
    pub thumbnail: Option<String>,
    pub platform: Platform,
    pub poster: Option<String>,
}

/// A playable source handed to the transcode pipeline.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedSource {
    pub url: String,
    /// Used for the download filename
    pub title: String,
    /// Present when the url came out of a Spotify match
    pub selection: Option<Selection>,
}

/// Result of matching one Spotify track against YouTube search results
#[derive(Debug, Clone, PartialEq)]
pub struct SpotifyMatch {
    pub track: SpotifyApiTrack,
    pub query: String,
    pub selection: Selection,
}

/// Turns user supplied URLs into metadata and playable sources.
pub struct SourceResolver {
    metadata: Arc<dyn TrackMetadataSource>,
    video: Arc<dyn VideoSource>,
    artwork: Arc<dyn ArtworkSource>,
    policy: ScoringPolicy,
    search_results: usize,
}

impl SourceResolver {
    pub fn new(
        metadata: Arc<dyn TrackMetadataSource>,
        video: Arc<dyn VideoSource>,
        artwork: Arc<dyn ArtworkSource>,
        policy: ScoringPolicy,
        search_results: usize,
    ) -> Self {
        Self {
            metadata,
            video,
            artwork,
            policy,
            search_results: search_results.max(1),
        }
    }

    #[instrument(skip(self))]
    pub async fn media_info(&self, url: &str) -> Result<MediaInfo, ResolveError> {
        match platform::detect(url)? {
            SourceUrl::Youtube { url } => {
                let video = self.video.video_info(&url).await?;
                Ok(MediaInfo {
                    title: video.title,
                    subtitle: video.channel,
                    thumbnail: video.thumbnail,
                    platform: Platform::Youtube,
                    poster: None,
                })
            }
            SourceUrl::SpotifyTrack { id } => {
                let track = self.metadata.track(&id).await?;
                let poster = self.artwork.poster(track.primary_artist(), &track.name).await;
                Ok(MediaInfo {
                    subtitle: track.artist_display(),
                    title: track.name,
                    thumbnail: track.album_art,
                    platform: Platform::Spotify,
                    poster,
                })
            }
        }
    }

    /// Resolve `url` to something the extractor can download. `title`
    /// overrides the filename title when the caller already knows it.
    #[instrument(skip(self))]
    pub async fn resolve(
        &self,
        url: &str,
        title: Option<&str>,
    ) -> Result<ResolvedSource, ResolveError> {
        let title = title.map(str::trim).filter(|title| !title.is_empty());

        match platform::detect(url)? {
            SourceUrl::Youtube { url } => {
                let title = match title {
                    Some(title) => title.to_string(),
                    None => self.video.video_info(&url).await?.title,
                };
                Ok(ResolvedSource {
                    url,
                    title,
                    selection: None,
                })
            }
            SourceUrl::SpotifyTrack { id } => {
                let found = self.match_spotify_track(&id).await?;
                let title = title.map(str::to_string).unwrap_or_else(|| {
                    format!("{} - {}", found.track.artist_display(), found.track.name)
                });
                Ok(ResolvedSource {
                    url: found.selection.winner.url.clone(),
                    title,
                    selection: Some(found.selection),
                })
            }
        }
    }

    /// Look up a Spotify track and pick the best YouTube upload for it.
    #[instrument(skip(self))]
    pub async fn match_spotify_track(&self, track_id: &str) -> Result<SpotifyMatch, ResolveError> {
        let track = self.metadata.track(track_id).await?;
        if track.name.trim().is_empty() {
            return Err(InputError::Invalid(format!("Spotify track {track_id} has no title")).into());
        }

        let query = format!("{} - {}", track.primary_artist(), track.name);
        let candidates = self.video.search(&query, self.search_results).await?;
        let target = track.descriptor();

        let selection = select_best(&self.policy, &target, &candidates)
            .ok_or_else(|| ResolveError::NoMatch {
                query: query.clone(),
            })?;

        for scored in &selection.trace {
            tracing::debug!(
                "score={:.1} diff={:.1}s in_band={} '{}' by '{}' ({})",
                scored.score,
                scored.duration_diff,
                scored.within_tolerance,
                scored.candidate.title,
                scored.candidate.channel_name,
                scored.candidate.url
            );
        }

        match selection.kind {
            MatchKind::Scored => tracing::info!(
                "Matched '{}' to '{}' (score {:.1}, {})",
                query,
                selection.winner.title,
                selection.winner_trace().map_or(0.0, |scored| scored.score),
                selection.winner.url
            ),
            MatchKind::ClosestDuration => tracing::warn!(
                "No candidate for '{}' within {}s of {:.0}s, falling back to closest duration '{}' ({})",
                query,
                self.policy.duration_tolerance_secs,
                target.duration_seconds,
                selection.winner.title,
                selection.winner.url
            ),
        }

        Ok(SpotifyMatch {
            track,
            query,
            selection,
        })
    }
}
