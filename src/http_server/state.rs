use std::sync::Arc;

use color_eyre::Result;
use color_eyre::eyre::Context;

use crate::config::Config;
use crate::http_server::http_routes::download_image::image_client;
use crate::itunes::{ItunesArtwork, NoArtwork};
use crate::ports::artwork::ArtworkSource;
use crate::ports::spotify::TrackMetadataSource;
use crate::services::resolver::SourceResolver;
use crate::spotify::auth::SpotifyApiCredentials;
use crate::spotify::client::{SpotifyClient, UnconfiguredSpotify};
use crate::spotify::token_cache::TokenCache;
use crate::youtube::ytdlp::YtDlp;

pub const USER_AGENT: &str = concat!("wavcon/", env!("CARGO_PKG_VERSION"));

pub struct AppState {
    pub config: Config,
    pub resolver: SourceResolver,
    /// Only used by the image proxy; redirects stay on allowed hosts
    pub images: reqwest::Client,
}

impl AppState {
    /// Wire the production adapters from config.
    pub fn new(config: Config, spotify_credentials: Option<SpotifyApiCredentials>) -> Result<Self> {
        let http = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .connect_timeout(config.http.request_timeout)
            .build()
            .wrap_err("Failed to create HTTP client")?;

        let metadata: Arc<dyn TrackMetadataSource> = match spotify_credentials {
            Some(credentials) => {
                log::info!("Using Spotify client id {}", credentials.client_id());
                Arc::new(SpotifyClient::new(
                    http.clone(),
                    credentials,
                    Arc::new(TokenCache::new()),
                    config.retry,
                    config.http.request_timeout,
                ))
            }
            None => {
                log::warn!("No Spotify credentials configured, Spotify URLs will be rejected");
                Arc::new(UnconfiguredSpotify)
            }
        };

        let artwork: Arc<dyn ArtworkSource> = if config.artwork.enabled {
            Arc::new(ItunesArtwork::new(
                http.clone(),
                config.artwork.requests_per_second,
                config.http.request_timeout,
                config.retry,
            ))
        } else {
            Arc::new(NoArtwork)
        };

        let resolver = SourceResolver::new(
            metadata,
            Arc::new(YtDlp::new(&config.tools, config.retry)),
            artwork,
            config.matching.scoring.clone(),
            config.matching.search_results,
        );

        let images = image_client(&config.http).wrap_err("Failed to create image HTTP client")?;

        Ok(Self {
            config,
            resolver,
            images,
        })
    }
}
