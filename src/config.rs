use std::path::{Path, PathBuf};
use std::time::Duration;

use color_eyre::Result;
use color_eyre::eyre::{Context, eyre};
use serde::{Deserialize, Serialize};

use crate::matching::ScoringPolicy;
use crate::retry::RetryPolicy;

/// Application config, read from TOML. Every field has a default so a missing
/// file or a partial file both work.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub matching: MatchingConfig,
    pub retry: RetryPolicy,
    pub tools: ToolsConfig,
    pub http: HttpConfig,
    pub artwork: ArtworkConfig,
    pub spotify: SpotifyConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MatchingConfig {
    /// How many search results to score per Spotify track
    pub search_results: usize,
    pub scoring: ScoringPolicy,
}

impl Default for MatchingConfig {
    fn default() -> Self {
        Self {
            search_results: 5,
            scoring: ScoringPolicy::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ToolsConfig {
    pub ytdlp_path: PathBuf,
    pub ffmpeg_path: PathBuf,
    /// Netscape cookie file handed to yt-dlp
    pub cookies_file: Option<PathBuf>,
    pub sample_rate: u32,
    /// Upper bound for metadata calls (search, video info)
    #[serde(with = "duration_str")]
    pub timeout: Duration,
    /// Longest gap between two chunks of transcoded audio
    #[serde(with = "duration_str")]
    pub idle_timeout: Duration,
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self {
            ytdlp_path: PathBuf::from("yt-dlp"),
            ffmpeg_path: PathBuf::from("ffmpeg"),
            cookies_file: None,
            sample_rate: 48_000,
            timeout: Duration::from_secs(60),
            idle_timeout: Duration::from_secs(60),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    #[serde(with = "duration_str")]
    pub request_timeout: Duration,
    /// Empty allows any origin
    pub cors_origins: Vec<String>,
    /// Hosts the image proxy may fetch from; `*.` prefixes match subdomains
    pub image_hosts: Vec<String>,
    /// Larger images are refused by the image proxy
    pub max_image_bytes: usize,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            request_timeout: Duration::from_secs(10),
            cors_origins: Vec::new(),
            image_hosts: vec![
                "i.ytimg.com".to_string(),
                "i.scdn.co".to_string(),
                "*.mzstatic.com".to_string(),
            ],
            max_image_bytes: 20 * 1024 * 1024,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ArtworkConfig {
    pub enabled: bool,
    pub requests_per_second: u32,
}

impl Default for ArtworkConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            requests_per_second: 1,
        }
    }
}

/// Usually supplied through `SPOTIFY_CLIENT_ID`/`SPOTIFY_CLIENT_SECRET`,
/// which take precedence.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SpotifyConfig {
    pub client_id: Option<String>,
    pub client_secret: Option<String>,
}

impl Config {
    /// Load config from a TOML file
    pub fn from_file(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .wrap_err(format!("Failed to read config file: {}", path.display()))?;
        let config: Config = toml::from_str(&contents)
            .wrap_err(format!("Failed to parse config file: {}", path.display()))?;
        Ok(config)
    }

    /// Default config file location
    pub fn config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|path| path.join("wavcon").join("config.toml"))
    }

    /// Load the given file, or the default location. A missing file at the
    /// default location means defaults; a missing explicit file is an error.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        if let Some(path) = path {
            return Self::from_file(path);
        }

        match Self::config_path() {
            Some(path) if path.exists() => Self::from_file(&path),
            Some(path) => {
                log::debug!("No config file at {}, using defaults", path.display());
                Ok(Self::default())
            }
            None => {
                log::debug!("No config directory on this platform, using defaults");
                Ok(Self::default())
            }
        }
    }

    /// Write the default config to `path`, refusing to overwrite.
    pub fn create_default(path: &Path) -> Result<()> {
        if path.exists() {
            return Err(eyre!("Config file already exists: {}", path.display()));
        }
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .wrap_err(format!("Failed to create config directory: {}", parent.display()))?;
        }
        let contents =
            toml::to_string_pretty(&Self::default()).wrap_err("Failed to serialize config")?;
        std::fs::write(path, contents)
            .wrap_err(format!("Failed to write config file: {}", path.display()))?;
        Ok(())
    }

    /// Check that every configured external tool can be found.
    pub fn check_tools(&self) -> Result<()> {
        for (name, path) in [
            ("yt-dlp", &self.tools.ytdlp_path),
            ("ffmpeg", &self.tools.ffmpeg_path),
        ] {
            which::which(path).map_err(|_| {
                eyre!(
                    "{} not found at '{}'. Please install it and ensure it's available in PATH, or set tools.{}_path in the config.",
                    name,
                    path.display(),
                    name.replace('-', "")
                )
            })?;
        }
        Ok(())
    }
}

/// Serde helpers for `humantime` strings such as `"500ms"` or `"1m 30s"`.
pub mod duration_str {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&humantime::format_duration(*duration).to_string())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let value = String::deserialize(deserializer)?;
        humantime::parse_duration(&value).map_err(serde::de::Error::custom)
    }
}

pub mod optional_duration_str {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(
        duration: &Option<Duration>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        match duration {
            Some(duration) => super::duration_str::serialize(duration, serializer),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Option<Duration>, D::Error> {
        Option::<String>::deserialize(deserializer)?
            .map(|value| humantime::parse_duration(&value).map_err(serde::de::Error::custom))
            .transpose()
    }
}
