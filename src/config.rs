//! Configuration types for media-dl

use serde::{Deserialize, Serialize};
use std::{net::SocketAddr, path::Path, path::PathBuf};
use utoipa::ToSchema;

use crate::error::{Error, Result};

/// Environment variable overriding [`DownloadConfig::library_dir`]
pub const ENV_LIBRARY_DIR: &str = "MEDIA_DL_LIBRARY_DIR";
/// Environment variable overriding [`DownloadConfig::max_concurrent_downloads`]
pub const ENV_MAX_CONCURRENT: &str = "MEDIA_DL_MAX_CONCURRENT";
/// Environment variable overriding [`ApiConfig::bind_address`]
pub const ENV_BIND_ADDRESS: &str = "MEDIA_DL_BIND";

/// What happens when a URL is queued while a task for it is still active
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum DuplicatePolicy {
    /// Refuse the new request (default)
    #[default]
    Reject,
    /// Cancel the running job and queue the new request in its place
    Replace,
}

/// Step run after a successful download
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum PostProcessMode {
    /// Finish as soon as the file is on disk
    #[default]
    None,
    /// Re-encode into an MP4 container with ffmpeg
    Convert,
    /// Generate subtitles with an external transcriber
    Transcribe,
}

/// Download behavior configuration (library location, concurrency, duplicates)
#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
pub struct DownloadConfig {
    /// Library root; request destinations are resolved inside it (default: "./library")
    #[serde(default = "default_library_dir")]
    #[schema(value_type = String)]
    pub library_dir: PathBuf,

    /// Worker pool size (default: 2)
    #[serde(default = "default_max_concurrent")]
    pub max_concurrent_downloads: usize,

    /// Write granularity in bytes; progress is reported per chunk (default: 8192)
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,

    /// Re-queue behavior for URLs that are still active
    #[serde(default)]
    pub duplicate_policy: DuplicatePolicy,

    /// User-Agent header sent with downloads
    #[serde(default)]
    pub user_agent: Option<String>,
}

impl Default for DownloadConfig {
    fn default() -> Self {
        Self {
            library_dir: default_library_dir(),
            max_concurrent_downloads: default_max_concurrent(),
            chunk_size: default_chunk_size(),
            duplicate_policy: DuplicatePolicy::default(),
            user_agent: None,
        }
    }
}

/// Post-processing configuration
#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
pub struct PostProcessConfig {
    /// Post-processing step (default: none)
    #[serde(default)]
    pub mode: PostProcessMode,

    /// Remove the source file after a successful conversion (default: true)
    #[serde(default = "default_true")]
    pub delete_original: bool,

    /// Use CUDA decoding and NVENC encoding (default: false)
    #[serde(default)]
    pub hardware_acceleration: bool,
}

impl Default for PostProcessConfig {
    fn default() -> Self {
        Self {
            mode: PostProcessMode::default(),
            delete_original: true,
            hardware_acceleration: false,
        }
    }
}

/// External tool paths
#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
pub struct ToolsConfig {
    /// Path to ffmpeg (auto-detected if None)
    #[serde(default)]
    #[schema(value_type = Option<String>)]
    pub ffmpeg_path: Option<PathBuf>,

    /// Path to ffprobe (auto-detected if None)
    #[serde(default)]
    #[schema(value_type = Option<String>)]
    pub ffprobe_path: Option<PathBuf>,

    /// Path to the transcriber CLI, e.g. whisper (auto-detected if None)
    #[serde(default)]
    #[schema(value_type = Option<String>)]
    pub transcriber_path: Option<PathBuf>,

    /// Whether to search PATH for binaries not set explicitly (default: true)
    #[serde(default = "default_true")]
    pub search_path: bool,
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self {
            ffmpeg_path: None,
            ffprobe_path: None,
            transcriber_path: None,
            search_path: true,
        }
    }
}

/// REST API configuration
#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
pub struct ApiConfig {
    /// Address to bind the API server (default: 127.0.0.1:8005)
    #[serde(default = "default_bind_address")]
    #[schema(value_type = String)]
    pub bind_address: SocketAddr,

    /// Enable CORS (default: true)
    #[serde(default = "default_true")]
    pub cors_enabled: bool,

    /// Allowed CORS origins (default: ["*"])
    #[serde(default = "default_cors_origins")]
    pub cors_origins: Vec<String>,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            bind_address: default_bind_address(),
            cors_enabled: true,
            cors_origins: default_cors_origins(),
        }
    }
}

/// Main configuration for [`MediaDownloader`](crate::MediaDownloader)
#[derive(Clone, Debug, Default, Serialize, Deserialize, ToSchema)]
pub struct Config {
    /// Download behavior settings
    #[serde(default)]
    pub download: DownloadConfig,

    /// Post-processing settings
    #[serde(default)]
    pub post_process: PostProcessConfig,

    /// External tool paths
    #[serde(default)]
    pub tools: ToolsConfig,

    /// API server settings
    #[serde(default)]
    pub api: ApiConfig,
}

impl Config {
    /// Library root directory
    pub fn library_dir(&self) -> &PathBuf {
        &self.download.library_dir
    }

    /// Load configuration from a JSON file; missing fields take their defaults.
    pub fn from_json_file(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path).map_err(|e| Error::Config {
            message: format!("cannot read {}: {}", path.display(), e),
            key: None,
        })?;
        Ok(serde_json::from_str(&raw)?)
    }

    /// Apply `MEDIA_DL_*` environment overrides.
    pub fn apply_env_overrides(&mut self) -> Result<()> {
        self.apply_overrides(|key| std::env::var(key).ok())
    }

    fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<()> {
        if let Some(dir) = lookup(ENV_LIBRARY_DIR) {
            self.download.library_dir = PathBuf::from(dir);
        }
        if let Some(value) = lookup(ENV_MAX_CONCURRENT) {
            self.download.max_concurrent_downloads =
                value.trim().parse().map_err(|_| Error::Config {
                    message: format!("{ENV_MAX_CONCURRENT} must be a positive integer, got '{value}'"),
                    key: Some("max_concurrent_downloads".into()),
                })?;
        }
        if let Some(value) = lookup(ENV_BIND_ADDRESS) {
            self.api.bind_address = value.trim().parse().map_err(|_| Error::Config {
                message: format!("{ENV_BIND_ADDRESS} must be a socket address, got '{value}'"),
                key: Some("bind_address".into()),
            })?;
        }
        Ok(())
    }

    /// Check settings the downloader relies on.
    pub fn validate(&self) -> Result<()> {
        if self.download.max_concurrent_downloads == 0 {
            return Err(Error::Config {
                message: "max_concurrent_downloads must be at least 1".into(),
                key: Some("max_concurrent_downloads".into()),
            });
        }
        if self.download.chunk_size == 0 {
            return Err(Error::Config {
                message: "chunk_size must be at least 1 byte".into(),
                key: Some("chunk_size".into()),
            });
        }
        if self.download.library_dir.as_os_str().is_empty() {
            return Err(Error::Config {
                message: "library_dir must not be empty".into(),
                key: Some("library_dir".into()),
            });
        }
        Ok(())
    }
}

// Default value functions
fn default_library_dir() -> PathBuf {
    PathBuf::from("library")
}

fn default_max_concurrent() -> usize {
    2
}

fn default_chunk_size() -> usize {
    8 * 1024
}

fn default_true() -> bool {
    true
}

fn default_bind_address() -> SocketAddr {
    SocketAddr::from(([127, 0, 0, 1], 8005))
}

fn default_cors_origins() -> Vec<String> {
    vec!["*".into()]
}
