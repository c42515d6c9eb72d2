use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;

use crate::downloader::splitter::DEFAULT_TOLERANCE_BYTES;
use crate::downloader::transcoder::EncodeProfile;

const GIB: f64 = 1024.0 * 1024.0 * 1024.0;

/// 1.95 GiB, truncated
pub const DEFAULT_MAX_PART_BYTES: u64 = 2_093_796_556;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Io {
        source: std::io::Error,
        path: PathBuf,
    },
    #[error("failed to parse config {path}: {source}")]
    Parse {
        source: toml::de::Error,
        path: PathBuf,
    },
    #[error("invalid value for {key}: {value:?}")]
    InvalidEnv { key: String, value: String },
    #[error("invalid config: {0}")]
    Invalid(String),
}

pub type Result<T> = std::result::Result<T, ConfigError>;

#[derive(Debug, Clone, Deserialize)]
#[serde(default, rename_all = "snake_case")]
pub struct LeechConfig {
    pub max_part_bytes: u64,
    pub part_tolerance_bytes: u64,
    pub progress_interval_secs: u64,
    pub max_height: u32,
    pub work_root: PathBuf,
    pub ytdlp_path: Option<String>,
    pub ffmpeg_path: Option<String>,
    pub ffprobe_path: Option<String>,
    pub metadata_timeout_secs: u64,
    pub session_ttl_secs: u64,
    pub progress_channel_capacity: usize,
    pub encode: EncodeProfile,
}

impl Default for LeechConfig {
    fn default() -> Self {
        Self {
            max_part_bytes: DEFAULT_MAX_PART_BYTES,
            part_tolerance_bytes: DEFAULT_TOLERANCE_BYTES,
            progress_interval_secs: 5,
            max_height: 1080,
            work_root: std::env::temp_dir(),
            ytdlp_path: None,
            ffmpeg_path: None,
            ffprobe_path: None,
            metadata_timeout_secs: 60,
            session_ttl_secs: 3600,
            progress_channel_capacity: 32,
            encode: EncodeProfile::default(),
        }
    }
}

impl LeechConfig {
    /// Defaults overlaid with environment variables (a `.env` file is read first)
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();
        let mut config = Self::default();
        config.apply_env(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            source,
            path: path.to_path_buf(),
        })?;
        let config: Self = toml::from_str(&content).map_err(|source| ConfigError::Parse {
            source,
            path: path.to_path_buf(),
        })?;
        config.validate()?;
        Ok(config)
    }

    fn apply_env<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(gb) = parse_var::<f64, _>(&lookup, "PART_MAX_GB")? {
            if !gb.is_finite() || gb <= 0.0 {
                return Err(ConfigError::InvalidEnv {
                    key: "PART_MAX_GB".to_string(),
                    value: gb.to_string(),
                });
            }
            self.max_part_bytes = (gb * GIB) as u64;
        }
        if let Some(v) = parse_var(&lookup, "PART_TOLERANCE_BYTES")? {
            self.part_tolerance_bytes = v;
        }
        if let Some(v) = parse_var(&lookup, "PROGRESS_UPDATE_INTERVAL")? {
            self.progress_interval_secs = v;
        }
        if let Some(v) = parse_var(&lookup, "MAX_HEIGHT")? {
            self.max_height = v;
        }
        if let Some(v) = lookup("LEECH_WORK_DIR").filter(|v| !v.is_empty()) {
            self.work_root = PathBuf::from(v);
        }
        if let Some(v) = parse_var(&lookup, "METADATA_TIMEOUT")? {
            self.metadata_timeout_secs = v;
        }
        if let Some(v) = parse_var(&lookup, "SESSION_TTL")? {
            self.session_ttl_secs = v;
        }
        self.ytdlp_path = lookup("YTDLP_PATH").or(self.ytdlp_path.take());
        self.ffmpeg_path = lookup("FFMPEG_PATH").or(self.ffmpeg_path.take());
        self.ffprobe_path = lookup("FFPROBE_PATH").or(self.ffprobe_path.take());
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.max_part_bytes == 0 {
            return Err(ConfigError::Invalid("max_part_bytes must be > 0".to_string()));
        }
        if self.progress_interval_secs == 0 {
            return Err(ConfigError::Invalid(
                "progress_interval_secs must be > 0".to_string(),
            ));
        }
        if self.progress_channel_capacity == 0 {
            return Err(ConfigError::Invalid(
                "progress_channel_capacity must be > 0".to_string(),
            ));
        }
        Ok(())
    }

    pub fn progress_interval(&self) -> Duration {
        Duration::from_secs(self.progress_interval_secs)
    }

    pub fn session_ttl(&self) -> Duration {
        Duration::from_secs(self.session_ttl_secs)
    }
}

fn parse_var<T, F>(lookup: &F, key: &str) -> Result<Option<T>>
where
    T: FromStr,
    F: Fn(&str) -> Option<String>,
{
    match lookup(key) {
        None => Ok(None),
        Some(raw) if raw.trim().is_empty() => Ok(None),
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|_| ConfigError::InvalidEnv {
                key: key.to_string(),
                value: raw,
            }),
    }
}
