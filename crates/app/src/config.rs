use std::fmt;
use std::path::{Path, PathBuf};

use recall_core::model::{RequeuePolicy, SettingsError, StudySettings};
use serde::Deserialize;

pub const PROGRESS_ENV: &str = "RECALL_PROGRESS";
pub const AUDIO_DIR_ENV: &str = "RECALL_AUDIO_DIR";
pub const PLAYER_ENV: &str = "RECALL_PLAYER";

const DEFAULT_PROGRESS: &str = "progress.json";
const DEFAULT_AUDIO_DIR: &str = "audio_files";

/// Optional JSON settings file. Every key may be omitted.
///
/// ```json
/// { "progress": "progress.json", "audio_dir": "audio_files", "player": "mpv --no-video",
///   "session_limit": 20, "new_card_cap": 20, "shuffle": true, "requeue": "immediate" }
/// ```
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct FileConfig {
    pub progress: Option<PathBuf>,
    pub audio_dir: Option<PathBuf>,
    pub player: Option<String>,
    #[serde(flatten)]
    pub study: StudySettings,
}

/// Values given on the command line; `None` leaves the lower layer in place.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Overrides {
    pub config: Option<PathBuf>,
    pub progress: Option<PathBuf>,
    pub audio_dir: Option<PathBuf>,
    pub player: Option<String>,
    pub session_limit: Option<u32>,
    pub new_card_cap: Option<u32>,
    pub shuffle: Option<bool>,
    pub requeue: Option<RequeuePolicy>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppConfig {
    pub progress: PathBuf,
    pub audio_dir: PathBuf,
    pub player: Option<String>,
    pub study: StudySettings,
}

#[derive(Debug)]
pub enum ConfigError {
    Read { path: PathBuf, source: std::io::Error },
    Parse { path: PathBuf, source: serde_json::Error },
    Settings(SettingsError),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::Read { path, source } => {
                write!(f, "cannot read config {}: {source}", path.display())
            }
            ConfigError::Parse { path, source } => {
                write!(f, "invalid config {}: {source}", path.display())
            }
            ConfigError::Settings(err) => write!(f, "invalid settings: {err}"),
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConfigError::Read { source, .. } => Some(source),
            ConfigError::Parse { source, .. } => Some(source),
            ConfigError::Settings(err) => Some(err),
        }
    }
}

impl AppConfig {
    /// Layer defaults, the config file, the environment and then `overrides`.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if the config file cannot be read or parsed, or
    /// the resulting settings are invalid.
    pub fn resolve(
        overrides: &Overrides,
        env: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, ConfigError> {
        let file = match &overrides.config {
            Some(path) => load_file(path)?,
            None => FileConfig::default(),
        };

        let non_empty = |key: &str| env(key).filter(|value| !value.trim().is_empty());

        let progress = overrides
            .progress
            .clone()
            .or_else(|| non_empty(PROGRESS_ENV).map(PathBuf::from))
            .or(file.progress)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_PROGRESS));
        let audio_dir = overrides
            .audio_dir
            .clone()
            .or_else(|| non_empty(AUDIO_DIR_ENV).map(PathBuf::from))
            .or(file.audio_dir)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_AUDIO_DIR));
        let player = overrides
            .player
            .clone()
            .or_else(|| non_empty(PLAYER_ENV))
            .or(file.player);

        let mut study = file.study;
        if let Some(limit) = overrides.session_limit {
            study = study.with_session_limit(limit);
        }
        if let Some(cap) = overrides.new_card_cap {
            study = study.with_new_card_cap(cap);
        }
        if let Some(shuffle) = overrides.shuffle {
            study = study.with_shuffle(shuffle);
        }
        if let Some(requeue) = overrides.requeue {
            study = study.with_requeue(requeue);
        }
        study.validate().map_err(ConfigError::Settings)?;

        Ok(Self {
            progress,
            audio_dir,
            player,
            study,
        })
    }
}

fn load_file(path: &Path) -> Result<FileConfig, ConfigError> {
    let bytes = std::fs::read(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    serde_json::from_slice(&bytes).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })
}

//
// ─── TESTS ─────────────────────────────────────────────────────────────────────
//
