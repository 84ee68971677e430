//! Configuration module for scopecore
//!
//! This module handles:
//! - [`AppConfig`]: tunables for triggering, acquisition and session I/O,
//!   persisted as TOML
//! - [`AppState`]: recently used session files, persisted as JSON in the
//!   platform data directory
//!
//! # App Data Location
//!
//! - **Linux**: `~/.local/share/scopecore/`
//! - **macOS**: `~/Library/Application Support/scopecore/`
//! - **Windows**: `%APPDATA%\scopecore\`
//!
//! # Example
//!
//! ```toml
//! [trigger]
//! arm_timeout = "3s"
//! fault_window = "1s"
//!
//! [acquisition]
//! poll_interval = "10ms"
//!
//! [session]
//! default_format = "densev1"
//! ```

use crate::codec::WaveformFormat;
use crate::error::{Result, ScopeError};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

/// Application identifier for data directories
pub const APP_ID: &str = "scopecore";

/// App state filename
pub const APP_STATE_FILE: &str = "app_state.json";

/// Session document extension
pub const SESSION_FILE_EXTENSION: &str = "scopesession";

/// Maximum number of recent sessions to remember
pub const MAX_RECENT_SESSIONS: usize = 10;

// ==================== App Data Directory ====================

/// Get the application data directory path
pub fn app_data_dir() -> Option<PathBuf> {
    dirs_next::data_dir().map(|p| p.join(APP_ID))
}

/// Ensure the app data directory exists
pub fn ensure_app_data_dir() -> Result<PathBuf> {
    let dir = app_data_dir().ok_or_else(|| {
        ScopeError::Config("Could not determine app data directory".to_string())
    })?;

    if !dir.exists() {
        std::fs::create_dir_all(&dir).map_err(|e| {
            ScopeError::Config(format!("Failed to create app data directory: {}", e))
        })?;
    }

    Ok(dir)
}

/// Get the path to the app state file
pub fn app_state_path() -> Option<PathBuf> {
    app_data_dir().map(|p| p.join(APP_STATE_FILE))
}

// ==================== App Config ====================

/// Trigger coordination tunables
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TriggerConfig {
    /// How long a secondary may take to report armed before it is re-armed
    #[serde(with = "humantime_serde")]
    pub arm_timeout: Duration,

    /// Re-arm attempts per secondary before giving up for this cycle
    pub arm_retry_limit: u32,

    /// Sleep between armed-flag polls
    #[serde(with = "humantime_serde")]
    pub arm_poll_interval: Duration,

    /// Free-run: how long secondaries may lag the primary's capture
    #[serde(with = "humantime_serde")]
    pub fault_window: Duration,
}

impl Default for TriggerConfig {
    fn default() -> Self {
        Self {
            arm_timeout: Duration::from_secs(3),
            arm_retry_limit: 5,
            arm_poll_interval: Duration::from_millis(1),
            fault_window: Duration::from_secs(1),
        }
    }
}

/// Polling thread tunables
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AcquisitionConfig {
    /// Poll timer tick
    #[serde(with = "humantime_serde")]
    pub poll_interval: Duration,

    /// Buffer size for channel communication
    pub channel_buffer_size: usize,
}

impl Default for AcquisitionConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(10),
            channel_buffer_size: 256,
        }
    }
}

/// Session save/load tunables
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Captured events kept in the waveform history
    pub history_depth: usize,

    /// Body format for waveforms that are not dense-packed
    #[serde(
        serialize_with = "serialize_format",
        deserialize_with = "deserialize_format"
    )]
    pub default_format: WaveformFormat,

    /// Progress report interval during bulk loads
    #[serde(with = "humantime_serde")]
    pub progress_interval: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            history_depth: 10,
            default_format: WaveformFormat::SparseV1,
            progress_interval: Duration::from_millis(50),
        }
    }
}

fn serialize_format<S: Serializer>(format: &WaveformFormat, s: S) -> std::result::Result<S::Ok, S::Error> {
    s.serialize_str(format.as_str())
}

fn deserialize_format<'de, D: Deserializer<'de>>(d: D) -> std::result::Result<WaveformFormat, D::Error> {
    let tag = String::deserialize(d)?;
    tag.parse().map_err(serde::de::Error::custom)
}

/// Main application configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct AppConfig {
    #[serde(default)]
    pub trigger: TriggerConfig,

    #[serde(default)]
    pub acquisition: AcquisitionConfig,

    #[serde(default)]
    pub session: SessionConfig,
}

impl AppConfig {
    /// Create a new default configuration
    pub fn new() -> Self {
        Self::default()
    }

    /// Load from a TOML file; missing keys take their defaults
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            ScopeError::Config(format!("Failed to read config file {:?}: {}", path, e))
        })?;
        Self::from_toml(&content)
            .map_err(|e| e.with_context(format!("Failed to parse config file {:?}", path)))
    }

    /// Load from a TOML file, returning defaults if the file is absent or bad
    pub fn load_or_default(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref();
        if !path.exists() {
            return Self::default();
        }
        Self::load(path).unwrap_or_else(|e| {
            tracing::warn!("Failed to load config, using defaults: {}", e);
            Self::default()
        })
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| ScopeError::Config(e.to_string()))
    }

    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).map_err(|e| ScopeError::Config(e.to_string()))
    }

    /// Save as TOML
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        std::fs::write(path, self.to_toml()?).map_err(|e| {
            ScopeError::Config(format!("Failed to write config file {:?}: {}", path, e))
        })
    }
}

// ==================== Recent Session Entry ====================

fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(SystemTime::UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

/// Information about a recently opened session
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecentSession {
    /// Path to the `.scopesession` document
    pub path: PathBuf,

    /// Number of instruments in the session when last used
    #[serde(default)]
    pub instrument_count: usize,

    /// Last opened timestamp (Unix seconds)
    pub last_opened: u64,
}

impl RecentSession {
    pub fn new(path: impl Into<PathBuf>, instrument_count: usize) -> Self {
        Self {
            path: path.into(),
            instrument_count,
            last_opened: unix_now(),
        }
    }

    /// Check if the session document still exists
    pub fn exists(&self) -> bool {
        self.path.exists()
    }
}

// ==================== App State ====================

/// Persistent application state
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppState {
    /// Version for future migration support
    #[serde(default = "default_app_state_version")]
    pub version: u32,

    /// Recently opened sessions, most recent first
    #[serde(default)]
    pub recent_sessions: Vec<RecentSession>,

    /// Path to the last opened session
    #[serde(default)]
    pub last_session_path: Option<PathBuf>,
}

fn default_app_state_version() -> u32 {
    1
}

impl Default for AppState {
    fn default() -> Self {
        Self {
            version: 1,
            recent_sessions: Vec::new(),
            last_session_path: None,
        }
    }
}

impl AppState {
    /// Load app state from the default location
    pub fn load() -> Result<Self> {
        let path = app_state_path().ok_or_else(|| {
            ScopeError::Config("Could not determine app state path".to_string())
        })?;
        Self::load_from(&path)
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path)
            .map_err(|e| ScopeError::Config(format!("Failed to read app state: {}", e)))?;

        serde_json::from_str(&content)
            .map_err(|e| ScopeError::Config(format!("Failed to parse app state: {}", e)))
    }

    /// Load app state, returning defaults on any error
    pub fn load_or_default() -> Self {
        Self::load().unwrap_or_else(|e| {
            tracing::warn!("Failed to load app state, using defaults: {}", e);
            Self::default()
        })
    }

    /// Save app state to the default location
    pub fn save(&self) -> Result<()> {
        let dir = ensure_app_data_dir()?;
        self.save_to(&dir.join(APP_STATE_FILE))
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        let content = serde_json::to_string_pretty(self)
            .map_err(|e| ScopeError::Config(format!("Failed to serialize app state: {}", e)))?;

        std::fs::write(path, content)
            .map_err(|e| ScopeError::Config(format!("Failed to write app state: {}", e)))
    }

    /// Add or refresh a recent session
    pub fn add_recent_session(&mut self, path: impl AsRef<Path>, instrument_count: usize) {
        let path = path.as_ref().to_path_buf();

        self.recent_sessions.retain(|s| s.path != path);
        self.recent_sessions
            .insert(0, RecentSession::new(path.clone(), instrument_count));
        self.recent_sessions.truncate(MAX_RECENT_SESSIONS);

        self.last_session_path = Some(path);
    }

    /// Drop recents whose documents no longer exist
    pub fn cleanup_missing_sessions(&mut self) {
        self.recent_sessions.retain(|s| s.exists());

        if let Some(ref last) = self.last_session_path {
            if !last.exists() {
                self.last_session_path = None;
            }
        }
    }

    /// The most recent session path, if it still exists
    pub fn last_session(&self) -> Option<&Path> {
        self.last_session_path
            .as_ref()
            .filter(|p| p.exists())
            .map(|p| p.as_path())
    }
}

// ==================== Tests ====================
