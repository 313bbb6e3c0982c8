//! Application settings structs, defaults and TOML persistence.
//!
//! All structs implement `Serialize`, `Deserialize`, `Default` and `Clone`
//! so they can be round-tripped through TOML files and shared across tasks.

use anyhow::Result;
use serde::{Deserialize, Serialize};

use super::AppPaths;

// ---------------------------------------------------------------------------
// ServerConfig
// ---------------------------------------------------------------------------

/// Where the relay lives and how to talk to it.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Base URL of the relay, including scheme (`ws://` or `wss://`).
    pub url: String,
    /// Path prefix shared by all WebSocket endpoints.
    pub ws_prefix: String,
    /// Non-secret subprotocol offered next to the credential token.  A relay
    /// selects this one so the token never appears in its response.
    pub wire_protocol: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            url: "ws://localhost:8000".into(),
            ws_prefix: "/ws".into(),
            wire_protocol: "pcm-f32le".into(),
        }
    }
}

// ---------------------------------------------------------------------------
// StrategyPreference
// ---------------------------------------------------------------------------

/// Which capture extraction strategy to use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum StrategyPreference {
    /// Probe the input device and pick the best supported strategy.
    Auto,
    /// Always cut blocks on the real-time audio thread.
    OffThread,
    /// Always cut fixed-size blocks on the session task.
    InThread,
}

impl Default for StrategyPreference {
    fn default() -> Self {
        Self::Auto
    }
}

// ---------------------------------------------------------------------------
// AudioConfig
// ---------------------------------------------------------------------------

/// Settings for the capture side of the stream.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AudioConfig {
    /// Sample rate of the PCM carried on the wire, in Hz.
    pub sample_rate: u32,
    /// Block size (samples) for the in-thread capture strategy.
    pub block_size: usize,
    /// Input device name; `None` means the system default.
    pub input_device: Option<String>,
    /// Capture strategy override.
    pub strategy: StrategyPreference,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            sample_rate: 48_000,
            block_size: 4096,
            input_device: None,
            strategy: StrategyPreference::default(),
        }
    }
}

// ---------------------------------------------------------------------------
// PlaybackConfig
// ---------------------------------------------------------------------------

/// What to do when a listener's block queue is full.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum OverflowPolicy {
    /// Discard the oldest queued block to make room (keeps latency bounded).
    DropOldest,
    /// Discard the block that just arrived.
    DropNewest,
}

impl Default for OverflowPolicy {
    fn default() -> Self {
        Self::DropOldest
    }
}

/// Settings for the listener side.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PlaybackConfig {
    /// Upper bound on blocks waiting to be scheduled.
    pub max_queued_blocks: usize,
    /// Policy applied once `max_queued_blocks` is reached.
    pub overflow: OverflowPolicy,
    /// Output device name; `None` means the system default.
    pub output_device: Option<String>,
}

impl Default for PlaybackConfig {
    fn default() -> Self {
        Self {
            max_queued_blocks: 64,
            overflow: OverflowPolicy::default(),
            output_device: None,
        }
    }
}

// ---------------------------------------------------------------------------
// AuthConfig
// ---------------------------------------------------------------------------

/// Credential lookup settings for the sender.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    /// Identity used to look up the secret in the OS keychain.  When unset
    /// the keychain is skipped and the user is prompted.
    pub identity: Option<String>,
    /// Default identity offered by the interactive prompt.
    pub default_identity: String,
    /// Service name under which secrets are stored in the keychain.
    pub keyring_service: String,
    /// Consult the OS keychain at all.
    pub use_keyring: bool,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            identity: None,
            default_identity: "technician".into(),
            keyring_service: "babelcast".into(),
            use_keyring: true,
        }
    }
}

// ---------------------------------------------------------------------------
// AppConfig  (top-level)
// ---------------------------------------------------------------------------

/// Top-level application configuration, serialised as `settings.toml`.
///
/// # Persistence
///
/// ```rust,no_run
/// use babelcast::config::AppConfig;
///
/// // Load (returns Default when file is missing)
/// let config = AppConfig::load().unwrap();
///
/// // Modify and save
/// // config.save().unwrap();
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Relay location.
    pub server: ServerConfig,
    /// Capture settings.
    pub audio: AudioConfig,
    /// Playback settings.
    pub playback: PlaybackConfig,
    /// Sender credential settings.
    pub auth: AuthConfig,
    /// Channel keys offered by the relay.
    pub channels: Vec<String>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            audio: AudioConfig::default(),
            playback: PlaybackConfig::default(),
            auth: AuthConfig::default(),
            channels: vec!["de".into(), "en".into(), "ru".into()],
        }
    }
}

impl AppConfig {
    /// Load configuration from the platform-appropriate `settings.toml`.
    ///
    /// Returns `Ok(AppConfig::default())` when the file does not exist yet
    /// so callers never need to special-case a missing file.
    pub fn load() -> Result<Self> {
        Self::load_from(&AppPaths::new().settings_file)
    }

    /// Load from an explicit path.
    pub fn load_from(path: &std::path::Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&content)?;
        Ok(config)
    }

    /// Save configuration to the platform-appropriate `settings.toml`,
    /// creating parent directories as needed.
    pub fn save(&self) -> Result<()> {
        self.save_to(&AppPaths::new().settings_file)
    }

    /// Save to an explicit path.
    pub fn save_to(&self, path: &std::path::Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = self.to_toml()?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Render the configuration as pretty TOML.
    pub fn to_toml(&self) -> Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Returns `true` when `key` is one of the configured channels.
    pub fn knows_channel(&self, key: &str) -> bool {
        self.channels.iter().any(|c| c == key)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
