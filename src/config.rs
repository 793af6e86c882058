//! Application-level configuration loading, including the timing knobs of the
//! session engine.

use std::{env, fs, io::ErrorKind, path::PathBuf, time::Duration};

use serde::Deserialize;
use tracing::{info, warn};

/// Default location on disk where the server looks for the JSON configuration.
const DEFAULT_CONFIG_PATH: &str = "config/app.json";
/// Environment variable that overrides [`DEFAULT_CONFIG_PATH`].
const CONFIG_PATH_ENV: &str = "QUIZPIN_BACK_CONFIG_PATH";

const DEFAULT_COUNTDOWN_TICK_MS: u64 = 1_000;
const DEFAULT_REFRACTORY_MS: u64 = 500;
const DEFAULT_STORE_POLL_MS: u64 = 500;
const DEFAULT_SNAPSHOT_CAPACITY: usize = 16;
const DEFAULT_MAX_PIN_ATTEMPTS: u32 = 32;
const DEFAULT_NICKNAME_MAX_CHARS: usize = 24;

/// Immutable runtime configuration shared across the application.
#[derive(Debug, Clone)]
pub struct AppConfig {
    countdown_tick: Duration,
    refractory: Duration,
    store_poll: Duration,
    snapshot_capacity: usize,
    max_pin_attempts: u32,
    nickname_max_chars: usize,
}

impl AppConfig {
    /// Load the application configuration from disk, falling back to baked-in
    /// defaults when the file is absent or unreadable.
    pub fn load() -> Self {
        let path = resolve_config_path();
        match fs::read_to_string(&path) {
            Ok(contents) => match serde_json::from_str::<RawConfig>(&contents) {
                Ok(raw) => {
                    let config: Self = raw.into();
                    info!(path = %path.display(), "loaded configuration");
                    config
                }
                Err(err) => {
                    warn!(
                        path = %path.display(),
                        error = %err,
                        "failed to parse config; falling back to defaults"
                    );
                    Self::default()
                }
            },
            Err(err) if err.kind() == ErrorKind::NotFound => {
                info!(
                    path = %path.display(),
                    "config file not found; using built-in defaults"
                );
                Self::default()
            }
            Err(err) => {
                warn!(
                    path = %path.display(),
                    error = %err,
                    "failed to read config; falling back to defaults"
                );
                Self::default()
            }
        }
    }

    /// Interval between countdown decrements.
    pub fn countdown_tick(&self) -> Duration {
        self.countdown_tick
    }

    /// Refractory window of the advisory flow machine.
    pub fn refractory(&self) -> Duration {
        self.refractory
    }

    /// Poll interval of document watchers on backends without native change
    /// streams.
    pub fn store_poll(&self) -> Duration {
        self.store_poll
    }

    /// Buffered snapshots per subscriber before it lags.
    pub fn snapshot_capacity(&self) -> usize {
        self.snapshot_capacity
    }

    /// How often PIN generation retries before giving up.
    pub fn max_pin_attempts(&self) -> u32 {
        self.max_pin_attempts
    }

    /// Longest accepted nickname, in characters.
    pub fn nickname_max_chars(&self) -> usize {
        self.nickname_max_chars
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            countdown_tick: Duration::from_millis(DEFAULT_COUNTDOWN_TICK_MS),
            refractory: Duration::from_millis(DEFAULT_REFRACTORY_MS),
            store_poll: Duration::from_millis(DEFAULT_STORE_POLL_MS),
            snapshot_capacity: DEFAULT_SNAPSHOT_CAPACITY,
            max_pin_attempts: DEFAULT_MAX_PIN_ATTEMPTS,
            nickname_max_chars: DEFAULT_NICKNAME_MAX_CHARS,
        }
    }
}

/// JSON representation of the configuration file located at
/// [`DEFAULT_CONFIG_PATH`]. Every field is optional; omitted fields keep the
/// baked-in default.
#[derive(Debug, Deserialize)]
struct RawConfig {
    countdown_tick_ms: Option<u64>,
    refractory_ms: Option<u64>,
    store_poll_ms: Option<u64>,
    snapshot_capacity: Option<usize>,
    max_pin_attempts: Option<u32>,
    nickname_max_chars: Option<usize>,
}

impl From<RawConfig> for AppConfig {
    fn from(value: RawConfig) -> Self {
        let defaults = AppConfig::default();
        Self {
            countdown_tick: value
                .countdown_tick_ms
                .map(Duration::from_millis)
                .unwrap_or(defaults.countdown_tick),
            refractory: value
                .refractory_ms
                .map(Duration::from_millis)
                .unwrap_or(defaults.refractory),
            store_poll: value
                .store_poll_ms
                .map(Duration::from_millis)
                .unwrap_or(defaults.store_poll),
            snapshot_capacity: value
                .snapshot_capacity
                .unwrap_or(defaults.snapshot_capacity),
            max_pin_attempts: value.max_pin_attempts.unwrap_or(defaults.max_pin_attempts),
            nickname_max_chars: value
                .nickname_max_chars
                .unwrap_or(defaults.nickname_max_chars),
        }
    }
}

fn resolve_config_path() -> PathBuf {
    env::var(CONFIG_PATH_ENV)
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from(DEFAULT_CONFIG_PATH))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_sane() {
        let config = AppConfig::default();
        assert_eq!(config.countdown_tick(), Duration::from_secs(1));
        assert_eq!(config.refractory(), Duration::from_millis(500));
        assert!(config.max_pin_attempts() > 0);
    }

    #[test]
    fn partial_config_keeps_remaining_defaults() {
        let raw: RawConfig = serde_json::from_str(r#"{"countdown_tick_ms": 250}"#).unwrap();
        let config: AppConfig = raw.into();
        assert_eq!(config.countdown_tick(), Duration::from_millis(250));
        assert_eq!(config.refractory(), Duration::from_millis(500));
    }
}
