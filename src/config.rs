//! Application-level configuration loading, including the team palette and the option
//! tables used to build dialog prompts.

use std::{env, fs, io::ErrorKind, path::PathBuf, time::Duration};

use indexmap::IndexMap;
use serde::Deserialize;
use serde_with::{DurationSeconds, serde_as};
use thiserror::Error;
use time::UtcOffset;
use tracing::{info, warn};

/// Default location on disk where the server looks for the JSON configuration.
const DEFAULT_CONFIG_PATH: &str = "config/app.json";
/// Environment variable that overrides [`DEFAULT_CONFIG_PATH`].
const CONFIG_PATH_ENV: &str = "MATCHDAY_CONFIG_PATH";

/// A single team label together with the marker shown next to it in chat.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaletteEntry {
    /// Stable label persisted on the team (e.g. `red`).
    pub name: String,
    /// Display marker, usually an emoji square.
    pub marker: String,
}

/// Idle-expiry windows shared by both session stores.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionWindows {
    /// An entry idle for longer than this is treated as absent.
    pub idle: Duration,
    /// Interval between two hard cleanup sweeps.
    pub sweep_interval: Duration,
}

/// Static option tables the dialog offers at each step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OptionTables {
    /// Sports, lowercase.
    pub categories: Vec<String>,
    /// Local start hours.
    pub hours: Vec<u8>,
    /// Slot lengths in minutes.
    pub durations_minutes: Vec<u32>,
    /// Players per team.
    pub team_sizes: Vec<u32>,
    /// Teams per event, each at most the palette size.
    pub team_counts: Vec<u32>,
}

/// Connection settings for the bank payment API.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaymentSettings {
    /// Bank API root, without trailing slash.
    pub base_url: String,
    /// Per-request timeout.
    pub timeout: Duration,
}

/// Tuning for the persistent event store connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreSettings {
    /// Database used when `MONGO_DB` is not set.
    pub database: String,
    /// Pings tried before a connection attempt is reported as failed.
    pub connect_attempts: u32,
    /// Upper bound on pooled connections.
    pub max_pool_size: u32,
    /// Server selection and connect timeout.
    pub operation_timeout: Duration,
}

#[derive(Debug, Clone)]
/// Immutable runtime configuration shared across the application.
pub struct AppConfig {
    palette: Vec<PaletteEntry>,
    options: OptionTables,
    sessions: SessionWindows,
    catalog_timeout: Duration,
    utc_offset: UtcOffset,
    payment: PaymentSettings,
    store: StoreSettings,
    transport_token: Option<String>,
}

/// Reasons a parsed configuration file is rejected.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    /// `palette` has no entry.
    #[error("team palette must not be empty")]
    EmptyPalette,
    /// `categories` has no entry.
    #[error("category list must not be empty")]
    NoCategories,
    /// A team count option is zero or larger than the palette (option, palette size).
    #[error("team count option {0} exceeds the palette size {1}")]
    TeamCountOutOfPalette(u32, usize),
    /// An hour option above 23.
    #[error("hour option {0} is not a valid hour of day")]
    InvalidHour(u8),
    /// Offset outside what [`UtcOffset`] accepts.
    #[error("utc offset {0}h is out of range")]
    InvalidOffset(i8),
    /// A duration field set to zero.
    #[error("`{0}` must be at least one second")]
    ZeroDuration(&'static str),
    /// A count field set to zero.
    #[error("`{0}` must be at least one")]
    ZeroCount(&'static str),
    /// `store_database` is blank.
    #[error("store database name must not be empty")]
    EmptyDatabase,
}

impl AppConfig {
    /// Load the application configuration from disk, falling back to built-in defaults.
    pub fn load() -> Self {
        let path = resolve_config_path();
        match fs::read_to_string(&path) {
            Ok(contents) => match Self::from_json(&contents) {
                Ok(app_config) => {
                    info!(
                        path = %path.display(),
                        palette = app_config.palette.len(),
                        categories = app_config.options.categories.len(),
                        "loaded configuration"
                    );
                    app_config
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

    /// Parse and validate a JSON configuration document.
    pub fn from_json(contents: &str) -> anyhow::Result<Self> {
        let raw = serde_json::from_str::<RawConfig>(contents)?;
        Ok(Self::try_from(raw)?)
    }

    /// Ordered team palette; team `i` of an event always uses entry `i`.
    pub fn palette(&self) -> &[PaletteEntry] {
        &self.palette
    }

    /// Marker for a team label, or the label itself when it is not in the palette.
    pub fn marker_for<'a>(&'a self, label: &'a str) -> &'a str {
        self.palette
            .iter()
            .find(|entry| entry.name == label)
            .map(|entry| entry.marker.as_str())
            .unwrap_or(label)
    }

    /// Choices offered by the dialog steps.
    pub fn options(&self) -> &OptionTables {
        &self.options
    }

    /// Idle windows of the draft and invite sessions.
    pub fn sessions(&self) -> SessionWindows {
        self.sessions
    }

    /// Upper bound applied to every catalog call.
    pub fn catalog_timeout(&self) -> Duration {
        self.catalog_timeout
    }

    /// Offset of the organizers' local time, used to compute calendar days.
    pub fn utc_offset(&self) -> UtcOffset {
        self.utc_offset
    }

    /// Bank API settings.
    pub fn payment(&self) -> &PaymentSettings {
        &self.payment
    }

    /// Persistent store connection tuning.
    pub fn store(&self) -> &StoreSettings {
        &self.store
    }

    /// Shared secret the chat-transport adapter must present, if configured.
    pub fn transport_token(&self) -> Option<&str> {
        self.transport_token.as_deref()
    }

    /// Override the session windows, mostly useful for tests.
    pub fn with_sessions(mut self, sessions: SessionWindows) -> Self {
        self.sessions = sessions;
        self
    }

    /// Override the catalog timeout.
    pub fn with_catalog_timeout(mut self, timeout: Duration) -> Self {
        self.catalog_timeout = timeout;
        self
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        let raw = RawConfig::default();
        let utc_offset = UtcOffset::from_hms(raw.utc_offset_hours, 0, 0).unwrap_or(UtcOffset::UTC);
        Self::build(raw, utc_offset)
    }
}

#[serde_as]
#[derive(Debug, Deserialize)]
#[serde(default)]
/// JSON representation of the configuration file located at [`DEFAULT_CONFIG_PATH`].
struct RawConfig {
    palette: IndexMap<String, String>,
    categories: Vec<String>,
    hours: Vec<u8>,
    durations_minutes: Vec<u32>,
    team_sizes: Vec<u32>,
    team_counts: Vec<u32>,
    #[serde_as(as = "DurationSeconds<u64>")]
    session_idle_secs: Duration,
    #[serde_as(as = "DurationSeconds<u64>")]
    session_sweep_secs: Duration,
    #[serde_as(as = "DurationSeconds<u64>")]
    catalog_timeout_secs: Duration,
    utc_offset_hours: i8,
    payment_base_url: String,
    #[serde_as(as = "DurationSeconds<u64>")]
    payment_timeout_secs: Duration,
    store_database: String,
    store_connect_attempts: u32,
    store_max_pool_size: u32,
    #[serde_as(as = "DurationSeconds<u64>")]
    store_timeout_secs: Duration,
    transport_token: Option<String>,
}

impl Default for RawConfig {
    fn default() -> Self {
        Self {
            palette: default_palette(),
            categories: default_categories(),
            hours: default_hours(),
            durations_minutes: default_durations(),
            team_sizes: default_team_sizes(),
            team_counts: default_team_counts(),
            session_idle_secs: Duration::from_secs(15 * 60),
            session_sweep_secs: Duration::from_secs(20 * 60),
            catalog_timeout_secs: Duration::from_secs(5),
            utc_offset_hours: 5,
            payment_base_url: default_payment_url(),
            payment_timeout_secs: Duration::from_secs(10),
            store_database: "matchday".into(),
            store_connect_attempts: 10,
            store_max_pool_size: 20,
            store_timeout_secs: Duration::from_secs(5),
            transport_token: None,
        }
    }
}

impl TryFrom<RawConfig> for AppConfig {
    type Error = ConfigError;

    fn try_from(value: RawConfig) -> Result<Self, Self::Error> {
        if value.palette.is_empty() {
            return Err(ConfigError::EmptyPalette);
        }
        if value.categories.is_empty() {
            return Err(ConfigError::NoCategories);
        }
        if let Some(count) = value
            .team_counts
            .iter()
            .find(|count| **count == 0 || **count as usize > value.palette.len())
        {
            return Err(ConfigError::TeamCountOutOfPalette(
                *count,
                value.palette.len(),
            ));
        }
        if let Some(hour) = value.hours.iter().find(|hour| **hour > 23) {
            return Err(ConfigError::InvalidHour(*hour));
        }
        for (field, duration) in [
            ("session_idle_secs", value.session_idle_secs),
            ("session_sweep_secs", value.session_sweep_secs),
            ("catalog_timeout_secs", value.catalog_timeout_secs),
            ("store_timeout_secs", value.store_timeout_secs),
        ] {
            if duration.is_zero() {
                return Err(ConfigError::ZeroDuration(field));
            }
        }
        for (field, count) in [
            ("store_connect_attempts", value.store_connect_attempts),
            ("store_max_pool_size", value.store_max_pool_size),
        ] {
            if count == 0 {
                return Err(ConfigError::ZeroCount(field));
            }
        }
        if value.store_database.trim().is_empty() {
            return Err(ConfigError::EmptyDatabase);
        }
        let utc_offset = UtcOffset::from_hms(value.utc_offset_hours, 0, 0)
            .map_err(|_| ConfigError::InvalidOffset(value.utc_offset_hours))?;

        Ok(Self::build(value, utc_offset))
    }
}

impl AppConfig {
    fn build(value: RawConfig, utc_offset: UtcOffset) -> Self {
        Self {
            palette: value
                .palette
                .into_iter()
                .map(|(name, marker)| PaletteEntry { name, marker })
                .collect(),
            options: OptionTables {
                categories: value.categories,
                hours: value.hours,
                durations_minutes: value.durations_minutes,
                team_sizes: value.team_sizes,
                team_counts: value.team_counts,
            },
            sessions: SessionWindows {
                idle: value.session_idle_secs,
                sweep_interval: value.session_sweep_secs,
            },
            catalog_timeout: value.catalog_timeout_secs,
            utc_offset,
            payment: PaymentSettings {
                base_url: value.payment_base_url,
                timeout: value.payment_timeout_secs,
            },
            store: StoreSettings {
                database: value.store_database,
                connect_attempts: value.store_connect_attempts,
                max_pool_size: value.store_max_pool_size,
                operation_timeout: value.store_timeout_secs,
            },
            transport_token: value.transport_token.filter(|token| !token.is_empty()),
        }
    }
}

/// Resolve the configuration path taking the environment override into account.
fn resolve_config_path() -> PathBuf {
    env::var_os(CONFIG_PATH_ENV)
        .map(PathBuf::from)
        .filter(|path| !path.as_os_str().is_empty())
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH))
}

/// Built-in palette shipped with the binary.
fn default_palette() -> IndexMap<String, String> {
    [
        ("red", "🟥"),
        ("blue", "🟦"),
        ("green", "🟩"),
        ("yellow", "🟨"),
        ("purple", "🟪"),
        ("black", "⬛️"),
        ("brown", "🟫"),
    ]
    .into_iter()
    .map(|(name, marker)| (name.to_owned(), marker.to_owned()))
    .collect()
}

fn default_categories() -> Vec<String> {
    vec!["football".into(), "volleyball".into(), "basketball".into()]
}

fn default_hours() -> Vec<u8> {
    vec![10, 11, 12, 15, 16, 17, 20, 21, 22]
}

fn default_durations() -> Vec<u32> {
    vec![60, 90, 120, 150, 180, 210]
}

fn default_team_sizes() -> Vec<u32> {
    (4..=9).collect()
}

fn default_team_counts() -> Vec<u32> {
    (2..=7).collect()
}

fn default_payment_url() -> String {
    "http://localhost:9090".into()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_keep_seven_distinct_labels() {
        let config = AppConfig::default();
        let names: Vec<_> = config.palette().iter().map(|e| e.name.as_str()).collect();
        assert_eq!(
            names,
            ["red", "blue", "green", "yellow", "purple", "black", "brown"]
        );
        assert_eq!(config.marker_for("blue"), "🟦");
        assert_eq!(config.marker_for("unknown"), "unknown");
    }

    #[test]
    fn partial_file_keeps_defaults_for_missing_fields() {
        let config =
            AppConfig::from_json(r#"{"utc_offset_hours": 3, "session_idle_secs": 30}"#).unwrap();
        assert_eq!(config.utc_offset(), UtcOffset::from_hms(3, 0, 0).unwrap());
        assert_eq!(config.sessions().idle, Duration::from_secs(30));
        assert_eq!(config.palette().len(), 7);
    }

    #[test]
    fn team_count_larger_than_palette_is_rejected() {
        let err = AppConfig::from_json(r#"{"palette": {"red": "R"}, "team_counts": [2]}"#)
            .unwrap_err();
        assert_eq!(
            err.downcast_ref::<ConfigError>(),
            Some(&ConfigError::TeamCountOutOfPalette(2, 1))
        );
    }

    #[test]
    fn zero_sweep_interval_is_rejected() {
        let err = AppConfig::from_json(r#"{"session_sweep_secs": 0}"#).unwrap_err();
        assert_eq!(
            err.downcast_ref::<ConfigError>(),
            Some(&ConfigError::ZeroDuration("session_sweep_secs"))
        );
    }

    #[test]
    fn store_tuning_is_read_from_the_file() {
        let config = AppConfig::from_json(
            r#"{"store_database": "league", "store_max_pool_size": 4, "store_timeout_secs": 2}"#,
        )
        .unwrap();
        let store = config.store();
        assert_eq!(store.database, "league");
        assert_eq!(store.max_pool_size, 4);
        assert_eq!(store.operation_timeout, Duration::from_secs(2));
        assert_eq!(store.connect_attempts, 10);
    }

    #[test]
    fn zero_connect_attempts_are_rejected() {
        let err = AppConfig::from_json(r#"{"store_connect_attempts": 0}"#).unwrap_err();
        assert_eq!(
            err.downcast_ref::<ConfigError>(),
            Some(&ConfigError::ZeroCount("store_connect_attempts"))
        );
    }
}
