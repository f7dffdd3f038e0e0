use derive_more::derive::From;
use foundation_workers::scenarios::{BoundedConfig, DispatchAckConfig, RendezvousConfig};
use serde::de::DeserializeOwned;
use serde::Deserialize;

#[derive(Debug, From)]
pub enum ConfigError {
    #[from(ignore)]
    IOError(std::io::Error),

    #[from(ignore)]
    DeserializationFailed(toml::de::Error),

    Invalid(&'static str),
}

impl From<toml::de::Error> for ConfigError {
    fn from(value: toml::de::Error) -> Self {
        Self::DeserializationFailed(value)
    }
}

impl From<std::io::Error> for ConfigError {
    fn from(value: std::io::Error) -> Self {
        Self::IOError(value)
    }
}

impl std::error::Error for ConfigError {}

impl core::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{self:?}")
    }
}

pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

/// Reads and deserializes any TOML document at `target`.
pub fn from_path<T, V>(target: V) -> ConfigResult<T>
where
    T: DeserializeOwned,
    V: Into<std::path::PathBuf>,
{
    let target_path = target.into();
    let config_content = std::fs::read_to_string(target_path)?;
    let config_obj: T = toml::from_str(&config_content)?;
    Ok(config_obj)
}

/// Settings for every demo scenario. Missing tables and keys fall back to
/// the scenario defaults, so an empty file is a valid config.
///
/// ```toml
/// [dispatch]
/// workers = 3
///
/// [rendezvous]
/// meeting_points = 4
///
/// [bounded]
/// workers = 6
/// capacity = 2
/// fair = true
/// ```
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct DemoConfig {
    pub dispatch: DispatchAckConfig,
    pub rendezvous: RendezvousConfig,
    pub bounded: BoundedConfig,
}

impl DemoConfig {
    /// Loads and validates a config file.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::IOError`] or [`ConfigError::DeserializationFailed`]
    /// when the file cannot be read or parsed, and [`ConfigError::Invalid`]
    /// when a value is out of range.
    pub fn from_path<V: Into<std::path::PathBuf>>(target: V) -> ConfigResult<Self> {
        let config: Self = from_path(target)?;
        config.validate()?;
        Ok(config)
    }

    /// Parses and validates a TOML document.
    ///
    /// # Errors
    ///
    /// See [`DemoConfig::from_path`].
    pub fn from_toml(content: &str) -> ConfigResult<Self> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Rejects values no scenario can run with.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] naming the first bad value.
    pub fn validate(&self) -> ConfigResult<()> {
        if self.dispatch.workers == 0 {
            return Err(ConfigError::Invalid("dispatch.workers must be > 0"));
        }
        if self.rendezvous.workers == 0 {
            return Err(ConfigError::Invalid("rendezvous.workers must be > 0"));
        }
        if self.rendezvous.meeting_points == 0 {
            return Err(ConfigError::Invalid("rendezvous.meeting_points must be > 0"));
        }
        if self.bounded.workers == 0 {
            return Err(ConfigError::Invalid("bounded.workers must be > 0"));
        }
        if self.bounded.capacity == 0 {
            return Err(ConfigError::Invalid("bounded.capacity must be > 0"));
        }
        if self.bounded.capacity >= self.bounded.workers {
            tracing::warn!(
                "bounded.capacity {} >= bounded.workers {}, admission never blocks",
                self.bounded.capacity,
                self.bounded.workers
            );
        }
        Ok(())
    }

    /// Overrides the worker count of every scenario.
    #[must_use]
    pub fn with_workers(mut self, workers: usize) -> Self {
        self.dispatch.workers = workers;
        self.rendezvous.workers = workers;
        self.bounded.workers = workers;
        self
    }
}
