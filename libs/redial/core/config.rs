use crate::events::{TimestampFormat, DEFAULT_PREFIX, TYPE_SEPARATOR};
use crate::traits::*;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::info;

/// Hook invoked with the raw socket handle on every successful open
pub type OnOpenHook = Arc<dyn Fn(&SocketHandle) + Send + Sync>;

/// Default base interval between reconnect attempts
pub const DEFAULT_RECONNECT_INTERVAL: Duration = Duration::from_millis(2000);

/// Default cap on the reconnect interval
pub const DEFAULT_MAX_RECONNECT_INTERVAL: Duration = Duration::from_secs(30);

/// Default window for a connection attempt to open or fail
pub const DEFAULT_ATTEMPT_TIMEOUT: Duration = Duration::from_millis(3000);

/// Configuration for a [`ConnectionManager`](crate::core::connection::ConnectionManager)
///
/// Immutable once built. Use [`ManagerOptions::builder`] or
/// [`RedialConfig`] to create one.
pub struct ManagerOptions {
    /// Namespace for every notification and command type
    pub(crate) prefix: String,

    /// Delay before the first retry; later retries back off exponentially
    pub(crate) reconnect_interval: Duration,

    /// Upper bound on the backoff delay
    pub(crate) max_reconnect_interval: Duration,

    /// Retries per cycle before abandoning (None = forever)
    pub(crate) max_retries: Option<usize>,

    /// When false, a socket-initiated close ends the cycle without retrying
    pub(crate) reconnect_on_close: bool,

    /// Window for an attempt to open before it is forced closed (zero = no timeout)
    pub(crate) attempt_timeout: Duration,

    /// How `meta.timestamp` is rendered
    pub(crate) timestamp_format: TimestampFormat,

    /// SEND payload serializer; SEND fails without one
    pub(crate) serializer: Option<Arc<dyn Serializer>>,

    /// Raw socket access on every open
    pub(crate) on_open: Option<OnOpenHook>,

    /// Overrides the exponential backoff built from the intervals above
    pub(crate) strategy: Option<Box<dyn ReconnectionStrategy>>,
}

impl ManagerOptions {
    pub fn builder() -> ManagerOptionsBuilder {
        ManagerOptionsBuilder::new()
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    pub fn reconnect_interval(&self) -> Duration {
        self.reconnect_interval
    }

    pub fn max_reconnect_interval(&self) -> Duration {
        self.max_reconnect_interval
    }

    pub fn max_retries(&self) -> Option<usize> {
        self.max_retries
    }

    /// Whether the built-in backoff retries without bound
    ///
    /// A custom [`reconnect_strategy`](ManagerOptionsBuilder::reconnect_strategy)
    /// carries its own budget; this then only reflects that `max_retries`
    /// was left unset.
    pub fn is_forever(&self) -> bool {
        self.max_retries.is_none()
    }

    pub fn reconnect_on_close(&self) -> bool {
        self.reconnect_on_close
    }

    pub fn attempt_timeout(&self) -> Duration {
        self.attempt_timeout
    }

    pub fn timestamp_format(&self) -> TimestampFormat {
        self.timestamp_format
    }

    pub fn has_serializer(&self) -> bool {
        self.serializer.is_some()
    }

    pub fn has_on_open(&self) -> bool {
        self.on_open.is_some()
    }

    /// Take the backoff strategy; falls back to exponential backoff
    pub(crate) fn take_strategy(&mut self) -> Box<dyn ReconnectionStrategy> {
        self.strategy.take().unwrap_or_else(|| {
            Box::new(ExponentialBackoff::new(
                self.reconnect_interval,
                self.max_reconnect_interval,
                self.max_retries,
            ))
        })
    }
}

impl Default for ManagerOptions {
    fn default() -> Self {
        Self {
            prefix: DEFAULT_PREFIX.to_string(),
            reconnect_interval: DEFAULT_RECONNECT_INTERVAL,
            max_reconnect_interval: DEFAULT_MAX_RECONNECT_INTERVAL,
            max_retries: None,
            reconnect_on_close: true,
            attempt_timeout: DEFAULT_ATTEMPT_TIMEOUT,
            timestamp_format: TimestampFormat::default(),
            serializer: Some(Arc::new(JsonSerializer)),
            on_open: None,
            strategy: None,
        }
    }
}

impl fmt::Debug for ManagerOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ManagerOptions")
            .field("prefix", &self.prefix)
            .field("reconnect_interval", &self.reconnect_interval)
            .field("max_reconnect_interval", &self.max_reconnect_interval)
            .field("max_retries", &self.max_retries)
            .field("reconnect_on_close", &self.reconnect_on_close)
            .field("attempt_timeout", &self.attempt_timeout)
            .field("timestamp_format", &self.timestamp_format)
            .field("has_serializer", &self.serializer.is_some())
            .field("has_on_open", &self.on_open.is_some())
            .field("custom_strategy", &self.strategy.is_some())
            .finish()
    }
}

/// Builder for [`ManagerOptions`]
pub struct ManagerOptionsBuilder {
    options: ManagerOptions,
}

impl ManagerOptionsBuilder {
    pub fn new() -> Self {
        Self {
            options: ManagerOptions::default(),
        }
    }

    pub fn prefix(mut self, prefix: impl Into<String>) -> Self {
        self.options.prefix = prefix.into();
        self
    }

    pub fn reconnect_interval(mut self, interval: Duration) -> Self {
        self.options.reconnect_interval = interval;
        self
    }

    pub fn max_reconnect_interval(mut self, interval: Duration) -> Self {
        self.options.max_reconnect_interval = interval;
        self
    }

    /// Abandon after `max` retries in one cycle (None = forever)
    pub fn max_retries(mut self, max: Option<usize>) -> Self {
        self.options.max_retries = max;
        self
    }

    /// Never abandon
    pub fn forever(self) -> Self {
        self.max_retries(None)
    }

    pub fn reconnect_on_close(mut self, enabled: bool) -> Self {
        self.options.reconnect_on_close = enabled;
        self
    }

    /// How long an attempt may stay unopened; `Duration::ZERO` disables the timeout
    pub fn attempt_timeout(mut self, timeout: Duration) -> Self {
        self.options.attempt_timeout = timeout;
        self
    }

    pub fn timestamp_format(mut self, format: TimestampFormat) -> Self {
        self.options.timestamp_format = format;
        self
    }

    pub fn serializer(mut self, serializer: impl Serializer) -> Self {
        self.options.serializer = Some(Arc::new(serializer));
        self
    }

    /// Remove the serializer; SEND then fails with a configuration error
    pub fn without_serializer(mut self) -> Self {
        self.options.serializer = None;
        self
    }

    pub fn on_open<F>(mut self, hook: F) -> Self
    where
        F: Fn(&SocketHandle) + Send + Sync + 'static,
    {
        self.options.on_open = Some(Arc::new(hook));
        self
    }

    /// Replace the default exponential backoff
    ///
    /// The strategy decides when to give up, so it cannot be combined with
    /// [`max_retries`](Self::max_retries).
    pub fn reconnect_strategy(mut self, strategy: impl ReconnectionStrategy + 'static) -> Self {
        self.options.strategy = Some(Box::new(strategy));
        self
    }

    pub fn build(self) -> Result<ManagerOptions> {
        let options = self.options;
        validate_prefix(&options.prefix).map_err(RedialError::Configuration)?;
        if options.max_reconnect_interval < options.reconnect_interval {
            return Err(RedialError::Configuration(format!(
                "max reconnect interval {:?} is below reconnect interval {:?}",
                options.max_reconnect_interval, options.reconnect_interval
            )));
        }
        if options.strategy.is_some() && options.max_retries.is_some() {
            return Err(RedialError::Configuration(
                "max_retries has no effect with a custom reconnect strategy".to_string(),
            ));
        }
        Ok(options)
    }
}

impl Default for ManagerOptionsBuilder {
    fn default() -> Self {
        Self::new()
    }
}

fn validate_prefix(prefix: &str) -> std::result::Result<(), String> {
    if prefix.is_empty() {
        return Err("prefix must not be empty".to_string());
    }
    if prefix.contains(TYPE_SEPARATOR) {
        return Err(format!("prefix '{}' must not contain '{}'", prefix, TYPE_SEPARATOR));
    }
    Ok(())
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to load config file: {0}")]
    FileError(#[from] std::io::Error),

    #[error("Failed to parse YAML: {0}")]
    YamlError(#[from] serde_yaml::Error),

    #[error("Invalid configuration: {0}")]
    ValidationError(String),
}

impl From<ConfigError> for RedialError {
    fn from(e: ConfigError) -> Self {
        RedialError::Configuration(e.to_string())
    }
}

/// File-based connection configuration
///
/// ```yaml
/// prefix: MARKET_FEED
/// reconnect_interval_ms: 1000
/// max_reconnect_interval_ms: 20000
/// max_retries: 10
/// reconnect_on_close: true
/// attempt_timeout_ms: 3000
/// timestamp_format: string
/// ```
///
/// Every key is optional. `attempt_timeout_ms: 0` disables the attempt timeout.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RedialConfig {
    #[serde(default = "default_prefix")]
    pub prefix: String,
    #[serde(default = "default_reconnect_interval_ms")]
    pub reconnect_interval_ms: u64,
    #[serde(default = "default_max_reconnect_interval_ms")]
    pub max_reconnect_interval_ms: u64,
    /// Omitted or null = retry forever
    #[serde(default)]
    pub max_retries: Option<usize>,
    #[serde(default = "default_reconnect_on_close")]
    pub reconnect_on_close: bool,
    #[serde(default = "default_attempt_timeout_ms")]
    pub attempt_timeout_ms: u64,
    #[serde(default)]
    pub timestamp_format: TimestampFormat,
}

fn default_prefix() -> String {
    DEFAULT_PREFIX.to_string()
}

fn default_reconnect_interval_ms() -> u64 {
    DEFAULT_RECONNECT_INTERVAL.as_millis() as u64
}

fn default_max_reconnect_interval_ms() -> u64 {
    DEFAULT_MAX_RECONNECT_INTERVAL.as_millis() as u64
}

fn default_reconnect_on_close() -> bool {
    true
}

fn default_attempt_timeout_ms() -> u64 {
    DEFAULT_ATTEMPT_TIMEOUT.as_millis() as u64
}

impl Default for RedialConfig {
    fn default() -> Self {
        Self {
            prefix: default_prefix(),
            reconnect_interval_ms: default_reconnect_interval_ms(),
            max_reconnect_interval_ms: default_max_reconnect_interval_ms(),
            max_retries: None,
            reconnect_on_close: default_reconnect_on_close(),
            attempt_timeout_ms: default_attempt_timeout_ms(),
            timestamp_format: TimestampFormat::default(),
        }
    }
}

impl RedialConfig {
    /// Load configuration from a YAML file
    pub fn load(config_path: impl AsRef<Path>) -> std::result::Result<Self, ConfigError> {
        let path = config_path.as_ref();
        let yaml_content = std::fs::read_to_string(path)?;
        let config = Self::from_yaml_str(&yaml_content)?;
        info!("Loaded connection config '{}' from {}", config.prefix, path.display());
        Ok(config)
    }

    /// Parse and validate configuration from YAML text
    pub fn from_yaml_str(yaml: &str) -> std::result::Result<Self, ConfigError> {
        let config: RedialConfig = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate configuration values
    pub fn validate(&self) -> std::result::Result<(), ConfigError> {
        validate_prefix(&self.prefix).map_err(ConfigError::ValidationError)?;

        if self.max_reconnect_interval_ms < self.reconnect_interval_ms {
            return Err(ConfigError::ValidationError(
                "max_reconnect_interval_ms must be >= reconnect_interval_ms".to_string(),
            ));
        }

        Ok(())
    }

    /// Builder pre-filled from this config; add hooks or a serializer, then build
    pub fn to_builder(&self) -> ManagerOptionsBuilder {
        ManagerOptions::builder()
            .prefix(self.prefix.clone())
            .reconnect_interval(Duration::from_millis(self.reconnect_interval_ms))
            .max_reconnect_interval(Duration::from_millis(self.max_reconnect_interval_ms))
            .max_retries(self.max_retries)
            .reconnect_on_close(self.reconnect_on_close)
            .attempt_timeout(Duration::from_millis(self.attempt_timeout_ms))
            .timestamp_format(self.timestamp_format)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let options = ManagerOptions::default();
        assert_eq!(options.prefix(), DEFAULT_PREFIX);
        assert_eq!(options.attempt_timeout(), Duration::from_millis(3000));
        assert!(options.is_forever());
        assert!(options.has_serializer());
        assert!(options.reconnect_on_close());
    }

    #[test]
    fn test_builder_validation() {
        assert!(matches!(
            ManagerOptions::builder().prefix("").build(),
            Err(RedialError::Configuration(_))
        ));
        assert!(matches!(
            ManagerOptions::builder().prefix("A::B").build(),
            Err(RedialError::Configuration(_))
        ));
        assert!(matches!(
            ManagerOptions::builder()
                .reconnect_interval(Duration::from_secs(10))
                .max_reconnect_interval(Duration::from_secs(1))
                .build(),
            Err(RedialError::Configuration(_))
        ));
    }

    #[test]
    fn test_yaml_config_into_options() {
        let yaml = r#"
prefix: MARKET_FEED
reconnect_interval_ms: 500
max_reconnect_interval_ms: 8000
max_retries: 4
timestamp_format: string
"#;
        let config = RedialConfig::from_yaml_str(yaml).unwrap();
        assert!(config.reconnect_on_close);
        assert_eq!(config.attempt_timeout_ms, 3000);

        let options = config.to_builder().without_serializer().build().unwrap();
        assert_eq!(options.prefix(), "MARKET_FEED");
        assert_eq!(options.reconnect_interval(), Duration::from_millis(500));
        assert_eq!(options.max_retries(), Some(4));
        assert_eq!(options.timestamp_format(), TimestampFormat::String);
        assert!(!options.has_serializer());
    }

    #[test]
    fn test_yaml_validation_errors() {
        assert!(matches!(
            RedialConfig::from_yaml_str("prefix: ''"),
            Err(ConfigError::ValidationError(_))
        ));
        assert!(matches!(
            RedialConfig::from_yaml_str("reconnect_interval_ms: 5000\nmax_reconnect_interval_ms: 10"),
            Err(ConfigError::ValidationError(_))
        ));
        assert!(matches!(
            RedialConfig::from_yaml_str("max_retries: [oops]"),
            Err(ConfigError::YamlError(_))
        ));
    }

    #[test]
    fn test_custom_strategy_rejects_max_retries() {
        let result = ManagerOptions::builder()
            .max_retries(Some(3))
            .reconnect_strategy(FixedDelay::new(Duration::from_millis(100), Some(5)))
            .build();
        assert!(matches!(result, Err(RedialError::Configuration(_))));

        let mut options = ManagerOptions::builder()
            .reconnect_strategy(FixedDelay::new(Duration::from_millis(100), Some(5)))
            .build()
            .unwrap();
        let strategy = options.take_strategy();
        assert_eq!(strategy.next_delay(4), Some(Duration::from_millis(100)));
        assert!(strategy.next_delay(5).is_none());
    }

    #[test]
    fn test_zero_attempt_timeout_means_none_on_both_paths() {
        let built = ManagerOptions::builder()
            .attempt_timeout(Duration::ZERO)
            .build()
            .unwrap();
        assert!(built.attempt_timeout().is_zero());

        let config = RedialConfig::from_yaml_str("attempt_timeout_ms: 0").unwrap();
        let loaded = config.to_builder().build().unwrap();
        assert!(loaded.attempt_timeout().is_zero());
    }

    #[test]
    fn test_empty_yaml_is_default() {
        // serde_yaml treats an empty document as unit, so use an empty mapping
        let config = RedialConfig::from_yaml_str("{}").unwrap();
        assert_eq!(config, RedialConfig::default());
    }
}
