//! Configuration for certificate storage.
//!
//! This module provides [`StorageConfig`], the options shared by every
//! object-store flavour: the object-name prefix, the optional at-rest
//! encryption key, lease-lock timing ([`LockConfig`]) and per-call time
//! bounds ([`TimeoutConfig`]).
//!
//! All durations (de)serialize as human-readable strings (`"15s"`, `"2m"`).

use std::{fmt, time::Duration};

use serde::{Deserialize, Serialize};

use crate::{
    codec::{Codec, KEY_SIZE},
    error::ConfigError,
};

/// Default object-name prefix.
pub const DEFAULT_PREFIX: &str = "acme";

/// Default time a caller waits for a lease, and the age after which a lease
/// is considered stale.
pub const DEFAULT_LOCK_TIMEOUT: Duration = Duration::from_secs(15);

/// Default interval between lease polls.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Default lease expiration advertised to external garbage collection.
pub const DEFAULT_LOCK_EXPIRATION: Duration = Duration::from_secs(120);

/// Default bound on a single read call (get/stat).
pub const DEFAULT_READ_TIMEOUT: Duration = Duration::from_secs(30);

/// Default bound on a single write call (put/delete).
pub const DEFAULT_WRITE_TIMEOUT: Duration = Duration::from_secs(30);

/// Default bound on a single listing.
pub const DEFAULT_LIST_TIMEOUT: Duration = Duration::from_secs(60);

fn ensure_positive(field: &'static str, value: Duration) -> Result<(), ConfigError> {
    if value.is_zero() {
        return Err(ConfigError::MustBePositive { field, value: format!("{value:?}") });
    }
    Ok(())
}

/// Timing of the lease-lock protocol.
///
/// # Example
///
/// ```
/// use std::time::Duration;
/// use certstore_storage::LockConfig;
///
/// let config = LockConfig::builder()
///     .lock_timeout(Duration::from_secs(5))
///     .poll_interval(Duration::from_millis(100))
///     .build()?;
/// assert_eq!(config.expiration(), Duration::from_secs(120));
/// # Ok::<(), certstore_storage::ConfigError>(())
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LockConfig {
    /// How long a caller waits, and how old a lease must be to count as stale.
    #[serde(with = "humantime_serde", default = "default_lock_timeout")]
    lock_timeout: Duration,

    /// Sleep between polls of a live lease.
    #[serde(with = "humantime_serde", default = "default_poll_interval")]
    poll_interval: Duration,

    /// Lease lifetime for external cleanup. Acquisition uses `lock_timeout`.
    #[serde(with = "humantime_serde", default = "default_lock_expiration")]
    expiration: Duration,
}

fn default_lock_timeout() -> Duration {
    DEFAULT_LOCK_TIMEOUT
}

fn default_poll_interval() -> Duration {
    DEFAULT_POLL_INTERVAL
}

fn default_lock_expiration() -> Duration {
    DEFAULT_LOCK_EXPIRATION
}

impl Default for LockConfig {
    fn default() -> Self {
        Self {
            lock_timeout: DEFAULT_LOCK_TIMEOUT,
            poll_interval: DEFAULT_POLL_INTERVAL,
            expiration: DEFAULT_LOCK_EXPIRATION,
        }
    }
}

#[bon::bon]
impl LockConfig {
    /// Creates a lock configuration.
    ///
    /// # Optional Fields
    ///
    /// * `lock_timeout` - Wait budget and staleness age (default: 15 seconds).
    /// * `poll_interval` - Sleep between polls (default: 1 second).
    /// * `expiration` - Lease lifetime for external cleanup (default: 2 minutes).
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::MustBePositive`] if any duration is zero.
    #[builder]
    pub fn new(
        #[builder(default = DEFAULT_LOCK_TIMEOUT)] lock_timeout: Duration,
        #[builder(default = DEFAULT_POLL_INTERVAL)] poll_interval: Duration,
        #[builder(default = DEFAULT_LOCK_EXPIRATION)] expiration: Duration,
    ) -> Result<Self, ConfigError> {
        let config = Self { lock_timeout, poll_interval, expiration };
        config.validate()?;
        Ok(config)
    }

    /// Checks that every duration is positive.
    ///
    /// Deserialized configurations are not validated until this is called
    /// (the facade constructors call it).
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::MustBePositive`] naming the first zero field.
    pub fn validate(&self) -> Result<(), ConfigError> {
        ensure_positive("lock_timeout", self.lock_timeout)?;
        ensure_positive("poll_interval", self.poll_interval)?;
        ensure_positive("expiration", self.expiration)
    }

    /// Returns the acquisition budget and staleness age.
    #[must_use]
    pub fn lock_timeout(&self) -> Duration {
        self.lock_timeout
    }

    /// Returns the poll interval.
    #[must_use]
    pub fn poll_interval(&self) -> Duration {
        self.poll_interval
    }

    /// Returns the lease expiration.
    #[must_use]
    pub fn expiration(&self) -> Duration {
        self.expiration
    }
}

/// Per-call time bounds for object-store operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, bon::Builder, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TimeoutConfig {
    /// Bound on `get_object`/`stat_object`/`bucket_exists`.
    #[serde(with = "humantime_serde", default = "default_read_timeout")]
    #[builder(default = DEFAULT_READ_TIMEOUT)]
    pub read: Duration,

    /// Bound on `put_object`/`delete_object`.
    #[serde(with = "humantime_serde", default = "default_write_timeout")]
    #[builder(default = DEFAULT_WRITE_TIMEOUT)]
    pub write: Duration,

    /// Bound on one `list_objects` call.
    #[serde(with = "humantime_serde", default = "default_list_timeout")]
    #[builder(default = DEFAULT_LIST_TIMEOUT)]
    pub list: Duration,
}

fn default_read_timeout() -> Duration {
    DEFAULT_READ_TIMEOUT
}

fn default_write_timeout() -> Duration {
    DEFAULT_WRITE_TIMEOUT
}

fn default_list_timeout() -> Duration {
    DEFAULT_LIST_TIMEOUT
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self { read: DEFAULT_READ_TIMEOUT, write: DEFAULT_WRITE_TIMEOUT, list: DEFAULT_LIST_TIMEOUT }
    }
}

impl TimeoutConfig {
    /// Checks that every bound is positive.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::MustBePositive`] naming the first zero field.
    pub fn validate(&self) -> Result<(), ConfigError> {
        ensure_positive("read", self.read)?;
        ensure_positive("write", self.write)?;
        ensure_positive("list", self.list)
    }
}

/// Configuration for [`ObjectStorage`](crate::ObjectStorage).
///
/// # Example
///
/// ```
/// use certstore_storage::StorageConfig;
///
/// let config = StorageConfig::builder()
///     .prefix("caddy")
///     .encryption_key("0123456789abcdef0123456789abcdef")
///     .build()?;
/// assert_eq!(config.prefix(), "caddy");
/// assert!(config.codec()?.is_encrypted());
/// # Ok::<(), certstore_storage::ConfigError>(())
/// ```
#[derive(Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StorageConfig {
    /// Object-name prefix for every key.
    #[serde(default = "default_prefix")]
    prefix: String,

    /// At-rest encryption key; its UTF-8 bytes must be exactly 32 long.
    #[serde(default, skip_serializing)]
    encryption_key: Option<String>,

    /// Lease-lock timing.
    #[serde(default)]
    lock: LockConfig,

    /// Per-call time bounds.
    #[serde(default)]
    timeouts: TimeoutConfig,
}

fn default_prefix() -> String {
    DEFAULT_PREFIX.to_owned()
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            prefix: default_prefix(),
            encryption_key: None,
            lock: LockConfig::default(),
            timeouts: TimeoutConfig::default(),
        }
    }
}

impl fmt::Debug for StorageConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StorageConfig")
            .field("prefix", &self.prefix)
            .field("encryption_key", &self.encryption_key.as_ref().map(|_| "<redacted>"))
            .field("lock", &self.lock)
            .field("timeouts", &self.timeouts)
            .finish()
    }
}

#[bon::bon]
impl StorageConfig {
    /// Creates a storage configuration, validating all fields.
    ///
    /// # Optional Fields
    ///
    /// * `prefix` - Object-name prefix (default: `"acme"`).
    /// * `encryption_key` - 32-byte key enabling at-rest encryption (default: none).
    /// * `lock` - Lease-lock timing (default: [`LockConfig::default`]).
    /// * `timeouts` - Per-call bounds (default: [`TimeoutConfig::default`]).
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The encryption key is non-empty and not 32 bytes
    /// - Any duration is zero
    #[builder]
    pub fn new(
        #[builder(into, default = DEFAULT_PREFIX.to_owned())] prefix: String,
        #[builder(into)] encryption_key: Option<String>,
        #[builder(default)] lock: LockConfig,
        #[builder(default)] timeouts: TimeoutConfig,
    ) -> Result<Self, ConfigError> {
        let config = Self { prefix, encryption_key, lock, timeouts };
        config.validate()?;
        Ok(config)
    }

    /// Validates a configuration obtained by deserialization.
    ///
    /// # Errors
    ///
    /// Same conditions as the builder.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if let Some(key) = &self.encryption_key
            && !key.is_empty()
            && key.len() != KEY_SIZE
        {
            return Err(ConfigError::InvalidEncryptionKeyLength {
                expected: KEY_SIZE,
                actual: key.len(),
            });
        }
        self.lock.validate()?;
        self.timeouts.validate()
    }

    /// Returns the object-name prefix.
    #[must_use]
    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Returns the lease-lock timing.
    #[must_use]
    pub fn lock(&self) -> LockConfig {
        self.lock
    }

    /// Returns the per-call bounds.
    #[must_use]
    pub fn timeouts(&self) -> TimeoutConfig {
        self.timeouts
    }

    /// Builds the codec selected by the encryption key.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidEncryptionKeyLength`] for a bad key.
    pub fn codec(&self) -> Result<Codec, ConfigError> {
        Codec::from_key(self.encryption_key.as_deref().map(str::as_bytes))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_lock_config_defaults() {
        let config = LockConfig::builder().build().unwrap();
        assert_eq!(config, LockConfig::default());
        assert_eq!(config.lock_timeout(), Duration::from_secs(15));
        assert_eq!(config.poll_interval(), Duration::from_secs(1));
        assert_eq!(config.expiration(), Duration::from_secs(120));
    }

    #[test]
    fn test_lock_config_rejects_zero() {
        let err = LockConfig::builder().poll_interval(Duration::ZERO).build().unwrap_err();
        assert!(matches!(err, ConfigError::MustBePositive { field: "poll_interval", .. }));

        let err = LockConfig::builder().lock_timeout(Duration::ZERO).build().unwrap_err();
        assert!(matches!(err, ConfigError::MustBePositive { field: "lock_timeout", .. }));
    }

    #[test]
    fn test_timeout_config_builder_defaults_match_default_impl() {
        let built = TimeoutConfig::builder().build();
        assert_eq!(built, TimeoutConfig::default());
        assert_eq!(built.list, Duration::from_secs(60));
    }

    #[test]
    fn test_timeout_config_partial_overrides() {
        let config = TimeoutConfig::builder().read(Duration::from_secs(2)).build();
        assert_eq!(config.read, Duration::from_secs(2));
        assert_eq!(config.write, DEFAULT_WRITE_TIMEOUT);
    }

    #[test]
    fn test_storage_config_defaults() {
        let config = StorageConfig::builder().build().unwrap();
        assert_eq!(config.prefix(), "acme");
        assert!(!config.codec().unwrap().is_encrypted());
    }

    #[test]
    fn test_storage_config_key_length() {
        let err = StorageConfig::builder().encryption_key("too-short").build().unwrap_err();
        assert_eq!(err, ConfigError::InvalidEncryptionKeyLength { expected: 32, actual: 9 });

        let config = StorageConfig::builder().encryption_key("").build().unwrap();
        assert!(!config.codec().unwrap().is_encrypted());
    }

    #[test]
    fn test_storage_config_debug_redacts_key() {
        let config = StorageConfig::builder()
            .encryption_key("0123456789abcdef0123456789abcdef")
            .build()
            .unwrap();
        let debug = format!("{config:?}");
        assert!(!debug.contains("0123456789abcdef"));
        assert!(debug.contains("<redacted>"));
    }

    #[test]
    fn test_config_deserialization_with_defaults() {
        let config: StorageConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(config.prefix(), DEFAULT_PREFIX);
        assert_eq!(config.lock(), LockConfig::default());
        assert_eq!(config.timeouts(), TimeoutConfig::default());
    }

    #[test]
    fn test_config_deserialization_humantime() {
        let json = r#"{
            "prefix": "certs",
            "lock": { "lock_timeout": "5s", "poll_interval": "250ms" },
            "timeouts": { "list": "2m" }
        }"#;
        let config: StorageConfig = serde_json::from_str(json).unwrap();
        config.validate().unwrap();

        assert_eq!(config.lock().lock_timeout(), Duration::from_secs(5));
        assert_eq!(config.lock().poll_interval(), Duration::from_millis(250));
        assert_eq!(config.lock().expiration(), DEFAULT_LOCK_EXPIRATION);
        assert_eq!(config.timeouts().list, Duration::from_secs(120));
    }

    #[test]
    fn test_config_deserialization_rejects_unknown_fields() {
        let result: Result<StorageConfig, _> = serde_json::from_str(r#"{ "bucket": "b" }"#);
        assert!(result.is_err());
    }

    #[test]
    fn test_deserialized_config_validation() {
        let json = r#"{ "lock": { "poll_interval": "0s" } }"#;
        let config: StorageConfig = serde_json::from_str(json).unwrap();
        assert!(matches!(config.validate(), Err(ConfigError::MustBePositive { .. })));
    }
}
