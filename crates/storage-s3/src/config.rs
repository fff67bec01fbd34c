//! Configuration for the S3 object store.
//!
//! [`S3BackendConfig`] says where the bucket lives and how to authenticate.
//! What is stored in the bucket (prefix, encryption, lock timing) is
//! configured separately through [`StorageConfig`](certstore_storage::StorageConfig).

use std::time::Duration;

use certstore_storage::ConfigError;
use serde::{Deserialize, Serialize};

/// Default AWS region.
pub const DEFAULT_REGION: &str = "us-east-1";

/// Default connection timeout (5 seconds).
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Configuration for [`S3ObjectStore`](crate::S3ObjectStore).
///
/// # Credentials
///
/// Resolved in this order:
///
/// 1. `access_key` + `secret_key`, when both are set
/// 2. the shared-config `profile`, when set
/// 3. the SDK default chain (environment, web identity, instance metadata)
///
/// When `role_arn` is set, the resolved credentials are used to assume that
/// role through STS.
///
/// # Endpoints
///
/// Leave `endpoint` unset for AWS. For MinIO, Ceph, R2 and other
/// S3-compatible services set it to the service URL; path-style addressing
/// is then always used.
///
/// # Example
///
/// ```
/// use certstore_storage_s3::S3BackendConfig;
///
/// let config = S3BackendConfig::builder()
///     .endpoint("http://localhost:9000")
///     .bucket("certificates")
///     .access_key("minioadmin")
///     .secret_key("minioadmin")
///     .build()?;
///
/// assert!(config.use_path_style());
/// # Ok::<(), certstore_storage::ConfigError>(())
/// ```
#[derive(Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct S3BackendConfig {
    /// Custom endpoint URL for S3-compatible services.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    endpoint: Option<String>,

    /// Deprecated bare host name; becomes `https://{host}`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    host: Option<String>,

    /// Bucket holding the objects.
    #[serde(default)]
    bucket: String,

    /// Signing region.
    #[serde(default = "default_region")]
    region: String,

    /// Static access key id.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    access_key: Option<String>,

    /// Static secret key.
    #[serde(default, skip_serializing)]
    secret_key: Option<String>,

    /// Shared-config profile name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    profile: Option<String>,

    /// Role to assume through STS.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    role_arn: Option<String>,

    /// Use path-style addressing (`endpoint/bucket/key`).
    #[serde(default)]
    use_path_style: bool,

    /// Skip TLS certificate verification.
    #[serde(default)]
    insecure: bool,

    /// Bound on establishing a connection.
    #[serde(with = "humantime_serde", default = "default_connect_timeout")]
    connect_timeout: Duration,
}

fn default_region() -> String {
    DEFAULT_REGION.to_owned()
}

fn default_connect_timeout() -> Duration {
    DEFAULT_CONNECT_TIMEOUT
}

impl std::fmt::Debug for S3BackendConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("S3BackendConfig")
            .field("endpoint", &self.endpoint)
            .field("host", &self.host)
            .field("bucket", &self.bucket)
            .field("region", &self.region)
            .field("access_key", &self.access_key)
            .field("secret_key", &self.secret_key.as_ref().map(|_| "<redacted>"))
            .field("profile", &self.profile)
            .field("role_arn", &self.role_arn)
            .field("use_path_style", &self.use_path_style)
            .field("insecure", &self.insecure)
            .field("connect_timeout", &self.connect_timeout)
            .finish()
    }
}

#[bon::bon]
impl S3BackendConfig {
    /// Creates a new configuration, validating all fields.
    ///
    /// # Arguments
    ///
    /// * `bucket` - Bucket name (required).
    ///
    /// # Optional Fields
    ///
    /// * `endpoint` - Service URL for S3-compatible stores.
    /// * `host` - Deprecated; bare host name used as `https://{host}`.
    /// * `region` - Signing region (default: `us-east-1`).
    /// * `access_key` / `secret_key` - Static credentials.
    /// * `profile` - Shared-config profile.
    /// * `role_arn` - Role to assume.
    /// * `use_path_style` - Path-style addressing (default: false, forced on with an endpoint).
    /// * `insecure` - Skip TLS verification (default: false, needs the `insecure-tls` feature).
    /// * `connect_timeout` - Connection timeout (default: 5 seconds).
    ///
    /// # Errors
    ///
    /// Returns a [`ConfigError`] if the configuration is invalid; see
    /// [`validate`](Self::validate).
    #[builder]
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        #[builder(into)] endpoint: Option<String>,
        #[builder(into)] host: Option<String>,
        #[builder(into)] bucket: String,
        #[builder(into, default = default_region())] region: String,
        #[builder(into)] access_key: Option<String>,
        #[builder(into)] secret_key: Option<String>,
        #[builder(into)] profile: Option<String>,
        #[builder(into)] role_arn: Option<String>,
        #[builder(default)] use_path_style: bool,
        #[builder(default)] insecure: bool,
        #[builder(default = DEFAULT_CONNECT_TIMEOUT)] connect_timeout: Duration,
    ) -> Result<Self, ConfigError> {
        let config = Self {
            endpoint,
            host,
            bucket,
            region,
            access_key,
            secret_key,
            profile,
            role_arn,
            use_path_style,
            insecure,
            connect_timeout,
        };
        config.validate()?;
        Ok(config)
    }

    /// Validates the configuration.
    ///
    /// Deserialized configurations are not validated until this is called
    /// (the [`connect`](crate::connect) path calls it).
    ///
    /// # Errors
    ///
    /// - [`ConfigError::MissingBucket`] if `bucket` is empty
    /// - [`ConfigError::ConflictingOptions`] if both `host` and `endpoint` are set
    /// - [`ConfigError::InvalidEndpoint`] if the endpoint is not an absolute http(s) URL
    /// - [`ConfigError::MustBePositive`] if `connect_timeout` is zero
    /// - [`ConfigError::FeatureDisabled`] if `insecure` is set without the `insecure-tls` feature
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.bucket.trim().is_empty() {
            return Err(ConfigError::MissingBucket);
        }

        if self.host.is_some() && self.endpoint.is_some() {
            return Err(ConfigError::ConflictingOptions { first: "host", second: "endpoint" });
        }

        if let Some(endpoint) = self.endpoint() {
            validate_endpoint(&endpoint)?;
        }

        if self.connect_timeout.is_zero() {
            return Err(ConfigError::MustBePositive {
                field: "connect_timeout",
                value: format!("{:?}", self.connect_timeout),
            });
        }

        if self.insecure && !cfg!(feature = "insecure-tls") {
            return Err(ConfigError::FeatureDisabled { option: "insecure", feature: "insecure-tls" });
        }

        Ok(())
    }

    /// Returns the bucket name.
    #[must_use]
    pub fn bucket(&self) -> &str {
        &self.bucket
    }

    /// Returns the signing region.
    #[must_use]
    pub fn region(&self) -> &str {
        &self.region
    }

    /// Returns the effective endpoint URL, if any.
    ///
    /// A deprecated `host` resolves to `https://{host}`.
    #[must_use]
    pub fn endpoint(&self) -> Option<String> {
        match (&self.endpoint, &self.host) {
            (Some(endpoint), _) => Some(endpoint.clone()),
            (None, Some(host)) => Some(format!("https://{}", host.trim_end_matches('/'))),
            (None, None) => None,
        }
    }

    /// Returns `true` if the deprecated `host` option is in use.
    #[must_use]
    pub fn uses_deprecated_host(&self) -> bool {
        self.host.is_some()
    }

    /// Returns whether path-style addressing is used.
    ///
    /// Always `true` with a custom endpoint.
    #[must_use]
    pub fn use_path_style(&self) -> bool {
        self.use_path_style || self.endpoint().is_some()
    }

    /// Returns the static credentials, when both halves are set.
    #[must_use]
    pub fn static_credentials(&self) -> Option<(&str, &str)> {
        match (&self.access_key, &self.secret_key) {
            (Some(access), Some(secret)) if !access.is_empty() && !secret.is_empty() => {
                Some((access.as_str(), secret.as_str()))
            },
            _ => None,
        }
    }

    /// Returns the shared-config profile name.
    #[must_use]
    pub fn profile(&self) -> Option<&str> {
        self.profile.as_deref().filter(|p| !p.is_empty())
    }

    /// Returns the role to assume.
    #[must_use]
    pub fn role_arn(&self) -> Option<&str> {
        self.role_arn.as_deref().filter(|r| !r.is_empty())
    }

    /// Returns whether TLS verification is skipped.
    #[must_use]
    pub fn insecure(&self) -> bool {
        self.insecure
    }

    /// Returns the connection timeout.
    #[must_use]
    pub fn connect_timeout(&self) -> Duration {
        self.connect_timeout
    }
}

fn validate_endpoint(endpoint: &str) -> Result<(), ConfigError> {
    let invalid = |reason: &str| ConfigError::InvalidEndpoint {
        endpoint: endpoint.to_owned(),
        reason: reason.to_owned(),
    };

    let uri: http::Uri = endpoint.parse().map_err(|err: http::uri::InvalidUri| invalid(&err.to_string()))?;
    match uri.scheme_str() {
        Some("http" | "https") => {},
        Some(_) => return Err(invalid("scheme must be http or https")),
        None => return Err(invalid("missing scheme")),
    }
    if uri.host().is_none_or(str::is_empty) {
        return Err(invalid("missing host"));
    }
    Ok(())
}
