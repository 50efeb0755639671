//! Configuration loading via `ortho-config`.
//!
//! Values merge defaults, the `cosb.toml` configuration file and `COSB_*`
//! environment variables, in that order of precedence.

use std::time::Duration;

use camino::Utf8PathBuf;
use ortho_config::OrthoConfig;
use serde::Deserialize;
use thiserror::Error;

use crate::broker::{BrokerSettings, Endpoints, OperationMode};
use crate::radosgw::GatewaySettings;
use crate::s3_store::StoreSettings;
use crate::store::{DEFAULT_INSTANCE_PREFIX, RecordLayout};

/// Broker configuration.
#[derive(Clone, Debug, Deserialize, OrthoConfig, PartialEq, Eq)]
#[ortho_config(
    prefix = "COSB",
    discovery(
        app_name = "cosb",
        env_var = "COSB_CONFIG_PATH",
        config_file_name = "cosb.toml",
        dotfile_name = ".cosb.toml",
        project_file_name = "cosb.toml"
    )
)]
pub struct BrokerConfig {
    /// Access key of the gateway admin user. Also used for the record store.
    pub rados_access_key: String,
    /// Secret key of the gateway admin user.
    pub rados_secret_key: String,
    /// Gateway base URL, for example `https://rgw.example.com`.
    pub rados_endpoint: String,
    /// Resource path of the admin API.
    #[ortho_config(default = "admin".to_owned())]
    pub rados_admin_path: String,
    /// Region used when signing requests.
    #[ortho_config(default = "us-east-1".to_owned())]
    pub rados_region: String,
    /// Username the platform presents to the broker.
    pub broker_username: String,
    /// Password the platform presents to the broker.
    pub broker_password: String,
    /// Path appended to the endpoint to form the public S3 endpoint.
    #[ortho_config(default = "/".to_owned())]
    pub s3_path: String,
    /// Path appended to the endpoint to form the public Swift endpoint.
    #[ortho_config(default = "/auth/v1.0".to_owned())]
    pub swift_path: String,
    /// Bucket holding instance and binding records.
    #[ortho_config(default = "ceph-objectstore-broker".to_owned())]
    pub bucket_name: String,
    /// Key prefix of instance records.
    #[ortho_config(default = DEFAULT_INSTANCE_PREFIX.to_owned())]
    pub instance_prefix: String,
    /// Maximum number of provisioned instances.
    #[ortho_config(default = 2000)]
    pub instance_limit: usize,
    /// Whether the gateway endpoint is expected to use HTTPS. Unset means
    /// `true`; see [`BrokerConfig::use_https`].
    pub use_https: Option<bool>,
    /// Socket address the HTTP server binds to.
    #[ortho_config(default = "0.0.0.0:8080".to_owned())]
    pub listen_addr: String,
    /// Location of the service catalog.
    #[ortho_config(default = "catalog.json".to_owned())]
    pub catalog_path: String,
    /// Timeout of one admin API call, in seconds.
    #[ortho_config(default = 5)]
    pub request_timeout_secs: u64,
    /// Synchronicity policy: `synchronous` or `async-only`.
    #[ortho_config(default = "synchronous".to_owned())]
    pub operation_mode: String,
}

/// Metadata for a configuration field, used to generate actionable error messages.
struct FieldMetadata {
    description: &'static str,
    env_var: &'static str,
    toml_key: &'static str,
}

impl FieldMetadata {
    const fn new(description: &'static str, env_var: &'static str, toml_key: &'static str) -> Self {
        Self {
            description,
            env_var,
            toml_key,
        }
    }
}

const REQUIRED_FIELDS: [FieldMetadata; 5] = [
    FieldMetadata::new(
        "gateway admin access key",
        "COSB_RADOS_ACCESS_KEY",
        "rados_access_key",
    ),
    FieldMetadata::new(
        "gateway admin secret key",
        "COSB_RADOS_SECRET_KEY",
        "rados_secret_key",
    ),
    FieldMetadata::new("gateway endpoint", "COSB_RADOS_ENDPOINT", "rados_endpoint"),
    FieldMetadata::new(
        "broker basic-auth username",
        "COSB_BROKER_USERNAME",
        "broker_username",
    ),
    FieldMetadata::new(
        "broker basic-auth password",
        "COSB_BROKER_PASSWORD",
        "broker_password",
    ),
];

impl BrokerConfig {
    fn require_field(value: &str, metadata: &FieldMetadata) -> Result<(), ConfigError> {
        if value.trim().is_empty() {
            return Err(ConfigError::MissingField(format!(
                "missing {}: set {} or add {} to cosb.toml",
                metadata.description, metadata.env_var, metadata.toml_key
            )));
        }
        Ok(())
    }

    /// Loads configuration without attempting to parse CLI arguments.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Parse`] when the merge fails.
    pub fn load_without_cli_args() -> Result<Self, ConfigError> {
        Self::load_from_iter([std::ffi::OsString::from("cosb")])
            .map_err(|err| ConfigError::Parse(err.to_string()))
    }

    fn required_values(&self) -> [&str; 5] {
        [
            &self.rados_access_key,
            &self.rados_secret_key,
            &self.rados_endpoint,
            &self.broker_username,
            &self.broker_password,
        ]
    }

    /// Performs semantic validation. Error messages say how to provide a
    /// missing value.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::MissingField`] when a required field is blank
    /// and [`ConfigError::Invalid`] for inconsistent values.
    pub fn validate(&self) -> Result<(), ConfigError> {
        for (value, metadata) in self.required_values().into_iter().zip(&REQUIRED_FIELDS) {
            Self::require_field(value, metadata)?;
        }
        if self.instance_limit == 0 {
            return Err(ConfigError::Invalid(String::from(
                "'instance_limit' must be at least 1",
            )));
        }
        if !self.instance_prefix.ends_with('/') {
            return Err(ConfigError::Invalid(format!(
                "'instance_prefix' must end with '/', got '{}'",
                self.instance_prefix
            )));
        }
        let endpoint = self.endpoint();
        let use_https = self.use_https();
        if use_https && endpoint.starts_with("http://") {
            return Err(ConfigError::Invalid(String::from(
                "'use_https' is true but 'rados_endpoint' is using http",
            )));
        }
        if !use_https && endpoint.starts_with("https://") {
            return Err(ConfigError::Invalid(String::from(
                "'use_https' is false but 'rados_endpoint' is using https",
            )));
        }
        self.mode()?;
        Ok(())
    }

    /// Whether HTTPS is expected, defaulting to `true` when unset.
    #[must_use]
    pub const fn use_https(&self) -> bool {
        matches!(self.use_https, None | Some(true))
    }

    /// Gateway endpoint with any trailing slash removed.
    #[must_use]
    pub fn endpoint(&self) -> &str {
        self.rados_endpoint.trim().trim_end_matches('/')
    }

    /// Parsed synchronicity policy.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] for an unknown mode.
    pub fn mode(&self) -> Result<OperationMode, ConfigError> {
        self.operation_mode.parse().map_err(ConfigError::Invalid)
    }

    /// Public endpoints handed out in bind credentials.
    #[must_use]
    pub fn endpoints(&self) -> Endpoints {
        Endpoints {
            s3: format!("{}{}", self.endpoint(), self.s3_path),
            swift: format!("{}{}", self.endpoint(), self.swift_path),
        }
    }

    /// Settings of the lifecycle engine.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] for an unknown operation mode.
    pub fn broker_settings(&self) -> Result<BrokerSettings, ConfigError> {
        Ok(BrokerSettings {
            instance_limit: self.instance_limit,
            endpoints: self.endpoints(),
            mode: self.mode()?,
        })
    }

    /// Connection settings of the admin gateway.
    #[must_use]
    pub fn gateway_settings(&self) -> GatewaySettings {
        GatewaySettings {
            endpoint: self.endpoint().to_owned(),
            admin_path: self.rados_admin_path.clone(),
            access_key: self.rados_access_key.clone(),
            secret_key: self.rados_secret_key.clone(),
            region: self.rados_region.clone(),
            timeout: Duration::from_secs(self.request_timeout_secs),
        }
    }

    /// Connection settings of the record store.
    #[must_use]
    pub fn store_settings(&self) -> StoreSettings {
        StoreSettings {
            endpoint: self.endpoint().to_owned(),
            access_key: self.rados_access_key.clone(),
            secret_key: self.rados_secret_key.clone(),
            region: self.rados_region.clone(),
            bucket: self.bucket_name.clone(),
        }
    }

    /// Location of the service catalog.
    #[must_use]
    pub fn catalog_file(&self) -> Utf8PathBuf {
        Utf8PathBuf::from(&self.catalog_path)
    }

    /// Record path layout.
    #[must_use]
    pub fn record_layout(&self) -> RecordLayout {
        RecordLayout::new(self.instance_prefix.clone())
    }
}

/// Errors raised during configuration loading and validation.
#[derive(Debug, Error, Eq, PartialEq)]
pub enum ConfigError {
    /// Indicates a required configuration field is empty or missing.
    #[error("missing configuration field: {0}")]
    MissingField(String),
    /// Indicates a value that is present but unusable.
    #[error("invalid configuration: {0}")]
    Invalid(String),
    /// Surfaces errors from the `ortho-config` loader.
    #[error("configuration parsing failed: {0}")]
    Parse(String),
}

impl From<ortho_config::OrthoError> for ConfigError {
    fn from(value: ortho_config::OrthoError) -> Self {
        Self::Parse(value.to_string())
    }
}
