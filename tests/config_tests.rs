//! Tests for broker configuration loading and validation.

use cosb::test_support::EnvGuard;
use cosb::{BrokerConfig, ConfigError, OperationMode};
use rstest::*;

#[fixture]
fn valid_config() -> BrokerConfig {
    BrokerConfig {
        rados_access_key: String::from("ADMINKEY"),
        rados_secret_key: String::from("ADMINSECRET"),
        rados_endpoint: String::from("https://rgw.example.com/"),
        rados_admin_path: String::from("admin"),
        rados_region: String::from("us-east-1"),
        broker_username: String::from("platform"),
        broker_password: String::from("s3cret"),
        s3_path: String::from("/"),
        swift_path: String::from("/auth/v1.0"),
        bucket_name: String::from("ceph-objectstore-broker"),
        instance_prefix: String::from("instances/"),
        instance_limit: 2000,
        use_https: None,
        listen_addr: String::from("0.0.0.0:8080"),
        catalog_path: String::from("catalog.json"),
        request_timeout_secs: 5,
        operation_mode: String::from("synchronous"),
    }
}

#[rstest]
fn valid_config_passes_validation(valid_config: BrokerConfig) {
    assert_eq!(valid_config.validate(), Ok(()));
}

/// Every required field names its environment variable, TOML key and the
/// configuration file in the validation error.
#[rstest]
#[case::access_key(|cfg: &mut BrokerConfig| cfg.rados_access_key.clear(), "COSB_RADOS_ACCESS_KEY", "rados_access_key")]
#[case::secret_key(|cfg: &mut BrokerConfig| cfg.rados_secret_key.clear(), "COSB_RADOS_SECRET_KEY", "rados_secret_key")]
#[case::endpoint(|cfg: &mut BrokerConfig| cfg.rados_endpoint.clear(), "COSB_RADOS_ENDPOINT", "rados_endpoint")]
#[case::username(|cfg: &mut BrokerConfig| cfg.broker_username.clear(), "COSB_BROKER_USERNAME", "broker_username")]
#[case::password(|cfg: &mut BrokerConfig| cfg.broker_password = String::from("  "), "COSB_BROKER_PASSWORD", "broker_password")]
fn missing_fields_produce_actionable_errors(
    mut valid_config: BrokerConfig,
    #[case] mutate: fn(&mut BrokerConfig),
    #[case] env_var: &str,
    #[case] toml_key: &str,
) {
    mutate(&mut valid_config);
    let error = valid_config.validate().expect_err("validation should fail");
    let ConfigError::MissingField(ref message) = error else {
        panic!("expected MissingField error, got {error}");
    };
    assert!(message.contains(env_var), "error should mention {env_var}: {message}");
    assert!(message.contains(toml_key), "error should mention {toml_key}: {message}");
    assert!(message.contains("cosb.toml"), "error should mention cosb.toml: {message}");
}

#[rstest]
#[case(true, "http://rgw.example.com", "'use_https' is true but 'rados_endpoint' is using http")]
#[case(false, "https://rgw.example.com", "'use_https' is false but 'rados_endpoint' is using https")]
fn scheme_mismatch_is_rejected(
    mut valid_config: BrokerConfig,
    #[case] use_https: bool,
    #[case] endpoint: &str,
    #[case] expected: &str,
) {
    valid_config.use_https = Some(use_https);
    valid_config.rados_endpoint = endpoint.to_owned();
    let error = valid_config.validate().expect_err("scheme mismatch");
    assert_eq!(error, ConfigError::Invalid(expected.to_owned()));
}

#[rstest]
fn zero_instance_limit_is_rejected(mut valid_config: BrokerConfig) {
    valid_config.instance_limit = 0;
    let error = valid_config.validate().expect_err("zero limit");
    assert!(error.to_string().contains("instance_limit"), "unexpected error: {error}");
}

#[rstest]
fn prefix_without_separator_is_rejected(mut valid_config: BrokerConfig) {
    valid_config.instance_prefix = String::from("instances");
    let error = valid_config.validate().expect_err("prefix without slash");
    assert!(error.to_string().contains("instance_prefix"), "unexpected error: {error}");
}

#[rstest]
fn unknown_operation_mode_is_rejected(mut valid_config: BrokerConfig) {
    valid_config.operation_mode = String::from("eventually");
    let error = valid_config.validate().expect_err("unknown mode");
    assert!(error.to_string().contains("eventually"), "unexpected error: {error}");
}

#[rstest]
fn derived_settings_follow_the_endpoint(mut valid_config: BrokerConfig) {
    valid_config.operation_mode = String::from("async-only");
    let endpoints = valid_config.endpoints();
    assert_eq!(endpoints.s3, "https://rgw.example.com/");
    assert_eq!(endpoints.swift, "https://rgw.example.com/auth/v1.0");

    let settings = valid_config.broker_settings().expect("settings");
    assert_eq!(settings.mode, OperationMode::AsyncOnly);
    assert_eq!(settings.instance_limit, 2000);

    assert_eq!(valid_config.gateway_settings().endpoint, "https://rgw.example.com");
    assert_eq!(valid_config.store_settings().bucket, "ceph-objectstore-broker");
    assert_eq!(
        valid_config.record_layout().instance_path("789"),
        "instances/789"
    );
}

#[tokio::test]
async fn loader_applies_defaults_and_environment() {
    let _guard = EnvGuard::set_vars(&[
        ("COSB_CONFIG_PATH", None),
        ("COSB_RADOS_ACCESS_KEY", Some("ADMINKEY")),
        ("COSB_RADOS_SECRET_KEY", Some("ADMINSECRET")),
        ("COSB_RADOS_ENDPOINT", Some("https://rgw.example.com")),
        ("COSB_BROKER_USERNAME", Some("platform")),
        ("COSB_BROKER_PASSWORD", Some("s3cret")),
        ("COSB_INSTANCE_LIMIT", Some("25")),
    ])
    .await;

    let config = BrokerConfig::load_without_cli_args().expect("configuration loads");

    assert_eq!(config.rados_access_key, "ADMINKEY");
    assert_eq!(config.instance_limit, 25);
    assert_eq!(config.bucket_name, "ceph-objectstore-broker");
    assert_eq!(config.swift_path, "/auth/v1.0");
    assert_eq!(config.operation_mode, "synchronous");
    assert!(config.use_https());
    assert_eq!(config.validate(), Ok(()));
}

#[rstest]
fn unset_https_flag_accepts_only_https_endpoints(mut valid_config: BrokerConfig) {
    valid_config.use_https = None;
    assert!(valid_config.use_https());
    assert_eq!(valid_config.validate(), Ok(()));

    valid_config.rados_endpoint = String::from("http://rgw.example.com");
    let error = valid_config.validate().expect_err("http endpoint");
    assert_eq!(
        error,
        ConfigError::Invalid(String::from(
            "'use_https' is true but 'rados_endpoint' is using http"
        ))
    );
}
