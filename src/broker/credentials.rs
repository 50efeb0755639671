//! Tenant derivation and the credentials handed out by a bind.

use serde::{Deserialize, Serialize};

use crate::gateway::{qualified_subuser, qualified_uid};

/// Derives the backend tenant from an instance identifier.
///
/// Tenants only admit ASCII alphanumerics and underscores, so every other
/// character is stripped. The tenant is never stored on its own; callers
/// recompute it from the instance identifier.
#[must_use]
pub fn tenant_id(instance_id: &str) -> String {
    instance_id
        .chars()
        .filter(|ch| ch.is_ascii_alphanumeric() || *ch == '_')
        .collect()
}

/// Public endpoints written into bind credentials.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Endpoints {
    /// S3 endpoint URL.
    pub s3: String,
    /// Swift authentication endpoint URL.
    pub swift: String,
}

/// Credentials returned to the platform for one binding.
#[derive(Clone, Debug, Deserialize, Serialize, Eq, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct BindCredentials {
    /// Qualified S3 user (`tenant$user`).
    pub s3_user: String,
    /// S3 access key.
    pub s3_access_key: String,
    /// S3 secret key.
    pub s3_secret_key: String,
    /// S3 endpoint URL.
    pub s3_endpoint: String,
    /// Qualified Swift user (`tenant$user:subuser`).
    pub swift_user: String,
    /// Swift secret key.
    pub swift_secret_key: String,
    /// Swift authentication endpoint URL.
    pub swift_endpoint: String,
}

/// Secrets minted on the backend for one binding.
#[derive(Clone, Debug)]
pub(crate) struct MintedSecrets {
    pub(crate) s3_access_key: String,
    pub(crate) s3_secret_key: String,
    pub(crate) swift_secret_key: String,
}

impl BindCredentials {
    pub(crate) fn compose(
        user: &str,
        subuser: &str,
        tenant: &str,
        secrets: MintedSecrets,
        endpoints: &Endpoints,
    ) -> Self {
        Self {
            s3_user: qualified_uid(user, tenant),
            s3_access_key: secrets.s3_access_key,
            s3_secret_key: secrets.s3_secret_key,
            s3_endpoint: endpoints.s3.clone(),
            swift_user: qualified_subuser(user, subuser, tenant),
            swift_secret_key: secrets.swift_secret_key,
            swift_endpoint: endpoints.swift.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("789", "789")]
    #[case("6f1c0e1a-93b2-4f2e-8d3c-2a1b0c9d8e7f", "6f1c0e1a93b24f2e8d3c2a1b0c9d8e7f")]
    #[case("a.b c$d_e", "abcd_e")]
    fn tenant_strips_disallowed_characters(#[case] instance_id: &str, #[case] expected: &str) {
        assert_eq!(tenant_id(instance_id), expected);
    }

    #[rstest]
    fn tenant_is_deterministic() {
        assert_eq!(tenant_id("a-b-c"), tenant_id("a-b-c"));
    }

    #[rstest]
    fn credentials_qualify_users_with_tenant() {
        let endpoints = Endpoints {
            s3: String::from("https://rgw.example/"),
            swift: String::from("https://rgw.example/auth/v1.0"),
        };
        let secrets = MintedSecrets {
            s3_access_key: String::from("AK"),
            s3_secret_key: String::from("SK"),
            swift_secret_key: String::from("SW"),
        };
        let creds = BindCredentials::compose("ab-c", "bind", "abc", secrets, &endpoints);
        assert_eq!(creds.s3_user, "abc$ab-c");
        assert_eq!(creds.swift_user, "abc$ab-c:bind");
        let value = serde_json::to_value(&creds).expect("serialise");
        assert_eq!(value["s3AccessKey"], "AK");
        assert_eq!(value["swiftEndpoint"], "https://rgw.example/auth/v1.0");
    }
}
