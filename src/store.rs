//! Record store abstraction holding the broker's instance and binding records.
//!
//! Records live under a hierarchical key layout:
//! `{prefix}{instance}` for instances and `{prefix}{instance}/{binding}` for
//! bindings. The prefix relationship turns "does this instance have live
//! bindings" into a listing query instead of a separate index.

use std::future::Future;
use std::pin::Pin;

use serde::{Deserialize, Serialize};

/// Default prefix for instance records.
pub const DEFAULT_INSTANCE_PREFIX: &str = "instances/";

/// Future returned by record store operations.
pub type StoreFuture<'a, T, E> = Pin<Box<dyn Future<Output = Result<T, E>> + Send + 'a>>;

/// Key-value persistence for broker records.
pub trait RecordStore: Send + Sync {
    /// Store specific error type.
    type Error: std::error::Error + Send + Sync + 'static;

    /// Returns whether a record exists at `path`.
    fn exists<'a>(&'a self, path: &'a str) -> StoreFuture<'a, bool, Self::Error>;

    /// Reads the record at `path`, returning `None` when it is absent.
    fn get<'a>(&'a self, path: &'a str) -> StoreFuture<'a, Option<String>, Self::Error>;

    /// Writes (or overwrites) the record at `path`.
    fn put<'a>(&'a self, path: &'a str, value: String) -> StoreFuture<'a, (), Self::Error>;

    /// Deletes the record at `path`.
    fn delete<'a>(&'a self, path: &'a str) -> StoreFuture<'a, (), Self::Error>;

    /// Lists the records directly below `prefix` without descending into
    /// nested levels. Listing stops after `limit` entries when one is given.
    fn list_children<'a>(
        &'a self,
        prefix: &'a str,
        limit: Option<usize>,
    ) -> StoreFuture<'a, Vec<String>, Self::Error>;
}

/// Deterministic record paths for instances and bindings.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct RecordLayout {
    prefix: String,
}

impl RecordLayout {
    /// Creates a layout rooted at `prefix`, which should end with `/`.
    #[must_use]
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
        }
    }

    /// Prefix under which every instance record lives.
    #[must_use]
    pub fn instances_prefix(&self) -> &str {
        &self.prefix
    }

    /// Path of an instance record.
    #[must_use]
    pub fn instance_path(&self, instance_id: &str) -> String {
        format!("{}{instance_id}", self.prefix)
    }

    /// Prefix under which an instance's binding records live.
    #[must_use]
    pub fn bindings_prefix(&self, instance_id: &str) -> String {
        format!("{}{instance_id}/", self.prefix)
    }

    /// Path of a binding record.
    #[must_use]
    pub fn binding_path(&self, instance_id: &str, binding_id: &str) -> String {
        format!("{}{instance_id}/{binding_id}", self.prefix)
    }
}

impl Default for RecordLayout {
    fn default() -> Self {
        Self::new(DEFAULT_INSTANCE_PREFIX)
    }
}

/// Persisted state of a provisioned instance.
#[derive(Clone, Debug, Default, Deserialize, Serialize, Eq, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct InstanceRecord {
    /// Service the instance was provisioned from.
    pub service_id: String,
    /// Plan currently applied to the instance.
    pub plan_id: String,
    /// Quota applied on the backend, in megabytes.
    #[serde(rename = "quotaMB")]
    pub quota_mb: u64,
}

impl InstanceRecord {
    /// Parses a stored instance record.
    ///
    /// Early broker releases stored an empty object body as a bare presence
    /// marker; such records parse as an empty record with no known plan.
    ///
    /// # Errors
    ///
    /// Returns the JSON error when a non-empty body is malformed.
    pub fn from_json(body: &str) -> Result<Self, serde_json::Error> {
        if body.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_json::from_str(body)
    }

    /// Plan identifier, when the record knows it.
    #[must_use]
    pub fn known_plan(&self) -> Option<&str> {
        Some(self.plan_id.as_str()).filter(|plan| !plan.is_empty())
    }
}

/// Persisted state of a binding, holding enough to reverse it.
#[derive(Clone, Debug, Deserialize, Serialize, Eq, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct BindingRecord {
    /// Backend user that owns the credentials.
    pub user: String,
    /// Swift sub-user name (equal to the binding ID).
    pub subuser: String,
    /// Tenant of the owning user.
    pub tenant: String,
    /// Access key of the S3 key pair minted for the binding.
    pub s3_access_key: String,
    /// Swift secret minted for the binding.
    pub swift_key: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    fn layout_nests_bindings_under_their_instance() {
        let layout = RecordLayout::default();
        assert_eq!(layout.instance_path("789"), "instances/789");
        assert_eq!(layout.bindings_prefix("789"), "instances/789/");
        assert_eq!(layout.binding_path("789", "abc"), "instances/789/abc");
        assert!(
            layout
                .binding_path("789", "abc")
                .starts_with(&layout.bindings_prefix("789"))
        );
    }

    #[rstest]
    fn binding_record_uses_wire_field_names() {
        let record = BindingRecord {
            user: String::from("789"),
            subuser: String::from("abc"),
            tenant: String::from("789"),
            s3_access_key: String::from("AK"),
            swift_key: String::from("SK"),
        };
        let value = serde_json::to_value(&record).expect("serialise");
        assert_eq!(
            value,
            serde_json::json!({
                "user": "789",
                "subuser": "abc",
                "tenant": "789",
                "s3AccessKey": "AK",
                "swiftKey": "SK",
            })
        );
    }

    #[rstest]
    #[case("")]
    #[case("  \n")]
    fn empty_instance_bodies_parse_as_legacy_markers(#[case] body: &str) {
        let record = InstanceRecord::from_json(body).expect("legacy marker");
        assert_eq!(record.known_plan(), None);
    }

    #[rstest]
    fn instance_record_round_trips_quota_field() {
        let record =
            InstanceRecord::from_json(r#"{"serviceId":"svc","planId":"p","quotaMB":100}"#)
                .expect("record");
        assert_eq!(record.known_plan(), Some("p"));
        assert_eq!(record.quota_mb, 100);
    }
}
