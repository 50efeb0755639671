//! Admin gateway abstraction over the storage backend's user management API.
//!
//! Every call is scoped by a `(user, tenant)` pair and is a single blocking
//! round trip with no retry. Callers treat every error as a hard failure of
//! the current request.

use std::future::Future;
use std::pin::Pin;

use serde::{Deserialize, Serialize};

/// Builds the fully qualified user identifier (`tenant$user`).
#[must_use]
pub fn qualified_uid(user: &str, tenant: &str) -> String {
    format!("{tenant}${user}")
}

/// Builds the fully qualified sub-user identifier (`tenant$user:subuser`).
#[must_use]
pub fn qualified_subuser(user: &str, subuser: &str, tenant: &str) -> String {
    format!("{tenant}${user}:{subuser}")
}

/// An S3 access/secret key pair owned by a user.
#[derive(Clone, Debug, Deserialize, Serialize, Eq, PartialEq)]
pub struct S3Key {
    /// Qualified owner of the key.
    pub user: String,
    /// Access key identifier.
    pub access_key: String,
    /// Secret key.
    pub secret_key: String,
}

/// A Swift secret owned by a sub-user.
#[derive(Clone, Debug, Deserialize, Serialize, Eq, PartialEq)]
pub struct SwiftKey {
    /// Qualified sub-user owning the key.
    pub user: String,
    /// Swift secret key.
    pub secret_key: String,
}

/// A sub-user entry.
#[derive(Clone, Debug, Deserialize, Serialize, Eq, PartialEq)]
pub struct Subuser {
    /// Qualified sub-user identifier.
    pub id: String,
    /// Access level granted to the sub-user.
    pub permissions: String,
}

/// Snapshot of a user's credentials.
#[derive(Clone, Debug, Default, Deserialize, Serialize, Eq, PartialEq)]
pub struct UserInfo {
    /// User identifier without the tenant.
    pub user_id: String,
    /// Tenant the user belongs to.
    pub tenant: String,
    /// Sub-users registered for the user.
    pub subusers: Vec<Subuser>,
    /// S3 key pairs.
    pub keys: Vec<S3Key>,
    /// Swift secrets, one per sub-user.
    pub swift_keys: Vec<SwiftKey>,
}

impl UserInfo {
    /// Returns the Swift secret registered for the given qualified sub-user.
    #[must_use]
    pub fn swift_key_for(&self, qualified_subuser: &str) -> Option<&SwiftKey> {
        self.swift_keys
            .iter()
            .find(|key| key.user == qualified_subuser)
    }
}

/// Classification hook for gateway errors the engine handles specially.
pub trait GatewayError: std::error::Error + Send + Sync + 'static {
    /// Returns true when the backend rejected a create because the entity
    /// already exists.
    fn is_already_exists(&self) -> bool;
}

/// Future returned by gateway operations.
pub type GatewayFuture<'a, T, E> = Pin<Box<dyn Future<Output = Result<T, E>> + Send + 'a>>;

/// Operations the lifecycle engine needs from the storage gateway.
pub trait AdminGateway: Send + Sync {
    /// Gateway specific error type.
    type Error: GatewayError;

    /// Creates a tenant-scoped user. Creating an existing user fails.
    fn create_user<'a>(
        &'a self,
        user: &'a str,
        display_name: &'a str,
        tenant: &'a str,
    ) -> GatewayFuture<'a, (), Self::Error>;

    /// Deletes a user together with its keys, sub-users and data.
    fn delete_user<'a>(&'a self, user: &'a str, tenant: &'a str)
    -> GatewayFuture<'a, (), Self::Error>;

    /// Fetches the user's current credentials.
    fn get_user<'a>(
        &'a self,
        user: &'a str,
        tenant: &'a str,
    ) -> GatewayFuture<'a, UserInfo, Self::Error>;

    /// Sets and enables the user's storage quota.
    fn set_user_quota<'a>(
        &'a self,
        user: &'a str,
        tenant: &'a str,
        quota_mb: u64,
    ) -> GatewayFuture<'a, (), Self::Error>;

    /// Reads the user's configured storage quota.
    fn get_user_quota_mb<'a>(
        &'a self,
        user: &'a str,
        tenant: &'a str,
    ) -> GatewayFuture<'a, u64, Self::Error>;

    /// Measures the user's live storage usage. Never cached.
    fn get_user_usage_mb<'a>(
        &'a self,
        user: &'a str,
        tenant: &'a str,
    ) -> GatewayFuture<'a, u64, Self::Error>;

    /// Creates a Swift sub-user and returns the entry just created.
    fn create_subuser<'a>(
        &'a self,
        user: &'a str,
        subuser: &'a str,
        tenant: &'a str,
    ) -> GatewayFuture<'a, Subuser, Self::Error>;

    /// Deletes a sub-user and purges its keys.
    fn delete_subuser<'a>(
        &'a self,
        user: &'a str,
        subuser: &'a str,
        tenant: &'a str,
    ) -> GatewayFuture<'a, (), Self::Error>;

    /// Mints a new S3 key pair and returns it.
    fn create_s3_key<'a>(
        &'a self,
        user: &'a str,
        tenant: &'a str,
    ) -> GatewayFuture<'a, S3Key, Self::Error>;

    /// Deletes the S3 key identified by `access_key`.
    fn delete_s3_key<'a>(
        &'a self,
        user: &'a str,
        tenant: &'a str,
        access_key: &'a str,
    ) -> GatewayFuture<'a, (), Self::Error>;
}
