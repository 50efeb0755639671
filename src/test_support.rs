//! Test support utilities shared across unit and integration tests.

use std::collections::{BTreeMap, BTreeSet};
use std::env;
use std::ffi::OsString;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use thiserror::Error;
use tokio::sync::{Mutex as AsyncMutex, MutexGuard as AsyncMutexGuard};

use crate::broker::{Broker, BrokerSettings, Endpoints, OperationMode};
use crate::catalog::Catalog;
use crate::gateway::{
    AdminGateway, GatewayError, GatewayFuture, S3Key, Subuser, SwiftKey, UserInfo, qualified_subuser,
    qualified_uid,
};
use crate::store::{RecordLayout, RecordStore, StoreFuture};

/// Catalog with one service and two plans (100 MB and 1000 MB).
pub const SAMPLE_CATALOG_JSON: &str = r#"[
  {
    "id": "svc-objectstore",
    "name": "cephobjectstore",
    "description": "Tenant scoped S3 and Swift storage",
    "bindable": true,
    "plan_updateable": true,
    "tags": ["object-storage", "s3", "swift"],
    "plans": [
      {
        "id": "plan-small",
        "name": "small",
        "description": "100 MB of object storage",
        "free": true,
        "metadata": {"quotaMB": "100", "displayName": "Small"},
        "maintenance_info": {"version": "1.0.0"}
      },
      {
        "id": "plan-large",
        "name": "large",
        "description": "1000 MB of object storage",
        "metadata": {"quotaMB": 1000}
      }
    ]
  }
]"#;

/// Parses [`SAMPLE_CATALOG_JSON`].
///
/// # Panics
///
/// Panics when the sample catalog fails validation.
#[must_use]
pub fn sample_catalog() -> Catalog {
    Catalog::from_json_str(SAMPLE_CATALOG_JSON)
        .unwrap_or_else(|err| panic!("sample catalog should parse: {err}"))
}

/// Broker settings pointing at a fictitious gateway.
#[must_use]
pub fn sample_settings(instance_limit: usize, mode: OperationMode) -> BrokerSettings {
    BrokerSettings {
        instance_limit,
        endpoints: Endpoints {
            s3: String::from("https://rgw.test/"),
            swift: String::from("https://rgw.test/auth/v1.0"),
        },
        mode,
    }
}

/// Broker wired to in-memory collaborators.
pub type MemoryBroker = Broker<ScriptedGateway, MemoryRecordStore>;

/// Builds a [`MemoryBroker`] over clones of the given doubles.
#[must_use]
pub fn memory_broker(
    gateway: &ScriptedGateway,
    store: &MemoryRecordStore,
    settings: BrokerSettings,
) -> MemoryBroker {
    Broker::new(
        gateway.clone(),
        store.clone(),
        sample_catalog(),
        RecordLayout::default(),
        settings,
    )
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Failure raised by [`MemoryRecordStore`].
#[derive(Debug, Error, Clone, Eq, PartialEq)]
pub enum MemoryStoreError {
    /// Returned when a failure was scripted for the operation.
    #[error("injected failure in {0}")]
    Injected(String),
}

#[derive(Debug, Default)]
struct StoreState {
    records: BTreeMap<String, String>,
    failures: BTreeSet<&'static str>,
    listings: Vec<(String, Option<usize>)>,
}

/// Shared in-memory [`RecordStore`] with failure injection.
///
/// Clones share state, so a test can keep a handle while the broker owns
/// another.
#[derive(Clone, Debug, Default)]
pub struct MemoryRecordStore {
    state: Arc<Mutex<StoreState>>,
}

impl MemoryRecordStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every later call of `operation` (`exists`, `get`, `put`,
    /// `delete`, `list_children`) fail.
    pub fn fail_on(&self, operation: &'static str) {
        lock(&self.state).failures.insert(operation);
    }

    /// Clears all scripted failures.
    pub fn clear_failures(&self) {
        lock(&self.state).failures.clear();
    }

    /// Writes a record directly, bypassing the broker.
    pub fn insert(&self, path: &str, body: &str) {
        lock(&self.state)
            .records
            .insert(path.to_owned(), body.to_owned());
    }

    /// Returns the record stored at `path`.
    #[must_use]
    pub fn record(&self, path: &str) -> Option<String> {
        lock(&self.state).records.get(path).cloned()
    }

    /// Returns every stored path in order.
    #[must_use]
    pub fn paths(&self) -> Vec<String> {
        lock(&self.state).records.keys().cloned().collect()
    }

    /// Returns the prefix and limit of every `list_children` call in order.
    #[must_use]
    pub fn listings(&self) -> Vec<(String, Option<usize>)> {
        lock(&self.state).listings.clone()
    }

    fn check(&self, operation: &'static str) -> Result<MutexGuard<'_, StoreState>, MemoryStoreError> {
        let state = lock(&self.state);
        if state.failures.contains(operation) {
            return Err(MemoryStoreError::Injected(operation.to_owned()));
        }
        Ok(state)
    }
}

impl RecordStore for MemoryRecordStore {
    type Error = MemoryStoreError;

    fn exists<'a>(&'a self, path: &'a str) -> StoreFuture<'a, bool, Self::Error> {
        Box::pin(async move {
            self.check("exists")
                .map(|state| state.records.contains_key(path))
        })
    }

    fn get<'a>(&'a self, path: &'a str) -> StoreFuture<'a, Option<String>, Self::Error> {
        Box::pin(async move {
            self.check("get")
                .map(|state| state.records.get(path).cloned())
        })
    }

    fn put<'a>(&'a self, path: &'a str, value: String) -> StoreFuture<'a, (), Self::Error> {
        Box::pin(async move {
            self.check("put").map(|mut state| {
                state.records.insert(path.to_owned(), value);
            })
        })
    }

    fn delete<'a>(&'a self, path: &'a str) -> StoreFuture<'a, (), Self::Error> {
        Box::pin(async move {
            self.check("delete").map(|mut state| {
                state.records.remove(path);
            })
        })
    }

    fn list_children<'a>(
        &'a self,
        prefix: &'a str,
        limit: Option<usize>,
    ) -> StoreFuture<'a, Vec<String>, Self::Error> {
        Box::pin(async move {
            self.check("list_children").map(|mut state| {
                state.listings.push((prefix.to_owned(), limit));
                state
                    .records
                    .keys()
                    .filter(|path| {
                        path.strip_prefix(prefix)
                            .is_some_and(|rest| !rest.is_empty() && !rest.contains('/'))
                    })
                    .take(limit.unwrap_or(usize::MAX))
                    .cloned()
                    .collect()
            })
        })
    }
}

/// Failure raised by [`ScriptedGateway`].
#[derive(Debug, Error, Clone, Eq, PartialEq)]
pub enum ScriptedGatewayError {
    /// Returned when a failure was scripted for the operation.
    #[error("injected failure in {0}")]
    Injected(String),
    /// Returned when creating a user that already exists.
    #[error("user {0} already exists")]
    AlreadyExists(String),
    /// Returned when addressing a user that does not exist.
    #[error("user {0} does not exist")]
    NoSuchUser(String),
}

impl GatewayError for ScriptedGatewayError {
    fn is_already_exists(&self) -> bool {
        matches!(self, Self::AlreadyExists(_))
    }
}

#[derive(Clone, Debug, Default)]
struct ScriptedUser {
    display_name: String,
    quota_mb: Option<u64>,
    usage_mb: u64,
    keys: Vec<S3Key>,
    subusers: Vec<Subuser>,
    swift_keys: Vec<SwiftKey>,
}

#[derive(Debug, Default)]
struct GatewayState {
    users: BTreeMap<String, ScriptedUser>,
    failures: BTreeSet<&'static str>,
    calls: Vec<String>,
    serial: u64,
}

impl GatewayState {
    fn next_secret(&mut self, kind: &str) -> String {
        self.serial += 1;
        format!("{kind}{:08}", self.serial)
    }

    fn user_mut(&mut self, uid: &str) -> Result<&mut ScriptedUser, ScriptedGatewayError> {
        self.users
            .get_mut(uid)
            .ok_or_else(|| ScriptedGatewayError::NoSuchUser(uid.to_owned()))
    }
}

/// In-memory [`AdminGateway`] that simulates users, keys, sub-users, quota
/// and usage.
///
/// Every call is recorded by name, and failures can be scripted per
/// operation. Clones share state.
#[derive(Clone, Debug, Default)]
pub struct ScriptedGateway {
    state: Arc<Mutex<GatewayState>>,
}

impl ScriptedGateway {
    /// Creates a gateway with no users.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every later call of `operation` fail. Operation names match the
    /// [`AdminGateway`] method names.
    pub fn fail_on(&self, operation: &'static str) {
        lock(&self.state).failures.insert(operation);
    }

    /// Clears all scripted failures.
    pub fn clear_failures(&self) {
        lock(&self.state).failures.clear();
    }

    /// Names of the operations invoked so far, in order.
    #[must_use]
    pub fn calls(&self) -> Vec<String> {
        lock(&self.state).calls.clone()
    }

    /// Creates a user directly, bypassing the broker.
    pub fn seed_user(&self, user: &str, tenant: &str) {
        lock(&self.state).users.insert(
            qualified_uid(user, tenant),
            ScriptedUser {
                display_name: user.to_owned(),
                ..ScriptedUser::default()
            },
        );
    }

    /// Sets the usage reported for a user.
    pub fn set_usage_mb(&self, user: &str, tenant: &str, usage_mb: u64) {
        if let Some(entry) = lock(&self.state).users.get_mut(&qualified_uid(user, tenant)) {
            entry.usage_mb = usage_mb;
        }
    }

    /// Returns whether the user exists.
    #[must_use]
    pub fn has_user(&self, user: &str, tenant: &str) -> bool {
        lock(&self.state)
            .users
            .contains_key(&qualified_uid(user, tenant))
    }

    /// Returns the quota applied to a user, if any.
    #[must_use]
    pub fn quota_mb(&self, user: &str, tenant: &str) -> Option<u64> {
        lock(&self.state)
            .users
            .get(&qualified_uid(user, tenant))
            .and_then(|entry| entry.quota_mb)
    }

    /// Returns whether `access_key` still belongs to the user.
    #[must_use]
    pub fn has_s3_key(&self, user: &str, tenant: &str, access_key: &str) -> bool {
        lock(&self.state)
            .users
            .get(&qualified_uid(user, tenant))
            .is_some_and(|entry| entry.keys.iter().any(|key| key.access_key == access_key))
    }

    /// Returns whether the sub-user still exists.
    #[must_use]
    pub fn has_subuser(&self, user: &str, subuser: &str, tenant: &str) -> bool {
        let id = qualified_subuser(user, subuser, tenant);
        lock(&self.state)
            .users
            .get(&qualified_uid(user, tenant))
            .is_some_and(|entry| entry.subusers.iter().any(|sub| sub.id == id))
    }

    /// Display name recorded when the user was created.
    #[must_use]
    pub fn display_name(&self, user: &str, tenant: &str) -> Option<String> {
        lock(&self.state)
            .users
            .get(&qualified_uid(user, tenant))
            .map(|entry| entry.display_name.clone())
    }

    fn apply<T>(
        &self,
        operation: &'static str,
        action: impl FnOnce(&mut GatewayState) -> Result<T, ScriptedGatewayError>,
    ) -> Result<T, ScriptedGatewayError> {
        let mut state = lock(&self.state);
        state.calls.push(operation.to_owned());
        if state.failures.contains(operation) {
            return Err(ScriptedGatewayError::Injected(operation.to_owned()));
        }
        action(&mut state)
    }
}

impl AdminGateway for ScriptedGateway {
    type Error = ScriptedGatewayError;

    fn create_user<'a>(
        &'a self,
        user: &'a str,
        display_name: &'a str,
        tenant: &'a str,
    ) -> GatewayFuture<'a, (), Self::Error> {
        Box::pin(async move {
            self.apply("create_user", |state| {
                let uid = qualified_uid(user, tenant);
                if state.users.contains_key(&uid) {
                    return Err(ScriptedGatewayError::AlreadyExists(uid));
                }
                state.users.insert(
                    uid,
                    ScriptedUser {
                        display_name: display_name.to_owned(),
                        ..ScriptedUser::default()
                    },
                );
                Ok(())
            })
        })
    }

    fn delete_user<'a>(
        &'a self,
        user: &'a str,
        tenant: &'a str,
    ) -> GatewayFuture<'a, (), Self::Error> {
        Box::pin(async move {
            self.apply("delete_user", |state| {
                state.users.remove(&qualified_uid(user, tenant));
                Ok(())
            })
        })
    }

    fn get_user<'a>(
        &'a self,
        user: &'a str,
        tenant: &'a str,
    ) -> GatewayFuture<'a, UserInfo, Self::Error> {
        Box::pin(async move {
            self.apply("get_user", |state| {
                let entry = state.user_mut(&qualified_uid(user, tenant))?;
                Ok(UserInfo {
                    user_id: user.to_owned(),
                    tenant: tenant.to_owned(),
                    subusers: entry.subusers.clone(),
                    keys: entry.keys.clone(),
                    swift_keys: entry.swift_keys.clone(),
                })
            })
        })
    }

    fn set_user_quota<'a>(
        &'a self,
        user: &'a str,
        tenant: &'a str,
        quota_mb: u64,
    ) -> GatewayFuture<'a, (), Self::Error> {
        Box::pin(async move {
            self.apply("set_user_quota", |state| {
                state.user_mut(&qualified_uid(user, tenant))?.quota_mb = Some(quota_mb);
                Ok(())
            })
        })
    }

    fn get_user_quota_mb<'a>(
        &'a self,
        user: &'a str,
        tenant: &'a str,
    ) -> GatewayFuture<'a, u64, Self::Error> {
        Box::pin(async move {
            self.apply("get_user_quota_mb", |state| {
                Ok(state
                    .user_mut(&qualified_uid(user, tenant))?
                    .quota_mb
                    .unwrap_or_default())
            })
        })
    }

    fn get_user_usage_mb<'a>(
        &'a self,
        user: &'a str,
        tenant: &'a str,
    ) -> GatewayFuture<'a, u64, Self::Error> {
        Box::pin(async move {
            self.apply("get_user_usage_mb", |state| {
                Ok(state.user_mut(&qualified_uid(user, tenant))?.usage_mb)
            })
        })
    }

    fn create_subuser<'a>(
        &'a self,
        user: &'a str,
        subuser: &'a str,
        tenant: &'a str,
    ) -> GatewayFuture<'a, Subuser, Self::Error> {
        Box::pin(async move {
            self.apply("create_subuser", |state| {
                let secret = state.next_secret("swift-");
                let id = qualified_subuser(user, subuser, tenant);
                let entry = state.user_mut(&qualified_uid(user, tenant))?;
                let created = Subuser {
                    id: id.clone(),
                    permissions: String::from("read-write"),
                };
                entry.subusers.push(created.clone());
                entry.swift_keys.push(SwiftKey {
                    user: id,
                    secret_key: secret,
                });
                Ok(created)
            })
        })
    }

    fn delete_subuser<'a>(
        &'a self,
        user: &'a str,
        subuser: &'a str,
        tenant: &'a str,
    ) -> GatewayFuture<'a, (), Self::Error> {
        Box::pin(async move {
            self.apply("delete_subuser", |state| {
                let id = qualified_subuser(user, subuser, tenant);
                if let Some(entry) = state.users.get_mut(&qualified_uid(user, tenant)) {
                    entry.subusers.retain(|sub| sub.id != id);
                    entry.swift_keys.retain(|key| key.user != id);
                }
                Ok(())
            })
        })
    }

    fn create_s3_key<'a>(
        &'a self,
        user: &'a str,
        tenant: &'a str,
    ) -> GatewayFuture<'a, S3Key, Self::Error> {
        Box::pin(async move {
            self.apply("create_s3_key", |state| {
                let access_key = state.next_secret("AK");
                let secret_key = state.next_secret("SK");
                let uid = qualified_uid(user, tenant);
                let key = S3Key {
                    user: uid.clone(),
                    access_key,
                    secret_key,
                };
                state.user_mut(&uid)?.keys.push(key.clone());
                Ok(key)
            })
        })
    }

    fn delete_s3_key<'a>(
        &'a self,
        user: &'a str,
        tenant: &'a str,
        access_key: &'a str,
    ) -> GatewayFuture<'a, (), Self::Error> {
        Box::pin(async move {
            self.apply("delete_s3_key", |state| {
                if let Some(entry) = state.users.get_mut(&qualified_uid(user, tenant)) {
                    entry.keys.retain(|key| key.access_key != access_key);
                }
                Ok(())
            })
        })
    }
}

/// Global mutex used to serialise environment mutation in tests.
pub static ENV_LOCK: AsyncMutex<()> = AsyncMutex::const_new(());

/// Guard that holds the env mutex and restores variables on drop.
pub struct EnvGuard {
    previous: Vec<(String, Option<OsString>)>,
    _guard: AsyncMutexGuard<'static, ()>,
}

impl EnvGuard {
    /// Sets and clears environment variables while holding [`ENV_LOCK`].
    ///
    /// A `None` value removes the variable for the lifetime of the guard.
    pub async fn set_vars(pairs: &[(&str, Option<&str>)]) -> Self {
        debug_assert!(
            {
                let mut seen = BTreeSet::new();
                pairs.iter().all(|(key, _)| seen.insert(*key))
            },
            "duplicate environment variable keys passed to EnvGuard::set_vars"
        );

        let guard = ENV_LOCK.lock().await;
        let mut previous = Vec::with_capacity(pairs.len());
        for (key, value) in pairs {
            let old = env::var_os(key);
            // SAFETY: Environment mutation is serialised by `ENV_LOCK`, preventing races.
            unsafe {
                match value {
                    Some(val) => env::set_var(key, val),
                    None => env::remove_var(key),
                }
            }
            previous.push(((*key).to_owned(), old));
        }

        Self {
            previous,
            _guard: guard,
        }
    }
}

impl Drop for EnvGuard {
    fn drop(&mut self) {
        for (key, old) in &self.previous {
            // SAFETY: Environment mutation is serialised by holding `_guard`.
            unsafe {
                match old {
                    Some(val) => env::set_var(key, val),
                    None => env::remove_var(key),
                }
            }
        }
    }
}
