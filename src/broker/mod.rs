//! Lifecycle engine for service instances and bindings.
//!
//! [`Broker`] composes an [`AdminGateway`] and a [`RecordStore`]. Instance and
//! binding existence is only ever read from the record store; the gateway is
//! driven for side effects on the storage backend. Operations on a single
//! instance are serialised in-process, distinct instances run concurrently.

mod credentials;
mod error;
mod journal;
mod locks;

use std::str::FromStr;

use tracing::{debug, info, warn};

use crate::catalog::{Catalog, CatalogError};
use crate::gateway::{AdminGateway, GatewayError, qualified_subuser};
use crate::store::{BindingRecord, InstanceRecord, RecordLayout, RecordStore};

pub use credentials::{BindCredentials, Endpoints, tenant_id};
pub use error::{BrokerError, ErrorKind};
pub use journal::{JOURNAL_CAPACITY, LastOperation, Operation, OperationJournal, OperationState};
pub use locks::{InstanceGuard, InstanceLocks};

use credentials::MintedSecrets;

/// Broker error specialised to the collaborators of a [`Broker`].
pub type BrokerFailure<G, S> =
    BrokerError<<G as AdminGateway>::Error, <S as RecordStore>::Error>;

/// Synchronicity policy applied to instance operations.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum OperationMode {
    /// Every operation completes in-band and reports `async: false`.
    #[default]
    Synchronous,
    /// Instance operations require `accepts_incomplete=true` and are
    /// reported as asynchronous with an operation token.
    AsyncOnly,
}

impl FromStr for OperationMode {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim() {
            "synchronous" => Ok(Self::Synchronous),
            "async-only" => Ok(Self::AsyncOnly),
            other => Err(format!(
                "unknown operation mode '{other}'; expected 'synchronous' or 'async-only'"
            )),
        }
    }
}

/// Static settings of the lifecycle engine.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct BrokerSettings {
    /// Maximum number of provisioned instances.
    pub instance_limit: usize,
    /// Endpoints written into bind credentials.
    pub endpoints: Endpoints,
    /// Synchronicity policy.
    pub mode: OperationMode,
}

/// Provision request parameters.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct ProvisionRequest {
    /// Service being provisioned.
    pub service_id: String,
    /// Plan being provisioned.
    pub plan_id: String,
    /// Whether the platform accepts an asynchronous answer.
    pub accepts_incomplete: bool,
}

/// Update request parameters.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct UpdateRequest {
    /// Service of the instance.
    pub service_id: Option<String>,
    /// Requested plan; `None` leaves the plan unchanged.
    pub plan_id: Option<String>,
    /// Plan the platform believes is applied.
    pub previous_plan_id: Option<String>,
    /// Whether the platform accepts an asynchronous answer.
    pub accepts_incomplete: bool,
}

/// Result of an instance operation.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct OperationOutcome {
    /// Whether the response is reported as asynchronous.
    pub is_async: bool,
    /// Operation token returned for asynchronous responses.
    pub operation: Option<String>,
}

impl OperationOutcome {
    fn completed(is_async: bool, operation: Operation) -> Self {
        Self {
            is_async,
            operation: is_async.then(|| operation.as_str().to_owned()),
        }
    }
}

/// Result of a bind.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct BindOutcome {
    /// Credentials for the new binding.
    pub credentials: BindCredentials,
}

/// The lifecycle engine.
#[derive(Debug)]
pub struct Broker<G, S> {
    gateway: G,
    store: S,
    catalog: Catalog,
    settings: BrokerSettings,
    layout: RecordLayout,
    locks: InstanceLocks,
    journal: OperationJournal,
}

impl<G, S> Broker<G, S>
where
    G: AdminGateway,
    S: RecordStore,
{
    /// Assembles a broker from its collaborators.
    #[must_use]
    pub fn new(
        gateway: G,
        store: S,
        catalog: Catalog,
        layout: RecordLayout,
        settings: BrokerSettings,
    ) -> Self {
        Self {
            gateway,
            store,
            catalog,
            settings,
            layout,
            locks: InstanceLocks::new(),
            journal: OperationJournal::new(),
        }
    }

    /// The catalog served by this broker.
    #[must_use]
    pub const fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    /// The admin gateway.
    #[must_use]
    pub const fn gateway(&self) -> &G {
        &self.gateway
    }

    /// The record store.
    #[must_use]
    pub const fn store(&self) -> &S {
        &self.store
    }

    /// The record layout.
    #[must_use]
    pub const fn layout(&self) -> &RecordLayout {
        &self.layout
    }

    /// Provisions a new instance with the plan's quota.
    ///
    /// # Errors
    ///
    /// Returns [`BrokerError::InstanceLimitExceeded`] when the instance cap
    /// has been reached, [`BrokerError::InstanceAlreadyExists`] when a record
    /// is present, [`BrokerError::PlanNotFound`] when the plan is unknown and
    /// wraps every collaborator failure.
    pub async fn provision(
        &self,
        instance_id: &str,
        request: &ProvisionRequest,
    ) -> Result<OperationOutcome, BrokerFailure<G, S>> {
        validate_identifier("instance_id", instance_id)?;
        let is_async = self.check_async_policy(request.accepts_incomplete)?;
        let result = {
            let _guard = self.locks.acquire(instance_id).await;
            self.provision_inner(instance_id, request).await
        };
        self.journal
            .record(instance_id, Operation::Provision, &result)
            .await;
        result.map(|()| OperationOutcome::completed(is_async, Operation::Provision))
    }

    async fn provision_inner(
        &self,
        instance_id: &str,
        request: &ProvisionRequest,
    ) -> Result<(), BrokerFailure<G, S>> {
        let existing = self
            .store
            .list_children(
                self.layout.instances_prefix(),
                Some(self.settings.instance_limit),
            )
            .await
            .map_err(Self::store_failure("count instances"))?;
        if existing.len() >= self.settings.instance_limit {
            return Err(BrokerError::InstanceLimitExceeded {
                limit: self.settings.instance_limit,
            });
        }

        let path = self.layout.instance_path(instance_id);
        if self
            .store
            .exists(&path)
            .await
            .map_err(Self::store_failure("check instance"))?
        {
            return Err(BrokerError::InstanceAlreadyExists {
                instance_id: instance_id.to_owned(),
            });
        }

        let quota_mb = self
            .catalog
            .resolve_quota(&request.plan_id)
            .map_err(|err| match err {
                CatalogError::PlanNotFound { plan_id } => BrokerError::PlanNotFound { plan_id },
                other => BrokerError::Catalog(other),
            })?;

        let tenant = tenant_id(instance_id);
        if let Err(source) = self
            .gateway
            .create_user(instance_id, instance_id, &tenant)
            .await
        {
            if !source.is_already_exists() {
                return Err(BrokerError::Gateway {
                    operation: "create user",
                    source,
                });
            }
            self.adopt_existing_user(instance_id, &path).await?;
        }

        let committed = self
            .commit_provision(instance_id, &tenant, &path, request, quota_mb)
            .await;
        if let Err(err) = &committed {
            warn!(
                instance_id,
                tenant = %tenant,
                error = %err,
                "backend user left without an instance record"
            );
        } else {
            info!(instance_id, plan_id = %request.plan_id, quota_mb, "instance provisioned");
        }
        committed
    }

    /// Resolves a backend `UserAlreadyExists`. A record written meanwhile by
    /// another replica makes this a duplicate; otherwise the user is an
    /// orphan of an earlier failed provision and is taken over.
    async fn adopt_existing_user(
        &self,
        instance_id: &str,
        path: &str,
    ) -> Result<(), BrokerFailure<G, S>> {
        if self
            .store
            .exists(path)
            .await
            .map_err(Self::store_failure("check instance"))?
        {
            return Err(BrokerError::InstanceAlreadyExists {
                instance_id: instance_id.to_owned(),
            });
        }
        warn!(instance_id, "adopting backend user without an instance record");
        Ok(())
    }

    async fn commit_provision(
        &self,
        instance_id: &str,
        tenant: &str,
        path: &str,
        request: &ProvisionRequest,
        quota_mb: u64,
    ) -> Result<(), BrokerFailure<G, S>> {
        self.gateway
            .set_user_quota(instance_id, tenant, quota_mb)
            .await
            .map_err(Self::gateway_failure("set quota"))?;
        let record = InstanceRecord {
            service_id: request.service_id.clone(),
            plan_id: request.plan_id.clone(),
            quota_mb,
        };
        self.put_instance(path, &record).await
    }

    /// Moves an instance to a new plan.
    ///
    /// # Errors
    ///
    /// Returns [`BrokerError::PlanChangeNotSupported`] for an unknown plan,
    /// [`BrokerError::InstanceDoesNotExist`] when no record is present,
    /// [`BrokerError::QuotaBelowUsage`] when live usage reaches the new quota
    /// and wraps every collaborator failure.
    pub async fn update(
        &self,
        instance_id: &str,
        request: &UpdateRequest,
    ) -> Result<OperationOutcome, BrokerFailure<G, S>> {
        validate_identifier("instance_id", instance_id)?;
        let is_async = self.check_async_policy(request.accepts_incomplete)?;
        let result = {
            let _guard = self.locks.acquire(instance_id).await;
            self.update_inner(instance_id, request).await
        };
        self.journal
            .record(instance_id, Operation::Update, &result)
            .await;
        result.map(|()| OperationOutcome::completed(is_async, Operation::Update))
    }

    async fn update_inner(
        &self,
        instance_id: &str,
        request: &UpdateRequest,
    ) -> Result<(), BrokerFailure<G, S>> {
        let path = self.layout.instance_path(instance_id);
        let Some(plan_id) = request.plan_id.as_deref() else {
            self.require_instance(instance_id, &path).await?;
            debug!(instance_id, "update without plan change");
            return Ok(());
        };
        let quota_mb = self.catalog.resolve_quota(plan_id).map_err(|err| match err {
            CatalogError::PlanNotFound { .. } => BrokerError::PlanChangeNotSupported {
                plan_id: plan_id.to_owned(),
            },
            other => BrokerError::Catalog(other),
        })?;

        let mut record = self.load_instance(instance_id, &path).await?;
        let previous = record
            .known_plan()
            .or(request.previous_plan_id.as_deref());
        if previous == Some(plan_id) {
            debug!(instance_id, plan_id, "plan unchanged");
            return Ok(());
        }

        let tenant = tenant_id(instance_id);
        let usage_mb = self
            .gateway
            .get_user_usage_mb(instance_id, &tenant)
            .await
            .map_err(Self::gateway_failure("read usage"))?;
        if usage_mb >= quota_mb {
            return Err(BrokerError::QuotaBelowUsage { usage_mb, quota_mb });
        }

        self.gateway
            .set_user_quota(instance_id, &tenant, quota_mb)
            .await
            .map_err(Self::gateway_failure("set quota"))?;
        plan_id.clone_into(&mut record.plan_id);
        record.quota_mb = quota_mb;
        if let Some(service_id) = &request.service_id {
            service_id.clone_into(&mut record.service_id);
        }
        self.put_instance(&path, &record).await?;
        info!(instance_id, plan_id, quota_mb, "instance plan updated");
        Ok(())
    }

    /// Removes an instance and its backend user.
    ///
    /// # Errors
    ///
    /// Returns [`BrokerError::InstanceDoesNotExist`] when no record is
    /// present, [`BrokerError::BindingsExist`] while bindings remain and wraps
    /// every collaborator failure.
    pub async fn deprovision(
        &self,
        instance_id: &str,
        accepts_incomplete: bool,
    ) -> Result<OperationOutcome, BrokerFailure<G, S>> {
        validate_identifier("instance_id", instance_id)?;
        let is_async = self.check_async_policy(accepts_incomplete)?;
        let result = {
            let _guard = self.locks.acquire(instance_id).await;
            self.deprovision_inner(instance_id).await
        };
        self.journal
            .record(instance_id, Operation::Deprovision, &result)
            .await;
        result.map(|()| OperationOutcome::completed(is_async, Operation::Deprovision))
    }

    async fn deprovision_inner(&self, instance_id: &str) -> Result<(), BrokerFailure<G, S>> {
        let path = self.layout.instance_path(instance_id);
        self.require_instance(instance_id, &path).await?;

        let bindings = self
            .store
            .list_children(&self.layout.bindings_prefix(instance_id), Some(1))
            .await
            .map_err(Self::store_failure("list bindings"))?;
        if !bindings.is_empty() {
            return Err(BrokerError::BindingsExist {
                instance_id: instance_id.to_owned(),
            });
        }

        self.gateway
            .delete_user(instance_id, &tenant_id(instance_id))
            .await
            .map_err(Self::gateway_failure("delete user"))?;
        self.store
            .delete(&path)
            .await
            .map_err(Self::store_failure("delete instance record"))?;
        info!(instance_id, "instance deprovisioned");
        Ok(())
    }

    /// Issues fresh S3 and Swift credentials for a binding.
    ///
    /// # Errors
    ///
    /// Returns [`BrokerError::InstanceDoesNotExist`] when the parent is
    /// absent, [`BrokerError::BindingAlreadyExists`] for a repeated binding ID
    /// and wraps every collaborator failure.
    pub async fn bind(
        &self,
        instance_id: &str,
        binding_id: &str,
    ) -> Result<BindOutcome, BrokerFailure<G, S>> {
        validate_identifier("instance_id", instance_id)?;
        validate_identifier("binding_id", binding_id)?;
        let result = {
            let _guard = self.locks.acquire(instance_id).await;
            self.bind_inner(instance_id, binding_id).await
        };
        self.journal
            .record(instance_id, Operation::Bind, &result)
            .await;
        result
    }

    async fn bind_inner(
        &self,
        instance_id: &str,
        binding_id: &str,
    ) -> Result<BindOutcome, BrokerFailure<G, S>> {
        self.require_instance(instance_id, &self.layout.instance_path(instance_id))
            .await?;
        let binding_path = self.layout.binding_path(instance_id, binding_id);
        if self
            .store
            .exists(&binding_path)
            .await
            .map_err(Self::store_failure("check binding"))?
        {
            return Err(BrokerError::BindingAlreadyExists {
                instance_id: instance_id.to_owned(),
                binding_id: binding_id.to_owned(),
            });
        }

        let tenant = tenant_id(instance_id);
        let s3_key = self
            .gateway
            .create_s3_key(instance_id, &tenant)
            .await
            .map_err(Self::gateway_failure("create s3 key"))?;
        self.gateway
            .create_subuser(instance_id, binding_id, &tenant)
            .await
            .map_err(Self::gateway_failure("create subuser"))?;
        let user = self
            .gateway
            .get_user(instance_id, &tenant)
            .await
            .map_err(Self::gateway_failure("read user"))?;
        let subuser = qualified_subuser(instance_id, binding_id, &tenant);
        let swift_secret = user
            .swift_key_for(&subuser)
            .map(|key| key.secret_key.clone())
            .ok_or_else(|| BrokerError::MissingSwiftKey {
                subuser: subuser.clone(),
            })?;

        let record = BindingRecord {
            user: instance_id.to_owned(),
            subuser: binding_id.to_owned(),
            tenant: tenant.clone(),
            s3_access_key: s3_key.access_key.clone(),
            swift_key: swift_secret.clone(),
        };
        let body = serde_json::to_string(&record).map_err(|err| BrokerError::InvalidRecord {
            path: binding_path.clone(),
            message: err.to_string(),
        })?;
        self.store
            .put(&binding_path, body)
            .await
            .map_err(Self::store_failure("write binding record"))?;

        let credentials = BindCredentials::compose(
            instance_id,
            binding_id,
            &tenant,
            MintedSecrets {
                s3_access_key: s3_key.access_key,
                s3_secret_key: s3_key.secret_key,
                swift_secret_key: swift_secret,
            },
            &self.settings.endpoints,
        );
        info!(instance_id, binding_id, "binding created");
        Ok(BindOutcome { credentials })
    }

    /// Revokes a binding's credentials and removes its record.
    ///
    /// The record is only deleted after both backend credentials are gone, so
    /// a failed unbind can be retried.
    ///
    /// # Errors
    ///
    /// Returns [`BrokerError::InstanceDoesNotExist`] or
    /// [`BrokerError::BindingDoesNotExist`] when either record is absent and
    /// wraps every collaborator failure.
    pub async fn unbind(
        &self,
        instance_id: &str,
        binding_id: &str,
    ) -> Result<(), BrokerFailure<G, S>> {
        validate_identifier("instance_id", instance_id)?;
        validate_identifier("binding_id", binding_id)?;
        let result = {
            let _guard = self.locks.acquire(instance_id).await;
            self.unbind_inner(instance_id, binding_id).await
        };
        self.journal
            .record(instance_id, Operation::Unbind, &result)
            .await;
        result
    }

    async fn unbind_inner(
        &self,
        instance_id: &str,
        binding_id: &str,
    ) -> Result<(), BrokerFailure<G, S>> {
        self.require_instance(instance_id, &self.layout.instance_path(instance_id))
            .await?;
        let binding_path = self.layout.binding_path(instance_id, binding_id);
        let body = self
            .store
            .get(&binding_path)
            .await
            .map_err(Self::store_failure("read binding record"))?
            .ok_or_else(|| BrokerError::BindingDoesNotExist {
                instance_id: instance_id.to_owned(),
                binding_id: binding_id.to_owned(),
            })?;
        let record: BindingRecord =
            serde_json::from_str(&body).map_err(|err| BrokerError::InvalidRecord {
                path: binding_path.clone(),
                message: err.to_string(),
            })?;

        let tenant = tenant_id(instance_id);
        self.gateway
            .delete_s3_key(instance_id, &tenant, &record.s3_access_key)
            .await
            .map_err(Self::gateway_failure("delete s3 key"))?;
        self.gateway
            .delete_subuser(instance_id, binding_id, &tenant)
            .await
            .map_err(Self::gateway_failure("delete subuser"))?;
        self.store
            .delete(&binding_path)
            .await
            .map_err(Self::store_failure("delete binding record"))?;
        info!(instance_id, binding_id, "binding removed");
        Ok(())
    }

    /// Reports the most recent recorded outcome for `instance_id`.
    pub async fn last_operation(&self, instance_id: &str) -> LastOperation {
        self.journal.last(instance_id).await
    }

    const fn check_async_policy(
        &self,
        accepts_incomplete: bool,
    ) -> Result<bool, BrokerFailure<G, S>> {
        match self.settings.mode {
            OperationMode::Synchronous => Ok(false),
            OperationMode::AsyncOnly if accepts_incomplete => Ok(true),
            OperationMode::AsyncOnly => Err(BrokerError::AsyncRequired),
        }
    }

    async fn require_instance(
        &self,
        instance_id: &str,
        path: &str,
    ) -> Result<(), BrokerFailure<G, S>> {
        let exists = self
            .store
            .exists(path)
            .await
            .map_err(Self::store_failure("check instance"))?;
        if exists {
            Ok(())
        } else {
            Err(BrokerError::InstanceDoesNotExist {
                instance_id: instance_id.to_owned(),
            })
        }
    }

    async fn load_instance(
        &self,
        instance_id: &str,
        path: &str,
    ) -> Result<InstanceRecord, BrokerFailure<G, S>> {
        let body = self
            .store
            .get(path)
            .await
            .map_err(Self::store_failure("read instance record"))?
            .ok_or_else(|| BrokerError::InstanceDoesNotExist {
                instance_id: instance_id.to_owned(),
            })?;
        InstanceRecord::from_json(&body).map_err(|err| BrokerError::InvalidRecord {
            path: path.to_owned(),
            message: err.to_string(),
        })
    }

    async fn put_instance(
        &self,
        path: &str,
        record: &InstanceRecord,
    ) -> Result<(), BrokerFailure<G, S>> {
        let body = serde_json::to_string(record).map_err(|err| BrokerError::InvalidRecord {
            path: path.to_owned(),
            message: err.to_string(),
        })?;
        self.store
            .put(path, body)
            .await
            .map_err(Self::store_failure("write instance record"))
    }

    fn gateway_failure(
        operation: &'static str,
    ) -> impl FnOnce(G::Error) -> BrokerFailure<G, S> {
        move |source| BrokerError::Gateway { operation, source }
    }

    fn store_failure(operation: &'static str) -> impl FnOnce(S::Error) -> BrokerFailure<G, S> {
        move |source| BrokerError::Store { operation, source }
    }
}

fn validate_identifier<G, S>(field: &'static str, value: &str) -> Result<(), BrokerError<G, S>>
where
    G: std::error::Error + 'static,
    S: std::error::Error + 'static,
{
    if value.is_empty() || value.contains('/') {
        return Err(BrokerError::InvalidIdentifier {
            field,
            value: value.to_owned(),
        });
    }
    Ok(())
}
