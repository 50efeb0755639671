//! Error taxonomy for the lifecycle engine.

use thiserror::Error;

use crate::catalog::CatalogError;

/// Coarse classification of a [`BrokerError`], used to pick a response.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ErrorKind {
    /// The request itself is malformed.
    InvalidRequest,
    /// A plan, instance or binding is absent.
    NotFound,
    /// An instance or binding already exists.
    AlreadyExists,
    /// The provisioned-instance cap has been reached.
    LimitExceeded,
    /// The request conflicts with current state.
    Conflict,
    /// The requested plan change is not offered.
    PlanChangeNotSupported,
    /// The broker only accepts asynchronous requests.
    AsyncRequired,
    /// A collaborator call failed.
    BackendFailure,
}

/// Errors surfaced by broker operations.
#[derive(Debug, Error)]
pub enum BrokerError<GatewayErr, StoreErr>
where
    GatewayErr: std::error::Error + 'static,
    StoreErr: std::error::Error + 'static,
{
    /// Raised when an identifier cannot be mapped onto a record path.
    #[error("invalid {field} '{value}': identifiers must be non-empty and must not contain '/'")]
    InvalidIdentifier {
        /// Name of the offending identifier.
        field: &'static str,
        /// Value supplied by the caller.
        value: String,
    },
    /// Raised when provisioning would exceed the configured instance limit.
    #[error("instance limit of {limit} reached")]
    InstanceLimitExceeded {
        /// Configured limit.
        limit: usize,
    },
    /// Raised when provisioning an instance that already has a record.
    #[error("instance {instance_id} already exists")]
    InstanceAlreadyExists {
        /// Instance identifier.
        instance_id: String,
    },
    /// Raised when the instance record is absent.
    #[error("instance {instance_id} does not exist")]
    InstanceDoesNotExist {
        /// Instance identifier.
        instance_id: String,
    },
    /// Raised when binding twice with the same identifier.
    #[error("binding {binding_id} already exists for instance {instance_id}")]
    BindingAlreadyExists {
        /// Instance identifier.
        instance_id: String,
        /// Binding identifier.
        binding_id: String,
    },
    /// Raised when the binding record is absent.
    #[error("binding {binding_id} does not exist for instance {instance_id}")]
    BindingDoesNotExist {
        /// Instance identifier.
        instance_id: String,
        /// Binding identifier.
        binding_id: String,
    },
    /// Raised when a provision names a plan missing from the catalog.
    #[error("plan with id '{plan_id}' not found")]
    PlanNotFound {
        /// Plan identifier supplied by the caller.
        plan_id: String,
    },
    /// Raised when an update names a plan missing from the catalog.
    #[error("plan change to '{plan_id}' is not supported")]
    PlanChangeNotSupported {
        /// Plan identifier supplied by the caller.
        plan_id: String,
    },
    /// Raised when live usage already reaches the new plan's quota.
    #[error(
        "current object store usage of {usage_mb} MB exceeds the {quota_mb} MB quota of the new plan"
    )]
    QuotaBelowUsage {
        /// Usage measured immediately before the update.
        usage_mb: u64,
        /// Quota of the requested plan.
        quota_mb: u64,
    },
    /// Raised when deprovisioning an instance that still has bindings.
    #[error(
        "deprovision failed because instance {instance_id} has binds; existing binds must be removed first"
    )]
    BindingsExist {
        /// Instance identifier.
        instance_id: String,
    },
    /// Raised in async-only mode when the caller does not accept async work.
    #[error("this broker only supports asynchronous operations; retry with accepts_incomplete=true")]
    AsyncRequired,
    /// Raised when the catalog holds an unusable plan entry.
    #[error("catalog error: {0}")]
    Catalog(#[source] CatalogError),
    /// Raised when a stored record cannot be decoded.
    #[error("stored record {path} is malformed: {message}")]
    InvalidRecord {
        /// Record path.
        path: String,
        /// Decoder message.
        message: String,
    },
    /// Raised when the backend does not report the Swift secret just minted.
    #[error("swift secret for {subuser} missing after sub-user creation")]
    MissingSwiftKey {
        /// Qualified sub-user identifier.
        subuser: String,
    },
    /// Wrapper for admin gateway failures.
    #[error("admin gateway failed to {operation}: {source}")]
    Gateway {
        /// Step that failed.
        operation: &'static str,
        /// Gateway error.
        #[source]
        source: GatewayErr,
    },
    /// Wrapper for record store failures.
    #[error("record store failed to {operation}: {source}")]
    Store {
        /// Step that failed.
        operation: &'static str,
        /// Store error.
        #[source]
        source: StoreErr,
    },
}

impl<GatewayErr, StoreErr> BrokerError<GatewayErr, StoreErr>
where
    GatewayErr: std::error::Error + 'static,
    StoreErr: std::error::Error + 'static,
{
    /// Classifies the error.
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidIdentifier { .. } => ErrorKind::InvalidRequest,
            Self::InstanceLimitExceeded { .. } => ErrorKind::LimitExceeded,
            Self::InstanceAlreadyExists { .. } | Self::BindingAlreadyExists { .. } => {
                ErrorKind::AlreadyExists
            }
            Self::InstanceDoesNotExist { .. }
            | Self::BindingDoesNotExist { .. }
            | Self::PlanNotFound { .. } => ErrorKind::NotFound,
            Self::PlanChangeNotSupported { .. } => ErrorKind::PlanChangeNotSupported,
            Self::QuotaBelowUsage { .. } | Self::BindingsExist { .. } => ErrorKind::Conflict,
            Self::AsyncRequired => ErrorKind::AsyncRequired,
            Self::Catalog(_)
            | Self::InvalidRecord { .. }
            | Self::MissingSwiftKey { .. }
            | Self::Gateway { .. }
            | Self::Store { .. } => ErrorKind::BackendFailure,
        }
    }
}
