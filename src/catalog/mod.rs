//! Static service catalog and plan resolution.
//!
//! The catalog is loaded once at startup from a JSON file holding an array of
//! services. Every plan carries its storage quota in `metadata.quotaMB`, either
//! as a string (the historical format) or as an integer. Fields the broker
//! does not interpret are preserved and served back verbatim.

use camino::Utf8Path;
use cap_std::{ambient_authority, fs_utf8::Dir};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

/// Metadata key holding a plan's quota in megabytes.
pub const QUOTA_METADATA_KEY: &str = "quotaMB";

/// Errors raised while loading or querying the catalog.
#[derive(Clone, Debug, Error, Eq, PartialEq)]
pub enum CatalogError {
    /// Raised when the catalog file cannot be read.
    #[error("failed to read catalog {path}: {message}")]
    Io {
        /// Path that could not be read.
        path: String,
        /// Human-readable error message.
        message: String,
    },
    /// Raised when the catalog document is not valid JSON for the model.
    #[error("failed to parse catalog: {0}")]
    Parse(String),
    /// Raised when the catalog contains no services.
    #[error("catalog does not define any services")]
    Empty,
    /// Raised when two plans share an identifier.
    #[error("plan id '{plan_id}' appears more than once in the catalog")]
    DuplicatePlan {
        /// Repeated plan identifier.
        plan_id: String,
    },
    /// Raised when a plan has a missing or malformed quota.
    #[error("plan '{plan_id}' has an invalid quotaMB: {message}")]
    InvalidQuota {
        /// Plan identifier.
        plan_id: String,
        /// Description of the problem.
        message: String,
    },
    /// Raised when a plan identifier is not part of the catalog.
    #[error("plan with id '{plan_id}' not found")]
    PlanNotFound {
        /// Plan identifier that was requested.
        plan_id: String,
    },
}

/// A service plan offered by the broker.
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
pub struct Plan {
    /// Globally unique plan identifier.
    pub id: String,
    /// CLI-friendly plan name.
    pub name: String,
    /// Short human-readable description.
    pub description: String,
    /// Whether the plan is free of charge.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub free: Option<bool>,
    /// Plan-level override of the service's `bindable` flag.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bindable: Option<bool>,
    /// Opaque metadata, including the quota entry.
    #[serde(default)]
    pub metadata: Map<String, Value>,
    /// Fields the broker passes through untouched.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Plan {
    /// Reads the storage quota from the plan metadata.
    ///
    /// # Errors
    ///
    /// Returns [`CatalogError::InvalidQuota`] when the entry is missing, is not
    /// a non-negative integer, or is a string that does not parse as one.
    pub fn quota_mb(&self) -> Result<u64, CatalogError> {
        let invalid = |message: &str| CatalogError::InvalidQuota {
            plan_id: self.id.clone(),
            message: message.to_owned(),
        };
        match self.metadata.get(QUOTA_METADATA_KEY) {
            Some(Value::String(text)) => text
                .trim()
                .parse::<u64>()
                .map_err(|err| invalid(&err.to_string())),
            Some(Value::Number(number)) => number
                .as_u64()
                .ok_or_else(|| invalid("expected a non-negative integer")),
            Some(_) => Err(invalid("expected a string or integer")),
            None => Err(invalid("entry is missing")),
        }
    }
}

/// A service offered by the broker.
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
pub struct Service {
    /// Globally unique service identifier.
    pub id: String,
    /// CLI-friendly service name.
    pub name: String,
    /// Short human-readable description.
    pub description: String,
    /// Whether instances of this service can be bound.
    #[serde(default)]
    pub bindable: bool,
    /// Whether instances support plan changes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub plan_updateable: Option<bool>,
    /// Free-form tags.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
    /// Opaque service metadata.
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub metadata: Map<String, Value>,
    /// Plans offered by this service.
    pub plans: Vec<Plan>,
    /// Fields the broker passes through untouched.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// The broker catalog: every service and plan the broker offers.
#[derive(Clone, Debug, Serialize, PartialEq)]
pub struct Catalog {
    services: Vec<Service>,
}

impl Catalog {
    /// Builds a catalog after validating the services.
    ///
    /// # Errors
    ///
    /// Returns [`CatalogError`] when the catalog is empty, when plan IDs
    /// repeat, or when a plan lacks a valid quota.
    pub fn new(services: Vec<Service>) -> Result<Self, CatalogError> {
        let catalog = Self { services };
        catalog.validate()?;
        Ok(catalog)
    }

    /// Parses a catalog from a JSON array of services.
    ///
    /// # Errors
    ///
    /// Returns [`CatalogError::Parse`] when the document is malformed, or any
    /// validation error from [`Catalog::new`].
    pub fn from_json_str(contents: &str) -> Result<Self, CatalogError> {
        let services: Vec<Service> =
            serde_json::from_str(contents).map_err(|err| CatalogError::Parse(err.to_string()))?;
        Self::new(services)
    }

    /// Loads and validates the catalog file at `path`.
    ///
    /// # Errors
    ///
    /// Returns [`CatalogError::Io`] when the file cannot be read, otherwise
    /// the errors of [`Catalog::from_json_str`].
    pub fn load(path: &Utf8Path) -> Result<Self, CatalogError> {
        let io_error = |message: String| CatalogError::Io {
            path: path.to_string(),
            message,
        };
        let parent = match path.parent() {
            Some(dir) if !dir.as_str().is_empty() => dir,
            _ => Utf8Path::new("."),
        };
        let file_name = path
            .file_name()
            .ok_or_else(|| io_error(String::from("path does not name a file")))?;
        let dir = Dir::open_ambient_dir(parent, ambient_authority())
            .map_err(|err| io_error(err.to_string()))?;
        let contents = dir
            .read_to_string(file_name)
            .map_err(|err| io_error(err.to_string()))?;
        Self::from_json_str(&contents)
    }

    /// Returns the services in catalog order.
    #[must_use]
    pub fn services(&self) -> &[Service] {
        &self.services
    }

    /// Looks up a plan by identifier across all services.
    ///
    /// # Errors
    ///
    /// Returns [`CatalogError::PlanNotFound`] when no service offers the plan.
    pub fn resolve_plan(&self, plan_id: &str) -> Result<&Plan, CatalogError> {
        self.services
            .iter()
            .flat_map(|service| service.plans.iter())
            .find(|plan| plan.id == plan_id)
            .ok_or_else(|| CatalogError::PlanNotFound {
                plan_id: plan_id.to_owned(),
            })
    }

    /// Resolves the storage quota for a plan.
    ///
    /// # Errors
    ///
    /// Returns [`CatalogError::PlanNotFound`] when the plan is unknown and
    /// [`CatalogError::InvalidQuota`] when its metadata is malformed.
    pub fn resolve_quota(&self, plan_id: &str) -> Result<u64, CatalogError> {
        self.resolve_plan(plan_id)?.quota_mb()
    }

    fn validate(&self) -> Result<(), CatalogError> {
        if self.services.is_empty() {
            return Err(CatalogError::Empty);
        }
        let mut seen = std::collections::BTreeSet::new();
        for plan in self.services.iter().flat_map(|service| service.plans.iter()) {
            if !seen.insert(plan.id.as_str()) {
                return Err(CatalogError::DuplicatePlan {
                    plan_id: plan.id.clone(),
                });
            }
            plan.quota_mb()?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests;
