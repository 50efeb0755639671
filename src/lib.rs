//! Core library for the cosb service broker.
//!
//! The crate provisions tenant-scoped users on a Ceph RADOS Gateway and
//! hands out S3 and Swift credentials per binding. Instance and binding
//! records live in an S3 bucket so the broker itself holds no state beyond
//! the in-process operation journal.

pub mod api;
pub mod broker;
pub mod catalog;
pub mod config;
pub mod gateway;
pub mod radosgw;
pub mod s3_store;
pub mod store;
pub mod telemetry;
pub mod test_support;

pub use broker::{
    BindCredentials, BindOutcome, Broker, BrokerError, BrokerSettings, ErrorKind, LastOperation,
    OperationMode, OperationOutcome, OperationState, ProvisionRequest, UpdateRequest,
};
pub use catalog::{Catalog, CatalogError, Plan, Service};
pub use config::{BrokerConfig, ConfigError};
pub use gateway::{AdminGateway, GatewayError};
pub use radosgw::{GatewaySettings, RadosGateway, RadosGatewayError};
pub use s3_store::{S3RecordStore, S3StoreError, StoreSettings};
pub use store::{BindingRecord, InstanceRecord, RecordLayout, RecordStore};
