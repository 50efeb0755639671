//! Shared fixtures for broker BDD scenarios.

use std::cell::RefCell;
use std::collections::BTreeMap;
use std::sync::Arc;

use axum::Router;
use axum::body::{Body, to_bytes};
use axum::http::header::{AUTHORIZATION, CONTENT_TYPE};
use axum::http::{Method, Request};
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use cosb::OperationMode;
use cosb::api::{API_VERSION_HEADER, BasicCredentials, router};
use cosb::test_support::{MemoryRecordStore, ScriptedGateway, memory_broker, sample_settings};
use rstest::fixture;
use serde_json::Value;
use thiserror::Error;
use tokio::runtime::Runtime;
use tower::ServiceExt;

const USERNAME: &str = "platform";
const PASSWORD: &str = "s3cret";

#[derive(Debug, Error)]
pub enum StepError {
    #[error("request failed: {0}")]
    Request(String),
    #[error("assertion failed: {0}")]
    Assertion(String),
}

/// Status and decoded JSON body of one broker response.
#[derive(Clone, Debug)]
pub struct Reply {
    pub status: u16,
    pub body: Value,
}

pub struct BrokerWorld {
    runtime: Runtime,
    app: Router,
    pub gateway: ScriptedGateway,
    pub store: MemoryRecordStore,
    pub last: RefCell<Option<Reply>>,
    pub access_keys: RefCell<BTreeMap<String, String>>,
}

impl BrokerWorld {
    fn new() -> Result<Self, StepError> {
        let runtime = Runtime::new().map_err(|err| StepError::Request(err.to_string()))?;
        let gateway = ScriptedGateway::new();
        let store = MemoryRecordStore::new();
        let broker = memory_broker(
            &gateway,
            &store,
            sample_settings(10, OperationMode::Synchronous),
        );
        let app = router(Arc::new(broker), BasicCredentials::new(USERNAME, PASSWORD));
        Ok(Self {
            runtime,
            app,
            gateway,
            store,
            last: RefCell::new(None),
            access_keys: RefCell::new(BTreeMap::new()),
        })
    }

    /// Sends an authenticated request and remembers the reply.
    pub fn send(&self, method: Method, uri: &str, body: Option<Value>) -> Result<Reply, StepError> {
        let token = STANDARD.encode(format!("{USERNAME}:{PASSWORD}"));
        let builder = Request::builder()
            .method(method)
            .uri(uri)
            .header(AUTHORIZATION, format!("Basic {token}"))
            .header(API_VERSION_HEADER, "2.14");
        let request = match body {
            Some(value) => builder
                .header(CONTENT_TYPE, "application/json")
                .body(Body::from(value.to_string())),
            None => builder.body(Body::empty()),
        }
        .map_err(|err| StepError::Request(err.to_string()))?;

        let app = self.app.clone();
        let reply = self.runtime.block_on(async move {
            let response = app
                .oneshot(request)
                .await
                .map_err(|err| StepError::Request(err.to_string()))?;
            let status = response.status().as_u16();
            let bytes = to_bytes(response.into_body(), 1 << 20)
                .await
                .map_err(|err| StepError::Request(err.to_string()))?;
            let payload = if bytes.is_empty() {
                Value::Null
            } else {
                serde_json::from_slice(&bytes)
                    .map_err(|err| StepError::Request(err.to_string()))?
            };
            Ok::<_, StepError>(Reply {
                status,
                body: payload,
            })
        })?;
        *self.last.borrow_mut() = Some(reply.clone());
        Ok(reply)
    }

    /// The most recent reply.
    pub fn last_reply(&self) -> Result<Reply, StepError> {
        self.last
            .borrow()
            .clone()
            .ok_or_else(|| StepError::Assertion(String::from("no request has been sent")))
    }
}

/// Fails with `message` unless `condition` holds.
pub fn ensure(condition: bool, message: impl FnOnce() -> String) -> Result<(), StepError> {
    if condition {
        Ok(())
    } else {
        Err(StepError::Assertion(message()))
    }
}

#[fixture]
pub fn world() -> BrokerWorld {
    BrokerWorld::new().unwrap_or_else(|err| panic!("broker world fixture should initialise: {err}"))
}
