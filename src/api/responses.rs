//! Response bodies and the mapping from engine errors to status codes.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::{Map, Value, json};
use thiserror::Error;
use tracing::{error, warn};

use crate::broker::{BrokerError, OperationOutcome};

/// Request-level failures detected before the engine is called.
#[derive(Debug, Error, Eq, PartialEq)]
pub enum ApiError {
    /// The body is not valid JSON for the endpoint.
    #[error("malformed request body: {0}")]
    MalformedBody(String),
    /// A required body field is absent.
    #[error("missing required field '{0}'")]
    MissingField(&'static str),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match self {
            Self::MalformedBody(_) => StatusCode::BAD_REQUEST,
            Self::MissingField(_) => StatusCode::UNPROCESSABLE_ENTITY,
        };
        (status, Json(error_body(None, &self.to_string()))).into_response()
    }
}

/// Builds `{"error": ..., "description": ...}`, omitting an absent code.
pub(crate) fn error_body(code: Option<&str>, description: &str) -> Value {
    let mut body = Map::new();
    if let Some(code) = code {
        body.insert(String::from("error"), Value::from(code));
    }
    body.insert(String::from("description"), Value::from(description));
    Value::Object(body)
}

/// Endpoint a failure is reported for; some errors map differently per route.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub(crate) enum Endpoint {
    Provision,
    Update,
    Deprovision,
    Bind,
    Unbind,
}

/// Answer for a completed (or asynchronously reported) instance operation.
pub(crate) fn instance_outcome(outcome: OperationOutcome, completed: StatusCode) -> Response {
    if outcome.is_async {
        let body = outcome
            .operation
            .map_or_else(|| json!({}), |operation| json!({ "operation": operation }));
        return (StatusCode::ACCEPTED, Json(body)).into_response();
    }
    (completed, Json(json!({}))).into_response()
}

/// Maps an engine error onto the status code of `endpoint`.
pub(crate) fn broker_failure<G, S>(endpoint: Endpoint, err: &BrokerError<G, S>) -> Response
where
    G: std::error::Error + 'static,
    S: std::error::Error + 'static,
{
    let description = err.to_string();
    let (status, code) = match err {
        BrokerError::InvalidIdentifier { .. } | BrokerError::InstanceLimitExceeded { .. } => {
            (StatusCode::BAD_REQUEST, None)
        }
        BrokerError::InstanceAlreadyExists { .. } | BrokerError::BindingAlreadyExists { .. } => {
            (StatusCode::CONFLICT, None)
        }
        BrokerError::InstanceDoesNotExist { .. } => match endpoint {
            Endpoint::Deprovision | Endpoint::Unbind => return gone(),
            Endpoint::Provision | Endpoint::Update | Endpoint::Bind => {
                (StatusCode::NOT_FOUND, None)
            }
        },
        BrokerError::BindingDoesNotExist { .. } => return gone(),
        BrokerError::PlanNotFound { .. } | BrokerError::QuotaBelowUsage { .. } => {
            (StatusCode::UNPROCESSABLE_ENTITY, None)
        }
        BrokerError::PlanChangeNotSupported { .. } => {
            (StatusCode::UNPROCESSABLE_ENTITY, Some("PlanChangeNotSupported"))
        }
        BrokerError::AsyncRequired => (StatusCode::UNPROCESSABLE_ENTITY, Some("AsyncRequired")),
        BrokerError::BindingsExist { .. } => {
            (StatusCode::FORBIDDEN, Some("deprovision-with-existing-binds"))
        }
        BrokerError::Catalog(_)
        | BrokerError::InvalidRecord { .. }
        | BrokerError::MissingSwiftKey { .. }
        | BrokerError::Gateway { .. }
        | BrokerError::Store { .. } => {
            error!(?endpoint, error = %description, "operation failed");
            (StatusCode::INTERNAL_SERVER_ERROR, None)
        }
    };
    if status.is_client_error() {
        warn!(?endpoint, status = status.as_u16(), error = %description, "request rejected");
    }
    (status, Json(error_body(code, &description))).into_response()
}

fn gone() -> Response {
    (StatusCode::GONE, Json(json!({}))).into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{MemoryStoreError, ScriptedGatewayError};
    use rstest::rstest;

    type Failure = BrokerError<ScriptedGatewayError, MemoryStoreError>;

    fn instance_missing() -> Failure {
        BrokerError::InstanceDoesNotExist {
            instance_id: String::from("789"),
        }
    }

    #[rstest]
    #[case(Endpoint::Deprovision, StatusCode::GONE)]
    #[case(Endpoint::Unbind, StatusCode::GONE)]
    #[case(Endpoint::Bind, StatusCode::NOT_FOUND)]
    #[case(Endpoint::Update, StatusCode::NOT_FOUND)]
    fn missing_instance_status_depends_on_endpoint(
        #[case] endpoint: Endpoint,
        #[case] expected: StatusCode,
    ) {
        assert_eq!(broker_failure(endpoint, &instance_missing()).status(), expected);
    }

    #[rstest]
    fn backend_failures_are_server_errors() {
        let err: Failure = BrokerError::Store {
            operation: "put",
            source: MemoryStoreError::Injected(String::from("put")),
        };
        assert_eq!(
            broker_failure(Endpoint::Provision, &err).status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[rstest]
    fn error_body_omits_absent_code() {
        assert_eq!(error_body(None, "x"), json!({"description": "x"}));
        assert_eq!(
            error_body(Some("AsyncRequired"), "x"),
            json!({"error": "AsyncRequired", "description": "x"})
        );
    }
}
