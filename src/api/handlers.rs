//! Route handlers.

use std::sync::Arc;

use axum::Json;
use axum::body::Bytes;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::json;

use super::responses::{ApiError, Endpoint, broker_failure, instance_outcome};
use crate::broker::{Broker, ProvisionRequest, UpdateRequest};
use crate::gateway::AdminGateway;
use crate::store::RecordStore;

type Shared<G, S> = State<Arc<Broker<G, S>>>;

#[derive(Debug, Default, Deserialize)]
pub(crate) struct AsyncQuery {
    #[serde(default)]
    accepts_incomplete: bool,
}

#[derive(Debug, Default, Deserialize)]
struct ProvisionBody {
    service_id: Option<String>,
    plan_id: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct PreviousValues {
    plan_id: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct UpdateBody {
    service_id: Option<String>,
    plan_id: Option<String>,
    previous_values: Option<PreviousValues>,
}

#[derive(Debug, Default, Deserialize)]
struct BindBody {}

/// Parses a JSON body, treating an empty body as the type's default.
fn parse_body<T: DeserializeOwned + Default>(body: &Bytes) -> Result<T, ApiError> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(T::default());
    }
    serde_json::from_slice(body).map_err(|err| ApiError::MalformedBody(err.to_string()))
}

fn required(value: Option<String>, field: &'static str) -> Result<String, ApiError> {
    value
        .filter(|text| !text.is_empty())
        .ok_or(ApiError::MissingField(field))
}

pub(crate) async fn catalog<G, S>(State(broker): Shared<G, S>) -> Response
where
    G: AdminGateway + 'static,
    S: RecordStore + 'static,
{
    Json(broker.catalog().clone()).into_response()
}

pub(crate) async fn provision<G, S>(
    State(broker): Shared<G, S>,
    Path(instance_id): Path<String>,
    Query(query): Query<AsyncQuery>,
    body: Bytes,
) -> Response
where
    G: AdminGateway + 'static,
    S: RecordStore + 'static,
{
    let request = match parse_body::<ProvisionBody>(&body).and_then(|parsed| {
        Ok(ProvisionRequest {
            service_id: required(parsed.service_id, "service_id")?,
            plan_id: required(parsed.plan_id, "plan_id")?,
            accepts_incomplete: query.accepts_incomplete,
        })
    }) {
        Ok(request) => request,
        Err(err) => return err.into_response(),
    };
    match broker.provision(&instance_id, &request).await {
        Ok(outcome) => instance_outcome(outcome, StatusCode::CREATED),
        Err(err) => broker_failure(Endpoint::Provision, &err),
    }
}

pub(crate) async fn update<G, S>(
    State(broker): Shared<G, S>,
    Path(instance_id): Path<String>,
    Query(query): Query<AsyncQuery>,
    body: Bytes,
) -> Response
where
    G: AdminGateway + 'static,
    S: RecordStore + 'static,
{
    let parsed = match parse_body::<UpdateBody>(&body) {
        Ok(parsed) => parsed,
        Err(err) => return err.into_response(),
    };
    let request = UpdateRequest {
        service_id: parsed.service_id,
        plan_id: parsed.plan_id,
        previous_plan_id: parsed.previous_values.and_then(|previous| previous.plan_id),
        accepts_incomplete: query.accepts_incomplete,
    };
    match broker.update(&instance_id, &request).await {
        Ok(outcome) => instance_outcome(outcome, StatusCode::OK),
        Err(err) => broker_failure(Endpoint::Update, &err),
    }
}

pub(crate) async fn deprovision<G, S>(
    State(broker): Shared<G, S>,
    Path(instance_id): Path<String>,
    Query(query): Query<AsyncQuery>,
) -> Response
where
    G: AdminGateway + 'static,
    S: RecordStore + 'static,
{
    match broker
        .deprovision(&instance_id, query.accepts_incomplete)
        .await
    {
        Ok(outcome) => instance_outcome(outcome, StatusCode::OK),
        Err(err) => broker_failure(Endpoint::Deprovision, &err),
    }
}

pub(crate) async fn bind<G, S>(
    State(broker): Shared<G, S>,
    Path((instance_id, binding_id)): Path<(String, String)>,
    body: Bytes,
) -> Response
where
    G: AdminGateway + 'static,
    S: RecordStore + 'static,
{
    if let Err(err) = parse_body::<BindBody>(&body) {
        return err.into_response();
    }
    match broker.bind(&instance_id, &binding_id).await {
        Ok(outcome) => (
            StatusCode::CREATED,
            Json(json!({ "credentials": outcome.credentials })),
        )
            .into_response(),
        Err(err) => broker_failure(Endpoint::Bind, &err),
    }
}

pub(crate) async fn unbind<G, S>(
    State(broker): Shared<G, S>,
    Path((instance_id, binding_id)): Path<(String, String)>,
) -> Response
where
    G: AdminGateway + 'static,
    S: RecordStore + 'static,
{
    match broker.unbind(&instance_id, &binding_id).await {
        Ok(()) => (StatusCode::OK, Json(json!({}))).into_response(),
        Err(err) => broker_failure(Endpoint::Unbind, &err),
    }
}

pub(crate) async fn last_operation<G, S>(
    State(broker): Shared<G, S>,
    Path(instance_id): Path<String>,
) -> Response
where
    G: AdminGateway + 'static,
    S: RecordStore + 'static,
{
    Json(broker.last_operation(&instance_id).await).into_response()
}
