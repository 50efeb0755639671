//! BDD step definitions for the broker lifecycle, driven through the HTTP
//! router over in-memory collaborators.
#![expect(
    clippy::needless_pass_by_value,
    reason = "step arguments are parsed into owned values"
)]

use axum::http::Method;
use cosb::broker::tenant_id;
use cosb::{InstanceRecord, RecordLayout};
use rstest_bdd_macros::{given, then, when};
use serde_json::json;

use super::test_helpers::{BrokerWorld, Reply, StepError, ensure};

fn instance_uri(instance: &str) -> String {
    format!("/v2/service_instances/{instance}")
}

fn binding_uri(instance: &str, binding: &str) -> String {
    format!("/v2/service_instances/{instance}/service_bindings/{binding}")
}

fn provision(world: &BrokerWorld, instance: &str, plan: &str) -> Result<Reply, StepError> {
    world.send(
        Method::PUT,
        &instance_uri(instance),
        Some(json!({"service_id": "svc-objectstore", "plan_id": plan})),
    )
}

fn bind(world: &BrokerWorld, instance: &str, binding: &str) -> Result<Reply, StepError> {
    let reply = world.send(
        Method::PUT,
        &binding_uri(instance, binding),
        Some(json!({"service_id": "svc-objectstore", "plan_id": "plan-small"})),
    )?;
    if let Some(access_key) = reply.body["credentials"]["s3AccessKey"].as_str() {
        world
            .access_keys
            .borrow_mut()
            .insert(binding.to_owned(), access_key.to_owned());
    }
    Ok(reply)
}

fn expect_status(reply: &Reply, expected: u16) -> Result<(), StepError> {
    ensure(reply.status == expected, || {
        format!("expected status {expected}, got {} ({})", reply.status, reply.body)
    })
}

#[given("instance \"{instance}\" is provisioned with plan \"{plan}\"")]
fn instance_provisioned(world: &BrokerWorld, instance: String, plan: String) -> Result<(), StepError> {
    expect_status(&provision(world, &instance, &plan)?, 201)
}

#[given("binding \"{binding}\" exists on instance \"{instance}\"")]
fn binding_exists(world: &BrokerWorld, binding: String, instance: String) -> Result<(), StepError> {
    expect_status(&bind(world, &instance, &binding)?, 201)
}

#[given("instance \"{instance}\" has used \"{usage}\" MB")]
fn instance_usage(world: &BrokerWorld, instance: String, usage: u64) {
    world
        .gateway
        .set_usage_mb(&instance, &tenant_id(&instance), usage);
}

#[given("instance \"{instance}\" has been deprovisioned")]
fn instance_deprovisioned(world: &BrokerWorld, instance: String) -> Result<(), StepError> {
    let reply = world.send(Method::DELETE, &instance_uri(&instance), None)?;
    expect_status(&reply, 200)
}

#[when("the platform provisions instance \"{instance}\" with plan \"{plan}\"")]
fn platform_provisions(world: &BrokerWorld, instance: String, plan: String) -> Result<(), StepError> {
    provision(world, &instance, &plan).map(drop)
}

#[when("the platform updates instance \"{instance}\" to plan \"{plan}\"")]
fn platform_updates(world: &BrokerWorld, instance: String, plan: String) -> Result<(), StepError> {
    world
        .send(
            Method::PATCH,
            &instance_uri(&instance),
            Some(json!({"service_id": "svc-objectstore", "plan_id": plan})),
        )
        .map(drop)
}

#[when("the platform binds \"{binding}\" to instance \"{instance}\"")]
fn platform_binds(world: &BrokerWorld, binding: String, instance: String) -> Result<(), StepError> {
    bind(world, &instance, &binding).map(drop)
}

#[when("the platform unbinds \"{binding}\" from instance \"{instance}\"")]
fn platform_unbinds(world: &BrokerWorld, binding: String, instance: String) -> Result<(), StepError> {
    world
        .send(Method::DELETE, &binding_uri(&instance, &binding), None)
        .map(drop)
}

#[when("the platform deprovisions instance \"{instance}\"")]
fn platform_deprovisions(world: &BrokerWorld, instance: String) -> Result<(), StepError> {
    world
        .send(Method::DELETE, &instance_uri(&instance), None)
        .map(drop)
}

#[then("the response status is \"{status}\"")]
fn response_status(world: &BrokerWorld, status: u16) -> Result<(), StepError> {
    expect_status(&world.last_reply()?, status)
}

#[then("the response error is \"{code}\"")]
fn response_error(world: &BrokerWorld, code: String) -> Result<(), StepError> {
    let reply = world.last_reply()?;
    ensure(reply.body["error"] == code.as_str(), || {
        format!("expected error '{code}', got {}", reply.body)
    })
}

#[then("the backend quota of \"{instance}\" is \"{quota}\" MB")]
fn backend_quota(world: &BrokerWorld, instance: String, quota: u64) -> Result<(), StepError> {
    let actual = world.gateway.quota_mb(&instance, &tenant_id(&instance));
    ensure(actual == Some(quota), || {
        format!("expected quota {quota} MB, got {actual:?}")
    })
}

#[then("the instance record of \"{instance}\" names plan \"{plan}\"")]
fn instance_record_plan(world: &BrokerWorld, instance: String, plan: String) -> Result<(), StepError> {
    let path = RecordLayout::default().instance_path(&instance);
    let body = world
        .store
        .record(&path)
        .ok_or_else(|| StepError::Assertion(format!("no record at {path}")))?;
    let record = InstanceRecord::from_json(&body)
        .map_err(|err| StepError::Assertion(err.to_string()))?;
    ensure(record.plan_id == plan, || {
        format!("expected plan {plan}, record names {}", record.plan_id)
    })
}

#[then("the response carries S3 and Swift credentials for \"{instance}\" and \"{binding}\"")]
fn credentials_returned(world: &BrokerWorld, instance: String, binding: String) -> Result<(), StepError> {
    let reply = world.last_reply()?;
    let credentials = &reply.body["credentials"];
    let tenant = tenant_id(&instance);
    ensure(
        credentials["s3User"] == format!("{tenant}${instance}").as_str(),
        || format!("unexpected s3User in {credentials}"),
    )?;
    ensure(
        credentials["swiftUser"] == format!("{tenant}${instance}:{binding}").as_str(),
        || format!("unexpected swiftUser in {credentials}"),
    )?;
    let access_key = credentials["s3AccessKey"].as_str().unwrap_or_default();
    ensure(
        world.gateway.has_s3_key(&instance, &tenant, access_key),
        || format!("access key {access_key} is not live on the gateway"),
    )?;
    ensure(
        world.gateway.has_subuser(&instance, &binding, &tenant),
        || String::from("subuser was not created"),
    )
}

#[then("the credentials of binding \"{binding}\" on \"{instance}\" are revoked")]
fn credentials_revoked(world: &BrokerWorld, binding: String, instance: String) -> Result<(), StepError> {
    let tenant = tenant_id(&instance);
    let access_key = world
        .access_keys
        .borrow()
        .get(&binding)
        .cloned()
        .ok_or_else(|| StepError::Assertion(format!("no access key recorded for {binding}")))?;
    ensure(!world.gateway.has_s3_key(&instance, &tenant, &access_key), || {
        format!("access key {access_key} is still live")
    })?;
    ensure(!world.gateway.has_subuser(&instance, &binding, &tenant), || {
        format!("subuser {binding} still exists")
    })
}

#[then("the backend user \"{instance}\" exists")]
fn backend_user_exists(world: &BrokerWorld, instance: String) -> Result<(), StepError> {
    ensure(world.gateway.has_user(&instance, &tenant_id(&instance)), || {
        format!("backend user {instance} was removed")
    })
}

#[then("the backend user \"{instance}\" does not exist")]
fn backend_user_absent(world: &BrokerWorld, instance: String) -> Result<(), StepError> {
    ensure(!world.gateway.has_user(&instance, &tenant_id(&instance)), || {
        format!("backend user {instance} is still present")
    })
}
