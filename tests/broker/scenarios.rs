//! BDD scenarios for the broker lifecycle.

use rstest_bdd_macros::scenario;

use super::test_helpers::{BrokerWorld, world};

#[scenario(
    path = "tests/features/broker.feature",
    name = "Provision an instance with the plan quota"
)]
fn scenario_provision(world: BrokerWorld) {
    let _ = world;
}

#[scenario(
    path = "tests/features/broker.feature",
    name = "Reject a repeated provision"
)]
fn scenario_repeated_provision(world: BrokerWorld) {
    let _ = world;
}

#[scenario(path = "tests/features/broker.feature", name = "Reject a repeated bind")]
fn scenario_repeated_bind(world: BrokerWorld) {
    let _ = world;
}

#[scenario(
    path = "tests/features/broker.feature",
    name = "Unbind revokes credentials and then reports gone"
)]
fn scenario_unbind(world: BrokerWorld) {
    let _ = world;
}

#[scenario(
    path = "tests/features/broker.feature",
    name = "Deprovision waits for bindings to be removed"
)]
fn scenario_deprovision(world: BrokerWorld) {
    let _ = world;
}

#[scenario(
    path = "tests/features/broker.feature",
    name = "Refuse a plan whose quota is below current usage"
)]
fn scenario_quota_below_usage(world: BrokerWorld) {
    let _ = world;
}

#[scenario(
    path = "tests/features/broker.feature",
    name = "Updating to the current plan changes nothing"
)]
fn scenario_same_plan_update(world: BrokerWorld) {
    let _ = world;
}

#[scenario(
    path = "tests/features/broker.feature",
    name = "Bind is unreachable once the instance is gone"
)]
fn scenario_bind_after_deprovision(world: BrokerWorld) {
    let _ = world;
}
