//! HTTP surface of the broker.
//!
//! Every route requires basic credentials and an `X-Broker-API-Version`
//! header with major version 2. Handlers translate request bodies into
//! engine calls and engine errors into the status codes the platform
//! expects.

mod auth;
mod handlers;
mod responses;
mod version;

use std::sync::Arc;

use axum::Router;
use axum::middleware;
use axum::routing::{get, put};
use tower_http::trace::TraceLayer;

use crate::broker::Broker;
use crate::gateway::AdminGateway;
use crate::store::RecordStore;

pub use auth::BasicCredentials;
pub use responses::ApiError;
pub use version::{API_VERSION_HEADER, SUPPORTED_MAJOR_VERSION};

/// Builds the broker router over a shared engine.
#[must_use]
pub fn router<G, S>(broker: Arc<Broker<G, S>>, credentials: BasicCredentials) -> Router
where
    G: AdminGateway + 'static,
    S: RecordStore + 'static,
{
    Router::new()
        .route("/v2/catalog", get(handlers::catalog::<G, S>))
        .route(
            "/v2/service_instances/{instance_id}",
            put(handlers::provision::<G, S>)
                .patch(handlers::update::<G, S>)
                .delete(handlers::deprovision::<G, S>),
        )
        .route(
            "/v2/service_instances/{instance_id}/last_operation",
            get(handlers::last_operation::<G, S>),
        )
        .route(
            "/v2/service_instances/{instance_id}/service_bindings/{binding_id}",
            put(handlers::bind::<G, S>).delete(handlers::unbind::<G, S>),
        )
        .with_state(broker)
        .layer(middleware::from_fn(version::require_api_version))
        .layer(middleware::from_fn_with_state(
            Arc::new(credentials),
            auth::require_basic_auth,
        ))
        .layer(TraceLayer::new_for_http())
}
