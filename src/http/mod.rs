//! Thin `axum` binding over the job runner — the HTTP surface for job control.
//!
//! The specification treats the HTTP/REST façade as an external collaborator and scopes its
//! business logic out; what remains ambient is routing, request/response translation, and the
//! single-job-at-a-time guard described by `POST /scrape`'s `409`. No scheduling, retry, or
//! classification logic lives here — every handler is a thin call into [`crate::job::JobRunner`]
//! or [`crate::events::EventBus`].
//!
//! Grounded in the pack's other example repos (axum + `tower-http` cors/trace layers), since
//! the teacher's own HTTP layer (`kodegen_server_http` + `rmcp`) is an internal sibling-crate
//! dependency tied to an MCP tool-server framework this crate does not carry (see DESIGN.md).

mod handlers;
mod state;
mod types;

pub use state::{AppState, RunningJob};

use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

/// Builds the router for the job-control surface.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/scrape", post(handlers::post_scrape))
        .route("/status", get(handlers::get_status))
        .route("/stop", post(handlers::post_stop))
        .route("/events", get(handlers::get_events))
        .route("/events/types", get(handlers::get_event_types))
        .route("/debug/{kind}", get(handlers::get_debug))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}
