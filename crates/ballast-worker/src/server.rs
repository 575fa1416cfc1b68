//! Worker job endpoint.
//!
//! The dispatcher posts one job message per request; each request gets a
//! fresh controller and a fresh driver instance from the factory, so a
//! driver's batch state never spans two messages. Concurrency across
//! messages comes entirely from the server spawning separate handler
//! invocations.
//!
//! # Routes
//!
//! | Method | Path | Description |
//! |---|---|---|
//! | POST | `/v1/jobs` | Execute one job message |
//! | GET | `/v1/health` | Liveness check |

use std::sync::Arc;

use axum::routing::{get, post};
use axum::{Json, Router, extract::State};
use serde_json::Value;
use tracing::debug;

use ballast_core::wire::JobResponse;
use ballast_driver::DeviceDriver;

use crate::controller::ActionController;

/// Builds one driver instance per inbound job.
pub type DriverFactory = Arc<dyn Fn() -> Box<dyn DeviceDriver> + Send + Sync>;

#[derive(Clone)]
struct WorkerState {
    driver_factory: DriverFactory,
}

/// Build the worker router.
pub fn build_router(driver_factory: DriverFactory) -> Router {
    Router::new()
        .route("/v1/jobs", post(handle_job))
        .route("/v1/health", get(health))
        .with_state(WorkerState { driver_factory })
}

/// POST /v1/jobs
async fn handle_job(State(state): State<WorkerState>, Json(raw): Json<Value>) -> Json<JobResponse> {
    debug!("job message received");
    let mut driver = (state.driver_factory)();
    let response = ActionController::new(driver.as_mut()).run(raw).await;
    Json(response)
}

/// GET /v1/health
async fn health() -> &'static str {
    "OK"
}
