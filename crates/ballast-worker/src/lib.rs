//! ballast-worker — the worker agent's action controller.
//!
//! A worker receives one job message at a time, validates it, and drives
//! the device driver through the requested action. The controller is
//! stateless per invocation: Received → Validated → {BadRequest |
//! Dispatched} → {Success | Failure}, terminal within one call, no
//! internal retry.
//!
//! # Components
//!
//! - **`controller`** — the per-message action state machine
//! - **`validate`** — declarative field-requirement validation
//! - **`server`** — the axum job endpoint the dispatcher posts to

pub mod controller;
pub mod server;
pub mod validate;

pub use controller::{ActionController, RELEASE, VERSION};
pub use server::{DriverFactory, build_router};
pub use validate::ValidationError;
