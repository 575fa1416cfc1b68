//! ballast-driver — device configuration backends.
//!
//! A worker drives exactly one device through the [`DeviceDriver`]
//! capability set. Every capability call returns a [`Capability`] tag so
//! callers can tell a driver that intentionally opts out of an action
//! (expected, non-fatal) from one that attempted it and failed (fatal,
//! logged with detail).
//!
//! # Components
//!
//! - **`driver`** — the capability vocabulary, tagged outcomes, and the
//!   null driver
//! - **`haproxy`** — the HAProxy backend: batch builder + deterministic
//!   configuration rendering + commit pipeline
//! - **`services`** — the system boundary (config install, service
//!   control, stats socket, log shipping)

pub mod driver;
pub mod haproxy;
pub mod services;

pub use driver::{ArchiveStore, Capability, DeviceDriver, LbStatistics, NullDriver};
pub use haproxy::HaproxyDriver;
pub use services::{ProcessServices, ServiceError, ServiceResult, SystemServices};
