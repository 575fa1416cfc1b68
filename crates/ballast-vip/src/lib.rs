//! ballast-vip — floating address lifecycle against a compute provider.
//!
//! Four independent operations (create, assign, remove, delete) share
//! one PASS/FAIL envelope. The controller only talks to the compute
//! provider and reports pass/fail; it never mutates persisted entity
//! rows. Assignment optionally verifies reachability with a bounded TCP
//! probe.
//!
//! # Components
//!
//! - **`controller`** — the four lifecycle operations
//! - **`provider`** — the compute provider contract + HTTP client +
//!   device instance provisioning
//! - **`probe`** — the bounded TCP reachability check

pub mod controller;
pub mod probe;
pub mod provider;

pub use controller::{ProviderFactory, VipController, VipOutcome};
pub use probe::{ProbeError, ProbeSettings, verify_tcp};
pub use provider::{
    ComputeProvider, FloatingIp, HttpComputeProvider, InstanceInfo, ProviderError,
    build_device_instance,
};
