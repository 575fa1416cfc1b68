//! ballast-core — shared types for the Ballast control plane.
//!
//! This crate holds the pieces every other crate agrees on:
//!
//! - **`types`** — persisted domain entities (load balancers, devices,
//!   nodes, health monitors) and their status enums
//! - **`wire`** — the job message and response envelope exchanged between
//!   the dispatcher and worker agents
//! - **`config`** — the `ballast.toml` daemon configuration

pub mod config;
pub mod types;
pub mod wire;

pub use config::BallastConfig;
pub use types::{Device, DeviceStatus, HealthMonitor, Job, LbStatus, LoadBalancer, Node};
pub use wire::{
    Action, Algorithm, BadRequest, JobMessage, JobResponse, MonitorBlock, NodeCondition,
    NodeEntry, ResponseStatus,
};
