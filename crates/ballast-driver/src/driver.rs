//! Driver capability vocabulary and tagged call outcomes.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use ballast_core::wire::Algorithm;

/// Outcome of a single capability call.
///
/// `Unsupported` means the driver opts out of the capability entirely —
/// callers treat it as expected and decide per call site whether that is
/// tolerable. `Failed` means the driver attempted the operation and it
/// went wrong.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Capability<T> {
    Unsupported,
    Ok(T),
    Failed(String),
}

impl<T> Capability<T> {
    /// Convert a fallible operation's result into a tagged outcome.
    pub fn from_result<E: std::fmt::Display>(result: Result<T, E>) -> Self {
        match result {
            Result::Ok(value) => Capability::Ok(value),
            Result::Err(e) => Capability::Failed(e.to_string()),
        }
    }

    pub fn is_unsupported(&self) -> bool {
        matches!(self, Capability::Unsupported)
    }

    pub fn is_ok(&self) -> bool {
        matches!(self, Capability::Ok(_))
    }
}

/// Object-store destination and load balancer identity for ARCHIVE.
#[derive(Debug, Clone, PartialEq)]
pub struct ArchiveStore {
    pub store_type: String,
    pub endpoint: String,
    pub base_path: String,
    pub auth_token: String,
    pub lb_id: String,
    pub lb_name: Option<String>,
}

/// Normalized statistics read from the managed service's control
/// channel. Advisory only — a liveness probe, not a correctness gate.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LbStatistics {
    pub bytes_in: u64,
    pub bytes_out: u64,
    pub current_sessions: u64,
}

/// The device configuration capability set.
///
/// Every method defaults to `Unsupported`, so a backend implements only
/// what its software can actually do. State-accumulating methods
/// (`bind`, `add_server`, setters) build up one batch; `create` commits
/// the batch and must reset accumulated state on success — a driver
/// instance never straddles two batches.
#[async_trait]
pub trait DeviceDriver: Send {
    /// Prepare the backend before a CREATE/UPDATE batch.
    async fn init(&mut self) -> Capability<()> {
        Capability::Unsupported
    }

    /// Set the frontend bind address and port for the batch.
    fn bind(&mut self, _address: &str, _port: u16) -> Capability<()> {
        Capability::Unsupported
    }

    /// Select the frontend protocol.
    fn set_protocol(&mut self, _protocol: &str) -> Capability<()> {
        Capability::Unsupported
    }

    /// Select the balancing algorithm.
    fn set_algorithm(&mut self, _algorithm: Algorithm) -> Capability<()> {
        Capability::Unsupported
    }

    /// Add a backend server to the pending batch.
    fn add_server(&mut self, _address: &str, _port: u16, _weight: u32) -> Capability<()> {
        Capability::Unsupported
    }

    /// Commit the accumulated batch to the device.
    async fn create(&mut self) -> Capability<()> {
        Capability::Unsupported
    }

    /// Take the device out of service without discarding configuration.
    async fn suspend(&mut self) -> Capability<()> {
        Capability::Unsupported
    }

    /// Bring a suspended device back into service.
    async fn enable(&mut self) -> Capability<()> {
        Capability::Unsupported
    }

    /// Remove the device's configuration and stop serving.
    async fn delete(&mut self) -> Capability<()> {
        Capability::Unsupported
    }

    /// Ship service logs to an object store.
    async fn archive(&mut self, _store: &ArchiveStore) -> Capability<()> {
        Capability::Unsupported
    }

    /// Query the managed service for statistics.
    async fn get_stats(&mut self) -> Capability<LbStatistics> {
        Capability::Unsupported
    }
}

/// The base driver: implements no capability at all.
///
/// Useful as a stand-in where a worker must answer jobs without touching
/// any device software, and in tests that pin the unsupported paths.
#[derive(Debug, Default)]
pub struct NullDriver;

#[async_trait]
impl DeviceDriver for NullDriver {}
