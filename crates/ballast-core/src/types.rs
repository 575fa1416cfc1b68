//! Domain entities for the Ballast control plane.
//!
//! These types mirror the relational rows managed by the tenant API and
//! mutated by the job dispatcher: load balancers, the devices they are
//! mapped onto, backend nodes, and health monitors. Status enums
//! serialize to the uppercase strings stored in the database.

use serde::{Deserialize, Serialize};

use crate::wire::{Action, JobMessage};

/// Unique identifier for a load balancer row.
pub type LbId = i64;

/// Unique identifier for a device row.
pub type DeviceId = i64;

// ── Load balancer ──────────────────────────────────────────────────

/// Lifecycle status of a tenant load balancer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LbStatus {
    Build,
    Active,
    PendingDelete,
    Deleted,
    Error,
}

impl LbStatus {
    /// The uppercase string stored in the database.
    pub fn as_str(&self) -> &'static str {
        match self {
            LbStatus::Build => "BUILD",
            LbStatus::Active => "ACTIVE",
            LbStatus::PendingDelete => "PENDING_DELETE",
            LbStatus::Deleted => "DELETED",
            LbStatus::Error => "ERROR",
        }
    }

    /// Parse a database status string.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "BUILD" => Some(LbStatus::Build),
            "ACTIVE" => Some(LbStatus::Active),
            "PENDING_DELETE" => Some(LbStatus::PendingDelete),
            "DELETED" => Some(LbStatus::Deleted),
            "ERROR" => Some(LbStatus::Error),
            _ => None,
        }
    }

    /// Whether this load balancer still counts against a device's live
    /// configuration. Deleted and pending-delete rows do not.
    pub fn is_live(&self) -> bool {
        !matches!(self, LbStatus::Deleted | LbStatus::PendingDelete)
    }
}

/// A tenant's logical balancing configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LoadBalancer {
    pub id: LbId,
    pub name: String,
    pub protocol: String,
    pub algorithm: String,
    pub port: u16,
    pub status: LbStatus,
    /// Last error reported for this load balancer, if any.
    pub errmsg: Option<String>,
    pub tenant_id: String,
    /// Backend pool entries, ordered by node id.
    pub nodes: Vec<Node>,
    pub monitor: Option<HealthMonitor>,
    /// Devices this load balancer is mapped onto (many-to-many).
    pub device_ids: Vec<DeviceId>,
}

// ── Device ─────────────────────────────────────────────────────────

/// Lifecycle status of a provisioned appliance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DeviceStatus {
    Build,
    Active,
    Offline,
    Error,
}

impl DeviceStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            DeviceStatus::Build => "BUILD",
            DeviceStatus::Active => "ACTIVE",
            DeviceStatus::Offline => "OFFLINE",
            DeviceStatus::Error => "ERROR",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "BUILD" => Some(DeviceStatus::Build),
            "ACTIVE" => Some(DeviceStatus::Active),
            "OFFLINE" => Some(DeviceStatus::Offline),
            "ERROR" => Some(DeviceStatus::Error),
            _ => None,
        }
    }
}

/// A provisioned appliance host running reconfigurable load-balancing
/// software. Devices are deleted logically (marked offline), never
/// removed while a job may still reference them.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Device {
    pub id: DeviceId,
    pub name: String,
    pub floating_ip: String,
    pub public_ip: String,
    pub status: DeviceStatus,
    pub az: u32,
    pub device_type: String,
    /// Diagnostic message from the most recent job touching this device.
    pub errmsg: Option<String>,
}

// ── Node ───────────────────────────────────────────────────────────

/// A backend server entry in a load balancer's pool.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Node {
    pub id: i64,
    pub address: String,
    pub port: u16,
    pub weight: u32,
    pub enabled: bool,
    pub status: String,
}

// ── Health monitor ─────────────────────────────────────────────────

/// Health monitor parameters; at most one per load balancer.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct HealthMonitor {
    pub monitor_type: String,
    pub delay: u32,
    pub timeout: u32,
    /// Consecutive failures before the node is deactivated.
    pub attempts: u32,
    pub path: Option<String>,
}

// ── Job ────────────────────────────────────────────────────────────

/// One asynchronous unit of work sent to a worker for execution against
/// a device. Jobs are transient — they exist only for the duration of
/// dispatch and result handling and are never persisted.
#[derive(Debug, Clone)]
pub struct Job {
    pub action: Action,
    pub target_host: String,
    pub payload: JobMessage,
    pub lb_id: LbId,
}

/// Terminal outcome of a dispatched job.
#[derive(Debug, Clone)]
pub struct JobResult {
    pub success: bool,
    /// Raw worker response on success.
    pub response: Option<crate::wire::JobResponse>,
    /// Human-readable error message on failure.
    pub error: Option<String>,
}

impl JobResult {
    pub fn pass(response: crate::wire::JobResponse) -> Self {
        Self {
            success: true,
            response: Some(response),
            error: None,
        }
    }

    pub fn fail(error: impl Into<String>) -> Self {
        Self {
            success: false,
            response: None,
            error: Some(error.into()),
        }
    }

    /// The failure message, or a generic fallback for malformed results.
    pub fn error_message(&self) -> &str {
        self.error.as_deref().unwrap_or("Load Balancer error")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_round_trips_through_strings() {
        for status in [
            LbStatus::Build,
            LbStatus::Active,
            LbStatus::PendingDelete,
            LbStatus::Deleted,
            LbStatus::Error,
        ] {
            assert_eq!(LbStatus::parse(status.as_str()), Some(status));
        }
        assert_eq!(LbStatus::parse("BOGUS"), None);
    }

    #[test]
    fn device_status_round_trips() {
        for status in [
            DeviceStatus::Build,
            DeviceStatus::Active,
            DeviceStatus::Offline,
            DeviceStatus::Error,
        ] {
            assert_eq!(DeviceStatus::parse(status.as_str()), Some(status));
        }
    }

    #[test]
    fn deleted_and_pending_delete_are_not_live() {
        assert!(LbStatus::Active.is_live());
        assert!(LbStatus::Build.is_live());
        assert!(LbStatus::Error.is_live());
        assert!(!LbStatus::Deleted.is_live());
        assert!(!LbStatus::PendingDelete.is_live());
    }
}
