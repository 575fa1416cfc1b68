//! Declarative job message validation.
//!
//! Field requirements live in tables rather than nested conditionals;
//! the first unmet requirement produces a [`ValidationError`] naming the
//! offending field. Validation runs before any driver call for the
//! batch, so a rejected message never touches device software.

use ballast_core::wire::{JobMessage, MonitorBlock, NodeEntry};
use ballast_driver::ArchiveStore;

/// A malformed inbound message, reported to the caller as a structured
/// bad-request. Never retried.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    pub message: String,
}

impl ValidationError {
    fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// Object-store kinds ARCHIVE accepts.
const SUPPORTED_STORE_TYPES: &[&str] = &["swift"];

/// Required node fields, checked in order. `id` is required only when
/// the caller asks for it: UPDATE nodes already exist and must be
/// identifiable, CREATE nodes have no ids yet.
const NODE_REQUIREMENTS: &[(&str, fn(&NodeEntry) -> bool)] = &[
    ("address", |n| {
        n.address.as_deref().is_some_and(|a| !a.is_empty())
    }),
    ("port", |n| n.port.is_some()),
];

fn node_id_present(n: &NodeEntry) -> bool {
    match &n.id {
        Some(serde_json::Value::String(s)) => !s.is_empty(),
        Some(serde_json::Value::Null) | None => false,
        Some(_) => true,
    }
}

/// Required monitor fields, checked in order. `path` is optional.
const MONITOR_REQUIREMENTS: &[(&str, fn(&MonitorBlock) -> bool)] = &[
    ("type", |m| {
        m.monitor_type.as_deref().is_some_and(|t| !t.is_empty())
    }),
    ("delay", |m| m.delay.is_some()),
    ("timeout", |m| m.timeout.is_some()),
    ("attempts", |m| m.attempts.is_some()),
];

/// Extract a required string field, or name it in the error.
fn require(field: &str, value: Option<&str>) -> Result<String, ValidationError> {
    match value {
        Some(v) if !v.is_empty() => Ok(v.to_string()),
        _ => Err(ValidationError::new(format!("Missing '{field}' element"))),
    }
}

/// Validate a CREATE/UPDATE message: monitor block (when present), then
/// the node list.
pub fn validate_create(msg: &JobMessage, require_node_ids: bool) -> Result<(), ValidationError> {
    if let Some(monitor) = &msg.monitor {
        for (field, present) in MONITOR_REQUIREMENTS {
            if !present(monitor) {
                return Err(ValidationError::new(format!(
                    "Missing monitor value '{field}'"
                )));
            }
        }
    }

    let nodes = match &msg.nodes {
        Some(nodes) if !nodes.is_empty() => nodes,
        _ => return Err(ValidationError::new("Missing 'nodes' element")),
    };

    for node in nodes {
        if require_node_ids && !node_id_present(node) {
            return Err(ValidationError::new("Missing node 'id'"));
        }
        for (field, present) in NODE_REQUIREMENTS {
            if !present(node) {
                return Err(ValidationError::new(format!("Missing node '{field}'")));
            }
        }
    }

    Ok(())
}

/// Validate an ARCHIVE message: store type first, then the remaining
/// object-store fields and load balancer identity. Returns the typed
/// store destination so the controller never re-checks presence.
pub fn validate_archive(msg: &JobMessage) -> Result<ArchiveStore, ValidationError> {
    let store_type = require("objectStoreType", msg.object_store_type.as_deref())?;
    if !SUPPORTED_STORE_TYPES.contains(&store_type.to_ascii_lowercase().as_str()) {
        return Err(ValidationError::new(format!(
            "Unsupported object store type '{store_type}'"
        )));
    }

    Ok(ArchiveStore {
        base_path: require("objectStoreBasePath", msg.object_store_base_path.as_deref())?,
        endpoint: require("objectStoreEndpoint", msg.object_store_endpoint.as_deref())?,
        auth_token: require("authToken", msg.auth_token.as_deref())?,
        lb_id: require("loadBalancerId", msg.load_balancer_id.as_deref())?,
        lb_name: msg.name.clone(),
        store_type,
    })
}
