//! Job wire format — the messages exchanged between the dispatcher and
//! worker agents.
//!
//! A job request is a flat JSON object whose top-level field names are
//! matched case-insensitively by the worker. The response echoes the
//! request with a `status` verdict attached, or replaces it with a
//! `badRequest` envelope when validation rejected the message before any
//! driver work happened.

use serde::{Deserialize, Serialize};

/// Canonical top-level field names of a job message. Inbound messages
/// are normalized against this vocabulary before deserialization.
pub const CANONICAL_FIELDS: &[&str] = &[
    "action",
    "protocol",
    "algorithm",
    "port",
    "nodes",
    "monitor",
    "objectStoreBasePath",
    "objectStoreEndpoint",
    "authToken",
    "objectStoreType",
    "loadBalancerId",
    "name",
];

// ── Action ─────────────────────────────────────────────────────────

/// The action kinds a worker accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Action {
    Create,
    Update,
    Suspend,
    Enable,
    Delete,
    Discover,
    Archive,
    Stats,
}

impl Action {
    /// Parse an action value case-insensitively.
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_uppercase().as_str() {
            "CREATE" => Some(Action::Create),
            "UPDATE" => Some(Action::Update),
            "SUSPEND" => Some(Action::Suspend),
            "ENABLE" => Some(Action::Enable),
            "DELETE" => Some(Action::Delete),
            "DISCOVER" => Some(Action::Discover),
            "ARCHIVE" => Some(Action::Archive),
            "STATS" => Some(Action::Stats),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Action::Create => "CREATE",
            Action::Update => "UPDATE",
            Action::Suspend => "SUSPEND",
            Action::Enable => "ENABLE",
            Action::Delete => "DELETE",
            Action::Discover => "DISCOVER",
            Action::Archive => "ARCHIVE",
            Action::Stats => "STATS",
        }
    }
}

// ── Algorithm ──────────────────────────────────────────────────────

/// Balancing algorithms a load balancer may request. Requests that omit
/// the algorithm get round-robin.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Algorithm {
    #[default]
    RoundRobin,
    LeastConnections,
}

impl Algorithm {
    /// Parse an algorithm value case-insensitively. Returns `None` for
    /// values outside the fixed enumeration.
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_uppercase().as_str() {
            "ROUND_ROBIN" => Some(Algorithm::RoundRobin),
            "LEAST_CONNECTIONS" => Some(Algorithm::LeastConnections),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Algorithm::RoundRobin => "ROUND_ROBIN",
            Algorithm::LeastConnections => "LEAST_CONNECTIONS",
        }
    }
}

// ── Message ────────────────────────────────────────────────────────

/// Condition of a backend node as reported in job responses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum NodeCondition {
    Enabled,
    Disabled,
}

/// One backend entry in a job message's node list.
///
/// Fields are optional at the wire level; the worker's validation step
/// enforces which are required before any driver work happens. `id` is
/// untyped because senders may use numeric or string identifiers.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct NodeEntry {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub weight: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub enabled: Option<bool>,
    /// Set by the worker in responses.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub condition: Option<NodeCondition>,
}

/// Health monitor block carried on CREATE/UPDATE messages.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct MonitorBlock {
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub monitor_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub delay: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timeout: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub attempts: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
}

/// A job request as sent to a worker.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct JobMessage {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub action: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub protocol: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub algorithm: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub nodes: Option<Vec<NodeEntry>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub monitor: Option<MonitorBlock>,
    // Archive-only fields.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub object_store_base_path: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub object_store_endpoint: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub auth_token: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub object_store_type: Option<String>,
    /// Load balancer identity, carried on ARCHIVE messages.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub load_balancer_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

impl JobMessage {
    /// A message carrying only an action value.
    pub fn for_action(action: Action) -> Self {
        Self {
            action: Some(action.as_str().to_string()),
            ..Self::default()
        }
    }
}

// ── Response ───────────────────────────────────────────────────────

/// Job verdict: PASS or FAIL.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ResponseStatus {
    Pass,
    Fail,
}

/// Structured validation failure: a single human-readable message naming
/// the offending field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BadRequest {
    pub validation_errors: ValidationErrors,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationErrors {
    pub message: String,
}

impl BadRequest {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            validation_errors: ValidationErrors {
                message: message.into(),
            },
        }
    }
}

/// A worker's response to a job message.
///
/// Successful and failed responses echo the request fields (with node
/// conditions filled in) plus a `status` verdict; validation rejections
/// carry only the `badRequest` envelope.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct JobResponse {
    #[serde(flatten)]
    pub message: JobMessage,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<ResponseStatus>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bad_request: Option<BadRequest>,
    // DISCOVER identity.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub release: Option<String>,
    /// STATS payload, returned unchanged from the driver.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stats: Option<serde_json::Value>,
}

impl JobResponse {
    /// A PASS response echoing the given message.
    pub fn pass(message: JobMessage) -> Self {
        Self {
            message,
            status: Some(ResponseStatus::Pass),
            ..Self::default()
        }
    }

    /// A FAIL response echoing the given message with an error.
    pub fn fail(message: JobMessage, error: impl Into<String>) -> Self {
        Self {
            message,
            status: Some(ResponseStatus::Fail),
            error: Some(error.into()),
            ..Self::default()
        }
    }

    /// A validation rejection; the request echo is dropped.
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self {
            bad_request: Some(BadRequest::new(message)),
            ..Self::default()
        }
    }

    pub fn is_pass(&self) -> bool {
        self.status == Some(ResponseStatus::Pass)
    }

    /// The validation message, when this is a `badRequest` response.
    pub fn validation_message(&self) -> Option<&str> {
        self.bad_request
            .as_ref()
            .map(|b| b.validation_errors.message.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn action_parse_is_case_insensitive() {
        assert_eq!(Action::parse("create"), Some(Action::Create));
        assert_eq!(Action::parse("UpDaTe"), Some(Action::Update));
        assert_eq!(Action::parse("STATS"), Some(Action::Stats));
        assert_eq!(Action::parse("BOGUS"), None);
    }

    #[test]
    fn algorithm_enumeration_is_fixed() {
        assert_eq!(Algorithm::parse("round_robin"), Some(Algorithm::RoundRobin));
        assert_eq!(
            Algorithm::parse("LEAST_CONNECTIONS"),
            Some(Algorithm::LeastConnections)
        );
        assert_eq!(Algorithm::parse("FASTEST"), None);
        assert_eq!(Algorithm::default(), Algorithm::RoundRobin);
    }

    #[test]
    fn bad_request_serializes_to_nested_envelope() {
        let resp = JobResponse::bad_request("Missing 'nodes' element");
        let json = serde_json::to_value(&resp).unwrap();
        assert_eq!(
            json["badRequest"]["validationErrors"]["message"],
            "Missing 'nodes' element"
        );
        assert!(json.get("status").is_none());
    }

    #[test]
    fn response_echoes_message_fields_flat() {
        let mut msg = JobMessage::for_action(Action::Create);
        msg.nodes = Some(vec![NodeEntry {
            id: Some(serde_json::json!(1234)),
            address: Some("10.0.0.1".to_string()),
            port: Some(80),
            condition: Some(NodeCondition::Enabled),
            ..NodeEntry::default()
        }]);
        let json = serde_json::to_value(JobResponse::pass(msg)).unwrap();
        assert_eq!(json["status"], "PASS");
        assert_eq!(json["action"], "CREATE");
        assert_eq!(json["nodes"][0]["condition"], "ENABLED");
    }

    #[test]
    fn message_round_trips_camel_case_archive_fields() {
        let json = serde_json::json!({
            "action": "ARCHIVE",
            "objectStoreType": "Swift",
            "objectStoreBasePath": "/lbaaslogs",
            "objectStoreEndpoint": "https://object.example.com",
            "authToken": "XXXX",
            "loadBalancerId": "123"
        });
        let msg: JobMessage = serde_json::from_value(json.clone()).unwrap();
        assert_eq!(msg.object_store_type.as_deref(), Some("Swift"));
        assert_eq!(msg.load_balancer_id.as_deref(), Some("123"));
        assert_eq!(serde_json::to_value(&msg).unwrap(), json);
    }

    #[test]
    fn fail_response_carries_error() {
        let resp = JobResponse::fail(JobMessage::default(), "CREATE failed");
        assert!(!resp.is_pass());
        assert_eq!(resp.error.as_deref(), Some("CREATE failed"));
    }
}
