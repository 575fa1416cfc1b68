//! Per-message action controller.
//!
//! One controller instance processes exactly one inbound job message:
//! normalize field names, validate, drive the device driver, and return
//! the response envelope. Capability outcomes decide how failures are
//! treated — a driver opting out of an action is expected (logged,
//! FAIL), a driver that attempted and failed is logged with detail. No
//! driver error crosses the boundary as anything but a PASS/FAIL
//! envelope.

use serde_json::Value;
use tracing::{debug, error, warn};

use ballast_core::wire::{
    Action, Algorithm, CANONICAL_FIELDS, JobMessage, JobResponse, NodeCondition,
};
use ballast_driver::{Capability, DeviceDriver};

use crate::validate;

/// Version identity reported by DISCOVER.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Release identity reported by DISCOVER.
pub const RELEASE: &str = "ballast";

/// Drives one job message against a device driver.
pub struct ActionController<'a> {
    driver: &'a mut dyn DeviceDriver,
}

impl<'a> ActionController<'a> {
    pub fn new(driver: &'a mut dyn DeviceDriver) -> Self {
        Self { driver }
    }

    /// Process the message and return the response envelope.
    pub async fn run(&mut self, raw: Value) -> JobResponse {
        let normalized = normalize_fields(raw);
        let msg: JobMessage = match serde_json::from_value(normalized) {
            Ok(msg) => msg,
            Err(e) => {
                warn!(error = %e, "job message failed to deserialize");
                return JobResponse::bad_request(format!("Malformed job message: {e}"));
            }
        };

        let Some(action_value) = msg.action.clone() else {
            error!("missing 'action' value");
            return JobResponse::fail(msg, "Missing 'action' value");
        };
        let Some(action) = Action::parse(&action_value) else {
            error!(value = %action_value, "invalid 'action' value");
            return JobResponse::fail(msg, format!("Invalid 'action' value: {action_value}"));
        };
        debug!(action = action.as_str(), "requested action");

        match action {
            // UPDATE is routed identically to CREATE: the device gets a
            // full desired-state snapshot either way. The one
            // difference is validation — UPDATE nodes already exist and
            // must carry ids.
            Action::Create => self.run_create(msg, false).await,
            Action::Update => self.run_create(msg, true).await,
            Action::Suspend | Action::Enable | Action::Delete => {
                self.run_lifecycle(msg, action).await
            }
            Action::Discover => run_discover(msg),
            Action::Archive => self.run_archive(msg).await,
            Action::Stats => self.run_stats(msg).await,
        }
    }

    /// CREATE/UPDATE: validate the batch, stage every valid node, then
    /// commit the full snapshot.
    async fn run_create(&mut self, mut msg: JobMessage, require_node_ids: bool) -> JobResponse {
        match self.driver.init().await {
            // Absence of an init capability is a silent no-op.
            Capability::Unsupported | Capability::Ok(()) => {}
            Capability::Failed(e) => {
                error!(error = %e, "selected driver failed initialization");
                return JobResponse::fail(msg, "Selected driver failed initialization.");
            }
        }

        if let Err(err) = validate::validate_create(&msg, require_node_ids) {
            return JobResponse::bad_request(err.message);
        }

        // An unrecognized algorithm is an overall failure, not a
        // bad-request.
        let algorithm = match msg.algorithm.clone().as_deref() {
            None => Algorithm::default(),
            Some(value) => match Algorithm::parse(value) {
                Some(algorithm) => algorithm,
                None => {
                    error!(value, "invalid 'algorithm' value");
                    return JobResponse::fail(msg, format!("Invalid 'algorithm' value: {value}"));
                }
            },
        };
        match self.driver.set_algorithm(algorithm) {
            Capability::Unsupported | Capability::Ok(()) => {}
            Capability::Failed(e) => {
                error!(error = %e, "failure trying to set algorithm");
                return JobResponse::fail(msg, format!("Failure trying to set algorithm: {e}"));
            }
        }

        if let Some(protocol) = msg.protocol.clone() {
            match self.driver.set_protocol(&protocol) {
                Capability::Ok(()) => {}
                Capability::Unsupported => {
                    error!("selected driver does not support setting protocol");
                    return JobResponse::fail(
                        msg,
                        "Selected driver does not support setting protocol.",
                    );
                }
                Capability::Failed(e) => {
                    error!(error = %e, "failure trying to set protocol");
                    return JobResponse::fail(msg, format!("Failure trying to set protocol: {e}"));
                }
            }
        }

        if let Some(port) = msg.port {
            match self.driver.bind("0.0.0.0", port) {
                Capability::Unsupported | Capability::Ok(()) => {}
                Capability::Failed(e) => {
                    error!(error = %e, port, "failure trying to set bind port");
                    return JobResponse::fail(msg, format!("Failure trying to set bind port: {e}"));
                }
            }
        }

        // Stage every node. A per-node failure disables that node but
        // does not abort its siblings.
        for node in msg.nodes.as_mut().into_iter().flatten() {
            let (Some(address), Some(port)) = (node.address.clone(), node.port) else {
                continue;
            };
            let weight = node.weight.unwrap_or(1);

            node.condition = match self.driver.add_server(&address, port, weight) {
                Capability::Ok(()) => {
                    debug!(%address, port, "added server");
                    Some(NodeCondition::Enabled)
                }
                Capability::Unsupported => {
                    error!("selected driver does not support adding a server");
                    Some(NodeCondition::Disabled)
                }
                Capability::Failed(e) => {
                    error!(error = %e, %address, port, "failure trying to add server");
                    Some(NodeCondition::Disabled)
                }
            };
        }

        match self.driver.create().await {
            Capability::Ok(()) => JobResponse::pass(msg),
            Capability::Unsupported => {
                error!("selected driver does not support CREATE action");
                disable_all(&mut msg);
                JobResponse::fail(msg, "Selected driver does not support CREATE action.")
            }
            Capability::Failed(e) => {
                error!(error = %e, "CREATE failed");
                disable_all(&mut msg);
                JobResponse::fail(msg, format!("CREATE failed: {e}"))
            }
        }
    }

    /// SUSPEND/ENABLE/DELETE: a single capability call.
    async fn run_lifecycle(&mut self, msg: JobMessage, action: Action) -> JobResponse {
        let outcome = match action {
            Action::Suspend => self.driver.suspend().await,
            Action::Enable => self.driver.enable().await,
            Action::Delete => self.driver.delete().await,
            _ => unreachable!(),
        };
        self.finish_single(msg, action, outcome)
    }

    async fn run_archive(&mut self, msg: JobMessage) -> JobResponse {
        let store = match validate::validate_archive(&msg) {
            Ok(store) => store,
            Err(err) => return JobResponse::bad_request(err.message),
        };
        let outcome = self.driver.archive(&store).await;
        self.finish_single(msg, Action::Archive, outcome)
    }

    async fn run_stats(&mut self, msg: JobMessage) -> JobResponse {
        match self.driver.get_stats().await {
            Capability::Ok(stats) => {
                let mut response = JobResponse::pass(msg);
                response.stats =
                    Some(serde_json::to_value(stats).unwrap_or(Value::Null));
                response
            }
            Capability::Unsupported => {
                warn!("selected driver does not support STATS action");
                JobResponse::fail(msg, "Selected driver does not support STATS action.")
            }
            Capability::Failed(e) => {
                error!(error = %e, "STATS failed");
                JobResponse::fail(msg, format!("STATS failed: {e}"))
            }
        }
    }

    fn finish_single(
        &self,
        msg: JobMessage,
        action: Action,
        outcome: Capability<()>,
    ) -> JobResponse {
        let action = action.as_str();
        match outcome {
            Capability::Ok(()) => JobResponse::pass(msg),
            Capability::Unsupported => {
                warn!(action, "selected driver does not support action");
                JobResponse::fail(
                    msg,
                    format!("Selected driver does not support {action} action."),
                )
            }
            Capability::Failed(e) => {
                error!(action, error = %e, "action failed");
                JobResponse::fail(msg, format!("{action} failed: {e}"))
            }
        }
    }
}

/// DISCOVER reports the worker's own identity; the driver is never
/// consulted.
fn run_discover(msg: JobMessage) -> JobResponse {
    let mut response = JobResponse::pass(msg);
    response.version = Some(VERSION.to_string());
    response.release = Some(RELEASE.to_string());
    response
}

fn disable_all(msg: &mut JobMessage) {
    if let Some(nodes) = msg.nodes.as_mut() {
        for node in nodes {
            node.condition = Some(NodeCondition::Disabled);
        }
    }
}

/// Rewrite top-level keys to the canonical field vocabulary,
/// case-insensitively. Unknown keys pass through untouched.
fn normalize_fields(raw: Value) -> Value {
    let Value::Object(map) = raw else {
        return raw;
    };
    let mut normalized = serde_json::Map::with_capacity(map.len());
    for (key, value) in map {
        let canonical = CANONICAL_FIELDS
            .iter()
            .find(|field| field.eq_ignore_ascii_case(&key))
            .map(|field| field.to_string())
            .unwrap_or(key);
        normalized.insert(canonical, value);
    }
    Value::Object(normalized)
}
