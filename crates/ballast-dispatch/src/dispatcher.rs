//! The job dispatcher.
//!
//! `submit` spawns the send-and-persist sequence and returns
//! immediately — callers intentionally discard the returned handle, and
//! the submitter never awaits the result. Each spawned task opens its
//! own repository session, builds the job payload from current entity
//! state, submits it through the transport, interprets the result, and
//! persists the resulting statuses. Exactly one terminal result updates
//! the statuses a job targets.

use std::sync::Arc;

use thiserror::Error;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use ballast_core::types::{DeviceId, DeviceStatus, Job, JobResult, LbId, LbStatus};
use ballast_core::wire::{Action, JobMessage, NodeEntry, ResponseStatus};
use ballast_db::{DbError, LbRepository, LbSnapshot, SessionSource};

use crate::transport::{JobTransport, TransportError};

/// User-facing message for transport/connection failures.
const SYSTEM_ERROR: &str = "System error communicating with load balancer";

/// User-facing message for result timeouts.
const TIMEOUT_ERROR: &str = "Timeout error communicating with load balancer";

/// Object-store destination carried on ARCHIVE jobs.
#[derive(Debug, Clone)]
pub struct ArchiveParams {
    pub store_type: String,
    pub endpoint: String,
    pub base_path: String,
    pub auth_token: String,
}

/// A unit of work to dispatch: the action kind plus its payload inputs.
#[derive(Debug, Clone)]
pub enum DispatchJob {
    /// Re-apply the device's full desired-state snapshot.
    Update { device_id: DeviceId },
    /// Tear the originating load balancer off the device.
    Delete { device_id: DeviceId },
    /// Ship the device's logs to an object store. Best-effort
    /// telemetry, not a state gate.
    Archive {
        device_id: DeviceId,
        store: ArchiveParams,
    },
}

#[derive(Debug, Error)]
enum DispatchError {
    #[error(transparent)]
    Db(#[from] DbError),
}

/// Submits jobs to remote workers and persists their outcomes.
pub struct JobDispatcher {
    sessions: Arc<dyn SessionSource>,
    transport: Arc<dyn JobTransport>,
}

impl JobDispatcher {
    pub fn new(sessions: Arc<dyn SessionSource>, transport: Arc<dyn JobTransport>) -> Self {
        Self {
            sessions,
            transport,
        }
    }

    /// Submit a job against a worker. Fire-and-forget by design: this
    /// returns as soon as the task is scheduled, no result is returned
    /// synchronously, and callers discard the handle rather than await
    /// it.
    pub fn submit(&self, target_host: &str, job: DispatchJob, lb_id: LbId) -> JoinHandle<()> {
        let sessions = self.sessions.clone();
        let transport = self.transport.clone();
        let host = target_host.to_string();
        tokio::spawn(async move {
            if let Err(e) = run_job(sessions, transport, host, job, lb_id).await {
                error!(lb_id, error = %e, "job task failed");
            }
        })
    }
}

async fn run_job(
    sessions: Arc<dyn SessionSource>,
    transport: Arc<dyn JobTransport>,
    host: String,
    job: DispatchJob,
    lb_id: LbId,
) -> Result<(), DispatchError> {
    // Each job task owns its session; nothing is shared across tasks.
    let repo = sessions.open().await?;
    match job {
        DispatchJob::Update { device_id } => {
            handle_update(repo.as_ref(), transport.as_ref(), &host, device_id, lb_id).await
        }
        DispatchJob::Delete { device_id } => {
            handle_delete(repo.as_ref(), transport.as_ref(), &host, device_id, lb_id).await
        }
        DispatchJob::Archive { device_id, store } => {
            handle_archive(
                repo.as_ref(),
                transport.as_ref(),
                &host,
                device_id,
                lb_id,
                store,
            )
            .await
        }
    }
}

/// DELETE: if other live load balancers still share the device, send an
/// UPDATE carrying the survivors' desired state instead, so the
/// device's live configuration stays valid for the other tenants.
async fn handle_delete(
    repo: &dyn LbRepository,
    transport: &dyn JobTransport,
    host: &str,
    device_id: DeviceId,
    lb_id: LbId,
) -> Result<(), DispatchError> {
    let survivors = repo.count_live_lbs_on_device(device_id, lb_id).await?;
    let (action, payload) = if survivors >= 1 {
        let snapshots = repo.snapshot_live_lbs(device_id, Some(lb_id)).await?;
        (Action::Update, build_update_message(&snapshots))
    } else {
        (Action::Delete, JobMessage::for_action(Action::Delete))
    };

    let result = send(transport, action, host, payload, lb_id).await;
    if result.success {
        repo.set_lb_status(lb_id, LbStatus::Deleted).await?;
        repo.unlink_lb_from_devices(lb_id).await?;
        if survivors == 0 {
            // Nothing left on the appliance; retire it logically.
            repo.set_device_status(device_id, DeviceStatus::Offline)
                .await?;
        }
    } else {
        repo.propagate_error(device_id, result.error_message())
            .await?;
    }
    Ok(())
}

/// UPDATE: re-apply the full desired-state snapshot of every live load
/// balancer attached to the device.
async fn handle_update(
    repo: &dyn LbRepository,
    transport: &dyn JobTransport,
    host: &str,
    device_id: DeviceId,
    lb_id: LbId,
) -> Result<(), DispatchError> {
    let snapshots = repo.snapshot_live_lbs(device_id, None).await?;
    let payload = build_update_message(&snapshots);

    let result = send(transport, Action::Update, host, payload, lb_id).await;
    if result.success {
        repo.set_lb_status(lb_id, LbStatus::Active).await?;
    } else {
        repo.propagate_error(device_id, result.error_message())
            .await?;
    }
    Ok(())
}

/// ARCHIVE: record a diagnostic on the device either way and reset the
/// load balancer to active unconditionally.
async fn handle_archive(
    repo: &dyn LbRepository,
    transport: &dyn JobTransport,
    host: &str,
    device_id: DeviceId,
    lb_id: LbId,
    store: ArchiveParams,
) -> Result<(), DispatchError> {
    let lb = repo.get_load_balancer(lb_id).await?;
    let payload = JobMessage {
        action: Some(Action::Archive.as_str().to_string()),
        object_store_base_path: Some(store.base_path),
        object_store_endpoint: Some(store.endpoint),
        auth_token: Some(store.auth_token),
        object_store_type: Some(store.store_type),
        load_balancer_id: Some(lb.id.to_string()),
        name: Some(lb.name.clone()),
        protocol: Some(lb.protocol.clone()),
        ..JobMessage::default()
    };

    let result = send(transport, Action::Archive, host, payload, lb_id).await;
    let diagnostic = if result.success {
        "Log archive successful".to_string()
    } else {
        format!("Log archive failed: {}", result.error_message())
    };
    repo.set_device_diagnostic(device_id, &diagnostic).await?;
    repo.set_lb_status(lb_id, LbStatus::Active).await?;
    Ok(())
}

/// Flatten live snapshots into one UPDATE payload: the union of the
/// enabled nodes, with frontend settings from the first snapshot.
fn build_update_message(snapshots: &[LbSnapshot]) -> JobMessage {
    let mut message = JobMessage::for_action(Action::Update);
    if let Some(first) = snapshots.first() {
        message.protocol = Some(first.protocol.clone());
        message.algorithm = Some(first.algorithm.clone());
        message.port = Some(first.port);
    }
    message.nodes = Some(
        snapshots
            .iter()
            .flat_map(|snapshot| {
                snapshot.nodes.iter().map(|node| NodeEntry {
                    id: Some(serde_json::Value::from(node.id)),
                    address: Some(node.address.clone()),
                    port: Some(node.port),
                    weight: Some(node.weight),
                    enabled: Some(true),
                    condition: None,
                })
            })
            .collect(),
    );
    message
}

/// Send the job and interpret the result.
///
/// Transport detail is logged but never surfaced; validation and worker
/// error messages pass through to the persisted status.
async fn send(
    transport: &dyn JobTransport,
    action: Action,
    host: &str,
    payload: JobMessage,
    lb_id: LbId,
) -> JobResult {
    let job = Job {
        action,
        target_host: host.to_string(),
        payload,
        lb_id,
    };
    info!(
        action = job.action.as_str(),
        host = %job.target_host,
        lb_id = job.lb_id,
        "sending job to worker"
    );

    match transport.submit_job(&job.target_host, &job.payload).await {
        Err(TransportError::Unreachable(detail)) => {
            error!(host = %job.target_host, %detail, "could not reach worker");
            JobResult::fail(SYSTEM_ERROR)
        }
        Err(TransportError::Timeout) => {
            warn!(host = %job.target_host, "timeout waiting for job result");
            JobResult::fail(TIMEOUT_ERROR)
        }
        Ok(response) => {
            if let Some(message) = response.validation_message() {
                JobResult::fail(message.to_string())
            } else if response.status == Some(ResponseStatus::Fail) {
                let error = response
                    .error
                    .clone()
                    .unwrap_or_else(|| "Load Balancer error".to_string());
                error!(host = %job.target_host, %error, "worker reported failure");
                JobResult::fail(error)
            } else {
                info!(host = %job.target_host, "worker reported success");
                JobResult::pass(response)
            }
        }
    }
}
