//! VIP lifecycle operations.
//!
//! Create, assign, remove, and delete share one PASS/FAIL envelope.
//! Every operation instantiates a provider client first; instantiation
//! failure alone yields FAIL with no further action. Only the
//! post-assign TCP probe retries — provider calls never do.

use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, error, info};

use ballast_core::wire::ResponseStatus;

use crate::probe::{ProbeSettings, verify_tcp};
use crate::provider::{ComputeProvider, ProviderError};

/// Builds a provider client per operation.
pub type ProviderFactory =
    Arc<dyn Fn() -> Result<Arc<dyn ComputeProvider>, ProviderError> + Send + Sync>;

/// Outcome envelope shared by all four operations.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VipOutcome {
    pub status: ResponseStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ip: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl VipOutcome {
    fn pass() -> Self {
        Self {
            status: ResponseStatus::Pass,
            id: None,
            ip: None,
            error: None,
        }
    }

    fn fail(error: impl Into<String>) -> Self {
        Self {
            status: ResponseStatus::Fail,
            id: None,
            ip: None,
            error: Some(error.into()),
        }
    }

    pub fn is_pass(&self) -> bool {
        self.status == ResponseStatus::Pass
    }
}

/// Floating address lifecycle controller.
pub struct VipController {
    factory: ProviderFactory,
    /// Port probed after assignment; no probe runs when unset.
    check_port: Option<u16>,
    probe: ProbeSettings,
}

impl VipController {
    pub fn new(factory: ProviderFactory, check_port: Option<u16>) -> Self {
        Self {
            factory,
            check_port,
            probe: ProbeSettings::default(),
        }
    }

    /// Production wiring: an HTTP provider client built per operation
    /// from the daemon configuration.
    pub fn from_config(config: &ballast_core::config::ProviderConfig) -> Self {
        let check_port = config.tcp_check_port;
        let config = config.clone();
        Self::new(
            Arc::new(move || -> Result<Arc<dyn ComputeProvider>, ProviderError> {
                let provider = crate::provider::HttpComputeProvider::new(&config)?;
                Ok(Arc::new(provider))
            }),
            check_port,
        )
    }

    /// Override probe tuning (for testing).
    pub fn with_probe_settings(mut self, probe: ProbeSettings) -> Self {
        self.probe = probe;
        self
    }

    fn provider(&self) -> Result<Arc<dyn ComputeProvider>, VipOutcome> {
        (self.factory)().map_err(|e| {
            error!(error = %e, "error initializing compute provider client");
            VipOutcome::fail(format!("error initializing compute provider client: {e}"))
        })
    }

    /// Allocate a new floating address.
    pub async fn create(&self) -> VipOutcome {
        let provider = match self.provider() {
            Ok(provider) => provider,
            Err(outcome) => return outcome,
        };

        info!("creating a requested floating IP");
        match provider.create_floating_ip().await {
            Ok(fip) => {
                info!(id = %fip.id, ip = %fip.ip, "floating IP created");
                VipOutcome {
                    id: Some(fip.id),
                    ip: Some(fip.ip),
                    ..VipOutcome::pass()
                }
            }
            Err(e) => {
                error!(error = %e, "error getting a floating IP");
                VipOutcome::fail(e.to_string())
            }
        }
    }

    /// Attach a floating address to the named device, then verify
    /// reachability when a check port is configured. Resolution or
    /// attachment errors fail immediately without probing.
    pub async fn assign(&self, device_name: &str, ip: &str) -> VipOutcome {
        let provider = match self.provider() {
            Ok(provider) => provider,
            Err(outcome) => return outcome,
        };

        info!(%ip, device = device_name, "assigning floating IP");
        let instance_id = match provider.find_instance(device_name).await {
            Ok(id) => id,
            Err(e) => {
                error!(device = device_name, error = %e, "error resolving device instance");
                return VipOutcome::fail(e.to_string());
            }
        };
        debug!(device = device_name, instance = %instance_id, "device resolved");

        if let Err(e) = provider.assign_floating_ip(&instance_id, ip).await {
            error!(%ip, device = device_name, error = %e, "error assigning floating IP");
            return VipOutcome::fail(e.to_string());
        }

        if let Some(port) = self.check_port {
            match verify_tcp(ip, port, &self.probe).await {
                Ok(attempt) => debug!(%ip, port, attempt, "assignment verified"),
                Err(e) => {
                    error!(%ip, port, error = %e, "TCP connect error after floating IP assign");
                    return VipOutcome::fail(e.to_string());
                }
            }
        }

        VipOutcome::pass()
    }

    /// Detach a floating address from the named device.
    pub async fn remove(&self, device_name: &str, ip: &str) -> VipOutcome {
        let provider = match self.provider() {
            Ok(provider) => provider,
            Err(outcome) => return outcome,
        };

        info!(%ip, device = device_name, "removing floating IP");
        let instance_id = match provider.find_instance(device_name).await {
            Ok(id) => id,
            Err(e) => {
                error!(device = device_name, error = %e, "error resolving device instance");
                return VipOutcome::fail(e.to_string());
            }
        };
        if let Err(e) = provider.remove_floating_ip(&instance_id, ip).await {
            error!(%ip, device = device_name, error = %e, "error removing floating IP");
            return VipOutcome::fail(e.to_string());
        }
        VipOutcome::pass()
    }

    /// Release a floating address back to the provider.
    pub async fn delete(&self, ip: &str) -> VipOutcome {
        let provider = match self.provider() {
            Ok(provider) => provider,
            Err(outcome) => return outcome,
        };

        info!(%ip, "deleting floating IP");
        if let Err(e) = provider.delete_floating_ip(ip).await {
            error!(%ip, error = %e, "error deleting floating IP");
            return VipOutcome::fail(e.to_string());
        }
        VipOutcome::pass()
    }
}
