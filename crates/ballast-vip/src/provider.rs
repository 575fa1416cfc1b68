//! Compute provider contract and HTTP client.
//!
//! The provider interface is an external, stable contract: floating
//! address management, instance lookup, and device instance
//! provisioning. The HTTP client consumes a Nova-style REST surface;
//! none of the calls retry at this level, and "not found" surfaces as
//! an error for the caller to handle.

use std::time::Duration;

use async_trait::async_trait;
use serde_json::{Value, json};
use thiserror::Error;
use tracing::{debug, info, warn};

use ballast_core::config::ProviderConfig;

/// How many status polls a device instance build gets before the
/// attempt is declared dead (40 × 3 s).
const BUILD_WAIT_ATTEMPTS: u32 = 40;
const BUILD_WAIT_INTERVAL: Duration = Duration::from_secs(3);

#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("provider request failed: {0}")]
    Request(String),

    #[error("{kind} '{name}' not found")]
    NotFound { kind: &'static str, name: String },

    #[error("unexpected provider response: {0}")]
    Protocol(String),

    #[error("error creating instance: {0}")]
    Build(String),

    #[error("instance build timed out")]
    BuildTimeout,
}

/// A floating address allocated by the provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FloatingIp {
    pub id: String,
    pub ip: String,
}

/// A compute instance as reported by the provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstanceInfo {
    pub id: String,
    pub status: String,
}

/// The compute provider operations this control plane consumes.
#[async_trait]
pub trait ComputeProvider: Send + Sync {
    async fn create_floating_ip(&self) -> Result<FloatingIp, ProviderError>;
    async fn assign_floating_ip(&self, instance_id: &str, ip: &str) -> Result<(), ProviderError>;
    async fn remove_floating_ip(&self, instance_id: &str, ip: &str) -> Result<(), ProviderError>;
    async fn delete_floating_ip(&self, ip: &str) -> Result<(), ProviderError>;

    /// Resolve a symbolic instance name to its provider-side id.
    async fn find_instance(&self, name: &str) -> Result<String, ProviderError>;
    async fn instance_status(&self, id: &str) -> Result<String, ProviderError>;

    /// Request a new device instance. Returns immediately with the
    /// provider's build-state record; see [`build_device_instance`] for
    /// the bounded wait.
    async fn create_instance(&self, name: &str) -> Result<InstanceInfo, ProviderError>;
    async fn delete_instance(&self, id: &str) -> Result<(), ProviderError>;

    async fn find_image(&self, name: &str) -> Result<String, ProviderError>;
    async fn find_flavor(&self, name: &str) -> Result<String, ProviderError>;
}

/// Boot a device instance and wait for it to become active.
///
/// Polls instance status on a fixed interval; a status outside the
/// build states fails the attempt, and exhausting the wait budget is a
/// provisioning timeout — fatal to this build attempt.
pub async fn build_device_instance(
    provider: &dyn ComputeProvider,
    name: &str,
) -> Result<InstanceInfo, ProviderError> {
    let created = provider.create_instance(name).await?;
    info!(instance = %created.id, name, "device instance requested");

    for _ in 0..BUILD_WAIT_ATTEMPTS {
        tokio::time::sleep(BUILD_WAIT_INTERVAL).await;
        let status = provider.instance_status(&created.id).await?;
        if status == "ACTIVE" {
            return Ok(InstanceInfo {
                id: created.id,
                status,
            });
        }
        if !status.starts_with("BUILD") {
            warn!(instance = %created.id, %status, "instance left build state unexpectedly");
            return Err(ProviderError::Build(format!(
                "instance entered status {status}"
            )));
        }
    }
    warn!(instance = %created.id, "instance never became active");
    Err(ProviderError::BuildTimeout)
}

/// HTTP client for a Nova-style compute API.
pub struct HttpComputeProvider {
    client: reqwest::Client,
    endpoint: String,
    username: String,
    password: String,
    image: String,
    flavor: String,
    key_name: Option<String>,
    security_group: Option<String>,
}

impl HttpComputeProvider {
    pub fn new(config: &ProviderConfig) -> Result<Self, ProviderError> {
        let client = reqwest::Client::builder()
            .build()
            .map_err(|e| ProviderError::Request(e.to_string()))?;
        Ok(Self {
            client,
            endpoint: config.endpoint.trim_end_matches('/').to_string(),
            username: config.username.clone(),
            password: config.password.clone(),
            image: config.image.clone(),
            flavor: config.flavor.clone(),
            key_name: config.key_name.clone(),
            security_group: config.security_group.clone(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.endpoint)
    }

    async fn request(
        &self,
        method: reqwest::Method,
        path: &str,
        body: Option<Value>,
    ) -> Result<Value, ProviderError> {
        let mut request = self
            .client
            .request(method, self.url(path))
            .basic_auth(&self.username, Some(&self.password));
        if let Some(body) = body {
            request = request.json(&body);
        }
        let response = request
            .send()
            .await
            .map_err(|e| ProviderError::Request(e.to_string()))?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ProviderError::Request(format!("{status}: {body}")));
        }
        // Action and delete calls come back with empty bodies.
        let text = response
            .text()
            .await
            .map_err(|e| ProviderError::Protocol(e.to_string()))?;
        if text.trim().is_empty() {
            return Ok(Value::Null);
        }
        serde_json::from_str(&text).map_err(|e| ProviderError::Protocol(e.to_string()))
    }

    /// Find a named object's id in a listing like `{"servers": [...]}`.
    fn find_named(
        body: &Value,
        collection: &str,
        kind: &'static str,
        name: &str,
    ) -> Result<String, ProviderError> {
        body[collection]
            .as_array()
            .and_then(|items| {
                items
                    .iter()
                    .find(|item| item["name"].as_str() == Some(name))
            })
            .and_then(|item| item_id(item))
            .ok_or_else(|| ProviderError::NotFound {
                kind,
                name: name.to_string(),
            })
    }
}

/// Provider ids come back as strings or numbers depending on the API
/// version.
fn item_id(item: &Value) -> Option<String> {
    match &item["id"] {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

#[async_trait]
impl ComputeProvider for HttpComputeProvider {
    async fn create_floating_ip(&self) -> Result<FloatingIp, ProviderError> {
        let body = self
            .request(reqwest::Method::POST, "/os-floating-ips", Some(json!({})))
            .await?;
        let id = item_id(&body["floating_ip"])
            .ok_or_else(|| ProviderError::Protocol("missing floating ip id".to_string()))?;
        let ip = body["floating_ip"]["ip"]
            .as_str()
            .ok_or_else(|| ProviderError::Protocol("missing floating ip address".to_string()))?
            .to_string();
        Ok(FloatingIp { id, ip })
    }

    async fn assign_floating_ip(&self, instance_id: &str, ip: &str) -> Result<(), ProviderError> {
        self.request(
            reqwest::Method::POST,
            &format!("/servers/{instance_id}/action"),
            Some(json!({"addFloatingIp": {"address": ip}})),
        )
        .await?;
        Ok(())
    }

    async fn remove_floating_ip(&self, instance_id: &str, ip: &str) -> Result<(), ProviderError> {
        self.request(
            reqwest::Method::POST,
            &format!("/servers/{instance_id}/action"),
            Some(json!({"removeFloatingIp": {"address": ip}})),
        )
        .await?;
        Ok(())
    }

    async fn delete_floating_ip(&self, ip: &str) -> Result<(), ProviderError> {
        self.request(reqwest::Method::DELETE, &format!("/os-floating-ips/{ip}"), None)
            .await?;
        Ok(())
    }

    async fn find_instance(&self, name: &str) -> Result<String, ProviderError> {
        let body = self
            .request(reqwest::Method::GET, &format!("/servers?name={name}"), None)
            .await?;
        Self::find_named(&body, "servers", "instance", name)
    }

    async fn instance_status(&self, id: &str) -> Result<String, ProviderError> {
        let body = self
            .request(reqwest::Method::GET, &format!("/servers/{id}"), None)
            .await?;
        body["server"]["status"]
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| ProviderError::Protocol("missing server status".to_string()))
    }

    async fn create_instance(&self, name: &str) -> Result<InstanceInfo, ProviderError> {
        // Names and ids are both accepted in config; resolve names once
        // per boot.
        let image = if self.image.chars().all(|c| c.is_ascii_digit()) {
            self.image.clone()
        } else {
            self.find_image(&self.image).await?
        };
        let flavor = if self.flavor.chars().all(|c| c.is_ascii_digit()) {
            self.flavor.clone()
        } else {
            self.find_flavor(&self.flavor).await?
        };

        let mut server = json!({
            "name": name,
            "imageRef": image,
            "flavorRef": flavor,
            "min_count": 1,
            "max_count": 1,
        });
        if let Some(key_name) = &self.key_name {
            server["key_name"] = json!(key_name);
        }
        if let Some(security_group) = &self.security_group {
            server["security_groups"] = json!([{"name": security_group}]);
        }

        let body = self
            .request(reqwest::Method::POST, "/servers", Some(json!({"server": server})))
            .await
            .map_err(|e| ProviderError::Build(e.to_string()))?;
        let id = item_id(&body["server"])
            .ok_or_else(|| ProviderError::Protocol("missing server id".to_string()))?;
        debug!(instance = %id, name, "create accepted");
        Ok(InstanceInfo {
            id,
            status: "BUILD".to_string(),
        })
    }

    async fn delete_instance(&self, id: &str) -> Result<(), ProviderError> {
        self.request(reqwest::Method::DELETE, &format!("/servers/{id}"), None)
            .await?;
        Ok(())
    }

    async fn find_image(&self, name: &str) -> Result<String, ProviderError> {
        let body = self
            .request(reqwest::Method::GET, &format!("/images?name={name}"), None)
            .await?;
        Self::find_named(&body, "images", "image", name)
    }

    async fn find_flavor(&self, name: &str) -> Result<String, ProviderError> {
        let body = self
            .request(reqwest::Method::GET, &format!("/flavors?name={name}"), None)
            .await?;
        Self::find_named(&body, "flavors", "flavor", name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    /// Scripted status sequence for build polling.
    struct FakeProvider {
        statuses: Mutex<VecDeque<&'static str>>,
        polls: Mutex<u32>,
    }

    impl FakeProvider {
        fn with_statuses(statuses: Vec<&'static str>) -> Self {
            Self {
                statuses: Mutex::new(statuses.into()),
                polls: Mutex::new(0),
            }
        }

        fn polls(&self) -> u32 {
            *self.polls.lock().unwrap()
        }
    }

    #[async_trait]
    impl ComputeProvider for FakeProvider {
        async fn create_floating_ip(&self) -> Result<FloatingIp, ProviderError> {
            unimplemented!("not used in build tests")
        }
        async fn assign_floating_ip(&self, _: &str, _: &str) -> Result<(), ProviderError> {
            unimplemented!("not used in build tests")
        }
        async fn remove_floating_ip(&self, _: &str, _: &str) -> Result<(), ProviderError> {
            unimplemented!("not used in build tests")
        }
        async fn delete_floating_ip(&self, _: &str) -> Result<(), ProviderError> {
            unimplemented!("not used in build tests")
        }
        async fn find_instance(&self, _: &str) -> Result<String, ProviderError> {
            unimplemented!("not used in build tests")
        }

        async fn instance_status(&self, _: &str) -> Result<String, ProviderError> {
            *self.polls.lock().unwrap() += 1;
            let status = self
                .statuses
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or("BUILD");
            Ok(status.to_string())
        }

        async fn create_instance(&self, _: &str) -> Result<InstanceInfo, ProviderError> {
            Ok(InstanceInfo {
                id: "inst-1".to_string(),
                status: "BUILD".to_string(),
            })
        }
        async fn delete_instance(&self, _: &str) -> Result<(), ProviderError> {
            Ok(())
        }
        async fn find_image(&self, _: &str) -> Result<String, ProviderError> {
            unimplemented!("not used in build tests")
        }
        async fn find_flavor(&self, _: &str) -> Result<String, ProviderError> {
            unimplemented!("not used in build tests")
        }
    }

    #[tokio::test(start_paused = true)]
    async fn build_waits_through_build_states_to_active() {
        let provider = FakeProvider::with_statuses(vec!["BUILD", "BUILD(spawning)", "ACTIVE"]);
        let info = build_device_instance(&provider, "device-1").await.unwrap();
        assert_eq!(info.id, "inst-1");
        assert_eq!(info.status, "ACTIVE");
        assert_eq!(provider.polls(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn unexpected_status_fails_the_build() {
        let provider = FakeProvider::with_statuses(vec!["BUILD", "ERROR"]);
        let result = build_device_instance(&provider, "device-1").await;
        assert!(matches!(result, Err(ProviderError::Build(_))));
    }

    #[tokio::test(start_paused = true)]
    async fn exhausted_wait_budget_is_a_provisioning_timeout() {
        let provider = FakeProvider::with_statuses(vec![]);
        let result = build_device_instance(&provider, "device-1").await;
        assert!(matches!(result, Err(ProviderError::BuildTimeout)));
        assert_eq!(provider.polls(), 40);
    }

    #[test]
    fn item_ids_accept_strings_and_numbers() {
        assert_eq!(item_id(&json!({"id": "abc"})), Some("abc".to_string()));
        assert_eq!(item_id(&json!({"id": 42})), Some("42".to_string()));
        assert_eq!(item_id(&json!({})), None);
    }

    #[test]
    fn find_named_matches_exactly() {
        let body = json!({"servers": [
            {"id": "s-1", "name": "device-1"},
            {"id": "s-2", "name": "device-2"},
        ]});
        assert_eq!(
            HttpComputeProvider::find_named(&body, "servers", "instance", "device-2").unwrap(),
            "s-2"
        );
        assert!(matches!(
            HttpComputeProvider::find_named(&body, "servers", "instance", "device-9"),
            Err(ProviderError::NotFound { .. })
        ));
    }
}
