//! HAProxy driver — batch builder and commit pipeline.
//!
//! The driver accumulates a bind address and backend server list across
//! calls within one batch, then `create` renders the complete
//! configuration document and installs it through the services layer:
//! write scratch → validate → backup → atomic replace → restart. After a
//! successful commit the accumulated server list is cleared.

use std::path::PathBuf;

use async_trait::async_trait;
use tracing::{debug, info};

use ballast_core::wire::Algorithm;

use crate::driver::{ArchiveStore, Capability, DeviceDriver, LbStatistics};
use crate::services::{ServiceResult, SystemServices};

struct Server {
    address: String,
    port: u16,
    weight: u32,
}

/// Driver for devices running HAProxy.
pub struct HaproxyDriver<S> {
    services: S,
    stats_socket: PathBuf,
    bind_address: String,
    bind_port: u16,
    mode: String,
    algorithm: Algorithm,
    servers: Vec<Server>,
}

impl<S: SystemServices> HaproxyDriver<S> {
    pub fn new(services: S, stats_socket: PathBuf) -> Self {
        Self {
            services,
            stats_socket,
            bind_address: "0.0.0.0".to_string(),
            bind_port: 80,
            mode: "http".to_string(),
            algorithm: Algorithm::default(),
            servers: Vec::new(),
        }
    }

    /// Render the accumulated batch as a complete configuration
    /// document. Rendering is deterministic: same batch, same bytes.
    pub fn render_config(&self) -> String {
        let balance = match self.algorithm {
            Algorithm::RoundRobin => "roundrobin",
            Algorithm::LeastConnections => "leastconn",
        };

        let mut output = Vec::new();
        output.push("global".to_string());
        output.push("    daemon".to_string());
        output.push("    log 127.0.0.1 local0".to_string());
        output.push("    log 127.0.0.1 local1 notice".to_string());
        output.push("    maxconn 4096".to_string());
        output.push("    user haproxy".to_string());
        output.push("    group haproxy".to_string());
        output.push(format!(
            "    stats socket {} mode operator",
            self.stats_socket.display()
        ));
        output.push("defaults".to_string());
        output.push("    log global".to_string());
        output.push(format!("    mode {}", self.mode));
        if self.mode == "http" {
            output.push("    option httplog".to_string());
        }
        output.push("    option dontlognull".to_string());
        output.push("    option redispatch".to_string());
        output.push("    maxconn 2000".to_string());
        output.push("    retries 3".to_string());
        output.push("    timeout connect 5000ms".to_string());
        output.push("    timeout client 50000ms".to_string());
        output.push("    timeout server 5000ms".to_string());
        output.push(format!("    balance {balance}"));
        output.push("    cookie SERVERID rewrite".to_string());
        output.push(format!("frontend {}-in", self.mode));
        output.push(format!(
            "    bind {}:{}",
            self.bind_address, self.bind_port
        ));
        output.push("    default_backend servers".to_string());
        output.push("backend servers".to_string());
        for (num, server) in self.servers.iter().enumerate() {
            output.push(format!(
                "    server server{} {}:{} weight {}",
                num + 1,
                server.address,
                server.port,
                server.weight
            ));
        }

        output.join("\n") + "\n"
    }

    /// The commit pipeline. A failing step propagates immediately; the
    /// prior production file and backup stay untouched by later steps.
    async fn commit(&self, rendered: &str) -> ServiceResult<()> {
        self.services.write_scratch(rendered).await?;
        self.services.validate_config().await?;
        self.services.backup_config().await?;
        self.services.install_config().await?;
        self.services.restart().await?;
        Ok(())
    }
}

#[async_trait]
impl<S: SystemServices> DeviceDriver for HaproxyDriver<S> {
    fn bind(&mut self, address: &str, port: u16) -> Capability<()> {
        self.bind_address = address.to_string();
        self.bind_port = port;
        Capability::Ok(())
    }

    fn set_protocol(&mut self, protocol: &str) -> Capability<()> {
        match protocol.to_ascii_lowercase().as_str() {
            mode @ ("http" | "tcp") => {
                self.mode = mode.to_string();
                Capability::Ok(())
            }
            other => Capability::Failed(format!("unsupported protocol '{other}'")),
        }
    }

    fn set_algorithm(&mut self, algorithm: Algorithm) -> Capability<()> {
        self.algorithm = algorithm;
        Capability::Ok(())
    }

    fn add_server(&mut self, address: &str, port: u16, weight: u32) -> Capability<()> {
        debug!(address, port, weight, "server added to pending batch");
        self.servers.push(Server {
            address: address.to_string(),
            port,
            weight,
        });
        Capability::Ok(())
    }

    async fn create(&mut self) -> Capability<()> {
        let rendered = self.render_config();
        if let Err(e) = self.commit(&rendered).await {
            return Capability::Failed(e.to_string());
        }
        // One batch per driver instance: the pending set must not leak
        // into a later commit.
        self.servers.clear();
        info!(
            bind = %format!("{}:{}", self.bind_address, self.bind_port),
            "configuration activated"
        );
        Capability::Ok(())
    }

    async fn suspend(&mut self) -> Capability<()> {
        Capability::from_result(self.services.stop().await)
    }

    async fn enable(&mut self) -> Capability<()> {
        Capability::from_result(self.services.start().await)
    }

    async fn delete(&mut self) -> Capability<()> {
        if let Err(e) = self.services.stop().await {
            return Capability::Failed(e.to_string());
        }
        Capability::from_result(self.services.remove_configs().await)
    }

    async fn archive(&mut self, store: &ArchiveStore) -> Capability<()> {
        Capability::from_result(self.services.ship_logs(store).await)
    }

    async fn get_stats(&mut self) -> Capability<LbStatistics> {
        Capability::from_result(self.services.query_stats().await)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::ServiceError;
    use std::sync::Mutex;

    /// Records the pipeline steps it sees; optionally fails one step.
    #[derive(Default)]
    struct FakeServices {
        calls: Mutex<Vec<&'static str>>,
        fail_at: Option<&'static str>,
    }

    impl FakeServices {
        fn failing_at(step: &'static str) -> Self {
            Self {
                fail_at: Some(step),
                ..Self::default()
            }
        }

        fn step(&self, name: &'static str) -> ServiceResult<()> {
            self.calls.lock().unwrap().push(name);
            if self.fail_at == Some(name) {
                return Err(ServiceError::CommandFailed {
                    command: name.to_string(),
                    detail: "injected".to_string(),
                });
            }
            Ok(())
        }

        fn calls(&self) -> Vec<&'static str> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl SystemServices for FakeServices {
        async fn write_scratch(&self, _contents: &str) -> ServiceResult<()> {
            self.step("write_scratch")
        }
        async fn validate_config(&self) -> ServiceResult<()> {
            self.step("validate")
        }
        async fn backup_config(&self) -> ServiceResult<()> {
            self.step("backup")
        }
        async fn install_config(&self) -> ServiceResult<()> {
            self.step("install")
        }
        async fn restart(&self) -> ServiceResult<()> {
            self.step("restart")
        }
        async fn start(&self) -> ServiceResult<()> {
            self.step("start")
        }
        async fn stop(&self) -> ServiceResult<()> {
            self.step("stop")
        }
        async fn remove_configs(&self) -> ServiceResult<()> {
            self.step("remove_configs")
        }
        async fn ship_logs(&self, _store: &ArchiveStore) -> ServiceResult<()> {
            self.step("ship_logs")
        }
        async fn query_stats(&self) -> ServiceResult<LbStatistics> {
            self.step("query_stats")?;
            Ok(LbStatistics {
                bytes_in: 1,
                bytes_out: 2,
                current_sessions: 3,
            })
        }
    }

    fn driver_with(services: FakeServices) -> HaproxyDriver<FakeServices> {
        HaproxyDriver::new(services, PathBuf::from("/var/run/haproxy-stats.socket"))
    }

    #[test]
    fn render_is_deterministic() {
        let mut driver = driver_with(FakeServices::default());
        driver.bind("10.5.0.1", 443);
        driver.add_server("10.0.0.1", 80, 1);
        driver.add_server("10.0.0.2", 81, 2);
        assert_eq!(driver.render_config(), driver.render_config());
    }

    #[test]
    fn render_contains_expected_sections() {
        let mut driver = driver_with(FakeServices::default());
        driver.bind("10.5.0.1", 443);
        driver.set_algorithm(Algorithm::LeastConnections);
        driver.add_server("10.0.0.1", 80, 1);

        let config = driver.render_config();
        assert!(config.contains("global\n"));
        assert!(config.contains("timeout connect 5000ms"));
        assert!(config.contains("timeout client 50000ms"));
        assert!(config.contains("timeout server 5000ms"));
        assert!(config.contains("balance leastconn"));
        assert!(config.contains("cookie SERVERID rewrite"));
        assert!(config.contains("bind 10.5.0.1:443"));
        assert!(config.contains("server server1 10.0.0.1:80 weight 1"));
    }

    #[test]
    fn tcp_mode_drops_httplog() {
        let mut driver = driver_with(FakeServices::default());
        assert!(driver.set_protocol("TCP").is_ok());
        let config = driver.render_config();
        assert!(config.contains("    mode tcp"));
        assert!(!config.contains("option httplog"));
    }

    #[test]
    fn unknown_protocol_fails() {
        let mut driver = driver_with(FakeServices::default());
        let outcome = driver.set_protocol("galera");
        assert_eq!(
            outcome,
            Capability::Failed("unsupported protocol 'galera'".to_string())
        );
    }

    #[tokio::test]
    async fn commit_runs_pipeline_in_order() {
        let mut driver = driver_with(FakeServices::default());
        driver.add_server("10.0.0.1", 80, 1);

        assert!(driver.create().await.is_ok());
        assert_eq!(
            driver.services.calls(),
            vec!["write_scratch", "validate", "backup", "install", "restart"]
        );
    }

    #[tokio::test]
    async fn validation_failure_stops_before_backup() {
        let mut driver = driver_with(FakeServices::failing_at("validate"));
        driver.add_server("10.0.0.1", 80, 1);

        let outcome = driver.create().await;
        assert!(matches!(outcome, Capability::Failed(_)));
        assert_eq!(driver.services.calls(), vec!["write_scratch", "validate"]);
    }

    #[tokio::test]
    async fn install_failure_skips_restart() {
        let mut driver = driver_with(FakeServices::failing_at("install"));
        let outcome = driver.create().await;
        assert!(matches!(outcome, Capability::Failed(_)));
        assert!(!driver.services.calls().contains(&"restart"));
    }

    #[tokio::test]
    async fn server_list_resets_after_successful_commit() {
        let mut driver = driver_with(FakeServices::default());
        driver.add_server("10.0.0.1", 80, 1);
        assert!(driver.create().await.is_ok());

        // The next render must not carry servers from the previous batch.
        assert!(!driver.render_config().contains("server1"));
    }

    #[tokio::test]
    async fn failed_commit_keeps_pending_servers() {
        let mut driver = driver_with(FakeServices::failing_at("restart"));
        driver.add_server("10.0.0.1", 80, 1);
        let outcome = driver.create().await;
        assert!(matches!(outcome, Capability::Failed(_)));
        assert!(driver.render_config().contains("server1"));
    }

    #[tokio::test]
    async fn lifecycle_actions_map_to_service_control() {
        let mut driver = driver_with(FakeServices::default());
        assert!(driver.suspend().await.is_ok());
        assert!(driver.enable().await.is_ok());
        assert!(driver.delete().await.is_ok());
        assert_eq!(
            driver.services.calls(),
            vec!["stop", "start", "stop", "remove_configs"]
        );
    }

    #[tokio::test]
    async fn stats_come_from_the_control_channel() {
        let mut driver = driver_with(FakeServices::default());
        let outcome = driver.get_stats().await;
        assert_eq!(
            outcome,
            Capability::Ok(LbStatistics {
                bytes_in: 1,
                bytes_out: 2,
                current_sessions: 3,
            })
        );
    }
}
