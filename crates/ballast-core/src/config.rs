//! ballast.toml configuration parser.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BallastConfig {
    #[serde(default)]
    pub worker: WorkerConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    pub provider: Option<ProviderConfig>,
}

/// Worker agent settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerConfig {
    /// Address the job endpoint binds to.
    #[serde(default = "default_bind")]
    pub bind: String,
    /// Driver backend: "haproxy" or "null".
    #[serde(default = "default_driver")]
    pub driver: String,
    #[serde(default)]
    pub haproxy: HaproxyConfig,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            driver: default_driver(),
            haproxy: HaproxyConfig::default(),
        }
    }
}

fn default_bind() -> String {
    "0.0.0.0:8040".to_string()
}

fn default_driver() -> String {
    "haproxy".to_string()
}

/// Paths and service identity for the HAProxy driver.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HaproxyConfig {
    #[serde(default = "default_config_path")]
    pub config_path: PathBuf,
    #[serde(default = "default_scratch_path")]
    pub scratch_path: PathBuf,
    #[serde(default = "default_stats_socket")]
    pub stats_socket: PathBuf,
    /// Managed service name passed to the init system.
    #[serde(default = "default_service")]
    pub service: String,
    /// Directory holding the logs shipped by ARCHIVE.
    #[serde(default = "default_log_dir")]
    pub log_dir: PathBuf,
}

impl Default for HaproxyConfig {
    fn default() -> Self {
        Self {
            config_path: default_config_path(),
            scratch_path: default_scratch_path(),
            stats_socket: default_stats_socket(),
            service: default_service(),
            log_dir: default_log_dir(),
        }
    }
}

fn default_config_path() -> PathBuf {
    PathBuf::from("/etc/haproxy/haproxy.cfg")
}

// Lives next to the production file so the final rename is atomic.
fn default_scratch_path() -> PathBuf {
    PathBuf::from("/etc/haproxy/haproxy.cfg.NEW")
}

fn default_stats_socket() -> PathBuf {
    PathBuf::from("/var/run/haproxy-stats.socket")
}

fn default_service() -> String {
    "haproxy".to_string()
}

fn default_log_dir() -> PathBuf {
    PathBuf::from("/var/log/haproxy")
}

/// Database replica set. One engine is built per replica.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DatabaseConfig {
    #[serde(default)]
    pub replicas: Vec<ReplicaConfig>,
}

/// Connection settings for one database replica.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReplicaConfig {
    pub host: String,
    #[serde(default = "default_db_port")]
    pub port: u16,
    pub username: String,
    pub password: String,
    /// Database schema holding the load balancer tables.
    pub schema: String,
    /// Extra connection-string parameters (e.g. TLS material) appended
    /// verbatim.
    pub params: Option<String>,
}

fn default_db_port() -> u16 {
    5432
}

impl ReplicaConfig {
    /// Render the connection string for this replica.
    pub fn conninfo(&self) -> String {
        let mut conninfo = format!(
            "host={} port={} user={} password={} dbname={}",
            self.host, self.port, self.username, self.password, self.schema
        );
        if let Some(params) = &self.params {
            conninfo.push(' ');
            conninfo.push_str(params);
        }
        conninfo
    }
}

/// Compute provider credentials and floating-address settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    pub endpoint: String,
    pub username: String,
    pub password: String,
    /// Port probed after a floating address is assigned. No probe runs
    /// when unset.
    pub tcp_check_port: Option<u16>,
    /// Image name or id used to boot device instances.
    pub image: String,
    /// Flavor name or id used to boot device instances.
    pub flavor: String,
    pub key_name: Option<String>,
    pub security_group: Option<String>,
}

impl BallastConfig {
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: BallastConfig = toml::from_str(&content)?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn minimal_config_parses_with_defaults() {
        let config: BallastConfig = toml::from_str("").unwrap();
        assert_eq!(config.worker.bind, "0.0.0.0:8040");
        assert_eq!(config.worker.driver, "haproxy");
        assert!(config.database.replicas.is_empty());
        assert!(config.provider.is_none());
    }

    #[test]
    fn replica_conninfo_includes_params() {
        let replica = ReplicaConfig {
            host: "db1.example.com".to_string(),
            port: 5432,
            username: "lbaas".to_string(),
            password: "secret".to_string(),
            schema: "lbaas".to_string(),
            params: Some("sslmode=require".to_string()),
        };
        assert_eq!(
            replica.conninfo(),
            "host=db1.example.com port=5432 user=lbaas password=secret dbname=lbaas sslmode=require"
        );
    }

    #[test]
    fn full_config_parses() {
        let toml = r#"
            [worker]
            bind = "127.0.0.1:9000"
            driver = "null"

            [worker.haproxy]
            config_path = "/etc/haproxy/haproxy.cfg"

            [[database.replicas]]
            host = "db1"
            username = "u"
            password = "p"
            schema = "lbaas"

            [[database.replicas]]
            host = "db2"
            port = 5433
            username = "u"
            password = "p"
            schema = "lbaas"

            [provider]
            endpoint = "https://compute.example.com/v2"
            username = "svc"
            password = "secret"
            tcp_check_port = 443
            image = "lbaas-device"
            flavor = "standard.medium"
        "#;
        let config: BallastConfig = toml::from_str(toml).unwrap();
        assert_eq!(config.database.replicas.len(), 2);
        assert_eq!(config.database.replicas[1].port, 5433);
        let provider = config.provider.unwrap();
        assert_eq!(provider.tcp_check_port, Some(443));
    }
}
