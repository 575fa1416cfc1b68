//! System services layer for the HAProxy driver.
//!
//! Everything that touches the host — config file installation, service
//! control, the stats socket, log shipping — sits behind the
//! [`SystemServices`] trait so the driver's commit pipeline can be
//! exercised without a real HAProxy installation.

use std::path::PathBuf;

use async_trait::async_trait;
use thiserror::Error;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::process::Command;
use tracing::{debug, info};

use ballast_core::config::HaproxyConfig;

use crate::driver::{ArchiveStore, LbStatistics};

/// Result type alias for service layer operations.
pub type ServiceResult<T> = Result<T, ServiceError>;

/// Errors raised by the system services layer.
#[derive(Debug, Error)]
pub enum ServiceError {
    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("command `{command}` failed: {detail}")]
    CommandFailed { command: String, detail: String },

    #[error("configuration file is invalid: {0}")]
    InvalidConfig(String),

    #[error("stats query failed: {0}")]
    Stats(String),

    #[error("log upload failed: {0}")]
    Upload(String),
}

/// The host-facing operations the HAProxy driver composes.
#[async_trait]
pub trait SystemServices: Send + Sync {
    /// Write a candidate configuration to the scratch location.
    async fn write_scratch(&self, contents: &str) -> ServiceResult<()>;

    /// Structurally validate the scratch configuration without touching
    /// the live file.
    async fn validate_config(&self) -> ServiceResult<()>;

    /// Copy the current production configuration to the backup path.
    /// A missing production file is not an error (first install).
    async fn backup_config(&self) -> ServiceResult<()>;

    /// Atomically move the scratch configuration into production.
    async fn install_config(&self) -> ServiceResult<()>;

    async fn restart(&self) -> ServiceResult<()>;
    async fn start(&self) -> ServiceResult<()>;
    async fn stop(&self) -> ServiceResult<()>;

    /// Delete the production and backup configurations.
    async fn remove_configs(&self) -> ServiceResult<()>;

    /// Ship service logs to the given object store.
    async fn ship_logs(&self, store: &ArchiveStore) -> ServiceResult<()>;

    /// Read statistics from the service's control channel.
    async fn query_stats(&self) -> ServiceResult<LbStatistics>;
}

/// Production implementation driving the local host.
///
/// Config validation shells out to the haproxy binary, service control
/// goes through systemctl, and stats come from the local stats socket.
pub struct ProcessServices {
    config_path: PathBuf,
    scratch_path: PathBuf,
    backup_path: PathBuf,
    stats_socket: PathBuf,
    service: String,
    log_dir: PathBuf,
    http: reqwest::Client,
}

impl ProcessServices {
    pub fn new(config: &HaproxyConfig) -> Self {
        let mut backup = config.config_path.as_os_str().to_owned();
        backup.push(".BKUP");
        Self {
            config_path: config.config_path.clone(),
            scratch_path: config.scratch_path.clone(),
            backup_path: PathBuf::from(backup),
            stats_socket: config.stats_socket.clone(),
            service: config.service.clone(),
            log_dir: config.log_dir.clone(),
            http: reqwest::Client::new(),
        }
    }

    async fn run(&self, program: &str, args: &[&str]) -> ServiceResult<()> {
        let output = Command::new(program).args(args).output().await?;
        if output.status.success() {
            return Ok(());
        }
        Err(ServiceError::CommandFailed {
            command: format!("{program} {}", args.join(" ")),
            detail: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        })
    }

    async fn systemctl(&self, verb: &str) -> ServiceResult<()> {
        debug!(service = %self.service, verb, "service control");
        self.run("systemctl", &[verb, &self.service]).await
    }
}

#[async_trait]
impl SystemServices for ProcessServices {
    async fn write_scratch(&self, contents: &str) -> ServiceResult<()> {
        tokio::fs::write(&self.scratch_path, contents).await?;
        Ok(())
    }

    async fn validate_config(&self) -> ServiceResult<()> {
        let scratch = self.scratch_path.to_string_lossy();
        let output = Command::new("haproxy")
            .args(["-f", &scratch, "-c"])
            .output()
            .await?;
        if output.status.success() {
            return Ok(());
        }
        Err(ServiceError::InvalidConfig(
            String::from_utf8_lossy(&output.stderr).trim().to_string(),
        ))
    }

    async fn backup_config(&self) -> ServiceResult<()> {
        match tokio::fs::copy(&self.config_path, &self.backup_path).await {
            Ok(_) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    async fn install_config(&self) -> ServiceResult<()> {
        // Scratch lives next to the production file so the rename stays
        // on one filesystem.
        tokio::fs::rename(&self.scratch_path, &self.config_path).await?;
        info!(path = ?self.config_path, "configuration installed");
        Ok(())
    }

    async fn restart(&self) -> ServiceResult<()> {
        self.systemctl("restart").await
    }

    async fn start(&self) -> ServiceResult<()> {
        self.systemctl("start").await
    }

    async fn stop(&self) -> ServiceResult<()> {
        self.systemctl("stop").await
    }

    async fn remove_configs(&self) -> ServiceResult<()> {
        for path in [&self.config_path, &self.backup_path] {
            match tokio::fs::remove_file(path).await {
                Ok(()) => {}
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => return Err(e.into()),
            }
        }
        Ok(())
    }

    async fn ship_logs(&self, store: &ArchiveStore) -> ServiceResult<()> {
        let mut entries = tokio::fs::read_dir(&self.log_dir).await?;
        let mut shipped = 0u32;
        while let Some(entry) = entries.next_entry().await? {
            if !entry.file_type().await?.is_file() {
                continue;
            }
            let name = entry.file_name().to_string_lossy().into_owned();
            let body = tokio::fs::read(entry.path()).await?;
            let url = format!(
                "{}/{}/{}/{}",
                store.endpoint.trim_end_matches('/'),
                store.base_path.trim_matches('/'),
                store.lb_id,
                name
            );
            let response = self
                .http
                .put(&url)
                .header("X-Auth-Token", &store.auth_token)
                .body(body)
                .send()
                .await
                .map_err(|e| ServiceError::Upload(e.to_string()))?;
            if !response.status().is_success() {
                return Err(ServiceError::Upload(format!(
                    "{name}: object store returned {}",
                    response.status()
                )));
            }
            shipped += 1;
        }
        info!(shipped, lb_id = %store.lb_id, "log archive uploaded");
        Ok(())
    }

    async fn query_stats(&self) -> ServiceResult<LbStatistics> {
        let mut stream = tokio::net::UnixStream::connect(&self.stats_socket)
            .await
            .map_err(|e| ServiceError::Stats(format!("stats socket unavailable: {e}")))?;
        stream
            .write_all(b"show stat\n")
            .await
            .map_err(|e| ServiceError::Stats(e.to_string()))?;
        let mut raw = String::new();
        stream
            .read_to_string(&mut raw)
            .await
            .map_err(|e| ServiceError::Stats(e.to_string()))?;
        parse_stats(&raw)
    }
}

/// Parse HAProxy `show stat` CSV output, summing the BACKEND rows.
fn parse_stats(csv: &str) -> ServiceResult<LbStatistics> {
    let mut lines = csv.lines();
    let header = lines
        .next()
        .ok_or_else(|| ServiceError::Stats("empty stats output".to_string()))?;
    let columns: Vec<&str> = header.trim_start_matches(['#', ' ']).split(',').collect();
    let col = |name: &str| columns.iter().position(|c| *c == name);
    let (Some(svname), Some(scur), Some(bin), Some(bout)) =
        (col("svname"), col("scur"), col("bin"), col("bout"))
    else {
        return Err(ServiceError::Stats("unrecognized stats header".to_string()));
    };

    let mut stats = LbStatistics::default();
    for line in lines {
        let fields: Vec<&str> = line.split(',').collect();
        if fields.get(svname) != Some(&"BACKEND") {
            continue;
        }
        let field = |idx: usize| {
            fields
                .get(idx)
                .and_then(|v| v.parse::<u64>().ok())
                .unwrap_or(0)
        };
        stats.current_sessions += field(scur);
        stats.bytes_in += field(bin);
        stats.bytes_out += field(bout);
    }
    Ok(stats)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_config(dir: &std::path::Path) -> HaproxyConfig {
        HaproxyConfig {
            config_path: dir.join("haproxy.cfg"),
            scratch_path: dir.join("haproxy.cfg.NEW"),
            stats_socket: dir.join("stats.sock"),
            service: "haproxy".to_string(),
            log_dir: dir.join("logs"),
        }
    }

    #[tokio::test]
    async fn install_replaces_production_and_keeps_backup() {
        let dir = tempfile::tempdir().unwrap();
        let config = test_config(dir.path());
        let services = ProcessServices::new(&config);

        tokio::fs::write(&config.config_path, "old").await.unwrap();
        services.write_scratch("new").await.unwrap();
        services.backup_config().await.unwrap();
        services.install_config().await.unwrap();

        assert_eq!(
            std::fs::read_to_string(&config.config_path).unwrap(),
            "new"
        );
        assert_eq!(
            std::fs::read_to_string(dir.path().join("haproxy.cfg.BKUP")).unwrap(),
            "old"
        );
    }

    #[tokio::test]
    async fn backup_without_production_file_is_a_no_op() {
        let dir = tempfile::tempdir().unwrap();
        let services = ProcessServices::new(&test_config(dir.path()));
        services.backup_config().await.unwrap();
        assert!(!dir.path().join("haproxy.cfg.BKUP").exists());
    }

    #[tokio::test]
    async fn remove_configs_deletes_production_and_backup() {
        let dir = tempfile::tempdir().unwrap();
        let config = test_config(dir.path());
        let services = ProcessServices::new(&config);

        tokio::fs::write(&config.config_path, "live").await.unwrap();
        tokio::fs::write(dir.path().join("haproxy.cfg.BKUP"), "bkup")
            .await
            .unwrap();

        services.remove_configs().await.unwrap();
        assert!(!config.config_path.exists());
        assert!(!dir.path().join("haproxy.cfg.BKUP").exists());

        // Removing again is fine.
        services.remove_configs().await.unwrap();
    }

    const SAMPLE: &str = "\
# pxname,svname,qcur,qmax,scur,smax,slim,stot,bin,bout\n\
http-in,FRONTEND,,,3,5,2000,120,4096,8192\n\
servers,server1,0,0,1,2,,60,1024,2048\n\
servers,BACKEND,0,0,2,4,200,120,3072,6144\n";

    #[test]
    fn parses_backend_rows() {
        let stats = parse_stats(SAMPLE).unwrap();
        assert_eq!(stats.current_sessions, 2);
        assert_eq!(stats.bytes_in, 3072);
        assert_eq!(stats.bytes_out, 6144);
    }

    #[test]
    fn empty_output_is_an_error() {
        assert!(parse_stats("").is_err());
    }

    #[test]
    fn unknown_header_is_an_error() {
        assert!(parse_stats("# a,b,c\nx,y,z\n").is_err());
    }

    #[test]
    fn missing_backend_rows_sum_to_zero() {
        let csv = "# pxname,svname,scur,bin,bout\nhttp-in,FRONTEND,1,10,20\n";
        let stats = parse_stats(csv).unwrap();
        assert_eq!(stats, LbStatistics::default());
    }
}
