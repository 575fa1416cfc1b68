//! Bounded TCP reachability probe.
//!
//! After a floating address is attached, a short-timeout connect
//! verifies traffic actually reaches the device. Five failed attempts
//! with a fixed inter-attempt delay fail the whole operation.

use std::time::Duration;

use thiserror::Error;
use tokio::net::TcpStream;
use tracing::debug;

/// Probe tuning. Defaults: 5 s connect timeout, 2 s between attempts,
/// 5 attempts.
#[derive(Debug, Clone)]
pub struct ProbeSettings {
    pub connect_timeout: Duration,
    pub retry_delay: Duration,
    pub attempts: u32,
}

impl Default for ProbeSettings {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(5),
            retry_delay: Duration::from_secs(2),
            attempts: 5,
        }
    }
}

#[derive(Debug, Error)]
pub enum ProbeError {
    #[error("no TCP response from {target} after {attempts} attempts")]
    Exhausted { target: String, attempts: u32 },
}

/// Probe `host:port` until a connect succeeds. Returns the attempt
/// number that connected; a success stops further attempts.
pub async fn verify_tcp(host: &str, port: u16, settings: &ProbeSettings) -> Result<u32, ProbeError> {
    let target = format!("{host}:{port}");
    for attempt in 1..=settings.attempts {
        match tokio::time::timeout(settings.connect_timeout, TcpStream::connect(&target)).await {
            Ok(Ok(stream)) => {
                drop(stream);
                return Ok(attempt);
            }
            Ok(Err(e)) => {
                debug!(%target, attempt, error = %e, "probe connect failed");
            }
            Err(_) => {
                debug!(%target, attempt, "probe connect timed out");
            }
        }
        if attempt < settings.attempts {
            tokio::time::sleep(settings.retry_delay).await;
        }
    }
    Err(ProbeError::Exhausted {
        target,
        attempts: settings.attempts,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn reachable_port_succeeds_on_first_attempt() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();

        let attempt = verify_tcp("127.0.0.1", port, &ProbeSettings::default())
            .await
            .unwrap();
        assert_eq!(attempt, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn unreachable_port_exhausts_five_attempts() {
        // Bind then drop so nothing listens on the port.
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let result = verify_tcp("127.0.0.1", port, &ProbeSettings::default()).await;
        match result {
            Err(ProbeError::Exhausted { attempts, .. }) => assert_eq!(attempts, 5),
            other => panic!("expected exhaustion, got {other:?}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn single_attempt_settings_probe_once() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let settings = ProbeSettings {
            attempts: 1,
            ..ProbeSettings::default()
        };
        let result = verify_tcp("127.0.0.1", port, &settings).await;
        match result {
            Err(ProbeError::Exhausted { attempts, .. }) => assert_eq!(attempts, 1),
            other => panic!("expected exhaustion, got {other:?}"),
        }
    }
}
