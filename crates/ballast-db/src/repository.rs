//! Entity repository — the persistence vocabulary of the job
//! dispatcher.
//!
//! Every operation the dispatcher performs against load balancer and
//! device rows lives behind [`LbRepository`], so job handling is
//! testable against the in-memory backend and production runs over a
//! failover-pool session.

use async_trait::async_trait;

use ballast_core::types::{DeviceId, DeviceStatus, HealthMonitor, LbId, LbStatus, LoadBalancer, Node};

use crate::error::{DbError, DbResult};
use crate::failover::{FailoverPool, PgConnector, PgSession};

/// An enabled backend entry captured in a desired-state snapshot.
#[derive(Debug, Clone, PartialEq)]
pub struct SnapshotNode {
    pub id: i64,
    pub address: String,
    pub port: u16,
    pub weight: u32,
}

/// Desired-state snapshot of one live load balancer: its frontend
/// settings and enabled nodes only.
#[derive(Debug, Clone, PartialEq)]
pub struct LbSnapshot {
    pub lb_id: LbId,
    pub name: String,
    pub protocol: String,
    pub algorithm: String,
    pub port: u16,
    pub nodes: Vec<SnapshotNode>,
}

/// Persistence operations used by the dispatcher. Live load balancers
/// are those not deleted and not pending delete.
#[async_trait]
pub trait LbRepository: Send + Sync {
    /// Count live load balancers attached to a device, excluding one.
    async fn count_live_lbs_on_device(&self, device: DeviceId, excluding: LbId) -> DbResult<u64>;

    /// Snapshot every live load balancer attached to a device,
    /// optionally excluding one. Snapshots carry enabled nodes only.
    async fn snapshot_live_lbs(
        &self,
        device: DeviceId,
        excluding: Option<LbId>,
    ) -> DbResult<Vec<LbSnapshot>>;

    async fn get_load_balancer(&self, lb: LbId) -> DbResult<LoadBalancer>;

    async fn set_lb_status(&self, lb: LbId, status: LbStatus) -> DbResult<()>;

    /// Remove the load balancer's device associations.
    async fn unlink_lb_from_devices(&self, lb: LbId) -> DbResult<()>;

    async fn set_device_status(&self, device: DeviceId, status: DeviceStatus) -> DbResult<()>;

    /// Record a diagnostic message on a device without changing status.
    async fn set_device_diagnostic(&self, device: DeviceId, message: &str) -> DbResult<()>;

    /// Mark the device and every live load balancer attached to it as
    /// errored with the given message.
    async fn propagate_error(&self, device: DeviceId, message: &str) -> DbResult<()>;
}

/// Opens one repository session per job task.
#[async_trait]
pub trait SessionSource: Send + Sync {
    async fn open(&self) -> DbResult<Box<dyn LbRepository>>;
}

#[async_trait]
impl SessionSource for FailoverPool<PgConnector> {
    async fn open(&self) -> DbResult<Box<dyn LbRepository>> {
        let session = self.acquire().await?;
        Ok(Box::new(PgRepository::new(session)))
    }
}

/// Postgres-backed repository over one pooled session.
pub struct PgRepository {
    session: PgSession,
}

impl PgRepository {
    pub fn new(session: PgSession) -> Self {
        Self { session }
    }

    fn client(&self) -> &tokio_postgres::Client {
        &self.session.client
    }
}

fn query_err(e: tokio_postgres::Error) -> DbError {
    DbError::Query(e.to_string())
}

#[async_trait]
impl LbRepository for PgRepository {
    async fn count_live_lbs_on_device(&self, device: DeviceId, excluding: LbId) -> DbResult<u64> {
        let row = self
            .client()
            .query_one(
                "SELECT COUNT(*) FROM loadbalancers lb \
                 JOIN loadbalancers_devices ld ON ld.loadbalancer = lb.id \
                 WHERE ld.device = $1 AND lb.id <> $2 \
                 AND lb.status NOT IN ('DELETED', 'PENDING_DELETE')",
                &[&device, &excluding],
            )
            .await
            .map_err(query_err)?;
        let count: i64 = row.get(0);
        Ok(count as u64)
    }

    async fn snapshot_live_lbs(
        &self,
        device: DeviceId,
        excluding: Option<LbId>,
    ) -> DbResult<Vec<LbSnapshot>> {
        let excluding = excluding.unwrap_or(-1);
        let lb_rows = self
            .client()
            .query(
                "SELECT lb.id, lb.name, lb.protocol, lb.algorithm, lb.port \
                 FROM loadbalancers lb \
                 JOIN loadbalancers_devices ld ON ld.loadbalancer = lb.id \
                 WHERE ld.device = $1 AND lb.id <> $2 \
                 AND lb.status NOT IN ('DELETED', 'PENDING_DELETE') \
                 ORDER BY lb.id",
                &[&device, &excluding],
            )
            .await
            .map_err(query_err)?;

        let mut snapshots = Vec::with_capacity(lb_rows.len());
        for row in lb_rows {
            let lb_id: i64 = row.get(0);
            let node_rows = self
                .client()
                .query(
                    "SELECT id, address, port, weight FROM nodes \
                     WHERE lbid = $1 AND enabled ORDER BY id",
                    &[&lb_id],
                )
                .await
                .map_err(query_err)?;
            snapshots.push(LbSnapshot {
                lb_id,
                name: row.get(1),
                protocol: row.get(2),
                algorithm: row.get(3),
                port: row.get::<_, i32>(4) as u16,
                nodes: node_rows
                    .iter()
                    .map(|n| SnapshotNode {
                        id: n.get(0),
                        address: n.get(1),
                        port: n.get::<_, i32>(2) as u16,
                        weight: n.get::<_, i32>(3) as u32,
                    })
                    .collect(),
            });
        }
        Ok(snapshots)
    }

    async fn get_load_balancer(&self, lb: LbId) -> DbResult<LoadBalancer> {
        let row = self
            .client()
            .query_opt(
                "SELECT id, name, protocol, algorithm, port, status, errmsg, tenantid \
                 FROM loadbalancers WHERE id = $1",
                &[&lb],
            )
            .await
            .map_err(query_err)?
            .ok_or_else(|| DbError::NotFound(format!("load balancer {lb}")))?;

        let status_raw: String = row.get(5);
        let status = LbStatus::parse(&status_raw)
            .ok_or_else(|| DbError::Query(format!("unknown status '{status_raw}'")))?;

        let node_rows = self
            .client()
            .query(
                "SELECT id, address, port, weight, enabled, status FROM nodes \
                 WHERE lbid = $1 ORDER BY id",
                &[&lb],
            )
            .await
            .map_err(query_err)?;
        let device_rows = self
            .client()
            .query(
                "SELECT device FROM loadbalancers_devices WHERE loadbalancer = $1",
                &[&lb],
            )
            .await
            .map_err(query_err)?;
        let monitor_row = self
            .client()
            .query_opt(
                "SELECT type, delay, timeout, attempts, path FROM monitors WHERE lbid = $1",
                &[&lb],
            )
            .await
            .map_err(query_err)?;

        Ok(LoadBalancer {
            id: row.get(0),
            name: row.get(1),
            protocol: row.get(2),
            algorithm: row.get(3),
            port: row.get::<_, i32>(4) as u16,
            status,
            errmsg: row.get(6),
            tenant_id: row.get(7),
            nodes: node_rows
                .iter()
                .map(|n| Node {
                    id: n.get(0),
                    address: n.get(1),
                    port: n.get::<_, i32>(2) as u16,
                    weight: n.get::<_, i32>(3) as u32,
                    enabled: n.get(4),
                    status: n.get(5),
                })
                .collect(),
            monitor: monitor_row.map(|m| HealthMonitor {
                monitor_type: m.get(0),
                delay: m.get::<_, i32>(1) as u32,
                timeout: m.get::<_, i32>(2) as u32,
                attempts: m.get::<_, i32>(3) as u32,
                path: m.get(4),
            }),
            device_ids: device_rows.iter().map(|d| d.get(0)).collect(),
        })
    }

    async fn set_lb_status(&self, lb: LbId, status: LbStatus) -> DbResult<()> {
        self.client()
            .execute(
                "UPDATE loadbalancers SET status = $2 WHERE id = $1",
                &[&lb, &status.as_str()],
            )
            .await
            .map_err(query_err)?;
        Ok(())
    }

    async fn unlink_lb_from_devices(&self, lb: LbId) -> DbResult<()> {
        self.client()
            .execute(
                "DELETE FROM loadbalancers_devices WHERE loadbalancer = $1",
                &[&lb],
            )
            .await
            .map_err(query_err)?;
        Ok(())
    }

    async fn set_device_status(&self, device: DeviceId, status: DeviceStatus) -> DbResult<()> {
        self.client()
            .execute(
                "UPDATE devices SET status = $2 WHERE id = $1",
                &[&device, &status.as_str()],
            )
            .await
            .map_err(query_err)?;
        Ok(())
    }

    async fn set_device_diagnostic(&self, device: DeviceId, message: &str) -> DbResult<()> {
        self.client()
            .execute(
                "UPDATE devices SET errmsg = $2 WHERE id = $1",
                &[&device, &message],
            )
            .await
            .map_err(query_err)?;
        Ok(())
    }

    async fn propagate_error(&self, device: DeviceId, message: &str) -> DbResult<()> {
        self.client()
            .execute(
                "UPDATE devices SET status = 'ERROR', errmsg = $2 WHERE id = $1",
                &[&device, &message],
            )
            .await
            .map_err(query_err)?;
        self.client()
            .execute(
                "UPDATE loadbalancers SET status = 'ERROR', errmsg = $2 \
                 WHERE status <> 'DELETED' AND id IN \
                 (SELECT loadbalancer FROM loadbalancers_devices WHERE device = $1)",
                &[&device, &message],
            )
            .await
            .map_err(query_err)?;
        Ok(())
    }
}
