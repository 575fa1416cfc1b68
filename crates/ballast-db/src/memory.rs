//! In-process repository backend (for testing).
//!
//! Mirrors the Postgres repository's semantics over plain maps so
//! dispatcher behavior can be exercised without a database server.
//! Clones share state, which also makes the type a `SessionSource`.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use ballast_core::types::{Device, DeviceId, DeviceStatus, LbId, LbStatus, LoadBalancer};

use crate::error::{DbError, DbResult};
use crate::repository::{LbRepository, LbSnapshot, SessionSource, SnapshotNode};

#[derive(Default)]
struct Inner {
    lbs: HashMap<LbId, LoadBalancer>,
    devices: HashMap<DeviceId, Device>,
}

/// Shared in-memory entity store.
#[derive(Clone, Default)]
pub struct MemoryRepository {
    inner: Arc<Mutex<Inner>>,
}

impl MemoryRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_load_balancer(&self, lb: LoadBalancer) {
        self.lock().lbs.insert(lb.id, lb);
    }

    pub fn insert_device(&self, device: Device) {
        self.lock().devices.insert(device.id, device);
    }

    pub fn load_balancer(&self, id: LbId) -> Option<LoadBalancer> {
        self.lock().lbs.get(&id).cloned()
    }

    pub fn device(&self, id: DeviceId) -> Option<Device> {
        self.lock().devices.get(&id).cloned()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        self.inner.lock().expect("repository state poisoned")
    }
}

#[async_trait]
impl LbRepository for MemoryRepository {
    async fn count_live_lbs_on_device(&self, device: DeviceId, excluding: LbId) -> DbResult<u64> {
        let inner = self.lock();
        let count = inner
            .lbs
            .values()
            .filter(|lb| {
                lb.device_ids.contains(&device) && lb.id != excluding && lb.status.is_live()
            })
            .count();
        Ok(count as u64)
    }

    async fn snapshot_live_lbs(
        &self,
        device: DeviceId,
        excluding: Option<LbId>,
    ) -> DbResult<Vec<LbSnapshot>> {
        let inner = self.lock();
        let mut lbs: Vec<&LoadBalancer> = inner
            .lbs
            .values()
            .filter(|lb| {
                lb.device_ids.contains(&device)
                    && Some(lb.id) != excluding
                    && lb.status.is_live()
            })
            .collect();
        lbs.sort_by_key(|lb| lb.id);

        Ok(lbs
            .into_iter()
            .map(|lb| LbSnapshot {
                lb_id: lb.id,
                name: lb.name.clone(),
                protocol: lb.protocol.clone(),
                algorithm: lb.algorithm.clone(),
                port: lb.port,
                nodes: lb
                    .nodes
                    .iter()
                    .filter(|n| n.enabled)
                    .map(|n| SnapshotNode {
                        id: n.id,
                        address: n.address.clone(),
                        port: n.port,
                        weight: n.weight,
                    })
                    .collect(),
            })
            .collect())
    }

    async fn get_load_balancer(&self, lb: LbId) -> DbResult<LoadBalancer> {
        self.load_balancer(lb)
            .ok_or_else(|| DbError::NotFound(format!("load balancer {lb}")))
    }

    async fn set_lb_status(&self, lb: LbId, status: LbStatus) -> DbResult<()> {
        let mut inner = self.lock();
        let lb = inner
            .lbs
            .get_mut(&lb)
            .ok_or_else(|| DbError::NotFound(format!("load balancer {lb}")))?;
        lb.status = status;
        Ok(())
    }

    async fn unlink_lb_from_devices(&self, lb: LbId) -> DbResult<()> {
        let mut inner = self.lock();
        let lb = inner
            .lbs
            .get_mut(&lb)
            .ok_or_else(|| DbError::NotFound(format!("load balancer {lb}")))?;
        lb.device_ids.clear();
        Ok(())
    }

    async fn set_device_status(&self, device: DeviceId, status: DeviceStatus) -> DbResult<()> {
        let mut inner = self.lock();
        let device = inner
            .devices
            .get_mut(&device)
            .ok_or_else(|| DbError::NotFound(format!("device {device}")))?;
        device.status = status;
        Ok(())
    }

    async fn set_device_diagnostic(&self, device: DeviceId, message: &str) -> DbResult<()> {
        let mut inner = self.lock();
        let device = inner
            .devices
            .get_mut(&device)
            .ok_or_else(|| DbError::NotFound(format!("device {device}")))?;
        device.errmsg = Some(message.to_string());
        Ok(())
    }

    async fn propagate_error(&self, device: DeviceId, message: &str) -> DbResult<()> {
        let mut inner = self.lock();
        if let Some(dev) = inner.devices.get_mut(&device) {
            dev.status = DeviceStatus::Error;
            dev.errmsg = Some(message.to_string());
        }
        for lb in inner.lbs.values_mut() {
            if lb.device_ids.contains(&device) && lb.status != LbStatus::Deleted {
                lb.status = LbStatus::Error;
                lb.errmsg = Some(message.to_string());
            }
        }
        Ok(())
    }
}

#[async_trait]
impl SessionSource for MemoryRepository {
    async fn open(&self) -> DbResult<Box<dyn LbRepository>> {
        Ok(Box::new(self.clone()))
    }
}
