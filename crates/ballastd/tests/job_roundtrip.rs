//! Dispatcher-to-worker round trips.
//!
//! Runs a real worker job endpoint on a loopback port and drives it
//! through the dispatcher's HTTP transport, asserting the persisted
//! entity statuses on both the success and failure paths.

use std::sync::Arc;

use async_trait::async_trait;

use ballast_core::types::{Device, DeviceStatus, LbStatus, LoadBalancer, Node};
use ballast_core::wire::Algorithm;
use ballast_db::MemoryRepository;
use ballast_dispatch::{DispatchJob, HttpJobTransport, JobDispatcher};
use ballast_driver::{Capability, DeviceDriver, NullDriver};
use ballast_worker::{DriverFactory, build_router};

/// A driver that accepts CREATE batches without touching any device
/// software.
struct AcceptingDriver;

#[async_trait]
impl DeviceDriver for AcceptingDriver {
    fn set_protocol(&mut self, _protocol: &str) -> Capability<()> {
        Capability::Ok(())
    }

    fn set_algorithm(&mut self, _algorithm: Algorithm) -> Capability<()> {
        Capability::Ok(())
    }

    fn bind(&mut self, _address: &str, _port: u16) -> Capability<()> {
        Capability::Ok(())
    }

    fn add_server(&mut self, _address: &str, _port: u16, _weight: u32) -> Capability<()> {
        Capability::Ok(())
    }

    async fn create(&mut self) -> Capability<()> {
        Capability::Ok(())
    }
}

async fn serve_worker(factory: DriverFactory) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, build_router(factory)).await.unwrap();
    });
    addr.to_string()
}

fn seeded_repository() -> MemoryRepository {
    let repo = MemoryRepository::new();
    repo.insert_device(Device {
        id: 7,
        name: "device-7".to_string(),
        floating_ip: "10.1.0.1".to_string(),
        public_ip: "203.0.113.1".to_string(),
        status: DeviceStatus::Active,
        az: 1,
        device_type: "haproxy".to_string(),
        errmsg: None,
    });
    repo.insert_load_balancer(LoadBalancer {
        id: 1,
        name: "web".to_string(),
        protocol: "HTTP".to_string(),
        algorithm: "ROUND_ROBIN".to_string(),
        port: 80,
        status: LbStatus::Build,
        errmsg: None,
        tenant_id: "tenant-1".to_string(),
        nodes: vec![Node {
            id: 10,
            address: "10.0.0.1".to_string(),
            port: 80,
            weight: 1,
            enabled: true,
            status: "ONLINE".to_string(),
        }],
        monitor: None,
        device_ids: vec![7],
    });
    repo
}

#[tokio::test]
async fn update_round_trip_activates_the_load_balancer() {
    let host = serve_worker(Arc::new(|| Box::new(AcceptingDriver) as Box<dyn DeviceDriver>)).await;
    let repo = seeded_repository();

    let dispatcher = JobDispatcher::new(Arc::new(repo.clone()), Arc::new(HttpJobTransport::new()));
    let handle = dispatcher.submit(&host, DispatchJob::Update { device_id: 7 }, 1);
    handle.await.unwrap();

    assert_eq!(repo.load_balancer(1).unwrap().status, LbStatus::Active);
    assert_eq!(repo.device(7).unwrap().status, DeviceStatus::Active);
}

#[tokio::test]
async fn unsupported_worker_action_propagates_error_statuses() {
    let host = serve_worker(Arc::new(|| Box::new(NullDriver) as Box<dyn DeviceDriver>)).await;
    let repo = seeded_repository();

    let dispatcher = JobDispatcher::new(Arc::new(repo.clone()), Arc::new(HttpJobTransport::new()));
    // The only load balancer is deleting, so the worker sees a DELETE —
    // which the null driver does not support.
    let handle = dispatcher.submit(&host, DispatchJob::Delete { device_id: 7 }, 1);
    handle.await.unwrap();

    let device = repo.device(7).unwrap();
    assert_eq!(device.status, DeviceStatus::Error);
    assert_eq!(
        device.errmsg.as_deref(),
        Some("Selected driver does not support DELETE action.")
    );
    let lb = repo.load_balancer(1).unwrap();
    assert_eq!(lb.status, LbStatus::Error);
}

#[tokio::test]
async fn unreachable_worker_yields_generic_system_error() {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap().to_string();
    drop(listener);

    let repo = seeded_repository();
    let transport = HttpJobTransport::with_limits(2, std::time::Duration::from_secs(5));
    let dispatcher = JobDispatcher::new(Arc::new(repo.clone()), Arc::new(transport));

    dispatcher
        .submit(&addr, DispatchJob::Update { device_id: 7 }, 1)
        .await
        .unwrap();

    assert_eq!(
        repo.device(7).unwrap().errmsg.as_deref(),
        Some("System error communicating with load balancer")
    );
    assert_eq!(repo.load_balancer(1).unwrap().status, LbStatus::Error);
}
