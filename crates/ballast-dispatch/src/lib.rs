//! ballast-dispatch — asynchronous job dispatch to worker agents.
//!
//! `submit` is fire-and-forget: the call returns before the job is
//! sent, and the send-and-persist sequence runs as an independently
//! scheduled task with its own database session and transport
//! connection. Results are interpreted into a PASS/FAIL verdict and
//! persisted through the repository; no transport detail leaks to
//! tenants beyond generic system/timeout messages.

pub mod dispatcher;
pub mod transport;

pub use dispatcher::{ArchiveParams, DispatchJob, JobDispatcher};
pub use transport::{HttpJobTransport, JobTransport, TransportError};
