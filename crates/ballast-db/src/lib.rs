//! ballast-db — failover-aware database access.
//!
//! All persistence flows through a [`FailoverPool`]: one engine per
//! configured replica, a sticky selection cached for a bounded window,
//! and a liveness-probed acquisition path that re-randomizes on failure.
//! Entity access happens through the [`LbRepository`] trait; production
//! uses [`PgRepository`] over a pooled session, tests use the in-process
//! [`MemoryRepository`].

pub mod error;
pub mod failover;
pub mod memory;
pub mod repository;

pub use error::{DbError, DbResult};
pub use failover::{Connector, FailoverPool, PgConnector, PgSession};
pub use memory::MemoryRepository;
pub use repository::{LbRepository, LbSnapshot, PgRepository, SessionSource, SnapshotNode};
