// Test code patterns:
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! BizReport shared crate
//!
//! Domain records and the persistence layer shared by the API server,
//! the billing crate and the background worker.
//!
//! ## Backends
//!
//! - **PostgreSQL** (`PgStore`): production backend, all counter updates are
//!   single SQL statements or short transactions
//! - **Memory** (`MemoryStore`): single-process backend for tests and local runs

pub mod db;
pub mod error;
pub mod memory;
pub mod postgres;
pub mod store;
pub mod types;

pub use db::{create_pool, run_migrations};
pub use error::{StoreError, StoreResult};
pub use memory::MemoryStore;
pub use postgres::PgStore;
pub use store::{DynStore, Store};
pub use types::{
    ReportRequest, ReportStatus, ReservationOutcome, Team, TeamMember, WorkflowHistoryEntry,
};
