// Test code patterns:
#![cfg_attr(test, allow(clippy::expect_used))]
#![cfg_attr(test, allow(clippy::unwrap_used))]

//! BizReport API Library
//!
//! HTTP server components: configuration, authentication, the report
//! orchestrator and its outbound clients, and the routes. The background
//! worker links against this crate to resume interrupted reports.

pub mod auth;
pub mod config;
pub mod error;
pub mod reports;
pub mod routes;
pub mod state;
pub mod workflow;

pub use config::{Config, ConfigError};
pub use error::{ApiError, ApiResult};
pub use reports::{ReportError, ReportOrchestrator};
pub use routes::create_router;
pub use state::{AppState, StateError};
