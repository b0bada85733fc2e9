// Test code patterns:
#![cfg_attr(test, allow(clippy::expect_used))]
#![cfg_attr(test, allow(clippy::unwrap_used))]

//! PrimeBot Server Library
//!
//! Discord and backup adapters, the admin HTTP surface and the sweep
//! scheduler around the membership engine.

pub mod backup_webhook;
pub mod config;
pub mod discord;
pub mod error;
pub mod routes;
pub mod scheduler;
pub mod state;

pub use config::{Config, ConfigError};
pub use error::{ApiError, ApiResult};
pub use state::AppState;
