//! # postcraft-api
//!
//! HTTP surface for pricing, coupon redemption, post scheduling, and the
//! dispatch trigger. The binary in `main.rs` wires configuration, the
//! database and the dispatcher together and serves [`routes::build_router`].

pub mod config;
pub mod error;
pub mod extract;
pub mod routes;
pub mod state;

pub use config::{ApiConfig, ConfigError};
pub use error::{ApiError, ApiResult};
pub use routes::build_router;
pub use state::AppState;
