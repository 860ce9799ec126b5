//! # Order Info Service
//!
//! Wires the order crates into a running process:
//!
//! - [`config`]: environment-driven configuration
//! - [`api`]: axum router for order reads, health and metrics
//! - [`error`]: HTTP error mapping for the order error taxonomy
//!
//! The binary (`src/main.rs`) owns startup and graceful shutdown.

#![forbid(unsafe_code)]

pub mod api;
pub mod config;
pub mod error;

pub use api::{AppState, router};
pub use config::Config;
pub use error::ApiError;
