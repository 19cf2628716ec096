//! Skuflow service and CLI
//!
//! Exposes the HTTP surface, client and configuration for integration testing

pub mod cli;
pub mod client;
pub mod config;
pub mod errors;
pub mod metrics;
pub mod server;

pub use client::{ApiClient, ClientError, HttpStatusSource};
pub use config::AppConfig;
pub use errors::ApiError;
pub use server::{build_router, AppState};
