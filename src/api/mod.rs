//! Pricing Forge API Server module
//!
//! Provides the HTTP REST API over a suite file.
//! Run with `pricing-forge-server`.

pub mod handlers;
pub mod server;

pub use server::{router, run_api_server};
