//! CLI command handlers

pub mod commands;

pub use commands::{add, check, eval, list, run, stats, watch};
