//! Formula engine and test harness

pub mod comparator;
pub mod formula;
pub mod runner;
pub mod stats;

pub use comparator::{compare, Comparison, DEFAULT_EPSILON};
pub use formula::{EngineLimits, FormulaEngine, FormulaError, Value};
pub use runner::{BatchResult, FormulaCheck, HarnessConfig, TestRunner};
pub use stats::FormulaStats;
