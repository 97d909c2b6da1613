//! Pricing Forge - sandboxed pricing formulas with a persistent test harness
//!
//! This library evaluates user-authored pricing formulas (`base_price * 1.5`,
//! `IF(width > 500, ..., ...)`) without executing host code, and runs named test cases
//! against them, recording pass/fail/error outcomes.
//!
//! # Features
//!
//! - Small expression language: arithmetic, comparisons, logic, ternary, ROUND/MIN/MAX/ABS/IF
//! - Bounded evaluation: AST depth cap and node-visit budget
//! - Strict typing with no implicit coercion (`"5" == 5` is false)
//! - Relative-tolerance numeric comparison
//! - Pass rate and variable coverage per formula
//! - YAML suite files validated with JSON Schema, CLI and HTTP API
//!
//! # Example
//!
//! ```
//! use pricing_forge::core::{HarnessConfig, TestRunner};
//! use pricing_forge::storage::MemoryStore;
//! use pricing_forge::types::{Formula, TestStatus};
//! use serde_json::json;
//!
//! let store = MemoryStore::new();
//! store.insert_formula(Formula::new(1, "Flat fee", "base_price + 50"))?;
//!
//! let runner = TestRunner::new(&store, HarnessConfig::default());
//! let input = json!({"base_price": 100}).as_object().cloned().unwrap_or_default();
//! let test_case = runner.add_test_case(1, "basic", input, Some(json!(150)))?;
//!
//! let result = runner.run_test(test_case.id)?;
//! assert_eq!(result.status, TestStatus::Passed);
//! # Ok::<(), pricing_forge::error::HarnessError>(())
//! ```

pub mod api;
pub mod cli;
pub mod core;
pub mod error;
pub mod storage;
pub mod types;

// Re-export commonly used types
pub use error::{HarnessError, HarnessResult, StorageError};
pub use types::{Formula, TestCase, TestCaseFilter, TestStatus};
