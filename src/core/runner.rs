//! Test runner: evaluates test cases against their formula and records the outcome
//!
//! Every run re-reads the formula and re-parses its current source, so edits to a formula
//! are picked up immediately and no compiled state is shared between runs. Formula errors
//! never escape a run; they are recorded on the test case as `status = error`.

use std::time::Instant;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use tracing::{debug, info};

use super::comparator::{self, Comparison, DEFAULT_EPSILON};
use super::formula::{EngineLimits, FormulaEngine, FormulaError, Value};
use super::stats::{self, FormulaStats};
use crate::error::{HarnessError, HarnessResult, StorageError};
use crate::storage::Store;
use crate::types::{
    Formula, FormulaId, InputData, TestCase, TestCaseFilter, TestCaseId, TestCaseUpdate,
    TestStatus,
};

/// Runner settings
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct HarnessConfig {
    pub limits: EngineLimits,
    /// Relative tolerance for numeric comparison
    pub epsilon: f64,
}

impl Default for HarnessConfig {
    fn default() -> Self {
        Self {
            limits: EngineLimits::default(),
            epsilon: DEFAULT_EPSILON,
        }
    }
}

/// Result of running every test case of a formula
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchResult {
    pub formula_id: FormulaId,
    pub total: usize,
    pub passed: usize,
    pub failed: usize,
    pub error: usize,
    pub results: Vec<TestCase>,
}

impl BatchResult {
    /// True when every test case passed
    pub fn all_passed(&self) -> bool {
        self.failed == 0 && self.error == 0
    }
}

/// Diagnostics for a formula source, without running it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FormulaCheck {
    pub valid: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_code: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub variables: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub depth: Option<usize>,
}

pub struct TestRunner<'a, S: Store + ?Sized> {
    store: &'a S,
    engine: FormulaEngine,
    epsilon: f64,
}

impl<'a, S: Store + ?Sized> TestRunner<'a, S> {
    pub fn new(store: &'a S, config: HarnessConfig) -> Self {
        Self {
            store,
            engine: FormulaEngine::new(config.limits),
            epsilon: config.epsilon,
        }
    }

    pub fn engine(&self) -> &FormulaEngine {
        &self.engine
    }

    /// Run one test case, persist and return its updated state.
    ///
    /// If the test case was edited while it ran, the outcome is dropped and the edited
    /// (pending) state is returned.
    pub fn run_test(&self, test_case_id: TestCaseId) -> HarnessResult<TestCase> {
        let mut test_case = self.store.load_test_case(test_case_id)?;
        let formula = self.store.load_formula(test_case.formula_id)?;

        self.execute(&formula, &mut test_case);
        Ok(self.store.record_outcome(&test_case)?)
    }

    /// Run every test case of a formula, sequentially in creation order
    pub fn run_all(&self, formula_id: FormulaId) -> HarnessResult<BatchResult> {
        let formula = self.store.load_formula(formula_id)?;
        let test_cases = self
            .store
            .list_test_cases(formula_id, &TestCaseFilter::default())?;

        let mut batch = BatchResult {
            formula_id,
            total: 0,
            passed: 0,
            failed: 0,
            error: 0,
            results: Vec::with_capacity(test_cases.len()),
        };

        for mut test_case in test_cases {
            self.execute(&formula, &mut test_case);
            let test_case = match self.store.record_outcome(&test_case) {
                Ok(stored) => stored,
                Err(StorageError::TestCaseNotFound(id)) => {
                    debug!(test_case_id = id, "test case deleted during run_all");
                    continue;
                }
                Err(e) => return Err(e.into()),
            };

            batch.total += 1;
            match test_case.status {
                TestStatus::Passed => batch.passed += 1,
                TestStatus::Failed => batch.failed += 1,
                TestStatus::Error => batch.error += 1,
                TestStatus::Pending => {}
            }
            batch.results.push(test_case);
        }

        info!(
            formula_id,
            total = batch.total,
            passed = batch.passed,
            failed = batch.failed,
            error = batch.error,
            "run_all finished"
        );
        Ok(batch)
    }

    /// Compare using the configured tolerance
    pub fn compare(&self, expected: Option<&JsonValue>, actual: &Value) -> Comparison {
        comparator::compare(expected, actual, self.epsilon)
    }

    /// Create a pending test case. The formula must compile.
    pub fn add_test_case(
        &self,
        formula_id: FormulaId,
        name: &str,
        input_data: InputData,
        expected_result: Option<JsonValue>,
    ) -> HarnessResult<TestCase> {
        let name = name.trim();
        if name.is_empty() {
            return Err(HarnessError::Validation(
                "test case name must not be empty".to_string(),
            ));
        }

        let formula = self.store.load_formula(formula_id)?;
        self.engine.compile(&formula.source_code)?;

        let id = self.store.next_test_case_id()?;
        let test_case = TestCase::new(id, formula_id, name, input_data, expected_result);
        self.store.save_test_case(&test_case)?;

        debug!(test_case_id = id, formula_id, "test case added");
        Ok(test_case)
    }

    /// Edit a test case. Changing inputs or expectation resets it to pending.
    pub fn update_test_case(
        &self,
        test_case_id: TestCaseId,
        update: TestCaseUpdate,
    ) -> HarnessResult<TestCase> {
        if update.name.as_deref().is_some_and(|n| n.trim().is_empty()) {
            return Err(HarnessError::Validation(
                "test case name must not be empty".to_string(),
            ));
        }

        let test_case = self.store.update_test_case(test_case_id, update)?;

        debug!(test_case_id, status = %test_case.status, "test case updated");
        Ok(test_case)
    }

    pub fn delete_test_case(&self, test_case_id: TestCaseId) -> HarnessResult<()> {
        self.store.delete_test_case(test_case_id)?;
        debug!(test_case_id, "test case deleted");
        Ok(())
    }

    /// Compile `source` and report diagnostics and referenced variables
    pub fn check_formula(&self, source: &str) -> FormulaCheck {
        match self.engine.compile(source) {
            Ok(expr) => FormulaCheck {
                valid: true,
                error_code: None,
                error: None,
                variables: expr.referenced_variables(),
                depth: Some(expr.depth()),
            },
            Err(e) => FormulaCheck {
                valid: false,
                error_code: Some(e.code().to_string()),
                error: Some(e.to_string()),
                variables: Vec::new(),
                depth: None,
            },
        }
    }

    /// Pass rate and coverage from the persisted test-case states
    pub fn stats(&self, formula_id: FormulaId) -> HarnessResult<FormulaStats> {
        let formula = self.store.load_formula(formula_id)?;
        let test_cases = self
            .store
            .list_test_cases(formula_id, &TestCaseFilter::default())?;
        Ok(stats::aggregate(&formula, &test_cases, &self.engine))
    }

    /// Evaluate, compare and record the outcome on `test_case`
    fn execute(&self, formula: &Formula, test_case: &mut TestCase) {
        let started = Instant::now();
        let outcome: Result<(Value, Comparison), FormulaError> = self
            .engine
            .compile(&formula.source_code)
            .and_then(|expr| self.engine.evaluate(&expr, &test_case.input_data))
            .map(|value| {
                let comparison = self.compare(test_case.expected_result.as_ref(), &value);
                (value, comparison)
            });
        let elapsed_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);

        test_case.last_run_at = Some(Utc::now());
        test_case.execution_time_ms = Some(elapsed_ms);

        match outcome {
            Ok((value, comparison)) => {
                test_case.status = if comparison.matched {
                    TestStatus::Passed
                } else {
                    TestStatus::Failed
                };
                test_case.actual_result = Some(value.to_json());
                test_case.error_message = None;
                debug!(
                    test_case_id = test_case.id,
                    status = %test_case.status,
                    reason = %comparison.reason,
                    elapsed_ms,
                    "test case ran"
                );
            }
            Err(e) => {
                test_case.status = TestStatus::Error;
                test_case.actual_result = None;
                test_case.error_message = Some(e.to_message());
                debug!(
                    test_case_id = test_case.id,
                    error = %e,
                    elapsed_ms,
                    "test case errored"
                );
            }
        }
    }
}
