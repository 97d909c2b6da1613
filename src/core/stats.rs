//! Pass rate and variable coverage for a formula's test cases

use serde::{Deserialize, Serialize};

use super::formula::FormulaEngine;
use crate::types::{Formula, FormulaId, TestCase, TestStatus};

/// Aggregate view of one formula's test cases
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FormulaStats {
    pub formula_id: FormulaId,
    pub total: usize,
    pub passed: usize,
    pub failed: usize,
    pub pending: usize,
    pub error: usize,
    /// passed / (passed + failed + error) * 100, or 0 when nothing has run
    pub pass_rate: f64,
    /// Percentage of referenced variables supplied by at least one test case
    pub coverage: f64,
    /// Variables the formula references, in order of first appearance
    pub variables: Vec<String>,
    /// Referenced variables no test case supplies
    pub uncovered_variables: Vec<String>,
}

/// Compute stats from persisted test-case states.
///
/// The formula is compiled only to find its variables. A formula that does not compile has
/// coverage 0; one that references no variables has coverage 100.
pub fn aggregate(formula: &Formula, cases: &[TestCase], engine: &FormulaEngine) -> FormulaStats {
    let count = |status: TestStatus| cases.iter().filter(|tc| tc.status == status).count();
    let passed = count(TestStatus::Passed);
    let failed = count(TestStatus::Failed);
    let pending = count(TestStatus::Pending);
    let error = count(TestStatus::Error);

    let executed = passed + failed + error;
    let pass_rate = if executed == 0 {
        0.0
    } else {
        passed as f64 / executed as f64 * 100.0
    };

    let (variables, uncovered_variables, coverage) = match engine.compile(&formula.source_code) {
        Err(_) => (Vec::new(), Vec::new(), 0.0),
        Ok(expr) => {
            let variables = expr.referenced_variables();
            let uncovered: Vec<String> = variables
                .iter()
                .filter(|name| !cases.iter().any(|tc| tc.input_data.contains_key(name.as_str())))
                .cloned()
                .collect();
            let coverage = if variables.is_empty() {
                100.0
            } else {
                (variables.len() - uncovered.len()) as f64 / variables.len() as f64 * 100.0
            };
            (variables, uncovered, coverage)
        }
    };

    FormulaStats {
        formula_id: formula.id,
        total: cases.len(),
        passed,
        failed,
        pending,
        error,
        pass_rate,
        coverage,
        variables,
        uncovered_variables,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::InputData;
    use serde_json::json;

    fn case(id: u64, status: TestStatus, input: serde_json::Value) -> TestCase {
        let mut tc = TestCase::new(
            id,
            1,
            format!("case {}", id),
            input.as_object().cloned().unwrap_or_default(),
            None,
        );
        tc.status = status;
        tc
    }

    #[test]
    fn test_counts_and_pass_rate() {
        let formula = Formula::new(1, "Area", "width * height / 10000");
        let cases = vec![
            case(1, TestStatus::Passed, json!({"width": 1, "height": 1})),
            case(2, TestStatus::Passed, json!({})),
            case(3, TestStatus::Failed, json!({})),
            case(4, TestStatus::Error, json!({})),
            case(5, TestStatus::Pending, json!({})),
        ];
        let stats = aggregate(&formula, &cases, &FormulaEngine::default());

        assert_eq!(stats.total, 5);
        assert_eq!(stats.passed, 2);
        assert_eq!(stats.failed, 1);
        assert_eq!(stats.error, 1);
        assert_eq!(stats.pending, 1);
        // pending cases are excluded from the denominator
        assert_eq!(stats.pass_rate, 50.0);
    }

    #[test]
    fn test_pass_rate_zero_when_nothing_ran() {
        let formula = Formula::new(1, "Fee", "base_price + 50");
        let cases = vec![case(1, TestStatus::Pending, json!({}))];
        let stats = aggregate(&formula, &cases, &FormulaEngine::default());
        assert_eq!(stats.pass_rate, 0.0);

        let stats = aggregate(&formula, &[], &FormulaEngine::default());
        assert_eq!(stats.total, 0);
        assert_eq!(stats.pass_rate, 0.0);
    }

    #[test]
    fn test_coverage_counts_variables_across_cases() {
        let formula = Formula::new(1, "Surcharge", "IF(width > 500, base_price * 1.5, base_price)");
        let cases = vec![case(1, TestStatus::Pending, json!({"width": 600}))];
        let stats = aggregate(&formula, &cases, &FormulaEngine::default());
        assert_eq!(stats.variables, vec!["width", "base_price"]);
        assert_eq!(stats.uncovered_variables, vec!["base_price"]);
        assert_eq!(stats.coverage, 50.0);

        let cases = vec![
            case(1, TestStatus::Pending, json!({"width": 600})),
            case(2, TestStatus::Pending, json!({"base_price": 100})),
        ];
        let stats = aggregate(&formula, &cases, &FormulaEngine::default());
        assert_eq!(stats.coverage, 100.0);
        assert!(stats.uncovered_variables.is_empty());
    }

    #[test]
    fn test_coverage_edge_cases() {
        let engine = FormulaEngine::default();

        let constant = Formula::new(1, "Constant", "42");
        assert_eq!(aggregate(&constant, &[], &engine).coverage, 100.0);

        let broken = Formula::new(2, "Broken", "SQRT(width)");
        let cases = vec![case(1, TestStatus::Error, json!({"width": 4}))];
        let stats = aggregate(&broken, &cases, &engine);
        assert_eq!(stats.coverage, 0.0);
        assert!(stats.variables.is_empty());

        let unused_only = Formula::new(3, "Fee", "base_price + 50");
        let cases = vec![TestCase::new(1, 3, "x", InputData::new(), None)];
        assert_eq!(aggregate(&unused_only, &cases, &engine).coverage, 0.0);
    }
}
