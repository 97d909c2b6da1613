use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value as JsonValue};
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

pub type FormulaId = u64;
pub type TestCaseId = u64;

/// Ordered input mapping (`name -> JSON value`) for a test case
pub type InputData = Map<String, JsonValue>;

//==============================================================================
// Formula
//==============================================================================

/// A user-authored pricing formula
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Formula {
    pub id: FormulaId,
    pub name: String,
    pub source_code: String,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub tags: BTreeSet<String>,
    #[serde(default)]
    pub usage_count: u64,
    #[serde(default)]
    pub average_rating: Option<f64>,
}

impl Formula {
    pub fn new(id: FormulaId, name: impl Into<String>, source_code: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            source_code: source_code.into(),
            category: None,
            tags: BTreeSet::new(),
            usage_count: 0,
            average_rating: None,
        }
    }
}

//==============================================================================
// Test Cases
//==============================================================================

/// Outcome of the most recent run of a test case
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
#[serde(rename_all = "lowercase")]
pub enum TestStatus {
    #[default]
    Pending,
    Passed,
    Failed,
    Error,
}

impl TestStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            TestStatus::Pending => "pending",
            TestStatus::Passed => "passed",
            TestStatus::Failed => "failed",
            TestStatus::Error => "error",
        }
    }
}

impl fmt::Display for TestStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TestStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "pending" => Ok(TestStatus::Pending),
            "passed" => Ok(TestStatus::Passed),
            "failed" => Ok(TestStatus::Failed),
            "error" => Ok(TestStatus::Error),
            other => Err(format!(
                "unknown status '{}' (expected pending, passed, failed or error)",
                other
            )),
        }
    }
}

/// A named test case pinned to one formula
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TestCase {
    pub id: TestCaseId,
    /// Implied by the enclosing formula in suite files
    #[serde(default)]
    pub formula_id: FormulaId,
    pub name: String,
    #[serde(default)]
    pub input_data: InputData,
    /// `None` means "no expectation"; `Some(Null)` expects a null result
    #[serde(
        default,
        deserialize_with = "present_value",
        skip_serializing_if = "Option::is_none"
    )]
    pub expected_result: Option<JsonValue>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub actual_result: Option<JsonValue>,
    #[serde(default)]
    pub status: TestStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub execution_time_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_run_at: Option<DateTime<Utc>>,
    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,
}

/// Maps any present value, `null` included, to `Some`.
/// Combined with `#[serde(default)]`, a missing field stays `None`.
pub(crate) fn present_value<'de, D>(deserializer: D) -> Result<Option<JsonValue>, D::Error>
where
    D: Deserializer<'de>,
{
    JsonValue::deserialize(deserializer).map(Some)
}

impl TestCase {
    /// A new, never-run test case
    pub fn new(
        id: TestCaseId,
        formula_id: FormulaId,
        name: impl Into<String>,
        input_data: InputData,
        expected_result: Option<JsonValue>,
    ) -> Self {
        Self {
            id,
            formula_id,
            name: name.into(),
            input_data,
            expected_result,
            actual_result: None,
            status: TestStatus::Pending,
            execution_time_ms: None,
            error_message: None,
            last_run_at: None,
            created_at: Utc::now(),
        }
    }

    /// Forget the last run's outcome. `last_run_at` is kept as history.
    pub fn reset(&mut self) {
        self.status = TestStatus::Pending;
        self.actual_result = None;
        self.execution_time_ms = None;
        self.error_message = None;
    }

    /// True when `other` was evaluated against the same inputs and expectation
    pub fn same_scenario(&self, other: &TestCase) -> bool {
        self.input_data == other.input_data && self.expected_result == other.expected_result
    }

    /// Copy the run outcome fields of `run`, leaving everything else untouched
    pub fn record_outcome(&mut self, run: &TestCase) {
        self.status = run.status;
        self.actual_result = run.actual_result.clone();
        self.execution_time_ms = run.execution_time_ms;
        self.error_message = run.error_message.clone();
        self.last_run_at = run.last_run_at;
    }

    /// Apply an edit; changing inputs or expectation resets the case to pending
    pub fn apply(&mut self, update: TestCaseUpdate) {
        let mut invalidated = false;

        if let Some(name) = update.name {
            self.name = name;
        }
        if let Some(input_data) = update.input_data {
            invalidated |= input_data != self.input_data;
            self.input_data = input_data;
        }
        if let Some(expected) = update.expected_result {
            invalidated |= expected != self.expected_result;
            self.expected_result = expected;
        }

        if invalidated {
            self.reset();
        }
    }
}

/// Partial edit of a test case. Each `None` leaves the field untouched.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct TestCaseUpdate {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub input_data: Option<InputData>,
    /// `Some(None)` removes the expectation
    #[serde(default, deserialize_with = "present_expectation")]
    pub expected_result: Option<Option<JsonValue>>,
}

/// A present `null` sets "no expectation"; omit the field to leave it untouched
fn present_expectation<'de, D>(deserializer: D) -> Result<Option<Option<JsonValue>>, D::Error>
where
    D: Deserializer<'de>,
{
    Option::<JsonValue>::deserialize(deserializer).map(Some)
}

//==============================================================================
// Listing
//==============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortBy {
    Name,
    #[default]
    CreatedAt,
    Status,
    LastRunAt,
    ExecutionTime,
}

impl FromStr for SortBy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "name" => Ok(SortBy::Name),
            "created_at" => Ok(SortBy::CreatedAt),
            "status" => Ok(SortBy::Status),
            "last_run_at" => Ok(SortBy::LastRunAt),
            "execution_time" => Ok(SortBy::ExecutionTime),
            other => Err(format!("unknown sort key '{}'", other)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    #[default]
    Asc,
    Desc,
}

impl FromStr for SortOrder {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "asc" => Ok(SortOrder::Asc),
            "desc" => Ok(SortOrder::Desc),
            other => Err(format!("unknown sort order '{}' (expected asc or desc)", other)),
        }
    }
}

/// Filter and ordering for listing a formula's test cases
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestCaseFilter {
    #[serde(default)]
    pub status: Option<TestStatus>,
    #[serde(default)]
    pub sort_by: SortBy,
    #[serde(default)]
    pub sort_order: SortOrder,
}

impl TestCaseFilter {
    pub fn with_status(status: TestStatus) -> Self {
        Self {
            status: Some(status),
            ..Self::default()
        }
    }

    /// Filter and sort `cases` in place. Ties keep id order, so the result is stable.
    pub fn apply(&self, cases: &mut Vec<TestCase>) {
        if let Some(status) = self.status {
            cases.retain(|tc| tc.status == status);
        }
        cases.sort_by_key(|tc| tc.id);
        cases.sort_by(|a, b| {
            let ordering = match self.sort_by {
                SortBy::Name => a.name.cmp(&b.name),
                SortBy::CreatedAt => a.created_at.cmp(&b.created_at),
                SortBy::Status => a.status.cmp(&b.status),
                SortBy::LastRunAt => a.last_run_at.cmp(&b.last_run_at),
                SortBy::ExecutionTime => a.execution_time_ms.cmp(&b.execution_time_ms),
            };
            match self.sort_order {
                SortOrder::Asc => ordering,
                SortOrder::Desc => ordering.reverse(),
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn case(id: TestCaseId, name: &str) -> TestCase {
        TestCase::new(id, 1, name, InputData::new(), None)
    }

    #[test]
    fn test_status_serializes_lowercase() {
        assert_eq!(serde_json::to_value(TestStatus::Passed).unwrap(), json!("passed"));
        let status: TestStatus = serde_json::from_value(json!("error")).unwrap();
        assert_eq!(status, TestStatus::Error);
        assert_eq!("FAILED".parse::<TestStatus>().unwrap(), TestStatus::Failed);
        assert!("unknown".parse::<TestStatus>().is_err());
    }

    #[test]
    fn test_expected_null_differs_from_missing() {
        let with_null: TestCase = serde_json::from_value(json!({
            "id": 1, "formula_id": 1, "name": "n",
            "expected_result": null,
            "created_at": "2024-01-01T00:00:00Z"
        }))
        .unwrap();
        assert_eq!(with_null.expected_result, Some(JsonValue::Null));

        let without: TestCase = serde_json::from_value(json!({
            "id": 1, "formula_id": 1, "name": "n",
            "created_at": "2024-01-01T00:00:00Z"
        }))
        .unwrap();
        assert_eq!(without.expected_result, None);
        assert_eq!(without.status, TestStatus::Pending);
    }

    #[test]
    fn test_input_data_keeps_order() {
        let tc: TestCase = serde_json::from_value(json!({
            "id": 1, "formula_id": 1, "name": "n",
            "input_data": {"width": 1, "height": 2, "base_price": 3},
            "created_at": "2024-01-01T00:00:00Z"
        }))
        .unwrap();
        let keys: Vec<&String> = tc.input_data.keys().collect();
        assert_eq!(keys, ["width", "height", "base_price"]);
    }

    #[test]
    fn test_editing_inputs_resets_to_pending() {
        let mut tc = case(1, "a");
        tc.status = TestStatus::Passed;
        tc.actual_result = Some(json!(150));
        tc.execution_time_ms = Some(2);
        let ran_at = Utc::now();
        tc.last_run_at = Some(ran_at);

        tc.apply(TestCaseUpdate {
            input_data: Some(json!({"base_price": 200}).as_object().cloned().unwrap()),
            ..Default::default()
        });

        assert_eq!(tc.status, TestStatus::Pending);
        assert_eq!(tc.actual_result, None);
        assert_eq!(tc.execution_time_ms, None);
        assert_eq!(tc.last_run_at, Some(ran_at));
    }

    #[test]
    fn test_renaming_keeps_status() {
        let mut tc = case(1, "a");
        tc.status = TestStatus::Failed;
        tc.apply(TestCaseUpdate {
            name: Some("renamed".to_string()),
            ..Default::default()
        });
        assert_eq!(tc.name, "renamed");
        assert_eq!(tc.status, TestStatus::Failed);
    }

    #[test]
    fn test_update_expectation_parsing() {
        let clear: TestCaseUpdate =
            serde_json::from_value(json!({"expected_result": null})).unwrap();
        assert_eq!(clear.expected_result, Some(None));

        let untouched: TestCaseUpdate = serde_json::from_value(json!({"name": "x"})).unwrap();
        assert_eq!(untouched.expected_result, None);

        let set: TestCaseUpdate = serde_json::from_value(json!({"expected_result": 5})).unwrap();
        assert_eq!(set.expected_result, Some(Some(json!(5))));
    }

    #[test]
    fn test_filter_sorts_and_filters() {
        let mut a = case(1, "charlie");
        a.status = TestStatus::Passed;
        a.execution_time_ms = Some(5);
        let mut b = case(2, "alpha");
        b.status = TestStatus::Error;
        let mut c = case(3, "bravo");
        c.status = TestStatus::Passed;
        c.execution_time_ms = Some(1);

        let mut cases = vec![a.clone(), b.clone(), c.clone()];
        TestCaseFilter {
            sort_by: SortBy::Name,
            ..Default::default()
        }
        .apply(&mut cases);
        let names: Vec<&str> = cases.iter().map(|tc| tc.name.as_str()).collect();
        assert_eq!(names, ["alpha", "bravo", "charlie"]);

        let mut cases = vec![a.clone(), b.clone(), c.clone()];
        TestCaseFilter {
            status: Some(TestStatus::Passed),
            sort_by: SortBy::ExecutionTime,
            sort_order: SortOrder::Desc,
        }
        .apply(&mut cases);
        let ids: Vec<TestCaseId> = cases.iter().map(|tc| tc.id).collect();
        assert_eq!(ids, [1, 3]);
    }

    #[test]
    fn test_sort_keys_parse() {
        assert_eq!("last_run_at".parse::<SortBy>().unwrap(), SortBy::LastRunAt);
        assert_eq!("DESC".parse::<SortOrder>().unwrap(), SortOrder::Desc);
        assert!("price".parse::<SortBy>().is_err());
    }
}
