//! Suite file storage tests
//!
//! Runs the harness against YAML suite files in temporary directories and checks that
//! results, edits and deletes are written back.

use pretty_assertions::assert_eq;
use pricing_forge::core::{HarnessConfig, TestRunner};
use pricing_forge::storage::{Store, YamlStore};
use pricing_forge::types::{SortBy, SortOrder, TestCaseFilter, TestStatus};
use pricing_forge::StorageError;
use serde_json::json;
use std::fs;
use std::path::PathBuf;
use std::sync::Arc;
use std::thread;
use tempfile::TempDir;

fn copy_suite(name: &str) -> (TempDir, PathBuf) {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join(name);
    fs::copy(
        format!("{}/test-data/{}", env!("CARGO_MANIFEST_DIR"), name),
        &path,
    )
    .unwrap();
    (dir, path)
}

#[test]
fn test_run_results_are_written_back() {
    let (_dir, path) = copy_suite("pricing_suite.yaml");
    {
        let store = YamlStore::open(&path).unwrap();
        let runner = TestRunner::new(&store, HarnessConfig::default());
        for formula in store.list_formulas().unwrap() {
            assert!(runner.run_all(formula.id).unwrap().all_passed());
        }
    }

    let reopened = YamlStore::open(&path).unwrap();
    let tc = reopened.load_test_case(3).unwrap();
    assert_eq!(tc.status, TestStatus::Passed);
    assert_eq!(tc.actual_result, Some(json!(48)));
    assert!(tc.last_run_at.is_some());

    let content = fs::read_to_string(&path).unwrap();
    assert!(content.contains("status: passed"));
}

#[test]
fn test_failing_suite_records_errors() {
    let (_dir, path) = copy_suite("failing_suite.yaml");
    let store = YamlStore::open(&path).unwrap();
    let runner = TestRunner::new(&store, HarnessConfig::default());

    let unit = runner.run_all(1).unwrap();
    assert_eq!(unit.error, 1);
    let surcharged = runner.run_all(2).unwrap();
    assert_eq!(surcharged.error, 1);
    assert_eq!(surcharged.failed, 1);

    let reopened = YamlStore::open(&path).unwrap();
    let tc = reopened.load_test_case(1).unwrap();
    assert_eq!(tc.status, TestStatus::Error);
    assert_eq!(
        tc.error_message.as_deref(),
        Some("DivisionByZero: Division by zero")
    );
    assert_eq!(tc.actual_result, None);
}

#[test]
fn test_added_test_cases_get_fresh_ids() {
    let (_dir, path) = copy_suite("pricing_suite.yaml");
    let store = YamlStore::open(&path).unwrap();
    let runner = TestRunner::new(&store, HarnessConfig::default());

    let input = json!({"base_price": 1}).as_object().cloned().unwrap();
    let tc = runner.add_test_case(1, "new", input, Some(json!(51))).unwrap();
    assert_eq!(tc.id, 6);

    let reopened = YamlStore::open(&path).unwrap();
    assert_eq!(reopened.load_test_case(6).unwrap().name, "new");
    assert_eq!(reopened.next_test_case_id().unwrap(), 7);
}

#[test]
fn test_list_sorting_and_filtering() {
    let (_dir, path) = copy_suite("pricing_suite.yaml");
    let store = YamlStore::open(&path).unwrap();

    let by_name_desc = store
        .list_test_cases(
            3,
            &TestCaseFilter {
                status: None,
                sort_by: SortBy::Name,
                sort_order: SortOrder::Desc,
            },
        )
        .unwrap();
    let names: Vec<&str> = by_name_desc.iter().map(|tc| tc.name.as_str()).collect();
    assert_eq!(names, ["wide panel", "narrow panel"]);

    let failed = store
        .list_test_cases(3, &TestCaseFilter::with_status(TestStatus::Failed))
        .unwrap();
    assert!(failed.is_empty());
}

#[test]
fn test_missing_file() {
    let dir = TempDir::new().unwrap();
    let err = YamlStore::open(dir.path().join("nope.yaml")).unwrap_err();
    assert!(matches!(err, StorageError::Io(_)));
}

#[test]
fn test_malformed_yaml() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("bad.yaml");
    fs::write(&path, "formulas: [unclosed").unwrap();
    assert!(matches!(YamlStore::open(&path), Err(StorageError::Yaml(_))));
}

#[test]
fn test_store_is_shared_across_threads() {
    let (_dir, path) = copy_suite("pricing_suite.yaml");
    let store: Arc<dyn Store> = Arc::new(YamlStore::open(&path).unwrap());

    let handles: Vec<_> = (1..=5)
        .map(|id| {
            let store = Arc::clone(&store);
            thread::spawn(move || {
                let runner = TestRunner::new(store.as_ref(), HarnessConfig::default());
                runner.run_test(id).unwrap().status
            })
        })
        .collect();

    for handle in handles {
        assert_eq!(handle.join().unwrap(), TestStatus::Passed);
    }

    let reopened = YamlStore::open(&path).unwrap();
    for id in 1..=5 {
        assert_eq!(reopened.load_test_case(id).unwrap().status, TestStatus::Passed);
    }
}
