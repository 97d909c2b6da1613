//! Suite files: formulas and their test cases in one YAML document
//!
//! ```yaml
//! _suite_version: "1.0"
//! formulas:
//!   - id: 1
//!     name: Flat fee
//!     source_code: base_price + 50
//!     test_cases:
//!       - id: 1
//!         name: basic
//!         input_data: { base_price: 100 }
//!         expected_result: 150
//! ```
//!
//! The file is validated against an embedded JSON Schema on load and rewritten after every
//! mutation, so run results survive between invocations. Rewrites go to a temporary file in
//! the same directory that then replaces the suite, so the suite on disk is always complete.

use std::collections::HashSet;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use jsonschema::JSONSchema;
use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;
use tracing::{debug, warn};

use super::{Records, StorageResult, Store};
use crate::error::StorageError;
use crate::types::{Formula, FormulaId, TestCase, TestCaseFilter, TestCaseId, TestCaseUpdate};

pub const SUITE_VERSION: &str = "1.0";

const SUITE_SCHEMA: &str = include_str!("../../schema/suite.schema.json");

#[derive(Debug, Serialize, Deserialize)]
struct SuiteFile {
    #[serde(rename = "_suite_version", default = "default_version")]
    version: String,
    #[serde(default)]
    formulas: Vec<SuiteFormula>,
}

fn default_version() -> String {
    SUITE_VERSION.to_string()
}

#[derive(Debug, Serialize, Deserialize)]
struct SuiteFormula {
    #[serde(flatten)]
    formula: Formula,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    test_cases: Vec<TestCase>,
}

/// Store backed by a suite file on disk
#[derive(Debug)]
pub struct YamlStore {
    path: PathBuf,
    records: RwLock<Records>,
}

impl YamlStore {
    /// Load and validate an existing suite file
    pub fn open(path: impl Into<PathBuf>) -> StorageResult<Self> {
        let path = path.into();
        let records = read_suite(&path)?;
        debug!(
            path = %path.display(),
            formulas = records.formulas.len(),
            test_cases = records.test_cases.len(),
            "suite loaded"
        );
        Ok(Self {
            path,
            records: RwLock::new(records),
        })
    }

    /// Open the suite at `path`, creating an empty one if the file does not exist
    pub fn open_or_create(path: impl Into<PathBuf>) -> StorageResult<Self> {
        let path = path.into();
        if !path.exists() {
            write_suite(&path, &Records::default())?;
        }
        Self::open(path)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Re-read the file, discarding in-memory state
    pub fn reload(&self) -> StorageResult<()> {
        let records = read_suite(&self.path)?;
        *self.write()? = records;
        Ok(())
    }

    fn read(&self) -> StorageResult<RwLockReadGuard<'_, Records>> {
        self.records.read().map_err(|_| StorageError::Poisoned)
    }

    fn write(&self) -> StorageResult<RwLockWriteGuard<'_, Records>> {
        self.records.write().map_err(|_| StorageError::Poisoned)
    }

    /// Apply a change to a copy of the records and write it back while holding the lock.
    /// The copy replaces the in-memory records only once the file write succeeded.
    fn mutate<T>(
        &self,
        change: impl FnOnce(&mut Records) -> StorageResult<T>,
    ) -> StorageResult<T> {
        let mut records = self.write()?;
        let mut staged = records.clone();
        let result = change(&mut staged)?;
        if let Err(e) = write_suite(&self.path, &staged) {
            warn!(path = %self.path.display(), error = %e, "failed to write suite");
            return Err(e);
        }
        *records = staged;
        Ok(result)
    }
}

impl Store for YamlStore {
    fn list_formulas(&self) -> StorageResult<Vec<Formula>> {
        Ok(self.read()?.formulas.values().cloned().collect())
    }

    fn load_formula(&self, id: FormulaId) -> StorageResult<Formula> {
        self.read()?.formula(id).cloned()
    }

    fn save_formula(&self, formula: &Formula) -> StorageResult<()> {
        self.mutate(|records| {
            records.save_formula(formula);
            Ok(())
        })
    }

    fn delete_formula(&self, id: FormulaId) -> StorageResult<()> {
        self.mutate(|records| records.delete_formula(id))
    }

    fn load_test_case(&self, id: TestCaseId) -> StorageResult<TestCase> {
        self.read()?.test_case(id).cloned()
    }

    fn list_test_cases(
        &self,
        formula_id: FormulaId,
        filter: &TestCaseFilter,
    ) -> StorageResult<Vec<TestCase>> {
        self.read()?.list_test_cases(formula_id, filter)
    }

    fn save_test_case(&self, test_case: &TestCase) -> StorageResult<()> {
        self.mutate(|records| records.save_test_case(test_case))
    }

    fn update_test_case(
        &self,
        id: TestCaseId,
        update: TestCaseUpdate,
    ) -> StorageResult<TestCase> {
        self.mutate(|records| records.update_test_case(id, update))
    }

    fn record_outcome(&self, run: &TestCase) -> StorageResult<TestCase> {
        self.mutate(|records| records.record_outcome(run))
    }

    fn delete_test_case(&self, id: TestCaseId) -> StorageResult<()> {
        self.mutate(|records| records.delete_test_case(id))
    }

    fn next_test_case_id(&self) -> StorageResult<TestCaseId> {
        self.write()?.next_test_case_id()
    }
}

/// Parse, validate and index a suite file
fn read_suite(path: &Path) -> StorageResult<Records> {
    let content = fs::read_to_string(path)?;
    let yaml: serde_yaml::Value = serde_yaml::from_str(&content)?;
    validate_against_schema(&yaml)?;

    let suite: SuiteFile = serde_yaml::from_value(yaml)?;

    let mut formula_ids = HashSet::new();
    let mut test_case_ids = HashSet::new();
    let mut formulas = Vec::with_capacity(suite.formulas.len());
    let mut test_cases = Vec::new();

    for entry in suite.formulas {
        let formula_id = entry.formula.id;
        if !formula_ids.insert(formula_id) {
            return Err(StorageError::Validation(format!(
                "duplicate formula id {}",
                formula_id
            )));
        }
        for mut tc in entry.test_cases {
            if !test_case_ids.insert(tc.id) {
                return Err(StorageError::Validation(format!(
                    "duplicate test case id {}",
                    tc.id
                )));
            }
            tc.formula_id = formula_id;
            test_cases.push(tc);
        }
        formulas.push(entry.formula);
    }

    Records::new(formulas, test_cases)
}

/// Serialize the records as a suite file, test cases nested under their formula in id order
fn write_suite(path: &Path, records: &Records) -> StorageResult<()> {
    let suite = SuiteFile {
        version: SUITE_VERSION.to_string(),
        formulas: records
            .formulas
            .values()
            .map(|formula| SuiteFormula {
                formula: formula.clone(),
                test_cases: records
                    .test_cases
                    .values()
                    .filter(|tc| tc.formula_id == formula.id)
                    .cloned()
                    .collect(),
            })
            .collect(),
    };

    let content = serde_yaml::to_string(&suite)?;

    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    let mut staged = NamedTempFile::new_in(dir)?;
    staged.write_all(content.as_bytes())?;
    if let Ok(metadata) = fs::metadata(path) {
        staged.as_file().set_permissions(metadata.permissions())?;
    }
    staged.persist(path).map_err(|e| StorageError::Io(e.error))?;

    debug!(path = %path.display(), "suite written");
    Ok(())
}

/// Validate suite YAML against the embedded JSON Schema
fn validate_against_schema(yaml: &serde_yaml::Value) -> StorageResult<()> {
    let schema_value: serde_json::Value = serde_json::from_str(SUITE_SCHEMA)
        .map_err(|e| StorageError::Validation(format!("Failed to parse schema: {}", e)))?;

    let compiled_schema = JSONSchema::compile(&schema_value)
        .map_err(|e| StorageError::Validation(format!("Failed to compile schema: {}", e)))?;

    // Convert YAML to JSON for validation
    let json_value: serde_json::Value = serde_json::to_value(yaml)
        .map_err(|e| StorageError::Validation(format!("Failed to convert YAML to JSON: {}", e)))?;

    if let Err(errors) = compiled_schema.validate(&json_value) {
        let error_messages: Vec<String> = errors.map(|e| format!("  - {}", e)).collect();
        return Err(StorageError::Validation(format!(
            "Schema validation failed:\n{}",
            error_messages.join("\n")
        )));
    }

    Ok(())
}
