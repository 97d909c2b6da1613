//! Persistence of formulas and test cases
//!
//! The harness talks to storage only through [`Store`]. Two implementations ship with the
//! crate: [`MemoryStore`] for embedding and tests, and [`YamlStore`], which keeps a suite
//! file on disk in sync after every write.

pub mod memory;
pub mod yaml;

use std::collections::BTreeMap;

use crate::error::StorageError;
use crate::types::{Formula, FormulaId, TestCase, TestCaseFilter, TestCaseId, TestCaseUpdate};

pub use memory::MemoryStore;
pub use yaml::YamlStore;

pub type StorageResult<T> = Result<T, StorageError>;

/// Logical read/write contract for formulas and their test cases.
///
/// Implementations must be shareable across threads; the HTTP server keeps one store
/// behind an `Arc` for all requests.
pub trait Store: Send + Sync {
    fn list_formulas(&self) -> StorageResult<Vec<Formula>>;

    fn load_formula(&self, id: FormulaId) -> StorageResult<Formula>;

    /// Insert or replace a formula by id
    fn save_formula(&self, formula: &Formula) -> StorageResult<()>;

    /// Delete a formula and every test case that references it
    fn delete_formula(&self, id: FormulaId) -> StorageResult<()>;

    fn load_test_case(&self, id: TestCaseId) -> StorageResult<TestCase>;

    /// Test cases of one formula, filtered and sorted
    fn list_test_cases(
        &self,
        formula_id: FormulaId,
        filter: &TestCaseFilter,
    ) -> StorageResult<Vec<TestCase>>;

    /// Insert or update a test case by id. Its formula must exist.
    fn save_test_case(&self, test_case: &TestCase) -> StorageResult<()>;

    /// Apply an edit to the stored test case in one step and return the result
    fn update_test_case(
        &self,
        id: TestCaseId,
        update: TestCaseUpdate,
    ) -> StorageResult<TestCase>;

    /// Store the outcome fields of `run` on the test case with the same id.
    ///
    /// Nothing is written when the stored inputs or expectation no longer match the ones
    /// `run` was evaluated with; the stored state is returned either way. A test case
    /// deleted since it was loaded yields `TestCaseNotFound`.
    fn record_outcome(&self, run: &TestCase) -> StorageResult<TestCase>;

    fn delete_test_case(&self, id: TestCaseId) -> StorageResult<()>;

    /// Reserve a fresh test case id
    fn next_test_case_id(&self) -> StorageResult<TestCaseId>;
}

/// In-memory tables shared by the store implementations
#[derive(Debug, Clone)]
pub(crate) struct Records {
    pub formulas: BTreeMap<FormulaId, Formula>,
    pub test_cases: BTreeMap<TestCaseId, TestCase>,
    next_test_case_id: TestCaseId,
}

impl Default for Records {
    fn default() -> Self {
        Self {
            formulas: BTreeMap::new(),
            test_cases: BTreeMap::new(),
            next_test_case_id: 1,
        }
    }
}

/// The id after `id`, or a validation error at the top of the id range
fn id_after(id: TestCaseId) -> StorageResult<TestCaseId> {
    id.checked_add(1)
        .ok_or_else(|| StorageError::Validation(format!("test case id {} is out of range", id)))
}

impl Records {
    pub fn new(formulas: Vec<Formula>, test_cases: Vec<TestCase>) -> StorageResult<Self> {
        let next_test_case_id = match test_cases.iter().map(|tc| tc.id).max() {
            Some(max) => id_after(max)?,
            None => 1,
        };
        Ok(Self {
            formulas: formulas.into_iter().map(|f| (f.id, f)).collect(),
            test_cases: test_cases.into_iter().map(|tc| (tc.id, tc)).collect(),
            next_test_case_id,
        })
    }

    pub fn formula(&self, id: FormulaId) -> StorageResult<&Formula> {
        self.formulas
            .get(&id)
            .ok_or(StorageError::FormulaNotFound(id))
    }

    pub fn test_case(&self, id: TestCaseId) -> StorageResult<&TestCase> {
        self.test_cases
            .get(&id)
            .ok_or(StorageError::TestCaseNotFound(id))
    }

    pub fn save_formula(&mut self, formula: &Formula) {
        self.formulas.insert(formula.id, formula.clone());
    }

    pub fn delete_formula(&mut self, id: FormulaId) -> StorageResult<()> {
        self.formulas
            .remove(&id)
            .ok_or(StorageError::FormulaNotFound(id))?;
        self.test_cases.retain(|_, tc| tc.formula_id != id);
        Ok(())
    }

    pub fn list_test_cases(
        &self,
        formula_id: FormulaId,
        filter: &TestCaseFilter,
    ) -> StorageResult<Vec<TestCase>> {
        self.formula(formula_id)?;
        let mut cases: Vec<TestCase> = self
            .test_cases
            .values()
            .filter(|tc| tc.formula_id == formula_id)
            .cloned()
            .collect();
        filter.apply(&mut cases);
        Ok(cases)
    }

    pub fn save_test_case(&mut self, test_case: &TestCase) -> StorageResult<()> {
        self.formula(test_case.formula_id)?;
        self.next_test_case_id = self.next_test_case_id.max(id_after(test_case.id)?);
        self.test_cases.insert(test_case.id, test_case.clone());
        Ok(())
    }

    pub fn update_test_case(
        &mut self,
        id: TestCaseId,
        update: TestCaseUpdate,
    ) -> StorageResult<TestCase> {
        let stored = self
            .test_cases
            .get_mut(&id)
            .ok_or(StorageError::TestCaseNotFound(id))?;
        stored.apply(update);
        Ok(stored.clone())
    }

    pub fn record_outcome(&mut self, run: &TestCase) -> StorageResult<TestCase> {
        let stored = self
            .test_cases
            .get_mut(&run.id)
            .ok_or(StorageError::TestCaseNotFound(run.id))?;
        if stored.same_scenario(run) {
            stored.record_outcome(run);
        }
        Ok(stored.clone())
    }

    pub fn delete_test_case(&mut self, id: TestCaseId) -> StorageResult<()> {
        self.test_cases
            .remove(&id)
            .map(|_| ())
            .ok_or(StorageError::TestCaseNotFound(id))
    }

    pub fn next_test_case_id(&mut self) -> StorageResult<TestCaseId> {
        let id = self.next_test_case_id;
        self.next_test_case_id = id_after(id)?;
        Ok(id)
    }
}
