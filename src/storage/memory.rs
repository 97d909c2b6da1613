//! Volatile store for embedding the harness and for tests

use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use super::{Records, StorageResult, Store};
use crate::error::StorageError;
use crate::types::{Formula, FormulaId, TestCase, TestCaseFilter, TestCaseId, TestCaseUpdate};

/// Store that keeps everything in memory
#[derive(Debug, Default)]
pub struct MemoryStore {
    records: RwLock<Records>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Convenience for setup code: insert a formula and return its id
    pub fn insert_formula(&self, formula: Formula) -> StorageResult<FormulaId> {
        let id = formula.id;
        self.write()?.save_formula(&formula);
        Ok(id)
    }

    fn read(&self) -> StorageResult<RwLockReadGuard<'_, Records>> {
        self.records.read().map_err(|_| StorageError::Poisoned)
    }

    fn write(&self) -> StorageResult<RwLockWriteGuard<'_, Records>> {
        self.records.write().map_err(|_| StorageError::Poisoned)
    }
}

impl Store for MemoryStore {
    fn list_formulas(&self) -> StorageResult<Vec<Formula>> {
        Ok(self.read()?.formulas.values().cloned().collect())
    }

    fn load_formula(&self, id: FormulaId) -> StorageResult<Formula> {
        self.read()?.formula(id).cloned()
    }

    fn save_formula(&self, formula: &Formula) -> StorageResult<()> {
        self.write()?.save_formula(formula);
        Ok(())
    }

    fn delete_formula(&self, id: FormulaId) -> StorageResult<()> {
        self.write()?.delete_formula(id)
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
        self.write()?.save_test_case(test_case)
    }

    fn update_test_case(
        &self,
        id: TestCaseId,
        update: TestCaseUpdate,
    ) -> StorageResult<TestCase> {
        self.write()?.update_test_case(id, update)
    }

    fn record_outcome(&self, run: &TestCase) -> StorageResult<TestCase> {
        self.write()?.record_outcome(run)
    }

    fn delete_test_case(&self, id: TestCaseId) -> StorageResult<()> {
        self.write()?.delete_test_case(id)
    }

    fn next_test_case_id(&self) -> StorageResult<TestCaseId> {
        self.write()?.next_test_case_id()
    }
}
