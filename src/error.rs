use thiserror::Error;

use crate::core::formula::FormulaError;
use crate::types::{FormulaId, TestCaseId};

pub type HarnessResult<T> = Result<T, HarnessError>;

/// Failure of the persistence collaborator
#[derive(Error, Debug)]
pub enum StorageError {
    #[error("Formula {0} not found")]
    FormulaNotFound(FormulaId),

    #[error("Test case {0} not found")]
    TestCaseNotFound(TestCaseId),

    #[error("Storage lock poisoned")]
    Poisoned,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML parsing error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("Suite validation error: {0}")]
    Validation(String),
}

#[derive(Error, Debug)]
pub enum HarnessError {
    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error("Formula error: {}", .0.to_message())]
    Formula(#[from] FormulaError),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("{failed} test(s) failed, {error} errored")]
    TestsFailed { failed: usize, error: usize },
}

impl HarnessError {
    /// True when the error is a missing formula or test case
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            HarnessError::Storage(StorageError::FormulaNotFound(_))
                | HarnessError::Storage(StorageError::TestCaseNotFound(_))
        )
    }
}
