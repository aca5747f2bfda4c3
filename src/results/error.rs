use std::collections::HashMap;
use thiserror::Error;

use super::grade::GradeError;
use crate::filter::FilterError;

/// Failures of the results core, one variant per HTTP outcome class
#[derive(Debug, Error)]
pub enum ResultsError {
    #[error("Authentication failed: {0}")]
    Authentication(String),

    #[error("Not authorized: {0}")]
    Authorization(String),

    #[error("{message}")]
    Validation {
        message: String,
        field_errors: Option<HashMap<String, String>>,
    },

    #[error("Not found: {0}")]
    NotFound(String),

    #[error(transparent)]
    Domain(#[from] GradeError),

    #[error("Storage error: {0}")]
    Storage(String),
}

impl ResultsError {
    pub fn validation(message: impl Into<String>) -> Self {
        ResultsError::Validation {
            message: message.into(),
            field_errors: None,
        }
    }

    pub fn field(message: impl Into<String>, field: impl Into<String>, problem: impl Into<String>) -> Self {
        let mut field_errors = HashMap::new();
        field_errors.insert(field.into(), problem.into());
        ResultsError::Validation {
            message: message.into(),
            field_errors: Some(field_errors),
        }
    }

    pub fn forbidden(message: impl Into<String>) -> Self {
        ResultsError::Authorization(message.into())
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        ResultsError::NotFound(message.into())
    }
}

impl From<FilterError> for ResultsError {
    fn from(err: FilterError) -> Self {
        ResultsError::validation(err.to_string())
    }
}
