use thiserror::Error;

#[derive(Error, Debug)]
pub enum FilterError {
    #[error("Invalid predicate: {0}")]
    InvalidPredicate(String),

    #[error("Invalid pagination: {0}")]
    InvalidPagination(String),
}
