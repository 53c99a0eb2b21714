//! Error types for palaver-format

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Invalid booking pattern: {0}")]
    InvalidPattern(#[from] regex::Error),
}
