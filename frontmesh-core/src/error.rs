//! Error types for frontmesh

use thiserror::Error;

/// Main error type for frontmesh operations
#[derive(Error, Debug)]
pub enum Error {
    #[error("Invalid data: {0}")]
    InvalidData(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    #[error("Algorithm error: {0}")]
    Algorithm(String),

    #[error("Mesher has not been initialized")]
    NotInitialized,

    #[error("Unsupported operation: {0}")]
    Unsupported(String),
}

/// Result type alias for frontmesh operations
pub type Result<T> = std::result::Result<T, Error>;
