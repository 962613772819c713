//! Error taxonomy for the graph engine (spec §7).
//!
//! Every fallible public operation returns `Result<T, GraphError>`. The
//! variant names are the contract; callers match on kind, not message text.

use thiserror::Error;

/// The unified error type for all `xnetgraph` operations.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum GraphError {
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("index {index} out of range (capacity {capacity}) while accessing {what}")]
    OutOfRange {
        what: &'static str,
        index: u64,
        capacity: u64,
    },

    #[error("not found: {0}")]
    NotFound(String),

    #[error("wrong type: {0}")]
    WrongType(String),

    #[error("not supported: {0}")]
    NotSupported(String),

    #[error("io error: {0}")]
    Io(String),

    #[error("corrupt format: {0}")]
    CorruptFormat(String),

    #[error("out of memory")]
    OutOfMemory,

    #[error("query error at byte {offset}: {message}")]
    Query { offset: usize, message: String },
}

impl From<std::io::Error> for GraphError {
    fn from(e: std::io::Error) -> Self {
        GraphError::Io(e.to_string())
    }
}

pub type GraphResult<T> = Result<T, GraphError>;

impl GraphError {
    pub fn invalid_argument(msg: impl Into<String>) -> Self {
        GraphError::InvalidArgument(msg.into())
    }

    pub fn out_of_range(what: &'static str, index: u64, capacity: u64) -> Self {
        GraphError::OutOfRange { what, index, capacity }
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        GraphError::NotFound(msg.into())
    }

    pub fn wrong_type(msg: impl Into<String>) -> Self {
        GraphError::WrongType(msg.into())
    }

    pub fn not_supported(msg: impl Into<String>) -> Self {
        GraphError::NotSupported(msg.into())
    }

    pub fn corrupt(msg: impl Into<String>) -> Self {
        GraphError::CorruptFormat(msg.into())
    }

    pub fn query(offset: usize, msg: impl Into<String>) -> Self {
        GraphError::Query { offset, message: msg.into() }
    }
}
