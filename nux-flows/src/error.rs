use thiserror::Error;

/// Errors from building, initializing, or applying a flow.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum FlowError {
    #[error("dimension mismatch: expected {expected}, found {found}")]
    DimensionMismatch { expected: usize, found: usize },

    #[error("wrong number of parameters: expected {expected}, found {found}")]
    ParamCount { expected: usize, found: usize },

    #[error("empty batch")]
    EmptyBatch,

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("fixed-point solve failed: {0}")]
    Solver(#[from] nux_implicit::Error),
}

pub type Result<T> = std::result::Result<T, FlowError>;
