use thiserror::Error;

/// Smallest number of free parameters a model may have.
pub const MIN_ARITY: usize = 2;

/// Largest number of free parameters a model may have.
pub const MAX_ARITY: usize = 4;

/// Errors raised while turning model text into a compiled model.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ModelError {
    /// The text is not a well-formed model expression.
    #[error("Invalid expression: {0}")]
    InvalidExpression(String),

    /// The distinct parameters referenced are not `param0..param{N-1}` with `2 <= N <= 4`.
    #[error(
        "models must have between 2 and 4 parameters named param0, param1, ...; found {}",
        describe_indices(.indices)
    )]
    UnsupportedArity {
        /// Sorted, distinct parameter indices referenced by the expression.
        indices: Vec<usize>,
    },
}

fn describe_indices(indices: &[usize]) -> String {
    if indices.is_empty() {
        return "none".to_string();
    }
    indices
        .iter()
        .map(|i| format!("param{}", i))
        .collect::<Vec<_>>()
        .join(", ")
}

/// Errors raised by the least-squares solver.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SolverError {
    /// Neither a Cholesky nor an LU factorisation of `A + μI` succeeded.
    #[error("Damped normal equations are singular at iteration {iteration} (damping = {damping:e})")]
    SingularSystem { iteration: usize, damping: f64 },
}

/// Error types for the curvefit-rs library.
#[derive(Error, Debug)]
pub enum CurveFitError {
    /// Error compiling the model expression.
    #[error(transparent)]
    Model(#[from] ModelError),

    /// Unrecoverable solver failure.
    #[error(transparent)]
    Solver(#[from] SolverError),

    /// Error indicating a mismatch in vector dimensions.
    #[error("Dimension mismatch: {0}")]
    DimensionMismatch(String),

    /// Invalid input data.
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result type alias for curvefit-rs operations.
pub type Result<T> = std::result::Result<T, CurveFitError>;
