use thiserror::Error;

/// Everything that can go wrong when building, combining, or evaluating a transform.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum TransformError {
    /// Two transforms (or a transform and a coordinate tuple) disagree on a dimension.
    #[error("mismatched dimension for {what}: expected {expected}, got {actual}")]
    MismatchedDimension {
        what: &'static str,
        expected: usize,
        actual: usize,
    },

    /// The matrix is singular, or the kernel has no algebraic inverse.
    #[error("transform is not invertible: {0}")]
    NonInvertible(String),

    /// No kernel exists for the requested pair of coordinate-system kinds.
    #[error("no operation found from {from_kind} to {to_kind}")]
    OperationNotFound { from_kind: String, to_kind: String },

    /// A builder was asked to create a transform before being given everything it needs.
    #[error("missing parameter `{0}`")]
    MissingParameter(String),

    /// A builder property was set twice.
    #[error("{0} has already been initialized")]
    AlreadyInitialized(&'static str),

    /// Units of different families (eg, an angle and a length) were paired.
    #[error("units {0} and {1} are incommensurable")]
    Incommensurable(String, String),

    #[error("invalid value for `{name}`: {reason}")]
    InvalidParameter { name: String, reason: String },

    /// An iterative inverse did not reach the requested accuracy.
    #[error("no convergence after {0} iterations")]
    NoConvergence(usize),

    /// The requested dimensions cannot be computed independently of the others.
    #[error("transform is not separable: {0}")]
    NotSeparable(String),

    /// The point cannot be transformed (eg, it is outside the area of a datum-shift grid).
    #[error("point is outside the domain of validity: {0}")]
    OutsideDomain(String),
}

impl TransformError {
    pub(crate) fn mismatched(what: &'static str, expected: usize, actual: usize) -> Self {
        Self::MismatchedDimension {
            what,
            expected,
            actual,
        }
    }

    pub(crate) fn invalid(name: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidParameter {
            name: name.into(),
            reason: reason.into(),
        }
    }
}
