use thiserror::Error;

/// Errors that abort the step they occur in. Inside an ensemble only the
/// affected trajectory is stopped.
#[derive(Debug, Error)]
pub enum DynamicsError {
    #[error("dimension mismatch in {context}: expected {expected}, found {found}")]
    DimensionMismatch {
        context: &'static str,
        expected: usize,
        found: usize,
    },
    #[error("invalid configuration: {0}")]
    InvalidConfiguration(String),
    #[error("hamiltonian provider failed: {0}")]
    Provider(String),
    #[error("linear algebra failure: {0}")]
    LinearAlgebra(String),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("could not parse {what}: {message}")]
    Parse { what: &'static str, message: String },
    #[error("trajectory {index} was stopped earlier: {message}")]
    TrajectoryFailed { index: usize, message: String },
}

/// Conditions that are resolved inside the step. They are logged and collected
/// in the step report, but never abort a trajectory.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum Anomaly {
    #[error("adiabatic states {lower} and {upper} are nearly degenerate (gap {gap:.3e} Ha)")]
    NumericalDegeneracy { lower: usize, upper: usize, gap: f64 },
    #[error("negative hopping probability {value:.3e} for {from} -> {to} set to zero")]
    NegativeProbability { from: usize, to: usize, value: f64 },
    #[error(
        "frustrated hop {from} -> {to}: {required:.6} Ha required, {available:.6} Ha available"
    )]
    InsufficientEnergy {
        from: usize,
        to: usize,
        required: f64,
        available: f64,
    },
}

pub type Result<T> = std::result::Result<T, DynamicsError>;

impl DynamicsError {
    /// Returns a [DynamicsError::DimensionMismatch] if `found` differs from `expected`
    pub fn check_dimension(context: &'static str, expected: usize, found: usize) -> Result<()> {
        if expected != found {
            Err(DynamicsError::DimensionMismatch {
                context,
                expected,
                found,
            })
        } else {
            Ok(())
        }
    }
}
