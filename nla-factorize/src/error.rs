
use thiserror::Error;

pub type Result<T> = ::std::result::Result<T, FactorizeError>;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FactorizeError {
  /// The pivot at this index was not strictly positive.
  #[error("matrix is not positive definite (pivot {pivot})")]
  NotPositiveDefinite { pivot: usize },
  #[error("expected a square matrix, found {rows}x{cols}")]
  NotSquare { rows: usize, cols: usize },
  #[error("shape mismatch: expected {expected:?}, found {found:?}")]
  Shape { expected: (usize, usize), found: (usize, usize) },
  #[error("jacobi svd did not converge after {sweeps} sweeps")]
  NoConvergence { sweeps: usize },
}
