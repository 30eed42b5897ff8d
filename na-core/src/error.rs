
use nla_factorize::FactorizeError;
use thiserror::Error;

pub type Result<T> = ::std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
  #[error("{what} must have shape {expected:?}, found {found:?}")]
  Shape {
    what: &'static str,
    expected: Vec<usize>,
    found: Vec<usize>,
  },
  #[error("{what} must be square, found {rows}x{cols}")]
  NotSquare { what: &'static str, rows: usize, cols: usize },
  #[error("{what} must be non-empty")]
  Empty { what: &'static str },
  #[error("at least {required} time steps are required, found {found}")]
  InsufficientTimeSteps { required: usize, found: usize },
  #[error("log likelihood is not finite at iteration {iteration}")]
  NonFiniteLikelihood { iteration: usize },
  #[error("invalid argument: {0}")]
  InvalidArgument(String),
  #[error("a model named `{0}` already exists")]
  DuplicateModel(String),
  #[error("no model named `{0}`")]
  ModelNotFound(String),
  #[error(transparent)]
  Factorize(#[from] FactorizeError),
  #[error(transparent)]
  Io(#[from] ::std::io::Error),
  #[error(transparent)]
  Serialization(#[from] serde_json::Error),
}
