//! Linear dynamical systems: Kalman filtering, Rauch-Tung-Striebel
//! smoothing, EM parameter learning and subspace identification, plus a
//! named registry of shared filter instances.

extern crate ndarray as nd;
extern crate na_core as nac;
extern crate nla_factorize;
extern crate num_traits;
extern crate parking_lot;
extern crate serde;
extern crate serde_json;
#[macro_use]
extern crate tracing;

pub use nac::{Error, Real, Result};

pub use em::{expectation_maximization, EmOptions, ExpectationMaximizationResult, StopReason};
pub use filter::{filter_from, filter_with_statistics};
pub use filter::{FilteredResult, FilteredStatistics, GaussianState, KalmanFilter};
pub use orthogonalize::{orthogonalize_state, orthogonalize_trajectory};
pub use params::{KalmanFilterParameters, ParametersBuilder, ParametersToEstimate};
pub use registry::{ModelHandle, Registry, SharedFilter};
pub use smoother::{smooth, smooth_with_statistics, SmoothedResult, SmoothedStatistics};
pub use ssid::{SsidOptions, SsidResult};

pub mod em;
pub mod filter;
pub mod io;
pub mod orthogonalize;
pub mod params;
pub mod registry;
pub mod smoother;
pub mod ssid;
