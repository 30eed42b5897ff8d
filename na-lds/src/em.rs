//! Batch expectation maximization over a single observation sequence.

use std::f64::consts::PI;

use nd::prelude::*;
use nd::Data;
use num_traits::{Float, FromPrimitive, ToPrimitive};
use serde::{Deserialize, Serialize};

use nac::{check_matrix, Error, Real, Result};
use nla_factorize::{ensure_symmetric, inverse_cholesky};

use crate::filter::{filter_with_statistics, KalmanFilter};
use crate::params::{KalmanFilterParameters, ParametersToEstimate};
use crate::smoother::{smooth_with_statistics, SmoothedStatistics};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EmOptions {
  pub max_iterations: usize,
  /// Stop once an iteration improves the log likelihood by less than this.
  pub tolerance: f64,
  pub estimate: ParametersToEstimate,
}
impl Default for EmOptions {
  fn default() -> Self {
    EmOptions {
      max_iterations: 100,
      tolerance: 1e-4,
      estimate: Default::default(),
    }
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StopReason {
  /// The improvement fell below the tolerance.
  Converged,
  MaxIterationsReached,
  /// The log likelihood did not increase. The parameters from the
  /// iteration before are returned, so the last entry of the trace
  /// belongs to the rejected update, not to the returned parameters;
  /// theirs is the one before it.
  LogLikelihoodDecreased,
}

#[derive(Debug, Clone)]
pub struct ExpectationMaximizationResult<E>
  where E: Real,
{
  /// One entry per iteration actually run.
  pub log_likelihood: Vec<E>,
  pub parameters: KalmanFilterParameters<E>,
  pub stop_reason: StopReason,
}

impl<E> ExpectationMaximizationResult<E>
  where E: Real,
{
  pub fn iterations(&self) -> usize { self.log_likelihood.len() }
}

fn cast<E>(v: f64) -> Result<E>
  where E: Real,
{
  E::from_f64(v)
    .ok_or_else(|| Error::InvalidArgument(format!("{} is not representable", v)))
}

/// Closed-form maximization given the smoothed sufficient statistics.
/// Parameters are replaced in order, so `Q` sees the new `A` and `R` the
/// new `H` when those are being estimated.
fn maximize<S, E>(p: &KalmanFilterParameters<E>,
                  observations: &ArrayBase<S, Ix2>,
                  auto_correlation: &Array<E, Ix2>,
                  smoothed: SmoothedStatistics<E>,
                  mask: &ParametersToEstimate)
  -> Result<KalmanFilterParameters<E>>
  where S: Data<Elem = E>,
        E: Real,
{
  let steps = cast::<E>(observations.dim().0 as f64)?;
  let s00 = smoothed.sum_s00();
  let s10 = smoothed.sum_s10();
  let s11 = smoothed.sum_s11();
  let cross_correlation = observations.t().dot(&smoothed.smoothed_state);

  let a = if mask.transition_matrix {
    inverse_cholesky(&s10, &s00)?
  } else {
    p.transition_matrix().clone()
  };
  let h = if mask.measurement_function {
    inverse_cholesky(&cross_correlation, &s11)?
  } else {
    p.measurement_function().clone()
  };
  let q = if mask.process_noise_covariance {
    ensure_symmetric(&((&s11 - &a.dot(&s10.t())) / steps))
  } else {
    p.process_noise_covariance().clone()
  };
  let r = if mask.measurement_noise_covariance {
    let explained = h.dot(&cross_correlation.t());
    let r = auto_correlation - &explained - &explained.t()
      + h.dot(&s11).dot(&h.t());
    ensure_symmetric(&(r / steps))
  } else {
    p.measurement_noise_covariance().clone()
  };
  let mu0 = if mask.initial_mean {
    smoothed.smoothed_initial_state
  } else {
    p.initial_mean().clone()
  };
  let sigma0 = if mask.initial_covariance {
    smoothed.smoothed_initial_covariance
  } else {
    p.initial_covariance().clone()
  };

  KalmanFilterParameters::new(a, h, q, r, mu0, sigma0)
}

/// Fits `initial` to `observations` (T x m, T >= 2). The log likelihood
/// of iteration `i` is that of the parameters going into it.
pub fn expectation_maximization<S, E>(initial: &KalmanFilterParameters<E>,
                                      observations: &ArrayBase<S, Ix2>,
                                      options: &EmOptions)
  -> Result<ExpectationMaximizationResult<E>>
  where S: Data<Elem = E>,
        E: Real,
{
  check_matrix("Observations", observations, None,
               Some(initial.num_observations()))?;
  let steps = observations.dim().0;
  if steps < 2 {
    return Err(Error::InsufficientTimeSteps { required: 2, found: steps, });
  }
  if !(options.tolerance >= 0.0) {
    return Err(Error::InvalidArgument(format!("tolerance must be non-negative, got {}",
                                              options.tolerance)));
  }

  let m = initial.num_observations() as f64;
  let log_likelihood_const = cast::<E>(-0.5 * steps as f64 * m * (2.0 * PI).ln())?;
  let half = cast::<E>(0.5)?;
  let auto_correlation = observations.t().dot(observations);

  let mut trace: Vec<E> = Vec::with_capacity(options.max_iterations);
  let mut previous = initial.clone();
  let mut current = initial.clone();
  let mut stop_reason = StopReason::MaxIterationsReached;

  for iteration in 0..options.max_iterations {
    let stats = filter_with_statistics(&current, observations)?;
    let ll = log_likelihood_const + half * stats.log_likelihood.sum();
    if !ll.is_finite() {
      return Err(Error::NonFiniteLikelihood { iteration, });
    }
    debug!(iteration, log_likelihood = %ll, "EM iteration");

    if let Some(&last) = trace.last() {
      trace.push(ll);
      if ll <= last {
        warn!(iteration, new = %ll, previous = %last, "log likelihood decreased");
        current = previous;
        stop_reason = StopReason::LogLikelihoodDecreased;
        break;
      }
      let improvement = (ll - last).to_f64().unwrap_or(::std::f64::INFINITY);
      if improvement < options.tolerance {
        stop_reason = StopReason::Converged;
        break;
      }
    } else {
      trace.push(ll);
    }

    let smoothed = smooth_with_statistics(&current, &stats)?;
    let next = maximize(&current, observations, &auto_correlation,
                        smoothed, &options.estimate)?;
    previous = ::std::mem::replace(&mut current, next);
  }

  match stop_reason {
    StopReason::MaxIterationsReached => {
      warn!(max_iterations = options.max_iterations,
            "EM stopped before converging");
    },
    _ => {
      info!(iterations = trace.len(), reason = ?stop_reason, "EM finished");
    },
  }

  Ok(ExpectationMaximizationResult {
    log_likelihood: trace,
    parameters: current,
    stop_reason,
  })
}

impl<E> KalmanFilter<E>
  where E: Real,
{
  /// Runs EM from the current parameters and installs the result.
  pub fn expectation_maximization<S>(&mut self, observations: &ArrayBase<S, Ix2>,
                                     options: &EmOptions)
    -> Result<ExpectationMaximizationResult<E>>
    where S: Data<Elem = E>,
  {
    let result = expectation_maximization(self.parameters(), observations, options)?;
    self.update_parameters(result.parameters.clone())?;
    Ok(result)
  }
}
