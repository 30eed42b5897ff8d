//! Stochastic subspace identification: a non-iterative estimate of all
//! six parameters, mostly useful as a starting point for EM.

use nd::prelude::*;
use nd::{s, Data};
use num_traits::{Float, FromPrimitive};
use serde::{Deserialize, Serialize};

use nac::{check_matrix, Error, Real, Result};
use nla_factorize::{ensure_symmetric, inverse_cholesky, JacobiSvd};

use crate::params::{KalmanFilterParameters, ParametersBuilder, ParametersToEstimate};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SsidOptions {
  /// Upper bound on the number of states; `None` keeps every singular
  /// value above the threshold.
  pub target_num_states: Option<usize>,
  /// Number of block rows in each of the past and future Hankel matrices.
  pub max_lag: usize,
  /// Relative to the largest singular value.
  pub threshold: f64,
  /// Parameters not selected here are left at their defaults.
  pub estimate: ParametersToEstimate,
}
impl Default for SsidOptions {
  fn default() -> Self {
    SsidOptions {
      target_num_states: None,
      max_lag: 20,
      threshold: 0.01,
      estimate: Default::default(),
    }
  }
}

#[derive(Debug, Clone)]
pub struct SsidResult<E>
  where E: Real,
{
  pub parameters: KalmanFilterParameters<E>,
  pub effective_states: usize,
  /// Every singular value of the projection, largest first.
  pub singular_values: Array<E, Ix1>,
}

/// `(lag * m) x cols`, block row `i` holding `y[offset + i + c]` in column `c`.
fn block_hankel<E>(y: ArrayView<E, Ix2>, offset: usize, lags: usize, cols: usize)
  -> Array<E, Ix2>
  where E: Real,
{
  let m = y.dim().1;
  Array::from_shape_fn((lags * m, cols), |(r, c)| {
    y[[offset + r / m + c, r % m]]
  })
}

fn scale<E>(m: Array<E, Ix2>, count: usize) -> Result<Array<E, Ix2>>
  where E: Real,
{
  let d = E::from_usize(count)
    .ok_or_else(|| Error::InvalidArgument(format!("{} is not representable", count)))?;
  Ok(ensure_symmetric(&(m / d)))
}

pub fn identify<S, E>(observations: &ArrayBase<S, Ix2>, options: &SsidOptions)
  -> Result<SsidResult<E>>
  where S: Data<Elem = E>,
        E: Real,
{
  check_matrix("Observations", observations, None, None)?;
  let (steps, m) = observations.dim();
  let lags = options.max_lag;
  if lags == 0 {
    return Err(Error::InvalidArgument("max_lag must be at least 1".into()));
  }
  if steps + 1 <= 2 * lags {
    return Err(Error::InsufficientTimeSteps {
      required: 2 * lags,
      found: steps,
    });
  }
  let cols = steps + 1 - 2 * lags;

  let mean = observations.mean_axis(Axis(0))
    .ok_or(Error::Empty { what: "Observations", })?;
  let centered = observations - &mean;

  let past = block_hankel(centered.view(), 0, lags, cols);
  let future = block_hankel(centered.view(), lags, lags, cols);

  // Orthogonal projection of the future onto the row space of the past.
  let pp = past.dot(&past.t());
  let projection = inverse_cholesky(&future.dot(&past.t()), &pp)?.dot(&past);

  let svd = projection.jacobi_svd()?;
  let s_max = svd.s[0];
  let threshold = E::from_f64(options.threshold)
    .ok_or_else(|| Error::InvalidArgument(format!("threshold {}", options.threshold)))?
    * s_max;
  let rank = svd.s.iter().filter(|&&v| v > threshold).count();
  let n = rank.min(options.target_num_states.unwrap_or(rank)).max(1);
  debug!(rank, effective_states = n, cols, "subspace identification");

  let sqrt_s = svd.s.slice(s![..n]).mapv(|v| v.sqrt());
  // U_r S_r^1/2
  let mut observability = svd.u.slice(s![.., ..n]).to_owned();
  for (mut col, &v) in observability.axis_iter_mut(Axis(1)).zip(sqrt_s.iter()) {
    col.mapv_inplace(|x| x * v);
  }
  // S_r^1/2 V_r^T
  let mut states = svd.vt.slice(s![..n, ..]).to_owned();
  for (mut row, &v) in states.outer_iter_mut().zip(sqrt_s.iter()) {
    row.mapv_inplace(|x| x * v);
  }

  let h = observability.slice(s![..m, ..]).to_owned();

  let current = states.slice(s![.., ..cols - 1]);
  let next = states.slice(s![.., 1..]);
  let a = inverse_cholesky(&next.dot(&current.t()), &current.dot(&current.t()))?;

  let state_residuals = &next - &a.dot(&current);
  let q = scale(state_residuals.dot(&state_residuals.t()), cols - 1)?;

  let window = centered.slice(s![lags..lags + cols, ..]);
  let observation_residuals = &window.t() - &h.dot(&states);
  let r = scale(observation_residuals.dot(&observation_residuals.t()), cols)?;

  let mu0 = states.column(0).to_owned();
  let sigma0 = scale(states.dot(&states.t()), cols)?;

  let mask = &options.estimate;
  let mut builder = ParametersBuilder::new()
    .num_states(n)
    .num_observations(m);
  if mask.transition_matrix { builder = builder.transition_matrix(a); }
  if mask.measurement_function { builder = builder.measurement_function(h); }
  if mask.process_noise_covariance { builder = builder.process_noise_covariance(q); }
  if mask.measurement_noise_covariance { builder = builder.measurement_noise_covariance(r); }
  if mask.initial_mean { builder = builder.initial_mean(mu0); }
  if mask.initial_covariance { builder = builder.initial_covariance(sigma0); }

  Ok(SsidResult {
    parameters: builder.build()?,
    effective_states: n,
    singular_values: svd.s,
  })
}

#[cfg(test)]
mod tests {
  use nd::arr2;

  use super::*;

  #[test]
  fn too_short_for_the_lag() {
    let obs = Array::<f64, _>::zeros((9, 1));
    let options = SsidOptions { max_lag: 5, ..Default::default() };
    match identify(&obs, &options) {
      Err(Error::InsufficientTimeSteps { required: 10, found: 9 }) => {},
      other => panic!("unexpected {:?}", other.map(|r| r.effective_states)),
    }
  }

  #[test]
  fn hankel_layout() {
    let y = arr2(&[[1.0, 10.0], [2.0, 20.0], [3.0, 30.0], [4.0, 40.0]]);
    let h = block_hankel(y.view(), 1, 2, 2);
    let expected = arr2(&[
      [2.0, 3.0],
      [20.0, 30.0],
      [3.0, 4.0],
      [30.0, 40.0],
    ]);
    assert_eq!(h, expected);
  }
}
