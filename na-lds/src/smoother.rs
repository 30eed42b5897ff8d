//! Rauch-Tung-Striebel smoothing over one filtered batch.

use nd::prelude::*;
use nd::{s, Zip};

use nac::{outer, Error, Real, Result};
use nla_factorize::inverse_cholesky;

use crate::filter::{FilteredResult, FilteredStatistics, KalmanFilter};
use crate::params::KalmanFilterParameters;

#[derive(Debug, Clone, PartialEq)]
pub struct SmoothedResult<E>
  where E: Real,
{
  /// T x n
  pub smoothed_state: Array<E, Ix2>,
  /// T x n x n
  pub smoothed_covariance: Array<E, Ix3>,
}

/// Smoothed trajectory plus the second moments the M-step needs.
/// `s00[t]`, `s10[t]` and `s11[t]` are the per-step terms; sum them over
/// time with the `sum_*` helpers.
#[derive(Debug, Clone)]
pub struct SmoothedStatistics<E>
  where E: Real,
{
  pub smoothed_state: Array<E, Ix2>,
  pub smoothed_covariance: Array<E, Ix3>,
  /// The smoothed belief about the state before the first observation.
  pub smoothed_initial_state: Array<E, Ix1>,
  pub smoothed_initial_covariance: Array<E, Ix2>,
  /// `E[x[t-1] x[t-1]^T]`
  pub s00: Array<E, Ix3>,
  /// `E[x[t] x[t-1]^T]`
  pub s10: Array<E, Ix3>,
  /// `E[x[t] x[t]^T]`
  pub s11: Array<E, Ix3>,
}

impl<E> SmoothedStatistics<E>
  where E: Real,
{
  pub fn sum_s00(&self) -> Array<E, Ix2> { self.s00.sum_axis(Axis(0)) }
  pub fn sum_s10(&self) -> Array<E, Ix2> { self.s10.sum_axis(Axis(0)) }
  pub fn sum_s11(&self) -> Array<E, Ix2> { self.s11.sum_axis(Axis(0)) }
}

struct Backward<E>
  where E: Real,
{
  state: Array<E, Ix2>,
  covariance: Array<E, Ix3>,
  /// `gains[t]` maps step `t + 1` back onto `t`; the last entry is unused.
  gains: Array<E, Ix3>,
  initial_state: Array<E, Ix1>,
  initial_covariance: Array<E, Ix2>,
  initial_gain: Array<E, Ix2>,
}

/// `J = P * (A^T Ppred^-1)`
fn smoothing_gain<E>(a: &Array<E, Ix2>,
                     updated_covariance: ArrayView<E, Ix2>,
                     next_predicted_covariance: ArrayView<E, Ix2>)
  -> Result<Array<E, Ix2>>
  where E: Real,
{
  let t = inverse_cholesky(&a.t(), &next_predicted_covariance)?;
  Ok(updated_covariance.dot(&t))
}

fn backward<E>(p: &KalmanFilterParameters<E>, f: &FilteredResult<E>)
  -> Result<Backward<E>>
  where E: Real,
{
  let steps = f.len();
  if steps < 2 {
    return Err(Error::InsufficientTimeSteps {
      required: 2,
      found: steps,
    });
  }
  let n = p.num_states();
  let a = p.transition_matrix();

  let mut state = f.updated_state.clone();
  let mut covariance = f.updated_covariance.clone();
  let mut gains: Array<E, Ix3> = Array::zeros((steps, n, n));

  for t in (0..steps - 1).rev() {
    let gain = smoothing_gain(a, f.updated_covariance.index_axis(Axis(0), t),
                              f.predicted_covariance.index_axis(Axis(0), t + 1))?;

    let mean = {
      let d = &state.row(t + 1) - &f.predicted_state.row(t + 1);
      &f.updated_state.row(t) + &gain.dot(&d)
    };
    let cov = {
      let d = &covariance.index_axis(Axis(0), t + 1)
        - &f.predicted_covariance.index_axis(Axis(0), t + 1);
      &f.updated_covariance.index_axis(Axis(0), t) + &gain.dot(&d).dot(&gain.t())
    };

    state.row_mut(t).assign(&mean);
    covariance.index_axis_mut(Axis(0), t).assign(&cov);
    gains.index_axis_mut(Axis(0), t).assign(&gain);
  }

  // One more step back, with the prior standing in for the filtered
  // belief at t = -1.
  let initial_gain = smoothing_gain(a, p.initial_covariance().view(),
                                    f.predicted_covariance.index_axis(Axis(0), 0))?;
  let initial_state = {
    let d = &state.row(0) - &f.predicted_state.row(0);
    p.initial_mean() + &initial_gain.dot(&d)
  };
  let initial_covariance = {
    let d = &covariance.index_axis(Axis(0), 0)
      - &f.predicted_covariance.index_axis(Axis(0), 0);
    p.initial_covariance() + &initial_gain.dot(&d).dot(&initial_gain.t())
  };

  Ok(Backward {
    state,
    covariance,
    gains,
    initial_state,
    initial_covariance,
    initial_gain,
  })
}

/// Smooths a filtered batch of at least two steps.
pub fn smooth<E>(p: &KalmanFilterParameters<E>, filtered: &FilteredResult<E>)
  -> Result<SmoothedResult<E>>
  where E: Real,
{
  let b = backward(p, filtered)?;
  Ok(SmoothedResult {
    smoothed_state: b.state,
    smoothed_covariance: b.covariance,
  })
}

/// Smooths and accumulates `S00`, `S10` and `S11` for every step.
pub fn smooth_with_statistics<E>(p: &KalmanFilterParameters<E>,
                                 stats: &FilteredStatistics<E>)
  -> Result<SmoothedStatistics<E>>
  where E: Real,
{
  let f = &stats.filtered;
  let b = backward(p, f)?;
  let steps = f.len();
  let n = p.num_states();
  let a = p.transition_matrix();
  let h = p.measurement_function();

  // lag[t] = Cov(x[t], x[t-1] | all observations); lag[0] pairs with the
  // smoothed initial state.
  let mut lag: Array<E, Ix3> = Array::zeros((steps, n, n));
  {
    let last = steps - 1;
    let k = stats.kalman_gain.index_axis(Axis(0), last);
    let i_kh = Array::<E, _>::eye(n) - &k.dot(h);
    let seed = i_kh.dot(a).dot(&f.updated_covariance.index_axis(Axis(0), last - 1));
    lag.index_axis_mut(Axis(0), last).assign(&seed);
  }
  for t in (1..steps).rev() {
    let prev_gain = if t >= 2 {
      b.gains.index_axis(Axis(0), t - 2).to_owned()
    } else {
      b.initial_gain.clone()
    };
    let gain = b.gains.index_axis(Axis(0), t - 1);
    let updated = f.updated_covariance.index_axis(Axis(0), t - 1);

    let next = updated.dot(&prev_gain.t())
      + gain.dot(&(&lag.index_axis(Axis(0), t) - &a.dot(&updated)))
        .dot(&prev_gain.t());
    lag.index_axis_mut(Axis(0), t - 1).assign(&next);
  }

  // The "previous" belief at each step: the smoothed initial state at
  // t = 0, then the smoothed trajectory shifted by one.
  let prev_state = nd::concatenate(Axis(0), &[
    b.initial_state.view().insert_axis(Axis(0)),
    b.state.slice(s![..steps - 1, ..]),
  ]).map_err(|_| Error::InvalidArgument("state shapes diverged".into()))?;
  let prev_covariance = nd::concatenate(Axis(0), &[
    b.initial_covariance.view().insert_axis(Axis(0)),
    b.covariance.slice(s![..steps - 1, .., ..]),
  ]).map_err(|_| Error::InvalidArgument("covariance shapes diverged".into()))?;

  let mut s00: Array<E, Ix3> = Array::zeros((steps, n, n));
  let mut s10: Array<E, Ix3> = Array::zeros((steps, n, n));
  let mut s11: Array<E, Ix3> = Array::zeros((steps, n, n));

  Zip::from(s11.outer_iter_mut())
    .and(b.state.outer_iter())
    .and(b.covariance.outer_iter())
    .par_for_each(|mut s, m, c| {
      s.assign(&(outer(&m, &m) + &c));
    });
  Zip::from(s00.outer_iter_mut())
    .and(prev_state.outer_iter())
    .and(prev_covariance.outer_iter())
    .par_for_each(|mut s, m, c| {
      s.assign(&(outer(&m, &m) + &c));
    });
  Zip::from(s10.outer_iter_mut())
    .and(b.state.outer_iter())
    .and(prev_state.outer_iter())
    .and(lag.outer_iter())
    .par_for_each(|mut s, m, pm, l| {
      s.assign(&(outer(&m, &pm) + &l));
    });

  Ok(SmoothedStatistics {
    smoothed_state: b.state,
    smoothed_covariance: b.covariance,
    smoothed_initial_state: b.initial_state,
    smoothed_initial_covariance: b.initial_covariance,
    s00,
    s10,
    s11,
  })
}

impl<E> KalmanFilter<E>
  where E: Real,
{
  /// Smooths a batch previously produced by this instance's filter.
  pub fn smooth(&self, filtered: &FilteredResult<E>) -> Result<SmoothedResult<E>> {
    smooth(self.parameters(), filtered)
  }
}
