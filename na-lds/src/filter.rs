//! Kalman predict/update recursion, as a pure function of a starting
//! belief and as a streaming instance that carries its belief between
//! batches.

use nd::prelude::*;
use nd::Data;

use nac::{check_matrix, check_vector, extend_dim_ref};
use nac::{Error, Real, Result};
use nla_factorize::{ensure_symmetric, CholeskyFactor};

use crate::params::KalmanFilterParameters;

/// A Gaussian belief over the hidden state.
#[derive(Debug, Clone, PartialEq)]
pub struct GaussianState<E>
  where E: Real,
{
  pub mean: Array<E, Ix1>,
  pub covariance: Array<E, Ix2>,
}

/// Predicted and updated beliefs for every time step of one batch.
#[derive(Debug, Clone, PartialEq)]
pub struct FilteredResult<E>
  where E: Real,
{
  /// T x n
  pub predicted_state: Array<E, Ix2>,
  /// T x n x n
  pub predicted_covariance: Array<E, Ix3>,
  /// T x n
  pub updated_state: Array<E, Ix2>,
  /// T x n x n
  pub updated_covariance: Array<E, Ix3>,
}

impl<E> FilteredResult<E>
  where E: Real,
{
  fn alloc(steps: usize, n: usize) -> FilteredResult<E> {
    FilteredResult {
      predicted_state: Array::zeros((steps, n)),
      predicted_covariance: Array::zeros((steps, n, n)),
      updated_state: Array::zeros((steps, n)),
      updated_covariance: Array::zeros((steps, n, n)),
    }
  }

  pub fn len(&self) -> usize { self.updated_state.dim().0 }
  pub fn is_empty(&self) -> bool { self.len() == 0 }

  /// The updated belief at the last time step.
  pub fn last_state(&self) -> Option<GaussianState<E>> {
    let t = self.len().checked_sub(1)?;
    Some(GaussianState {
      mean: self.updated_state.row(t).to_owned(),
      covariance: self.updated_covariance.index_axis(Axis(0), t).to_owned(),
    })
  }
}

/// A [`FilteredResult`] plus the per-step quantities the smoother's
/// sufficient statistics and the EM objective need.
#[derive(Debug, Clone)]
pub struct FilteredStatistics<E>
  where E: Real,
{
  pub filtered: FilteredResult<E>,
  /// T x m
  pub innovation: Array<E, Ix2>,
  /// T x m x m
  pub innovation_covariance: Array<E, Ix3>,
  /// T x n x m
  pub kalman_gain: Array<E, Ix3>,
  /// `-(ln det S + d^T S^-1 d)` per step.
  pub log_likelihood: Array<E, Ix1>,
}

pub(crate) struct Step<E>
  where E: Real,
{
  pub predicted_mean: Array<E, Ix1>,
  pub predicted_covariance: Array<E, Ix2>,
  pub updated_mean: Array<E, Ix1>,
  pub updated_covariance: Array<E, Ix2>,
  pub innovation: Array<E, Ix1>,
  pub innovation_covariance: Array<E, Ix2>,
  pub kalman_gain: Array<E, Ix2>,
  pub innovation_factor: CholeskyFactor<E>,
}

/// One predict/update cycle.
pub(crate) fn step<E>(p: &KalmanFilterParameters<E>,
                      mean: ArrayView<E, Ix1>,
                      covariance: ArrayView<E, Ix2>,
                      observation: ArrayView<E, Ix1>)
  -> Result<Step<E>>
  where E: Real,
{
  let a = p.transition_matrix();
  let h = p.measurement_function();

  // predict
  let predicted_mean = a.dot(&mean);
  let predicted_covariance = a.dot(&covariance).dot(&a.t())
    + p.process_noise_covariance();

  // update
  let innovation = &observation - &h.dot(&predicted_mean);
  let innovation_covariance =
    ensure_symmetric(&(h.dot(&predicted_covariance).dot(&h.t())
                       + p.measurement_noise_covariance()));
  let innovation_factor = CholeskyFactor::new(&innovation_covariance)?;
  let kalman_gain = innovation_factor
    .solve_right(&predicted_covariance.dot(&h.t()))?;

  let updated_mean = &predicted_mean + &kalman_gain.dot(&innovation);
  let updated_covariance = &predicted_covariance
    - &kalman_gain.dot(h).dot(&predicted_covariance);

  Ok(Step {
    predicted_mean,
    predicted_covariance,
    updated_mean,
    updated_covariance,
    innovation,
    innovation_covariance,
    kalman_gain,
    innovation_factor,
  })
}

fn check_observations<S, E>(p: &KalmanFilterParameters<E>,
                            observations: &ArrayBase<S, Ix2>)
  -> Result<usize>
  where S: Data<Elem = E>,
        E: Real,
{
  check_matrix("Observations", observations, None, Some(p.num_observations()))?;
  Ok(observations.dim().0)
}

fn check_state<E>(p: &KalmanFilterParameters<E>, state: &GaussianState<E>)
  -> Result<()>
  where E: Real,
{
  let n = p.num_states();
  check_vector("State mean", &state.mean, Some(n))?;
  check_matrix("State covariance", &state.covariance, Some(n), Some(n))
}

/// Filters `observations` (T x m) starting from `start`. Returns the batch
/// and the belief after its last step. Nothing is kept between calls.
pub fn filter_from<S, E>(p: &KalmanFilterParameters<E>,
                         observations: &ArrayBase<S, Ix2>,
                         start: &GaussianState<E>)
  -> Result<(FilteredResult<E>, GaussianState<E>)>
  where S: Data<Elem = E>,
        E: Real,
{
  let steps = check_observations(p, observations)?;
  check_state(p, start)?;
  let n = p.num_states();

  let mut out = FilteredResult::alloc(steps, n);
  let mut state = start.clone();

  for (t, observation) in observations.outer_iter().enumerate() {
    let s = step(p, state.mean.view(), state.covariance.view(), observation)?;

    out.predicted_state.row_mut(t).assign(&s.predicted_mean);
    out.predicted_covariance.index_axis_mut(Axis(0), t)
      .assign(&s.predicted_covariance);
    out.updated_state.row_mut(t).assign(&s.updated_mean);
    out.updated_covariance.index_axis_mut(Axis(0), t)
      .assign(&s.updated_covariance);

    state = GaussianState {
      mean: s.updated_mean,
      covariance: s.updated_covariance,
    };
  }

  Ok((out, state))
}

/// Filters from the prior `(mu0, Sigma0)` and also records innovations,
/// gains and per-step log likelihood terms.
pub fn filter_with_statistics<S, E>(p: &KalmanFilterParameters<E>,
                                    observations: &ArrayBase<S, Ix2>)
  -> Result<FilteredStatistics<E>>
  where S: Data<Elem = E>,
        E: Real,
{
  let steps = check_observations(p, observations)?;
  let n = p.num_states();
  let m = p.num_observations();

  let mut out = FilteredStatistics {
    filtered: FilteredResult::alloc(steps, n),
    innovation: Array::zeros((steps, m)),
    innovation_covariance: Array::zeros((steps, m, m)),
    kalman_gain: Array::zeros((steps, n, m)),
    log_likelihood: Array::zeros(steps),
  };

  let mut mean = p.initial_mean().clone();
  let mut covariance = p.initial_covariance().clone();

  for (t, observation) in observations.outer_iter().enumerate() {
    let s = step(p, mean.view(), covariance.view(), observation)?;

    let log_det = s.innovation_factor.log_det();
    let mahalanobis = s.innovation_factor.quadratic_form(&s.innovation)?;
    out.log_likelihood[t] = -(log_det + mahalanobis);

    {
      let f = &mut out.filtered;
      f.predicted_state.row_mut(t).assign(&s.predicted_mean);
      f.predicted_covariance.index_axis_mut(Axis(0), t)
        .assign(&s.predicted_covariance);
      f.updated_state.row_mut(t).assign(&s.updated_mean);
      f.updated_covariance.index_axis_mut(Axis(0), t)
        .assign(&s.updated_covariance);
    }
    out.innovation.row_mut(t).assign(&s.innovation);
    out.innovation_covariance.index_axis_mut(Axis(0), t)
      .assign(&s.innovation_covariance);
    out.kalman_gain.index_axis_mut(Axis(0), t)
      .assign(&s.kalman_gain);

    mean = s.updated_mean;
    covariance = s.updated_covariance;
  }

  Ok(out)
}

/// A filter instance: current parameters plus the running belief that
/// carries over between streaming batches.
#[derive(Debug, Clone)]
pub struct KalmanFilter<E>
  where E: Real,
{
  parameters: KalmanFilterParameters<E>,
  running: Option<GaussianState<E>>,
}

impl<E> KalmanFilter<E>
  where E: Real,
{
  pub fn new(parameters: KalmanFilterParameters<E>) -> KalmanFilter<E> {
    KalmanFilter {
      parameters,
      running: None,
    }
  }

  pub fn with_dimensions(num_states: usize, num_observations: usize)
    -> Result<KalmanFilter<E>>
  {
    Ok(KalmanFilter::new(KalmanFilterParameters::with_dimensions(num_states,
                                                                 num_observations)?))
  }

  pub fn parameters(&self) -> &KalmanFilterParameters<E> { &self.parameters }
  pub fn num_states(&self) -> usize { self.parameters.num_states() }
  pub fn num_observations(&self) -> usize { self.parameters.num_observations() }

  /// `None` until the first streaming batch has been filtered.
  pub fn running_state(&self) -> Option<&GaussianState<E>> {
    self.running.as_ref()
  }

  /// The belief the next streaming batch starts from.
  pub fn current_state(&self) -> GaussianState<E> {
    match self.running {
      Some(ref s) => s.clone(),
      None => GaussianState {
        mean: self.parameters.initial_mean().clone(),
        covariance: self.parameters.initial_covariance().clone(),
      },
    }
  }

  /// Forgets the running belief; the next batch starts from the prior.
  pub fn reset(&mut self) {
    self.running = None;
  }

  /// Filters a `T x m` batch, continuing from where the previous batch
  /// left off. On failure the running belief is left untouched.
  pub fn filter<S>(&mut self, observations: &ArrayBase<S, Ix2>)
    -> Result<FilteredResult<E>>
    where S: Data<Elem = E>,
  {
    let start = self.current_state();
    let (out, last) = filter_from(&self.parameters, observations, &start)?;
    self.running = Some(last);
    Ok(out)
  }

  /// A single `m` observation, treated as a batch with `T = 1`.
  pub fn filter_observation<S>(&mut self, observation: &ArrayBase<S, Ix1>)
    -> Result<FilteredResult<E>>
    where S: Data<Elem = E>,
  {
    self.filter(&extend_dim_ref(observation, true))
  }

  /// Like [`KalmanFilter::filter`] but with the starting belief threaded
  /// explicitly; the instance is not modified.
  pub fn filter_from<S>(&self, observations: &ArrayBase<S, Ix2>,
                        start: &GaussianState<E>)
    -> Result<(FilteredResult<E>, GaussianState<E>)>
    where S: Data<Elem = E>,
  {
    filter_from(&self.parameters, observations, start)
  }

  /// Replaces all parameters. The new set must keep `n` and `m`; the
  /// running belief is kept.
  pub fn update_parameters(&mut self, parameters: KalmanFilterParameters<E>)
    -> Result<()>
  {
    let expected = vec![self.num_states(), self.num_observations()];
    let found = vec![parameters.num_states(), parameters.num_observations()];
    if expected != found {
      return Err(Error::Shape {
        what: "Updated parameters (states, observations)",
        expected,
        found,
      });
    }
    self.parameters = parameters;
    Ok(())
  }
}
