//! Model parameters of a linear-Gaussian state-space system.
//!
//! ```text
//! x[t] = A x[t-1] + w,  w ~ N(0, Q)
//! y[t] = H x[t]   + v,  v ~ N(0, R)
//! x[-1] ~ N(mu0, Sigma0)
//! ```

use nd::{Array, Ix1, Ix2};
use serde::{Deserialize, Serialize};

use nac::{check_matrix, check_square, check_vector, eye_rect};
use nac::{Error, Real, Result};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KalmanFilterParameters<E>
  where E: Real,
{
  transition_matrix: Array<E, Ix2>,
  measurement_function: Array<E, Ix2>,
  process_noise_covariance: Array<E, Ix2>,
  measurement_noise_covariance: Array<E, Ix2>,
  initial_mean: Array<E, Ix1>,
  initial_covariance: Array<E, Ix2>,
}

impl<E> KalmanFilterParameters<E>
  where E: Real,
{
  /// Rejects any set of matrices whose dimensions don't agree on a single
  /// `n` (states) and `m` (observations).
  pub fn new(transition_matrix: Array<E, Ix2>,
             measurement_function: Array<E, Ix2>,
             process_noise_covariance: Array<E, Ix2>,
             measurement_noise_covariance: Array<E, Ix2>,
             initial_mean: Array<E, Ix1>,
             initial_covariance: Array<E, Ix2>)
    -> Result<KalmanFilterParameters<E>>
  {
    let p = KalmanFilterParameters {
      transition_matrix,
      measurement_function,
      process_noise_covariance,
      measurement_noise_covariance,
      initial_mean,
      initial_covariance,
    };
    p.validate()?;
    Ok(p)
  }

  /// Identity dynamics and measurement, zero mean, unit covariances.
  pub fn with_dimensions(num_states: usize, num_observations: usize)
    -> Result<KalmanFilterParameters<E>>
  {
    ParametersBuilder::new()
      .num_states(num_states)
      .num_observations(num_observations)
      .build()
  }

  pub(crate) fn validate(&self) -> Result<()> {
    let n = check_square("Transition matrix", &self.transition_matrix, None)?;
    check_matrix("Measurement function", &self.measurement_function,
                 None, Some(n))?;
    let m = self.measurement_function.dim().0;
    check_square("Process noise covariance",
                 &self.process_noise_covariance, Some(n))?;
    check_square("Measurement noise covariance",
                 &self.measurement_noise_covariance, Some(m))?;
    check_vector("Initial mean", &self.initial_mean, Some(n))?;
    check_square("Initial covariance", &self.initial_covariance, Some(n))?;
    Ok(())
  }

  pub fn num_states(&self) -> usize { self.transition_matrix.dim().0 }
  pub fn num_observations(&self) -> usize { self.measurement_function.dim().0 }

  /// `A`
  pub fn transition_matrix(&self) -> &Array<E, Ix2> { &self.transition_matrix }
  /// `H`
  pub fn measurement_function(&self) -> &Array<E, Ix2> { &self.measurement_function }
  /// `Q`
  pub fn process_noise_covariance(&self) -> &Array<E, Ix2> { &self.process_noise_covariance }
  /// `R`
  pub fn measurement_noise_covariance(&self) -> &Array<E, Ix2> { &self.measurement_noise_covariance }
  pub fn initial_mean(&self) -> &Array<E, Ix1> { &self.initial_mean }
  pub fn initial_covariance(&self) -> &Array<E, Ix2> { &self.initial_covariance }
}

/// Which parameters an estimator is allowed to replace.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParametersToEstimate {
  pub transition_matrix: bool,
  pub measurement_function: bool,
  pub process_noise_covariance: bool,
  pub measurement_noise_covariance: bool,
  pub initial_mean: bool,
  pub initial_covariance: bool,
}
impl Default for ParametersToEstimate {
  fn default() -> Self {
    ParametersToEstimate {
      transition_matrix: true,
      measurement_function: true,
      process_noise_covariance: true,
      measurement_noise_covariance: true,
      initial_mean: true,
      initial_covariance: true,
    }
  }
}
impl ParametersToEstimate {
  pub fn none() -> Self {
    ParametersToEstimate {
      transition_matrix: false,
      measurement_function: false,
      process_noise_covariance: false,
      measurement_noise_covariance: false,
      initial_mean: false,
      initial_covariance: false,
    }
  }
}

#[derive(Debug, Clone)]
enum Noise<E>
  where E: Real,
{
  Variance(E),
  Covariance(Array<E, Ix2>),
}

/// Builds a [`KalmanFilterParameters`], inferring `n`/`m` from whatever is
/// supplied and defaulting the rest.
#[derive(Debug, Clone)]
pub struct ParametersBuilder<E>
  where E: Real,
{
  num_states: Option<usize>,
  num_observations: Option<usize>,
  transition_matrix: Option<Array<E, Ix2>>,
  measurement_function: Option<Array<E, Ix2>>,
  process_noise: Option<Noise<E>>,
  measurement_noise: Option<Noise<E>>,
  initial_mean: Option<Array<E, Ix1>>,
  initial_covariance: Option<Array<E, Ix2>>,
}

impl<E> Default for ParametersBuilder<E>
  where E: Real,
{
  fn default() -> Self {
    ParametersBuilder {
      num_states: None,
      num_observations: None,
      transition_matrix: None,
      measurement_function: None,
      process_noise: None,
      measurement_noise: None,
      initial_mean: None,
      initial_covariance: None,
    }
  }
}

impl<E> ParametersBuilder<E>
  where E: Real,
{
  pub fn new() -> Self { Default::default() }

  pub fn num_states(mut self, n: usize) -> Self {
    self.num_states = Some(n);
    self
  }
  pub fn num_observations(mut self, m: usize) -> Self {
    self.num_observations = Some(m);
    self
  }
  pub fn transition_matrix(mut self, a: Array<E, Ix2>) -> Self {
    self.transition_matrix = Some(a);
    self
  }
  pub fn measurement_function(mut self, h: Array<E, Ix2>) -> Self {
    self.measurement_function = Some(h);
    self
  }
  pub fn process_noise_covariance(mut self, q: Array<E, Ix2>) -> Self {
    self.process_noise = Some(Noise::Covariance(q));
    self
  }
  /// `Q = variance * I`
  pub fn process_noise_variance(mut self, variance: E) -> Self {
    self.process_noise = Some(Noise::Variance(variance));
    self
  }
  pub fn measurement_noise_covariance(mut self, r: Array<E, Ix2>) -> Self {
    self.measurement_noise = Some(Noise::Covariance(r));
    self
  }
  /// `R = variance * I`
  pub fn measurement_noise_variance(mut self, variance: E) -> Self {
    self.measurement_noise = Some(Noise::Variance(variance));
    self
  }
  pub fn initial_mean(mut self, mu0: Array<E, Ix1>) -> Self {
    self.initial_mean = Some(mu0);
    self
  }
  pub fn initial_covariance(mut self, sigma0: Array<E, Ix2>) -> Self {
    self.initial_covariance = Some(sigma0);
    self
  }

  fn infer_num_states(&self) -> Result<usize> {
    if let Some(n) = self.num_states {
      return Ok(n);
    }
    if let Some(ref a) = self.transition_matrix {
      return check_square("Transition matrix", a, None);
    }
    if let Some(ref h) = self.measurement_function {
      check_matrix("Measurement function", h, None, None)?;
      return Ok(h.dim().1);
    }
    if let Some(ref mu0) = self.initial_mean {
      return check_vector("Initial mean", mu0, None);
    }
    if let Some(ref sigma0) = self.initial_covariance {
      return check_square("Initial covariance", sigma0, None);
    }
    if let Some(Noise::Covariance(ref q)) = self.process_noise {
      return check_square("Process noise covariance", q, None);
    }
    Err(Error::InvalidArgument("the number of states was not given and \
                                cannot be inferred from the parameters"
                               .to_string()))
  }

  fn infer_num_observations(&self) -> Result<usize> {
    if let Some(m) = self.num_observations {
      return Ok(m);
    }
    if let Some(ref h) = self.measurement_function {
      check_matrix("Measurement function", h, None, None)?;
      return Ok(h.dim().0);
    }
    if let Some(Noise::Covariance(ref r)) = self.measurement_noise {
      return check_square("Measurement noise covariance", r, None);
    }
    Err(Error::InvalidArgument("the number of observations was not given and \
                                cannot be inferred from the parameters"
                               .to_string()))
  }

  pub fn build(self) -> Result<KalmanFilterParameters<E>> {
    let n = self.infer_num_states()?;
    let m = self.infer_num_observations()?;
    if n == 0 {
      return Err(Error::InvalidArgument("the number of states must be greater than zero"
                                        .to_string()));
    }
    if m == 0 {
      return Err(Error::InvalidArgument("the number of observations must be greater than zero"
                                        .to_string()));
    }

    let noise = |noise: Option<Noise<E>>, dim: usize| {
      match noise {
        None => Array::<E, Ix2>::eye(dim),
        Some(Noise::Variance(v)) => Array::<E, Ix2>::eye(dim) * v,
        Some(Noise::Covariance(c)) => c,
      }
    };

    KalmanFilterParameters::new(
      self.transition_matrix.unwrap_or_else(|| Array::eye(n) ),
      self.measurement_function.unwrap_or_else(|| eye_rect(m, n) ),
      noise(self.process_noise, n),
      noise(self.measurement_noise, m),
      self.initial_mean.unwrap_or_else(|| Array::zeros(n) ),
      self.initial_covariance.unwrap_or_else(|| Array::eye(n) ),
    )
  }
}

#[cfg(test)]
mod tests {
  use nd::{arr1, arr2, Array, Array1, Array2};

  use super::*;

  #[test]
  fn defaults() {
    let p: KalmanFilterParameters<f64> =
      KalmanFilterParameters::with_dimensions(3, 2).unwrap();
    assert_eq!(p.num_states(), 3);
    assert_eq!(p.num_observations(), 2);
    assert_eq!(p.transition_matrix(), &Array2::<f64>::eye(3));
    assert_eq!(p.measurement_function(),
               &arr2(&[[1.0, 0.0, 0.0], [0.0, 1.0, 0.0]]));
    assert_eq!(p.process_noise_covariance(), &Array2::<f64>::eye(3));
    assert_eq!(p.measurement_noise_covariance(), &Array2::<f64>::eye(2));
    assert_eq!(p.initial_mean(), &Array1::<f64>::zeros(3));
    assert_eq!(p.initial_covariance(), &Array2::<f64>::eye(3));
  }

  #[test]
  fn infers_dimensions_and_expands_variances() {
    let p = ParametersBuilder::new()
      .measurement_function(arr2(&[[1.0, 0.5]]))
      .process_noise_variance(0.25)
      .measurement_noise_variance(2.0)
      .build()
      .unwrap();
    assert_eq!(p.num_states(), 2);
    assert_eq!(p.num_observations(), 1);
    assert_eq!(p.process_noise_covariance(), &arr2(&[[0.25, 0.0], [0.0, 0.25]]));
    assert_eq!(p.measurement_noise_covariance(), &arr2(&[[2.0]]));
  }

  #[test]
  fn rejects_inconsistent_dimensions() {
    let r = KalmanFilterParameters::new(
      Array::eye(2),
      arr2(&[[1.0, 0.0, 0.0]]),
      Array::eye(2),
      Array::eye(1),
      arr1(&[0.0, 0.0]),
      Array::eye(2),
    );
    assert!(matches!(r, Err(Error::Shape { what: "Measurement function", .. })));

    let r = KalmanFilterParameters::new(
      Array::eye(2),
      arr2(&[[1.0, 0.0]]),
      Array::eye(2),
      Array::eye(1),
      arr1(&[0.0]),
      Array::eye(2),
    );
    assert!(matches!(r, Err(Error::Shape { what: "Initial mean", .. })));

    let r = ParametersBuilder::<f64>::new()
      .transition_matrix(Array::zeros((2, 3)))
      .num_observations(1)
      .build();
    assert!(matches!(r, Err(Error::NotSquare { .. })));
  }

  #[test]
  fn nothing_to_infer_from() {
    let r = ParametersBuilder::<f32>::new().num_observations(1).build();
    assert!(matches!(r, Err(Error::InvalidArgument(_))));
  }

  #[test]
  fn transition_alone_does_not_fix_the_observation_count() {
    let b = ParametersBuilder::<f64>::new()
      .transition_matrix(arr2(&[[0.8]]))
      .process_noise_variance(0.5);
    assert!(matches!(b.clone().build(), Err(Error::InvalidArgument(_))));

    let p = b.num_observations(1).build().unwrap();
    assert_eq!(p.num_observations(), 1);
    assert_eq!(p.measurement_function(), &arr2(&[[1.0]]));
  }
}
