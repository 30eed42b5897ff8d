
use nd::{Array, ArrayView, Ix1, Ix2};
use nla_factorize::{Cholesky, FactorizeError};
use rand::Rng;
use rand_distr::StandardNormal;

use super::ModelTruth;

/// A simulated trajectory and the noisy observations of it.
#[derive(Clone, Debug)]
pub struct Data<E> {
  /// T x n
  pub truth: Array<E, Ix2>,
  /// T x m
  pub observations: Array<E, Ix2>,
}

impl<E> ModelTruth<E> for Data<E> {
  fn truth(&self) -> ArrayView<E, Ix2> { self.truth.view() }
  fn observations(&self) -> ArrayView<E, Ix2> { self.observations.view() }
}

/// The transposed upper Cholesky factor, or `None` for an all-zero
/// covariance, which means "no noise".
fn noise_factor(covariance: ArrayView<f64, Ix2>)
  -> Result<Option<Array<f64, Ix2>>, FactorizeError>
{
  if covariance.iter().all(|&v| v == 0.0) {
    return Ok(None);
  }
  Ok(Some(covariance.l_lstar()?.reversed_axes()))
}

fn sample<R>(mean: Array<f64, Ix1>, factor: &Option<Array<f64, Ix2>>, rng: &mut R)
  -> Array<f64, Ix1>
  where R: Rng,
{
  match *factor {
    None => mean,
    Some(ref l) => {
      let z: Array<f64, Ix1> = Array::from_shape_fn(l.dim().1, |_| {
        rng.sample(StandardNormal)
      });
      mean + l.dot(&z)
    },
  }
}

/// Draws `steps` states and observations from
/// `x[t] = A x[t-1] + w`, `y[t] = H x[t] + v`, `x[-1] ~ N(mu0, Sigma0)`.
pub fn simulate<R>(transition_matrix: ArrayView<f64, Ix2>,
                   measurement_function: ArrayView<f64, Ix2>,
                   process_noise_covariance: ArrayView<f64, Ix2>,
                   measurement_noise_covariance: ArrayView<f64, Ix2>,
                   initial_mean: ArrayView<f64, Ix1>,
                   initial_covariance: ArrayView<f64, Ix2>,
                   steps: usize,
                   rng: &mut R)
  -> Result<Data<f64>, FactorizeError>
  where R: Rng,
{
  let n = transition_matrix.dim().0;
  let m = measurement_function.dim().0;

  let q = noise_factor(process_noise_covariance)?;
  let r = noise_factor(measurement_noise_covariance)?;
  let sigma0 = noise_factor(initial_covariance)?;

  let mut truth: Array<f64, Ix2> = Array::zeros((steps, n));
  let mut observations: Array<f64, Ix2> = Array::zeros((steps, m));

  let mut x = sample(initial_mean.to_owned(), &sigma0, rng);
  for t in 0..steps {
    x = sample(transition_matrix.dot(&x), &q, rng);
    let y = sample(measurement_function.dot(&x), &r, rng);
    truth.row_mut(t).assign(&x);
    observations.row_mut(t).assign(&y);
  }

  Ok(Data {
    truth,
    observations,
  })
}

#[cfg(test)]
mod tests {
  use nd::{arr1, arr2};
  use rand::rngs::StdRng;
  use rand::SeedableRng;

  use super::*;

  #[test]
  fn noiseless_system_is_deterministic() {
    let mut rng = StdRng::seed_from_u64(7);
    let zero = arr2(&[[0.0]]);
    let d = simulate(arr2(&[[0.5]]).view(), arr2(&[[2.0]]).view(),
                     zero.view(), zero.view(),
                     arr1(&[8.0]).view(), zero.view(),
                     3, &mut rng).unwrap();
    assert_eq!(d.truth, arr2(&[[4.0], [2.0], [1.0]]));
    assert_eq!(d.observations, arr2(&[[8.0], [4.0], [2.0]]));
  }

  #[test]
  fn same_seed_same_data() {
    let a = arr2(&[[0.9, 0.1], [0.0, 0.8]]);
    let h = arr2(&[[1.0, 0.0]]);
    let q = arr2(&[[0.1, 0.0], [0.0, 0.1]]);
    let r = arr2(&[[0.2]]);
    let mu0 = arr1(&[0.0, 0.0]);
    let run = |seed| {
      let mut rng = StdRng::seed_from_u64(seed);
      simulate(a.view(), h.view(), q.view(), r.view(), mu0.view(), q.view(),
               50, &mut rng).unwrap()
    };
    let d = run(1);
    assert_eq!(d.observations.dim(), (50, 1));
    assert_eq!(d.truth.dim(), (50, 2));
    assert_eq!(d.observations, run(1).observations);
    assert!(d.observations != run(2).observations);
  }

  #[test]
  fn indefinite_noise_is_reported() {
    let mut rng = StdRng::seed_from_u64(0);
    let bad = arr2(&[[-1.0]]);
    let one = arr2(&[[1.0]]);
    let r = simulate(one.view(), one.view(), bad.view(), one.view(),
                     arr1(&[0.0]).view(), one.view(), 2, &mut rng);
    assert!(r.is_err());
  }
}
