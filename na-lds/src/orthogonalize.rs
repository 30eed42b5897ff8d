//! Maps latent beliefs onto the orthogonal basis of the measurement
//! function. With `H = U S V^T`, the transform is `T = S V^T`, so
//! `mean -> T mean` and `covariance -> T covariance T^T`.

use nd::prelude::*;
use nd::{Data, Zip};

use nac::{check_matrix, check_vector, Error, Real, Result};
use nla_factorize::JacobiSvd;

use crate::filter::{GaussianState, KalmanFilter};

fn transform<S, E>(h: &ArrayBase<S, Ix2>) -> Result<Array<E, Ix2>>
  where S: Data<Elem = E>,
        E: Real,
{
  let svd = h.jacobi_svd()?;
  let mut t = svd.vt;
  for (mut row, &sigma) in t.outer_iter_mut().zip(svd.s.iter()) {
    row.mapv_inplace(|v| v * sigma);
  }
  Ok(t)
}

/// A single belief. The result has `min(m, n)` components.
pub fn orthogonalize_state<S, E>(measurement_function: &ArrayBase<S, Ix2>,
                                 state: &GaussianState<E>)
  -> Result<GaussianState<E>>
  where S: Data<Elem = E>,
        E: Real,
{
  let n = measurement_function.dim().1;
  check_vector("State mean", &state.mean, Some(n))?;
  check_matrix("State covariance", &state.covariance, Some(n), Some(n))?;

  let t = transform(measurement_function)?;
  Ok(GaussianState {
    mean: t.dot(&state.mean),
    covariance: t.dot(&state.covariance).dot(&t.t()),
  })
}

/// A whole trajectory, `T x n` means and `T x n x n` covariances.
pub fn orthogonalize_trajectory<S, S2, S3, E>(measurement_function: &ArrayBase<S, Ix2>,
                                              mean: &ArrayBase<S2, Ix2>,
                                              covariance: &ArrayBase<S3, Ix3>)
  -> Result<(Array<E, Ix2>, Array<E, Ix3>)>
  where S: Data<Elem = E>,
        S2: Data<Elem = E>,
        S3: Data<Elem = E>,
        E: Real,
{
  let n = measurement_function.dim().1;
  check_matrix("Mean trajectory", mean, None, Some(n))?;
  let steps = mean.dim().0;
  if covariance.dim() != (steps, n, n) {
    let (a, b, c) = covariance.dim();
    return Err(Error::Shape {
      what: "Covariance trajectory",
      expected: vec![steps, n, n],
      found: vec![a, b, c],
    });
  }

  let t = transform(measurement_function)?;
  let k = t.dim().0;
  let out_mean = mean.dot(&t.t());
  let mut out_covariance: Array<E, Ix3> = Array::zeros((steps, k, k));
  Zip::from(out_covariance.outer_iter_mut())
    .and(covariance.outer_iter())
    .par_for_each(|mut out, c| {
      out.assign(&t.dot(&c).dot(&t.t()));
    });

  Ok((out_mean, out_covariance))
}

impl<E> KalmanFilter<E>
  where E: Real,
{
  pub fn orthogonalize(&self, state: &GaussianState<E>) -> Result<GaussianState<E>> {
    orthogonalize_state(self.parameters().measurement_function(), state)
  }

  pub fn orthogonalize_trajectory<S2, S3>(&self, mean: &ArrayBase<S2, Ix2>,
                                          covariance: &ArrayBase<S3, Ix3>)
    -> Result<(Array<E, Ix2>, Array<E, Ix3>)>
    where S2: Data<Elem = E>,
          S3: Data<Elem = E>,
  {
    orthogonalize_trajectory(self.parameters().measurement_function(), mean, covariance)
  }
}

#[cfg(test)]
mod tests {
  use nd::{arr1, arr2, Array};

  use super::*;
  use crate::params::ParametersBuilder;

  #[test]
  fn identity_measurement_is_a_no_op() {
    let kf: KalmanFilter<f64> = KalmanFilter::with_dimensions(2, 2).unwrap();
    let state = GaussianState {
      mean: arr1(&[1.0, -2.0]),
      covariance: arr2(&[[2.0, 0.5], [0.5, 1.0]]),
    };
    let out = kf.orthogonalize(&state).unwrap();
    for (l, r) in out.mean.iter().zip(state.mean.iter()) {
      assert!((l.abs() - r.abs()).abs() < 1e-12);
    }
    assert!((out.covariance.diag().sum() - 3.0).abs() < 1e-12);
  }

  #[test]
  fn scaled_measurement() {
    // H = [[0, 3]] has S = [3], V^T = [[0, +-1]].
    let p = ParametersBuilder::new()
      .num_states(2)
      .measurement_function(arr2(&[[0.0f64, 3.0]]))
      .build()
      .unwrap();
    let kf = KalmanFilter::new(p);
    let state = GaussianState {
      mean: arr1(&[5.0, 2.0]),
      covariance: arr2(&[[1.0, 0.0], [0.0, 4.0]]),
    };
    let out = kf.orthogonalize(&state).unwrap();
    assert_eq!(out.mean.len(), 1);
    assert!((out.mean[0].abs() - 6.0).abs() < 1e-12);
    assert!((out.covariance[[0, 0]] - 36.0).abs() < 1e-12);
  }

  #[test]
  fn trajectory_matches_single_states() {
    let h = arr2(&[[1.0, 0.5], [0.2, 2.0], [0.0, 1.0]]);
    let means = arr2(&[[1.0, 2.0], [0.5, -1.0], [3.0, 0.0]]);
    let mut covs = Array::<f64, _>::zeros((3, 2, 2));
    for t in 0..3 {
      let v = 1.0 + t as f64;
      covs.index_axis_mut(Axis(0), t).assign(&arr2(&[[v, 0.1], [0.1, 2.0 * v]]));
    }

    let (m, c) = orthogonalize_trajectory(&h, &means, &covs).unwrap();
    assert_eq!(m.dim(), (3, 2));
    assert_eq!(c.dim(), (3, 2, 2));
    for t in 0..3 {
      let one = orthogonalize_state(&h, &GaussianState {
        mean: means.row(t).to_owned(),
        covariance: covs.index_axis(Axis(0), t).to_owned(),
      }).unwrap();
      for (l, r) in one.mean.iter().zip(m.row(t).iter()) {
        assert!((l - r).abs() < 1e-12);
      }
      for (l, r) in one.covariance.iter().zip(c.index_axis(Axis(0), t).iter()) {
        assert!((l - r).abs() < 1e-12);
      }
    }

    let wrong = Array::<f64, _>::zeros((2, 2, 2));
    assert!(orthogonalize_trajectory(&h, &means, &wrong).is_err());
  }
}
