use nd::{ArrayBase, Array, ArrayView, Data, Ix1, Ix2, Axis};
use num_traits::{Float, One, Zero};

use super::{Real, FactorizeError, Result};

pub trait Cholesky {
  type Elem;
  /// Returns the upper triangular factor, R, of A = R^*R.
  fn l_lstar(&self) -> Result<Array<Self::Elem, Ix2>>;
}

impl<S> Cholesky for ArrayBase<S, Ix2>
  where S: Data,
        S::Elem: Real,
{
  type Elem = S::Elem;

  fn l_lstar(&self) -> Result<Array<S::Elem, Ix2>> {
    let (rows, cols) = self.dim();
    if rows != cols {
      return Err(FactorizeError::NotSquare { rows, cols, });
    }
    let m = rows;

    let mut r: Array<S::Elem, Ix2> = Array::zeros((m, m));
    for k in 0..m {
      let mut pivot = self[[k, k]];
      for i in 0..k {
        pivot = pivot - r[[i, k]] * r[[i, k]];
      }
      // also rejects NaN
      if !(pivot > S::Elem::zero()) {
        return Err(FactorizeError::NotPositiveDefinite { pivot: k, });
      }
      let rkk = pivot.sqrt();
      r[[k, k]] = rkk;

      for j in k + 1..m {
        let mut v = self[[k, j]];
        for i in 0..k {
          v = v - r[[i, k]] * r[[i, j]];
        }
        r[[k, j]] = v / rkk;
      }
    }

    Ok(r)
  }
}

/// A = R^T R, kept around so one factorization can serve several solves.
#[derive(Debug, Clone)]
pub struct CholeskyFactor<E>
  where E: Real,
{
  r: Array<E, Ix2>,
}

impl<E> CholeskyFactor<E>
  where E: Real,
{
  pub fn new<S>(a: &ArrayBase<S, Ix2>) -> Result<CholeskyFactor<E>>
    where S: Data<Elem = E>,
  {
    Ok(CholeskyFactor {
      r: a.l_lstar()?,
    })
  }

  pub fn dim(&self) -> usize { self.r.dim().0 }

  /// The upper factor.
  pub fn upper(&self) -> ArrayView<E, Ix2> { self.r.view() }

  /// Solves `A X = B` for `X`, column by column.
  pub fn solve<S>(&self, b: &ArrayBase<S, Ix2>) -> Result<Array<E, Ix2>>
    where S: Data<Elem = E>,
  {
    let n = self.dim();
    if b.dim().0 != n {
      return Err(FactorizeError::Shape {
        expected: (n, b.dim().1),
        found: b.dim(),
      });
    }

    let mut x = b.to_owned();
    for mut col in x.axis_iter_mut(Axis(1)) {
      // R^T y = b
      for i in 0..n {
        let mut v = col[i];
        for k in 0..i {
          v = v - self.r[[k, i]] * col[k];
        }
        col[i] = v / self.r[[i, i]];
      }
      // R x = y
      for i in (0..n).rev() {
        let mut v = col[i];
        for k in i + 1..n {
          v = v - self.r[[i, k]] * col[k];
        }
        col[i] = v / self.r[[i, i]];
      }
    }

    Ok(x)
  }

  /// Solves `X A = B` for `X`; A is symmetric so this is `(A^-1 B^T)^T`.
  pub fn solve_right<S>(&self, b: &ArrayBase<S, Ix2>) -> Result<Array<E, Ix2>>
    where S: Data<Elem = E>,
  {
    let n = self.dim();
    if b.dim().1 != n {
      return Err(FactorizeError::Shape {
        expected: (b.dim().0, n),
        found: b.dim(),
      });
    }
    let xt = self.solve(&b.t())?;
    Ok(xt.reversed_axes())
  }

  /// `ln det A`.
  pub fn log_det(&self) -> E {
    let two = E::one() + E::one();
    self.r.diag()
      .iter()
      .fold(E::zero(), |acc, &v| acc + two * v.ln())
  }

  /// `v^T A^-1 v`.
  pub fn quadratic_form<S>(&self, v: &ArrayBase<S, Ix1>) -> Result<E>
    where S: Data<Elem = E>,
  {
    let n = self.dim();
    if v.len() != n {
      return Err(FactorizeError::Shape {
        expected: (n, 1),
        found: (v.len(), 1),
      });
    }

    // |R^-T v|^2
    let mut y = v.to_owned();
    for i in 0..n {
      let mut s = y[i];
      for k in 0..i {
        s = s - self.r[[k, i]] * y[k];
      }
      y[i] = s / self.r[[i, i]];
    }
    Ok(y.dot(&y))
  }
}

/// Solves `X A = B` for `X` through the Cholesky factor of `A`; never forms
/// `A^-1`. Fails when `A` is not positive definite.
pub fn inverse_cholesky<S1, S2, E>(b: &ArrayBase<S1, Ix2>,
                                   a: &ArrayBase<S2, Ix2>)
  -> Result<Array<E, Ix2>>
  where S1: Data<Elem = E>,
        S2: Data<Elem = E>,
        E: Real,
{
  CholeskyFactor::new(a)?.solve_right(b)
}

/// Solves `A X = B`.
pub fn cholesky_solve<S1, S2, E>(b: &ArrayBase<S1, Ix2>,
                                 a: &ArrayBase<S2, Ix2>)
  -> Result<Array<E, Ix2>>
  where S1: Data<Elem = E>,
        S2: Data<Elem = E>,
        E: Real,
{
  CholeskyFactor::new(a)?.solve(b)
}

#[test]
fn cholesky_llstar() {
  use nd::arr2;

  let a: Array<f64, Ix2> = arr2(&[
    [4.0, 12.0, -16.0],
    [12.0, 37.0, -43.0],
    [-16.0, -43.0, 98.0],
  ]);

  let l = a.l_lstar().expect("cholesky factorization failed");

  let expected = arr2(&[
    [2.0, 6.0, -8.0],
    [0.0, 1.0, 5.0],
    [0.0, 0.0, 3.0],
  ]);
  assert_eq!(l, expected);
}

#[test]
fn cholesky_rejects_indefinite() {
  use nd::arr2;

  let a: Array<f64, Ix2> = arr2(&[
    [1.0, 2.0],
    [2.0, 1.0],
  ]);
  assert_eq!(a.l_lstar(), Err(FactorizeError::NotPositiveDefinite { pivot: 1 }));

  let zero: Array<f64, Ix2> = Array::zeros((2, 2));
  assert_eq!(zero.l_lstar(), Err(FactorizeError::NotPositiveDefinite { pivot: 0 }));

  let rect: Array<f64, Ix2> = Array::zeros((2, 3));
  assert_eq!(rect.l_lstar(), Err(FactorizeError::NotSquare { rows: 2, cols: 3 }));
}

#[test]
fn inverse_cholesky_solves_from_the_right() {
  use nd::arr2;

  let a: Array<f64, Ix2> = arr2(&[
    [4.0, 2.0],
    [2.0, 3.0],
  ]);
  let b = arr2(&[
    [1.0, 0.0],
    [0.0, 1.0],
    [2.0, 5.0],
  ]);

  let x = inverse_cholesky(&b, &a).unwrap();
  assert_eq!(x.dim(), (3, 2));
  let back = x.dot(&a);
  for (l, r) in back.iter().zip(b.iter()) {
    assert!((l - r).abs() < 1e-12, "{} != {}", l, r);
  }

  let bt = b.t().to_owned();
  let y = cholesky_solve(&bt, &a).unwrap();
  let back = a.dot(&y);
  for (l, r) in back.iter().zip(bt.iter()) {
    assert!((l - r).abs() < 1e-12, "{} != {}", l, r);
  }
}

#[test]
fn log_det_and_quadratic_form() {
  use nd::{arr1, arr2};

  let a: Array<f64, Ix2> = arr2(&[
    [4.0, 0.0],
    [0.0, 9.0],
  ]);
  let f = CholeskyFactor::new(&a).unwrap();
  assert!((f.log_det() - 36.0f64.ln()).abs() < 1e-12);

  let v = arr1(&[2.0, 3.0]);
  // 4/4 + 9/9
  assert!((f.quadratic_form(&v).unwrap() - 2.0).abs() < 1e-12);
}

#[cfg(test)]
mod proptests {
  use nd::Array;
  use proptest::prelude::*;

  use super::*;

  proptest! {
    #[test]
    fn factor_reconstructs_spd(entries in proptest::collection::vec(-3.0f64..3.0, 9)) {
      let g = Array::from_shape_vec((3, 3), entries).unwrap();
      // G G^T + I is always SPD.
      let a = g.dot(&g.t()) + Array::<f64, _>::eye(3);
      let r = a.l_lstar().unwrap();
      let back = r.t().dot(&r);
      for (l, r) in back.iter().zip(a.iter()) {
        prop_assert!((l - r).abs() < 1e-9);
      }
    }
  }
}
