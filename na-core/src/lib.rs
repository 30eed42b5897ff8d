extern crate ndarray as nd;
extern crate nla_factorize;
extern crate num_traits;
extern crate serde_json;
extern crate thiserror;

use nd::prelude::*;
use nd::{Data, RawData};
use num_traits::{One, Zero};

pub use error::{Result, Error};
pub use nla_factorize::Real;

pub mod error;

/// Views a vector as a one-column (`t == false`) or one-row (`t == true`)
/// matrix.
pub fn extend_dim_ref<D>(d: &ArrayBase<D, Ix1>, t: bool)
  -> ArrayView<D::Elem, Ix2>
  where D: Data,
{
  if !t {
    d.view().insert_axis(Axis(1))
  } else {
    d.view().insert_axis(Axis(0))
  }
}

pub fn outer<S1, S2, E>(a: &ArrayBase<S1, Ix1>, b: &ArrayBase<S2, Ix1>)
  -> Array<E, Ix2>
  where S1: Data<Elem = E>,
        S2: Data<Elem = E>,
        E: Real,
{
  Array::from_shape_fn((a.len(), b.len()), |(i, j)| a[i] * b[j] )
}

/// `rows x cols` with ones on the leading diagonal.
pub fn eye_rect<E>(rows: usize, cols: usize) -> Array<E, Ix2>
  where E: Real,
{
  Array::from_shape_fn((rows, cols), |(i, j)| {
    if i == j { E::one() } else { E::zero() }
  })
}

pub fn check_matrix<S>(what: &'static str, m: &ArrayBase<S, Ix2>,
                       rows: Option<usize>, cols: Option<usize>)
  -> Result<()>
  where S: RawData,
{
  let (r, c) = m.dim();
  if r == 0 || c == 0 {
    return Err(Error::Empty { what, });
  }
  let expected = (rows.unwrap_or(r), cols.unwrap_or(c));
  if expected != (r, c) {
    return Err(Error::Shape {
      what,
      expected: vec![expected.0, expected.1],
      found: vec![r, c],
    });
  }
  Ok(())
}

pub fn check_square<S>(what: &'static str, m: &ArrayBase<S, Ix2>,
                       dim: Option<usize>)
  -> Result<usize>
  where S: RawData,
{
  let (rows, cols) = m.dim();
  if rows == 0 || cols == 0 {
    return Err(Error::Empty { what, });
  }
  if rows != cols {
    return Err(Error::NotSquare { what, rows, cols, });
  }
  check_matrix(what, m, dim, dim)?;
  Ok(rows)
}

pub fn check_vector<S>(what: &'static str, v: &ArrayBase<S, Ix1>,
                       len: Option<usize>)
  -> Result<usize>
  where S: RawData,
{
  let n = v.len();
  if n == 0 {
    return Err(Error::Empty { what, });
  }
  match len {
    Some(expected) if expected != n => {
      Err(Error::Shape {
        what,
        expected: vec![expected],
        found: vec![n],
      })
    },
    _ => Ok(n),
  }
}

#[cfg(test)]
mod tests {
  use nd::{arr1, arr2, Array};

  use super::*;

  #[test]
  fn extend_dim_promotes_vectors() {
    let v = arr1(&[1.0, 2.0, 3.0]);
    assert_eq!(extend_dim_ref(&v, false).dim(), (3, 1));
    assert_eq!(extend_dim_ref(&v, true).dim(), (1, 3));
  }

  #[test]
  fn outer_product() {
    let a = arr1(&[1.0, 2.0]);
    let b = arr1(&[3.0, 4.0, 5.0]);
    assert_eq!(outer(&a, &b), arr2(&[[3.0, 4.0, 5.0], [6.0, 8.0, 10.0]]));
  }

  #[test]
  fn validation_reports_what_failed() {
    let m: Array<f64, _> = Array::zeros((2, 3));
    match check_square("Transition matrix", &m, None) {
      Err(Error::NotSquare { what, rows: 2, cols: 3 }) => {
        assert_eq!(what, "Transition matrix");
      },
      other => panic!("unexpected {:?}", other),
    }
    assert!(check_matrix("Measurement function", &m, Some(2), Some(3)).is_ok());
    assert!(check_matrix("Measurement function", &m, Some(3), None).is_err());

    let v: Array<f64, _> = Array::zeros(0);
    assert!(matches!(check_vector("Initial mean", &v, None), Err(Error::Empty { .. })));
  }
}
