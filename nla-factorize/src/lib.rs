extern crate ndarray as nd;
extern crate num_traits;
extern crate thiserror;

use std::fmt::{Debug, Display};

use nd::{ArrayBase, Array, Data, Ix2};
use num_traits::{Float, FromPrimitive, One};

pub use cholesky::*;
pub use error::{FactorizeError, Result};
pub use svd::*;

pub mod cholesky;
pub mod error;
pub mod svd;

/// Element types the factorizations (and everything built on them) work
/// over. Implemented for `f32` and `f64`.
pub trait Real: nd::LinalgScalar + nd::ScalarOperand + Float + FromPrimitive
  + Debug + Display + Send + Sync + 'static
{ }
impl Real for f32 { }
impl Real for f64 { }

/// `0.5 * (m + m^T)`.
pub fn ensure_symmetric<S>(m: &ArrayBase<S, Ix2>) -> Array<S::Elem, Ix2>
  where S: Data,
        S::Elem: Real,
{
  let half = S::Elem::from_f64(0.5).unwrap_or_else(S::Elem::one);
  (m + &m.t()) * half
}

#[test]
fn ensure_symmetric_averages_off_diagonal() {
  use nd::arr2;

  let m = arr2(&[
    [1.0, 2.0],
    [4.0, 3.0],
  ]);
  let expected = arr2(&[
    [1.0, 3.0],
    [3.0, 3.0],
  ]);
  assert_eq!(ensure_symmetric(&m), expected);
}

#[cfg(test)]
mod proptests {
  use nd::Array;
  use proptest::prelude::*;

  use super::*;

  proptest! {
    #[test]
    fn ensure_symmetric_is_symmetric_and_idempotent(
      entries in proptest::collection::vec(-1e3f64..1e3, 16))
    {
      let m = Array::from_shape_vec((4, 4), entries).unwrap();
      let s = ensure_symmetric(&m);
      prop_assert_eq!(&s, &s.t());
      prop_assert_eq!(ensure_symmetric(&s), s);
    }
  }
}
