//! Helpers shared by the problem binaries and the integration tests.

extern crate ndarray as nd;
extern crate nla_factorize;
extern crate pbr;
extern crate rand;
extern crate rand_distr;

use nd::{ArrayView, Ix2};

pub mod data;
pub mod progress;

pub trait ModelTruth<E> {
  fn truth(&self) -> ArrayView<E, Ix2>;
  fn observations(&self) -> ArrayView<E, Ix2>;
}
