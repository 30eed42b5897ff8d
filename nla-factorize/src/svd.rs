use nd::{ArrayBase, Array, Data, Ix1, Ix2, Axis};
use num_traits::{Float, One, Zero};

use super::{Real, FactorizeError, Result};

const MAX_SWEEPS: usize = 64;

/// Thin SVD, `A = U diag(S) V^T` with `S` sorted in descending order.
#[derive(Debug, Clone)]
pub struct Svd<E>
  where E: Real,
{
  /// m x k
  pub u: Array<E, Ix2>,
  /// k
  pub s: Array<E, Ix1>,
  /// k x n
  pub vt: Array<E, Ix2>,
}

pub trait JacobiSvd {
  type Elem: Real;
  /// One-sided (Hestenes) Jacobi SVD. Columns of `U` belonging to zero
  /// singular values are left zero.
  fn jacobi_svd(&self) -> Result<Svd<Self::Elem>>;
}

impl<S> JacobiSvd for ArrayBase<S, Ix2>
  where S: Data,
        S::Elem: Real,
{
  type Elem = S::Elem;

  fn jacobi_svd(&self) -> Result<Svd<S::Elem>> {
    let (m, n) = self.dim();
    if m < n {
      // A^T = V S U^T
      let Svd { u, s, vt } = tall_svd(self.t().to_owned())?;
      return Ok(Svd {
        u: vt.reversed_axes(),
        s: s,
        vt: u.reversed_axes(),
      });
    }

    tall_svd(self.to_owned())
  }
}

fn tall_svd<E>(mut a: Array<E, Ix2>) -> Result<Svd<E>>
  where E: Real,
{
  let (m, n) = a.dim();
  let mut v: Array<E, Ix2> = Array::eye(n);
  let eps = E::epsilon();
  let one = E::one();
  let two = one + one;

  let mut converged = n < 2;
  let mut sweep = 0;
  while !converged {
    if sweep == MAX_SWEEPS {
      return Err(FactorizeError::NoConvergence { sweeps: MAX_SWEEPS, });
    }
    sweep += 1;
    converged = true;

    for p in 0..n - 1 {
      for q in p + 1..n {
        let (alpha, beta, gamma) = {
          let cp = a.column(p);
          let cq = a.column(q);
          (cp.dot(&cp), cq.dot(&cq), cp.dot(&cq))
        };
        if gamma == E::zero() || gamma.abs() <= eps * (alpha * beta).sqrt() {
          continue;
        }
        converged = false;

        let zeta = (beta - alpha) / (two * gamma);
        let t = zeta.signum() / (zeta.abs() + (one + zeta * zeta).sqrt());
        let c = one / (one + t * t).sqrt();
        let s = c * t;

        rotate(&mut a, p, q, c, s);
        rotate(&mut v, p, q, c, s);
      }
    }
  }

  let mut order: Vec<(usize, E)> = a.axis_iter(Axis(1))
    .map(|col| col.dot(&col).sqrt())
    .enumerate()
    .collect();
  order.sort_by(|l, r| {
    r.1.partial_cmp(&l.1).unwrap_or(::std::cmp::Ordering::Equal)
  });

  let mut u = Array::zeros((m, n));
  let mut s = Array::zeros(n);
  let mut vt = Array::zeros((n, n));
  for (dest, &(src, sigma)) in order.iter().enumerate() {
    s[dest] = sigma;
    if sigma > E::zero() {
      u.column_mut(dest)
        .assign(&a.column(src).mapv(|x| x / sigma));
    }
    vt.row_mut(dest).assign(&v.column(src));
  }

  Ok(Svd { u, s, vt, })
}

fn rotate<E>(a: &mut Array<E, Ix2>, p: usize, q: usize, c: E, s: E)
  where E: Real,
{
  for mut row in a.axis_iter_mut(Axis(0)) {
    let x = row[p];
    let y = row[q];
    row[p] = c * x - s * y;
    row[q] = s * x + c * y;
  }
}
