//! Named, shareable filter instances.
//!
//! A [`Registry`] is an ordinary value; clone it to share one table
//! between threads. Every entry carries its own reader/writer lock, so
//! work on different models never contends beyond the table lookup.

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use nd::prelude::*;
use nd::Data;
use parking_lot::{RwLock, RwLockReadGuard, RwLockUpgradableReadGuard, RwLockWriteGuard};

use nac::{Error, Real, Result};

use crate::em::{expectation_maximization, EmOptions, ExpectationMaximizationResult};
use crate::filter::{FilteredResult, KalmanFilter};
use crate::params::KalmanFilterParameters;

pub struct SharedFilter<E>
  where E: Real,
{
  name: String,
  filter: RwLock<KalmanFilter<E>>,
}

impl<E> SharedFilter<E>
  where E: Real,
{
  pub fn name(&self) -> &str { &self.name }

  /// Shared access: parameter inspection, smoothing, `filter_from`.
  pub fn read(&self) -> RwLockReadGuard<KalmanFilter<E>> {
    self.filter.read()
  }
  /// Exclusive access: streaming `filter`, `update_parameters`.
  pub fn write(&self) -> RwLockWriteGuard<KalmanFilter<E>> {
    self.filter.write()
  }

  /// Streams a batch through the instance under the write lock.
  pub fn filter<S>(&self, observations: &ArrayBase<S, Ix2>)
    -> Result<FilteredResult<E>>
    where S: Data<Elem = E>,
  {
    self.write().filter(observations)
  }

  /// Runs EM from the current parameters. Without `apply` only the read
  /// lock is held. With `apply`, an upgradable read lock is held for the
  /// whole fit and upgraded for the swap: readers proceed meanwhile, but
  /// no writer can slip in between the fit and its installation.
  pub fn expectation_maximization<S>(&self, observations: &ArrayBase<S, Ix2>,
                                     options: &EmOptions, apply: bool)
    -> Result<ExpectationMaximizationResult<E>>
    where S: Data<Elem = E>,
  {
    if !apply {
      return expectation_maximization(self.read().parameters(), observations, options);
    }

    let guard = self.filter.upgradable_read();
    let result = expectation_maximization(guard.parameters(), observations, options)?;
    let mut filter = RwLockUpgradableReadGuard::upgrade(guard);
    filter.update_parameters(result.parameters.clone())?;
    debug!(model = %self.name, "installed EM parameters");
    Ok(result)
  }
}

impl<E> fmt::Debug for SharedFilter<E>
  where E: Real,
{
  fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
    f.debug_struct("SharedFilter")
      .field("name", &self.name)
      .finish()
  }
}

type Table<E> = HashMap<String, Arc<SharedFilter<E>>>;

pub struct Registry<E>
  where E: Real,
{
  models: Arc<RwLock<Table<E>>>,
}

impl<E> Clone for Registry<E>
  where E: Real,
{
  fn clone(&self) -> Self {
    Registry {
      models: self.models.clone(),
    }
  }
}

impl<E> Default for Registry<E>
  where E: Real,
{
  fn default() -> Self {
    Registry {
      models: Arc::new(RwLock::new(HashMap::new())),
    }
  }
}

impl<E> Registry<E>
  where E: Real,
{
  pub fn new() -> Self { Default::default() }

  /// Creates a model under `name`. Without `parameters` the defaults for
  /// `num_states`/`num_observations` are used; with them, their
  /// dimensions must match.
  pub fn reserve(&self, name: &str, num_states: usize, num_observations: usize,
                 parameters: Option<KalmanFilterParameters<E>>)
    -> Result<ModelHandle<E>>
  {
    let parameters = match parameters {
      Some(p) => {
        let found = vec![p.num_states(), p.num_observations()];
        if found != [num_states, num_observations] {
          return Err(Error::Shape {
            what: "Initial parameters (states, observations)",
            expected: vec![num_states, num_observations],
            found,
          });
        }
        p
      },
      None => KalmanFilterParameters::with_dimensions(num_states, num_observations)?,
    };

    let model = Arc::new(SharedFilter {
      name: name.to_owned(),
      filter: RwLock::new(KalmanFilter::new(parameters)),
    });

    {
      let mut models = self.models.write();
      if models.contains_key(name) {
        return Err(Error::DuplicateModel(name.to_owned()));
      }
      models.insert(name.to_owned(), model.clone());
    }
    debug!(model = name, num_states, num_observations, "reserved model");

    Ok(ModelHandle {
      registry: self.clone(),
      model,
      disposed: AtomicBool::new(false),
    })
  }

  pub fn get(&self, name: &str) -> Result<Arc<SharedFilter<E>>> {
    self.models.read()
      .get(name)
      .cloned()
      .ok_or_else(|| Error::ModelNotFound(name.to_owned()))
  }

  pub fn contains(&self, name: &str) -> bool {
    self.models.read().contains_key(name)
  }

  pub fn len(&self) -> usize { self.models.read().len() }
  pub fn is_empty(&self) -> bool { self.len() == 0 }

  /// Sorted.
  pub fn names(&self) -> Vec<String> {
    let mut names: Vec<_> = self.models.read().keys().cloned().collect();
    names.sort();
    names
  }

  /// Only removes `model` itself; a newer model reserved under the same
  /// name is left in place.
  fn remove(&self, model: &Arc<SharedFilter<E>>) -> bool {
    let mut models = self.models.write();
    let same = models.get(model.name())
      .map(|current| Arc::ptr_eq(current, model))
      .unwrap_or(false);
    if same {
      models.remove(model.name());
    }
    same
  }
}

impl<E> fmt::Debug for Registry<E>
  where E: Real,
{
  fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
    f.debug_struct("Registry")
      .field("models", &self.names())
      .finish()
  }
}

/// Ownership of one registry entry. Disposing (explicitly or by dropping
/// the handle) removes the name; outstanding `Arc<SharedFilter>`s keep the
/// instance itself alive until they are dropped.
#[must_use = "dropping the handle disposes the model"]
pub struct ModelHandle<E>
  where E: Real,
{
  registry: Registry<E>,
  model: Arc<SharedFilter<E>>,
  disposed: AtomicBool,
}

impl<E> ModelHandle<E>
  where E: Real,
{
  pub fn model(&self) -> &Arc<SharedFilter<E>> { &self.model }
  pub fn name(&self) -> &str { self.model.name() }

  pub fn is_disposed(&self) -> bool {
    self.disposed.load(Ordering::Acquire)
  }

  /// Idempotent.
  pub fn dispose(&self) {
    if self.disposed.swap(true, Ordering::AcqRel) {
      return;
    }
    if self.registry.remove(&self.model) {
      debug!(model = self.name(), "disposed model");
    }
  }
}

impl<E> Drop for ModelHandle<E>
  where E: Real,
{
  fn drop(&mut self) {
    self.dispose();
  }
}

impl<E> fmt::Debug for ModelHandle<E>
  where E: Real,
{
  fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
    f.debug_struct("ModelHandle")
      .field("name", &self.name())
      .field("disposed", &self.is_disposed())
      .finish()
  }
}

#[cfg(test)]
mod tests {
  use nd::arr2;

  use super::*;

  #[test]
  fn reserve_get_dispose() {
    let registry: Registry<f64> = Registry::new();
    assert!(registry.is_empty());

    let handle = registry.reserve("a", 2, 1, None).unwrap();
    assert!(registry.contains("a"));
    assert_eq!(registry.get("a").unwrap().read().num_states(), 2);
    assert_eq!(handle.name(), "a");

    handle.dispose();
    assert!(handle.is_disposed());
    assert!(!registry.contains("a"));
    assert!(matches!(registry.get("a"), Err(Error::ModelNotFound(_))));

    // second dispose is a no-op
    handle.dispose();
  }

  #[test]
  fn mismatched_parameters_are_rejected() {
    let registry: Registry<f64> = Registry::new();
    let p = KalmanFilterParameters::with_dimensions(3, 1).unwrap();
    assert!(registry.reserve("a", 2, 1, Some(p)).is_err());
    assert!(registry.is_empty());
  }

  #[test]
  fn stale_handle_leaves_newer_model_alone() {
    let registry: Registry<f64> = Registry::new();
    let first = registry.reserve("a", 1, 1, None).unwrap();
    first.dispose();
    let second = registry.reserve("a", 1, 1, None).unwrap();

    drop(first);
    assert!(registry.contains("a"));
    assert!(Arc::ptr_eq(second.model(), &registry.get("a").unwrap()));
  }

  #[test]
  fn dropping_the_handle_disposes() {
    let registry: Registry<f64> = Registry::new();
    {
      let _handle = registry.reserve("scoped", 1, 1, None).unwrap();
      assert_eq!(registry.names(), vec!["scoped".to_string()]);
    }
    assert!(registry.is_empty());
  }

  #[test]
  fn streaming_through_the_registry() {
    let registry: Registry<f64> = Registry::new();
    let handle = registry.reserve("walk", 1, 1, None).unwrap();
    let model = registry.get("walk").unwrap();

    model.filter(&arr2(&[[1.0], [2.0]])).unwrap();
    assert!(model.read().running_state().is_some());
    assert!(handle.model().read().running_state().is_some());
  }
}
