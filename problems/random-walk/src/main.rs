
extern crate ndarray as nd;
extern crate na_lds;
extern crate rand;
extern crate tracing;
extern crate tracing_subscriber;
extern crate util;

use nd::{arr1, arr2, Axis};
use rand::rngs::StdRng;
use rand::SeedableRng;
use tracing::info;
use tracing_subscriber::EnvFilter;

use na_lds::{EmOptions, ParametersBuilder, Registry};
use util::data::simulate;
use util::progress::Reporting;
use util::ModelTruth;

const STEPS: usize = 2000;
const CHUNK: usize = 50;

fn main() -> na_lds::Result<()> {
  tracing_subscriber::fmt()
    .with_env_filter(EnvFilter::try_from_default_env()
                     .unwrap_or_else(|_| EnvFilter::new("info")))
    .init();

  // position/velocity, only the position is observed
  let a = arr2(&[[1.0, 0.1], [0.0, 0.95]]);
  let h = arr2(&[[1.0, 0.0]]);
  let q = arr2(&[[0.01, 0.0], [0.0, 0.04]]);
  let r = arr2(&[[0.25]]);
  let mu0 = arr1(&[0.0, 0.0]);
  let sigma0 = arr2(&[[1.0, 0.0], [0.0, 1.0]]);

  let mut rng = StdRng::seed_from_u64(0x5eed);
  let data = simulate(a.view(), h.view(), q.view(), r.view(),
                      mu0.view(), sigma0.view(), STEPS, &mut rng)?;

  let truth = ParametersBuilder::new()
    .transition_matrix(a.clone())
    .measurement_function(h.clone())
    .process_noise_covariance(q)
    .measurement_noise_covariance(r)
    .initial_mean(mu0)
    .initial_covariance(sigma0)
    .build()?;

  let registry = Registry::new();
  let handle = registry.reserve("random-walk", 2, 1, Some(truth))?;
  let model = registry.get("random-walk")?;

  let mut squared_error = 0.0;
  let (observed, hidden) = (data.observations(), data.truth());
  let chunks = observed.axis_chunks_iter(Axis(0), CHUNK)
    .zip(hidden.axis_chunks_iter(Axis(0), CHUNK));
  for (observations, truth) in chunks.reporting("filtering") {
    let filtered = model.filter(&observations)?;
    let err = &filtered.updated_state - &truth;
    squared_error += err.mapv(|v| v * v).sum();
  }
  info!(rmse = (squared_error / (STEPS * 2) as f64).sqrt(), "streamed filter");

  // Fit from a perturbed starting point.
  let start = ParametersBuilder::new()
    .transition_matrix(arr2(&[[0.9, 0.0], [0.0, 0.9]]))
    .measurement_function(arr2(&[[0.5, 0.5]]))
    .process_noise_variance(0.1)
    .measurement_noise_variance(1.0)
    .build()?;
  model.write().update_parameters(start)?;

  let options = EmOptions {
    max_iterations: 50,
    ..Default::default()
  };
  let result = model.expectation_maximization(&observed, &options, true)?;

  println!("log likelihood:");
  for (i, ll) in result.log_likelihood.iter().enumerate() {
    println!("{:>4} {:.4}", i, ll);
  }
  println!("stopped: {:?} after {} iterations", result.stop_reason,
           result.iterations());
  println!("A = {}", result.parameters.transition_matrix());
  println!("Q = {}", result.parameters.process_noise_covariance());
  println!("R = {}", result.parameters.measurement_noise_covariance());

  handle.dispose();
  Ok(())
}
