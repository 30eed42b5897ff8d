
extern crate ndarray as nd;
extern crate na_lds;
extern crate rand;
extern crate util;

use nd::{arr1, arr2, Array, Ix2};
use rand::rngs::StdRng;
use rand::SeedableRng;

use na_lds::ssid::{self, SsidOptions};
use na_lds::{expectation_maximization, EmOptions, Error, StopReason};
use na_lds::{KalmanFilterParameters, ParametersBuilder, ParametersToEstimate};
use util::data::simulate;

fn ar1() -> KalmanFilterParameters<f64> {
  ParametersBuilder::new()
    .transition_matrix(arr2(&[[0.9]]))
    .measurement_function(arr2(&[[1.0]]))
    .process_noise_variance(1.0)
    .measurement_noise_variance(0.1)
    .initial_mean(arr1(&[0.0]))
    .initial_covariance(arr2(&[[1.0]]))
    .build()
    .unwrap()
}

fn observations_of(p: &KalmanFilterParameters<f64>, steps: usize, seed: u64)
  -> Array<f64, Ix2>
{
  let mut rng = StdRng::seed_from_u64(seed);
  simulate(p.transition_matrix().view(),
           p.measurement_function().view(),
           p.process_noise_covariance().view(),
           p.measurement_noise_covariance().view(),
           p.initial_mean().view(),
           p.initial_covariance().view(),
           steps, &mut rng)
    .unwrap()
    .observations
}

fn assert_improving(trace: &[f64], stop: StopReason) {
  let improving = match stop {
    StopReason::LogLikelihoodDecreased => &trace[..trace.len() - 1],
    _ => trace,
  };
  for w in improving.windows(2) {
    assert!(w[1] > w[0], "{:?}", trace);
  }
}

#[test]
fn em_climbs_and_stops_within_the_budget() {
  let obs = observations_of(&ar1(), 300, 17);
  let start = ParametersBuilder::new()
    .transition_matrix(arr2(&[[0.5]]))
    .num_observations(1)
    .process_noise_variance(0.3)
    .measurement_noise_variance(0.5)
    .build()
    .unwrap();

  let options = EmOptions {
    max_iterations: 40,
    tolerance: 1e-6,
    estimate: ParametersToEstimate {
      // H and Q trade off against each other; pin H to keep A identifiable.
      measurement_function: false,
      ..Default::default()
    },
  };
  let result = expectation_maximization(&start, &obs, &options).unwrap();

  assert!(result.iterations() >= 2);
  assert!(result.iterations() <= 40);
  assert_improving(&result.log_likelihood, result.stop_reason);

  let a = result.parameters.transition_matrix()[[0, 0]];
  assert!(a > 0.5, "A barely moved: {}", a);
  assert_eq!(result.parameters.measurement_function(), &arr2(&[[1.0]]));
}

#[test]
fn em_on_a_two_state_system() {
  let truth = ParametersBuilder::new()
    .transition_matrix(arr2(&[[0.9, 0.1], [0.0, 0.7]]))
    .measurement_function(arr2(&[[1.0, 0.0], [0.0, 1.0], [1.0, 1.0]]))
    .process_noise_variance(0.2)
    .measurement_noise_variance(0.3)
    .initial_mean(arr1(&[0.0, 0.0]))
    .build()
    .unwrap();
  let obs = observations_of(&truth, 150, 5);

  let start = ParametersBuilder::new()
    .num_states(2)
    .measurement_function(arr2(&[[0.8, 0.1], [0.1, 0.8], [0.5, 0.5]]))
    .build()
    .unwrap();
  let options = EmOptions { max_iterations: 15, ..Default::default() };
  let result = expectation_maximization(&start, &obs, &options).unwrap();

  assert_improving(&result.log_likelihood, result.stop_reason);
  let p = &result.parameters;
  for q in &[p.process_noise_covariance(), p.measurement_noise_covariance()] {
    let (rows, _) = q.dim();
    for i in 0..rows {
      assert!(q[[i, i]] > 0.0);
      for j in 0..rows {
        assert_eq!(q[[i, j]], q[[j, i]]);
      }
    }
  }
}

#[test]
fn em_rejects_wrong_observation_width() {
  let obs = Array::<f64, _>::zeros((10, 2));
  let r = expectation_maximization(&ar1(), &obs, &Default::default());
  assert!(matches!(r, Err(Error::Shape { .. })));
}

#[test]
fn ssid_recovers_the_dynamics() {
  let obs = observations_of(&ar1(), 2000, 23);
  let options = SsidOptions {
    target_num_states: Some(1),
    max_lag: 5,
    ..Default::default()
  };
  let result = ssid::identify(&obs, &options).unwrap();

  assert_eq!(result.effective_states, 1);
  assert_eq!(result.singular_values.len(), 5);
  for w in result.singular_values.to_vec().windows(2) {
    assert!(w[0] >= w[1]);
  }

  let p = &result.parameters;
  assert_eq!(p.num_states(), 1);
  assert_eq!(p.num_observations(), 1);
  let a = p.transition_matrix()[[0, 0]];
  assert!((a - 0.9).abs() < 0.15, "A = {}", a);
  assert!(p.process_noise_covariance()[[0, 0]] > 0.0);
  assert!(p.measurement_noise_covariance()[[0, 0]] >= 0.0);
}

#[test]
fn ssid_respects_the_mask_and_seeds_em() {
  let obs = observations_of(&ar1(), 600, 29);
  let options = SsidOptions {
    target_num_states: Some(1),
    max_lag: 4,
    estimate: ParametersToEstimate {
      initial_mean: false,
      initial_covariance: false,
      ..Default::default()
    },
    ..Default::default()
  };
  let result = ssid::identify(&obs, &options).unwrap();
  let p = &result.parameters;
  assert_eq!(p.initial_mean(), &arr1(&[0.0]));
  assert_eq!(p.initial_covariance(), &arr2(&[[1.0]]));

  let em = expectation_maximization(p, &obs, &EmOptions {
    max_iterations: 10,
    ..Default::default()
  }).unwrap();
  assert!(em.iterations() >= 1);
}

#[test]
fn ssid_needs_enough_samples() {
  let obs = Array::<f64, _>::zeros((39, 2));
  let r = ssid::identify(&obs, &Default::default());
  assert!(matches!(r, Err(Error::InsufficientTimeSteps { required: 40, found: 39 })));
}
