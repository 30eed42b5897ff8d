//! JSON persistence for parameter sets.

use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::Path;

use serde::de::DeserializeOwned;
use serde::Serialize;

use nac::{Real, Result};

use crate::params::KalmanFilterParameters;

pub fn save_parameters<P, E>(path: P, params: &KalmanFilterParameters<E>) -> Result<()>
  where P: AsRef<Path>,
        E: Real + Serialize,
{
  let mut out = BufWriter::new(File::create(path.as_ref())?);
  serde_json::to_writer_pretty(&mut out, params)?;
  out.flush()?;
  debug!(path = %path.as_ref().display(), "saved parameters");
  Ok(())
}

/// Reads a parameter set written by [`save_parameters`]. The matrices are
/// checked for consistent dimensions exactly as on construction.
pub fn load_parameters<P, E>(path: P) -> Result<KalmanFilterParameters<E>>
  where P: AsRef<Path>,
        E: Real + DeserializeOwned,
{
  let input = BufReader::new(File::open(path.as_ref())?);
  let params: KalmanFilterParameters<E> = serde_json::from_reader(input)?;
  params.validate()?;
  Ok(params)
}

#[cfg(test)]
mod tests {
  use std::fs;

  use nd::{arr1, arr2};
  use tempfile::tempdir;

  use super::*;
  use nac::Error;
  use crate::params::ParametersBuilder;

  #[test]
  fn round_trip() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("params.json");

    let p: KalmanFilterParameters<f64> = ParametersBuilder::new()
      .transition_matrix(arr2(&[[0.9, 0.1], [0.0, 0.95]]))
      .measurement_function(arr2(&[[1.0, 0.5]]))
      .process_noise_variance(0.125)
      .measurement_noise_variance(0.3)
      .initial_mean(arr1(&[0.1, -0.2]))
      .build()
      .unwrap();
    save_parameters(&path, &p).unwrap();
    let back: KalmanFilterParameters<f64> = load_parameters(&path).unwrap();
    assert_eq!(back, p);
  }

  #[test]
  fn missing_file_is_an_io_error() {
    let dir = tempdir().unwrap();
    let r = load_parameters::<_, f64>(dir.path().join("nope.json"));
    assert!(matches!(r, Err(Error::Io(_))));
  }

  #[test]
  fn inconsistent_file_is_rejected() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("params.json");
    let p = KalmanFilterParameters::<f64>::with_dimensions(2, 1).unwrap();
    let mut json: serde_json::Value =
      serde_json::from_str(&serde_json::to_string(&p).unwrap()).unwrap();
    json["initial_mean"] = serde_json::to_value(arr1(&[0.0, 0.0, 0.0])).unwrap();
    fs::write(&path, json.to_string()).unwrap();

    let r = load_parameters::<_, f64>(&path);
    assert!(matches!(r, Err(Error::Shape { what: "Initial mean", .. })));
  }
}
