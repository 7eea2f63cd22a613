//! Gaussian log-likelihood of a theory prediction against observed
//! clustering and number densities.
//!
//! Observed data are loaded once per active tracer: the projected
//! correlation function `wp`, optionally the `xi` monopole and quadrupole,
//! and a covariance that is inverted up front. Each tracer may also carry a
//! Gaussian density prior.

use crate::common::config::{ClusteringType, HodParams, load_yaml_document};
use crate::domain::{PipelineError, PipelineResult, Tracer};
use crate::modules::serialization::{read_columns, read_numeric_rows};
use crate::numerics::{DenseMatrix, LinalgError, invert, leading_block, matrix_from_rows, quadratic_form};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TracerComboPaths {
    pub path2wp: PathBuf,
    /// Needed only when the full clustering vector is fitted.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path2xi02: Option<PathBuf>,
    pub path2cov: PathBuf,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct DataParams {
    /// Keyed by tracer pair, e.g. `QSO_QSO`.
    #[serde(default)]
    pub tracer_combos: BTreeMap<String, TracerComboPaths>,
    #[serde(default)]
    pub tracer_density_mean: BTreeMap<String, f64>,
    #[serde(default)]
    pub tracer_density_std: BTreeMap<String, f64>,
}

impl DataParams {
    pub fn load(path: &Path) -> PipelineResult<Self> {
        load_yaml_document(path, "data params")
    }
}

/// Theory prediction keyed the same way as the observations.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct TheoryPrediction {
    #[serde(default)]
    pub clustering: BTreeMap<String, Vec<f64>>,
    #[serde(default)]
    pub density: BTreeMap<String, f64>,
}

impl TheoryPrediction {
    pub fn load(path: &Path) -> PipelineResult<Self> {
        load_yaml_document(path, "theory prediction")
    }
}

/// What to do when the theory lacks a term the observations have.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MissingTermPolicy {
    /// Warn and leave the term out of the sum.
    #[default]
    Skip,
    Fail,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DensityPrior {
    pub mean: f64,
    pub std: f64,
}

#[derive(Debug, Clone)]
pub struct ObservedClustering {
    pub wp: Vec<f64>,
    pub xi02: Option<Vec<f64>>,
    /// `wp`, followed by `xi02` when present.
    pub vector: Vec<f64>,
    pub invcov: DenseMatrix,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct LoglikeTerms {
    pub clustering: f64,
    pub density: f64,
    /// Observation keys left out because the theory had no value for them.
    pub skipped: Vec<String>,
}

impl LoglikeTerms {
    pub fn total(&self) -> f64 {
        self.clustering + self.density
    }
}

#[derive(Debug, Clone)]
pub struct DataObject {
    clustering_type: ClusteringType,
    observed: BTreeMap<String, ObservedClustering>,
    density: BTreeMap<Tracer, DensityPrior>,
    policy: MissingTermPolicy,
}

impl DataObject {
    pub fn new(
        data_params: &DataParams,
        hod_params: &HodParams,
        clustering_type: ClusteringType,
    ) -> PipelineResult<Self> {
        let mut observed = BTreeMap::new();
        let mut density = BTreeMap::new();

        for tracer in hod_params.tracer_flags.active() {
            let key = tracer.pair_key();
            let Some(paths) = data_params.tracer_combos.get(&key) else {
                warn!(
                    "No data paths for composite key {}. Skipping tracer {}.",
                    key, tracer
                );
                continue;
            };
            observed.insert(key.clone(), load_observed(&key, paths, clustering_type)?);

            let mean = data_params.tracer_density_mean.get(tracer.as_str()).copied();
            let std = data_params.tracer_density_std.get(tracer.as_str()).copied();
            if mean.is_none() {
                warn!("Density mean not found for tracer {}.", tracer);
            }
            if std.is_none() {
                warn!("Density std not found for tracer {}.", tracer);
            }
            if let (Some(mean), Some(std)) = (mean, std) {
                density.insert(tracer, DensityPrior { mean, std });
            }
        }

        info!(
            "Loaded observed clustering for {} tracer pair(s) ({})",
            observed.len(),
            clustering_type.as_str()
        );
        Ok(Self {
            clustering_type,
            observed,
            density,
            policy: MissingTermPolicy::default(),
        })
    }

    pub fn with_policy(mut self, policy: MissingTermPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn policy(&self) -> MissingTermPolicy {
        self.policy
    }

    pub fn clustering_type(&self) -> ClusteringType {
        self.clustering_type
    }

    pub fn observed(&self, key: &str) -> Option<&ObservedClustering> {
        self.observed.get(key)
    }

    pub fn observed_keys(&self) -> impl Iterator<Item = &str> {
        self.observed.keys().map(String::as_str)
    }

    pub fn density_prior(&self, tracer: Tracer) -> Option<DensityPrior> {
        self.density.get(&tracer).copied()
    }

    pub fn compute_loglike(
        &self,
        theory_clustering: &BTreeMap<String, Vec<f64>>,
        theory_density: &BTreeMap<String, f64>,
    ) -> PipelineResult<f64> {
        self.compute_loglike_terms(theory_clustering, theory_density)
            .map(|terms| terms.total())
    }

    /// `-0.5 chi2` per tracer pair plus `-0.5 ((obs - theory) / std)^2` per
    /// density prior, reported separately.
    pub fn compute_loglike_terms(
        &self,
        theory_clustering: &BTreeMap<String, Vec<f64>>,
        theory_density: &BTreeMap<String, f64>,
    ) -> PipelineResult<LoglikeTerms> {
        let mut terms = LoglikeTerms::default();

        for (key, observed) in &self.observed {
            let Some(theory) = theory_clustering.get(key) else {
                self.missing_term(&mut terms, key, "clustering")?;
                continue;
            };
            if theory.len() != observed.vector.len() {
                return Err(PipelineError::computation(
                    "RUN.THEORY_LENGTH",
                    format!(
                        "theory clustering for {} has {} values, observed has {}",
                        key,
                        theory.len(),
                        observed.vector.len()
                    ),
                ));
            }
            let diff: Vec<f64> = observed
                .vector
                .iter()
                .zip(theory)
                .map(|(obs, model)| obs - model)
                .collect();
            let chi2 = quadratic_form(&observed.invcov, &diff)
                .map_err(|source| linalg_error("RUN.CHI2", key, source))?;
            terms.clustering += -0.5 * chi2;
        }

        for (tracer, prior) in &self.density {
            let Some(model) = theory_density.get(tracer.as_str()) else {
                self.missing_term(&mut terms, tracer.as_str(), "density")?;
                continue;
            };
            let diff = prior.mean - model;
            terms.density += -0.5 * (diff * diff / (prior.std * prior.std));
        }

        Ok(terms)
    }

    fn missing_term(&self, terms: &mut LoglikeTerms, key: &str, what: &str) -> PipelineResult<()> {
        match self.policy {
            MissingTermPolicy::Skip => {
                warn!("No theory {} for {}.", what, key);
                terms.skipped.push(key.to_string());
                Ok(())
            }
            MissingTermPolicy::Fail => Err(PipelineError::computation(
                "RUN.THEORY_MISSING",
                format!("no theory {} for {}", what, key),
            )),
        }
    }
}

fn load_observed(
    key: &str,
    paths: &TracerComboPaths,
    clustering_type: ClusteringType,
) -> PipelineResult<ObservedClustering> {
    let wp = read_columns(&paths.path2wp, &[1])?
        .pop()
        .unwrap_or_default();

    let xi02 = match clustering_type {
        ClusteringType::Wp => None,
        ClusteringType::All => {
            let path = paths.path2xi02.as_ref().ok_or_else(|| {
                PipelineError::configuration(
                    "CONFIG.DATA_XI02",
                    format!("path2xi02 is required for {} when clustering_type is all", key),
                )
            })?;
            // Monopole column, then quadrupole column.
            Some(read_columns(path, &[1, 3])?.concat())
        }
    };

    let covariance = matrix_from_rows(&read_numeric_rows(&paths.path2cov)?)
        .map_err(|source| linalg_error("INPUT.COVARIANCE", key, source))?;
    let covariance = match clustering_type {
        ClusteringType::Wp => leading_block(&covariance, wp.len())
            .map_err(|source| linalg_error("INPUT.COVARIANCE", key, source))?,
        ClusteringType::All => covariance,
    };

    let mut vector = wp.clone();
    if let Some(xi02) = &xi02 {
        vector.extend_from_slice(xi02);
    }
    if covariance.nrows() != vector.len() || covariance.ncols() != vector.len() {
        return Err(PipelineError::configuration(
            "INPUT.COVARIANCE_SHAPE",
            format!(
                "covariance for {} is {}x{}, clustering vector has {} values",
                key,
                covariance.nrows(),
                covariance.ncols(),
                vector.len()
            ),
        ));
    }
    let invcov =
        invert(&covariance).map_err(|source| linalg_error("RUN.COVARIANCE_INVERSION", key, source))?;

    Ok(ObservedClustering {
        wp,
        xi02,
        vector,
        invcov,
    })
}

fn linalg_error(code: &'static str, key: &str, source: LinalgError) -> PipelineError {
    PipelineError::computation(code, format!("{}: {}", key, source))
}
