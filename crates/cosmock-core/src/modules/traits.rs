use crate::common::config::ClusteringParams;
use crate::domain::{PipelineResult, Positions, Tracer};
use crate::modules::clustering::{
    Bispectrum, BispectrumConfig, CorrelationConfig, CorrelationFunction, PowerSpectrum,
    PowerSpectrumConfig,
};
use crate::modules::compare::{FftPowerConfig, PowerPoles};
use crate::modules::ezmock::{EzmockParams, EzmockSetup};
use crate::modules::mock::{HodRunRequest, MockSet, MultipoleRequest};
use ndarray::Array2;
use std::path::{Path, PathBuf};

/// A configured HOD generator bound to one simulation snapshot.
pub trait HodGenerator {
    fn want_rsd(&self) -> bool;
    fn set_want_rsd(&mut self, want_rsd: bool);
    fn want_dv(&self) -> bool;
    fn set_want_dv(&mut self, want_dv: bool);
    fn tracers(&self) -> Vec<Tracer>;
    fn output_dir(&self) -> &Path;
    /// Directory holding the `galaxies*` variant directories of this snapshot.
    fn mock_dir(&self) -> PathBuf;
    /// Binning used by [`HodGenerator::compute_multipole`] requests.
    fn clustering_params(&self) -> &ClusteringParams;
    fn run_hod(&self, request: &HodRunRequest) -> PipelineResult<MockSet>;
    fn compute_multipole(
        &self,
        mocks: &MockSet,
        request: &MultipoleRequest,
    ) -> PipelineResult<Array2<f64>>;
}

pub trait PowerSpectrumEstimator {
    fn powspec_box(
        &self,
        positions: &Positions,
        config: &PowerSpectrumConfig,
    ) -> PipelineResult<PowerSpectrum>;
}

pub trait CorrelationEstimator {
    fn compute_cf(
        &self,
        positions: &Positions,
        config: &CorrelationConfig,
    ) -> PipelineResult<CorrelationFunction>;
}

pub trait BispectrumEstimator {
    fn bispec_box(
        &self,
        positions: &Positions,
        config: &BispectrumConfig,
    ) -> PipelineResult<Bispectrum>;
}

/// FFT-based power spectrum multipoles of a periodic box.
pub trait MultipoleEstimator {
    fn power_poles(&self, positions: &Positions, config: &FftPowerConfig)
    -> PipelineResult<PowerPoles>;
}

pub trait EzmockEngine {
    fn populate_tracer_to_file(
        &self,
        setup: &EzmockSetup,
        params: &EzmockParams,
        ntracer: usize,
        rsd_factor: f64,
        output: &Path,
    ) -> PipelineResult<()>;
}
