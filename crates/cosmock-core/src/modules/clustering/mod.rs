//! Reference clustering of a mock: power spectrum multipoles, correlation
//! function multipoles and bispectrum, each written as a text table.

mod estimator;
mod silencer;

pub use estimator::CommandEstimator;
pub use silencer::{OutputSilencer, silenced};

use crate::common::config::load_yaml_document;
use crate::common::constants::{CORRELATION_NMU, REFERENCE_LBOX, REFERENCE_NGRID};
use crate::common::environment::worker_count;
use crate::domain::{PipelineResult, Positions};
use crate::modules::serialization::write_table;
use crate::modules::traits::{BispectrumEstimator, CorrelationEstimator, PowerSpectrumEstimator};
use crate::numerics::linspace;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

pub const DEFAULT_CONFIG_PATH: &str = "conf/fitEZ.yaml";
pub const DEFAULT_CORRELATION_CONF: &str = "conf/fcfc_ref.conf";

pub const PK_HEADER: [&str; 8] = ["kcen", "kmin", "kmax", "kavg", "nmod", "P_0", "P_2", "P_4"];
pub const XI_HEADER: [&str; 5] = ["s", "smin", "smax", "xi0", "xi2"];
pub const BK_HEADER: [&str; 6] = ["theta", "theta_mean", "k3", "modes", "B", "Q"];

/// `clustering:` section of the reference-fit configuration file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReferenceClusteringConfig {
    pub clustering: ClusteringSections,
}

impl ReferenceClusteringConfig {
    pub fn load(path: &Path) -> PipelineResult<Self> {
        load_yaml_document(path, "reference clustering config")
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClusteringSections {
    pub pk: PkBins,
    pub xi: XiBins,
    pub bk: BkBins,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PkBins {
    pub kmin: f64,
    pub kmax: f64,
    pub nbin: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct XiBins {
    pub smin: f64,
    pub smax: f64,
    pub nbin: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BkBins {
    pub k1: f64,
    pub dk1: f64,
    pub k2: f64,
    pub dk2: f64,
    pub nbin: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MassAssignment {
    Cic,
    Tsc,
}

impl MassAssignment {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Cic => "CIC",
            Self::Tsc => "TSC",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PowerSpectrumConfig {
    pub ngrid: usize,
    pub lbox: f64,
    pub kmin: f64,
    pub kmax: f64,
    pub nbin: usize,
    pub ells: Vec<u32>,
    pub assign: MassAssignment,
    pub interlace: bool,
    pub ncpu: usize,
}

impl PowerSpectrumConfig {
    /// Monopole to hexadecapole on the reference grid, CIC with interlacing.
    pub fn new(kmin: f64, kmax: f64, nbin: usize, ncpu: usize) -> Self {
        Self {
            ngrid: REFERENCE_NGRID,
            lbox: REFERENCE_LBOX,
            kmin,
            kmax,
            nbin,
            ells: vec![0, 2, 4],
            assign: MassAssignment::Cic,
            interlace: true,
            ncpu,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PowerSpectrum {
    pub kcen: Vec<f64>,
    pub kmin: Vec<f64>,
    pub kmax: Vec<f64>,
    pub kavg: Vec<f64>,
    pub nmode: Vec<f64>,
    pub p0: Vec<f64>,
    pub p2: Vec<f64>,
    pub p4: Option<Vec<f64>>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CorrelationConfig {
    pub s_edges: Vec<f64>,
    pub nmu: usize,
    pub conf: PathBuf,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CorrelationFunction {
    pub s: Vec<f64>,
    pub smin: Vec<f64>,
    pub smax: Vec<f64>,
    pub xi0: Vec<f64>,
    pub xi2: Vec<f64>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct BispectrumConfig {
    pub ngrid: usize,
    pub lbox: f64,
    pub k1: f64,
    pub dk1: f64,
    pub k2: f64,
    pub dk2: f64,
    pub nbin: usize,
    pub assign: MassAssignment,
    pub interlace: bool,
    pub ncpu: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Bispectrum {
    pub theta: Vec<f64>,
    pub theta_mean: Vec<f64>,
    pub k3: Vec<f64>,
    pub modes: Vec<f64>,
    pub b: Vec<f64>,
    pub q: Vec<f64>,
}

/// Measures the reference statistics of one catalog with a single estimator
/// backend.
pub struct ReferenceMeasurement<'a, E: ?Sized> {
    estimator: &'a E,
    config: ReferenceClusteringConfig,
    ncpu: usize,
    correlation_conf: PathBuf,
}

impl<'a, E> ReferenceMeasurement<'a, E>
where
    E: PowerSpectrumEstimator + CorrelationEstimator + BispectrumEstimator + ?Sized,
{
    /// Worker count comes from `SLURM_CPUS_PER_TASK`.
    pub fn new(estimator: &'a E, config: ReferenceClusteringConfig) -> Self {
        Self {
            estimator,
            config,
            ncpu: worker_count(),
            correlation_conf: PathBuf::from(DEFAULT_CORRELATION_CONF),
        }
    }

    pub fn with_ncpu(mut self, ncpu: usize) -> Self {
        self.ncpu = ncpu.max(1);
        self
    }

    pub fn with_correlation_conf(mut self, conf: impl Into<PathBuf>) -> Self {
        self.correlation_conf = conf.into();
        self
    }

    pub fn ncpu(&self) -> usize {
        self.ncpu
    }

    pub fn measure_pk(&self, positions: &Positions, path: Option<&Path>) -> PipelineResult<PowerSpectrum> {
        let bins = self.config.clustering.pk;
        let config = PowerSpectrumConfig::new(bins.kmin, bins.kmax, bins.nbin, self.ncpu);
        let pk = self.estimator.powspec_box(positions, &config)?;
        if let Some(path) = path {
            let p4 = match &pk.p4 {
                Some(p4) => p4.clone(),
                None => {
                    warn!("P_4 is None, set to zero.");
                    vec![0.0; pk.p0.len()]
                }
            };
            write_table(
                path,
                &PK_HEADER,
                &[
                    pk.kcen.as_slice(),
                    pk.kmin.as_slice(),
                    pk.kmax.as_slice(),
                    pk.kavg.as_slice(),
                    pk.nmode.as_slice(),
                    pk.p0.as_slice(),
                    pk.p2.as_slice(),
                    p4.as_slice(),
                ],
            )?;
            info!("Saved power spectrum to {}", path.display());
        }
        Ok(pk)
    }

    pub fn measure_xi(
        &self,
        positions: &Positions,
        path: Option<&Path>,
    ) -> PipelineResult<CorrelationFunction> {
        let bins = self.config.clustering.xi;
        let config = CorrelationConfig {
            s_edges: linspace(bins.smin, bins.smax, bins.nbin + 1),
            nmu: CORRELATION_NMU,
            conf: self.correlation_conf.clone(),
        };
        let xi = silenced(|| self.estimator.compute_cf(positions, &config))?;
        if let Some(path) = path {
            write_table(
                path,
                &XI_HEADER,
                &[
                    xi.s.as_slice(),
                    xi.smin.as_slice(),
                    xi.smax.as_slice(),
                    xi.xi0.as_slice(),
                    xi.xi2.as_slice(),
                ],
            )?;
            info!("Saved correlation function to {}", path.display());
        }
        Ok(xi)
    }

    pub fn measure_bk(&self, positions: &Positions, path: Option<&Path>) -> PipelineResult<Bispectrum> {
        let bins = self.config.clustering.bk;
        let config = BispectrumConfig {
            ngrid: REFERENCE_NGRID,
            lbox: REFERENCE_LBOX,
            k1: bins.k1,
            dk1: bins.dk1,
            k2: bins.k2,
            dk2: bins.dk2,
            nbin: bins.nbin,
            assign: MassAssignment::Cic,
            interlace: true,
            ncpu: self.ncpu,
        };
        let bk = self.estimator.bispec_box(positions, &config)?;
        if let Some(path) = path {
            write_table(
                path,
                &BK_HEADER,
                &[
                    bk.theta.as_slice(),
                    bk.theta_mean.as_slice(),
                    bk.k3.as_slice(),
                    bk.modes.as_slice(),
                    bk.b.as_slice(),
                    bk.q.as_slice(),
                ],
            )?;
            info!("Saved bispectrum to {}", path.display());
        }
        Ok(bk)
    }

    /// Power spectrum, correlation function, then bispectrum.
    pub fn save_ref_clus(
        &self,
        positions: &Positions,
        pk_path: &Path,
        xi_path: &Path,
        bk_path: &Path,
    ) -> PipelineResult<()> {
        self.measure_pk(positions, Some(pk_path))?;
        self.measure_xi(positions, Some(xi_path))?;
        self.measure_bk(positions, Some(bk_path))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::{
        Bispectrum, BispectrumConfig, ClusteringSections, CorrelationConfig, CorrelationFunction,
        BkBins, PkBins, PowerSpectrum, PowerSpectrumConfig, ReferenceClusteringConfig,
        ReferenceMeasurement, XiBins,
    };
    use crate::domain::{PipelineError, PipelineResult, Positions};
    use crate::modules::serialization::NamedTable;
    use crate::modules::traits::{
        BispectrumEstimator, CorrelationEstimator, PowerSpectrumEstimator,
    };
    use std::cell::RefCell;
    use std::fs;
    use tempfile::TempDir;

    #[derive(Default)]
    struct FakeEstimator {
        with_p4: bool,
        fail_xi: bool,
        calls: RefCell<Vec<&'static str>>,
        xi_config: RefCell<Option<CorrelationConfig>>,
        pk_config: RefCell<Option<PowerSpectrumConfig>>,
    }

    impl PowerSpectrumEstimator for FakeEstimator {
        fn powspec_box(
            &self,
            positions: &Positions,
            config: &PowerSpectrumConfig,
        ) -> PipelineResult<PowerSpectrum> {
            self.calls.borrow_mut().push("pk");
            *self.pk_config.borrow_mut() = Some(config.clone());
            let n = positions.len() as f64;
            Ok(PowerSpectrum {
                kcen: vec![0.01, 0.03],
                kmin: vec![0.0, 0.02],
                kmax: vec![0.02, 0.04],
                kavg: vec![0.011, 0.031],
                nmode: vec![10.0, 30.0],
                p0: vec![n, n],
                p2: vec![1.0, 2.0],
                p4: self.with_p4.then(|| vec![3.0, 4.0]),
            })
        }
    }

    impl CorrelationEstimator for FakeEstimator {
        fn compute_cf(
            &self,
            _positions: &Positions,
            config: &CorrelationConfig,
        ) -> PipelineResult<CorrelationFunction> {
            self.calls.borrow_mut().push("xi");
            *self.xi_config.borrow_mut() = Some(config.clone());
            if self.fail_xi {
                return Err(PipelineError::external_process("RUN.ESTIMATOR", "pair count failed"));
            }
            let centers: Vec<f64> = config.s_edges.windows(2).map(|w| 0.5 * (w[0] + w[1])).collect();
            Ok(CorrelationFunction {
                smin: config.s_edges[..centers.len()].to_vec(),
                smax: config.s_edges[1..].to_vec(),
                xi0: vec![0.5; centers.len()],
                xi2: vec![-0.5; centers.len()],
                s: centers,
            })
        }
    }

    impl BispectrumEstimator for FakeEstimator {
        fn bispec_box(
            &self,
            _positions: &Positions,
            config: &BispectrumConfig,
        ) -> PipelineResult<Bispectrum> {
            self.calls.borrow_mut().push("bk");
            let n = config.nbin;
            Ok(Bispectrum {
                theta: vec![0.1; n],
                theta_mean: vec![0.1; n],
                k3: vec![0.05; n],
                modes: vec![100.0; n],
                b: vec![1.0e9; n],
                q: vec![0.8; n],
            })
        }
    }

    fn config() -> ReferenceClusteringConfig {
        ReferenceClusteringConfig {
            clustering: ClusteringSections {
                pk: PkBins {
                    kmin: 0.0,
                    kmax: 0.04,
                    nbin: 2,
                },
                xi: XiBins {
                    smin: 0.0,
                    smax: 200.0,
                    nbin: 40,
                },
                bk: BkBins {
                    k1: 0.04,
                    dk1: 0.01,
                    k2: 0.06,
                    dk2: 0.01,
                    nbin: 3,
                },
            },
        }
    }

    fn positions() -> Positions {
        Positions::from_columns(vec![1.0, 2.0, 3.0], vec![1.0; 3], vec![0.5; 3])
            .expect("positions should build")
    }

    #[test]
    fn config_file_parses_all_three_sections() {
        let temp = TempDir::new().expect("tempdir should be created");
        let path = temp.path().join("fitEZ.yaml");
        fs::write(
            &path,
            "clustering:\n  pk: {kmin: 0.0, kmax: 0.3, nbin: 30}\n  xi: {smin: 0, smax: 200, nbin: 40}\n  bk: {k1: 0.04, dk1: 0.01, k2: 0.06, dk2: 0.01, nbin: 20}\nfit: {nwalkers: 32}\n",
        )
        .expect("fixture should be written");

        let loaded = ReferenceClusteringConfig::load(&path).expect("config should parse");
        assert_eq!(loaded.clustering.pk.nbin, 30);
        assert_eq!(loaded.clustering.xi.smax, 200.0);
        assert_eq!(loaded.clustering.bk.k2, 0.06);
    }

    #[test]
    fn missing_hexadecapole_is_written_as_zeros() {
        let temp = TempDir::new().expect("tempdir should be created");
        let path = temp.path().join("pk.txt");
        let estimator = FakeEstimator::default();
        let measurement = ReferenceMeasurement::new(&estimator, config()).with_ncpu(8);

        let pk = measurement
            .measure_pk(&positions(), Some(&path))
            .expect("pk should be measured");
        assert_eq!(pk.p4, None);

        let table = NamedTable::read(&path).expect("pk table should parse");
        assert_eq!(table.names().join(" "), "kcen kmin kmax kavg nmod P_0 P_2 P_4");
        assert_eq!(table.column("P_4").expect("P_4 column"), vec![0.0, 0.0]);
        assert_eq!(table.column("P_0").expect("P_0 column"), vec![3.0, 3.0]);

        let pk_config = estimator.pk_config.borrow().clone().expect("pk config recorded");
        assert_eq!(pk_config.ngrid, 512);
        assert_eq!(pk_config.lbox, 2000.0);
        assert_eq!(pk_config.ells, vec![0, 2, 4]);
        assert_eq!(pk_config.ncpu, 8);
    }

    #[test]
    fn hexadecapole_is_kept_when_available() {
        let temp = TempDir::new().expect("tempdir should be created");
        let path = temp.path().join("pk.txt");
        let estimator = FakeEstimator {
            with_p4: true,
            ..FakeEstimator::default()
        };
        ReferenceMeasurement::new(&estimator, config())
            .measure_pk(&positions(), Some(&path))
            .expect("pk should be measured");

        let table = NamedTable::read(&path).expect("pk table should parse");
        assert_eq!(table.column("P_4").expect("P_4 column"), vec![3.0, 4.0]);
    }

    #[test]
    fn correlation_uses_linear_edges_and_fixed_mu_bins() {
        let _serial = super::silencer::descriptor_test_lock();
        let temp = TempDir::new().expect("tempdir should be created");
        let path = temp.path().join("xi.txt");
        let estimator = FakeEstimator::default();
        let measurement = ReferenceMeasurement::new(&estimator, config())
            .with_correlation_conf("conf/custom.conf");

        let xi = measurement
            .measure_xi(&positions(), Some(&path))
            .expect("xi should be measured");

        let xi_config = estimator.xi_config.borrow().clone().expect("xi config recorded");
        assert_eq!(xi_config.s_edges.len(), 41);
        assert_eq!(xi_config.s_edges[1], 5.0);
        assert_eq!(xi_config.nmu, 100);
        assert_eq!(xi_config.conf, std::path::PathBuf::from("conf/custom.conf"));
        assert_eq!(xi.s.len(), 40);
        let table = NamedTable::read(&path).expect("xi table should parse");
        assert_eq!(table.names().join(" "), "s smin smax xi0 xi2");
        assert_eq!(table.row_count(), 40);
    }

    #[test]
    fn failed_correlation_writes_nothing() {
        let _serial = super::silencer::descriptor_test_lock();
        let temp = TempDir::new().expect("tempdir should be created");
        let path = temp.path().join("xi.txt");
        let estimator = FakeEstimator {
            fail_xi: true,
            ..FakeEstimator::default()
        };

        let error = ReferenceMeasurement::new(&estimator, config())
            .measure_xi(&positions(), Some(&path))
            .expect_err("xi failure should propagate");
        assert_eq!(error.code(), "RUN.ESTIMATOR");
        assert!(!path.exists());
    }

    #[test]
    fn save_ref_clus_runs_all_statistics_in_order() {
        let _serial = super::silencer::descriptor_test_lock();
        let temp = TempDir::new().expect("tempdir should be created");
        let estimator = FakeEstimator::default();
        let pk = temp.path().join("ref/pk.txt");
        let xi = temp.path().join("ref/xi.txt");
        let bk = temp.path().join("ref/bk.txt");

        ReferenceMeasurement::new(&estimator, config())
            .save_ref_clus(&positions(), &pk, &xi, &bk)
            .expect("reference clustering should be saved");

        assert_eq!(*estimator.calls.borrow(), vec!["pk", "xi", "bk"]);
        let table = NamedTable::read(&bk).expect("bk table should parse");
        assert_eq!(table.names().join(" "), "theta theta_mean k3 modes B Q");
        assert_eq!(table.row_count(), 3);
        assert!(pk.is_file() && xi.is_file());
    }
}
