//! HOD mock generation for one snapshot, with optional persistence of the
//! run configuration and the multipole clustering array.

mod generator;

pub use generator::CommandHodGenerator;

use crate::common::config::{CONFIG_FILE_NAME, ClusteringParams, MockConfig, load_config, save_config};
use crate::common::constants::{MULTIPOLE_NBINS_MU, MULTIPOLE_SBIN_OFFSET};
use crate::domain::{PipelineError, PipelineResult, RsdVariant, Tracer};
use crate::modules::catalog::MockCatalog;
use crate::modules::serialization::{ensure_parent_dir, write_npy_array};
use crate::modules::traits::HodGenerator;
use ndarray::Array2;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::info;

pub const CLUSTERING_FILE_NAME: &str = "clustering.npy";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HodRunRequest {
    pub tracers: Vec<Tracer>,
    pub want_rsd: bool,
    pub nthread: usize,
    pub verbose: bool,
    pub write_to_disk: bool,
    pub fn_ext: String,
}

/// Generated catalogs keyed by tracer.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct MockSet {
    catalogs: BTreeMap<Tracer, MockCatalog>,
}

impl MockSet {
    pub fn insert(&mut self, tracer: Tracer, catalog: MockCatalog) {
        self.catalogs.insert(tracer, catalog);
    }

    pub fn get(&self, tracer: Tracer) -> Option<&MockCatalog> {
        self.catalogs.get(&tracer)
    }

    pub fn iter(&self) -> impl Iterator<Item = (Tracer, &MockCatalog)> {
        self.catalogs.iter().map(|(tracer, catalog)| (*tracer, catalog))
    }

    pub fn len(&self) -> usize {
        self.catalogs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.catalogs.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct MultipoleRequest {
    pub rpbins: Vec<f64>,
    pub sbins: Vec<f64>,
    pub pimax: f64,
    pub nbins_mu: usize,
    pub nthread: usize,
}

impl MultipoleRequest {
    /// Projected bins from the configured edges; the redshift-space bins
    /// drop the five smallest edges.
    pub fn from_params(params: &ClusteringParams, nthread: usize) -> Self {
        let rpbins = params.bin_params.rp_edges();
        let sbins = rpbins
            .get(MULTIPOLE_SBIN_OFFSET..)
            .map(<[f64]>::to_vec)
            .unwrap_or_default();
        Self {
            rpbins,
            sbins,
            pimax: f64::from(params.pimax),
            nbins_mu: MULTIPOLE_NBINS_MU,
            nthread,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ComputeAllOptions {
    /// Persist catalogs, the run configuration and the clustering array.
    pub out: bool,
    /// Configuration to persist; loaded from `<output_dir>/config.yaml` when
    /// absent.
    pub config: Option<MockConfig>,
    pub want_rsd: Option<bool>,
    pub want_dv: Option<bool>,
    pub want_clustering: bool,
    pub nthread: usize,
    pub verbose: bool,
}

impl Default for ComputeAllOptions {
    fn default() -> Self {
        Self {
            out: false,
            config: None,
            want_rsd: None,
            want_dv: None,
            want_clustering: false,
            nthread: 1,
            verbose: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct MockRun {
    pub mocks: MockSet,
    pub clustering: Option<Array2<f64>>,
    pub variant_dir: PathBuf,
    pub config_path: Option<PathBuf>,
    pub clustering_path: Option<PathBuf>,
}

/// `<mock_dir>/galaxies`, `galaxies_rsd` or `galaxies_rsd_dv`.
pub fn variant_dir(mock_dir: &Path, variant: RsdVariant) -> PathBuf {
    mock_dir.join(variant.galaxies_dir_name())
}

pub fn compute_all<G>(generator: &mut G, options: ComputeAllOptions) -> PipelineResult<MockRun>
where
    G: HodGenerator + ?Sized,
{
    if let Some(want_rsd) = options.want_rsd {
        info!("Original want_rsd: {}", generator.want_rsd());
        generator.set_want_rsd(want_rsd);
        info!("Set want_rsd to {}", want_rsd);
    }
    if let Some(want_dv) = options.want_dv {
        info!("Original want_dv: {}", generator.want_dv());
        generator.set_want_dv(want_dv);
        info!("Set want_dv to {}", want_dv);
    }
    let variant = RsdVariant::new(generator.want_rsd(), generator.want_dv());

    let mocks = generator.run_hod(&HodRunRequest {
        tracers: generator.tracers(),
        want_rsd: variant.want_rsd,
        nthread: options.nthread,
        verbose: options.verbose,
        write_to_disk: options.out,
        fn_ext: variant.fn_ext().to_string(),
    })?;

    let variant_dir = variant_dir(&generator.mock_dir(), variant);
    let config_path = if options.out {
        let mut config = match options.config {
            Some(config) => config,
            None => load_run_config(generator.output_dir())?,
        };
        config.hod_params.want_rsd = variant.want_rsd;
        config.hod_params.want_dv = variant.want_dv;
        let path = variant_dir.join(CONFIG_FILE_NAME);
        ensure_parent_dir(&path)?;
        save_config(&config, &path)?;
        Some(path)
    } else {
        None
    };

    let mut clustering = None;
    let mut clustering_path = None;
    if options.want_clustering {
        info!("Computing clustering...");
        let request = MultipoleRequest::from_params(generator.clustering_params(), options.nthread);
        let array = generator.compute_multipole(&mocks, &request)?;
        if options.out {
            info!("Saving clustering to disk...");
            let path = variant_dir.join(CLUSTERING_FILE_NAME);
            write_npy_array(&path, &array)?;
            info!("Save clustering to: {}", path.display());
            clustering_path = Some(path);
        }
        clustering = Some(array);
    }

    Ok(MockRun {
        mocks,
        clustering,
        variant_dir,
        config_path,
        clustering_path,
    })
}

fn load_run_config(output_dir: &Path) -> PipelineResult<MockConfig> {
    load_config(&output_dir.join(CONFIG_FILE_NAME)).map_err(|error| {
        PipelineError::configuration(
            "CONFIG.MOCK_OUTPUT",
            format!(
                "Error loading config: {}, please provide a configuration when writing mocks to disk",
                error.message()
            ),
        )
    })
}
