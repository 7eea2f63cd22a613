use super::{HodRunRequest, MockSet, MultipoleRequest, variant_dir};
use crate::common::config::{ClusteringParams, MockConfig};
use crate::domain::{PipelineResult, RsdVariant, Tracer};
use crate::modules::catalog::{read_catalog, write_catalog};
use crate::modules::external::{ExternalProgram, ScratchDir, join_list};
use crate::modules::serialization::{read_numeric_rows, rows_to_array};
use crate::modules::traits::HodGenerator;
use ndarray::Array2;
use std::path::{Path, PathBuf};
use tracing::info;

/// HOD generator driven through an external program's `run-hod` and
/// `multipole` subcommands.
#[derive(Debug, Clone)]
pub struct CommandHodGenerator {
    program: ExternalProgram,
    config_path: PathBuf,
    output_dir: PathBuf,
    mock_dir: PathBuf,
    tracers: Vec<Tracer>,
    want_rsd: bool,
    want_dv: bool,
    clustering: ClusteringParams,
}

impl CommandHodGenerator {
    /// `config_path` is where `config` was persisted; the program reads it.
    pub fn new(program: ExternalProgram, config: &MockConfig, config_path: impl Into<PathBuf>) -> Self {
        Self {
            program,
            config_path: config_path.into(),
            output_dir: config.sim_params.output_dir.clone(),
            mock_dir: config.sim_params.mock_dir(),
            tracers: config.hod_params.tracer_flags.active(),
            want_rsd: config.hod_params.want_rsd,
            want_dv: config.hod_params.want_dv,
            clustering: config.clustering_params.clone(),
        }
    }

    fn collect_catalogs(&self, dir: &Path, tracers: &[Tracer]) -> PipelineResult<MockSet> {
        let mut mocks = MockSet::default();
        for tracer in tracers {
            let catalog = read_catalog(&dir.join(tracer.catalog_file_name()))?;
            info!("{}: {} galaxies", tracer, catalog.len());
            mocks.insert(*tracer, catalog);
        }
        Ok(mocks)
    }
}

impl HodGenerator for CommandHodGenerator {
    fn want_rsd(&self) -> bool {
        self.want_rsd
    }

    fn set_want_rsd(&mut self, want_rsd: bool) {
        self.want_rsd = want_rsd;
    }

    fn want_dv(&self) -> bool {
        self.want_dv
    }

    fn set_want_dv(&mut self, want_dv: bool) {
        self.want_dv = want_dv;
    }

    fn tracers(&self) -> Vec<Tracer> {
        self.tracers.clone()
    }

    fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    fn mock_dir(&self) -> PathBuf {
        self.mock_dir.clone()
    }

    fn clustering_params(&self) -> &ClusteringParams {
        &self.clustering
    }

    fn run_hod(&self, request: &HodRunRequest) -> PipelineResult<MockSet> {
        // Catalogs not meant for disk still pass through a scratch directory.
        let scratch;
        let catalog_dir = if request.write_to_disk {
            variant_dir(&self.mock_dir, RsdVariant::new(request.want_rsd, self.want_dv))
        } else {
            scratch = ScratchDir::new("hod")?;
            scratch.path().to_path_buf()
        };

        let tracer_list = request
            .tracers
            .iter()
            .map(|tracer| tracer.as_str())
            .collect::<Vec<_>>()
            .join(",");
        let mut command = self.program.command();
        command
            .arg("run-hod")
            .arg("--config")
            .arg(&self.config_path)
            .arg("--tracers")
            .arg(tracer_list)
            .arg("--nthread")
            .arg(request.nthread.to_string())
            .arg("--output-dir")
            .arg(&catalog_dir);
        if request.want_rsd {
            command.arg("--rsd");
        }
        if self.want_dv {
            command.arg("--dv");
        }
        if !request.fn_ext.is_empty() {
            command.arg("--fn-ext").arg(&request.fn_ext);
        }
        if request.verbose {
            command.arg("--verbose");
        }
        self.program.run_captured(&mut command, "RUN.HOD_GENERATOR")?;

        self.collect_catalogs(&catalog_dir, &request.tracers)
    }

    fn compute_multipole(
        &self,
        mocks: &MockSet,
        request: &MultipoleRequest,
    ) -> PipelineResult<Array2<f64>> {
        let scratch = ScratchDir::new("multipole")?;
        let mut command = self.program.command();
        command.arg("multipole");
        for (tracer, catalog) in mocks.iter() {
            let path = scratch.join(&tracer.catalog_file_name());
            write_catalog(&path, &[], catalog)?;
            command
                .arg("--catalog")
                .arg(format!("{}={}", tracer, path.display()));
        }
        let output = scratch.join("clustering.txt");
        command
            .arg("--rpbins")
            .arg(join_list(&request.rpbins))
            .arg("--sbins")
            .arg(join_list(&request.sbins))
            .arg("--pimax")
            .arg(request.pimax.to_string())
            .arg("--nbins-mu")
            .arg(request.nbins_mu.to_string())
            .arg("--nthread")
            .arg(request.nthread.to_string())
            .arg("--output")
            .arg(&output);
        self.program.run_captured(&mut command, "RUN.HOD_MULTIPOLE")?;

        rows_to_array(&output, &read_numeric_rows(&output)?)
    }
}
