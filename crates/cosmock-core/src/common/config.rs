//! Typed mock-generation configuration and the save-then-reload assembler.
//!
//! A configuration document has three sections, `sim_params`, `HOD_params`
//! and `clustering_params`. Required fields fail at load time; optional ones
//! carry the defaults documented on each field. Keys this crate does not
//! model are kept in the `extra` mapping of the section they appear in, so a
//! save/load cycle never drops generator options.

use crate::domain::{PipelineError, PipelineResult, Tracer};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_yaml::Mapping;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::info;

pub const DEFAULT_TEMPLATE_PATH: &str = "example.yaml";
pub const CONFIG_FILE_NAME: &str = "config.yaml";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MockConfig {
    pub sim_params: SimParams,
    #[serde(rename = "HOD_params")]
    pub hod_params: HodParams,
    #[serde(default = "omitted_clustering_params")]
    pub clustering_params: ClusteringParams,
}

impl MockConfig {
    pub fn into_parts(self) -> (SimParams, HodParams, ClusteringParams) {
        (self.sim_params, self.hod_params, self.clustering_params)
    }
}

impl Default for MockConfig {
    /// QSO-only configuration for the `c300` PNG base box at z = 2.5.
    fn default() -> Self {
        Self {
            sim_params: SimParams {
                cleaned_halos: true,
                output_dir: PathBuf::from("./abacus_hod/"),
                sim_dir: PathBuf::from("/global/cfs/projectdirs/desi/cosmosim/Abacus/"),
                sim_name: "Abacus_pngbase_c300_ph000".to_string(),
                subsample_dir: PathBuf::from("./subsample_desidr2_profile_withAB/"),
                z_mock: 2.5,
                force_mt: true,
                extra: Mapping::new(),
            },
            hod_params: HodParams {
                tracer_flags: TracerFlags {
                    elg: false,
                    lrg: false,
                    qso: true,
                },
                use_particles: false,
                use_profiles: true,
                want_ab: true,
                want_rsd: true,
                want_dv: true,
                write_to_disk: false,
                elg_params: None,
                lrg_params: None,
                qso_params: Some(TracerHodParams {
                    log_m_cut: 12.03,
                    log_m1: 13.11,
                    sigma: 0.08,
                    alpha: 1.03,
                    kappa: 0.39,
                    alpha_c: Some(0.92),
                    alpha_s: Some(2.7),
                    ic: Some(1.0),
                    profile_code: Some(1),
                    extra: Mapping::new(),
                }),
                dv_draw_q: Some(PathBuf::from("./dv_draws/QSO_z2.3-2.8_CDF.npz")),
                extra: Mapping::new(),
            },
            clustering_params: ClusteringParams::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimParams {
    /// Use halo catalogs with merger-tree cleaning applied. Default `true`.
    #[serde(default = "default_true")]
    pub cleaned_halos: bool,
    /// Root for mocks and persisted configuration. Default `./`.
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,
    pub sim_dir: PathBuf,
    pub sim_name: String,
    /// Pre-computed halo/particle subsamples. Default empty.
    #[serde(default)]
    pub subsample_dir: PathBuf,
    pub z_mock: f64,
    /// Force multithreaded loading in the generator. Default `false`.
    #[serde(default)]
    pub force_mt: bool,
    #[serde(flatten)]
    pub extra: Mapping,
}

impl SimParams {
    /// `<output_dir>/<sim_name>/z<z_mock:.3>`, the generator's mock directory.
    pub fn mock_dir(&self) -> PathBuf {
        self.output_dir
            .join(&self.sim_name)
            .join(format!("z{:.3}", self.z_mock))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct TracerFlags {
    #[serde(rename = "ELG", default)]
    pub elg: bool,
    #[serde(rename = "LRG", default)]
    pub lrg: bool,
    #[serde(rename = "QSO", default)]
    pub qso: bool,
}

impl TracerFlags {
    pub fn is_active(&self, tracer: Tracer) -> bool {
        match tracer {
            Tracer::Elg => self.elg,
            Tracer::Lrg => self.lrg,
            Tracer::Qso => self.qso,
        }
    }

    pub fn active(&self) -> Vec<Tracer> {
        Tracer::ALL
            .into_iter()
            .filter(|tracer| self.is_active(*tracer))
            .collect()
    }
}

/// Occupation parameters for one tracer. The five Zheng07 parameters are
/// required; everything else the generator understands goes to `extra`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TracerHodParams {
    #[serde(rename = "logM_cut")]
    pub log_m_cut: f64,
    #[serde(rename = "logM1")]
    pub log_m1: f64,
    pub sigma: f64,
    pub alpha: f64,
    pub kappa: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alpha_c: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alpha_s: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ic: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub profile_code: Option<i64>,
    #[serde(flatten)]
    pub extra: Mapping,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HodParams {
    #[serde(default)]
    pub tracer_flags: TracerFlags,
    #[serde(default)]
    pub use_particles: bool,
    #[serde(default)]
    pub use_profiles: bool,
    /// Assembly bias terms. Default `false`.
    #[serde(rename = "want_AB", default)]
    pub want_ab: bool,
    #[serde(default)]
    pub want_rsd: bool,
    /// Draw peculiar-velocity displacements (only meaningful with RSD).
    #[serde(default)]
    pub want_dv: bool,
    #[serde(default)]
    pub write_to_disk: bool,
    #[serde(rename = "ELG_params", default, skip_serializing_if = "Option::is_none")]
    pub elg_params: Option<TracerHodParams>,
    #[serde(rename = "LRG_params", default, skip_serializing_if = "Option::is_none")]
    pub lrg_params: Option<TracerHodParams>,
    #[serde(rename = "QSO_params", default, skip_serializing_if = "Option::is_none")]
    pub qso_params: Option<TracerHodParams>,
    /// CDF table for the QSO velocity-displacement draw.
    #[serde(rename = "dv_draw_Q", default, skip_serializing_if = "Option::is_none")]
    pub dv_draw_q: Option<PathBuf>,
    #[serde(flatten)]
    pub extra: Mapping,
}

impl HodParams {
    pub fn tracer_params(&self, tracer: Tracer) -> Option<&TracerHodParams> {
        match tracer {
            Tracer::Elg => self.elg_params.as_ref(),
            Tracer::Lrg => self.lrg_params.as_ref(),
            Tracer::Qso => self.qso_params.as_ref(),
        }
    }
}

/// Defaults to `wp` when a configuration omits the key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ClusteringType {
    /// Projected correlation function only.
    #[default]
    Wp,
    /// Projected correlation function followed by the xi monopole and
    /// quadrupole.
    All,
}

impl ClusteringType {
    /// `wp` in any case selects [`ClusteringType::Wp`]; every other value
    /// selects [`ClusteringType::All`].
    pub fn parse(token: &str) -> Self {
        if token.trim().eq_ignore_ascii_case("wp") {
            Self::Wp
        } else {
            Self::All
        }
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Wp => "wp",
            Self::All => "all",
        }
    }
}

impl Serialize for ClusteringType {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for ClusteringType {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Ok(Self::parse(&raw))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BinParams {
    pub logmax: f64,
    pub logmin: f64,
    pub nbins: usize,
}

impl BinParams {
    /// `nbins + 1` logarithmically spaced edges from `10^logmin` to `10^logmax`.
    pub fn rp_edges(&self) -> Vec<f64> {
        if self.nbins == 0 {
            return vec![10f64.powf(self.logmin)];
        }
        let step = (self.logmax - self.logmin) / self.nbins as f64;
        (0..=self.nbins)
            .map(|index| 10f64.powf(self.logmin + step * index as f64))
            .collect()
    }
}

impl Default for BinParams {
    fn default() -> Self {
        Self {
            logmax: 1.5,
            logmin: -1.0,
            nbins: 15,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClusteringParams {
    #[serde(default)]
    pub bin_params: BinParams,
    #[serde(default)]
    pub clustering_type: ClusteringType,
    #[serde(default = "default_pi_extent")]
    pub pi_bin_size: u32,
    #[serde(default = "default_pi_extent")]
    pub pimax: u32,
    #[serde(flatten)]
    pub extra: Mapping,
}

impl Default for ClusteringParams {
    fn default() -> Self {
        Self {
            bin_params: BinParams::default(),
            clustering_type: ClusteringType::All,
            pi_bin_size: default_pi_extent(),
            pimax: default_pi_extent(),
            extra: Mapping::new(),
        }
    }
}

/// Section defaults for a file without `clustering_params`.
fn omitted_clustering_params() -> ClusteringParams {
    ClusteringParams {
        clustering_type: ClusteringType::Wp,
        ..ClusteringParams::default()
    }
}

fn default_true() -> bool {
    true
}

fn default_output_dir() -> PathBuf {
    PathBuf::from("./")
}

fn default_pi_extent() -> u32 {
    40
}

/// Resolves where a configuration lives and makes the persisted file the
/// single source of truth: every fresh configuration is written, then read
/// back.
#[derive(Debug, Clone)]
pub struct ConfigAssembler {
    template_path: PathBuf,
}

impl Default for ConfigAssembler {
    fn default() -> Self {
        Self {
            template_path: PathBuf::from(DEFAULT_TEMPLATE_PATH),
        }
    }
}

impl ConfigAssembler {
    pub fn with_template_path(template_path: impl Into<PathBuf>) -> Self {
        Self {
            template_path: template_path.into(),
        }
    }

    pub fn template_path(&self) -> &Path {
        &self.template_path
    }

    pub fn assemble(
        &self,
        config: Option<&MockConfig>,
        config_path: Option<&Path>,
    ) -> PipelineResult<MockConfig> {
        match (config, config_path) {
            (Some(config), path) => {
                let path = match path {
                    Some(path) => path.to_path_buf(),
                    None => config_path_in_output_dir(&config.sim_params)?,
                };
                info!("config provided, saving to: {}", path.display());
                save_config(config, &path)?;
                load_config(&path)
            }
            (None, Some(path)) => load_config(path),
            (None, None) => {
                info!(
                    "No config or file provided. Using an example configuration and saving it to: {}",
                    self.template_path.display()
                );
                save_config(&MockConfig::default(), &self.template_path)?;
                load_config(&self.template_path)
            }
        }
    }
}

fn config_path_in_output_dir(sim_params: &SimParams) -> PipelineResult<PathBuf> {
    let output_dir = &sim_params.output_dir;
    if !output_dir.exists() {
        fs::create_dir_all(output_dir).map_err(|source| {
            PipelineError::io_system(
                "IO.CONFIG_OUTPUT_DIRECTORY",
                format!(
                    "failed to create output directory '{}': {}",
                    output_dir.display(),
                    source
                ),
            )
        })?;
        info!("Created output directory: {}", output_dir.display());
    }
    Ok(output_dir.join(CONFIG_FILE_NAME))
}

pub fn load_config(path: &Path) -> PipelineResult<MockConfig> {
    load_yaml_document(path, "configuration file")
}

pub fn save_config(config: &MockConfig, path: &Path) -> PipelineResult<()> {
    save_yaml_document(config, path, "configuration")
}

/// Reads and deserializes any YAML input; `what` names the document in errors.
pub fn load_yaml_document<T: DeserializeOwned>(path: &Path, what: &str) -> PipelineResult<T> {
    let content = fs::read_to_string(path).map_err(|source| {
        PipelineError::io_system(
            "IO.CONFIG_READ",
            format!("Error loading {} '{}': {}", what, path.display(), source),
        )
    })?;
    serde_yaml::from_str(&content).map_err(|source| {
        PipelineError::configuration(
            "CONFIG.PARSE",
            format!("Error loading {} '{}': {}", what, path.display(), source),
        )
    })
}

pub fn save_yaml_document<T: Serialize>(value: &T, path: &Path, what: &str) -> PipelineResult<()> {
    let content = serde_yaml::to_string(value).map_err(|source| {
        PipelineError::internal(
            "SYS.CONFIG_SERIALIZE",
            format!("Error serializing {} for '{}': {}", what, path.display(), source),
        )
    })?;
    fs::write(path, content).map_err(|source| {
        PipelineError::io_system(
            "IO.CONFIG_WRITE",
            format!("Error saving {} to '{}': {}", what, path.display(), source),
        )
    })
}
