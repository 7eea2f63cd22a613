//! EZmock population from precomputed 2LPT displacement fields.
//!
//! A setup pins the box, the growth parameters and the `d{x,y,z}_{seed}.txt`
//! displacement files. Each parameter set of a grid maps to one output
//! catalog whose name encodes the parameters; catalogs already on disk are
//! not regenerated.

mod engine;

pub use engine::CommandEzmock;

use crate::common::constants::HUBBLE_100;
use crate::domain::{PipelineError, PipelineResult};
use crate::modules::traits::EzmockEngine;
use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};
use std::path::{Path, PathBuf};
use tracing::info;

pub const DEFAULT_OMEGA_M: f64 = 0.3137721;
pub const DEFAULT_OMEGA_NU: f64 = 0.00141976532;
pub const DEFAULT_Z_PK: f64 = 1.0;

/// Factor applied to z-velocities to move tracers into redshift space.
pub fn rsd_factor(redshift: f64, omega_m: f64) -> f64 {
    let a_inv = 1.0 + redshift;
    a_inv / (HUBBLE_100 * (omega_m * a_inv.powi(3) + (1.0 - omega_m)).sqrt())
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GrowthParams {
    pub z_out: f64,
    pub z_pk: f64,
    pub omega_m: f64,
    pub omega_nu: f64,
}

impl GrowthParams {
    pub fn new(z_out: f64) -> Self {
        Self {
            z_out,
            z_pk: DEFAULT_Z_PK,
            omega_m: DEFAULT_OMEGA_M,
            omega_nu: DEFAULT_OMEGA_NU,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DisplacementFiles {
    pub dx: PathBuf,
    pub dy: PathBuf,
    pub dz: PathBuf,
}

impl DisplacementFiles {
    /// `<dir>/d{x,y,z}_{seed}.txt`; all three must exist.
    pub fn locate(dir: &Path, seed: &str) -> PipelineResult<Self> {
        let files = Self {
            dx: dir.join(format!("dx_{seed}.txt")),
            dy: dir.join(format!("dy_{seed}.txt")),
            dz: dir.join(format!("dz_{seed}.txt")),
        };
        for path in [&files.dx, &files.dy, &files.dz] {
            if !path.is_file() {
                return Err(PipelineError::configuration(
                    "INPUT.DISPLACEMENT_MISSING",
                    format!("displacement field '{}' does not exist", path.display()),
                ));
            }
        }
        Ok(files)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct EzmockSetup {
    pub lbox: f64,
    pub ngrid: usize,
    /// Free-form seed tag; also names the displacement files.
    pub seed: String,
    pub nthread: usize,
    pub growth: GrowthParams,
    pub displacement: DisplacementFiles,
}

impl EzmockSetup {
    pub fn new(
        lbox: f64,
        ngrid: usize,
        seed: impl Into<String>,
        nthread: usize,
        growth: GrowthParams,
        displacement_dir: &Path,
    ) -> PipelineResult<Self> {
        let seed = seed.into();
        let displacement = DisplacementFiles::locate(displacement_dir, &seed)?;
        Ok(Self {
            lbox,
            ngrid,
            seed,
            nthread,
            growth,
            displacement,
        })
    }

    pub fn rsd_factor(&self) -> f64 {
        rsd_factor(self.growth.z_out, self.growth.omega_m)
    }
}

/// Tracer-population parameters of one EZmock realisation.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EzmockParams {
    pub rho_c: f64,
    pub rho_exp: f64,
    pub pdf_base: f64,
    pub sigma_v: f64,
}

impl EzmockParams {
    /// Parses `rho_c,rho_exp,pdf_base,sigma_v`.
    pub fn parse(raw: &str) -> PipelineResult<Self> {
        let values = raw
            .split(',')
            .map(|token| token.trim().parse::<f64>())
            .collect::<Result<Vec<_>, _>>()
            .ok()
            .filter(|values| values.len() == 4)
            .ok_or_else(|| {
                PipelineError::configuration(
                    "INPUT.EZMOCK_PARAMS",
                    format!("expected rho_c,rho_exp,pdf_base,sigma_v, got '{}'", raw),
                )
            })?;
        Ok(Self {
            rho_c: values[0],
            rho_exp: values[1],
            pdf_base: values[2],
            sigma_v: values[3],
        })
    }
}

impl Display for EzmockParams {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "[{}, {}, {}, {}]",
            self.rho_c, self.rho_exp, self.pdf_base, self.sigma_v
        )
    }
}

/// `<odir>/EZmock_L{lbox}_N{ngrid}_fnl{fnl}_c{rho_c}_e{rho_exp}_b{pdf_base}_v{sigma_v}.dat`
/// with numbers in `%g` style.
pub fn ezmock_file_name(odir: &Path, lbox: f64, ngrid: usize, fnl: f64, params: &EzmockParams) -> PathBuf {
    odir.join(format!(
        "EZmock_L{}_N{}_fnl{}_c{}_e{}_b{}_v{}.dat",
        format_general(lbox),
        ngrid,
        format_general(fnl),
        format_general(params.rho_c),
        format_general(params.rho_exp),
        format_general(params.pdf_base),
        format_general(params.sigma_v)
    ))
}

/// C `%g`: six significant digits, trailing zeros dropped, exponent form
/// outside `1e-4 <= |v| < 1e6`.
pub fn format_general(value: f64) -> String {
    if value == 0.0 {
        return "0".to_string();
    }
    if !value.is_finite() {
        return value.to_string();
    }
    let scientific = format!("{value:.5e}");
    let Some((mantissa, exponent)) = scientific.split_once('e') else {
        return scientific;
    };
    let exponent: i32 = exponent.parse().unwrap_or(0);
    if !(-4..6).contains(&exponent) {
        let mantissa = trim_fraction(mantissa);
        let sign = if exponent < 0 { '-' } else { '+' };
        return format!("{mantissa}e{sign}{:02}", exponent.abs());
    }
    let decimals = (5 - exponent).max(0) as usize;
    trim_fraction(&format!("{value:.decimals$}")).to_string()
}

fn trim_fraction(text: &str) -> &str {
    if text.contains('.') {
        text.trim_end_matches('0').trim_end_matches('.')
    } else {
        text
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct EzmockGridRun {
    pub fnl: f64,
    pub ntracer: usize,
    pub output_dir: PathBuf,
}

/// Populates every parameter set whose catalog is missing and returns all
/// catalog paths in grid order.
pub fn run_ezmock_grid<E>(
    engine: &E,
    setup: &EzmockSetup,
    grid: &[EzmockParams],
    run: &EzmockGridRun,
) -> PipelineResult<Vec<PathBuf>>
where
    E: EzmockEngine + ?Sized,
{
    let rsd_factor = setup.rsd_factor();
    let mut files = Vec::with_capacity(grid.len());
    for params in grid {
        let path = ezmock_file_name(&run.output_dir, setup.lbox, setup.ngrid, run.fnl, params);
        if path.exists() {
            info!("Skipping existing EZmock {}", path.display());
        } else {
            info!("Running EZmock with parameters: {}", params);
            engine.populate_tracer_to_file(setup, params, run.ntracer, rsd_factor, &path)?;
        }
        files.push(path);
    }
    Ok(files)
}
