//! Power spectrum multipoles of several catalogs, one table per catalog, for
//! side-by-side comparison of fast mocks against HOD mocks.

use crate::common::constants::{PI, REFERENCE_LBOX};
use crate::domain::{PipelineError, PipelineResult};
use crate::modules::catalog::read_catalog;
use crate::modules::clustering::MassAssignment;
use crate::modules::serialization::write_table;
use crate::modules::traits::MultipoleEstimator;
use crate::numerics::linspace;
use std::fmt::{Display, Formatter};
use std::path::{Path, PathBuf};
use tracing::info;

pub const POLES_HEADER: [&str; 3] = ["k", "P0", "P2"];
pub const DEFAULT_NMESH: usize = 256;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineOfSight {
    X,
    Y,
    Z,
}

impl Display for LineOfSight {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::X => "x",
            Self::Y => "y",
            Self::Z => "z",
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct FftPowerConfig {
    pub lbox: f64,
    pub nmesh: usize,
    /// Shared by every catalog in a comparison so the tables line up.
    pub k_edges: Vec<f64>,
    pub ells: Vec<u32>,
    pub mu_bins: usize,
    pub resampler: MassAssignment,
    pub interlacing: u32,
    pub los: LineOfSight,
}

impl FftPowerConfig {
    /// Monopole and quadrupole along `z`, TSC with third-order interlacing,
    /// binned on edges derived from the `edges_lbox` box.
    pub fn for_box(lbox: f64, nmesh: usize, edges_lbox: f64) -> Self {
        Self {
            lbox,
            nmesh,
            k_edges: k_edges(nmesh, edges_lbox),
            ells: vec![0, 2],
            mu_bins: 4,
            resampler: MassAssignment::Tsc,
            interlacing: 3,
            los: LineOfSight::Z,
        }
    }

}

/// `nmesh/2 + 1` linear edges from 0 to the Nyquist wavenumber.
pub fn k_edges(nmesh: usize, lbox: f64) -> Vec<f64> {
    linspace(0.0, nmesh as f64 * PI / lbox, nmesh / 2 + 1)
}

#[derive(Debug, Clone, PartialEq)]
pub struct PowerPoles {
    pub k: Vec<f64>,
    pub p0: Vec<f64>,
    pub p2: Vec<f64>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CompareEntry {
    /// Names the output table, e.g. `ezmock_fnl500`.
    pub label: String,
    pub catalog: PathBuf,
    pub lbox: f64,
}

impl CompareEntry {
    /// Parses `label=path@lbox`.
    pub fn parse(raw: &str) -> PipelineResult<Self> {
        let invalid = || {
            PipelineError::configuration(
                "INPUT.COMPARE_ENTRY",
                format!("expected LABEL=PATH@LBOX, got '{}'", raw),
            )
        };
        let (label, rest) = raw.split_once('=').ok_or_else(invalid)?;
        let (path, lbox) = rest.rsplit_once('@').ok_or_else(invalid)?;
        let lbox = lbox.trim().parse::<f64>().map_err(|_| invalid())?;
        if label.trim().is_empty() || path.trim().is_empty() || lbox <= 0.0 {
            return Err(invalid());
        }
        Ok(Self {
            label: label.trim().to_string(),
            catalog: PathBuf::from(path.trim()),
            lbox,
        })
    }
}

/// Binning shared by all catalogs of one comparison.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CompareBinning {
    pub nmesh: usize,
    /// Box size the k edges are derived from, independent of each catalog's
    /// own box.
    pub edges_lbox: f64,
}

impl Default for CompareBinning {
    fn default() -> Self {
        Self {
            nmesh: DEFAULT_NMESH,
            edges_lbox: REFERENCE_LBOX,
        }
    }
}

/// Writes `<out_dir>/<label>_poles.txt` for every entry and returns the
/// table paths in entry order.
pub fn compare_catalogs<E>(
    estimator: &E,
    entries: &[CompareEntry],
    binning: CompareBinning,
    out_dir: &Path,
) -> PipelineResult<Vec<PathBuf>>
where
    E: MultipoleEstimator + ?Sized,
{
    if binning.edges_lbox <= 0.0 {
        return Err(PipelineError::configuration(
            "INPUT.COMPARE_EDGES",
            format!("k-edge box size must be positive, got {}", binning.edges_lbox),
        ));
    }
    let mut tables = Vec::with_capacity(entries.len());
    for entry in entries {
        info!("Loading catalog {} from {}", entry.label, entry.catalog.display());
        let catalog = read_catalog(&entry.catalog)?;
        let config = FftPowerConfig::for_box(entry.lbox, binning.nmesh, binning.edges_lbox);
        let poles = estimator.power_poles(&catalog.positions, &config)?;

        let path = out_dir.join(format!("{}_poles.txt", entry.label));
        write_table(
            &path,
            &POLES_HEADER,
            &[poles.k.as_slice(), poles.p0.as_slice(), poles.p2.as_slice()],
        )?;
        info!("Saved multipoles of {} to {}", entry.label, path.display());
        tables.push(path);
    }
    Ok(tables)
}
