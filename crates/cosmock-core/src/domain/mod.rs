pub mod errors;

pub use errors::{PipelineError, PipelineErrorCategory, PipelineResult};

use std::fmt::{Display, Formatter};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Tracer {
    Elg,
    Lrg,
    Qso,
}

impl Tracer {
    pub const ALL: [Tracer; 3] = [Tracer::Elg, Tracer::Lrg, Tracer::Qso];

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Elg => "ELG",
            Self::Lrg => "LRG",
            Self::Qso => "QSO",
        }
    }

    pub fn parse(token: &str) -> Option<Self> {
        match token.trim().to_ascii_uppercase().as_str() {
            "ELG" => Some(Self::Elg),
            "LRG" => Some(Self::Lrg),
            "QSO" => Some(Self::Qso),
            _ => None,
        }
    }

    /// Key used for auto-correlation entries, e.g. `QSO_QSO`.
    pub fn pair_key(self) -> String {
        format!("{0}_{0}", self.as_str())
    }

    /// Catalog file name written by the HOD generator, e.g. `QSOs.dat`.
    pub fn catalog_file_name(self) -> String {
        format!("{}s.dat", self.as_str())
    }
}

impl Display for Tracer {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str((*self).as_str())
    }
}

/// Redshift-space-distortion variant of a mock: plain real space, RSD, or
/// RSD with the peculiar-velocity displacement draw.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct RsdVariant {
    pub want_rsd: bool,
    pub want_dv: bool,
}

impl RsdVariant {
    pub const fn new(want_rsd: bool, want_dv: bool) -> Self {
        Self { want_rsd, want_dv }
    }

    /// Directory suffix after `galaxies`: `""`, `"_rsd"` or `"_rsd_dv"`.
    pub fn dir_suffix(self) -> &'static str {
        match (self.want_rsd, self.want_dv) {
            (false, _) => "",
            (true, false) => "_rsd",
            (true, true) => "_rsd_dv",
        }
    }

    pub fn galaxies_dir_name(self) -> String {
        format!("galaxies{}", self.dir_suffix())
    }

    /// File-name extension handed to the generator; only the RSD+dv variant
    /// gets one.
    pub fn fn_ext(self) -> &'static str {
        if self.want_rsd && self.want_dv {
            "_dv"
        } else {
            ""
        }
    }
}

/// Tracer positions as three equal-length coordinate columns.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Positions {
    x: Vec<f64>,
    y: Vec<f64>,
    z: Vec<f64>,
}

impl Positions {
    pub fn from_columns(x: Vec<f64>, y: Vec<f64>, z: Vec<f64>) -> PipelineResult<Self> {
        if x.len() != y.len() || x.len() != z.len() {
            return Err(PipelineError::configuration(
                "INPUT.POSITION_LENGTHS",
                format!(
                    "coordinate sequences must have equal length, got x={}, y={}, z={}",
                    x.len(),
                    y.len(),
                    z.len()
                ),
            ));
        }
        Ok(Self { x, y, z })
    }

    pub fn len(&self) -> usize {
        self.x.len()
    }

    pub fn is_empty(&self) -> bool {
        self.x.is_empty()
    }

    pub fn x(&self) -> &[f64] {
        &self.x
    }

    pub fn y(&self) -> &[f64] {
        &self.y
    }

    pub fn z(&self) -> &[f64] {
        &self.z
    }

    pub fn rows(&self) -> impl Iterator<Item = [f64; 3]> + '_ {
        self.x
            .iter()
            .zip(&self.y)
            .zip(&self.z)
            .map(|((x, y), z)| [*x, *y, *z])
    }
}

#[cfg(test)]
mod tests {
    use super::{Positions, RsdVariant, Tracer};
    use crate::domain::PipelineErrorCategory;

    #[test]
    fn tracer_names_follow_generator_conventions() {
        assert_eq!(Tracer::parse("qso"), Some(Tracer::Qso));
        assert_eq!(Tracer::parse(" LRG "), Some(Tracer::Lrg));
        assert_eq!(Tracer::parse("BGS"), None);
        assert_eq!(Tracer::Qso.pair_key(), "QSO_QSO");
        assert_eq!(Tracer::Elg.catalog_file_name(), "ELGs.dat");
    }

    #[test]
    fn rsd_variant_encodes_directory_and_extension() {
        assert_eq!(RsdVariant::new(false, false).galaxies_dir_name(), "galaxies");
        assert_eq!(RsdVariant::new(false, true).galaxies_dir_name(), "galaxies");
        assert_eq!(RsdVariant::new(true, false).galaxies_dir_name(), "galaxies_rsd");
        assert_eq!(RsdVariant::new(true, true).galaxies_dir_name(), "galaxies_rsd_dv");

        assert_eq!(RsdVariant::new(true, true).fn_ext(), "_dv");
        assert_eq!(RsdVariant::new(true, false).fn_ext(), "");
        assert_eq!(RsdVariant::new(false, true).fn_ext(), "");
    }

    #[test]
    fn positions_reject_mismatched_columns() {
        let error = Positions::from_columns(vec![1.0, 2.0], vec![1.0], vec![1.0, 2.0])
            .expect_err("mismatched lengths should fail");
        assert_eq!(error.category(), PipelineErrorCategory::ConfigurationError);

        let positions =
            Positions::from_columns(vec![1.0, 2.0], vec![3.0, 4.0], vec![5.0, 6.0])
                .expect("equal lengths should succeed");
        let rows: Vec<[f64; 3]> = positions.rows().collect();
        assert_eq!(rows, vec![[1.0, 3.0, 5.0], [2.0, 4.0, 6.0]]);
    }
}
