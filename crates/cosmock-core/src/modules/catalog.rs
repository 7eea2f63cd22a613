//! Mock catalogs on disk: `#` header lines followed by whitespace rows of
//! `x y z [vx vy vz ...]`.

use crate::domain::{PipelineError, PipelineResult, Positions, Tracer};
use crate::modules::serialization::{format_scientific, read_numeric_rows, write_text_artifact};
use std::path::{Path, PathBuf};
use tracing::info;

#[derive(Debug, Clone, PartialEq, Default)]
pub struct MockCatalog {
    pub positions: Positions,
    /// `vx vy vz` when the file carries at least six columns.
    pub velocities: Option<Positions>,
}

impl MockCatalog {
    pub fn len(&self) -> usize {
        self.positions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }
}

pub fn read_catalog(path: &Path) -> PipelineResult<MockCatalog> {
    let rows = read_numeric_rows(path)?;
    let width = rows.iter().map(Vec::len).min().unwrap_or(3);
    if width < 3 {
        return Err(PipelineError::configuration(
            "INPUT.CATALOG_COLUMNS",
            format!(
                "catalog '{}' needs at least 3 columns, found a row with {}",
                path.display(),
                width
            ),
        ));
    }

    let column = |index: usize| rows.iter().map(|row| row[index]).collect::<Vec<_>>();
    let positions = Positions::from_columns(column(0), column(1), column(2))?;
    let velocities = if width >= 6 && !rows.is_empty() {
        Some(Positions::from_columns(column(3), column(4), column(5))?)
    } else {
        None
    };
    Ok(MockCatalog {
        positions,
        velocities,
    })
}

pub fn write_catalog(path: &Path, header: &[String], catalog: &MockCatalog) -> PipelineResult<()> {
    let mut content = String::new();
    for line in header {
        content.push_str("# ");
        content.push_str(line);
        content.push('\n');
    }
    let velocities = catalog.velocities.as_ref().map(|velocities| velocities.rows());
    let mut velocities = velocities.into_iter().flatten();
    for position in catalog.positions.rows() {
        let mut fields: Vec<String> = position.iter().copied().map(format_scientific).collect();
        if let Some(velocity) = velocities.next() {
            fields.extend(velocity.iter().copied().map(format_scientific));
        }
        content.push_str(&fields.join(" "));
        content.push('\n');
    }
    write_text_artifact(path, &content)
}

/// Location of an AbacusHOD redshift-space mock under a shared mock root.
#[derive(Debug, Clone, PartialEq)]
pub struct AbacusMockLocation {
    pub root: PathBuf,
    pub dir: String,
    pub sim: String,
    pub redshift: f64,
    /// Variant tag after `galaxies_rsd`, usually `_dv` or empty.
    pub hod: String,
    pub tracer: Tracer,
}

impl AbacusMockLocation {
    /// `<root>/<dir>/<sim>/z<redshift:.3>/galaxies_rsd<hod>/<tracer>s.dat`
    pub fn path(&self) -> PathBuf {
        self.root
            .join(&self.dir)
            .join(&self.sim)
            .join(format!("z{:.3}", self.redshift))
            .join(format!("galaxies_rsd{}", self.hod))
            .join(self.tracer.catalog_file_name())
    }
}

pub fn read_abacus_mock(location: &AbacusMockLocation) -> PipelineResult<Positions> {
    let path = location.path();
    info!("Loading mock from {}", path.display());
    Ok(read_catalog(&path)?.positions)
}

#[cfg(test)]
mod tests {
    use super::{AbacusMockLocation, MockCatalog, read_abacus_mock, read_catalog, write_catalog};
    use crate::domain::{Positions, Tracer};
    use std::fs;
    use std::path::PathBuf;
    use tempfile::TempDir;

    #[test]
    fn abacus_path_follows_mock_tree_layout() {
        let location = AbacusMockLocation {
            root: PathBuf::from("/scratch/hod"),
            dir: "mocks".to_string(),
            sim: "Abacus_pngbase_c302_ph000".to_string(),
            redshift: 3.0,
            hod: "_dv".to_string(),
            tracer: Tracer::Qso,
        };
        assert_eq!(
            location.path(),
            PathBuf::from(
                "/scratch/hod/mocks/Abacus_pngbase_c302_ph000/z3.000/galaxies_rsd_dv/QSOs.dat"
            )
        );
    }

    #[test]
    fn header_lines_are_skipped_and_velocities_detected() {
        let temp = TempDir::new().expect("tempdir should be created");
        let path = temp.path().join("QSOs.dat");
        fs::write(
            &path,
            "# AbacusHOD mock\n# x y z vx vy vz mass id\n1 2 3 10 20 30 1e12 7\n4 5 6 40 50 60 2e12 8\n",
        )
        .expect("fixture should be written");

        let catalog = read_catalog(&path).expect("catalog should parse");
        assert_eq!(catalog.len(), 2);
        assert_eq!(catalog.positions.z(), &[3.0, 6.0]);
        let velocities = catalog.velocities.expect("six columns carry velocities");
        assert_eq!(velocities.x(), &[10.0, 40.0]);
    }

    #[test]
    fn position_only_catalog_round_trips() {
        let temp = TempDir::new().expect("tempdir should be created");
        let path = temp.path().join("out/EZmock.dat");
        let catalog = MockCatalog {
            positions: Positions::from_columns(vec![0.5, 1.5], vec![2.5, 3.5], vec![4.5, 5.5])
                .expect("positions should build"),
            velocities: None,
        };

        write_catalog(&path, &["x y z".to_string()], &catalog).expect("catalog should write");
        let text = fs::read_to_string(&path).expect("catalog should be readable");
        assert!(text.starts_with("# x y z\n"));
        assert_eq!(read_catalog(&path).expect("catalog should parse"), catalog);
    }

    #[test]
    fn narrow_rows_are_rejected() {
        let temp = TempDir::new().expect("tempdir should be created");
        let path = temp.path().join("bad.dat");
        fs::write(&path, "1 2 3\n4 5\n").expect("fixture should be written");

        let error = read_catalog(&path).expect_err("two-column row should fail");
        assert_eq!(error.code(), "INPUT.CATALOG_COLUMNS");
    }

    #[test]
    fn abacus_reader_resolves_location() {
        let temp = TempDir::new().expect("tempdir should be created");
        let location = AbacusMockLocation {
            root: temp.path().to_path_buf(),
            dir: "mocks".to_string(),
            sim: "AbacusSummit_base_c000_ph000".to_string(),
            redshift: 2.0,
            hod: String::new(),
            tracer: Tracer::Lrg,
        };
        let path = location.path();
        fs::create_dir_all(path.parent().expect("mock path has a parent"))
            .expect("mock tree should be created");
        fs::write(&path, "#header\n1 1 1\n").expect("fixture should be written");

        let positions = read_abacus_mock(&location).expect("mock should load");
        assert_eq!(positions.len(), 1);
        assert!(path.ends_with("z2.000/galaxies_rsd/LRGs.dat"));
    }
}
