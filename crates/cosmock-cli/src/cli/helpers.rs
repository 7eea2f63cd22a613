use super::CliError;
use cosmock_core::common::environment::home_dir;
use cosmock_core::domain::{PipelineError, PipelineResult, Positions, Tracer};
use cosmock_core::modules::catalog::{AbacusMockLocation, read_abacus_mock, read_catalog};
use cosmock_core::modules::compare::CompareEntry;
use cosmock_core::modules::external::ExternalProgram;
use cosmock_core::modules::ezmock::EzmockParams;
use std::path::{Path, PathBuf};
use tracing::warn;

/// Default Abacus mock root used by the reference-clustering scripts.
pub(super) const DEFAULT_MOCK_ROOT: &str = "/pscratch/sd/s/siyizhao/desi-dr2-hod";

pub(super) fn external_program(program: &Path, args: &[String]) -> ExternalProgram {
    ExternalProgram::new(program).with_args(args.iter().cloned())
}

/// `$HOME`, or the current directory with a warning when it is unset.
pub(super) fn home_or_current() -> PathBuf {
    home_dir().unwrap_or_else(|| {
        warn!("HOME is not set; resolving default tool locations against '.'");
        PathBuf::from(".")
    })
}

pub(super) fn parse_tracer(raw: &str) -> Result<Tracer, String> {
    Tracer::parse(raw).ok_or_else(|| format!("unknown tracer '{raw}', expected ELG, LRG or QSO"))
}

pub(super) fn parse_ezmock_params(raw: &str) -> Result<EzmockParams, String> {
    EzmockParams::parse(raw).map_err(|error| error.message().to_string())
}

pub(super) fn parse_compare_entry(raw: &str) -> Result<CompareEntry, String> {
    CompareEntry::parse(raw).map_err(|error| error.message().to_string())
}

/// Catalog positions either from an explicit file or from the Abacus layout.
pub(super) fn load_positions(
    catalog: Option<&Path>,
    location: Option<AbacusMockLocation>,
) -> PipelineResult<Positions> {
    match (catalog, location) {
        (Some(path), _) => Ok(read_catalog(path)?.positions),
        (None, Some(location)) => read_abacus_mock(&location),
        (None, None) => Err(PipelineError::configuration(
            "INPUT.CLI_CATALOG",
            "either --catalog or --sim must name the mock to measure",
        )),
    }
}

pub(super) fn print_paths(label: &str, paths: &[PathBuf]) {
    for path in paths {
        println!("{label}: {}", path.display());
    }
}

pub(super) fn to_json_line<T: serde::Serialize>(value: &T) -> Result<String, CliError> {
    serde_json::to_string(value).map_err(|source| {
        CliError::Internal(anyhow::Error::new(source).context("failed to encode JSON output"))
    })
}

#[cfg(test)]
mod tests {
    use super::{load_positions, parse_tracer};
    use cosmock_core::domain::Tracer;
    use cosmock_core::modules::catalog::AbacusMockLocation;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn tracers_parse_case_insensitively() {
        assert_eq!(parse_tracer("qso"), Ok(Tracer::Qso));
        assert!(parse_tracer("BGS").is_err());
    }

    #[test]
    fn explicit_catalog_wins_over_abacus_location() {
        let temp = TempDir::new().expect("tempdir should be created");
        let catalog = temp.path().join("mock.dat");
        fs::write(&catalog, "# x y z\n1 2 3\n4 5 6\n").expect("catalog should be written");
        let location = AbacusMockLocation {
            root: temp.path().join("missing"),
            dir: "Abacus_pngbase".to_string(),
            sim: "Abacus_pngbase_c300_ph000".to_string(),
            redshift: 2.5,
            hod: "_dv".to_string(),
            tracer: Tracer::Qso,
        };

        let positions = load_positions(Some(&catalog), Some(location.clone()))
            .expect("explicit catalog should load");
        assert_eq!(positions.len(), 2);

        let error = load_positions(None, Some(location)).expect_err("missing mock should fail");
        assert_eq!(error.code(), "IO.TABLE_READ");
        assert!(load_positions(None, None).is_err());
    }
}
