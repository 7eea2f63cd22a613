//! Process-environment lookups shared by the drivers.
//!
//! Nothing here mutates the environment of the running process. Child
//! processes receive their variables through [`std::process::Command::env`].

use crate::domain::{PipelineError, PipelineResult};
use std::ffi::{OsStr, OsString};
use std::path::{Path, PathBuf};
use tracing::warn;

pub const LIBRARY_PATH_VAR: &str = "LD_LIBRARY_PATH";
pub const THREAD_COUNT_VAR: &str = "OMP_NUM_THREADS";
pub const SLURM_CPUS_VAR: &str = "SLURM_CPUS_PER_TASK";

pub fn home_dir() -> Option<PathBuf> {
    std::env::var_os("HOME")
        .filter(|value| !value.is_empty())
        .map(PathBuf::from)
}

/// Worker count for external estimators, taken from `SLURM_CPUS_PER_TASK`.
pub fn worker_count() -> usize {
    worker_count_from(std::env::var(SLURM_CPUS_VAR).ok().as_deref())
}

pub fn worker_count_from(raw: Option<&str>) -> usize {
    match raw.map(str::trim) {
        None | Some("") => 1,
        Some(value) => match value.parse::<usize>() {
            Ok(count) if count > 0 => count,
            _ => {
                warn!("ignoring {}='{}'; using 1 worker", SLURM_CPUS_VAR, value);
                1
            }
        },
    }
}

/// `dirs` followed by the non-empty entries of an inherited search path, so
/// the new directories take precedence. Inherited entries are carried as raw
/// OS strings.
pub fn prepend_search_path(dirs: &[PathBuf], existing: Option<&OsStr>) -> PipelineResult<OsString> {
    let inherited = existing
        .into_iter()
        .flat_map(|value| std::env::split_paths(value))
        .filter(|entry| !entry.as_os_str().is_empty());
    std::env::join_paths(dirs.iter().cloned().chain(inherited)).map_err(|source| {
        PipelineError::configuration(
            "CONFIG.LIBRARY_PATH",
            format!("cannot build {}: {}", LIBRARY_PATH_VAR, source),
        )
    })
}

/// Expands a leading `~/` against `home`.
pub fn expand_home(path: &Path, home: &Path) -> PathBuf {
    match path.strip_prefix("~") {
        Ok(rest) => home.join(rest),
        Err(_) => path.to_path_buf(),
    }
}
