//! Displacement fields from the 2LPT initial-conditions binary.
//!
//! Each run writes `r{seed}.param`, launches the binary on it with the
//! FFTW2/GSL library directories on the loader path, and captures both
//! output streams in `2lpt_r{seed}.log`.

mod params;

pub use params::{Disp2LptParams, PARAM_KEYS, render_2lpt_params, write_2lpt_params};

use crate::common::environment::{
    LIBRARY_PATH_VAR, THREAD_COUNT_VAR, expand_home, prepend_search_path,
};
use crate::domain::{PipelineError, PipelineResult};
use crate::modules::external::{ExternalProgram, status_text};
use std::ffi::{OsStr, OsString};
use std::fs::{self, File};
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tracing::{error, info};

pub const DEFAULT_PROGRAM: &str = "~/lib/2LPTic_PNG/2LPTnonlocal";
pub const DEFAULT_LIBRARY_DIRS: [&str; 2] = ["~/lib/fftw-2.1.5/lib", "~/.conda/envs/ezmock_png/lib"];
pub const DEFAULT_PARAM_DIR: &str = "conf_2lpt/params_2lpt";
pub const DEFAULT_LOG_DIR: &str = "logs";

#[derive(Debug, Clone, PartialEq)]
pub struct Disp2LptSettings {
    pub program: ExternalProgram,
    /// Prepended to the child's `LD_LIBRARY_PATH`, in order.
    pub library_dirs: Vec<PathBuf>,
    pub param_dir: PathBuf,
    pub log_dir: PathBuf,
}

impl Disp2LptSettings {
    /// Default tool locations under `home`.
    pub fn from_home(home: &Path) -> Self {
        Self {
            program: ExternalProgram::new(expand_home(Path::new(DEFAULT_PROGRAM), home)),
            library_dirs: DEFAULT_LIBRARY_DIRS
                .iter()
                .map(|dir| expand_home(Path::new(dir), home))
                .collect(),
            param_dir: PathBuf::from(DEFAULT_PARAM_DIR),
            log_dir: PathBuf::from(DEFAULT_LOG_DIR),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Disp2LptRun {
    pub param_path: PathBuf,
    pub log_path: PathBuf,
}

/// Variables set on the child. The thread count is only pinned when the
/// parent has none.
pub fn child_environment(
    library_dirs: &[PathBuf],
    inherited_library_path: Option<&OsStr>,
    inherited_threads: Option<&OsStr>,
) -> PipelineResult<Vec<(&'static str, OsString)>> {
    let mut vars = vec![(
        LIBRARY_PATH_VAR,
        prepend_search_path(library_dirs, inherited_library_path)?,
    )];
    if inherited_threads.is_none() {
        vars.push((THREAD_COUNT_VAR, OsString::from("1")));
    }
    Ok(vars)
}

#[derive(Debug, Clone)]
pub struct Disp2LptRunner {
    settings: Disp2LptSettings,
}

impl Disp2LptRunner {
    pub fn new(settings: Disp2LptSettings) -> Self {
        Self { settings }
    }

    pub fn settings(&self) -> &Disp2LptSettings {
        &self.settings
    }

    pub fn run(&self, params: &Disp2LptParams) -> PipelineResult<Disp2LptRun> {
        let param_path = self.settings.param_dir.join(params.param_file_name());
        write_2lpt_params(params, &param_path)?;
        info!("Generated {}", param_path.display());
        info!("Generating 2LPT displacement field for seed {}...", params.seed);

        fs::create_dir_all(&self.settings.log_dir).map_err(|source| {
            PipelineError::io_system(
                "IO.DISP2LPT_LOG_DIR",
                format!(
                    "failed to create log directory '{}': {}",
                    self.settings.log_dir.display(),
                    source
                ),
            )
        })?;
        let log_path = self.settings.log_dir.join(params.log_file_name());
        let log_file = File::create(&log_path).map_err(|source| log_error(&log_path, source))?;
        let stderr_log = log_file
            .try_clone()
            .map_err(|source| log_error(&log_path, source))?;

        let child_vars = child_environment(
            &self.settings.library_dirs,
            std::env::var_os(LIBRARY_PATH_VAR).as_deref(),
            std::env::var_os(THREAD_COUNT_VAR).as_deref(),
        )?;
        let mut command = self.settings.program.command();
        command
            .arg(&param_path)
            .envs(child_vars)
            .stdout(Stdio::from(log_file))
            .stderr(Stdio::from(stderr_log));

        let status = command.status().map_err(|source| {
            PipelineError::io_system(
                "IO.DISP2LPT_EXEC",
                format!(
                    "failed to execute '{}': {}",
                    self.settings.program.program().display(),
                    source
                ),
            )
        })?;
        if !status.success() {
            error!(
                "2LPT failed for seed {}, {}. See {}",
                params.seed,
                status_text(status),
                log_path.display()
            );
            return Err(PipelineError::external_process(
                "RUN.DISP2LPT",
                format!(
                    "2LPT failed for seed {} with {}; see '{}'",
                    params.seed,
                    status_text(status),
                    log_path.display()
                ),
            ));
        }

        info!("Done. LOG: {}", log_path.display());
        Ok(Disp2LptRun {
            param_path,
            log_path,
        })
    }
}

fn log_error(path: &Path, source: std::io::Error) -> PipelineError {
    PipelineError::io_system(
        "IO.DISP2LPT_LOG",
        format!("failed to open log file '{}': {}", path.display(), source),
    )
}

#[cfg(test)]
mod tests {
    use super::{Disp2LptParams, Disp2LptRunner, Disp2LptSettings, child_environment};
    use crate::domain::PipelineErrorCategory;
    use crate::modules::external::ExternalProgram;
    use std::ffi::{OsStr, OsString};
    use std::fs;
    use std::path::{Path, PathBuf};
    use tempfile::TempDir;

    fn settings_in(root: &Path, script: &str) -> Disp2LptSettings {
        Disp2LptSettings {
            program: ExternalProgram::new("/bin/sh").with_args(["-c", script, "2LPTnonlocal"]),
            library_dirs: vec![PathBuf::from("/opt/fftw-2.1.5/lib")],
            param_dir: root.join("conf_2lpt/params_2lpt"),
            log_dir: root.join("logs"),
        }
    }

    #[test]
    fn default_settings_point_into_home() {
        let settings = Disp2LptSettings::from_home(Path::new("/home/user"));
        assert_eq!(
            settings.program.program(),
            Path::new("/home/user/lib/2LPTic_PNG/2LPTnonlocal")
        );
        assert_eq!(
            settings.library_dirs,
            vec![
                PathBuf::from("/home/user/lib/fftw-2.1.5/lib"),
                PathBuf::from("/home/user/.conda/envs/ezmock_png/lib"),
            ]
        );
        assert_eq!(settings.param_dir, PathBuf::from("conf_2lpt/params_2lpt"));
        assert_eq!(settings.log_dir, PathBuf::from("logs"));
    }

    #[cfg(unix)]
    #[test]
    fn child_environment_prepends_libraries_and_pins_threads() {
        let dirs = vec![PathBuf::from("/a/lib"), PathBuf::from("/b/lib")];

        let vars = child_environment(&dirs, Some(OsStr::new("/usr/lib")), None)
            .expect("environment should build");
        assert_eq!(
            vars,
            vec![
                ("LD_LIBRARY_PATH", OsString::from("/a/lib:/b/lib:/usr/lib")),
                ("OMP_NUM_THREADS", OsString::from("1")),
            ]
        );

        let vars = child_environment(&dirs, None, Some(OsStr::new("8")))
            .expect("environment should build");
        assert_eq!(
            vars,
            vec![("LD_LIBRARY_PATH", OsString::from("/a/lib:/b/lib"))]
        );
    }

    #[cfg(unix)]
    #[test]
    fn child_environment_keeps_non_utf8_inherited_values() {
        use std::os::unix::ffi::{OsStrExt, OsStringExt};

        let inherited = OsStr::from_bytes(b"/scratch/\xfelib");
        let vars = child_environment(&[PathBuf::from("/a/lib")], Some(inherited), Some(inherited))
            .expect("environment should build");
        assert_eq!(vars.len(), 1, "an inherited thread count is never overridden");
        assert_eq!(vars[0].0, "LD_LIBRARY_PATH");
        assert_eq!(vars[0].1.clone().into_vec(), b"/a/lib:/scratch/\xfelib".to_vec());
    }

    #[cfg(unix)]
    #[test]
    fn successful_run_captures_both_streams_in_log() {
        let temp = TempDir::new().expect("tempdir should be created");
        let script = "echo \"param=$1\"; echo \"ld=$LD_LIBRARY_PATH\"; echo warning >&2";
        let runner = Disp2LptRunner::new(settings_in(temp.path(), script));

        let run = runner
            .run(&Disp2LptParams::new(42, 2.0, 600.0))
            .expect("run should succeed");

        assert_eq!(run.param_path, temp.path().join("conf_2lpt/params_2lpt/r42.param"));
        assert_eq!(run.log_path, temp.path().join("logs/2lpt_r42.log"));
        assert!(run.param_path.is_file());
        let log = fs::read_to_string(&run.log_path).expect("log should be readable");
        assert!(log.contains(&format!("param={}", run.param_path.display())));
        assert!(log.contains("ld=/opt/fftw-2.1.5/lib"));
        assert!(log.contains("warning"));
    }

    #[cfg(unix)]
    #[test]
    fn failing_binary_yields_external_process_error() {
        let temp = TempDir::new().expect("tempdir should be created");
        let runner = Disp2LptRunner::new(settings_in(temp.path(), "echo 'glass missing'; exit 1"));

        let error = runner
            .run(&Disp2LptParams::new(7, 2.0, 0.0))
            .expect_err("non-zero exit should fail");

        assert_eq!(error.category(), PipelineErrorCategory::ExternalProcessError);
        assert_eq!(error.code(), "RUN.DISP2LPT");
        assert!(error.message().contains("seed 7"));
        assert!(error.message().contains("exit code 1"));
        let log = fs::read_to_string(temp.path().join("logs/2lpt_r7.log"))
            .expect("log should still be written");
        assert!(log.contains("glass missing"));
    }

    #[cfg(unix)]
    #[test]
    fn rerun_truncates_previous_log() {
        let temp = TempDir::new().expect("tempdir should be created");
        let log_path = temp.path().join("logs/2lpt_r3.log");
        fs::create_dir_all(log_path.parent().expect("log has a parent"))
            .expect("log dir should be created");
        fs::write(&log_path, "stale output\n").expect("stale log should be written");

        let runner = Disp2LptRunner::new(settings_in(temp.path(), "echo fresh"));
        runner
            .run(&Disp2LptParams::new(3, 2.0, 0.0))
            .expect("run should succeed");

        assert_eq!(
            fs::read_to_string(&log_path).expect("log should be readable"),
            "fresh\n"
        );
    }
}
