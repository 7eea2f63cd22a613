mod commands;
mod dispatch;
mod helpers;

use clap::Parser;
use cosmock_core::domain::PipelineError;
use dispatch::command_alias_from_program_name;

pub fn run_from_env() -> i32 {
    let mut args = std::env::args();
    let program_name = args.next().unwrap_or_else(|| "cosmock".to_string());
    let remaining: Vec<String> = args.collect();

    match run_with_program_name(&program_name, remaining) {
        Ok(code) => code,
        Err(error) => {
            let pipeline_error = error.as_pipeline_error();
            eprintln!("{}", pipeline_error.diagnostic_line());
            if let Some(summary_line) = pipeline_error.fatal_exit_line() {
                eprintln!("{}", summary_line);
            }
            pipeline_error.exit_code()
        }
    }
}

pub fn run<I, S>(args: I) -> Result<i32, CliError>
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    let full_args = std::iter::once("cosmock".to_string())
        .chain(args.into_iter().map(Into::into))
        .collect::<Vec<_>>();
    parse_and_dispatch(full_args)
}

fn run_with_program_name(program_name: &str, args: Vec<String>) -> Result<i32, CliError> {
    let alias = command_alias_from_program_name(program_name);
    let full_args = std::iter::once("cosmock".to_string())
        .chain(alias.map(str::to_string))
        .chain(args)
        .collect::<Vec<_>>();
    parse_and_dispatch(full_args)
}

fn parse_and_dispatch(args: Vec<String>) -> Result<i32, CliError> {
    match Cli::try_parse_from(&args) {
        Ok(cli) => dispatch_parsed(cli.command),
        Err(err) => match err.kind() {
            clap::error::ErrorKind::DisplayHelp | clap::error::ErrorKind::DisplayVersion => {
                print!("{}", err);
                Ok(0)
            }
            _ => Err(CliError::Usage(err.to_string())),
        },
    }
}

#[derive(Parser)]
#[command(
    name = "cosmock",
    version,
    about = "Mock-catalog and clustering pipeline driver"
)]
struct Cli {
    #[command(subcommand)]
    command: CliCommand,
}

#[derive(clap::Subcommand)]
enum CliCommand {
    /// Generate HOD mocks and their clustering from a configuration
    HodMock(commands::HodMockArgs),
    /// Write a 2LPT parameter file and run the displacement-field binary
    Disp2lpt(commands::Disp2LptArgs),
    /// Measure reference P(k), xi(s) and B(k) of a mock catalog
    RefClustering(commands::RefClusteringArgs),
    /// Populate EZmock catalogs over a parameter grid
    Ezmock(commands::EzmockArgs),
    /// Write power spectrum multipoles of several catalogs
    Compare(commands::CompareArgs),
    /// Evaluate the Gaussian log-likelihood of a theory prediction
    Loglike(commands::LoglikeArgs),
}

fn dispatch_parsed(command: CliCommand) -> Result<i32, CliError> {
    match command {
        CliCommand::HodMock(args) => commands::run_hod_mock_command(args),
        CliCommand::Disp2lpt(args) => commands::run_disp2lpt_command(args),
        CliCommand::RefClustering(args) => commands::run_ref_clustering_command(args),
        CliCommand::Ezmock(args) => commands::run_ezmock_command(args),
        CliCommand::Compare(args) => commands::run_compare_command(args),
        CliCommand::Loglike(args) => commands::run_loglike_command(args),
    }
}

#[derive(Debug, thiserror::Error)]
pub enum CliError {
    #[error("{0}")]
    Usage(String),
    #[error("{0}")]
    Compute(PipelineError),
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl From<PipelineError> for CliError {
    fn from(error: PipelineError) -> Self {
        Self::Compute(error)
    }
}

impl CliError {
    fn as_pipeline_error(&self) -> PipelineError {
        match self {
            Self::Usage(message) => PipelineError::configuration("INPUT.CLI_USAGE", message.clone()),
            Self::Compute(error) => error.clone(),
            Self::Internal(error) => PipelineError::io_system("IO.CLI", format!("{error:#}")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{CliError, run};
    use cosmock_core::domain::{PipelineError, PipelineErrorCategory};

    #[test]
    fn help_and_version_exit_cleanly() {
        assert_eq!(run(["--help"]).expect("help should succeed"), 0);
        assert_eq!(run(["--version"]).expect("version should succeed"), 0);
        assert_eq!(run(["disp2lpt", "--help"]).expect("help should succeed"), 0);
    }

    #[test]
    fn unknown_subcommand_is_a_usage_error() {
        let error = run(["fit-everything"]).expect_err("unknown command should fail");
        assert!(matches!(error, CliError::Usage(_)));
        assert_eq!(error.as_pipeline_error().exit_code(), 2);
    }

    #[test]
    fn errors_keep_their_exit_codes() {
        let compute = CliError::from(PipelineError::external_process("RUN.DISP2LPT", "failed"));
        assert_eq!(compute.as_pipeline_error().exit_code(), 4);

        let internal = CliError::from(anyhow::anyhow!("broken pipe"));
        assert_eq!(
            internal.as_pipeline_error().category(),
            PipelineErrorCategory::IoSystemError
        );
    }
}
