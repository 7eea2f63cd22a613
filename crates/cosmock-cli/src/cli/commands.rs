use super::CliError;
use super::helpers::*;
use cosmock_core::common::config::{
    CONFIG_FILE_NAME, ClusteringType, ConfigAssembler, MockConfig, load_config,
};
use cosmock_core::common::constants::REFERENCE_LBOX;
use cosmock_core::domain::Tracer;
use cosmock_core::modules::catalog::AbacusMockLocation;
use cosmock_core::modules::clustering::{
    CommandEstimator, DEFAULT_CONFIG_PATH, DEFAULT_CORRELATION_CONF, ReferenceClusteringConfig,
    ReferenceMeasurement,
};
use cosmock_core::modules::compare::{
    CompareBinning, CompareEntry, DEFAULT_NMESH, compare_catalogs,
};
use cosmock_core::modules::disp2lpt::{Disp2LptParams, Disp2LptRunner, Disp2LptSettings};
use cosmock_core::modules::ezmock::{
    CommandEzmock, EzmockGridRun, EzmockParams, EzmockSetup, GrowthParams, run_ezmock_grid,
};
use cosmock_core::modules::likelihood::{DataObject, DataParams, MissingTermPolicy, TheoryPrediction};
use cosmock_core::modules::mock::{CommandHodGenerator, ComputeAllOptions, compute_all};
use serde_json::json;
use std::path::PathBuf;
use tracing::info;

#[derive(clap::Args)]
pub(super) struct HodMockArgs {
    /// Number of threads
    #[arg(short = 'n', long, default_value_t = 16)]
    nthread: usize,

    /// Configuration file; the built-in configuration is used when absent
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Write the template configuration and exit
    #[arg(short, long)]
    template: bool,

    /// HOD generator program
    #[arg(long, required_unless_present = "template")]
    generator: Option<PathBuf>,

    /// Leading argument passed to the generator (repeatable)
    #[arg(long = "generator-arg", allow_hyphen_values = true)]
    generator_args: Vec<String>,
}

#[derive(clap::Args)]
pub(super) struct Disp2LptArgs {
    /// Random seed for initial conditions
    #[arg(long, default_value_t = 42)]
    seed: u64,

    /// Redshift at which to compute displacements
    #[arg(long, default_value_t = 2.0)]
    redshift: f64,

    /// Non-Gaussianity parameter f_NL
    #[arg(long, default_value_t = 600.0, allow_negative_numbers = true)]
    fnl: f64,

    /// Box size in Mpc/h
    #[arg(long, default_value_t = 2000)]
    lbox: u32,

    /// Grid size
    #[arg(long, default_value_t = 512)]
    ngrid: u32,

    /// Fix the amplitude of the initial modes
    #[arg(long, default_value_t = true, action = clap::ArgAction::Set)]
    fix_amp: bool,

    /// 2LPT binary (default ~/lib/2LPTic_PNG/2LPTnonlocal)
    #[arg(long)]
    program: Option<PathBuf>,

    /// Leading argument passed to the binary before the parameter file (repeatable)
    #[arg(long = "program-arg", allow_hyphen_values = true)]
    program_args: Vec<String>,

    /// Library directory prepended to LD_LIBRARY_PATH (repeatable; replaces the defaults)
    #[arg(long = "library-dir")]
    library_dirs: Vec<PathBuf>,

    /// Directory for r{seed}.param
    #[arg(long)]
    param_dir: Option<PathBuf>,

    /// Directory for 2lpt_r{seed}.log
    #[arg(long)]
    log_dir: Option<PathBuf>,
}

#[derive(clap::Args)]
pub(super) struct RefClusteringArgs {
    /// Catalog file with x y z columns
    #[arg(long, conflicts_with = "sim")]
    catalog: Option<PathBuf>,

    /// Root of the Abacus mock tree
    #[arg(long, default_value = DEFAULT_MOCK_ROOT)]
    mock_root: PathBuf,

    /// Mock directory under the root
    #[arg(long, default_value = "mocks")]
    dir: String,

    /// Simulation name; selects the Abacus layout instead of --catalog
    #[arg(long)]
    sim: Option<String>,

    /// Snapshot redshift of the Abacus mock
    #[arg(long, default_value_t = 2.0)]
    redshift: f64,

    /// Variant suffix after galaxies_rsd
    #[arg(long, default_value = "_dv", allow_hyphen_values = true)]
    hod: String,

    /// Tracer of the Abacus mock
    #[arg(long, default_value = "QSO", value_parser = parse_tracer)]
    tracer: Tracer,

    /// Binning configuration
    #[arg(long, default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    /// Power spectrum output table
    #[arg(long, default_value = "ref/pk_ref.txt")]
    pk: PathBuf,

    /// Correlation function output table
    #[arg(long, default_value = "ref/xi_ref.txt")]
    xi: PathBuf,

    /// Bispectrum output table
    #[arg(long, default_value = "ref/bk_ref.txt")]
    bk: PathBuf,

    /// Pair-counting configuration for the correlation estimator
    #[arg(long, default_value = DEFAULT_CORRELATION_CONF)]
    fcfc_conf: PathBuf,

    /// Worker count (default from SLURM_CPUS_PER_TASK)
    #[arg(long)]
    ncpu: Option<usize>,

    /// Clustering estimator program
    #[arg(long)]
    estimator: PathBuf,

    /// Leading argument passed to the estimator (repeatable)
    #[arg(long = "estimator-arg", allow_hyphen_values = true)]
    estimator_args: Vec<String>,
}

#[derive(clap::Args)]
pub(super) struct EzmockArgs {
    /// Box size in Mpc/h
    #[arg(long, default_value_t = 1000.0)]
    lbox: f64,

    /// Grid size
    #[arg(long, default_value_t = 256)]
    ngrid: usize,

    /// Seed tag naming the displacement files
    #[arg(long, default_value = "42")]
    seed: String,

    /// Number of threads
    #[arg(long, default_value_t = 64)]
    nthread: usize,

    /// Output redshift
    #[arg(long, default_value_t = 3.0)]
    redshift: f64,

    /// Directory holding d{x,y,z}_{seed}.txt
    #[arg(long)]
    disp_dir: PathBuf,

    /// f_NL recorded in the catalog names
    #[arg(long, default_value_t = 1200.0, allow_negative_numbers = true)]
    fnl: f64,

    /// Number of tracers per catalog
    #[arg(long)]
    ntracer: usize,

    /// Output directory
    #[arg(long, default_value = "out")]
    odir: PathBuf,

    /// rho_c,rho_exp,pdf_base,sigma_v (repeatable)
    #[arg(long = "params", required = true, value_parser = parse_ezmock_params)]
    grid: Vec<EzmockParams>,

    /// EZmock program
    #[arg(long)]
    program: PathBuf,

    /// Leading argument passed to the EZmock program (repeatable)
    #[arg(long = "program-arg", allow_hyphen_values = true)]
    program_args: Vec<String>,
}

#[derive(clap::Args)]
pub(super) struct CompareArgs {
    /// LABEL=PATH@LBOX (repeatable)
    #[arg(long = "entry", required = true, value_parser = parse_compare_entry)]
    entries: Vec<CompareEntry>,

    /// FFT mesh size
    #[arg(long, default_value_t = DEFAULT_NMESH)]
    nmesh: usize,

    /// Box size the shared k-bin edges are derived from
    #[arg(long, default_value_t = REFERENCE_LBOX)]
    edges_lbox: f64,

    /// Output directory for <label>_poles.txt
    #[arg(long, default_value = "poles")]
    out_dir: PathBuf,

    /// Multipole estimator program
    #[arg(long)]
    estimator: PathBuf,

    /// Leading argument passed to the estimator (repeatable)
    #[arg(long = "estimator-arg", allow_hyphen_values = true)]
    estimator_args: Vec<String>,
}

#[derive(clap::Args)]
pub(super) struct LoglikeArgs {
    /// Data parameters (tracer_combos, tracer densities)
    #[arg(long)]
    data: PathBuf,

    /// Mock configuration providing HOD_params and clustering_params
    #[arg(long)]
    config: PathBuf,

    /// Theory prediction (clustering and density maps)
    #[arg(long)]
    theory: PathBuf,

    /// Override clustering_params.clustering_type (wp or all)
    #[arg(long)]
    clustering_type: Option<String>,

    /// Fail instead of skipping observations the theory does not cover
    #[arg(long)]
    strict: bool,

    /// Print the result as one JSON object
    #[arg(long)]
    json: bool,
}

pub(super) fn run_hod_mock_command(args: HodMockArgs) -> Result<i32, CliError> {
    let assembler = ConfigAssembler::default();
    if args.template {
        assembler.assemble(None, None)?;
        println!(
            "Configuration template written to {}",
            assembler.template_path().display()
        );
        return Ok(0);
    }
    let generator_program = args.generator.ok_or_else(|| {
        CliError::Usage("--generator is required unless --template is given".to_string())
    })?;

    let (config, config_path) = match args.config {
        Some(path) => (assembler.assemble(None, Some(&path))?, path),
        None => {
            let defaults = MockConfig::default();
            let config = assembler.assemble(Some(&defaults), None)?;
            let path = config.sim_params.output_dir.join(CONFIG_FILE_NAME);
            (config, path)
        }
    };

    let mut generator = CommandHodGenerator::new(
        external_program(&generator_program, &args.generator_args),
        &config,
        config_path,
    );
    let run = compute_all(
        &mut generator,
        ComputeAllOptions {
            out: true,
            config: Some(config),
            want_clustering: true,
            nthread: args.nthread,
            verbose: true,
            ..ComputeAllOptions::default()
        },
    )?;

    for (tracer, catalog) in run.mocks.iter() {
        println!("{}: {} galaxies", tracer, catalog.len());
    }
    if let Some(path) = &run.clustering_path {
        println!("clustering: {}", path.display());
    }
    println!("Finished generating HOD mock and computing clustering.");
    Ok(0)
}

pub(super) fn run_disp2lpt_command(args: Disp2LptArgs) -> Result<i32, CliError> {
    let mut settings = Disp2LptSettings::from_home(&home_or_current());
    if let Some(program) = &args.program {
        settings.program = external_program(program, &args.program_args);
    } else if !args.program_args.is_empty() {
        settings.program = settings.program.with_args(args.program_args.iter().cloned());
    }
    if !args.library_dirs.is_empty() {
        settings.library_dirs = args.library_dirs;
    }
    if let Some(param_dir) = args.param_dir {
        settings.param_dir = param_dir;
    }
    if let Some(log_dir) = args.log_dir {
        settings.log_dir = log_dir;
    }

    let params = Disp2LptParams {
        ngrid: args.ngrid,
        lbox: args.lbox,
        fix_amp: args.fix_amp,
        ..Disp2LptParams::new(args.seed, args.redshift, args.fnl)
    };
    let run = Disp2LptRunner::new(settings).run(&params)?;
    println!("param: {}", run.param_path.display());
    println!("log: {}", run.log_path.display());
    Ok(0)
}

pub(super) fn run_ref_clustering_command(args: RefClusteringArgs) -> Result<i32, CliError> {
    let location = args.sim.map(|sim| AbacusMockLocation {
        root: args.mock_root,
        dir: args.dir,
        sim,
        redshift: args.redshift,
        hod: args.hod,
        tracer: args.tracer,
    });
    let positions = load_positions(args.catalog.as_deref(), location)?;
    info!("Measuring reference clustering of {} objects", positions.len());

    let config = ReferenceClusteringConfig::load(&args.config)?;
    let estimator = CommandEstimator::new(external_program(&args.estimator, &args.estimator_args));
    let mut measurement =
        ReferenceMeasurement::new(&estimator, config).with_correlation_conf(args.fcfc_conf);
    if let Some(ncpu) = args.ncpu {
        measurement = measurement.with_ncpu(ncpu);
    }
    measurement.save_ref_clus(&positions, &args.pk, &args.xi, &args.bk)?;

    print_paths("pk", &[args.pk]);
    print_paths("xi", &[args.xi]);
    print_paths("bk", &[args.bk]);
    Ok(0)
}

pub(super) fn run_ezmock_command(args: EzmockArgs) -> Result<i32, CliError> {
    let setup = EzmockSetup::new(
        args.lbox,
        args.ngrid,
        args.seed,
        args.nthread,
        GrowthParams::new(args.redshift),
        &args.disp_dir,
    )?;
    info!("rsd factor: {}", setup.rsd_factor());
    let engine = CommandEzmock::new(external_program(&args.program, &args.program_args));
    let files = run_ezmock_grid(
        &engine,
        &setup,
        &args.grid,
        &EzmockGridRun {
            fnl: args.fnl,
            ntracer: args.ntracer,
            output_dir: args.odir,
        },
    )?;
    print_paths("catalog", &files);
    Ok(0)
}

pub(super) fn run_compare_command(args: CompareArgs) -> Result<i32, CliError> {
    let estimator = CommandEstimator::new(external_program(&args.estimator, &args.estimator_args));
    let binning = CompareBinning {
        nmesh: args.nmesh,
        edges_lbox: args.edges_lbox,
    };
    let tables = compare_catalogs(&estimator, &args.entries, binning, &args.out_dir)?;
    print_paths("poles", &tables);
    Ok(0)
}

pub(super) fn run_loglike_command(args: LoglikeArgs) -> Result<i32, CliError> {
    let data_params = DataParams::load(&args.data)?;
    let config = load_config(&args.config)?;
    let theory = TheoryPrediction::load(&args.theory)?;
    let clustering_type = args
        .clustering_type
        .as_deref()
        .map(ClusteringType::parse)
        .unwrap_or(config.clustering_params.clustering_type);
    let policy = if args.strict {
        MissingTermPolicy::Fail
    } else {
        MissingTermPolicy::Skip
    };

    let data = DataObject::new(&data_params, &config.hod_params, clustering_type)?.with_policy(policy);
    let terms = data.compute_loglike_terms(&theory.clustering, &theory.density)?;

    if args.json {
        let report = json!({
            "clustering_type": clustering_type.as_str(),
            "loglike": terms.total(),
            "clustering": terms.clustering,
            "density": terms.density,
            "skipped": terms.skipped,
        });
        println!("{}", to_json_line(&report)?);
    } else {
        println!("loglike: {}", terms.total());
        println!("clustering: {}", terms.clustering);
        println!("density: {}", terms.density);
        if !terms.skipped.is_empty() {
            println!("skipped: {}", terms.skipped.join(", "));
        }
    }
    Ok(0)
}
