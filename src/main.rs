use crate::io::{write_footer, write_header, Configuration};
use crate::models::{build_provider, scan_provider, write_scan, ScanPoint};
use crate::utils::Timer;
use anyhow::{Context, Result};
use clap::{Arg, Command};
use env_logger::Builder;
use log::{error, info, warn, LevelFilter};
use std::io::Write;
use std::path::Path;
use std::process;
use std::sync::atomic::AtomicBool;
use tsh_dynamics::dynamics::representation::RepresentationTransformer;
use tsh_dynamics::dynamics::{Ensemble, EnsembleReport};
use tsh_dynamics::initialization::restart::read_restart;
use tsh_dynamics::initialization::DynamicConfiguration;
use tsh_dynamics::interface::HamiltonianProvider;
use tsh_dynamics::output::{
    print_ensemble_summary, print_footer_dynamics, print_header_dynamics, FileSink, OutputSink,
};

mod defaults;
mod io;
mod models;
mod utils;

#[macro_use]
extern crate clap;

fn main() {
    // Input.
    let matches = Command::new(crate_name!())
        .version(crate_version!())
        .about("trajectory surface hopping dynamics on model Hamiltonians")
        .arg(
            Arg::new("config-file")
                .help("Sets the configuration file, tsh.toml in the working directory if not given")
                .required(false)
                .index(1),
        )
        .arg(
            Arg::new("dynamics-file")
                .short('d')
                .long("dynamics")
                .takes_value(true)
                .help("Sets the configuration file of the dynamics, dynamics.toml if not given"),
        )
        .get_matches();

    let config: Configuration = match matches.value_of("config-file") {
        Some(path) => Configuration::from_file(Path::new(path)),
        None => Configuration::new(),
    }
    .unwrap_or_else(|err| {
        eprintln!("{:?}", err);
        process::exit(1);
    });

    // Multithreading. A number of zero keeps the default pool with one thread per core.
    if config.parallelization.number_of_cores > 0 {
        if let Err(err) = rayon::ThreadPoolBuilder::new()
            .num_threads(config.parallelization.number_of_cores)
            .build_global()
        {
            eprintln!("the thread pool could not be created: {}", err);
        }
    }

    // Logging.
    // The log level is set.
    let log_level: LevelFilter = match config.verbose {
        2 => LevelFilter::Trace,
        1 => LevelFilter::Debug,
        0 => LevelFilter::Info,
        -1 => LevelFilter::Warn,
        -2 => LevelFilter::Error,
        _ => LevelFilter::Info,
    };
    // and the logger is build.
    Builder::new()
        .format(|buf, record| writeln!(buf, "{}", record.args()))
        .filter(None, log_level)
        .init();

    // The program header is written to the command line.
    write_header();
    // and the total wall-time timer is started.
    let timer: Timer = Timer::start();

    // Computations.
    // ................................................................
    let result: Result<()> = read_dynamic_input(matches.value_of("dynamics-file")).and_then(
        |dynamics_config| match config.jobtype.as_str() {
            "dynamics" => run_dynamics(&config, &dynamics_config),
            "scan" => run_scan(&config, &dynamics_config),
            jtype => {
                warn!("Jobtype: {} is not available.", jtype);
                warn!("Choose one of the available types: dynamics, scan");
                Ok(())
            }
        },
    );
    // ................................................................

    // Finished.
    let exit_code: i32 = match result {
        Ok(()) => 0,
        Err(err) => {
            error!("{:?}", err);
            1
        }
    };
    // The total wall-time is printed together with the end statement.
    write_footer(timer);
    process::exit(exit_code);
}

fn read_dynamic_input(path: Option<&str>) -> Result<DynamicConfiguration> {
    let dynamics_config: DynamicConfiguration = match path {
        Some(path) => DynamicConfiguration::from_file(Path::new(path))
            .with_context(|| format!("unable to load the dynamics configuration {}", path))?,
        None => DynamicConfiguration::new().context("unable to load dynamics.toml")?,
    };
    Ok(dynamics_config)
}

fn run_dynamics(config: &Configuration, dynamics_config: &DynamicConfiguration) -> Result<()> {
    dynamics_config.print_settings();
    let provider: Box<dyn HamiltonianProvider> =
        build_provider(&config.model, dynamics_config.ndof())?;

    print_header_dynamics();
    let timer: Timer = Timer::start();
    let ensemble: Ensemble = if config.restart {
        let directory: &Path = Path::new(&dynamics_config.print.output_directory);
        let variables = read_restart(directory)
            .with_context(|| format!("unable to restart from {}", directory.display()))?;
        info!("restart from step {}", variables.step);
        Ensemble::from_variables(dynamics_config, provider.as_ref(), variables)?
    } else {
        Ensemble::new(dynamics_config, provider.as_ref())?
    };

    let stop: AtomicBool = AtomicBool::new(false);
    let report: EnsembleReport = ensemble.run(&stop)?;

    let mut sink: FileSink = FileSink::new(&dynamics_config.print)
        .context("unable to create the output directory")?;
    for trajectory in report.results.iter().filter_map(|result| result.as_ref().ok()) {
        sink.write_trajectory(trajectory.index, &trajectory.steps)?;
    }
    sink.write_observables(&report.observables, dynamics_config.nstates)?;
    sink.write_restart(&report.variables)?;

    print_ensemble_summary(&report);
    print_footer_dynamics(timer.elapsed_secs() as f64);
    Ok(())
}

fn run_scan(config: &Configuration, dynamics_config: &DynamicConfiguration) -> Result<()> {
    let provider: Box<dyn HamiltonianProvider> =
        build_provider(&config.model, dynamics_config.ndof())?;
    let transformer = RepresentationTransformer::new(&dynamics_config.tracking);
    let points: Vec<ScanPoint> = scan_provider(provider.as_ref(), &transformer, &config.scan)?;

    let output: &Path = Path::new(&config.scan.output_file);
    write_scan(&points, output).with_context(|| format!("unable to write {}", output.display()))?;

    warn!("{: ^80}", "Potential Energy Scan");
    warn!("{:-^80}", "");
    info!("{:<35} {:>20}", "points:", points.len());
    if let Some(minimum) = points.iter().min_by(|a, b| {
        let gap_a: f64 = a.energies[a.energies.len() - 1] - a.energies[0];
        let gap_b: f64 = b.energies[b.energies.len() - 1] - b.energies[0];
        gap_a.total_cmp(&gap_b)
    }) {
        info!(
            "{:<35} {:>20.10} at x = {:.4}",
            "smallest gap (Ha):",
            minimum.energies[minimum.energies.len() - 1] - minimum.energies[0],
            minimum.x
        );
    }
    info!("{:<35} {:>20}", "written to:", output.display());
    warn!("{:-^80}", "");
    Ok(())
}
