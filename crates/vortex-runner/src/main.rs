//! `vortex`: controller and emulator for the Vortex upper layer.

use clap::{Parser, Subcommand};
use std::io;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::debug;
use tracing_subscriber::EnvFilter;
use vortex_runner::{
    run_emulate, run_info, run_send, run_set, watch_interval, with_session, RunnerConfig, RunnerResult,
};

#[derive(Parser, Debug)]
#[command(name = "vortex")]
#[command(version, about = "Controller and emulator for the Vortex upper layer", long_about = None)]
struct Cli {
    /// YAML configuration file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Host of the upper layer (or to listen on with `emulate`)
    #[arg(long, global = true)]
    host: Option<String>,

    /// Port of the upper layer (or to listen on with `emulate`)
    #[arg(short, long, global = true)]
    port: Option<u16>,

    /// Log debug output (overridden by RUST_LOG)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the emulated upper layer until Ctrl-C
    Emulate,

    /// Print progress and link quality
    Info {
        /// Repeat every SECS seconds until Ctrl-C
        #[arg(short, long, value_name = "SECS")]
        watch: Option<f64>,

        /// Print JSON lines instead of text
        #[arg(long)]
        json: bool,
    },

    /// Change modem parameters, e.g. `vortex set mode=Manual rob=C`
    Set {
        /// Assignments in key=value form
        #[arg(required = true, value_name = "KEY=VALUE")]
        assignments: Vec<String>,
    },

    /// Upload a file and start the transfer
    Send {
        /// File to transfer
        file: PathBuf,
    },
}

fn init_logging(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(io::stderr)
        .init();
}

fn run(cli: Cli) -> RunnerResult<()> {
    let mut config = match &cli.config {
        Some(path) => RunnerConfig::load(path)?,
        None => RunnerConfig::default(),
    };
    config.override_endpoint(cli.host.as_deref(), cli.port);
    debug!(?config, "configuration loaded");

    let stop = Arc::new(AtomicBool::new(false));
    {
        let stop = Arc::clone(&stop);
        ctrlc::set_handler(move || stop.store(true, Ordering::Relaxed))?;
    }

    match cli.command {
        Commands::Emulate => run_emulate(config.emulator, &stop),
        Commands::Info { watch, json } => {
            let watch = watch.map(watch_interval).transpose()?;
            with_session(&config, |connector| {
                run_info(connector, watch, json, &mut io::stdout(), &stop).map(|_| ())
            })
        }
        Commands::Set { assignments } => with_session(&config, |connector| run_set(connector, &assignments)),
        Commands::Send { file } => with_session(&config, |connector| run_send(connector, &file).map(|_| ())),
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose);
    vortex_transport::describe_metrics();

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {}", e);
            ExitCode::FAILURE
        }
    }
}
