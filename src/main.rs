//! Launcher for the three processes of the elevator bank. Start `cars` and
//! `dispatcher` first, then `floor` with a request file.

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tracing::{error, info};

use elevator_bank::modules::car_subsystem::CarSubsystem;
use elevator_bank::modules::config::SimConfig;
use elevator_bank::modules::dispatcher_functions::dispatcher::run_dispatcher;
use elevator_bank::modules::error::Result;
use elevator_bank::modules::floor_functions::floor::run_floor;
use elevator_bank::modules::logging::init_logging;

#[derive(Parser, Debug)]
#[command(name = "elevator-bank")]
#[command(about = "Multi-car elevator simulator", long_about = None)]
struct Cli {
    /// JSON config file; defaults are used when left out
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Log filter used when RUST_LOG is not set
    #[arg(long, global = true, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    role: Role,
}

#[derive(Subcommand, Debug)]
enum Role {
    /// Assign incoming requests to cars
    Dispatcher,
    /// Run every car of the bank
    Cars,
    /// Replay a request file and show where the cars are
    Floor {
        /// Lines of `time;floor;direction;destination[;fault]`
        file: PathBuf,
    },
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(&cli.log_level);

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = %e, "stopped");
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<()> {
    let config = Arc::new(SimConfig::load_or_default(cli.config.as_deref())?);
    info!(role = ?cli.role, cars = config.num_cars, "starting");

    match cli.role {
        Role::Dispatcher => run_dispatcher(config),
        Role::Cars => CarSubsystem::init(config)?.run(),
        Role::Floor { file } => run_floor(config, &file),
    }
}
