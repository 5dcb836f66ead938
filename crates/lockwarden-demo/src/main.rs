use std::{sync::Arc, time::Duration};

use anyhow::Result;
use clap::{Parser, Subcommand};
use lockwarden::{Configure, LockRegistry};
use tracing::info;
use tracing_subscriber::EnvFilter;

mod scenario;

use scenario::{Scenario, Settings};

#[derive(Parser)]
#[command(
    author,
    version,
    about = "Run worker threads against lockwarden locks and dump their callers"
)]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
    /// Rounds each worker thread runs.
    #[arg(long, global = true, default_value_t = 10)]
    iterations: usize,
    /// How long a worker holds a lock per round, in milliseconds.
    #[arg(long, global = true, default_value_t = 100)]
    sleep_ms: u64,
    /// How many times the lock table is printed while workers run.
    #[arg(long, global = true, default_value_t = 5)]
    show_rounds: usize,
    /// Pause between two lock table dumps, in milliseconds.
    #[arg(long, global = true, default_value_t = 1000)]
    show_interval_ms: u64,
    /// Log every lock state transition.
    #[arg(long, global = true)]
    trace: bool,
}

#[derive(Subcommand, Clone, Copy)]
enum Command {
    /// Two threads sharing one mutex.
    Basic,
    /// Two threads re-entering one recursive mutex.
    Recursive,
    /// Four readers and two writers on one read/write lock.
    Readwrite,
    /// Two threads taking two locks in opposite orders.
    Deadlock {
        /// Only log the order violation, and refuse any second caller of
        /// either lock instead of aborting.
        #[arg(long = "unsafe")]
        unsafe_order: bool,
    },
    /// A single round without and then with transition tracing.
    Logging,
    /// Every scenario in turn. The deadlock scenario runs in unsafe mode.
    All,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.trace);

    let settings = Settings {
        iterations: cli.iterations,
        hold: Duration::from_millis(cli.sleep_ms),
        show_rounds: cli.show_rounds,
        show_interval: Duration::from_millis(cli.show_interval_ms),
    };

    match cli.command.unwrap_or(Command::All) {
        Command::All => {
            for command in [
                Command::Basic,
                Command::Recursive,
                Command::Readwrite,
                Command::Deadlock { unsafe_order: true },
                Command::Logging,
            ] {
                run(command, settings, cli.trace)?;
            }
            Ok(())
        }
        command => run(command, settings, cli.trace),
    }
}

fn run(command: Command, settings: Settings, trace: bool) -> Result<()> {
    let registry = Arc::new(LockRegistry::with_config(Configure::new().trace(trace)));
    let scenario = Scenario::new(registry, settings);
    match command {
        Command::Basic => {
            info!("Running basic mutex scenario");
            scenario.basic()
        }
        Command::Recursive => {
            info!("Running recursive mutex scenario");
            scenario.recursive()
        }
        Command::Readwrite => {
            info!("Running read/write scenario");
            scenario.readwrite()
        }
        Command::Deadlock { unsafe_order } => {
            info!(unsafe_order, "Running lock order scenario");
            scenario.deadlock(unsafe_order)
        }
        Command::Logging => {
            info!("Running logging scenario");
            scenario.logging()
        }
        Command::All => unreachable!("expanded by main"),
    }
}

fn init_logging(trace: bool) {
    let default = if trace { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_thread_names(true)
        .with_file(true)
        .with_line_number(true)
        .init();
}
