use clap::{Parser, Subcommand, ValueHint};
use mdo_core::DerivMode;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "mdo", author, version, about, long_about = None)]
pub struct Cli {
    /// Set the logging level
    #[arg(long, default_value = "info")]
    pub log_level: tracing::Level,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Compute a simultaneous derivative coloring for a model
    SimulColoring {
        /// Model file (JSON)
        #[arg(value_hint = ValueHint::FilePath)]
        file: PathBuf,
        /// Write the coloring to this file instead of stdout
        #[arg(short = 'o', long = "out", value_hint = ValueHint::FilePath)]
        out: Option<PathBuf>,
        /// Number of times to repeat the total derivative computation
        #[arg(short = 'n', long = "num-jacs", default_value_t = 1)]
        num_jacs: usize,
        /// Tolerance used to decide whether a jacobian entry is nonzero
        #[arg(short = 't', long = "tol", default_value_t = 1e-15)]
        tol: f64,
        /// Seed for the random probe values
        #[arg(long)]
        seed: Option<u64>,
        /// Derivative mode (only fwd is supported)
        #[arg(long, default_value = "fwd")]
        mode: DerivMode,
    },
    /// Run a design-of-experiments sweep over a model
    Doe {
        /// Model file (JSON)
        #[arg(value_hint = ValueHint::FilePath)]
        file: PathBuf,
        /// Generator configuration (JSON)
        #[arg(short = 'g', long, value_hint = ValueHint::FilePath)]
        generator: PathBuf,
        /// Number of workers sharing the cases
        #[arg(long, default_value_t = 1)]
        workers: usize,
        /// Worker threads (0 = number of CPUs)
        #[arg(long, default_value_t = 0)]
        threads: usize,
        /// Write the sweep manifest to this file
        #[arg(short = 'o', long = "out", value_hint = ValueHint::FilePath)]
        out: Option<PathBuf>,
    },
}
