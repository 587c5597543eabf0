use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(name = "vinoslot", version, about = "Load IR models and drive inference request slots")]
pub struct Cli {
    /// Log level (RUST_LOG syntax)
    #[arg(long, global = true, default_value = "info")]
    pub log: String,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Print the inputs, outputs and operators an IR topology declares
    Inspect {
        /// Path to the topology (.xml) file
        #[arg(long)]
        model: PathBuf,
    },

    /// Load a model and run one inference per request slot on zeroed input
    Run(RunArgs),
}

#[derive(Args, Debug)]
pub struct RunArgs {
    /// Session config file (TOML); flags below override its values
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Path to the topology (.xml) file
    #[arg(long)]
    pub model: Option<PathBuf>,

    /// Target device (CPU, GPU, MYRIAD, HETERO:...)
    #[arg(long)]
    pub device: Option<String>,

    /// Parallel request slots; 0 lets the runtime decide
    #[arg(long)]
    pub requests: Option<usize>,

    /// Custom-operator library, used on CPU-class devices
    #[arg(long)]
    pub extension: Option<PathBuf>,

    /// Give up waiting on a slot after this many milliseconds (not available
    /// on the OpenVINO backend)
    #[arg(long)]
    pub wait_timeout_ms: Option<u64>,
}
