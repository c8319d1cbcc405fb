use clap::{Parser, ValueEnum};

/// Drive the batchflow task engine with representative batch DAGs.
#[derive(Parser, Debug)]
#[command(name = "batchflow-bench", version, about)]
pub struct CliArgs {
    /// Workload to run.
    #[arg(long, value_enum, default_value_t = Workload::All)]
    pub workload: Workload,

    /// Worker threads (overrides config file and BATCHFLOW_WORKERS).
    #[arg(long, short = 'w')]
    pub workers: Option<usize>,

    /// Path to an engine TOML config file.
    #[arg(long, env = "BATCHFLOW_CONFIG")]
    pub config: Option<String>,

    /// Problem size: image height, sqrt element count / 1000, or units per batch.
    #[arg(long, default_value_t = 512)]
    pub size: usize,

    /// Times each workload is repeated.
    #[arg(long, default_value_t = 3)]
    pub repeat: usize,

    /// Print engine metrics as JSON after the run.
    #[arg(long)]
    pub json: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Workload {
    /// Row-parallel Mandelbrot render, one unit per image row.
    Mandelbrot,
    /// Newton-iteration square roots over fixed-size chunks.
    Sqrt,
    /// Fan-out / fan-in diamond of four dependent batches.
    Diamond,
    /// Linear chain of small batches, each depending on the previous.
    Chain,
    All,
}

impl Workload {
    pub fn expand(self) -> Vec<Workload> {
        match self {
            Workload::All => vec![
                Workload::Mandelbrot,
                Workload::Sqrt,
                Workload::Diamond,
                Workload::Chain,
            ],
            one => vec![one],
        }
    }
}
