use clap::Parser;

#[derive(Parser, Debug, Clone)]
#[command(name = "rvis", about = "Run R scripts against tabular data via a local Rserve", version)]
pub struct Cli {
    /// Inline R script to evaluate.
    #[arg(value_name = "SCRIPT")]
    pub script: Option<String>,

    /// Read the R script from a file.
    #[arg(short = 'f', long, conflicts_with = "script")]
    pub file: Option<String>,

    /// CSV data file bound to the `data` matrix before the script runs.
    #[arg(short = 'd', long)]
    pub data: Option<String>,

    /// Print the generated `data` matrix assignment and exit (no Rserve needed).
    #[arg(long = "print-data-command", requires = "data")]
    pub print_data_command: bool,

    /// Echo the full combined script before evaluating it.
    #[arg(long = "show-script")]
    pub show_script: bool,

    /// Print the result as a JSON array instead of one value per line.
    #[arg(long)]
    pub json: bool,

    /// Rserve host (overrides config).
    #[arg(long)]
    pub host: Option<String>,

    /// Rserve port (overrides config).
    #[arg(long)]
    pub port: Option<u16>,
}

impl Cli {
    pub fn parse() -> Self {
        <Self as Parser>::parse()
    }
}
