use std::io::{self, Read};

use anyhow::{anyhow, bail, Result};
use is_terminal::IsTerminal;
use owo_colors::OwoColorize;
use tracing_subscriber::EnvFilter;

use rvis::cli::Cli;
use rvis::config::Config;
use rvis::data;
use rvis::rserve::{self, RserveSettings, ScriptRunner};

fn main() -> Result<()> {
    let args = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("rvis=warn")),
        )
        .with_writer(io::stderr)
        .init();

    let cfg = Config::load();

    // Load the dataset first; --print-data-command needs nothing else
    let table = match &args.data {
        Some(path) => Some(data::csv::read_path(path)?),
        None => None,
    };

    if args.print_data_command {
        if let Some(table) = &table {
            match rserve::generate_data_input_command(table) {
                Some(cmd) => println!("{}", cmd),
                None => eprintln!("{}", "table too small, no data command generated".yellow()),
            }
        }
        return Ok(());
    }

    // stdin handling (pipe support)
    let mut script_from_stdin = String::new();
    let stdin_is_tty = io::stdin().is_terminal();
    if !stdin_is_tty {
        io::stdin().read_to_string(&mut script_from_stdin)?;
    }

    if args.file.is_some() && !script_from_stdin.trim().is_empty() {
        bail!("--file cannot be combined with a script on stdin");
    }

    // Resolve script: --file, else stdin + optional positional
    let script = if let Some(path) = &args.file {
        std::fs::read_to_string(path)
            .map_err(|e| anyhow!("failed to read script file '{}': {}", path, e))?
    } else {
        let arg_script = args.script.clone().unwrap_or_default();
        if !script_from_stdin.trim().is_empty() && !arg_script.is_empty() {
            format!("{}\n{}", script_from_stdin.trim_end(), arg_script)
        } else if !script_from_stdin.trim().is_empty() {
            script_from_stdin
        } else {
            arg_script
        }
    };
    if script.trim().is_empty() {
        bail!("provide an R script as an argument, via --file, or on stdin");
    }

    let mut settings = RserveSettings::from_config(&cfg);
    if let Some(host) = args.host {
        settings.host = host;
    }
    if let Some(port) = args.port {
        settings.port = port;
    }

    let show_script = args.show_script;
    let runner = ScriptRunner::new(settings).with_diagnostics(move |msg| {
        if show_script {
            eprintln!("{}", msg.cyan());
        } else {
            tracing::debug!("{msg}");
        }
    });

    let result = match &table {
        Some(t) => runner.run_with_data(&script, t),
        None => runner.run(&script),
    };

    match result {
        Ok(values) => {
            if args.json {
                println!("{}", serde_json::to_string(&values)?);
            } else {
                for v in values {
                    println!("{}", v);
                }
            }
            Ok(())
        }
        Err(err) => {
            eprintln!("{}", err.to_string().red());
            std::process::exit(1);
        }
    }
}
