//! Bridge to a local Rserve: inject a data table as an R matrix, run an R
//! script, and get the numeric result back.
//!
//! One [`ScriptRunner::run`] call owns one connection for its whole
//! duration; nothing is pooled or reused. If the first connection attempt is
//! refused, the configured start command is launched (blocking) and the
//! connection is retried exactly once.

use std::io;
use std::process::{Command, ExitStatus};

use thiserror::Error;

use crate::config::Config;
use crate::data::DataTable;

pub mod protocol;

pub use protocol::{Rexp, RserveConnection};

#[derive(Debug, Error)]
pub enum RserveError {
    #[error("cannot connect to Rserve at {addr}: {source}")]
    Connect {
        addr: String,
        #[source]
        source: io::Error,
    },
    #[error("could not start Rserve - is it installed properly? Shell command {command:?} exited with {status}")]
    StartFailed { command: String, status: ExitStatus },
    #[error("failed to launch {command:?}: {source}")]
    Launch {
        command: String,
        #[source]
        source: io::Error,
    },
    #[error("Rserve handshake failed: {0}")]
    Handshake(String),
    #[error("eval failed with Rserve status code {status}")]
    Eval { status: u32 },
    #[error("malformed Rserve response: {0}")]
    Protocol(String),
    #[error("script result is not a numeric vector")]
    NotNumeric,
    #[error("i/o error talking to Rserve: {0}")]
    Io(#[from] io::Error),
}

/// Where Rserve lives and how to start it when it is not running.
#[derive(Debug, Clone)]
pub struct RserveSettings {
    pub host: String,
    pub port: u16,
    /// Shell command used for the one-shot auto-start when the connection
    /// is refused.
    pub start_command: String,
}

impl Default for RserveSettings {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".into(),
            port: 6311,
            start_command: "R CMD Rserve --vanilla".into(),
        }
    }
}

impl RserveSettings {
    pub fn from_config(cfg: &Config) -> Self {
        let defaults = Self::default();
        Self {
            host: cfg.get("RSERVE_HOST").unwrap_or(defaults.host),
            port: cfg.get_u16("RSERVE_PORT").unwrap_or(defaults.port),
            start_command: cfg.get("RSERVE_START_COMMAND").unwrap_or(defaults.start_command),
        }
    }

    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

type DiagnosticSink = Box<dyn Fn(&str) + Send + Sync>;

/// Runs R scripts against a local Rserve session.
pub struct ScriptRunner {
    settings: RserveSettings,
    diagnostics: DiagnosticSink,
}

impl ScriptRunner {
    pub fn new(settings: RserveSettings) -> Self {
        Self {
            settings,
            diagnostics: Box::new(|msg| tracing::debug!("{msg}")),
        }
    }

    pub fn from_config(cfg: &Config) -> Self {
        Self::new(RserveSettings::from_config(cfg))
    }

    /// Replace the diagnostic sink. The runner reports the full combined
    /// script before execution and auto-start progress through it; failures
    /// themselves are returned, not logged.
    pub fn with_diagnostics(mut self, sink: impl Fn(&str) + Send + Sync + 'static) -> Self {
        self.diagnostics = Box::new(sink);
        self
    }

    pub fn settings(&self) -> &RserveSettings {
        &self.settings
    }

    /// Run a script with the table bound to the `data` matrix first. Tables
    /// too small to serialize run the script without any injected data.
    pub fn run_with_data(&self, script: &str, data: &DataTable) -> Result<Vec<f64>, RserveError> {
        match generate_data_input_command(data) {
            Some(assignment) => self.run(&format!("{assignment}\n{script}")),
            None => self.run(script),
        }
    }

    /// Evaluate a script as a single unit and return the numeric result.
    pub fn run(&self, script: &str) -> Result<Vec<f64>, RserveError> {
        // Full script echo before execution, for observability
        (self.diagnostics)(script);
        let mut conn = self.connect()?;
        let result = conn.eval(script)?;
        result.into_doubles().ok_or(RserveError::NotNumeric)
    }

    /// Connect to the configured endpoint, auto-starting Rserve at most once
    /// if the connection is refused. Any other failure, including a failed
    /// retry, is terminal.
    fn connect(&self) -> Result<RserveConnection, RserveError> {
        let addr = self.settings.addr();
        let mut phase = ConnectPhase::Connecting;
        loop {
            match RserveConnection::open(&addr) {
                Ok(conn) => return Ok(conn),
                Err(err) => match phase {
                    ConnectPhase::Connecting if is_refused(&err) => {
                        // Rserve may simply not be running yet
                        self.start_server()?;
                        phase = ConnectPhase::Retrying;
                    }
                    _ => return Err(err),
                },
            }
        }
    }

    /// Blocking launch of the configured start command. Exit 0 means the
    /// launcher succeeded, not that the server is necessarily up.
    fn start_server(&self) -> Result<(), RserveError> {
        let command = &self.settings.start_command;
        (self.diagnostics)(&format!("connection refused; starting Rserve with `{command}`"));
        let status = run_shell_command(command).map_err(|source| RserveError::Launch {
            command: command.clone(),
            source,
        })?;
        if status.success() {
            Ok(())
        } else {
            Err(RserveError::StartFailed { command: command.clone(), status })
        }
    }
}

enum ConnectPhase {
    Connecting,
    Retrying,
}

fn is_refused(err: &RserveError) -> bool {
    matches!(err, RserveError::Connect { source, .. } if source.kind() == io::ErrorKind::ConnectionRefused)
}

/// Run a command line through the platform shell and wait for it to exit.
fn run_shell_command(cmd: &str) -> io::Result<ExitStatus> {
    if cfg!(windows) {
        Command::new("cmd.exe").args(["/c", cmd]).status()
    } else {
        let shell = std::env::var("SHELL").unwrap_or_else(|_| "/bin/sh".into());
        Command::new(shell).arg("-c").arg(cmd).status()
    }
}

/// Generate an R expression assigning all values of the table to a matrix
/// called `data`, one column per record.
///
/// Returns `None` for tables with no dimension metadata or fewer than two
/// records; by contract such tables inject no data rather than failing.
pub fn generate_data_input_command(data: &DataTable) -> Option<String> {
    if data.dimensions.is_empty() || data.records.len() < 2 {
        return None;
    }
    let mut literals = Vec::with_capacity(data.records.len() * data.dimensions.len());
    for record in &data.records {
        for entry in record {
            literals.push(r_literal(entry.value));
        }
    }
    Some(format!(
        "data <- matrix(c({}),{})",
        literals.join(","),
        data.dimensions.len()
    ))
}

/// A textual form of `v` that R parses back to the same double.
fn r_literal(v: f64) -> String {
    if v.is_nan() {
        "NaN".into()
    } else if v == f64::INFINITY {
        "Inf".into()
    } else if v == f64::NEG_INFINITY {
        "-Inf".into()
    } else {
        format!("{v}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table(rows: &[&[&str]]) -> DataTable {
        DataTable::from_strings(
            rows.iter()
                .map(|r| r.iter().map(|s| s.to_string()).collect())
                .collect(),
            None,
        )
    }

    #[test]
    fn too_small_tables_inject_nothing() {
        // no rows at all
        assert_eq!(generate_data_input_command(&DataTable::default()), None);
        // header only, zero records
        assert_eq!(generate_data_input_command(&table(&[&["x", "y"]])), None);
        // a single record is not enough
        assert_eq!(generate_data_input_command(&table(&[&["x", "y"], &["1", "2"]])), None);
        // non-rectangular input has no dimension metadata
        assert_eq!(
            generate_data_input_command(&table(&[&["x", "y"], &["1", "2"], &["3"]])),
            None
        );
    }

    #[test]
    fn emits_row_major_values_and_dimension_count() {
        let cmd = generate_data_input_command(&table(&[
            &["x", "y"],
            &["1", "2"],
            &["3", "4"],
            &["5", "6"],
        ]))
        .unwrap();
        assert_eq!(cmd, "data <- matrix(c(1,2,3,4,5,6),2)");
    }

    #[test]
    fn literal_count_is_dimensions_times_records() {
        let cmd = generate_data_input_command(&table(&[
            &["a", "b", "c"],
            &["1", "2", "3"],
            &["4", "5", "6"],
        ]))
        .unwrap();
        let inner = cmd.strip_prefix("data <- matrix(c(").unwrap();
        let inner = inner.strip_suffix("),3)").unwrap();
        assert_eq!(inner.split(',').count(), 6);
    }

    #[test]
    fn literals_round_trip_special_values() {
        assert_eq!(r_literal(0.1), "0.1");
        assert_eq!(r_literal(-3.0), "-3");
        assert_eq!(r_literal(f64::NAN), "NaN");
        assert_eq!(r_literal(f64::INFINITY), "Inf");
        assert_eq!(r_literal(f64::NEG_INFINITY), "-Inf");
    }

    #[test]
    fn settings_default_to_local_rserve() {
        let s = RserveSettings::default();
        assert_eq!(s.addr(), "127.0.0.1:6311");
        assert_eq!(s.start_command, "R CMD Rserve --vanilla");
    }
}
