//! Execution parameters and user-facing output
//!
//! [`ExecParams`] travels down the tree with every invocation. [`Reporter`]
//! prints what the engine is doing, and [`OutputSink`] receives the output of
//! labelled commands.

use colored::Colorize;
use std::collections::HashMap;
use std::fmt;
use std::io::{self, Write};
use std::path::Path;
use std::sync::{Arc, Mutex};

/// Verbosity levels for output
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
pub enum Verbosity {
    Silent = 0,
    Quiet = 1,
    #[default]
    Normal = 2,
    Verbose = 3,
}

/// Parameters of one execution: variable overrides, output attribution and sink
#[derive(Debug, Clone, Default)]
pub struct ExecParams {
    /// Overrides applied above every resolved scope
    pub vars: HashMap<String, String>,

    /// Dotted attribution label, e.g. `build.web`
    pub label: Option<String>,

    /// Destination of labelled command output
    pub output: Option<OutputSink>,
}

impl ExecParams {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_vars(mut self, vars: HashMap<String, String>) -> Self {
        self.vars = vars;
        self
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    pub fn with_output(mut self, output: OutputSink) -> Self {
        self.output = Some(output);
        self
    }

    /// Parameters for a child node: `parent.child`
    pub fn descend(&self, name: &str) -> Self {
        self.relabel(join_label(self.label.as_deref(), ".", name))
    }

    /// Parameters for a delegated module: `parent/pathspec`
    pub fn delegate(&self, pathspec: &str) -> Self {
        self.relabel(join_label(self.label.as_deref(), "/", pathspec))
    }

    /// Same label and sink, with extra overrides layered on top
    pub fn overriding(&self, vars: impl IntoIterator<Item = (String, String)>) -> Self {
        let mut params = self.clone();
        params.vars.extend(vars);
        params
    }

    fn relabel(&self, label: String) -> Self {
        ExecParams {
            vars: self.vars.clone(),
            label: Some(label),
            output: self.output.clone(),
        }
    }
}

fn join_label(parent: Option<&str>, separator: &str, child: &str) -> String {
    match parent {
        Some(parent) if !parent.is_empty() => format!("{}{}{}", parent, separator, child),
        _ => child.to_string(),
    }
}

/// Shared, line-oriented destination for command output
#[derive(Clone)]
pub struct OutputSink {
    writer: Arc<Mutex<Box<dyn Write + Send>>>,
}

impl OutputSink {
    pub fn new<W: Write + Send + 'static>(writer: W) -> Self {
        OutputSink {
            writer: Arc::new(Mutex::new(Box::new(writer))),
        }
    }

    pub fn stdout() -> Self {
        Self::new(io::stdout())
    }

    /// Write one line, prefixed with `[label] ` when a label is given
    pub fn write_line(&self, label: Option<&str>, line: &str) -> io::Result<()> {
        let mut writer = self.writer.lock().unwrap_or_else(|e| e.into_inner());
        match label {
            Some(label) => writeln!(writer, "{} {}", format!("[{}]", label).cyan(), line)?,
            None => writeln!(writer, "{}", line)?,
        }
        writer.flush()
    }
}

impl fmt::Debug for OutputSink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OutputSink").finish_non_exhaustive()
    }
}

/// Prints engine activity according to the verbosity level
#[derive(Debug, Clone, Copy, Default)]
pub struct Reporter {
    pub verbosity: Verbosity,
}

impl Reporter {
    pub fn new(verbosity: Verbosity) -> Self {
        Reporter { verbosity }
    }

    /// Echo a command before it runs: `[label] cmd [cwd]`
    pub fn command(&self, label: Option<&str>, command: &str, cwd: &Path) {
        if self.verbosity >= Verbosity::Normal {
            eprintln!(
                "{}{} {}",
                prefix(label),
                command.bold(),
                format!("[{}]", cwd.display()).dimmed()
            );
        }
    }

    /// Print an informational notice
    pub fn notice(&self, label: Option<&str>, message: &str) {
        if self.verbosity >= Verbosity::Normal {
            eprintln!("{}{}", prefix(label), message);
        }
    }

    /// Print a warning
    pub fn warn(&self, message: &str) {
        if self.verbosity >= Verbosity::Quiet {
            eprintln!("{} {}", "warning:".yellow().bold(), message);
        }
    }

    /// Print an error message
    pub fn error(&self, label: Option<&str>, message: &str) {
        if self.verbosity >= Verbosity::Quiet {
            eprintln!("{}{} {}", prefix(label), "error:".red().bold(), message);
        }
    }

    /// Print debug message (only in verbose mode)
    pub fn debug(&self, message: &str) {
        if self.verbosity >= Verbosity::Verbose {
            eprintln!("{}", message.dimmed());
        }
    }
}

fn prefix(label: Option<&str>) -> String {
    match label {
        Some(label) => format!("{} ", format!("[{}]", label).cyan()),
        None => String::new(),
    }
}
