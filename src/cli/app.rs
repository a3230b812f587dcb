//! Main CLI application

use crate::config::{collect_configs, find_config_file_from, load_config, Config, Scope};
use crate::plugin::PluginCatalog;
use crate::runner::{Engine, ExecParams, OutputSink, Reporter, Selection, Verbosity};
use anyhow::{bail, Context as _};
use clap::{Arg, ArgAction, ArgMatches, Command};
use clap_complete::Shell;
use colored::Colorize;
use std::collections::HashMap;
use std::fmt::Write as _;
use std::io;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::debug;
use tracing_subscriber::EnvFilter;

/// Environment variable holding a tracing filter directive
pub const LOG_ENV: &str = "COHESION_LOG";

/// CLI application: a loaded root Config and the engine to run it with
pub struct App {
    config: Arc<Config>,
    engine: Engine,
    vars: HashMap<String, String>,
}

impl App {
    /// Load the root Config and build the registry from its plugins
    pub async fn load(matches: &ArgMatches) -> anyhow::Result<Self> {
        let cwd = working_dir(matches.get_one::<String>("cwd").map(String::as_str))?;

        let location = match matches.get_one::<String>("config") {
            Some(location) => location.clone(),
            None => find_config_file_from(cwd.clone())?
                .to_string_lossy()
                .to_string(),
        };
        debug!(config = %location, cwd = %cwd.display(), "loading config");

        let config = load_config(&location, &cwd)
            .await
            .with_context(|| format!("Failed to load config '{}'", location))?;

        let registry = PluginCatalog::builtin()
            .build_registry(&config.plugins)
            .context("Failed to initialize plugins")?;

        let engine = Engine::new(registry)
            .with_reporter(Reporter::new(get_verbosity(matches)))
            .with_dry_run(matches.get_flag("dry-run"));

        let vars = parse_vars(
            matches
                .get_many::<String>("var")
                .into_iter()
                .flatten()
                .map(String::as_str),
        )?;

        Ok(App {
            config,
            engine,
            vars,
        })
    }

    /// Run each argument as a selection, in order; no arguments runs the defaults
    pub async fn run(&self, args: &[String]) -> anyhow::Result<()> {
        let selections = Selection::parse_many(args);
        let params = ExecParams::new()
            .with_vars(self.vars.clone())
            .with_output(OutputSink::stdout());

        self.engine
            .run(&self.config, &selections, &params)
            .await?;
        Ok(())
    }

    /// Print the root Config and every discovered Config with its labels
    pub async fn view(&self) -> anyhow::Result<()> {
        let modules = collect_configs(&self.config)
            .await
            .context("Failed to resolve modules")?;
        print!("{}", render_view(&self.config, &modules));
        Ok(())
    }
}

/// Build the clap command
pub fn build_command() -> Command {
    Command::new("cohesion")
        .version(env!("CARGO_PKG_VERSION"))
        .about("A monorepo-aware YAML task and action orchestrator")
        .args_conflicts_with_subcommands(true)
        .arg(
            Arg::new("tasks")
                .value_name("TASKS")
                .help("Task selections, e.g. `build.web|build.api,test`")
                .num_args(0..)
                .action(ArgAction::Append),
        )
        .arg(
            Arg::new("config")
                .short('c')
                .long("config")
                .value_name("FILE|URI")
                .help("Path or URI of the root config file")
                .global(true),
        )
        .arg(
            Arg::new("cwd")
                .long("cwd")
                .value_name("DIR")
                .help("Directory to resolve the config from")
                .global(true),
        )
        .arg(
            Arg::new("var")
                .long("var")
                .value_name("KEY=VALUE")
                .help("Override a variable in every scope")
                .action(ArgAction::Append)
                .global(true),
        )
        .arg(
            Arg::new("dry-run")
                .long("dry-run")
                .help("Print commands without running them")
                .action(ArgAction::SetTrue)
                .global(true),
        )
        .arg(
            Arg::new("quiet")
                .short('q')
                .long("quiet")
                .help("Only print command output and errors")
                .action(ArgAction::SetTrue)
                .global(true),
        )
        .arg(
            Arg::new("silent")
                .short('s')
                .long("silent")
                .help("Print no output")
                .action(ArgAction::SetTrue)
                .global(true),
        )
        .arg(
            Arg::new("verbose")
                .short('v')
                .long("verbose")
                .help("Print verbose output")
                .action(ArgAction::SetTrue)
                .global(true),
        )
        .subcommand(Command::new("view").about("Show the config and every discovered module"))
        .subcommand(
            Command::new("completions")
                .about("Generate shell completions")
                .arg(
                    Arg::new("shell")
                        .value_name("SHELL")
                        .required(true)
                        .value_parser(clap::value_parser!(Shell)),
                ),
        )
}

/// Get verbosity level from matches
fn get_verbosity(matches: &ArgMatches) -> Verbosity {
    if matches.get_flag("silent") {
        Verbosity::Silent
    } else if matches.get_flag("quiet") {
        Verbosity::Quiet
    } else if matches.get_flag("verbose") {
        Verbosity::Verbose
    } else {
        Verbosity::Normal
    }
}

/// Parse `KEY=VALUE` overrides; later values win
fn parse_vars<'a>(values: impl IntoIterator<Item = &'a str>) -> anyhow::Result<HashMap<String, String>> {
    let mut vars = HashMap::new();
    for value in values {
        let Some((key, val)) = value.split_once('=') else {
            bail!("Invalid variable '{}': expected KEY=VALUE", value);
        };
        let key = key.trim();
        if key.is_empty() {
            bail!("Invalid variable '{}': empty name", value);
        }
        vars.insert(key.to_string(), val.to_string());
    }
    Ok(vars)
}

fn working_dir(cwd: Option<&str>) -> anyhow::Result<PathBuf> {
    let current = std::env::current_dir().context("Failed to get current directory")?;
    Ok(match cwd {
        Some(dir) => crate::utils::resolve_path(&current, dir),
        None => current,
    })
}

/// Install the stderr log subscriber; `COHESION_LOG` overrides the verbosity level
fn init_tracing(verbosity: Verbosity) {
    let level = match verbosity {
        Verbosity::Silent => "off",
        Verbosity::Quiet => "warn",
        Verbosity::Normal => "info",
        Verbosity::Verbose => "debug",
    };
    let filter = EnvFilter::try_from_env(LOG_ENV)
        .unwrap_or_else(|_| EnvFilter::new(format!("cohesion={}", level)));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .with_target(false)
        .try_init();
}

/// Render the `view` listing
fn render_view(root: &Config, modules: &[Arc<Config>]) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "{} {}", "config:".bold(), root.source);
    render_tasks(&mut out, root, Scope::Config, 1);

    for module in modules {
        let indent = "  ".repeat(module.depth());
        let _ = writeln!(out, "{}{}", indent, module.path.display().to_string().bold());
        for (key, values) in &module.labels {
            let _ = writeln!(out, "{}  {}: {}", indent, key.cyan(), values.join(", "));
        }
    }
    out
}

fn render_tasks(out: &mut String, config: &Config, scope: Scope, depth: usize) {
    for &id in config.scope_tasks(scope) {
        let task = config.task(id);
        let marker = if task.parallel { " (parallel)" } else { "" };
        let _ = writeln!(out, "{}- {}{}", "  ".repeat(depth), task.name, marker.dimmed());
        render_tasks(out, config, Scope::Task(id), depth + 1);
    }
}

/// Run the CLI application with the process arguments
pub async fn run() -> anyhow::Result<()> {
    run_from(std::env::args_os()).await
}

/// Run the CLI application with explicit arguments
pub async fn run_from<I, T>(args: I) -> anyhow::Result<()>
where
    I: IntoIterator<Item = T>,
    T: Into<std::ffi::OsString> + Clone,
{
    let matches = build_command().get_matches_from(args);
    init_tracing(get_verbosity(&matches));

    match matches.subcommand() {
        Some(("completions", sub)) => {
            if let Some(shell) = sub.get_one::<Shell>("shell").copied() {
                let mut command = build_command();
                clap_complete::generate(shell, &mut command, "cohesion", &mut io::stdout());
            }
            Ok(())
        }
        Some(("view", sub)) => App::load(sub).await?.view().await,
        _ => {
            let tasks: Vec<String> = matches
                .get_many::<String>("tasks")
                .into_iter()
                .flatten()
                .cloned()
                .collect();
            App::load(&matches).await?.run(&tasks).await
        }
    }
}
