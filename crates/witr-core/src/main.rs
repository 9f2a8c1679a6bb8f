//! witr - why is this running?
//!
//! Explains where a process came from: its ancestry, the mechanism that
//! started it, and anything unusual about it.

use std::io::IsTerminal;
use std::path::PathBuf;

use chrono::Utc;
use clap::error::ErrorKind;
use clap::{ArgGroup, CommandFactory, Parser};
use tracing::{debug, info_span};

use witr_common::error::{format_error_human, StructuredError};
use witr_common::{Error, OutputFormat, Target, TargetKind};
use witr_core::app::{explain, ExplainOptions, Outcome};
use witr_core::collect::{platform_source, ToolRunner};
use witr_core::config::{load_config, ConfigOptions};
use witr_core::exit_codes::ExitCode;
use witr_core::logging::{generate_run_id, init_logging, LogConfig, LogFormat, LogLevel};
use witr_core::output::{self, View};

const ABOUT: &str = "Why is this running? Explain where a process, port or file comes from.";

const EXAMPLES: &str = "\
Examples:
  witr nginx
  witr --pid 1234
  witr --port 5432
  witr --file /var/lib/dpkg/lock
  witr bun --exact
  witr --port 8080 --short
  witr --pid 1234 --tree
  witr node --warnings --json";

/// Command-line arguments of `witr`.
#[derive(Parser, Debug)]
#[command(name = "witr")]
#[command(version, about = ABOUT, long_about = None, after_help = EXAMPLES)]
#[command(group(ArgGroup::new("target").args(["name", "pid", "port", "file"])))]
#[command(group(ArgGroup::new("view").args(["short", "tree", "warnings", "env"])))]
struct Cli {
    /// Process or service name
    name: Option<String>,

    /// Explain a process by PID
    #[arg(short = 'p', long)]
    pid: Option<String>,

    /// Explain the process listening on a TCP port
    #[arg(short = 'o', long)]
    port: Option<String>,

    /// Explain the process holding a file open
    #[arg(short = 'f', long)]
    file: Option<String>,

    /// Match the process name exactly instead of by substring
    #[arg(short = 'x', long)]
    exact: bool,

    /// Show the ancestry on one line
    #[arg(short = 's', long)]
    short: bool,

    /// Show the ancestry as a tree
    #[arg(short = 't', long)]
    tree: bool,

    /// Show warnings only
    #[arg(long)]
    warnings: bool,

    /// Show environment variables only
    #[arg(long)]
    env: bool,

    /// Shorthand for --format json
    #[arg(long)]
    json: bool,

    /// Output format
    #[arg(long, value_enum)]
    format: Option<OutputFormat>,

    /// Include memory, I/O, file descriptor and socket details
    #[arg(long)]
    verbose: bool,

    /// Disable colored output
    #[arg(long)]
    no_color: bool,

    /// Override config directory
    #[arg(long, value_name = "DIR")]
    config: Option<PathBuf>,

    /// Log level for diagnostics on stderr
    #[arg(long, value_name = "LEVEL")]
    log_level: Option<LogLevel>,

    /// Log format for diagnostics on stderr (human, jsonl)
    #[arg(long, value_name = "FORMAT")]
    log_format: Option<LogFormat>,

    /// Only log errors
    #[arg(short, long)]
    quiet: bool,
}

impl Cli {
    fn target(&self) -> Option<Target> {
        if let Some(pid) = &self.pid {
            Some(Target::new(TargetKind::Pid, pid.clone()))
        } else if let Some(port) = &self.port {
            Some(Target::new(TargetKind::Port, port.clone()))
        } else if let Some(file) = &self.file {
            Some(Target::new(TargetKind::File, file.clone()))
        } else {
            self.name.as_ref().map(|name| Target::name(name.clone()))
        }
    }

    fn view(&self) -> View {
        if self.short {
            View::Short
        } else if self.tree {
            View::Tree
        } else if self.warnings {
            View::Warnings
        } else if self.env {
            View::Env
        } else {
            View::Standard
        }
    }

    fn output_format(&self) -> OutputFormat {
        if self.json {
            OutputFormat::Json
        } else {
            self.format.unwrap_or_default()
        }
    }
}

// ============================================================================
// Main entry point
// ============================================================================

fn main() {
    let exit_code = match Cli::try_parse() {
        Ok(cli) => run(&cli),
        Err(err) => {
            let code = match err.kind() {
                ErrorKind::DisplayHelp | ErrorKind::DisplayVersion => ExitCode::Clean,
                _ => ExitCode::ArgsError,
            };
            let _ = err.print();
            code
        }
    };
    std::process::exit(exit_code.as_i32());
}

fn run(cli: &Cli) -> ExitCode {
    let cli_level = if cli.quiet {
        Some(LogLevel::Error)
    } else {
        cli.log_level
    };
    init_logging(&LogConfig::from_env(cli_level, cli.log_format));

    let run_id = generate_run_id();
    let span = info_span!("witr", run_id = %run_id);
    let _guard = span.enter();

    let Some(target) = cli.target() else {
        let _ = Cli::command().print_help();
        return ExitCode::Clean;
    };

    let format = cli.output_format();
    let resolved = match load_config(&ConfigOptions {
        config_dir: cli.config.clone(),
    }) {
        Ok(resolved) => resolved,
        Err(e) => return report_error(&e.into(), format, false),
    };
    let config = resolved.config;
    debug!(path = ?resolved.path, "configuration resolved");

    let color = config.color
        && !cli.no_color
        && std::env::var_os("NO_COLOR").is_none()
        && std::io::stdout().is_terminal();
    let options = ExplainOptions {
        exact: cli.exact || config.exact,
        verbose: cli.verbose,
        docker_fallback: config.docker_fallback,
    };

    let source = platform_source(ToolRunner::new(config.tool_config()));
    let view = cli.view();

    let outcome = match explain(source.as_ref(), &target, &options) {
        Ok(outcome) => outcome,
        Err(e) => return report_error(&e, format, color),
    };
    let ambiguity = outcome.ambiguity();
    if let Some(err) = &ambiguity {
        debug!(error = %err, "listing candidates instead of a report");
    }

    let (rendered, exit) = match outcome {
        Outcome::Report(result) => {
            let rendered = match format {
                OutputFormat::Json => output::report_json(&result, view).map(|s| s + "\n"),
                OutputFormat::Text => Ok(output::report_text(
                    &result,
                    view,
                    color,
                    cli.verbose,
                    Utc::now(),
                )),
            };
            (rendered, ExitCode::Clean)
        }
        Outcome::Ambiguous(candidates) => {
            let rendered = match format {
                OutputFormat::Json => output::ambiguous_json(&candidates).map(|s| s + "\n"),
                OutputFormat::Text => Ok(output::ambiguous_text(&candidates, color, view)),
            };
            let exit = ambiguity
                .as_ref()
                .map_or(ExitCode::Ambiguous, ExitCode::for_error);
            (rendered, exit)
        }
        Outcome::Container(m) => {
            let rendered = match format {
                OutputFormat::Json => output::container_json(&target.value, &m).map(|s| s + "\n"),
                OutputFormat::Text => Ok(output::container_text(&target.value, &m, view, color)),
            };
            (rendered, ExitCode::Clean)
        }
    };

    match rendered {
        Ok(text) => {
            print!("{text}");
            exit
        }
        Err(e) => report_error(&e, format, color),
    }
}

/// Print `err` for the selected format and map it to an exit code.
fn report_error(err: &Error, format: OutputFormat, color: bool) -> ExitCode {
    match format {
        OutputFormat::Json => {
            println!("{}", StructuredError::from(err).to_json_pretty());
        }
        OutputFormat::Text => {
            eprintln!("{}", format_error_human(err, color));
            if matches!(err, Error::OwnerNotDetected { .. }) {
                let args: Vec<String> = std::env::args().collect();
                eprintln!("\nTry running with sudo:\n  sudo {}", args.join(" "));
            }
        }
    }
    ExitCode::for_error(err)
}
