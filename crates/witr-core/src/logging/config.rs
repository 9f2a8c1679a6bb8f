//! Resolving the log level and format.
//!
//! Precedence, lowest first: built-in defaults, `RUST_LOG`, `WITR_LOG`,
//! `WITR_LOG_FORMAT`, then the `--log-level` / `--log-format` / `-q` flags.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tracing_subscriber::filter::LevelFilter;

/// Shape of diagnostic lines on stderr.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Human,
    /// One JSON object per line.
    Jsonl,
}

const FORMAT_NAMES: &[(&str, LogFormat)] = &[
    ("human", LogFormat::Human),
    ("console", LogFormat::Human),
    ("pretty", LogFormat::Human),
    ("jsonl", LogFormat::Jsonl),
    ("json", LogFormat::Jsonl),
];

impl FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        lookup_name(FORMAT_NAMES, s).ok_or_else(|| format!("unknown log format: {s}"))
    }
}

impl fmt::Display for LogFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            LogFormat::Human => "human",
            LogFormat::Jsonl => "jsonl",
        })
    }
}

/// Most verbose level that still gets through.
///
/// Defaults to `Warn`: the report is the output and logs only surface
/// trouble.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    #[default]
    Warn,
    Error,
    Off,
}

const LEVEL_NAMES: &[(&str, LogLevel)] = &[
    ("trace", LogLevel::Trace),
    ("debug", LogLevel::Debug),
    ("info", LogLevel::Info),
    ("warn", LogLevel::Warn),
    ("warning", LogLevel::Warn),
    ("error", LogLevel::Error),
    ("off", LogLevel::Off),
    ("none", LogLevel::Off),
    ("quiet", LogLevel::Off),
];

impl LogLevel {
    pub fn as_str(self) -> &'static str {
        match self {
            LogLevel::Trace => "trace",
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
            LogLevel::Off => "off",
        }
    }

    /// Best effort read of a `RUST_LOG` directive list: the most verbose
    /// level named anywhere in it wins. `warn` is the default already, so
    /// it is not searched for.
    fn from_rust_log(directives: &str) -> Option<Self> {
        [
            LogLevel::Trace,
            LogLevel::Debug,
            LogLevel::Info,
            LogLevel::Error,
        ]
        .into_iter()
        .find(|level| directives.contains(level.as_str()))
    }
}

impl FromStr for LogLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        lookup_name(LEVEL_NAMES, s).ok_or_else(|| format!("unknown log level: {s}"))
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<LogLevel> for LevelFilter {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Trace => LevelFilter::TRACE,
            LogLevel::Debug => LevelFilter::DEBUG,
            LogLevel::Info => LevelFilter::INFO,
            LogLevel::Warn => LevelFilter::WARN,
            LogLevel::Error => LevelFilter::ERROR,
            LogLevel::Off => LevelFilter::OFF,
        }
    }
}

fn lookup_name<T: Copy>(table: &[(&str, T)], name: &str) -> Option<T> {
    table
        .iter()
        .find(|(candidate, _)| candidate.eq_ignore_ascii_case(name.trim()))
        .map(|(_, value)| *value)
}

#[derive(Debug, Clone, Default)]
pub struct LogConfig {
    pub format: LogFormat,
    pub level: LogLevel,
    /// Prefix human lines with a timestamp.
    pub timestamps: bool,
    /// Attach file and line to each event.
    pub source_location: bool,
}

impl LogConfig {
    pub fn from_env(cli_level: Option<LogLevel>, cli_format: Option<LogFormat>) -> Self {
        Self::from_lookup(|key| std::env::var(key).ok(), cli_level, cli_format)
    }

    /// [`from_env`](Self::from_env) over an arbitrary variable source.
    /// Unparseable values are ignored rather than reported.
    pub fn from_lookup(
        lookup: impl Fn(&str) -> Option<String>,
        cli_level: Option<LogLevel>,
        cli_format: Option<LogFormat>,
    ) -> Self {
        let env_level = match lookup("WITR_LOG") {
            Some(value) => value.parse().ok(),
            None => lookup("RUST_LOG").and_then(|v| LogLevel::from_rust_log(&v)),
        };
        let env_format = lookup("WITR_LOG_FORMAT").and_then(|v| v.parse().ok());

        LogConfig {
            level: cli_level.or(env_level).unwrap_or_default(),
            format: cli_format.or(env_format).unwrap_or_default(),
            ..LogConfig::default()
        }
    }

    pub fn with_format(mut self, format: LogFormat) -> Self {
        self.format = format;
        self
    }

    pub fn with_level(mut self, level: LogLevel) -> Self {
        self.level = level;
        self
    }

    pub fn with_timestamps(mut self, enabled: bool) -> Self {
        self.timestamps = enabled;
        self
    }

    pub fn with_source_location(mut self, enabled: bool) -> Self {
        self.source_location = enabled;
        self
    }
}
