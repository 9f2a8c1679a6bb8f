//! Query and process snapshot model.
//!
//! All values here are built fresh for each invocation and handed from
//! the resolver to the classifier and finally to rendering. Nothing is
//! shared or mutated after construction except the last ancestry entry,
//! which verbose mode replaces with an enriched copy.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// What the user asked about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TargetKind {
    Pid,
    Port,
    Name,
    File,
}

impl fmt::Display for TargetKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TargetKind::Pid => write!(f, "pid"),
            TargetKind::Port => write!(f, "port"),
            TargetKind::Name => write!(f, "name"),
            TargetKind::File => write!(f, "file"),
        }
    }
}

/// A query target as typed by the user. The value is kept verbatim;
/// the resolver validates it for the given kind.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Target {
    pub kind: TargetKind,
    pub value: String,
}

impl Target {
    pub fn new(kind: TargetKind, value: impl Into<String>) -> Self {
        Self {
            kind,
            value: value.into(),
        }
    }

    pub fn pid(pid: u32) -> Self {
        Self::new(TargetKind::Pid, pid.to_string())
    }

    pub fn port(port: u16) -> Self {
        Self::new(TargetKind::Port, port.to_string())
    }

    pub fn name(name: impl Into<String>) -> Self {
        Self::new(TargetKind::Name, name)
    }

    pub fn file(path: impl Into<String>) -> Self {
        Self::new(TargetKind::File, path)
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.kind, self.value)
    }
}

/// Coarse health classification of a process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Health {
    #[default]
    Healthy,
    /// Exited but not yet reaped (`Z`).
    Zombie,
    /// Stopped by a signal or debugger (`T`).
    Stopped,
    /// More than two hours of CPU time, or a hot CPU percentage where
    /// only an instantaneous figure is available.
    HighCpu,
    /// Resident set above 1 GiB.
    HighMem,
    /// The platform reported a status we do not classify.
    Unknown,
}

impl fmt::Display for Health {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Health::Healthy => write!(f, "healthy"),
            Health::Zombie => write!(f, "zombie"),
            Health::Stopped => write!(f, "stopped"),
            Health::HighCpu => write!(f, "high-cpu"),
            Health::HighMem => write!(f, "high-mem"),
            Health::Unknown => write!(f, "unknown"),
        }
    }
}

/// Whether the process was forked from something other than init.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Forked {
    Forked,
    NotForked,
    #[default]
    Unknown,
}

impl Forked {
    /// Forked unless the parent is PID 1 or the process is the init
    /// process itself.
    pub fn classify(ppid: u32, command: &str, init_name: &str) -> Self {
        if ppid != 1 && command != init_name {
            Forked::Forked
        } else {
            Forked::NotForked
        }
    }
}

impl fmt::Display for Forked {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Forked::Forked => write!(f, "forked"),
            Forked::NotForked => write!(f, "not-forked"),
            Forked::Unknown => write!(f, "unknown"),
        }
    }
}

/// A listening socket owned by a process.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Listener {
    pub address: String,
    pub port: u16,
}

/// Resource figures attached in verbose mode.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtendedInfo {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rss_bytes: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub vms_bytes: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub shared_bytes: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub read_bytes: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub write_bytes: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fd_count: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fd_limit: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub threads: Option<u64>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<u32>,
}

/// Point-in-time snapshot of one process.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Process {
    pub pid: u32,
    pub ppid: u32,
    /// Short command name (`comm`).
    pub command: String,
    /// Full command line, arguments joined by spaces.
    pub cmdline: String,
    #[serde(default)]
    pub exe: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    pub user: String,
    pub working_dir: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub git_repo: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub git_branch: Option<String>,
    /// Container runtime or container label (`docker`, `kubernetes`,
    /// `jail`, `target: web`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub container: Option<String>,
    /// Service manager unit or label owning the process.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub service: Option<String>,
    #[serde(default)]
    pub listeners: Vec<Listener>,
    #[serde(default)]
    pub health: Health,
    #[serde(default)]
    pub forked: Forked,
    #[serde(default)]
    pub env: Vec<String>,
    #[serde(default)]
    pub exe_deleted: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extended: Option<ExtendedInfo>,
}

impl Process {
    pub fn ports(&self) -> Vec<u16> {
        self.listeners.iter().map(|l| l.port).collect()
    }

    pub fn bind_addresses(&self) -> Vec<&str> {
        self.listeners.iter().map(|l| l.address.as_str()).collect()
    }

    /// Time since start, if the start time is known and not in the future.
    pub fn age(&self, now: DateTime<Utc>) -> Option<chrono::Duration> {
        let started = self.started_at?;
        let age = now.signed_duration_since(started);
        (age >= chrono::Duration::zero()).then_some(age)
    }
}

/// Minimal process-table row used for name matching and disambiguation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessEntry {
    pub pid: u32,
    pub command: String,
    pub cmdline: String,
}

/// Mechanism that caused a process to run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceType {
    Container,
    Systemd,
    Launchd,
    Supervisor,
    Cron,
    Shell,
    Unknown,
}

impl fmt::Display for SourceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SourceType::Container => write!(f, "container"),
            SourceType::Systemd => write!(f, "systemd"),
            SourceType::Launchd => write!(f, "launchd"),
            SourceType::Supervisor => write!(f, "supervisor"),
            SourceType::Cron => write!(f, "cron"),
            SourceType::Shell => write!(f, "shell"),
            SourceType::Unknown => write!(f, "unknown"),
        }
    }
}

/// Classification result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Source {
    #[serde(rename = "type")]
    pub source_type: SourceType,
    pub name: String,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub details: BTreeMap<String, String>,
}

impl Source {
    pub fn new(source_type: SourceType, name: impl Into<String>) -> Self {
        Self {
            source_type,
            name: name.into(),
            details: BTreeMap::new(),
        }
    }

    pub fn unknown() -> Self {
        Self::new(SourceType::Unknown, "")
    }

    pub fn with_detail(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.details.insert(key.into(), value.into());
        self
    }
}

/// TCP state of the socket behind a port query.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SocketInfo {
    pub port: u16,
    pub state: String,
    pub explanation: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub workaround: Option<String>,
}

/// A running container that publishes a host port.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DockerPortMatch {
    pub id: String,
    pub name: String,
    pub image: String,
    pub ports: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub compose_project: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub compose_service: String,
}

impl DockerPortMatch {
    /// `docker-compose: project/service` when compose labels are present.
    pub fn source_label(&self) -> String {
        if !self.compose_project.is_empty() && !self.compose_service.is_empty() {
            format!(
                "docker-compose: {}/{}",
                self.compose_project, self.compose_service
            )
        } else {
            "docker".to_string()
        }
    }
}

/// Everything one query produced; the sole input to rendering.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryResult {
    pub target: Target,
    /// Human label for what was resolved (a unit name for socket-activated
    /// ports, otherwise the process command).
    pub resolved_target: String,
    pub pid: u32,
    /// Root first; the queried process is last.
    pub ancestry: Vec<Process>,
    pub source: Source,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub restart_count: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub socket: Option<SocketInfo>,
    pub warnings: Vec<String>,
    /// An ancestor exited while the chain was being walked.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub partial_ancestry: bool,
}

impl QueryResult {
    /// The queried process (last element of the chain).
    pub fn process(&self) -> Option<&Process> {
        self.ancestry.last()
    }
}
