//! Mock processes and an in-memory process source for testing.
//!
//! - [`MockProcessBuilder`] builds `Process` snapshots with sensible defaults
//! - [`MockSource`] is a [`ProcessSource`] over a fixed process table, with
//!   optional port owners, open files, service units and enrichments
//!
//! # Example
//!
//! ```ignore
//! use witr_core::mock_process::{MockProcessBuilder, MockSource};
//!
//! let source = MockSource::new()
//!     .with_process(MockProcessBuilder::new().pid(1).ppid(0).command("systemd").build())
//!     .with_process(MockProcessBuilder::new().pid(600).command("nginx").root().build())
//!     .with_listeners(80, &[600]);
//! ```

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use witr_common::{
    DockerPortMatch, Error, ExtendedInfo, Forked, Health, Listener, Process, ProcessEntry, Result,
};

use crate::collect::{ProcessSource, TcpState};

// ============================================================================
// MockProcessBuilder
// ============================================================================

/// Builder for `Process` snapshots.
///
/// All fields have defaults, so a test only sets what it looks at. The
/// command line defaults to the command name.
#[derive(Debug, Clone)]
pub struct MockProcessBuilder {
    pid: u32,
    ppid: u32,
    command: String,
    cmdline: Option<String>,
    exe: String,
    started_at: Option<DateTime<Utc>>,
    user: String,
    working_dir: String,
    git_repo: Option<String>,
    git_branch: Option<String>,
    container: Option<String>,
    service: Option<String>,
    listeners: Vec<Listener>,
    health: Health,
    forked: Forked,
    env: Vec<String>,
    exe_deleted: bool,
}

impl Default for MockProcessBuilder {
    fn default() -> Self {
        Self {
            pid: 1000,
            ppid: 1,
            command: "test".to_string(),
            cmdline: None,
            exe: String::new(),
            started_at: None,
            user: "testuser".to_string(),
            working_dir: "/home/testuser".to_string(),
            git_repo: None,
            git_branch: None,
            container: None,
            service: None,
            listeners: Vec::new(),
            health: Health::Healthy,
            forked: Forked::Unknown,
            env: Vec::new(),
            exe_deleted: false,
        }
    }
}

impl MockProcessBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    // === Identity ===

    pub fn pid(mut self, pid: u32) -> Self {
        self.pid = pid;
        self
    }

    pub fn ppid(mut self, ppid: u32) -> Self {
        self.ppid = ppid;
        self
    }

    pub fn command(mut self, command: impl Into<String>) -> Self {
        self.command = command.into();
        self
    }

    pub fn cmdline(mut self, cmdline: impl Into<String>) -> Self {
        self.cmdline = Some(cmdline.into());
        self
    }

    pub fn exe(mut self, exe: impl Into<String>) -> Self {
        self.exe = exe.into();
        self
    }

    pub fn user(mut self, user: impl Into<String>) -> Self {
        self.user = user.into();
        self
    }

    pub fn working_dir(mut self, dir: impl Into<String>) -> Self {
        self.working_dir = dir.into();
        self
    }

    pub fn started_at(mut self, at: DateTime<Utc>) -> Self {
        self.started_at = Some(at);
        self
    }

    // === Labels ===

    pub fn git(mut self, repo: impl Into<String>, branch: impl Into<String>) -> Self {
        self.git_repo = Some(repo.into());
        self.git_branch = Some(branch.into());
        self
    }

    pub fn container(mut self, label: impl Into<String>) -> Self {
        self.container = Some(label.into());
        self
    }

    pub fn service(mut self, unit: impl Into<String>) -> Self {
        self.service = Some(unit.into());
        self
    }

    // === State ===

    pub fn listeners(mut self, listeners: Vec<Listener>) -> Self {
        self.listeners = listeners;
        self
    }

    /// Add one listening socket.
    pub fn listening(mut self, address: impl Into<String>, port: u16) -> Self {
        self.listeners.push(Listener {
            address: address.into(),
            port,
        });
        self
    }

    pub fn health(mut self, health: Health) -> Self {
        self.health = health;
        self
    }

    pub fn forked(mut self, forked: Forked) -> Self {
        self.forked = forked;
        self
    }

    pub fn env(mut self, env: Vec<String>) -> Self {
        self.env = env;
        self
    }

    pub fn exe_deleted(mut self, deleted: bool) -> Self {
        self.exe_deleted = deleted;
        self
    }

    // === Scenario helpers ===

    /// Owned by root.
    pub fn root(mut self) -> Self {
        self.user = "root".to_string();
        self
    }

    /// Exited but not reaped.
    pub fn zombie(mut self) -> Self {
        self.health = Health::Zombie;
        self
    }

    /// Builds the process.
    pub fn build(self) -> Process {
        let cmdline = self.cmdline.unwrap_or_else(|| self.command.clone());
        Process {
            pid: self.pid,
            ppid: self.ppid,
            command: self.command,
            cmdline,
            exe: self.exe,
            started_at: self.started_at,
            user: self.user,
            working_dir: self.working_dir,
            git_repo: self.git_repo,
            git_branch: self.git_branch,
            container: self.container,
            service: self.service,
            listeners: self.listeners,
            health: self.health,
            forked: self.forked,
            env: self.env,
            exe_deleted: self.exe_deleted,
            extended: None,
        }
    }
}

// ============================================================================
// MockSource
// ============================================================================

/// In-memory [`ProcessSource`].
///
/// Port owners registered with an empty PID list model a LISTEN socket
/// whose owner cannot be attributed.
#[derive(Debug, Clone, Default)]
pub struct MockSource {
    processes: BTreeMap<u32, Process>,
    listeners: BTreeMap<u16, Vec<u32>>,
    socket_states: HashMap<u16, TcpState>,
    files: HashMap<PathBuf, Vec<u32>>,
    services: HashMap<String, u32>,
    port_units: HashMap<u16, String>,
    restart_counts: HashMap<String, u32>,
    extended: HashMap<u32, ExtendedInfo>,
    launchd: HashMap<String, BTreeMap<String, String>>,
    container_labels: HashMap<u32, String>,
    docker_ports: HashMap<u16, DockerPortMatch>,
    self_pids: Vec<u32>,
}

impl MockSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_process(mut self, process: Process) -> Self {
        self.processes.insert(process.pid, process);
        self
    }

    /// Add every process of a chain.
    pub fn with_chain(self, chain: impl IntoIterator<Item = Process>) -> Self {
        chain.into_iter().fold(self, Self::with_process)
    }

    /// Register LISTEN owners for `port`. An empty slice leaves the socket
    /// without an owner.
    pub fn with_listeners(mut self, port: u16, pids: &[u32]) -> Self {
        self.listeners.entry(port).or_default().extend_from_slice(pids);
        self
    }

    pub fn with_socket_state(mut self, port: u16, state: TcpState) -> Self {
        self.socket_states.insert(port, state);
        self
    }

    pub fn with_file(mut self, path: impl Into<PathBuf>, pids: &[u32]) -> Self {
        self.files.insert(path.into(), pids.to_vec());
        self
    }

    pub fn with_service(mut self, name: impl Into<String>, pid: u32) -> Self {
        self.services.insert(name.into(), pid);
        self
    }

    pub fn with_port_unit(mut self, port: u16, unit: impl Into<String>) -> Self {
        self.port_units.insert(port, unit.into());
        self
    }

    pub fn with_restart_count(mut self, unit: impl Into<String>, count: u32) -> Self {
        self.restart_counts.insert(unit.into(), count);
        self
    }

    pub fn with_extended(mut self, pid: u32, info: ExtendedInfo) -> Self {
        self.extended.insert(pid, info);
        self
    }

    pub fn with_launchd_details(
        mut self,
        label: impl Into<String>,
        details: BTreeMap<String, String>,
    ) -> Self {
        self.launchd.insert(label.into(), details);
        self
    }

    pub fn with_container_label(mut self, pid: u32, label: impl Into<String>) -> Self {
        self.container_labels.insert(pid, label.into());
        self
    }

    pub fn with_docker_port(mut self, port: u16, m: DockerPortMatch) -> Self {
        self.docker_ports.insert(port, m);
        self
    }

    pub fn with_self_pids(mut self, pids: &[u32]) -> Self {
        self.self_pids = pids.to_vec();
        self
    }

    /// Drop a process, as if it exited.
    pub fn kill(&mut self, pid: u32) {
        self.processes.remove(&pid);
    }
}

impl ProcessSource for MockSource {
    fn read_process(&self, pid: u32) -> Result<Process> {
        self.processes
            .get(&pid)
            .cloned()
            .ok_or_else(|| Error::NotFound(format!("process {pid} not found")))
    }

    fn list_processes(&self) -> Result<Vec<ProcessEntry>> {
        Ok(self
            .processes
            .values()
            .map(|p| ProcessEntry {
                pid: p.pid,
                command: p.command.clone(),
                cmdline: p.cmdline.clone(),
            })
            .collect())
    }

    fn listening_pids(&self, port: u16) -> Result<Vec<u32>> {
        match self.listeners.get(&port) {
            None => Err(Error::NotFound(format!(
                "no process listening on port {port}"
            ))),
            Some(pids) if pids.is_empty() => Err(Error::OwnerNotDetected { port }),
            Some(pids) => Ok(pids.clone()),
        }
    }

    fn file_holders(&self, path: &Path) -> Result<Vec<u32>> {
        match self.files.get(path) {
            Some(pids) if !pids.is_empty() => Ok(pids.clone()),
            _ => Err(Error::NotFound(format!(
                "no process has {} open",
                path.display()
            ))),
        }
    }

    fn service_pid(&self, name: &str) -> Option<u32> {
        self.services.get(name).copied()
    }

    fn socket_state(&self, port: u16) -> Option<TcpState> {
        self.socket_states.get(&port).copied().or_else(|| {
            self.listeners
                .contains_key(&port)
                .then_some(TcpState::Listen)
        })
    }

    fn service_for_port(&self, port: u16) -> Option<String> {
        self.port_units.get(&port).cloned()
    }

    fn restart_count(&self, unit: &str) -> Option<u32> {
        self.restart_counts.get(unit).copied()
    }

    fn extended_info(&self, pid: u32) -> Option<ExtendedInfo> {
        self.extended.get(&pid).cloned()
    }

    fn launchd_details(&self, label: &str) -> BTreeMap<String, String> {
        self.launchd.get(label).cloned().unwrap_or_default()
    }

    fn container_label(&self, process: &Process) -> Option<String> {
        self.container_labels.get(&process.pid).cloned()
    }

    fn docker_port_match(&self, port: u16) -> Option<DockerPortMatch> {
        self.docker_ports.get(&port).cloned()
    }

    fn self_pids(&self) -> Vec<u32> {
        self.self_pids.clone()
    }
}
