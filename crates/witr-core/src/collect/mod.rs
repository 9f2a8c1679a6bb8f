//! Process data collection.
//!
//! Every platform backend implements [`ProcessSource`]; the rest of witr
//! (resolver, ancestry walker, pipeline) only talks to that trait.
//! [`platform_source`] picks the backend for the build target.
//!
//! Parsers for each backend's raw text are plain functions compiled on all
//! hosts so they can be tested anywhere. Only the code that needs unix
//! file APIs is gated.

use std::collections::BTreeMap;
use std::path::Path;

use witr_common::{DockerPortMatch, Error, ExtendedInfo, Process, ProcessEntry, Result};

pub mod container;
pub mod freebsd;
pub mod git;
#[cfg(unix)]
pub mod linux;
pub mod macos;
pub mod net;
pub mod proc_parsers;
pub mod systemd;
pub mod tool_runner;
pub mod windows;

pub use net::TcpState;
pub use tool_runner::{ToolConfig, ToolRunner};

/// Read-only view of the OS process table.
///
/// Required methods are the ones target resolution cannot work without.
/// The rest are enrichments; their defaults mean "no data".
pub trait ProcessSource {
    /// Snapshot one process. `Error::NotFound` when it does not exist.
    fn read_process(&self, pid: u32) -> Result<Process>;

    /// All live processes, for name matching.
    fn list_processes(&self) -> Result<Vec<ProcessEntry>>;

    /// PIDs owning a LISTEN socket on `port`.
    ///
    /// `Error::NotFound` when no such socket exists and
    /// `Error::OwnerNotDetected` when it exists but cannot be attributed.
    fn listening_pids(&self, port: u16) -> Result<Vec<u32>>;

    /// PIDs holding `path` open or locked.
    fn file_holders(&self, path: &Path) -> Result<Vec<u32>>;

    /// PID of the service-manager entry called `name`.
    fn service_pid(&self, name: &str) -> Option<u32>;

    /// TCP state of the most relevant socket on `port`.
    fn socket_state(&self, _port: u16) -> Option<TcpState> {
        None
    }

    /// Service unit activated through a socket on `port`.
    fn service_for_port(&self, _port: u16) -> Option<String> {
        None
    }

    /// Restart counter the service manager keeps for `unit`.
    fn restart_count(&self, _unit: &str) -> Option<u32> {
        None
    }

    /// Resource figures for verbose output.
    fn extended_info(&self, _pid: u32) -> Option<ExtendedInfo> {
        None
    }

    /// Descriptor of a launchd job (plist, KeepAlive, trigger).
    fn launchd_details(&self, _label: &str) -> BTreeMap<String, String> {
        BTreeMap::new()
    }

    /// Human name of the container a process runs in.
    fn container_label(&self, _process: &Process) -> Option<String> {
        None
    }

    /// Container publishing `port`, for sockets owned by a VM or proxy.
    fn docker_port_match(&self, _port: u16) -> Option<DockerPortMatch> {
        None
    }

    /// PIDs name matching must skip: witr itself and its parent.
    fn self_pids(&self) -> Vec<u32> {
        let mut pids = vec![std::process::id()];
        #[cfg(unix)]
        pids.push(std::os::unix::process::parent_id());
        pids
    }
}

/// Backend for targets witr has no reader for.
#[derive(Debug, Default)]
pub struct UnsupportedSource;

impl UnsupportedSource {
    fn unsupported<T>(what: &str) -> Result<T> {
        Err(Error::Unsupported(format!(
            "{what} is not available on {}",
            std::env::consts::OS
        )))
    }
}

impl ProcessSource for UnsupportedSource {
    fn read_process(&self, _pid: u32) -> Result<Process> {
        Self::unsupported("reading processes")
    }

    fn list_processes(&self) -> Result<Vec<ProcessEntry>> {
        Self::unsupported("listing processes")
    }

    fn listening_pids(&self, _port: u16) -> Result<Vec<u32>> {
        Self::unsupported("port lookup")
    }

    fn file_holders(&self, _path: &Path) -> Result<Vec<u32>> {
        Self::unsupported("file lookup")
    }

    fn service_pid(&self, _name: &str) -> Option<u32> {
        None
    }
}

/// Backend for the platform witr was built for.
pub fn platform_source(runner: ToolRunner) -> Box<dyn ProcessSource> {
    #[cfg(target_os = "linux")]
    {
        Box::new(linux::LinuxSource::new(runner))
    }
    #[cfg(target_os = "macos")]
    {
        Box::new(macos::MacSource::new(runner))
    }
    #[cfg(target_os = "freebsd")]
    {
        Box::new(freebsd::FreeBsdSource::new(runner))
    }
    #[cfg(windows)]
    {
        Box::new(windows::WindowsSource::new(runner))
    }
    #[cfg(not(any(
        target_os = "linux",
        target_os = "macos",
        target_os = "freebsd",
        windows
    )))]
    {
        let _ = runner;
        Box::new(UnsupportedSource)
    }
}
