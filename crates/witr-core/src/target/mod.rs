//! Target resolution.
//!
//! Maps a [`Target`] to the candidate PIDs it names. Resolution is
//! read-only; every lookup goes through a [`ProcessSource`].
//!
//! Ordering of the result:
//! - name queries put the service-manager PID first, then the sorted,
//!   deduplicated scan matches
//! - port and file queries return sorted, deduplicated owners
//!
//! More than one PID is returned as-is; picking one is left to the caller.

pub mod name;

use std::collections::BTreeSet;
use std::path::Path;
use tracing::debug;

use witr_common::{Error, Result, Target, TargetKind};

use crate::collect::ProcessSource;

pub use name::{match_entries, merge_service_first, MatchMode};

/// Resolve `target` to one or more PIDs.
pub fn resolve(source: &dyn ProcessSource, target: &Target, exact: bool) -> Result<Vec<u32>> {
    let pids = match target.kind {
        TargetKind::Pid => {
            let pid = parse_pid(&target.value)?;
            // Liveness check: the read fails with NotFound if it exited.
            source.read_process(pid)?;
            vec![pid]
        }
        TargetKind::Port => {
            let port = parse_port(&target.value)?;
            sorted_unique(source.listening_pids(port)?)
        }
        TargetKind::Name => resolve_name(source, &target.value, MatchMode::from_exact(exact))?,
        TargetKind::File => {
            if target.value.is_empty() {
                return Err(Error::InvalidTarget("file path is empty".to_string()));
            }
            sorted_unique(source.file_holders(Path::new(&target.value))?)
        }
    };
    debug!(target = %target, count = pids.len(), "resolved target");
    Ok(pids)
}

/// Resolve a process or service name.
pub fn resolve_name(source: &dyn ProcessSource, name: &str, mode: MatchMode) -> Result<Vec<u32>> {
    if name.trim().is_empty() {
        return Err(Error::InvalidTarget("process name is empty".to_string()));
    }
    let entries = source.list_processes()?;
    let matches = match_entries(&entries, name, mode, &source.self_pids());
    let service_pid = source.service_pid(name);
    debug!(
        name,
        scanned = entries.len(),
        matched = matches.len(),
        service_pid = ?service_pid,
        "name lookup"
    );

    let pids = merge_service_first(service_pid, &matches);
    if pids.is_empty() {
        return Err(Error::NotFound(format!(
            "no running process or service named {name:?}"
        )));
    }
    Ok(pids)
}

/// A positive PID.
pub fn parse_pid(value: &str) -> Result<u32> {
    match value.trim().parse::<u32>() {
        Ok(pid) if pid > 0 => Ok(pid),
        _ => Err(Error::InvalidTarget(format!(
            "pid must be a positive integer, got {value:?}"
        ))),
    }
}

/// A TCP port in 1..=65535.
pub fn parse_port(value: &str) -> Result<u16> {
    match value.trim().parse::<u16>() {
        Ok(port) if port > 0 => Ok(port),
        _ => Err(Error::InvalidTarget(format!(
            "port must be an integer between 1 and 65535, got {value:?}"
        ))),
    }
}

fn sorted_unique(pids: Vec<u32>) -> Vec<u32> {
    pids.into_iter()
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}
