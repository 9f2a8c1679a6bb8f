//! Ancestry walking.
//!
//! Walks parent pointers from the queried process up to the root of the
//! process tree, one read per step. A process can exit between two reads;
//! the walk then stops and keeps what it already collected.

use std::collections::HashSet;
use tracing::{debug, warn};

use witr_common::{Error, Process, Result};

use crate::collect::ProcessSource;

/// A root-first ancestry chain.
#[derive(Debug, Clone, PartialEq)]
pub struct AncestryWalk {
    /// Oldest ancestor first, queried process last. Never empty.
    pub chain: Vec<Process>,
    /// A read failed after at least one process was collected.
    pub partial: bool,
}

/// Walk the ancestry of `pid`.
///
/// Stops on a repeated PID, a failed read, `ppid == 0`, or PID 1.
/// Fails with [`Error::NoAncestry`] only when not even `pid` itself could
/// be read.
pub fn walk_ancestry(source: &dyn ProcessSource, pid: u32) -> Result<AncestryWalk> {
    let mut chain: Vec<Process> = Vec::new();
    let mut seen = HashSet::new();
    let mut partial = false;
    let mut current = pid;

    while current > 0 {
        if !seen.insert(current) {
            debug!(pid = current, "ancestry cycle detected");
            break;
        }

        let process = match source.read_process(current) {
            Ok(p) => p,
            Err(e) => {
                if !chain.is_empty() {
                    warn!(pid = current, error = %e, "ancestor vanished during walk");
                    partial = true;
                }
                break;
            }
        };

        let (this_pid, ppid) = (process.pid, process.ppid);
        chain.push(process);
        if ppid == 0 || this_pid == 1 {
            break;
        }
        current = ppid;
    }

    if chain.is_empty() {
        return Err(Error::NoAncestry { pid });
    }
    chain.reverse();
    Ok(AncestryWalk { chain, partial })
}

/// Root-first chain for `pid`, dropping the partial-walk flag.
pub fn resolve_ancestry(source: &dyn ProcessSource, pid: u32) -> Result<Vec<Process>> {
    walk_ancestry(source, pid).map(|walk| walk.chain)
}
