//! Name matching over a process table listing.

use std::collections::BTreeSet;
use witr_common::ProcessEntry;

/// How a name query is compared against each process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MatchMode {
    /// Case-insensitive substring of the command name or command line.
    #[default]
    Substring,
    /// Case-insensitive equality with the command name only.
    Exact,
}

impl MatchMode {
    pub fn from_exact(exact: bool) -> Self {
        if exact {
            MatchMode::Exact
        } else {
            MatchMode::Substring
        }
    }
}

/// PIDs in `entries` whose command or command line matches `name`.
///
/// PIDs in `skip` (witr and its parent) and a PID spelled exactly like the
/// query are never matched. In substring mode a process whose command
/// name or command line contains `grep` is dropped, so `witr foo` run
/// next to `ps | grep foo` does not report the grep. The result is in
/// table order and may contain duplicates.
pub fn match_entries(
    entries: &[ProcessEntry],
    name: &str,
    mode: MatchMode,
    skip: &[u32],
) -> Vec<u32> {
    let needle = name.to_lowercase();
    let mut matches = Vec::new();

    for entry in entries {
        if needle == entry.pid.to_string() || skip.contains(&entry.pid) {
            continue;
        }
        let comm = entry.command.trim().to_lowercase();

        if mode == MatchMode::Exact {
            if comm == needle {
                matches.push(entry.pid);
            }
            continue;
        }

        if comm.contains(&needle) {
            if !comm.contains("grep") {
                matches.push(entry.pid);
            }
            continue;
        }

        let args = entry.cmdline.to_lowercase();
        if args.contains(&needle) && !args.contains("grep") {
            matches.push(entry.pid);
        }
    }
    matches
}

/// Service-manager PID first, then the remaining matches sorted and
/// deduplicated.
pub fn merge_service_first(service_pid: Option<u32>, matches: &[u32]) -> Vec<u32> {
    let service_pid = service_pid.filter(|&pid| pid > 0);
    let rest: BTreeSet<u32> = matches
        .iter()
        .copied()
        .filter(|&pid| Some(pid) != service_pid)
        .collect();
    service_pid.into_iter().chain(rest).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(pid: u32, command: &str, cmdline: &str) -> ProcessEntry {
        ProcessEntry {
            pid,
            command: command.to_string(),
            cmdline: cmdline.to_string(),
        }
    }

    fn table() -> Vec<ProcessEntry> {
        vec![
            entry(1, "systemd", "/sbin/init splash"),
            entry(600, "nginx", "nginx: master process /usr/sbin/nginx"),
            entry(601, "nginx", "nginx: worker process"),
            entry(700, "node", "node /opt/pm2/bin/pm2 God Daemon"),
            entry(800, "grep", "grep nginx"),
            entry(810, "bash", "bash -c ps aux | grep nginx"),
            entry(900, "Postgres", "/usr/lib/postgresql/16/bin/postgres -D /var/lib/pg"),
            entry(4242, "witr", "witr nginx"),
        ]
    }

    #[test]
    fn test_substring_matches_comm_and_cmdline() {
        let pids = match_entries(&table(), "NGINX", MatchMode::Substring, &[4242]);
        assert_eq!(pids, vec![600, 601]);
    }

    #[test]
    fn test_cmdline_only_match() {
        let pids = match_entries(&table(), "pm2", MatchMode::Substring, &[]);
        assert_eq!(pids, vec![700]);
    }

    #[test]
    fn test_grep_is_excluded() {
        let pids = match_entries(&table(), "nginx", MatchMode::Substring, &[]);
        assert!(!pids.contains(&800));
        assert!(!pids.contains(&810));
        assert!(pids.contains(&4242));
    }

    #[test]
    fn test_exact_mode_compares_command_only() {
        let pids = match_entries(&table(), "postgres", MatchMode::Exact, &[]);
        assert_eq!(pids, vec![900]);
        assert!(match_entries(&table(), "nginx: master", MatchMode::Exact, &[]).is_empty());
        assert!(match_entries(&table(), "ngin", MatchMode::Exact, &[]).is_empty());
    }

    #[test]
    fn test_pid_spelled_as_name_is_skipped() {
        let pids = match_entries(&table(), "600", MatchMode::Substring, &[]);
        assert!(!pids.contains(&600));
    }

    #[test]
    fn test_merge_service_first() {
        assert_eq!(merge_service_first(Some(601), &[700, 600, 601, 600]), vec![601, 600, 700]);
        assert_eq!(merge_service_first(None, &[3, 1, 2, 1]), vec![1, 2, 3]);
        assert_eq!(merge_service_first(Some(0), &[5]), vec![5]);
        assert_eq!(merge_service_first(Some(9), &[]), vec![9]);
    }
}
