//! macOS backend built on `ps`, `lsof`, `netstat` and `launchctl`.
//!
//! # Data Sources
//! - `ps -o pid=,ppid=,uid=,lstart=,state=,ucomm=` - process row
//! - `ps -o args=` / `ps -E` - command line and environment
//! - `lsof -F n` - working directory, executable, listeners, file holders
//! - `netstat -anv -p tcp` - port fallback and socket state
//! - `launchctl blame|print` - launchd jobs
//!
//! Output parsers are plain functions so they are tested on every host.

use chrono::{DateTime, NaiveDateTime, Utc};
use regex::Regex;
use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;
use std::sync::OnceLock;
use tracing::debug;

use witr_common::{
    DockerPortMatch, Error, Forked, Health, Listener, Process, ProcessEntry, Result,
};

use super::container::{self, split_cmdline};
use super::git::detect_git_info;
use super::net::TcpState;
use super::tool_runner::{ToolRunner, ToolSpec};
use super::ProcessSource;

const HIGH_CPU_PERCENT: f64 = 90.0;
const HIGH_RSS_KB: f64 = 1024.0 * 1024.0;

/// One row of `ps -o pid=,ppid=,uid=,lstart=,state=,ucomm=`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PsRow {
    pub pid: u32,
    pub ppid: u32,
    pub uid: u32,
    pub started_at: Option<DateTime<Utc>>,
    pub state: String,
    pub comm: String,
}

/// Process source for macOS.
#[derive(Debug, Clone)]
pub struct MacSource {
    runner: ToolRunner,
}

impl MacSource {
    pub fn new(runner: ToolRunner) -> Self {
        Self { runner }
    }

    /// `ps` pinned to the C locale and UTC so `lstart` parses.
    fn ps(&self, args: &[&str]) -> Option<String> {
        let spec = ToolSpec::new("ps", args.iter().copied()).with_env("TZ", "UTC");
        self.runner.stdout_of(&spec)
    }

    fn lsof_name(&self, pid: u32, fd: &str) -> Option<String> {
        let out = self
            .runner
            .text("lsof", &["-a", "-p", &pid.to_string(), "-d", fd, "-F", "n"])?;
        first_lsof_name(&out)
    }

    fn user_name(&self, uid: u32) -> String {
        self.runner
            .text("id", &["-un", &uid.to_string()])
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| uid.to_string())
    }

    fn launchd_service(&self, pid: u32) -> Option<String> {
        let out = self.runner.text("launchctl", &["blame", &pid.to_string()])?;
        let blame = out.trim();
        (!blame.is_empty() && !blame.contains("unknown")).then(|| blame.to_string())
    }

    fn launchctl_print(&self, label: &str) -> Option<String> {
        self.runner
            .text("launchctl", &["print", &format!("system/{label}")])
    }
}

impl ProcessSource for MacSource {
    fn read_process(&self, pid: u32) -> Result<Process> {
        let pid_arg = pid.to_string();
        let out = self
            .ps(&["-p", &pid_arg, "-o", "pid=,ppid=,uid=,lstart=,state=,ucomm="])
            .ok_or_else(|| Error::NotFound(format!("process {pid} not found")))?;
        let row = out
            .lines()
            .find(|l| !l.trim().is_empty())
            .ok_or_else(|| Error::NotFound(format!("process {pid} not found")))?;
        let row = parse_ps_row(row)
            .ok_or_else(|| Error::Collection(format!("unexpected ps output for pid {pid}")))?;

        let raw_cmdline = self
            .ps(&["-p", &pid_arg, "-o", "args="])
            .map(|s| s.trim().to_string())
            .unwrap_or_default();
        let cmdline = if raw_cmdline.is_empty() {
            row.comm.clone()
        } else {
            raw_cmdline.clone()
        };
        let env = self
            .ps(&["-p", &pid_arg, "-E", "-o", "command="])
            .map(|s| parse_ps_env(&s))
            .unwrap_or_default();
        let working_dir = self
            .lsof_name(pid, "cwd")
            .unwrap_or_else(|| "unknown".to_string());

        let mut container = container_from_cmdline(&cmdline).map(str::to_string);
        if container.is_none() && row.comm == "docker-proxy" {
            container = container::resolve_docker_proxy_target(&self.runner, &cmdline);
        }

        let git = if working_dir == "unknown" {
            None
        } else {
            detect_git_info(Path::new(&working_dir))
        };

        let usage = self.ps(&["-p", &pid_arg, "-o", "pcpu=,rss="]);
        let health = health_from_ps(&row.state, usage.as_deref());

        let exe = self.lsof_name(pid, "txt").unwrap_or_default();
        let exe_deleted = !exe.is_empty() && !Path::new(&exe).exists();

        let listeners = self
            .runner
            .text(
                "lsof",
                &["-a", "-p", &pid_arg, "-iTCP", "-sTCP:LISTEN", "-n", "-P", "-F", "n"],
            )
            .map(|s| parse_lsof_listeners(&s))
            .unwrap_or_default();

        let command = derive_display_command(&row.comm, &raw_cmdline);

        Ok(Process {
            pid,
            ppid: row.ppid,
            forked: Forked::classify(row.ppid, &command, "launchd"),
            command,
            cmdline,
            exe,
            started_at: row.started_at,
            user: self.user_name(row.uid),
            working_dir,
            git_repo: git.as_ref().map(|g| g.repo.clone()),
            git_branch: git.and_then(|g| g.branch),
            container,
            service: self.launchd_service(pid),
            listeners,
            health,
            env,
            exe_deleted,
            extended: None,
        })
    }

    fn list_processes(&self) -> Result<Vec<ProcessEntry>> {
        let out = self
            .runner
            .text("ps", &["-axo", "pid=,comm=,args="])
            .ok_or_else(|| Error::Collection("failed to list processes".to_string()))?;
        Ok(parse_ps_list(&out))
    }

    fn listening_pids(&self, port: u16) -> Result<Vec<u32>> {
        let tcp = format!("TCP:{port}");
        if let Some(out) = self
            .runner
            .text("lsof", &["-i", &tcp, "-s", "TCP:LISTEN", "-n", "-P", "-t"])
        {
            let pids = parse_pid_lines(&out);
            if !pids.is_empty() {
                return Ok(pids);
            }
        }

        debug!(port, "lsof found nothing, falling back to netstat");
        let pids = self
            .runner
            .text("netstat", &["-anv", "-p", "tcp"])
            .map(|out| parse_netstat_listeners(&out, port))
            .unwrap_or_default();
        if pids.is_empty() {
            return Err(Error::NotFound(format!("no process listening on port {port}")));
        }
        Ok(pids)
    }

    fn file_holders(&self, path: &Path) -> Result<Vec<u32>> {
        if !path.exists() {
            return Err(Error::NotFound(format!(
                "file {} does not exist",
                path.display()
            )));
        }
        let path_arg = path.to_string_lossy();
        let pids = self
            .runner
            .text("lsof", &["-t", "--", &path_arg])
            .map(|out| parse_pid_lines(&out))
            .unwrap_or_default();
        if pids.is_empty() {
            return Err(Error::NotFound(format!(
                "no process has {} open",
                path.display()
            )));
        }
        Ok(pids)
    }

    fn service_pid(&self, name: &str) -> Option<u32> {
        if !is_valid_service_label(name) {
            return None;
        }
        candidate_labels(name)
            .iter()
            .filter_map(|label| self.launchctl_print(label))
            .find_map(|out| parse_launchctl_pid(&out))
    }

    fn socket_state(&self, port: u16) -> Option<TcpState> {
        let out = self.runner.text("netstat", &["-an", "-p", "tcp"])?;
        parse_netstat_state(&out, port)
    }

    fn launchd_details(&self, label: &str) -> BTreeMap<String, String> {
        if !is_valid_service_label(label) {
            return BTreeMap::new();
        }
        self.launchctl_print(label)
            .map(|out| parse_launchctl_details(&out))
            .unwrap_or_default()
    }

    fn docker_port_match(&self, port: u16) -> Option<DockerPortMatch> {
        container::resolve_container_by_port(&self.runner, port)
    }
}

/// Parse a `ps -o pid=,ppid=,uid=,lstart=,state=,ucomm=` row.
///
/// `lstart` spans five whitespace-separated fields.
pub fn parse_ps_row(line: &str) -> Option<PsRow> {
    let fields: Vec<&str> = line.split_whitespace().collect();
    if fields.len() < 9 {
        return None;
    }
    Some(PsRow {
        pid: fields[0].parse().ok()?,
        ppid: fields[1].parse().ok()?,
        uid: fields[2].parse().ok()?,
        started_at: parse_lstart(&fields[3..8].join(" ")),
        state: fields[8].to_string(),
        comm: fields.get(9..).map(|rest| rest.join(" ")).unwrap_or_default(),
    })
}

/// Parse a C-locale `lstart` value printed in UTC, e.g.
/// `Thu Jan  2 10:26:00 2025`.
pub fn parse_lstart(value: &str) -> Option<DateTime<Utc>> {
    let normalized = value.split_whitespace().collect::<Vec<_>>().join(" ");
    NaiveDateTime::parse_from_str(&normalized, "%a %b %d %H:%M:%S %Y")
        .ok()
        .map(|naive| naive.and_utc())
}

/// Health from the ps state letter and `pcpu=,rss=` output.
pub fn health_from_ps(state: &str, usage: Option<&str>) -> Health {
    let mut health = match state.chars().next() {
        Some('Z') => Health::Zombie,
        Some('T') => Health::Stopped,
        _ => Health::Healthy,
    };
    let Some(usage) = usage else {
        return health;
    };
    let fields: Vec<f64> = usage
        .split_whitespace()
        .filter_map(|f| f.parse().ok())
        .collect();
    if let [cpu, rss_kb, ..] = fields[..] {
        if cpu > HIGH_CPU_PERCENT {
            health = Health::HighCpu;
        } else if rss_kb > HIGH_RSS_KB {
            health = Health::HighMem;
        }
    }
    health
}

/// `KEY=value` words from `ps -E -o command=` output.
pub fn parse_ps_env(output: &str) -> Vec<String> {
    output
        .split_whitespace()
        .filter(|part| !part.starts_with('-'))
        .filter(|part| match part.split_once('=') {
            Some((key, _)) => is_env_var_name(key),
            None => false,
        })
        .map(str::to_string)
        .collect()
}

fn is_env_var_name(name: &str) -> bool {
    !name.is_empty() && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// Runtime hinted at by a macOS command line (Docker Desktop, Colima...).
pub fn container_from_cmdline(cmdline: &str) -> Option<&'static str> {
    let lower = cmdline.to_lowercase();
    if lower.contains("docker") {
        Some("docker")
    } else if lower.contains("podman") || lower.contains("libpod") {
        Some("podman")
    } else if lower.contains("kubepods") {
        Some("kubernetes")
    } else if lower.contains("colima") {
        Some("colima")
    } else if lower.contains("containerd") {
        Some("containerd")
    } else {
        None
    }
}

/// `ucomm` is truncated by ps; prefer the executable from argv when the
/// short name is a prefix of it.
pub fn derive_display_command(comm: &str, cmdline: &str) -> String {
    let comm = comm.trim();
    let exe = executable_name(cmdline);
    match (comm.is_empty(), exe) {
        (true, Some(exe)) => exe,
        (true, None) => String::new(),
        (false, Some(exe)) if exe.starts_with(comm) && comm.len() < exe.len() => exe,
        (false, _) => comm.to_string(),
    }
}

fn executable_name(cmdline: &str) -> Option<String> {
    split_cmdline(cmdline).into_iter().find_map(|arg| {
        if arg.contains('=') && !arg.contains('/') {
            return None;
        }
        let clean = arg.trim_matches(|c| c == '"' || c == '\'');
        let base = Path::new(clean).file_name()?.to_string_lossy().into_owned();
        (!base.is_empty() && base != ".").then_some(base)
    })
}

/// First `n` record of `lsof -F n` output.
pub fn first_lsof_name(output: &str) -> Option<String> {
    output
        .lines()
        .find_map(|line| line.strip_prefix('n'))
        .filter(|name| !name.is_empty())
        .map(str::to_string)
}

/// Listeners from `lsof -iTCP -sTCP:LISTEN -F n` (`n*:8080`, `n[::1]:5432`).
pub fn parse_lsof_listeners(output: &str) -> Vec<Listener> {
    let set: BTreeSet<Listener> = output
        .lines()
        .filter_map(|line| line.strip_prefix('n'))
        .filter_map(|name| {
            let (addr, port) = name.rsplit_once(':')?;
            let port = port.parse().ok()?;
            let addr = addr.trim_start_matches('[').trim_end_matches(']');
            let address = if addr == "*" { "0.0.0.0" } else { addr };
            Some(Listener {
                address: address.to_string(),
                port,
            })
        })
        .collect();
    set.into_iter().collect()
}

/// `ps -axo pid=,comm=,args=` rows.
pub fn parse_ps_list(output: &str) -> Vec<ProcessEntry> {
    output
        .lines()
        .filter_map(|line| {
            let mut fields = line.split_whitespace();
            let pid = fields.next()?.parse().ok()?;
            let command = fields.next()?.to_string();
            let cmdline = fields.collect::<Vec<_>>().join(" ");
            Some(ProcessEntry {
                pid,
                command,
                cmdline,
            })
        })
        .collect()
}

/// Distinct positive PIDs, one per line, ascending.
pub fn parse_pid_lines(output: &str) -> Vec<u32> {
    let pids: BTreeSet<u32> = output
        .lines()
        .filter_map(|l| l.trim().parse().ok())
        .filter(|&pid| pid > 0)
        .collect();
    pids.into_iter().collect()
}

/// PIDs from `netstat -anv -p tcp` LISTEN rows on `port`.
///
/// The PID sits in the ninth column.
pub fn parse_netstat_listeners(output: &str, port: u16) -> Vec<u32> {
    let suffix = format!(".{port}");
    let pids: BTreeSet<u32> = output
        .lines()
        .filter(|line| line.contains("LISTEN"))
        .filter_map(|line| {
            let fields: Vec<&str> = line.split_whitespace().collect();
            if fields.len() < 9 || !fields[3].ends_with(&suffix) {
                return None;
            }
            fields[8].parse().ok()
        })
        .filter(|&pid| pid > 0)
        .collect();
    pids.into_iter().collect()
}

/// State of the socket on `port` from `netstat -an -p tcp`, LISTEN first.
pub fn parse_netstat_state(output: &str, port: u16) -> Option<TcpState> {
    let suffix = format!(".{port}");
    let states: Vec<TcpState> = output
        .lines()
        .filter_map(|line| {
            let fields: Vec<&str> = line.split_whitespace().collect();
            if fields.len() < 6 || !fields[0].starts_with("tcp") || !fields[3].ends_with(&suffix)
            {
                return None;
            }
            Some(TcpState::from_name(fields[5]))
        })
        .collect();
    states
        .iter()
        .find(|s| s.is_listen())
        .or_else(|| states.first())
        .copied()
}

fn label_regex() -> Option<&'static Regex> {
    static RE: OnceLock<Option<Regex>> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[a-zA-Z0-9._-]+$").ok())
        .as_ref()
}

/// Labels passed to `launchctl` are restricted to a safe charset.
pub fn is_valid_service_label(label: &str) -> bool {
    !label.is_empty()
        && label.len() <= 256
        && label_regex().is_some_and(|re| re.is_match(label))
}

fn candidate_labels(name: &str) -> [String; 4] {
    [
        name.to_string(),
        format!("com.apple.{name}"),
        format!("org.{name}"),
        format!("io.{name}"),
    ]
}

/// Running PID from `launchctl print` (`pid = 123`).
pub fn parse_launchctl_pid(output: &str) -> Option<u32> {
    output.lines().find_map(|line| {
        line.trim()
            .strip_prefix("pid = ")?
            .trim()
            .parse()
            .ok()
            .filter(|&pid: &u32| pid > 0)
    })
}

/// Job descriptor fields from `launchctl print`: type, plist, KeepAlive
/// and what triggers the job.
pub fn parse_launchctl_details(output: &str) -> BTreeMap<String, String> {
    let mut details = BTreeMap::new();
    let mut triggers = Vec::new();
    // Brace depth inside the `event triggers` block; 0 when outside.
    let mut depth = 0usize;

    for line in output.lines() {
        let line = line.trim();
        if depth > 0 {
            if line.starts_with('}') {
                depth -= 1;
            } else if line.ends_with('{') {
                if depth == 1 {
                    if let Some((name, _)) = line.split_once(" => ") {
                        triggers.push(name.trim().to_string());
                    }
                }
                depth += 1;
            }
            continue;
        }
        if line.starts_with("event triggers = {") {
            depth = 1;
            continue;
        }
        let Some((key, value)) = line.split_once(" = ") else {
            continue;
        };
        let value = value.trim();
        match key.trim() {
            "path" if value.ends_with(".plist") => {
                details.insert("plist".to_string(), value.to_string());
            }
            "type" => {
                details.insert("type".to_string(), value.to_string());
            }
            "properties" => {
                let keepalive = value
                    .split('|')
                    .any(|p| p.trim().eq_ignore_ascii_case("keepalive"));
                details.insert(
                    "keepalive".to_string(),
                    if keepalive { "yes" } else { "no" }.to_string(),
                );
            }
            "run interval" => triggers.push(format!("every {value}")),
            _ => {}
        }
    }
    if !triggers.is_empty() {
        details.insert("triggers".to_string(), triggers.join(", "));
    }
    details
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Datelike, Timelike};

    #[test]
    fn test_parse_ps_row() {
        let row = parse_ps_row("  412     1   501 Mon Dec 25 12:00:00 2023 Ss   node").unwrap();
        assert_eq!(row.pid, 412);
        assert_eq!(row.ppid, 1);
        assert_eq!(row.uid, 501);
        assert_eq!(row.state, "Ss");
        assert_eq!(row.comm, "node");
        let started = row.started_at.unwrap();
        assert_eq!((started.year(), started.month(), started.day()), (2023, 12, 25));
        assert_eq!(started.hour(), 12);
    }

    #[test]
    fn test_parse_lstart() {
        let t = parse_lstart("Thu Jan  2 10:26:00 2025").unwrap();
        assert_eq!((t.year(), t.month(), t.day(), t.minute()), (2025, 1, 2, 26));
        assert!(parse_lstart("yesterday").is_none());
    }

    #[test]
    fn test_parse_ps_row_short() {
        assert!(parse_ps_row("412 1 501 Mon Dec").is_none());
        assert!(parse_ps_row("").is_none());
    }

    #[test]
    fn test_health_from_ps() {
        assert_eq!(health_from_ps("Z", None), Health::Zombie);
        assert_eq!(health_from_ps("T+", Some("0.0 1000")), Health::Stopped);
        assert_eq!(health_from_ps("S", Some("95.5 1000")), Health::HighCpu);
        assert_eq!(health_from_ps("S", Some("1.0 2097152")), Health::HighMem);
        assert_eq!(health_from_ps("S", Some("1.0 2048")), Health::Healthy);
        assert_eq!(health_from_ps("R", Some("garbage")), Health::Healthy);
    }

    #[test]
    fn test_parse_ps_env() {
        let out = "/usr/bin/node server.js PATH=/usr/bin HOME=/Users/dev --flag=x weird-key=1 DYLD_INSERT_LIBRARIES=/tmp/x.dylib";
        assert_eq!(
            parse_ps_env(out),
            vec!["PATH=/usr/bin", "HOME=/Users/dev", "DYLD_INSERT_LIBRARIES=/tmp/x.dylib"]
        );
    }

    #[test]
    fn test_container_from_cmdline() {
        assert_eq!(
            container_from_cmdline("/Applications/Docker.app/Contents/MacOS/com.docker.backend"),
            Some("docker")
        );
        assert_eq!(container_from_cmdline("colima daemon start"), Some("colima"));
        assert_eq!(container_from_cmdline("/usr/sbin/sshd -D"), None);
    }

    #[test]
    fn test_derive_display_command() {
        assert_eq!(
            derive_display_command("com.docker.", "/Applications/Docker.app/Contents/MacOS/com.docker.backend --x"),
            "com.docker.backend"
        );
        assert_eq!(derive_display_command("node", "/usr/local/bin/node server.js"), "node");
        assert_eq!(derive_display_command("", "FOO=1 /usr/bin/python3 app.py"), "python3");
        assert_eq!(derive_display_command("launchd", ""), "launchd");
    }

    #[test]
    fn test_first_lsof_name() {
        assert_eq!(
            first_lsof_name("p412\nfcwd\nn/Users/dev/app\n").as_deref(),
            Some("/Users/dev/app")
        );
        assert_eq!(first_lsof_name("p412\n"), None);
    }

    #[test]
    fn test_parse_lsof_listeners() {
        let out = "p412\nf23\nn*:3000\nf24\nn127.0.0.1:9229\nf25\nn[::1]:3000\nf26\nn*:3000\n";
        let listeners = parse_lsof_listeners(out);
        assert_eq!(listeners.len(), 3);
        assert!(listeners.contains(&Listener {
            address: "0.0.0.0".into(),
            port: 3000
        }));
        assert!(listeners.contains(&Listener {
            address: "::1".into(),
            port: 3000
        }));
    }

    #[test]
    fn test_parse_ps_list() {
        let out = "    1 /sbin/launchd    /sbin/launchd\n  412 node             node /srv/app/server.js --port 3000\n";
        let entries = parse_ps_list(out);
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[1].pid, 412);
        assert_eq!(entries[1].command, "node");
        assert_eq!(entries[1].cmdline, "node /srv/app/server.js --port 3000");
    }

    #[test]
    fn test_parse_pid_lines() {
        assert_eq!(parse_pid_lines("412\n88\n412\n0\nx\n"), vec![88, 412]);
        assert!(parse_pid_lines("").is_empty());
    }

    #[test]
    fn test_parse_netstat_listeners() {
        let out = "Active Internet connections (including servers)\n\
Proto Recv-Q Send-Q  Local Address          Foreign Address        (state)     rhiwat shiwat    pid   epid\n\
tcp4       0      0  *.5432                 *.*                    LISTEN      131072 131072    512      0\n\
tcp4       0      0  127.0.0.1.54320        127.0.0.1.5432         ESTABLISHED 131072 131072    900      0\n";
        assert_eq!(parse_netstat_listeners(out, 5432), vec![512]);
        assert!(parse_netstat_listeners(out, 80).is_empty());
    }

    #[test]
    fn test_parse_netstat_state() {
        let out = "tcp4       0      0  127.0.0.1.8080         127.0.0.1.50000        TIME_WAIT\n\
tcp4       0      0  *.8080                 *.*                    LISTEN\n\
tcp4       0      0  127.0.0.1.9000         127.0.0.1.50001        CLOSE_WAIT\n";
        assert_eq!(parse_netstat_state(out, 8080), Some(TcpState::Listen));
        assert_eq!(parse_netstat_state(out, 9000), Some(TcpState::CloseWait));
        assert_eq!(parse_netstat_state(out, 1), None);
    }

    #[test]
    fn test_is_valid_service_label() {
        assert!(is_valid_service_label("com.apple.mDNSResponder"));
        assert!(is_valid_service_label("nginx"));
        assert!(!is_valid_service_label(""));
        assert!(!is_valid_service_label("foo; rm -rf /"));
        assert!(!is_valid_service_label(&"a".repeat(257)));
    }

    #[test]
    fn test_parse_launchctl_pid() {
        let out = "system/com.example.web = {\n\tactive count = 1\n\tpid = 812\n\tstate = running\n}\n";
        assert_eq!(parse_launchctl_pid(out), Some(812));
        assert_eq!(parse_launchctl_pid("state = not running\n"), None);
    }

    #[test]
    fn test_parse_launchctl_details() {
        let out = "system/com.example.web = {\n\
\tactive count = 1\n\
\tpath = /Library/LaunchDaemons/com.example.web.plist\n\
\ttype = LaunchDaemon\n\
\tstate = running\n\
\tevent triggers = {\n\
\t\tcom.example.web.socket => {\n\
\t\t\tkeepalive = 0\n\
\t\t}\n\
\t}\n\
\tproperties = runatload | keepalive | inferred program\n\
}\n";
        let details = parse_launchctl_details(out);
        assert_eq!(
            details.get("plist").map(String::as_str),
            Some("/Library/LaunchDaemons/com.example.web.plist")
        );
        assert_eq!(details.get("type").map(String::as_str), Some("LaunchDaemon"));
        assert_eq!(details.get("keepalive").map(String::as_str), Some("yes"));
        assert_eq!(
            details.get("triggers").map(String::as_str),
            Some("com.example.web.socket")
        );
    }
}
