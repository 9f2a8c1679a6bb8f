//! FreeBSD backend built on `ps`, `procstat`, `sockstat` and rc.d.
//!
//! FreeBSD `ps` always prints a header row, so every `ps` parser here
//! skips the first line. Jails are reported as the `jail` container.

use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

use witr_common::{
    DockerPortMatch, Error, Forked, Listener, Process, ProcessEntry, Result,
};

use super::container;
use super::git::detect_git_info;
use super::macos::{
    container_from_cmdline, health_from_ps, is_valid_service_label, parse_lstart,
    parse_netstat_state, parse_pid_lines, parse_ps_list,
};
use super::net::TcpState;
use super::tool_runner::{ToolRunner, ToolSpec};
use super::ProcessSource;

/// Process source for FreeBSD.
#[derive(Debug, Clone)]
pub struct FreeBsdSource {
    runner: ToolRunner,
    run_dir: PathBuf,
}

impl FreeBsdSource {
    pub fn new(runner: ToolRunner) -> Self {
        Self {
            runner,
            run_dir: PathBuf::from("/var/run"),
        }
    }

    /// Second line of a headed `ps -p <pid>` query.
    fn ps_value(&self, pid: u32, columns: &[&str]) -> Option<String> {
        let mut args = vec!["-p".to_string(), pid.to_string()];
        for column in columns {
            args.push("-o".to_string());
            args.push((*column).to_string());
        }
        let spec = ToolSpec::new("ps", args).with_env("TZ", "UTC");
        let out = self.runner.stdout_of(&spec)?;
        skip_header(&out)
    }

    fn procstat(&self, flag: &str, pid: u32) -> Option<String> {
        self.runner.text("procstat", &[flag, &pid.to_string()])
    }

    fn rc_service(&self, pid: u32) -> Option<String> {
        let entries = fs::read_dir(&self.run_dir).ok()?;
        let wanted = pid.to_string();
        entries.flatten().find_map(|entry| {
            let name = entry.file_name().to_string_lossy().into_owned();
            let service = name.strip_suffix(".pid")?;
            let content = fs::read_to_string(entry.path()).ok()?;
            (content.trim() == wanted).then(|| service.to_string())
        })
    }

    fn jailed(&self, pid: u32) -> bool {
        self.runner
            .text("ps", &["-p", &pid.to_string(), "-o", "jid="])
            .map(|jid| {
                let jid = jid.trim();
                !jid.is_empty() && jid != "0"
            })
            .unwrap_or(false)
    }

    fn pid_alive(&self, pid: u32) -> bool {
        self.runner
            .text("ps", &["-p", &pid.to_string(), "-o", "pid="])
            .is_some_and(|out| !out.trim().is_empty())
    }

    fn user_name(&self, uid: u32) -> String {
        self.runner
            .text("id", &["-un", &uid.to_string()])
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| uid.to_string())
    }

    fn sockstat(&self, port: Option<u16>) -> Option<String> {
        let port_arg = port.map(|p| p.to_string());
        let mut args = vec!["-4", "-6", "-l", "-P", "tcp"];
        if let Some(port_arg) = &port_arg {
            args.push("-p");
            args.push(port_arg.as_str());
        }
        self.runner.text("sockstat", &args)
    }
}

impl ProcessSource for FreeBsdSource {
    fn read_process(&self, pid: u32) -> Result<Process> {
        let row = self
            .ps_value(pid, &["pid", "ppid", "uid", "state", "comm"])
            .ok_or_else(|| Error::NotFound(format!("process {pid} not found")))?;
        let fields: Vec<&str> = row.split_whitespace().collect();
        if fields.len() < 5 {
            return Err(Error::Collection(format!(
                "unexpected ps output for pid {pid}: {row:?}"
            )));
        }
        let ppid: u32 = fields[1].parse().unwrap_or(0);
        let uid: u32 = fields[2].parse().unwrap_or(0);
        let state = fields[3];
        let comm = fields[4].to_string();

        let cmdline = self
            .ps_value(pid, &["args"])
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| comm.clone());
        let started_at = self
            .ps_value(pid, &["lstart"])
            .and_then(|s| parse_lstart(&s));
        let env = self
            .procstat("-e", pid)
            .map(|s| parse_procstat_env(&s))
            .unwrap_or_default();
        let files = self.procstat("-f", pid).unwrap_or_default();
        let working_dir =
            procstat_fd_path(&files, "cwd").unwrap_or_else(|| "unknown".to_string());
        let exe = procstat_fd_path(&files, "text").unwrap_or_default();
        let exe_deleted = !exe.is_empty() && !Path::new(&exe).exists();

        let mut container = if self.jailed(pid) {
            Some("jail".to_string())
        } else {
            container_from_cmdline(&cmdline)
                .filter(|c| *c != "colima")
                .map(str::to_string)
        };
        if container.is_none() && comm == "docker-proxy" {
            container = container::resolve_docker_proxy_target(&self.runner, &cmdline);
        }

        let git = if working_dir == "unknown" {
            None
        } else {
            detect_git_info(Path::new(&working_dir))
        };

        let usage = self.ps_value(pid, &["pcpu", "rss"]);
        let listeners = self
            .sockstat(None)
            .map(|out| parse_sockstat_listeners(&out, pid))
            .unwrap_or_default();

        Ok(Process {
            pid,
            ppid,
            forked: Forked::classify(ppid, &comm, "init"),
            health: health_from_ps(state, usage.as_deref()),
            command: comm,
            cmdline,
            exe,
            started_at,
            user: self.user_name(uid),
            working_dir,
            git_repo: git.as_ref().map(|g| g.repo.clone()),
            git_branch: git.and_then(|g| g.branch),
            container,
            service: self.rc_service(pid),
            listeners,
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
        let out = self
            .sockstat(Some(port))
            .ok_or_else(|| Error::NotFound(format!("no process listening on port {port}")))?;
        let (pids, rows) = parse_sockstat_port(&out, port);
        debug!(port, rows, owners = pids.len(), "sockstat lookup");
        if pids.is_empty() {
            if rows > 0 {
                return Err(Error::OwnerNotDetected { port });
            }
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
        let pid_file = self.run_dir.join(format!("{name}.pid"));
        if let Some(pid) = fs::read_to_string(&pid_file)
            .ok()
            .and_then(|s| s.trim().parse::<u32>().ok())
            .filter(|&pid| pid > 0)
        {
            if self.pid_alive(pid) {
                return Some(pid);
            }
        }
        let out = self.runner.text("service", &[name, "status"])?;
        parse_rc_status_pid(&out)
    }

    fn socket_state(&self, port: u16) -> Option<TcpState> {
        let out = self.runner.text("netstat", &["-an", "-p", "tcp"])?;
        parse_netstat_state(&out, port)
    }

    fn launchd_details(&self, _label: &str) -> BTreeMap<String, String> {
        BTreeMap::new()
    }

    fn docker_port_match(&self, port: u16) -> Option<DockerPortMatch> {
        container::resolve_container_by_port(&self.runner, port)
    }
}

fn skip_header(output: &str) -> Option<String> {
    output
        .trim()
        .lines()
        .nth(1)
        .map(|l| l.trim().to_string())
}

/// `KEY=value` words from `procstat -e` (`PID COMM KEY=value ...`).
pub fn parse_procstat_env(output: &str) -> Vec<String> {
    output
        .lines()
        .flat_map(|line| line.split_whitespace().skip(2))
        .filter(|field| field.contains('='))
        .map(str::to_string)
        .collect()
}

/// Path of the descriptor named `fd` (`cwd`, `text`) in `procstat -f`.
pub fn procstat_fd_path(output: &str, fd: &str) -> Option<String> {
    output.lines().find_map(|line| {
        let fields: Vec<&str> = line.split_whitespace().collect();
        (fields.len() >= 4 && fields[2] == fd).then(|| fields[fields.len() - 1].to_string())
    })
}

/// Owners of `port` from `sockstat -l -P tcp -p <port>`.
///
/// Returns the PIDs and how many rows matched the port; rows whose PID
/// column is `?` count as sockets without an attributable owner.
pub fn parse_sockstat_port(output: &str, port: u16) -> (Vec<u32>, usize) {
    let suffix = format!(":{port}");
    let mut pids = BTreeSet::new();
    let mut rows = 0;
    for line in output.lines().skip(1) {
        let fields: Vec<&str> = line.split_whitespace().collect();
        if fields.len() < 6 || !fields[5].ends_with(&suffix) {
            continue;
        }
        rows += 1;
        if let Ok(pid) = fields[2].parse::<u32>() {
            if pid > 0 {
                pids.insert(pid);
            }
        }
    }
    (pids.into_iter().collect(), rows)
}

/// Listeners of `pid` from `sockstat -l -P tcp`.
pub fn parse_sockstat_listeners(output: &str, pid: u32) -> Vec<Listener> {
    let wanted = pid.to_string();
    let set: BTreeSet<Listener> = output
        .lines()
        .skip(1)
        .filter_map(|line| {
            let fields: Vec<&str> = line.split_whitespace().collect();
            if fields.len() < 6 || fields[2] != wanted {
                return None;
            }
            let (addr, port) = fields[5].rsplit_once(':')?;
            let address = if addr == "*" { "0.0.0.0" } else { addr };
            Some(Listener {
                address: address.to_string(),
                port: port.parse().ok()?,
            })
        })
        .collect();
    set.into_iter().collect()
}

/// PID from `service <name> status` (`nginx is running as pid 812.`).
pub fn parse_rc_status_pid(output: &str) -> Option<u32> {
    if !output.contains("is running") {
        return None;
    }
    let start = output.find("pid ")? + 4;
    let digits: String = output[start..]
        .chars()
        .take_while(char::is_ascii_digit)
        .collect();
    digits.parse().ok().filter(|&pid: &u32| pid > 0)
}
