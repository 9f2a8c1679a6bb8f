//! Linux backend reading procfs.
//!
//! # Data Sources
//! - `/proc/[pid]/{stat,status,cmdline,environ,cgroup,cwd,exe,fd}`
//! - `/proc/net/tcp`, `/proc/net/tcp6` - listening sockets
//! - `/proc/locks` - file locks
//! - `/proc/stat` - boot time
//! - `/etc/passwd` - user names
//! - `systemctl`, `docker` - optional enrichment
//!
//! The proc root and passwd path are configurable so the backend can be
//! pointed at a fixture tree.

use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::os::unix::fs::MetadataExt;
use std::path::{Path, PathBuf};
use tracing::{debug, trace};

use witr_common::{
    DockerPortMatch, Error, ExtendedInfo, Forked, Listener, Process, ProcessEntry, Result,
};

use super::container::{self, ContainerRuntime};
use super::git::detect_git_info;
use super::net::{self, SocketEntry, TcpState};
use super::proc_parsers::{self, StatFields};
use super::systemd;
use super::tool_runner::ToolRunner;
use super::ProcessSource;

/// Process source backed by a procfs tree.
#[derive(Debug, Clone)]
pub struct LinuxSource {
    proc_root: PathBuf,
    passwd_path: PathBuf,
    runner: ToolRunner,
    use_tools: bool,
}

impl LinuxSource {
    /// Read the live `/proc` and consult system tools.
    pub fn new(runner: ToolRunner) -> Self {
        Self {
            proc_root: PathBuf::from("/proc"),
            passwd_path: PathBuf::from("/etc/passwd"),
            runner,
            use_tools: true,
        }
    }

    /// Read a procfs tree at `proc_root` without running any tools.
    pub fn with_root(proc_root: impl Into<PathBuf>, passwd_path: impl Into<PathBuf>) -> Self {
        Self {
            proc_root: proc_root.into(),
            passwd_path: passwd_path.into(),
            runner: ToolRunner::with_defaults(),
            use_tools: false,
        }
    }

    fn pid_dir(&self, pid: u32) -> PathBuf {
        self.proc_root.join(pid.to_string())
    }

    /// Numeric entries of the proc root, ascending.
    fn pids(&self) -> Vec<u32> {
        let Ok(entries) = fs::read_dir(&self.proc_root) else {
            return Vec::new();
        };
        let mut pids: Vec<u32> = entries
            .flatten()
            .filter_map(|e| e.file_name().to_str()?.parse().ok())
            .collect();
        pids.sort_unstable();
        pids
    }

    fn socket_tables(&self) -> Vec<SocketEntry> {
        let mut entries = Vec::new();
        for (file, is_ipv6) in [("tcp", false), ("tcp6", true)] {
            match fs::read_to_string(self.proc_root.join("net").join(file)) {
                Ok(content) => entries.extend(net::parse_socket_table(&content, is_ipv6)),
                Err(e) => trace!(file, error = %e, "socket table unavailable"),
            }
        }
        entries
    }

    /// Socket inodes referenced by a process's open descriptors.
    fn socket_inodes(&self, pid: u32) -> BTreeSet<u64> {
        let Ok(entries) = fs::read_dir(self.pid_dir(pid).join("fd")) else {
            return BTreeSet::new();
        };
        entries
            .flatten()
            .filter_map(|e| fs::read_link(e.path()).ok())
            .filter_map(|target| net::socket_inode_from_link(&target.to_string_lossy()))
            .collect()
    }

    fn boot_time(&self) -> Option<i64> {
        let content = fs::read_to_string(self.proc_root.join("stat")).ok()?;
        proc_parsers::parse_btime(&content)
    }

    fn started_at(&self, stat: &StatFields) -> Option<DateTime<Utc>> {
        let boot = self.boot_time()?;
        let since_boot = i64::try_from(stat.starttime / clock_ticks()).ok()?;
        DateTime::from_timestamp(boot.checked_add(since_boot)?, 0)
    }

    fn user_name(&self, pid: u32) -> String {
        let Some(uid) = fs::read_to_string(self.pid_dir(pid).join("status"))
            .ok()
            .and_then(|s| proc_parsers::parse_status_uid(&s))
        else {
            return "unknown".to_string();
        };
        fs::read_to_string(&self.passwd_path)
            .ok()
            .and_then(|passwd| proc_parsers::lookup_passwd(&passwd, uid))
            .unwrap_or_else(|| uid.to_string())
    }

    fn listeners(&self, pid: u32) -> Vec<Listener> {
        let inodes = self.socket_inodes(pid);
        if inodes.is_empty() {
            return Vec::new();
        }
        let listeners: BTreeSet<Listener> = self
            .socket_tables()
            .into_iter()
            .filter(|e| e.state.is_listen() && inodes.contains(&e.inode))
            .map(|e| Listener {
                address: e.local_addr,
                port: e.local_port,
            })
            .collect();
        listeners.into_iter().collect()
    }

    fn children(&self, pid: u32) -> Vec<u32> {
        let Ok(tasks) = fs::read_dir(self.pid_dir(pid).join("task")) else {
            return Vec::new();
        };
        let children: BTreeSet<u32> = tasks
            .flatten()
            .filter_map(|t| fs::read_to_string(t.path().join("children")).ok())
            .flat_map(|content| {
                content
                    .split_whitespace()
                    .filter_map(|p| p.parse().ok())
                    .collect::<Vec<u32>>()
            })
            .collect();
        children.into_iter().collect()
    }
}

impl ProcessSource for LinuxSource {
    fn read_process(&self, pid: u32) -> Result<Process> {
        let dir = self.pid_dir(pid);
        if !dir.exists() {
            return Err(Error::NotFound(format!("process {pid} not found")));
        }

        let raw_stat = fs::read_to_string(dir.join("stat"))
            .map_err(|_| Error::NotFound(format!("process {pid} exited while being read")))?;
        let stat = proc_parsers::parse_stat(&raw_stat)
            .ok_or_else(|| Error::Collection(format!("malformed stat for process {pid}")))?;

        let cmdline = fs::read(dir.join("cmdline"))
            .map(|b| proc_parsers::parse_cmdline(&b))
            .unwrap_or_default();
        let env = fs::read(dir.join("environ"))
            .map(|b| proc_parsers::parse_environ(&b))
            .unwrap_or_default();
        let working_dir = fs::read_link(dir.join("cwd"))
            .map(|p| p.to_string_lossy().into_owned())
            .unwrap_or_else(|_| "unknown".to_string());

        let (exe, exe_deleted) = match fs::read_link(dir.join("exe")) {
            Ok(target) => {
                let target = target.to_string_lossy().into_owned();
                match target.strip_suffix(" (deleted)") {
                    Some(path) => (path.to_string(), true),
                    None => (target, false),
                }
            }
            Err(_) => (String::new(), false),
        };

        let cgroup = fs::read_to_string(dir.join("cgroup")).unwrap_or_default();
        let mut container = proc_parsers::container_from_cgroup(&cgroup).map(str::to_string);
        if container.is_none() && self.use_tools && stat.comm == "docker-proxy" {
            container = container::resolve_docker_proxy_target(&self.runner, &cmdline);
        }

        let service = if self.use_tools {
            systemd::service_for_pid(&self.runner, pid)
        } else {
            None
        };

        let git = if working_dir == "unknown" {
            None
        } else {
            detect_git_info(Path::new(&working_dir))
        };

        let health = proc_parsers::health_from_stat(&stat, clock_ticks(), page_size());
        let forked = Forked::classify(stat.ppid, &stat.comm, "systemd");

        Ok(Process {
            pid,
            ppid: stat.ppid,
            started_at: self.started_at(&stat),
            user: self.user_name(pid),
            listeners: self.listeners(pid),
            command: stat.comm,
            cmdline,
            exe,
            working_dir,
            git_repo: git.as_ref().map(|g| g.repo.clone()),
            git_branch: git.and_then(|g| g.branch),
            container,
            service,
            health,
            forked,
            env,
            exe_deleted,
            extended: None,
        })
    }

    fn list_processes(&self) -> Result<Vec<ProcessEntry>> {
        if !self.proc_root.is_dir() {
            return Err(Error::Collection(format!(
                "{} is not readable",
                self.proc_root.display()
            )));
        }
        Ok(self
            .pids()
            .into_iter()
            .filter_map(|pid| {
                let dir = self.pid_dir(pid);
                let command = fs::read_to_string(dir.join("comm")).ok()?.trim().to_string();
                let cmdline = fs::read(dir.join("cmdline"))
                    .map(|b| proc_parsers::parse_cmdline(&b))
                    .unwrap_or_default();
                Some(ProcessEntry {
                    pid,
                    command,
                    cmdline,
                })
            })
            .collect())
    }

    fn listening_pids(&self, port: u16) -> Result<Vec<u32>> {
        let entries = self.socket_tables();
        let inodes = net::listen_inodes_for_port(&entries, port);
        if inodes.is_empty() {
            if net::has_listener(&entries, port) {
                return Err(Error::OwnerNotDetected { port });
            }
            return Err(Error::NotFound(format!("no process listening on port {port}")));
        }

        let owners: Vec<u32> = self
            .pids()
            .into_iter()
            .filter(|&pid| !self.socket_inodes(pid).is_disjoint(&inodes))
            .collect();
        debug!(port, inodes = inodes.len(), owners = owners.len(), "port lookup");

        if owners.is_empty() {
            return Err(Error::OwnerNotDetected { port });
        }
        Ok(owners)
    }

    fn file_holders(&self, path: &Path) -> Result<Vec<u32>> {
        let meta = fs::metadata(path)
            .map_err(|_| Error::NotFound(format!("file {} does not exist", path.display())))?;
        let (dev, ino) = (meta.dev(), meta.ino());

        let mut holders = BTreeSet::new();
        for pid in self.pids() {
            let Ok(fds) = fs::read_dir(self.pid_dir(pid).join("fd")) else {
                continue;
            };
            let holds = fds.flatten().any(|fd| {
                fs::metadata(fd.path())
                    .map(|m| m.dev() == dev && m.ino() == ino)
                    .unwrap_or(false)
            });
            if holds {
                holders.insert(pid);
            }
        }

        let (major, minor) = proc_parsers::dev_major_minor(dev);
        if let Ok(locks) = fs::read_to_string(self.proc_root.join("locks")) {
            holders.extend(
                proc_parsers::parse_locks(&locks)
                    .into_iter()
                    .filter(|l| l.inode == ino && l.major == major && l.minor == minor)
                    .map(|l| l.pid),
            );
        }

        if holders.is_empty() {
            return Err(Error::NotFound(format!(
                "no process has {} open",
                path.display()
            )));
        }
        Ok(holders.into_iter().collect())
    }

    fn service_pid(&self, name: &str) -> Option<u32> {
        if !self.use_tools {
            return None;
        }
        systemd::main_pid(&self.runner, name)
    }

    fn socket_state(&self, port: u16) -> Option<TcpState> {
        let entries: Vec<SocketEntry> = self
            .socket_tables()
            .into_iter()
            .filter(|e| e.local_port == port)
            .collect();
        entries
            .iter()
            .find(|e| e.state.is_listen())
            .or_else(|| entries.first())
            .map(|e| e.state)
    }

    fn service_for_port(&self, port: u16) -> Option<String> {
        if !self.use_tools {
            return None;
        }
        systemd::service_for_port(&self.runner, port)
    }

    fn restart_count(&self, unit: &str) -> Option<u32> {
        if !self.use_tools {
            return None;
        }
        systemd::restart_count(&self.runner, unit)
    }

    fn extended_info(&self, pid: u32) -> Option<ExtendedInfo> {
        let dir = self.pid_dir(pid);
        if !dir.exists() {
            return None;
        }
        let read = |name: &str| fs::read_to_string(dir.join(name)).ok();

        let mut info = ExtendedInfo::default();
        if let Some((vms, rss, shared)) =
            read("statm").and_then(|s| proc_parsers::parse_statm(&s, page_size()))
        {
            info.vms_bytes = Some(vms);
            info.rss_bytes = Some(rss);
            info.shared_bytes = Some(shared);
        }
        if let Some(io) = read("io") {
            let (r, w) = proc_parsers::parse_io(&io);
            info.read_bytes = r;
            info.write_bytes = w;
        }
        info.fd_count = fs::read_dir(dir.join("fd"))
            .ok()
            .map(|entries| entries.count() as u64);
        info.fd_limit = read("limits").and_then(|l| proc_parsers::parse_limits_nofile(&l));
        info.threads = read("status").and_then(|s| proc_parsers::parse_status_threads(&s));
        info.children = self.children(pid);
        Some(info)
    }

    fn container_label(&self, process: &Process) -> Option<String> {
        if !self.use_tools {
            return None;
        }
        let runtime = ContainerRuntime::from_label(process.container.as_deref()?)?;
        let cgroup = fs::read_to_string(self.pid_dir(process.pid).join("cgroup")).ok()?;
        let id = container::find_long_hex_id(&cgroup)?;
        container::resolve_container_name(&self.runner, id, runtime)
    }

    fn docker_port_match(&self, port: u16) -> Option<DockerPortMatch> {
        if !self.use_tools {
            return None;
        }
        container::resolve_container_by_port(&self.runner, port)
    }

    fn launchd_details(&self, _label: &str) -> BTreeMap<String, String> {
        BTreeMap::new()
    }
}

fn clock_ticks() -> u64 {
    let ticks = unsafe { libc::sysconf(libc::_SC_CLK_TCK) };
    if ticks > 0 {
        ticks as u64
    } else {
        100
    }
}

fn page_size() -> u64 {
    let size = unsafe { libc::sysconf(libc::_SC_PAGESIZE) };
    if size > 0 {
        size as u64
    } else {
        4096
    }
}
