//! Windows backend built on `tasklist`, PowerShell CIM queries, `netstat`,
//! `wmic` and `sc`.
//!
//! Environment and working directory live in the target's PEB, which is
//! not read here; both are reported as unknown. File-holder lookup has no
//! tool equivalent and is unsupported.

use chrono::{DateTime, NaiveDateTime, Utc};
use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;
use tracing::debug;

use witr_common::{Error, Forked, Health, Listener, Process, ProcessEntry, Result};

use super::net::TcpState;
use super::tool_runner::ToolRunner;
use super::ProcessSource;

const CIM_PROCESS_SCRIPT: &str = "Get-CimInstance -ClassName Win32_Process -Filter \"ProcessId={pid}\" | ForEach-Object { \"CommandLine=$($_.CommandLine)\"; \"CreationDate=$($_.CreationDate.ToUniversalTime().ToString('yyyyMMddHHmmss'))\"; \"ExecutablePath=$($_.ExecutablePath)\"; \"ParentProcessId=$($_.ParentProcessId)\"; \"Status=$($_.Status)\"; \"Owner=$((Invoke-CimMethod -InputObject $_ -MethodName GetOwner).User)\" }";

const CIM_LIST_SCRIPT: &str = "Get-CimInstance -ClassName Win32_Process | ForEach-Object { \"$($_.ProcessId)|$($_.Name)|$($_.CommandLine)\" }";

/// Fields of one `Win32_Process` instance.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CimProcess {
    pub cmdline: String,
    pub started_at: Option<DateTime<Utc>>,
    pub exe: String,
    pub ppid: u32,
    pub status: String,
    pub owner: String,
}

/// Process source for Windows.
#[derive(Debug, Clone)]
pub struct WindowsSource {
    runner: ToolRunner,
}

impl WindowsSource {
    pub fn new(runner: ToolRunner) -> Self {
        Self { runner }
    }

    fn powershell(&self, script: &str) -> Option<String> {
        self.runner
            .text("powershell", &["-NoProfile", "-NonInteractive", script])
    }

    fn netstat(&self) -> Option<String> {
        self.runner.text("netstat", &["-ano", "-p", "TCP"])
    }

    fn service_for_pid(&self, pid: u32) -> Option<String> {
        let filter = format!("ProcessId={pid}");
        let out = self.runner.text(
            "wmic",
            &["service", "where", &filter, "get", "Name", "/format:list"],
        )?;
        parse_wmic_service_name(&out)
    }
}

impl ProcessSource for WindowsSource {
    fn read_process(&self, pid: u32) -> Result<Process> {
        let filter = format!("PID eq {pid}");
        let out = self
            .runner
            .text("tasklist", &["/FI", &filter, "/FO", "CSV", "/NH"])
            .ok_or_else(|| Error::Collection(format!("tasklist failed for pid {pid}")))?;
        let name = parse_tasklist_name(&out)
            .ok_or_else(|| Error::NotFound(format!("process {pid} not found")))?;

        let script = CIM_PROCESS_SCRIPT.replace("{pid}", &pid.to_string());
        let cim = self
            .powershell(&script)
            .map(|s| parse_cim_process(&s))
            .unwrap_or_default();

        let listeners = self
            .netstat()
            .map(|s| parse_netstat_listeners_for_pid(&s, pid))
            .unwrap_or_default();
        let exe_deleted = !cim.exe.is_empty() && !Path::new(&cim.exe).exists();

        Ok(Process {
            pid,
            ppid: cim.ppid,
            command: name,
            cmdline: cim.cmdline,
            exe: cim.exe,
            started_at: cim.started_at,
            user: if cim.owner.is_empty() {
                "unknown".to_string()
            } else {
                cim.owner
            },
            working_dir: "unknown".to_string(),
            service: self.service_for_pid(pid),
            listeners,
            health: health_from_status(&cim.status),
            forked: Forked::Unknown,
            exe_deleted,
            ..Process::default()
        })
    }

    fn list_processes(&self) -> Result<Vec<ProcessEntry>> {
        let out = self
            .powershell(CIM_LIST_SCRIPT)
            .ok_or_else(|| Error::Collection("failed to list processes".to_string()))?;
        Ok(parse_cim_list(&out))
    }

    fn listening_pids(&self, port: u16) -> Result<Vec<u32>> {
        let out = self
            .netstat()
            .ok_or_else(|| Error::Collection("netstat failed".to_string()))?;
        let pids = parse_netstat_port(&out, port);
        debug!(port, owners = pids.len(), "netstat lookup");
        if pids.is_empty() {
            return Err(Error::NotFound(format!("no process listening on port {port}")));
        }
        Ok(pids)
    }

    fn file_holders(&self, _path: &Path) -> Result<Vec<u32>> {
        Err(Error::Unsupported(
            "file lookup is not available on windows".to_string(),
        ))
    }

    fn service_pid(&self, name: &str) -> Option<u32> {
        if name.is_empty() || !name.chars().all(|c| c.is_ascii_alphanumeric() || "._-".contains(c))
        {
            return None;
        }
        let out = self.runner.text("sc", &["queryex", name])?;
        parse_sc_pid(&out)
    }

    fn socket_state(&self, port: u16) -> Option<TcpState> {
        let out = self.netstat()?;
        let states: Vec<TcpState> = netstat_rows(&out)
            .filter(|row| row.port == port)
            .map(|row| row.state)
            .collect();
        states
            .iter()
            .find(|s| s.is_listen())
            .or_else(|| states.first())
            .copied()
    }

    fn launchd_details(&self, _label: &str) -> BTreeMap<String, String> {
        BTreeMap::new()
    }
}

/// Image name from `tasklist /FO CSV /NH`; `None` when no task matched.
pub fn parse_tasklist_name(output: &str) -> Option<String> {
    if output.contains("No tasks are running") {
        return None;
    }
    let line = output.lines().find(|l| l.trim_start().starts_with('"'))?;
    let name = line.split("\",\"").next()?.trim().trim_matches('"');
    (!name.is_empty()).then(|| name.to_string())
}

/// `Key=value` lines printed by [`CIM_PROCESS_SCRIPT`].
pub fn parse_cim_process(output: &str) -> CimProcess {
    let mut cim = CimProcess::default();
    for line in output.lines().map(str::trim) {
        let Some((key, value)) = line.split_once('=') else {
            continue;
        };
        match key {
            "CommandLine" => cim.cmdline = value.to_string(),
            "CreationDate" => {
                cim.started_at = value
                    .get(..14)
                    .and_then(|v| NaiveDateTime::parse_from_str(v, "%Y%m%d%H%M%S").ok())
                    .map(|naive| naive.and_utc());
            }
            "ExecutablePath" => cim.exe = value.to_string(),
            "ParentProcessId" => cim.ppid = value.parse().unwrap_or(0),
            "Status" => cim.status = value.to_string(),
            "Owner" => cim.owner = value.to_string(),
            _ => {}
        }
    }
    cim
}

/// `Win32_Process.Status` is usually empty; anything but empty or `OK`
/// is reported as unknown.
pub fn health_from_status(status: &str) -> Health {
    match status.trim().to_ascii_lowercase().as_str() {
        "" | "ok" => Health::Healthy,
        _ => Health::Unknown,
    }
}

/// `pid|name|commandline` rows printed by [`CIM_LIST_SCRIPT`].
pub fn parse_cim_list(output: &str) -> Vec<ProcessEntry> {
    output
        .lines()
        .filter_map(|line| {
            let mut parts = line.trim().splitn(3, '|');
            let pid = parts.next()?.parse().ok()?;
            let command = parts.next()?.to_string();
            let cmdline = parts.next().unwrap_or("").to_string();
            Some(ProcessEntry {
                pid,
                command,
                cmdline,
            })
        })
        .collect()
}

/// Service name from `wmic service ... get Name /format:list`.
pub fn parse_wmic_service_name(output: &str) -> Option<String> {
    output
        .lines()
        .find_map(|line| line.trim().strip_prefix("Name="))
        .filter(|name| !name.is_empty())
        .map(str::to_string)
}

/// Running PID from `sc queryex` (`PID                : 812`).
pub fn parse_sc_pid(output: &str) -> Option<u32> {
    output.lines().find_map(|line| {
        let (key, value) = line.split_once(':')?;
        if key.trim() != "PID" {
            return None;
        }
        value.trim().parse().ok().filter(|&pid: &u32| pid > 0)
    })
}

struct NetstatRow {
    address: String,
    port: u16,
    state: TcpState,
    pid: u32,
}

fn netstat_rows(output: &str) -> impl Iterator<Item = NetstatRow> + '_ {
    output.lines().filter_map(|line| {
        let fields: Vec<&str> = line.split_whitespace().collect();
        if fields.len() < 5 || !fields[0].eq_ignore_ascii_case("TCP") {
            return None;
        }
        let (addr, port) = fields[1].rsplit_once(':')?;
        Some(NetstatRow {
            address: addr.trim_start_matches('[').trim_end_matches(']').to_string(),
            port: port.parse().ok()?,
            state: TcpState::from_name(fields[3]),
            pid: fields[4].parse().ok()?,
        })
    })
}

/// PIDs with a LISTENING row on `port` in `netstat -ano -p TCP`.
pub fn parse_netstat_port(output: &str, port: u16) -> Vec<u32> {
    let pids: BTreeSet<u32> = netstat_rows(output)
        .filter(|row| row.port == port && row.state.is_listen() && row.pid > 0)
        .map(|row| row.pid)
        .collect();
    pids.into_iter().collect()
}

/// LISTENING sockets owned by `pid`.
pub fn parse_netstat_listeners_for_pid(output: &str, pid: u32) -> Vec<Listener> {
    let set: BTreeSet<Listener> = netstat_rows(output)
        .filter(|row| row.pid == pid && row.state.is_listen())
        .map(|row| Listener {
            address: row.address,
            port: row.port,
        })
        .collect();
    set.into_iter().collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Datelike;

    const NETSTAT: &str = "\r\nActive Connections\r\n\r\n  Proto  Local Address          Foreign Address        State           PID\r\n  TCP    0.0.0.0:80             0.0.0.0:0              LISTENING       812\r\n  TCP    [::]:80                [::]:0                 LISTENING       812\r\n  TCP    127.0.0.1:5000         127.0.0.1:51000        TIME_WAIT       0\r\n  TCP    0.0.0.0:445            0.0.0.0:0              LISTENING       4\r\n";

    #[test]
    fn test_parse_wmic_service_name() {
        assert_eq!(
            parse_wmic_service_name("\n\nName=spooler\n\n").as_deref(),
            Some("spooler")
        );
        assert_eq!(parse_wmic_service_name("No Instance(s) Available.\n"), None);
        assert_eq!(
            parse_wmic_service_name("\r\nName=W3SVC\r\n\r\nName=WAS\r\n").as_deref(),
            Some("W3SVC")
        );
        assert_eq!(parse_wmic_service_name(""), None);
    }

    #[test]
    fn test_parse_tasklist_name() {
        assert_eq!(
            parse_tasklist_name("\"nginx.exe\",\"812\",\"Services\",\"0\",\"10,240 K\"\r\n")
                .as_deref(),
            Some("nginx.exe")
        );
        assert_eq!(
            parse_tasklist_name("INFO: No tasks are running which match the specified criteria.\r\n"),
            None
        );
    }

    #[test]
    fn test_parse_cim_process() {
        let out = "CommandLine=\"C:\\nginx\\nginx.exe\" -c conf\\nginx.conf\r\nCreationDate=20240105083000\r\nExecutablePath=C:\\nginx\\nginx.exe\r\nParentProcessId=640\r\nStatus=\r\nOwner=SYSTEM\r\n";
        let cim = parse_cim_process(out);
        assert_eq!(cim.ppid, 640);
        assert_eq!(cim.exe, "C:\\nginx\\nginx.exe");
        assert_eq!(cim.owner, "SYSTEM");
        assert!(cim.cmdline.ends_with("nginx.conf"));
        assert_eq!(cim.started_at.unwrap().year(), 2024);
        assert_eq!(health_from_status(&cim.status), Health::Healthy);
    }

    #[test]
    fn test_health_from_status() {
        assert_eq!(health_from_status("OK"), Health::Healthy);
        assert_eq!(health_from_status("Degraded"), Health::Unknown);
    }

    #[test]
    fn test_parse_cim_list() {
        let out = "4|System|\r\n812|nginx.exe|C:\\nginx\\nginx.exe -g x|y\r\nbad|line\r\n";
        let entries = parse_cim_list(out);
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[1].command, "nginx.exe");
        assert_eq!(entries[1].cmdline, "C:\\nginx\\nginx.exe -g x|y");
    }

    #[test]
    fn test_parse_sc_pid() {
        let out = "SERVICE_NAME: nginx\r\n        TYPE               : 10  WIN32_OWN_PROCESS\r\n        STATE              : 4  RUNNING\r\n        PID                : 812\r\n        FLAGS              :\r\n";
        assert_eq!(parse_sc_pid(out), Some(812));
        assert_eq!(parse_sc_pid("        PID                : 0\r\n"), None);
    }

    #[test]
    fn test_parse_netstat_port() {
        assert_eq!(parse_netstat_port(NETSTAT, 80), vec![812]);
        assert!(parse_netstat_port(NETSTAT, 5000).is_empty());
    }

    #[test]
    fn test_parse_netstat_listeners_for_pid() {
        let listeners = parse_netstat_listeners_for_pid(NETSTAT, 812);
        assert_eq!(listeners.len(), 2);
        assert!(listeners.contains(&Listener {
            address: "::".into(),
            port: 80
        }));
    }

    #[test]
    fn test_file_holders_unsupported() {
        let source = WindowsSource::new(ToolRunner::with_defaults());
        assert!(matches!(
            source.file_holders(Path::new("C:\\x")),
            Err(Error::Unsupported(_))
        ));
    }
}
