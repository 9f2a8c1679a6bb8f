//! systemd lookups via `systemctl`.
//!
//! # Data Sources
//! - `systemctl status <pid>` - owning unit of a process
//! - `systemctl show --property=... <unit>` - MainPID, NRestarts
//! - `systemctl list-sockets` - socket-activated ports

use std::collections::HashMap;
use tracing::debug;

use super::tool_runner::{is_available, ToolRunner};

/// Unit owning `pid`, from `systemctl status <pid>`.
pub fn service_for_pid(runner: &ToolRunner, pid: u32) -> Option<String> {
    if !is_available("systemctl") {
        return None;
    }
    let out = runner.text("systemctl", &["status", &pid.to_string()])?;
    parse_loaded_service(&out)
}

/// Unit file name from the `Loaded:` line of `systemctl status`.
pub fn parse_loaded_service(output: &str) -> Option<String> {
    if !output.contains("Loaded: loaded") {
        return None;
    }
    output
        .lines()
        .map(str::trim)
        .filter(|line| line.starts_with("Loaded:"))
        .flat_map(str::split_whitespace)
        .map(|part| part.trim_matches(|c| c == '(' || c == ')' || c == ';'))
        .find(|part| part.ends_with(".service"))
        .map(|part| part.rsplit('/').next().unwrap_or(part).to_string())
}

/// MainPID of the service named `name`, if it is running.
pub fn main_pid(runner: &ToolRunner, name: &str) -> Option<u32> {
    if !is_available("systemctl") {
        return None;
    }
    let unit = unit_name(name);
    let out = runner.text("systemctl", &["show", "--property=MainPID", "--", &unit])?;
    let pid = parse_properties(&out).get("MainPID")?.parse::<u32>().ok()?;
    debug!(unit = %unit, pid, "systemd MainPID");
    (pid > 0).then_some(pid)
}

/// `NRestarts` of a unit.
pub fn restart_count(runner: &ToolRunner, unit: &str) -> Option<u32> {
    if !is_available("systemctl") {
        return None;
    }
    let out = runner.text("systemctl", &["show", "--property=NRestarts", "--", unit])?;
    parse_properties(&out).get("NRestarts")?.parse().ok()
}

/// Service unit activated by a listening socket on `port`.
pub fn service_for_port(runner: &ToolRunner, port: u16) -> Option<String> {
    if !is_available("systemctl") {
        return None;
    }
    let out = runner.text("systemctl", &["list-sockets", "--no-legend", "--full"])?;
    parse_list_sockets(&out, port)
}

/// Parse `systemctl list-sockets --no-legend --full`.
///
/// ```text
/// [::]:22      sshd.socket       sshd.service
/// /run/dbus/system_bus_socket dbus.socket dbus.service
/// ```
pub fn parse_list_sockets(output: &str, port: u16) -> Option<String> {
    let suffix = format!(":{port}");
    output.lines().find_map(|line| {
        let fields: Vec<&str> = line.split_whitespace().collect();
        if fields.len() < 3 || !fields[0].ends_with(&suffix) {
            return None;
        }
        let activates = fields[2];
        if !activates.is_empty() {
            Some(activates.to_string())
        } else {
            fields[1]
                .strip_suffix(".socket")
                .map(|base| format!("{base}.service"))
        }
    })
}

/// Append `.service` unless the name already carries a unit suffix.
pub fn unit_name(name: &str) -> String {
    const SUFFIXES: &[&str] = &[
        ".service", ".socket", ".timer", ".scope", ".slice", ".mount", ".target", ".path",
    ];
    if SUFFIXES.iter().any(|s| name.ends_with(s)) {
        name.to_string()
    } else {
        format!("{name}.service")
    }
}

fn parse_properties(output: &str) -> HashMap<String, String> {
    output
        .lines()
        .filter_map(|line| line.split_once('='))
        .map(|(k, v)| (k.trim().to_string(), v.trim().to_string()))
        .collect()
}
