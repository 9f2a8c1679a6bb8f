//! JSON rendering. Every document is pretty-printed and ends without a
//! trailing newline; the caller adds one.

use serde::Serialize;

use witr_common::{DockerPortMatch, Process, ProcessEntry, QueryResult, Result};

use super::View;

#[derive(Serialize)]
struct ChainLink<'a> {
    pid: u32,
    command: &'a str,
}

#[derive(Serialize)]
struct ShortDoc<'a> {
    target: &'a str,
    chain: Vec<ChainLink<'a>>,
}

#[derive(Serialize)]
struct TreeNode<'a> {
    pid: u32,
    command: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    child: Option<Box<TreeNode<'a>>>,
}

#[derive(Serialize)]
struct WarningsDoc<'a> {
    pid: u32,
    command: &'a str,
    cmdline: &'a str,
    warnings: &'a [String],
}

#[derive(Serialize)]
struct EnvDoc<'a> {
    pid: u32,
    command: &'a str,
    cmdline: &'a str,
    env: &'a [String],
}

#[derive(Serialize)]
struct AmbiguousDoc<'a> {
    ambiguous: bool,
    candidates: &'a [ProcessEntry],
}

#[derive(Serialize)]
struct ContainerDoc<'a> {
    target: String,
    container_id: &'a str,
    container_name: &'a str,
    image: &'a str,
    ports: &'a str,
    #[serde(skip_serializing_if = "str::is_empty")]
    compose_project: &'a str,
    #[serde(skip_serializing_if = "str::is_empty")]
    compose_service: &'a str,
    source: String,
    note: &'static str,
}

const CONTAINER_NOTE: &str =
    "The owning process is not visible in this environment (e.g., Docker Desktop in a WSL2 distro or macOS VM).";

fn link(p: &Process) -> ChainLink<'_> {
    ChainLink {
        pid: p.pid,
        command: &p.command,
    }
}

fn tree_of(chain: &[Process]) -> Option<TreeNode<'_>> {
    let (first, rest) = chain.split_first()?;
    Some(TreeNode {
        pid: first.pid,
        command: &first.command,
        child: tree_of(rest).map(Box::new),
    })
}

/// Render `result` as `view`.
pub fn report_json(result: &QueryResult, view: View) -> Result<String> {
    let empty = Process::default();
    let proc = result.process().unwrap_or(&empty);
    let doc = match view {
        View::Standard => serde_json::to_string_pretty(result)?,
        View::Short => serde_json::to_string_pretty(&ShortDoc {
            target: &result.resolved_target,
            chain: result.ancestry.iter().map(link).collect(),
        })?,
        View::Tree => serde_json::to_string_pretty(&tree_of(&result.ancestry))?,
        View::Warnings => serde_json::to_string_pretty(&WarningsDoc {
            pid: proc.pid,
            command: &proc.command,
            cmdline: &proc.cmdline,
            warnings: &result.warnings,
        })?,
        View::Env => serde_json::to_string_pretty(&EnvDoc {
            pid: proc.pid,
            command: &proc.command,
            cmdline: &proc.cmdline,
            env: &proc.env,
        })?,
    };
    Ok(doc)
}

pub fn ambiguous_json(candidates: &[ProcessEntry]) -> Result<String> {
    Ok(serde_json::to_string_pretty(&AmbiguousDoc {
        ambiguous: true,
        candidates,
    })?)
}

pub fn container_json(port: &str, m: &DockerPortMatch) -> Result<String> {
    Ok(serde_json::to_string_pretty(&ContainerDoc {
        target: format!("port {port}"),
        container_id: &m.id,
        container_name: &m.name,
        image: &m.image,
        ports: &m.ports,
        compose_project: &m.compose_project,
        compose_service: &m.compose_service,
        source: m.source_label(),
        note: CONTAINER_NOTE,
    })?)
}
