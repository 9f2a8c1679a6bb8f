//! Query pipeline.
//!
//! [`explain`] runs one query end to end: resolve the target, walk the
//! ancestry of the single match, classify it and evaluate warnings. The
//! result is handed to [`crate::output`] for rendering.

use tracing::{debug, instrument};

use witr_common::{
    DockerPortMatch, Error, ExtendedInfo, Process, ProcessEntry, QueryResult, Result, SourceType,
    Target, TargetKind,
};

use crate::ancestry::walk_ancestry;
use crate::collect::systemd::unit_name;
use crate::collect::ProcessSource;
use crate::source::{detect, socket_info, warnings};
use crate::target;

/// Knobs for one query.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExplainOptions {
    /// Name queries compare the command name exactly.
    pub exact: bool,
    /// Attach resource figures to the queried process.
    pub verbose: bool,
    /// Ask the container runtime about ports nobody on the host owns.
    pub docker_fallback: bool,
}

impl Default for ExplainOptions {
    fn default() -> Self {
        Self {
            exact: false,
            verbose: false,
            docker_fallback: true,
        }
    }
}

/// What a query produced.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    /// One process, fully explained.
    Report(Box<QueryResult>),
    /// Several processes matched; the user has to pick one.
    Ambiguous(Vec<ProcessEntry>),
    /// A port published by a container whose process is not visible here.
    Container(DockerPortMatch),
}

impl Outcome {
    /// The ambiguity as an error, for exit status and structured output.
    pub fn ambiguity(&self) -> Option<Error> {
        match self {
            Outcome::Ambiguous(candidates) => Some(Error::AmbiguousMatch {
                pids: candidates.iter().map(|c| c.pid).collect(),
            }),
            _ => None,
        }
    }
}

/// Explain why `target` is running.
#[instrument(level = "debug", skip(source, options), fields(target = %target))]
pub fn explain(
    source: &dyn ProcessSource,
    target: &Target,
    options: &ExplainOptions,
) -> Result<Outcome> {
    let pids = match target::resolve(source, target, options.exact) {
        Ok(pids) => pids,
        Err(err @ (Error::NotFound(_) | Error::OwnerNotDetected { .. }))
            if target.kind == TargetKind::Port && options.docker_fallback =>
        {
            let published = target::parse_port(&target.value)
                .ok()
                .and_then(|port| source.docker_port_match(port));
            return match published {
                Some(m) => {
                    debug!(container = %m.name, "port published by container");
                    Ok(Outcome::Container(m))
                }
                None => Err(err),
            };
        }
        Err(err) => return Err(err),
    };

    let pid = match pids.as_slice() {
        [] => return Err(Error::NotFound("no matching process found".to_string())),
        [pid] => *pid,
        _ => return Ok(Outcome::Ambiguous(candidates(source, &pids))),
    };

    let port = match target.kind {
        TargetKind::Port => target::parse_port(&target.value).ok(),
        _ => None,
    };

    // Socket activation: PID 1 owns the socket on behalf of a unit.
    let port_unit = port
        .filter(|_| pid == 1)
        .and_then(|port| source.service_for_port(port));

    let walk = walk_ancestry(source, pid)?;
    let mut chain = walk.chain;

    if options.verbose {
        if let Some(info) = source.extended_info(pid) {
            chain = with_extended(chain, info);
        }
    }

    let Some(last) = chain.last() else {
        return Err(Error::NoAncestry { pid });
    };

    let mut classified = detect(&chain);
    if let Some(label) = source.container_label(last) {
        classified = classified.with_detail("container", label);
    }
    if classified.source_type == SourceType::Launchd {
        if let Some(label) = last.service.as_deref() {
            classified.details.extend(source.launchd_details(label));
        }
    }

    let restart_count = match (classified.source_type, last.service.as_deref()) {
        (SourceType::Systemd, Some(unit)) => source.restart_count(&unit_name(unit)),
        _ => None,
    };

    let resolved_target = match &port_unit {
        Some(unit) => unit.trim_end_matches(".service").to_string(),
        None => last.command.clone(),
    };

    let socket = port.and_then(|port| {
        source
            .socket_state(port)
            .map(|state| socket_info(port, state))
    });

    let warnings = warnings(&chain, &classified);
    debug!(
        pid,
        depth = chain.len(),
        source = %classified.source_type,
        warnings = warnings.len(),
        partial = walk.partial,
        "query explained"
    );

    Ok(Outcome::Report(Box::new(QueryResult {
        target: target.clone(),
        resolved_target,
        pid,
        ancestry: chain,
        source: classified,
        restart_count,
        socket,
        warnings,
        partial_ancestry: walk.partial,
    })))
}

/// Command and command line of each candidate. A process that exited
/// since resolution is listed as `unknown`.
pub fn candidates(source: &dyn ProcessSource, pids: &[u32]) -> Vec<ProcessEntry> {
    pids.iter()
        .map(|&pid| match source.read_process(pid) {
            Ok(p) => ProcessEntry {
                pid,
                command: p.command,
                cmdline: p.cmdline,
            },
            Err(_) => ProcessEntry {
                pid,
                command: "unknown".to_string(),
                cmdline: String::new(),
            },
        })
        .collect()
}

/// The chain with its last element carrying `info`.
fn with_extended(mut chain: Vec<Process>, info: ExtendedInfo) -> Vec<Process> {
    if let Some(last) = chain.pop() {
        chain.push(Process {
            extended: Some(info),
            ..last
        });
    }
    chain
}
