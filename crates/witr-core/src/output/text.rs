//! Terminal rendering.

use chrono::{DateTime, Local, Utc};

use witr_common::{DockerPortMatch, Forked, Health, Process, ProcessEntry, QueryResult};

use super::{Palette, View};

/// Lists longer than this are truncated with an "... and N more" line.
pub const MAX_DISPLAY_ITEMS: usize = 10;

const LABEL_WIDTH: usize = 12;
const CONTINUATION: &str = "              ";

const DOCKER_NOTE: [&str; 3] = [
    "The owning process is not visible in this environment.",
    "This is common when Docker Desktop runs in a separate namespace",
    "(e.g., WSL2 distro, macOS VM).",
];

/// Launchd detail keys in display order, with their labels.
const DETAIL_LABELS: &[(&str, &str)] = &[
    ("type", "Type"),
    ("plist", "Plist"),
    ("triggers", "Trigger"),
    ("keepalive", "KeepAlive"),
];

/// Replace control characters so process-supplied strings cannot move
/// the cursor or change colors.
pub fn sanitize_terminal(s: &str) -> String {
    s.chars()
        .map(|c| if c.is_control() && c != '\t' { '?' } else { c })
        .collect()
}

/// "3 days ago", "1 hour ago", "just now".
pub fn relative_age(started: DateTime<Utc>, now: DateTime<Utc>) -> String {
    let dur = now.signed_duration_since(started);
    let hours = dur.num_hours();
    let mins = dur.num_minutes();
    match hours {
        h if h >= 48 => format!("{} days ago", h / 24),
        h if h >= 24 => "1 day ago".to_string(),
        h if h >= 2 => format!("{h} hours ago"),
        _ if mins >= 60 => "1 hour ago".to_string(),
        _ if mins > 0 => format!("{mins} min ago"),
        _ => "just now".to_string(),
    }
}

fn field(out: &mut String, pal: Palette, color: &str, label: &str, value: &str) {
    let pad = " ".repeat(LABEL_WIDTH.saturating_sub(label.len()).max(1));
    out.push_str(&format!("{}{pad}: {value}\n", pal.paint(color, label)));
}

fn name_of(p: &Process) -> String {
    if p.command.is_empty() && !p.cmdline.is_empty() {
        sanitize_terminal(&p.cmdline)
    } else {
        sanitize_terminal(&p.command)
    }
}

fn process_line(pal: Palette, p: &Process) -> String {
    format!(
        "{} ({})",
        pal.paint(Palette::GREEN, &name_of(p)),
        pal.paint(Palette::BOLD, &format!("pid {}", p.pid))
    )
}

fn command_of(p: &Process) -> String {
    if p.cmdline.is_empty() {
        sanitize_terminal(&p.command)
    } else {
        sanitize_terminal(&p.cmdline)
    }
}

fn host_port(address: &str, port: u16) -> String {
    if address.contains(':') {
        format!("[{address}]:{port}")
    } else {
        format!("{address}:{port}")
    }
}

fn mib(bytes: u64) -> f64 {
    bytes as f64 / (1024.0 * 1024.0)
}

/// Render `result` as `view`.
pub fn report_text(
    result: &QueryResult,
    view: View,
    color: bool,
    verbose: bool,
    now: DateTime<Utc>,
) -> String {
    let pal = Palette::new(color);
    match view {
        View::Standard => standard(result, pal, verbose, now),
        View::Short => short(result, pal),
        View::Tree => tree(result, pal),
        View::Warnings => warnings_only(result, pal),
        View::Env => env_only(result, pal),
    }
}

fn standard(r: &QueryResult, pal: Palette, verbose: bool, now: DateTime<Utc>) -> String {
    let mut out = String::new();
    let Some(proc) = r.process() else {
        field(&mut out, pal, Palette::BLUE, "Target", "unknown");
        return out;
    };

    field(
        &mut out,
        pal,
        Palette::BLUE,
        "Target",
        &sanitize_terminal(&r.resolved_target),
    );
    out.push('\n');

    let mut headline = process_line(pal, proc);
    if !matches!(proc.health, Health::Healthy) {
        headline.push(' ');
        headline.push_str(&pal.paint(Palette::RED, &format!("[{}]", proc.health)));
    }
    if proc.forked == Forked::Forked {
        headline.push(' ');
        headline.push_str(&pal.paint(Palette::DIM_YELLOW, "{forked}"));
    }
    field(&mut out, pal, Palette::BLUE, "Process", &headline);

    if !proc.user.is_empty() && proc.user != "unknown" {
        field(&mut out, pal, Palette::BLUE, "User", &sanitize_terminal(&proc.user));
    }
    if let Some(container) = proc.container.as_deref().filter(|c| !c.is_empty()) {
        field(&mut out, pal, Palette::BLUE, "Container", &sanitize_terminal(container));
    }
    if let Some(service) = proc.service.as_deref().filter(|s| !s.is_empty()) {
        field(&mut out, pal, Palette::BLUE, "Service", &sanitize_terminal(service));
    }
    field(&mut out, pal, Palette::BLUE, "Command", &command_of(proc));

    let started = match proc.started_at {
        Some(at) => format!(
            "{} ({})",
            relative_age(at, now),
            at.with_timezone(&Local).format("%a %Y-%m-%d %H:%M:%S %:z")
        ),
        None => "unknown".to_string(),
    };
    field(&mut out, pal, Palette::MAGENTA, "Started", &started);
    if let Some(count) = r.restart_count.filter(|&c| c > 0) {
        field(&mut out, pal, Palette::MAGENTA, "Restarts", &count.to_string());
    }

    out.push_str(&format!("\n{} :\n  ", pal.paint(Palette::MAGENTA, "Why It Exists")));
    out.push_str(&chain_line(r, pal));
    out.push_str("\n\n");

    let kind = r.source.source_type.to_string();
    let source_label = if !r.source.name.is_empty() && r.source.name != kind {
        format!("{} ({kind})", sanitize_terminal(&r.source.name))
    } else {
        kind
    };
    field(&mut out, pal, Palette::CYAN, "Source", &source_label);
    for (key, label) in DETAIL_LABELS {
        if let Some(value) = r.source.details.get(*key) {
            out.push_str(&format!(
                "{}{} : {}\n",
                CONTINUATION,
                pal.paint(Palette::BOLD, label),
                sanitize_terminal(value)
            ));
        }
    }
    if let Some(container) = r.source.details.get("container") {
        out.push_str(&format!(
            "{}{} : {}\n",
            CONTINUATION,
            pal.paint(Palette::BOLD, "Container"),
            sanitize_terminal(container)
        ));
    }

    if !proc.working_dir.is_empty() && proc.working_dir != "unknown" {
        out.push('\n');
        field(
            &mut out,
            pal,
            Palette::CYAN,
            "Working Dir",
            &sanitize_terminal(&proc.working_dir),
        );
    }
    if let Some(repo) = proc.git_repo.as_deref() {
        let value = match proc.git_branch.as_deref() {
            Some(branch) => format!("{} ({})", sanitize_terminal(repo), sanitize_terminal(branch)),
            None => sanitize_terminal(repo),
        };
        field(&mut out, pal, Palette::CYAN, "Git Repo", &value);
    }

    let listeners: Vec<String> = proc
        .listeners
        .iter()
        .filter(|l| !l.address.is_empty() && l.port > 0)
        .map(|l| sanitize_terminal(&host_port(&l.address, l.port)))
        .collect();
    for (i, hp) in listeners.iter().take(MAX_DISPLAY_ITEMS).enumerate() {
        if i == 0 {
            field(&mut out, pal, Palette::GREEN, "Listening", hp);
        } else {
            out.push_str(&format!("{CONTINUATION}{hp}\n"));
        }
    }
    if listeners.len() > MAX_DISPLAY_ITEMS {
        out.push_str(&format!(
            "{CONTINUATION}... and {} more\n",
            listeners.len() - MAX_DISPLAY_ITEMS
        ));
    }

    if !r.warnings.is_empty() {
        out.push_str(&format!("\n{}    :\n", pal.paint(Palette::RED, "Warnings")));
        for w in &r.warnings {
            out.push_str(&format!("  • {}\n", sanitize_terminal(w)));
        }
    }

    if r.partial_ancestry {
        out.push('\n');
        field(
            &mut out,
            pal,
            Palette::DIM_YELLOW,
            "Note",
            "an ancestor exited while the chain was read; ancestry is incomplete",
        );
    }

    if verbose {
        verbose_section(&mut out, r, proc, pal);
    }
    out
}

fn verbose_section(out: &mut String, r: &QueryResult, proc: &Process, pal: Palette) {
    if let Some(ext) = &proc.extended {
        if let Some(vms) = ext.vms_bytes.filter(|&v| v > 0) {
            out.push_str(&format!("\n{}:\n", pal.paint(Palette::GREEN, "Memory")));
            out.push_str(&format!("  Virtual  : {:.1} MB\n", mib(vms)));
            out.push_str(&format!(
                "  Resident : {:.1} MB\n",
                mib(ext.rss_bytes.unwrap_or(0))
            ));
            if let Some(shared) = ext.shared_bytes.filter(|&s| s > 0) {
                out.push_str(&format!("  Shared   : {:.1} MB\n", mib(shared)));
            }
        }

        let read = ext.read_bytes.unwrap_or(0);
        let write = ext.write_bytes.unwrap_or(0);
        if read > 0 || write > 0 {
            out.push_str(&format!("\n{}:\n", pal.paint(Palette::GREEN, "I/O Statistics")));
            if read > 0 {
                out.push_str(&format!("  Read  : {:.1} MB\n", mib(read)));
            }
            if write > 0 {
                out.push_str(&format!("  Write : {:.1} MB\n", mib(write)));
            }
        }

        if let Some(count) = ext.fd_count.filter(|&c| c > 0) {
            let limit = match ext.fd_limit {
                Some(limit) if limit > 0 => limit.to_string(),
                _ => "unlimited".to_string(),
            };
            out.push_str(&format!(
                "\n{}: {count}/{limit}\n",
                pal.paint(Palette::GREEN, "File Descriptors")
            ));
        }

        if let Some(threads) = ext.threads.filter(|&t| t > 1) {
            out.push_str(&format!("\n{}: {threads}\n", pal.paint(Palette::GREEN, "Threads")));
        }

        if !ext.children.is_empty() {
            let shown: Vec<String> = ext
                .children
                .iter()
                .take(MAX_DISPLAY_ITEMS)
                .map(|pid| pid.to_string())
                .collect();
            let mut line = shown.join(", ");
            if ext.children.len() > MAX_DISPLAY_ITEMS {
                line.push_str(&format!(
                    " ... and {} more",
                    ext.children.len() - MAX_DISPLAY_ITEMS
                ));
            }
            out.push_str(&format!("\n{}: {line}\n", pal.paint(Palette::GREEN, "Children")));
        }
    }

    if let Some(socket) = &r.socket {
        out.push('\n');
        field(
            out,
            pal,
            Palette::GREEN,
            "Socket",
            &sanitize_terminal(&socket.state),
        );
        if !socket.explanation.is_empty() {
            out.push_str(&format!(
                "{CONTINUATION}{}\n",
                sanitize_terminal(&socket.explanation)
            ));
        }
        if let Some(workaround) = &socket.workaround {
            out.push_str(&format!(
                "{CONTINUATION}{}\n",
                pal.paint(Palette::DIM_YELLOW, &sanitize_terminal(workaround))
            ));
        }
    }
}

fn chain_line(r: &QueryResult, pal: Palette) -> String {
    let last = r.ancestry.len().saturating_sub(1);
    r.ancestry
        .iter()
        .enumerate()
        .map(|(i, p)| {
            let name = name_of(p);
            let name = if i == last {
                pal.paint(Palette::GREEN, &name)
            } else {
                name
            };
            format!("{name} ({})", pal.paint(Palette::BOLD, &format!("pid {}", p.pid)))
        })
        .collect::<Vec<_>>()
        .join(&format!(" {} ", pal.paint(Palette::MAGENTA, "→")))
}

fn short(r: &QueryResult, pal: Palette) -> String {
    format!("{}\n", chain_line(r, pal))
}

fn tree(r: &QueryResult, pal: Palette) -> String {
    let mut out = String::new();
    let last = r.ancestry.len().saturating_sub(1);
    for (depth, p) in r.ancestry.iter().enumerate() {
        let name = name_of(p);
        let name = if depth == last {
            pal.paint(Palette::GREEN, &name)
        } else {
            name
        };
        let pid = pal.paint(Palette::BOLD, &format!("pid {}", p.pid));
        if depth == 0 {
            out.push_str(&format!("{name} ({pid})\n"));
        } else {
            let indent = "  ".repeat(depth - 1);
            out.push_str(&format!(
                "{indent}{} {name} ({pid})\n",
                pal.paint(Palette::MAGENTA, "└─")
            ));
        }
    }
    out
}

fn warnings_only(r: &QueryResult, pal: Palette) -> String {
    let mut out = String::new();
    if let Some(proc) = r.process() {
        field(&mut out, pal, Palette::BLUE, "Process", &process_line(pal, proc));
        field(&mut out, pal, Palette::BLUE, "Command", &command_of(proc));
    }
    if r.warnings.is_empty() {
        field(
            &mut out,
            pal,
            Palette::RED,
            "Warnings",
            &pal.paint(Palette::GREEN, "No warnings."),
        );
        return out;
    }
    out.push_str(&format!("{}    :\n", pal.paint(Palette::RED, "Warnings")));
    for w in &r.warnings {
        out.push_str(&format!("  • {}\n", sanitize_terminal(w)));
    }
    out
}

fn env_only(r: &QueryResult, pal: Palette) -> String {
    let mut out = String::new();
    let Some(proc) = r.process() else {
        return out;
    };
    field(&mut out, pal, Palette::BLUE, "Process", &process_line(pal, proc));
    field(&mut out, pal, Palette::BLUE, "Command", &command_of(proc));
    if proc.env.is_empty() {
        field(
            &mut out,
            pal,
            Palette::RED,
            "Environment",
            "No environment variables found.",
        );
        return out;
    }
    out.push_str(&format!("{} :\n", pal.paint(Palette::GREEN, "Environment")));
    for var in &proc.env {
        out.push_str(&format!("  {}\n", sanitize_terminal(var)));
    }
    out
}

/// Candidate list printed when a query matches several processes.
pub fn ambiguous_text(candidates: &[ProcessEntry], color: bool, view: View) -> String {
    let pal = Palette::new(color);
    let mut out = String::from("Multiple matching processes found:\n\n");
    for (i, c) in candidates.iter().enumerate() {
        out.push_str(&format!(
            "[{}] {} ({})\n    {}\n",
            i + 1,
            pal.paint(Palette::GREEN, &sanitize_terminal(&c.command)),
            pal.paint(Palette::BOLD, &format!("pid {}", c.pid)),
            sanitize_terminal(&c.cmdline)
        ));
    }
    out.push_str("\nRe-run with:\n");
    if view == View::Env {
        out.push_str("  witr --pid <pid> --env\n");
    } else {
        out.push_str("  witr --pid <pid>\n");
    }
    out
}

/// Report for a port published by a container whose process is not
/// visible from this host.
pub fn container_text(port: &str, m: &DockerPortMatch, view: View, color: bool) -> String {
    let pal = Palette::new(color);
    let name = sanitize_terminal(&m.name);
    let image = sanitize_terminal(&m.image);

    if view == View::Short {
        return format!(
            "port {port} → {} ({image}) [{}]\n",
            pal.paint(Palette::GREEN, &name),
            m.source_label()
        );
    }

    let mut out = String::new();
    field(&mut out, pal, Palette::BLUE, "Target", &format!("port {port}"));
    out.push('\n');
    field(&mut out, pal, Palette::BLUE, "Container", &pal.paint(Palette::GREEN, &name));
    field(&mut out, pal, Palette::BLUE, "Image", &image);
    if !m.ports.is_empty() {
        field(&mut out, pal, Palette::BLUE, "Ports", &sanitize_terminal(&m.ports));
    }
    out.push_str(&format!("\n{} :\n  ", pal.paint(Palette::MAGENTA, "Why It Exists")));
    out.push_str("Docker Desktop (process not visible in current namespace)\n\n");
    field(&mut out, pal, Palette::CYAN, "Source", &m.source_label());
    out.push('\n');
    field(&mut out, pal, Palette::DIM_YELLOW, "Note", DOCKER_NOTE[0]);
    for line in &DOCKER_NOTE[1..] {
        out.push_str(&format!("{CONTINUATION}{line}\n"));
    }
    out
}
