//! Container runtime helpers.
//!
//! Detection of the runtime itself happens in the platform readers (cgroup
//! text on Linux, command lines on macOS). This module holds the CLI
//! lookups that turn a port, id or bridge IP into a human label.

use serde::{Deserialize, Serialize};
use tracing::debug;
use witr_common::DockerPortMatch;

use super::tool_runner::{is_available, ToolRunner, ToolSpec};

/// Container runtimes witr recognizes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContainerRuntime {
    Docker,
    Podman,
    Kubernetes,
    Colima,
    Containerd,
    Jail,
}

impl ContainerRuntime {
    pub fn as_str(&self) -> &'static str {
        match self {
            ContainerRuntime::Docker => "docker",
            ContainerRuntime::Podman => "podman",
            ContainerRuntime::Kubernetes => "kubernetes",
            ContainerRuntime::Colima => "colima",
            ContainerRuntime::Containerd => "containerd",
            ContainerRuntime::Jail => "jail",
        }
    }

    /// Runtime named at the start of a container label such as
    /// `docker`, `docker: web` or `docker-compose: shop/web`.
    pub fn from_label(label: &str) -> Option<Self> {
        let head = label
            .split(|c: char| c == ':' || c.is_whitespace())
            .next()
            .unwrap_or("")
            .to_ascii_lowercase();
        match head.as_str() {
            "docker" | "docker-compose" => Some(ContainerRuntime::Docker),
            "podman" => Some(ContainerRuntime::Podman),
            "kubernetes" => Some(ContainerRuntime::Kubernetes),
            "colima" => Some(ContainerRuntime::Colima),
            "containerd" => Some(ContainerRuntime::Containerd),
            "jail" => Some(ContainerRuntime::Jail),
            _ => None,
        }
    }
}

impl std::fmt::Display for ContainerRuntime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

const DOCKER_PS_FORMAT: &str = "{{.ID}}|{{.Names}}|{{.Image}}|{{.Ports}}|{{.Label \"com.docker.compose.project\"}}|{{.Label \"com.docker.compose.service\"}}";

/// Ask Docker for a container publishing `port`.
///
/// `None` when docker is absent, slow, or nothing matches.
pub fn resolve_container_by_port(runner: &ToolRunner, port: u16) -> Option<DockerPortMatch> {
    if !is_available("docker") {
        return None;
    }
    let spec = ToolSpec::new(
        "docker",
        [
            "ps".to_string(),
            "--filter".to_string(),
            format!("publish={port}"),
            "--format".to_string(),
            DOCKER_PS_FORMAT.to_string(),
        ],
    );
    let out = runner.stdout_of(&spec)?;
    let found = parse_docker_ps(&out);
    debug!(port, found = found.is_some(), "docker port lookup");
    found
}

/// First row of `docker ps --format` output in [`DOCKER_PS_FORMAT`].
pub fn parse_docker_ps(output: &str) -> Option<DockerPortMatch> {
    let line = output.trim().lines().next()?;
    let parts: Vec<&str> = line.splitn(6, '|').collect();
    if parts.len() < 6 {
        return None;
    }
    Some(DockerPortMatch {
        id: parts[0].to_string(),
        name: parts[1].to_string(),
        image: parts[2].to_string(),
        ports: parts[3].to_string(),
        compose_project: parts[4].to_string(),
        compose_service: parts[5].to_string(),
    })
}

/// Resolve a container id to a display label with the runtime's CLI.
pub fn resolve_container_name(
    runner: &ToolRunner,
    id: &str,
    runtime: ContainerRuntime,
) -> Option<String> {
    let (cmd, args): (&str, Vec<&str>) = match runtime {
        ContainerRuntime::Docker => (
            "docker",
            vec![
                "inspect",
                id,
                "--format",
                "{{.Name}}|{{index .Config.Labels \"com.docker.compose.project\"}}|{{index .Config.Labels \"com.docker.compose.service\"}}",
            ],
        ),
        ContainerRuntime::Podman => ("podman", vec!["inspect", id, "--format", "{{.Name}}"]),
        ContainerRuntime::Kubernetes => (
            "crictl",
            vec![
                "inspect",
                id,
                "-o",
                "go-template",
                "--template",
                "{{.status.metadata.name}}",
            ],
        ),
        ContainerRuntime::Containerd => ("nerdctl", vec!["inspect", id, "--format", "{{.Name}}"]),
        ContainerRuntime::Colima | ContainerRuntime::Jail => return None,
    };
    if !is_available(cmd) {
        return None;
    }
    let out = runner.text(cmd, &args)?;
    format_container_name(&out, runtime)
}

/// Turn `inspect` output into a label.
pub fn format_container_name(output: &str, runtime: ContainerRuntime) -> Option<String> {
    let output = output.trim();
    if runtime == ContainerRuntime::Docker {
        let parts: Vec<&str> = output.split('|').collect();
        if parts.len() == 3 {
            let name = parts[0].trim_start_matches('/');
            let (project, service) = (parts[1], parts[2]);
            if !project.is_empty() && !service.is_empty() {
                return Some(format!("docker: {project}/{service} ({name})"));
            }
            return (!name.is_empty()).then(|| format!("docker: {name}"));
        }
    }

    let name = output.trim_start_matches('/');
    if name.is_empty() {
        return None;
    }
    Some(match runtime {
        ContainerRuntime::Docker => format!("docker: {name}"),
        ContainerRuntime::Podman => format!("podman: {name}"),
        ContainerRuntime::Containerd => format!("containerd: {name}"),
        _ => name.to_string(),
    })
}

/// Map a `docker-proxy -container-ip X` command line to `target: <name>`.
pub fn resolve_docker_proxy_target(runner: &ToolRunner, cmdline: &str) -> Option<String> {
    let ip = extract_flag_value(cmdline, &["-container-ip"])?;
    if !is_available("docker") {
        return None;
    }
    let out = runner.text(
        "docker",
        &[
            "network",
            "inspect",
            "bridge",
            "--format",
            "{{range .Containers}}{{.Name}}:{{.IPv4Address}}{{\"\\n\"}}{{end}}",
        ],
    )?;
    bridge_container_for_ip(&out, &ip).map(|name| format!("target: {name}"))
}

/// Find the container whose bridge address (`name:10.0.0.2/16`) is `ip`.
pub fn bridge_container_for_ip(output: &str, ip: &str) -> Option<String> {
    output.lines().find_map(|line| {
        let (name, addr) = line.trim().split_once(':')?;
        let addr = addr.split('/').next()?;
        (addr == ip).then(|| name.to_string())
    })
}

/// First run of 64 hex characters, the shape of a full container id.
pub fn find_long_hex_id(s: &str) -> Option<&str> {
    let bytes = s.as_bytes();
    let mut start = 0;
    while start + 64 <= bytes.len() {
        match bytes[start..start + 64]
            .iter()
            .position(|b| !b.is_ascii_hexdigit())
        {
            None => return Some(&s[start..start + 64]),
            Some(bad) => start += bad + 1,
        }
    }
    None
}

/// Value following the first of `flags` in a command line.
pub fn extract_flag_value(cmdline: &str, flags: &[&str]) -> Option<String> {
    let args = split_cmdline(cmdline);
    args.iter()
        .position(|arg| flags.contains(&arg.as_str()))
        .and_then(|i| args.get(i + 1).cloned())
}

/// Split a command line into words, honoring quotes and backslash escapes.
pub fn split_cmdline(cmdline: &str) -> Vec<String> {
    let mut args = Vec::new();
    let mut current = String::new();
    let mut quote: Option<char> = None;
    let mut escaped = false;

    for c in cmdline.chars() {
        if escaped {
            current.push(c);
            escaped = false;
            continue;
        }
        match c {
            '\\' => escaped = true,
            '"' | '\'' => match quote {
                None => quote = Some(c),
                Some(q) if q == c => quote = None,
                Some(_) => current.push(c),
            },
            c if c.is_whitespace() && quote.is_none() => {
                if !current.is_empty() {
                    args.push(std::mem::take(&mut current));
                }
            }
            c => current.push(c),
        }
    }
    if !current.is_empty() {
        args.push(current);
    }
    args
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_cmdline() {
        assert_eq!(split_cmdline("docker ps"), vec!["docker", "ps"]);
        assert_eq!(
            split_cmdline(r#"docker inspect --format "{{.Name}}""#),
            vec!["docker", "inspect", "--format", "{{.Name}}"]
        );
        assert_eq!(split_cmdline(r#"echo 'it"s' a\ b"#), vec!["echo", "it\"s", "a b"]);
        assert!(split_cmdline("").is_empty());
    }

    #[test]
    fn test_find_long_hex_id() {
        let id = "a1b2c3d4e5f6a1b2c3d4e5f6a1b2c3d4e5f6a1b2c3d4e5f6a1b2c3d4e5f6a1b2";
        assert_eq!(find_long_hex_id(&format!("/docker/{id}/cgroup")), Some(id));
        assert_eq!(find_long_hex_id("no hex here"), None);
        assert_eq!(find_long_hex_id("a1b2c3d4e5f6"), None);
        assert_eq!(
            find_long_hex_id(&format!("0::/system.slice/docker-{id}.scope")),
            Some(id)
        );
    }

    #[test]
    fn test_extract_flag_value() {
        assert_eq!(
            extract_flag_value("docker run --name myapp", &["--name"]).as_deref(),
            Some("myapp")
        );
        assert_eq!(extract_flag_value("docker run myapp", &["--name"]), None);
        assert_eq!(extract_flag_value("docker run --name", &["--name"]), None);
    }

    #[test]
    fn test_parse_docker_ps() {
        let out = "abc123|web|nginx:latest|0.0.0.0:8080->80/tcp|shop|frontend\ndef456|other|redis|6379/tcp||\n";
        let m = parse_docker_ps(out).unwrap();
        assert_eq!(m.id, "abc123");
        assert_eq!(m.name, "web");
        assert_eq!(m.ports, "0.0.0.0:8080->80/tcp");
        assert_eq!(m.source_label(), "docker-compose: shop/frontend");

        assert!(parse_docker_ps("").is_none());
        assert!(parse_docker_ps("abc|web|nginx").is_none());
    }

    #[test]
    fn test_format_container_name() {
        assert_eq!(
            format_container_name("/shop-web-1|shop|web\n", ContainerRuntime::Docker).as_deref(),
            Some("docker: shop/web (shop-web-1)")
        );
        assert_eq!(
            format_container_name("/redis||\n", ContainerRuntime::Docker).as_deref(),
            Some("docker: redis")
        );
        assert_eq!(
            format_container_name("db\n", ContainerRuntime::Podman).as_deref(),
            Some("podman: db")
        );
        assert_eq!(
            format_container_name("api-7f9", ContainerRuntime::Kubernetes).as_deref(),
            Some("api-7f9")
        );
        assert_eq!(format_container_name("", ContainerRuntime::Podman), None);
    }

    #[test]
    fn test_bridge_container_for_ip() {
        let out = "web:172.17.0.2/16\ndb:172.17.0.3/16\n\n";
        assert_eq!(
            bridge_container_for_ip(out, "172.17.0.3").as_deref(),
            Some("db")
        );
        assert_eq!(bridge_container_for_ip(out, "172.17.0.9"), None);
    }

    #[test]
    fn test_runtime_from_label() {
        assert_eq!(
            ContainerRuntime::from_label("docker"),
            Some(ContainerRuntime::Docker)
        );
        assert_eq!(
            ContainerRuntime::from_label("docker-compose: shop/web"),
            Some(ContainerRuntime::Docker)
        );
        assert_eq!(
            ContainerRuntime::from_label("podman: db"),
            Some(ContainerRuntime::Podman)
        );
        assert_eq!(
            ContainerRuntime::from_label("jail"),
            Some(ContainerRuntime::Jail)
        );
        assert_eq!(ContainerRuntime::from_label("target: web"), None);
        assert_eq!(ContainerRuntime::from_label(""), None);
    }
}
