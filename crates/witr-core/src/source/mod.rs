//! Source classification.
//!
//! [`detect`] labels the mechanism that caused the last process of an
//! ancestry chain to run. Detectors are tried in a fixed order and the
//! first hit wins:
//!
//! 1. container membership of any ancestor
//! 2. a known supervisor anywhere in the chain
//! 3. `systemd` as PID 1
//! 4. `launchd` as PID 1
//! 5. `cron`/`crond` anywhere in the chain
//! 6. an interactive shell anywhere in the chain
//!
//! Everything here is a pure function of the chain.

pub mod socket;
pub mod supervisor;
pub mod warnings;

use witr_common::{Process, Source, SourceType};

use crate::collect::container::ContainerRuntime;

pub use socket::socket_info;
pub use supervisor::{find_supervisor, supervisor_for, SUPERVISORS};
pub use warnings::{env_warnings, warnings, warnings_at};

const CRON_NAMES: &[&str] = &["cron", "crond"];
const SHELLS: &[&str] = &["bash", "zsh", "sh", "fish"];

type Detector = fn(&[Process]) -> Option<Source>;

const DETECTORS: &[Detector] = &[
    detect_container,
    detect_supervisor,
    detect_systemd,
    detect_launchd,
    detect_cron,
    detect_shell,
];

/// Classify an ancestry chain (root first).
pub fn detect(chain: &[Process]) -> Source {
    DETECTORS
        .iter()
        .find_map(|detector| detector(chain))
        .unwrap_or_else(Source::unknown)
}

fn detect_container(chain: &[Process]) -> Option<Source> {
    chain
        .iter()
        .filter_map(|p| p.container.as_deref())
        .find_map(ContainerRuntime::from_label)
        .map(|runtime| Source::new(SourceType::Container, runtime.as_str()))
}

fn detect_supervisor(chain: &[Process]) -> Option<Source> {
    find_supervisor(chain).map(|label| Source::new(SourceType::Supervisor, label))
}

fn root_is(chain: &[Process], name: &str) -> bool {
    chain
        .first()
        .is_some_and(|root| root.pid == 1 && root.command == name)
}

fn detect_systemd(chain: &[Process]) -> Option<Source> {
    root_is(chain, "systemd").then(|| Source::new(SourceType::Systemd, "systemd"))
}

fn detect_launchd(chain: &[Process]) -> Option<Source> {
    root_is(chain, "launchd").then(|| Source::new(SourceType::Launchd, "launchd"))
}

fn detect_cron(chain: &[Process]) -> Option<Source> {
    chain
        .iter()
        .any(|p| CRON_NAMES.contains(&p.command.as_str()))
        .then(|| Source::new(SourceType::Cron, "cron"))
}

fn detect_shell(chain: &[Process]) -> Option<Source> {
    chain
        .iter()
        .find(|p| SHELLS.contains(&p.command.as_str()))
        .map(|p| Source::new(SourceType::Shell, p.command.clone()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock_process::MockProcessBuilder;

    fn proc(pid: u32, ppid: u32, command: &str) -> Process {
        MockProcessBuilder::new().pid(pid).ppid(ppid).command(command).build()
    }

    #[test]
    fn test_systemd_root() {
        let chain = vec![
            proc(1, 0, "systemd"),
            proc(400, 1, "sshd"),
            proc(500, 400, "bash"),
            proc(600, 500, "nginx"),
        ];
        let source = detect(&chain);
        assert_eq!(source.source_type, SourceType::Systemd);
        assert_eq!(source.name, "systemd");
    }

    #[test]
    fn test_container_beats_systemd() {
        let mut app = proc(900, 800, "node");
        app.container = Some("docker".to_string());
        let chain = vec![proc(1, 0, "systemd"), proc(800, 1, "containerd-shim"), app];
        let source = detect(&chain);
        assert_eq!(source.source_type, SourceType::Container);
        assert_eq!(source.name, "docker");
    }

    #[test]
    fn test_container_label_with_name() {
        let mut app = proc(900, 1, "node");
        app.container = Some("docker-compose: shop/web".to_string());
        assert_eq!(detect(&[app]).name, "docker");
    }

    #[test]
    fn test_proxy_target_is_not_a_container() {
        let mut proxy = proc(700, 1, "docker-proxy");
        proxy.container = Some("target: web".to_string());
        let chain = vec![proc(1, 0, "systemd"), proxy];
        assert_eq!(detect(&chain).source_type, SourceType::Systemd);
    }

    #[test]
    fn test_supervisor_beats_shell() {
        let chain = vec![
            proc(1, 0, "launchd"),
            proc(300, 1, "supervisord"),
            proc(310, 300, "sh"),
            proc(320, 310, "python3"),
        ];
        let source = detect(&chain);
        assert_eq!(source.source_type, SourceType::Supervisor);
        assert_eq!(source.name, "supervisord");
    }

    #[test]
    fn test_launchd_root() {
        let chain = vec![proc(1, 0, "launchd"), proc(88, 1, "mysqld")];
        assert_eq!(detect(&chain).source_type, SourceType::Launchd);
    }

    #[test]
    fn test_cron_and_shell() {
        let chain = vec![proc(5, 0, "kthreadd"), proc(20, 5, "crond"), proc(21, 20, "sh")];
        let source = detect(&chain);
        assert_eq!(source.source_type, SourceType::Cron);
        assert_eq!(source.name, "cron");

        let chain = vec![proc(5, 0, "tmux"), proc(21, 5, "zsh"), proc(22, 21, "vim")];
        let source = detect(&chain);
        assert_eq!(source.source_type, SourceType::Shell);
        assert_eq!(source.name, "zsh");
    }

    #[test]
    fn test_init_root_falls_through_to_cron_and_shell() {
        let chain = vec![proc(1, 0, "init"), proc(80, 1, "cron"), proc(81, 80, "backup")];
        assert_eq!(detect(&chain).source_type, SourceType::Cron);

        let chain = vec![
            proc(1, 0, "init"),
            proc(400, 1, "sshd"),
            proc(500, 400, "zsh"),
            proc(600, 500, "vim"),
        ];
        let source = detect(&chain);
        assert_eq!(source.source_type, SourceType::Shell);
        assert_eq!(source.name, "zsh");

        let chain = vec![proc(1, 0, "init"), proc(90, 1, "nginx")];
        assert_eq!(detect(&chain), Source::unknown());
    }

    #[test]
    fn test_unknown() {
        let chain = vec![proc(77, 0, "kthreadd"), proc(78, 77, "worker")];
        assert_eq!(detect(&chain), Source::unknown());
        assert_eq!(detect(&[]), Source::unknown());
    }
}
