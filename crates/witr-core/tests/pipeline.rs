//! End-to-end query scenarios over an in-memory process table.

use witr_common::{Error, Health, SourceType, Target};
use witr_core::app::{explain, ExplainOptions, Outcome};
use witr_core::exit_codes::ExitCode;
use witr_core::mock_process::{MockProcessBuilder, MockSource};
use witr_core::output::{report_text, View};

fn report(outcome: Outcome) -> witr_common::QueryResult {
    match outcome {
        Outcome::Report(r) => *r,
        other => panic!("expected report, got {:?}", other),
    }
}

/// systemd → sshd → bash → nginx, nginx running as root on port 80.
fn ssh_session() -> MockSource {
    MockSource::new()
        .with_chain([
            MockProcessBuilder::new().pid(1).ppid(0).command("systemd").root().build(),
            MockProcessBuilder::new().pid(400).ppid(1).command("sshd").root().build(),
            MockProcessBuilder::new().pid(500).ppid(400).command("bash").build(),
            MockProcessBuilder::new()
                .pid(600)
                .ppid(500)
                .command("nginx")
                .root()
                .listening("127.0.0.1", 80)
                .build(),
        ])
        .with_listeners(80, &[600])
}

#[test]
fn systemd_rooted_chain_with_root_user() {
    let r = report(explain(&ssh_session(), &Target::pid(600), &ExplainOptions::default()).unwrap());
    assert_eq!(r.source.source_type, SourceType::Systemd);
    assert!(r.warnings.contains(&"Process is running as root".to_string()));
    let commands: Vec<&str> = r.ancestry.iter().map(|p| p.command.as_str()).collect();
    assert_eq!(commands, vec!["systemd", "sshd", "bash", "nginx"]);
}

#[test]
fn container_beats_systemd() {
    let src = MockSource::new().with_chain([
        MockProcessBuilder::new().pid(1).ppid(0).command("systemd").build(),
        MockProcessBuilder::new().pid(900).ppid(1).command("containerd-shim").build(),
        MockProcessBuilder::new()
            .pid(901)
            .ppid(900)
            .command("postgres")
            .container("docker")
            .build(),
    ]);
    let r = report(explain(&src, &Target::pid(901), &ExplainOptions::default()).unwrap());
    assert_eq!(r.source.source_type, SourceType::Container);
    assert_eq!(r.source.name, "docker");
    assert!(r
        .warnings
        .contains(&"No healthcheck detected for container (best effort)".to_string()));
}

#[test]
fn hidden_socket_owner_is_owner_not_detected() {
    let src = ssh_session().with_listeners(8443, &[]);
    let err = explain(&src, &Target::port(8443), &ExplainOptions::default()).unwrap_err();
    assert!(matches!(err, Error::OwnerNotDetected { port: 8443 }));
    assert_eq!(ExitCode::for_error(&err), ExitCode::PermissionError);

    let missing = explain(&src, &Target::port(9), &ExplainOptions::default()).unwrap_err();
    assert!(matches!(missing, Error::NotFound(_)));
    assert_eq!(ExitCode::for_error(&missing), ExitCode::NotFound);
}

#[test]
fn pm2_name_query_is_not_duplicated() {
    let src = MockSource::new().with_chain([
        MockProcessBuilder::new().pid(1).ppid(0).command("systemd").build(),
        MockProcessBuilder::new()
            .pid(700)
            .ppid(1)
            .command("pm2")
            .cmdline("PM2 v5.3.0: God Daemon (/root/.pm2)")
            .build(),
    ]);
    let r = report(explain(&src, &Target::name("pm2"), &ExplainOptions::default()).unwrap());
    assert_eq!(r.pid, 700);
    assert_eq!(r.source.source_type, SourceType::Supervisor);
}

#[test]
fn service_entry_is_listed_first_when_ambiguous() {
    let src = MockSource::new()
        .with_chain([
            MockProcessBuilder::new().pid(1).ppid(0).command("systemd").build(),
            MockProcessBuilder::new().pid(300).ppid(1).command("redis-server").build(),
        ])
        .with_process(MockProcessBuilder::new().pid(250).ppid(1).command("redis-server").build())
        .with_service("redis", 300);
    let outcome = explain(&src, &Target::name("redis"), &ExplainOptions::default()).unwrap();
    match &outcome {
        Outcome::Ambiguous(list) => {
            let pids: Vec<u32> = list.iter().map(|c| c.pid).collect();
            assert_eq!(pids, vec![300, 250]);
        }
        other => panic!("expected ambiguous, got {:?}", other),
    }

    let err = outcome.ambiguity().unwrap();
    assert!(matches!(&err, Error::AmbiguousMatch { pids } if pids == &vec![300, 250]));
    assert_eq!(err.to_string(), "multiple matching processes found: 300, 250");
    assert_eq!(ExitCode::for_error(&err), ExitCode::Ambiguous);
}

#[test]
fn process_dying_mid_walk_keeps_partial_chain() {
    let mut src = ssh_session();
    src.kill(400);
    let r = report(explain(&src, &Target::pid(600), &ExplainOptions::default()).unwrap());
    let pids: Vec<u32> = r.ancestry.iter().map(|p| p.pid).collect();
    assert_eq!(pids, vec![500, 600]);
    assert!(r.partial_ancestry);
    assert_eq!(r.source.source_type, SourceType::Shell);
}

#[test]
fn zombie_under_cron() {
    let src = MockSource::new().with_chain([
        MockProcessBuilder::new().pid(1).ppid(0).command("init").build(),
        MockProcessBuilder::new().pid(80).ppid(1).command("cron").build(),
        MockProcessBuilder::new().pid(81).ppid(80).command("backup").zombie().build(),
    ]);
    let r = report(explain(&src, &Target::pid(81), &ExplainOptions::default()).unwrap());
    assert_eq!(r.source.source_type, SourceType::Cron);
    assert_eq!(r.process().unwrap().health, Health::Zombie);
    assert_eq!(r.warnings[0], "Process is a zombie (defunct)");
}

#[test]
fn rendered_report_matches_result() {
    let r = report(explain(&ssh_session(), &Target::port(80), &ExplainOptions::default()).unwrap());
    let text = report_text(&r, View::Short, false, false, chrono::Utc::now());
    assert_eq!(
        text,
        "systemd (pid 1) → sshd (pid 400) → bash (pid 500) → nginx (pid 600)\n"
    );
}

#[test]
fn file_query_names_the_lock_holder() {
    let src = ssh_session().with_file("/var/lib/dpkg/lock", &[500]);
    let r = report(
        explain(&src, &Target::file("/var/lib/dpkg/lock"), &ExplainOptions::default()).unwrap(),
    );
    assert_eq!(r.pid, 500);
    assert_eq!(r.resolved_target, "bash");

    let err = explain(&src, &Target::file("/etc/hosts"), &ExplainOptions::default()).unwrap_err();
    assert!(matches!(err, Error::NotFound(_)));
}

#[test]
fn own_pids_are_never_matched_by_name() {
    let src = ssh_session()
        .with_process(
            MockProcessBuilder::new()
                .pid(4000)
                .ppid(500)
                .command("witr")
                .cmdline("witr nginx")
                .build(),
        )
        .with_self_pids(&[4000, 500]);
    let r = report(explain(&src, &Target::name("nginx"), &ExplainOptions::default()).unwrap());
    assert_eq!(r.pid, 600);
}

#[test]
fn container_name_is_attached_as_detail() {
    let src = ssh_session().with_container_label(600, "web");
    let r = report(explain(&src, &Target::pid(600), &ExplainOptions::default()).unwrap());
    assert_eq!(r.source.details.get("container").map(String::as_str), Some("web"));
    let text = report_text(&r, View::Standard, false, false, chrono::Utc::now());
    assert!(text.contains("Container : web"));
}
