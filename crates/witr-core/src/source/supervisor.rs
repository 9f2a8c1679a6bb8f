//! Known process supervisors.

use witr_common::Process;

/// Ordered `(key, label)` table. Keys are matched against lowercase
/// command names exactly and against lowercase command lines as whole
/// words; the first key that hits wins.
pub const SUPERVISORS: &[(&str, &str)] = &[
    ("pm2", "pm2"),
    ("pm2 god", "pm2"),
    ("supervisord", "supervisord"),
    ("supervisor", "supervisord"),
    ("gunicorn", "gunicorn"),
    ("uwsgi", "uwsgi"),
    ("s6-supervise", "s6"),
    ("s6", "s6"),
    ("s6-svscan", "s6"),
    ("runsv", "runit"),
    ("runit", "runit"),
    ("runit-init", "runit"),
    ("openrc", "openrc"),
    ("openrc-init", "openrc"),
    ("monit", "monit"),
    ("circusd", "circus"),
    ("circus", "circus"),
    ("systemd", "systemd service"),
    ("systemctl", "systemd service"),
    ("daemontools", "daemontools"),
    ("init", "init"),
    ("initctl", "upstart"),
    ("tini", "tini"),
    ("docker-init", "docker-init"),
    ("podman-init", "podman-init"),
    ("smf", "smf"),
    ("launchd", "launchd"),
    ("god", "god"),
    ("forever", "forever"),
    ("nssm", "nssm"),
];

/// Init processes that are service managers rather than supervisors.
/// They are classified by their own detectors, or not at all for `init`.
const INIT_MANAGERS: &[&str] = &["systemd", "launchd", "init"];

/// Supervisor label for the first ancestor that looks like one.
pub fn find_supervisor(chain: &[Process]) -> Option<&'static str> {
    chain
        .iter()
        .filter(|p| !is_init_manager(p))
        .find_map(supervisor_for)
}

fn is_init_manager(p: &Process) -> bool {
    p.pid == 1 && INIT_MANAGERS.contains(&p.command.as_str())
}

/// Supervisor label matched by a single process.
pub fn supervisor_for(p: &Process) -> Option<&'static str> {
    let command = p.command.to_lowercase();
    let cmdline = p.cmdline.to_lowercase();

    if command.replace(' ', "").contains("pm2") || cmdline.replace(' ', "").contains("pm2") {
        return Some("pm2");
    }
    if let Some((_, label)) = SUPERVISORS.iter().find(|(key, _)| *key == command) {
        return Some(*label);
    }
    SUPERVISORS
        .iter()
        .find(|(key, _)| contains_word(&cmdline, key))
        .map(|(_, label)| *label)
}

/// `key` occurs in `haystack` with no word character on either side.
/// Dashes and underscores count as word characters, so `init` does not
/// hit `docker-init` and `god` does not hit `mongod`.
fn contains_word(haystack: &str, key: &str) -> bool {
    let is_word = |c: char| c.is_ascii_alphanumeric() || c == '-' || c == '_';
    haystack.match_indices(key).any(|(at, _)| {
        let before = haystack[..at].chars().next_back();
        let after = haystack[at + key.len()..].chars().next();
        !before.is_some_and(is_word) && !after.is_some_and(is_word)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock_process::MockProcessBuilder;

    fn proc(pid: u32, command: &str, cmdline: &str) -> Process {
        MockProcessBuilder::new()
            .pid(pid)
            .command(command)
            .cmdline(cmdline)
            .build()
    }

    #[test]
    fn test_exact_command_match() {
        assert_eq!(
            supervisor_for(&proc(10, "supervisord", "/usr/bin/python3 /usr/bin/supervisord")),
            Some("supervisord")
        );
        assert_eq!(supervisor_for(&proc(10, "Gunicorn", "x")), Some("gunicorn"));
        assert_eq!(supervisor_for(&proc(10, "runsv", "runsv nginx")), Some("runit"));
    }

    #[test]
    fn test_pm2_with_spaces_stripped() {
        assert_eq!(
            supervisor_for(&proc(10, "PM2 v5.3.0: God Daemon", "PM2 v5.3.0: God Daemon (/root/.pm2)")),
            Some("pm2")
        );
        assert_eq!(
            supervisor_for(&proc(10, "node", "node /usr/lib/node_modules/p m2/bin")),
            Some("pm2")
        );
    }

    #[test]
    fn test_cmdline_substring_in_table_order() {
        assert_eq!(
            supervisor_for(&proc(10, "python3", "/usr/bin/python3 /usr/local/bin/circusd circus.ini")),
            Some("circus")
        );
        assert_eq!(supervisor_for(&proc(10, "nginx", "nginx -g daemon off;")), None);
    }

    #[test]
    fn test_short_keys_match_whole_words_only() {
        assert_eq!(supervisor_for(&proc(10, "mongod", "/usr/bin/mongod --fork")), None);
        assert_eq!(supervisor_for(&proc(10, "bash", "bash /opt/s6tool/run")), None);
        assert_eq!(
            supervisor_for(&proc(10, "journald", "/usr/lib/systemd-journald")),
            None
        );
        assert_eq!(
            supervisor_for(&proc(10, "sh", "/sbin/docker-init -- /app")),
            Some("docker-init")
        );
        assert_eq!(
            supervisor_for(&proc(10, "sh", "/bin/s6-svscan /run/service")),
            Some("s6")
        );
        assert_eq!(
            supervisor_for(&proc(10, "ruby", "ruby /usr/bin/god -c app.god")),
            Some("god")
        );
    }

    #[test]
    fn test_contains_word() {
        assert!(contains_word("/sbin/init", "init"));
        assert!(contains_word("pm2 god daemon", "pm2 god"));
        assert!(!contains_word("initctl start", "init"));
        assert!(!contains_word("runit-init", "init"));
        assert!(contains_word("init init", "init"));
    }

    #[test]
    fn test_init_root_is_not_a_supervisor() {
        let chain = vec![
            proc(1, "init", "/sbin/init"),
            proc(80, "cron", "/usr/sbin/cron -f"),
        ];
        assert_eq!(find_supervisor(&chain), None);

        // Only PID 1 is exempt.
        let chain = vec![proc(1, "systemd", "/sbin/init"), proc(90, "init", "init")];
        assert_eq!(find_supervisor(&chain), Some("init"));
    }

    #[test]
    fn test_init_manager_root_is_skipped() {
        let chain = vec![
            proc(1, "systemd", "/sbin/init splash"),
            proc(400, "sshd", "sshd: /usr/sbin/sshd -D"),
        ];
        assert_eq!(find_supervisor(&chain), None);
    }

    #[test]
    fn test_first_ancestor_wins() {
        let chain = vec![
            proc(1, "systemd", "/sbin/init"),
            proc(300, "supervisord", "/usr/bin/supervisord -n"),
            proc(310, "tini", "tini -- app"),
        ];
        assert_eq!(find_supervisor(&chain), Some("supervisord"));
    }
}
