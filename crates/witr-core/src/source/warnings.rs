//! Warning rules.
//!
//! Each rule looks at the queried process (last chain element), the whole
//! chain or the classification, and contributes at most one message.
//! Rules run in declaration order and never fail; a missing field simply
//! produces no warning.

use std::collections::BTreeSet;

use chrono::{DateTime, Duration, Utc};
use witr_common::{Health, Process, Source, SourceType};

use crate::collect::net::is_public_bind;

/// Consecutive equal commands above this count trip the restart warning.
const RESTART_THRESHOLD: usize = 5;
const LONG_RUNNING_DAYS: i64 = 90;
const SUSPICIOUS_CWDS: &[&str] = &["/", "/tmp", "/var/tmp"];

/// How an environment rule matches a variable name.
#[derive(Debug, Clone, Copy)]
enum KeyMatch {
    Exact(&'static str),
    Prefix(&'static str),
}

impl KeyMatch {
    fn matches(&self, key: &str) -> bool {
        match self {
            KeyMatch::Exact(k) => key == *k,
            KeyMatch::Prefix(p) => key.starts_with(p),
        }
    }
}

struct EnvRule {
    key: KeyMatch,
    message: &'static str,
    /// Append the matched variable names to the message.
    list_keys: bool,
}

const ENV_RULES: &[EnvRule] = &[
    EnvRule {
        key: KeyMatch::Exact("LD_PRELOAD"),
        message: "Process sets LD_PRELOAD (potential library injection)",
        list_keys: false,
    },
    EnvRule {
        key: KeyMatch::Prefix("DYLD_"),
        message: "Process sets DYLD_* variables (potential library injection)",
        list_keys: true,
    },
];

/// Warnings for `chain` classified as `source`, evaluated now.
pub fn warnings(chain: &[Process], source: &Source) -> Vec<String> {
    warnings_at(chain, source, Utc::now())
}

/// Warnings with an explicit clock, for the age rule.
pub fn warnings_at(chain: &[Process], source: &Source, now: DateTime<Utc>) -> Vec<String> {
    let Some(last) = chain.last() else {
        return Vec::new();
    };
    let mut out = Vec::new();

    if restart_streak(chain) > RESTART_THRESHOLD {
        out.push(format!(
            "Process or ancestor restarted more than {RESTART_THRESHOLD} times"
        ));
    }

    if let Some(msg) = health_warning(last.health) {
        out.push(msg.to_string());
    }

    if last.bind_addresses().into_iter().any(is_public_bind) {
        out.push("Process is listening on a public interface".to_string());
    }

    if last.user == "root" {
        out.push("Process is running as root".to_string());
    }

    if source.source_type == SourceType::Unknown {
        out.push("No known supervisor or service manager detected".to_string());
    }

    if last
        .age(now)
        .is_some_and(|age| age > Duration::days(LONG_RUNNING_DAYS))
    {
        out.push(format!(
            "Process has been running for over {LONG_RUNNING_DAYS} days"
        ));
    }

    if SUSPICIOUS_CWDS.contains(&last.working_dir.as_str()) {
        out.push(format!(
            "Process is running from a suspicious working directory: {}",
            last.working_dir
        ));
    }

    if source.source_type == SourceType::Container {
        out.push("No healthcheck detected for container (best effort)".to_string());
    }

    if let Some(service) = last.service.as_deref() {
        let service = service.strip_suffix(".service").unwrap_or(service);
        if !service.is_empty() && !last.command.is_empty() && service != last.command {
            out.push("Service name and process name do not match".to_string());
        }
    }

    if last.exe_deleted {
        out.push(
            "Process is running from a deleted binary (potential library injection or pending update)"
                .to_string(),
        );
    }

    out.extend(env_warnings(&last.env));
    out
}

/// Messages from the environment rule table, in table order.
pub fn env_warnings(env: &[String]) -> Vec<String> {
    let set: Vec<(&str, &str)> = env
        .iter()
        .filter_map(|entry| entry.split_once('='))
        .filter(|(_, value)| !value.is_empty())
        .collect();

    let mut out = Vec::new();
    for rule in ENV_RULES {
        let keys: BTreeSet<&str> = set
            .iter()
            .map(|(key, _)| *key)
            .filter(|key| rule.key.matches(key))
            .collect();
        if keys.is_empty() {
            continue;
        }
        if rule.list_keys {
            let names: Vec<&str> = keys.into_iter().collect();
            out.push(format!("{}: {}", rule.message, names.join(", ")));
        } else {
            out.push(rule.message.to_string());
        }
    }
    out
}

fn health_warning(health: Health) -> Option<&'static str> {
    match health {
        Health::Zombie => Some("Process is a zombie (defunct)"),
        Health::Stopped => Some("Process is stopped (T state)"),
        Health::HighCpu => Some("Process is using high CPU (>2h total)"),
        Health::HighMem => Some("Process is using high memory (>1GB RSS)"),
        Health::Healthy | Health::Unknown => None,
    }
}

/// Loose restart heuristic: counts chain entries whose command equals
/// the previous entry's command. The count never resets, so it is a
/// total of adjacent repeats rather than one streak.
fn restart_streak(chain: &[Process]) -> usize {
    let mut count = 0;
    let mut last = "";
    for p in chain {
        if p.command == last {
            count += 1;
        }
        last = p.command.as_str();
    }
    count
}
