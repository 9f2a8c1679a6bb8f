//! Parsers for /proc filesystem files.
//!
//! All functions take file content, not paths, so they run on any host
//! and can be fed fixtures.
//!
//! # Files Parsed
//! - `/proc/[pid]/stat` - State, parent, CPU times, start ticks, RSS
//! - `/proc/[pid]/status` - Uid, thread count
//! - `/proc/[pid]/cmdline`, `/proc/[pid]/environ` - NUL separated strings
//! - `/proc/[pid]/io`, `/proc/[pid]/statm`, `/proc/[pid]/limits` - Verbose figures
//! - `/proc/stat` - Boot time
//! - `/proc/locks` - Advisory and mandatory file locks
//! - `/etc/passwd` - Uid to user name

use witr_common::Health;

/// CPU time above which a process is flagged `high-cpu` (2 hours).
pub const HIGH_CPU_SECONDS: u64 = 2 * 60 * 60;

/// Resident set above which a process is flagged `high-mem` (1 GiB).
pub const HIGH_MEM_BYTES: u64 = 1024 * 1024 * 1024;

/// Fields of /proc/[pid]/stat that witr uses.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatFields {
    pub comm: String,
    pub state: char,
    pub ppid: u32,
    /// User CPU time in clock ticks.
    pub utime: u64,
    /// System CPU time in clock ticks.
    pub stime: u64,
    /// Start time in clock ticks since boot.
    pub starttime: u64,
    /// Resident set size in pages.
    pub rss_pages: u64,
}

/// Parse /proc/[pid]/stat content.
///
/// The command name is wrapped in parentheses and may itself contain
/// spaces and parentheses, so fields are counted from the last `)`.
pub fn parse_stat(content: &str) -> Option<StatFields> {
    let open = content.find('(')?;
    let close = content.rfind(')')?;
    if close < open {
        return None;
    }
    let comm = content[open + 1..close].to_string();
    let rest = content.get(close + 2..)?;
    let fields: Vec<&str> = rest.split_whitespace().collect();
    if fields.len() < 22 {
        return None;
    }

    Some(StatFields {
        comm,
        state: fields[0].chars().next()?,
        ppid: fields[1].parse().ok()?,
        utime: fields[11].parse().ok()?,
        stime: fields[12].parse().ok()?,
        starttime: fields[19].parse().ok()?,
        rss_pages: fields[21].parse().unwrap_or(0),
    })
}

/// Health from stat fields.
///
/// Later checks win, so a zombie that also crossed the memory threshold
/// reports `high-mem`.
pub fn health_from_stat(stat: &StatFields, clk_tck: u64, page_size: u64) -> Health {
    let mut health = Health::Healthy;
    match stat.state {
        'Z' => health = Health::Zombie,
        'T' => health = Health::Stopped,
        _ => {}
    }

    if clk_tck > 0 {
        let cpu_seconds = stat.utime.saturating_add(stat.stime) / clk_tck;
        if cpu_seconds > HIGH_CPU_SECONDS {
            health = Health::HighCpu;
        }
    }

    if stat.rss_pages.saturating_mul(page_size) > HIGH_MEM_BYTES {
        health = Health::HighMem;
    }

    health
}

/// Join NUL-separated argv into one space-separated line.
pub fn parse_cmdline(content: &[u8]) -> String {
    String::from_utf8_lossy(content)
        .replace('\0', " ")
        .trim()
        .to_string()
}

/// Split NUL-separated environ into `KEY=value` entries.
pub fn parse_environ(content: &[u8]) -> Vec<String> {
    content
        .split(|&b| b == 0)
        .filter(|entry| !entry.is_empty())
        .map(|entry| String::from_utf8_lossy(entry).into_owned())
        .collect()
}

/// Real uid from /proc/[pid]/status.
pub fn parse_status_uid(content: &str) -> Option<u32> {
    status_field(content, "Uid:")?
        .split_whitespace()
        .next()?
        .parse()
        .ok()
}

/// Thread count from /proc/[pid]/status.
pub fn parse_status_threads(content: &str) -> Option<u64> {
    status_field(content, "Threads:")?.trim().parse().ok()
}

fn status_field<'a>(content: &'a str, key: &str) -> Option<&'a str> {
    content
        .lines()
        .find_map(|line| line.strip_prefix(key))
}

/// Look up a user name by uid in passwd-format content.
pub fn lookup_passwd(content: &str, uid: u32) -> Option<String> {
    content.lines().find_map(|line| {
        let mut parts = line.split(':');
        let name = parts.next()?;
        let _password = parts.next()?;
        let line_uid: u32 = parts.next()?.parse().ok()?;
        (line_uid == uid && !name.is_empty()).then(|| name.to_string())
    })
}

/// Boot time (seconds since the epoch) from /proc/stat.
pub fn parse_btime(content: &str) -> Option<i64> {
    content
        .lines()
        .find_map(|line| line.strip_prefix("btime "))
        .and_then(|v| v.trim().parse().ok())
}

/// `(read_bytes, write_bytes)` from /proc/[pid]/io.
pub fn parse_io(content: &str) -> (Option<u64>, Option<u64>) {
    let mut read = None;
    let mut write = None;
    for line in content.lines() {
        let Some((key, value)) = line.split_once(':') else {
            continue;
        };
        let Ok(value) = value.trim().parse::<u64>() else {
            continue;
        };
        match key.trim() {
            "read_bytes" => read = Some(value),
            "write_bytes" => write = Some(value),
            _ => {}
        }
    }
    (read, write)
}

/// `(size, resident, shared)` in bytes from /proc/[pid]/statm.
pub fn parse_statm(content: &str, page_size: u64) -> Option<(u64, u64, u64)> {
    let parts: Vec<u64> = content
        .split_whitespace()
        .take(3)
        .map(|p| p.parse().ok())
        .collect::<Option<Vec<_>>>()?;
    if parts.len() < 3 {
        return None;
    }
    Some((
        parts[0].saturating_mul(page_size),
        parts[1].saturating_mul(page_size),
        parts[2].saturating_mul(page_size),
    ))
}

/// Soft limit on open files from /proc/[pid]/limits.
pub fn parse_limits_nofile(content: &str) -> Option<u64> {
    let line = content
        .lines()
        .find(|l| l.starts_with("Max open files"))?;
    line["Max open files".len()..]
        .split_whitespace()
        .next()?
        .parse()
        .ok()
}

/// One row of /proc/locks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LockEntry {
    pub pid: u32,
    pub major: u32,
    pub minor: u32,
    pub inode: u64,
}

/// Parse /proc/locks.
///
/// ```text
/// 1: POSIX  ADVISORY  WRITE 1234 08:02:131090 0 EOF
/// 1: -> POSIX  ADVISORY  WRITE 1240 08:02:131090 0 EOF
/// ```
/// Blocked waiters (`->`) are listed too; they hold the file open.
pub fn parse_locks(content: &str) -> Vec<LockEntry> {
    content
        .lines()
        .filter_map(|line| {
            let fields: Vec<&str> = line
                .split_whitespace()
                .filter(|f| *f != "->")
                .collect();
            if fields.len() < 6 {
                return None;
            }
            let pid = fields[4].parse().ok()?;
            let mut dev = fields[5].split(':');
            let major = u32::from_str_radix(dev.next()?, 16).ok()?;
            let minor = u32::from_str_radix(dev.next()?, 16).ok()?;
            let inode = dev.next()?.parse().ok()?;
            Some(LockEntry {
                pid,
                major,
                minor,
                inode,
            })
        })
        .collect()
}

/// Split a Linux `dev_t` into `(major, minor)`.
pub fn dev_major_minor(dev: u64) -> (u32, u32) {
    let major = ((dev >> 8) & 0xfff) | ((dev >> 32) & !0xfff);
    let minor = (dev & 0xff) | ((dev >> 12) & !0xff);
    (major as u32, minor as u32)
}

/// Container runtime named by /proc/[pid]/cgroup content.
pub fn container_from_cgroup(content: &str) -> Option<&'static str> {
    if content.contains("docker") {
        Some("docker")
    } else if content.contains("podman") || content.contains("libpod") {
        Some("podman")
    } else if content.contains("kubepods") {
        Some("kubernetes")
    } else if content.contains("colima") {
        Some("colima")
    } else if content.contains("containerd") {
        Some("containerd")
    } else {
        None
    }
}
