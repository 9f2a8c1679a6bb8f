//! Bounded execution of external OS tools.
//!
//! ps, lsof, systemctl, launchctl, docker and the Windows tools are all
//! started through [`ToolRunner`]. Commands get an argument vector (never a
//! shell), a cleared environment with a C locale, a deadline and a cap on
//! captured bytes. A child that outlives its deadline gets SIGTERM and then
//! SIGKILL.
//!
//! Callers treat a missing, failing or slow tool as "no data", so the usual
//! entry point is [`ToolRunner::stdout_of`], which folds all of those into
//! `None`.
//!
//! ```ignore
//! use witr_core::collect::tool_runner::{ToolRunner, ToolSpec};
//!
//! let runner = ToolRunner::with_defaults();
//! let spec = ToolSpec::new("ps", ["-p", "1", "-o", "comm="]).with_env("TZ", "UTC");
//! if let Some(out) = runner.stdout_of(&spec) {
//!     println!("{}", out.trim());
//! }
//! ```

use std::io::Read;
use std::path::Path;
use std::process::{Child, Command, Stdio};
use std::thread;
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::{debug, instrument, trace, warn};

pub const DEFAULT_TIMEOUT_MS: u64 = 3000;

/// Per-stream capture limit (4 MiB).
pub const DEFAULT_MAX_OUTPUT_BYTES: usize = 4 * 1024 * 1024;

#[cfg(unix)]
const TERM_GRACE: Duration = Duration::from_millis(200);

const POLL_INTERVAL: Duration = Duration::from_millis(10);
const CHUNK: usize = 8192;

/// Why a tool could not be run at all.
#[derive(Debug, Error)]
pub enum ToolError {
    #[error("command not found: {0}")]
    NotFound(String),

    #[error("refusing to run {0:?}: {1}")]
    Rejected(String, &'static str),

    #[error("failed to start {command}: {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("I/O error while waiting for tool: {0}")]
    Io(#[from] std::io::Error),
}

impl From<ToolError> for witr_common::Error {
    fn from(err: ToolError) -> Self {
        witr_common::Error::Tool(err.to_string())
    }
}

/// What a finished (or killed) tool left behind.
#[derive(Debug, Clone, Default)]
pub struct ToolOutput {
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
    /// `None` when the child died from a signal.
    pub exit_code: Option<i32>,
    /// At least one stream hit the byte cap.
    pub truncated: bool,
    pub timed_out: bool,
    pub elapsed: Duration,
}

impl ToolOutput {
    pub fn stdout_str(&self) -> String {
        String::from_utf8_lossy(&self.stdout).into_owned()
    }

    pub fn stderr_str(&self) -> String {
        String::from_utf8_lossy(&self.stderr).into_owned()
    }

    /// Exited 0 before the deadline.
    pub fn success(&self) -> bool {
        !self.timed_out && self.exit_code == Some(0)
    }
}

/// Limits shared by every call of one runner.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolConfig {
    pub default_timeout: Duration,
    pub max_output_bytes: usize,
}

impl Default for ToolConfig {
    fn default() -> Self {
        Self {
            default_timeout: Duration::from_millis(DEFAULT_TIMEOUT_MS),
            max_output_bytes: DEFAULT_MAX_OUTPUT_BYTES,
        }
    }
}

/// One invocation: program, arguments and per-call overrides.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolSpec {
    pub command: String,
    pub args: Vec<String>,
    /// Added on top of the cleared environment (e.g. `TZ=UTC`).
    pub env: Vec<(String, String)>,
    pub timeout: Option<Duration>,
    pub max_output: Option<usize>,
}

impl ToolSpec {
    pub fn new<I, S>(command: impl Into<String>, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            command: command.into(),
            args: args.into_iter().map(Into::into).collect(),
            env: Vec::new(),
            timeout: None,
            max_output: None,
        }
    }

    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn with_max_output(mut self, max_output: usize) -> Self {
        self.max_output = Some(max_output);
        self
    }
}

/// Runs external tools under one [`ToolConfig`].
#[derive(Debug, Clone, Default)]
pub struct ToolRunner {
    config: ToolConfig,
}

impl ToolRunner {
    pub fn new(config: ToolConfig) -> Self {
        Self { config }
    }

    pub fn with_defaults() -> Self {
        Self::new(ToolConfig::default())
    }

    pub fn config(&self) -> &ToolConfig {
        &self.config
    }

    /// Stdout of a clean, in-time exit; `None` for anything else.
    pub fn stdout_of(&self, spec: &ToolSpec) -> Option<String> {
        match self.run(spec) {
            Ok(output) if output.success() => Some(output.stdout_str()),
            Ok(output) => {
                debug!(
                    command = %spec.command,
                    exit_code = ?output.exit_code,
                    timed_out = output.timed_out,
                    "tool produced no usable output"
                );
                None
            }
            Err(e) => {
                debug!(command = %spec.command, error = %e, "tool unavailable");
                None
            }
        }
    }

    /// [`stdout_of`](Self::stdout_of) with default limits.
    pub fn text(&self, cmd: &str, args: &[&str]) -> Option<String> {
        self.stdout_of(&ToolSpec::new(cmd, args.iter().copied()))
    }

    #[instrument(level = "debug", skip(self), fields(cmd = %spec.command))]
    pub fn run(&self, spec: &ToolSpec) -> Result<ToolOutput, ToolError> {
        check_command(&spec.command)?;

        let timeout = spec.timeout.unwrap_or(self.config.default_timeout);
        let cap = spec.max_output.unwrap_or(self.config.max_output_bytes);
        trace!(args = ?spec.args, timeout_ms = timeout.as_millis() as u64, cap, "spawning tool");

        let started = Instant::now();
        let mut child = command_for(spec)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|source| {
                if source.kind() == std::io::ErrorKind::NotFound {
                    ToolError::NotFound(spec.command.clone())
                } else {
                    ToolError::Spawn {
                        command: spec.command.clone(),
                        source,
                    }
                }
            })?;

        let mut output = capture(&mut child, started + timeout, cap)?;
        output.elapsed = started.elapsed();

        if output.timed_out {
            warn!(command = %spec.command, timeout_ms = timeout.as_millis() as u64, "tool timed out");
        } else {
            trace!(
                exit_code = ?output.exit_code,
                elapsed_ms = output.elapsed.as_millis() as u64,
                truncated = output.truncated,
                "tool finished"
            );
        }
        Ok(output)
    }
}

/// Whether `cmd` resolves to a file on `PATH` (or exists, if a path).
pub fn is_available(cmd: &str) -> bool {
    let candidate = Path::new(cmd);
    if candidate.components().count() > 1 {
        return candidate.is_file();
    }
    let Some(paths) = std::env::var_os("PATH") else {
        return false;
    };
    std::env::split_paths(&paths).any(|dir| {
        let full = dir.join(cmd);
        full.is_file() || (cfg!(windows) && full.with_extension("exe").is_file())
    })
}

fn check_command(cmd: &str) -> Result<(), ToolError> {
    if cmd.is_empty() {
        return Err(ToolError::Rejected(cmd.to_string(), "empty command"));
    }
    if cmd.contains(['|', '&', ';', '$', '`', '<', '>', '\n', '\r']) {
        return Err(ToolError::Rejected(
            cmd.to_string(),
            "shell metacharacters in command name",
        ));
    }
    if Path::new(cmd).is_absolute() && !Path::new(cmd).exists() {
        return Err(ToolError::NotFound(cmd.to_string()));
    }
    Ok(())
}

fn command_for(spec: &ToolSpec) -> Command {
    let mut command = Command::new(&spec.command);
    command.args(&spec.args);

    // Windows tools need SystemRoot and friends; only unix gets a clean slate.
    #[cfg(unix)]
    {
        command.env_clear();
        if let Some(path) = std::env::var_os("PATH") {
            command.env("PATH", path);
        }
        command.env("LC_ALL", "C").env("LANG", "C");
    }

    for (key, value) in &spec.env {
        command.env(key, value);
    }
    command
}

/// Append up to the cap; remember when something was dropped.
fn push_capped(buf: &mut Vec<u8>, data: &[u8], cap: usize, truncated: &mut bool) {
    let room = cap.saturating_sub(buf.len());
    buf.extend_from_slice(&data[..data.len().min(room)]);
    if data.len() > room {
        *truncated = true;
    }
}

/// Poll both pipes without blocking until the child exits or the deadline
/// passes.
#[cfg(unix)]
fn capture(child: &mut Child, deadline: Instant, cap: usize) -> Result<ToolOutput, ToolError> {
    let mut out = ToolOutput::default();
    let mut stdout = child.stdout.take();
    let mut stderr = child.stderr.take();
    let mut chunk = vec![0u8; CHUNK];

    loop {
        if Instant::now() >= deadline {
            terminate(child);
            out.exit_code = child.wait().ok().and_then(|s| s.code());
            out.timed_out = true;
            return Ok(out);
        }

        let mut progressed = false;
        if let Some(pipe) = stdout.as_mut() {
            let n = read_available(pipe, &mut chunk).unwrap_or(0);
            progressed |= n > 0;
            push_capped(&mut out.stdout, &chunk[..n], cap, &mut out.truncated);
        }
        if let Some(pipe) = stderr.as_mut() {
            let n = read_available(pipe, &mut chunk).unwrap_or(0);
            progressed |= n > 0;
            push_capped(&mut out.stderr, &chunk[..n], cap, &mut out.truncated);
        }

        if let Some(status) = child.try_wait()? {
            // A grandchild may still hold the pipe open; take only what is
            // already buffered.
            if let Some(pipe) = stdout.as_mut() {
                drain(pipe, &mut out.stdout, cap, &mut out.truncated);
            }
            if let Some(pipe) = stderr.as_mut() {
                drain(pipe, &mut out.stderr, cap, &mut out.truncated);
            }
            out.exit_code = status.code();
            return Ok(out);
        }
        if !progressed {
            thread::sleep(POLL_INTERVAL);
        }
    }
}

/// Without portable non-blocking reads, each pipe gets a reader thread.
#[cfg(not(unix))]
fn capture(child: &mut Child, deadline: Instant, cap: usize) -> Result<ToolOutput, ToolError> {
    fn reader<R: Read + Send + 'static>(
        pipe: Option<R>,
        cap: usize,
    ) -> thread::JoinHandle<(Vec<u8>, bool)> {
        thread::spawn(move || {
            let (mut buf, mut truncated) = (Vec::new(), false);
            if let Some(mut pipe) = pipe {
                let mut chunk = vec![0u8; CHUNK];
                while let Ok(n) = pipe.read(&mut chunk) {
                    if n == 0 {
                        break;
                    }
                    push_capped(&mut buf, &chunk[..n], cap, &mut truncated);
                }
            }
            (buf, truncated)
        })
    }

    let stdout = reader(child.stdout.take(), cap);
    let stderr = reader(child.stderr.take(), cap);

    let mut out = ToolOutput::default();
    out.exit_code = loop {
        if let Some(status) = child.try_wait()? {
            break status.code();
        }
        if Instant::now() >= deadline {
            out.timed_out = true;
            terminate(child);
            break child.wait().ok().and_then(|s| s.code());
        }
        thread::sleep(POLL_INTERVAL);
    };

    let (buf, cut) = stdout.join().unwrap_or_default();
    out.stdout = buf;
    out.truncated |= cut;
    let (buf, cut) = stderr.join().unwrap_or_default();
    out.stderr = buf;
    out.truncated |= cut;
    Ok(out)
}

#[cfg(unix)]
fn drain<R: Read + std::os::unix::io::AsRawFd>(
    pipe: &mut R,
    buf: &mut Vec<u8>,
    cap: usize,
    truncated: &mut bool,
) {
    let mut chunk = vec![0u8; CHUNK];
    while !*truncated {
        match read_available(pipe, &mut chunk) {
            Ok(0) | Err(_) => break,
            Ok(n) => push_capped(buf, &chunk[..n], cap, truncated),
        }
    }
}

/// SIGTERM, a short grace period, then SIGKILL.
#[cfg(unix)]
fn terminate(child: &mut Child) {
    let pid = child.id() as libc::pid_t;
    // SAFETY: pid is our own unreaped child, so it cannot have been reused.
    unsafe {
        libc::kill(pid, libc::SIGTERM);
    }
    thread::sleep(TERM_GRACE);
    if let Ok(None) = child.try_wait() {
        debug!(pid, "tool ignored SIGTERM; sending SIGKILL");
        // SAFETY: as above.
        unsafe {
            libc::kill(pid, libc::SIGKILL);
        }
    }
}

#[cfg(not(unix))]
fn terminate(child: &mut Child) {
    let _ = child.kill();
}

/// One read with O_NONBLOCK set for its duration. `Ok(0)` when nothing
/// is buffered.
#[cfg(unix)]
fn read_available<R: Read + std::os::unix::io::AsRawFd>(
    pipe: &mut R,
    buf: &mut [u8],
) -> std::io::Result<usize> {
    let fd = pipe.as_raw_fd();
    // SAFETY: fd is owned by `pipe` and stays open for this call.
    let flags = unsafe { libc::fcntl(fd, libc::F_GETFL) };
    if flags < 0 {
        return Err(std::io::Error::last_os_error());
    }
    let blocking = flags & libc::O_NONBLOCK == 0;
    // SAFETY: as above.
    if blocking && unsafe { libc::fcntl(fd, libc::F_SETFL, flags | libc::O_NONBLOCK) } < 0 {
        return Err(std::io::Error::last_os_error());
    }

    let result = pipe.read(buf);

    if blocking {
        // SAFETY: as above.
        unsafe {
            libc::fcntl(fd, libc::F_SETFL, flags);
        }
    }
    match result {
        Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => Ok(0),
        other => other,
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    fn runner_with(timeout_ms: u64, cap: usize) -> ToolRunner {
        ToolRunner::new(ToolConfig {
            default_timeout: Duration::from_millis(timeout_ms),
            max_output_bytes: cap,
        })
    }

    #[test]
    fn test_captures_stdout_and_stderr() {
        let runner = ToolRunner::with_defaults();
        let out = runner
            .run(&ToolSpec::new("sh", ["-c", "echo hello world; echo oops >&2"]))
            .unwrap();
        assert!(out.success());
        assert_eq!(out.stdout_str(), "hello world\n");
        assert_eq!(out.stderr_str(), "oops\n");
        assert!(!out.truncated);
    }

    #[test]
    fn test_nonzero_exit_is_no_data() {
        let runner = ToolRunner::with_defaults();
        let out = runner.run(&ToolSpec::new("sh", ["-c", "exit 42"])).unwrap();
        assert!(!out.success());
        assert_eq!(out.exit_code, Some(42));
        assert!(runner.text("false", &[]).is_none());
        assert_eq!(runner.text("echo", &["ok"]).as_deref(), Some("ok\n"));
    }

    #[test]
    fn test_missing_commands() {
        let runner = ToolRunner::with_defaults();
        assert!(matches!(
            runner.run(&ToolSpec::new("/nonexistent/witr/tool", Vec::<String>::new())),
            Err(ToolError::NotFound(_))
        ));
        assert!(matches!(
            runner.run(&ToolSpec::new("witr-no-such-tool-on-path", Vec::<String>::new())),
            Err(ToolError::NotFound(_))
        ));
    }

    #[test]
    fn test_shell_metacharacters_rejected() {
        let runner = ToolRunner::with_defaults();
        for cmd in ["echo; rm -rf /", "ls | cat", "$(id)", ""] {
            assert!(
                matches!(
                    runner.run(&ToolSpec::new(cmd, Vec::<String>::new())),
                    Err(ToolError::Rejected(..))
                ),
                "{cmd:?} should be rejected"
            );
        }
    }

    #[test]
    fn test_deadline_kills_child() {
        let runner = runner_with(100, DEFAULT_MAX_OUTPUT_BYTES);
        let out = runner.run(&ToolSpec::new("sleep", ["10"])).unwrap();
        assert!(out.timed_out);
        assert!(out.elapsed < Duration::from_secs(2));
        assert!(runner.stdout_of(&ToolSpec::new("sleep", ["10"])).is_none());
    }

    #[test]
    fn test_per_call_timeout_overrides_default() {
        let runner = runner_with(60_000, DEFAULT_MAX_OUTPUT_BYTES);
        let spec = ToolSpec::new("sleep", ["10"]).with_timeout(Duration::from_millis(100));
        assert!(runner.run(&spec).unwrap().timed_out);
    }

    #[test]
    fn test_output_cap() {
        let runner = runner_with(DEFAULT_TIMEOUT_MS, 100);
        let out = runner
            .run(&ToolSpec::new("sh", ["-c", "yes | head -n 1000"]))
            .unwrap();
        assert!(out.truncated);
        assert!(out.stdout.len() <= 100);
    }

    #[test]
    fn test_environment_is_cleared() {
        let runner = ToolRunner::with_defaults();
        let spec =
            ToolSpec::new("sh", ["-c", "echo $LC_ALL-$TZ-${HOME:-none}"]).with_env("TZ", "UTC");
        assert_eq!(runner.stdout_of(&spec).unwrap().trim(), "C-UTC-none");
    }

    #[test]
    fn test_is_available() {
        assert!(is_available("sh"));
        assert!(is_available("/bin/sh"));
        assert!(!is_available("witr-no-such-tool-on-path"));
    }

    #[test]
    fn test_config_defaults() {
        let config = ToolConfig::default();
        assert_eq!(config.default_timeout, Duration::from_secs(3));
        assert_eq!(config.max_output_bytes, 4 * 1024 * 1024);
    }
}
