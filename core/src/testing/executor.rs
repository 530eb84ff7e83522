use std::{
    fmt,
    path::{Path, PathBuf},
    time::{Duration, Instant},
};

use anyhow::{bail, Context as _};
use lazy_regex::regex_is_match;
use tokio::io::{AsyncRead, AsyncReadExt as _, AsyncWriteExt as _};
use tokio_util::sync::CancellationToken;

use super::{
    process::{self, ExitInfo},
    result::{Execution, Termination},
};
use crate::shape;

/// Per-invocation resource limits. Each case gets the full limits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Limits {
    pub timeout: Duration,
    pub memory_bytes: Option<u64>,
}

impl Default for Limits {
    fn default() -> Self {
        Self {
            timeout: Duration::from_millis(2000),
            memory_bytes: Some(1024 * 1024 * 1024),
        }
    }
}

/// What to spawn for one invocation: a program, its arguments and extra environment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Launch {
    pub program: PathBuf,
    pub args: Vec<String>,
    pub envs: Vec<(String, String)>,
}

impl Launch {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            envs: Vec::new(),
        }
    }

    pub fn shell(shell: impl Into<PathBuf>, cmd: impl Into<String>) -> Self {
        Self::new(shell).arg("-c").arg(cmd)
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.envs.push((key.into(), value.into()));
        self
    }
}

impl fmt::Display for Launch {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.program.to_string_lossy())?;
        for a in &self.args {
            write!(f, " {}", a)?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Stop {
    Deadline,
    Cancel,
}

/// Runs single invocations in fresh child processes under [`Limits`].
#[derive(Debug, Clone)]
pub struct Executor {
    limits: Limits,
    stdout_capture_max_bytes: usize,
    stderr_capture_max_bytes: usize,
    kill_grace: Duration,
    cancel: CancellationToken,
}

impl Executor {
    const DEFAULT_CAPTURE_MAX_BYTES: usize = 16 * 1024 * 1024;
    const DEFAULT_KILL_GRACE: Duration = Duration::from_millis(200);
    const DRAIN_GRACE: Duration = Duration::from_millis(100);

    pub fn new(limits: Limits) -> Self {
        Self {
            limits,
            stdout_capture_max_bytes: Self::DEFAULT_CAPTURE_MAX_BYTES,
            stderr_capture_max_bytes: Self::DEFAULT_CAPTURE_MAX_BYTES,
            kill_grace: Self::DEFAULT_KILL_GRACE,
            cancel: CancellationToken::new(),
        }
    }

    pub fn capture_max_bytes(mut self, stdout: usize, stderr: usize) -> Self {
        self.stdout_capture_max_bytes = stdout;
        self.stderr_capture_max_bytes = stderr;
        self
    }

    pub fn kill_grace(mut self, grace: Duration) -> Self {
        self.kill_grace = grace;
        self
    }

    pub fn cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    pub fn limits(&self) -> &Limits {
        &self.limits
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Runs `launch` with `input` on its stdin.
    ///
    /// Never fails: spawn errors, deadline expiry and cancellation all come back as an
    /// [`Execution`] with the matching [`Termination`].
    pub async fn run(&self, launch: &Launch, input: &str) -> Execution {
        if self.cancel.is_cancelled() {
            return Execution::not_started(Termination::Cancelled, "");
        }

        let start_at = Instant::now();
        let child = match process::spawn_isolated(launch, self.limits.memory_bytes) {
            Ok(child) => child,
            Err(e) => {
                log::warn!("Failed to spawn '{}': {}", launch, e);
                return Execution::not_started(
                    Termination::Crash,
                    format!("Failed to spawn '{}': {}", launch, e),
                );
            }
        };
        let process::Spawned {
            pid,
            stdin,
            stdout,
            stderr,
        } = child;

        let feed_stdin = {
            let input = input.as_bytes().to_vec();
            async move {
                let Some(mut stdin) = stdin else { return };
                // The child may exit without reading; a broken pipe here is not an error.
                if let Err(e) = stdin.write_all(&input).await {
                    log::debug!("Child {} did not take all of its input: {}", pid, e);
                }
                drop(stdin);
            }
        };
        let exited = async move {
            let info = tokio::task::spawn_blocking(move || process::wait_for_exit(pid)).await;
            (info, start_at.elapsed())
        };
        tokio::pin!(exited);

        let deadline = tokio::time::sleep(self.limits.timeout);
        tokio::pin!(deadline);

        let mut out = Capture::default();
        let mut err = Capture::default();
        let mut stop = None;
        let (waited, elapsed) = {
            let read_stdout = read_capped(stdout, self.stdout_capture_max_bytes, &mut out);
            let read_stderr = read_capped(stderr, self.stderr_capture_max_bytes, &mut err);
            let drain = async move {
                tokio::join!(read_stdout, read_stderr, feed_stdin);
            };
            tokio::pin!(drain);

            let mut drained = false;
            let res = loop {
                tokio::select! {
                    res = &mut exited => break res,
                    _ = &mut drain, if !drained => drained = true,
                    _ = &mut deadline, if stop.is_none() => {
                        log::debug!("Child {} exceeded {:?}; killing", pid, self.limits.timeout);
                        process::signal_group(pid, libc::SIGKILL);
                        stop = Some(Stop::Deadline);
                    }
                    _ = self.cancel.cancelled(), if stop.is_none() => {
                        process::signal_group(pid, libc::SIGTERM);
                        stop = Some(Stop::Cancel);
                        match tokio::time::timeout(self.kill_grace, &mut exited).await {
                            Ok(res) => break res,
                            Err(_) => process::signal_group(pid, libc::SIGKILL),
                        }
                    }
                }
            };

            // The child is reaped; whatever still holds its pipes belongs to its group.
            if !drained && tokio::time::timeout(Self::DRAIN_GRACE, &mut drain).await.is_err() {
                log::debug!("Pipes of child {} outlived it; killing its group", pid);
                process::signal_group(pid, libc::SIGKILL);
                if tokio::time::timeout(Self::DRAIN_GRACE, &mut drain).await.is_err() {
                    log::warn!("Gave up reading the output of child {}", pid);
                }
            }
            res
        };

        let exit = match waited {
            Ok(Ok(info)) => info,
            Ok(Err(e)) => {
                return Execution::not_started(
                    Termination::Crash,
                    format!("Failed to wait for child {}: {}", pid, e),
                )
            }
            Err(e) => {
                return Execution::not_started(
                    Termination::Crash,
                    format!("Reaper task for child {} failed: {}", pid, e),
                )
            }
        };

        let stderr = String::from_utf8_lossy(&err.bytes).into_owned();
        let termination = classify(&exit, stop, &stderr, self.limits.memory_bytes);
        Execution {
            termination,
            exit_code: exit.code,
            signal: exit.signal,
            wall_time_ms: elapsed.as_secs_f64() * 1000.0,
            peak_memory_bytes: exit.max_rss_bytes,
            stdout: String::from_utf8_lossy(&out.bytes).into_owned(),
            shape: shape::parse_shape_from_output(&stderr),
            stderr: shape::strip_shape_from_output(&stderr),
            truncated: out.truncated || err.truncated,
        }
    }
}

fn classify(
    exit: &ExitInfo,
    stop: Option<Stop>,
    stderr: &str,
    memory_limit: Option<u64>,
) -> Termination {
    match stop {
        Some(Stop::Cancel) => return Termination::Cancelled,
        Some(Stop::Deadline) => return Termination::Timeout,
        None => {}
    }
    if exit.code == Some(0) {
        return Termination::Normal;
    }
    let over_ceiling = memory_limit.map_or(false, |limit| exit.max_rss_bytes >= limit);
    let alloc_failed = regex_is_match!(
        r"memory allocation of \d+ bytes failed|MemoryError|std::bad_alloc|[Oo]ut of memory|memory exhausted",
        stderr
    );
    if over_ceiling || alloc_failed {
        Termination::MemoryExceeded
    } else {
        Termination::Crash
    }
}

#[derive(Debug, Default)]
struct Capture {
    bytes: Vec<u8>,
    truncated: bool,
}

/// Drains `reader` to the end into `into`, keeping at most `max` bytes.
///
/// Bytes land in `into` as they arrive, so dropping the future keeps what was read so far.
async fn read_capped<R>(reader: Option<R>, max: usize, into: &mut Capture)
where
    R: AsyncRead + Unpin,
{
    let Some(mut reader) = reader else { return };
    let mut buf = [0u8; 8192];
    loop {
        match reader.read(&mut buf).await {
            Ok(0) => break,
            Ok(n) => {
                let room = max.saturating_sub(into.bytes.len());
                into.truncated |= n > room;
                into.bytes.extend_from_slice(&buf[..n.min(room)]);
            }
            Err(e) => {
                log::debug!("Stopped reading child output: {}", e);
                break;
            }
        }
    }
}

/// Runs a one-off build command for an external plug-in and waits for it without limits.
pub async fn run_compile_command(shell: &Path, cmd: &str) -> anyhow::Result<()> {
    let status = tokio::process::Command::new(shell)
        .args(["-c", cmd])
        .status()
        .await
        .with_context(|| format!("Failed to spawn '{} -c {}'", shell.to_string_lossy(), cmd))?;

    match status.code() {
        Some(0) => Ok(()),
        Some(code) => bail!("Compile error: exitcode={}", code),
        None => bail!("Failed to compile: process terminated by signal"),
    }
}

#[cfg(test)]
mod test {
    use super::*;

    struct X {
        input: &'static str,
        script: &'static str,
        limits: Limits,
        want_termination: Termination,
        want_stdout: &'static str,
        want_stderr: &'static str,
    }

    fn limits_ms(ms: u64) -> Limits {
        Limits {
            timeout: Duration::from_millis(ms),
            memory_bytes: None,
        }
    }

    async fn run_test(x: X) -> Execution {
        let launch = Launch::shell("/bin/sh", x.script);
        let res = dbg!(Executor::new(x.limits).run(&launch, x.input).await);
        assert_eq!(res.termination, x.want_termination);
        assert_eq!(res.stdout, x.want_stdout);
        assert_eq!(res.stderr, x.want_stderr);
        assert!(res.wall_time_ms.is_finite() && res.wall_time_ms >= 0.0);
        res
    }

    #[tokio::test]
    async fn should_exit_normally() {
        let res = run_test(X {
            input: "123\n",
            script: r#"read x; echo "hello_$x""#,
            limits: limits_ms(2000),
            want_termination: Termination::Normal,
            want_stdout: "hello_123\n",
            want_stderr: "",
        })
        .await;
        assert_eq!(res.exit_code, Some(0));
        assert!(res.peak_memory_bytes > 0);
        assert_eq!(res.shape, None);
    }

    #[tokio::test]
    async fn should_exit_normally_even_if_stdin_is_not_read() {
        run_test(X {
            input: "123\n",
            script: "echo hello_123",
            limits: limits_ms(2000),
            want_termination: Termination::Normal,
            want_stdout: "hello_123\n",
            want_stderr: "",
        })
        .await;
    }

    #[tokio::test]
    async fn should_crash_on_nonzero_exit_and_keep_stderr() {
        let res = run_test(X {
            input: "",
            script: "echo partial; echo 'Traceback: boom' >&2; exit 42",
            limits: limits_ms(2000),
            want_termination: Termination::Crash,
            want_stdout: "partial\n",
            want_stderr: "Traceback: boom\n",
        })
        .await;
        assert_eq!(res.exit_code, Some(42));
    }

    #[tokio::test]
    async fn should_time_out() {
        let res = run_test(X {
            input: "",
            script: "sleep 5",
            limits: limits_ms(300),
            want_termination: Termination::Timeout,
            want_stdout: "",
            want_stderr: "",
        })
        .await;
        assert!(res.wall_time_ms < 3000.0, "{}", res.wall_time_ms);
        assert_eq!(res.signal, Some(libc::SIGKILL));
    }

    #[tokio::test]
    async fn should_extract_and_strip_shape() {
        let res = run_test(X {
            input: "",
            script: r#"echo 'log line' >&2; echo '__SHAPE__:{"k":3,"n":1000}__END_SHAPE__' >&2; echo 6"#,
            limits: limits_ms(2000),
            want_termination: Termination::Normal,
            want_stdout: "6\n",
            want_stderr: "log line\n",
        })
        .await;
        let shape = res.shape.unwrap();
        assert_eq!(shape.get("n"), Some(1000));
        assert_eq!(shape.get("k"), Some(3));
    }

    #[tokio::test]
    async fn should_classify_allocation_failure_as_memory() {
        run_test(X {
            input: "",
            script: "echo 'memory allocation of 1073741824 bytes failed' >&2; kill -ABRT $$",
            limits: limits_ms(2000),
            want_termination: Termination::MemoryExceeded,
            want_stdout: "",
            want_stderr: "memory allocation of 1073741824 bytes failed\n",
        })
        .await;
    }

    #[tokio::test]
    async fn should_classify_address_space_breach_as_memory() {
        let launch = Launch::shell("/bin/sh", "exec dd if=/dev/zero of=/dev/null bs=512M count=1");
        let limits = Limits {
            timeout: Duration::from_millis(5000),
            memory_bytes: Some(64 * 1024 * 1024),
        };
        let res = dbg!(Executor::new(limits).run(&launch, "").await);
        assert_eq!(res.termination, Termination::MemoryExceeded);
        assert_ne!(res.exit_code, Some(0));
    }

    #[tokio::test]
    async fn should_classify_python_memory_error_as_memory() {
        if std::process::Command::new("python3")
            .arg("--version")
            .output()
            .is_err()
        {
            eprintln!("python3 is not installed; skipped");
            return;
        }
        let launch = Launch::shell("/bin/sh", r#"exec python3 -c "b'x' * (1 << 31)""#);
        let limits = Limits {
            timeout: Duration::from_millis(5000),
            memory_bytes: Some(256 * 1024 * 1024),
        };
        let res = dbg!(Executor::new(limits).run(&launch, "").await);
        assert_eq!(res.termination, Termination::MemoryExceeded);
        assert!(res.stderr.contains("MemoryError"), "{}", res.stderr);
    }

    #[tokio::test]
    async fn should_not_wait_for_background_children_holding_pipes() {
        let started = Instant::now();
        let res = run_test(X {
            input: "",
            script: "sleep 5 & echo done",
            limits: limits_ms(3000),
            want_termination: Termination::Normal,
            want_stdout: "done\n",
            want_stderr: "",
        })
        .await;
        assert_eq!(res.exit_code, Some(0));
        assert!(
            started.elapsed() < Duration::from_secs(2),
            "{:?}",
            started.elapsed()
        );
    }

    #[tokio::test]
    async fn should_pass_large_input_to_a_child_that_ignores_it() {
        let input = "9 ".repeat(200_000);
        let launch = Launch::shell("/bin/sh", "echo done");
        let res = Executor::new(limits_ms(2000)).run(&launch, &input).await;
        assert_eq!(res.termination, Termination::Normal);
        assert_eq!(res.stdout, "done\n");
    }

    #[tokio::test]
    async fn should_truncate_captured_output() {
        let launch = Launch::shell("/bin/sh", "printf 'abcdefghij'");
        let res = Executor::new(limits_ms(2000))
            .capture_max_bytes(4, 4)
            .run(&launch, "")
            .await;
        assert_eq!(res.stdout, "abcd");
        assert!(res.truncated);
    }

    #[tokio::test]
    async fn should_report_spawn_failure_as_crash() {
        let launch = Launch::new("/nonexistent/lcrun-child");
        let res = Executor::new(limits_ms(2000)).run(&launch, "").await;
        assert_eq!(res.termination, Termination::Crash);
        assert!(res.stderr.contains("Failed to spawn"), "{}", res.stderr);
    }

    #[tokio::test]
    async fn should_pass_environment() {
        let launch = Launch::shell("/bin/sh", "echo $LCRUN_VARIANT").env("LCRUN_VARIANT", "heap");
        let res = Executor::new(limits_ms(2000)).run(&launch, "").await;
        assert_eq!(res.stdout, "heap\n");
    }

    #[tokio::test]
    async fn cancellation_terminates_child_and_blocks_new_ones() {
        let token = CancellationToken::new();
        let exec = Executor::new(limits_ms(10_000)).cancellation(token.clone());
        let launch = Launch::shell("/bin/sh", "sleep 5");

        let canceller = {
            let token = token.clone();
            tokio::spawn(async move {
                tokio::time::sleep(Duration::from_millis(200)).await;
                token.cancel();
            })
        };
        let started = Instant::now();
        let res = exec.run(&launch, "").await;
        canceller.await.unwrap();
        assert_eq!(res.termination, Termination::Cancelled);
        assert!(started.elapsed() < Duration::from_secs(4));

        let res = exec.run(&launch, "").await;
        assert_eq!(res.termination, Termination::Cancelled);
        assert_eq!(res.wall_time_ms, 0.0);
    }

    #[test]
    fn classify_prefers_stop_reason() {
        let killed = ExitInfo {
            code: None,
            signal: Some(libc::SIGKILL),
            max_rss_bytes: 1 << 20,
        };
        assert_eq!(
            classify(&killed, Some(Stop::Deadline), "", None),
            Termination::Timeout
        );
        assert_eq!(
            classify(&killed, Some(Stop::Cancel), "", None),
            Termination::Cancelled
        );
        assert_eq!(classify(&killed, None, "", None), Termination::Crash);
        assert_eq!(
            classify(&killed, None, "", Some(1 << 20)),
            Termination::MemoryExceeded
        );

        let ok = ExitInfo {
            code: Some(0),
            signal: None,
            max_rss_bytes: 1 << 30,
        };
        assert_eq!(classify(&ok, None, "", Some(1)), Termination::Normal);

        let py = ExitInfo {
            code: Some(1),
            signal: None,
            max_rss_bytes: 0,
        };
        assert_eq!(
            classify(&py, None, "Traceback ...\nMemoryError\n", None),
            Termination::MemoryExceeded
        );
    }
}
