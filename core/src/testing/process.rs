//! Unix process plumbing for the executor: isolation before exec, reaping with resource usage,
//! and group-wide signals.

use std::{io, os::unix::process::CommandExt as _, process::Stdio};

use tokio::process::{ChildStderr, ChildStdin, ChildStdout};

use super::executor::Launch;

pub type Pid = libc::pid_t;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExitInfo {
    pub code: Option<i32>,
    pub signal: Option<i32>,
    pub max_rss_bytes: u64,
}

pub struct Spawned {
    pub pid: Pid,
    pub stdin: Option<ChildStdin>,
    pub stdout: Option<ChildStdout>,
    pub stderr: Option<ChildStderr>,
}

/// Spawns `launch` as the leader of a new process group, with an address-space ceiling.
///
/// The child is never reaped by anyone but [`wait_for_exit`].
pub fn spawn_isolated(launch: &Launch, memory_bytes: Option<u64>) -> io::Result<Spawned> {
    let mut cmd = std::process::Command::new(&launch.program);
    cmd.args(&launch.args)
        .envs(launch.envs.iter().map(|(k, v)| (k, v)))
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());

    // SAFETY: only async-signal-safe calls between fork and exec.
    unsafe {
        cmd.pre_exec(move || isolate_current_process(memory_bytes));
    }

    let mut child = cmd.spawn()?;
    let pid = child.id() as Pid;

    let pipes = (|| -> io::Result<_> {
        Ok((
            child.stdin.take().map(ChildStdin::from_std).transpose()?,
            child.stdout.take().map(ChildStdout::from_std).transpose()?,
            child.stderr.take().map(ChildStderr::from_std).transpose()?,
        ))
    })();

    match pipes {
        Ok((stdin, stdout, stderr)) => Ok(Spawned {
            pid,
            stdin,
            stdout,
            stderr,
        }),
        Err(e) => {
            signal_group(pid, libc::SIGKILL);
            let _ = wait_for_exit(pid);
            Err(e)
        }
    }
}

fn isolate_current_process(memory_bytes: Option<u64>) -> io::Result<()> {
    if unsafe { libc::setpgid(0, 0) } != 0 {
        return Err(io::Error::last_os_error());
    }
    if let Some(limit) = memory_bytes {
        let rl = libc::rlimit {
            rlim_cur: limit as libc::rlim_t,
            rlim_max: limit as libc::rlim_t,
        };
        if unsafe { libc::setrlimit(libc::RLIMIT_AS, &rl) } != 0 {
            return Err(io::Error::last_os_error());
        }
    }
    Ok(())
}

/// Blocks until `pid` exits and collects its status and peak RSS.
pub fn wait_for_exit(pid: Pid) -> io::Result<ExitInfo> {
    let mut status: libc::c_int = 0;
    let mut usage: libc::rusage = unsafe { std::mem::zeroed() };
    loop {
        let ret = unsafe { libc::wait4(pid, &mut status, 0, &mut usage) };
        if ret == pid {
            break;
        }
        let err = io::Error::last_os_error();
        if err.kind() != io::ErrorKind::Interrupted {
            return Err(err);
        }
    }

    let (code, signal) = if libc::WIFEXITED(status) {
        (Some(libc::WEXITSTATUS(status)), None)
    } else if libc::WIFSIGNALED(status) {
        (None, Some(libc::WTERMSIG(status)))
    } else {
        (None, None)
    };

    Ok(ExitInfo {
        code,
        signal,
        max_rss_bytes: max_rss_to_bytes(usage.ru_maxrss),
    })
}

#[cfg(target_os = "macos")]
fn max_rss_to_bytes(max_rss: libc::c_long) -> u64 {
    max_rss.max(0) as u64
}

#[cfg(not(target_os = "macos"))]
fn max_rss_to_bytes(max_rss: libc::c_long) -> u64 {
    (max_rss.max(0) as u64).saturating_mul(1024)
}

/// Sends `sig` to every process in the group led by `pid`.
pub fn signal_group(pid: Pid, sig: libc::c_int) {
    if unsafe { libc::kill(-pid, sig) } != 0 {
        log::debug!(
            "kill(-{}, {}) failed: {}",
            pid,
            sig,
            io::Error::last_os_error()
        );
    }
}
