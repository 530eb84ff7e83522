use serde::Serialize;

use crate::shape::Shape;

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, strum::Display, strum::EnumIter,
)]
pub enum JudgeCode {
    AC,
    WA,
    TLE,
    MLE,
    RE,
}

/// How a child invocation ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, strum::Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum Termination {
    /// Exited with status 0.
    Normal,
    /// Killed by the harness when the deadline expired.
    Timeout,
    /// Died after hitting the memory ceiling.
    MemoryExceeded,
    /// Any other abnormal end, including a failure to spawn.
    Crash,
    /// Killed, or never started, because the run was cancelled.
    Cancelled,
}

/// Everything the executor observed about one child invocation.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Execution {
    pub termination: Termination,
    pub exit_code: Option<i32>,
    pub signal: Option<i32>,
    /// Spawn to exit, measured in the parent.
    pub wall_time_ms: f64,
    /// Peak resident set size of the child alone.
    pub peak_memory_bytes: u64,
    pub stdout: String,
    /// Captured stderr with shape markers removed.
    pub stderr: String,
    pub shape: Option<Shape>,
    pub truncated: bool,
}

impl Execution {
    pub(crate) fn not_started(termination: Termination, stderr: impl Into<String>) -> Self {
        Self {
            termination,
            exit_code: None,
            signal: None,
            wall_time_ms: 0.0,
            peak_memory_bytes: 0,
            stdout: String::new(),
            stderr: stderr.into(),
            shape: None,
            truncated: false,
        }
    }

    pub fn exited_normally(&self) -> bool {
        self.termination == Termination::Normal
    }

    /// Judge code implied by the termination alone. `None` means the output must be compared.
    pub fn failure_code(&self) -> Option<JudgeCode> {
        use Termination::*;
        match self.termination {
            Normal => None,
            Timeout => Some(JudgeCode::TLE),
            MemoryExceeded => Some(JudgeCode::MLE),
            Crash | Cancelled => Some(JudgeCode::RE),
        }
    }

    /// Last `n` lines of stderr, for crash reports.
    pub fn stderr_tail(&self, n: usize) -> String {
        let lines: Vec<_> = self.stderr.lines().collect();
        lines[lines.len().saturating_sub(n)..].join("\n")
    }
}

/// The judged result of one variant on one test case.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunRecord {
    pub judge: JudgeCode,
    #[serde(flatten)]
    pub execution: Execution,
}

impl RunRecord {
    pub fn passed(&self) -> bool {
        self.judge == JudgeCode::AC
    }

    pub fn time_ms(&self) -> f64 {
        self.execution.wall_time_ms
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn stderr_tail_keeps_last_lines() {
        let mut e = Execution::not_started(Termination::Crash, "a\nb\nc\nd\n");
        assert_eq!(e.stderr_tail(2), "c\nd");
        assert_eq!(e.stderr_tail(10), "a\nb\nc\nd");
        e.stderr.clear();
        assert_eq!(e.stderr_tail(3), "");
    }

    #[test]
    fn failure_code_follows_termination() {
        let e = |t| Execution::not_started(t, "");
        assert_eq!(e(Termination::Normal).failure_code(), None);
        assert_eq!(e(Termination::Timeout).failure_code(), Some(JudgeCode::TLE));
        assert_eq!(
            e(Termination::MemoryExceeded).failure_code(),
            Some(JudgeCode::MLE)
        );
        assert_eq!(e(Termination::Crash).failure_code(), Some(JudgeCode::RE));
    }
}
