use std::{cmp::Ordering, collections::BTreeMap};

use chrono::{DateTime, Local};
use serde::Serialize;

use super::{
    complexity::{self, ComplexityEstimate, Sample},
    orchestrator::Mode,
    result::{JudgeCode, RunRecord},
};
use crate::plugin::{CompareMode, Variant};

pub const EXIT_OK: i32 = 0;
pub const EXIT_FAILURE: i32 = 1;
pub const EXIT_INTERNAL_ERROR: i32 = 2;

/// A test case as it was judged. `expected` is the oracle's output when the source had none.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CaseInfo {
    pub name: String,
    pub input: String,
    pub expected: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct Report {
    pub problem_id: String,
    pub mode: Mode,
    pub seed: u64,
    pub compare_mode: CompareMode,
    pub source: String,
    pub started_at: DateTime<Local>,
    pub cases: Vec<CaseInfo>,
    pub variants: Vec<VariantReport>,
    pub no_tests: bool,
    /// Why the test-case source stopped early.
    pub aborted: Option<String>,
    pub cancelled: bool,
}

/// Per-variant rows. `records[i]` is the run on `Report::cases[i]`.
#[derive(Debug, Clone, Serialize)]
pub struct VariantReport {
    #[serde(flatten)]
    pub variant: Variant,
    pub records: Vec<RunRecord>,
    pub summary: VariantSummary,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VariantSummary {
    pub total: usize,
    pub passed: usize,
    pub pass_rate: f64,
    /// `NaN` when no run exited normally or timings were discarded.
    pub mean_time_ms: f64,
    pub std_time_ms: f64,
    pub peak_memory_bytes: u64,
    pub failures: BTreeMap<JudgeCode, usize>,
    pub complexity: Option<ComplexityEstimate>,
    pub shapes_available: bool,
}

impl VariantSummary {
    pub fn new(records: &[RunRecord], cases: &[CaseInfo], mode: Mode) -> Self {
        let total = records.len();
        let passed = records.iter().filter(|r| r.passed()).count();
        let mut failures = BTreeMap::new();
        for r in records.iter().filter(|r| !r.passed()) {
            *failures.entry(r.judge).or_default() += 1;
        }

        let timed: Vec<_> = records
            .iter()
            .zip(cases)
            .filter(|(r, _)| r.execution.exited_normally())
            .collect();
        let times: Vec<f64> = if mode.reports_timing() {
            timed.iter().map(|(r, _)| r.time_ms()).collect()
        } else {
            Vec::new()
        };
        let (mean_time_ms, std_time_ms) = mean_and_std(&times);

        let complexity = mode.fits_complexity().then(|| {
            let samples: Vec<_> = timed
                .iter()
                .map(|(r, c)| Sample::new(r.execution.shape.clone(), &c.input, r.time_ms()))
                .collect();
            complexity::estimate(&samples)
        });

        Self {
            total,
            passed,
            pass_rate: if total == 0 {
                f64::NAN
            } else {
                passed as f64 / total as f64
            },
            mean_time_ms,
            std_time_ms,
            peak_memory_bytes: records
                .iter()
                .map(|r| r.execution.peak_memory_bytes)
                .max()
                .unwrap_or(0),
            failures,
            complexity,
            shapes_available: !timed.is_empty()
                && timed.iter().all(|(r, _)| r.execution.shape.is_some()),
        }
    }

    pub fn all_passed(&self) -> bool {
        self.passed == self.total
    }
}

fn mean_and_std(v: &[f64]) -> (f64, f64) {
    if v.is_empty() {
        return (f64::NAN, f64::NAN);
    }
    let n = v.len() as f64;
    let mean = v.iter().sum::<f64>() / n;
    if v.len() < 2 {
        return (mean, 0.0);
    }
    let var = v.iter().map(|x| (x - mean).powi(2)).sum::<f64>() / (n - 1.0);
    (mean, var.sqrt())
}

impl VariantReport {
    /// First case this variant failed on, with its record.
    pub fn first_failure<'a>(&'a self, cases: &'a [CaseInfo]) -> Option<(&'a CaseInfo, &'a RunRecord)> {
        cases
            .iter()
            .zip(&self.records)
            .find(|(_, r)| !r.passed())
    }
}

impl Report {
    /// Variants ordered by mean time, fastest first; rows without timings last.
    pub fn ranked(&self) -> Vec<&VariantReport> {
        let mut rows: Vec<_> = self.variants.iter().collect();
        rows.sort_by(|a, b| {
            let (x, y) = (a.summary.mean_time_ms, b.summary.mean_time_ms);
            match (x.is_nan(), y.is_nan()) {
                (false, false) => x.total_cmp(&y),
                (true, true) => Ordering::Equal,
                (true, false) => Ordering::Greater,
                (false, true) => Ordering::Less,
            }
        });
        rows
    }

    pub fn all_passed(&self) -> bool {
        self.variants.iter().all(|v| v.summary.all_passed())
    }

    pub fn exit_code(&self) -> i32 {
        if self.all_passed() && self.aborted.is_none() && !self.cancelled {
            EXIT_OK
        } else {
            EXIT_FAILURE
        }
    }
}
