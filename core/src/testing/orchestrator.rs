use std::{
    convert::Infallible,
    path::{Path, PathBuf},
    str::FromStr,
};

use chrono::Local;
use futures::StreamExt as _;
use serde::{Deserialize, Serialize};

use super::{
    compare,
    executor::{Executor, Launch},
    report::{CaseInfo, Report, VariantReport, VariantSummary},
    result::{Execution, JudgeCode, RunRecord, Termination},
    testcase::{TestCase, TestSource},
};
use crate::plugin::{
    CompareMode, LaunchContext, PluginError, Registry, Solution, Variant, DEFAULT_VARIANT,
};

#[derive(
    Debug,
    Clone,
    Copy,
    Default,
    PartialEq,
    Eq,
    Serialize,
    Deserialize,
    strum::Display,
    strum::EnumString,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum Mode {
    /// Every selected variant on every case; may run cases in parallel; timings discarded.
    Sweep,
    /// Every selected variant on every case, serially; timings feed the complexity fit.
    #[default]
    Bench,
    /// Only `default`, on the first few cases.
    Sanity,
}

impl Mode {
    pub fn reports_timing(self) -> bool {
        self != Mode::Sweep
    }

    pub fn fits_complexity(self) -> bool {
        self == Mode::Bench
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum VariantSelector {
    #[default]
    Default,
    Named(String),
    All,
}

impl FromStr for VariantSelector {
    type Err = Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            DEFAULT_VARIANT => Self::Default,
            "all" => Self::All,
            name => Self::Named(name.to_owned()),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunOptions {
    pub mode: Mode,
    pub selector: VariantSelector,
    pub seed: u64,
    pub count: usize,
    pub sanity_count: usize,
    /// Cases in flight at once. Only honored in [`Mode::Sweep`].
    pub jobs: usize,
    /// Runs per case in [`Mode::Bench`]; the record keeps the median time.
    pub repeat: usize,
    /// Logical sizes appended to generated cases in [`Mode::Bench`].
    pub sizes: Vec<usize>,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            mode: Mode::default(),
            selector: VariantSelector::default(),
            seed: 0,
            count: 10,
            sanity_count: 3,
            jobs: 1,
            repeat: 1,
            sizes: Vec::new(),
        }
    }
}

/// Observer of a running problem, for progress display.
pub trait Progress {
    fn problem_started(&self, _problem_id: &str, _variants: &[Variant], _source: &TestSource) {}
    fn case_finished(&self, _case: &CaseInfo, _results: &[(&Variant, &RunRecord)]) {}
}

impl Progress for () {}

pub struct Orchestrator<'a> {
    registry: &'a Registry,
    executor: Executor,
    launch_ctx: LaunchContext,
    tests_dir: PathBuf,
    compile_before_run: bool,
}

enum CaseRun {
    Done(CaseInfo, Vec<RunRecord>),
    Cancelled,
}

/// Everything needed to run one case; shared by all in-flight cases.
struct Plan<'p> {
    solution: &'p Solution,
    repeat: usize,
    selected: Vec<(Variant, Launch)>,
    oracle: Option<Launch>,
}

impl<'a> Orchestrator<'a> {
    pub fn new(registry: &'a Registry, executor: Executor, launch_ctx: LaunchContext) -> Self {
        Self {
            registry,
            executor,
            launch_ctx,
            tests_dir: PathBuf::from("tests"),
            compile_before_run: true,
        }
    }

    pub fn tests_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.tests_dir = dir.into();
        self
    }

    pub fn compile_before_run(mut self, yes: bool) -> Self {
        self.compile_before_run = yes;
        self
    }

    pub fn shell(&self) -> &Path {
        &self.launch_ctx.shell
    }

    /// Runs the selected variants of `problem_id` over its test cases.
    ///
    /// Only plug-in problems are errors; everything that goes wrong in a child ends up in a
    /// record, and a broken test-case source ends up in [`Report::aborted`].
    pub async fn run_problem(
        &self,
        problem_id: &str,
        opts: &RunOptions,
        progress: &dyn Progress,
    ) -> Result<Report, PluginError> {
        let started_at = Local::now();
        let solution = self.registry.load_solution(problem_id)?;
        if self.compile_before_run {
            solution.prepare(self.shell()).await?;
        }

        let variants = select_variants(&solution, opts)?;
        let source = self.source_for(problem_id, opts)?;

        let oracle = match solution.compare_mode {
            CompareMode::Custom => None,
            _ => Some(solution.launch(DEFAULT_VARIANT, &self.launch_ctx)?),
        };
        let selected = variants
            .iter()
            .map(|v| {
                solution
                    .launch(&v.name, &self.launch_ctx)
                    .map(|launch| (v.clone(), launch))
            })
            .collect::<Result<Vec<_>, _>>()?;
        let plan = Plan {
            solution: &solution,
            repeat: match opts.mode {
                Mode::Bench => opts.repeat.max(1),
                _ => 1,
            },
            selected,
            oracle,
        };

        let jobs = match opts.mode {
            Mode::Sweep => opts.jobs.max(1),
            _ => 1,
        };
        log::info!(
            "{}: {} variant(s), mode={}, source={}",
            problem_id,
            variants.len(),
            opts.mode,
            source
        );
        progress.problem_started(problem_id, &variants, &source);

        let mut cases = Vec::new();
        let mut rows: Vec<Vec<RunRecord>> = vec![Vec::new(); variants.len()];
        let mut aborted = None;
        let mut cancelled = false;

        let plan = &plan;
        let in_flight = source
            .cases()
            .take_while(|_| !self.executor.is_cancelled())
            .map(move |res| async move {
                match res {
                    Ok(case) => Ok(self.run_case(plan, case).await),
                    Err(e) => Err(e),
                }
            });
        let mut results = futures::stream::iter(in_flight).buffered(jobs);

        while let Some(res) = results.next().await {
            match res {
                // Nothing after the first cancelled case is kept, so the report has no gaps.
                _ if cancelled => {}
                Ok(CaseRun::Done(case, records)) => {
                    let pairs: Vec<_> = variants.iter().zip(&records).collect();
                    progress.case_finished(&case, &pairs);
                    for (row, rec) in rows.iter_mut().zip(records) {
                        row.push(rec);
                    }
                    cases.push(case);
                }
                Ok(CaseRun::Cancelled) => {
                    log::warn!("{}: cancelled after {} case(s)", problem_id, cases.len());
                    cancelled = true;
                }
                Err(e) => {
                    log::error!("{}: test-case source failed: {}", problem_id, e);
                    aborted = Some(e.to_string());
                    break;
                }
            }
        }
        drop(results);
        cancelled |= self.executor.is_cancelled();

        let no_tests = cases.is_empty() && aborted.is_none() && !cancelled;
        let variants = if no_tests {
            log::warn!("{}: no tests", problem_id);
            Vec::new()
        } else {
            variants
                .into_iter()
                .zip(rows)
                .map(|(variant, records)| VariantReport {
                    summary: VariantSummary::new(&records, &cases, opts.mode),
                    variant,
                    records,
                })
                .collect()
        };

        Ok(Report {
            problem_id: problem_id.to_owned(),
            mode: opts.mode,
            seed: opts.seed,
            compare_mode: solution.compare_mode,
            source: source.to_string(),
            started_at,
            cases,
            variants,
            no_tests,
            aborted,
            cancelled,
        })
    }

    fn source_for(&self, problem_id: &str, opts: &RunOptions) -> Result<TestSource, PluginError> {
        let generator = self.registry.load_generator(problem_id)?;
        let source =
            TestSource::for_problem(generator, &self.tests_dir, problem_id, opts.count, opts.seed);
        Ok(match opts.mode {
            Mode::Bench => source.sizes(&opts.sizes),
            Mode::Sanity => source.limit(opts.sanity_count),
            Mode::Sweep => source,
        })
    }

    async fn run_case(&self, plan: &Plan<'_>, case: TestCase) -> CaseRun {
        let TestCase {
            name,
            input,
            expected,
        } = case;
        let sol = plan.solution;

        let mut oracle_run = None;
        let expected = match (expected, &plan.oracle) {
            (Some(e), _) => Some(e),
            (None, None) => None,
            (None, Some(oracle)) => {
                let exec = self.run_repeated(oracle, &input, plan.repeat).await;
                if exec.termination == Termination::Cancelled {
                    return CaseRun::Cancelled;
                }
                let out = match exec.exited_normally() {
                    true => Some(exec.stdout.clone()),
                    false => {
                        log::warn!(
                            "{}: oracle '{}' failed on {} ({}); accepting other variants blindly",
                            sol.problem_id,
                            DEFAULT_VARIANT,
                            name,
                            exec.termination
                        );
                        None
                    }
                };
                oracle_run = Some(exec);
                out
            }
        };

        let mut records = Vec::with_capacity(plan.selected.len());
        for (variant, launch) in &plan.selected {
            let exec = match oracle_run.take() {
                Some(exec) if variant.is_default() => exec,
                reused => {
                    oracle_run = reused;
                    self.run_repeated(launch, &input, plan.repeat).await
                }
            };
            if exec.termination == Termination::Cancelled {
                return CaseRun::Cancelled;
            }
            let judge = exec.failure_code().unwrap_or_else(|| {
                let ok = compare::outputs_match(
                    sol.compare_mode,
                    sol.judge,
                    &exec.stdout,
                    expected.as_deref(),
                    &input,
                );
                if ok {
                    JudgeCode::AC
                } else {
                    JudgeCode::WA
                }
            });
            log::debug!(
                "{} {} [{}]: {} {:.1}ms",
                sol.problem_id,
                name,
                variant.name,
                judge,
                exec.wall_time_ms
            );
            records.push(RunRecord {
                judge,
                execution: exec,
            });
        }

        CaseRun::Done(
            CaseInfo {
                name,
                input,
                expected,
            },
            records,
        )
    }

    /// Runs `launch` up to `repeat` times; keeps the median time and the largest peak memory.
    /// The first abnormal run is returned as is.
    async fn run_repeated(&self, launch: &Launch, input: &str, repeat: usize) -> Execution {
        let mut runs: Vec<Execution> = Vec::with_capacity(repeat);
        for _ in 0..repeat.max(1) {
            let exec = self.executor.run(launch, input).await;
            if !exec.exited_normally() {
                return exec;
            }
            runs.push(exec);
        }
        let mut times: Vec<f64> = runs.iter().map(|e| e.wall_time_ms).collect();
        times.sort_by(f64::total_cmp);
        let peak = runs.iter().map(|e| e.peak_memory_bytes).max().unwrap_or(0);

        let mut exec = runs.swap_remove(0);
        exec.wall_time_ms = times[times.len() / 2];
        exec.peak_memory_bytes = peak;
        exec
    }
}

fn select_variants(solution: &Solution, opts: &RunOptions) -> Result<Vec<Variant>, PluginError> {
    let pick = |name: &str| {
        solution.variant(name).cloned().ok_or_else(|| {
            PluginError::UnknownVariant(solution.problem_id.clone(), name.to_owned())
        })
    };
    match (&opts.mode, &opts.selector) {
        (Mode::Sanity, _) | (_, VariantSelector::Default) => Ok(vec![pick(DEFAULT_VARIANT)?]),
        (_, VariantSelector::Named(name)) => Ok(vec![pick(name)?]),
        (_, VariantSelector::All) => Ok(solution.variants.clone()),
    }
}

#[cfg(test)]
mod test {
    use std::{
        sync::{Arc, Mutex},
        time::Duration,
    };

    use tokio_util::sync::CancellationToken;

    use super::*;
    use crate::{
        config::CommandConfig,
        plugin::{ExternalPlugins, FnGenerator},
        serdable::GlobPattern,
        testing::executor::Limits,
    };

    const SUM_SH: &str = r#"s=0; for x in $(cat); do s=$((s + x)); done; echo $s"#;

    /// External plug-ins written as shell scripts, so that no compiled child binary is needed.
    fn fixture(scripts: &[(&str, &str)], manifests: &[(&str, &str)]) -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        for (id, body) in scripts {
            std::fs::write(dir.path().join(format!("{}.sh", id)), body).unwrap();
        }
        for (id, body) in manifests {
            std::fs::write(dir.path().join(format!("{}.toml", id)), body).unwrap();
        }
        dir
    }

    fn registry(dir: &Path) -> Registry {
        let cmds = vec![CommandConfig {
            pattern: GlobPattern::parse("*.sh").unwrap(),
            compile: None,
            run: "/bin/sh #{filePath} #{variant}".to_owned(),
        }];
        Registry::new().with_external(ExternalPlugins::new(dir, cmds))
    }

    fn orchestrator<'a>(reg: &'a Registry, dir: &Path, limits: Limits) -> Orchestrator<'a> {
        let ctx = LaunchContext {
            self_exe: PathBuf::from("/nonexistent/lcrun"),
            shell: PathBuf::from("/bin/sh"),
        };
        Orchestrator::new(reg, Executor::new(limits), ctx).tests_dir(dir)
    }

    fn write_cases(dir: &Path, id: &str, cases: &[(&str, &str)]) {
        for (i, (input, output)) in cases.iter().enumerate() {
            std::fs::write(dir.join(format!("{}.{:03}.in", id, i + 1)), input).unwrap();
            std::fs::write(dir.join(format!("{}.{:03}.out", id, i + 1)), output).unwrap();
        }
    }

    fn limits() -> Limits {
        Limits {
            timeout: Duration::from_millis(2000),
            memory_bytes: None,
        }
    }

    #[tokio::test]
    async fn happy_path_single_variant() {
        let dir = fixture(&[("p", SUM_SH)], &[]);
        write_cases(
            dir.path(),
            "p",
            &[("1 2 3\n", "6\n"), ("10 20 30 40 50\n", "150\n"), ("7\n", "7\n")],
        );
        let reg = registry(dir.path());
        let report = orchestrator(&reg, dir.path(), limits())
            .run_problem("p", &RunOptions::default(), &())
            .await
            .unwrap();

        assert_eq!(report.cases.len(), 3);
        assert_eq!(report.variants.len(), 1);
        let row = &report.variants[0];
        assert_eq!(row.variant.name, "default");
        assert_eq!(row.summary.passed, 3);
        assert_eq!(row.summary.pass_rate, 1.0);
        assert!(row.summary.complexity.is_some());
        assert_eq!(report.exit_code(), 0);
        assert!(!report.no_tests);
    }

    #[tokio::test]
    async fn wrong_answers_and_crashes_do_not_stop_the_sweep() {
        let script = r#"read x
case "$1" in
  default) echo $((x * 2)) ;;
  wrong) echo $((x * 3)) ;;
  crash) echo 'boom' >&2; exit 3 ;;
esac"#;
        let manifest = "[variants.default]\n[variants.wrong]\n[variants.crash]\n";
        let dir = fixture(&[("p", script)], &[("p", manifest)]);
        write_cases(dir.path(), "p", &[("1\n", "2\n"), ("0\n", "0\n")]);
        let reg = registry(dir.path());

        let opts = RunOptions {
            selector: VariantSelector::All,
            mode: Mode::Sweep,
            jobs: 2,
            ..Default::default()
        };
        let report = orchestrator(&reg, dir.path(), limits())
            .run_problem("p", &opts, &())
            .await
            .unwrap();

        let judges = |name: &str| -> Vec<JudgeCode> {
            let row = report.variants.iter().find(|v| v.variant.name == name).unwrap();
            row.records.iter().map(|r| r.judge).collect()
        };
        use JudgeCode::*;
        assert_eq!(judges("default"), [AC, AC]);
        assert_eq!(judges("wrong"), [WA, AC]);
        assert_eq!(judges("crash"), [RE, RE]);
        let crash = report.variants.iter().find(|v| v.variant.name == "crash").unwrap();
        assert_eq!(crash.records[0].execution.stderr, "boom\n");
        assert!(crash.summary.mean_time_ms.is_nan());
        assert_eq!(report.exit_code(), 1);
    }

    #[tokio::test]
    async fn empty_source_reports_no_tests() {
        let dir = fixture(&[("p", SUM_SH)], &[]);
        let reg = registry(dir.path());
        let report = orchestrator(&reg, dir.path(), limits())
            .run_problem("p", &RunOptions::default(), &())
            .await
            .unwrap();
        assert!(report.no_tests);
        assert!(report.variants.is_empty());
        assert_eq!(report.exit_code(), 0);
    }

    #[tokio::test]
    async fn malformed_file_pair_aborts_after_earlier_cases() {
        let dir = fixture(&[("p", SUM_SH)], &[]);
        write_cases(dir.path(), "p", &[("1\n", "1\n"), ("2\n", "2\n\n")]);
        let reg = registry(dir.path());
        let report = orchestrator(&reg, dir.path(), limits())
            .run_problem("p", &RunOptions::default(), &())
            .await
            .unwrap();
        assert_eq!(report.cases.len(), 1);
        assert_eq!(report.variants[0].records.len(), 1);
        assert!(report.aborted.as_deref().unwrap().contains("trailing newline"));
        assert_eq!(report.exit_code(), 1);
    }

    #[tokio::test]
    async fn timeout_is_isolated_to_its_variant_and_case() {
        let script = r#"read n
if [ "$1" = slow ] && [ "$n" -ge 30 ]; then sleep 5; fi
echo $n"#;
        let manifest = "[variants.default]\n[variants.slow]\n";
        let dir = fixture(&[("p", script)], &[("p", manifest)]);
        write_cases(dir.path(), "p", &[("5\n", "5\n"), ("30\n", "30\n"), ("7\n", "7\n")]);
        let reg = registry(dir.path());
        let limits = Limits {
            timeout: Duration::from_millis(500),
            memory_bytes: None,
        };
        let opts = RunOptions {
            selector: VariantSelector::All,
            ..Default::default()
        };
        let report = orchestrator(&reg, dir.path(), limits)
            .run_problem("p", &opts, &())
            .await
            .unwrap();

        use JudgeCode::*;
        let judges: Vec<Vec<_>> = report
            .variants
            .iter()
            .map(|v| v.records.iter().map(|r| r.judge).collect())
            .collect();
        assert_eq!(judges, [vec![AC, AC, AC], vec![AC, TLE, AC]]);
        assert_eq!(report.exit_code(), 1);
    }

    #[tokio::test]
    async fn oracle_supplies_expected_output_for_generated_cases() {
        fn gen_case(rng: &mut rand::rngs::StdRng) -> String {
            use rand::Rng as _;
            format!("{}\n", rng.gen_range(1..100))
        }

        // The generator belongs to a built-in registration; the solution is external.
        let script = r#"read x
case "$1" in
  default) echo $((x + 1)) ;;
  same) echo $((1 + x)) ;;
  off) echo $x ;;
esac"#;
        let manifest = "[variants.default]\n[variants.same]\n[variants.off]\n";
        let dir = fixture(&[("p", script)], &[("p", manifest)]);
        let reg = registry(dir.path());
        let source = TestSource::generated(Arc::new(FnGenerator::new(gen_case)), 4, 1);
        assert_eq!(source.cases().count(), 4);

        let orch = orchestrator(&reg, dir.path(), limits());
        let solution = reg.load_solution("p").unwrap();
        let plan = Plan {
            solution: &solution,
            repeat: 1,
            selected: solution
                .variants
                .iter()
                .map(|v| (v.clone(), solution.launch(&v.name, &orch.launch_ctx).unwrap()))
                .collect(),
            oracle: Some(solution.launch("default", &orch.launch_ctx).unwrap()),
        };
        for case in source.cases() {
            let CaseRun::Done(info, records) = orch.run_case(&plan, case.unwrap()).await else {
                panic!("cancelled")
            };
            let x: u32 = info.input.trim().parse().unwrap();
            assert_eq!(info.expected, Some(format!("{}\n", x + 1)));
            let judges: Vec<_> = records.iter().map(|r| r.judge).collect();
            // Variants run as default, off, same.
            assert_eq!(judges, [JudgeCode::AC, JudgeCode::WA, JudgeCode::AC]);
        }
    }

    #[tokio::test]
    async fn cancellation_keeps_completed_cases_without_gaps() {
        let script = r#"read x
if [ "$x" -ge 3 ]; then sleep 5; fi
echo $x"#;
        let dir = fixture(&[("p", script)], &[]);
        let cases: Vec<(String, String)> =
            (0..10).map(|i| (format!("{}\n", i), format!("{}\n", i))).collect();
        let cases: Vec<(&str, &str)> = cases.iter().map(|(a, b)| (a.as_str(), b.as_str())).collect();
        write_cases(dir.path(), "p", &cases);
        let reg = registry(dir.path());

        let token = CancellationToken::new();
        let executor = Executor::new(Limits {
            timeout: Duration::from_secs(30),
            memory_bytes: None,
        })
        .cancellation(token.clone());
        let ctx = LaunchContext {
            self_exe: PathBuf::from("/nonexistent/lcrun"),
            shell: PathBuf::from("/bin/sh"),
        };
        let orch = Orchestrator::new(&reg, executor, ctx).tests_dir(dir.path());

        let canceller = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(1000)).await;
            token.cancel();
        });
        let report = orch
            .run_problem("p", &RunOptions::default(), &())
            .await
            .unwrap();
        canceller.await.unwrap();

        assert!(report.cancelled);
        let names: Vec<_> = report.cases.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, ["p.001", "p.002", "p.003"]);
        assert_eq!(report.variants[0].records.len(), 3);
        assert_eq!(report.exit_code(), 1);
    }

    #[tokio::test]
    async fn unknown_variant_and_missing_problem_are_errors() {
        let dir = fixture(&[("p", SUM_SH)], &[]);
        let reg = registry(dir.path());
        let orch = orchestrator(&reg, dir.path(), limits());

        let opts = RunOptions {
            selector: "heap".parse().unwrap(),
            ..Default::default()
        };
        let err = orch.run_problem("p", &opts, &()).await.unwrap_err();
        assert!(matches!(err, PluginError::UnknownVariant(..)), "{:?}", err);

        let err = orch
            .run_problem("q", &RunOptions::default(), &())
            .await
            .unwrap_err();
        assert!(matches!(err, PluginError::NotFound(..)), "{:?}", err);
    }

    #[tokio::test]
    async fn progress_sees_every_case() {
        #[derive(Default)]
        struct Seen(Mutex<Vec<String>>);
        impl Progress for Seen {
            fn case_finished(&self, case: &CaseInfo, results: &[(&Variant, &RunRecord)]) {
                assert_eq!(results.len(), 1);
                self.0.lock().unwrap().push(case.name.clone());
            }
        }

        let dir = fixture(&[("p", SUM_SH)], &[]);
        write_cases(dir.path(), "p", &[("1\n", "1\n"), ("2\n", "2\n")]);
        let reg = registry(dir.path());
        let seen = Seen::default();
        let opts = RunOptions {
            mode: Mode::Sanity,
            sanity_count: 1,
            ..Default::default()
        };
        orchestrator(&reg, dir.path(), limits())
            .run_problem("p", &opts, &seen)
            .await
            .unwrap();
        assert_eq!(*seen.0.lock().unwrap(), ["p.001"]);
    }

    #[test]
    fn variant_selector_from_str() {
        let parse = |s: &str| s.parse::<VariantSelector>().unwrap();
        assert_eq!(parse("default"), VariantSelector::Default);
        assert_eq!(parse("all"), VariantSelector::All);
        assert_eq!(parse("heap"), VariantSelector::Named("heap".to_owned()));
        assert_eq!("bench".parse::<Mode>().unwrap(), Mode::Bench);
    }
}
