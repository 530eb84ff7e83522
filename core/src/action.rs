pub mod error {
    #[allow(unused_imports)]
    pub(crate) use anyhow::{anyhow, bail, ensure, Context as _};
    pub use anyhow::{Error, Result};
}
use std::path::{Path, PathBuf};
use std::time::Duration;

use colored::{Color, Colorize};
use crossterm::terminal;
use error::*;
use indicatif::{ProgressBar, ProgressStyle};
use tokio_util::sync::CancellationToken;

use crate::config::{Config, HarnessConfig};
use crate::plugin::{LaunchContext, Registry, Variant};
use crate::style::{self, ColorTheme as _};
use crate::testing::{
    report::{EXIT_FAILURE, EXIT_INTERNAL_ERROR, EXIT_OK},
    CaseInfo, Executor, JudgeCode, Orchestrator, Progress, Report, RunOptions, RunRecord,
    TestSource, VariantReport,
};

const STDERR_TAIL_LINES: usize = 10;

/// Writes the example `lcrun.toml` and creates the plug-in and tests dirs.
pub fn init_repository(dir: impl AsRef<Path>) -> Result<PathBuf> {
    let dir = dir.as_ref();
    let config_file = dir.join(Config::FILENAME);
    ensure!(
        !config_file.exists(),
        "Already initialized: '{}' exists",
        config_file.display()
    );
    fsutil::write_with_mkdir(&config_file, Config::example_toml())
        .context("Failed to write config file")?;

    let cfg = Config::from_toml_file(config_file.clone())?;
    fsutil::mkdir_all(&cfg.harness.solutions_dir)?;
    fsutil::mkdir_all(&cfg.harness.generators_dir)?;
    fsutil::mkdir_all(&cfg.harness.tests_dir)?;
    Ok(config_file)
}

/// Prints built-in problems, or the variants of a single (built-in or external) problem.
pub fn list_problems(registry: &Registry, problem_id: Option<&str>) -> Result<()> {
    let Some(id) = problem_id else {
        for def in registry.builtin_problems() {
            let names: Vec<_> = def.variants().map(|v| v.name.as_str()).collect();
            println!("{}  {}", def.id().bold(), names.join(", ").dimmed());
        }
        return Ok(());
    };

    let sol = registry.load_solution(id)?;
    println!(
        "{} (compare: {}, {})",
        sol.problem_id.bold(),
        sol.compare_mode,
        if sol.is_builtin() { "built-in" } else { "external" },
    );
    for v in &sol.variants {
        println!(
            "  {:<14} {:<12} {}",
            v.name.cyan(),
            v.complexity,
            v.description.dimmed()
        );
    }
    Ok(())
}

/// Runs every problem in `problem_ids` and prints one report per problem.
///
/// Returns the process exit code: 2 if any problem failed to load, else 1 if any case
/// failed, the source aborted or the run was cancelled, else 0.
pub async fn do_run(
    registry: &Registry,
    cfg: &HarnessConfig,
    self_exe: PathBuf,
    problem_ids: &[String],
    opts: &RunOptions,
    cancel: CancellationToken,
    json_out: Option<&Path>,
) -> Result<i32> {
    let executor = Executor::new(cfg.limits())
        .capture_max_bytes(cfg.stdout_capture_max_bytes, cfg.stderr_capture_max_bytes)
        .cancellation(cancel.clone());
    let ctx = LaunchContext {
        self_exe,
        shell: cfg.shell.clone(),
    };
    let orchestrator = Orchestrator::new(registry, executor, ctx)
        .tests_dir(&cfg.tests_dir)
        .compile_before_run(cfg.compile_before_run);

    let mut reports = Vec::new();
    let mut exit_code = EXIT_OK;

    for id in problem_ids {
        if cancel.is_cancelled() {
            break;
        }
        let progress = SpinnerProgress::new();
        let res = orchestrator.run_problem(id, opts, &progress).await;
        progress.finish();

        match res {
            Ok(report) => {
                print_report(&report);
                if report.exit_code() != EXIT_OK {
                    exit_code = exit_code.max(EXIT_FAILURE);
                }
                reports.push(report);
            }
            Err(e) => {
                log::error!("{}: {}", id, e);
                exit_code = EXIT_INTERNAL_ERROR;
            }
        }
    }

    if let Some(path) = json_out {
        fsutil::write_json_pretty_with_mkdir(path, &reports)
            .context("Failed to write JSON report")?;
        log::info!("Wrote {}", path.display());
    }
    Ok(exit_code)
}

struct SpinnerProgress {
    bar: ProgressBar,
}

impl SpinnerProgress {
    fn new() -> Self {
        let style = ProgressStyle::default_spinner()
            .template("{spinner} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner());
        let bar = ProgressBar::new_spinner().with_style(style);
        bar.enable_steady_tick(Duration::from_millis(80));
        Self { bar }
    }

    fn finish(&self) {
        self.bar.finish_and_clear();
    }
}

impl Progress for SpinnerProgress {
    fn problem_started(&self, problem_id: &str, variants: &[Variant], source: &TestSource) {
        let names: Vec<_> = variants.iter().map(|v| v.name.as_str()).collect();
        self.bar.println(format!(
            "{} [{}] {}",
            problem_id.bold().bright_yellow(),
            names.join(", "),
            source.to_string().dimmed()
        ));
        self.bar.set_message(format!("{} ...", problem_id));
    }

    fn case_finished(&self, case: &CaseInfo, results: &[(&Variant, &RunRecord)]) {
        let cells: Vec<_> = results
            .iter()
            .map(|(v, r)| {
                format!(
                    "{} {} {}",
                    v.name,
                    style::judge_icon(r.judge),
                    style::millis(r.time_ms()).dimmed()
                )
            })
            .collect();
        self.bar
            .println(format!("  {:<12} {}", case.name.cyan(), cells.join("  ")));
        self.bar.set_message(format!("{} done ...", case.name));
    }
}

pub fn print_report(report: &Report) {
    let (cols, _) = terminal::size().unwrap_or((80, 40));
    let cols = (cols as usize).max(40);

    println!(
        "\n{} mode={} compare={} seed={}",
        report.problem_id.bold().color(Color::BrightYellow),
        report.mode,
        report.compare_mode,
        report.seed
    );
    println!("{}", "━".repeat(cols).blue().bold());

    if report.no_tests {
        println!("{}", "No tests".yellow().bold());
        return;
    }

    let rows = if report.mode.reports_timing() {
        report.ranked()
    } else {
        report.variants.iter().collect()
    };
    for row in &rows {
        print_variant_row(row);
    }

    for row in &rows {
        print_failures(report, row, cols);
    }

    if let Some(cause) = &report.aborted {
        println!("{} {}", "Aborted:".bright_red().bold(), cause);
    }
    if report.cancelled {
        println!(
            "{}",
            format!("Cancelled after {} case(s)", report.cases.len())
                .yellow()
                .bold()
        );
    }
    print_summary(report);
}

fn print_variant_row(row: &VariantReport) {
    let s = &row.summary;
    let pass = format!("{}/{}", s.passed, s.total);
    let pass = if s.all_passed() {
        pass.green()
    } else {
        pass.bright_red()
    };
    let timing = if s.mean_time_ms.is_finite() {
        format!("{} ±{}", style::millis(s.mean_time_ms), style::millis(s.std_time_ms))
    } else {
        "-".to_owned()
    };
    let fitted = match &s.complexity {
        Some(c) => c.to_string().color(c.label.color()).to_string(),
        None => String::new(),
    };
    println!(
        "  {:<14} {:>9} {:>20} {:>10}  {} {}{}",
        row.variant.name.bold(),
        pass,
        timing,
        style::human_bytes(s.peak_memory_bytes),
        fitted,
        format!("(declared {})", row.variant.complexity).dimmed(),
        if s.shapes_available { "" } else { " [no shapes]" },
    );
}

fn print_failures(report: &Report, row: &VariantReport, cols: usize) {
    let s = &row.summary;
    if s.failures.is_empty() {
        return;
    }
    let causes: Vec<_> = s
        .failures
        .iter()
        .map(|(&judge, &cnt)| {
            format!(
                "{}{}{}",
                style::judge_icon(judge),
                "x".dimmed(),
                cnt.to_string().bold().bright_white()
            )
        })
        .collect();
    println!(
        "\n{}: {}",
        row.variant.name.color(Color::BrightYellow).bold(),
        causes.join(", ")
    );

    let Some((case, rec)) = row.first_failure(&report.cases) else {
        return
    };
    let thin = "─";
    let sub_title = |s: &str| {
        println!(
            "{}{}",
            s.cyan().bold(),
            thin.repeat(cols.saturating_sub(s.len() + 1)).bright_black()
        )
    };

    println!(
        "{}: {} [{}]",
        case.name.color(Color::BrightYellow),
        style::judge_icon(rec.judge),
        style::millis(rec.time_ms())
    );
    match rec.judge {
        JudgeCode::WA => {
            sub_title("[input]");
            print_block(&case.input);
            if let Some(expected) = &case.expected {
                sub_title("[expected]");
                print_block(expected);
            }
            sub_title("[stdout]");
            print_block(&rec.execution.stdout);
        }
        _ => {
            let tail = rec.execution.stderr_tail(STDERR_TAIL_LINES);
            if !tail.is_empty() {
                sub_title("[stderr]");
                println!("{}", tail);
            }
        }
    }
    if rec.execution.truncated {
        println!("{}", "(output truncated)".magenta());
    }
}

fn print_block(s: &str) {
    if s.is_empty() {
        println!("{}", "<EMPTY>".magenta().dimmed());
        return;
    }
    print!("{}", s);
    if !s.ends_with('\n') {
        println!();
    }
}

fn print_summary(report: &Report) {
    let bar = "-".repeat(5);
    let total: usize = report.variants.iter().map(|v| v.summary.total).sum();
    let failed: usize = report
        .variants
        .iter()
        .map(|v| v.summary.total - v.summary.passed)
        .sum();

    let msg = if failed == 0 {
        format!("All {} runs passed ✨", total).green()
    } else if failed < total {
        format!("{}/{} runs failed 💣", failed, total).bright_red()
    } else {
        format!("All {} runs failed 💀", total).bright_red()
    };
    println!("{} {} {}", bar, msg, bar);
}
