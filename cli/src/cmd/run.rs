use std::path::PathBuf;

use anyhow::{ensure, Context as _};
use lcrun_core::{
    action,
    config::{Config, HarnessConfig},
    testing::{Mode, VariantSelector},
};
use tokio_util::sync::CancellationToken;

use crate::util;

use super::{GlobalArgs, SubcmdResult};

#[derive(Debug, clap::Args)]
pub struct Args {
    /// Problem ids, e.g. `0042_trapping_rain_water`.
    #[arg(required = true)]
    pub problems: Vec<String>,

    /// `default`, a variant name, or `all`.
    #[arg(short, long, default_value = "default")]
    pub variant: VariantSelector,

    /// sweep | bench | sanity
    #[arg(short, long, default_value_t)]
    pub mode: Mode,

    #[arg(long)]
    pub seed: Option<u64>,

    /// Number of generated cases.
    #[arg(short = 'n', long)]
    pub count: Option<usize>,

    #[arg(long)]
    pub timeout_ms: Option<u64>,

    /// 0 disables the memory ceiling.
    #[arg(long)]
    pub memory_mb: Option<u64>,

    /// Cases in flight at once (sweep mode).
    #[arg(short, long)]
    pub jobs: Option<usize>,

    /// Runs per case (bench mode).
    #[arg(long)]
    pub repeat: Option<usize>,

    /// Size ladder for bench mode, e.g. `100,1000,10000`.
    #[arg(long, value_delimiter = ',')]
    pub sizes: Option<Vec<usize>>,

    /// Also write the reports as JSON.
    #[arg(long, value_name = "FILE")]
    pub json: Option<PathBuf>,
}

impl Args {
    fn apply(&self, h: &mut HarnessConfig) {
        let Args {
            problems: _,
            variant: _,
            mode: _,
            seed,
            count,
            timeout_ms,
            memory_mb,
            jobs,
            repeat,
            sizes,
            json: _,
        } = self;

        seed.map(|v| h.seed = v);
        count.map(|v| h.generator_count = v);
        timeout_ms.map(|v| h.timeout_ms = v);
        memory_mb.map(|v| h.memory_mb = v);
        jobs.map(|v| h.jobs = v);
        repeat.map(|v| h.repeat = v);
        if let Some(v) = sizes {
            h.sizes = v.clone();
        }
    }
}

pub fn exec(args: &Args, _: &GlobalArgs) -> SubcmdResult {
    let cfg = Config::from_file_finding_in_ancestors(util::current_dir())?.with_env_overrides()?;
    let mut harness = cfg.harness;
    args.apply(&mut harness);
    ensure!(harness.jobs >= 1, "--jobs must be at least 1");
    ensure!(harness.repeat >= 1, "--repeat must be at least 1");
    ensure!(harness.timeout_ms >= 1, "--timeout-ms must be at least 1");

    let registry = util::registry(&harness)?;
    let opts = harness.run_options(args.mode, args.variant.clone());
    let self_exe = std::env::current_exe().context("Cannot locate the lcrun executable")?;

    let rt = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("Failed to start the async runtime")?;

    rt.block_on(async {
        let cancel = CancellationToken::new();
        let on_ctrl_c = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                log::warn!("Interrupted; stopping running children...");
                on_ctrl_c.cancel();
            }
        });

        action::do_run(
            &registry,
            &harness,
            self_exe,
            &args.problems,
            &opts,
            cancel,
            args.json.as_deref(),
        )
        .await
    })
}
