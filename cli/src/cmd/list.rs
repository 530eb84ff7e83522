use lcrun_core::{action, config::Config};

use crate::util;

use super::{GlobalArgs, SubcmdResult};

#[derive(Debug, clap::Args)]
pub struct Args {
    /// Show the variants of this problem (built-in or under solutions/).
    pub problem_id: Option<String>,
}

pub fn exec(args: &Args, _: &GlobalArgs) -> SubcmdResult {
    let cfg = Config::from_file_finding_in_ancestors(util::current_dir())?;
    let registry = util::registry(&cfg.harness)?;
    action::list_problems(&registry, args.problem_id.as_deref())?;
    Ok(0)
}
