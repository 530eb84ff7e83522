use lcrun_core::child;

use super::{GlobalArgs, SubcmdResult};

#[derive(Debug, clap::Args)]
pub struct Args {
    pub problem_id: String,

    /// Falls back to $LCRUN_VARIANT, then `default`.
    #[arg(long)]
    pub variant: Option<String>,
}

pub fn exec(args: &Args, _: &GlobalArgs) -> SubcmdResult {
    let registry = lcrun_problems::registry()?;
    child::serve(&registry, &args.problem_id, args.variant.as_deref())?;
    Ok(0)
}
