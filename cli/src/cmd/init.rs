use lcrun_core::{action, print_success};
use std::path::PathBuf;

use crate::util;

use super::{GlobalArgs, SubcmdResult};

#[derive(Debug, clap::Args)]
pub struct Args {
    #[arg(default_value = "./")]
    dir: PathBuf,
}

pub fn exec(args: &Args, _: &GlobalArgs) -> SubcmdResult {
    let config_file = action::init_repository(&args.dir)?;
    print_success!(
        "Wrote {}; put solutions under solutions/ and fixtures under tests/.",
        util::replace_homedir_to_tilde(config_file).display()
    );
    Ok(0)
}
