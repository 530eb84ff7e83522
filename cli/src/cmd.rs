pub mod exec;
pub mod init;
pub mod list;
pub mod run;

#[derive(Debug, clap::Parser)]
#[command(author, version, about, long_about = None)]
pub struct GlobalArgs {
    #[command(subcommand)]
    pub subcmd: Subcommand,
}

#[derive(Debug, clap::Subcommand)]
pub enum Subcommand {
    #[command(alias("r"))]
    Run(run::Args),

    #[command(alias("ls"))]
    List(list::Args),

    Init(init::Args),

    /// Child entry point: runs one variant on stdin.
    #[command(name = "__exec", hide = true)]
    Exec(exec::Args),
}

/// Process exit code on success.
pub type SubcmdResult = anyhow::Result<i32>;

impl GlobalArgs {
    pub fn is_child(&self) -> bool {
        matches!(self.subcmd, Subcommand::Exec(_))
    }

    pub fn exec_subcmd(&self) -> SubcmdResult {
        use Subcommand::*;
        match &self.subcmd {
            Run(args) => run::exec(args, self),
            List(args) => list::exec(args, self),
            Init(args) => init::exec(args, self),
            Exec(args) => exec::exec(args, self),
        }
    }
}
