mod cmd;
mod util;

use clap::Parser;
use cmd::GlobalArgs;
use lcrun_core::testing::report::EXIT_INTERNAL_ERROR;

fn main() {
    let app = GlobalArgs::parse();
    util::init_logger(app.is_child());

    let code = app.exec_subcmd().unwrap_or_else(|e| {
        eprintln!("Error: {:?}", e);
        EXIT_INTERNAL_ERROR
    });
    std::process::exit(code);
}
