//! The child side of an invocation: `lcrun __exec <problem-id> [--variant <key>]`.
//!
//! Runs without an async runtime so that the address-space ceiling set by the parent is spent
//! on the solution alone.

use std::io::{self, Read as _, Write};

use anyhow::Context as _;

use crate::plugin::{Registry, SolveFn, DEFAULT_VARIANT};

pub const EXEC_SUBCOMMAND: &str = "__exec";

/// Variant key for the child when `--variant` is absent. External plug-ins read it too.
pub const VARIANT_ENV: &str = "LCRUN_VARIANT";

pub const PROBLEM_ENV: &str = "LCRUN_PROBLEM";

/// `--variant`, else `$LCRUN_VARIANT`, else `default`.
pub fn resolve_variant_key(flag: Option<&str>) -> String {
    flag.map(ToOwned::to_owned)
        .or_else(|| std::env::var(VARIANT_ENV).ok().filter(|v| !v.is_empty()))
        .unwrap_or_else(|| DEFAULT_VARIANT.to_owned())
}

/// Reads the whole stdin, runs the selected variant and writes its answer to stdout.
pub fn serve(registry: &Registry, problem_id: &str, variant: Option<&str>) -> anyhow::Result<()> {
    let key = resolve_variant_key(variant);
    let solve = registry.dispatch(problem_id, &key)?;

    let mut input = String::new();
    io::stdin()
        .read_to_string(&mut input)
        .context("Failed to read input from stdin")?;

    let stdout = io::stdout();
    serve_io(solve, &input, &mut stdout.lock())
}

pub fn serve_io(solve: SolveFn, input: &str, out: &mut impl Write) -> anyhow::Result<()> {
    let answer = solve(input)?;
    out.write_all(answer.as_bytes())?;
    if !answer.is_empty() && !answer.ends_with('\n') {
        out.write_all(b"\n")?;
    }
    out.flush()?;
    Ok(())
}
