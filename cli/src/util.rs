use std::{
    path::{Path, PathBuf},
    process::exit,
};

use lcrun_core::{
    config::HarnessConfig,
    plugin::{ExternalPlugins, Registry},
};

/// The child keeps stderr for the solution unless `RUST_LOG` asks otherwise.
pub fn init_logger(is_child: bool) {
    if is_child && std::env::var_os("RUST_LOG").is_none() {
        return;
    }
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp(None)
        .init();
}

pub fn current_dir() -> PathBuf {
    std::env::current_dir().unwrap_or_else(|e| {
        eprintln!("Failed to get current dir: {}", e);
        exit(2);
    })
}

/// Built-in problems plus the external plug-ins under `solutions_dir` and `generators_dir`.
pub fn registry(cfg: &HarnessConfig) -> anyhow::Result<Registry> {
    let external = ExternalPlugins::new(&cfg.solutions_dir, cfg.command.clone())
        .generators_dir(&cfg.generators_dir)
        .shell(&cfg.shell);
    Ok(lcrun_problems::registry()?.with_external(external))
}

pub fn replace_homedir_to_tilde(path: impl Into<PathBuf>) -> PathBuf {
    let path = path.into();
    let Some(home_dir) = ::dirs::home_dir() else {
        return path
    };
    path.strip_prefix(home_dir)
        .map(|path| Path::new("~").join(path))
        .unwrap_or(path)
}
