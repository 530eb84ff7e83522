use std::{
    path::{Path, PathBuf},
    time::Duration,
};

use anyhow::Context as _;
use rust_embed::RustEmbed;
use serde::Deserialize;

use crate::{
    serdable::GlobPattern,
    testing::{Limits, Mode, RunOptions, VariantSelector},
};

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    #[serde(skip)]
    pub source_config_file: Option<PathBuf>,

    #[serde(default)]
    pub harness: HarnessConfig,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct HarnessConfig {
    pub solutions_dir: PathBuf,
    pub generators_dir: PathBuf,
    pub tests_dir: PathBuf,
    pub shell: PathBuf,
    pub timeout_ms: u64,
    /// `0` disables the memory ceiling.
    pub memory_mb: u64,
    pub generator_count: usize,
    pub sanity_count: usize,
    pub seed: u64,
    pub repeat: usize,
    pub sizes: Vec<usize>,
    pub jobs: usize,
    pub compile_before_run: bool,
    pub stdout_capture_max_bytes: usize,
    pub stderr_capture_max_bytes: usize,
    pub command: Vec<CommandConfig>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CommandConfig {
    pub pattern: GlobPattern,
    pub compile: Option<String>,
    pub run: String,
}

impl Default for HarnessConfig {
    fn default() -> Self {
        let cmd = |pattern: &str, compile: Option<&str>, run: &str| CommandConfig {
            pattern: GlobPattern::parse(pattern).expect("built-in pattern"),
            compile: compile.map(ToOwned::to_owned),
            run: run.to_owned(),
        };
        Self {
            solutions_dir: PathBuf::from("./solutions"),
            generators_dir: PathBuf::from("./generators"),
            tests_dir: PathBuf::from("./tests"),
            shell: PathBuf::from("/bin/sh"),
            timeout_ms: 2000,
            memory_mb: 1024,
            generator_count: 10,
            sanity_count: 3,
            seed: 0,
            repeat: 1,
            sizes: vec![100, 1000, 10000],
            jobs: 1,
            compile_before_run: true,
            stdout_capture_max_bytes: 16 * 1024 * 1024,
            stderr_capture_max_bytes: 16 * 1024 * 1024,
            command: vec![
                cmd("*.py", None, "python3 #{filePath}"),
                cmd(
                    "*.cpp",
                    Some("g++ -std=c++17 -O2 -o #{fileDir}/#{fileStem}.out #{filePath}"),
                    "#{fileDir}/#{fileStem}.out",
                ),
                cmd("*.js", None, "node #{filePath}"),
            ],
        }
    }
}

#[derive(RustEmbed)]
#[folder = "assets/"]
struct Asset;

impl Config {
    pub const FILENAME: &str = "lcrun.toml";

    pub fn example_toml() -> String {
        Asset::get(Self::FILENAME)
            .map(|file| String::from_utf8_lossy(file.data.as_ref()).into_owned())
            .unwrap_or_default()
    }

    pub fn from_toml(s: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(s)
    }

    /// Reads `filepath`; relative paths inside are resolved against its directory.
    pub fn from_toml_file(filepath: PathBuf) -> anyhow::Result<Self> {
        let toml = fsutil::read_to_string(&filepath).context("Cannot read a file")?;
        let mut cfg = Self::from_toml(&toml)
            .with_context(|| format!("Invalid config TOML: {:?}", filepath))?;
        let base = filepath.parent().unwrap_or(Path::new(".")).to_owned();
        cfg.harness.resolve_paths(&base);
        cfg.source_config_file = Some(filepath);
        Ok(cfg)
    }

    /// Find config file ancestor dirs, including current dir.
    pub fn find_file_in_ancestors(cur_dir: impl AsRef<Path>) -> Option<PathBuf> {
        cur_dir
            .as_ref()
            .ancestors()
            .map(|dir| dir.join(Self::FILENAME))
            .find(|path| path.is_file())
    }

    /// The nearest `lcrun.toml`, or the built-in defaults relative to `cur_dir`.
    pub fn from_file_finding_in_ancestors(cur_dir: impl AsRef<Path>) -> anyhow::Result<Self> {
        let cur_dir = cur_dir.as_ref();
        match Self::find_file_in_ancestors(cur_dir) {
            Some(path) => {
                log::debug!("Using config {}", path.display());
                Self::from_toml_file(path)
            }
            None => {
                log::debug!(
                    "No '{}' in {} or its ancestors; using defaults",
                    Self::FILENAME,
                    cur_dir.display()
                );
                let mut cfg = Self::default();
                cfg.harness.resolve_paths(cur_dir);
                Ok(cfg)
            }
        }
    }

    pub fn with_env_overrides(mut self) -> anyhow::Result<Self> {
        let env = EnvOverrides::from_env().context("Invalid LCRUN_* environment variable")?;
        env.apply(&mut self.harness);
        Ok(self)
    }
}

impl HarnessConfig {
    fn resolve_paths(&mut self, base: &Path) {
        for p in [
            &mut self.solutions_dir,
            &mut self.generators_dir,
            &mut self.tests_dir,
        ] {
            if p.is_relative() {
                *p = fsutil::normalize_path(base.join(&*p));
            }
        }
    }

    pub fn limits(&self) -> Limits {
        Limits {
            timeout: Duration::from_millis(self.timeout_ms),
            memory_bytes: (self.memory_mb > 0).then(|| self.memory_mb * 1024 * 1024),
        }
    }

    pub fn run_options(&self, mode: Mode, selector: VariantSelector) -> RunOptions {
        RunOptions {
            mode,
            selector,
            seed: self.seed,
            count: self.generator_count,
            sanity_count: self.sanity_count,
            jobs: self.jobs,
            repeat: self.repeat,
            sizes: self.sizes.clone(),
        }
    }
}

/// `LCRUN_TIMEOUT_MS`, `LCRUN_MEMORY_MB`, `LCRUN_SEED`, `LCRUN_JOBS`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct EnvOverrides {
    pub timeout_ms: Option<u64>,
    pub memory_mb: Option<u64>,
    pub seed: Option<u64>,
    pub jobs: Option<usize>,
}

impl EnvOverrides {
    pub const PREFIX: &str = "LCRUN_";

    pub fn from_env() -> Result<Self, envy::Error> {
        envy::prefixed(Self::PREFIX).from_env()
    }

    pub fn from_iter<I>(vars: I) -> Result<Self, envy::Error>
    where
        I: IntoIterator<Item = (String, String)>,
    {
        envy::prefixed(Self::PREFIX).from_iter(vars)
    }

    pub fn apply(&self, h: &mut HarnessConfig) {
        if let Some(v) = self.timeout_ms {
            h.timeout_ms = v;
        }
        if let Some(v) = self.memory_mb {
            h.memory_mb = v;
        }
        if let Some(v) = self.seed {
            h.seed = v;
        }
        if let Some(v) = self.jobs {
            h.jobs = v;
        }
    }
}
