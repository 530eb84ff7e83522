//! Plug-ins written in other languages, discovered by file name.
//!
//! `solutions/<id>.<ext>` is run through the first `[[harness.command]]` entry whose pattern
//! matches its file name. An optional `solutions/<id>.toml` declares the compare mode and the
//! variants; the variant key reaches the program as `LCRUN_VARIANT` and `#{variant}`.
//!
//! `generators/<id>.<ext>` goes through the same commands with `#{variant}` empty. It reads
//! `LCRUN_GEN_COUNT` and `LCRUN_GEN_SEED` (plus `LCRUN_GEN_SIZE` when a single input of that
//! logical size is wanted) and writes its inputs to stdout, each one followed by a
//! `__END_CASE__` line. The marker may be left off the last input.

use std::{
    collections::{BTreeMap, HashMap},
    ffi::OsStr,
    path::{Path, PathBuf},
    process::{Command, Stdio},
    sync::Mutex,
};

use anyhow::{anyhow, ensure, Context as _};
use serde::Deserialize;

use super::problem::{CompareMode, Generator, PluginError, Variant, DEFAULT_VARIANT};
use crate::{config::CommandConfig, str_interp::Template};

pub const GEN_COUNT_ENV: &str = "LCRUN_GEN_COUNT";
pub const GEN_SEED_ENV: &str = "LCRUN_GEN_SEED";
pub const GEN_SIZE_ENV: &str = "LCRUN_GEN_SIZE";
pub const CASE_END_MARKER: &str = "__END_CASE__";

#[derive(Debug, Clone)]
pub struct ExternalPlugins {
    solutions_dir: PathBuf,
    generators_dir: Option<PathBuf>,
    shell: PathBuf,
    commands: Vec<CommandConfig>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
struct Manifest {
    #[serde(default)]
    compare_mode: CompareMode,

    #[serde(default)]
    variants: BTreeMap<String, VariantManifest>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
struct VariantManifest {
    #[serde(default)]
    complexity: Option<String>,

    #[serde(default)]
    description: String,
}

/// A located external solution file together with its rendered commands.
#[derive(Debug, Clone)]
pub struct ExternalPlugin {
    pub file: PathBuf,
    pub compile: Option<String>,
    run: Template,
    vars: HashMap<&'static str, String>,
}

/// A generator program under the generators dir.
#[derive(Debug)]
pub struct ExternalGenerator {
    pub file: PathBuf,
    shell: PathBuf,
    compile: Option<String>,
    run: String,
    built: Mutex<bool>,
}

#[derive(Debug)]
pub(crate) struct Discovered {
    pub plugin: ExternalPlugin,
    pub variants: Vec<Variant>,
    pub compare_mode: CompareMode,
}

impl ExternalPlugins {
    pub fn new(solutions_dir: impl Into<PathBuf>, commands: Vec<CommandConfig>) -> Self {
        Self {
            solutions_dir: solutions_dir.into(),
            generators_dir: None,
            shell: PathBuf::from("/bin/sh"),
            commands,
        }
    }

    pub fn generators_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.generators_dir = Some(dir.into());
        self
    }

    /// Shell that runs generator programs. Solutions get theirs from the launch context.
    pub fn shell(mut self, shell: impl Into<PathBuf>) -> Self {
        self.shell = shell.into();
        self
    }

    pub fn solutions_dir(&self) -> &Path {
        &self.solutions_dir
    }

    pub(crate) fn find(&self, problem_id: &str) -> Result<Option<Discovered>, PluginError> {
        let Some((file, cmd)) = self.locate(&self.solutions_dir, problem_id)? else {
            return Ok(None)
        };

        let vars = make_cmd_interp_vars(&file, problem_id);
        let run = Template::parse(&cmd.run).map_err(|e| PluginError::Template(file.clone(), e))?;
        let compile = render_compile(cmd, &file, &vars)?;

        let plugin = ExternalPlugin {
            file,
            compile,
            run,
            vars,
        };
        // Surface template errors at load time rather than on the first case.
        plugin.run_command(DEFAULT_VARIANT)?;

        let manifest_path = self.solutions_dir.join(format!("{}.toml", problem_id));
        let manifest = match fsutil::read_to_string_if_exists(&manifest_path)? {
            Some(toml) => toml::from_str::<Manifest>(&toml)
                .map_err(|e| PluginError::Manifest(manifest_path.clone(), e.to_string()))?,
            None => Manifest::default(),
        };
        if manifest.compare_mode == CompareMode::Custom {
            return Err(PluginError::MissingJudge(problem_id.to_owned()));
        }

        Ok(Some(Discovered {
            plugin,
            variants: manifest_variants(problem_id, manifest.variants)?,
            compare_mode: manifest.compare_mode,
        }))
    }

    pub(crate) fn find_generator(
        &self,
        problem_id: &str,
    ) -> Result<Option<ExternalGenerator>, PluginError> {
        let Some(dir) = &self.generators_dir else {
            return Ok(None)
        };
        let Some((file, cmd)) = self.locate(dir, problem_id)? else {
            return Ok(None)
        };

        let mut vars = make_cmd_interp_vars(&file, problem_id);
        vars.insert("variant", String::new());
        let run = Template::parse(&cmd.run)
            .and_then(|t| t.render(&vars))
            .map_err(|e| PluginError::Template(file.clone(), e))?;
        let compile = render_compile(cmd, &file, &vars)?;

        Ok(Some(ExternalGenerator {
            file,
            shell: self.shell.clone(),
            compile,
            run,
            built: Mutex::new(false),
        }))
    }

    /// The first `<id>.<ext>` in `dir` that a command pattern matches, with that command.
    fn locate(
        &self,
        dir: &Path,
        problem_id: &str,
    ) -> Result<Option<(PathBuf, &CommandConfig)>, PluginError> {
        for cmd in &self.commands {
            if let Some(file) = fsutil::find_file_by_stem(dir, problem_id, &cmd.pattern)? {
                return Ok(Some((file, cmd)));
            }
        }
        ensure_no_unmatched_file(dir, problem_id)?;
        Ok(None)
    }
}

/// A plug-in file that no command pattern matches is a configuration error, not "not found".
fn ensure_no_unmatched_file(dir: &Path, problem_id: &str) -> Result<(), PluginError> {
    let prefix = format!("{}.", problem_id);
    let stray = fsutil::list_files_with_prefix(dir, &prefix)?
        .into_iter()
        .find(|p| p.extension() != Some(OsStr::new("toml")));
    match stray {
        Some(file) => Err(PluginError::NoCommand(file)),
        None => Ok(()),
    }
}

fn render_compile(
    cmd: &CommandConfig,
    file: &Path,
    vars: &HashMap<&'static str, String>,
) -> Result<Option<String>, PluginError> {
    cmd.compile
        .as_ref()
        .map(|fmt| Template::parse(fmt).and_then(|t| t.render(vars)))
        .transpose()
        .map_err(|e| PluginError::Template(file.to_owned(), e))
}

fn manifest_variants(
    problem_id: &str,
    declared: BTreeMap<String, VariantManifest>,
) -> Result<Vec<Variant>, PluginError> {
    if declared.is_empty() {
        return Ok(vec![Variant::new(DEFAULT_VARIANT, "unknown", "")]);
    }
    if !declared.contains_key(DEFAULT_VARIANT) {
        return Err(PluginError::NoDefaultVariant(problem_id.to_owned()));
    }
    let mut variants: Vec<_> = declared
        .into_iter()
        .map(|(name, v)| {
            let complexity = v.complexity.unwrap_or_else(|| "unknown".to_owned());
            Variant::new(name, complexity, v.description)
        })
        .collect();
    variants.sort_by_key(|v| !v.is_default());
    Ok(variants)
}

fn make_cmd_interp_vars(filepath: &Path, problem_id: &str) -> HashMap<&'static str, String> {
    let lossy = |s: Option<&OsStr>, fallback: &str| {
        s.map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| fallback.to_owned())
    };
    let mut m = HashMap::new();
    m.insert("filePath", filepath.to_string_lossy().into_owned());
    m.insert("fileName", lossy(filepath.file_name(), problem_id));
    m.insert(
        "fileDir",
        lossy(filepath.parent().map(Path::as_os_str), "."),
    );
    m.insert("fileStem", lossy(filepath.file_stem(), problem_id));
    m.insert("fileExt", lossy(filepath.extension(), ""));
    m.insert("problemId", problem_id.to_owned());
    m
}

impl ExternalPlugin {
    pub fn run_command(&self, variant: &str) -> Result<String, PluginError> {
        let mut vars = self.vars.clone();
        vars.insert("variant", variant.to_owned());
        self.run
            .render(&vars)
            .map_err(|e| PluginError::Template(self.file.clone(), e))
    }
}

impl ExternalGenerator {
    /// Runs the program once. Inputs it finished before failing come first, then the error.
    fn produce(&self, count: usize, seed: u64, size: Option<usize>) -> Vec<anyhow::Result<String>> {
        if let Err(e) = self.build() {
            return vec![Err(e)];
        }
        let mut cmd = Command::new(&self.shell);
        cmd.arg("-c")
            .arg(&self.run)
            .env(GEN_COUNT_ENV, count.to_string())
            .env(GEN_SEED_ENV, seed.to_string())
            .stdin(Stdio::null());
        if let Some(n) = size {
            cmd.env(GEN_SIZE_ENV, n.to_string());
        }
        log::debug!("Generating {} input(s) with '{}'", count, self.run);

        let out = match cmd.output() {
            Ok(out) => out,
            Err(e) => return vec![Err(anyhow!("Failed to spawn generator '{}': {}", self.run, e))],
        };
        let Ok(stdout) = String::from_utf8(out.stdout) else {
            return vec![Err(anyhow!("Generator {} wrote non-UTF-8 output", self.file.display()))]
        };

        let (mut inputs, rest) = split_inputs(&stdout);
        if out.status.success() {
            inputs.extend(rest);
            return inputs.into_iter().take(count).map(Ok).collect();
        }
        let stderr = String::from_utf8_lossy(&out.stderr);
        let mut res: Vec<_> = inputs.into_iter().take(count).map(Ok).collect();
        res.push(Err(anyhow!(
            "Generator {} failed ({}): {}",
            self.file.display(),
            out.status,
            stderr.trim_end()
        )));
        res
    }

    fn build(&self) -> anyhow::Result<()> {
        let Some(cmd) = &self.compile else {
            return Ok(())
        };
        let mut built = self
            .built
            .lock()
            .map_err(|_| anyhow!("A previous build of {} panicked", self.file.display()))?;
        if *built {
            return Ok(());
        }
        log::info!("Compiling {}", self.file.display());
        log::info!("{}", cmd);
        let status = Command::new(&self.shell)
            .arg("-c")
            .arg(cmd)
            .stdin(Stdio::null())
            .status()
            .with_context(|| format!("Failed to spawn '{}'", cmd))?;
        ensure!(
            status.success(),
            "Failed to compile generator {}: {}",
            self.file.display(),
            status
        );
        *built = true;
        Ok(())
    }
}

impl Generator for ExternalGenerator {
    fn generate(
        &self,
        count: usize,
        seed: u64,
    ) -> Box<dyn Iterator<Item = anyhow::Result<String>> + Send + '_> {
        if count == 0 {
            return Box::new(std::iter::empty());
        }
        Box::new(self.produce(count, seed, None).into_iter())
    }

    /// Programs that ignore `LCRUN_GEN_SIZE` still yield an input; its real size reaches the
    /// fit through the shape protocol.
    fn generate_for_size(&self, n: usize, seed: u64) -> Option<anyhow::Result<String>> {
        self.produce(1, seed, Some(n)).into_iter().next()
    }
}

/// Inputs terminated by the marker line, and the unterminated tail if it is not blank.
fn split_inputs(stdout: &str) -> (Vec<String>, Option<String>) {
    let mut inputs = Vec::new();
    let mut cur = String::new();
    for line in stdout.lines() {
        if line.trim_end() == CASE_END_MARKER {
            inputs.push(std::mem::take(&mut cur));
        } else {
            cur.push_str(line);
            cur.push('\n');
        }
    }
    let rest = (!cur.trim().is_empty()).then_some(cur);
    (inputs, rest)
}
