use std::{fmt, path::PathBuf, sync::Arc};

use rand::{rngs::StdRng, SeedableRng as _};
use serde::{Deserialize, Serialize};

use crate::str_interp::InterpError;

pub const DEFAULT_VARIANT: &str = "default";

/// Entry point of a built-in variant: the whole stdin in, the whole stdout out.
pub type SolveFn = fn(&str) -> anyhow::Result<String>;

/// Custom correctness check: `(actual, expected, raw_input) -> pass`.
///
/// `expected` is `None` when the test case carries no expected output; the judge must then
/// verify `actual` against the input on its own.
pub type JudgeFn = fn(&str, Option<&str>, &str) -> bool;

/// How outputs of a problem are compared. A property of the problem, shared by all variants.
#[derive(
    Debug,
    Clone,
    Copy,
    Default,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    strum::Display,
    strum::EnumString,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum CompareMode {
    #[default]
    Exact,
    Sorted,
    Set,
    Custom,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Variant {
    pub name: String,
    pub complexity: String,
    pub description: String,
}

impl Variant {
    pub fn new(
        name: impl Into<String>,
        complexity: impl Into<String>,
        description: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            complexity: complexity.into(),
            description: description.into(),
        }
    }

    pub fn is_default(&self) -> bool {
        self.name == DEFAULT_VARIANT
    }
}

#[derive(Debug, thiserror::Error)]
pub enum PluginError {
    #[error("No solution plug-in for '{0}' (neither built-in nor under '{1}')")]
    NotFound(String, PathBuf),

    #[error("Problem '{0}' is registered twice")]
    DuplicateProblem(String),

    #[error("Problem '{0}' declares no variants")]
    NoVariants(String),

    #[error("Problem '{0}' declares no 'default' variant")]
    NoDefaultVariant(String),

    #[error("Problem '{0}' declares variant '{1}' twice")]
    DuplicateVariant(String, String),

    #[error("Problem '{0}' uses compare mode 'custom' without a judge")]
    MissingJudge(String),

    #[error("Problem '{0}' has no variant '{1}'")]
    UnknownVariant(String, String),

    #[error("Invalid manifest '{0}': {1}")]
    Manifest(PathBuf, String),

    #[error("No command configured for '{0}' (no entry in `harness.command[]` matches)")]
    NoCommand(PathBuf),

    #[error("Invalid command template for '{0}': {1}")]
    Template(PathBuf, #[source] InterpError),

    #[error("Failed to compile '{0}': {1}")]
    Compile(PathBuf, String),

    #[error(transparent)]
    Fs(#[from] fsutil::Error),
}

/// Produces test inputs for one problem, deterministically from a seed.
pub trait Generator: Send + Sync {
    fn generate(
        &self,
        count: usize,
        seed: u64,
    ) -> Box<dyn Iterator<Item = anyhow::Result<String>> + Send + '_>;

    /// A single input of logical size `n`, or `None` when sizing is unsupported.
    fn generate_for_size(&self, _n: usize, _seed: u64) -> Option<anyhow::Result<String>> {
        None
    }
}

/// A [`Generator`] made of plain functions over a seeded RNG.
#[derive(Debug, Clone, Copy)]
pub struct FnGenerator {
    case: fn(&mut StdRng) -> String,
    sized: Option<fn(&mut StdRng, usize) -> String>,
}

impl FnGenerator {
    pub fn new(case: fn(&mut StdRng) -> String) -> Self {
        Self { case, sized: None }
    }

    pub fn sized(mut self, sized: fn(&mut StdRng, usize) -> String) -> Self {
        self.sized = Some(sized);
        self
    }
}

impl Generator for FnGenerator {
    fn generate(
        &self,
        count: usize,
        seed: u64,
    ) -> Box<dyn Iterator<Item = anyhow::Result<String>> + Send + '_> {
        let mut rng = StdRng::seed_from_u64(seed);
        let case = self.case;
        Box::new((0..count).map(move |_| Ok(case(&mut rng))))
    }

    fn generate_for_size(&self, n: usize, seed: u64) -> Option<anyhow::Result<String>> {
        let sized = self.sized?;
        let mut rng = StdRng::seed_from_u64(seed ^ (n as u64).rotate_left(32));
        Some(Ok(sized(&mut rng, n)))
    }
}

/// Registration record of a built-in problem.
#[derive(Clone)]
pub struct ProblemDef {
    pub(crate) id: String,
    pub(crate) variants: Vec<(Variant, SolveFn)>,
    pub(crate) compare_mode: CompareMode,
    pub(crate) judge: Option<JudgeFn>,
    pub(crate) generator: Option<Arc<dyn Generator>>,
}

impl ProblemDef {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            variants: Vec::new(),
            compare_mode: CompareMode::default(),
            judge: None,
            generator: None,
        }
    }

    /// Registers `solve` as the lone `default` variant.
    pub fn solution(self, solve: SolveFn) -> Self {
        self.variant(DEFAULT_VARIANT, solve, "unknown", "")
    }

    pub fn variant(
        mut self,
        name: &str,
        solve: SolveFn,
        complexity: &str,
        description: &str,
    ) -> Self {
        self.variants
            .push((Variant::new(name, complexity, description), solve));
        self
    }

    pub fn compare(mut self, mode: CompareMode) -> Self {
        self.compare_mode = mode;
        self
    }

    /// Sets a judge and switches the problem to [`CompareMode::Custom`].
    pub fn judge(mut self, judge: JudgeFn) -> Self {
        self.judge = Some(judge);
        self.compare_mode = CompareMode::Custom;
        self
    }

    pub fn generator(mut self, generator: impl Generator + 'static) -> Self {
        self.generator = Some(Arc::new(generator));
        self
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn variants(&self) -> impl Iterator<Item = &Variant> {
        self.variants.iter().map(|(v, _)| v)
    }

    pub(crate) fn validate(&self) -> Result<(), PluginError> {
        let id = || self.id.clone();
        if self.variants.is_empty() {
            return Err(PluginError::NoVariants(id()));
        }
        for (i, (v, _)) in self.variants.iter().enumerate() {
            if self.variants[..i].iter().any(|(w, _)| w.name == v.name) {
                return Err(PluginError::DuplicateVariant(id(), v.name.clone()));
            }
        }
        if !self.variants.iter().any(|(v, _)| v.is_default()) {
            return Err(PluginError::NoDefaultVariant(id()));
        }
        if self.compare_mode == CompareMode::Custom && self.judge.is_none() {
            return Err(PluginError::MissingJudge(id()));
        }
        Ok(())
    }
}

impl fmt::Debug for ProblemDef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProblemDef")
            .field("id", &self.id)
            .field("variants", &self.variants().collect::<Vec<_>>())
            .field("compare_mode", &self.compare_mode)
            .field("judge", &self.judge.is_some())
            .field("generator", &self.generator.is_some())
            .finish()
    }
}
