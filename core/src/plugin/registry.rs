use std::{
    collections::BTreeMap,
    path::{Path, PathBuf},
    sync::Arc,
};

use super::{
    external::{ExternalPlugin, ExternalPlugins},
    problem::*,
};
use crate::{
    child::{EXEC_SUBCOMMAND, PROBLEM_ENV, VARIANT_ENV},
    testing::{executor, Launch},
};

/// Problem id → plug-in. Built-in problems win over external files with the same id.
#[derive(Debug, Default)]
pub struct Registry {
    problems: BTreeMap<String, ProblemDef>,
    external: Option<ExternalPlugins>,
}

#[derive(Debug, Clone)]
pub enum Origin {
    Builtin,
    External(ExternalPlugin),
}

/// A loaded solution plug-in, ready to be launched.
#[derive(Debug, Clone)]
pub struct Solution {
    pub problem_id: String,
    pub variants: Vec<Variant>,
    pub compare_mode: CompareMode,
    pub judge: Option<JudgeFn>,
    pub origin: Origin,
}

/// How the parent starts children: itself for built-ins, a shell for external plug-ins.
#[derive(Debug, Clone)]
pub struct LaunchContext {
    pub self_exe: PathBuf,
    pub shell: PathBuf,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_external(mut self, external: ExternalPlugins) -> Self {
        self.external = Some(external);
        self
    }

    pub fn register(&mut self, def: ProblemDef) -> Result<(), PluginError> {
        def.validate()?;
        if self.problems.contains_key(&def.id) {
            return Err(PluginError::DuplicateProblem(def.id));
        }
        self.problems.insert(def.id.clone(), def);
        Ok(())
    }

    pub fn builtin_problems(&self) -> impl Iterator<Item = &ProblemDef> {
        self.problems.values()
    }

    pub fn load_solution(&self, problem_id: &str) -> Result<Solution, PluginError> {
        if let Some(def) = self.problems.get(problem_id) {
            return Ok(Solution {
                problem_id: def.id.clone(),
                variants: def.variants().cloned().collect(),
                compare_mode: def.compare_mode,
                judge: def.judge,
                origin: Origin::Builtin,
            });
        }

        let discovered = match &self.external {
            Some(ext) => ext.find(problem_id)?,
            None => None,
        };
        let Some(found) = discovered else {
            let dir = self
                .external
                .as_ref()
                .map(|e| e.solutions_dir().to_owned())
                .unwrap_or_default();
            return Err(PluginError::NotFound(problem_id.to_owned(), dir))
        };
        log::debug!("Loaded external plug-in {}", found.plugin.file.display());
        Ok(Solution {
            problem_id: problem_id.to_owned(),
            variants: found.variants,
            compare_mode: found.compare_mode,
            judge: None,
            origin: Origin::External(found.plugin),
        })
    }

    /// The built-in generator of `problem_id`, else a program under the generators dir.
    pub fn load_generator(
        &self,
        problem_id: &str,
    ) -> Result<Option<Arc<dyn Generator>>, PluginError> {
        let builtin = self.problems.get(problem_id).and_then(|d| d.generator.clone());
        if builtin.is_some() {
            return Ok(builtin);
        }
        let Some(ext) = &self.external else {
            return Ok(None)
        };
        Ok(ext.find_generator(problem_id)?.map(|generator| {
            log::debug!("Loaded external generator {}", generator.file.display());
            Arc::new(generator) as Arc<dyn Generator>
        }))
    }

    /// Child side: resolves a variant key to its entry point without touching other problems.
    pub fn dispatch(&self, problem_id: &str, variant: &str) -> Result<SolveFn, PluginError> {
        let def = self.problems.get(problem_id).ok_or_else(|| {
            PluginError::NotFound(problem_id.to_owned(), PathBuf::from("<built-in>"))
        })?;
        def.variants
            .iter()
            .find(|(v, _)| v.name == variant)
            .map(|&(_, solve)| solve)
            .ok_or_else(|| PluginError::UnknownVariant(problem_id.to_owned(), variant.to_owned()))
    }
}

impl Solution {
    pub fn variant(&self, name: &str) -> Option<&Variant> {
        self.variants.iter().find(|v| v.name == name)
    }

    pub fn is_builtin(&self) -> bool {
        matches!(self.origin, Origin::Builtin)
    }

    pub fn launch(&self, variant: &str, ctx: &LaunchContext) -> Result<Launch, PluginError> {
        if self.variant(variant).is_none() {
            return Err(PluginError::UnknownVariant(
                self.problem_id.clone(),
                variant.to_owned(),
            ));
        }
        let launch = match &self.origin {
            Origin::Builtin => Launch::new(&ctx.self_exe)
                .arg(EXEC_SUBCOMMAND)
                .arg(&self.problem_id)
                .arg("--variant")
                .arg(variant),
            Origin::External(plugin) => Launch::shell(&ctx.shell, plugin.run_command(variant)?),
        };
        Ok(launch
            .env(VARIANT_ENV, variant)
            .env(PROBLEM_ENV, &self.problem_id))
    }

    /// Builds an external plug-in that declares a compile command. No-op for built-ins.
    pub async fn prepare(&self, shell: &Path) -> Result<(), PluginError> {
        let Origin::External(plugin) = &self.origin else {
            return Ok(())
        };
        let Some(cmd) = &plugin.compile else {
            return Ok(())
        };
        log::info!("Compiling {}", plugin.file.display());
        log::info!("{}", cmd);
        executor::run_compile_command(shell, cmd)
            .await
            .map_err(|e| PluginError::Compile(plugin.file.clone(), format!("{:#}", e)))
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::{config::CommandConfig, serdable::GlobPattern};

    fn double(input: &str) -> anyhow::Result<String> {
        let x: i64 = input.trim().parse()?;
        Ok(format!("{}\n", 2 * x))
    }

    fn triple(input: &str) -> anyhow::Result<String> {
        let x: i64 = input.trim().parse()?;
        Ok(format!("{}\n", 3 * x))
    }

    fn registry() -> Registry {
        let mut reg = Registry::new();
        reg.register(
            ProblemDef::new("9001_double")
                .variant("default", double, "O(1)", "multiply")
                .variant("slow", triple, "O(1)", "wrong on purpose")
                .compare(CompareMode::Exact)
                .generator(FnGenerator::new(|_| "1\n".to_owned())),
        )
        .unwrap();
        reg.register(ProblemDef::new("9002_bare").solution(double))
            .unwrap();
        reg
    }

    fn ctx() -> LaunchContext {
        LaunchContext {
            self_exe: PathBuf::from("/usr/local/bin/lcrun"),
            shell: PathBuf::from("/bin/sh"),
        }
    }

    #[test]
    fn load_builtin_solution() {
        let reg = registry();
        let sol = reg.load_solution("9001_double").unwrap();
        assert!(sol.is_builtin());
        assert_eq!(sol.compare_mode, CompareMode::Exact);
        let names: Vec<_> = sol.variants.iter().map(|v| v.name.as_str()).collect();
        assert_eq!(names, ["default", "slow"]);
        assert!(reg.load_generator("9001_double").unwrap().is_some());
        assert!(reg.load_generator("9002_bare").unwrap().is_none());
    }

    #[test]
    fn builtin_launch_reexecutes_self_with_variant() {
        let sol = registry().load_solution("9001_double").unwrap();
        let launch = sol.launch("slow", &ctx()).unwrap();
        assert_eq!(launch.program, PathBuf::from("/usr/local/bin/lcrun"));
        assert_eq!(launch.args, [EXEC_SUBCOMMAND, "9001_double", "--variant", "slow"]);
        assert!(launch
            .envs
            .contains(&(VARIANT_ENV.to_owned(), "slow".to_owned())));

        let err = sol.launch("fast", &ctx()).unwrap_err();
        assert!(matches!(err, PluginError::UnknownVariant(..)));
    }

    #[test]
    fn dispatch_selects_entry_point() {
        let reg = registry();
        let solve = reg.dispatch("9001_double", "slow").unwrap();
        assert_eq!(solve("5").unwrap(), "15\n");
        let solve = reg.dispatch("9002_bare", "default").unwrap();
        assert_eq!(solve("5").unwrap(), "10\n");
        assert!(reg.dispatch("9002_bare", "slow").is_err());
        assert!(reg.dispatch("0000_missing", "default").is_err());
    }

    #[test]
    fn duplicate_problem_is_rejected() {
        let mut reg = registry();
        let err = reg
            .register(ProblemDef::new("9002_bare").solution(triple))
            .unwrap_err();
        assert!(matches!(err, PluginError::DuplicateProblem(_)));
    }

    #[test]
    fn missing_solution_is_not_found() {
        let err = registry().load_solution("0000_missing").unwrap_err();
        assert!(matches!(err, PluginError::NotFound(..)), "{:?}", err);
    }

    #[test]
    fn external_plugin_falls_back_after_builtins() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("0070_climbing_stairs.py"), "").unwrap();
        std::fs::write(dir.path().join("9001_double.py"), "").unwrap();
        let cmds = vec![CommandConfig {
            pattern: GlobPattern::parse("*.py").unwrap(),
            compile: None,
            run: "python3 #{filePath}".to_owned(),
        }];
        let reg = registry().with_external(ExternalPlugins::new(dir.path(), cmds));

        assert!(reg.load_solution("9001_double").unwrap().is_builtin());

        let sol = reg.load_solution("0070_climbing_stairs").unwrap();
        assert!(!sol.is_builtin());
        let launch = sol.launch("default", &ctx()).unwrap();
        assert_eq!(launch.program, PathBuf::from("/bin/sh"));
        assert_eq!(launch.args[0], "-c");
        assert!(launch.args[1].starts_with("python3 "));
    }

    #[test]
    fn external_generator_backs_problems_without_one() {
        let root = tempfile::tempdir().unwrap();
        let gens = root.path().join("generators");
        std::fs::create_dir_all(&gens).unwrap();
        std::fs::write(gens.join("9001_double.sh"), "echo 7\n").unwrap();
        std::fs::write(gens.join("9002_bare.sh"), "echo 5\n").unwrap();
        let cmds = vec![CommandConfig {
            pattern: GlobPattern::parse("*.sh").unwrap(),
            compile: None,
            run: "/bin/sh #{filePath}".to_owned(),
        }];
        let ext = ExternalPlugins::new(root.path().join("solutions"), cmds).generators_dir(&gens);
        let reg = registry().with_external(ext);

        let builtin = reg.load_generator("9001_double").unwrap().unwrap();
        assert_eq!(builtin.generate(1, 0).next().unwrap().unwrap(), "1\n");

        let external = reg.load_generator("9002_bare").unwrap().unwrap();
        let got: Vec<_> = external.generate(3, 0).collect::<anyhow::Result<_>>().unwrap();
        assert_eq!(got, ["5\n"]);

        assert!(reg.load_generator("0000_missing").unwrap().is_none());
    }
}
