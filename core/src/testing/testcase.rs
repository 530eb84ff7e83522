use std::{
    fmt,
    path::{Path, PathBuf},
    sync::Arc,
};

use crate::plugin::Generator;

/// One input with its expected output, if the source knows it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TestCase {
    pub name: String,
    pub input: String,
    pub expected: Option<String>,
}

#[derive(Debug, thiserror::Error)]
pub enum SourceError {
    #[error("Generator failed on case {name}: {message}")]
    Generator { name: String, message: String },

    #[error("Expected output '{0}' is missing")]
    MissingExpected(PathBuf),

    #[error("'{0}' ends with more than one trailing newline")]
    TrailingNewlines(PathBuf),

    #[error(transparent)]
    Fs(#[from] fsutil::Error),
}

pub type CaseIter<'a> = Box<dyn Iterator<Item = Result<TestCase, SourceError>> + Send + 'a>;

#[derive(Clone)]
enum Kind {
    Generated {
        generator: Arc<dyn Generator>,
        count: usize,
        seed: u64,
        sizes: Vec<usize>,
    },
    Files {
        dir: PathBuf,
        problem_id: String,
    },
    Empty,
}

/// A finite, ordered, restartable sequence of [`TestCase`]s for one problem.
///
/// Each call to [`TestSource::cases`] starts over and yields the same cases. The sequence
/// ends after the first error.
#[derive(Clone)]
pub struct TestSource {
    kind: Kind,
    limit: Option<usize>,
}

impl TestSource {
    pub fn generated(generator: Arc<dyn Generator>, count: usize, seed: u64) -> Self {
        Self {
            kind: Kind::Generated {
                generator,
                count,
                seed,
                sizes: Vec::new(),
            },
            limit: None,
        }
    }

    /// Pairs `<dir>/<problem_id>.NNN.in` with `.out`, in lexicographic order.
    pub fn files(dir: impl Into<PathBuf>, problem_id: impl Into<String>) -> Self {
        Self {
            kind: Kind::Files {
                dir: dir.into(),
                problem_id: problem_id.into(),
            },
            limit: None,
        }
    }

    pub fn empty() -> Self {
        Self {
            kind: Kind::Empty,
            limit: None,
        }
    }

    /// Generator if present, else the file-backed layout (which may hold no files at all).
    pub fn for_problem(
        generator: Option<Arc<dyn Generator>>,
        tests_dir: &Path,
        problem_id: &str,
        count: usize,
        seed: u64,
    ) -> Self {
        match generator {
            Some(g) => Self::generated(g, count, seed),
            None => Self::files(tests_dir, problem_id),
        }
    }

    /// Appends one case of each logical size, when the generator supports sizing.
    pub fn sizes(mut self, ns: &[usize]) -> Self {
        if let Kind::Generated { sizes, .. } = &mut self.kind {
            *sizes = ns.to_vec();
        }
        self
    }

    pub fn limit(mut self, n: usize) -> Self {
        self.limit = Some(n);
        self
    }

    pub fn is_generated(&self) -> bool {
        matches!(self.kind, Kind::Generated { .. })
    }

    pub fn cases(&self) -> CaseIter<'_> {
        let cases: CaseIter = match &self.kind {
            Kind::Generated {
                generator,
                count,
                seed,
                sizes,
            } => generated_cases(generator.as_ref(), *count, *seed, sizes),
            Kind::Files { dir, problem_id } => file_cases(dir, problem_id),
            Kind::Empty => Box::new(std::iter::empty()),
        };
        let cases = stop_after_first_error(cases);
        match self.limit {
            Some(n) => Box::new(cases.take(n)),
            None => cases,
        }
    }
}

fn generated_cases<'a>(
    generator: &'a dyn Generator,
    count: usize,
    seed: u64,
    sizes: &'a [usize],
) -> CaseIter<'a> {
    let random = generator
        .generate(count, seed)
        .take(count)
        .enumerate()
        .map(|(i, res)| {
            let name = format!("gen#{:03}", i + 1);
            match res {
                Ok(input) => Ok(TestCase {
                    name,
                    input,
                    expected: None,
                }),
                Err(e) => Err(SourceError::Generator {
                    name,
                    message: format!("{:#}", e),
                }),
            }
        });

    let sized = sizes.iter().filter_map(move |&n| {
        let name = format!("size={}", n);
        match generator.generate_for_size(n, seed)? {
            Ok(input) => Some(Ok(TestCase {
                name,
                input,
                expected: None,
            })),
            Err(e) => Some(Err(SourceError::Generator {
                name,
                message: format!("{:#}", e),
            })),
        }
    });

    Box::new(random.chain(sized))
}

fn file_cases<'a>(dir: &'a Path, problem_id: &str) -> CaseIter<'a> {
    let prefix = format!("{}.", problem_id);
    let inputs: Vec<PathBuf> = match fsutil::list_files_with_prefix(dir, &prefix) {
        Ok(files) => files
            .into_iter()
            .filter(|p| p.extension().map_or(false, |ext| ext == "in"))
            .collect(),
        Err(e) => return Box::new(std::iter::once(Err(e.into()))),
    };
    log::debug!("Found {} test files in {}", inputs.len(), dir.display());
    Box::new(inputs.into_iter().map(read_file_pair))
}

fn read_file_pair(input_path: PathBuf) -> Result<TestCase, SourceError> {
    let output_path = input_path.with_extension("out");
    if !output_path.is_file() {
        return Err(SourceError::MissingExpected(output_path));
    }
    let input = read_test_file(&input_path)?;
    let expected = read_test_file(&output_path)?;
    let name = input_path
        .file_stem()
        .unwrap_or_default()
        .to_string_lossy()
        .into_owned();
    Ok(TestCase {
        name,
        input,
        expected: Some(expected),
    })
}

fn read_test_file(path: &Path) -> Result<String, SourceError> {
    let text = fsutil::read_to_string(path)?;
    if text.ends_with("\n\n") {
        return Err(SourceError::TrailingNewlines(path.to_owned()));
    }
    if !text.is_empty() && !text.ends_with('\n') {
        log::warn!("'{}' has no trailing newline", path.display());
    }
    Ok(text)
}

fn stop_after_first_error(cases: CaseIter<'_>) -> CaseIter<'_> {
    let mut failed = false;
    Box::new(cases.take_while(move |res| {
        let go = !failed;
        failed |= res.is_err();
        go
    }))
}

impl fmt::Display for TestSource {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match &self.kind {
            Kind::Generated {
                count, seed, sizes, ..
            } => {
                write!(f, "generator (count={}, seed={}", count, seed)?;
                if !sizes.is_empty() {
                    write!(f, ", sizes={:?}", sizes)?;
                }
                write!(f, ")")?;
            }
            Kind::Files { dir, problem_id } => {
                write!(f, "files {}/{}.*.in", dir.display(), problem_id)?
            }
            Kind::Empty => write!(f, "none")?,
        }
        if let Some(n) = self.limit {
            write!(f, " [first {}]", n)?;
        }
        Ok(())
    }
}

impl fmt::Debug for TestSource {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "TestSource({})", self)
    }
}
