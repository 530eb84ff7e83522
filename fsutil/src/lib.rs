use serde::Serialize;
use std::{
    fs::{self, ReadDir},
    path::{Path, PathBuf},
};

pub mod error {
    use std::{io, path::PathBuf};

    pub type Result<T> = std::result::Result<T, self::Error>;

    type Msg = &'static str;

    #[derive(Debug, thiserror::Error)]
    pub enum Error {
        #[error("{0} ({1}): {2}")]
        SingleIO(Msg, PathBuf, #[source] io::Error),

        #[error("Not a UTF-8 file ({0})")]
        NotUtf8(PathBuf),

        #[error("Cannot serialize to JSON (dest='{0}'): {1}")]
        SerializeToJson(PathBuf, #[source] serde_json::Error),
    }
}
pub use error::{Error, Result};

pub fn mkdir_all(path: impl AsRef<Path>) -> Result<()> {
    let dir = path.as_ref();
    fs::create_dir_all(dir).map_err(|e| Error::SingleIO("Cannot create dir", dir.to_owned(), e))
}

pub fn write<P, C>(filepath: P, contents: C) -> Result<()>
where
    P: AsRef<Path>,
    C: AsRef<[u8]>,
{
    fs::write(&filepath, contents)
        .map_err(|e| Error::SingleIO("Cannot write file", filepath.as_ref().to_owned(), e))
}

pub fn write_with_mkdir<P, C>(filepath: P, contents: C) -> Result<()>
where
    P: AsRef<Path>,
    C: AsRef<[u8]>,
{
    if let Some(dir) = filepath.as_ref().parent() {
        self::mkdir_all(dir)?;
    }
    self::write(filepath, contents)
}

/// Reads a whole file, telling apart an I/O failure and a file which is not UTF-8.
pub fn read_to_string(filepath: impl AsRef<Path>) -> Result<String> {
    let filepath = filepath.as_ref();
    let bytes = fs::read(filepath)
        .map_err(|e| Error::SingleIO("Cannot read file", filepath.to_owned(), e))?;
    String::from_utf8(bytes).map_err(|_| Error::NotUtf8(filepath.to_owned()))
}

/// Like [`read_to_string`], but a missing file is `Ok(None)`.
pub fn read_to_string_if_exists(filepath: impl AsRef<Path>) -> Result<Option<String>> {
    let filepath = filepath.as_ref();
    if !filepath.is_file() {
        return Ok(None);
    }
    self::read_to_string(filepath).map(Some)
}

pub fn write_json_pretty_with_mkdir<P, T>(filepath: P, data: &T) -> Result<()>
where
    P: AsRef<Path>,
    T: Serialize,
{
    let s = serde_json::to_string_pretty(data)
        .map_err(|e| Error::SerializeToJson(filepath.as_ref().to_owned(), e))?;
    write_with_mkdir(filepath, &s)
}

pub fn read_dir(dir: impl AsRef<Path>) -> Result<ReadDir> {
    fs::read_dir(&dir).map_err(|e| Error::SingleIO("Cannot read dir", dir.as_ref().to_owned(), e))
}

/// Lists regular files directly under `dir` whose name starts with `prefix`, sorted by name.
/// A missing `dir` yields an empty list.
///
/// ```
/// let dir = tempfile::tempdir().unwrap();
/// std::fs::write(dir.path().join("b.001.in"), "").unwrap();
/// std::fs::write(dir.path().join("a.001.in"), "").unwrap();
/// std::fs::write(dir.path().join("b.txt"), "").unwrap();
///
/// let files = fsutil::list_files_with_prefix(dir.path(), "b.").unwrap();
/// let names: Vec<_> = files.iter().map(|p| p.file_name().unwrap().to_owned()).collect();
/// assert_eq!(names, ["b.001.in", "b.txt"]);
/// ```
pub fn list_files_with_prefix(dir: impl AsRef<Path>, prefix: &str) -> Result<Vec<PathBuf>> {
    let dir = dir.as_ref();
    if !dir.is_dir() {
        return Ok(Vec::new());
    }
    let mut res = Vec::new();
    for entry in self::read_dir(dir)?.filter_map(std::result::Result::ok) {
        let Ok(ft) = entry.file_type() else {
            continue
        };
        if ft.is_dir() {
            continue;
        }
        if entry.file_name().to_string_lossy().starts_with(prefix) {
            res.push(entry.path());
        }
    }
    res.sort();
    Ok(res)
}

/// Finds the first file under `dir` named `<stem>.<anything>` whose name matches `pattern`.
pub fn find_file_by_stem(
    dir: impl AsRef<Path>,
    stem: &str,
    pattern: &::glob::Pattern,
) -> Result<Option<PathBuf>> {
    let prefix = format!("{}.", stem);
    let found = self::list_files_with_prefix(dir, &prefix)?
        .into_iter()
        .find(|path| {
            let name = path.file_name().unwrap_or_default().to_string_lossy();
            pattern.matches(&name)
        });
    Ok(found)
}

/// Normalize the path
/// ```
/// use fsutil::normalize_path;
/// use std::path::Path;
///
/// assert_eq!(normalize_path("./solutions/./0001_two_sum.py"), Path::new("solutions/0001_two_sum.py"));
/// assert_eq!(normalize_path("solutions/../tests/."), Path::new("tests"));
/// assert_eq!(normalize_path("."), Path::new("."));
/// ```
pub fn normalize_path(path: impl AsRef<Path>) -> PathBuf {
    use ::std::path::Component;
    let components = path.as_ref().components();
    let mut stack = Vec::with_capacity(components.size_hint().1.unwrap_or(4));
    for c in components {
        match c {
            Component::CurDir => (),
            Component::ParentDir if !stack.is_empty() => {
                stack.pop();
            }
            _ => {
                stack.push(c);
            }
        }
    }
    if stack.is_empty() {
        stack.push(Component::CurDir);
    }
    stack.iter().collect()
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn read_to_string_rejects_non_utf8() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.in");
        fs::write(&path, [0xff, 0xfe, b'\n']).unwrap();
        let err = read_to_string(&path).unwrap_err();
        assert!(matches!(err, Error::NotUtf8(_)), "{:?}", err);
    }

    #[test]
    fn read_to_string_if_exists_ok() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("x.out");
        assert_eq!(read_to_string_if_exists(&path).unwrap(), None);
        write_with_mkdir(&path, "42\n").unwrap();
        assert_eq!(read_to_string_if_exists(&path).unwrap(), Some("42\n".to_owned()));
    }

    #[test]
    fn find_file_by_stem_respects_pattern() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("0001_two_sum.toml"), "").unwrap();
        fs::write(dir.path().join("0001_two_sum.py"), "").unwrap();
        fs::write(dir.path().join("0001_two_sum_v2.py"), "").unwrap();

        let pat = ::glob::Pattern::new("*.py").unwrap();
        let found = find_file_by_stem(dir.path(), "0001_two_sum", &pat).unwrap();
        assert_eq!(found, Some(dir.path().join("0001_two_sum.py")));

        let pat = ::glob::Pattern::new("*.cpp").unwrap();
        assert_eq!(find_file_by_stem(dir.path(), "0001_two_sum", &pat).unwrap(), None);
    }

    #[test]
    fn list_files_in_missing_dir_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let files = list_files_with_prefix(dir.path().join("nope"), "x").unwrap();
        assert!(files.is_empty());
    }
}
