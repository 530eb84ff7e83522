//! `#{name}` placeholders in external plug-in commands. `##` is a literal `#`.

use std::{borrow::Borrow, collections::HashMap, ffi::OsStr, hash::Hash};

#[derive(Debug, PartialEq, Eq, thiserror::Error)]
pub enum InterpError {
    #[error("Undefined variable '{0}' at {}", .1+1)]
    UndefinedVar(String, usize),

    #[error("Unclosed brace (found open brace at {})", .0+1)]
    UnclosedBrace(usize),

    #[error("Empty variable name at {}", .0+1)]
    EmptyVarName(usize),
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Text(String),
    /// Variable name and the char position of its `#`.
    Var(String, usize),
}

/// A command template parsed once and rendered for each plug-in file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Template {
    segments: Vec<Segment>,
}

impl Template {
    pub fn parse(fmt: &str) -> Result<Self, InterpError> {
        let chars: Vec<char> = fmt.chars().collect();
        let mut segments = Vec::new();
        let mut text = String::new();
        let mut i = 0;

        while i < chars.len() {
            match (chars[i], chars.get(i + 1)) {
                ('#', Some('#')) => {
                    text.push('#');
                    i += 2;
                }
                ('#', Some('{')) => {
                    let Some(len) = chars[i + 2..].iter().position(|&c| c == '}') else {
                        return Err(InterpError::UnclosedBrace(i + 1))
                    };
                    let name: String = chars[i + 2..i + 2 + len].iter().collect();
                    if name.is_empty() {
                        return Err(InterpError::EmptyVarName(i));
                    }
                    if !text.is_empty() {
                        segments.push(Segment::Text(std::mem::take(&mut text)));
                    }
                    segments.push(Segment::Var(name, i));
                    i += len + 3;
                }
                (c, _) => {
                    text.push(c);
                    i += 1;
                }
            }
        }
        if !text.is_empty() {
            segments.push(Segment::Text(text));
        }
        Ok(Self { segments })
    }

    pub fn variables(&self) -> impl Iterator<Item = &str> {
        self.segments.iter().filter_map(|s| match s {
            Segment::Var(name, _) => Some(name.as_str()),
            Segment::Text(_) => None,
        })
    }

    pub fn render<K, V>(&self, variables: &HashMap<K, V>) -> Result<String, InterpError>
    where
        K: Borrow<str> + Hash + Eq,
        V: AsRef<OsStr>,
    {
        let mut res = String::new();
        for seg in &self.segments {
            match seg {
                Segment::Text(s) => res.push_str(s),
                Segment::Var(name, pos) => {
                    let Some(value) = variables.get(name.as_str()) else {
                        return Err(InterpError::UndefinedVar(name.clone(), *pos + 1))
                    };
                    res += value.as_ref().to_string_lossy().as_ref();
                }
            }
        }
        Ok(res)
    }
}

pub fn interp<K, V>(fmt: &str, variables: &HashMap<K, V>) -> Result<String, InterpError>
where
    K: Borrow<str> + Hash + Eq,
    V: AsRef<OsStr>,
{
    Template::parse(fmt)?.render(variables)
}
