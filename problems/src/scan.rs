//! Line-oriented input parsing shared by the built-in solutions.
//!
//! Inputs are one value or one whitespace-separated list per line. A blank line is an empty list.

use std::{fmt::Display, str::FromStr};

use anyhow::Context as _;

pub struct Lines<'a> {
    inner: std::str::Lines<'a>,
    line_no: usize,
}

impl<'a> Lines<'a> {
    pub fn new(input: &'a str) -> Self {
        Self {
            inner: input.lines(),
            line_no: 0,
        }
    }

    fn next_line(&mut self) -> anyhow::Result<&'a str> {
        self.line_no += 1;
        self.inner
            .next()
            .with_context(|| format!("Missing input line {}", self.line_no))
    }

    pub fn vec<T>(&mut self) -> anyhow::Result<Vec<T>>
    where
        T: FromStr,
        T::Err: std::error::Error + Send + Sync + 'static,
    {
        let line_no = self.line_no + 1;
        self.next_line()?
            .split_whitespace()
            .map(|tok| {
                tok.parse::<T>()
                    .with_context(|| format!("Bad token '{}' on line {}", tok, line_no))
            })
            .collect()
    }

    pub fn value<T>(&mut self) -> anyhow::Result<T>
    where
        T: FromStr,
        T::Err: std::error::Error + Send + Sync + 'static,
    {
        let line_no = self.line_no + 1;
        let line = self.next_line()?.trim();
        line.parse::<T>()
            .with_context(|| format!("Bad value '{}' on line {}", line, line_no))
    }

    pub fn raw(&mut self) -> anyhow::Result<&'a str> {
        self.next_line().map(str::trim)
    }
}

pub fn join<T: Display>(xs: impl IntoIterator<Item = T>) -> String {
    xs.into_iter()
        .map(|x| x.to_string())
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn reads_lists_and_values() {
        let mut lines = Lines::new("1 2 3\n\n7\nabc\n");
        assert_eq!(lines.vec::<i64>().unwrap(), vec![1, 2, 3]);
        assert_eq!(lines.vec::<i64>().unwrap(), Vec::<i64>::new());
        assert_eq!(lines.value::<usize>().unwrap(), 7);
        assert_eq!(lines.raw().unwrap(), "abc");
        assert!(lines.value::<usize>().is_err());
    }

    #[test]
    fn bad_token_names_the_line() {
        let err = Lines::new("1 x\n").vec::<i32>().unwrap_err();
        assert_eq!(err.to_string(), "Bad token 'x' on line 1");
        assert_eq!(join([3, 1, 2]), "3 1 2");
    }
}
