//! Output comparison under a problem's [`CompareMode`].

use std::panic::{self, AssertUnwindSafe};

use serde_json::Value;

use crate::plugin::{CompareMode, JudgeFn};

#[derive(Debug, Clone, PartialEq)]
enum Normalized {
    Json(Value),
    Lines(Vec<Vec<String>>),
}

/// Decides whether `actual` is a correct answer for `input`.
///
/// Without an expected output every non-custom policy accepts blindly.
pub fn outputs_match(
    mode: CompareMode,
    judge: Option<JudgeFn>,
    actual: &str,
    expected: Option<&str>,
    input: &str,
) -> bool {
    if mode == CompareMode::Custom {
        let Some(judge) = judge else {
            return false
        };
        return panic::catch_unwind(AssertUnwindSafe(|| judge(actual, expected, input)))
            .unwrap_or_else(|_| {
                log::warn!("Judge panicked; counting the case as failed");
                false
            });
    }

    let Some(expected) = expected else {
        return true
    };
    let (mut a, mut e) = normalize_pair(actual, expected);
    match mode {
        CompareMode::Exact | CompareMode::Custom => {}
        CompareMode::Sorted => {
            sort_outermost(&mut a, false);
            sort_outermost(&mut e, false);
        }
        CompareMode::Set => {
            sort_outermost(&mut a, true);
            sort_outermost(&mut e, true);
        }
    }
    a == e
}

/// JSON when both sides parse as JSON, whitespace tokens per line otherwise.
fn normalize_pair(actual: &str, expected: &str) -> (Normalized, Normalized) {
    let parse = |s: &str| serde_json::from_str::<Value>(s.trim()).ok();
    match (parse(actual), parse(expected)) {
        (Some(a), Some(e)) => (Normalized::Json(a), Normalized::Json(e)),
        _ => (tokenize(actual), tokenize(expected)),
    }
}

fn tokenize(s: &str) -> Normalized {
    let lines = s
        .lines()
        .map(|line| line.split_whitespace().map(str::to_owned).collect::<Vec<_>>())
        .filter(|tokens| !tokens.is_empty())
        .collect();
    Normalized::Lines(lines)
}

fn sort_outermost(n: &mut Normalized, dedup: bool) {
    match n {
        Normalized::Json(Value::Array(items)) => {
            items.sort_by_cached_key(Value::to_string);
            if dedup {
                items.dedup();
            }
        }
        Normalized::Json(_) => {}
        Normalized::Lines(lines) if lines.len() == 1 => {
            let tokens = &mut lines[0];
            tokens.sort();
            if dedup {
                tokens.dedup();
            }
        }
        Normalized::Lines(lines) => {
            lines.sort();
            if dedup {
                lines.dedup();
            }
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    struct X {
        mode: CompareMode,
        actual: &'static str,
        expected: Option<&'static str>,
        want: bool,
    }

    fn check(xs: &[X]) {
        for (i, x) in xs.iter().enumerate() {
            let got = outputs_match(x.mode, None, x.actual, x.expected, "");
            assert_eq!(
                got, x.want,
                "#{}: {} {:?} vs {:?}",
                i, x.mode, x.actual, x.expected
            );
        }
    }

    #[rustfmt::skip]
    #[test]
    fn exact() {
        use CompareMode::Exact;
        check(&[
            X { mode: Exact, actual: "6\n", expected: Some("6\n"), want: true },
            X { mode: Exact, actual: "  6  ", expected: Some("6\n"), want: true },
            X { mode: Exact, actual: "[0, 1]\n", expected: Some("[0,1]"), want: true },
            X { mode: Exact, actual: "[1,0]", expected: Some("[0,1]"), want: false },
            X { mode: Exact, actual: "1 2\n\n3\n", expected: Some("1  2\n3"), want: true },
            X { mode: Exact, actual: "1 2 3", expected: Some("1 2\n3"), want: false },
            X { mode: Exact, actual: "7", expected: Some("6"), want: false },
            X { mode: Exact, actual: "", expected: Some("6"), want: false },
            X { mode: Exact, actual: "anything", expected: None, want: true },
        ]);
    }

    #[rustfmt::skip]
    #[test]
    fn sorted_and_set() {
        use CompareMode::{Set, Sorted};
        check(&[
            X { mode: Sorted, actual: "[3,1,2]", expected: Some("[1,2,3]"), want: true },
            X { mode: Sorted, actual: "[[2,1],[0,3]]", expected: Some("[[0,3],[2,1]]"), want: true },
            X { mode: Sorted, actual: "[1,1,2]", expected: Some("[1,2]"), want: false },
            X { mode: Sorted, actual: "3 1 2\n", expected: Some("1 2 3\n"), want: true },
            X { mode: Sorted, actual: "b\na\n", expected: Some("a\nb\n"), want: true },
            X { mode: Set, actual: "[1,1,2]", expected: Some("[2,1]"), want: true },
            X { mode: Set, actual: "2 1 2", expected: Some("1 2"), want: true },
            X { mode: Set, actual: "1 3", expected: Some("1 2"), want: false },
        ]);
    }

    #[test]
    fn custom_judge_sees_raw_input_and_panics_fail() {
        fn sums_to_input(actual: &str, _: Option<&str>, input: &str) -> bool {
            let want: i64 = input.trim().parse().unwrap();
            let got: i64 = actual.split_whitespace().map(|t| t.parse::<i64>().unwrap()).sum();
            got == want
        }
        let judge = Some(sums_to_input as JudgeFn);
        assert!(outputs_match(CompareMode::Custom, judge, "1 2", None, "3\n"));
        assert!(!outputs_match(CompareMode::Custom, judge, "1 1", None, "3\n"));
        assert!(!outputs_match(CompareMode::Custom, judge, "x", None, "3\n"));
        assert!(!outputs_match(CompareMode::Custom, None, "3", Some("3"), ""));
    }
}
