//! 0020. Valid Parentheses
//!
//! Input: one line of brackets `()[]{}`. Output: `true` or `false`.
//! No generator: cases live under `tests/` as `0020_valid_parentheses.NNN.in/.out`.

use lcrun_core::{
    plugin::ProblemDef,
    shape::{emit_shape, Shape},
};

use crate::scan::Lines;

pub const ID: &str = "0020_valid_parentheses";

pub fn def() -> ProblemDef {
    ProblemDef::new(ID).variant("default", stack, "O(n)", "push openers, pop on closers")
}

fn stack(input: &str) -> anyhow::Result<String> {
    let s = Lines::new(input).raw().unwrap_or("");
    emit_shape(&Shape::new().with("n", s.len() as u64));

    let mut open = Vec::with_capacity(s.len());
    for c in s.chars() {
        let want = match c {
            '(' | '[' | '{' => {
                open.push(c);
                continue;
            }
            ')' => '(',
            ']' => '[',
            '}' => '{',
            _ => anyhow::bail!("Unexpected character {:?}", c),
        };
        if open.pop() != Some(want) {
            return Ok(false.to_string());
        }
    }
    Ok(open.is_empty().to_string())
}
