//! 0042. Trapping Rain Water
//!
//! Input: bar heights on one line. Output: units of trapped water.
//! No expected output is generated; the `default` variant is the oracle.

use lcrun_core::{
    plugin::{FnGenerator, ProblemDef},
    shape::{emit_shape, Shape},
};
use rand::{rngs::StdRng, Rng as _};

use crate::scan::{join, Lines};

pub const ID: &str = "0042_trapping_rain_water";

pub fn def() -> ProblemDef {
    ProblemDef::new(ID)
        .variant("default", two_pointers, "O(n)", "two pointers with running maxima")
        .variant("stack", monotonic_stack, "O(n)", "decreasing stack of bar indices")
        .variant("brute", brute, "O(n^2)", "scan both sides of every bar")
        .generator(FnGenerator::new(random_case).sized(random_input))
}

fn parse(input: &str) -> anyhow::Result<Vec<u64>> {
    let heights: Vec<u64> = Lines::new(input).vec()?;
    emit_shape(&Shape::new().with("n", heights.len() as u64));
    Ok(heights)
}

fn two_pointers(input: &str) -> anyhow::Result<String> {
    let h = parse(input)?;
    if h.is_empty() {
        return Ok("0".to_owned());
    }
    let (mut lo, mut hi) = (0, h.len() - 1);
    let (mut left_max, mut right_max, mut water) = (0, 0, 0);
    while lo < hi {
        if h[lo] < h[hi] {
            left_max = left_max.max(h[lo]);
            water += left_max - h[lo];
            lo += 1;
        } else {
            right_max = right_max.max(h[hi]);
            water += right_max - h[hi];
            hi -= 1;
        }
    }
    Ok(water.to_string())
}

fn monotonic_stack(input: &str) -> anyhow::Result<String> {
    let h = parse(input)?;
    let mut stack: Vec<usize> = Vec::new();
    let mut water = 0;
    for (i, &x) in h.iter().enumerate() {
        while let Some(&top) = stack.last() {
            if h[top] >= x {
                break;
            }
            stack.pop();
            let Some(&left) = stack.last() else {
                break
            };
            let width = (i - left - 1) as u64;
            water += width * (h[left].min(x) - h[top]);
        }
        stack.push(i);
    }
    Ok(water.to_string())
}

fn brute(input: &str) -> anyhow::Result<String> {
    let h = parse(input)?;
    let water: u64 = (0..h.len())
        .map(|i| {
            let left = h[..=i].iter().max().copied().unwrap_or(0);
            let right = h[i..].iter().max().copied().unwrap_or(0);
            left.min(right) - h[i]
        })
        .sum();
    Ok(water.to_string())
}

fn random_case(rng: &mut StdRng) -> String {
    let n = rng.gen_range(0..=40);
    random_input(rng, n)
}

fn random_input(rng: &mut StdRng, n: usize) -> String {
    let heights: Vec<u64> = (0..n).map(|_| rng.gen_range(0..=20)).collect();
    format!("{}\n", join(heights))
}
