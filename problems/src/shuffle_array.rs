//! 0384. Shuffle an Array
//!
//! Input: `nums` on one line. Output: any permutation of `nums`. There is no expected output;
//! the judge checks the permutation against the input.

use lcrun_core::{
    plugin::{FnGenerator, ProblemDef},
    shape::{emit_shape, Shape},
};
use rand::{rngs::StdRng, Rng as _};

use crate::scan::{join, Lines};

pub const ID: &str = "0384_shuffle_an_array";

pub fn def() -> ProblemDef {
    ProblemDef::new(ID)
        .variant("default", fisher_yates, "O(n)", "Fisher-Yates in place")
        .variant("sort_keys", sort_keys, "O(n log n)", "sort by a random key per element")
        .judge(judge)
        .generator(FnGenerator::new(random_case).sized(random_input))
}

fn parse(input: &str) -> anyhow::Result<Vec<i64>> {
    let nums: Vec<i64> = Lines::new(input).vec()?;
    emit_shape(&Shape::new().with("n", nums.len() as u64));
    Ok(nums)
}

fn fisher_yates(input: &str) -> anyhow::Result<String> {
    let mut nums = parse(input)?;
    let mut rng = rand::thread_rng();
    for i in (1..nums.len()).rev() {
        let j = rng.gen_range(0..=i);
        nums.swap(i, j);
    }
    Ok(join(nums))
}

fn sort_keys(input: &str) -> anyhow::Result<String> {
    let nums = parse(input)?;
    let mut rng = rand::thread_rng();
    let mut keyed: Vec<(u64, i64)> = nums.into_iter().map(|x| (rng.gen(), x)).collect();
    keyed.sort_unstable();
    Ok(join(keyed.into_iter().map(|(_, x)| x)))
}

fn judge(actual: &str, _expected: Option<&str>, input: &str) -> bool {
    let (Ok(mut got), Ok(mut want)) = (
        Lines::new(actual).vec::<i64>(),
        Lines::new(input).vec::<i64>(),
    ) else {
        return false
    };
    if actual.lines().filter(|l| !l.trim().is_empty()).count() > 1 {
        return false;
    }
    got.sort_unstable();
    want.sort_unstable();
    got == want
}

fn random_case(rng: &mut StdRng) -> String {
    let n = rng.gen_range(1..=50);
    random_input(rng, n)
}

fn random_input(rng: &mut StdRng, n: usize) -> String {
    let nums: Vec<i64> = (0..n).map(|_| rng.gen_range(-1_000_000..=1_000_000)).collect();
    format!("{}\n", join(nums))
}
