//! 0001. Two Sum
//!
//! Input: `nums` on line 1, `target` on line 2. Output: two distinct indices `i j` with
//! `nums[i] + nums[j] == target`. Any valid pair is accepted.

use std::collections::HashMap;

use anyhow::bail;
use lcrun_core::{
    plugin::{FnGenerator, ProblemDef},
    shape::{emit_shape, Shape},
};
use rand::{rngs::StdRng, seq::SliceRandom as _, Rng as _};

use crate::scan::Lines;

pub const ID: &str = "0001_two_sum";

pub fn def() -> ProblemDef {
    ProblemDef::new(ID)
        .variant("default", hash_map, "O(n)", "one pass with a value -> index map")
        .variant("brute", brute, "O(n^2)", "try every pair")
        .variant("sorted", sorted, "O(n log n)", "sort indices by value, two pointers")
        .judge(judge)
        .generator(FnGenerator::new(random_case).sized(random_input))
}

fn parse(input: &str) -> anyhow::Result<(Vec<i64>, i64)> {
    let mut lines = Lines::new(input);
    let nums = lines.vec()?;
    let target = lines.value()?;
    emit_shape(&Shape::new().with("n", nums.len() as u64));
    Ok((nums, target))
}

fn answer(i: usize, j: usize) -> String {
    format!("{} {}", i.min(j), i.max(j))
}

fn hash_map(input: &str) -> anyhow::Result<String> {
    let (nums, target) = parse(input)?;
    let mut seen = HashMap::with_capacity(nums.len());
    for (j, &x) in nums.iter().enumerate() {
        if let Some(&i) = seen.get(&(target - x)) {
            return Ok(answer(i, j));
        }
        seen.insert(x, j);
    }
    bail!("No pair sums to {}", target)
}

fn brute(input: &str) -> anyhow::Result<String> {
    let (nums, target) = parse(input)?;
    for i in 0..nums.len() {
        for j in i + 1..nums.len() {
            if nums[i] + nums[j] == target {
                return Ok(answer(i, j));
            }
        }
    }
    bail!("No pair sums to {}", target)
}

fn sorted(input: &str) -> anyhow::Result<String> {
    let (nums, target) = parse(input)?;
    let mut idx: Vec<usize> = (0..nums.len()).collect();
    idx.sort_by_key(|&i| nums[i]);

    let (mut lo, mut hi) = (0, idx.len().saturating_sub(1));
    while lo < hi {
        let sum = nums[idx[lo]] + nums[idx[hi]];
        match sum.cmp(&target) {
            std::cmp::Ordering::Equal => return Ok(answer(idx[lo], idx[hi])),
            std::cmp::Ordering::Less => lo += 1,
            std::cmp::Ordering::Greater => hi -= 1,
        }
    }
    bail!("No pair sums to {}", target)
}

fn judge(actual: &str, _expected: Option<&str>, input: &str) -> bool {
    let mut lines = Lines::new(input);
    let (Ok(nums), Ok(target)) = (lines.vec::<i64>(), lines.value::<i64>()) else {
        return false
    };
    let Ok(pair) = Lines::new(actual).vec::<usize>() else {
        return false
    };
    match pair[..] {
        [i, j] => i != j && i < nums.len() && j < nums.len() && nums[i] + nums[j] == target,
        _ => false,
    }
}

fn random_case(rng: &mut StdRng) -> String {
    let n = rng.gen_range(2..=50);
    random_input(rng, n)
}

fn random_input(rng: &mut StdRng, n: usize) -> String {
    let n = n.max(2);
    let bound = (n as i64 * 10).max(100);
    let nums: Vec<i64> = (0..n).map(|_| rng.gen_range(-bound..=bound)).collect();
    let mut picks: Vec<usize> = (0..n).collect();
    picks.shuffle(rng);
    let target = nums[picks[0]] + nums[picks[1]];
    format!("{}\n{}\n", crate::scan::join(&nums), target)
}
