//! 0347. Top K Frequent Elements
//!
//! Input: `nums` on line 1, `k` on line 2. Output: the `k` most frequent values, in any order.

use std::{
    cmp::Reverse,
    collections::{BinaryHeap, HashMap},
};

use lcrun_core::{
    plugin::{CompareMode, FnGenerator, ProblemDef},
    shape::{emit_shape, Shape},
};
use rand::{rngs::StdRng, seq::SliceRandom as _, Rng as _};

use crate::scan::{join, Lines};

pub const ID: &str = "0347_top_k_frequent_elements";

pub fn def() -> ProblemDef {
    ProblemDef::new(ID)
        .variant("default", heap, "O(n log k)", "count, then keep a min-heap of size k")
        .variant("bucket", bucket, "O(n)", "bucket values by their frequency")
        .compare(CompareMode::Set)
        .generator(FnGenerator::new(random_case).sized(random_input))
}

fn parse(input: &str) -> anyhow::Result<(HashMap<i64, usize>, usize, usize)> {
    let mut lines = Lines::new(input);
    let nums: Vec<i64> = lines.vec()?;
    let k: usize = lines.value()?;
    emit_shape(&Shape::new().with("n", nums.len() as u64).with("k", k as u64));

    let mut freq = HashMap::new();
    for &x in &nums {
        *freq.entry(x).or_insert(0) += 1;
    }
    Ok((freq, k, nums.len()))
}

fn heap(input: &str) -> anyhow::Result<String> {
    let (freq, k, _) = parse(input)?;
    let mut heap = BinaryHeap::with_capacity(k + 1);
    for (x, cnt) in freq {
        heap.push(Reverse((cnt, x)));
        if heap.len() > k {
            heap.pop();
        }
    }
    Ok(join(heap.into_iter().map(|Reverse((_, x))| x)))
}

fn bucket(input: &str) -> anyhow::Result<String> {
    let (freq, k, n) = parse(input)?;
    let mut buckets: Vec<Vec<i64>> = vec![Vec::new(); n + 1];
    for (x, cnt) in freq {
        buckets[cnt].push(x);
    }
    let top = buckets.into_iter().rev().flatten().take(k);
    Ok(join(top))
}

fn random_case(rng: &mut StdRng) -> String {
    let n = rng.gen_range(1..=80);
    random_input(rng, n)
}

/// Distinct values get pairwise distinct counts, so the answer is unique for every `k`.
fn random_input(rng: &mut StdRng, n: usize) -> String {
    let n = n.max(1);
    let mut distinct = 1;
    while (distinct + 1) * (distinct + 2) / 2 <= n {
        distinct += 1;
    }
    let mut counts: Vec<usize> = (1..=distinct).collect();
    counts[distinct - 1] += n - distinct * (distinct + 1) / 2;

    // At least one value per distinct count, however large `n` gets.
    let span = (distinct as i64).max(500);
    let mut values: Vec<i64> = (-span..=span).collect();
    values.shuffle(rng);

    let mut nums: Vec<i64> = values
        .iter()
        .zip(&counts)
        .flat_map(|(&x, &cnt)| std::iter::repeat(x).take(cnt))
        .collect();
    nums.shuffle(rng);
    let k = rng.gen_range(1..=distinct);
    format!("{}\n{}\n", join(nums), k)
}
