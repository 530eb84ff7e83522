//! 0215. Kth Largest Element in an Array
//!
//! Input: `nums` on line 1, `k` on line 2 (`1 <= k <= n`). Output: the k-th largest value.

use std::{cmp::Reverse, collections::BinaryHeap};

use anyhow::ensure;
use lcrun_core::{
    plugin::{FnGenerator, ProblemDef},
    shape::{emit_shape, Shape},
};
use rand::{rngs::StdRng, Rng as _};

use crate::scan::{join, Lines};

pub const ID: &str = "0215_kth_largest_element_in_an_array";

pub fn def() -> ProblemDef {
    ProblemDef::new(ID)
        .variant("default", sort, "O(n log n)", "sort descending, index k-1")
        .variant("heap", min_heap, "O(n log k)", "min-heap holding the k largest")
        .variant("quickselect", quickselect, "O(n)", "Hoare partition around the middle")
        .generator(FnGenerator::new(random_case).sized(random_input))
}

fn parse(input: &str) -> anyhow::Result<(Vec<i64>, usize)> {
    let mut lines = Lines::new(input);
    let nums: Vec<i64> = lines.vec()?;
    let k: usize = lines.value()?;
    ensure!(
        (1..=nums.len()).contains(&k),
        "k={} out of range for n={}",
        k,
        nums.len()
    );
    emit_shape(&Shape::new().with("n", nums.len() as u64).with("k", k as u64));
    Ok((nums, k))
}

fn sort(input: &str) -> anyhow::Result<String> {
    let (mut nums, k) = parse(input)?;
    nums.sort_unstable_by(|a, b| b.cmp(a));
    Ok(nums[k - 1].to_string())
}

fn min_heap(input: &str) -> anyhow::Result<String> {
    let (nums, k) = parse(input)?;
    let mut heap = BinaryHeap::with_capacity(k + 1);
    for x in nums {
        heap.push(Reverse(x));
        if heap.len() > k {
            heap.pop();
        }
    }
    let Some(Reverse(x)) = heap.peek() else {
        anyhow::bail!("Empty heap")
    };
    Ok(x.to_string())
}

fn quickselect(input: &str) -> anyhow::Result<String> {
    let (mut nums, k) = parse(input)?;
    // k-th largest is the (n-k)-th smallest.
    let target = nums.len() - k;
    let (mut lo, mut hi) = (0, nums.len() - 1);
    while lo < hi {
        let pivot = nums[lo + (hi - lo) / 2];
        let (mut i, mut j) = (lo, hi);
        loop {
            while nums[i] < pivot {
                i += 1;
            }
            while nums[j] > pivot {
                j -= 1;
            }
            if i >= j {
                break;
            }
            nums.swap(i, j);
            i += 1;
            j -= 1;
        }
        if target <= j {
            hi = j;
        } else {
            lo = j + 1;
        }
    }
    Ok(nums[target].to_string())
}

fn random_case(rng: &mut StdRng) -> String {
    let n = rng.gen_range(1..=60);
    random_input(rng, n)
}

fn random_input(rng: &mut StdRng, n: usize) -> String {
    let n = n.max(1);
    let nums: Vec<i64> = (0..n).map(|_| rng.gen_range(-1000..=1000)).collect();
    let k = rng.gen_range(1..=n);
    format!("{}\n{}\n", join(nums), k)
}
