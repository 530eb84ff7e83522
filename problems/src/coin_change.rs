//! 0322. Coin Change
//!
//! Input: coin values on line 1, `amount` on line 2. Output: the fewest coins summing to
//! `amount`, or `-1`.

use std::collections::VecDeque;

use anyhow::ensure;
use lcrun_core::{
    plugin::{FnGenerator, ProblemDef},
    shape::{emit_shape, Shape},
};
use rand::{rngs::StdRng, seq::index, Rng as _};

use crate::scan::{join, Lines};

pub const ID: &str = "0322_coin_change";

pub fn def() -> ProblemDef {
    ProblemDef::new(ID)
        .variant("default", dp, "O(n·m)", "bottom-up table over amounts")
        .variant("bfs", bfs, "O(n·m)", "shortest path from 0 to amount")
        .variant("brute", brute, "O(n^m)", "how many of each coin, largest first, with a bound")
        .generator(FnGenerator::new(random_case).sized(random_input))
}

fn parse(input: &str) -> anyhow::Result<(Vec<usize>, usize)> {
    let mut lines = Lines::new(input);
    let coins: Vec<usize> = lines.vec()?;
    let amount: usize = lines.value()?;
    ensure!(coins.iter().all(|&c| c > 0), "Coin values must be positive");
    emit_shape(
        &Shape::new()
            .with("n", amount as u64)
            .with("m", coins.len() as u64),
    );
    Ok((coins, amount))
}

fn render(best: Option<usize>) -> String {
    best.map_or_else(|| "-1".to_owned(), |n| n.to_string())
}

fn dp(input: &str) -> anyhow::Result<String> {
    let (coins, amount) = parse(input)?;
    let mut best: Vec<Option<usize>> = vec![None; amount + 1];
    best[0] = Some(0);
    for a in 1..=amount {
        best[a] = coins
            .iter()
            .filter(|&&c| c <= a)
            .filter_map(|&c| best[a - c])
            .min()
            .map(|n| n + 1);
    }
    Ok(render(best[amount]))
}

fn bfs(input: &str) -> anyhow::Result<String> {
    let (coins, amount) = parse(input)?;
    let mut dist: Vec<Option<usize>> = vec![None; amount + 1];
    dist[0] = Some(0);
    let mut queue = VecDeque::from([0]);
    while let Some(a) = queue.pop_front() {
        let d = dist[a].unwrap_or_default();
        if a == amount {
            break;
        }
        for &c in &coins {
            let next = a + c;
            if next <= amount && dist[next].is_none() {
                dist[next] = Some(d + 1);
                queue.push_back(next);
            }
        }
    }
    Ok(render(dist[amount]))
}

fn brute(input: &str) -> anyhow::Result<String> {
    let (mut coins, amount) = parse(input)?;
    coins.sort_unstable_by(|a, b| b.cmp(a));
    coins.dedup();

    fn search(coins: &[usize], rest: usize, used: usize, best: &mut Option<usize>) {
        if rest == 0 {
            *best = Some(best.map_or(used, |b| b.min(used)));
            return;
        }
        let Some((&c, smaller)) = coins.split_first() else {
            return
        };
        for take in (0..=rest / c).rev() {
            if matches!(*best, Some(b) if used + take >= b) {
                continue;
            }
            search(smaller, rest - take * c, used + take, best);
        }
    }

    let mut best = None;
    search(&coins, amount, 0, &mut best);
    Ok(render(best))
}

fn random_case(rng: &mut StdRng) -> String {
    let amount = rng.gen_range(0..=60);
    random_input(rng, amount)
}

fn random_input(rng: &mut StdRng, amount: usize) -> String {
    let m = rng.gen_range(1..=4);
    let mut coins: Vec<usize> = index::sample(rng, 25, m).into_iter().map(|i| i + 1).collect();
    coins.sort_unstable();
    format!("{}\n{}\n", join(coins), amount)
}
