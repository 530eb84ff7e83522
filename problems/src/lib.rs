//! Built-in solution plug-ins for `lcrun`.
//!
//! Each module is one problem: its variants, comparison policy and input generator.

use lcrun_core::plugin::{PluginError, ProblemDef, Registry};

mod coin_change;
mod kth_largest;
pub mod scan;
mod shuffle_array;
mod top_k_frequent;
mod trapping_rain_water;
mod two_sum;
mod valid_parentheses;

pub fn problems() -> Vec<ProblemDef> {
    vec![
        two_sum::def(),
        valid_parentheses::def(),
        trapping_rain_water::def(),
        kth_largest::def(),
        coin_change::def(),
        top_k_frequent::def(),
        shuffle_array::def(),
    ]
}

pub fn register_all(registry: &mut Registry) -> Result<(), PluginError> {
    for def in problems() {
        registry.register(def)?;
    }
    Ok(())
}

/// A registry holding every built-in problem.
pub fn registry() -> Result<Registry, PluginError> {
    let mut registry = Registry::new();
    register_all(&mut registry)?;
    Ok(registry)
}
