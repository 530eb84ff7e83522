pub mod action;
pub mod child;
pub mod config;
pub mod plugin;
pub mod serdable;
pub mod shape;
pub mod str_interp;
pub mod style;
pub mod testing;

pub use crate::config::Config;
