pub mod compare;
pub mod complexity;
pub mod executor;
pub mod orchestrator;
mod process;
pub mod report;
pub mod result;
pub mod testcase;

pub use executor::{Executor, Launch, Limits};
pub use orchestrator::*;
pub use report::*;
pub use result::*;
pub use testcase::*;
