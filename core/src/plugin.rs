mod external;
mod problem;
mod registry;

pub use external::{ExternalGenerator, ExternalPlugin, ExternalPlugins};
pub use problem::*;
pub use registry::*;
