pub mod config;
pub mod queue;
pub mod tasks;
pub mod upload;

pub use config::*;
pub use queue::*;
pub use tasks::*;
pub use upload::*;
