pub mod commands;
pub mod render;
pub mod scan;

pub use commands::{Cli, Commands};
