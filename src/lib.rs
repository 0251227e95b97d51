pub mod cli;
pub mod load_config;
pub mod site;

pub use cli::{run, Cli, Commands};
