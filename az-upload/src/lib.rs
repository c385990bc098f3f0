pub mod cli;
pub mod exitcode;

pub use cli::{run, Cli, CliError, Commands, StorageOpts};
