pub mod args;

pub use args::{Cli, Commands, RunArgs, SetupArgs, ValidateArgs};
