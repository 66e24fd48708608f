// Test execution: the dependency-ordered runner, the offline validator,
// and config scaffolding.

pub mod runner;
pub mod setup;
pub mod validator;

pub use runner::{RunSummary, Runner};
pub use setup::scaffold;
pub use validator::validate;
