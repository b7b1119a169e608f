pub mod cache;
mod clean;
mod compile;
pub mod context;
mod core;
mod feedback;
pub mod layout;
pub mod link;
mod test;
pub mod toolchain;
mod utils;

pub use clean::clean;
pub use compile::compile_units;
pub use core::{BuildPlan, BuildSummary, BuildSystem};
pub use feedback::FeedbackAnalyzer;
pub use layout::{ArtifactLayout, ArtifactPaths};
pub use test::run_tests;
pub use toolchain::{CommandOutput, CommandRunner, Invocation, ProcessRunner, Toolchain};
pub use utils::{load_config, split_flags, std_flag};
