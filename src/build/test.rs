use super::context::{BuildContext, Phase};
use super::core::BuildSystem;
use super::toolchain::Invocation;
use crate::error::{BuildError, BuildResult};
use colored::*;

/// Builds with tests, links the aggregate runner and runs it.
///
/// The runner receives `filter` (if any) followed by `args`. Its exit code is the
/// verdict: zero passes, anything else is [`BuildError::TestsFailed`].
pub fn run_tests(system: &BuildSystem, filter: Option<&str>, args: &[String]) -> BuildResult<()> {
    let summary = system.build_with_tests()?;
    let Some(runner_path) = summary.test_runner else {
        return Err(BuildError::NoTests);
    };

    let mut ctx = BuildContext::new(system.options().profile, system.options().verbose);
    ctx.enter(Phase::Test);

    let invocation = Invocation::new(runner_path.to_string_lossy())
        .args(filter)
        .args(args);
    println!("{} Running tests...", "🧪".magenta());
    if ctx.verbose {
        ctx.report(format!("   {} {}", "$".dimmed(), invocation));
    }

    let code = system.runner().run_attached(&invocation)?;
    if code == 0 {
        println!("{}", "ALL TESTS PASSED ✨".green().bold());
        Ok(())
    } else {
        println!("{}", "SOME TESTS FAILED 💀".red().bold());
        Err(BuildError::TestsFailed { code })
    }
}
