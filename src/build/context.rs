//! Per-build session state.

use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::{Duration, Instant};

use colored::*;
use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};
use tracing::debug;

use super::feedback::FeedbackAnalyzer;
use super::toolchain::{CommandRunner, Invocation};
use crate::config::Profile;
use crate::error::{BuildError, BuildResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Idle,
    Prelude,
    Scan,
    Compile,
    Link,
    Test,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Phase::Idle => "idle",
            Phase::Prelude => "prelude",
            Phase::Scan => "scan",
            Phase::Compile => "compile",
            Phase::Link => "link",
            Phase::Test => "test",
        };
        f.write_str(name)
    }
}

/// Created at build start and handed to every phase.
pub struct BuildContext {
    pub profile: Profile,
    pub verbose: bool,
    started: Instant,
    phase: Phase,
    failed: AtomicBool,
    compiled: AtomicUsize,
    linked: AtomicUsize,
    progress: ProgressBar,
}

impl BuildContext {
    pub fn new(profile: Profile, verbose: bool) -> Self {
        Self {
            profile,
            verbose,
            started: Instant::now(),
            phase: Phase::Idle,
            failed: AtomicBool::new(false),
            compiled: AtomicUsize::new(0),
            linked: AtomicUsize::new(0),
            progress: ProgressBar::hidden(),
        }
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn enter(&mut self, phase: Phase) {
        debug!(from = %self.phase, to = %phase, "build phase");
        self.phase = phase;
    }

    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    pub fn has_failed(&self) -> bool {
        self.failed.load(Ordering::SeqCst)
    }

    pub fn mark_failed(&self) {
        self.failed.store(true, Ordering::SeqCst);
    }

    pub fn compiled(&self) -> usize {
        self.compiled.load(Ordering::SeqCst)
    }

    pub fn linked(&self) -> usize {
        self.linked.load(Ordering::SeqCst)
    }

    pub(crate) fn count_compiled(&self) {
        self.compiled.fetch_add(1, Ordering::SeqCst);
    }

    pub(crate) fn count_linked(&self) {
        self.linked.fetch_add(1, Ordering::SeqCst);
    }

    /// Shows a progress bar for `total` steps on stderr, if it is a terminal.
    pub fn start_progress(&mut self, total: usize, message: &str) {
        let bar = ProgressBar::with_draw_target(Some(total as u64), ProgressDrawTarget::stderr());
        if let Ok(style) = ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] {bar:40.cyan/blue} {pos}/{len} {msg}")
        {
            bar.set_style(style.progress_chars("#>-"));
        }
        bar.set_message(message.to_string());
        self.progress = bar;
    }

    pub fn tick(&self, message: &str) {
        self.progress.set_message(message.to_string());
        self.progress.inc(1);
    }

    pub fn finish_progress(&mut self) {
        self.progress.finish_and_clear();
        self.progress = ProgressBar::hidden();
    }

    /// Prints a line without tearing the progress bar.
    pub fn report(&self, line: impl AsRef<str>) {
        self.progress.suspend(|| eprintln!("{}", line.as_ref()));
    }

    /// Runs one toolchain step. Stderr is shown as warnings on success; a non-zero
    /// exit marks the build failed.
    pub fn execute(&self, runner: &dyn CommandRunner, invocation: &Invocation) -> BuildResult<()> {
        if self.verbose {
            self.report(format!("   {} {}", "$".dimmed(), invocation));
        }
        debug!(command = %invocation, "executing");
        let output = runner.run(invocation).inspect_err(|_| self.mark_failed())?;

        if output.success {
            if !output.stderr.trim().is_empty() {
                self.report(format!("{} {}", "!".yellow(), output.stderr.trim_end().yellow()));
            }
            return Ok(());
        }

        self.mark_failed();
        self.report(format!(
            "{} {}\n{}",
            "x".red(),
            invocation.to_string().bold(),
            output.stderr.trim_end().red()
        ));
        if let Some(hint) = FeedbackAnalyzer::analyze(&output.stderr) {
            self.report(format!("{} {}", "ℹ".blue(), hint));
        }
        Err(BuildError::Command {
            command: invocation.to_string(),
            status: output.status,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::build::toolchain::CommandOutput;

    struct Failing;

    impl CommandRunner for Failing {
        fn run(&self, _: &Invocation) -> BuildResult<CommandOutput> {
            Ok(CommandOutput {
                success: false,
                status: "exit status: 1".into(),
                stderr: "error: boom".into(),
            })
        }

        fn run_attached(&self, _: &Invocation) -> BuildResult<i32> {
            Ok(1)
        }
    }

    #[test]
    fn test_failed_command_marks_context() {
        let ctx = BuildContext::new(Profile::Debug, false);
        assert!(!ctx.has_failed());
        let err = ctx
            .execute(&Failing, &Invocation::new("clang++").arg("-c"))
            .unwrap_err();
        assert!(ctx.has_failed());
        assert!(matches!(err, BuildError::Command { ref command, .. } if command == "clang++ -c"));
    }

    #[test]
    fn test_phase_transitions() {
        let mut ctx = BuildContext::new(Profile::Release, false);
        assert_eq!(ctx.phase(), Phase::Idle);
        ctx.enter(Phase::Compile);
        assert_eq!(ctx.phase(), Phase::Compile);
        assert_eq!(ctx.phase().to_string(), "compile");
    }
}
