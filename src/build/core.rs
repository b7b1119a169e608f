use super::cache::modified_time;
use super::compile::compile_units;
use super::context::{BuildContext, Phase};
use super::layout::ArtifactLayout;
use super::link::{executable_jobs, link_all, test_runner_job};
use super::toolchain::{CommandRunner, ProcessRunner, Toolchain};
use crate::config::BuildOptions;
use crate::error::{BuildError, BuildResult};
use crate::graph::{DependencyGraph, level_units};
use crate::scan::{TranslationUnit, scan_project};
use colored::*;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info};

/// Scanned, leveled and resolved units, ready to compile.
#[derive(Debug)]
pub struct BuildPlan {
    pub units: Vec<TranslationUnit>,
    pub graph: DependencyGraph,
}

#[derive(Debug, Default)]
pub struct BuildSummary {
    pub compiled: Vec<String>,
    pub linked: Vec<PathBuf>,
    pub test_runner: Option<PathBuf>,
    pub elapsed: Duration,
}

impl BuildSummary {
    pub fn is_up_to_date(&self) -> bool {
        self.compiled.is_empty() && self.linked.is_empty()
    }
}

pub struct BuildSystem {
    options: BuildOptions,
    layout: ArtifactLayout,
    runner: Box<dyn CommandRunner>,
}

impl BuildSystem {
    pub fn new(options: BuildOptions) -> Self {
        Self::with_runner(options, Box::new(ProcessRunner))
    }

    pub fn with_runner(options: BuildOptions, runner: Box<dyn CommandRunner>) -> Self {
        let layout = ArtifactLayout::new(&options.project_root, options.profile.name());
        Self {
            options,
            layout,
            runner,
        }
    }

    pub fn options(&self) -> &BuildOptions {
        &self.options
    }

    pub fn layout(&self) -> &ArtifactLayout {
        &self.layout
    }

    pub(crate) fn runner(&self) -> &dyn CommandRunner {
        self.runner.as_ref()
    }

    /// Scan, level and resolve. No command runs and nothing is written.
    pub fn plan(&self) -> BuildResult<BuildPlan> {
        let units = scan_project(&self.options.project_root, &self.options.scan_options());
        if units.is_empty() {
            return Err(BuildError::NoSources {
                root: self.options.project_root.clone(),
            });
        }
        let (mut units, graph) = level_units(units)?;
        self.layout.resolve_all(&mut units)?;
        debug!(units = units.len(), "build plan ready");
        Ok(BuildPlan { units, graph })
    }

    pub fn build(&self) -> BuildResult<BuildSummary> {
        self.run(false)
    }

    /// Like [`BuildSystem::build`], and also links the aggregate test runner.
    pub fn build_with_tests(&self) -> BuildResult<BuildSummary> {
        self.run(true)
    }

    fn run(&self, with_tests: bool) -> BuildResult<BuildSummary> {
        let mut ctx = BuildContext::new(self.options.profile, self.options.verbose);
        println!(
            "{} Building {} ({})",
            "🔨".cyan(),
            self.options.project_root.display(),
            self.options.profile.to_string().bold()
        );

        self.layout.create_dirs()?;
        let mut toolchain = Toolchain::new(&self.options, &self.layout);

        if let Some(source) = &self.options.std_module {
            ctx.enter(Phase::Prelude);
            self.build_std_module(&ctx, &toolchain, source)?;
            toolchain.enable_std_module(&self.layout.std_pcm_path(), &self.layout.std_object_path());
        }

        ctx.enter(Phase::Scan);
        let plan = self.plan()?;
        toolchain.register_modules(&plan.units)?;
        info!(units = plan.units.len(), "scanned project");

        ctx.enter(Phase::Compile);
        let compiled = compile_units(
            &mut ctx,
            self.runner(),
            &toolchain,
            &self.layout,
            &plan.units,
            &plan.graph,
        )?;
        if !compiled.is_empty() {
            println!("   {} Compiled {} unit(s)", "⚙".cyan(), compiled.len());
        }

        ctx.enter(Phase::Link);
        let mut jobs = executable_jobs(&plan.units, &toolchain)?;
        let runner_job = test_runner_job(&plan.units, &toolchain, &self.layout)?;
        let mut retained = Vec::new();
        let test_runner = match runner_job {
            Some(job) if with_tests => {
                let executable = job.executable.clone();
                jobs.push(job);
                Some(executable)
            }
            Some(job) => {
                retained.push(job.executable);
                None
            }
            None => None,
        };
        if !jobs.is_empty() {
            debug!(jobs = jobs.len(), "linking");
        }
        let linked = link_all(
            &ctx,
            self.runner(),
            &toolchain,
            &self.layout,
            &jobs,
            &retained,
        )?;
        for executable in &linked {
            println!("   {} Linked {}", "🔗".cyan(), executable.display());
        }

        let summary = BuildSummary {
            compiled,
            linked,
            test_runner,
            elapsed: ctx.elapsed(),
        };
        if summary.is_up_to_date() {
            println!("{} Up to date", "⚡".green());
        } else {
            println!(
                "{} Build finished in {:.2?}",
                "✓".green(),
                summary.elapsed
            );
        }
        Ok(summary)
    }

    /// Precompiles the standard library module and its object when out of date.
    fn build_std_module(
        &self,
        ctx: &BuildContext,
        toolchain: &Toolchain,
        source: &Path,
    ) -> BuildResult<()> {
        let Some(source_time) = modified_time(source) else {
            return Err(BuildError::Config(format!(
                "standard library module source not found: {}",
                source.display()
            )));
        };
        let pcm = self.layout.std_pcm_path();
        let object = self.layout.std_object_path();

        if modified_time(&pcm).is_none_or(|pcm_time| pcm_time < source_time) {
            println!("   {} Precompiling std module", "📦".cyan());
            ctx.execute(self.runner(), &toolchain.precompile_std(source, &pcm))?;
        }
        let pcm_time = modified_time(&pcm);
        let object_fresh = match (modified_time(&object), pcm_time) {
            (Some(object_time), Some(pcm_time)) => object_time >= pcm_time,
            _ => false,
        };
        if !object_fresh {
            ctx.execute(self.runner(), &toolchain.compile_std_object(&pcm, &object))?;
        }
        Ok(())
    }
}
