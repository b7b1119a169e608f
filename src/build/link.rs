//! Executable linking with signature-based relink avoidance.
//!
//! A link signature records every input that changes the bytes of an executable: the
//! timestamps of the objects going in (including the runtime-support object) and the
//! exact flag lists. An executable is relinked only when it is missing or its
//! signature changed.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use rayon::prelude::*;
use tracing::{debug, info};

use super::cache::{ExecutableCache, modified_time, to_nanos};
use super::context::BuildContext;
use super::layout::ArtifactLayout;
use super::toolchain::{CommandRunner, Toolchain};
use crate::error::BuildResult;
use crate::scan::TranslationUnit;

const TEST_RUNNER: &str = "test_runner";

/// One executable to produce.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkJob {
    pub executable: PathBuf,
    /// The entry point's object first, followed by everything linked with it.
    pub objects: Vec<PathBuf>,
    pub import_flags: Vec<String>,
}

/// `path:nanos`, or `path:missing` when the file does not exist.
pub fn dependency_signature(path: &Path) -> String {
    match modified_time(path) {
        Some(time) => format!("{}:{}", path.display(), to_nanos(time)),
        None => format!("{}:missing", path.display()),
    }
}

fn json_list(items: &[String]) -> String {
    serde_json::to_string(items).unwrap_or_default()
}

pub fn link_signature(job: &LinkJob, toolchain: &Toolchain) -> String {
    let mut parts: Vec<String> = job
        .objects
        .iter()
        .map(|object| dependency_signature(object))
        .collect();
    parts.push(match toolchain.runtime_object() {
        Some(runtime) => dependency_signature(runtime),
        None => "runtime:none".to_string(),
    });
    parts.push(format!("flags={}", json_list(&toolchain.compile_flags)));
    parts.push(format!("link={}", json_list(&toolchain.link_flags)));
    parts.push(format!("modules={}", json_list(&toolchain.module_flags)));
    parts.push(format!("imports={}", json_list(&job.import_flags)));
    parts.join("|")
}

fn is_test_runner(unit: &TranslationUnit) -> bool {
    unit.has_main && unit.base_name.contains(TEST_RUNNER)
}

/// Objects without an entry point that are not tests, in topological order.
pub fn shared_objects(units: &[TranslationUnit]) -> BuildResult<Vec<PathBuf>> {
    units
        .iter()
        .filter(|unit| !unit.has_main && !unit.is_test)
        .map(|unit| Ok(unit.artifacts()?.object.clone()))
        .collect()
}

/// One job per entry point, except a hand-written test runner.
pub fn executable_jobs(
    units: &[TranslationUnit],
    toolchain: &Toolchain,
) -> BuildResult<Vec<LinkJob>> {
    let shared = shared_objects(units)?;
    let mut jobs = Vec::new();
    for unit in units.iter().filter(|u| u.has_main && !is_test_runner(u)) {
        let paths = unit.artifacts()?;
        let Some(executable) = &paths.executable else {
            continue;
        };
        let mut objects = vec![paths.object.clone()];
        objects.extend(shared.iter().cloned());
        jobs.push(LinkJob {
            executable: executable.clone(),
            objects,
            import_flags: toolchain.import_ldflags(&unit.imports),
        });
    }
    Ok(jobs)
}

/// The aggregate test executable: every test object without an entry point, linked
/// with the shared objects and, if present, a hand-written runner's main.
pub fn test_runner_job(
    units: &[TranslationUnit],
    toolchain: &Toolchain,
    layout: &ArtifactLayout,
) -> BuildResult<Option<LinkJob>> {
    let tests: Vec<&TranslationUnit> = units
        .iter()
        .filter(|unit| unit.is_test && !unit.has_main)
        .collect();
    if tests.is_empty() {
        info!("no test objects to link");
        return Ok(None);
    }

    let mut objects = Vec::new();
    let mut import_flags = Vec::new();
    let executable = match units.iter().find(|unit| is_test_runner(unit)) {
        Some(runner) => {
            let paths = runner.artifacts()?;
            objects.push(paths.object.clone());
            import_flags.extend(toolchain.import_ldflags(&runner.imports));
            paths
                .executable
                .clone()
                .unwrap_or_else(|| layout.default_test_runner_path())
        }
        None => layout.default_test_runner_path(),
    };
    objects.extend(shared_objects(units)?);
    for test in &tests {
        objects.push(test.artifacts()?.object.clone());
        import_flags.extend(toolchain.import_ldflags(&test.imports));
    }

    Ok(Some(LinkJob {
        executable,
        objects,
        import_flags,
    }))
}

/// Links every job whose signature changed, in parallel. Returns the executables that
/// were linked. The executable cache is written back even when a link fails; it keeps
/// only the jobs' executables and `retained`, which are still produced but not linked
/// by this build.
pub fn link_all(
    ctx: &BuildContext,
    runner: &dyn CommandRunner,
    toolchain: &Toolchain,
    layout: &ArtifactLayout,
    jobs: &[LinkJob],
    retained: &[PathBuf],
) -> BuildResult<Vec<PathBuf>> {
    let cache = ExecutableCache::load(&layout.executable_cache_path());

    let results: Vec<BuildResult<Option<PathBuf>>> = jobs
        .par_iter()
        .map(|job| {
            let signature = link_signature(job, toolchain);
            if job.executable.exists()
                && cache.get(&job.executable).as_deref() == Some(signature.as_str())
            {
                debug!(executable = %job.executable.display(), "skipping link (up-to-date)");
                return Ok(None);
            }
            if ctx.has_failed() {
                return Ok(None);
            }
            let invocation = toolchain.link(&job.objects, &job.executable, &job.import_flags);
            ctx.execute(runner, &invocation)?;
            cache.record(&job.executable, signature);
            ctx.count_linked();
            Ok(Some(job.executable.clone()))
        })
        .collect();

    let live: HashSet<&Path> = jobs
        .iter()
        .map(|job| job.executable.as_path())
        .chain(retained.iter().map(PathBuf::as_path))
        .collect();
    cache.retain(&live);
    cache.save();

    let mut linked = Vec::new();
    for result in results {
        if let Some(executable) = result? {
            linked.push(executable);
        }
    }
    Ok(linked)
}
