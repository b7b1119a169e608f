//! Level-by-level compilation.
//!
//! Staleness for the whole build is decided up front. Stale units are then grouped by
//! dependency level and each level runs with one worker per unit; the next level starts
//! only when every worker of the previous one has returned.

use std::collections::BTreeMap;
use std::thread;

use tracing::{debug, info};

use super::cache::{ObjectCache, stale_units};
use super::context::BuildContext;
use super::layout::ArtifactLayout;
use super::toolchain::{CommandRunner, Toolchain};
use crate::error::{BuildError, BuildResult};
use crate::graph::DependencyGraph;
use crate::scan::TranslationUnit;

/// Unleveled units run after everything else.
const TRAILING_BATCH: usize = usize::MAX;

/// Compiles every stale unit. Returns the ids of the units that were compiled, in
/// level order. The object cache is written back even when a compile fails.
pub fn compile_units(
    ctx: &mut BuildContext,
    runner: &dyn CommandRunner,
    toolchain: &Toolchain,
    layout: &ArtifactLayout,
    units: &[TranslationUnit],
    graph: &DependencyGraph,
) -> BuildResult<Vec<String>> {
    let cache = ObjectCache::load(&layout.object_cache_path());
    let stale = stale_units(units, graph, &cache)?;
    if stale.is_empty() {
        info!("all objects up to date");
        return Ok(Vec::new());
    }

    let mut batches: BTreeMap<usize, Vec<&TranslationUnit>> = BTreeMap::new();
    for unit in units.iter().filter(|unit| stale.contains(&unit.id)) {
        batches
            .entry(unit.level().unwrap_or(TRAILING_BATCH))
            .or_default()
            .push(unit);
    }

    ctx.start_progress(stale.len(), "Compiling...");
    let result = run_batches(ctx, runner, toolchain, layout, &cache, &batches);
    ctx.finish_progress();
    cache.save();
    result
}

fn run_batches(
    ctx: &BuildContext,
    runner: &dyn CommandRunner,
    toolchain: &Toolchain,
    layout: &ArtifactLayout,
    cache: &ObjectCache,
    batches: &BTreeMap<usize, Vec<&TranslationUnit>>,
) -> BuildResult<Vec<String>> {
    let mut compiled = Vec::new();
    let mut first_error = None;

    for (&level, batch) in batches {
        if ctx.has_failed() {
            break;
        }
        debug!(level, units = batch.len(), "compiling level");

        let results: Vec<BuildResult<bool>> = thread::scope(|scope| {
            let workers: Vec<_> = batch
                .iter()
                .map(|&unit| {
                    scope.spawn(move || compile_one(ctx, runner, toolchain, layout, cache, unit))
                })
                .collect();
            workers
                .into_iter()
                .map(|worker| {
                    worker.join().unwrap_or_else(|_| {
                        ctx.mark_failed();
                        Err(BuildError::Internal("compile worker panicked".into()))
                    })
                })
                .collect()
        });

        for (unit, result) in batch.iter().zip(results) {
            match result {
                Ok(true) => compiled.push(unit.id.clone()),
                Ok(false) => {}
                Err(e) => {
                    first_error.get_or_insert(e);
                }
            }
        }
    }

    match first_error {
        Some(e) => Err(e),
        None => Ok(compiled),
    }
}

/// Returns `Ok(false)` when the unit was skipped because the build already failed.
fn compile_one(
    ctx: &BuildContext,
    runner: &dyn CommandRunner,
    toolchain: &Toolchain,
    layout: &ArtifactLayout,
    cache: &ObjectCache,
    unit: &TranslationUnit,
) -> BuildResult<bool> {
    let steps = toolchain.compile_steps(unit, layout)?;
    for step in &steps {
        if ctx.has_failed() {
            debug!(unit = %unit.id, "skipped after earlier failure");
            return Ok(false);
        }
        ctx.execute(runner, step)?;
    }
    cache.record(unit);
    ctx.count_compiled();
    ctx.tick(&unit.relative_path());
    Ok(true)
}
