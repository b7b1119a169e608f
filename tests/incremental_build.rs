//! Incremental build tests
//!
//! These tests drive the whole pipeline (scan, level, compile, link) on real source
//! trees, with a recording command runner standing in for the compiler. The runner
//! creates the `-o` output of every command so timestamps behave like a real build.

use std::fs::{self, File};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::{Duration, SystemTime};

use modbuild::build::{BuildSystem, CommandOutput, CommandRunner, Invocation, run_tests};
use modbuild::config::{BuildOptions, Profile};
use modbuild::{BuildError, BuildResult};
use tempfile::TempDir;

struct Recorder {
    outputs: Mutex<Vec<String>>,
    attached: Mutex<Vec<Invocation>>,
    /// Modification time given to the next output; strictly increasing.
    clock: Mutex<SystemTime>,
    exit_code: i32,
}

impl Default for Recorder {
    fn default() -> Self {
        Self {
            outputs: Mutex::default(),
            attached: Mutex::default(),
            clock: Mutex::new(ago(100)),
            exit_code: 0,
        }
    }
}

/// Shares one recorder between the build system and the test.
struct Shared(Arc<Recorder>);

impl CommandRunner for Shared {
    fn run(&self, invocation: &Invocation) -> BuildResult<CommandOutput> {
        let output = invocation.output().expect("every step names its output");
        fs::create_dir_all(output.parent().unwrap()).unwrap();
        let mut clock = self.0.clock.lock().unwrap();
        *clock += Duration::from_millis(1);
        fs::write(output, "").unwrap();
        touch(output, *clock);
        drop(clock);
        self.0
            .outputs
            .lock()
            .unwrap()
            .push(output.file_name().unwrap().to_string_lossy().into_owned());
        Ok(CommandOutput {
            success: true,
            ..Default::default()
        })
    }

    fn run_attached(&self, invocation: &Invocation) -> BuildResult<i32> {
        self.0.attached.lock().unwrap().push(invocation.clone());
        Ok(self.0.exit_code)
    }
}

impl Recorder {
    fn take(&self) -> Vec<String> {
        std::mem::take(&mut *self.outputs.lock().unwrap())
    }
}

fn ago(secs: u64) -> SystemTime {
    SystemTime::now() - Duration::from_secs(secs)
}

fn write_source(root: &Path, relative: &str, content: &str, modified: SystemTime) {
    let path = root.join(relative);
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(&path, content).unwrap();
    touch(&path, modified);
}

fn touch(path: &Path, modified: SystemTime) {
    File::options()
        .write(true)
        .open(path)
        .unwrap()
        .set_modified(modified)
        .unwrap();
}

/// Interface `a`, its implementation unit and an entry point `b` importing `a`.
fn scenario_project() -> TempDir {
    let dir = TempDir::new().unwrap();
    let t0 = ago(1000);
    write_source(dir.path(), "a.c++m", "export module a;\nexport int answer();\n", t0);
    write_source(
        dir.path(),
        "a.impl.c++",
        "module a;\nint answer() { return 42; }\n",
        t0,
    );
    write_source(
        dir.path(),
        "b.c++",
        "import a;\nint main() { return answer() == 42 ? 0 : 1; }\n",
        t0,
    );
    dir
}

fn options(root: &Path) -> BuildOptions {
    let mut options = BuildOptions::new(root, Profile::Debug);
    options.compiler = "clang++".into();
    options.std_module = None;
    options
}

fn system(options: BuildOptions, recorder: &Arc<Recorder>) -> BuildSystem {
    BuildSystem::with_runner(options, Box::new(Shared(Arc::clone(recorder))))
}

fn position(log: &[String], name: &str) -> usize {
    log.iter()
        .position(|entry| entry == name)
        .unwrap_or_else(|| panic!("{name} not produced; log: {log:?}"))
}

#[test]
fn test_plan_levels_the_scenario() {
    let dir = scenario_project();
    let recorder = Arc::new(Recorder::default());
    let plan = system(options(dir.path()), &recorder).plan().unwrap();

    let level = |id: &str| {
        plan.units
            .iter()
            .find(|unit| unit.id == id)
            .and_then(|unit| unit.level())
            .unwrap()
    };
    assert_eq!(level("a"), 0);
    assert_eq!(level("a.impl.c++"), 1);
    assert_eq!(level("b.c++"), 1);
}

#[test]
fn test_first_build_then_noop_then_interface_edit() {
    let dir = scenario_project();
    let recorder = Arc::new(Recorder::default());
    let build = system(options(dir.path()), &recorder);

    // First build: a's pcm and object at level 0, then a_impl and b, then the link.
    let summary = build.build().unwrap();
    let log = recorder.take();
    assert_eq!(summary.compiled.len(), 3);
    assert!(position(&log, "a.pcm") < position(&log, "a.o"));
    assert!(position(&log, "a.o") < position(&log, "a.impl.o"));
    assert!(position(&log, "a.o") < position(&log, "b.o"));
    assert!(position(&log, "b.o") < position(&log, "b"));
    assert_eq!(summary.linked.len(), 1);

    // No edits: nothing compiles, nothing links.
    let summary = build.build().unwrap();
    assert!(summary.is_up_to_date(), "unexpected work: {summary:?}");
    assert!(recorder.take().is_empty());

    // Editing a recompiles every importer and relinks b.
    touch(&dir.path().join("a.c++m"), ago(500));
    let summary = build.build().unwrap();
    let mut compiled = summary.compiled.clone();
    compiled.sort();
    assert_eq!(compiled, vec!["a", "a.impl.c++", "b.c++"]);
    assert_eq!(
        summary.linked,
        vec![build.layout().binary_dir().join("b")]
    );
}

#[test]
fn test_unrelated_unit_is_not_recompiled() {
    let dir = scenario_project();
    write_source(
        dir.path(),
        "util/c.c++",
        "int helper() { return 1; }\n",
        ago(1000),
    );
    let recorder = Arc::new(Recorder::default());
    let build = system(options(dir.path()), &recorder);
    build.build().unwrap();
    recorder.take();

    touch(&dir.path().join("a.c++m"), ago(500));
    let summary = build.build().unwrap();
    assert!(!summary.compiled.contains(&"c.c++".to_string()));
}

#[test]
fn test_interface_edit_reaches_importers_two_hops_away() {
    let dir = TempDir::new().unwrap();
    let t0 = ago(1000);
    write_source(dir.path(), "core.c++m", "export module core;\nexport int base();\n", t0);
    write_source(
        dir.path(),
        "mid.c++m",
        "export module mid;\nimport core;\nexport int twice();\n",
        t0,
    );
    write_source(
        dir.path(),
        "app.c++",
        "import mid;\nint main() { return twice(); }\n",
        t0,
    );
    write_source(dir.path(), "sibling.c++", "int helper() { return 7; }\n", t0);

    let recorder = Arc::new(Recorder::default());
    let build = system(options(dir.path()), &recorder);
    build.build().unwrap();
    recorder.take();

    touch(&dir.path().join("core.c++m"), ago(500));
    let summary = build.build().unwrap();
    let mut compiled = summary.compiled.clone();
    compiled.sort();
    assert_eq!(compiled, vec!["app.c++", "core", "mid"]);
    assert_eq!(summary.linked, vec![build.layout().binary_dir().join("app")]);

    let log = recorder.take();
    assert!(position(&log, "core.pcm") < position(&log, "mid.pcm"));
    assert!(position(&log, "mid.pcm") < position(&log, "app.o"));
    assert!(!log.contains(&"sibling.o".to_string()));
}

#[test]
fn test_removed_entry_point_is_dropped_from_executable_cache() {
    let dir = scenario_project();
    let recorder = Arc::new(Recorder::default());
    let build = system(options(dir.path()), &recorder);
    build.build().unwrap();
    let cache_path = build.layout().executable_cache_path();
    assert!(fs::read_to_string(&cache_path).unwrap().contains("bin/b"));

    fs::remove_file(dir.path().join("b.c++")).unwrap();
    let summary = build.build().unwrap();
    assert!(summary.linked.is_empty());
    assert!(!cache_path.exists());
}

#[test]
fn test_link_flag_change_relinks_without_compiling() {
    let dir = scenario_project();
    let recorder = Arc::new(Recorder::default());
    system(options(dir.path()), &recorder).build().unwrap();
    recorder.take();

    let mut changed = options(dir.path());
    changed.extra_link_flags.push("-lm".into());
    let summary = system(changed, &recorder).build().unwrap();
    assert!(summary.compiled.is_empty());
    assert_eq!(summary.linked.len(), 1);
    assert_eq!(recorder.take(), vec!["b"]);
}

#[test]
fn test_deleted_object_is_rebuilt() {
    let dir = scenario_project();
    let recorder = Arc::new(Recorder::default());
    let build = system(options(dir.path()), &recorder);
    build.build().unwrap();
    recorder.take();

    fs::remove_file(build.layout().object_dir().join("a.impl.o")).unwrap();
    let summary = build.build().unwrap();
    assert_eq!(summary.compiled, vec!["a.impl.c++"]);
    assert_eq!(summary.linked.len(), 1);
}

#[test]
fn test_release_and_debug_use_separate_build_roots() {
    let dir = scenario_project();
    let recorder = Arc::new(Recorder::default());
    let debug = system(options(dir.path()), &recorder);
    let release = system(
        BuildOptions {
            profile: Profile::Release,
            ..options(dir.path())
        },
        &recorder,
    );
    assert_ne!(debug.layout().build_root(), release.layout().build_root());

    debug.build().unwrap();
    // A debug build says nothing about release artifacts.
    let summary = release.build().unwrap();
    assert_eq!(summary.compiled.len(), 3);
}

fn test_project() -> TempDir {
    let dir = scenario_project();
    write_source(
        dir.path(),
        "tests/a.test.c++",
        "import a;\nstatic int checked = answer();\n",
        ago(1000),
    );
    dir
}

#[test]
fn test_run_tests_links_runner_and_passes_arguments() {
    let dir = test_project();
    let recorder = Arc::new(Recorder::default());
    let build = system(options(dir.path()), &recorder);

    run_tests(&build, Some("math"), &["--quiet".to_string()]).unwrap();

    let log = recorder.take();
    assert!(log.contains(&"a.test.o".to_string()));
    assert!(log.contains(&"test_runner".to_string()));

    let attached = recorder.attached.lock().unwrap();
    assert_eq!(attached.len(), 1);
    assert_eq!(
        PathBuf::from(&attached[0].program),
        build.layout().default_test_runner_path()
    );
    assert_eq!(attached[0].args, vec!["math", "--quiet"]);
}

#[test]
fn test_plain_build_keeps_test_runner_signature() {
    let dir = test_project();
    let recorder = Arc::new(Recorder::default());
    let build = system(options(dir.path()), &recorder);

    run_tests(&build, None, &[]).unwrap();
    build.build().unwrap();
    recorder.take();

    let summary = build.build_with_tests().unwrap();
    assert!(summary.is_up_to_date(), "unexpected work: {summary:?}");
    assert!(recorder.take().is_empty());
}

#[test]
fn test_failing_runner_reports_its_exit_code() {
    let dir = test_project();
    let recorder = Arc::new(Recorder {
        exit_code: 3,
        ..Default::default()
    });
    let build = system(options(dir.path()), &recorder);

    let err = run_tests(&build, None, &[]).unwrap_err();
    assert!(matches!(err, BuildError::TestsFailed { code: 3 }));
    assert_eq!(err.exit_code(), 3);
}

#[test]
fn test_no_tests_is_an_error() {
    let dir = scenario_project();
    let recorder = Arc::new(Recorder::default());
    let build = system(options(dir.path()), &recorder);
    let err = run_tests(&build, None, &[]).unwrap_err();
    assert!(matches!(err, BuildError::NoTests));
}
