//! Incremental build caches.
//!
//! Two independent record files live under `<build root>/cache/`:
//!
//! - `object-cache.txt`: canonical source path -> source timestamp (ns since epoch)
//!   of the last successful compile.
//! - `executable-cache.txt`: executable path -> link signature.
//!
//! Both are plain `key\tvalue\n` records, loaded once per build, mutated under a
//! mutex by the workers and written back once through a temp file and a rename.
//! The caches only ever save work: an unreadable file is an empty cache and a failed
//! write is logged and forgotten.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use tracing::debug;

use crate::error::BuildResult;
use crate::graph::DependencyGraph;
use crate::scan::TranslationUnit;

pub fn to_nanos(time: SystemTime) -> u64 {
    time.duration_since(UNIX_EPOCH)
        .map(|d| u64::try_from(d.as_nanos()).unwrap_or(u64::MAX))
        .unwrap_or(0)
}

pub fn from_nanos(nanos: u64) -> SystemTime {
    UNIX_EPOCH + Duration::from_nanos(nanos)
}

pub fn modified_time(path: &Path) -> Option<SystemTime> {
    fs::metadata(path).and_then(|meta| meta.modified()).ok()
}

fn read_records(path: &Path) -> BTreeMap<String, String> {
    let content = match fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) => {
            debug!(cache = %path.display(), "starting with empty cache: {}", e);
            return BTreeMap::new();
        }
    };
    content
        .lines()
        .filter_map(|line| line.split_once('\t'))
        .map(|(key, value)| (key.to_string(), value.to_string()))
        .collect()
}

fn write_records(path: &Path, records: &BTreeMap<String, String>) -> std::io::Result<()> {
    let mut tmp_name = path.as_os_str().to_owned();
    tmp_name.push(".tmp");
    let tmp = PathBuf::from(tmp_name);

    let mut buffer = String::new();
    for (key, value) in records {
        buffer.push_str(key);
        buffer.push('\t');
        buffer.push_str(value);
        buffer.push('\n');
    }
    let mut file = fs::File::create(&tmp)?;
    file.write_all(buffer.as_bytes())?;
    file.sync_all()?;
    drop(file);
    fs::rename(&tmp, path)
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Last-known-good source timestamps, keyed by canonical source path.
#[derive(Debug)]
pub struct ObjectCache {
    path: PathBuf,
    entries: Mutex<BTreeMap<String, SystemTime>>,
}

impl ObjectCache {
    pub fn load(path: &Path) -> Self {
        let entries = read_records(path)
            .into_iter()
            .filter_map(|(key, value)| value.trim().parse::<u64>().ok().map(|n| (key, from_nanos(n))))
            .collect();
        Self {
            path: path.to_path_buf(),
            entries: Mutex::new(entries),
        }
    }

    pub fn key(unit: &TranslationUnit) -> String {
        unit.full_path.to_string_lossy().into_owned()
    }

    pub fn get(&self, key: &str) -> Option<SystemTime> {
        lock(&self.entries).get(key).copied()
    }

    /// Records a successful compile of `unit`.
    pub fn record(&self, unit: &TranslationUnit) {
        lock(&self.entries).insert(Self::key(unit), unit.modified);
    }

    pub fn len(&self) -> usize {
        lock(&self.entries).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn save(&self) {
        let records: BTreeMap<String, String> = lock(&self.entries)
            .iter()
            .map(|(key, time)| (key.clone(), to_nanos(*time).to_string()))
            .collect();
        if let Err(e) = write_records(&self.path, &records) {
            debug!(cache = %self.path.display(), "object cache not saved: {}", e);
        }
    }
}

/// Link signatures of produced executables.
#[derive(Debug)]
pub struct ExecutableCache {
    path: PathBuf,
    entries: Mutex<BTreeMap<String, String>>,
}

impl ExecutableCache {
    pub fn load(path: &Path) -> Self {
        Self {
            path: path.to_path_buf(),
            entries: Mutex::new(read_records(path)),
        }
    }

    pub fn get(&self, executable: &Path) -> Option<String> {
        lock(&self.entries)
            .get(executable.to_string_lossy().as_ref())
            .cloned()
    }

    pub fn record(&self, executable: &Path, signature: String) {
        lock(&self.entries).insert(executable.to_string_lossy().into_owned(), signature);
    }

    pub fn is_empty(&self) -> bool {
        lock(&self.entries).is_empty()
    }

    /// Forgets every executable not in `live`, so removed entry points drop out.
    pub fn retain(&self, live: &HashSet<&Path>) {
        lock(&self.entries).retain(|key, _| live.contains(Path::new(key)));
    }

    /// Writes the cache, or removes the file when there is nothing to remember.
    pub fn save(&self) {
        let entries = lock(&self.entries);
        let result = if entries.is_empty() {
            match fs::remove_file(&self.path) {
                Err(e) if e.kind() != std::io::ErrorKind::NotFound => Err(e),
                _ => Ok(()),
            }
        } else {
            write_records(&self.path, &entries)
        };
        if let Err(e) = result {
            debug!(cache = %self.path.display(), "executable cache not saved: {}", e);
        }
    }
}

/// Decides which units need recompiling.
///
/// A unit is stale when its own record, object or interface artifact is out of date,
/// or when anything it depends on is stale or has an interface artifact that is
/// missing, older than its source, or newer than this unit's object. The traversal
/// is iterative and memoized; a dependency that is still being evaluated (only
/// possible with a cycle) counts as fresh.
pub fn stale_units(
    units: &[TranslationUnit],
    graph: &DependencyGraph,
    cache: &ObjectCache,
) -> BuildResult<HashSet<String>> {
    let by_id: HashMap<&str, &TranslationUnit> =
        units.iter().map(|unit| (unit.id.as_str(), unit)).collect();

    let mut memo: HashMap<&str, bool> = HashMap::with_capacity(units.len());
    let mut on_stack: HashSet<&str> = HashSet::new();

    for root in units {
        let mut stack: Vec<(&str, bool)> = vec![(root.id.as_str(), false)];
        while let Some((id, expanded)) = stack.pop() {
            if expanded {
                on_stack.remove(id);
                let Some(unit) = by_id.get(id).copied() else {
                    continue;
                };
                let mut stale = unit_is_stale(unit, cache)?;
                if !stale {
                    for dep_id in graph.dependencies_of(id) {
                        let Some(dep) = by_id.get(dep_id).copied() else {
                            continue;
                        };
                        if memo.get(dep_id).copied().unwrap_or(false)
                            || dependency_interface_is_stale(dep, unit)?
                        {
                            stale = true;
                            break;
                        }
                    }
                }
                memo.insert(id, stale);
                continue;
            }

            if memo.contains_key(id) || on_stack.contains(id) {
                continue;
            }
            on_stack.insert(id);
            stack.push((id, true));
            for dep_id in graph.dependencies_of(id) {
                if !memo.contains_key(dep_id) && !on_stack.contains(dep_id) {
                    stack.push((dep_id, false));
                }
            }
        }
    }

    Ok(memo
        .into_iter()
        .filter(|&(_, stale)| stale)
        .map(|(id, _)| id.to_string())
        .collect())
}

fn unit_is_stale(unit: &TranslationUnit, cache: &ObjectCache) -> BuildResult<bool> {
    let paths = unit.artifacts()?;
    let Some(cached) = cache.get(&ObjectCache::key(unit)) else {
        return Ok(true);
    };
    if cached < unit.modified {
        return Ok(true);
    }
    match modified_time(&paths.object) {
        None => return Ok(true),
        Some(object_time) if object_time < cached => return Ok(true),
        Some(_) => {}
    }
    if let Some(interface) = &paths.interface {
        match modified_time(interface) {
            Some(pcm_time) if pcm_time >= unit.modified => {}
            _ => return Ok(true),
        }
    }
    Ok(false)
}

fn dependency_interface_is_stale(
    dependency: &TranslationUnit,
    consumer: &TranslationUnit,
) -> BuildResult<bool> {
    let Some(interface) = &dependency.artifacts()?.interface else {
        return Ok(false);
    };
    let Some(pcm_time) = modified_time(interface) else {
        return Ok(true);
    };
    if pcm_time < dependency.modified {
        return Ok(true);
    }
    let consumer_object = modified_time(&consumer.artifacts()?.object);
    Ok(consumer_object.is_some_and(|object_time| pcm_time > object_time))
}
