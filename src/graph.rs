//! Dependency graph over unit identifiers and its topological leveling.
//!
//! Edges point from a dependency to the unit that needs it. Leveling is a batched
//! Kahn's algorithm: every frontier of zero in-degree units becomes one level, so
//! units sharing a level never depend on each other and can compile concurrently.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use tracing::debug;

use crate::error::{BuildError, BuildResult};
use crate::scan::{TranslationUnit, UnitKind};

#[derive(Debug, Default, Clone)]
pub struct DependencyGraph {
    /// dependency -> dependents
    dependents: BTreeMap<String, BTreeSet<String>>,
    /// unit -> its direct dependencies
    dependencies: BTreeMap<String, BTreeSet<String>>,
    in_degree: BTreeMap<String, usize>,
}

impl DependencyGraph {
    /// Builds the graph for a set of classified units.
    ///
    /// Only imports naming a unit of this project add an edge. Implementation units
    /// also depend on the interface or partition that owns their module.
    pub fn build(units: &[TranslationUnit]) -> BuildResult<Self> {
        let mut by_id: HashMap<&str, &TranslationUnit> = HashMap::with_capacity(units.len());
        for unit in units {
            if let Some(previous) = by_id.insert(unit.id.as_str(), unit) {
                return Err(BuildError::DuplicateUnit {
                    unit: unit.id.clone(),
                    first: previous.full_path.clone(),
                    second: unit.full_path.clone(),
                });
            }
        }

        let mut graph = DependencyGraph::default();
        for unit in units {
            graph.in_degree.insert(unit.id.clone(), 0);
            graph.dependencies.insert(unit.id.clone(), BTreeSet::new());
        }

        for unit in units {
            for import in unit.local_import_candidates() {
                if by_id.contains_key(import) {
                    graph.add_edge(import, &unit.id);
                }
            }
            if unit.kind == UnitKind::Implementation && by_id.contains_key(unit.module.as_str()) {
                graph.add_edge(&unit.module, &unit.id);
            }
        }

        Ok(graph)
    }

    fn add_edge(&mut self, dependency: &str, dependent: &str) {
        let fresh = self
            .dependents
            .entry(dependency.to_string())
            .or_default()
            .insert(dependent.to_string());
        if fresh {
            self.dependencies
                .entry(dependent.to_string())
                .or_default()
                .insert(dependency.to_string());
            *self.in_degree.entry(dependent.to_string()).or_default() += 1;
        }
    }

    pub fn len(&self) -> usize {
        self.in_degree.len()
    }

    pub fn is_empty(&self) -> bool {
        self.in_degree.is_empty()
    }

    pub fn dependents_of(&self, unit: &str) -> impl Iterator<Item = &str> {
        self.dependents
            .get(unit)
            .into_iter()
            .flatten()
            .map(String::as_str)
    }

    pub fn dependencies_of(&self, unit: &str) -> impl Iterator<Item = &str> {
        self.dependencies
            .get(unit)
            .into_iter()
            .flatten()
            .map(String::as_str)
    }

    pub fn in_degree(&self, unit: &str) -> Option<usize> {
        self.in_degree.get(unit).copied()
    }

    /// Groups unit identifiers into dependency levels.
    ///
    /// Fails with [`BuildError::Cycle`] naming every unit that never reached zero
    /// in-degree.
    pub fn levels(&self) -> BuildResult<Vec<Vec<String>>> {
        let mut remaining = self.in_degree.clone();
        let mut frontier: Vec<String> = remaining
            .iter()
            .filter(|&(_, &degree)| degree == 0)
            .map(|(unit, _)| unit.clone())
            .collect();

        let mut levels = Vec::new();
        let mut placed = 0usize;
        while !frontier.is_empty() {
            let mut next = Vec::new();
            for unit in &frontier {
                for dependent in self.dependents_of(unit) {
                    if let Some(degree) = remaining.get_mut(dependent) {
                        *degree -= 1;
                        if *degree == 0 {
                            next.push(dependent.to_string());
                        }
                    }
                }
            }
            placed += frontier.len();
            next.sort();
            levels.push(std::mem::replace(&mut frontier, next));
        }

        if placed < remaining.len() {
            let units: Vec<String> = remaining
                .into_iter()
                .filter(|&(_, degree)| degree > 0)
                .map(|(unit, _)| unit)
                .collect();
            return Err(BuildError::Cycle { units });
        }

        debug!(levels = levels.len(), units = placed, "dependency graph leveled");
        Ok(levels)
    }
}

/// Assigns each unit its level and returns the units in topological order.
pub fn level_units(
    mut units: Vec<TranslationUnit>,
) -> BuildResult<(Vec<TranslationUnit>, DependencyGraph)> {
    let graph = DependencyGraph::build(&units)?;
    let levels = graph.levels()?;

    let mut position: HashMap<&str, (usize, usize)> = HashMap::with_capacity(units.len());
    let mut order = 0usize;
    for (level, ids) in levels.iter().enumerate() {
        for id in ids {
            position.insert(id.as_str(), (level, order));
            order += 1;
        }
    }

    for unit in &mut units {
        let &(level, _) = position.get(unit.id.as_str()).ok_or_else(|| {
            BuildError::Internal(format!("unit {} missing from leveling", unit.id))
        })?;
        unit.set_level(level);
    }
    units.sort_by_key(|unit| position.get(unit.id.as_str()).map(|&(_, order)| order));

    Ok((units, graph))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scan::{ModuleHeader, test_unit};

    fn interface(name: &str, imports: &[&str]) -> TranslationUnit {
        test_unit(
            &format!("{name}.c++m"),
            ModuleHeader {
                module: name.to_string(),
                imports: imports.iter().map(|s| s.to_string()).collect(),
                kind: UnitKind::Interface,
                has_main: false,
            },
        )
    }

    fn program(file: &str, imports: &[&str]) -> TranslationUnit {
        test_unit(
            file,
            ModuleHeader {
                imports: imports.iter().map(|s| s.to_string()).collect(),
                has_main: true,
                ..Default::default()
            },
        )
    }

    fn implementation(file: &str, module: &str) -> TranslationUnit {
        test_unit(
            file,
            ModuleHeader {
                module: module.to_string(),
                kind: UnitKind::Implementation,
                ..Default::default()
            },
        )
    }

    #[test]
    fn test_scenario_levels() {
        let units = vec![
            program("b.c++", &["a", "std"]),
            implementation("a_impl.impl.c++", "a"),
            interface("a", &[]),
        ];
        let (ordered, graph) = level_units(units).unwrap();

        let level_of = |id: &str| ordered.iter().find(|u| u.id == id).unwrap().level();
        assert_eq!(level_of("a"), Some(0));
        assert_eq!(level_of("a_impl.impl.c++"), Some(1));
        assert_eq!(level_of("b.c++"), Some(1));
        assert_eq!(ordered[0].id, "a");
        assert_eq!(graph.in_degree("b.c++"), Some(1));
        assert_eq!(
            graph.dependencies_of("a_impl.impl.c++").collect::<Vec<_>>(),
            vec!["a"]
        );
    }

    #[test]
    fn test_levels_respect_every_edge() {
        let units = vec![
            interface("base", &[]),
            interface("util", &["base"]),
            interface("io", &["base"]),
            interface("app", &["util", "io"]),
            interface("lonely", &[]),
            program("main.c++", &["app", "base"]),
        ];
        let (ordered, graph) = level_units(units).unwrap();
        let levels: HashMap<&str, usize> = ordered
            .iter()
            .map(|u| (u.id.as_str(), u.level().unwrap()))
            .collect();

        for unit in &ordered {
            for dependent in graph.dependents_of(&unit.id) {
                assert!(levels[unit.id.as_str()] < levels[dependent]);
            }
        }
        assert_eq!(levels["lonely"], 0);
        assert_eq!(levels["main.c++"], 3);

        let by_level = graph.levels().unwrap();
        for batch in &by_level {
            for a in batch {
                for b in batch {
                    assert!(!graph.dependents_of(a).any(|d| d == b));
                }
            }
        }
    }

    #[test]
    fn test_mutual_import_is_a_cycle() {
        let units = vec![interface("x", &["y"]), interface("y", &["x"])];
        let err = level_units(units).unwrap_err();
        match err {
            BuildError::Cycle { units } => assert_eq!(units, vec!["x", "y"]),
            other => panic!("expected cycle, got {other:?}"),
        }
    }

    #[test]
    fn test_external_imports_add_no_edges() {
        let units = vec![program("main.c++", &["std", "fmt", "boost.asio"])];
        let graph = DependencyGraph::build(&units).unwrap();
        assert_eq!(graph.in_degree("main.c++"), Some(0));
        assert_eq!(graph.levels().unwrap(), vec![vec!["main.c++".to_string()]]);
    }

    #[test]
    fn test_repeated_import_counts_once() {
        let units = vec![interface("a", &[]), program("main.c++", &["a", "a"])];
        let graph = DependencyGraph::build(&units).unwrap();
        assert_eq!(graph.in_degree("main.c++"), Some(1));
        assert_eq!(graph.levels().unwrap().len(), 2);
    }

    #[test]
    fn test_duplicate_identifiers_are_rejected() {
        let units = vec![
            test_unit("a/util.c++", ModuleHeader::default()),
            test_unit("b/util.c++", ModuleHeader::default()),
        ];
        let err = DependencyGraph::build(&units).unwrap_err();
        assert!(matches!(err, BuildError::DuplicateUnit { ref unit, .. } if unit == "util.c++"));
    }
}
