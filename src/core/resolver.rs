//! Dependency resolution
//!
//! Expands the seed set into the build closure, computes the build order and
//! collects dependencies that can never be satisfied.

use std::collections::{BTreeMap, BTreeSet, VecDeque};

use crate::core::dependency::DependencyRef;
use crate::error::ResolverError;

/// Outcome of resolving a seed set
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Resolution {
    /// Packages to build this run
    pub building: BTreeSet<String>,
    /// Build order over `building`, dependencies first
    pub order: Vec<String>,
    /// Unmanaged, unresolved dependency names per package
    pub problems: BTreeMap<String, Vec<String>>,
    /// Dependency directories per package, restricted to `building` keys
    pub depmap: BTreeMap<String, BTreeSet<String>>,
}

/// Dependency graph for packages
#[derive(Debug)]
pub struct DependencyGraph<'a, D> {
    /// Adjacency list: package -> declared dependencies
    edges: BTreeMap<&'a str, &'a [D]>,
}

impl<D> Default for DependencyGraph<'_, D> {
    fn default() -> Self {
        Self {
            edges: BTreeMap::new(),
        }
    }
}

impl<'a, D: DependencyRef> DependencyGraph<'a, D> {
    /// Create a new empty dependency graph
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a package to the graph
    pub fn add_package(&mut self, name: &'a str, dependencies: &'a [D]) {
        self.edges.insert(name, dependencies);
    }

    /// Resolve `seed` into the build closure and its order
    pub fn resolve(&self, seed: &BTreeSet<String>) -> Result<Resolution, ResolverError> {
        let (building, problems) = self.closure(seed);

        let depmap: BTreeMap<String, BTreeSet<String>> = building
            .iter()
            .filter_map(|name| {
                self.edges.get(name.as_str()).map(|deps| {
                    let dirs = deps.iter().map(|d| d.pkgdir().to_string()).collect();
                    (name.clone(), dirs)
                })
            })
            .collect();

        let order = topological_sort(&depmap)?
            .into_iter()
            .filter(|name| building.contains(name))
            .collect();

        Ok(Resolution {
            building,
            order,
            problems,
            depmap,
        })
    }

    /// Smallest superset of `seed` closed under managed, unresolved dependencies
    fn closure(
        &self,
        seed: &BTreeSet<String>,
    ) -> (BTreeSet<String>, BTreeMap<String, Vec<String>>) {
        let mut building = seed.clone();
        let mut problems: BTreeMap<String, Vec<String>> = BTreeMap::new();
        let mut queue: VecDeque<String> = seed.iter().cloned().collect();

        while let Some(name) = queue.pop_front() {
            let Some(deps) = self.edges.get(name.as_str()) else {
                continue;
            };

            for dep in deps.iter() {
                if dep.resolve() {
                    continue;
                }

                if !dep.managed() {
                    tracing::debug!(package = %name, dependency = dep.pkgname(), "unmanaged dependency");
                    let entry = problems.entry(name.clone()).or_default();
                    if !entry.iter().any(|n| n == dep.pkgname()) {
                        entry.push(dep.pkgname().to_string());
                    }
                    continue;
                }

                if building.insert(dep.pkgdir().to_string()) {
                    tracing::debug!(package = %name, dependency = dep.pkgdir(), "adding dependency to build");
                    queue.push_back(dep.pkgdir().to_string());
                }
            }
        }

        (building, problems)
    }
}

/// Compute topological sort (build order)
///
/// Returns every node of `depmap` (keys and values) such that dependencies
/// come before dependents. Independent nodes are emitted in lexical order.
pub fn topological_sort(
    depmap: &BTreeMap<String, BTreeSet<String>>,
) -> Result<Vec<String>, ResolverError> {
    let mut indegree: BTreeMap<&str, usize> = BTreeMap::new();
    let mut dependents: BTreeMap<&str, Vec<&str>> = BTreeMap::new();

    for (node, deps) in depmap {
        *indegree.entry(node.as_str()).or_default() += deps.len();
        for dep in deps {
            indegree.entry(dep.as_str()).or_default();
            dependents.entry(dep.as_str()).or_default().push(node.as_str());
        }
    }

    let mut ready: BTreeSet<&str> = indegree
        .iter()
        .filter(|(_, count)| **count == 0)
        .map(|(node, _)| *node)
        .collect();
    let mut result = Vec::with_capacity(indegree.len());

    while let Some(node) = ready.pop_first() {
        result.push(node.to_string());
        for &dependent in dependents.get(node).into_iter().flatten() {
            if let Some(count) = indegree.get_mut(dependent) {
                *count -= 1;
                if *count == 0 {
                    ready.insert(dependent);
                }
            }
        }
        indegree.remove(node);
    }

    if indegree.is_empty() {
        Ok(result)
    } else {
        Err(ResolverError::CircularDependency {
            cycle: find_cycle(depmap, &indegree),
        })
    }
}

/// Walk the nodes left over by Kahn's algorithm until one repeats
///
/// Every leftover node still waits on a leftover dependency, so the walk
/// always closes a cycle.
fn find_cycle(
    depmap: &BTreeMap<String, BTreeSet<String>>,
    remaining: &BTreeMap<&str, usize>,
) -> Vec<String> {
    let mut path: Vec<&str> = Vec::new();
    let Some(mut node) = remaining.keys().next().copied() else {
        return Vec::new();
    };

    loop {
        if let Some(start) = path.iter().position(|&n| n == node) {
            let mut cycle: Vec<String> = path[start..].iter().map(ToString::to_string).collect();
            cycle.push(node.to_string());
            return cycle;
        }
        path.push(node);

        let next = depmap
            .get(node)
            .and_then(|deps| deps.iter().find(|d| remaining.contains_key(d.as_str())));
        match next {
            Some(dep) => node = dep.as_str(),
            None => return path.iter().map(ToString::to_string).collect(),
        }
    }
}
