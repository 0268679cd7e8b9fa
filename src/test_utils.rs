//! Test utilities for property-based testing
//!
//! This module provides generators and in-memory collaborators.

#[cfg(test)]
pub mod generators {
    use proptest::prelude::*;
    use std::collections::{BTreeMap, BTreeSet};

    use super::fakes::FakeDep;

    /// Generate a valid package name (lowercase alphanumeric with hyphens)
    pub fn package_name() -> impl Strategy<Value = String> {
        "[a-z][a-z0-9-]{0,30}[a-z0-9]?".prop_filter("Name must not be empty", |s| !s.is_empty())
    }

    /// Generate an acyclic repository and a seed set
    ///
    /// Package `pkg-i` only depends on packages `pkg-j` with `j < i`, or on
    /// unmanaged `ext-*` names that never collide with package names.
    pub fn acyclic_repository(
    ) -> impl Strategy<Value = (BTreeMap<String, Vec<FakeDep>>, BTreeSet<String>)> {
        (1usize..12).prop_flat_map(|count| {
            let edges = proptest::collection::vec(
                proptest::collection::vec((0..count, 0u8..4), 0..4),
                count,
            );
            let seed = proptest::collection::btree_set(0..count, 1..=count.min(4));
            (edges, seed).prop_map(move |(edges, seed)| {
                let mut repo = BTreeMap::new();
                for (i, deps) in edges.into_iter().enumerate() {
                    let deps = deps
                        .into_iter()
                        .filter_map(|(target, kind)| match kind {
                            0 if target < i => Some(FakeDep::managed(&format!("pkg-{target}"))),
                            1 if target < i => Some(FakeDep::resolved(&format!("pkg-{target}"))),
                            2 => Some(FakeDep::unmanaged(&format!("ext-{target}"))),
                            _ => None,
                        })
                        .collect();
                    repo.insert(format!("pkg-{i}"), deps);
                }
                let seed = seed.into_iter().map(|i| format!("pkg-{i}")).collect();
                (repo, seed)
            })
        })
    }
}

#[cfg(test)]
pub mod fakes {
    use std::collections::BTreeMap;
    use std::path::Path;
    use std::sync::Mutex;

    use tempfile::TempDir;
    use tokio_util::sync::CancellationToken;

    use crate::config::defaults::RECIPE_FILE;
    use crate::core::build::{BuildContext, BuildFailure, BuildStep};
    use crate::core::dependency::DependencyRef;
    use crate::core::recipe::{DependSpec, RecipeFile, RecipeLoader, RecipeRegistry, TomlRecipeLoader};
    use crate::core::report::{Report, Reporter};
    use crate::error::ReportError;

    /// Artifact suffix used by fake repositories
    pub const SUFFIX: &str = ".pkg.tar.zst";

    /// In-memory dependency
    #[derive(Debug, Clone, PartialEq, Eq)]
    pub struct FakeDep {
        pkgdir: String,
        pkgname: String,
        managed: bool,
        resolved: bool,
    }

    impl FakeDep {
        /// Repository package not built yet
        pub fn managed(dir: &str) -> Self {
            Self::managed_in(dir, dir)
        }

        /// Repository package `name` living in `dir`
        pub fn managed_in(dir: &str, name: &str) -> Self {
            Self {
                pkgdir: dir.to_string(),
                pkgname: name.to_string(),
                managed: true,
                resolved: false,
            }
        }

        /// Repository package with an artifact already present
        pub fn resolved(dir: &str) -> Self {
            Self {
                resolved: true,
                ..Self::managed(dir)
            }
        }

        /// Name the repository knows nothing about
        pub fn unmanaged(name: &str) -> Self {
            Self {
                pkgdir: name.to_string(),
                pkgname: name.to_string(),
                managed: false,
                resolved: false,
            }
        }
    }

    impl DependencyRef for FakeDep {
        fn pkgdir(&self) -> &str {
            &self.pkgdir
        }

        fn pkgname(&self) -> &str {
            &self.pkgname
        }

        fn resolve(&self) -> bool {
            self.resolved
        }

        fn managed(&self) -> bool {
            self.managed
        }
    }

    /// Recipe written into a [`FakeRepo`]
    #[derive(Debug, Clone)]
    pub struct FakeRecipe {
        name: String,
        file: RecipeFile,
    }

    impl FakeRecipe {
        pub fn new(name: &str) -> Self {
            Self {
                name: name.to_string(),
                file: RecipeFile::default(),
            }
        }

        #[must_use]
        pub fn maintained_by(mut self, contact: &str) -> Self {
            self.file.maintainers.push(contact.to_string());
            self
        }

        #[must_use]
        pub fn depends_on(mut self, dir: &str) -> Self {
            self.file.depends.push(DependSpec::Name(dir.to_string()));
            self
        }

        /// Depend on something that has no directory in the repository
        #[must_use]
        pub fn depends_on_external(self, name: &str) -> Self {
            self.depends_on(name)
        }

        #[must_use]
        pub fn time_limit(mut self, limit: std::time::Duration) -> Self {
            self.file.time_limit_hours = Some(limit.as_secs_f64() / 3600.0);
            self
        }
    }

    /// Package repository on disk, populated with fake recipes
    pub struct FakeRepo {
        dir: TempDir,
    }

    impl FakeRepo {
        pub fn new(recipes: Vec<FakeRecipe>) -> Self {
            let dir = TempDir::new().unwrap();
            for recipe in recipes {
                let package = dir.path().join(&recipe.name);
                std::fs::create_dir_all(&package).unwrap();
                std::fs::write(
                    package.join(RECIPE_FILE),
                    toml::to_string(&recipe.file).unwrap(),
                )
                .unwrap();
            }
            Self { dir }
        }

        pub fn path(&self) -> &Path {
            self.dir.path()
        }

        pub fn loader(&self) -> TomlRecipeLoader {
            TomlRecipeLoader::new(vec![SUFFIX.to_string()])
        }

        /// Load every recipe of the repository
        pub fn registry(&self) -> RecipeRegistry {
            self.loader().load(self.path()).recipes
        }

        /// Place a built artifact for `name`
        pub fn publish(&self, name: &str) {
            write_artifact(&self.path().join(name), name);
        }
    }

    fn write_artifact(dir: &Path, name: &str) {
        std::fs::write(dir.join(format!("{name}-1.0-1-any{SUFFIX}")), b"artifact").unwrap();
    }

    enum Script {
        Fail(String),
        Timeout,
    }

    /// Build step following a script
    ///
    /// Unlisted packages build successfully and leave an artifact behind, so
    /// later dependents see them as resolved.
    #[derive(Default)]
    pub struct ScriptedBuildStep {
        scripts: BTreeMap<String, Script>,
        cancel_after: Option<(String, CancellationToken)>,
        attempts: Mutex<Vec<String>>,
    }

    impl ScriptedBuildStep {
        pub fn new() -> Self {
            Self::default()
        }

        #[must_use]
        pub fn failing(mut self, name: &str, reason: &str) -> Self {
            self.scripts
                .insert(name.to_string(), Script::Fail(reason.to_string()));
            self
        }

        #[must_use]
        pub fn timing_out(mut self, name: &str) -> Self {
            self.scripts.insert(name.to_string(), Script::Timeout);
            self
        }

        /// Request cancellation while `name` builds
        #[must_use]
        pub fn cancelling_after(mut self, name: &str, token: CancellationToken) -> Self {
            self.cancel_after = Some((name.to_string(), token));
            self
        }

        /// Packages handed to the build step, in order
        pub fn attempts(&self) -> Vec<String> {
            self.attempts.lock().unwrap().clone()
        }
    }

    impl BuildStep for ScriptedBuildStep {
        async fn build(&self, ctx: &BuildContext<'_>) -> Result<(), BuildFailure> {
            let name = ctx.name();
            self.attempts.lock().unwrap().push(name.to_string());

            if let Some((target, token)) = &self.cancel_after {
                if target == name {
                    token.cancel();
                }
            }

            let missing: std::collections::BTreeSet<String> = ctx
                .dependencies
                .iter()
                .filter(|d| !d.resolve())
                .map(|d| d.pkgdir().to_string())
                .collect();
            if !missing.is_empty() {
                return Err(BuildFailure::MissingDependencies(missing));
            }

            match self.scripts.get(name) {
                Some(Script::Fail(reason)) => Err(BuildFailure::Failed(reason.clone())),
                Some(Script::Timeout) => Err(BuildFailure::Timeout(ctx.time_limit)),
                None => {
                    write_artifact(ctx.directory(), name);
                    Ok(())
                }
            }
        }
    }

    /// Reporter keeping every report in memory
    #[derive(Default)]
    pub struct RecordingReporter {
        reports: Mutex<Vec<Report>>,
    }

    impl RecordingReporter {
        pub fn reports(&self) -> Vec<Report> {
            self.reports.lock().unwrap().clone()
        }
    }

    impl Reporter for RecordingReporter {
        fn report(&self, report: &Report) -> Result<(), ReportError> {
            self.reports.lock().unwrap().push(report.clone());
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::generators::*;
    use crate::core::dependency::DependencyRef;
    use proptest::prelude::*;

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(100))]

        #[test]
        fn test_package_name_generator(name in package_name()) {
            prop_assert!(!name.is_empty());
            prop_assert!(name.chars().all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-'));
        }

        #[test]
        fn test_repository_generator_is_acyclic((repo, seed) in acyclic_repository()) {
            for name in &seed {
                prop_assert!(repo.contains_key(name));
            }
            for (name, deps) in &repo {
                let index: usize = name.trim_start_matches("pkg-").parse().unwrap();
                for dep in deps.iter().filter(|d| d.managed()) {
                    let target: usize = dep.pkgdir().trim_start_matches("pkg-").parse().unwrap();
                    prop_assert!(target < index);
                }
            }
        }
    }
}
