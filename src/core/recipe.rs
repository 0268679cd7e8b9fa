//! Package recipes
//!
//! A recipe tells the orchestrator who maintains a package, what it depends
//! on and how long it may build. Recipes live in `recipe.toml` inside each
//! package directory:
//!
//! ```toml
//! maintainers = ["Alice <alice@example.org>"]
//! time_limit_hours = 2.0
//! build = ["sh", "build.sh"]
//! depends = ["libbar", { name = "python-baz", directory = "baz" }]
//! ```

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use walkdir::WalkDir;

use crate::config::defaults::RECIPE_FILE;
use crate::core::config::hours_to_duration;
use crate::core::dependency::Dependency;
use crate::error::RecipeError;

/// Capability surface of a loaded recipe
pub trait Recipe: std::fmt::Debug + Send + Sync {
    /// Package key (directory name)
    fn name(&self) -> &str;

    /// Package directory
    fn directory(&self) -> &Path;

    /// Maintainer contacts, possibly empty
    fn maintainers(&self) -> &[String];

    /// Declared dependencies, in declaration order
    fn dependencies(&self) -> &[Dependency];

    /// Build time limit, if the recipe sets one
    fn time_limit(&self) -> Option<Duration>;

    /// Build command overriding the configured one
    fn build_command(&self) -> Option<&[String]>;
}

/// Recipes keyed by package name
pub type RecipeRegistry = BTreeMap<String, Box<dyn Recipe>>;

/// Result of loading every recipe of a repository
#[derive(Debug, Default)]
pub struct LoadedRecipes {
    /// Successfully loaded recipes
    pub recipes: RecipeRegistry,
    /// Packages whose recipe failed to load
    pub errors: BTreeMap<String, RecipeError>,
}

/// Discovers packages and loads their recipes
pub trait RecipeLoader {
    fn load(&self, repository: &Path) -> LoadedRecipes;
}

/// On-disk recipe format
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct RecipeFile {
    /// Maintainer contacts
    #[serde(default)]
    pub maintainers: Vec<String>,

    /// Build time limit in hours
    #[serde(default)]
    pub time_limit_hours: Option<f64>,

    /// Build command override
    #[serde(default)]
    pub build: Option<Vec<String>>,

    /// Dependencies
    #[serde(default)]
    pub depends: Vec<DependSpec>,
}

/// A dependency as written in a recipe
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum DependSpec {
    /// Package whose directory has the same name
    Name(String),
    /// Package living in another directory (e.g. a split package)
    Detailed {
        name: String,
        #[serde(default)]
        directory: Option<String>,
    },
}

impl DependSpec {
    /// Target package name
    pub fn name(&self) -> &str {
        match self {
            Self::Name(name) | Self::Detailed { name, .. } => name,
        }
    }

    /// Directory the target lives in
    pub fn directory(&self) -> &str {
        match self {
            Self::Name(name) => name,
            Self::Detailed { name, directory } => directory.as_deref().unwrap_or(name),
        }
    }
}

impl RecipeFile {
    /// Parse from TOML string
    pub fn from_toml(content: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(content)
    }
}

/// Recipe loaded from a `recipe.toml`
#[derive(Debug, Clone)]
pub struct PackageRecipe {
    name: String,
    directory: PathBuf,
    maintainers: Vec<String>,
    dependencies: Vec<Dependency>,
    time_limit: Option<Duration>,
    build_command: Option<Vec<String>>,
}

impl PackageRecipe {
    /// Build a recipe from its parsed file
    pub fn from_file(
        repository: &Path,
        name: &str,
        file: RecipeFile,
        artifact_suffixes: &Arc<[String]>,
    ) -> Result<Self, RecipeError> {
        let time_limit = file
            .time_limit_hours
            .map(|hours| {
                hours_to_duration(hours).ok_or_else(|| RecipeError::Invalid {
                    package: name.to_string(),
                    message: format!("time_limit_hours must be a positive number of hours, got {hours}"),
                })
            })
            .transpose()?;
        if file.build.as_ref().is_some_and(Vec::is_empty) {
            return Err(RecipeError::Invalid {
                package: name.to_string(),
                message: "build command is empty".to_string(),
            });
        }

        let dependencies = file
            .depends
            .iter()
            .map(|spec| {
                Dependency::new(
                    repository,
                    spec.directory(),
                    spec.name(),
                    Arc::clone(artifact_suffixes),
                )
            })
            .collect();

        Ok(Self {
            name: name.to_string(),
            directory: repository.join(name),
            maintainers: file.maintainers,
            dependencies,
            time_limit,
            build_command: file.build,
        })
    }
}

impl Recipe for PackageRecipe {
    fn name(&self) -> &str {
        &self.name
    }

    fn directory(&self) -> &Path {
        &self.directory
    }

    fn maintainers(&self) -> &[String] {
        &self.maintainers
    }

    fn dependencies(&self) -> &[Dependency] {
        &self.dependencies
    }

    fn time_limit(&self) -> Option<Duration> {
        self.time_limit
    }

    fn build_command(&self) -> Option<&[String]> {
        self.build_command.as_deref()
    }
}

/// Loads every `recipe.toml` found one level below the repository root
#[derive(Debug, Clone)]
pub struct TomlRecipeLoader {
    artifact_suffixes: Arc<[String]>,
}

impl TomlRecipeLoader {
    /// Create a loader recognizing artifacts by `artifact_suffixes`
    pub fn new(artifact_suffixes: Vec<String>) -> Self {
        Self {
            artifact_suffixes: artifact_suffixes.into(),
        }
    }

    fn load_one(&self, repository: &Path, name: &str) -> Result<PackageRecipe, RecipeError> {
        let path = repository.join(name).join(RECIPE_FILE);
        let content = std::fs::read_to_string(&path).map_err(|e| RecipeError::ReadError {
            path: path.clone(),
            error: e.to_string(),
        })?;
        let file = RecipeFile::from_toml(&content).map_err(|e| RecipeError::ParseError {
            path: path.clone(),
            error: e.to_string(),
        })?;
        PackageRecipe::from_file(repository, name, file, &self.artifact_suffixes)
    }
}

impl RecipeLoader for TomlRecipeLoader {
    fn load(&self, repository: &Path) -> LoadedRecipes {
        let mut loaded = LoadedRecipes::default();

        let entries = WalkDir::new(repository)
            .min_depth(1)
            .max_depth(1)
            .sort_by_file_name()
            .into_iter()
            .filter_map(Result::ok)
            .filter(|entry| entry.file_type().is_dir())
            .filter(|entry| entry.path().join(RECIPE_FILE).is_file());

        for entry in entries {
            let Some(name) = entry.file_name().to_str().map(str::to_string) else {
                tracing::warn!(path = %entry.path().display(), "skipping non-UTF-8 package directory");
                continue;
            };

            match self.load_one(repository, &name) {
                Ok(recipe) => {
                    loaded.recipes.insert(name, Box::new(recipe));
                }
                Err(e) => {
                    tracing::warn!(package = %name, error = %e, "failed to load recipe");
                    loaded.errors.insert(name, e);
                }
            }
        }

        tracing::info!(
            loaded = loaded.recipes.len(),
            failed = loaded.errors.len(),
            "recipes loaded"
        );
        loaded
    }
}
