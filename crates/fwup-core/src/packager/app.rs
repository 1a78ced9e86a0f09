//! Application descriptors (`app_package.toml`).
//!
//! ```toml
//! [package]
//! name = "app_a"
//! directory = "micropython"   # relative to this file, default "."
//! globs = ["*.py"]            # default ["*.py"]
//! ```

use std::path::{Path, PathBuf};

use fwup_schema::EMBEDDED_MANIFEST_NAME;
use glob::{MatchOptions, Pattern};
use serde::Deserialize;
use thiserror::Error;
use walkdir::WalkDir;

/// File that declares an app inside the repository.
pub const DESCRIPTOR_NAME: &str = "app_package.toml";

/// Errors raised while discovering apps or collecting their files.
#[derive(Error, Debug)]
pub enum AppError {
    /// Filesystem error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// A directory could not be traversed.
    #[error("failed to walk {path}: {source}")]
    Walk {
        /// Directory being walked.
        path: PathBuf,
        /// Underlying error.
        source: walkdir::Error,
    },

    /// A descriptor is not valid TOML or has unknown keys.
    #[error("invalid descriptor {path}: {source}")]
    Descriptor {
        /// Offending descriptor.
        path: PathBuf,
        /// Underlying error.
        source: toml::de::Error,
    },

    /// A file pattern does not parse.
    #[error("invalid glob '{pattern}' in app {app}: {source}")]
    Pattern {
        /// App declaring the pattern.
        app: String,
        /// The pattern as written.
        pattern: String,
        /// Underlying error.
        source: glob::PatternError,
    },

    /// Two descriptors use the same app name.
    #[error("app name '{name}' is declared by both {first} and {second}")]
    Duplicate {
        /// The shared name.
        name: String,
        /// Descriptor found first.
        first: PathBuf,
        /// Descriptor found second.
        second: PathBuf,
    },

    /// The app directory resolves outside the repository.
    #[error("app directory {0} escapes the repository")]
    Escapes(PathBuf),
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct Descriptor {
    package: PackageSection,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct PackageSection {
    name: String,
    #[serde(default = "default_directory")]
    directory: PathBuf,
    #[serde(default = "default_globs")]
    globs: Vec<String>,
}

fn default_directory() -> PathBuf {
    PathBuf::from(".")
}

fn default_globs() -> Vec<String> {
    vec!["*.py".to_string()]
}

/// One packaged application.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppSpec {
    /// Unique app name; also the app's directory in the output tree.
    pub name: String,
    /// Source directory, relative to the repository root.
    pub directory: PathBuf,
    /// Patterns matched against paths relative to `directory`.
    pub globs: Vec<String>,
    /// Descriptor that declared the app, relative to the repository root.
    pub descriptor: PathBuf,
}

const MATCH: MatchOptions = MatchOptions {
    case_sensitive: true,
    require_literal_separator: false,
    require_literal_leading_dot: false,
};

impl AppSpec {
    /// An app packaging `*.py` under `directory`.
    pub fn new(name: impl Into<String>, directory: impl Into<PathBuf>) -> Self {
        let directory = directory.into();
        Self {
            name: name.into(),
            descriptor: directory.join(DESCRIPTOR_NAME),
            directory,
            globs: default_globs(),
        }
    }

    /// Replace the file patterns.
    pub fn with_globs(mut self, globs: Vec<String>) -> Self {
        self.globs = globs;
        self
    }

    /// Parse one descriptor found at `repo/relative`.
    pub fn load(repo: &Path, relative: &Path) -> Result<Self, AppError> {
        let path = repo.join(relative);
        let content = std::fs::read_to_string(&path)?;
        let descriptor: Descriptor =
            toml::from_str(&content).map_err(|source| AppError::Descriptor {
                path: path.clone(),
                source,
            })?;

        let base = relative.parent().unwrap_or_else(|| Path::new(""));
        let directory = normalize(&base.join(&descriptor.package.directory))
            .ok_or_else(|| AppError::Escapes(descriptor.package.directory.clone()))?;

        Ok(Self {
            name: descriptor.package.name,
            directory,
            globs: descriptor.package.globs,
            descriptor: relative.to_path_buf(),
        })
    }

    fn patterns(&self) -> Result<Vec<Pattern>, AppError> {
        self.globs
            .iter()
            .map(|g| {
                Pattern::new(g).map_err(|source| AppError::Pattern {
                    app: self.name.clone(),
                    pattern: g.clone(),
                    source,
                })
            })
            .collect()
    }

    /// Files of this app inside the revision tree `tree`, relative to the
    /// app directory with `/` separators, sorted.
    ///
    /// `None` when the app directory does not exist in that revision.
    pub fn collect_files(&self, tree: &Path) -> Result<Option<Vec<String>>, AppError> {
        let root = tree.join(&self.directory);
        if !root.is_dir() {
            return Ok(None);
        }
        let patterns = self.patterns()?;

        let mut files = Vec::new();
        let walker = WalkDir::new(&root)
            .follow_links(false)
            .into_iter()
            .filter_entry(|e| e.depth() == 0 || !is_hidden(e.file_name()));
        for entry in walker {
            let entry = entry.map_err(|source| AppError::Walk {
                path: root.clone(),
                source,
            })?;
            if !entry.file_type().is_file() {
                continue;
            }
            let Ok(relative) = entry.path().strip_prefix(&root) else {
                continue;
            };
            let relative = to_slash(relative);
            if relative == DESCRIPTOR_NAME || relative == EMBEDDED_MANIFEST_NAME {
                continue;
            }
            if patterns.iter().any(|p| p.matches_with(&relative, MATCH)) {
                files.push(relative);
            }
        }
        files.sort();
        Ok(Some(files))
    }
}

fn is_hidden(name: &std::ffi::OsStr) -> bool {
    name.to_string_lossy().starts_with('.')
}

fn to_slash(path: &Path) -> String {
    path.components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}

/// Resolve `.` and `..` lexically; `None` if the path climbs above its start.
fn normalize(path: &Path) -> Option<PathBuf> {
    use std::path::Component;
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                if !out.pop() {
                    return None;
                }
            }
            Component::Normal(part) => out.push(part),
            Component::RootDir | Component::Prefix(_) => return None,
        }
    }
    Some(out)
}

/// Find every `app_package.toml` under `repo`, skipping hidden directories
/// and `exclude` (typically the output directory).
pub fn discover(repo: &Path, exclude: &[PathBuf]) -> Result<Vec<AppSpec>, AppError> {
    let mut apps: Vec<AppSpec> = Vec::new();
    let walker = WalkDir::new(repo)
        .follow_links(false)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|e| {
            e.depth() == 0
                || !(is_hidden(e.file_name()) || exclude.iter().any(|x| e.path() == x))
        });

    for entry in walker {
        let entry = entry.map_err(|source| AppError::Walk {
            path: repo.to_path_buf(),
            source,
        })?;
        if !entry.file_type().is_file() || entry.file_name() != DESCRIPTOR_NAME {
            continue;
        }
        let Ok(relative) = entry.path().strip_prefix(repo) else {
            continue;
        };
        let app = AppSpec::load(repo, relative)?;
        if let Some(existing) = apps.iter().find(|a| a.name == app.name) {
            return Err(AppError::Duplicate {
                name: app.name,
                first: existing.descriptor.clone(),
                second: app.descriptor,
            });
        }
        tracing::debug!(app = %app.name, directory = %app.directory.display(), "discovered app");
        apps.push(app);
    }
    Ok(apps)
}
