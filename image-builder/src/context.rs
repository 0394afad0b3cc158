//! Build context inspection.
//!
//! Checks, before any container runtime is involved, that the files the
//! descriptor copies exist and that the dependency manifest parses.

use crate::descriptor::ImageDescriptor;
use crate::{ImageBuilderError, ImageBuilderResult};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

/// The parts of a Cargo manifest that shape the image
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Manifest {
    /// Package name, when the manifest declares a package
    pub package: Option<String>,
    /// Workspace members, when the manifest declares a workspace
    pub members: Vec<String>,
    /// Registry dependencies; path dependencies are left out
    pub dependencies: BTreeSet<String>,
}

fn registry_dependencies(table: Option<&toml::Value>) -> impl Iterator<Item = String> + '_ {
    table
        .and_then(toml::Value::as_table)
        .into_iter()
        .flat_map(|deps| deps.iter())
        .filter(|(_, requirement)| requirement.get("path").is_none())
        .map(|(name, _)| name.clone())
}

impl Manifest {
    pub fn parse(text: &str) -> Result<Self, String> {
        let root: toml::Table = text.parse().map_err(|e: toml::de::Error| e.to_string())?;

        let package = root
            .get("package")
            .and_then(|p| p.get("name"))
            .and_then(toml::Value::as_str)
            .map(str::to_string);
        let workspace = root.get("workspace");

        if package.is_none() && workspace.is_none() {
            return Err("manifest declares neither [package] nor [workspace]".to_string());
        }

        let members = workspace
            .and_then(|w| w.get("members"))
            .and_then(toml::Value::as_array)
            .map(|members| {
                members
                    .iter()
                    .filter_map(toml::Value::as_str)
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default();

        let mut dependencies: BTreeSet<String> = registry_dependencies(root.get("dependencies"))
            .collect();
        dependencies.extend(registry_dependencies(
            workspace.and_then(|w| w.get("dependencies")),
        ));

        Ok(Self {
            package,
            members,
            dependencies,
        })
    }

    pub fn load(path: &Path) -> ImageBuilderResult<Self> {
        if !path.is_file() {
            return Err(ImageBuilderError::MissingManifest {
                path: path.to_path_buf(),
            });
        }
        let text = fs::read_to_string(path)?;
        Self::parse(&text).map_err(|reason| ImageBuilderError::InvalidManifest {
            path: path.to_path_buf(),
            reason,
        })
    }
}

/// What a successful inspection found
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContextReport {
    /// Root manifest
    pub manifest: Manifest,
    /// Registry dependencies of the root manifest and every workspace member
    pub dependencies: BTreeSet<String>,
    /// Files and directories matched by the include list
    pub included: Vec<PathBuf>,
}

/// Directory handed to the container runtime as the build context
#[derive(Debug, Clone)]
pub struct BuildContext {
    root: PathBuf,
}

impl BuildContext {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Validates the descriptor against this directory.
    ///
    /// Fails when the manifest or lockfile is missing, when any manifest is
    /// not valid TOML, when an include entry matches nothing, or when a
    /// workspace member would not be copied into the image.
    pub fn inspect(&self, descriptor: &ImageDescriptor) -> ImageBuilderResult<ContextReport> {
        descriptor.validate()?;

        let manifest = Manifest::load(&self.root.join(&descriptor.manifest))?;

        if let Some(lockfile) = &descriptor.lockfile {
            let path = self.root.join(lockfile);
            if !path.is_file() {
                return Err(ImageBuilderError::MissingLockfile { path });
            }
        }

        let mut dependencies = manifest.dependencies.clone();
        let mut member_dirs = Vec::new();
        for member in &manifest.members {
            member_dirs.extend(self.expand_member(member)?);
        }
        for dir in &member_dirs {
            let member_manifest = Manifest::load(&self.root.join(dir).join("Cargo.toml"))?;
            dependencies.extend(member_manifest.dependencies);
        }

        let mut included = Vec::new();
        for pattern in &descriptor.include {
            let matches = self.glob(pattern)?;
            if matches.is_empty() {
                return Err(ImageBuilderError::MissingInclude {
                    pattern: pattern.clone(),
                });
            }
            included.extend(matches);
        }

        let include_patterns = descriptor
            .include
            .iter()
            .map(|pattern| glob::Pattern::new(pattern))
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| ImageBuilderError::InvalidConfig(e.to_string()))?;
        for dir in &member_dirs {
            if !is_covered(dir, &include_patterns) {
                return Err(ImageBuilderError::MemberNotIncluded {
                    member: dir.display().to_string(),
                });
            }
        }

        debug!(
            root = %self.root.display(),
            dependencies = dependencies.len(),
            included = included.len(),
            "build context inspected"
        );

        Ok(ContextReport {
            manifest,
            dependencies,
            included,
        })
    }

    fn glob(&self, pattern: &str) -> ImageBuilderResult<Vec<PathBuf>> {
        let full = self.root.join(pattern);
        let full = full.to_str().ok_or_else(|| {
            ImageBuilderError::InvalidConfig(format!(
                "Build context path {} is not valid UTF-8",
                full.display()
            ))
        })?;
        Ok(glob::glob(full)
            .map_err(|e| ImageBuilderError::InvalidConfig(e.to_string()))?
            .filter_map(Result::ok)
            .collect())
    }

    /// Member directories, relative to the context root, named by a
    /// `workspace.members` entry. Literal entries are returned as-is so a
    /// missing member surfaces as a missing manifest.
    fn expand_member(&self, member: &str) -> ImageBuilderResult<Vec<PathBuf>> {
        if !has_glob_syntax(member) {
            return Ok(vec![PathBuf::from(member)]);
        }

        let mut dirs: Vec<PathBuf> = self
            .glob(member)?
            .into_iter()
            .filter(|path| path.is_dir())
            .map(|path| {
                path.strip_prefix(&self.root)
                    .map(Path::to_path_buf)
                    .unwrap_or(path)
            })
            .collect();
        dirs.sort();
        Ok(dirs)
    }
}

fn has_glob_syntax(pattern: &str) -> bool {
    pattern.contains(['*', '?', '['])
}

/// True when an include entry copies `dir` or one of its ancestors.
fn is_covered(dir: &Path, include: &[glob::Pattern]) -> bool {
    dir.ancestors()
        .filter(|ancestor| !ancestor.as_os_str().is_empty())
        .any(|ancestor| include.iter().any(|pattern| pattern.matches_path(ancestor)))
}
