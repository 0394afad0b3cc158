//! Image builds through an OCI container runtime.
//!
//! [`ImageBuilder`] inspects the build context, writes the rendered
//! `Dockerfile` and `.dockerignore` into it, and runs
//! `<runtime> build -t <tag> -f Dockerfile <context>`. A failed build is
//! reported once and never retried.

use crate::context::{BuildContext, ContextReport};
use crate::descriptor::{ImageDescriptor, BINARY_NAME};
use crate::dockerfile::{render_dockerfile, render_dockerignore, DOCKERFILE_NAME, DOCKERIGNORE_NAME};
use crate::{ImageBuilderError, ImageBuilderResult};
use std::collections::BTreeSet;
use std::fs;
use std::path::PathBuf;
use std::process::Command;
use std::time::{Duration, Instant};
use tracing::{error, info};

pub const DEFAULT_TAG: &str = "college-api:latest";

/// Files written into the build context
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DescriptorFiles {
    pub dockerfile: PathBuf,
    pub dockerignore: PathBuf,
}

/// Output from a successful build
#[derive(Debug, Clone)]
pub struct BuildOutput {
    /// Tag the image was built under
    pub image: String,
    /// Registry dependencies compiled into the image
    pub dependencies: BTreeSet<String>,
    /// Wall-clock build time
    pub duration: Duration,
}

pub struct ImageBuilder {
    context: BuildContext,
    descriptor: ImageDescriptor,
    runtime: String,
    tag: String,
}

impl ImageBuilder {
    pub fn new(context: impl Into<PathBuf>, descriptor: ImageDescriptor) -> Self {
        Self {
            context: BuildContext::new(context),
            descriptor,
            runtime: "docker".to_string(),
            tag: DEFAULT_TAG.to_string(),
        }
    }

    /// Set the container runtime executable
    pub fn with_runtime(mut self, runtime: impl Into<String>) -> Self {
        self.runtime = runtime.into();
        self
    }

    /// Set the image tag
    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.tag = tag.into();
        self
    }

    pub fn descriptor(&self) -> &ImageDescriptor {
        &self.descriptor
    }

    pub fn tag(&self) -> &str {
        &self.tag
    }

    pub fn inspect(&self) -> ImageBuilderResult<ContextReport> {
        self.context.inspect(&self.descriptor)
    }

    /// Writes `Dockerfile` and `.dockerignore` into the build context.
    pub fn write_descriptor_files(&self) -> ImageBuilderResult<DescriptorFiles> {
        let files = DescriptorFiles {
            dockerfile: self.context.root().join(DOCKERFILE_NAME),
            dockerignore: self.context.root().join(DOCKERIGNORE_NAME),
        };
        fs::write(&files.dockerfile, render_dockerfile(&self.descriptor)?)?;
        fs::write(&files.dockerignore, render_dockerignore(&self.descriptor))?;
        Ok(files)
    }

    /// Arguments passed to the runtime, without the executable itself
    pub fn build_args(&self) -> Vec<String> {
        vec![
            "build".to_string(),
            "-t".to_string(),
            self.tag.clone(),
            "-f".to_string(),
            self.context
                .root()
                .join(DOCKERFILE_NAME)
                .display()
                .to_string(),
            self.context.root().display().to_string(),
        ]
    }

    pub fn build(&self) -> ImageBuilderResult<BuildOutput> {
        let report = self.inspect()?;
        self.write_descriptor_files()?;

        info!(
            runtime = %self.runtime,
            tag = %self.tag,
            binary = BINARY_NAME,
            "building image"
        );
        let started = Instant::now();

        let output = Command::new(&self.runtime)
            .args(self.build_args())
            .output()
            .map_err(|e| {
                ImageBuilderError::BuildFailed(format!("could not run {}: {}", self.runtime, e))
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
            error!(tag = %self.tag, status = %output.status, "image build failed");
            return Err(ImageBuilderError::BuildFailed(if stderr.is_empty() {
                format!("{} build exited with {}", self.runtime, output.status)
            } else {
                stderr
            }));
        }

        let duration = started.elapsed();
        info!(tag = %self.tag, elapsed_ms = duration.as_millis() as u64, "image built");

        Ok(BuildOutput {
            image: self.tag.clone(),
            dependencies: report.dependencies,
            duration,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn prepared_context() -> TempDir {
        let dir = TempDir::new().unwrap();
        fs::write(
            dir.path().join("Cargo.toml"),
            "[package]\nname = \"college-api\"\nversion = \"0.1.0\"\n\n[dependencies]\nserde = \"1\"\n",
        )
        .unwrap();
        fs::write(dir.path().join("Cargo.lock"), "version = 3\n").unwrap();
        fs::create_dir(dir.path().join("src")).unwrap();
        dir
    }

    fn descriptor() -> ImageDescriptor {
        ImageDescriptor::default().with_include(vec!["src".to_string()])
    }

    #[test]
    fn test_builder_defaults() {
        let builder = ImageBuilder::new("/tmp/ctx", ImageDescriptor::default());
        assert_eq!(builder.runtime, "docker");
        assert_eq!(builder.tag(), "college-api:latest");
    }

    #[test]
    fn test_build_args() {
        let builder = ImageBuilder::new("/tmp/ctx", ImageDescriptor::default())
            .with_runtime("podman")
            .with_tag("registry.local/college-api:1.2.3");
        assert_eq!(builder.runtime, "podman");
        assert_eq!(
            builder.build_args(),
            vec![
                "build",
                "-t",
                "registry.local/college-api:1.2.3",
                "-f",
                "/tmp/ctx/Dockerfile",
                "/tmp/ctx"
            ]
        );
    }

    #[test]
    fn test_write_descriptor_files() {
        let dir = prepared_context();
        let builder = ImageBuilder::new(dir.path(), descriptor());
        let files = builder.write_descriptor_files().unwrap();

        let dockerfile = fs::read_to_string(&files.dockerfile).unwrap();
        assert!(dockerfile.contains("EXPOSE 8000"));
        let dockerignore = fs::read_to_string(&files.dockerignore).unwrap();
        assert!(dockerignore.contains("target\n"));
    }

    #[test]
    fn test_build_stops_before_runtime_on_bad_context() {
        let dir = TempDir::new().unwrap();
        let builder = ImageBuilder::new(dir.path(), descriptor()).with_runtime("true");
        assert!(matches!(
            builder.build(),
            Err(ImageBuilderError::MissingManifest { .. })
        ));
        assert!(!dir.path().join("Dockerfile").exists());
    }

    #[test]
    fn test_missing_runtime_fails_build() {
        let dir = prepared_context();
        let builder =
            ImageBuilder::new(dir.path(), descriptor()).with_runtime("definitely-not-a-runtime");
        assert!(matches!(
            builder.build(),
            Err(ImageBuilderError::BuildFailed(_))
        ));
    }

    #[cfg(unix)]
    #[test]
    fn test_failing_runtime_fails_build() {
        let dir = prepared_context();
        let builder = ImageBuilder::new(dir.path(), descriptor()).with_runtime("false");
        let error = builder.build().unwrap_err();
        assert!(error.to_string().contains("false build exited with"));
    }

    #[cfg(unix)]
    #[test]
    fn test_successful_build_reports_dependencies() {
        let dir = prepared_context();
        let builder = ImageBuilder::new(dir.path(), descriptor())
            .with_runtime("true")
            .with_tag("college-api:test");
        let output = builder.build().unwrap();
        assert_eq!(output.image, "college-api:test");
        assert!(output.dependencies.contains("serde"));
        assert!(dir.path().join("Dockerfile").exists());
    }
}
