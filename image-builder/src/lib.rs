//! Container image building utilities for the college API
//!
//! This crate describes how the service is packaged: a typed
//! [`ImageDescriptor`] is validated, rendered to a `Dockerfile` and
//! `.dockerignore`, checked against a build context and handed to a
//! container runtime.

pub mod builder;
pub mod context;
pub mod descriptor;
pub mod dockerfile;

use std::path::PathBuf;
use thiserror::Error;

pub use builder::{BuildOutput, DescriptorFiles, ImageBuilder, DEFAULT_TAG};
pub use context::{BuildContext, ContextReport, Manifest};
pub use descriptor::{
    is_valid_image_reference, looks_secret, Entrypoint, EnvVar, HealthCheck, ImageDescriptor,
    ADMIN_PASSWORD_ENV, BINARY_NAME, BIND_ALL_HOST, DEFAULT_PORT, SECRET_KEY_ENV,
};
pub use dockerfile::{render_dockerfile, render_dockerignore, DOCKERFILE_NAME, DOCKERIGNORE_NAME};

/// Errors related to image building
#[derive(Error, Debug)]
pub enum ImageBuilderError {
    #[error("Build failed: {0}")]
    BuildFailed(String),
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
    #[error("Dependency manifest not found: {}", path.display())]
    MissingManifest { path: PathBuf },
    #[error("Invalid dependency manifest {}: {reason}", path.display())]
    InvalidManifest { path: PathBuf, reason: String },
    #[error("Lockfile not found: {}", path.display())]
    MissingLockfile { path: PathBuf },
    #[error("Build context has nothing matching '{pattern}'")]
    MissingInclude { pattern: String },
    #[error("Workspace member '{member}' is not copied by any include entry")]
    MemberNotIncluded { member: String },
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type ImageBuilderResult<T> = Result<T, ImageBuilderError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let error = ImageBuilderError::MissingManifest {
            path: PathBuf::from("/ctx/Cargo.toml"),
        };
        assert_eq!(
            error.to_string(),
            "Dependency manifest not found: /ctx/Cargo.toml"
        );

        let error = ImageBuilderError::MissingInclude {
            pattern: "server".to_string(),
        };
        assert!(error.to_string().contains("'server'"));
    }
}
