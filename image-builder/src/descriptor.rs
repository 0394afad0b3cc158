//! Typed container build/run descriptor.
//!
//! An [`ImageDescriptor`] holds every static parameter needed to package the
//! service: the build and runtime base images, the working directory, the
//! dependency manifest, the files that enter the build, the exposed port,
//! environment variables and the process entry point. Secrets are declared
//! by name only and are never written into the image.

use crate::{ImageBuilderError, ImageBuilderResult};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::OnceLock;
use std::time::Duration;

/// Name of the service binary inside the image
pub const BINARY_NAME: &str = "college-api";
/// Port the service listens on inside the container
pub const DEFAULT_PORT: u16 = 8000;
/// Address the service binds to inside the container
pub const BIND_ALL_HOST: &str = "0.0.0.0";
/// Environment variable carrying the token signing key
pub const SECRET_KEY_ENV: &str = "JWT_SECRET_KEY";
/// Environment variable carrying the admin password
pub const ADMIN_PASSWORD_ENV: &str = "ADMIN_PASSWORD";

const SECRET_MARKERS: [&str; 4] = ["SECRET", "KEY", "PASSWORD", "TOKEN"];

/// An environment variable declared by the image
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum EnvVar {
    /// Value baked into the image
    Static { name: String, value: String },
    /// Value that must be injected when the container starts
    Secret { name: String },
}

impl EnvVar {
    pub fn fixed(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self::Static {
            name: name.into(),
            value: value.into(),
        }
    }

    pub fn secret(name: impl Into<String>) -> Self {
        Self::Secret { name: name.into() }
    }

    pub fn name(&self) -> &str {
        match self {
            EnvVar::Static { name, .. } | EnvVar::Secret { name } => name,
        }
    }

    pub fn is_secret(&self) -> bool {
        matches!(self, EnvVar::Secret { .. })
    }
}

/// Process started when a container runs
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Entrypoint {
    /// Executable name, resolved through `PATH`
    pub program: String,
    /// Ordered arguments
    pub args: Vec<String>,
}

impl Entrypoint {
    /// `<program> serve --host <host> --port <port>`
    pub fn serve(program: impl Into<String>, host: impl Into<String>, port: u16) -> Self {
        Self {
            program: program.into(),
            args: vec![
                "serve".to_string(),
                "--host".to_string(),
                host.into(),
                "--port".to_string(),
                port.to_string(),
            ],
        }
    }

    /// Full argument vector, program first
    pub fn argv(&self) -> Vec<String> {
        std::iter::once(self.program.clone())
            .chain(self.args.iter().cloned())
            .collect()
    }

    fn flag_value(&self, flag: &str) -> Option<&str> {
        self.args
            .iter()
            .position(|arg| arg == flag)
            .and_then(|idx| self.args.get(idx + 1))
            .map(String::as_str)
    }

    /// The `--host` argument, if present
    pub fn host(&self) -> Option<&str> {
        self.flag_value("--host")
    }

    /// The `--port` argument, if present and numeric
    pub fn port(&self) -> Option<u16> {
        self.flag_value("--port").and_then(|p| p.parse().ok())
    }
}

/// Liveness probe baked into the image
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthCheck {
    /// HTTP path polled on the service
    pub path: String,
    /// Time between probes
    pub interval: Duration,
    /// Time a single probe may take
    pub timeout: Duration,
    /// Consecutive failures before the container is unhealthy
    pub retries: u32,
}

impl Default for HealthCheck {
    fn default() -> Self {
        Self {
            path: "/health".to_string(),
            interval: Duration::from_secs(30),
            timeout: Duration::from_secs(5),
            retries: 3,
        }
    }
}

/// Complete description of how the service image is built and launched
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageDescriptor {
    /// Image the service is compiled in
    pub builder_image: String,
    /// Base runtime image of the final stage
    pub base_image: String,
    /// Working directory in both stages
    pub workdir: String,
    /// Dependency manifest, relative to the build context
    pub manifest: String,
    /// Lockfile pinning the dependency set, relative to the build context
    pub lockfile: Option<String>,
    /// Paths copied into the build stage besides the manifest
    pub include: Vec<String>,
    /// Patterns kept out of the build context
    pub exclude: Vec<String>,
    /// Binary produced by the build and copied into the final stage
    pub binary: String,
    /// Documented listening port
    pub exposed_port: u16,
    /// Environment variables, in declaration order
    pub env: Vec<EnvVar>,
    /// Unprivileged user the process runs as
    pub user: Option<String>,
    /// Liveness probe
    pub health_check: Option<HealthCheck>,
    /// Process started by the container
    pub entrypoint: Entrypoint,
}

impl Default for ImageDescriptor {
    fn default() -> Self {
        Self {
            builder_image: "rust:1.85-slim-bookworm".to_string(),
            base_image: "debian:bookworm-slim".to_string(),
            workdir: "/app".to_string(),
            manifest: "Cargo.toml".to_string(),
            lockfile: Some("Cargo.lock".to_string()),
            include: vec![
                "model".to_string(),
                "image-builder".to_string(),
                "server".to_string(),
            ],
            exclude: vec![
                "target".to_string(),
                "**/target".to_string(),
                ".git".to_string(),
                ".env".to_string(),
                "*.pem".to_string(),
                "Dockerfile".to_string(),
                ".dockerignore".to_string(),
            ],
            binary: BINARY_NAME.to_string(),
            exposed_port: DEFAULT_PORT,
            env: vec![
                EnvVar::fixed("RUST_LOG", "info"),
                EnvVar::secret(SECRET_KEY_ENV),
                EnvVar::secret(ADMIN_PASSWORD_ENV),
            ],
            user: Some("nobody".to_string()),
            health_check: Some(HealthCheck::default()),
            entrypoint: Entrypoint::serve(BINARY_NAME, BIND_ALL_HOST, DEFAULT_PORT),
        }
    }
}

fn image_reference_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(
            r"^(?:[a-zA-Z0-9][a-zA-Z0-9.-]*(?::[0-9]+)?/)?[a-z0-9]+(?:[._-][a-z0-9]+)*(?:/[a-z0-9]+(?:[._-][a-z0-9]+)*)*(?::[A-Za-z0-9_][A-Za-z0-9_.-]{0,127})?(?:@sha256:[a-f0-9]{64})?$",
        )
        .expect("image reference pattern is valid")
    })
}

fn env_name_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").expect("env name pattern is valid")
    })
}

/// Whether `reference` is a well-formed `name[:tag][@digest]` image reference
pub fn is_valid_image_reference(reference: &str) -> bool {
    image_reference_pattern().is_match(reference)
}

/// Whether an environment variable name suggests it carries secret material
pub fn looks_secret(name: &str) -> bool {
    let upper = name.to_ascii_uppercase();
    SECRET_MARKERS.iter().any(|marker| upper.contains(marker))
}

fn check_relative(kind: &str, path: &str) -> ImageBuilderResult<()> {
    if path.trim().is_empty() {
        return Err(ImageBuilderError::InvalidConfig(format!(
            "{} path cannot be empty",
            kind
        )));
    }
    if path.starts_with('/') || path.split('/').any(|part| part == "..") {
        return Err(ImageBuilderError::InvalidConfig(format!(
            "{} path '{}' must stay inside the build context",
            kind, path
        )));
    }
    Ok(())
}

impl ImageDescriptor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_base_image(mut self, image: impl Into<String>) -> Self {
        self.base_image = image.into();
        self
    }

    pub fn with_builder_image(mut self, image: impl Into<String>) -> Self {
        self.builder_image = image.into();
        self
    }

    pub fn with_workdir(mut self, workdir: impl Into<String>) -> Self {
        self.workdir = workdir.into();
        self
    }

    pub fn with_manifest(mut self, manifest: impl Into<String>) -> Self {
        self.manifest = manifest.into();
        self
    }

    pub fn with_lockfile(mut self, lockfile: Option<String>) -> Self {
        self.lockfile = lockfile;
        self
    }

    pub fn with_include(mut self, include: Vec<String>) -> Self {
        self.include = include;
        self
    }

    /// Changes the exposed port and the entrypoint's `--port` together.
    pub fn with_port(mut self, port: u16) -> Self {
        self.exposed_port = port;
        self.entrypoint = Entrypoint::serve(
            self.entrypoint.program.clone(),
            self.entrypoint.host().unwrap_or(BIND_ALL_HOST).to_string(),
            port,
        );
        self
    }

    pub fn with_env(mut self, var: EnvVar) -> Self {
        self.env.push(var);
        self
    }

    pub fn with_health_check(mut self, health_check: Option<HealthCheck>) -> Self {
        self.health_check = health_check;
        self
    }

    /// Names of variables that must be supplied at container start
    pub fn secret_names(&self) -> Vec<&str> {
        self.env
            .iter()
            .filter(|var| var.is_secret())
            .map(EnvVar::name)
            .collect()
    }

    /// URL the health probe polls from inside the container
    pub fn health_url(&self) -> Option<String> {
        self.health_check
            .as_ref()
            .map(|check| format!("http://127.0.0.1:{}{}", self.exposed_port, check.path))
    }

    pub fn validate(&self) -> ImageBuilderResult<()> {
        for (kind, image) in [("Builder", &self.builder_image), ("Base", &self.base_image)] {
            if !is_valid_image_reference(image) {
                return Err(ImageBuilderError::InvalidConfig(format!(
                    "{} image '{}' is not a valid image reference",
                    kind, image
                )));
            }
        }

        if !self.workdir.starts_with('/') {
            return Err(ImageBuilderError::InvalidConfig(format!(
                "Working directory '{}' must be absolute",
                self.workdir
            )));
        }

        check_relative("Manifest", &self.manifest)?;
        if let Some(lockfile) = &self.lockfile {
            check_relative("Lockfile", lockfile)?;
        }
        for entry in &self.include {
            check_relative("Include", entry)?;
        }

        if self.binary.is_empty() {
            return Err(ImageBuilderError::InvalidConfig(
                "Binary name cannot be empty".to_string(),
            ));
        }

        if self.exposed_port == 0 {
            return Err(ImageBuilderError::InvalidConfig(
                "Exposed port must be greater than 0".to_string(),
            ));
        }

        let mut seen = HashSet::new();
        for var in &self.env {
            let name = var.name();
            if !env_name_pattern().is_match(name) {
                return Err(ImageBuilderError::InvalidConfig(format!(
                    "Invalid environment variable name '{}'",
                    name
                )));
            }
            if !seen.insert(name) {
                return Err(ImageBuilderError::InvalidConfig(format!(
                    "Environment variable '{}' declared twice",
                    name
                )));
            }
            if !var.is_secret() && looks_secret(name) {
                return Err(ImageBuilderError::InvalidConfig(format!(
                    "Environment variable '{}' looks like a secret and must be injected at runtime, not baked into the image",
                    name
                )));
            }
        }

        if self.entrypoint.program != self.binary {
            return Err(ImageBuilderError::InvalidConfig(format!(
                "Entrypoint '{}' does not run the built binary '{}'",
                self.entrypoint.program, self.binary
            )));
        }

        match self.entrypoint.port() {
            Some(port) if port == self.exposed_port => {}
            Some(port) => {
                return Err(ImageBuilderError::InvalidConfig(format!(
                    "Entrypoint listens on port {} but the image exposes {}",
                    port, self.exposed_port
                )));
            }
            None => {
                return Err(ImageBuilderError::InvalidConfig(
                    "Entrypoint must pass an explicit --port".to_string(),
                ));
            }
        }

        if self.entrypoint.host() != Some(BIND_ALL_HOST) {
            return Err(ImageBuilderError::InvalidConfig(format!(
                "Entrypoint must bind to {} inside the container",
                BIND_ALL_HOST
            )));
        }

        if let Some(check) = &self.health_check {
            if !check.path.starts_with('/') {
                return Err(ImageBuilderError::InvalidConfig(format!(
                    "Health check path '{}' must start with '/'",
                    check.path
                )));
            }
            if check.interval.is_zero() || check.timeout.is_zero() || check.retries == 0 {
                return Err(ImageBuilderError::InvalidConfig(
                    "Health check interval, timeout and retries must be greater than 0"
                        .to_string(),
                ));
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_descriptor_is_valid() {
        let descriptor = ImageDescriptor::default();
        assert!(descriptor.validate().is_ok());
        assert_eq!(descriptor.exposed_port, 8000);
        assert_eq!(descriptor.workdir, "/app");
        assert_eq!(descriptor.manifest, "Cargo.toml");
    }

    #[test]
    fn test_default_entrypoint() {
        let descriptor = ImageDescriptor::default();
        assert_eq!(
            descriptor.entrypoint.argv(),
            vec!["college-api", "serve", "--host", "0.0.0.0", "--port", "8000"]
        );
        assert_eq!(descriptor.entrypoint.port(), Some(descriptor.exposed_port));
    }

    #[test]
    fn test_secret_key_is_never_static() {
        let descriptor = ImageDescriptor::default();
        assert_eq!(
            descriptor.secret_names(),
            vec![SECRET_KEY_ENV, ADMIN_PASSWORD_ENV]
        );
        assert!(descriptor
            .env
            .iter()
            .all(|var| var.is_secret() || !looks_secret(var.name())));
    }

    #[test]
    fn test_baked_secret_is_rejected() {
        let descriptor = ImageDescriptor::default().with_env(EnvVar::fixed(
            "API_TOKEN",
            "your-super-secret-placeholder",
        ));
        let error = descriptor.validate().unwrap_err();
        assert!(error.to_string().contains("injected at runtime"));
    }

    #[test]
    fn test_duplicate_env_is_rejected() {
        let descriptor = ImageDescriptor::default().with_env(EnvVar::secret(SECRET_KEY_ENV));
        assert!(descriptor.validate().is_err());
    }

    #[test]
    fn test_invalid_env_name_is_rejected() {
        let descriptor = ImageDescriptor::default().with_env(EnvVar::fixed("1BAD", "x"));
        assert!(descriptor.validate().is_err());
    }

    #[test]
    fn test_with_port_moves_entrypoint_too() {
        let descriptor = ImageDescriptor::default().with_port(9090);
        assert_eq!(descriptor.exposed_port, 9090);
        assert_eq!(descriptor.entrypoint.port(), Some(9090));
        assert_eq!(descriptor.entrypoint.host(), Some("0.0.0.0"));
        assert!(descriptor.validate().is_ok());
    }

    #[test]
    fn test_port_mismatch_is_rejected() {
        let mut descriptor = ImageDescriptor::default();
        descriptor.exposed_port = 8080;
        let error = descriptor.validate().unwrap_err();
        assert!(error.to_string().contains("port 8000"));
    }

    #[test]
    fn test_loopback_bind_is_rejected() {
        let mut descriptor = ImageDescriptor::default();
        descriptor.entrypoint = Entrypoint::serve(BINARY_NAME, "127.0.0.1", DEFAULT_PORT);
        assert!(descriptor.validate().is_err());
    }

    #[test]
    fn test_image_references() {
        assert!(is_valid_image_reference("debian:bookworm-slim"));
        assert!(is_valid_image_reference("rust:1.85-slim-bookworm"));
        assert!(is_valid_image_reference("ghcr.io/acme/college-api:1.0.0"));
        assert!(is_valid_image_reference("localhost:5000/base"));
        assert!(!is_valid_image_reference(""));
        assert!(!is_valid_image_reference("Debian:latest"));
        assert!(!is_valid_image_reference("debian:"));
        assert!(!is_valid_image_reference("debian bookworm"));

        let descriptor = ImageDescriptor::default().with_base_image("not a tag");
        assert!(descriptor.validate().is_err());
    }

    #[test]
    fn test_paths_must_stay_in_context() {
        assert!(ImageDescriptor::default()
            .with_manifest("/etc/Cargo.toml")
            .validate()
            .is_err());
        assert!(ImageDescriptor::default()
            .with_include(vec!["../secrets".to_string()])
            .validate()
            .is_err());
        assert!(ImageDescriptor::default()
            .with_workdir("app")
            .validate()
            .is_err());
    }

    #[test]
    fn test_health_url() {
        let descriptor = ImageDescriptor::default();
        assert_eq!(
            descriptor.health_url().as_deref(),
            Some("http://127.0.0.1:8000/health")
        );
        assert_eq!(
            ImageDescriptor::default().with_health_check(None).health_url(),
            None
        );
    }

    #[test]
    fn test_looks_secret() {
        assert!(looks_secret("JWT_SECRET_KEY"));
        assert!(looks_secret("admin_password"));
        assert!(!looks_secret("RUST_LOG"));
    }
}
