use crate::health::{wait_until_healthy, HealthReport};
use image_builder::ImageDescriptor;
use std::process::{Command, Stdio};
use std::time::Duration;
use thiserror::Error;
use tracing::{info, warn};

/// Container runtime types supported
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ContainerRuntime {
    /// Podman container runtime
    Podman,
    /// Docker container runtime
    Docker,
    /// No container runtime available
    None,
}

impl ContainerRuntime {
    /// Get the command name for this runtime
    pub fn command(&self) -> &'static str {
        match self {
            ContainerRuntime::Podman => "podman",
            ContainerRuntime::Docker => "docker",
            ContainerRuntime::None => "",
        }
    }

    /// Check if this runtime is available
    pub fn is_available(&self) -> bool {
        matches!(self, ContainerRuntime::Podman | ContainerRuntime::Docker)
    }
}

/// Container operation errors
#[derive(Error, Debug)]
pub enum ContainerError {
    /// No container runtime is available
    #[error("No container runtime available. Please install Docker or Podman.")]
    NoRuntimeAvailable,

    /// Container image not found
    #[error("Container image '{image}' not found. {suggestion}")]
    ImageNotFound { image: String, suggestion: String },

    /// A runtime secret has no value
    #[error("Secret '{name}' has no value. Pass -e {name}=... or export it in the calling environment.")]
    MissingSecret { name: String },

    /// Malformed `NAME=VALUE` pair
    #[error("Invalid environment assignment '{0}', expected NAME=VALUE")]
    InvalidEnv(String),

    /// Container failed to start
    #[error("Failed to start container '{name}': {reason}")]
    ContainerStartFailed { name: String, reason: String },

    /// Health check failed
    #[error("Container health check failed: {reason}. Check if the service is properly configured.")]
    HealthCheckFailed { reason: String },

    /// Container cleanup failed
    #[error("Failed to cleanup container '{name}': {reason}")]
    CleanupFailed { name: String, reason: String },

    /// Command execution failed
    #[error("Command execution failed: {command}")]
    CommandFailed { command: String },

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type ContainerResult<T> = Result<T, ContainerError>;

/// How a container is started from the service image
#[derive(Debug, Clone)]
pub struct RunConfig {
    /// Image to run
    pub image: String,
    /// Container name for the instance
    pub container_name: String,
    /// Port mapping (host_port, container_port)
    pub port_mapping: (u16, u16),
    /// Explicit environment values; these win over the calling environment
    pub env_vars: Vec<(String, String)>,
    /// Variables that must have a value when the container starts
    pub secrets: Vec<String>,
    /// Additional container arguments
    pub additional_args: Vec<String>,
    /// How long to wait for the health endpoint
    pub health_timeout: Duration,
    /// Health endpoint path inside the container
    pub health_path: Option<String>,
}

impl RunConfig {
    /// Run settings derived from an image descriptor
    pub fn from_descriptor(descriptor: &ImageDescriptor, image: impl Into<String>) -> Self {
        Self {
            image: image.into(),
            container_name: descriptor.binary.clone(),
            port_mapping: (descriptor.exposed_port, descriptor.exposed_port),
            env_vars: Vec::new(),
            secrets: descriptor
                .secret_names()
                .into_iter()
                .map(str::to_string)
                .collect(),
            additional_args: Vec::new(),
            health_timeout: Duration::from_secs(30),
            health_path: descriptor.health_check.as_ref().map(|c| c.path.clone()),
        }
    }

    pub fn with_container_name(mut self, name: impl Into<String>) -> Self {
        self.container_name = name.into();
        self
    }

    pub fn with_host_port(mut self, port: u16) -> Self {
        self.port_mapping.0 = port;
        self
    }

    pub fn with_env(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        let (name, value) = (name.into(), value.into());
        match self.env_vars.iter_mut().find(|(key, _)| *key == name) {
            Some(existing) => existing.1 = value,
            None => self.env_vars.push((name, value)),
        }
        self
    }

    pub fn with_health_timeout(mut self, timeout: Duration) -> Self {
        self.health_timeout = timeout;
        self
    }

    /// URL of the health endpoint as seen from the host
    pub fn health_url(&self) -> Option<String> {
        self.health_path
            .as_ref()
            .map(|path| format!("http://127.0.0.1:{}{}", self.port_mapping.0, path))
    }

    /// Final environment for the container. Explicit values come first, then
    /// each secret not set explicitly is taken from `lookup`. A secret that is
    /// missing or empty is an error.
    pub fn resolve_env<F>(&self, lookup: F) -> ContainerResult<Vec<(String, String)>>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut env = self.env_vars.clone();

        for name in &self.secrets {
            let explicit = env.iter().find(|(key, _)| key == name);
            match explicit {
                Some((_, value)) if !value.is_empty() => {}
                Some(_) => {
                    return Err(ContainerError::MissingSecret { name: name.clone() });
                }
                None => match lookup(name) {
                    Some(value) if !value.is_empty() => env.push((name.clone(), value)),
                    _ => return Err(ContainerError::MissingSecret { name: name.clone() }),
                },
            }
        }

        Ok(env)
    }

    pub fn is_secret(&self, name: &str) -> bool {
        self.secrets.iter().any(|secret| secret == name)
    }

    /// Secret values from a resolved environment. They are handed to the
    /// runtime process through its environment, never through argv.
    pub fn secret_env<'a>(
        &'a self,
        env: &'a [(String, String)],
    ) -> impl Iterator<Item = (&'a str, &'a str)> + 'a {
        env.iter()
            .filter(|(key, _)| self.is_secret(key))
            .map(|(key, value)| (key.as_str(), value.as_str()))
    }

    /// Arguments for `<runtime> run`, without the executable itself. Secrets
    /// appear as a bare `-e NAME`, so the runtime reads the value from its
    /// own environment.
    pub fn run_args(&self, env: &[(String, String)]) -> Vec<String> {
        let mut args = vec![
            "run".to_string(),
            "-d".to_string(),
            "--rm".to_string(),
            "--name".to_string(),
            self.container_name.clone(),
            "-p".to_string(),
            format!("{}:{}", self.port_mapping.0, self.port_mapping.1),
        ];

        for (key, value) in env {
            args.push("-e".to_string());
            if self.is_secret(key) {
                args.push(key.clone());
            } else {
                args.push(format!("{}={}", key, value));
            }
        }

        args.extend(self.additional_args.iter().cloned());
        args.push(self.image.clone());
        args
    }
}

/// Parses a `NAME=VALUE` command-line assignment
pub fn parse_env_assignment(raw: &str) -> ContainerResult<(String, String)> {
    match raw.split_once('=') {
        Some((name, value)) if !name.is_empty() => Ok((name.to_string(), value.to_string())),
        _ => Err(ContainerError::InvalidEnv(raw.to_string())),
    }
}

/// Handle for a running container
#[derive(Debug)]
pub struct ContainerHandle {
    /// Container name
    pub name: String,
    /// Runtime used
    pub runtime: ContainerRuntime,
    /// Host port the service is reachable on
    pub port: u16,
    /// Whether the container needs cleanup
    pub needs_cleanup: bool,
}

impl ContainerHandle {
    /// Leaves the container running after the handle is dropped
    pub fn detach(mut self) -> String {
        self.needs_cleanup = false;
        std::mem::take(&mut self.name)
    }
}

impl Drop for ContainerHandle {
    fn drop(&mut self) {
        if self.needs_cleanup && self.runtime.is_available() {
            let _ = Command::new(self.runtime.command())
                .args(["rm", "-f", &self.name])
                .output();
        }
    }
}

fn runtime_responds(command: &str) -> bool {
    Command::new(command)
        .arg("--version")
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .is_ok_and(|status| status.success())
}

/// Detect available container runtime in order of preference
pub fn detect_runtime() -> ContainerRuntime {
    // Podman first: it runs rootless by default
    if runtime_responds("podman") {
        return ContainerRuntime::Podman;
    }

    if runtime_responds("docker") {
        return ContainerRuntime::Docker;
    }

    ContainerRuntime::None
}

/// Verify that a container image exists locally
pub fn verify_image_exists(runtime: &ContainerRuntime, image_name: &str) -> ContainerResult<bool> {
    if !runtime.is_available() {
        return Err(ContainerError::NoRuntimeAvailable);
    }

    let output = Command::new(runtime.command())
        .args(["image", "inspect", image_name])
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .output()
        .map_err(|_e| ContainerError::CommandFailed {
            command: format!("{} image inspect {}", runtime.command(), image_name),
        })?;

    Ok(output.status.success())
}

/// Starts a detached container. Secrets are resolved before the runtime is
/// invoked, so a missing secret never produces a half-configured container.
pub fn start_container(
    runtime: &ContainerRuntime,
    config: &RunConfig,
) -> ContainerResult<ContainerHandle> {
    if !runtime.is_available() {
        return Err(ContainerError::NoRuntimeAvailable);
    }

    let env = config.resolve_env(|name| std::env::var(name).ok())?;

    if !verify_image_exists(runtime, &config.image)? {
        return Err(ContainerError::ImageNotFound {
            image: config.image.clone(),
            suggestion: "Build it first with `college-api build`.".to_string(),
        });
    }

    // Remove any leftover container with the same name
    let _ = Command::new(runtime.command())
        .args(["rm", "-f", &config.container_name])
        .output();

    info!(
        runtime = runtime.command(),
        container = %config.container_name,
        image = %config.image,
        host_port = config.port_mapping.0,
        "starting container"
    );

    let output = Command::new(runtime.command())
        .args(config.run_args(&env))
        .envs(config.secret_env(&env))
        .output()
        .map_err(|e| ContainerError::ContainerStartFailed {
            name: config.container_name.clone(),
            reason: e.to_string(),
        })?;

    if !output.status.success() {
        return Err(ContainerError::ContainerStartFailed {
            name: config.container_name.clone(),
            reason: String::from_utf8_lossy(&output.stderr).to_string(),
        });
    }

    Ok(ContainerHandle {
        name: config.container_name.clone(),
        runtime: runtime.clone(),
        port: config.port_mapping.0,
        needs_cleanup: true,
    })
}

/// Waits for the container's health endpoint. Without a health path the
/// container is assumed ready.
pub async fn health_check_container(
    handle: &ContainerHandle,
    config: &RunConfig,
) -> ContainerResult<Option<HealthReport>> {
    let Some(url) = config.health_url() else {
        warn!(container = %handle.name, "no health check declared");
        return Ok(None);
    };

    let report = wait_until_healthy(&url, config.health_timeout, Duration::from_secs(1))
        .await
        .map_err(|e| ContainerError::HealthCheckFailed {
            reason: e.to_string(),
        })?;

    info!(container = %handle.name, "container is healthy");
    Ok(Some(report))
}

/// Clean up container manually (called automatically by Drop trait)
pub fn cleanup_container(handle: &ContainerHandle) -> ContainerResult<()> {
    if !handle.runtime.is_available() {
        return Ok(());
    }

    let output = Command::new(handle.runtime.command())
        .args(["rm", "-f", &handle.name])
        .output()
        .map_err(|e| ContainerError::CleanupFailed {
            name: handle.name.clone(),
            reason: e.to_string(),
        })?;

    if !output.status.success() {
        return Err(ContainerError::CleanupFailed {
            name: handle.name.clone(),
            reason: String::from_utf8_lossy(&output.stderr).to_string(),
        });
    }

    info!(container = %handle.name, "container removed");
    Ok(())
}
