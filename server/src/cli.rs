use crate::config::{ConfigError, ConfigResult, ServerConfig};
use crate::health::DEFAULT_HEALTH_URL;
use clap::{Args, Parser, Subcommand};
use image_builder::{ADMIN_PASSWORD_ENV, DEFAULT_PORT, DEFAULT_TAG, SECRET_KEY_ENV};
use model::config::{generate_secret, DEFAULT_ADMIN_USERNAME};
use model::AuthConfig;
use std::net::{IpAddr, Ipv4Addr};
use std::path::PathBuf;
use std::time::Duration;
use tracing::warn;

#[derive(Parser, Debug)]
#[command(name = "college-api")]
#[command(about = "College management API server and container tooling")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the HTTP API
    Serve(ServeArgs),
    /// Print or write the Dockerfile and .dockerignore
    Dockerfile {
        /// Directory to write the files into (prints the Dockerfile when omitted)
        #[arg(short, long)]
        out: Option<PathBuf>,
        /// Port exposed by the image and passed to `serve`
        #[arg(long, default_value_t = DEFAULT_PORT)]
        port: u16,
    },
    /// Check that a build context can produce an image
    Check {
        /// Build context directory
        #[arg(short, long, default_value = ".")]
        context: PathBuf,
    },
    /// Build the container image
    Build {
        /// Build context directory
        #[arg(short, long, default_value = ".")]
        context: PathBuf,
        /// Image tag
        #[arg(short, long, default_value = DEFAULT_TAG)]
        tag: String,
        /// Container runtime executable (detected when omitted)
        #[arg(long)]
        runtime: Option<String>,
    },
    /// Start the image as a detached container and wait until it is healthy
    Run {
        /// Image to run
        #[arg(short, long, default_value = DEFAULT_TAG)]
        image: String,
        /// Container name
        #[arg(short, long, default_value = "college-api")]
        name: String,
        /// Host port mapped to the exposed port
        #[arg(long, default_value_t = DEFAULT_PORT)]
        host_port: u16,
        /// Environment for the container as NAME=VALUE; secrets not given
        /// here are read from the calling environment
        #[arg(short = 'e', long = "env")]
        env: Vec<String>,
        /// Seconds to wait for the health endpoint
        #[arg(long, default_value = "30")]
        wait_secs: u64,
    },
    /// Probe a running server's health endpoint
    Health {
        /// Health endpoint URL
        #[arg(long, default_value = DEFAULT_HEALTH_URL)]
        url: String,
        /// Request timeout in seconds
        #[arg(long, default_value = "5")]
        timeout_secs: u64,
    },
}

#[derive(Args, Debug, Clone)]
pub struct ServeArgs {
    /// Address to bind
    #[arg(long, default_value_t = IpAddr::V4(Ipv4Addr::UNSPECIFIED))]
    pub host: IpAddr,
    /// Port to listen on
    #[arg(short, long, default_value_t = DEFAULT_PORT)]
    pub port: u16,
    /// Token signing key
    #[arg(long, env = SECRET_KEY_ENV, hide_env_values = true)]
    pub secret_key: Option<String>,
    /// Token lifetime in minutes
    #[arg(long, env = "JWT_EXPIRE_MINUTES", default_value = "60")]
    pub token_ttl_minutes: u64,
    /// Username accepted by /token
    #[arg(long, env = "ADMIN_USERNAME", default_value = DEFAULT_ADMIN_USERNAME)]
    pub admin_username: String,
    /// Password accepted by /token
    #[arg(long, env = ADMIN_PASSWORD_ENV, hide_env_values = true)]
    pub admin_password: Option<String>,
    /// Generate a throwaway signing key when none is supplied (local use only)
    #[arg(long)]
    pub ephemeral_secret: bool,
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.is_empty())
}

impl ServeArgs {
    /// Resolves the server configuration. Command-line values win over the
    /// environment; secrets have no built-in fallback.
    pub fn into_config(self) -> ConfigResult<ServerConfig> {
        let secret_key = match (non_empty(self.secret_key), self.ephemeral_secret) {
            (Some(secret), _) => secret,
            (None, true) => {
                warn!("using an ephemeral signing key; tokens will not survive a restart");
                generate_secret()
            }
            (None, false) => {
                return Err(ConfigError::MissingSecret {
                    name: SECRET_KEY_ENV,
                })
            }
        };

        let admin_password =
            non_empty(self.admin_password).ok_or(ConfigError::MissingSecret {
                name: ADMIN_PASSWORD_ENV,
            })?;

        let auth = AuthConfig::new(secret_key, admin_password)
            .with_token_ttl(Duration::from_secs(self.token_ttl_minutes.saturating_mul(60)))
            .with_admin_username(self.admin_username);

        let config = ServerConfig::new(auth)
            .with_host(self.host)
            .with_port(self.port);
        config.validate()?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: &str = "0123456789abcdef0123456789abcdef";

    fn serve_args(extra: &[&str]) -> ServeArgs {
        let mut argv = vec!["college-api", "serve"];
        argv.extend_from_slice(extra);
        match Cli::try_parse_from(argv).unwrap().command {
            Commands::Serve(args) => args,
            other => panic!("expected serve, got {:?}", other),
        }
    }

    #[test]
    fn test_cli_definition() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }

    #[test]
    fn test_serve_defaults_match_image() {
        let args = serve_args(&["--secret-key", SECRET, "--admin-password", "pw"]);
        assert_eq!(args.port, 8000);
        assert_eq!(args.host.to_string(), "0.0.0.0");

        let config = args.into_config().unwrap();
        assert_eq!(config.socket_addr().to_string(), "0.0.0.0:8000");
        assert_eq!(config.auth.admin_username, "admin");
        assert_eq!(config.auth.token_ttl, Duration::from_secs(3600));
    }

    #[test]
    fn test_empty_secret_counts_as_missing() {
        let args = ServeArgs {
            secret_key: Some(String::new()),
            ..serve_args(&["--admin-password", "pw"])
        };
        assert!(matches!(
            args.into_config(),
            Err(ConfigError::MissingSecret {
                name: "JWT_SECRET_KEY"
            })
        ));
    }

    #[test]
    fn test_missing_password() {
        let args = ServeArgs {
            admin_password: None,
            ..serve_args(&["--secret-key", SECRET])
        };
        assert!(matches!(
            args.into_config(),
            Err(ConfigError::MissingSecret {
                name: "ADMIN_PASSWORD"
            })
        ));
    }

    #[test]
    fn test_ephemeral_secret() {
        let args = ServeArgs {
            secret_key: None,
            ..serve_args(&["--ephemeral-secret", "--admin-password", "pw"])
        };
        let config = args.into_config().unwrap();
        assert_eq!(config.auth.secret_key.len(), 64);
    }

    #[test]
    fn test_short_secret_is_invalid() {
        let args = serve_args(&["--secret-key", "short", "--admin-password", "pw"]);
        assert!(matches!(
            args.into_config(),
            Err(ConfigError::Invalid { .. })
        ));
    }

    #[test]
    fn test_run_env_flags() {
        let cli = Cli::try_parse_from([
            "college-api",
            "run",
            "-e",
            "JWT_SECRET_KEY=abc",
            "--env",
            "RUST_LOG=debug",
            "--host-port",
            "18000",
        ])
        .unwrap();
        match cli.command {
            Commands::Run {
                env, host_port, ..
            } => {
                assert_eq!(env, vec!["JWT_SECRET_KEY=abc", "RUST_LOG=debug"]);
                assert_eq!(host_port, 18000);
            }
            other => panic!("expected run, got {:?}", other),
        }
    }
}
