use image_builder::DEFAULT_PORT;
use model::AuthConfig;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    /// A runtime secret was not supplied
    #[error("{name} is not set. Inject it when the container starts (e.g. `-e {name}=...`) or pass it on the command line")]
    MissingSecret { name: &'static str },

    #[error("Invalid configuration: {message}")]
    Invalid { message: String },
}

pub type ConfigResult<T> = Result<T, ConfigError>;

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: IpAddr,
    pub port: u16,
    pub auth: AuthConfig,
}

impl ServerConfig {
    pub fn new(auth: AuthConfig) -> Self {
        Self {
            host: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            port: DEFAULT_PORT,
            auth,
        }
    }

    pub fn with_host(mut self, host: IpAddr) -> Self {
        self.host = host;
        self
    }

    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    pub fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.host, self.port)
    }

    pub fn validate(&self) -> ConfigResult<()> {
        self.auth
            .validate()
            .map_err(|message| ConfigError::Invalid { message })
    }
}
