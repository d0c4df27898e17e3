use std::env;
use std::net::{Ipv4Addr, SocketAddr};
use thiserror::Error;

pub const DEFAULT_PORT: u16 = 8080;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("PORT must be a number between 0 and 65535, got {0:?}")]
    InvalidPort(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub port: u16,
}

impl Default for Config {
    fn default() -> Self {
        Self { port: DEFAULT_PORT }
    }
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_port(env::var("PORT").ok())
    }

    fn from_port(port: Option<String>) -> Result<Self, ConfigError> {
        match port.as_deref().map(str::trim) {
            None | Some("") => Ok(Self::default()),
            Some(raw) => raw
                .parse()
                .map(|port| Self { port })
                .map_err(|_| ConfigError::InvalidPort(raw.to_string())),
        }
    }

    // All interfaces, so the relay is reachable from other hosts and containers.
    pub fn bind_addr(&self) -> SocketAddr {
        SocketAddr::from((Ipv4Addr::UNSPECIFIED, self.port))
    }
}
