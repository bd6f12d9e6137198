//! HTTP listener configuration types

use std::net::{IpAddr, SocketAddr};

use crate::{get_env_or_default, parse_env, ConfigError, ConfigResult};

/// Listener configuration
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Interface to bind
    pub host: IpAddr,

    /// Port to bind (default: 8080)
    pub port: u16,

    /// CORS allowed origins (unset means "decide by environment")
    pub cors_allowed_origins: Option<Vec<String>>,
}

impl ServerConfig {
    /// Load listener configuration from environment variables
    pub fn from_env() -> ConfigResult<Self> {
        let host = get_env_or_default("HOST", "0.0.0.0");
        let host = host
            .parse()
            .map_err(|e| ConfigError::InvalidValue("HOST".to_string(), format!("{}", e)))?;

        Ok(Self {
            host,
            port: parse_env("PORT", 8080)?,
            cors_allowed_origins: std::env::var("CORS_ORIGINS")
                .ok()
                .map(|s| split_origins(&s)),
        })
    }

    /// Socket address to bind
    pub fn bind_addr(&self) -> SocketAddr {
        SocketAddr::new(self.host, self.port)
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: IpAddr::from([0, 0, 0, 0]),
            port: 8080,
            cors_allowed_origins: None,
        }
    }
}

fn split_origins(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = ServerConfig::default();
        assert_eq!(config.port, 8080);
        assert_eq!(config.bind_addr().to_string(), "0.0.0.0:8080");
        assert!(config.cors_allowed_origins.is_none());
    }

    #[test]
    fn test_from_env() {
        temp_env::with_vars(
            [
                ("HOST", Some("127.0.0.1")),
                ("PORT", Some("9090")),
                ("CORS_ORIGINS", Some("http://a.test, ,http://b.test")),
            ],
            || {
                let config = ServerConfig::from_env().unwrap();
                assert_eq!(config.bind_addr().to_string(), "127.0.0.1:9090");
                assert_eq!(
                    config.cors_allowed_origins,
                    Some(vec!["http://a.test".to_string(), "http://b.test".to_string()])
                );
            },
        );
    }

    #[test]
    fn test_invalid_port() {
        temp_env::with_vars([("PORT", Some("not-a-port"))], || {
            let err = ServerConfig::from_env().unwrap_err();
            assert!(err.to_string().contains("PORT"));
        });
    }

    #[test]
    fn test_invalid_host() {
        temp_env::with_vars([("HOST", Some("localhost:80"))], || {
            let err = ServerConfig::from_env().unwrap_err();
            assert!(err.to_string().contains("HOST"));
        });
    }
}
