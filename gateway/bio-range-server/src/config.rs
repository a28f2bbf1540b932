use gateway_bio_range_core::alignment::MAX_ALIGNMENT_RANGE;
use gateway_bio_range_core::multiplex::DEFAULT_BUFFER_SIZE;
use gateway_bio_range_core::{GatewayError, ObjectStorageOptions, Result};
use std::env;
use std::fmt::Display;
use std::str::FromStr;

/// Settings of the HTTP server.
#[derive(Clone, Debug)]
pub struct ServerConfig {
    /// Interface to bind (`HOST`)
    pub host: String,
    /// Port to bind (`PORT`)
    pub port: u16,
    /// Items per `DATA` frame on streamed responses (`STREAM_BUFFER_SIZE`)
    pub stream_buffer_size: usize,
    /// Widest alignment window served, in bases (`MAX_ALIGNMENT_RANGE`)
    pub max_alignment_range: u64,
    /// Settings for the remote object loaders
    pub storage: ObjectStorageOptions,
}

impl Default for ServerConfig {
    fn default() -> Self {
        ServerConfig {
            host: "0.0.0.0".to_string(),
            port: 3000,
            stream_buffer_size: DEFAULT_BUFFER_SIZE,
            max_alignment_range: MAX_ALIGNMENT_RANGE,
            storage: ObjectStorageOptions::default(),
        }
    }
}

impl Display for ServerConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "ServerConfig {{ host: {}, port: {}, stream_buffer_size: {}, max_alignment_range: {}, storage: {} }}",
            self.host, self.port, self.stream_buffer_size, self.max_alignment_range, self.storage
        )
    }
}

fn parse_var<T: FromStr>(name: &str, value: Option<String>, default: T) -> Result<T> {
    match value {
        Some(value) => value.trim().parse().map_err(|_| {
            GatewayError::Validation(format!("Invalid value for {name}: {value}"))
        }),
        None => Ok(default),
    }
}

impl ServerConfig {
    /// Reads the configuration from the process environment.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Reads the configuration through `lookup`, using defaults for missing keys.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = ServerConfig::default();
        let stream_buffer_size = parse_var(
            "STREAM_BUFFER_SIZE",
            lookup("STREAM_BUFFER_SIZE"),
            defaults.stream_buffer_size,
        )?;
        if stream_buffer_size == 0 {
            return Err(GatewayError::Validation(
                "STREAM_BUFFER_SIZE must be positive".to_string(),
            ));
        }
        Ok(ServerConfig {
            host: lookup("HOST").unwrap_or(defaults.host),
            port: parse_var("PORT", lookup("PORT"), defaults.port)?,
            stream_buffer_size,
            max_alignment_range: parse_var(
                "MAX_ALIGNMENT_RANGE",
                lookup("MAX_ALIGNMENT_RANGE"),
                defaults.max_alignment_range,
            )?,
            storage: defaults.storage,
        })
    }

    /// `host:port` to bind.
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| vars.get(name).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = ServerConfig::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config.bind_address(), "0.0.0.0:3000");
        assert_eq!(config.stream_buffer_size, 512);
        assert_eq!(config.max_alignment_range, 20_000);
    }

    #[test]
    fn test_overrides() {
        let config = ServerConfig::from_lookup(lookup(&[
            ("HOST", "127.0.0.1"),
            ("PORT", "8080"),
            ("STREAM_BUFFER_SIZE", "64"),
        ]))
        .unwrap();
        assert_eq!(config.bind_address(), "127.0.0.1:8080");
        assert_eq!(config.stream_buffer_size, 64);
    }

    #[test]
    fn test_invalid_values() {
        assert!(ServerConfig::from_lookup(lookup(&[("PORT", "http")])).is_err());
        assert!(ServerConfig::from_lookup(lookup(&[("STREAM_BUFFER_SIZE", "0")])).is_err());
    }
}
