use std::time::Duration;

use serde::Deserialize;

use crate::address::NetLocation;
use crate::allowed_hosts::AllowedHosts;
use crate::crypto::Cipher;
use crate::packet::DEFAULT_PAYLOAD_LENGTH;
use crate::protocol::ClientHandler;

const DEFAULT_PORT: u16 = 5667;

fn default_timeout_secs() -> u64 {
    30
}

fn default_payload_length() -> usize {
    DEFAULT_PAYLOAD_LENGTH
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ClientConfig {
    /// `host`, `host:port` or `[v6]:port`; port defaults to 5667.
    pub server: String,
    #[serde(default)]
    pub password: String,
    /// Encryption method name or numeric id ("none", "xor", "0", "1").
    #[serde(default)]
    pub encryption: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout: u64,
    #[serde(default = "default_payload_length")]
    pub payload_length: usize,
    /// Comma-separated allow-list sources, used on accept paths.
    #[serde(default)]
    pub allowed_hosts: Option<String>,
}

/// Validated connection settings derived from [`ClientConfig`].
#[derive(Debug, Clone)]
pub struct ConnectionInfo {
    pub location: NetLocation,
    pub password: String,
    pub cipher: Cipher,
    pub timeout: Duration,
    pub payload_length: usize,
}

impl ConnectionInfo {
    pub fn from_config(config: &ClientConfig) -> std::io::Result<Self> {
        let location = NetLocation::from_str(&config.server, Some(DEFAULT_PORT))?;
        let cipher = Cipher::try_from(config.encryption.as_str())?;
        if config.timeout == 0 {
            return Err(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                "timeout must be positive",
            ));
        }
        if config.payload_length == 0 {
            return Err(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                "payload_length must be positive",
            ));
        }
        Ok(Self {
            location,
            password: config.password.clone(),
            cipher,
            timeout: Duration::from_secs(config.timeout),
            payload_length: config.payload_length,
        })
    }
}

impl ClientHandler for ConnectionInfo {
    fn password(&self) -> &str {
        &self.password
    }

    fn cipher(&self) -> Cipher {
        self.cipher
    }

    fn payload_length(&self) -> usize {
        self.payload_length
    }
}

impl ClientConfig {
    /// Builds the allow-list matcher from the configured sources, if any.
    pub fn allowed_hosts(&self) -> AllowedHosts {
        let mut hosts = AllowedHosts::new();
        if let Some(sources) = &self.allowed_hosts {
            hosts.set_sources(sources);
        }
        hosts
    }
}

/// Loads and parses a YAML config file.
pub async fn load_config(config_filename: &str) -> std::io::Result<ClientConfig> {
    let config_bytes = match tokio::fs::read(config_filename).await {
        Ok(b) => b,
        Err(e) => {
            return Err(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                format!("Could not read config file {config_filename}: {e}"),
            ));
        }
    };

    let config_str = match String::from_utf8(config_bytes) {
        Ok(s) => s,
        Err(e) => {
            return Err(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                format!("Could not parse config file {config_filename} as UTF8: {e}"),
            ));
        }
    };

    match serde_yaml::from_str::<ClientConfig>(&config_str) {
        Ok(c) => Ok(c),
        Err(e) => Err(std::io::Error::new(
            std::io::ErrorKind::InvalidInput,
            format!("Could not parse config file {config_filename} as config YAML: {e}"),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_minimal_config() {
        let config: ClientConfig =
            serde_yaml::from_str("server: monitor.example.com").unwrap();
        let info = ConnectionInfo::from_config(&config).unwrap();
        assert_eq!(info.location.port(), DEFAULT_PORT);
        assert_eq!(info.cipher, Cipher::None);
        assert_eq!(info.timeout, Duration::from_secs(30));
        assert_eq!(info.payload_length, DEFAULT_PAYLOAD_LENGTH);
    }

    #[test]
    fn test_full_config() {
        let config: ClientConfig = serde_yaml::from_str(
            r#"
server: "127.0.0.1:5668"
password: "secret"
encryption: "xor"
timeout: 10
payload_length: 4096
allowed_hosts: "10.0.0.0/8, 192.168.1.5"
"#,
        )
        .unwrap();
        let info = ConnectionInfo::from_config(&config).unwrap();
        assert_eq!(info.location.port(), 5668);
        assert_eq!(info.cipher, Cipher::Xor);
        assert_eq!(info.timeout, Duration::from_secs(10));
        assert_eq!(info.payload_length, 4096);
        assert!(config.allowed_hosts.is_some());
    }

    #[test]
    fn test_invalid_encryption() {
        let config: ClientConfig = serde_yaml::from_str(
            "server: monitor.example.com\nencryption: rijndael-256",
        )
        .unwrap();
        assert!(ConnectionInfo::from_config(&config).is_err());
    }

    #[test]
    fn test_unknown_field_rejected() {
        assert!(
            serde_yaml::from_str::<ClientConfig>("server: a\nunknown_field: 1").is_err()
        );
    }

    #[test]
    fn test_zero_timeout_rejected() {
        let config: ClientConfig =
            serde_yaml::from_str("server: monitor.example.com\ntimeout: 0").unwrap();
        assert!(ConnectionInfo::from_config(&config).is_err());
    }
}
