//! Configuration management for the RAX FTP client
//!
//! Built-in defaults, then an optional `config.toml`, then `RAX_FTP_CLIENT_*`
//! environment variables, each layer overriding the previous one.

use std::time::Duration;

use config::builder::DefaultState;
use config::{Config, ConfigBuilder, ConfigError, Environment, File};
use serde::Deserialize;

use crate::auth::Credentials;
use crate::control::ConnectionOptions;
use crate::session::SessionOptions;
use crate::transfer::TransferMode;

/// Client configuration
#[derive(Debug, Deserialize, Clone)]
pub struct ClientConfig {
    // ═══ SERVER AND LOGIN ═══
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: String,

    // ═══ DATA CONNECTION ═══
    /// `passive`, `extended_passive` or `active`
    pub transfer_mode: TransferMode,
    /// Retry with the other mode when the server refuses PASV/EPSV or PORT
    pub mode_fallback: bool,

    // ═══ TIMEOUTS ═══
    pub connect_timeout_secs: u64,
    /// Active mode only: how long to wait for the server to connect back
    pub accept_timeout_secs: u64,
    /// 0 disables the idle timeout
    pub idle_timeout_secs: u64,
    pub abort_timeout_secs: u64,

    // ═══ TRANSFERS ═══
    pub buffer_size: usize,
    /// Minimum bytes between progress reports, 0 reports every chunk
    pub callback_bytes: u64,

    // ═══ SESSION ═══
    pub reuse_connection: bool,
    pub show_hidden: bool,
    pub probe_size: bool,
}

impl ClientConfig {
    /// Load configuration from ./config.toml (optional) with environment overrides
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from("config")
    }

    /// Load configuration from `path` (extension optional, file optional)
    /// with environment overrides
    pub fn load_from(path: &str) -> Result<Self, ConfigError> {
        let settings = Self::defaults()?
            .add_source(File::with_name(path).required(false))
            .add_source(Environment::with_prefix("RAX_FTP_CLIENT").try_parsing(true))
            .build()?;
        Self::from_settings(settings)
    }

    /// Builder preloaded with every default
    pub fn defaults() -> Result<ConfigBuilder<DefaultState>, ConfigError> {
        Config::builder()
            .set_default("host", "127.0.0.1")?
            .set_default("port", 21)?
            .set_default("username", "anonymous")?
            .set_default("password", "anonymous@")?
            .set_default("transfer_mode", "passive")?
            .set_default("mode_fallback", false)?
            .set_default("connect_timeout_secs", 30)?
            .set_default("accept_timeout_secs", 30)?
            .set_default("idle_timeout_secs", 0)?
            .set_default("abort_timeout_secs", 10)?
            .set_default("buffer_size", 32768)?
            .set_default("callback_bytes", 0)?
            .set_default("reuse_connection", false)?
            .set_default("show_hidden", false)?
            .set_default("probe_size", true)
    }

    /// Deserialize and validate built settings
    pub fn from_settings(settings: Config) -> Result<Self, ConfigError> {
        let config: ClientConfig = settings.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Validation for all configuration values
    fn validate(&self) -> Result<(), ConfigError> {
        if self.host.trim().is_empty() {
            return Err(ConfigError::Message("host cannot be empty".into()));
        }

        if self.port == 0 {
            return Err(ConfigError::Message("port cannot be 0".into()));
        }

        if self.buffer_size == 0 {
            return Err(ConfigError::Message(
                "buffer_size must be greater than 0".into(),
            ));
        }

        if self.connect_timeout_secs == 0
            || self.accept_timeout_secs == 0
            || self.abort_timeout_secs == 0
        {
            return Err(ConfigError::Message(
                "connect, accept and abort timeouts must be greater than 0".into(),
            ));
        }

        Ok(())
    }

    pub fn credentials(&self) -> Credentials {
        Credentials::new(&self.host, &self.username, &self.password).with_port(self.port)
    }

    pub fn connection_options(&self) -> ConnectionOptions {
        ConnectionOptions {
            connect_timeout: Duration::from_secs(self.connect_timeout_secs),
            accept_timeout: Duration::from_secs(self.accept_timeout_secs),
            idle_timeout: (self.idle_timeout_secs > 0)
                .then(|| Duration::from_secs(self.idle_timeout_secs)),
            abort_timeout: Duration::from_secs(self.abort_timeout_secs),
            transfer_mode: self.transfer_mode,
            mode_fallback: self.mode_fallback,
            buffer_size: self.buffer_size,
            callback_bytes: self.callback_bytes,
            idle_handler: None,
        }
    }

    pub fn session_options(&self) -> SessionOptions {
        SessionOptions {
            connection: self.connection_options(),
            reuse_connection: self.reuse_connection,
            show_hidden: self.show_hidden,
            probe_size: self.probe_size,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let settings = ClientConfig::defaults().unwrap().build().unwrap();
        let config = ClientConfig::from_settings(settings).unwrap();

        assert_eq!(config.port, 21);
        assert_eq!(config.transfer_mode, TransferMode::Passive);
        assert_eq!(config.buffer_size, 32768);
        assert!(!config.reuse_connection);
        assert!(config.probe_size);

        let options = config.session_options();
        assert_eq!(options.connection.connect_timeout, Duration::from_secs(30));
        assert!(options.connection.idle_timeout.is_none());
    }

    #[test]
    fn test_file_overrides_defaults() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            "host = \"ftp.example.com\"\nport = 2121\ntransfer_mode = \"active\"\nidle_timeout_secs = 5\nreuse_connection = true"
        )
        .unwrap();

        let settings = ClientConfig::defaults()
            .unwrap()
            .add_source(File::from(file.path()))
            .build()
            .unwrap();
        let config = ClientConfig::from_settings(settings).unwrap();

        assert_eq!(config.credentials().host(), "ftp.example.com");
        assert_eq!(config.credentials().port(), 2121);
        assert_eq!(config.transfer_mode, TransferMode::Active);
        assert_eq!(
            config.connection_options().idle_timeout,
            Some(Duration::from_secs(5))
        );
        assert!(config.session_options().reuse_connection);
    }

    #[test]
    fn test_extended_passive_mode_name() {
        let settings = ClientConfig::defaults()
            .unwrap()
            .set_override("transfer_mode", "extended_passive")
            .unwrap()
            .build()
            .unwrap();
        let config = ClientConfig::from_settings(settings).unwrap();
        assert_eq!(config.transfer_mode, TransferMode::ExtendedPassive);
    }

    #[test]
    fn test_validation_rejects_zero_port() {
        let settings = ClientConfig::defaults()
            .unwrap()
            .set_override("port", 0)
            .unwrap()
            .build()
            .unwrap();
        assert!(ClientConfig::from_settings(settings).is_err());
    }

    #[test]
    fn test_validation_rejects_zero_buffer() {
        let settings = ClientConfig::defaults()
            .unwrap()
            .set_override("buffer_size", 0)
            .unwrap()
            .build()
            .unwrap();
        assert!(ClientConfig::from_settings(settings).is_err());
    }
}
