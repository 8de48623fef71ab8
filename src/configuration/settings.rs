use crate::error_handling::types::ConfigError;
use serde::Deserialize;
use std::fs;
use std::net::{IpAddr, Ipv4Addr};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Immutable configuration snapshot consumed by the behaviour policy.
///
/// A `Settings` value is read, never mutated in place: a running engine holds
/// the snapshot it was started with, and edits only take effect through
/// [`ServerController::restart`](crate::controller::server_controller::ServerController::restart).
///
/// # Fields Overview
///
/// - `domain_name`: hostname the server presents in its greeting
/// - `ip_address` / `port`: bind endpoint for the listening socket
/// - `enable_tls`: offer TLS on connections (subject to certificate resolution)
/// - `tls_certificate_path` / `tls_certificate_password`: explicit certificate,
///   tried first in the resolution chain
/// - `enable_eight_bit_mime`, `enable_starttls`, `enable_auth`, `enable_size`:
///   per-extension toggles
/// - `maximum_message_size`: byte bound on a single message, `0` = unlimited
/// - `receive_timeout_secs`: per-connection idle timeout handed to the engine
/// - `require_authentication`: reject MAIL FROM from unauthenticated sessions
/// - `require_secure_connection`: reject MAIL FROM on insecure sessions
/// - `allow_cleartext_auth_over_insecure`: offer plaintext auth mechanisms even
///   when the connection is not secured
/// - `max_messages`: retention bound for the capture store, `0` = unbounded
/// - `auto_view_new_messages`, `auto_inspect_new_messages`,
///   `balloon_notifications`: carried for presentation layers, which decide
///   what to do with an arriving message; the core does not interpret them
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Settings {
    pub domain_name: String,
    pub ip_address: IpAddr,
    pub port: u16,
    pub enable_tls: bool,
    pub tls_certificate_path: Option<PathBuf>,
    pub tls_certificate_password: Option<String>,
    pub enable_eight_bit_mime: bool,
    pub enable_starttls: bool,
    pub enable_auth: bool,
    pub enable_size: bool,
    pub maximum_message_size: u64,
    pub receive_timeout_secs: u64,
    pub require_authentication: bool,
    pub require_secure_connection: bool,
    pub allow_cleartext_auth_over_insecure: bool,
    pub max_messages: usize,
    pub auto_view_new_messages: bool,
    pub auto_inspect_new_messages: bool,
    pub balloon_notifications: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            domain_name: "localhost".to_string(),
            ip_address: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            port: 25,
            enable_tls: false,
            tls_certificate_path: None,
            tls_certificate_password: None,
            enable_eight_bit_mime: true,
            enable_starttls: true,
            enable_auth: true,
            enable_size: true,
            maximum_message_size: 0,
            receive_timeout_secs: 30,
            require_authentication: false,
            require_secure_connection: false,
            allow_cleartext_auth_over_insecure: false,
            max_messages: 100,
            auto_view_new_messages: false,
            auto_inspect_new_messages: false,
            balloon_notifications: true,
        }
    }
}

impl Settings {
    /// Loads settings from a TOML file. Missing keys fall back to defaults.
    pub fn from_file(path: &Path) -> Result<Settings, ConfigError> {
        let raw = fs::read_to_string(path)?;
        let settings: Settings =
            toml::from_str(&raw).map_err(|e| ConfigError::TomlError(e.to_string()))?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn receive_timeout(&self) -> Duration {
        Duration::from_secs(self.receive_timeout_secs)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.domain_name.is_empty() {
            return Err(ConfigError::InvalidValue(
                "domain_name must not be empty".to_string(),
            ));
        }
        if self.receive_timeout_secs == 0 {
            return Err(ConfigError::InvalidValue(
                "receive_timeout_secs must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}
