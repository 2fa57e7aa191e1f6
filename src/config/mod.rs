//! Process configuration
//!
//! Everything arrives as flags or environment variables; there is no config
//! file. Derived accessors turn the flat argument list into the structured
//! settings the subsystems take.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;

use crate::session::SessionSettings;
use crate::ssh::{AuthMethod, SshConfig};

/// Admin console gateway for GPU pods: tails logs, samples resources, and
/// bridges interactive shells over WebSocket.
#[derive(Debug, Parser)]
#[command(name = "podbridge", version)]
pub struct AppConfig {
    /// Address the WebSocket gateway listens on
    #[arg(long, env = "PODBRIDGE_BIND", default_value = "0.0.0.0:3001")]
    pub bind: SocketAddr,

    /// Control-plane inventory endpoint; without it the inventory starts
    /// empty and every lookup fails until it is populated another way
    #[arg(long, env = "PODBRIDGE_INVENTORY_URL")]
    pub inventory_url: Option<String>,

    /// Inventory refresh interval in seconds
    #[arg(long, env = "PODBRIDGE_REFRESH_SECS", default_value_t = 30)]
    pub refresh_secs: u64,

    /// Resource sampling interval in seconds
    #[arg(long, env = "PODBRIDGE_SAMPLE_SECS", default_value_t = 5)]
    pub sample_secs: u64,

    /// SSH connect timeout in seconds
    #[arg(long, env = "PODBRIDGE_CONNECT_TIMEOUT_SECS", default_value_t = 15)]
    pub connect_timeout_secs: u64,

    /// Username for pod shells
    #[arg(long, env = "PODBRIDGE_SSH_USERNAME", default_value = "root")]
    pub ssh_username: String,

    /// Private key for pod authentication; pods that accept none-auth need
    /// neither this nor a password
    #[arg(long, env = "PODBRIDGE_SSH_KEY")]
    pub ssh_key: Option<PathBuf>,

    /// Password for pod authentication; ignored when a key is given
    #[arg(long, env = "PODBRIDGE_SSH_PASSWORD", hide_env_values = true)]
    pub ssh_password: Option<String>,
}

impl AppConfig {
    /// Base transport config; host and port are filled in per pod.
    pub fn ssh_config(&self) -> SshConfig {
        let auth = match (&self.ssh_key, &self.ssh_password) {
            (Some(key_path), _) => AuthMethod::Key {
                key_path: key_path.to_string_lossy().into_owned(),
                passphrase: None,
            },
            (None, Some(password)) => AuthMethod::Password {
                password: password.clone(),
            },
            (None, None) => AuthMethod::None,
        };

        SshConfig {
            username: self.ssh_username.clone(),
            auth,
            timeout_secs: self.connect_timeout_secs,
            ..SshConfig::default()
        }
    }

    pub fn session_settings(&self) -> SessionSettings {
        SessionSettings {
            sample_interval: Duration::from_secs(self.sample_secs),
            ..SessionSettings::default()
        }
    }

    pub fn refresh_interval(&self) -> Duration {
        Duration::from_secs(self.refresh_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_parse() {
        let config = AppConfig::try_parse_from(["podbridge"]).unwrap();
        assert_eq!(config.bind.port(), 3001);
        assert_eq!(config.refresh_secs, 30);
        assert_eq!(config.sample_secs, 5);
        assert_eq!(config.ssh_username, "root");
        assert!(config.inventory_url.is_none());
        assert!(matches!(config.ssh_config().auth, AuthMethod::None));
    }

    #[test]
    fn key_takes_precedence_over_password() {
        let config = AppConfig::try_parse_from([
            "podbridge",
            "--ssh-key",
            "/etc/podbridge/id_ed25519",
            "--ssh-password",
            "hunter2",
        ])
        .unwrap();
        assert!(matches!(config.ssh_config().auth, AuthMethod::Key { .. }));
    }

    #[test]
    fn intervals_flow_into_settings() {
        let config =
            AppConfig::try_parse_from(["podbridge", "--sample-secs", "2", "--refresh-secs", "10"])
                .unwrap();
        assert_eq!(
            config.session_settings().sample_interval,
            Duration::from_secs(2)
        );
        assert_eq!(config.refresh_interval(), Duration::from_secs(10));
    }
}
