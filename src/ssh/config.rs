//! SSH connection configuration

use serde::{Deserialize, Serialize};

/// Connection parameters for one pod transport
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SshConfig {
    /// Remote host address
    pub host: String,

    /// SSH port as mapped by the pod's public binding
    #[serde(default = "default_port")]
    pub port: u16,

    /// Username for authentication
    pub username: String,

    /// Authentication method
    #[serde(default)]
    pub auth: AuthMethod,

    /// Connect timeout in seconds
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,

    /// Terminal type reported to the remote side
    #[serde(default = "default_term")]
    pub term: String,

    /// Default terminal columns
    #[serde(default = "default_cols")]
    pub cols: u16,

    /// Default terminal rows
    #[serde(default = "default_rows")]
    pub rows: u16,
}

/// Authentication methods supported
///
/// GPU pods typically accept root without a credential, so `None` is the
/// default. Key auth covers fleets that provision an authorized key.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AuthMethod {
    /// No credential (none authentication)
    #[default]
    None,

    /// Password authentication
    Password { password: String },

    /// SSH key authentication
    Key {
        /// Path to private key file
        key_path: String,
        /// Optional passphrase for encrypted keys
        passphrase: Option<String>,
    },
}

fn default_port() -> u16 {
    22
}

fn default_timeout() -> u64 {
    15
}

fn default_term() -> String {
    "xterm-256color".to_string()
}

fn default_cols() -> u16 {
    80
}

fn default_rows() -> u16 {
    24
}

impl Default for SshConfig {
    fn default() -> Self {
        Self {
            host: String::new(),
            port: 22,
            username: "root".to_string(),
            auth: AuthMethod::None,
            timeout_secs: 15,
            term: default_term(),
            cols: 80,
            rows: 24,
        }
    }
}
