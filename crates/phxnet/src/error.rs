//! Service error types with miette diagnostics.

use std::net::SocketAddr;

use miette::Diagnostic;
use thiserror::Error;

use phxnet_config::ConfigError;

/// Process exit codes.
pub mod exit_code {
    pub const GENERAL: i32 = 1;
    pub const CONFIG: i32 = 2;
    pub const BIND: i32 = 3;
}

#[derive(Debug, Error, Diagnostic)]
pub enum CliError {
    // ── Configuration ────────────────────────────────────────────────

    #[error("Configuration error")]
    #[diagnostic(
        code(phxnet::config),
        help(
            "Check the config file or PHXNET_* environment variables.\n\
             Run: phxnet config show"
        )
    )]
    Config(#[from] ConfigError),

    // ── Startup ──────────────────────────────────────────────────────

    #[error("Could not listen on {addr}")]
    #[diagnostic(
        code(phxnet::bind_failed),
        help("Another process may already use this address; change `bind` in the config.")
    )]
    Bind {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },

    #[error("IO error: {0}")]
    #[diagnostic(code(phxnet::io))]
    Io(#[from] std::io::Error),
}

impl CliError {
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Config(_) => exit_code::CONFIG,
            Self::Bind { .. } => exit_code::BIND,
            Self::Io(_) => exit_code::GENERAL,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exit_codes_by_kind() {
        let config = CliError::Config(ConfigError::Validation {
            field: "agents".into(),
            reason: "empty".into(),
        });
        assert_eq!(config.exit_code(), exit_code::CONFIG);

        let bind = CliError::Bind {
            addr: SocketAddr::from(([127, 0, 0, 1], 8000)),
            source: std::io::Error::from(std::io::ErrorKind::AddrInUse),
        };
        assert_eq!(bind.exit_code(), exit_code::BIND);
        assert!(bind.to_string().contains("127.0.0.1:8000"));
    }
}
