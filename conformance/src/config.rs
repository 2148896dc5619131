//! Run configuration and the transport/output it opens.

use std::fmt;
use std::io;
use std::path::PathBuf;
use std::time::Duration;

use scmi_platform_mock::PlatformConfig;
use scmi_transport::{MailboxConfig, MailboxTransport, Transport, TransportError};

use crate::output::Output;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum TransportKind {
    /// In-process mock platform.
    #[default]
    Mock,
    /// Shared-memory mailbox files.
    Mailbox,
}

#[derive(Debug, Clone, Default)]
pub struct RunConfig {
    pub transport: TransportKind,
    pub message: Option<PathBuf>,
    pub signal: Option<PathBuf>,
    pub notification: Option<PathBuf>,
    pub timeout: Option<Duration>,
    /// Per-case log file; `None` writes to stdout.
    pub log: Option<PathBuf>,
    pub quiet: bool,
    /// Protocols to run besides base. Empty runs all.
    pub protocols: Vec<u8>,
}

impl RunConfig {
    pub fn selects(&self, protocol_id: u8) -> bool {
        self.protocols.is_empty() || self.protocols.contains(&protocol_id)
    }

    fn mailbox_config(&self) -> Result<MailboxConfig, ConfigError> {
        let message = self.message.clone().ok_or(ConfigError::MissingPath("message"))?;
        let signal = self.signal.clone().ok_or(ConfigError::MissingPath("signal"))?;
        let mut config = MailboxConfig::new(message, signal);
        if let Some(path) = &self.notification {
            config = config.with_notification(path);
        }
        if let Some(timeout) = self.timeout {
            config = config.with_timeout(timeout);
        }
        Ok(config)
    }

    /// Open the selected transport. The mock is built from `platform`.
    pub fn open_transport(&self, platform: &PlatformConfig) -> Result<Transport, ConfigError> {
        let transport = match self.transport {
            TransportKind::Mock => platform.transport()?,
            TransportKind::Mailbox => MailboxTransport::open(&self.mailbox_config()?)?.into(),
        };
        tracing::info!(backend = transport.backend_name(), "transport open");
        Ok(transport)
    }

    pub fn open_output(&self) -> Result<Output, ConfigError> {
        if self.quiet {
            return Ok(Output::Null);
        }
        match &self.log {
            Some(path) => Output::file(path).map_err(|source| ConfigError::Log {
                path: path.clone(),
                source,
            }),
            None => Ok(Output::Console),
        }
    }
}

/// Accepts `0x11`, `0X11` or `17`.
pub fn parse_protocol_id(s: &str) -> Result<u8, ConfigError> {
    let parsed = match s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        Some(hex) => u8::from_str_radix(hex, 16),
        None => s.parse(),
    };
    parsed.map_err(|_| ConfigError::BadProtocolId(s.to_string()))
}

#[derive(Debug)]
pub enum ConfigError {
    MissingPath(&'static str),
    BadProtocolId(String),
    Log { path: PathBuf, source: io::Error },
    Transport(TransportError),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::MissingPath(which) => {
                write!(f, "mailbox transport needs a {} file path", which)
            }
            ConfigError::BadProtocolId(s) => write!(f, "invalid protocol id: {}", s),
            ConfigError::Log { path, source } => {
                write!(f, "cannot open log file {}: {}", path.display(), source)
            }
            ConfigError::Transport(e) => write!(f, "transport: {}", e),
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConfigError::Log { source, .. } => Some(source),
            ConfigError::Transport(e) => Some(e),
            _ => None,
        }
    }
}

impl From<TransportError> for ConfigError {
    fn from(e: TransportError) -> Self {
        ConfigError::Transport(e)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn protocol_ids() {
        assert_eq!(parse_protocol_id("0x11").unwrap(), 0x11);
        assert_eq!(parse_protocol_id("17").unwrap(), 17);
        assert!(matches!(
            parse_protocol_id("0x1ff"),
            Err(ConfigError::BadProtocolId(_))
        ));
        assert!(parse_protocol_id("power").is_err());
    }

    #[test]
    fn mailbox_needs_both_paths() {
        let config = RunConfig {
            transport: TransportKind::Mailbox,
            message: Some("/nonexistent/message".into()),
            ..RunConfig::default()
        };
        let err = config.open_transport(&PlatformConfig::standard()).unwrap_err();
        assert!(matches!(err, ConfigError::MissingPath("signal")));
    }

    #[test]
    fn mock_is_the_default() {
        let transport = RunConfig::default()
            .open_transport(&PlatformConfig::standard())
            .unwrap();
        assert_eq!(transport.backend_name(), "mock");
    }

    #[test]
    fn filter() {
        let config = RunConfig {
            protocols: vec![0x11],
            ..RunConfig::default()
        };
        assert!(config.selects(0x11));
        assert!(!config.selects(0x14));
        assert!(RunConfig::default().selects(0x14));
    }
}
