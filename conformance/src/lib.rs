//! SCMI protocol conformance engine.
//!
//! An agent-side test runner: it drives a platform through a transport,
//! walks declarative suites of test cases per protocol and classifies every
//! case as CONFORMANT, NON CONFORMANT, UNDEFINED or UNTESTED.
//!
//! # Usage
//!
//! ```bash
//! scmi-conformance                       # against the built-in mock platform
//! scmi-conformance --transport mailbox --message /dev/shm/msg --signal /dev/shm/bell
//! scmi-conformance --list                # show registered protocols and suites
//! ```
//!
//! The binary exits with:
//! - 0: every executed case was conformant
//! - 1: at least one failure or error was recorded
//! - 2: the run could not start (configuration, transport, registry)

use std::fmt;

use scmi_platform_mock::PlatformConfig;

pub mod config;
pub mod context;
pub mod engine;
pub mod orchestrator;
pub mod output;
pub mod precondition;
pub mod protocols;
pub mod report;
pub mod skip;
pub mod testcase;

pub use config::{ConfigError, RunConfig, TransportKind};
pub use engine::Engine;
pub use orchestrator::{Agent, PlatformInfo, ProtocolModule, RegistryError};
pub use report::{CaseStatus, RunReport, TestStats};

#[derive(Debug)]
pub enum RunError {
    Config(ConfigError),
    Registry(RegistryError),
}

impl fmt::Display for RunError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RunError::Config(e) => write!(f, "{}", e),
            RunError::Registry(e) => write!(f, "{}", e),
        }
    }
}

impl std::error::Error for RunError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            RunError::Config(e) => Some(e),
            RunError::Registry(e) => Some(e),
        }
    }
}

impl From<ConfigError> for RunError {
    fn from(e: ConfigError) -> Self {
        RunError::Config(e)
    }
}

impl From<RegistryError> for RunError {
    fn from(e: RegistryError) -> Self {
        RunError::Registry(e)
    }
}

/// Run every built-in protocol module against the configured transport.
///
/// Against the mock, `platform` builds both the platform and the fixtures.
/// Against a mailbox no fixtures are known, so values are reported and
/// capability queries follow what the platform answers.
pub fn run(config: &RunConfig, platform: &PlatformConfig) -> Result<RunReport, RunError> {
    let fixtures = match config.transport {
        TransportKind::Mock => protocols::mock_platform_info(platform),
        TransportKind::Mailbox => PlatformInfo::new(),
    };
    let agent = Agent::with_builtin(fixtures)?;
    let transport = config.open_transport(platform)?;
    let output = config.open_output()?;
    let mut engine = Engine::new(transport, output);
    Ok(agent.run(&mut engine, config)?)
}
