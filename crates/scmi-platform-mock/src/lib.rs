//! A configurable in-process platform.
//!
//! Answers base (0x10) and power domain (0x11) commands from plain state so
//! the conformance engine can be exercised without hardware. Every other
//! protocol id is left unhandled and the mock transport answers it with
//! `NOT_SUPPORTED`.

use scmi_transport::{MockTransport, Transport, TransportError};
use scmi_wire::{Header, Response, Status};

mod base;
mod power;

pub use base::{BaseConfig, BaseProtocol};
pub use power::{PowerConfig, PowerDomainConfig, PowerProtocol};

/// Full platform description.
#[derive(Clone, Debug, Default)]
pub struct PlatformConfig {
    pub base: BaseConfig,
    /// `None` leaves the power protocol unimplemented.
    pub power: Option<PowerConfig>,
}

impl PlatformConfig {
    /// The stock platform: six advertised protocols, two agents, three
    /// power domains.
    pub fn standard() -> Self {
        Self {
            base: BaseConfig::default(),
            power: Some(PowerConfig::default()),
        }
    }

    /// Register a handler per configured protocol on a fresh mock transport.
    pub fn build(&self) -> Result<MockTransport, TransportError> {
        let mut mock = MockTransport::new();
        mock.register(BaseProtocol::new(self.base.clone()))?;
        if let Some(power) = &self.power {
            mock.register(PowerProtocol::new(power.clone()))?;
        }
        tracing::debug!(
            protocols = ?mock.protocol_ids().collect::<Vec<_>>(),
            "mock platform ready"
        );
        Ok(mock)
    }

    pub fn transport(&self) -> Result<Transport, TransportError> {
        self.build().map(Transport::from)
    }
}

/// Parameter `index`, or PROTOCOL_ERROR when the command is too short.
pub(crate) fn param(params: &[u32], index: usize) -> Result<u32, Status> {
    params.get(index).copied().ok_or(Status::ProtocolError)
}

pub(crate) fn reply(header: &Header, result: Result<Vec<u32>, Status>) -> Response {
    match result {
        Ok(returns) => Response::new(*header, Status::Success.as_i32(), returns),
        Err(status) => Response::status_only(*header, status.as_i32()),
    }
}
