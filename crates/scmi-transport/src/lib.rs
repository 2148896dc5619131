//! Transport enum and internal backend trait.
//!
//! The public API is the [`Transport`] enum. Each backend lives in its own
//! module and implements the internal [`TransportBackend`] trait; calls are
//! forwarded with `enum_dispatch`.
//!
//! Every call blocks until the platform answers or the backend's deadline
//! passes. Responses are returned by value and stay valid for as long as the
//! caller holds them.

use enum_dispatch::enum_dispatch;
use scmi_wire::{Header, MAX_PAYLOAD_WORDS, MessageType, Response};

mod error;
pub use error::TransportError;

#[cfg(feature = "mailbox")]
pub mod mailbox;
#[cfg(feature = "mock")]
pub mod mock;

#[cfg(feature = "mailbox")]
pub use mailbox::{MailboxConfig, MailboxTransport};
#[cfg(feature = "mock")]
pub use mock::{MockTransport, Pending, PlatformHandler};

#[enum_dispatch]
pub(crate) trait TransportBackend {
    fn send(&mut self, header: Header, params: &[u32]) -> Result<Response, TransportError>;
    fn wait_for_delayed_response(&mut self) -> Result<Response, TransportError>;
    fn wait_for_notification(&mut self) -> Result<Response, TransportError>;
    fn name(&self) -> &'static str;
}

#[enum_dispatch(TransportBackend)]
#[derive(Debug)]
pub enum Transport {
    #[cfg(feature = "mailbox")]
    Mailbox(MailboxTransport),
    #[cfg(feature = "mock")]
    Mock(MockTransport),
}

impl Transport {
    /// Send a command and block for its synchronous response.
    ///
    /// On success the response header carries the request's protocol id and
    /// message id.
    pub fn send(&mut self, header: Header, params: &[u32]) -> Result<Response, TransportError> {
        if params.len() > MAX_PAYLOAD_WORDS {
            return Err(TransportError::TooManyParameters {
                count: params.len(),
                max: MAX_PAYLOAD_WORDS,
            });
        }

        tracing::debug!(%header, ?params, backend = self.name(), "send");
        let response = TransportBackend::send(self, header, params)?;
        if !header.matches(&response.header) {
            return Err(TransportError::HeaderMismatch {
                sent: header,
                received: response.header,
            });
        }
        tracing::debug!(
            header = %response.header,
            status = response.status,
            returns = response.returns.len(),
            "response"
        );
        Ok(response)
    }

    /// Block until a delayed response arrives.
    pub fn wait_for_delayed_response(&mut self) -> Result<Response, TransportError> {
        let response = TransportBackend::wait_for_delayed_response(self)?;
        expect_type(&response, MessageType::DelayedResponse)?;
        tracing::debug!(header = %response.header, status = response.status, "delayed response");
        Ok(response)
    }

    /// Block until a notification arrives.
    pub fn wait_for_notification(&mut self) -> Result<Response, TransportError> {
        let response = TransportBackend::wait_for_notification(self)?;
        expect_type(&response, MessageType::Notification)?;
        tracing::debug!(header = %response.header, "notification");
        Ok(response)
    }

    /// Short backend name for logs and reports.
    pub fn backend_name(&self) -> &'static str {
        TransportBackend::name(self)
    }
}

fn expect_type(response: &Response, expected: MessageType) -> Result<(), TransportError> {
    if response.header.message_type != expected {
        return Err(TransportError::UnexpectedMessageType {
            expected,
            received: response.header.message_type,
        });
    }
    Ok(())
}
