//! In-process transport: commands go straight to a per-protocol handler.
//!
//! No I/O and no timeout. Handlers may queue delayed responses and
//! notifications, which `wait_for_*` then drains in FIFO order.

use std::collections::{BTreeMap, VecDeque};
use std::fmt;

use scmi_wire::{Header, MessageType, Response, Status};

use crate::{TransportBackend, TransportError};

/// Platform-side implementation of one protocol.
pub trait PlatformHandler: Send {
    /// The protocol id this handler answers.
    fn protocol_id(&self) -> u8;

    /// Answer one command. The returned header must echo the request's
    /// protocol id and message id.
    fn handle(&mut self, header: &Header, params: &[u32], pending: &mut Pending) -> Response;
}

/// Messages the platform has queued for the agent.
#[derive(Debug, Default)]
pub struct Pending {
    delayed: VecDeque<Response>,
    notifications: VecDeque<Response>,
}

impl Pending {
    /// Queue the delayed response for a command. The header is rewritten to
    /// the delayed-response type, keeping the command's token.
    pub fn push_delayed(&mut self, command: &Header, status: i32, returns: Vec<u32>) {
        let mut header = *command;
        header.message_type = MessageType::DelayedResponse;
        self.delayed.push_back(Response::new(header, status, returns));
    }

    /// Queue a notification. Notifications carry no status word, so the
    /// whole payload lands in `returns` and `status` is zero.
    pub fn push_notification(&mut self, protocol_id: u8, message_id: u8, payload: Vec<u32>) {
        let header = Header {
            reserved: 0,
            token: 0,
            protocol_id,
            message_type: MessageType::Notification,
            message_id,
        };
        self.notifications
            .push_back(Response::new(header, Status::Success.as_i32(), payload));
    }

    pub fn delayed_len(&self) -> usize {
        self.delayed.len()
    }

    pub fn notification_len(&self) -> usize {
        self.notifications.len()
    }
}

/// Transport that dispatches to registered [`PlatformHandler`]s.
///
/// Commands for a protocol without a handler are answered with
/// `NOT_SUPPORTED`, which is what a platform does for an unimplemented
/// protocol.
#[derive(Default)]
pub struct MockTransport {
    handlers: BTreeMap<u8, Box<dyn PlatformHandler>>,
    pending: Pending,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler for its protocol id.
    pub fn register(
        &mut self,
        handler: impl PlatformHandler + 'static,
    ) -> Result<(), TransportError> {
        self.register_boxed(Box::new(handler))
    }

    pub fn register_boxed(
        &mut self,
        handler: Box<dyn PlatformHandler>,
    ) -> Result<(), TransportError> {
        let protocol_id = handler.protocol_id();
        if self.handlers.contains_key(&protocol_id) {
            return Err(TransportError::DuplicateHandler(protocol_id));
        }
        self.handlers.insert(protocol_id, handler);
        Ok(())
    }

    pub fn has_handler(&self, protocol_id: u8) -> bool {
        self.handlers.contains_key(&protocol_id)
    }

    pub fn protocol_ids(&self) -> impl Iterator<Item = u8> + '_ {
        self.handlers.keys().copied()
    }

    pub fn pending(&self) -> &Pending {
        &self.pending
    }
}

impl fmt::Debug for MockTransport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MockTransport")
            .field("protocols", &self.handlers.keys().collect::<Vec<_>>())
            .field("pending", &self.pending)
            .finish()
    }
}

impl TransportBackend for MockTransport {
    fn send(&mut self, header: Header, params: &[u32]) -> Result<Response, TransportError> {
        let Some(handler) = self.handlers.get_mut(&header.protocol_id) else {
            tracing::trace!(protocol = header.protocol_id, "no handler, NOT_SUPPORTED");
            return Ok(Response::status_only(header, Status::NotSupported.as_i32()));
        };
        Ok(handler.handle(&header, params, &mut self.pending))
    }

    fn wait_for_delayed_response(&mut self) -> Result<Response, TransportError> {
        self.pending
            .delayed
            .pop_front()
            .ok_or(TransportError::NothingPending(MessageType::DelayedResponse))
    }

    fn wait_for_notification(&mut self) -> Result<Response, TransportError> {
        self.pending
            .notifications
            .pop_front()
            .ok_or(TransportError::NothingPending(MessageType::Notification))
    }

    fn name(&self) -> &'static str {
        "mock"
    }
}
