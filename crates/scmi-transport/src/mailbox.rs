//! File-backed mailbox transport.
//!
//! Two channels make up the agent-to-platform path: the *message* channel
//! holds the shared mailbox buffer and the *signal* channel is the doorbell.
//! A command is written to the message channel, a one-byte doorbell is rung,
//! and the message channel is polled until the platform marks the channel
//! free again, at which point the buffer holds the response.
//!
//! An optional *notification* channel carries platform-to-agent traffic
//! (delayed responses and notifications). A non-zero length field marks a
//! pending message; the agent zeroes it after reading. A message of the
//! other kind is left in place for the matching wait.

use std::fs::{File, OpenOptions};
use std::io;
use std::os::fd::AsRawFd;
use std::os::unix::fs::FileExt;
use std::path::{Path, PathBuf};
use std::thread;
use std::time::{Duration, Instant};

use scmi_wire::mailbox::{self, ChannelStatus, LENGTH_OFFSET, MAILBOX_SIZE};
use scmi_wire::{Header, MessageType, Response};

use crate::{TransportBackend, TransportError};

/// Byte written to the signal channel to ring the doorbell.
const DOORBELL: u8 = 1;

/// Re-poll interval for channels that always report readable (regular files).
const POLL_INTERVAL: Duration = Duration::from_millis(1);

#[derive(Clone, Debug)]
pub struct MailboxConfig {
    pub message: PathBuf,
    pub signal: PathBuf,
    pub notification: Option<PathBuf>,
    pub timeout: Duration,
}

impl MailboxConfig {
    pub const DEFAULT_TIMEOUT: Duration = Duration::from_millis(1000);

    pub fn new(message: impl Into<PathBuf>, signal: impl Into<PathBuf>) -> Self {
        Self {
            message: message.into(),
            signal: signal.into(),
            notification: None,
            timeout: Self::DEFAULT_TIMEOUT,
        }
    }

    pub fn with_notification(mut self, path: impl Into<PathBuf>) -> Self {
        self.notification = Some(path.into());
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

#[derive(Debug)]
pub struct MailboxTransport {
    message: File,
    signal: File,
    notification: Option<File>,
    timeout: Duration,
}

impl MailboxTransport {
    /// Open the configured channels. The files must already exist.
    pub fn open(config: &MailboxConfig) -> Result<Self, TransportError> {
        let notification = match &config.notification {
            Some(path) => Some(open_channel(path)?),
            None => None,
        };
        Ok(Self {
            message: open_channel(&config.message)?,
            signal: open_channel(&config.signal)?,
            notification,
            timeout: config.timeout,
        })
    }

    fn wait_incoming(&mut self, kind: MessageType) -> Result<Response, TransportError> {
        let Some(channel) = &self.notification else {
            return Err(TransportError::NothingPending(kind));
        };

        let buf = await_buffer(channel, self.timeout, |buf| {
            read_u32(buf, LENGTH_OFFSET).is_some_and(|len| len != 0)
        })?;
        if let Some(received) = mailbox::message_type(&buf)
            && received != kind
        {
            tracing::debug!(%kind, %received, "leaving pending message in place");
            return Err(TransportError::UnexpectedMessageType {
                expected: kind,
                received,
            });
        }
        channel.write_all_at(&0u32.to_le_bytes(), LENGTH_OFFSET as u64)?;

        let response = mailbox::decode_response(&buf)?;
        tracing::trace!(header = %response.header, returns = ?response.returns, "incoming");
        Ok(response)
    }
}

impl TransportBackend for MailboxTransport {
    fn send(&mut self, header: Header, params: &[u32]) -> Result<Response, TransportError> {
        let buf = mailbox::encode_command(&header, params)?;
        tracing::trace!(bytes = ?&buf[..], "mailbox write");
        self.message.write_all_at(&buf, 0)?;
        self.signal.write_all_at(&[DOORBELL], 0)?;

        let buf = await_buffer(&self.message, self.timeout, |buf| {
            mailbox::channel_status(buf).is_some_and(|s| s.contains(ChannelStatus::FREE))
        })?;
        Ok(mailbox::decode_response(&buf)?)
    }

    fn wait_for_delayed_response(&mut self) -> Result<Response, TransportError> {
        self.wait_incoming(MessageType::DelayedResponse)
    }

    fn wait_for_notification(&mut self) -> Result<Response, TransportError> {
        self.wait_incoming(MessageType::Notification)
    }

    fn name(&self) -> &'static str {
        "mailbox"
    }
}

fn open_channel(path: &Path) -> Result<File, TransportError> {
    OpenOptions::new()
        .read(true)
        .write(true)
        .open(path)
        .map_err(|source| TransportError::Open {
            path: path.to_path_buf(),
            source,
        })
}

/// Poll `file` until `ready` accepts its contents or `timeout` elapses.
fn await_buffer(
    file: &File,
    timeout: Duration,
    ready: impl Fn(&[u8]) -> bool,
) -> Result<Vec<u8>, TransportError> {
    let deadline = Instant::now() + timeout;
    loop {
        let remaining = deadline.saturating_duration_since(Instant::now());
        if poll_readable(file, remaining)? {
            let buf = read_buffer(file)?;
            if ready(&buf) {
                return Ok(buf);
            }
        }
        if Instant::now() >= deadline {
            return Err(TransportError::PollTimeout {
                timeout_ms: timeout.as_millis() as u64,
            });
        }
        thread::sleep(POLL_INTERVAL.min(remaining));
    }
}

fn poll_readable(file: &File, timeout: Duration) -> Result<bool, TransportError> {
    let timeout_ms = timeout.as_millis().min(libc::c_int::MAX as u128) as libc::c_int;
    let mut fds = libc::pollfd {
        fd: file.as_raw_fd(),
        events: libc::POLLIN,
        revents: 0,
    };
    loop {
        // SAFETY: `fds` is one valid pollfd that lives across the call.
        let rc = unsafe { libc::poll(&mut fds, 1, timeout_ms) };
        if rc < 0 {
            let err = io::Error::last_os_error();
            if err.kind() == io::ErrorKind::Interrupted {
                continue;
            }
            return Err(TransportError::Poll(err));
        }
        if fds.revents & (libc::POLLERR | libc::POLLNVAL) != 0 {
            return Err(TransportError::Poll(io::Error::other(format!(
                "poll revents {:#x}",
                fds.revents
            ))));
        }
        return Ok(rc > 0);
    }
}

fn read_buffer(file: &File) -> Result<Vec<u8>, TransportError> {
    let mut buf = vec![0u8; MAILBOX_SIZE];
    let n = file.read_at(&mut buf, 0)?;
    buf.truncate(n);
    Ok(buf)
}

fn read_u32(buf: &[u8], offset: usize) -> Option<u32> {
    let bytes = buf.get(offset..offset + 4)?;
    Some(u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Transport;
    use scmi_wire::Status;
    use tempfile::NamedTempFile;

    fn channels() -> (NamedTempFile, NamedTempFile) {
        (NamedTempFile::new().unwrap(), NamedTempFile::new().unwrap())
    }

    /// Answers one command: echoes the params back behind a SUCCESS status.
    fn spawn_platform(message: PathBuf, signal: PathBuf) -> thread::JoinHandle<Vec<u32>> {
        thread::spawn(move || {
            let message = OpenOptions::new().read(true).write(true).open(message).unwrap();
            let signal = OpenOptions::new().read(true).write(true).open(signal).unwrap();
            loop {
                let mut bell = [0u8; 1];
                if signal.read_at(&mut bell, 0).unwrap() == 1 && bell[0] == DOORBELL {
                    break;
                }
                thread::sleep(Duration::from_millis(1));
            }
            let mut buf = vec![0u8; MAILBOX_SIZE];
            message.read_exact_at(&mut buf, 0).unwrap();
            let (header, params) = mailbox::decode_command(&buf).unwrap();
            let response = Response::new(header, Status::Success.as_i32(), params.clone());
            message
                .write_all_at(&mailbox::encode_response(&response).unwrap(), 0)
                .unwrap();
            signal.write_all_at(&[0], 0).unwrap();
            params
        })
    }

    #[test]
    fn command_roundtrip_through_files() {
        let (message, signal) = channels();
        let platform = spawn_platform(message.path().into(), signal.path().into());

        let config = MailboxConfig::new(message.path(), signal.path())
            .with_timeout(Duration::from_secs(5));
        let mut transport = Transport::from(MailboxTransport::open(&config).unwrap());

        let header = Header::command(0x10, 0x01).with_token(5);
        let response = transport.send(header, &[0xAA, 0xBB, 0xCC]).unwrap();

        assert_eq!(platform.join().unwrap(), vec![0xAA, 0xBB, 0xCC]);
        assert_eq!(response.status, 0);
        assert_eq!(response.header.token, 5);
        assert_eq!(response.returns, vec![0xAA, 0xBB, 0xCC]);
        assert_eq!(transport.backend_name(), "mailbox");
    }

    #[test]
    fn silent_platform_times_out() {
        let (message, signal) = channels();
        let config = MailboxConfig::new(message.path(), signal.path())
            .with_timeout(Duration::from_millis(20));
        let mut transport = Transport::from(MailboxTransport::open(&config).unwrap());

        let started = Instant::now();
        let err = transport.send(Header::command(0x10, 0), &[]).unwrap_err();
        assert!(matches!(err, TransportError::PollTimeout { timeout_ms: 20 }));
        assert!(started.elapsed() >= Duration::from_millis(20));

        let mut bell = [0u8; 1];
        signal.as_file().read_at(&mut bell, 0).unwrap();
        assert_eq!(bell[0], DOORBELL);
    }

    #[test]
    fn missing_channel_is_an_open_error() {
        let dir = tempfile::tempdir().unwrap();
        let config = MailboxConfig::new(dir.path().join("nope"), dir.path().join("nada"));
        let err = MailboxTransport::open(&config).unwrap_err();
        assert!(matches!(err, TransportError::Open { .. }));
        assert!(err.to_string().contains("nope"));
    }

    #[test]
    fn notification_channel_is_consumed_once() {
        let (message, signal) = channels();
        let notify = NamedTempFile::new().unwrap();

        let mut header = Header::command(0x11, 0x00);
        header.message_type = MessageType::Notification;
        let staged = mailbox::encode_notification(&header, &[2, 0x7]).unwrap();
        notify.as_file().write_all_at(&staged, 0).unwrap();

        let config = MailboxConfig::new(message.path(), signal.path())
            .with_notification(notify.path())
            .with_timeout(Duration::from_millis(20));
        let mut transport = Transport::from(MailboxTransport::open(&config).unwrap());

        let received = transport.wait_for_notification().unwrap();
        assert_eq!(received.header.message_type, MessageType::Notification);
        assert_eq!(received.status, 0);
        assert_eq!(received.returns, vec![2, 0x7]);

        assert!(matches!(
            transport.wait_for_notification(),
            Err(TransportError::PollTimeout { .. })
        ));
    }

    #[test]
    fn delayed_response_needs_a_channel() {
        let (message, signal) = channels();
        let config = MailboxConfig::new(message.path(), signal.path());
        let mut transport = Transport::from(MailboxTransport::open(&config).unwrap());
        assert!(matches!(
            transport.wait_for_delayed_response(),
            Err(TransportError::NothingPending(MessageType::DelayedResponse))
        ));
    }

    #[cfg(feature = "mock")]
    struct Announce;

    #[cfg(feature = "mock")]
    impl crate::PlatformHandler for Announce {
        fn protocol_id(&self) -> u8 {
            0x11
        }

        fn handle(
            &mut self,
            header: &Header,
            _params: &[u32],
            pending: &mut crate::Pending,
        ) -> Response {
            pending.push_notification(0x11, 0x00, vec![1, 0, 0]);
            Response::status_only(*header, Status::Success.as_i32())
        }
    }

    #[cfg(feature = "mock")]
    #[test]
    fn mailbox_notification_matches_mock() {
        let (message, signal) = channels();
        let notify = NamedTempFile::new().unwrap();

        let mut mock = crate::MockTransport::new();
        mock.register(Announce).unwrap();
        let mut mock = Transport::from(mock);
        mock.send(Header::command(0x11, 0x01), &[]).unwrap();
        let from_mock = mock.wait_for_notification().unwrap();

        let staged = mailbox::encode_response(&from_mock).unwrap();
        notify.as_file().write_all_at(&staged, 0).unwrap();
        let config = MailboxConfig::new(message.path(), signal.path())
            .with_notification(notify.path())
            .with_timeout(Duration::from_millis(20));
        let mut transport = Transport::from(MailboxTransport::open(&config).unwrap());

        let from_mailbox = transport.wait_for_notification().unwrap();
        assert_eq!(from_mailbox, from_mock);
        assert_eq!(from_mailbox.returns, vec![1, 0, 0]);
    }

    #[test]
    fn wrong_kind_is_left_pending() {
        let (message, signal) = channels();
        let notify = NamedTempFile::new().unwrap();

        let mut header = Header::command(0x11, 0x00);
        header.message_type = MessageType::Notification;
        let staged = mailbox::encode_notification(&header, &[3, 0]).unwrap();
        notify.as_file().write_all_at(&staged, 0).unwrap();

        let config = MailboxConfig::new(message.path(), signal.path())
            .with_notification(notify.path())
            .with_timeout(Duration::from_millis(20));
        let mut transport = Transport::from(MailboxTransport::open(&config).unwrap());

        assert!(matches!(
            transport.wait_for_delayed_response(),
            Err(TransportError::UnexpectedMessageType {
                expected: MessageType::DelayedResponse,
                received: MessageType::Notification,
            })
        ));
        let received = transport.wait_for_notification().unwrap();
        assert_eq!(received.returns, vec![3, 0]);
    }
}
