//! Socket wrapper shared by the dispatcher, the car process and the floor
//! collaborator. Decoding happens here, so callers only ever see `UdpMsg`.

//----------------------------------------------Imports
use std::io::ErrorKind;
use std::net::{SocketAddr, UdpSocket};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{debug, warn};

use super::udp::{msg_deserialize, msg_serialize, MessageType, UdpMsg, MAX_DATAGRAM};
use crate::modules::error::{Error, Result};

#[derive(Clone, Debug)]
pub struct UdpHandler {
    socket: Arc<UdpSocket>,
}

/// init_udp_handler
///
/// # Arguments:
///
/// * `bind_addr` - SocketAddr - Address to listen on; port 0 picks a free one.
///
/// # Returns:
///
/// Returns -Result<UdpHandler>- The bound handler.
///
pub fn init_udp_handler(bind_addr: SocketAddr) -> Result<UdpHandler> {
    let socket = UdpSocket::bind(bind_addr)?;
    debug!(addr = %socket.local_addr()?, "udp socket bound");
    Ok(UdpHandler { socket: Arc::new(socket) })
}

impl UdpHandler {
    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.socket.local_addr()?)
    }

    /// receive
    ///
    /// # Arguments:
    ///
    /// * `max_wait` - Option<Duration> - How long to wait; `None` blocks.
    ///
    /// # Returns:
    ///
    /// Returns -Result<Option<(UdpMsg, SocketAddr)>>- `None` on timeout or when the
    /// datagram could not be decoded (that case is logged).
    ///
    pub fn receive(&self, max_wait: Option<Duration>) -> Result<Option<(UdpMsg, SocketAddr)>> {
        self.socket.set_read_timeout(max_wait)?;
        let mut buffer = [0u8; MAX_DATAGRAM];

        let (size, sender) = match self.socket.recv_from(&mut buffer) {
            Ok(received) => received,
            Err(e) if e.kind() == ErrorKind::WouldBlock || e.kind() == ErrorKind::TimedOut => {
                return Ok(None);
            }
            Err(e) => return Err(e.into()),
        };

        match msg_deserialize(&buffer[..size]) {
            Ok(msg) => {
                debug!(from = %sender, size, message_type = ?msg.message_type(), "received");
                Ok(Some((msg, sender)))
            }
            Err(e) => {
                warn!(from = %sender, size, error = %e, "dropping undecodable datagram");
                Ok(None)
            }
        }
    }

    /// Sends one message.
    pub fn send(&self, target: SocketAddr, msg: &UdpMsg) -> Result<()> {
        let data = msg_serialize(msg);
        self.socket.send_to(&data, target)?;
        debug!(to = %target, message_type = ?msg.message_type(), "sent");
        Ok(())
    }

    /// request_reply
    /// Sends `msg` and waits for the first reply of the expected type from `target`.
    /// Anything else arriving meanwhile is dropped.
    ///
    /// # Arguments:
    ///
    /// * `target` - SocketAddr - Peer to ask.
    /// * `msg` - &UdpMsg - Question.
    /// * `expected` - MessageType - Kind of answer wanted.
    /// * `max_wait` - Duration - Overall deadline.
    ///
    /// # Returns:
    ///
    /// Returns -Result<UdpMsg>- The reply, or `Error::StatusTimeout`.
    ///
    pub fn request_reply(&self, target: SocketAddr, msg: &UdpMsg, expected: MessageType, max_wait: Duration) -> Result<UdpMsg> {
        self.send(target, msg)?;
        let deadline = Instant::now() + max_wait;

        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Err(Error::StatusTimeout(max_wait.as_millis() as u64));
            }
            if let Some((reply, sender)) = self.receive(Some(remaining))? {
                if sender == target && reply.message_type() == expected {
                    return Ok(reply);
                }
                debug!(from = %sender, message_type = ?reply.message_type(), "ignoring unexpected reply");
            }
        }
    }
}

//----------------------------------TESTS-------------------------------------------------------------
