// edgert: Channel layer
// Named framed message transport over POSIX message queues. A server creates
// the kernel object, clients attach; message boundaries are preserved and
// every in-band message carries a {type, size} header stamped here and only
// here.

use crate::error::{RtError, RtResult};
use crate::platform::unsafe_ops;
use std::ffi::CString;
use tracing::{debug, info, warn};

/// Type tag carried by all messages sent through a user channel.
pub const CHANNEL_MSG_TYPE: u32 = 10;

/// Type tag for acknowledgement replies.
pub const REPLY_OK: u32 = 20;

/// Maximum payload per message, excluding the header.
pub const MAX_PAYLOAD: usize = 8192;

/// Bounded queue depth of the underlying transport.
pub const QUEUE_DEPTH: i64 = 10;

const HEADER_SIZE: usize = 8;
const MAX_MSG_SIZE: usize = HEADER_SIZE + MAX_PAYLOAD;

/// Wire header prepended to every message: `type: u32, size: u32` in host
/// byte order. The transport is intra-host or between identical hosts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct MsgHeader {
    pub msg_type: u32,
    pub size: u32,
}

impl MsgHeader {
    fn encode(self, dst: &mut [u8]) {
        dst[0..4].copy_from_slice(&self.msg_type.to_ne_bytes());
        dst[4..8].copy_from_slice(&self.size.to_ne_bytes());
    }

    fn decode(src: &[u8]) -> Self {
        Self {
            msg_type: u32::from_ne_bytes([src[0], src[1], src[2], src[3]]),
            size: u32::from_ne_bytes([src[4], src[5], src[6], src[7]]),
        }
    }
}

/// Which side of the channel this endpoint is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelRole {
    /// Creates and owns the transport lifetime
    Server,
    /// Attaches to an existing transport
    Client,
}

/// Channel lifecycle states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelState {
    /// Open and usable
    Ready,
    /// Transport error observed; only `cleanup` is accepted
    Broken,
    /// Endpoints released
    Closed,
}

/// A named unidirectional message channel.
///
/// A channel named `X` binds to the kernel-visible object `/X_mq`. Exactly
/// one server creates it (clearing any stale remnant); one or more clients
/// connect. By default one sender and one receiver per channel; operations
/// take `&mut self` and the handle may be moved to whichever thread owns it.
pub struct Channel {
    name: String,
    mq_name: CString,
    mq_send: Option<libc::mqd_t>,
    mq_recv: Option<libc::mqd_t>,
    scratch: Box<[u8]>,
    role: ChannelRole,
    state: ChannelState,
    nonblocking: bool,
}

impl Channel {
    /// Reserve the transport under the derived kernel name and open the
    /// receive endpoint. On success the channel is ready in server role.
    pub fn create(name: &str) -> RtResult<Channel> {
        let mq_name = derive_mq_name(name)?;
        let mqd = unsafe_ops::mq_create_read(&mq_name, QUEUE_DEPTH, MAX_MSG_SIZE as i64)
            .map_err(|e| RtError::BrokenChannel(format!("create {}: {}", name, e)))?;
        info!(channel = name, "created message queue channel");
        Ok(Channel {
            name: name.to_string(),
            mq_name,
            mq_send: None,
            mq_recv: Some(mqd),
            scratch: vec![0u8; MAX_MSG_SIZE].into_boxed_slice(),
            role: ChannelRole::Server,
            state: ChannelState::Ready,
            nonblocking: false,
        })
    }

    /// Attach to an existing server-created transport of that name and open
    /// the send endpoint.
    pub fn connect(name: &str) -> RtResult<Channel> {
        let mq_name = derive_mq_name(name)?;
        let mqd = unsafe_ops::mq_open_write(&mq_name).map_err(|e| {
            if e.raw_os_error() == Some(libc::ENOENT) {
                RtError::NotFound(format!("channel {}", name))
            } else {
                RtError::BrokenChannel(format!("connect {}: {}", name, e))
            }
        })?;
        info!(channel = name, "connected to channel");
        Ok(Channel {
            name: name.to_string(),
            mq_name,
            mq_send: Some(mqd),
            mq_recv: None,
            scratch: vec![0u8; MAX_MSG_SIZE].into_boxed_slice(),
            role: ChannelRole::Client,
            state: ChannelState::Ready,
            nonblocking: false,
        })
    }

    /// Switch the channel between blocking (default) and non-blocking mode.
    pub fn set_nonblocking(&mut self, nonblocking: bool) -> RtResult<()> {
        let mqd = self
            .active_mqd()
            .ok_or_else(|| RtError::BrokenChannel(format!("channel {} not ready", self.name)))?;
        unsafe_ops::mq_set_nonblocking(mqd, nonblocking)
            .map_err(|e| RtError::BrokenChannel(format!("set_nonblocking {}: {}", self.name, e)))?;
        self.nonblocking = nonblocking;
        Ok(())
    }

    /// Stamp the in-band header and enqueue `payload` as a single atomic
    /// message (client side).
    pub fn send(&mut self, payload: &[u8]) -> RtResult<()> {
        if self.state != ChannelState::Ready {
            return Err(RtError::BrokenChannel(format!(
                "channel {} not ready",
                self.name
            )));
        }
        if payload.len() > MAX_PAYLOAD {
            return Err(RtError::TooLarge {
                len: payload.len(),
                max: MAX_PAYLOAD,
            });
        }
        let mqd = self.mq_send.ok_or_else(|| {
            RtError::BrokenChannel(format!("channel {} has no send endpoint", self.name))
        })?;

        MsgHeader {
            msg_type: CHANNEL_MSG_TYPE,
            size: payload.len() as u32,
        }
        .encode(&mut self.scratch[..HEADER_SIZE]);
        self.scratch[HEADER_SIZE..HEADER_SIZE + payload.len()].copy_from_slice(payload);

        match unsafe_ops::mq_send(mqd, &self.scratch[..HEADER_SIZE + payload.len()]) {
            Ok(()) => Ok(()),
            Err(e) if e.raw_os_error() == Some(libc::EAGAIN) => Err(RtError::WouldBlock),
            Err(e) => {
                self.state = ChannelState::Broken;
                warn!(channel = %self.name, error = %e, "send failed, channel broken");
                Err(RtError::BrokenChannel(format!("send {}: {}", self.name, e)))
            }
        }
    }

    /// Receive one whole in-band message, copying at most `dst.len()` bytes
    /// of payload into `dst` and returning the copied length (server side).
    ///
    /// Blocks until a message arrives unless the channel is in non-blocking
    /// mode, in which case an empty queue yields `WouldBlock`. Messages whose
    /// leading type is not [`CHANNEL_MSG_TYPE`] are dropped as foreign
    /// traffic.
    pub fn receive(&mut self, dst: &mut [u8]) -> RtResult<usize> {
        if self.state != ChannelState::Ready {
            return Err(RtError::BrokenChannel(format!(
                "channel {} not ready",
                self.name
            )));
        }
        let mqd = self.mq_recv.ok_or_else(|| {
            RtError::BrokenChannel(format!("channel {} has no receive endpoint", self.name))
        })?;

        loop {
            let n = match unsafe_ops::mq_receive(mqd, &mut self.scratch) {
                Ok(n) => n,
                Err(e) if e.raw_os_error() == Some(libc::EAGAIN) => {
                    return Err(RtError::WouldBlock)
                }
                Err(e) if e.raw_os_error() == Some(libc::EINTR) => continue,
                Err(e) => {
                    self.state = ChannelState::Broken;
                    warn!(channel = %self.name, error = %e, "receive failed, channel broken");
                    return Err(RtError::BrokenChannel(format!(
                        "receive {}: {}",
                        self.name, e
                    )));
                }
            };

            if n < HEADER_SIZE {
                warn!(channel = %self.name, len = n, "dropping undersized message");
                continue;
            }
            let header = MsgHeader::decode(&self.scratch[..HEADER_SIZE]);
            if header.msg_type != CHANNEL_MSG_TYPE {
                warn!(
                    channel = %self.name,
                    msg_type = header.msg_type,
                    "dropping foreign-typed message"
                );
                continue;
            }

            let payload_len = (header.size as usize).min(n - HEADER_SIZE);
            let copied = payload_len.min(dst.len());
            dst[..copied].copy_from_slice(&self.scratch[HEADER_SIZE..HEADER_SIZE + copied]);
            return Ok(copied);
        }
    }

    /// Close the endpoints this role owns and, iff server, unlink the kernel
    /// object. Idempotent: a second call on a closed channel is a no-op.
    pub fn cleanup(&mut self) {
        if self.state == ChannelState::Closed {
            return;
        }
        if let Some(mqd) = self.mq_send.take() {
            unsafe_ops::mq_close(mqd);
        }
        if let Some(mqd) = self.mq_recv.take() {
            unsafe_ops::mq_close(mqd);
        }
        if self.role == ChannelRole::Server {
            unsafe_ops::mq_unlink(&self.mq_name);
        }
        self.state = ChannelState::Closed;
        debug!(channel = %self.name, role = ?self.role, "channel cleaned up");
    }

    /// True between successful create/connect and cleanup; `false` implies
    /// all send/receive operations fail fast.
    #[inline(always)]
    pub fn is_ready(&self) -> bool {
        self.state == ChannelState::Ready
    }

    pub fn state(&self) -> ChannelState {
        self.state
    }

    pub fn role(&self) -> ChannelRole {
        self.role
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    fn active_mqd(&self) -> Option<libc::mqd_t> {
        self.mq_recv.or(self.mq_send)
    }
}

impl Drop for Channel {
    fn drop(&mut self) {
        self.cleanup();
    }
}

/// A channel named `X` binds to the kernel-visible name `/X_mq`.
fn derive_mq_name(name: &str) -> RtResult<CString> {
    if name.is_empty() || name.contains('/') {
        return Err(RtError::InvalidConfig(format!(
            "invalid channel name {:?}",
            name
        )));
    }
    CString::new(format!("/{}_mq", name))
        .map_err(|_| RtError::InvalidConfig(format!("invalid channel name {:?}", name)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_header_roundtrip() {
        let mut buf = [0u8; HEADER_SIZE];
        let hdr = MsgHeader {
            msg_type: CHANNEL_MSG_TYPE,
            size: 512,
        };
        hdr.encode(&mut buf);
        assert_eq!(MsgHeader::decode(&buf), hdr);
    }

    #[test]
    fn test_mq_name_mapping() {
        let name = derive_mq_name("BrakeFL").unwrap();
        assert_eq!(name.to_str().unwrap(), "/BrakeFL_mq");
        assert!(derive_mq_name("").is_err());
        assert!(derive_mq_name("a/b").is_err());
    }

    #[test]
    fn test_reply_type_is_distinct() {
        assert_ne!(CHANNEL_MSG_TYPE, REPLY_OK);
    }
}
