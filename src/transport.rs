//! Transport collaborator contract
//!
//! The hub that owns the physical serial line is reached through an opaque
//! request/response collaborator. This crate never speaks HTTP itself; it
//! only formats the query strings and interprets the returned bytes.
//!
//! Query semantics the implementation must preserve exactly:
//!
//! | Query | Meaning |
//! |-------|---------|
//! | `rxdata.bin?pos=&len=` | read up to `len` bytes from absolute `pos` |
//! | `rxcnt.bin?pos=` | count bytes buffered from `pos` onward |
//! | `rxmsg.json?pos=&len=&maxw=&pat=` | wait up to `maxw` ms for messages matching `pat` |
//! | `rxmsg.json?cmd=...&pat=...` | atomically send a command, then wait for matching replies |
//!
//! `send_command` is the fire-and-forget path used by non-query writes.
//!
//! Only one exchange may be in flight per port: the reply-matching window is
//! keyed by stream position and pattern alone, with no per-request
//! correlation id, so concurrent callers must be serialized above this
//! trait.

use bytes::Bytes;

use crate::error::SerialResult;

/// Request/response collaborator for a polled serial hub.
pub trait PolledTransport: Send {
    /// Perform a read-style request and return the raw reply bytes.
    fn download(
        &mut self,
        query: &str,
    ) -> impl std::future::Future<Output = SerialResult<Bytes>> + Send;

    /// Issue a device command without waiting for any reply.
    fn send_command(
        &mut self,
        text: &str,
    ) -> impl std::future::Future<Output = SerialResult<()>> + Send;

    /// Transfer counters for this transport.
    fn stats(&self) -> TransportStats {
        TransportStats::default()
    }
}

/// Transfer counters kept by a transport implementation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TransportStats {
    /// Read-style requests issued.
    pub requests_sent: u64,
    /// Replies received (any content, including empty message lists).
    pub replies_received: u64,
    /// Fire-and-forget commands issued.
    pub commands_sent: u64,
    /// Total payload bytes received.
    pub bytes_received: u64,
}

impl TransportStats {
    /// Record a completed read-style exchange.
    pub fn record_exchange(&mut self, reply_bytes: usize) {
        self.requests_sent += 1;
        self.replies_received += 1;
        self.bytes_received += reply_bytes as u64;
    }

    /// Record a fire-and-forget command.
    pub fn record_command(&mut self) {
        self.commands_sent += 1;
    }
}
