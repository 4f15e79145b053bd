//! The serial port driver object
//!
//! [`SerialPort`] wraps a [`PolledTransport`] and owns the one piece of
//! shared mutable state the protocol has: the absolute stream cursor. All
//! methods take `&mut self`, which serializes callers: the reply-matching
//! window is keyed only by stream position and pattern, so only one exchange
//! may be in flight per port.
//!
//! # Cancellation
//!
//! The cursor is written strictly after a reply frame has parsed. Dropping
//! an in-flight future therefore leaves the cursor at its pre-call value,
//! never at an intermediate one.
//!
//! # Quick start
//!
//! ```rust,no_run
//! use polled_serial::{PolledTransport, SerialPort, SerialResult};
//!
//! async fn example<T: PolledTransport>(transport: T) -> SerialResult<()> {
//!     let mut port = SerialPort::new(transport);
//!
//!     // Read 10 holding registers from slave 1, starting at address 0
//!     let registers = port.modbus_read_registers(1, 0, 10).await?;
//!     println!("registers: {:?}", registers);
//!
//!     // Write a value to register 100
//!     port.modbus_write_register(1, 100, 0x1234).await?;
//!     Ok(())
//! }
//! ```

use bytes::Bytes;
use serde_json::Value;
use tracing::trace;

use crate::codec::{self, ModbusCodec};
use crate::constants::{
    FC_READ_COILS, FC_READ_DISCRETE_INPUTS, FC_READ_HOLDING_REGISTERS, FC_READ_INPUT_REGISTERS,
    MAX_READ_LEN,
};
use crate::cursor::StreamCursor;
use crate::error::{SerialError, SerialResult};
use crate::frame::{self, Protocol};
use crate::logging::CallbackLogger;
use crate::pattern::MessagePattern;
use crate::pdu::{ModbusPdu, PduBuilder};
use crate::transport::{PolledTransport, TransportStats};

/// Command payloads longer than this need the hub's file-upload channel,
/// which this driver does not provide.
const MAX_INLINE_COMMAND: usize = 100;

/// Driver for one serial port behind a polled hub.
pub struct SerialPort<T: PolledTransport> {
    transport: T,
    cursor: StreamCursor,
    protocol: Protocol,
    logger: Option<CallbackLogger>,
}

impl<T: PolledTransport> SerialPort<T> {
    /// Create a driver over the given transport.
    ///
    /// The framing protocol defaults to [`Protocol::Byte`]; configure it
    /// with [`SerialPort::with_protocol`] to match the device setting.
    pub fn new(transport: T) -> Self {
        Self {
            transport,
            cursor: StreamCursor::new(),
            protocol: Protocol::Byte,
            logger: None,
        }
    }

    /// Set the device's configured framing protocol.
    pub fn with_protocol(mut self, protocol: Protocol) -> Self {
        self.protocol = protocol;
        self
    }

    /// Attach an exchange logger.
    pub fn with_logger(mut self, logger: CallbackLogger) -> Self {
        self.logger = Some(logger);
        self
    }

    /// The configured framing protocol.
    pub fn protocol(&self) -> Protocol {
        self.protocol
    }

    /// Borrow the underlying transport.
    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Mutably borrow the underlying transport.
    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    /// Transfer counters from the underlying transport.
    pub fn stats(&self) -> TransportStats {
        self.transport.stats()
    }

    // ========================================================================
    // Raw stream reads
    // ========================================================================

    /// Fetch a framed window of the receive stream and adopt the new cursor.
    async fn fetch_frame(&mut self, max_len: usize) -> SerialResult<Bytes> {
        let len = max_len.min(MAX_READ_LEN);
        let query = format!("rxdata.bin?pos={}&len={}", self.cursor.position(), len);
        let raw = self.transport.download(&query).await?;
        let framed = frame::parse_framed(&raw)?;
        self.cursor.seek(framed.new_position);
        trace!(
            "read {} bytes, cursor now {}",
            framed.payload.len(),
            framed.new_position
        );
        Ok(framed.payload)
    }

    /// Read the next byte from the receive buffer.
    ///
    /// Returns `None` when no data is buffered at the current position (or
    /// the data there has already been overwritten on the device).
    pub async fn read_byte(&mut self) -> SerialResult<Option<u8>> {
        let payload = self.fetch_frame(1).await?;
        Ok(payload.first().copied())
    }

    /// Read up to `max_len` bytes from the current position.
    ///
    /// Returns fewer bytes than requested when that is all the device has
    /// buffered (a short read, not an error).
    pub async fn read_bin(&mut self, max_len: usize) -> SerialResult<Bytes> {
        self.fetch_frame(max_len).await
    }

    /// Read up to `max_len` bytes as text.
    pub async fn read_str(&mut self, max_len: usize) -> SerialResult<String> {
        let payload = self.fetch_frame(max_len).await?;
        Ok(String::from_utf8_lossy(&payload).into_owned())
    }

    /// Read up to `max_len` bytes as a lowercase hexadecimal string.
    pub async fn read_hex(&mut self, max_len: usize) -> SerialResult<String> {
        let payload = self.fetch_frame(max_len).await?;
        Ok(codec::encode_hex(&payload))
    }

    /// Move the cursor to an absolute position without any I/O.
    pub fn read_seek(&mut self, position: u64) {
        self.cursor.seek(position);
    }

    /// The current absolute stream position.
    pub fn read_tell(&self) -> u64 {
        self.cursor.position()
    }

    /// Count the bytes buffered from the current position onward, without
    /// consuming them or moving the cursor.
    pub async fn read_avail(&mut self) -> SerialResult<u64> {
        let query = format!("rxcnt.bin?pos={}", self.cursor.position());
        let raw = self.transport.download(&query).await?;
        frame::parse_avail(&raw)
    }

    // ========================================================================
    // Message-oriented reads
    // ========================================================================

    /// Read the next complete message, if one is buffered.
    ///
    /// Intended for message-segmenting protocols (Line, Frame, MODBUS).
    /// Returns an empty string when no new full message has arrived.
    pub async fn read_line(&mut self) -> SerialResult<String> {
        let query = format!(
            "rxmsg.json?pos={}&len=1&maxw=1",
            self.cursor.position()
        );
        let raw = self.transport.download(&query).await?;
        let (mut messages, position) = parse_message_array(&raw)?;
        if let Some(position) = position {
            self.cursor.seek(position);
        }
        Ok(if messages.is_empty() {
            String::new()
        } else {
            messages.swap_remove(0)
        })
    }

    /// Search the receive buffer for messages matching a glob pattern.
    ///
    /// The pattern is applied to the printable (or hex) form of each
    /// message; an empty pattern matches everything. When nothing matches
    /// immediately, the device waits up to `max_wait_ms` for a message to
    /// arrive; an elapsed wait returns an empty list, not an error.
    pub async fn read_messages(
        &mut self,
        pattern: &str,
        max_wait_ms: u64,
    ) -> SerialResult<Vec<String>> {
        let query = format!(
            "rxmsg.json?pos={}&maxw={}&pat={}",
            self.cursor.position(),
            max_wait_ms,
            pattern
        );
        let raw = self.transport.download(&query).await?;
        let (messages, position) = parse_message_array(&raw)?;
        if let Some(position) = position {
            self.cursor.seek(position);
        }
        Ok(messages)
    }

    /// Send a line query and wait for exactly one reply line.
    ///
    /// The command is sent and the wait started atomically on the device,
    /// so only messages arriving *after* the command are considered;
    /// historical buffered data is never returned. An elapsed wait returns
    /// an empty string.
    pub async fn query_line(&mut self, query: &str, max_wait_ms: u64) -> SerialResult<String> {
        if let Some(logger) = &self.logger {
            logger.log_command(query);
        }
        let url = format!("rxmsg.json?len=1&maxw={}&cmd=!{}", max_wait_ms, query);
        let raw = self.transport.download(&url).await?;
        let (mut messages, position) = parse_message_array(&raw)?;
        if let Some(position) = position {
            self.cursor.seek(position);
        }
        Ok(if messages.is_empty() {
            String::new()
        } else {
            messages.swap_remove(0)
        })
    }

    // ========================================================================
    // MODBUS master
    // ========================================================================

    /// Send a raw PDU to a slave and return the decoded reply PDU.
    ///
    /// The first PDU byte is the function code (7-bit; the exception bit is
    /// set only by slaves). On success the returned bytes are the complete
    /// reply PDU, echoed function code first. Exception replies surface as
    /// [`SerialError::Exception`]; a missed reply window as
    /// [`SerialError::NoReply`].
    pub async fn query_modbus(&mut self, slave: u8, pdu: &[u8]) -> SerialResult<Vec<u8>> {
        let Some(&function) = pdu.first() else {
            return Err(SerialError::invalid_data("empty PDU"));
        };
        if function & 0x80 != 0 {
            return Err(SerialError::invalid_data(format!(
                "function code {:#04x} has the exception bit set",
                function
            )));
        }
        let pdu = ModbusPdu::from_slice(pdu)?;
        self.execute_modbus(slave, &pdu).await
    }

    /// Run one command/reply exchange for an already-built PDU.
    ///
    /// The exchange is position-independent (`cmd=`/`pat=` only), so the
    /// raw-stream cursor is left untouched.
    async fn execute_modbus(&mut self, slave: u8, pdu: &ModbusPdu) -> SerialResult<Vec<u8>> {
        let function = pdu
            .function_code()
            .ok_or_else(|| SerialError::invalid_data("empty PDU"))?;
        let command = ModbusCodec::command_string(slave, pdu);
        let pattern = MessagePattern::modbus(slave, function);
        if let Some(logger) = &self.logger {
            logger.log_command(&command);
        }
        let url = format!("rxmsg.json?cmd=:{}&pat=:{}", command, pattern);
        let raw = self.transport.download(&url).await?;
        let (messages, _position) = parse_message_array(&raw)?;
        let Some(first) = messages.first() else {
            return Err(SerialError::NoReply);
        };
        if let Some(logger) = &self.logger {
            logger.log_reply(first);
        }
        let decoded = ModbusCodec::decode_reply(first, function);
        if let (Err(err), Some(logger)) = (&decoded, &self.logger) {
            logger.log_fault(&err.to_string());
        }
        decoded
    }

    /// Read coils (function code 0x01).
    ///
    /// `addr` is the zero-based PDU address of the first coil.
    pub async fn modbus_read_bits(
        &mut self,
        slave: u8,
        addr: u16,
        count: u16,
    ) -> SerialResult<Vec<bool>> {
        let pdu = PduBuilder::read_request(FC_READ_COILS, addr, count)?;
        let reply = self.execute_modbus(slave, &pdu).await?;
        ModbusCodec::decode_read_bits(&reply, count as usize)
    }

    /// Read discrete inputs (function code 0x02).
    pub async fn modbus_read_input_bits(
        &mut self,
        slave: u8,
        addr: u16,
        count: u16,
    ) -> SerialResult<Vec<bool>> {
        let pdu = PduBuilder::read_request(FC_READ_DISCRETE_INPUTS, addr, count)?;
        let reply = self.execute_modbus(slave, &pdu).await?;
        ModbusCodec::decode_read_bits(&reply, count as usize)
    }

    /// Read holding registers (function code 0x03).
    pub async fn modbus_read_registers(
        &mut self,
        slave: u8,
        addr: u16,
        count: u16,
    ) -> SerialResult<Vec<u16>> {
        let pdu = PduBuilder::read_request(FC_READ_HOLDING_REGISTERS, addr, count)?;
        let reply = self.execute_modbus(slave, &pdu).await?;
        ModbusCodec::decode_read_registers(&reply, count as usize)
    }

    /// Read input registers (function code 0x04).
    pub async fn modbus_read_input_registers(
        &mut self,
        slave: u8,
        addr: u16,
        count: u16,
    ) -> SerialResult<Vec<u16>> {
        let pdu = PduBuilder::read_request(FC_READ_INPUT_REGISTERS, addr, count)?;
        let reply = self.execute_modbus(slave, &pdu).await?;
        ModbusCodec::decode_read_registers(&reply, count as usize)
    }

    /// Write a single coil (function code 0x05).
    ///
    /// Returns the number of coils affected (1).
    pub async fn modbus_write_bit(
        &mut self,
        slave: u8,
        addr: u16,
        value: bool,
    ) -> SerialResult<u16> {
        let pdu = PduBuilder::write_single_coil(addr, value)?;
        let reply = self.execute_modbus(slave, &pdu).await?;
        ModbusCodec::decode_write_echo(&reply)
    }

    /// Write a single holding register (function code 0x06).
    ///
    /// Returns the number of registers affected (1).
    pub async fn modbus_write_register(
        &mut self,
        slave: u8,
        addr: u16,
        value: u16,
    ) -> SerialResult<u16> {
        let pdu = PduBuilder::write_single_register(addr, value)?;
        let reply = self.execute_modbus(slave, &pdu).await?;
        ModbusCodec::decode_write_echo(&reply)
    }

    /// Write multiple coils (function code 0x0F).
    ///
    /// Returns the number of coils the device reports having written.
    /// Vectors longer than 65535 are clamped, not rejected.
    pub async fn modbus_write_bits(
        &mut self,
        slave: u8,
        addr: u16,
        bits: &[bool],
    ) -> SerialResult<u16> {
        let bits = &bits[..bits.len().min(MAX_READ_LEN)];
        let pdu = PduBuilder::write_multiple_coils(addr, bits)?;
        let reply = self.execute_modbus(slave, &pdu).await?;
        ModbusCodec::decode_write_count(&reply)
    }

    /// Write multiple holding registers (function code 0x10).
    ///
    /// Returns the number of registers the device reports having written.
    pub async fn modbus_write_registers(
        &mut self,
        slave: u8,
        addr: u16,
        values: &[u16],
    ) -> SerialResult<u16> {
        let values = &values[..values.len().min(MAX_READ_LEN)];
        let pdu = PduBuilder::write_multiple_registers(addr, values)?;
        let reply = self.execute_modbus(slave, &pdu).await?;
        ModbusCodec::decode_write_count(&reply)
    }

    /// Write then read holding registers in one exchange (function code
    /// 0x17).
    ///
    /// The write is performed before the read on the device. Returns the
    /// registers read from `read_addr`.
    pub async fn modbus_write_and_read_registers(
        &mut self,
        slave: u8,
        write_addr: u16,
        values: &[u16],
        read_addr: u16,
        read_count: u16,
    ) -> SerialResult<Vec<u16>> {
        let pdu = PduBuilder::read_write_registers(read_addr, read_count, write_addr, values)?;
        let reply = self.execute_modbus(slave, &pdu).await?;
        ModbusCodec::decode_read_registers(&reply, read_count as usize)
    }

    // ========================================================================
    // Transmit side (fire-and-forget commands)
    // ========================================================================

    async fn command(&mut self, text: &str) -> SerialResult<()> {
        if let Some(logger) = &self.logger {
            logger.log_command(text);
        }
        self.transport.send_command(text).await
    }

    /// Send a single byte.
    pub async fn write_byte(&mut self, code: u8) -> SerialResult<()> {
        self.command(&format!("${:02x}", code)).await
    }

    /// Send an ASCII string, as is.
    ///
    /// Only short printable strings fit the inline command channel; anything
    /// else would need the hub's file-upload path and is rejected as
    /// unsupported.
    pub async fn write_str(&mut self, text: &str) -> SerialResult<()> {
        ensure_inline_text(text)?;
        self.command(&format!("+{}", text)).await
    }

    /// Send an ASCII string followed by CR LF.
    pub async fn write_line(&mut self, text: &str) -> SerialResult<()> {
        ensure_inline_text(text)?;
        self.command(&format!("!{}", text)).await
    }

    /// Send a byte sequence given as a hexadecimal string.
    pub async fn write_hex(&mut self, hex: &str) -> SerialResult<()> {
        if hex.len() >= MAX_INLINE_COMMAND {
            return Err(SerialError::unsupported(
                "hex payload too long for the inline command channel",
            ));
        }
        codec::decode_hex(hex)?;
        self.command(&format!("${}", hex)).await
    }

    /// Send a MODBUS message (hex, slave address first) without waiting for
    /// a reply. The hub appends the CRC/LRC itself.
    pub async fn write_modbus_hex(&mut self, hex: &str) -> SerialResult<()> {
        codec::decode_hex(hex)?;
        self.command(&format!(":{}", hex)).await
    }

    /// Clear the device buffers, reset its counters and rewind the cursor.
    pub async fn reset(&mut self) -> SerialResult<()> {
        self.cursor.seek(0);
        self.command("Z").await
    }

    /// Manually drive the RTS line.
    ///
    /// Has no effect while hardware handshake is enabled.
    pub async fn set_rts(&mut self, on: bool) -> SerialResult<()> {
        self.command(if on { "R1" } else { "R0" }).await
    }

    /// Read the level of the CTS line.
    pub async fn get_cts(&mut self) -> SerialResult<bool> {
        let raw = self.transport.download("cts.txt").await?;
        match &raw[..] {
            b"0" => Ok(false),
            b"1" => Ok(true),
            other => Err(SerialError::protocol(format!(
                "invalid CTS reply: {:?}",
                other
            ))),
        }
    }
}

/// Reject text that cannot travel on the inline command channel.
fn ensure_inline_text(text: &str) -> SerialResult<()> {
    if text.len() >= MAX_INLINE_COMMAND {
        return Err(SerialError::unsupported(
            "payload too long for the inline command channel",
        ));
    }
    if !text.bytes().all(|b| (0x20..0x7F).contains(&b)) {
        return Err(SerialError::unsupported(
            "non-printable payload needs the upload channel",
        ));
    }
    Ok(())
}

/// Parse a `rxmsg.json` reply.
///
/// The body is a JSON array whose last element is the updated absolute
/// position (a number or numeric string); the elements before it are the
/// matched messages. The position element is never part of the message
/// list.
fn parse_message_array(raw: &[u8]) -> SerialResult<(Vec<String>, Option<u64>)> {
    if raw.is_empty() {
        return Ok((Vec::new(), None));
    }
    let value: Value = serde_json::from_slice(raw)
        .map_err(|err| SerialError::protocol(format!("invalid message array: {}", err)))?;
    let Value::Array(mut items) = value else {
        return Err(SerialError::protocol("message reply is not an array"));
    };
    let Some(last) = items.pop() else {
        return Ok((Vec::new(), None));
    };
    let position = match &last {
        Value::Number(n) => n.as_u64(),
        Value::String(s) => s.parse().ok(),
        _ => None,
    }
    .ok_or_else(|| SerialError::protocol("missing position in message reply"))?;
    let mut messages = Vec::with_capacity(items.len());
    for item in items {
        match item {
            Value::String(s) => messages.push(s),
            other => {
                return Err(SerialError::protocol(format!(
                    "non-string message element: {}",
                    other
                )))
            }
        }
    }
    Ok((messages, Some(position)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ModbusException;
    use std::collections::VecDeque;

    /// Scripted transport: replays queued replies and records traffic.
    struct MockTransport {
        queries: Vec<String>,
        commands: Vec<String>,
        replies: VecDeque<SerialResult<Bytes>>,
        stats: TransportStats,
    }

    impl MockTransport {
        fn new() -> Self {
            Self {
                queries: Vec::new(),
                commands: Vec::new(),
                replies: VecDeque::new(),
                stats: TransportStats::default(),
            }
        }

        fn reply(mut self, raw: &[u8]) -> Self {
            self.replies.push_back(Ok(Bytes::copy_from_slice(raw)));
            self
        }
    }

    impl PolledTransport for MockTransport {
        fn download(
            &mut self,
            query: &str,
        ) -> impl std::future::Future<Output = SerialResult<Bytes>> + Send {
            self.queries.push(query.to_string());
            let reply = self
                .replies
                .pop_front()
                .unwrap_or_else(|| Err(SerialError::transport("no scripted reply")));
            if let Ok(bytes) = &reply {
                self.stats.record_exchange(bytes.len());
            }
            async move { reply }
        }

        fn send_command(
            &mut self,
            text: &str,
        ) -> impl std::future::Future<Output = SerialResult<()>> + Send {
            self.commands.push(text.to_string());
            self.stats.record_command();
            async { Ok(()) }
        }

        fn stats(&self) -> TransportStats {
            self.stats
        }
    }

    #[tokio::test]
    async fn test_read_bin_adopts_device_position() {
        let mock = MockTransport::new().reply(b"ABC@4");
        let mut port = SerialPort::new(mock);

        let payload = port.read_bin(3).await.unwrap();
        assert_eq!(&payload[..], b"ABC");
        assert_eq!(port.read_tell(), 4);
        assert_eq!(port.transport().queries, vec!["rxdata.bin?pos=0&len=3"]);
    }

    #[tokio::test]
    async fn test_short_read_trusts_position_jump() {
        // Device reports position 20 although only 2 bytes came back:
        // the buffer wrapped and data was dropped.
        let mock = MockTransport::new().reply(b"AB@20");
        let mut port = SerialPort::new(mock);

        let payload = port.read_bin(10).await.unwrap();
        assert_eq!(payload.len(), 2);
        assert_eq!(port.read_tell(), 20);
    }

    #[tokio::test]
    async fn test_read_len_clamped_to_protocol_maximum() {
        let mock = MockTransport::new().reply(b"@0");
        let mut port = SerialPort::new(mock);

        port.read_bin(1_000_000).await.unwrap();
        assert_eq!(port.transport().queries, vec!["rxdata.bin?pos=0&len=65535"]);
    }

    #[tokio::test]
    async fn test_read_byte() {
        let mock = MockTransport::new().reply(b"x@6").reply(b"@6");
        let mut port = SerialPort::new(mock);

        assert_eq!(port.read_byte().await.unwrap(), Some(b'x'));
        assert_eq!(port.read_tell(), 6);
        // Nothing buffered: short read with empty payload.
        assert_eq!(port.read_byte().await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_malformed_frame_leaves_cursor_untouched() {
        let mock = MockTransport::new().reply(b"1234");
        let mut port = SerialPort::new(mock);
        port.read_seek(7);

        assert!(port.read_bin(4).await.is_err());
        assert_eq!(port.read_tell(), 7);
    }

    #[tokio::test]
    async fn test_read_str_and_hex() {
        let mock = MockTransport::new().reply(b"hello@11").reply(b"\x01\xff@13");
        let mut port = SerialPort::new(mock);

        assert_eq!(port.read_str(5).await.unwrap(), "hello");
        assert_eq!(port.read_hex(2).await.unwrap(), "01ff");
        assert_eq!(port.read_tell(), 13);
    }

    #[tokio::test]
    async fn test_read_avail_does_not_move_cursor() {
        let mock = MockTransport::new().reply(b"42@100");
        let mut port = SerialPort::new(mock);
        port.read_seek(58);

        assert_eq!(port.read_avail().await.unwrap(), 42);
        assert_eq!(port.read_tell(), 58);
        assert_eq!(port.transport().queries, vec!["rxcnt.bin?pos=58"]);
    }

    #[tokio::test]
    async fn test_read_messages_empty_is_not_an_error() {
        // Zero wait, zero new messages: only the position comes back.
        let mock = MockTransport::new().reply(b"[120]");
        let mut port = SerialPort::new(mock);

        let messages = port.read_messages("", 0).await.unwrap();
        assert!(messages.is_empty());
        assert_eq!(port.read_tell(), 120);
        assert_eq!(port.transport().queries, vec!["rxmsg.json?pos=0&maxw=0&pat="]);
    }

    #[tokio::test]
    async fn test_read_messages_excludes_position_element() {
        let mock = MockTransport::new().reply(br#"["first","second",240]"#);
        let mut port = SerialPort::new(mock);

        let messages = port.read_messages("*", 500).await.unwrap();
        assert_eq!(messages, vec!["first", "second"]);
        assert_eq!(port.read_tell(), 240);
    }

    #[tokio::test]
    async fn test_read_line() {
        let mock = MockTransport::new()
            .reply(br#"["ready",33]"#)
            .reply(b"[33]");
        let mut port = SerialPort::new(mock).with_protocol(Protocol::Line);

        assert_eq!(port.read_line().await.unwrap(), "ready");
        assert_eq!(port.read_tell(), 33);
        assert_eq!(port.read_line().await.unwrap(), "");
        assert_eq!(
            port.transport().queries[0],
            "rxmsg.json?pos=0&len=1&maxw=1"
        );
    }

    #[tokio::test]
    async fn test_query_line_sends_command_atomically() {
        let mock = MockTransport::new().reply(br#"["PONG",77]"#);
        let mut port = SerialPort::new(mock).with_protocol(Protocol::Line);

        let reply = port.query_line("PING", 500).await.unwrap();
        assert_eq!(reply, "PONG");
        assert_eq!(port.read_tell(), 77);
        // No pos= parameter: only messages after the command count.
        assert_eq!(
            port.transport().queries,
            vec!["rxmsg.json?len=1&maxw=500&cmd=!PING"]
        );
    }

    #[tokio::test]
    async fn test_query_modbus_roundtrip() {
        let mock = MockTransport::new().reply(br#"[":010304002a0010",4521]"#);
        let mut port = SerialPort::new(mock).with_protocol(Protocol::ModbusAscii);

        let reply = port
            .query_modbus(1, &[0x03, 0x00, 0x00, 0x00, 0x02])
            .await
            .unwrap();
        assert_eq!(reply, vec![0x03, 0x04, 0x00, 0x2A, 0x00, 0x10]);
        // The exchange is position-independent.
        assert_eq!(port.read_tell(), 0);
        assert_eq!(
            port.transport().queries,
            vec!["rxmsg.json?cmd=:010300000002&pat=:01[08]3*"]
        );
    }

    #[tokio::test]
    async fn test_query_modbus_no_reply() {
        let mock = MockTransport::new().reply(b"[4521]");
        let mut port = SerialPort::new(mock);

        let err = port
            .query_modbus(1, &[0x03, 0x00, 0x00, 0x00, 0x02])
            .await
            .unwrap_err();
        assert!(matches!(err, SerialError::NoReply));
    }

    #[tokio::test]
    async fn test_query_modbus_rejects_exception_bit() {
        let mock = MockTransport::new();
        let mut port = SerialPort::new(mock);
        let err = port.query_modbus(1, &[0x83, 0x02]).await.unwrap_err();
        assert!(matches!(err, SerialError::InvalidData { .. }));
    }

    #[tokio::test]
    async fn test_modbus_read_registers() {
        let mock = MockTransport::new().reply(br#"[":010304002a0010",4521]"#);
        let mut port = SerialPort::new(mock);

        let regs = port.modbus_read_registers(1, 0, 2).await.unwrap();
        assert_eq!(regs, vec![42, 16]);
    }

    #[tokio::test]
    async fn test_modbus_exception_reply_is_typed() {
        let mock = MockTransport::new().reply(br#"[":018302",4521]"#);
        let mut port = SerialPort::new(mock);

        let err = port.modbus_read_registers(1, 9999, 2).await.unwrap_err();
        match err {
            SerialError::Exception {
                function,
                exception,
            } => {
                assert_eq!(function, 0x03);
                assert_eq!(exception, ModbusException::IllegalDataAddress);
            }
            other => panic!("expected exception, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_modbus_read_bits() {
        // FC 01 reply: byte count 2, pattern 0b0000_0101 then 0b0000_0001.
        let mock = MockTransport::new().reply(br#"[":0101020501",4521]"#);
        let mut port = SerialPort::new(mock);

        let bits = port.modbus_read_bits(1, 0, 9).await.unwrap();
        assert_eq!(
            bits,
            vec![true, false, true, false, false, false, false, false, true]
        );
    }

    #[tokio::test]
    async fn test_modbus_write_bits_reports_device_count() {
        let mock = MockTransport::new().reply(br#"[":010f0013000a",4521]"#);
        let mut port = SerialPort::new(mock);

        let written = port
            .modbus_write_bits(1, 0x0013, &[true; 10])
            .await
            .unwrap();
        assert_eq!(written, 10);
        // Request carries the derived byte count 2 and the packed bits.
        assert_eq!(
            port.transport().queries,
            vec!["rxmsg.json?cmd=:010f0013000a02ff03&pat=:01[08]f*"]
        );
    }

    #[tokio::test]
    async fn test_modbus_write_bit_and_register_echo() {
        let mock = MockTransport::new()
            .reply(br#"[":01050005ff00",1]"#)
            .reply(br#"[":010600641234",2]"#);
        let mut port = SerialPort::new(mock);

        assert_eq!(port.modbus_write_bit(1, 5, true).await.unwrap(), 1);
        assert_eq!(
            port.modbus_write_register(1, 100, 0x1234).await.unwrap(),
            1
        );
        // The full 16-bit value goes on the wire.
        assert_eq!(
            port.transport().queries[1],
            "rxmsg.json?cmd=:010600641234&pat=:01[08]6*"
        );
    }

    #[tokio::test]
    async fn test_modbus_write_and_read_registers() {
        let mock = MockTransport::new().reply(br#"[":011704000a0014",9]"#);
        let mut port = SerialPort::new(mock);

        let regs = port
            .modbus_write_and_read_registers(1, 0x0010, &[0x0102], 0x0003, 2)
            .await
            .unwrap();
        assert_eq!(regs, vec![10, 20]);
        assert_eq!(
            port.transport().queries,
            vec!["rxmsg.json?cmd=:01170003000200100001020102&pat=:01[19]7*"]
        );
    }

    #[tokio::test]
    async fn test_write_commands() {
        let mock = MockTransport::new();
        let mut port = SerialPort::new(mock);

        port.write_byte(0x0A).await.unwrap();
        port.write_str("HELLO").await.unwrap();
        port.write_line("AT").await.unwrap();
        port.write_hex("0a0b").await.unwrap();
        port.write_modbus_hex("010600640001").await.unwrap();
        port.set_rts(true).await.unwrap();

        assert_eq!(
            port.transport().commands,
            vec!["$0a", "+HELLO", "!AT", "$0a0b", ":010600640001", "R1"]
        );
    }

    #[tokio::test]
    async fn test_write_str_rejects_non_printable_and_long_payloads() {
        let mock = MockTransport::new();
        let mut port = SerialPort::new(mock);

        let err = port.write_str("a\x01b").await.unwrap_err();
        assert!(matches!(err, SerialError::Unsupported { .. }));
        let long = "x".repeat(200);
        let err = port.write_line(&long).await.unwrap_err();
        assert!(matches!(err, SerialError::Unsupported { .. }));
        assert!(port.transport().commands.is_empty());
    }

    #[tokio::test]
    async fn test_reset_rewinds_cursor_and_clears_device() {
        let mock = MockTransport::new();
        let mut port = SerialPort::new(mock);
        port.read_seek(500);

        port.reset().await.unwrap();
        assert_eq!(port.read_tell(), 0);
        assert_eq!(port.transport().commands, vec!["Z"]);
    }

    #[tokio::test]
    async fn test_get_cts() {
        let mock = MockTransport::new().reply(b"1").reply(b"0").reply(b"x");
        let mut port = SerialPort::new(mock);

        assert!(port.get_cts().await.unwrap());
        assert!(!port.get_cts().await.unwrap());
        assert!(port.get_cts().await.is_err());
    }

    #[tokio::test]
    async fn test_stats_pass_through() {
        let mock = MockTransport::new().reply(b"ABC@3");
        let mut port = SerialPort::new(mock);
        port.read_bin(3).await.unwrap();
        port.write_byte(1).await.unwrap();

        let stats = port.stats();
        assert_eq!(stats.requests_sent, 1);
        assert_eq!(stats.commands_sent, 1);
        assert_eq!(stats.bytes_received, 5);
    }

    #[test]
    fn test_parse_message_array_variants() {
        // Position as number or numeric string.
        assert_eq!(
            parse_message_array(br#"["a",12]"#).unwrap(),
            (vec!["a".to_string()], Some(12))
        );
        assert_eq!(
            parse_message_array(br#"["a","12"]"#).unwrap(),
            (vec!["a".to_string()], Some(12))
        );
        assert_eq!(parse_message_array(b"[]").unwrap(), (vec![], None));
        assert_eq!(parse_message_array(b"").unwrap(), (vec![], None));
        assert!(parse_message_array(b"{}").is_err());
        assert!(parse_message_array(br#"["a",null]"#).is_err());
    }
}
