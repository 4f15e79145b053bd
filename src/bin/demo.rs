//! Polled Serial Demo
//!
//! Walks through the driver API against an in-memory loopback hub that
//! simulates a small MODBUS slave and a line-mode peer:
//! - MODBUS reads and writes (registers and coils)
//! - Typed exception decoding
//! - Line queries and raw stream reads with cursor control
//!
//! Usage: cargo run --bin demo

use bytes::Bytes;
use polled_serial::{
    codec, packing, pattern::MessagePattern, PolledTransport, Protocol, SerialError, SerialPort,
    SerialResult, TransportStats,
};

/// In-memory hub: one simulated serial port wired to a MODBUS slave at
/// address 1, which also answers line queries.
struct LoopbackHub {
    /// Full receive stream history; positions are absolute indexes into it.
    rx: Vec<u8>,
    /// Complete messages and the stream position they start at.
    messages: Vec<(u64, String)>,
    registers: [u16; 16],
    coils: [bool; 16],
    stats: TransportStats,
}

impl LoopbackHub {
    fn new() -> Self {
        let mut registers = [0u16; 16];
        registers[0] = 42;
        registers[1] = 16;
        Self {
            rx: Vec::new(),
            messages: Vec::new(),
            registers,
            coils: [false; 16],
            stats: TransportStats::default(),
        }
    }

    fn push_message(&mut self, text: &str) {
        self.messages.push((self.rx.len() as u64, text.to_string()));
        self.rx.extend_from_slice(text.as_bytes());
        self.rx.extend_from_slice(b"\r\n");
    }

    fn handle(&mut self, query: &str) -> SerialResult<Bytes> {
        let (path, params) = query.split_once('?').unwrap_or((query, ""));
        let reply = match path {
            "rxdata.bin" => {
                let pos = param(params, "pos").unwrap_or(0) as usize;
                let len = param(params, "len").unwrap_or(0) as usize;
                let pos = pos.min(self.rx.len());
                let end = (pos + len).min(self.rx.len());
                let mut out = self.rx[pos..end].to_vec();
                out.push(b'@');
                out.extend_from_slice(end.to_string().as_bytes());
                out
            }
            "rxcnt.bin" => {
                let pos = param(params, "pos").unwrap_or(0) as usize;
                let avail = self.rx.len().saturating_sub(pos);
                format!("{}@{}", avail, pos).into_bytes()
            }
            "rxmsg.json" => self.handle_msg(params)?,
            "cts.txt" => b"1".to_vec(),
            other => {
                return Err(SerialError::transport(format!("unknown query {}", other)));
            }
        };
        self.stats.record_exchange(reply.len());
        Ok(Bytes::from(reply))
    }

    fn handle_msg(&mut self, params: &str) -> SerialResult<Vec<u8>> {
        if let Some(cmd) = text_param(params, "cmd") {
            if let Some(hex) = cmd.strip_prefix(':') {
                // MODBUS exchange: execute against the slave, reply in kind.
                let req = codec::decode_hex(hex)?;
                let reply_pdu = self.execute_slave(&req[1..]);
                let msg = format!(":{:02x}{}", req[0], codec::encode_hex(&reply_pdu));
                self.push_message(&msg);
                return Ok(
                    serde_json::to_vec(&serde_json::json!([msg, self.rx.len()])).unwrap(),
                );
            }
            if let Some(line) = cmd.strip_prefix('!') {
                let reply = if line == "PING" {
                    "PONG".to_string()
                } else {
                    format!("ECHO {}", line)
                };
                self.push_message(&reply);
                return Ok(
                    serde_json::to_vec(&serde_json::json!([reply, self.rx.len()])).unwrap(),
                );
            }
            return Err(SerialError::transport("unknown command prefix"));
        }

        // Buffered-message search.
        let pos = param(params, "pos").unwrap_or(0);
        let pat = text_param(params, "pat").unwrap_or("");
        let pattern = MessagePattern::parse(pat)
            .ok_or_else(|| SerialError::transport("bad pattern"))?;
        let mut items: Vec<serde_json::Value> = self
            .messages
            .iter()
            .filter(|(start, text)| *start >= pos && pattern.matches(text))
            .map(|(_, text)| serde_json::Value::String(text.clone()))
            .collect();
        items.push(serde_json::json!(self.rx.len()));
        Ok(serde_json::to_vec(&items).unwrap())
    }

    fn execute_slave(&mut self, pdu: &[u8]) -> Vec<u8> {
        let fc = pdu[0];
        let word = |i: usize| u16::from_be_bytes([pdu[i], pdu[i + 1]]) as usize;
        match fc {
            0x01 => {
                let (addr, count) = (word(1), word(3));
                if addr + count > self.coils.len() {
                    return vec![fc | 0x80, 2];
                }
                let packed = packing::pack_bits(&self.coils[addr..addr + count]);
                let mut out = vec![fc, packed.len() as u8];
                out.extend_from_slice(&packed);
                out
            }
            0x03 => {
                let (addr, count) = (word(1), word(3));
                if addr + count > self.registers.len() {
                    return vec![fc | 0x80, 2];
                }
                let packed = packing::pack_registers(&self.registers[addr..addr + count]);
                let mut out = vec![fc, packed.len() as u8];
                out.extend_from_slice(&packed);
                out
            }
            0x05 => {
                let addr = word(1);
                if addr >= self.coils.len() {
                    return vec![fc | 0x80, 2];
                }
                self.coils[addr] = pdu[3] == 0xFF;
                pdu.to_vec()
            }
            0x06 => {
                let addr = word(1);
                if addr >= self.registers.len() {
                    return vec![fc | 0x80, 2];
                }
                self.registers[addr] = word(3) as u16;
                pdu.to_vec()
            }
            0x0F => {
                let (addr, count) = (word(1), word(3));
                if addr + count > self.coils.len() {
                    return vec![fc | 0x80, 2];
                }
                if let Some(bits) = packing::unpack_bits(&pdu[6..], count) {
                    self.coils[addr..addr + count].copy_from_slice(&bits);
                    vec![fc, pdu[1], pdu[2], pdu[3], pdu[4]]
                } else {
                    vec![fc | 0x80, 3]
                }
            }
            0x10 => {
                let (addr, count) = (word(1), word(3));
                if addr + count > self.registers.len() {
                    return vec![fc | 0x80, 2];
                }
                match packing::unpack_registers(&pdu[6..6 + count * 2]) {
                    Some(values) => {
                        self.registers[addr..addr + count].copy_from_slice(&values);
                        vec![fc, pdu[1], pdu[2], pdu[3], pdu[4]]
                    }
                    None => vec![fc | 0x80, 3],
                }
            }
            _ => vec![fc | 0x80, 1],
        }
    }
}

fn param(params: &str, key: &str) -> Option<u64> {
    text_param(params, key).and_then(|v| v.parse().ok())
}

fn text_param<'a>(params: &'a str, key: &str) -> Option<&'a str> {
    params.split('&').find_map(|pair| {
        let (k, v) = pair.split_once('=')?;
        (k == key).then_some(v)
    })
}

impl PolledTransport for LoopbackHub {
    fn download(
        &mut self,
        query: &str,
    ) -> impl std::future::Future<Output = SerialResult<Bytes>> + Send {
        let result = self.handle(query);
        async move { result }
    }

    fn send_command(
        &mut self,
        _text: &str,
    ) -> impl std::future::Future<Output = SerialResult<()>> + Send {
        self.stats.record_command();
        async { Ok(()) }
    }

    fn stats(&self) -> TransportStats {
        self.stats
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    println!("{}", polled_serial::info());
    println!("==========================================\n");

    let mut port = SerialPort::new(LoopbackHub::new()).with_protocol(Protocol::ModbusAscii);

    // =========================================================================
    // Part 1: MODBUS reads
    // =========================================================================
    println!("Part 1: MODBUS reads");
    println!("--------------------");
    let regs = port.modbus_read_registers(1, 0, 2).await?;
    println!("  holding registers [0..2]: {:?}", regs);
    let bits = port.modbus_read_bits(1, 0, 8).await?;
    println!("  coils [0..8]:             {:?}", bits);

    // =========================================================================
    // Part 2: MODBUS writes and read-back
    // =========================================================================
    println!("\nPart 2: MODBUS writes");
    println!("---------------------");
    port.modbus_write_register(1, 2, 0x1234).await?;
    let written = port.modbus_write_registers(1, 3, &[7, 8, 9]).await?;
    println!("  wrote 1 register + {} registers", written);
    port.modbus_write_bit(1, 0, true).await?;
    let written = port
        .modbus_write_bits(1, 1, &[true, false, true, true])
        .await?;
    println!("  wrote 1 coil + {} coils", written);

    let regs = port.modbus_read_registers(1, 2, 4).await?;
    println!("  read-back registers [2..6]: {:?}", regs);
    let bits = port.modbus_read_bits(1, 0, 5).await?;
    println!("  read-back coils [0..5]:     {:?}", bits);

    // =========================================================================
    // Part 3: typed exception decoding
    // =========================================================================
    println!("\nPart 3: exceptions");
    println!("------------------");
    match port.modbus_read_registers(1, 9000, 2).await {
        Err(SerialError::Exception {
            function,
            exception,
        }) => println!("  function {:#04x} rejected: {}", function, exception),
        other => println!("  unexpected outcome: {:?}", other),
    }

    // =========================================================================
    // Part 4: line queries and raw stream reads
    // =========================================================================
    println!("\nPart 4: line queries and the stream cursor");
    println!("------------------------------------------");
    let reply = port.query_line("PING", 500).await?;
    println!("  PING -> {}", reply);
    let reply = port.query_line("STATUS", 500).await?;
    println!("  STATUS -> {}", reply);

    port.read_seek(0);
    let avail = port.read_avail().await?;
    println!("  {} bytes buffered from position 0", avail);
    let text = port.read_str(64).await?;
    println!("  raw stream: {:?}", text);
    println!("  cursor now at {}", port.read_tell());

    let stats = port.stats();
    println!(
        "\n{} requests, {} bytes received",
        stats.requests_sent, stats.bytes_received
    );
    Ok(())
}
