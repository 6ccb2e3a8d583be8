//! The framed control- and data-channel transport (C1).
//!
//! Grounded on `lib/payload/include/payload.h` (record shapes, max lengths,
//! the `DESCPTR_EOF` bit) and `server/lib/requests/src/requests.c` (the
//! send-until-all-bytes-sent / receive-until-CRLF-bounded-by-max-length
//! semantics, and `EAGAIN` mapping to a non-fatal `WouldBlock`) in the
//! retrieved C source this system was distilled from.

use std::fmt;
use std::io::{self, Read, Write};

pub const MAX_REPLY_PAYLOAD: usize = 4096;
pub const MAX_REQUEST_PAYLOAD: usize = 512;
pub const MAX_DATA_BLOCK: usize = 2048;
pub const DATA_EOF_BIT: u8 = 0x40;

const CRLF: &str = "\r\n";

#[derive(Debug)]
pub enum TransportError {
    InvalidLen,
    TooLong,
    Framing,
    WouldBlock,
    Io(io::Error),
}

impl fmt::Display for TransportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransportError::InvalidLen => write!(f, "invalid record length"),
            TransportError::TooLong => write!(f, "record exceeds maximum length"),
            TransportError::Framing => write!(f, "malformed framing"),
            TransportError::WouldBlock => write!(f, "operation would block"),
            TransportError::Io(e) => write!(f, "transport I/O error: {e}"),
        }
    }
}

impl std::error::Error for TransportError {}

impl From<io::Error> for TransportError {
    fn from(e: io::Error) -> Self {
        if matches!(e.kind(), io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut) {
            TransportError::WouldBlock
        } else {
            TransportError::Io(e)
        }
    }
}

/// A control-channel reply (server -> client).
#[derive(Debug, Clone, PartialEq)]
pub struct Reply {
    pub code: u16,
    pub payload: String,
    /// `true` for the handful of replies (e.g. `FEAT`-style banners) that use
    /// the `{code}-...\r\n{code} End\r\n` multi-line form.
    pub multiline: bool,
}

impl Reply {
    pub fn new(code: u16, payload: impl Into<String>) -> Reply {
        Reply { code, payload: payload.into(), multiline: false }
    }

    pub fn encode(&self) -> Result<Vec<u8>, TransportError> {
        if self.payload.len() > MAX_REPLY_PAYLOAD {
            return Err(TransportError::TooLong);
        }

        let text = if self.multiline {
            format!("{}-{}\r\n{} End\r\n", self.code, self.payload, self.code)
        } else {
            format!("{} {}\r\n", self.code, self.payload)
        };
        Ok(text.into_bytes())
    }

    /// Decodes a single-line reply (`"CODE payload\r\n"`). Used by tests and
    /// by any client-side tooling; the server itself only ever encodes.
    pub fn decode(buf: &[u8]) -> Result<Reply, TransportError> {
        let text = std::str::from_utf8(buf).map_err(|_| TransportError::Framing)?;
        let text = text.strip_suffix(CRLF).ok_or(TransportError::Framing)?;
        let (code, payload) = text.split_once(' ').ok_or(TransportError::Framing)?;
        let code: u16 = code.parse().map_err(|_| TransportError::Framing)?;
        if payload.len() > MAX_REPLY_PAYLOAD {
            return Err(TransportError::TooLong);
        }
        Ok(Reply { code, payload: payload.to_string(), multiline: false })
    }
}

/// A control-channel request (client -> server): one CRLF-terminated line.
#[derive(Debug, Clone, PartialEq)]
pub struct Request {
    pub payload: String,
}

impl Request {
    pub fn encode(&self) -> Result<Vec<u8>, TransportError> {
        if !self.payload.ends_with(CRLF) {
            return Err(TransportError::Framing);
        }
        if self.payload.len() > MAX_REQUEST_PAYLOAD {
            return Err(TransportError::TooLong);
        }
        Ok(self.payload.clone().into_bytes())
    }
}

/// A data-channel block: binary, length-prefixed, with an EOF marker bit.
#[derive(Debug, Clone, PartialEq)]
pub struct DataBlock {
    pub eof: bool,
    pub data: Vec<u8>,
}

impl DataBlock {
    pub fn encode(&self) -> Result<Vec<u8>, TransportError> {
        if self.data.len() > MAX_DATA_BLOCK {
            return Err(TransportError::TooLong);
        }
        let descriptor = if self.eof { DATA_EOF_BIT } else { 0 };
        let mut buf = Vec::with_capacity(3 + self.data.len());
        buf.push(descriptor);
        buf.extend_from_slice(&(self.data.len() as u16).to_be_bytes());
        buf.extend_from_slice(&self.data);
        Ok(buf)
    }
}

fn write_all(stream: &mut impl Write, mut buf: &[u8]) -> Result<(), TransportError> {
    while !buf.is_empty() {
        let n = stream.write(buf)?;
        if n == 0 {
            return Err(TransportError::Io(io::Error::new(io::ErrorKind::WriteZero, "write returned 0")));
        }
        buf = &buf[n..];
    }
    Ok(())
}

pub fn send_reply(stream: &mut impl Write, reply: &Reply) -> Result<(), TransportError> {
    write_all(stream, &reply.encode()?)
}

pub fn send_request(stream: &mut impl Write, request: &Request) -> Result<(), TransportError> {
    write_all(stream, &request.encode()?)
}

pub fn send_data(stream: &mut impl Write, block: &DataBlock) -> Result<(), TransportError> {
    write_all(stream, &block.encode()?)
}

/// Reads bytes one at a time until a CRLF terminator is found or
/// `MAX_REQUEST_PAYLOAD` is exceeded, then returns the line including the
/// terminator. Excess bytes past the terminator would be a framing error in
/// the declared-length model, but since this server reads one request at a
/// time off a `BufRead`-free raw socket, "excess" here simply means the
/// terminator never arrived within bounds.
pub fn recv_request(stream: &mut impl Read) -> Result<Request, TransportError> {
    let mut buf = Vec::with_capacity(64);
    let mut byte = [0u8; 1];

    loop {
        let n = stream.read(&mut byte)?;
        if n == 0 {
            return Err(TransportError::Framing);
        }
        buf.push(byte[0]);

        if buf.ends_with(CRLF.as_bytes()) {
            break;
        }
        if buf.len() > MAX_REQUEST_PAYLOAD {
            return Err(TransportError::TooLong);
        }
    }

    let payload = String::from_utf8(buf).map_err(|_| TransportError::Framing)?;
    Ok(Request { payload })
}

pub fn recv_data(stream: &mut impl Read) -> Result<DataBlock, TransportError> {
    let mut header = [0u8; 3];
    stream.read_exact(&mut header)?;

    let descriptor = header[0];
    let len = u16::from_be_bytes([header[1], header[2]]) as usize;
    if len > MAX_DATA_BLOCK {
        return Err(TransportError::TooLong);
    }

    let mut data = vec![0u8; len];
    stream.read_exact(&mut data)?;

    Ok(DataBlock { eof: descriptor & DATA_EOF_BIT != 0, data })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reply_round_trips_through_encode_decode() {
        let reply = Reply::new(230, "user connected");
        let encoded = reply.encode().unwrap();
        let decoded = Reply::decode(&encoded).unwrap();
        assert_eq!(decoded, reply);
    }

    #[test]
    fn reply_over_max_payload_is_too_long() {
        let reply = Reply::new(200, "a".repeat(MAX_REPLY_PAYLOAD + 1));
        assert!(matches!(reply.encode(), Err(TransportError::TooLong)));
    }

    #[test]
    fn multiline_reply_encodes_with_end_marker() {
        let reply = Reply { code: 211, payload: "Features".into(), multiline: true };
        let encoded = String::from_utf8(reply.encode().unwrap()).unwrap();
        assert_eq!(encoded, "211-Features\r\n211 End\r\n");
    }

    #[test]
    fn request_must_end_with_crlf() {
        let bad = Request { payload: "USER alice".into() };
        assert!(matches!(bad.encode(), Err(TransportError::Framing)));

        let good = Request { payload: "USER alice\r\n".into() };
        assert!(good.encode().is_ok());
    }

    #[test]
    fn recv_request_reads_exactly_one_line() {
        let mut cursor = io::Cursor::new(b"USER alice\r\nPASS x\r\n".to_vec());
        let req = recv_request(&mut cursor).unwrap();
        assert_eq!(req.payload, "USER alice\r\n");

        let second = recv_request(&mut cursor).unwrap();
        assert_eq!(second.payload, "PASS x\r\n");
    }

    #[test]
    fn data_block_round_trips() {
        let block = DataBlock { eof: true, data: vec![1, 2, 3, 4] };
        let encoded = block.encode().unwrap();
        let mut cursor = io::Cursor::new(encoded);
        let decoded = recv_data(&mut cursor).unwrap();
        assert_eq!(decoded, block);
    }

    #[test]
    fn data_block_over_max_len_is_too_long() {
        let block = DataBlock { eof: false, data: vec![0u8; MAX_DATA_BLOCK + 1] };
        assert!(matches!(block.encode(), Err(TransportError::TooLong)));
    }
}
