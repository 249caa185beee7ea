use std::cmp::Ordering;

use serde_json::Value;
use tokio::io::{AsyncRead, AsyncReadExt};
use tracing::trace;

use crate::{Error, Result};

/// Every request ends with a NUL byte followed by a carriage return.
pub const REQUEST_TERMINATOR: &[u8] = b"\0\r";

const FRAME_END: u8 = 0;
const READ_CHUNK: usize = 4096;

/// Serialize a command to the hub's request framing.
pub fn encode(command: &Value) -> Vec<u8> {
    let mut bytes = command.to_string().into_bytes();
    bytes.extend_from_slice(REQUEST_TERMINATOR);
    bytes
}

/// Accumulates reply bytes and splits them on NUL terminators.
///
/// Replies may arrive in any number of chunks and may end with more than
/// one NUL. Bytes following a terminator stay buffered for the next frame.
#[derive(Debug, Default)]
pub struct FrameDecoder {
    buf: Vec<u8>,
}

impl FrameDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn extend(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
    }

    pub fn buffered(&self) -> usize {
        self.buf.len()
    }

    pub fn clear(&mut self) {
        self.buf.clear();
    }

    /// Pop the next complete frame, or `None` if no terminator has arrived yet.
    pub fn next_frame(&mut self) -> Option<Result<Value>> {
        let end = self.buf.iter().position(|&b| b == FRAME_END)?;
        let consumed = self.buf[end..]
            .iter()
            .position(|&b| b != FRAME_END)
            .map_or(self.buf.len(), |run| end + run);

        let frame: Vec<u8> = self.buf.drain(..consumed).take(end).collect();
        trace!(len = frame.len(), "frame complete");
        Some(serde_json::from_slice(&frame).map_err(Error::from))
    }
}

/// Read from `reader` until one full frame is decoded.
///
/// A zero-length read before the terminator means the peer closed the
/// connection mid-frame and yields [`Error::Framing`].
pub async fn decode_stream<R>(reader: &mut R, decoder: &mut FrameDecoder) -> Result<Value>
where
    R: AsyncRead + Unpin,
{
    let mut chunk = [0u8; READ_CHUNK];
    loop {
        if let Some(frame) = decoder.next_frame() {
            return frame;
        }
        let n = reader.read(&mut chunk).await?;
        if n == 0 {
            return Err(Error::Framing {
                buffered: decoder.buffered(),
            });
        }
        trace!(bytes = n, "read chunk");
        decoder.extend(&chunk[..n]);
    }
}

/// Compare two JSON values ignoring object key order and array element order.
///
/// Hub firmware revisions do not keep reply ordering stable, so expected
/// replies are matched structurally rather than textually.
pub fn structurally_equal(a: &Value, b: &Value) -> bool {
    canonical(a) == canonical(b)
}

#[derive(Debug, PartialEq, Eq, PartialOrd, Ord)]
enum Canonical<'a> {
    Null,
    Bool(bool),
    Number(Number),
    String(&'a str),
    Array(Vec<Canonical<'a>>),
    Object(Vec<(&'a str, Canonical<'a>)>),
}

/// Totally ordered number so it can be sorted alongside everything else.
///
/// Integers, and floats with an integral value, compare exactly; `12` and
/// `12.0` are the same number.
#[derive(Debug, Clone, Copy)]
enum Number {
    Int(i128),
    Float(f64),
}

impl Number {
    fn new(n: &serde_json::Number) -> Self {
        if let Some(i) = n.as_i64() {
            return Number::Int(i.into());
        }
        if let Some(u) = n.as_u64() {
            return Number::Int(u.into());
        }
        let f = n.as_f64().unwrap_or(f64::NAN);
        if f.fract() == 0.0 && f.abs() < 2f64.powi(63) {
            Number::Int(f as i128)
        } else {
            Number::Float(f)
        }
    }
}

impl PartialEq for Number {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Number {}

impl PartialOrd for Number {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Number {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (Number::Int(a), Number::Int(b)) => a.cmp(b),
            (Number::Float(a), Number::Float(b)) => a.total_cmp(b),
            (Number::Int(a), Number::Float(b)) => (*a as f64).total_cmp(b),
            (Number::Float(a), Number::Int(b)) => a.total_cmp(&(*b as f64)),
        }
    }
}

fn canonical(value: &Value) -> Canonical<'_> {
    match value {
        Value::Null => Canonical::Null,
        Value::Bool(b) => Canonical::Bool(*b),
        Value::Number(n) => Canonical::Number(Number::new(n)),
        Value::String(s) => Canonical::String(s),
        Value::Array(items) => {
            let mut items: Vec<_> = items.iter().map(canonical).collect();
            items.sort();
            Canonical::Array(items)
        }
        Value::Object(map) => {
            let mut entries: Vec<_> = map.iter().map(|(k, v)| (k.as_str(), canonical(v))).collect();
            entries.sort();
            Canonical::Object(entries)
        }
    }
}
