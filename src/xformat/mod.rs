//! `xformat`: a small self-describing tagged binary encoding.
//!
//! # Wire format
//! A value is a 1-byte tag followed by its payload.  Payloads never carry
//! their own length; the enclosing container (or the caller, for a top-level
//! value) supplies it.
//!
//! | Tag | Kind  | Payload |
//! |-----|-------|---------|
//! | 0   | bytes | verbatim |
//! | 1   | int   | 4-byte little-endian two's complement |
//! | 2   | text  | UTF-8 |
//! | 3   | list  | element triples, in order |
//! | 4   | map   | key triple then value triple, per entry, in insertion order |
//!
//! A *triple* is `tag (1 B) | payload length (4 B, LE) | payload`.
//!
//! Every length is checked against the bytes left in its enclosing region
//! before slicing, so malformed input always surfaces as an error.  Nesting
//! is capped at [`MAX_DEPTH`] containers on both encode and decode.

mod json;

use std::fs;
use std::io;
use std::path::Path;

use byteorder::{ByteOrder, LittleEndian, WriteBytesExt};
use thiserror::Error;

/// Conventional file extension for persisted values.
pub const EXTENSION: &str = "xformat";

/// Width of the integer payload and of every triple length field.
pub const INT_SIZE: usize = 4;

/// Deepest container nesting accepted; the top-level value is depth 0.
pub const MAX_DEPTH: usize = 512;

#[derive(Error, Debug)]
pub enum XFormatError {
    #[error("Integer {value} does not fit in {INT_SIZE} bytes")]
    IntegerOverflow { value: i128 },
    #[error("Truncated data at byte {offset}: need {needed} bytes, {available} available")]
    TruncatedData { offset: usize, needed: u64, available: u64 },
    #[error("Unknown tag {tag} at byte {offset}")]
    UnknownTag { tag: u8, offset: usize },
    #[error("Integer payload at byte {offset} is {width} bytes, expected {INT_SIZE}")]
    IntegerWidth { width: usize, offset: usize },
    #[error("Invalid UTF-8 text at byte {offset}")]
    InvalidUtf8 { offset: usize },
    #[error("Value at byte {offset} is nested deeper than {limit} levels")]
    NestingTooDeep { offset: usize, limit: usize },
    #[error("Cannot represent JSON value: {0}")]
    UnsupportedJson(String),
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

// ── Tag ──────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Tag {
    Bytes = 0,
    Int   = 1,
    Text  = 2,
    List  = 3,
    Map   = 4,
}

impl Tag {
    pub fn from_u8(tag: u8) -> Option<Self> {
        match tag {
            0 => Some(Tag::Bytes),
            1 => Some(Tag::Int),
            2 => Some(Tag::Text),
            3 => Some(Tag::List),
            4 => Some(Tag::Map),
            _ => None,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Tag::Bytes => "bytes",
            Tag::Int   => "int",
            Tag::Text  => "text",
            Tag::List  => "list",
            Tag::Map   => "map",
        }
    }
}

// ── Value ────────────────────────────────────────────────────────────────────

/// A value tree.  Maps keep entries in insertion order and may hold
/// duplicate keys.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Value {
    Bytes(Vec<u8>),
    Int(i64),
    Text(String),
    List(Vec<Value>),
    Map(Vec<(Value, Value)>),
}

impl Value {
    pub fn tag(&self) -> Tag {
        match self {
            Value::Bytes(_) => Tag::Bytes,
            Value::Int(_)   => Tag::Int,
            Value::Text(_)  => Tag::Text,
            Value::List(_)  => Tag::List,
            Value::Map(_)   => Tag::Map,
        }
    }

    /// Look up a map key.  With duplicate keys the last entry wins.
    pub fn get(&self, key: &Value) -> Option<&Value> {
        match self {
            Value::Map(entries) => entries.iter().rev().find(|(k, _)| k == key).map(|(_, v)| v),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self { Value::Int(n) => Some(*n), _ => None }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self { Value::Text(s) => Some(s), _ => None }
    }

    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self { Value::Bytes(b) => Some(b), _ => None }
    }

    pub fn as_list(&self) -> Option<&[Value]> {
        match self { Value::List(v) => Some(v), _ => None }
    }
}

impl From<i32> for Value {
    fn from(n: i32) -> Self { Value::Int(n as i64) }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self { Value::Text(s.to_owned()) }
}

impl From<String> for Value {
    fn from(s: String) -> Self { Value::Text(s) }
}

impl From<Vec<u8>> for Value {
    fn from(b: Vec<u8>) -> Self { Value::Bytes(b) }
}

impl From<&[u8]> for Value {
    fn from(b: &[u8]) -> Self { Value::Bytes(b.to_vec()) }
}

impl From<Vec<Value>> for Value {
    fn from(v: Vec<Value>) -> Self { Value::List(v) }
}

// ── Encoding ─────────────────────────────────────────────────────────────────

/// Encode a top-level value: tag byte followed by its payload.
pub fn encode(value: &Value) -> Result<Vec<u8>, XFormatError> {
    let mut out = vec![value.tag() as u8];
    encode_payload(value, &mut out)?;
    Ok(out)
}

/// Append the payload of `value` (no tag, no length) to `out`.
pub fn encode_payload(value: &Value, out: &mut Vec<u8>) -> Result<(), XFormatError> {
    encode_at(value, out, 0)
}

fn encode_at(value: &Value, out: &mut Vec<u8>, depth: usize) -> Result<(), XFormatError> {
    if depth > MAX_DEPTH {
        return Err(XFormatError::NestingTooDeep { offset: out.len(), limit: MAX_DEPTH });
    }
    match value {
        Value::Bytes(b) => out.extend_from_slice(b),
        Value::Int(n)   => out.write_i32::<LittleEndian>(to_i32(*n as i128)?)?,
        Value::Text(s)  => out.extend_from_slice(s.as_bytes()),
        Value::List(items) => {
            for item in items {
                write_triple(item, out, depth + 1)?;
            }
        }
        Value::Map(entries) => {
            for (key, val) in entries {
                write_triple(key, out, depth + 1)?;
                write_triple(val, out, depth + 1)?;
            }
        }
    }
    Ok(())
}

/// Write tag, a placeholder length and the payload, then patch the length
/// once the payload size is known.
fn write_triple(value: &Value, out: &mut Vec<u8>, depth: usize) -> Result<(), XFormatError> {
    out.push(value.tag() as u8);
    let len_at = out.len();
    out.extend_from_slice(&[0; INT_SIZE]);
    encode_at(value, out, depth)?;
    let len = to_i32((out.len() - len_at - INT_SIZE) as i128)?;
    LittleEndian::write_i32(&mut out[len_at..len_at + INT_SIZE], len);
    Ok(())
}

fn to_i32(value: i128) -> Result<i32, XFormatError> {
    i32::try_from(value).map_err(|_| XFormatError::IntegerOverflow { value })
}

// ── Decoding ─────────────────────────────────────────────────────────────────

/// Decode a top-level value whose payload runs to the end of `bytes`.
pub fn decode(bytes: &[u8]) -> Result<Value, XFormatError> {
    let payload_len = bytes.len().saturating_sub(1);
    decode_with_len(bytes, payload_len)
}

/// Decode a top-level value (tag byte + payload) whose payload is
/// `payload_len` bytes long.  Bytes past the payload are ignored.
pub fn decode_with_len(bytes: &[u8], payload_len: usize) -> Result<Value, XFormatError> {
    if bytes.is_empty() || payload_len > bytes.len() - 1 {
        return Err(XFormatError::TruncatedData {
            offset:    0,
            needed:    (payload_len as u64).saturating_add(1),
            available: bytes.len() as u64,
        });
    }
    decode_at(bytes[0], &bytes[1..1 + payload_len], 0, 1, 0)
}

/// Decode a payload whose tag is already known.
pub fn decode_payload(tag: u8, payload: &[u8]) -> Result<Value, XFormatError> {
    decode_at(tag, payload, 0, 0, 0)
}

/// `tag_offset` and `payload_offset` are absolute positions, used only for
/// error reporting.
fn decode_at(
    tag:            u8,
    payload:        &[u8],
    tag_offset:     usize,
    payload_offset: usize,
    depth:          usize,
) -> Result<Value, XFormatError> {
    if depth > MAX_DEPTH {
        return Err(XFormatError::NestingTooDeep { offset: tag_offset, limit: MAX_DEPTH });
    }
    let kind = Tag::from_u8(tag).ok_or(XFormatError::UnknownTag { tag, offset: tag_offset })?;
    Ok(match kind {
        Tag::Bytes => Value::Bytes(payload.to_vec()),
        Tag::Int => {
            if payload.len() != INT_SIZE {
                return Err(XFormatError::IntegerWidth { width: payload.len(), offset: payload_offset });
            }
            Value::Int(LittleEndian::read_i32(payload) as i64)
        }
        Tag::Text => {
            let s = std::str::from_utf8(payload)
                .map_err(|_| XFormatError::InvalidUtf8 { offset: payload_offset })?;
            Value::Text(s.to_owned())
        }
        Tag::List => {
            let mut items = Vec::new();
            let mut region = Region::new(payload, payload_offset, depth + 1);
            while !region.is_empty() {
                items.push(region.next_value()?);
            }
            Value::List(items)
        }
        Tag::Map => {
            let mut entries = Vec::new();
            let mut region = Region::new(payload, payload_offset, depth + 1);
            while !region.is_empty() {
                let key = region.next_value()?;
                let val = region.next_value()?;
                entries.push((key, val));
            }
            Value::Map(entries)
        }
    })
}

/// Cursor over the triples of one container payload.  `depth` is the
/// nesting depth of the values it yields.
struct Region<'a> {
    buf:   &'a [u8],
    pos:   usize,
    base:  usize,
    depth: usize,
}

impl<'a> Region<'a> {
    fn new(buf: &'a [u8], base: usize, depth: usize) -> Self {
        Self { buf, pos: 0, base, depth }
    }

    fn is_empty(&self) -> bool { self.pos >= self.buf.len() }

    fn remaining(&self) -> usize { self.buf.len() - self.pos }

    fn take(&mut self, n: u64) -> Result<&'a [u8], XFormatError> {
        if n > self.remaining() as u64 {
            return Err(XFormatError::TruncatedData {
                offset:    self.base + self.pos,
                needed:    n,
                available: self.remaining() as u64,
            });
        }
        let n     = n as usize;
        let slice = &self.buf[self.pos..self.pos + n];
        self.pos += n;
        Ok(slice)
    }

    fn next_value(&mut self) -> Result<Value, XFormatError> {
        let tag_offset = self.base + self.pos;
        let tag        = self.take(1)?[0];
        // Lengths are written as non-negative i32; reading them unsigned makes
        // a corrupt negative length an oversized one, caught by `take`.
        let len            = LittleEndian::read_u32(self.take(INT_SIZE as u64)?);
        let payload_offset = self.base + self.pos;
        let payload        = self.take(len as u64)?;
        decode_at(tag, payload, tag_offset, payload_offset, self.depth)
    }
}

// ── Files ────────────────────────────────────────────────────────────────────

pub fn write_file<P: AsRef<Path>>(path: P, value: &Value) -> Result<(), XFormatError> {
    fs::write(path, encode(value)?)?;
    Ok(())
}

pub fn read_file<P: AsRef<Path>>(path: P) -> Result<Value, XFormatError> {
    decode(&fs::read(path)?)
}
