//! Canonical CBOR encoding for deterministic serialization.
//!
//! RFC 8949 Core Deterministic Encoding:
//! - Map keys sorted by encoded byte comparison
//! - Integers use smallest valid encoding
//! - Definite lengths only
//! - No floats (timestamps are i64 milliseconds)
//!
//! Event signatures and event ids are computed over these bytes, so the
//! same event must encode identically on every platform.

use ciborium::value::{Integer, Value};

use crate::event::{EventHeader, LedgerEvent};

/// Header field keys (integer keys for compact encoding).
///
/// Keys 0-23 encode as single bytes in CBOR.
mod keys {
    pub const VERSION: u64 = 0;
    pub const LEDGER: u64 = 1;
    pub const SEQ: u64 = 2;
    pub const TIMESTAMP: u64 = 3;
    pub const KIND: u64 = 4;
    pub const CALLER: u64 = 5;
    pub const RECORD_ID: u64 = 6;
    pub const HANDLES: u64 = 7;
    pub const PREV_EVENT_ID: u64 = 8;
}

/// Encode an event header to canonical CBOR bytes. This is the signed message.
pub fn canonical_header_bytes(header: &EventHeader) -> Vec<u8> {
    let mut buf = Vec::new();
    encode_value_to(&mut buf, &header_to_cbor_value(header));
    buf
}

/// Encode an entire event: canonical_header || signature.
pub fn canonical_event_bytes(event: &LedgerEvent) -> Vec<u8> {
    let mut buf = canonical_header_bytes(&event.header);
    buf.extend_from_slice(&event.signature.0);
    buf
}

fn key(k: u64) -> Value {
    Value::Integer(k.into())
}

/// Convert a header to a CBOR Value (map with integer keys).
fn header_to_cbor_value(header: &EventHeader) -> Value {
    let handles = header
        .handles
        .to_array()
        .iter()
        .map(|r| Value::Bytes(r.0.to_vec()))
        .collect();

    let prev = match &header.prev_event_id {
        Some(id) => Value::Bytes(id.0.to_vec()),
        None => Value::Null,
    };

    Value::Map(vec![
        (key(keys::VERSION), Value::Integer(header.version.into())),
        (key(keys::LEDGER), Value::Bytes(header.ledger.0.to_vec())),
        (key(keys::SEQ), Value::Integer(header.seq.into())),
        (key(keys::TIMESTAMP), Value::Integer(header.timestamp.into())),
        (key(keys::KIND), Value::Integer(header.kind.to_u16().into())),
        (key(keys::CALLER), Value::Bytes(header.caller.0.to_vec())),
        (key(keys::RECORD_ID), Value::Integer(header.record_id.0.into())),
        (key(keys::HANDLES), Value::Array(handles)),
        (key(keys::PREV_EVENT_ID), prev),
    ])
}

/// Recursively encode a CBOR value.
///
/// Only the value shapes produced by [`header_to_cbor_value`] occur here.
fn encode_value_to(buf: &mut Vec<u8>, value: &Value) {
    match value {
        Value::Integer(i) => encode_integer(buf, *i),
        Value::Bytes(b) => {
            encode_uint(buf, 2, b.len() as u64);
            buf.extend_from_slice(b);
        }
        Value::Text(s) => {
            encode_uint(buf, 3, s.len() as u64);
            buf.extend_from_slice(s.as_bytes());
        }
        Value::Array(arr) => {
            encode_uint(buf, 4, arr.len() as u64);
            for item in arr {
                encode_value_to(buf, item);
            }
        }
        Value::Map(entries) => encode_map_canonical(buf, entries),
        Value::Bool(b) => buf.push(if *b { 0xf5 } else { 0xf4 }),
        Value::Null => buf.push(0xf6),
        _ => unreachable!("event headers contain no floats, tags or simple values"),
    }
}

/// Encode a CBOR integer (major types 0 and 1).
fn encode_integer(buf: &mut Vec<u8>, i: Integer) {
    let n: i128 = i.into();

    if n >= 0 {
        encode_uint(buf, 0, n as u64);
    } else {
        // CBOR encodes -1 as 0, -2 as 1, etc.
        encode_uint(buf, 1, (-1 - n) as u64);
    }
}

/// Encode an unsigned integer with the given major type.
fn encode_uint(buf: &mut Vec<u8>, major: u8, n: u64) {
    let mt = major << 5;
    if n < 24 {
        buf.push(mt | (n as u8));
    } else if n <= 0xff {
        buf.push(mt | 24);
        buf.push(n as u8);
    } else if n <= 0xffff {
        buf.push(mt | 25);
        buf.extend_from_slice(&(n as u16).to_be_bytes());
    } else if n <= 0xffff_ffff {
        buf.push(mt | 26);
        buf.extend_from_slice(&(n as u32).to_be_bytes());
    } else {
        buf.push(mt | 27);
        buf.extend_from_slice(&n.to_be_bytes());
    }
}

/// Encode a map canonically (major type 5), keys sorted by encoded bytes.
fn encode_map_canonical(buf: &mut Vec<u8>, entries: &[(Value, Value)]) {
    let mut pairs: Vec<(Vec<u8>, &Value)> = entries
        .iter()
        .map(|(k, v)| {
            let mut key_buf = Vec::new();
            encode_value_to(&mut key_buf, k);
            (key_buf, v)
        })
        .collect();

    pairs.sort_by(|a, b| a.0.cmp(&b.0));

    encode_uint(buf, 5, pairs.len() as u64);
    for (key_bytes, value) in pairs {
        buf.extend_from_slice(&key_bytes);
        encode_value_to(buf, value);
    }
}
