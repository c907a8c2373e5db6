//! Canonical CBOR encoding for deterministic serialization.
//!
//! Implements RFC 8949 Core Deterministic Encoding:
//! - Map keys sorted by encoded byte comparison
//! - Integers use smallest valid encoding
//! - Definite lengths only
//! - No floats (timestamps are i64 milliseconds)
//!
//! Token MACs are computed over canonical bytes. The canonical encoding is
//! what makes the MAC non-malleable: the same payload always produces
//! identical bytes, so there is no second encoding of a payload that would
//! verify under the same MAC.

use ciborium::value::Value;

use crate::error::CoreError;

/// Encode a CBOR Value to canonical bytes.
pub fn encode_value(value: &Value) -> Vec<u8> {
    let mut buf = Vec::new();
    encode_value_to(&mut buf, value);
    buf
}

/// Decode canonical bytes back into a CBOR Value.
pub fn decode_value(bytes: &[u8]) -> Result<Value, CoreError> {
    ciborium::from_reader(bytes).map_err(|e| CoreError::DecodingError(e.to_string()))
}

/// Recursively encode a CBOR value.
fn encode_value_to(buf: &mut Vec<u8>, value: &Value) {
    match value {
        Value::Integer(i) => {
            encode_integer(buf, *i);
        }
        Value::Bytes(b) => {
            encode_bytes(buf, b);
        }
        Value::Text(s) => {
            encode_text(buf, s);
        }
        Value::Array(arr) => {
            encode_array(buf, arr);
        }
        Value::Map(entries) => {
            encode_map_canonical(buf, entries);
        }
        Value::Bool(b) => {
            buf.push(if *b { 0xf5 } else { 0xf4 });
        }
        Value::Null => {
            buf.push(0xf6);
        }
        Value::Float(_) => {
            panic!("floats not supported in canonical encoding");
        }
        _ => {
            panic!("unsupported CBOR value type");
        }
    }
}

/// Encode a CBOR integer (major types 0 and 1).
fn encode_integer(buf: &mut Vec<u8>, i: ciborium::value::Integer) {
    let n: i128 = i.into();

    if n >= 0 {
        // Major type 0: unsigned integer
        encode_uint(buf, 0, n as u64);
    } else {
        // Major type 1: negative integer
        // CBOR encodes -1 as 0, -2 as 1, etc.
        let abs = (-1 - n) as u64;
        encode_uint(buf, 1, abs);
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
    } else if n <= 0xffffffff {
        buf.push(mt | 26);
        buf.extend_from_slice(&(n as u32).to_be_bytes());
    } else {
        buf.push(mt | 27);
        buf.extend_from_slice(&n.to_be_bytes());
    }
}

/// Encode a byte string (major type 2).
fn encode_bytes(buf: &mut Vec<u8>, bytes: &[u8]) {
    encode_uint(buf, 2, bytes.len() as u64);
    buf.extend_from_slice(bytes);
}

/// Encode a text string (major type 3).
fn encode_text(buf: &mut Vec<u8>, s: &str) {
    encode_uint(buf, 3, s.len() as u64);
    buf.extend_from_slice(s.as_bytes());
}

/// Encode an array (major type 4).
fn encode_array(buf: &mut Vec<u8>, arr: &[Value]) {
    encode_uint(buf, 4, arr.len() as u64);
    for item in arr {
        encode_value_to(buf, item);
    }
}

/// Encode a map canonically (major type 5).
///
/// Keys are sorted by their encoded byte comparison.
fn encode_map_canonical(buf: &mut Vec<u8>, entries: &[(Value, Value)]) {
    // Encode all keys first to sort by encoded bytes
    let mut key_value_pairs: Vec<(Vec<u8>, &Value)> = entries
        .iter()
        .map(|(k, v)| {
            let mut key_buf = Vec::new();
            encode_value_to(&mut key_buf, k);
            (key_buf, v)
        })
        .collect();

    // Sort by encoded key bytes (lexicographic)
    key_value_pairs.sort_by(|a, b| a.0.cmp(&b.0));

    // Write map header
    encode_uint(buf, 5, key_value_pairs.len() as u64);

    // Write sorted key-value pairs
    for (key_bytes, value) in key_value_pairs {
        buf.extend_from_slice(&key_bytes);
        encode_value_to(buf, value);
    }
}
