//! Minimal HPACK subset: literal header fields, never indexed, with new
//! names, and no Huffman coding. Enough to round-trip our own encoder
//! against our own decoder; a general-purpose HPACK implementation
//! (dynamic table, Huffman) is out of this crate's core scope.

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::error::ProtocolError;
use crate::h2proto::Reason;

/// Encodes `name` and `value` as a "Literal Header Field Never Indexed"
/// representation (RFC 7541 §6.2.3) with an unindexed (new) name.
pub fn encode_field(out: &mut BytesMut, name: &[u8], value: &[u8]) {
    out.put_u8(0x10);
    encode_string(out, name);
    encode_string(out, value);
}

fn encode_string(out: &mut BytesMut, s: &[u8]) {
    encode_int(out, 0x00, 7, s.len() as u64);
    out.put_slice(s);
}

fn encode_int(out: &mut BytesMut, prefix_bits: u8, prefix_len: u8, mut value: u64) {
    let max = (1u64 << prefix_len) - 1;
    if value < max {
        out.put_u8(prefix_bits | value as u8);
        return;
    }
    out.put_u8(prefix_bits | max as u8);
    value -= max;
    while value >= 128 {
        out.put_u8(((value % 128) as u8) | 0x80);
        value /= 128;
    }
    out.put_u8(value as u8);
}

/// Decodes a sequence of fields encoded with [`encode_field`].
pub fn decode_fields(mut buf: Bytes) -> Result<Vec<(Bytes, Bytes)>, ProtocolError> {
    let mut fields = Vec::new();
    while buf.has_remaining() {
        let marker = buf[0];
        if marker & 0x80 != 0 || marker & 0x40 != 0 || (marker & 0xf0) == 0x00 {
            return Err(ProtocolError::new(
                Reason::CompressionError,
                "unsupported HPACK representation (indexed or dynamic-table entries not supported)",
            ));
        }
        buf.advance(1);
        let name = decode_string(&mut buf)?;
        let value = decode_string(&mut buf)?;
        fields.push((name, value));
    }
    Ok(fields)
}

fn decode_string(buf: &mut Bytes) -> Result<Bytes, ProtocolError> {
    if !buf.has_remaining() {
        return Err(ProtocolError::new(Reason::CompressionError, "truncated HPACK string"));
    }
    let huffman = buf[0] & 0x80 != 0;
    if huffman {
        return Err(ProtocolError::new(Reason::CompressionError, "Huffman-coded strings not supported"));
    }
    let len = decode_int(buf, 7)? as usize;
    if buf.remaining() < len {
        return Err(ProtocolError::new(Reason::CompressionError, "truncated HPACK string"));
    }
    Ok(buf.copy_to_bytes(len))
}

fn decode_int(buf: &mut Bytes, prefix_len: u8) -> Result<u64, ProtocolError> {
    let max = (1u64 << prefix_len) - 1;
    let first = buf[0] as u64 & max;
    buf.advance(1);
    if first < max {
        return Ok(first);
    }
    let mut value = first;
    let mut shift = 0u32;
    loop {
        if !buf.has_remaining() {
            return Err(ProtocolError::new(Reason::CompressionError, "truncated HPACK integer"));
        }
        let byte = buf[0];
        buf.advance(1);
        value += ((byte & 0x7f) as u64) << shift;
        if byte & 0x80 == 0 {
            break;
        }
        shift += 7;
    }
    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_header_fields() {
        let mut buf = BytesMut::new();
        encode_field(&mut buf, b":method", b"GET");
        encode_field(&mut buf, b":path", b"/");
        encode_field(&mut buf, b"x-long", &vec![b'a'; 200]);

        let decoded = decode_fields(buf.freeze()).unwrap();
        assert_eq!(decoded[0], (Bytes::from_static(b":method"), Bytes::from_static(b"GET")));
        assert_eq!(decoded[1], (Bytes::from_static(b":path"), Bytes::from_static(b"/")));
        assert_eq!(decoded[2].1.len(), 200);
    }
}
