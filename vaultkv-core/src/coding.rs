//! Variable-length integer coding shared by the on-disk formats

use bytes::BufMut;

/// Maximum encoded length of a varint64
pub const MAX_VARINT64_LEN: usize = 10;

/// Append `value` as a LEB128 varint
pub fn put_varint64<B: BufMut>(dst: &mut B, mut value: u64) {
    while value >= 0x80 {
        dst.put_u8((value as u8) | 0x80);
        value >>= 7;
    }
    dst.put_u8(value as u8);
}

/// Number of bytes `value` occupies as a varint
pub fn varint_length(mut value: u64) -> usize {
    let mut len = 1;
    while value >= 0x80 {
        len += 1;
        value >>= 7;
    }
    len
}

/// Decode a varint from the front of `input`, advancing it past the
/// consumed bytes. Returns `None` on truncation or overflow, leaving
/// `input` untouched.
pub fn get_varint64(input: &mut &[u8]) -> Option<u64> {
    let mut result: u64 = 0;
    let mut shift: u32 = 0;

    for (i, &byte) in input.iter().enumerate().take(MAX_VARINT64_LEN) {
        let bits = (byte & 0x7f) as u64;
        if shift == 63 && bits > 1 {
            return None;
        }
        result |= bits << shift;
        if byte & 0x80 == 0 {
            *input = &input[i + 1..];
            return Some(result);
        }
        shift += 7;
    }

    None
}

/// Decode a varint-length-prefixed slice from the front of `input`
pub fn get_length_prefixed_slice<'a>(input: &mut &'a [u8]) -> Option<&'a [u8]> {
    let mut cursor = *input;
    let len = get_varint64(&mut cursor)? as usize;
    if cursor.len() < len {
        return None;
    }
    let (slice, rest) = cursor.split_at(len);
    *input = rest;
    Some(slice)
}

/// Append a varint-length-prefixed slice
pub fn put_length_prefixed_slice<B: BufMut>(dst: &mut B, data: &[u8]) {
    put_varint64(dst, data.len() as u64);
    dst.put_slice(data);
}
