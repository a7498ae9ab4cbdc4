//! Delta + variable-byte coding for ascending id sequences.
//!
//! Layout: `count, delta[0], delta[1], ...` where `delta[0] = v[0]` and
//! `delta[i] = v[i] - v[i-1]`. Each number is written in base 128, most
//! significant digit first; every byte is `< 128` except the last digit,
//! which carries `+128` as its terminator.

use crate::error::CodecError;

/// Widest encoding of a u64 (ceil(64 / 7)).
const MAX_DIGITS: usize = 10;

fn push_number(mut n: u64, out: &mut Vec<u8>) {
    let mut digits = [0u8; MAX_DIGITS];
    let mut i = MAX_DIGITS;
    loop {
        i -= 1;
        digits[i] = (n % 128) as u8;
        n /= 128;
        if n == 0 { break; }
    }
    digits[MAX_DIGITS - 1] += 128;
    out.extend_from_slice(&digits[i..]);
}

/// Read one number starting at `pos`, returning it and the position after it.
fn read_number(buf: &[u8], mut pos: usize) -> Result<(u64, usize), CodecError> {
    let mut acc: u64 = 0;
    loop {
        let byte = *buf.get(pos).ok_or(CodecError::Truncated { consumed: pos })?;
        pos += 1;
        let digit = if byte < 128 { byte } else { byte - 128 };
        acc = acc
            .checked_mul(128)
            .and_then(|a| a.checked_add(digit as u64))
            .ok_or(CodecError::Overflow)?;
        if byte >= 128 {
            return Ok((acc, pos));
        }
    }
}

/// Encode an ascending, duplicate-free sequence. Empty input encodes to no bytes.
pub fn encode(values: &[u64]) -> Vec<u8> {
    if values.is_empty() {
        return Vec::new();
    }
    let mut out = Vec::with_capacity(values.len() + 2);
    push_number(values.len() as u64, &mut out);
    let mut prev = 0u64;
    for &v in values {
        push_number(v - prev, &mut out);
        prev = v;
    }
    out
}

/// Decode a buffer, returning the values and the number of bytes consumed.
pub fn decode_with_len(buf: &[u8]) -> Result<(Vec<u64>, usize), CodecError> {
    if buf.is_empty() {
        return Ok((Vec::new(), 0));
    }
    let (count, mut pos) = read_number(buf, 0)?;
    // every value takes at least one byte, so a larger count cannot be honest
    let mut values = Vec::with_capacity((count as usize).min(buf.len()));
    let mut prev = 0u64;
    for _ in 0..count {
        let (delta, next) = read_number(buf, pos)?;
        pos = next;
        prev = prev.checked_add(delta).ok_or(CodecError::Overflow)?;
        values.push(prev);
    }
    Ok((values, pos))
}

pub fn decode(buf: &[u8]) -> Result<Vec<u64>, CodecError> {
    decode_with_len(buf).map(|(values, _)| values)
}

/// Bytes occupied by the encoded sequence at the start of `buf`.
pub fn encoded_len(buf: &[u8]) -> Result<usize, CodecError> {
    if buf.is_empty() {
        return Ok(0);
    }
    let (count, mut pos) = read_number(buf, 0)?;
    for _ in 0..count {
        pos = read_number(buf, pos)?.1;
    }
    Ok(pos)
}
