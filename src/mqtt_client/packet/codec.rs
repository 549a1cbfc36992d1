// MIT License
//
// Copyright (c) 2025 Takatoshi Kondo
//
// Permission is hereby granted, free of charge, to any person obtaining a copy
// of this software and associated documentation files (the "Software"), to deal
// in the Software without restriction, including without limitation the rights
// to use, copy, modify, merge, publish, distribute, sublicense, and/or sell
// copies of the Software, and to permit persons to whom the Software is
// furnished to do so, subject to the following conditions:
//
// The above copyright notice and this permission notice shall be included in all
// copies or substantial portions of the Software.
//
// THE SOFTWARE IS PROVIDED "AS IS", WITHOUT WARRANTY OF ANY KIND, EXPRESS OR
// IMPLIED, INCLUDING BUT NOT LIMITED TO THE WARRANTIES OF MERCHANTABILITY,
// FITNESS FOR A PARTICULAR PURPOSE AND NONINFRINGEMENT. IN NO EVENT SHALL THE
// AUTHORS OR COPYRIGHT HOLDERS BE LIABLE FOR ANY CLAIM, DAMAGES OR OTHER
// LIABILITY, WHETHER IN AN ACTION OF CONTRACT, TORT OR OTHERWISE, ARISING FROM,
// OUT OF OR IN CONNECTION WITH THE SOFTWARE OR THE USE OR OTHER DEALINGS IN THE
// SOFTWARE.

//! Wire-level primitives shared by all packet encoders/decoders: big-endian
//! integers, length-prefixed strings and binary data, and the MQTT
//! variable byte integer.

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::mqtt_client::error::ProtocolError;

/// Largest value a variable byte integer can carry (4 bytes, 7 bits each).
pub const VARIABLE_INT_MAX: u32 = 268_435_455;

pub fn read_u8(buf: &mut Bytes) -> Result<u8, ProtocolError> {
    if buf.remaining() < 1 {
        return Err(ProtocolError::MalformedPacket);
    }
    Ok(buf.get_u8())
}

pub fn read_u16(buf: &mut Bytes) -> Result<u16, ProtocolError> {
    if buf.remaining() < 2 {
        return Err(ProtocolError::MalformedPacket);
    }
    Ok(buf.get_u16())
}

pub fn read_u32(buf: &mut Bytes) -> Result<u32, ProtocolError> {
    if buf.remaining() < 4 {
        return Err(ProtocolError::MalformedPacket);
    }
    Ok(buf.get_u32())
}

/// Read a variable byte integer from a complete packet body.
///
/// Unlike [`peek_variable_int`], running out of bytes here means the packet
/// body is inconsistent with its remaining length and is malformed.
pub fn read_variable_int(buf: &mut Bytes) -> Result<u32, ProtocolError> {
    let mut value: u32 = 0;
    for shift in 0..4 {
        let byte = read_u8(buf)?;
        value |= u32::from(byte & 0x7F) << (7 * shift);
        if byte & 0x80 == 0 {
            return Ok(value);
        }
    }
    Err(ProtocolError::MalformedRemainingLength)
}

/// Try to read a variable byte integer from a possibly-incomplete buffer.
///
/// Returns `Ok(None)` when the buffer ends before the terminating byte (the
/// caller should wait for more data), `Ok(Some((value, len)))` on success,
/// and an error when a fifth continuation byte is present.
pub fn peek_variable_int(buf: &[u8]) -> Result<Option<(u32, usize)>, ProtocolError> {
    let mut value: u32 = 0;
    for (i, &byte) in buf.iter().enumerate() {
        if i == 4 {
            return Err(ProtocolError::MalformedRemainingLength);
        }
        value |= u32::from(byte & 0x7F) << (7 * i);
        if byte & 0x80 == 0 {
            return Ok(Some((value, i + 1)));
        }
    }
    if buf.len() >= 4 {
        return Err(ProtocolError::MalformedRemainingLength);
    }
    Ok(None)
}

pub fn write_variable_int(buf: &mut BytesMut, mut value: u32) -> Result<(), ProtocolError> {
    if value > VARIABLE_INT_MAX {
        return Err(ProtocolError::MalformedRemainingLength);
    }
    loop {
        let mut byte = (value & 0x7F) as u8;
        value >>= 7;
        if value > 0 {
            byte |= 0x80;
        }
        buf.put_u8(byte);
        if value == 0 {
            return Ok(());
        }
    }
}

/// Number of bytes the variable byte integer encoding of `value` occupies.
pub fn variable_int_len(value: u32) -> usize {
    match value {
        0..=127 => 1,
        128..=16_383 => 2,
        16_384..=2_097_151 => 3,
        _ => 4,
    }
}

/// Read a UTF-8 string prefixed by its 16-bit big-endian length.
pub fn read_string(buf: &mut Bytes) -> Result<String, ProtocolError> {
    let data = read_binary(buf)?;
    String::from_utf8(data.to_vec()).map_err(|_| ProtocolError::InvalidUtf8)
}

/// Read binary data prefixed by its 16-bit big-endian length.
pub fn read_binary(buf: &mut Bytes) -> Result<Bytes, ProtocolError> {
    let len = read_u16(buf)? as usize;
    if buf.remaining() < len {
        return Err(ProtocolError::MalformedPacket);
    }
    Ok(buf.split_to(len))
}

pub fn write_string(buf: &mut BytesMut, value: &str) {
    write_binary(buf, value.as_bytes());
}

pub fn write_binary(buf: &mut BytesMut, value: &[u8]) {
    debug_assert!(value.len() <= u16::MAX as usize);
    buf.put_u16(value.len() as u16);
    buf.put_slice(value);
}
