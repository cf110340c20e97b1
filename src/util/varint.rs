//! Variable-length integer encoding.
//!
//! Seven payload bits per byte, least significant group first, high bit set
//! on every byte except the last. Every count, delta and field number in the
//! index files uses this encoding.

use std::io::{Read, Write};

use byteorder::ReadBytesExt;

use crate::error::{Result, StratumError};

/// Encode a u64 value using variable-length encoding.
pub fn encode_u64(value: u64) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(encoded_len(value));
    let mut val = value;

    while val >= 0x80 {
        bytes.push((val as u8 & 0x7F) | 0x80);
        val >>= 7;
    }
    bytes.push(val as u8);

    bytes
}

/// Number of bytes `value` occupies once encoded.
pub fn encoded_len(value: u64) -> usize {
    let bits = 64 - value.leading_zeros() as usize;
    bits.div_ceil(7).max(1)
}

/// Write a variable-length encoded u32 to a writer.
pub fn write_u32<W: Write>(writer: &mut W, value: u32) -> Result<usize> {
    write_u64(writer, value as u64)
}

/// Write a variable-length encoded u64 to a writer.
pub fn write_u64<W: Write>(writer: &mut W, value: u64) -> Result<usize> {
    let bytes = encode_u64(value);
    writer.write_all(&bytes)?;
    Ok(bytes.len())
}

fn read_bounded<R: Read>(reader: &mut R, bits: u32) -> Result<u64> {
    let mut result = 0u64;
    let mut shift = 0u32;

    loop {
        let byte = reader.read_u8()?;

        if shift >= bits {
            return Err(StratumError::corruption("VarInt overflow"));
        }

        let payload = (byte & 0x7F) as u64;
        if bits < 64 && (payload << shift) >> bits != 0 {
            return Err(StratumError::corruption("VarInt overflow"));
        }
        result |= payload << shift;

        if (byte & 0x80) == 0 {
            return Ok(result);
        }

        shift += 7;
    }
}

/// Read a variable-length encoded u32 from a reader.
pub fn read_u32<R: Read>(reader: &mut R) -> Result<u32> {
    Ok(read_bounded(reader, 32)? as u32)
}

/// Read a variable-length encoded u64 from a reader.
pub fn read_u64<R: Read>(reader: &mut R) -> Result<u64> {
    read_bounded(reader, 64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn test_write_read_u32() {
        for value in [0u32, 1, 127, 128, 255, 16383, 16384, u32::MAX] {
            let mut buffer = Vec::new();
            let bytes_written = write_u32(&mut buffer, value).unwrap();
            assert_eq!(bytes_written, buffer.len());
            assert_eq!(bytes_written, encoded_len(value as u64));

            let mut cursor = Cursor::new(buffer);
            assert_eq!(read_u32(&mut cursor).unwrap(), value);
        }
    }

    #[test]
    fn test_write_read_u64() {
        let mut buffer = Vec::new();
        let value = 123456789012345u64;

        write_u64(&mut buffer, value).unwrap();
        write_u64(&mut buffer, u64::MAX).unwrap();

        let mut cursor = Cursor::new(buffer);
        assert_eq!(read_u64(&mut cursor).unwrap(), value);
        assert_eq!(read_u64(&mut cursor).unwrap(), u64::MAX);
    }

    #[test]
    fn test_encoding_efficiency() {
        assert_eq!(encode_u64(0), vec![0]);
        assert_eq!(encode_u64(127), vec![0x7F]);
        assert_eq!(encode_u64(128), vec![0x80, 0x01]);
        assert_eq!(encode_u64(16384).len(), 3);
        assert_eq!(encode_u64(u32::MAX as u64).len(), 5);
        assert_eq!(encode_u64(u64::MAX).len(), 10);
    }

    #[test]
    fn test_incomplete_varint() {
        let mut cursor = Cursor::new(vec![0x80]);
        assert!(read_u32(&mut cursor).is_err());
    }

    #[test]
    fn test_overflow() {
        let mut cursor = Cursor::new(vec![0xFF; 10]);
        let err = read_u32(&mut cursor).unwrap_err();
        assert!(err.is_corruption());
    }
}
