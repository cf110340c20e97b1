//! Structured file I/O for the index file formats.
//!
//! [`StructWriter`] and [`StructReader`] wrap a storage stream and add the
//! primitive encodings every index file is built from: big-endian `i32`/`i64`,
//! variable-length integers and length-prefixed UTF-8 strings. Both track the
//! byte position so callers can record file pointers as they go.

use std::io::{Read, SeekFrom, Write};

use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};

use crate::error::{Result, StratumError};
use crate::storage::{Storage, StorageInput, StorageOutput};
use crate::util::varint;

/// A structured file writer for binary data.
#[derive(Debug)]
pub struct StructWriter<W: StorageOutput> {
    writer: W,
    position: u64,
}

/// Writer over a storage output obtained from [`Storage::create_output`].
pub type IndexOutput = StructWriter<Box<dyn StorageOutput>>;

/// Reader over a storage input obtained from [`Storage::open_input`].
pub type IndexInput = StructReader<Box<dyn StorageInput>>;

/// Create `name` in `storage` and wrap it for structured writes.
pub fn create_output(storage: &dyn Storage, name: &str) -> Result<IndexOutput> {
    Ok(StructWriter::new(storage.create_output(name)?))
}

/// Open `name` in `storage` and wrap it for structured reads.
pub fn open_input(storage: &dyn Storage, name: &str) -> Result<IndexInput> {
    StructReader::new(storage.open_input(name)?)
}

impl<W: StorageOutput> StructWriter<W> {
    /// Create a new structured file writer.
    pub fn new(writer: W) -> Self {
        StructWriter {
            writer,
            position: 0,
        }
    }

    /// Write a single byte.
    pub fn write_u8(&mut self, value: u8) -> Result<()> {
        WriteBytesExt::write_u8(self, value)?;
        Ok(())
    }

    /// Write an i32 value (big-endian).
    pub fn write_i32(&mut self, value: i32) -> Result<()> {
        WriteBytesExt::write_i32::<BigEndian>(self, value)?;
        Ok(())
    }

    /// Write an i64 value (big-endian).
    pub fn write_i64(&mut self, value: i64) -> Result<()> {
        WriteBytesExt::write_i64::<BigEndian>(self, value)?;
        Ok(())
    }

    /// Write a variable-length u32.
    pub fn write_vint(&mut self, value: u32) -> Result<()> {
        varint::write_u32(self, value)?;
        Ok(())
    }

    /// Write a variable-length u64.
    pub fn write_vlong(&mut self, value: u64) -> Result<()> {
        varint::write_u64(self, value)?;
        Ok(())
    }

    /// Write a string as a vint byte length followed by its UTF-8 bytes.
    pub fn write_string(&mut self, value: &str) -> Result<()> {
        self.write_bytes(value.as_bytes())
    }

    /// Write raw bytes with a vint length prefix.
    pub fn write_bytes(&mut self, value: &[u8]) -> Result<()> {
        self.write_vint(value.len() as u32)?;
        self.write_raw(value)
    }

    /// Write raw bytes without length prefix.
    pub fn write_raw(&mut self, value: &[u8]) -> Result<()> {
        self.write_all(value)?;
        Ok(())
    }

    /// Get current file position.
    pub fn position(&self) -> u64 {
        self.position
    }

    /// Move the write position, typically to patch a reserved header.
    pub fn seek(&mut self, position: u64) -> Result<()> {
        self.writer.seek(SeekFrom::Start(position))?;
        self.position = position;
        Ok(())
    }

    /// Flush and close the writer.
    pub fn close(mut self) -> Result<()> {
        self.writer.close()
    }
}

impl<W: StorageOutput> Write for StructWriter<W> {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        let n = self.writer.write(buf)?;
        self.position += n as u64;
        Ok(n)
    }

    fn flush(&mut self) -> std::io::Result<()> {
        self.writer.flush()
    }
}

/// A structured file reader for binary data.
#[derive(Debug)]
pub struct StructReader<R: StorageInput> {
    reader: R,
    position: u64,
    file_size: u64,
}

impl<R: StorageInput> StructReader<R> {
    /// Create a new structured file reader.
    pub fn new(reader: R) -> Result<Self> {
        let file_size = reader.size()?;
        Ok(StructReader {
            reader,
            position: 0,
            file_size,
        })
    }

    /// Read a single byte.
    pub fn read_u8(&mut self) -> Result<u8> {
        Ok(ReadBytesExt::read_u8(self)?)
    }

    /// Read an i32 value (big-endian).
    pub fn read_i32(&mut self) -> Result<i32> {
        Ok(ReadBytesExt::read_i32::<BigEndian>(self)?)
    }

    /// Read an i64 value (big-endian).
    pub fn read_i64(&mut self) -> Result<i64> {
        Ok(ReadBytesExt::read_i64::<BigEndian>(self)?)
    }

    /// Read a variable-length u32.
    pub fn read_vint(&mut self) -> Result<u32> {
        varint::read_u32(self)
    }

    /// Read a variable-length u64.
    pub fn read_vlong(&mut self) -> Result<u64> {
        varint::read_u64(self)
    }

    /// Read a string written by [`StructWriter::write_string`].
    pub fn read_string(&mut self) -> Result<String> {
        let bytes = self.read_bytes()?;
        String::from_utf8(bytes)
            .map_err(|e| StratumError::corruption(format!("Invalid UTF-8 in string: {e}")))
    }

    /// Read raw bytes with a vint length prefix.
    pub fn read_bytes(&mut self) -> Result<Vec<u8>> {
        let length = self.read_vint()? as usize;
        self.read_raw(length)
    }

    /// Read exactly `length` raw bytes.
    pub fn read_raw(&mut self, length: usize) -> Result<Vec<u8>> {
        if length as u64 > self.remaining() {
            return Err(StratumError::corruption(format!(
                "Read of {length} bytes past end of file at {}",
                self.position
            )));
        }
        let mut buffer = vec![0u8; length];
        self.read_exact(&mut buffer)?;
        Ok(buffer)
    }

    /// Get current file position.
    pub fn position(&self) -> u64 {
        self.position
    }

    /// Get file size.
    pub fn size(&self) -> u64 {
        self.file_size
    }

    /// Bytes left between the position and the end of the file.
    pub fn remaining(&self) -> u64 {
        self.file_size.saturating_sub(self.position)
    }

    /// Check if at end of file.
    pub fn is_eof(&self) -> bool {
        self.position >= self.file_size
    }

    /// Move the read position.
    pub fn seek(&mut self, position: u64) -> Result<()> {
        self.reader.seek(SeekFrom::Start(position))?;
        self.position = position;
        Ok(())
    }

    /// Open an independent reader over the same file at the same position.
    pub fn try_clone(&self) -> Result<IndexInput> {
        Ok(StructReader {
            reader: self.reader.clone_input()?,
            position: self.position,
            file_size: self.file_size,
        })
    }
}

impl<R: StorageInput> Read for StructReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        let n = self.reader.read(buf)?;
        self.position += n as u64;
        Ok(n)
    }
}
