//! # Byte Streams
//!
//! The seekable byte-reader abstraction every parser reads through.
//!
//! [`ByteReader`] wraps any `Read + Seek` source and adds the typed reads the
//! container grammars need: endian-selectable integers and floats, the 80-bit
//! extended float used by AIFF sample rates, Wave64 GUIDs, four-char codes and
//! Pascal strings. It tracks its own position so EOF checks do not touch the
//! underlying stream.

use std::fmt;
use std::io::{self, Read, Seek, SeekFrom};

use core_metadata::text::decode_text;
use uuid::Uuid;

use crate::error::{ReaderError, Result};

/// Any byte source a reader can be opened on.
pub trait MediaStream: Read + Seek + Send {}

impl<T: Read + Seek + Send + ?Sized> MediaStream for T {}

/// A stream plus the display name its reader will carry.
pub struct NamedStream {
    pub name: String,
    pub stream: Box<dyn MediaStream>,
}

impl NamedStream {
    pub fn new(name: impl Into<String>, stream: impl MediaStream + 'static) -> Self {
        Self {
            name: name.into(),
            stream: Box::new(stream),
        }
    }
}

impl fmt::Debug for NamedStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NamedStream").field("name", &self.name).finish()
    }
}

/// Typed, endian-aware reads over a byte stream.
pub struct ByteReader<S> {
    inner: S,
    big_endian: bool,
    position: u64,
    length: Option<u64>,
    positionable: bool,
    hit_eof: bool,
}

impl<S: Read + Seek> ByteReader<S> {
    /// Wraps `inner`, measuring its length when it can seek.
    ///
    /// Sources whose seeks fail (pipes, sockets) are accepted as
    /// non-positionable; they can still be read front to back.
    pub fn new(mut inner: S) -> Result<Self> {
        let measured = inner.stream_position().and_then(|start| {
            let end = inner.seek(SeekFrom::End(0))?;
            Ok((start, end))
        });

        let (position, length, positionable) = match measured {
            Ok((start, end)) => {
                inner.seek(SeekFrom::Start(start))?;
                (start, Some(end), true)
            }
            Err(_) => (0, None, false),
        };

        Ok(Self {
            inner,
            big_endian: false,
            position,
            length,
            positionable,
            hit_eof: false,
        })
    }

    pub fn set_big_endian(&mut self, big_endian: bool) {
        self.big_endian = big_endian;
    }

    pub fn is_big_endian(&self) -> bool {
        self.big_endian
    }

    pub fn is_positionable(&self) -> bool {
        self.positionable
    }

    pub fn position(&self) -> u64 {
        self.position
    }

    /// Physical length, if the stream could be measured.
    pub fn length(&self) -> Option<u64> {
        self.length
    }

    /// Bytes left before physical EOF, if known.
    pub fn remaining(&self) -> Option<u64> {
        self.length.map(|len| len.saturating_sub(self.position))
    }

    pub fn is_eof(&self) -> bool {
        self.hit_eof || self.length.is_some_and(|len| self.position >= len)
    }

    pub fn get_mut(&mut self) -> &mut S {
        &mut self.inner
    }

    pub fn into_inner(self) -> S {
        self.inner
    }

    // ========================================================================
    // Positioning
    // ========================================================================

    pub fn seek_to(&mut self, position: u64) -> Result<()> {
        if position == self.position {
            return Ok(());
        }

        if !self.positionable {
            if position > self.position {
                return self.discard(position - self.position);
            }
            return Err(ReaderError::SeekFailed(format!(
                "cannot rewind a non-positionable stream to {}",
                position
            )));
        }

        self.inner.seek(SeekFrom::Start(position))?;
        self.position = position;
        self.hit_eof = false;
        Ok(())
    }

    /// Moves relative to the current position.
    pub fn skip(&mut self, offset: i64) -> Result<()> {
        let target = self.position as i64 + offset;
        if target < 0 {
            return Err(ReaderError::InvalidFilePosition(target));
        }
        self.seek_to(target as u64)
    }

    fn discard(&mut self, count: u64) -> Result<()> {
        let copied = io::copy(&mut (&mut self.inner).take(count), &mut io::sink())?;
        self.position += copied;
        if copied < count {
            self.hit_eof = true;
        }
        Ok(())
    }

    // ========================================================================
    // Raw reads
    // ========================================================================

    /// Reads until `buf` is full or the stream ends; returns the byte count.
    pub fn read_some(&mut self, buf: &mut [u8]) -> Result<usize> {
        let mut filled = 0;

        while filled < buf.len() {
            match self.inner.read(&mut buf[filled..]) {
                Ok(0) => {
                    self.hit_eof = true;
                    break;
                }
                Ok(n) => filled += n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e.into()),
            }
        }

        self.position += filled as u64;
        Ok(filled)
    }

    /// Fills `buf` completely or fails with [`ReaderError::UnexpectedEof`].
    pub fn read_exact(&mut self, buf: &mut [u8]) -> Result<()> {
        let read = self.read_some(buf)?;
        if read < buf.len() {
            return Err(ReaderError::UnexpectedEof(format!(
                "wanted {} bytes at {}, got {}",
                buf.len(),
                self.position - read as u64,
                read
            )));
        }
        Ok(())
    }

    pub fn read_array<const N: usize>(&mut self) -> Result<[u8; N]> {
        let mut bytes = [0u8; N];
        self.read_exact(&mut bytes)?;
        Ok(bytes)
    }

    /// Reads `len` bytes into a fresh buffer.
    ///
    /// The allocation is fallible because `len` usually comes from the file.
    pub fn read_bytes(&mut self, len: usize) -> Result<Vec<u8>> {
        let mut bytes = Vec::new();
        bytes
            .try_reserve_exact(len)
            .map_err(|e| ReaderError::Memory(format!("{} byte buffer: {}", len, e)))?;
        bytes.resize(len, 0);
        self.read_exact(&mut bytes)?;
        Ok(bytes)
    }

    // ========================================================================
    // Typed reads
    // ========================================================================

    pub fn read_u8(&mut self) -> Result<u8> {
        Ok(self.read_array::<1>()?[0])
    }

    pub fn read_i8(&mut self) -> Result<i8> {
        Ok(self.read_u8()? as i8)
    }

    pub fn read_u16(&mut self) -> Result<u16> {
        let bytes = self.read_array()?;
        Ok(if self.big_endian {
            u16::from_be_bytes(bytes)
        } else {
            u16::from_le_bytes(bytes)
        })
    }

    pub fn read_i16(&mut self) -> Result<i16> {
        Ok(self.read_u16()? as i16)
    }

    pub fn read_u32(&mut self) -> Result<u32> {
        let bytes = self.read_array()?;
        Ok(if self.big_endian {
            u32::from_be_bytes(bytes)
        } else {
            u32::from_le_bytes(bytes)
        })
    }

    pub fn read_i32(&mut self) -> Result<i32> {
        Ok(self.read_u32()? as i32)
    }

    pub fn read_u64(&mut self) -> Result<u64> {
        let bytes = self.read_array()?;
        Ok(if self.big_endian {
            u64::from_be_bytes(bytes)
        } else {
            u64::from_le_bytes(bytes)
        })
    }

    pub fn read_i64(&mut self) -> Result<i64> {
        Ok(self.read_u64()? as i64)
    }

    pub fn read_f32(&mut self) -> Result<f32> {
        Ok(f32::from_bits(self.read_u32()?))
    }

    pub fn read_f64(&mut self) -> Result<f64> {
        Ok(f64::from_bits(self.read_u64()?))
    }

    /// Reads an 80-bit IEEE 754 extended-precision float.
    pub fn read_f80(&mut self) -> Result<f64> {
        let mut bytes: [u8; 10] = self.read_array()?;
        if !self.big_endian {
            bytes.reverse();
        }
        Ok(extended_to_f64(&bytes))
    }

    /// Reads a GUID stored with little-endian leading fields, as Wave64 and
    /// WAVE-extensible sub-formats do.
    pub fn read_guid(&mut self) -> Result<Uuid> {
        Ok(Uuid::from_bytes_le(self.read_array()?))
    }

    pub fn read_fourcc(&mut self) -> Result<[u8; 4]> {
        self.read_array()
    }

    /// Reads a length-prefixed string padded to an even total size.
    pub fn read_pascal_string(&mut self) -> Result<String> {
        let len = self.read_u8()? as usize;
        let bytes = self.read_bytes(len)?;
        if (len + 1) % 2 != 0 {
            self.read_u8()?;
        }
        Ok(decode_text(&bytes))
    }

    /// Reads a fixed-width, NUL-padded text field.
    pub fn read_fixed_text(&mut self, len: usize) -> Result<String> {
        let bytes = self.read_bytes(len)?;
        Ok(decode_text(&bytes))
    }
}

/// Converts a big-endian 80-bit extended float to `f64`.
pub fn extended_to_f64(bytes: &[u8; 10]) -> f64 {
    let negative = bytes[0] & 0x80 != 0;
    let exponent = (i32::from(bytes[0] & 0x7f) << 8) | i32::from(bytes[1]);
    let mut mantissa_bytes = [0u8; 8];
    mantissa_bytes.copy_from_slice(&bytes[2..10]);
    let mantissa = u64::from_be_bytes(mantissa_bytes);

    let magnitude = if exponent == 0 && mantissa == 0 {
        0.0
    } else if exponent == 0x7fff {
        if mantissa << 1 == 0 {
            f64::INFINITY
        } else {
            f64::NAN
        }
    } else {
        mantissa as f64 * 2f64.powi(exponent - 16383 - 63)
    };

    if negative {
        -magnitude
    } else {
        magnitude
    }
}
