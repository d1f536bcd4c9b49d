//! Bounds-checked little-endian reads and writes over byte buffers.

use crate::bundler::error::{Error, Result};

/// Reader over a borrowed byte slice. Every read checks bounds.
#[derive(Debug, Clone)]
pub struct ByteCursor<'a> {
    bytes: &'a [u8],
    position: usize,
}

impl<'a> ByteCursor<'a> {
    /// Starts reading `bytes` at `position`.
    pub fn new(bytes: &'a [u8], position: usize) -> Result<Self> {
        if position > bytes.len() {
            return Err(Error::format(format!(
                "offset {position} is past the end of the {}-byte source",
                bytes.len()
            )));
        }
        Ok(Self { bytes, position })
    }

    /// Current offset into the source.
    pub fn position(&self) -> usize {
        self.position
    }

    fn take(&mut self, len: usize, what: &str) -> Result<&'a [u8]> {
        let end = self
            .position
            .checked_add(len)
            .filter(|end| *end <= self.bytes.len())
            .ok_or_else(|| {
                Error::format(format!(
                    "unexpected end of data reading {what} at offset {}",
                    self.position
                ))
            })?;
        let slice = &self.bytes[self.position..end];
        self.position = end;
        Ok(slice)
    }

    fn array<const N: usize>(&mut self, what: &str) -> Result<[u8; N]> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.take(N, what)?);
        Ok(out)
    }

    /// Reads one byte.
    pub fn read_u8(&mut self, what: &str) -> Result<u8> {
        Ok(self.take(1, what)?[0])
    }

    /// Reads a little-endian `u32`.
    pub fn read_u32(&mut self, what: &str) -> Result<u32> {
        self.array(what).map(u32::from_le_bytes)
    }

    /// Reads a little-endian `i32`.
    pub fn read_i32(&mut self, what: &str) -> Result<i32> {
        self.array(what).map(i32::from_le_bytes)
    }

    /// Reads a little-endian `i64`.
    pub fn read_i64(&mut self, what: &str) -> Result<i64> {
        self.array(what).map(i64::from_le_bytes)
    }

    /// Reads a little-endian `u64`.
    pub fn read_u64(&mut self, what: &str) -> Result<u64> {
        self.array(what).map(u64::from_le_bytes)
    }

    /// Reads a UTF-8 string prefixed with its 7-bit encoded byte length.
    pub fn read_string(&mut self, what: &str) -> Result<String> {
        let len = self.read_7bit_length(what)?;
        let bytes = self.take(len, what)?;
        String::from_utf8(bytes.to_vec())
            .map_err(|e| Error::format(format!("{what} is not valid UTF-8: {e}")))
    }

    fn read_7bit_length(&mut self, what: &str) -> Result<usize> {
        let mut value: u32 = 0;
        // At most five bytes encode a 32-bit length.
        for shift in (0..35).step_by(7) {
            let byte = self.read_u8(what)?;
            if shift == 28 && byte > 0x0f {
                return Err(Error::format(format!("{what} has an invalid length prefix")));
            }
            value |= u32::from(byte & 0x7f) << shift;
            if byte & 0x80 == 0 {
                return i32::try_from(value)
                    .ok()
                    .and_then(|v| usize::try_from(v).ok())
                    .ok_or_else(|| Error::format(format!("{what} has a negative length")));
            }
        }
        Err(Error::format(format!("{what} has an invalid length prefix")))
    }
}

/// Little-endian append helpers for building bundle manifests.
pub trait ByteSink {
    /// Appends a `u32`.
    fn put_u32(&mut self, value: u32);
    /// Appends an `i32`.
    fn put_i32(&mut self, value: i32);
    /// Appends an `i64`.
    fn put_i64(&mut self, value: i64);
    /// Appends a `u64`.
    fn put_u64(&mut self, value: u64);
    /// Appends a string with a 7-bit encoded length prefix.
    fn put_string(&mut self, value: &str);
}

impl ByteSink for Vec<u8> {
    fn put_u32(&mut self, value: u32) {
        self.extend_from_slice(&value.to_le_bytes());
    }

    fn put_i32(&mut self, value: i32) {
        self.extend_from_slice(&value.to_le_bytes());
    }

    fn put_i64(&mut self, value: i64) {
        self.extend_from_slice(&value.to_le_bytes());
    }

    fn put_u64(&mut self, value: u64) {
        self.extend_from_slice(&value.to_le_bytes());
    }

    fn put_string(&mut self, value: &str) {
        let mut len = value.len();
        while len >= 0x80 {
            self.push((len as u8) | 0x80);
            len >>= 7;
        }
        self.push(len as u8);
        self.extend_from_slice(value.as_bytes());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reads_scalars_in_order() {
        let mut bytes = Vec::new();
        bytes.put_u32(6);
        bytes.put_i32(-2);
        bytes.put_i64(1 << 40);
        bytes.put_u64(u64::MAX);
        let mut cursor = ByteCursor::new(&bytes, 0).unwrap();
        assert_eq!(cursor.read_u32("a").unwrap(), 6);
        assert_eq!(cursor.read_i32("b").unwrap(), -2);
        assert_eq!(cursor.read_i64("c").unwrap(), 1 << 40);
        assert_eq!(cursor.read_u64("d").unwrap(), u64::MAX);
        assert_eq!(cursor.position(), bytes.len());
    }

    #[test]
    fn long_strings_use_multibyte_prefix() {
        let text = "x".repeat(300);
        let mut bytes = Vec::new();
        bytes.put_string(&text);
        assert_eq!(&bytes[..2], &[0xac, 0x02]);
        let mut cursor = ByteCursor::new(&bytes, 0).unwrap();
        assert_eq!(cursor.read_string("path").unwrap(), text);
    }

    #[test]
    fn truncated_reads_fail() {
        let bytes = [1u8, 2, 3];
        let mut cursor = ByteCursor::new(&bytes, 0).unwrap();
        let err = cursor.read_u32("majorVersion").unwrap_err();
        assert!(err.to_string().contains("majorVersion"));
        assert!(ByteCursor::new(&bytes, 4).is_err());

        let mut short_string = Vec::new();
        short_string.put_string("hello");
        short_string.truncate(4);
        let mut cursor = ByteCursor::new(&short_string, 0).unwrap();
        assert!(cursor.read_string("bundleId").is_err());
    }
}
