//! Checkpoint field codec
//!
//! Per-synapse records are streamed as text, one whitespace-terminated
//! field at a time, in a fixed order: the base spiking-synapse record
//! first, then the fields each synapse family appends. Reading is
//! symmetric with writing; the reader consumes the terminator after
//! every field and reports the field name and 1-based position on
//! failure so the engine can attribute the error to a synapse.

use crate::error::{Result, StorageError};
use std::fmt::Display;
use std::io::{BufRead, Write};
use std::str::FromStr;

/// Writes whitespace-terminated checkpoint fields to an output stream
#[derive(Debug)]
pub struct FieldWriter<W: Write> {
    inner: W,
    written: u64,
}

impl<W: Write> FieldWriter<W> {
    /// Create a writer over an output stream
    pub fn new(inner: W) -> Self {
        Self { inner, written: 0 }
    }

    /// Write one field followed by its line terminator
    pub fn field<T: Display>(&mut self, value: T) -> Result<()> {
        writeln!(self.inner, "{}", value)?;
        self.written += 1;
        Ok(())
    }

    /// Number of fields written so far
    pub fn written(&self) -> u64 {
        self.written
    }

    /// Flush and hand back the underlying stream
    pub fn into_inner(mut self) -> Result<W> {
        self.inner.flush()?;
        Ok(self.inner)
    }
}

/// Reads whitespace-terminated checkpoint fields from an input stream
#[derive(Debug)]
pub struct FieldReader<R: BufRead> {
    inner: R,
    position: u64,
}

impl<R: BufRead> FieldReader<R> {
    /// Create a reader over an input stream
    pub fn new(inner: R) -> Self {
        Self { inner, position: 0 }
    }

    /// 1-based position of the next field to be read
    pub fn position(&self) -> u64 {
        self.position + 1
    }

    /// Read and parse the next field
    pub fn field<T: FromStr>(&mut self, name: &'static str) -> Result<T> {
        let position = self.position + 1;
        let token = self
            .next_token()?
            .ok_or(StorageError::MissingField { field: name, position })?;
        self.position = position;
        token
            .parse()
            .map_err(|_| StorageError::parse_field(name, position, token))
    }

    /// Read a field encoded as `0`/`1`
    pub fn bool_field(&mut self, name: &'static str) -> Result<bool> {
        let position = self.position + 1;
        match self.field::<u8>(name)? {
            0 => Ok(false),
            1 => Ok(true),
            other => Err(StorageError::invalid_value(name, position, other.to_string())),
        }
    }

    /// Collect the next whitespace-delimited token, or `None` at end of
    /// stream. The terminator following the token is consumed.
    fn next_token(&mut self) -> Result<Option<String>> {
        let mut token = Vec::new();

        loop {
            let buf = self.inner.fill_buf()?;
            if buf.is_empty() {
                break;
            }

            let mut consumed = 0;
            let mut done = false;
            for &byte in buf {
                if byte.is_ascii_whitespace() {
                    consumed += 1;
                    if !token.is_empty() {
                        done = true;
                        break;
                    }
                } else {
                    token.push(byte);
                    consumed += 1;
                }
            }
            self.inner.consume(consumed);
            if done {
                break;
            }
        }

        if token.is_empty() {
            Ok(None)
        } else {
            // Fields are numeric or 0/1 flags; anything else fails the
            // parse with the raw token attached.
            Ok(Some(String::from_utf8_lossy(&token).into_owned()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn test_write_then_read_roundtrip() {
        let mut writer = FieldWriter::new(Vec::new());
        writer.field(7i32).unwrap();
        writer.field(5.0265e-7f64).unwrap();
        writer.field(true as u8).unwrap();
        assert_eq!(writer.written(), 3);
        let bytes = writer.into_inner().unwrap();

        let mut reader = FieldReader::new(Cursor::new(bytes));
        assert_eq!(reader.field::<i32>("totalDelayPost").unwrap(), 7);
        assert_eq!(reader.field::<f64>("Wex").unwrap(), 5.0265e-7);
        assert!(reader.bool_field("useFroemkeDanSTDP").unwrap());
    }

    #[test]
    fn test_missing_field_reports_position() {
        let mut reader = FieldReader::new(Cursor::new(b"42\n".to_vec()));
        assert_eq!(reader.field::<u32>("queuePost").unwrap(), 42);

        let err = reader.field::<u32>("idxPost").unwrap_err();
        match err {
            StorageError::MissingField { field, position } => {
                assert_eq!(field, "idxPost");
                assert_eq!(position, 2);
            }
            other => panic!("unexpected error: {}", other),
        }
    }

    #[test]
    fn test_parse_error_reports_token() {
        let mut reader = FieldReader::new(Cursor::new(b"banana\n".to_vec()));
        let err = reader.field::<f64>("tauspost").unwrap_err();
        match err {
            StorageError::ParseField { field, position, token } => {
                assert_eq!(field, "tauspost");
                assert_eq!(position, 1);
                assert_eq!(token, "banana");
            }
            other => panic!("unexpected error: {}", other),
        }
    }

    #[test]
    fn test_bool_field_rejects_out_of_domain() {
        let mut reader = FieldReader::new(Cursor::new(b"2\n".to_vec()));
        let err = reader.bool_field("inUse").unwrap_err();
        assert!(matches!(err, StorageError::InvalidValue { .. }));
    }

    #[test]
    fn test_mixed_whitespace_separators() {
        let mut reader = FieldReader::new(Cursor::new(b"1 2\t3\n4".to_vec()));
        for expected in 1..=4u32 {
            assert_eq!(reader.field::<u32>("n").unwrap(), expected);
        }
        assert!(reader.field::<u32>("n").is_err());
    }
}
