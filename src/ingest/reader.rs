//! Line-at-a-time reader for the tab-delimited source files
//!
//! Source files are ISO-8859-1 and can reach hundreds of megabytes, so only
//! the current line is ever held in memory.

use super::schema::{FileSchema, DELIMITER};
use crate::error::{PipelineError, Result};
use std::marker::PhantomData;
use std::path::Path;
use tokio::fs::File;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader};

/// Counters for rows that were recovered rather than rejected
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ParseStats {
    pub rows: u64,
    /// Rows with fewer fields than the schema; missing fields read as empty
    pub short_rows: u64,
    /// Non-empty cells that failed numeric or qualifier parsing
    pub malformed_fields: u64,
}

/// Decode ISO-8859-1 bytes: every byte is the code point of the same value
fn decode_latin1(bytes: &[u8]) -> String {
    bytes.iter().map(|&b| b as char).collect()
}

fn split_line(line: &[u8]) -> Vec<String> {
    line.split(|&b| b == DELIMITER).map(decode_latin1).collect()
}

fn trim_line_ending(buf: &mut Vec<u8>) {
    while matches!(buf.last(), Some(b'\n') | Some(b'\r')) {
        buf.pop();
    }
}

/// Streams rows of one delimited file after validating its header arity
pub struct DelimitedReader<R> {
    reader: R,
    schema: FileSchema,
    buf: Vec<u8>,
    stats: ParseStats,
}

impl DelimitedReader<BufReader<File>> {
    /// Open a source file and consume its header line
    pub async fn open(path: impl AsRef<Path>, schema: FileSchema) -> Result<Self> {
        let path = path.as_ref();
        let file = File::open(path)
            .await
            .map_err(|e| PipelineError::source_unavailable(path, e))?;

        log::info!("📖 Reading {} file: {}", schema.name, path.display());
        Self::from_reader(BufReader::new(file), schema).await
    }
}

impl<R: AsyncBufRead + Unpin> DelimitedReader<R> {
    pub async fn from_reader(reader: R, schema: FileSchema) -> Result<Self> {
        let mut this = Self {
            reader,
            schema,
            buf: Vec::with_capacity(1024),
            stats: ParseStats::default(),
        };

        let header = this.read_raw_line().await?.ok_or(PipelineError::SchemaMismatch {
            file: schema.name,
            expected: schema.arity,
            found: 0,
        })?;

        if header.len() != schema.arity {
            return Err(PipelineError::SchemaMismatch {
                file: schema.name,
                expected: schema.arity,
                found: header.len(),
            });
        }

        Ok(this)
    }

    async fn read_raw_line(&mut self) -> Result<Option<Vec<String>>> {
        loop {
            self.buf.clear();
            if self.reader.read_until(b'\n', &mut self.buf).await? == 0 {
                return Ok(None);
            }
            trim_line_ending(&mut self.buf);
            if self.buf.is_empty() {
                continue;
            }
            return Ok(Some(split_line(&self.buf)));
        }
    }

    /// Next data row, padded with empty fields up to the schema arity
    pub async fn next_fields(&mut self) -> Result<Option<Vec<String>>> {
        let Some(mut fields) = self.read_raw_line().await? else {
            return Ok(None);
        };

        self.stats.rows += 1;
        if fields.len() < self.schema.arity {
            self.stats.short_rows += 1;
            log::debug!(
                "Short row {} in {} file ({} of {} fields)",
                self.stats.rows,
                self.schema.name,
                fields.len(),
                self.schema.arity
            );
            fields.resize(self.schema.arity, String::new());
        }

        Ok(Some(fields))
    }

    pub fn stats(&self) -> ParseStats {
        self.stats
    }

    fn record_malformed(&mut self, count: u64) {
        self.stats.malformed_fields += count;
    }
}

/// A typed row decoded from positional fields
pub trait SourceRecord: Sized {
    const SCHEMA: FileSchema;

    fn from_fields(fields: &mut FieldCursor) -> Self;
}

/// Positional access to one row, counting cells that could not be parsed
pub struct FieldCursor {
    fields: Vec<String>,
    malformed: u64,
}

impl FieldCursor {
    pub fn new(fields: Vec<String>) -> Self {
        Self {
            fields,
            malformed: 0,
        }
    }

    /// Take the trimmed text at `idx`, leaving an empty string behind
    pub fn text(&mut self, idx: usize) -> String {
        match self.fields.get_mut(idx) {
            Some(field) => {
                let value = std::mem::take(field);
                if value.trim().len() == value.len() {
                    value
                } else {
                    value.trim().to_string()
                }
            }
            None => String::new(),
        }
    }

    pub fn optional_text(&mut self, idx: usize) -> Option<String> {
        let value = self.text(idx);
        if value.is_empty() {
            None
        } else {
            Some(value)
        }
    }

    pub fn number(&mut self, idx: usize) -> Option<f64> {
        let raw = self.fields.get(idx).map(String::as_str).unwrap_or("");
        let parsed = parse_number(raw);
        if parsed.is_none() && !raw.trim().is_empty() {
            self.malformed += 1;
        }
        parsed
    }

    pub fn integer(&mut self, idx: usize) -> Option<i64> {
        let raw = self.fields.get(idx).map(String::as_str).unwrap_or("");
        let trimmed = raw.trim();
        let parsed = trimmed.parse::<i64>().ok();
        if parsed.is_none() && !trimmed.is_empty() {
            self.malformed += 1;
        }
        parsed
    }

    pub fn mark_malformed(&mut self) {
        self.malformed += 1;
    }
}

/// Permissive numeric parse: empty, non-numeric and non-finite input is `None`
pub fn parse_number(raw: &str) -> Option<f64> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }
    trimmed.parse::<f64>().ok().filter(|v| v.is_finite())
}

/// Typed view over a `DelimitedReader`
pub struct RecordReader<R, T> {
    inner: DelimitedReader<R>,
    _record: PhantomData<T>,
}

impl<T: SourceRecord> RecordReader<BufReader<File>, T> {
    pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
        let inner = DelimitedReader::open(path, T::SCHEMA).await?;
        Ok(Self {
            inner,
            _record: PhantomData,
        })
    }
}

impl<R: AsyncBufRead + Unpin, T: SourceRecord> RecordReader<R, T> {
    pub async fn from_reader(reader: R) -> Result<Self> {
        let inner = DelimitedReader::from_reader(reader, T::SCHEMA).await?;
        Ok(Self {
            inner,
            _record: PhantomData,
        })
    }

    pub async fn next_record(&mut self) -> Result<Option<T>> {
        let Some(fields) = self.inner.next_fields().await? else {
            return Ok(None);
        };

        let mut cursor = FieldCursor::new(fields);
        let record = T::from_fields(&mut cursor);
        if cursor.malformed > 0 {
            self.inner.record_malformed(cursor.malformed);
        }
        Ok(Some(record))
    }

    pub fn stats(&self) -> ParseStats {
        self.inner.stats()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ingest::schema::ZIP_CODES;

    #[test]
    fn test_parse_number_permissive() {
        assert_eq!(parse_number("1.5"), Some(1.5));
        assert_eq!(parse_number(" 0.004 "), Some(0.004));
        assert_eq!(parse_number("0"), Some(0.0));
        assert_eq!(parse_number(""), None);
        assert_eq!(parse_number("N/A"), None);
        assert_eq!(parse_number("NaN"), None);
    }

    #[test]
    fn test_latin1_decoding() {
        assert_eq!(decode_latin1(b"Ca\xf1on City"), "Cañon City");
    }

    #[tokio::test]
    async fn test_header_is_skipped_and_crlf_trimmed() {
        let data: &[u8] = b"PWSID\tZIPCODE\r\nAZ0001\t85001\r\n\r\nAZ0002\t85002\n";
        let mut reader = DelimitedReader::from_reader(data, ZIP_CODES).await.unwrap();

        let first = reader.next_fields().await.unwrap().unwrap();
        assert_eq!(first, vec!["AZ0001".to_string(), "85001".to_string()]);
        let second = reader.next_fields().await.unwrap().unwrap();
        assert_eq!(second, vec!["AZ0002".to_string(), "85002".to_string()]);
        assert!(reader.next_fields().await.unwrap().is_none());
        assert_eq!(reader.stats().rows, 2);
    }

    #[tokio::test]
    async fn test_header_arity_mismatch_is_fatal() {
        let data: &[u8] = b"PWSID\tZIPCODE\tEXTRA\nAZ0001\t85001\t1\n";
        let result = DelimitedReader::from_reader(data, ZIP_CODES).await;
        match result {
            Err(PipelineError::SchemaMismatch { expected, found, .. }) => {
                assert_eq!(expected, 2);
                assert_eq!(found, 3);
            }
            _ => panic!("expected schema mismatch"),
        }
    }

    #[tokio::test]
    async fn test_empty_file_is_schema_mismatch() {
        let data: &[u8] = b"";
        let result = DelimitedReader::from_reader(data, ZIP_CODES).await;
        assert!(matches!(result, Err(PipelineError::SchemaMismatch { found: 0, .. })));
    }

    #[tokio::test]
    async fn test_short_rows_are_padded() {
        let data: &[u8] = b"PWSID\tZIPCODE\nAZ0001\n";
        let mut reader = DelimitedReader::from_reader(data, ZIP_CODES).await.unwrap();

        let fields = reader.next_fields().await.unwrap().unwrap();
        assert_eq!(fields, vec!["AZ0001".to_string(), String::new()]);
        assert_eq!(reader.stats().short_rows, 1);
    }

    #[tokio::test]
    async fn test_missing_file_is_source_unavailable() {
        let dir = tempfile::tempdir().unwrap();
        let result = DelimitedReader::open(dir.path().join("missing.txt"), ZIP_CODES).await;
        assert!(matches!(result, Err(PipelineError::SourceUnavailable { .. })));
    }
}
