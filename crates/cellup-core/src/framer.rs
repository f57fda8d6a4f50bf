//! # Line Framer
//!
//! Splits one read buffer into protocol records. A record is the bytes
//! between the cursor and the next line-feed. The end of the slice acts as
//! the buffer terminator:
//!
//! ```text
//!   "\n\nOK\n+CGEV: ME PDN ACT 1"
//!    ^^ skipped
//!        ^^ record, resume at 5
//!            ^^^^^^^^^^^^^^^^^^^ trailing fragment, no resume cursor
//! ```
//!
//! Carriage returns are expected to be stripped by the transport before
//! bytes reach the framer.

use std::ops::Range;

/// Longest record the framer accepts, in bytes (line-feed excluded).
pub const MAX_RECORD_LEN: usize = 256;

/// A record that overran [`MAX_RECORD_LEN`]. The rest of the buffer is
/// abandoned once this is reported.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("record at offset {start} exceeds {} bytes", MAX_RECORD_LEN)]
pub struct FramingError {
    /// Offset of the first byte of the oversized record.
    pub start: usize,
}

/// Position of one record inside a buffer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record {
    /// Byte range of the record, line-feed excluded.
    pub span: Range<usize>,
    /// Where scanning resumes, `None` when the buffer is exhausted.
    pub next: Option<usize>,
}

/// Finds the next record in `buf` starting at `cursor`.
///
/// Returns `Ok(None)` when only blank lines (or nothing) remain.
pub fn next_record(buf: &[u8], cursor: usize) -> Result<Option<Record>, FramingError> {
    let mut start = cursor.min(buf.len());
    let mut pos = start;

    while pos < buf.len() {
        if buf[pos] == b'\n' {
            if pos == start {
                // blank line
                pos += 1;
                start = pos;
                continue;
            }
            return Ok(Some(Record {
                span: start..pos,
                next: Some(pos + 1),
            }));
        }
        pos += 1;
        if pos - start > MAX_RECORD_LEN {
            return Err(FramingError { start });
        }
    }

    if pos > start {
        tracing::trace!(len = pos - start, "record without line-feed at end of buffer");
        return Ok(Some(Record {
            span: start..pos,
            next: None,
        }));
    }
    Ok(None)
}

/// Iterates the records of one buffer. Yields at most one error, after
/// which iteration stops.
pub fn records(buf: &[u8]) -> Records<'_> {
    Records {
        buf,
        cursor: Some(0),
    }
}

/// Iterator returned by [`records`].
pub struct Records<'a> {
    buf: &'a [u8],
    cursor: Option<usize>,
}

impl<'a> Iterator for Records<'a> {
    type Item = Result<&'a [u8], FramingError>;

    fn next(&mut self) -> Option<Self::Item> {
        let cursor = self.cursor?;
        match next_record(self.buf, cursor) {
            Ok(Some(record)) => {
                self.cursor = record.next;
                Some(Ok(&self.buf[record.span]))
            }
            Ok(None) => {
                self.cursor = None;
                None
            }
            Err(e) => {
                self.cursor = None;
                Some(Err(e))
            }
        }
    }
}
