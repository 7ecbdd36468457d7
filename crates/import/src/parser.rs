//! Section-aware ND-JSON stream parser.
//!
//! Reads one physical line at a time from an [`AsyncBufRead`]; nothing but
//! the current line is held in memory. Line numbers are 1-based and count
//! every physical line, blank ones included, so a checkpoint's
//! `line_number` can be replayed by skipping exactly that many lines.

use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use twingraph_core::import_job::FileHeader;
use twingraph_core::section::{classify_line, LineKind, Section};

use crate::error::{ImportError, StructuralError};

/// A non-blank logical line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParsedLine {
    Marker(Section),
    UnknownMarker(String),
    Data(String),
    /// Bytes that are not valid UTF-8; carries the decoding error.
    NotUtf8(String),
}

/// One physical line, before classification.
enum RawLine {
    Text(String),
    NotUtf8(String),
}

/// A logical line together with its 1-based physical line number.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LineItem {
    pub line_number: u64,
    pub line: ParsedLine,
}

pub struct SectionStreamParser<R> {
    reader: R,
    buf: Vec<u8>,
    lines_read: u64,
}

impl<R: AsyncBufRead + Unpin> SectionStreamParser<R> {
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            buf: Vec::new(),
            lines_read: 0,
        }
    }

    /// Physical lines consumed so far.
    pub fn lines_read(&self) -> u64 {
        self.lines_read
    }

    /// Read one physical line without its terminator. `None` at end of stream.
    async fn read_raw(&mut self) -> std::io::Result<Option<RawLine>> {
        self.buf.clear();
        let n = self.reader.read_until(b'\n', &mut self.buf).await?;
        if n == 0 {
            return Ok(None);
        }
        self.lines_read += 1;
        while matches!(self.buf.last(), Some(b'\n' | b'\r')) {
            self.buf.pop();
        }
        let line = match std::str::from_utf8(&self.buf) {
            Ok(text) => RawLine::Text(text.to_owned()),
            Err(e) => RawLine::NotUtf8(e.to_string()),
        };
        Ok(Some(line))
    }

    /// Next non-blank line, classified.
    pub async fn next_line(&mut self) -> std::io::Result<Option<LineItem>> {
        loop {
            let raw = match self.read_raw().await? {
                None => return Ok(None),
                Some(RawLine::Text(raw)) => raw,
                Some(RawLine::NotUtf8(reason)) => {
                    return Ok(Some(LineItem {
                        line_number: self.lines_read,
                        line: ParsedLine::NotUtf8(reason),
                    }));
                }
            };
            let line = match classify_line(&raw) {
                LineKind::Blank => continue,
                LineKind::Marker(section) => ParsedLine::Marker(section),
                LineKind::UnknownMarker(name) => ParsedLine::UnknownMarker(name),
                LineKind::Data => ParsedLine::Data(raw),
            };
            return Ok(Some(LineItem {
                line_number: self.lines_read,
                line,
            }));
        }
    }

    /// Validate the document header at the start of a fresh run.
    ///
    /// The first non-blank line must be the `Header` marker and the next one
    /// must declare the supported `fileVersion`.
    pub async fn read_header(&mut self) -> Result<FileHeader, ImportError> {
        let first = self.next_line().await?.ok_or(StructuralError::EmptyInput)?;
        if first.line != ParsedLine::Marker(Section::Header) {
            return Err(StructuralError::MissingHeader.into());
        }

        let second = self
            .next_line()
            .await?
            .ok_or_else(|| StructuralError::InvalidHeader("missing header line".into()))?;
        let ParsedLine::Data(raw) = second.line else {
            return Err(StructuralError::InvalidHeader(
                "header marker is not followed by a header line".into(),
            )
            .into());
        };

        let header: FileHeader = serde_json::from_str(&raw)
            .map_err(|e| StructuralError::InvalidHeader(e.to_string()))?;
        if !header.is_supported() {
            return Err(StructuralError::UnsupportedVersion {
                found: header.file_version,
            }
            .into());
        }
        Ok(header)
    }

    /// Discard lines until `line_number` physical lines have been consumed.
    pub async fn skip_to(&mut self, line_number: u64) -> Result<(), ImportError> {
        while self.lines_read < line_number {
            if self.read_raw().await?.is_none() {
                return Err(StructuralError::TruncatedInput {
                    expected: line_number,
                    found: self.lines_read,
                }
                .into());
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;

    fn parser(input: &str) -> SectionStreamParser<&[u8]> {
        SectionStreamParser::new(input.as_bytes())
    }

    const DOC: &str = "{\"Section\":\"Header\"}\n\
        {\"fileVersion\":\"1.0.0\",\"author\":\"ops\"}\n\
        \n\
        {\"Section\":\"Twins\"}\r\n\
        {\"$dtId\":\"t1\"}\n\
        {\"$dtId\":\"t2\"}";

    #[tokio::test]
    async fn reads_header_and_lines() {
        let mut p = parser(DOC);
        let header = p.read_header().await.unwrap();
        assert_eq!(header.author.as_deref(), Some("ops"));

        let marker = p.next_line().await.unwrap().unwrap();
        assert_eq!(marker.line, ParsedLine::Marker(Section::Twins));
        assert_eq!(marker.line_number, 4);

        let t1 = p.next_line().await.unwrap().unwrap();
        assert_eq!(t1.line, ParsedLine::Data("{\"$dtId\":\"t1\"}".into()));

        let t2 = p.next_line().await.unwrap().unwrap();
        assert_eq!(t2.line_number, 6);
        assert!(p.next_line().await.unwrap().is_none());
        assert_eq!(p.lines_read(), 6);
    }

    #[tokio::test]
    async fn empty_input_is_structural() {
        let err = parser("").read_header().await.unwrap_err();
        assert_matches!(err, ImportError::Structural(StructuralError::EmptyInput));

        let err = parser("\n  \n").read_header().await.unwrap_err();
        assert_matches!(err, ImportError::Structural(StructuralError::EmptyInput));
    }

    #[tokio::test]
    async fn first_section_must_be_header() {
        let err = parser("{\"Section\":\"Models\"}\n{}\n")
            .read_header()
            .await
            .unwrap_err();
        assert_matches!(err, ImportError::Structural(StructuralError::MissingHeader));
    }

    #[tokio::test]
    async fn unsupported_version_rejected() {
        let err = parser("{\"Section\":\"Header\"}\n{\"fileVersion\":\"2.0.0\"}\n")
            .read_header()
            .await
            .unwrap_err();
        assert_matches!(
            err,
            ImportError::Structural(StructuralError::UnsupportedVersion { found }) if found == "2.0.0"
        );
    }

    #[tokio::test]
    async fn header_without_version_rejected() {
        let err = parser("{\"Section\":\"Header\"}\n{\"author\":\"x\"}\n")
            .read_header()
            .await
            .unwrap_err();
        assert_matches!(err, ImportError::Structural(StructuralError::InvalidHeader(_)));
    }

    #[tokio::test]
    async fn skip_to_resumes_at_exact_line() {
        let mut p = parser(DOC);
        p.skip_to(5).await.unwrap();
        let next = p.next_line().await.unwrap().unwrap();
        assert_eq!(next.line_number, 6);
        assert_eq!(next.line, ParsedLine::Data("{\"$dtId\":\"t2\"}".into()));
    }

    #[tokio::test]
    async fn invalid_utf8_line_is_reported_not_replaced() {
        let mut input = b"{\"Section\":\"Twins\"}\n".to_vec();
        input.extend_from_slice(b"{\"$dtId\":\"r\xff1\"}\n{\"$dtId\":\"r2\"}\n");
        let mut p = SectionStreamParser::new(input.as_slice());

        p.next_line().await.unwrap().unwrap();
        let bad = p.next_line().await.unwrap().unwrap();
        assert_eq!(bad.line_number, 2);
        assert_matches!(bad.line, ParsedLine::NotUtf8(reason) if reason.contains("utf-8"));

        let next = p.next_line().await.unwrap().unwrap();
        assert_eq!(next.line_number, 3);
        assert_eq!(next.line, ParsedLine::Data("{\"$dtId\":\"r2\"}".into()));
    }

    #[tokio::test]
    async fn skip_past_end_is_truncation() {
        let err = parser(DOC).skip_to(10).await.unwrap_err();
        assert_matches!(
            err,
            ImportError::Structural(StructuralError::TruncatedInput { expected: 10, found: 6 })
        );
    }
}
