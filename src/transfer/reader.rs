//! Incremental JSON array reader for imports
//!
//! Pulls one element at a time out of a top-level JSON array without
//! parsing the rest of the file. Only the bytes of the current element are
//! held in memory. A single trailing comma before the closing bracket is
//! accepted.

use std::path::Path;

use serde_json::Value;
use tokio::fs::File;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader};

use crate::error::{Result, ShuttleError, TransferError};

const UTF8_BOM: &[u8] = &[0xEF, 0xBB, 0xBF];

/// One element of the input array.
#[derive(Debug, Clone, PartialEq)]
pub struct ArrayElement {
    /// Zero-based position in the array
    pub index: u64,
    /// Byte offset of the element's first byte
    pub offset: u64,
    /// Parsed element
    pub value: Value,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Start,
    BeforeElement,
    AfterElement,
    Done,
}

/// Result of feeding one byte to the [`ElementScanner`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Scan {
    /// Byte belongs to the element, keep going
    Continue,
    /// Byte belongs to the element and completes it
    Complete,
    /// Byte does not belong to the element; the element ended before it
    Boundary,
}

/// Tracks nesting and string state while capturing one element.
#[derive(Debug, Default)]
struct ElementScanner {
    depth: usize,
    in_string: bool,
    escaped: bool,
}

impl ElementScanner {
    fn feed(&mut self, byte: u8) -> Scan {
        if self.in_string {
            if self.escaped {
                self.escaped = false;
            } else if byte == b'\\' {
                self.escaped = true;
            } else if byte == b'"' {
                self.in_string = false;
                if self.depth == 0 {
                    return Scan::Complete;
                }
            }
            return Scan::Continue;
        }

        match byte {
            b'"' => {
                self.in_string = true;
                Scan::Continue
            }
            b'{' | b'[' => {
                self.depth += 1;
                Scan::Continue
            }
            b'}' | b']' if self.depth == 0 => Scan::Boundary,
            b'}' | b']' => {
                self.depth -= 1;
                if self.depth == 0 {
                    Scan::Complete
                } else {
                    Scan::Continue
                }
            }
            b',' if self.depth == 0 => Scan::Boundary,
            b if b.is_ascii_whitespace() && self.depth == 0 => Scan::Boundary,
            _ => Scan::Continue,
        }
    }

    /// True when the bytes seen so far form a bare scalar that may end at EOF.
    fn at_scalar_end(&self) -> bool {
        self.depth == 0 && !self.in_string
    }
}

/// Streaming reader over a JSON array.
pub struct JsonArrayReader<R> {
    reader: R,
    state: State,
    offset: u64,
    index: u64,
    element: Vec<u8>,
}

impl JsonArrayReader<BufReader<File>> {
    /// Open a file for reading.
    pub async fn open(path: &Path) -> Result<Self> {
        let file = File::open(path).await?;
        Ok(Self::new(BufReader::with_capacity(1024 * 1024, file)))
    }
}

impl<R: AsyncBufRead + Unpin> JsonArrayReader<R> {
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            state: State::Start,
            offset: 0,
            index: 0,
            element: Vec::with_capacity(4096),
        }
    }

    /// Number of elements returned so far.
    pub fn elements_read(&self) -> u64 {
        self.index
    }

    /// Read the next array element, or `None` after the closing bracket.
    ///
    /// Any syntax error is fatal: once the array structure is broken there
    /// is no reliable place to resume.
    pub async fn next_element(&mut self) -> Result<Option<ArrayElement>> {
        loop {
            match self.state {
                State::Done => return Ok(None),
                State::Start => {
                    self.skip_bom().await?;
                    match self.next_non_whitespace().await? {
                        Some(b'[') => self.state = State::BeforeElement,
                        Some(other) => {
                            return Err(self.malformed(format!(
                                "expected '[' but found '{}'",
                                other as char
                            )));
                        }
                        None => return Err(self.malformed("input is empty")),
                    }
                }
                State::BeforeElement => match self.peek_non_whitespace().await? {
                    Some(b']') => {
                        self.consume(1);
                        self.close().await?;
                        return Ok(None);
                    }
                    Some(b',') => return Err(self.malformed("unexpected ','")),
                    Some(_) => {
                        let element = self.read_element().await?;
                        self.state = State::AfterElement;
                        return Ok(Some(element));
                    }
                    None => return Err(self.malformed("unterminated array")),
                },
                State::AfterElement => match self.next_non_whitespace().await? {
                    Some(b',') => self.state = State::BeforeElement,
                    Some(b']') => {
                        self.close().await?;
                        return Ok(None);
                    }
                    Some(other) => {
                        return Err(self.malformed(format!(
                            "expected ',' or ']' but found '{}'",
                            other as char
                        )));
                    }
                    None => return Err(self.malformed("unterminated array")),
                },
            }
        }
    }

    async fn read_element(&mut self) -> Result<ArrayElement> {
        let start = self.offset;
        let mut scanner = ElementScanner::default();
        self.element.clear();

        loop {
            let buf = self.reader.fill_buf().await?;
            if buf.is_empty() {
                if scanner.at_scalar_end() {
                    break;
                }
                return Err(self.malformed("unexpected end of input inside element"));
            }

            let mut taken = 0;
            let mut finished = false;
            for &byte in buf {
                match scanner.feed(byte) {
                    Scan::Continue => taken += 1,
                    Scan::Complete => {
                        taken += 1;
                        finished = true;
                        break;
                    }
                    Scan::Boundary => {
                        finished = true;
                        break;
                    }
                }
            }

            self.element.extend_from_slice(&buf[..taken]);
            self.consume(taken);
            if finished {
                break;
            }
        }

        let value: Value = serde_json::from_slice(&self.element).map_err(|e| {
            ShuttleError::from(TransferError::MalformedInput {
                offset: start,
                message: format!("element {}: {e}", self.index),
            })
        })?;

        let element = ArrayElement {
            index: self.index,
            offset: start,
            value,
        };
        self.index += 1;
        Ok(element)
    }

    /// Mark the array closed and reject anything but whitespace after it.
    async fn close(&mut self) -> Result<()> {
        self.state = State::Done;
        match self.peek_non_whitespace().await? {
            None => Ok(()),
            Some(_) => Err(self.malformed("unexpected content after closing ']'")),
        }
    }

    async fn skip_bom(&mut self) -> Result<()> {
        let buf = self.reader.fill_buf().await?;
        if buf.starts_with(UTF8_BOM) {
            self.consume(UTF8_BOM.len());
        }
        Ok(())
    }

    async fn peek_non_whitespace(&mut self) -> Result<Option<u8>> {
        loop {
            let buf = self.reader.fill_buf().await?;
            if buf.is_empty() {
                return Ok(None);
            }
            match buf.iter().position(|b| !b.is_ascii_whitespace()) {
                Some(skip) => {
                    let byte = buf[skip];
                    self.consume(skip);
                    return Ok(Some(byte));
                }
                None => {
                    let len = buf.len();
                    self.consume(len);
                }
            }
        }
    }

    async fn next_non_whitespace(&mut self) -> Result<Option<u8>> {
        let byte = self.peek_non_whitespace().await?;
        if byte.is_some() {
            self.consume(1);
        }
        Ok(byte)
    }

    fn consume(&mut self, amount: usize) {
        self.reader.consume(amount);
        self.offset += amount as u64;
    }

    fn malformed(&self, message: impl Into<String>) -> ShuttleError {
        TransferError::MalformedInput {
            offset: self.offset,
            message: message.into(),
        }
        .into()
    }
}
