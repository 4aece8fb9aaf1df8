use serde::{Deserialize, Serialize};
use std::io::{self, BufRead};

/// One archived comment. Only the fields the transforms need are kept;
/// everything else in the line is ignored.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Comment {
    #[serde(default)]
    pub author: String,
    #[serde(default)]
    pub body: String,
}

/// Result of scanning one physical line.
#[derive(Debug)]
pub enum ScannedLine {
    Parsed(Comment),
    Malformed(serde_json::Error),
}

/// Line-oriented scanner over a decoded archive stream.
///
/// Lines are split on `\n` with a trailing `\r` removed. Each line is parsed on
/// its own; a malformed line is reported as [`ScannedLine::Malformed`] and the
/// scan carries on with the next one. Lines are handled as raw bytes, so
/// invalid UTF-8 surfaces as a parse failure instead of aborting the read.
pub struct RecordScanner<R> {
    reader: R,
    buf: Vec<u8>,
    lines: u64,
    errors: u64,
}

impl<R: BufRead> RecordScanner<R> {
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            buf: Vec::with_capacity(4096),
            lines: 0,
            errors: 0,
        }
    }

    /// Returns the next line, `Ok(None)` at end of stream, or the underlying
    /// read/decode error.
    pub fn next_line(&mut self) -> io::Result<Option<ScannedLine>> {
        self.buf.clear();
        if self.reader.read_until(b'\n', &mut self.buf)? == 0 {
            return Ok(None);
        }
        self.lines += 1;

        let mut line = self.buf.as_slice();
        if let Some(rest) = line.strip_suffix(b"\n") {
            line = rest;
        }
        if let Some(rest) = line.strip_suffix(b"\r") {
            line = rest;
        }

        match serde_json::from_slice::<Comment>(line) {
            Ok(comment) => Ok(Some(ScannedLine::Parsed(comment))),
            Err(err) => {
                self.errors += 1;
                Ok(Some(ScannedLine::Malformed(err)))
            }
        }
    }

    /// Lines scanned so far, malformed ones included.
    pub fn lines(&self) -> u64 {
        self.lines
    }

    pub fn errors(&self) -> u64 {
        self.errors
    }
}

impl<R: BufRead> Iterator for RecordScanner<R> {
    type Item = io::Result<ScannedLine>;

    fn next(&mut self) -> Option<Self::Item> {
        self.next_line().transpose()
    }
}
