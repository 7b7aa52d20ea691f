use std::io::{BufRead, ErrorKind};

use lazy_static::lazy_static;
use regex::Regex;

use crate::error::MD5Error;

lazy_static! {
    static ref BLANK_RUN: Regex = Regex::new("[ \t]+").unwrap();
}

/// Strip a `//` comment, collapse runs of blanks into one space, and trim both ends
pub fn normalize_line(line: &str) -> String {
    let line = match line.find("//") {
        Some(idx) => &line[..idx],
        None => line
    };

    BLANK_RUN.replace_all(line, " ").trim().to_owned()
}

/// Reads normalized lines from a text source
pub struct LineReader<R: BufRead> {
    reader: R,
    max_line_length: usize,
    line_number: usize,
    buf: Vec<u8>,
    // last line ended in `\r`, so a following `\n` belongs to it
    skip_lf: bool,
    eof: bool,
}

impl<R: BufRead> LineReader<R> {
    pub fn new(reader: R, max_line_length: usize) -> LineReader<R> {
        LineReader {
            reader,
            max_line_length,
            line_number: 0,
            buf: Vec::new(),
            skip_lf: false,
            eof: false,
        }
    }

    /// 1-based number of the last physical line returned
    pub fn line_number(self: &Self) -> usize {
        self.line_number
    }

    /// Next line inside an open `block`. Running out of input here is an error.
    pub fn next_in_block(self: &mut Self, block: &'static str) -> Result<String, MD5Error> {
        match self.next() {
            Some(v) => v,
            None => Err(MD5Error::UnexpectedEndOfInput { block })
        }
    }

    /// Read the next physical line into `buf`, never holding more than `max_line_length + 1` bytes of it.
    /// Returns false at end of input.
    fn read_raw(self: &mut Self) -> Result<bool, MD5Error> {
        self.buf.clear();

        loop {
            let available = match self.reader.fill_buf() {
                Ok(v) => v,
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => return Err(e.into())
            };

            if available.is_empty() {
                // last line may lack a terminator
                return Ok(!self.buf.is_empty());
            }

            let mut used = 0;
            let mut line_end = false;
            let mut too_long = false;

            for c in available.iter().copied() {
                used += 1;

                if self.skip_lf {
                    self.skip_lf = false;
                    if c == b'\n' {
                        continue;
                    }
                }

                // `\n`, `\r\n` & a lone `\r` all end a line
                if c == b'\n' || c == b'\r' {
                    self.skip_lf = c == b'\r';
                    line_end = true;
                    break;
                }

                self.buf.push(c);
                if self.buf.len() > self.max_line_length {
                    too_long = true;
                    break;
                }
            }

            self.reader.consume(used);

            if too_long {
                return Err(MD5Error::LineTooLong { line: self.line_number + 1, limit: self.max_line_length });
            }
            if line_end {
                return Ok(true);
            }
        }
    }
}

impl<R: BufRead> Iterator for LineReader<R> {
    type Item = Result<String, MD5Error>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.eof {
            return None;
        }

        match self.read_raw() {
            Ok(true) => {
                self.line_number += 1;
                Some(Ok(normalize_line(&String::from_utf8_lossy(&self.buf))))
            }
            Ok(false) => {
                self.eof = true;
                None
            }
            Err(e) => {
                // nothing after a failed read can be trusted
                self.eof = true;
                Some(Err(e))
            }
        }
    }
}
