//! Incremental string scanners for ASCII and UTF-16LE.
//!
//! The scanner is fed consecutive chunks of one buffer and keeps runs open
//! across chunk boundaries, so chunking never splits a string.

use super::StringsConfig;
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Encoding {
    Ascii,
    Utf16le,
}

/// One extracted string with its absolute offset.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExtractedString {
    pub text: String,
    pub offset: usize,
    pub encoding: Encoding,
}

/// Scanner output before classification.
#[derive(Debug, Default)]
pub struct ScanOutput {
    pub strings: Vec<ExtractedString>,
    /// Strings found, including those dropped by the cap
    pub total: usize,
}

fn printable(b: u8) -> bool {
    (b.is_ascii_graphic() || b == b'\t' || b == b' ') && b != 0x7f
}

pub struct StringScanner<'c> {
    cfg: &'c StringsConfig,
    pos: usize,
    ascii: Vec<u8>,
    ascii_len: usize,
    ascii_start: usize,
    wide: Vec<u8>,
    wide_len: usize,
    wide_start: usize,
    carry: Option<u8>,
    out: ScanOutput,
}

impl<'c> StringScanner<'c> {
    pub fn new(cfg: &'c StringsConfig) -> Self {
        Self {
            cfg,
            pos: 0,
            ascii: Vec::new(),
            ascii_len: 0,
            ascii_start: 0,
            wide: Vec::new(),
            wide_len: 0,
            wide_start: 0,
            carry: None,
            out: ScanOutput::default(),
        }
    }

    /// Feed the next chunk of the buffer.
    pub fn feed(&mut self, chunk: &[u8]) {
        for &b in chunk {
            self.push_ascii(b);
            self.push_wide_byte(b);
            self.pos += 1;
        }
    }

    /// Close open runs and return the collected strings ordered by offset.
    pub fn finish(mut self) -> ScanOutput {
        self.close_ascii();
        self.close_wide();
        self.out.strings.sort_by_key(|s| s.offset);
        self.out
    }

    fn push_ascii(&mut self, b: u8) {
        if printable(b) {
            if self.ascii_len == 0 {
                self.ascii_start = self.pos;
            }
            if self.ascii.len() < self.cfg.max_characters_for_string {
                self.ascii.push(b);
            }
            self.ascii_len += 1;
        } else {
            self.close_ascii();
        }
    }

    fn close_ascii(&mut self) {
        if self.ascii_len >= self.cfg.effective_min_length() {
            let text = String::from_utf8_lossy(&self.ascii).into_owned();
            self.emit(text, self.ascii_start, Encoding::Ascii);
        }
        self.ascii.clear();
        self.ascii_len = 0;
    }

    // Code units are read at even offsets only.
    fn push_wide_byte(&mut self, b: u8) {
        if self.pos % 2 == 0 {
            self.carry = Some(b);
            return;
        }
        let Some(lo) = self.carry.take() else {
            return;
        };
        if b == 0 && lo != 0 && printable(lo) {
            if self.wide_len == 0 {
                self.wide_start = self.pos - 1;
            }
            if self.wide_len < self.cfg.max_characters_for_string {
                self.wide.extend_from_slice(&[lo, b]);
            }
            self.wide_len += 1;
        } else {
            self.close_wide();
        }
    }

    fn close_wide(&mut self) {
        if self.wide_len >= self.cfg.effective_min_length() {
            let (text, _) = encoding_rs::UTF_16LE.decode_without_bom_handling(&self.wide);
            let text = text.into_owned();
            self.emit(text, self.wide_start, Encoding::Utf16le);
        }
        self.wide.clear();
        self.wide_len = 0;
    }

    fn emit(&mut self, text: String, offset: usize, encoding: Encoding) {
        self.out.total += 1;
        if self.out.strings.len() < self.cfg.max_number_of_strings {
            self.out.strings.push(ExtractedString {
                text,
                offset,
                encoding,
            });
        }
    }
}
