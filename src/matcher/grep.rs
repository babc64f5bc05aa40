// Copyright 2025 The csearch-rs Authors.
// Copyright 2011 The Go Authors. All rights reserved.
//
// Use of this source code is governed by a BSD-style
// license that can be found in the LICENSE file.

//! Line-oriented output over candidate files.

use std::fs::File;
use std::io::{BufRead, BufReader, Write};

use anyhow::{Context, Result};
use tracing::warn;

use super::Regexp;

/// Grep-style scanning: feeds a file to a compiled `Regexp` one line
/// at a time and writes formatted matches to `w`.
///
/// Output modes mirror the classic flags: `list` prints only file
/// names, `count` prints per-file match counts, `line_numbers`
/// prefixes each line with its 1-based number. `max_count` bounds the
/// total number of reported matches across files (setting `done` when
/// reached) and `max_count_per_file` bounds each file's share.
pub struct Grep<W: Write> {
    pub re: Regexp,
    pub w: W,

    pub list: bool,
    pub count: bool,
    pub line_numbers: bool,
    pub max_count: u64,
    pub max_count_per_file: u64,

    /// Whether any line has matched so far.
    pub matched: bool,
    /// Set once `max_count` is reached; callers stop feeding files.
    pub done: bool,

    total: u64,
    buf: Vec<u8>,
}

impl<W: Write> Grep<W> {
    pub fn new(re: Regexp, w: W) -> Grep<W> {
        Grep {
            re,
            w,
            list: false,
            count: false,
            line_numbers: false,
            max_count: 0,
            max_count_per_file: 0,
            matched: false,
            done: false,
            total: 0,
            buf: Vec::with_capacity(1 << 12),
        }
    }

    /// Scans the file at `name`. Unreadable files are logged and
    /// skipped, matching the indexer's tolerance for a corpus that
    /// shifted underneath it.
    pub fn file(&mut self, name: &str) -> Result<()> {
        let f = match File::open(name) {
            Ok(f) => f,
            Err(e) => {
                warn!("{}: {}", name, e);
                return Ok(());
            }
        };
        self.reader(BufReader::new(f), name)
    }

    pub fn reader(&mut self, mut r: impl BufRead, name: &str) -> Result<()> {
        let mut lineno = 0u64;
        let mut file_count = 0u64;
        loop {
            self.buf.clear();
            let n = match r.read_until(b'\n', &mut self.buf) {
                Ok(n) => n,
                Err(e) => {
                    warn!("{}: {}", name, e);
                    return Ok(());
                }
            };
            if n == 0 {
                break;
            }
            lineno += 1;
            let had_newline = self.buf.last() == Some(&b'\n');
            let line = if had_newline {
                &self.buf[..self.buf.len() - 1]
            } else {
                &self.buf[..]
            };
            let begin_text = lineno == 1;
            let end_text = !had_newline;
            if self.re.matches(line, begin_text, end_text).is_none() {
                continue;
            }

            self.matched = true;
            file_count += 1;
            self.total += 1;
            if self.list {
                writeln!(self.w, "{}", name).context("writing output")?;
                break;
            }
            if !self.count {
                if self.line_numbers {
                    writeln!(self.w, "{}:{}:{}", name, lineno, String::from_utf8_lossy(line))
                        .context("writing output")?;
                } else {
                    writeln!(self.w, "{}:{}", name, String::from_utf8_lossy(line))
                        .context("writing output")?;
                }
            }
            if self.max_count > 0 && self.total >= self.max_count {
                self.done = true;
                break;
            }
            if self.max_count_per_file > 0 && file_count >= self.max_count_per_file {
                break;
            }
        }
        if self.count && file_count > 0 {
            writeln!(self.w, "{}: {}", name, file_count).context("writing output")?;
        }
        Ok(())
    }
}
