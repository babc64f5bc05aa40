// Copyright 2025 The csearch-rs Authors.
// Copyright 2011 The Go Authors. All rights reserved.
//
// Use of this source code is governed by a BSD-style
// license that can be found in the LICENSE file.

use std::fs::File;
use std::io::{Seek, SeekFrom, Write};
use std::path::Path;

use anyhow::{bail, Context, Result};

/// An in-memory (trigram, file id) pair, packed so that sorting by the
/// u64 value orders by trigram first and file id second.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub(crate) struct PostEntry(pub u64);

impl PostEntry {
    pub fn new(trigram: u32, fileid: u32) -> PostEntry {
        PostEntry((trigram as u64) << 32 | fileid as u64)
    }

    pub fn trigram(self) -> u32 {
        (self.0 >> 32) as u32
    }

    pub fn fileid(self) -> u32 {
        self.0 as u32
    }
}

/// A `BufFile` is a buffered writer over a file that knows how to emit
/// the integer encodings the index format uses. With no path it writes
/// to an anonymous temp file, which the OS reclaims on close.
pub(crate) struct BufFile {
    label: String,
    file: File,
    buf: Vec<u8>,
}

const BUF_CAP: usize = 256 << 10;

impl BufFile {
    pub fn create(path: &Path) -> Result<BufFile> {
        let file = std::fs::OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(path)
            .with_context(|| format!("create {}", path.display()))?;
        Ok(BufFile {
            label: path.display().to_string(),
            file,
            buf: Vec::with_capacity(BUF_CAP),
        })
    }

    pub fn create_temp() -> Result<BufFile> {
        let file = tempfile::tempfile().context("create temp file")?;
        Ok(BufFile {
            label: "<temp>".to_string(),
            file,
            buf: Vec::with_capacity(BUF_CAP),
        })
    }

    pub fn write(&mut self, x: &[u8]) -> Result<()> {
        if x.len() > BUF_CAP - self.buf.len() {
            self.flush()?;
            if x.len() >= BUF_CAP {
                self.file
                    .write_all(x)
                    .with_context(|| format!("writing {}", self.label))?;
                return Ok(());
            }
        }
        self.buf.extend_from_slice(x);
        Ok(())
    }

    pub fn write_byte(&mut self, x: u8) -> Result<()> {
        if self.buf.len() >= BUF_CAP {
            self.flush()?;
        }
        self.buf.push(x);
        Ok(())
    }

    pub fn write_u32(&mut self, x: u32) -> Result<()> {
        self.write(&x.to_be_bytes())
    }

    pub fn write_trigram(&mut self, t: u32) -> Result<()> {
        self.write(&[(t >> 16) as u8, (t >> 8) as u8, t as u8])
    }

    pub fn write_uvarint(&mut self, x: u32) -> Result<()> {
        let mut tmp = [0u8; 5];
        let mut i = 0;
        let mut v = x;
        while v >= 0x80 {
            tmp[i] = v as u8 | 0x80;
            v >>= 7;
            i += 1;
        }
        tmp[i] = v as u8;
        self.write(&tmp[..i + 1])
    }

    /// Current write offset. The index format stores 32-bit offsets, so
    /// growing past 4 GiB is an error.
    pub fn offset(&mut self) -> Result<u32> {
        let off = self.file.stream_position()? + self.buf.len() as u64;
        if off > u32::MAX as u64 {
            bail!("index is larger than 4GB");
        }
        Ok(off as u32)
    }

    pub fn flush(&mut self) -> Result<()> {
        if self.buf.is_empty() {
            return Ok(());
        }
        self.file
            .write_all(&self.buf)
            .with_context(|| format!("writing {}", self.label))?;
        self.buf.clear();
        Ok(())
    }

    /// Flushes and rewinds, leaving the file ready for reading back.
    pub fn finish(mut self) -> Result<File> {
        self.flush()?;
        self.file.seek(SeekFrom::Start(0))?;
        Ok(self.file)
    }

    /// Appends the full contents of `src` to this file.
    pub fn copy_from(&mut self, src: BufFile) -> Result<()> {
        self.flush()?;
        let label = src.label.clone();
        let mut f = src.finish()?;
        std::io::copy(&mut f, &mut self.file)
            .with_context(|| format!("copying {} to {}", label, self.label))?;
        Ok(())
    }
}

// Sorting the post buffer. The list is appended in file-id order, so the
// bottom 32 bits are already sorted and the top 8 bits are always zero;
// only the 24 trigram bits need sorting. Two rounds of 12-bit radix sort
// keep it linear, and the counting table is reused across flushes.
pub(crate) const SORT_K: usize = 12;

pub(crate) fn sort_post(
    post: &mut [PostEntry],
    tmp: &mut Vec<PostEntry>,
    counts: &mut [u32; 1 << SORT_K],
) {
    if tmp.len() < post.len() {
        tmp.resize(post.len(), PostEntry(0));
    }
    let tmp = &mut tmp[..post.len()];

    const MASK: u64 = (1 << SORT_K) - 1;
    counts.fill(0);
    for p in post.iter() {
        counts[((p.0 >> 32) & MASK) as usize] += 1;
    }
    let mut tot = 0u32;
    for c in counts.iter_mut() {
        let n = *c;
        *c = tot;
        tot += n;
    }
    for p in post.iter() {
        let r = ((p.0 >> 32) & MASK) as usize;
        tmp[counts[r] as usize] = *p;
        counts[r] += 1;
    }

    counts.fill(0);
    for p in tmp.iter() {
        counts[((p.0 >> (32 + SORT_K)) & MASK) as usize] += 1;
    }
    tot = 0;
    for c in counts.iter_mut() {
        let n = *c;
        *c = tot;
        tot += n;
    }
    for p in tmp.iter() {
        let r = ((p.0 >> (32 + SORT_K)) & MASK) as usize;
        post[counts[r] as usize] = *p;
        counts[r] += 1;
    }
}

/// Reports whether the byte pair can appear in a valid sequence of
/// UTF-8-encoded code points.
pub(crate) fn valid_utf8_pair(c1: u8, c2: u8) -> bool {
    if c1 < 0x80 {
        // 1-byte, must be followed by 1-byte or first of multi-byte
        c2 < 0x80 || (0xc0..0xf8).contains(&c2)
    } else if c1 < 0xc0 {
        // continuation byte, can be followed by nearly anything
        c2 < 0xf8
    } else if c1 < 0xf8 {
        // first of multi-byte, must be followed by continuation byte
        (0x80..0xc0).contains(&c2)
    } else {
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn read_uvarint(data: &[u8]) -> (u32, usize) {
        let mut val = 0u32;
        let mut shift = 0;
        for (i, &b) in data.iter().enumerate() {
            val |= ((b & 0x7f) as u32) << shift;
            if b & 0x80 == 0 {
                return (val, i + 1);
            }
            shift += 7;
        }
        panic!("truncated uvarint");
    }

    #[test]
    fn uvarint_roundtrip() -> Result<()> {
        let mut w = BufFile::create_temp()?;
        let values = [0u32, 1, 127, 128, 300, 16383, 16384, 1 << 21, u32::MAX];
        for &v in &values {
            w.write_uvarint(v)?;
        }
        let mut f = w.finish()?;
        let mut data = Vec::new();
        std::io::Read::read_to_end(&mut f, &mut data)?;
        let mut off = 0;
        for &v in &values {
            let (got, n) = read_uvarint(&data[off..]);
            assert_eq!(got, v);
            off += n;
        }
        assert_eq!(off, data.len());
        Ok(())
    }

    #[test]
    fn uvarint_short_encodings() -> Result<()> {
        let mut w = BufFile::create_temp()?;
        w.write_uvarint(0)?;
        w.write_uvarint(127)?;
        w.write_uvarint(128)?;
        let mut f = w.finish()?;
        let mut data = Vec::new();
        std::io::Read::read_to_end(&mut f, &mut data)?;
        assert_eq!(data, vec![0x00, 0x7f, 0x80, 0x01]);
        Ok(())
    }

    #[test]
    fn sort_post_orders_by_packed_value() {
        // Pseudo-random trigrams, file ids in append order per trigram.
        let mut post = Vec::new();
        let mut x = 1u64;
        for fileid in 0..10_000u32 {
            x = x.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
            let trigram = (x >> 40) as u32 & 0x00ff_ffff;
            post.push(PostEntry::new(trigram, fileid));
        }
        let mut expect = post.clone();
        expect.sort();

        let mut tmp = Vec::new();
        let mut counts = [0u32; 1 << SORT_K];
        sort_post(&mut post, &mut tmp, &mut counts);
        assert_eq!(post, expect);
        for w in post.windows(2) {
            assert!(w[0].0 <= w[1].0);
        }
    }

    #[test]
    fn valid_utf8_pair_matches_reference() {
        // Independent statement of the rule: classify each byte and
        // check which classes may be adjacent inside well-formed UTF-8.
        #[derive(PartialEq)]
        enum Kind {
            Ascii,
            Cont,
            Lead,
            Never,
        }
        fn kind(b: u8) -> Kind {
            match b {
                0x00..=0x7f => Kind::Ascii,
                0x80..=0xbf => Kind::Cont,
                0xc0..=0xf7 => Kind::Lead,
                _ => Kind::Never,
            }
        }
        for c1 in 0..=255u8 {
            for c2 in 0..=255u8 {
                let want = match (kind(c1), kind(c2)) {
                    (Kind::Never, _) | (_, Kind::Never) => false,
                    (Kind::Ascii, Kind::Cont) => false,
                    (Kind::Lead, Kind::Ascii) | (Kind::Lead, Kind::Lead) => false,
                    _ => true,
                };
                assert_eq!(
                    valid_utf8_pair(c1, c2),
                    want,
                    "pair {:02x} {:02x}",
                    c1,
                    c2
                );
            }
        }
    }

    #[test]
    fn post_entry_packing() {
        let e = PostEntry::new(0x00aabbcc, 42);
        assert_eq!(e.trigram(), 0x00aabbcc);
        assert_eq!(e.fileid(), 42);
        // Trigram dominates the ordering, file id breaks ties.
        assert!(PostEntry::new(1, u32::MAX) < PostEntry::new(2, 0));
        assert!(PostEntry::new(7, 3) < PostEntry::new(7, 4));
    }
}
