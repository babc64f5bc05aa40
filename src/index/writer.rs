// Copyright 2025 The csearch-rs Authors.
// Copyright 2011 The Go Authors. All rights reserved.
//
// Use of this source code is governed by a BSD-style
// license that can be found in the LICENSE file.

//! Index writing. See `index/mod.rs` for the on-disk format.
//!
//! It would suffice to accumulate one large list of (trigram, file id)
//! pairs, sort it by trigram, and cut posting lists from the sorted
//! runs. The corpus is not assumed to fit in memory, though, so the
//! list is sorted and spilled to a temp file whenever it reaches its
//! maximum in-memory size, and the final posting lists are produced by
//! merging the spills as they are read back.

use std::cmp::Reverse;
use std::collections::BinaryHeap;
use std::fs::File;
use std::io::{BufRead, BufReader, Read, Seek, SeekFrom, Write};
use std::path::Path;

use anyhow::{bail, Context, Result};
use memmap2::Mmap;
use tracing::{debug, info, warn};

use super::writer_utils::{sort_post, valid_utf8_pair, BufFile, PostEntry, SORT_K};
use super::{MAGIC, SENTINEL_TRIGRAM, TRAILER_MAGIC};
use crate::sparse::SparseSet;

/// Default in-memory post buffer: 64 MiB worth of entries.
const NPOST: usize = (64 << 20) / 8;

/// An `IndexWriter` creates an on-disk index for a set of files.
///
/// The writer is write-once: create it, call `add_paths` and `add` /
/// `add_file` for every candidate, then `flush` to publish the index.
/// Per-file problems (unreadable, binary, too long) skip the file and
/// keep the build going; errors on the index file itself are fatal.
pub struct IndexWriter {
    /// Log a line for every skipped file.
    pub log_skip: bool,
    /// Log per-file statistics while indexing.
    pub verbose: bool,

    /// Skip files larger than this many bytes.
    pub max_file_len: u64,
    /// Skip files with a line longer than this many bytes.
    pub max_line_len: usize,
    /// Skip files with more than this many distinct trigrams.
    pub max_trigrams: usize,
    /// Skip files whose invalid UTF-8 byte pairs exceed this fraction
    /// of the file size.
    pub max_invalid_utf8_ratio: f64,
    /// Flush the post buffer to a spill file at this many entries.
    /// Exposed so tests can force the merge path with small corpora.
    pub max_post: usize,

    trigram: SparseSet,
    paths: Vec<String>,

    name_data: BufFile,
    name_index: BufFile,
    num_name: u32,
    total_bytes: u64,

    post: Vec<PostEntry>,
    post_files: Vec<File>,
    post_index: BufFile,

    main: BufFile,

    sort_tmp: Vec<PostEntry>,
    sort_counts: Box<[u32; 1 << SORT_K]>,
}

impl IndexWriter {
    /// Creates a writer that will publish the index to `file`.
    pub fn create(file: &Path) -> Result<IndexWriter> {
        Ok(IndexWriter {
            log_skip: false,
            verbose: false,
            max_file_len: 1 << 30,
            max_line_len: 2000,
            max_trigrams: 20000,
            max_invalid_utf8_ratio: 0.0,
            max_post: NPOST,
            trigram: SparseSet::new(1 << 24),
            paths: Vec::new(),
            name_data: BufFile::create_temp()?,
            name_index: BufFile::create_temp()?,
            num_name: 0,
            total_bytes: 0,
            post: Vec::new(),
            post_files: Vec::new(),
            post_index: BufFile::create_temp()?,
            main: BufFile::create(file)?,
            sort_tmp: Vec::new(),
            sort_counts: Box::new([0u32; 1 << SORT_K]),
        })
    }

    /// Records the root paths the index was built from. They are
    /// written to the index verbatim, for tools that re-walk the tree.
    pub fn add_paths<I, S>(&mut self, paths: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.paths.extend(paths.into_iter().map(Into::into));
    }

    /// Adds the file at `name` to the index. Read errors are logged
    /// and skip the file.
    pub fn add_file(&mut self, name: &str) -> Result<()> {
        let meta = match std::fs::metadata(name) {
            Ok(m) => m,
            Err(e) => {
                warn!("{}: {}", name, e);
                return Ok(());
            }
        };
        let f = match File::open(name) {
            Ok(f) => f,
            Err(e) => {
                warn!("{}: {}", name, e);
                return Ok(());
            }
        };
        self.add(name, f, meta.len())
    }

    /// Adds the contents of `r` to the index under `name`.
    ///
    /// The skip policy is applied while streaming: oversized files,
    /// files with very long lines, files that look binary (a NUL byte
    /// inside a trigram window), files with too high a ratio of invalid
    /// UTF-8 byte pairs, and files with too many distinct trigrams are
    /// all dropped without being assigned a file id.
    pub fn add(&mut self, name: &str, r: impl Read, size: u64) -> Result<()> {
        if size > self.max_file_len {
            if self.log_skip {
                info!("{}: skipped. Too long ({} > {})", name, size, self.max_file_len);
            }
            return Ok(());
        }
        self.trigram.reset();
        let max_invalid = (size as f64 * self.max_invalid_utf8_ratio) as u64;
        let mut rd = BufReader::with_capacity(16384, r);
        let mut tv = 0u32;
        let mut n = 0u64;
        let mut linelen = 0usize;
        let mut inv_cnt = 0u64;
        loop {
            let consumed = {
                let buf = match rd.fill_buf() {
                    Ok(b) => b,
                    Err(e) => {
                        warn!("{}: {}", name, e);
                        return Ok(());
                    }
                };
                if buf.is_empty() {
                    break;
                }
                for &c in buf {
                    tv = (tv << 8) & 0x00ff_ffff | c as u32;
                    n += 1;
                    if n >= 3 {
                        let b1 = (tv >> 8) as u8;
                        let b2 = tv as u8;
                        if !valid_utf8_pair(b1, b2) {
                            inv_cnt += 1;
                            if inv_cnt > max_invalid {
                                if self.log_skip {
                                    info!(
                                        "{}: skipped. High invalid UTF-8 ratio. total: {} invalid: {} ratio: {}",
                                        name,
                                        size,
                                        inv_cnt,
                                        inv_cnt as f64 / size as f64
                                    );
                                }
                                return Ok(());
                            }
                        } else {
                            self.trigram.add(tv);
                        }
                        if b1 == 0 || b2 == 0 {
                            if self.log_skip {
                                info!(
                                    "{}: skipped. Binary file. Bytes {:02X}{:02X} at offset {}",
                                    name, b1, b2, n
                                );
                            }
                            return Ok(());
                        }
                    }
                    linelen += 1;
                    if linelen > self.max_line_len {
                        if self.log_skip {
                            info!("{}: skipped. Very long lines ({})", name, linelen);
                        }
                        return Ok(());
                    }
                    if c == b'\n' {
                        linelen = 0;
                    }
                }
                buf.len()
            };
            rd.consume(consumed);
        }
        if self.trigram.len() > self.max_trigrams {
            if self.log_skip {
                info!(
                    "{}: skipped. Too many trigrams ({} > {})",
                    name,
                    self.trigram.len(),
                    self.max_trigrams
                );
            }
            return Ok(());
        }
        self.total_bytes += n;

        if self.verbose {
            debug!("{} {} {}", n, self.trigram.len(), name);
        }

        let fileid = self.add_name(name)?;
        for i in 0..self.trigram.len() {
            if self.post.len() >= self.max_post {
                self.flush_post()?;
            }
            let trigram = self.trigram.dense()[i];
            self.post.push(PostEntry::new(trigram, fileid));
        }
        Ok(())
    }

    /// Writes the accumulated index and publishes it. The output file
    /// is only valid once this returns successfully.
    pub fn flush(mut self) -> Result<()> {
        self.add_name("")?;

        let mut off = [0u32; 5];
        self.main.write(MAGIC.as_bytes())?;
        off[0] = self.main.offset()?;
        for p in std::mem::take(&mut self.paths) {
            self.main.write(p.as_bytes())?;
            self.main.write_byte(0)?;
        }
        self.main.write_byte(0)?;
        off[1] = self.main.offset()?;
        self.main.copy_from(self.name_data)?;
        off[2] = self.main.offset()?;

        info!("merge {} files + mem", self.post_files.len());
        sort_post(&mut self.post, &mut self.sort_tmp, &mut self.sort_counts);
        let mut maps = Vec::with_capacity(self.post_files.len());
        for f in &self.post_files {
            maps.push(unsafe { Mmap::map(f) }.context("map post spill file")?);
        }
        let mut chunks: Vec<ChunkTail> = maps.iter().map(|m| ChunkTail::Mapped(&m[..])).collect();
        chunks.push(ChunkTail::Mem(&self.post));
        merge_post(&mut self.main, &mut self.post_index, chunks)?;
        drop(maps);
        self.post_files.clear();

        off[3] = self.main.offset()?;
        self.main.copy_from(self.name_index)?;
        off[4] = self.main.offset()?;
        self.main.copy_from(self.post_index)?;
        for v in off {
            self.main.write_u32(v)?;
        }
        self.main.write(TRAILER_MAGIC.as_bytes())?;

        info!(
            "{} data bytes, {} index bytes",
            self.total_bytes,
            self.main.offset()?
        );
        self.main.flush()
    }

    /// Assigns the next file id to `name` and records it in the name
    /// data and name index sections.
    fn add_name(&mut self, name: &str) -> Result<u32> {
        if name.contains('\0') {
            bail!("{:?}: file has NUL byte in name", name);
        }
        let off = self.name_data.offset()?;
        self.name_index.write_u32(off)?;
        self.name_data.write(name.as_bytes())?;
        self.name_data.write_byte(0)?;
        let id = self.num_name;
        self.num_name += 1;
        Ok(id)
    }

    /// Sorts the post buffer and spills it to a new temp file. The
    /// spill holds the raw packed entries in host byte order; it is
    /// read back by this same process, so portability is not a concern.
    fn flush_post(&mut self) -> Result<()> {
        sort_post(&mut self.post, &mut self.sort_tmp, &mut self.sort_counts);
        debug!("flush {} entries to a spill file", self.post.len());

        let mut f = tempfile::tempfile().context("create post spill file")?;
        {
            let mut w = std::io::BufWriter::with_capacity(256 << 10, &mut f);
            for p in &self.post {
                w.write_all(&p.0.to_ne_bytes())?;
            }
            w.flush()?;
        }
        f.seek(SeekFrom::Start(0))?;
        self.post.clear();
        self.post_files.push(f);
        Ok(())
    }
}

/// One source of sorted post entries during the merge: either a mapped
/// spill file or the residual in-memory buffer.
enum ChunkTail<'a> {
    Mapped(&'a [u8]),
    Mem(&'a [PostEntry]),
}

impl ChunkTail<'_> {
    fn next(&mut self) -> Option<PostEntry> {
        match self {
            ChunkTail::Mapped(b) => {
                let cur = *b;
                if cur.len() < 8 {
                    return None;
                }
                let e = PostEntry(u64::from_ne_bytes(cur[..8].try_into().unwrap()));
                *b = &cur[8..];
                Some(e)
            }
            ChunkTail::Mem(s) => {
                let cur = *s;
                let (&e, rest) = cur.split_first()?;
                *s = rest;
                Some(e)
            }
        }
    }
}

struct PostChunk<'a> {
    head: PostEntry,
    tail: ChunkTail<'a>,
}

impl PartialEq for PostChunk<'_> {
    fn eq(&self, other: &Self) -> bool {
        self.head == other.head
    }
}
impl Eq for PostChunk<'_> {}
impl PartialOrd for PostChunk<'_> {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}
impl Ord for PostChunk<'_> {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.head.cmp(&other.head)
    }
}

/// Merges the sorted chunks into posting lists on `main`, appending one
/// (trigram, file count, offset) record per list to `post_index`.
fn merge_post(main: &mut BufFile, post_index: &mut BufFile, chunks: Vec<ChunkTail>) -> Result<()> {
    let mut heap: BinaryHeap<Reverse<PostChunk>> = BinaryHeap::new();
    for mut tail in chunks {
        if let Some(head) = tail.next() {
            heap.push(Reverse(PostChunk { head, tail }));
        }
    }

    fn next(heap: &mut BinaryHeap<Reverse<PostChunk>>) -> PostEntry {
        match heap.pop() {
            None => PostEntry::new(SENTINEL_TRIGRAM, 0),
            Some(Reverse(mut ch)) => {
                let e = ch.head;
                if let Some(head) = ch.tail.next() {
                    ch.head = head;
                    heap.push(Reverse(ch));
                }
                e
            }
        }
    }

    let offset0 = main.offset()?;
    let mut e = next(&mut heap);
    loop {
        let offset = main.offset()? - offset0;
        let trigram = e.trigram();
        main.write_trigram(trigram)?;

        // Posting list: delta-encoded file ids, zero delta terminates.
        // Duplicate (trigram, file id) pairs cannot arise from a single
        // writer, but collapsing them keeps the merge idempotent.
        let mut fileid = u32::MAX;
        let mut nfile = 0u32;
        while e.trigram() == trigram && trigram != SENTINEL_TRIGRAM {
            if e.fileid() != fileid {
                main.write_uvarint(e.fileid().wrapping_sub(fileid))?;
                fileid = e.fileid();
                nfile += 1;
            }
            e = next(&mut heap);
        }
        main.write_uvarint(0)?;

        post_index.write_trigram(trigram)?;
        post_index.write_u32(nfile)?;
        post_index.write_u32(offset)?;

        if trigram == SENTINEL_TRIGRAM {
            break;
        }
    }
    Ok(())
}
