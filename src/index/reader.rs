// Copyright 2025 The csearch-rs Authors.
// Copyright 2011 The Go Authors. All rights reserved.
//
// Use of this source code is governed by a BSD-style
// license that can be found in the LICENSE file.

//! Index reading: memory-mapped random access to the sections written
//! by `IndexWriter`, plus boolean query evaluation over posting lists.

use std::fs::File;
use std::path::Path;

use anyhow::{bail, Context, Result};
use memmap2::Mmap;

use super::{MAGIC, POST_ENTRY_SIZE, TRAILER_MAGIC};
use crate::query::{Query, QueryOp};

/// A read-only view of an on-disk index. The mapping lives for the
/// lifetime of the value; dropping it unmaps and closes the file.
pub struct Index {
    mmap: Mmap,
    path_data: u32,
    name_data: u32,
    post_data: u32,
    name_index: u32,
    post_index: u32,
    num_name: usize,
    num_post: usize,
}

impl Index {
    pub fn open(path: impl AsRef<Path>) -> Result<Index> {
        let path = path.as_ref();
        let file =
            File::open(path).with_context(|| format!("open index {}", path.display()))?;
        let mmap = unsafe { Mmap::map(&file) }
            .with_context(|| format!("map index {}", path.display()))?;

        let tlen = TRAILER_MAGIC.len();
        if mmap.len() < MAGIC.len() + tlen + 5 * 4 {
            bail!("corrupt index: {} too small", path.display());
        }
        if &mmap[..MAGIC.len()] != MAGIC.as_bytes() {
            bail!("corrupt index: {} has bad magic", path.display());
        }
        if &mmap[mmap.len() - tlen..] != TRAILER_MAGIC.as_bytes() {
            bail!("corrupt index: {} has bad trailer", path.display());
        }
        let n = (mmap.len() - tlen - 5 * 4) as u32;

        let mut ix = Index {
            mmap,
            path_data: 0,
            name_data: 0,
            post_data: 0,
            name_index: 0,
            post_index: 0,
            num_name: 0,
            num_post: 0,
        };
        ix.path_data = ix.uint32_at(n)?;
        ix.name_data = ix.uint32_at(n + 4)?;
        ix.post_data = ix.uint32_at(n + 8)?;
        ix.name_index = ix.uint32_at(n + 12)?;
        ix.post_index = ix.uint32_at(n + 16)?;

        // Section offsets must be ordered and land inside the file.
        let offs = [
            ix.path_data,
            ix.name_data,
            ix.post_data,
            ix.name_index,
            ix.post_index,
        ];
        for w in offs.windows(2) {
            if w[0] > w[1] {
                bail!("corrupt index: {} has unordered sections", path.display());
            }
        }
        if ix.post_index > n || (ix.post_index - ix.name_index) % 4 != 0 {
            bail!("corrupt index: {} has bad section bounds", path.display());
        }
        let name_entries = (ix.post_index - ix.name_index) / 4;
        if name_entries == 0 {
            bail!("corrupt index: {} has empty name index", path.display());
        }
        ix.num_name = name_entries as usize - 1;
        ix.num_post = (n - ix.post_index) as usize / POST_ENTRY_SIZE;
        Ok(ix)
    }

    fn slice(&self, off: u32, len: usize) -> Result<&[u8]> {
        let off = off as usize;
        if off + len > self.mmap.len() {
            bail!("corrupt index: read of {} bytes at {} out of bounds", len, off);
        }
        Ok(&self.mmap[off..off + len])
    }

    fn uint32_at(&self, off: u32) -> Result<u32> {
        let d = self.slice(off, 4)?;
        Ok(u32::from_be_bytes(d.try_into().unwrap()))
    }

    /// NUL-terminated string starting at `off`.
    fn str_at(&self, off: u32) -> Result<&str> {
        if off as usize >= self.mmap.len() {
            bail!("corrupt index: string offset {} out of bounds", off);
        }
        let tail = &self.mmap[off as usize..];
        let end = tail
            .iter()
            .position(|&b| b == 0)
            .with_context(|| format!("corrupt index: unterminated string at {}", off))?;
        std::str::from_utf8(&tail[..end])
            .with_context(|| format!("corrupt index: string at {} not valid UTF-8", off))
    }

    /// The root paths the index was built from.
    pub fn paths(&self) -> Result<Vec<&str>> {
        let mut out = Vec::new();
        let mut off = self.path_data;
        loop {
            let s = self.str_at(off)?;
            if s.is_empty() {
                return Ok(out);
            }
            off += s.len() as u32 + 1;
            out.push(s);
        }
    }

    pub fn num_files(&self) -> usize {
        self.num_name
    }

    /// The name recorded for `fileid`.
    pub fn name(&self, fileid: u32) -> Result<&str> {
        if fileid as usize >= self.num_name {
            bail!("file id {} out of range ({} files)", fileid, self.num_name);
        }
        let off = self.uint32_at(self.name_index + 4 * fileid)?;
        self.str_at(self.name_data + off)
    }

    /// Locates the posting-index record for `trigram` by binary search,
    /// returning its file count and posting-list offset.
    fn find_list(&self, trigram: u32) -> Result<Option<(u32, u32)>> {
        let mut lo = 0usize;
        let mut hi = self.num_post;
        while lo < hi {
            let mid = (lo + hi) / 2;
            let d = self.slice(self.post_index + (mid * POST_ENTRY_SIZE) as u32, POST_ENTRY_SIZE)?;
            let t = (d[0] as u32) << 16 | (d[1] as u32) << 8 | d[2] as u32;
            if t < trigram {
                lo = mid + 1;
            } else {
                hi = mid;
            }
        }
        if lo >= self.num_post {
            return Ok(None);
        }
        let d = self.slice(self.post_index + (lo * POST_ENTRY_SIZE) as u32, POST_ENTRY_SIZE)?;
        let t = (d[0] as u32) << 16 | (d[1] as u32) << 8 | d[2] as u32;
        if t != trigram {
            return Ok(None);
        }
        let count = u32::from_be_bytes(d[3..7].try_into().unwrap());
        let offset = u32::from_be_bytes(d[7..11].try_into().unwrap());
        Ok(Some((count, offset)))
    }

    /// The sorted file ids whose file contains `trigram`.
    pub fn posting_list(&self, trigram: u32) -> Result<Vec<u32>> {
        self.posting_list_restrict(trigram, None)
    }

    fn posting_list_restrict(&self, trigram: u32, restrict: Option<&[u32]>) -> Result<Vec<u32>> {
        let Some((count, offset)) = self.find_list(trigram)? else {
            return Ok(Vec::new());
        };
        let start = self.post_data as u64 + offset as u64;
        if start + 3 > self.name_index as u64 {
            bail!("corrupt index: posting list offset {} out of bounds", offset);
        }
        let start = start as u32;
        let mut d = &self.mmap[start as usize..self.name_index as usize];
        let t = (d[0] as u32) << 16 | (d[1] as u32) << 8 | d[2] as u32;
        if t != trigram {
            bail!(
                "corrupt index: posting list at {} has trigram {:06x}, want {:06x}",
                offset,
                t,
                trigram
            );
        }
        d = &d[3..];

        let mut out = Vec::with_capacity(count as usize);
        let mut fileid = u32::MAX;
        let mut ri = 0usize;
        loop {
            let (delta, n) = read_uvarint(d)?;
            if delta == 0 {
                break;
            }
            d = &d[n..];
            fileid = fileid.wrapping_add(delta);
            if let Some(r) = restrict {
                while ri < r.len() && r[ri] < fileid {
                    ri += 1;
                }
                if ri >= r.len() {
                    break;
                }
                if r[ri] != fileid {
                    continue;
                }
            }
            out.push(fileid);
        }
        if restrict.is_none() && out.len() != count as usize {
            bail!(
                "corrupt index: posting list for {:06x} has {} entries, want {}",
                trigram,
                out.len(),
                count
            );
        }
        Ok(out)
    }

    /// Streamed intersection of `list` with the posting list of `trigram`.
    pub fn posting_and(&self, list: &[u32], trigram: u32) -> Result<Vec<u32>> {
        let other = self.posting_list_restrict(trigram, Some(list))?;
        Ok(other)
    }

    /// Streamed union of `list` with the posting list of `trigram`.
    pub fn posting_or(&self, list: &[u32], trigram: u32) -> Result<Vec<u32>> {
        let other = self.posting_list(trigram)?;
        Ok(merge_or(list, &other))
    }

    /// Evaluates a boolean trigram query, returning matching file ids
    /// in ascending order.
    pub fn posting_query(&self, q: &Query) -> Result<Vec<u32>> {
        self.posting_query_restrict(q, None)
    }

    fn posting_query_restrict(&self, q: &Query, restrict: Option<Vec<u32>>) -> Result<Vec<u32>> {
        match q.op {
            QueryOp::None => Ok(Vec::new()),
            QueryOp::All => Ok(match restrict {
                Some(r) => r,
                None => (0..self.num_name as u32).collect(),
            }),
            QueryOp::And => {
                let mut list: Option<Vec<u32>> = None;
                for t in &q.trigram {
                    let tri = pack_trigram(*t);
                    let next = match &list {
                        None => self.posting_list_restrict(tri, restrict.as_deref())?,
                        Some(l) => self.posting_and(l, tri)?,
                    };
                    if next.is_empty() {
                        return Ok(Vec::new());
                    }
                    list = Some(next);
                }
                for sub in &q.sub {
                    let cur = match list.take() {
                        Some(l) => Some(l),
                        None => restrict.clone(),
                    };
                    let next = self.posting_query_restrict(sub, cur)?;
                    if next.is_empty() {
                        return Ok(Vec::new());
                    }
                    list = Some(next);
                }
                // An AND with no operands constrains nothing.
                Ok(match list {
                    Some(l) => l,
                    None => match restrict {
                        Some(r) => r,
                        None => (0..self.num_name as u32).collect(),
                    },
                })
            }
            QueryOp::Or => {
                let mut list = Vec::new();
                for t in &q.trigram {
                    let other = self.posting_list_restrict(pack_trigram(*t), restrict.as_deref())?;
                    list = merge_or(&list, &other);
                }
                for sub in &q.sub {
                    let other = self.posting_query_restrict(sub, restrict.clone())?;
                    list = merge_or(&list, &other);
                }
                Ok(list)
            }
        }
    }
}

fn pack_trigram(t: [u8; 3]) -> u32 {
    (t[0] as u32) << 16 | (t[1] as u32) << 8 | t[2] as u32
}

fn read_uvarint(d: &[u8]) -> Result<(u32, usize)> {
    let mut val = 0u64;
    let mut shift = 0u32;
    for (i, &b) in d.iter().enumerate() {
        val |= ((b & 0x7f) as u64) << shift;
        if b & 0x80 == 0 {
            if val > u32::MAX as u64 {
                bail!("corrupt index: uvarint overflows u32");
            }
            return Ok((val as u32, i + 1));
        }
        shift += 7;
        if shift > 28 {
            bail!("corrupt index: uvarint too long");
        }
    }
    bail!("corrupt index: truncated uvarint");
}

fn merge_or(a: &[u32], b: &[u32]) -> Vec<u32> {
    let mut out = Vec::with_capacity(a.len() + b.len());
    let (mut i, mut j) = (0, 0);
    while i < a.len() || j < b.len() {
        let v = if j >= b.len() || (i < a.len() && a[i] < b[j]) {
            let v = a[i];
            i += 1;
            v
        } else if i >= a.len() || b[j] < a[i] {
            let v = b[j];
            j += 1;
            v
        } else {
            let v = a[i];
            i += 1;
            j += 1;
            v
        };
        out.push(v);
    }
    out
}
