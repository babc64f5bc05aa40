//! On-disk trigram index: writer, reader, and the shared format constants.
//!
//! This file is intentionally small: the writer lives in
//! `index/writer.rs`, the reader in `index/reader.rs`, and low-level
//! buffered-file helpers in `index/writer_utils.rs`.
//!
//! Index layout:
//!
//! ```text
//! "csearch index 1\n"
//! list of paths
//! list of names
//! list of posting lists
//! name index
//! posting list index
//! offsets of the above five sections, 4-byte big-endian each
//! "\ncsearch trailr\n"
//! ```
//!
//! Paths and names are NUL-terminated; each list ends with an empty
//! string. Names appear in FileId order and the name index holds one
//! 4-byte offset (into name data) per name plus one for the sentinel.
//! A posting list is a 3-byte trigram followed by a delta-encoded
//! uvarint sequence of file ids terminated by a zero delta, and the
//! posting index holds one (trigram, file count, offset) record of
//! 3+4+4 bytes per list, sorted by trigram; offsets there are relative
//! to the start of the posting-list section. All integers in the index
//! are big-endian; the index as a whole must stay under 4 GiB because
//! every offset is 32 bits.

use std::path::PathBuf;

pub const MAGIC: &str = "csearch index 1\n";
pub const TRAILER_MAGIC: &str = "\ncsearch trailr\n";

/// Size of one posting-index record: trigram + file count + offset.
pub(crate) const POST_ENTRY_SIZE: usize = 3 + 4 + 4;

/// Trigram value used internally to mean "no more trigrams".
pub(crate) const SENTINEL_TRIGRAM: u32 = (1 << 24) - 1;

mod error;
pub use error::IndexError;

pub(crate) mod writer_utils;

mod writer;
pub use writer::IndexWriter;

mod reader;
pub use reader::Index;

/// Resolves the index location: `$CSEARCHINDEX` if set and non-empty,
/// else `$HOME/.csearchindex`.
pub fn default_index_path() -> PathBuf {
    if let Ok(p) = std::env::var("CSEARCHINDEX") {
        if !p.is_empty() {
            return PathBuf::from(p);
        }
    }
    match std::env::var("HOME") {
        Ok(home) => PathBuf::from(home).join(".csearchindex"),
        Err(_) => PathBuf::from(".csearchindex"),
    }
}
