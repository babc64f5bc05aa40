// Copyright 2025 The csearch-rs Authors.
// Copyright 2011 The Go Authors. All rights reserved.
//
// Use of this source code is governed by a BSD-style
// license that can be found in the LICENSE file.

//! Regexp search over source trees backed by a persistent trigram index.
//!
//! `IndexWriter` streams a corpus into an on-disk inverted index from
//! every three-byte sequence to the files containing it. At query time
//! a regexp is lowered to a conservative boolean query over trigrams
//! (`regexp_query`), evaluated against the mapped index (`Index`) to
//! select candidate files, and only those candidates are scanned with
//! the byte-level matcher (`Regexp`/`Grep`).

pub mod index;
pub mod matcher;
pub mod query;
pub mod sparse;

// Flat re-exports for downstream callers.
pub use crate::index::{default_index_path, Index, IndexError, IndexWriter};
pub use crate::matcher::{Grep, Regexp};
pub use crate::query::{regexp_query, Query, QueryOp};
