// Copyright 2025 The csearch-rs Authors.
//
// Use of this source code is governed by a BSD-style
// license that can be found in the LICENSE file.

use std::error::Error;
use std::fmt::{self, Display};

/// Typed errors surfaced at the binary boundary.
#[derive(Debug)]
pub enum IndexError {
    /// A regular expression failed to parse or compile.
    BadRegexp(String),
    /// Fallback for other textual errors.
    Other(String),
}

impl Display for IndexError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IndexError::BadRegexp(s) => write!(f, "bad regexp: {}", s),
            IndexError::Other(s) => write!(f, "error: {}", s),
        }
    }
}

impl Error for IndexError {}

// Conversions from common error types for easier propagation in binaries.
impl From<std::io::Error> for IndexError {
    fn from(e: std::io::Error) -> Self {
        IndexError::Other(e.to_string())
    }
}

impl From<anyhow::Error> for IndexError {
    fn from(e: anyhow::Error) -> Self {
        IndexError::Other(e.to_string())
    }
}
