// Copyright 2025 The csearch-rs Authors.
// Copyright 2011 The Go Authors. All rights reserved.
//
// Use of this source code is governed by a BSD-style
// license that can be found in the LICENSE file.

use std::collections::HashSet;
use std::path::PathBuf;
use std::result::Result as StdResult;

use clap::Parser;
use tracing::{info, warn};

use csearch_rs::index::{default_index_path, Index, IndexError, IndexWriter};

#[derive(Parser, Debug)]
#[command(
    name = "cindex",
    about = "Build the trigram index used by csearch",
    long_about = "cindex walks the given directory trees and (re)builds the index \
                  stored in $CSEARCHINDEX or $HOME/.csearchindex. With no paths it \
                  re-indexes the paths recorded in the current index."
)]
struct Args {
    /// Directories or files to index
    paths: Vec<PathBuf>,
    /// Use FILE as the index path. Overrides $CSEARCHINDEX
    #[arg(long)]
    indexpath: Option<PathBuf>,
    /// Log information about skipped files
    #[arg(long)]
    log_skip: bool,
    /// Print extra information
    #[arg(long)]
    verbose: bool,
    /// Do not follow symlinked files and directories
    #[arg(long)]
    no_follow_symlinks: bool,
    /// Skip files larger than this many bytes
    #[arg(long)]
    max_file_len: Option<u64>,
    /// Skip files with lines longer than this many bytes
    #[arg(long)]
    max_line_len: Option<usize>,
    /// Skip files with more than this many distinct trigrams
    #[arg(long)]
    max_trigrams: Option<usize>,
    /// Skip files with a higher ratio of invalid UTF-8 byte pairs
    #[arg(long)]
    max_invalid_utf8_ratio: Option<f64>,
}

fn main() -> StdResult<(), IndexError> {
    let args = Args::parse();
    init_logging(args.verbose);

    if let Some(p) = &args.indexpath {
        std::env::set_var("CSEARCHINDEX", p);
    }
    let master = default_index_path();

    let mut roots: Vec<String> = Vec::new();
    if args.paths.is_empty() {
        // Re-index whatever the current index covers.
        let ix = Index::open(&master)?;
        roots.extend(ix.paths()?.iter().map(|s| s.to_string()));
    } else {
        for p in &args.paths {
            let abs = std::fs::canonicalize(p)?;
            roots.push(abs.to_string_lossy().into_owned());
        }
    }
    roots.sort();
    roots.dedup();
    if roots.is_empty() {
        eprintln!("cindex: nothing to index");
        std::process::exit(2);
    }

    // Build into a scratch file beside the index, then rename: a
    // published index is never partially written.
    let tmp = {
        let mut s = master.as_os_str().to_os_string();
        s.push("~");
        PathBuf::from(s)
    };
    let mut ix = IndexWriter::create(&tmp)?;
    ix.log_skip = args.log_skip;
    ix.verbose = args.verbose;
    if let Some(v) = args.max_file_len {
        ix.max_file_len = v;
    }
    if let Some(v) = args.max_line_len {
        ix.max_line_len = v;
    }
    if let Some(v) = args.max_trigrams {
        ix.max_trigrams = v;
    }
    if let Some(v) = args.max_invalid_utf8_ratio {
        ix.max_invalid_utf8_ratio = v;
    }
    ix.add_paths(roots.clone());

    let mut seen: HashSet<PathBuf> = HashSet::new();
    for root in &roots {
        info!("index {}", root);
        let mut builder = ignore::WalkBuilder::new(root);
        builder
            .standard_filters(false)
            .follow_links(!args.no_follow_symlinks)
            .sort_by_file_name(|a, b| a.cmp(b))
            .filter_entry(|e| {
                // Skip temporary and "hidden" files and directories.
                let name = e.file_name().to_string_lossy();
                !(name.starts_with('.') || name.starts_with('#') || name.ends_with('~'))
            });
        for entry in builder.build() {
            let entry = match entry {
                Ok(e) => e,
                Err(e) => {
                    warn!("{}", e);
                    continue;
                }
            };
            if !entry.file_type().map_or(false, |t| t.is_file()) {
                continue;
            }
            let path = entry.path();
            let resolved = std::fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf());
            if seen.insert(resolved) {
                ix.add_file(&path.to_string_lossy())?;
            }
        }
    }
    ix.flush()?;
    std::fs::rename(&tmp, &master)?;
    info!("done");
    Ok(())
}

fn init_logging(verbose: bool) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        tracing_subscriber::EnvFilter::new(if verbose { "debug" } else { "info" })
    });
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}
