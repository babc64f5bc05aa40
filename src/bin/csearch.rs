// Copyright 2025 The csearch-rs Authors.
// Copyright 2011 The Go Authors. All rights reserved.
//
// Use of this source code is governed by a BSD-style
// license that can be found in the LICENSE file.

use std::path::PathBuf;

use clap::Parser;
use tracing::debug;

use csearch_rs::index::{default_index_path, Index, IndexError};
use csearch_rs::matcher::{Grep, Regexp};
use csearch_rs::query::{regexp_query, Query};

#[derive(Parser, Debug)]
#[command(
    name = "csearch",
    about = "Search indexed sources for a regular expression",
    long_about = "csearch behaves like grep over all indexed files. It relies on an \
                  up-to-date index built with cindex, stored in $CSEARCHINDEX or \
                  $HOME/.csearchindex."
)]
struct Args {
    /// RE2-style regular expression to search for
    pattern: String,
    /// Search only files with names matching this regexp
    #[arg(short = 'f', value_name = "PATHREGEXP")]
    file_regexp: Option<String>,
    /// Case-insensitive search
    #[arg(short = 'i')]
    ignore_case: bool,
    /// Print only the names of the files containing matches
    #[arg(short = 'l')]
    list: bool,
    /// Print only a count of selected lines per file
    #[arg(short = 'c')]
    count: bool,
    /// Print each output line preceded by its line number
    #[arg(short = 'n')]
    line_numbers: bool,
    /// Limit search output to this many lines (0: no limit)
    #[arg(short = 'm', value_name = "MAXCOUNT", default_value_t = 0)]
    max_count: u64,
    /// Limit search output to this many lines per file (0: no limit)
    #[arg(short = 'M', value_name = "MAXCOUNT", default_value_t = 0)]
    max_count_per_file: u64,
    /// Use FILE as the index path. Overrides $CSEARCHINDEX
    #[arg(long)]
    indexpath: Option<PathBuf>,
    /// Search all files in the index, skipping the trigram filter
    #[arg(long)]
    brute: bool,
    /// Print extra information
    #[arg(long)]
    verbose: bool,
}

fn main() {
    let args = Args::parse();
    init_logging(args.verbose);
    if (args.list && args.count)
        || (args.list && args.max_count_per_file > 0)
        || (args.count && args.max_count_per_file > 0)
    {
        eprintln!("csearch: -l, -c and -M cannot be combined");
        std::process::exit(2);
    }
    match run(&args) {
        Ok(true) => {}
        Ok(false) => std::process::exit(1),
        Err(e) => {
            eprintln!("csearch: {}", e);
            std::process::exit(1);
        }
    }
}

fn run(args: &Args) -> Result<bool, IndexError> {
    let mut pat = format!("(?m){}", args.pattern);
    if args.ignore_case {
        pat = format!("(?i){}", pat);
    }
    let re = Regexp::compile(&pat).map_err(|e| IndexError::BadRegexp(e.to_string()))?;
    let file_re = match &args.file_regexp {
        Some(p) => Some(Regexp::compile(p).map_err(|e| IndexError::BadRegexp(e.to_string()))?),
        None => None,
    };

    let q = if args.brute {
        Query::all()
    } else {
        regexp_query(re.hir())
    };
    debug!("query: {}", q);

    if let Some(p) = &args.indexpath {
        std::env::set_var("CSEARCHINDEX", p);
    }
    let ix = Index::open(default_index_path())?;
    let mut post = ix.posting_query(&q)?;
    debug!("identified {} possible files", post.len());

    if let Some(mut fre) = file_re {
        let mut fnames = Vec::with_capacity(post.len());
        for fileid in post {
            let name = ix.name(fileid)?;
            if fre.matches_str(name, true, true).is_some() {
                fnames.push(fileid);
            }
        }
        debug!("filename regexp matched {} files", fnames.len());
        post = fnames;
    }

    let stdout = std::io::stdout().lock();
    let mut g = Grep::new(re, stdout);
    g.list = args.list;
    g.count = args.count;
    g.line_numbers = args.line_numbers;
    g.max_count = args.max_count;
    g.max_count_per_file = args.max_count_per_file;

    for fileid in post {
        let name = ix.name(fileid)?.to_string();
        g.file(&name)?;
        if g.done {
            break;
        }
    }
    Ok(g.matched)
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
