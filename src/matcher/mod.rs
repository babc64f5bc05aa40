// Copyright 2025 The csearch-rs Authors.
// Copyright 2011 The Go Authors. All rights reserved.
//
// Use of this source code is governed by a BSD-style
// license that can be found in the LICENSE file.

//! Regular expression matching tuned for grep-like programs.
//!
//! A `Regexp` compiles to a byte-oriented NFA and reports the earliest
//! position at which a match ends, which is all line-oriented output
//! needs. Matching runs two thread sets over the program counters with
//! epsilon closures computed lazily, one input byte at a time.

mod compile;
mod grep;
mod prog;

pub use grep::Grep;

use anyhow::{anyhow, Result};
use regex_syntax::hir::Hir;

use crate::sparse::SparseSet;
use prog::{byte_in_range, empty_flags, Inst, Prog};

/// A compiled regular expression.
///
/// Not safe for concurrent use: the thread lists are reused across
/// calls. Searches wanting parallelism compile one `Regexp` each.
pub struct Regexp {
    expr: String,
    hir: Hir,
    prog: Prog,
    clist: SparseSet,
    nlist: SparseSet,
    stack: Vec<u32>,
}

impl Regexp {
    /// Parses and compiles `expr`. Invalid UTF-8 in the haystack is
    /// acceptable by construction: the program consumes bytes.
    pub fn compile(expr: &str) -> Result<Regexp> {
        let hir = regex_syntax::ParserBuilder::new()
            .allow_invalid_utf8(true)
            .build()
            .parse(expr)
            .map_err(|e| anyhow!("parsing {:?}: {}", expr, e))?;
        let prog = compile::compile(&hir)?;
        let n = prog.insts.len();
        Ok(Regexp {
            expr: expr.to_string(),
            hir,
            prog,
            clist: SparseSet::new(n),
            nlist: SparseSet::new(n),
            stack: Vec::new(),
        })
    }

    /// The source text the expression was compiled from.
    pub fn expr(&self) -> &str {
        &self.expr
    }

    /// The parsed form, for query derivation.
    pub fn hir(&self) -> &Hir {
        &self.hir
    }

    /// Unanchored search over `text`; returns the end offset of the
    /// earliest-ending match. `begin_text`/`end_text` say whether the
    /// buffer boundaries are real text boundaries.
    pub fn matches(&mut self, text: &[u8], begin_text: bool, end_text: bool) -> Option<usize> {
        let Regexp {
            prog,
            clist,
            nlist,
            stack,
            ..
        } = self;
        clist.reset();
        nlist.reset();

        for pos in 0..=text.len() {
            let prev = if pos == 0 { None } else { Some(text[pos - 1]) };
            let here = text.get(pos).copied();
            let flags = empty_flags(prev, here, begin_text, end_text);

            // A match may start anywhere: seed the start state each step.
            add_thread(clist, stack, prog, prog.start, flags);
            for &pc in clist.dense() {
                if matches!(prog.insts[pc as usize], Inst::Match) {
                    return Some(pos);
                }
            }
            let Some(b) = here else { break };
            let next_flags = empty_flags(Some(b), text.get(pos + 1).copied(), begin_text, end_text);
            nlist.reset();
            for &pc in clist.dense() {
                if let Inst::ByteRange { lo, hi, fold, out } = prog.insts[pc as usize] {
                    if byte_in_range(b, lo, hi, fold) {
                        add_thread(nlist, stack, prog, out, next_flags);
                    }
                }
            }
            std::mem::swap(clist, nlist);
        }
        None
    }

    pub fn matches_str(&mut self, text: &str, begin_text: bool, end_text: bool) -> Option<usize> {
        self.matches(text.as_bytes(), begin_text, end_text)
    }
}

/// Adds `pc0` and its epsilon closure to `set`, following alternations
/// and the empty-width assertions satisfied under `flags`.
fn add_thread(set: &mut SparseSet, stack: &mut Vec<u32>, prog: &Prog, pc0: u32, flags: u8) {
    stack.clear();
    stack.push(pc0);
    while let Some(pc) = stack.pop() {
        if set.contains(pc) {
            continue;
        }
        set.add(pc);
        match prog.insts[pc as usize] {
            Inst::Alt { out, arg } => {
                stack.push(out);
                stack.push(arg);
            }
            Inst::Nop { out } => stack.push(out),
            Inst::EmptyWidth { flags: need, out } => {
                if need & !flags == 0 {
                    stack.push(out);
                }
            }
            _ => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn m(pattern: &str, text: &str) -> Option<usize> {
        Regexp::compile(pattern)
            .unwrap()
            .matches(text.as_bytes(), true, true)
    }

    #[test]
    fn literal_earliest_end() {
        assert_eq!(m("abc", "xxabcabc"), Some(5));
        assert_eq!(m("abc", "ab"), None);
        assert_eq!(m("", "anything"), Some(0));
    }

    #[test]
    fn classes_and_repeats() {
        assert_eq!(m("[a-c]+d", "zzabcad!"), Some(7));
        assert_eq!(m("a?b", "b"), Some(1));
        assert_eq!(m("x{2,3}", "oxxo"), Some(3));
        assert_eq!(m("x{2,3}", "oxo"), None);
    }

    #[test]
    fn fold_flag() {
        assert_eq!(m("(?i)foo", "zzFOO"), Some(5));
        assert_eq!(m("(?i)[a-z]+", "QQQ"), Some(1));
        assert_eq!(m("foo", "FOO"), None);
    }

    #[test]
    fn anchors() {
        assert_eq!(m("^abc", "abc"), Some(3));
        assert_eq!(m("^abc", "zabc"), None);
        assert_eq!(m("abc$", "zabc"), Some(4));
        assert_eq!(m("(?m)^b", "a\nb"), Some(3));
        assert_eq!(m(r"\bword\b", "a word."), Some(6));
        assert_eq!(m(r"\bword\b", "password"), None);
    }

    #[test]
    fn unicode_classes_consume_bytes() {
        // é is two bytes; the class must match its UTF-8 encoding.
        assert_eq!(m(r"h\p{L}llo", "héllo"), Some(6));
        assert_eq!(m("h.llo", "héllo"), Some(6));
    }

    #[test]
    fn non_utf8_haystack() {
        let mut re = Regexp::compile("abc").unwrap();
        assert_eq!(re.matches(b"\xff\xfeabc", true, true), Some(5));
    }
}
