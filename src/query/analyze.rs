// Copyright 2025 The csearch-rs Authors.
// Copyright 2011 The Go Authors. All rights reserved.
//
// Use of this source code is governed by a BSD-style
// license that can be found in the LICENSE file.

//! Lowering a parsed regexp to a trigram `Query`.
//!
//! The contract is one-sided: every file the regexp can match must be
//! selected by the query. False positives only cost a scan, so any
//! subexpression the analysis cannot track degrades to "unknown" and
//! contributes nothing.
//!
//! Each HIR node is summarized as a `RegexInfo`: whether it can match
//! the empty string, the finite set of strings it matches exactly (if
//! enumerable), sets of possible match prefixes and suffixes, and a
//! `Query` every matching text must satisfy. Concatenation crosses
//! exact sets and harvests the trigrams spanning the boundary;
//! alternation unions; repetitions with a small bound expand, the rest
//! keep only what a single mandatory copy guarantees.

use std::collections::BTreeSet;
use std::mem;

use regex_syntax::hir::{Class, Hir, HirKind, Literal, RepetitionKind, RepetitionRange};

use super::Query;

type StringSet = BTreeSet<Vec<u8>>;

/// Exact-string sets wider than this collapse to unknown. This is the
/// cap that sends case-folded literals like `(?i)Foo` (an 8-way
/// product) to a brute scan instead of an 8-branch trigram query.
const MAX_EXACT: usize = 7;
/// Prefix/suffix sets are shrunk until they fit this many entries.
const MAX_SET: usize = 10;
/// Character classes wider than this are not enumerated.
const MAX_CLASS: u32 = 4;
/// Counted repetitions expand up to this many copies.
const MAX_REPEAT: u32 = 4;

struct RegexInfo {
    can_empty: bool,
    /// All strings the subexpression matches, or `None` if the set is
    /// not finitely enumerable (or grew past `MAX_EXACT`).
    exact: Option<StringSet>,
    /// When `exact` is `None`: strings every match must start with.
    prefix: StringSet,
    /// When `exact` is `None`: strings every match must end with.
    suffix: StringSet,
    match_q: Query,
}

/// Derives the candidate-file query for a parsed regexp.
pub fn regexp_query(hir: &Hir) -> Query {
    let mut info = analyze(hir);
    info.simplify(true);
    info.add_exact();
    info.match_q
}

fn analyze(hir: &Hir) -> RegexInfo {
    match hir.kind() {
        HirKind::Empty => empty_string(),
        // Assertions match no bytes: same summary as the empty string.
        HirKind::Anchor(_) | HirKind::WordBoundary(_) => empty_string(),
        HirKind::Literal(Literal::Unicode(c)) => {
            let mut buf = [0u8; 4];
            literal(c.encode_utf8(&mut buf).as_bytes().to_vec())
        }
        HirKind::Literal(Literal::Byte(b)) => literal(vec![*b]),
        HirKind::Class(Class::Unicode(cls)) => {
            let count: u32 = cls
                .iter()
                .map(|r| r.end() as u32 - r.start() as u32 + 1)
                .sum();
            if count == 0 {
                return no_match();
            }
            if count > MAX_CLASS {
                return any_char();
            }
            let mut exact = StringSet::new();
            for r in cls.iter() {
                for cp in r.start() as u32..=r.end() as u32 {
                    if let Some(c) = char::from_u32(cp) {
                        let mut buf = [0u8; 4];
                        exact.insert(c.encode_utf8(&mut buf).as_bytes().to_vec());
                    }
                }
            }
            exact_set(exact)
        }
        HirKind::Class(Class::Bytes(cls)) => {
            let count: u32 = cls
                .iter()
                .map(|r| r.end() as u32 - r.start() as u32 + 1)
                .sum();
            if count == 0 {
                return no_match();
            }
            if count > MAX_CLASS {
                return any_char();
            }
            let mut exact = StringSet::new();
            for r in cls.iter() {
                for b in r.start()..=r.end() {
                    exact.insert(vec![b]);
                }
            }
            exact_set(exact)
        }
        HirKind::Group(g) => analyze(&g.hir),
        HirKind::Repetition(rep) => match &rep.kind {
            RepetitionKind::ZeroOrOne => alternate(analyze(&rep.hir), empty_string()),
            RepetitionKind::ZeroOrMore => any_match(),
            RepetitionKind::OneOrMore => plus(analyze(&rep.hir)),
            RepetitionKind::Range(rr) => repeat_range(&rep.hir, rr),
        },
        HirKind::Concat(list) => {
            let mut info = empty_string();
            for sub in list {
                info = concat(info, analyze(sub));
            }
            info
        }
        HirKind::Alternation(list) => {
            let mut it = list.iter();
            let mut info = match it.next() {
                Some(sub) => analyze(sub),
                None => no_match(),
            };
            for sub in it {
                info = alternate(info, analyze(sub));
            }
            info
        }
    }
}

fn repeat_range(hir: &Hir, rr: &RepetitionRange) -> RegexInfo {
    match *rr {
        RepetitionRange::Exactly(0) => empty_string(),
        RepetitionRange::Exactly(n) if n <= MAX_REPEAT => {
            let mut info = empty_string();
            for _ in 0..n {
                info = concat(info, analyze(hir));
            }
            info
        }
        // Too many copies to enumerate; one mandatory copy is all the
        // analysis keeps.
        RepetitionRange::Exactly(_) => plus(analyze(hir)),
        RepetitionRange::AtLeast(0) => any_match(),
        RepetitionRange::AtLeast(_) => plus(analyze(hir)),
        RepetitionRange::Bounded(0, m) => zero_or_up_to(hir, m),
        RepetitionRange::Bounded(_, _) => plus(analyze(hir)),
    }
}

/// `x{0,m}` as `ε | x·x{0,m-1}`, keeping the exact-string enumeration
/// honest for small bounds.
fn zero_or_up_to(hir: &Hir, m: u32) -> RegexInfo {
    if m == 0 {
        return empty_string();
    }
    if m > MAX_REPEAT {
        return any_match();
    }
    alternate(empty_string(), concat(analyze(hir), zero_or_up_to(hir, m - 1)))
}

fn empty_string() -> RegexInfo {
    let mut exact = StringSet::new();
    exact.insert(Vec::new());
    RegexInfo {
        can_empty: true,
        exact: Some(exact),
        prefix: StringSet::new(),
        suffix: StringSet::new(),
        match_q: Query::all(),
    }
}

fn no_match() -> RegexInfo {
    RegexInfo {
        can_empty: false,
        exact: None,
        prefix: StringSet::new(),
        suffix: StringSet::new(),
        match_q: Query::none(),
    }
}

fn any_char() -> RegexInfo {
    let mut set = StringSet::new();
    set.insert(Vec::new());
    RegexInfo {
        can_empty: false,
        exact: None,
        prefix: set.clone(),
        suffix: set,
        match_q: Query::all(),
    }
}

fn any_match() -> RegexInfo {
    let mut info = any_char();
    info.can_empty = true;
    info
}

fn literal(bytes: Vec<u8>) -> RegexInfo {
    let mut exact = StringSet::new();
    exact.insert(bytes);
    exact_set(exact)
}

fn exact_set(exact: StringSet) -> RegexInfo {
    let mut info = RegexInfo {
        can_empty: exact.contains(&Vec::new()),
        exact: Some(exact),
        prefix: StringSet::new(),
        suffix: StringSet::new(),
        match_q: Query::all(),
    };
    info.simplify(false);
    info
}

/// `x+`: prefixes and suffixes survive, exactness does not.
fn plus(mut info: RegexInfo) -> RegexInfo {
    if let Some(exact) = info.exact.take() {
        info.prefix = exact.clone();
        info.suffix = exact;
    }
    info.simplify(false);
    info
}

fn concat(x: RegexInfo, y: RegexInfo) -> RegexInfo {
    let mut xy = RegexInfo {
        can_empty: x.can_empty && y.can_empty,
        exact: None,
        prefix: StringSet::new(),
        suffix: StringSet::new(),
        match_q: x.match_q.clone().and(y.match_q.clone()),
    };
    match (&x.exact, &y.exact) {
        (Some(xe), Some(ye)) => {
            xy.exact = Some(cross(xe, ye));
        }
        _ => {
            match &x.exact {
                Some(xe) => xy.prefix = cross(xe, &y.prefix),
                None => {
                    xy.prefix = x.prefix.clone();
                    if x.can_empty {
                        xy.prefix.extend(y.prefix.iter().cloned());
                    }
                }
            }
            match &y.exact {
                Some(ye) => xy.suffix = cross(&x.suffix, ye),
                None => {
                    xy.suffix = y.suffix.clone();
                    if y.can_empty {
                        xy.suffix.extend(x.suffix.iter().cloned());
                    }
                }
            }
        }
    }

    // If every string in the cross of x's suffixes and y's prefixes is
    // long enough, one of its trigrams must appear in any match, and
    // nothing upstream will account for it.
    if x.exact.is_none()
        && y.exact.is_none()
        && x.suffix.len() <= MAX_SET
        && y.prefix.len() <= MAX_SET
        && min_len(&x.suffix) + min_len(&y.prefix) >= 3
    {
        let spanning = cross(&x.suffix, &y.prefix);
        xy.match_q = mem::replace(&mut xy.match_q, Query::all()).and(and_trigrams(&spanning));
    }
    xy.simplify(false);
    xy
}

fn alternate(mut x: RegexInfo, mut y: RegexInfo) -> RegexInfo {
    let mut xy = RegexInfo {
        can_empty: x.can_empty || y.can_empty,
        exact: None,
        prefix: StringSet::new(),
        suffix: StringSet::new(),
        match_q: Query::all(),
    };
    match (&x.exact, &y.exact) {
        (Some(xe), Some(ye)) => {
            xy.exact = Some(xe.union(ye).cloned().collect());
        }
        (Some(xe), None) => {
            xy.prefix = xe.union(&y.prefix).cloned().collect();
            xy.suffix = xe.union(&y.suffix).cloned().collect();
            x.add_exact();
        }
        (None, Some(ye)) => {
            xy.prefix = x.prefix.union(ye).cloned().collect();
            xy.suffix = x.suffix.union(ye).cloned().collect();
            y.add_exact();
        }
        (None, None) => {
            xy.prefix = x.prefix.union(&y.prefix).cloned().collect();
            xy.suffix = x.suffix.union(&y.suffix).cloned().collect();
        }
    }
    xy.match_q = x.match_q.or(y.match_q);
    xy.simplify(false);
    xy
}

impl RegexInfo {
    /// Folds the trigrams of the exact-string set into the match query.
    fn add_exact(&mut self) {
        if let Some(exact) = &self.exact {
            let q = and_trigrams(exact);
            self.match_q = mem::replace(&mut self.match_q, Query::all()).and(q);
        }
    }

    /// Keeps the summary within its caps. Exact sets that grew too wide
    /// collapse to unknown without contributing trigrams; exact sets
    /// whose strings got long enough are folded into the match query
    /// and distributed into prefix/suffix first. Prefix/suffix sets
    /// contribute their trigrams, then shrink to short strings.
    fn simplify(&mut self, force: bool) {
        if let Some(exact) = &self.exact {
            let size = exact.len();
            let min = exact.iter().map(|s| s.len()).min().unwrap_or(0);
            if size > MAX_EXACT {
                let exact = self.exact.take().unwrap();
                distribute(&exact, &mut self.prefix, &mut self.suffix);
            } else if min >= 4 || (force && min >= 3) {
                self.add_exact();
                let exact = self.exact.take().unwrap();
                distribute(&exact, &mut self.prefix, &mut self.suffix);
            }
        }
        if self.exact.is_none() {
            let (prefix, q) = simplify_set(mem::take(&mut self.prefix), false);
            self.prefix = prefix;
            self.match_q = mem::replace(&mut self.match_q, Query::all()).and(q);
            let (suffix, q) = simplify_set(mem::take(&mut self.suffix), true);
            self.suffix = suffix;
            self.match_q = mem::replace(&mut self.match_q, Query::all()).and(q);
        }
    }
}

/// Moves exact strings into the prefix/suffix summaries: short strings
/// whole, longer ones as their first/last two bytes.
fn distribute(exact: &StringSet, prefix: &mut StringSet, suffix: &mut StringSet) {
    for s in exact {
        if s.len() < 3 {
            prefix.insert(s.clone());
            suffix.insert(s.clone());
        } else {
            prefix.insert(s[..2].to_vec());
            suffix.insert(s[s.len() - 2..].to_vec());
        }
    }
}

/// Extracts the trigram constraint of a prefix/suffix set and trims it:
/// strings shrink to two bytes (their trigrams are already captured),
/// shorter still while the set stays too large, and entries that have
/// another entry as their own prefix/suffix are dropped as redundant.
fn simplify_set(set: StringSet, is_suffix: bool) -> (StringSet, Query) {
    let q = and_trigrams(&set);

    let mut t = set;
    let mut n = 3usize;
    loop {
        if n != 3 && t.len() <= MAX_SET {
            break;
        }
        let keep = n - 1;
        t = t
            .iter()
            .map(|s| {
                if s.len() < n {
                    s.clone()
                } else if is_suffix {
                    s[s.len() - keep..].to_vec()
                } else {
                    s[..keep].to_vec()
                }
            })
            .collect();
        if n == 1 {
            break;
        }
        n -= 1;
    }

    let mut v: Vec<Vec<u8>> = t.into_iter().collect();
    if is_suffix {
        v.sort_by(|a, b| a.iter().rev().cmp(b.iter().rev()));
    }
    let mut out: Vec<Vec<u8>> = Vec::new();
    for s in v {
        if let Some(last) = out.last() {
            let redundant = if is_suffix {
                s.ends_with(last)
            } else {
                s.starts_with(last)
            };
            if redundant {
                continue;
            }
        }
        out.push(s);
    }
    (out.into_iter().collect(), q)
}

/// The trigram constraint implied by "the text contains one of these
/// strings": an OR over the strings of the AND of each string's
/// trigrams. If any string is shorter than three bytes no trigram can
/// be guaranteed at all.
fn and_trigrams(set: &StringSet) -> Query {
    if min_len(set) < 3 {
        return Query::all();
    }
    let mut or = Query::none();
    for s in set {
        let mut trigrams: Vec<[u8; 3]> = Vec::with_capacity(s.len() - 2);
        for w in s.windows(3) {
            trigrams.push(w.try_into().unwrap());
        }
        or = or.or(Query::and_of(trigrams));
    }
    or
}

fn min_len(set: &StringSet) -> usize {
    set.iter().map(|s| s.len()).min().unwrap_or(0)
}

fn cross(a: &StringSet, b: &StringSet) -> StringSet {
    let mut out = StringSet::new();
    for x in a {
        for y in b {
            let mut s = x.clone();
            s.extend_from_slice(y);
            out.insert(s);
        }
    }
    out
}
