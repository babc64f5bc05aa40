// Copyright 2025 The csearch-rs Authors.
// Copyright 2011 The Go Authors. All rights reserved.
//
// Use of this source code is governed by a BSD-style
// license that can be found in the LICENSE file.

//! Boolean queries over trigrams.
//!
//! A `Query` selects the candidate files for a regexp search: `All`
//! and `None` are the trivial queries, and `And`/`Or` nodes carry both
//! a set of trigram operands and a list of sub-queries. The algebra
//! here keeps queries in a simplified form; the lowering from a parsed
//! regexp lives in `query/analyze.rs`.

mod analyze;
pub use analyze::regexp_query;

use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryOp {
    All,
    None,
    And,
    Or,
}

/// A boolean expression over trigrams. The trigrams at an `And`/`Or`
/// node are implicit operands alongside `sub`: all must be present for
/// `And`, any suffices for `Or`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Query {
    pub op: QueryOp,
    pub trigram: Vec<[u8; 3]>,
    pub sub: Vec<Query>,
}

impl Query {
    /// The query matched by every file.
    pub fn all() -> Query {
        Query {
            op: QueryOp::All,
            trigram: Vec::new(),
            sub: Vec::new(),
        }
    }

    /// The query matched by no file.
    pub fn none() -> Query {
        Query {
            op: QueryOp::None,
            trigram: Vec::new(),
            sub: Vec::new(),
        }
    }

    pub(crate) fn and_of(trigram: Vec<[u8; 3]>) -> Query {
        let mut q = Query {
            op: QueryOp::And,
            trigram,
            sub: Vec::new(),
        };
        q.simplify();
        q
    }

    pub fn and(self, r: Query) -> Query {
        Query::and_or(self, r, QueryOp::And)
    }

    pub fn or(self, r: Query) -> Query {
        Query::and_or(self, r, QueryOp::Or)
    }

    fn and_or(q: Query, r: Query, op: QueryOp) -> Query {
        let q = q.unwrap_single();
        let r = r.unwrap_single();

        // Identities and absorption.
        match (q.op, op) {
            (QueryOp::None, QueryOp::And) | (QueryOp::All, QueryOp::Or) => return q,
            (QueryOp::All, QueryOp::And) | (QueryOp::None, QueryOp::Or) => return r,
            _ => {}
        }
        match (r.op, op) {
            (QueryOp::None, QueryOp::And) | (QueryOp::All, QueryOp::Or) => return r,
            (QueryOp::All, QueryOp::And) | (QueryOp::None, QueryOp::Or) => return q,
            _ => {}
        }

        let q = q.coerce_atom(op);
        let r = r.coerce_atom(op);
        let mut out = if q.op == op {
            let mut out = q;
            if r.op == op {
                out.trigram.extend(r.trigram);
                out.sub.extend(r.sub);
            } else {
                out.sub.push(r);
            }
            out
        } else if r.op == op {
            let mut out = r;
            out.sub.push(q);
            out
        } else {
            Query {
                op,
                trigram: Vec::new(),
                sub: vec![q, r],
            }
        };
        out.simplify();
        out
    }

    /// A node with a single trigram and no children means "contains
    /// that trigram" regardless of op, so it may adopt the op of the
    /// node it is merged into.
    fn coerce_atom(mut self, op: QueryOp) -> Query {
        if matches!(self.op, QueryOp::And | QueryOp::Or)
            && self.sub.is_empty()
            && self.trigram.len() == 1
        {
            self.op = op;
        }
        self
    }

    fn unwrap_single(self) -> Query {
        if matches!(self.op, QueryOp::And | QueryOp::Or)
            && self.trigram.is_empty()
            && self.sub.len() == 1
        {
            self.sub.into_iter().next().unwrap()
        } else {
            self
        }
    }

    /// Rewrites the node into simplified form: folds `All`/`None`,
    /// flattens nested nodes of the same op, sorts and dedupes the
    /// trigram operands, and drops implied children.
    pub(crate) fn simplify(&mut self) {
        if matches!(self.op, QueryOp::All | QueryOp::None) {
            self.trigram.clear();
            self.sub.clear();
            return;
        }

        // Hoist children with the same op, and single-trigram atoms.
        let mut i = 0;
        while i < self.sub.len() {
            if self.sub[i].op == self.op
                || (matches!(self.sub[i].op, QueryOp::And | QueryOp::Or)
                    && self.sub[i].sub.is_empty()
                    && self.sub[i].trigram.len() == 1)
            {
                let child = self.sub.swap_remove(i);
                self.trigram.extend(child.trigram);
                self.sub.extend(child.sub);
            } else {
                i += 1;
            }
        }

        // Fold trivial children.
        let op = self.op;
        let mut absorbed = false;
        self.sub.retain(|s| match (s.op, op) {
            (QueryOp::All, QueryOp::And) | (QueryOp::None, QueryOp::Or) => false,
            (QueryOp::None, QueryOp::And) | (QueryOp::All, QueryOp::Or) => {
                absorbed = true;
                true
            }
            _ => true,
        });
        if absorbed {
            *self = match op {
                QueryOp::And => Query::none(),
                _ => Query::all(),
            };
            return;
        }

        self.trigram.sort_unstable();
        self.trigram.dedup();

        // Implied children. In an AND, a required trigram t implies any
        // OR child listing t; in an OR, an AND child listing one of the
        // node's own trigrams is already covered by that trigram.
        let trigram = &self.trigram;
        match op {
            QueryOp::And => self.sub.retain(|s| {
                !(s.op == QueryOp::Or && s.trigram.iter().any(|t| trigram.contains(t)))
            }),
            QueryOp::Or => self.sub.retain(|s| {
                !(s.op == QueryOp::And && s.trigram.iter().any(|t| trigram.contains(t)))
            }),
            _ => {}
        }

        if self.trigram.is_empty() && self.sub.is_empty() {
            *self = match op {
                QueryOp::And => Query::all(),
                _ => Query::none(),
            };
        } else if self.trigram.is_empty() && self.sub.len() == 1 {
            *self = self.sub.pop().unwrap();
        }
    }
}

impl fmt::Display for Query {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.op {
            QueryOp::None => return write!(f, "-"),
            QueryOp::All => return write!(f, "+"),
            _ => {}
        }
        if self.sub.is_empty() && self.trigram.len() == 1 {
            return write!(f, "\"{}\"", self.trigram[0].escape_ascii());
        }
        let (open, tjoin, sjoin, close) = match self.op {
            QueryOp::And => ("", " ", " ", ""),
            _ => ("(", "|", ")|(", ")"),
        };
        write!(f, "{}", open)?;
        for (i, t) in self.trigram.iter().enumerate() {
            if i > 0 {
                write!(f, "{}", tjoin)?;
            }
            write!(f, "\"{}\"", t.escape_ascii())?;
        }
        for (i, s) in self.sub.iter().enumerate() {
            if i > 0 || !self.trigram.is_empty() {
                write!(f, "{}", sjoin)?;
            }
            write!(f, "{}", s)?;
        }
        write!(f, "{}", close)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tri(s: &str) -> [u8; 3] {
        s.as_bytes().try_into().unwrap()
    }

    #[test]
    fn identities() {
        let q = Query::and_of(vec![tri("abc")]);
        assert_eq!(q.clone().and(Query::all()), q);
        assert_eq!(q.clone().or(Query::none()), q);
        assert_eq!(q.clone().and(Query::none()), Query::none());
        assert_eq!(q.or(Query::all()), Query::all());
    }

    #[test]
    fn flatten_and_dedupe() {
        let q = Query::and_of(vec![tri("abc"), tri("bcd")])
            .and(Query::and_of(vec![tri("bcd"), tri("cde")]));
        assert_eq!(q.op, QueryOp::And);
        assert_eq!(q.trigram, vec![tri("abc"), tri("bcd"), tri("cde")]);
        assert!(q.sub.is_empty());
    }

    #[test]
    fn empty_and_is_all() {
        let q = Query::and_of(Vec::new());
        assert_eq!(q, Query::all());
    }

    #[test]
    fn implied_or_child_dropped() {
        // abc AND (abc|xyz) == abc
        let or = Query::and_of(vec![tri("abc")]).or(Query::and_of(vec![tri("xyz")]));
        let q = Query::and_of(vec![tri("abc")]).and(or);
        assert_eq!(q, Query::and_of(vec![tri("abc")]));
    }

    #[test]
    fn display_shape() {
        let q = Query::and_of(vec![tri("wor"), tri("orl"), tri("rld")]);
        assert_eq!(q.to_string(), "\"orl\" \"rld\" \"wor\"");
        let o = Query::and_of(vec![tri("hel")]).or(Query::and_of(vec![tri("her")]));
        assert_eq!(o.to_string(), "(\"hel\"|\"her\")");
    }
}
