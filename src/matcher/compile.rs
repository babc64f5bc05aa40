// Copyright 2025 The csearch-rs Authors.
// Copyright 2011 The Go Authors. All rights reserved.
//
// Use of this source code is governed by a BSD-style
// license that can be found in the LICENSE file.

//! Thompson construction from the parsed HIR to the byte program.
//!
//! Unicode character classes are the interesting case: each scalar
//! range is decomposed into a small alternation of byte-range chains
//! covering its 1-4-byte UTF-8 encodings (`Utf8Sequences` guarantees
//! the decomposition stays small). Single-byte A-Z ranges whose a-z
//! partner is also in the class merge into one folded instruction.

use anyhow::{bail, Result};
use regex_syntax::hir::{Anchor, Class, Hir, HirKind, Literal, RepetitionKind, RepetitionRange, WordBoundary};
use regex_syntax::utf8::{Utf8Range, Utf8Sequences};

use super::prog::*;

/// Upper bound on expanded copies of a counted repetition.
const MAX_REPEAT: u32 = 1000;

pub(crate) fn compile(hir: &Hir) -> Result<Prog> {
    let mut c = Compiler {
        // pc 0 is a canonical dead instruction; unpatched holes land here.
        insts: vec![Inst::Fail],
    };
    let f = c.hir(hir)?;
    let m = c.push(Inst::Match);
    c.patch(&f.out, m);
    Ok(Prog {
        insts: c.insts,
        start: f.start,
    })
}

/// A compiled fragment: entry point plus the dangling exits still to be
/// patched to whatever comes next.
struct Frag {
    start: u32,
    out: Vec<Hole>,
}

#[derive(Clone, Copy)]
enum Hole {
    Out(u32),
    Arg(u32),
}

struct Compiler {
    insts: Vec<Inst>,
}

impl Compiler {
    fn push(&mut self, inst: Inst) -> u32 {
        self.insts.push(inst);
        (self.insts.len() - 1) as u32
    }

    fn patch(&mut self, holes: &[Hole], target: u32) {
        for h in holes {
            match *h {
                Hole::Out(pc) => match &mut self.insts[pc as usize] {
                    Inst::ByteRange { out, .. }
                    | Inst::EmptyWidth { out, .. }
                    | Inst::Nop { out }
                    | Inst::Alt { out, .. } => *out = target,
                    _ => unreachable!("patching a terminal instruction"),
                },
                Hole::Arg(pc) => match &mut self.insts[pc as usize] {
                    Inst::Alt { arg, .. } => *arg = target,
                    _ => unreachable!("arg hole on a non-alt instruction"),
                },
            }
        }
    }

    fn nop(&mut self) -> Frag {
        let pc = self.push(Inst::Nop { out: 0 });
        Frag {
            start: pc,
            out: vec![Hole::Out(pc)],
        }
    }

    fn byte_range(&mut self, lo: u8, hi: u8, fold: bool) -> Frag {
        let pc = self.push(Inst::ByteRange { lo, hi, fold, out: 0 });
        Frag {
            start: pc,
            out: vec![Hole::Out(pc)],
        }
    }

    fn empty_width(&mut self, flags: u8) -> Frag {
        let pc = self.push(Inst::EmptyWidth { flags, out: 0 });
        Frag {
            start: pc,
            out: vec![Hole::Out(pc)],
        }
    }

    fn cat(&mut self, f1: Frag, f2: Frag) -> Frag {
        self.patch(&f1.out, f2.start);
        Frag {
            start: f1.start,
            out: f2.out,
        }
    }

    fn alt(&mut self, f1: Frag, f2: Frag) -> Frag {
        let pc = self.push(Inst::Alt {
            out: f1.start,
            arg: f2.start,
        });
        let mut out = f1.out;
        out.extend(f2.out);
        Frag { start: pc, out }
    }

    fn literal_bytes(&mut self, bytes: &[u8]) -> Frag {
        let mut frag: Option<Frag> = None;
        for &b in bytes {
            let f = self.byte_range(b, b, false);
            frag = Some(match frag {
                None => f,
                Some(prev) => self.cat(prev, f),
            });
        }
        frag.unwrap_or_else(|| self.nop())
    }

    fn byte_seq(&mut self, ranges: &[Utf8Range]) -> Frag {
        let mut frag: Option<Frag> = None;
        for r in ranges {
            let f = self.byte_range(r.start, r.end, false);
            frag = Some(match frag {
                None => f,
                Some(prev) => self.cat(prev, f),
            });
        }
        frag.expect("empty utf8 sequence")
    }

    /// Builds the alternation for a class given its single-byte ranges
    /// and its multi-byte UTF-8 sequences. Fold-partner single-byte
    /// ranges are merged into one folded instruction.
    fn class_frag(&mut self, singles: Vec<(u8, u8)>, multis: Vec<Vec<Utf8Range>>) -> Frag {
        let mut frags: Vec<Frag> = Vec::new();
        let mut singles = singles;
        singles.sort_unstable();
        singles.dedup();
        let mut skip = vec![false; singles.len()];
        for i in 0..singles.len() {
            if skip[i] {
                continue;
            }
            let (lo, hi) = singles[i];
            if lo.is_ascii_uppercase() && hi.is_ascii_uppercase() {
                if let Ok(j) = singles.binary_search(&(lo | 0x20, hi | 0x20)) {
                    skip[j] = true;
                    let f = self.byte_range(lo, hi, true);
                    frags.push(f);
                    continue;
                }
            }
            let f = self.byte_range(lo, hi, false);
            frags.push(f);
        }
        for seq in &multis {
            let f = self.byte_seq(seq);
            frags.push(f);
        }
        match frags.len() {
            0 => Frag {
                start: 0, // Fail
                out: Vec::new(),
            },
            _ => {
                let mut it = frags.into_iter().rev();
                let mut frag = it.next().unwrap();
                for f in it {
                    frag = self.alt(f, frag);
                }
                frag
            }
        }
    }

    fn hir(&mut self, hir: &Hir) -> Result<Frag> {
        Ok(match hir.kind() {
            HirKind::Empty => self.nop(),
            HirKind::Literal(Literal::Unicode(c)) => {
                let mut buf = [0u8; 4];
                let s = c.encode_utf8(&mut buf);
                self.literal_bytes(s.as_bytes())
            }
            HirKind::Literal(Literal::Byte(b)) => self.byte_range(*b, *b, false),
            HirKind::Class(Class::Unicode(cls)) => {
                let mut singles = Vec::new();
                let mut multis = Vec::new();
                for r in cls.iter() {
                    for seq in Utf8Sequences::new(r.start(), r.end()) {
                        let ranges = seq.as_slice().to_vec();
                        if ranges.len() == 1 {
                            singles.push((ranges[0].start, ranges[0].end));
                        } else {
                            multis.push(ranges);
                        }
                    }
                }
                self.class_frag(singles, multis)
            }
            HirKind::Class(Class::Bytes(cls)) => {
                let singles = cls.iter().map(|r| (r.start(), r.end())).collect();
                self.class_frag(singles, Vec::new())
            }
            HirKind::Anchor(a) => self.empty_width(match a {
                Anchor::StartLine => EMPTY_BEGIN_LINE,
                Anchor::EndLine => EMPTY_END_LINE,
                Anchor::StartText => EMPTY_BEGIN_TEXT,
                Anchor::EndText => EMPTY_END_TEXT,
            }),
            HirKind::WordBoundary(wb) => self.empty_width(match wb {
                WordBoundary::Unicode | WordBoundary::Ascii => EMPTY_WORD_BOUNDARY,
                WordBoundary::UnicodeNegate | WordBoundary::AsciiNegate => {
                    EMPTY_NO_WORD_BOUNDARY
                }
            }),
            HirKind::Group(g) => self.hir(&g.hir)?,
            HirKind::Repetition(rep) => match &rep.kind {
                RepetitionKind::ZeroOrOne => {
                    let f = self.hir(&rep.hir)?;
                    let pc = self.push(Inst::Alt {
                        out: f.start,
                        arg: 0,
                    });
                    let mut out = f.out;
                    out.push(Hole::Arg(pc));
                    Frag { start: pc, out }
                }
                RepetitionKind::ZeroOrMore => {
                    let f = self.hir(&rep.hir)?;
                    let pc = self.push(Inst::Alt {
                        out: f.start,
                        arg: 0,
                    });
                    self.patch(&f.out, pc);
                    Frag {
                        start: pc,
                        out: vec![Hole::Arg(pc)],
                    }
                }
                RepetitionKind::OneOrMore => {
                    let f = self.hir(&rep.hir)?;
                    let pc = self.push(Inst::Alt {
                        out: f.start,
                        arg: 0,
                    });
                    self.patch(&f.out, pc);
                    Frag {
                        start: f.start,
                        out: vec![Hole::Arg(pc)],
                    }
                }
                RepetitionKind::Range(rr) => {
                    let (min, max) = match *rr {
                        RepetitionRange::Exactly(n) => (n, Some(n)),
                        RepetitionRange::AtLeast(n) => (n, None),
                        RepetitionRange::Bounded(n, m) => (n, Some(m)),
                    };
                    if max.unwrap_or(min) > MAX_REPEAT {
                        bail!("repetition bound too large (max {})", MAX_REPEAT);
                    }
                    let mut frag = self.nop();
                    for _ in 0..min {
                        let f = self.hir(&rep.hir)?;
                        frag = self.cat(frag, f);
                    }
                    match max {
                        None => {
                            // Trailing unbounded copies.
                            let f = self.hir(&rep.hir)?;
                            let pc = self.push(Inst::Alt {
                                out: f.start,
                                arg: 0,
                            });
                            self.patch(&f.out, pc);
                            let star = Frag {
                                start: pc,
                                out: vec![Hole::Arg(pc)],
                            };
                            frag = self.cat(frag, star);
                        }
                        Some(m) => {
                            for _ in min..m {
                                let f = self.hir(&rep.hir)?;
                                let pc = self.push(Inst::Alt {
                                    out: f.start,
                                    arg: 0,
                                });
                                let mut out = f.out;
                                out.push(Hole::Arg(pc));
                                frag = self.cat(frag, Frag { start: pc, out });
                            }
                        }
                    }
                    frag
                }
            },
            HirKind::Concat(list) => {
                let mut frag: Option<Frag> = None;
                for sub in list {
                    let f = self.hir(sub)?;
                    frag = Some(match frag {
                        None => f,
                        Some(prev) => self.cat(prev, f),
                    });
                }
                match frag {
                    Some(f) => f,
                    None => self.nop(),
                }
            }
            HirKind::Alternation(list) => {
                let mut frags = Vec::with_capacity(list.len());
                for sub in list {
                    frags.push(self.hir(sub)?);
                }
                let mut it = frags.into_iter().rev();
                let mut frag = match it.next() {
                    Some(f) => f,
                    None => self.nop(),
                };
                for f in it {
                    frag = self.alt(f, frag);
                }
                frag
            }
        })
    }
}
