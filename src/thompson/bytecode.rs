//! A Thompson NFA represented as a flat instruction program.
//!
//! This module contains [`Inst`] and [`Prog`]. A program is linear in size
//! with the pattern; see [`crate::thompson::compiler`] for how one is built.
//!
//! pc 0 always holds a [`InstOp::Fail`] instruction. Nothing ever jumps to
//! it on purpose, which lets 0 double as the empty patch list and as the
//! "no successor" marker.

use std::fmt;

use bitflags::bitflags;

use crate::syntax::ast::escape_rune;
use crate::syntax::unicode::simple_fold;

bitflags! {
    /// Zero-width conditions: what holds at a position between two runes.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct EmptyFlags: u8 {
        const BEGIN_LINE       = 0x01;
        const END_LINE         = 0x02;
        const BEGIN_TEXT       = 0x04;
        const END_TEXT         = 0x08;
        const WORD_BOUNDARY    = 0x10;
        const NO_WORD_BOUNDARY = 0x20;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum InstOp {
    /// Branch to `out`, then to `arg`, in that order of preference.
    Alt,
    AltMatch,
    /// Record the position in slot `arg`.
    Capture,
    /// Continue only where the conditions in `arg` hold.
    EmptyWidth,
    Fail,
    Match,
    Nop,
    /// Consume a rune in `runes`; `arg` is the fold flag.
    Rune,
    /// Consume exactly `runes[0]`.
    Rune1,
    RuneAny,
    RuneAnyNotNl,
}

/// Fold flag stored in the `arg` of a [`InstOp::Rune`].
pub(crate) const FOLD: usize = 1;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Inst {
    pub op: InstOp,
    pub out: usize,
    pub arg: usize,
    /// A single rune, or `[lo, hi]` pairs.
    pub runes: Vec<u32>,
}

impl Inst {
    pub(crate) fn new(op: InstOp) -> Self {
        Self {
            op,
            out: 0,
            arg: 0,
            runes: Vec::new(),
        }
    }

    /// Whether this consumes a rune, whatever its specialization.
    pub fn is_rune(&self) -> bool {
        matches!(
            self.op,
            InstOp::Rune | InstOp::Rune1 | InstOp::RuneAny | InstOp::RuneAnyNotNl
        )
    }

    pub fn is_fold_case(&self) -> bool {
        self.arg & FOLD != 0
    }

    pub fn empty_flags(&self) -> EmptyFlags {
        EmptyFlags::from_bits_truncate(self.arg as u8)
    }

    /// Whether a [`InstOp::Rune`] instruction accepts `r`.
    pub fn match_rune(&self, r: u32) -> bool {
        let runes = &self.runes;
        if let [r0] = runes[..] {
            if r == r0 {
                return true;
            }
            if self.is_fold_case() {
                let mut r1 = simple_fold(r0);
                while r1 != r0 {
                    if r == r1 {
                        return true;
                    }
                    r1 = simple_fold(r1);
                }
            }
            return false;
        }

        // Most classes are short; scan the first few pairs.
        for pair in runes.chunks_exact(2).take(5) {
            if r < pair[0] {
                return false;
            }
            if r <= pair[1] {
                return true;
            }
        }

        let (mut lo, mut hi) = (0, runes.len() / 2);
        while lo < hi {
            let m = lo + (hi - lo) / 2;
            if runes[2 * m] <= r {
                if r <= runes[2 * m + 1] {
                    return true;
                }
                lo = m + 1;
            } else {
                hi = m;
            }
        }
        false
    }
}

fn write_runes(f: &mut fmt::Formatter<'_>, runes: &[u32]) -> fmt::Result {
    let mut out = String::from("\"");
    for &r in runes {
        escape_rune(&mut out, r);
    }
    out.push('"');
    f.write_str(&out)
}

impl fmt::Display for Inst {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.op {
            InstOp::Alt => write!(f, "alt -> {}, {}", self.out, self.arg),
            InstOp::AltMatch => write!(f, "altmatch -> {}, {}", self.out, self.arg),
            InstOp::Capture => write!(f, "cap {} -> {}", self.arg, self.out),
            InstOp::EmptyWidth => write!(f, "empty {} -> {}", self.arg, self.out),
            InstOp::Match => f.write_str("match"),
            InstOp::Fail => f.write_str("fail"),
            InstOp::Nop => write!(f, "nop -> {}", self.out),
            InstOp::Rune => {
                f.write_str("rune ")?;
                write_runes(f, &self.runes)?;
                if self.is_fold_case() {
                    f.write_str("/i")?;
                }
                write!(f, " -> {}", self.out)
            }
            InstOp::Rune1 => {
                f.write_str("rune1 ")?;
                write_runes(f, &self.runes)?;
                write!(f, " -> {}", self.out)
            }
            InstOp::RuneAny => write!(f, "any -> {}", self.out),
            InstOp::RuneAnyNotNl => write!(f, "anynotnl -> {}", self.out),
        }
    }
}

/// A list of unfilled successor fields, threaded through the fields
/// themselves. The value `pc << 1` names `inst[pc].out` and `pc << 1 | 1`
/// names `inst[pc].arg`; each named field holds the next link. 0 is the
/// empty list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PatchList(pub usize);

impl PatchList {
    pub const EMPTY: PatchList = PatchList(0);

    pub fn out(pc: usize) -> Self {
        PatchList(pc << 1)
    }

    pub fn arg(pc: usize) -> Self {
        PatchList(pc << 1 | 1)
    }

    pub fn is_empty(self) -> bool {
        self.0 == 0
    }
}

/// The literal text every match must start with.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LiteralPrefix {
    text: String,
    utf16: Vec<u16>,
    /// The prefix is the whole match.
    complete: bool,
}

impl LiteralPrefix {
    pub fn as_str(&self) -> &str {
        &self.text
    }

    pub fn as_bytes(&self) -> &[u8] {
        self.text.as_bytes()
    }

    pub fn as_utf16(&self) -> &[u16] {
        &self.utf16
    }

    pub fn is_complete(&self) -> bool {
        self.complete
    }

    pub fn is_empty(&self) -> bool {
        self.text.is_empty()
    }

    pub fn first_rune(&self) -> Option<u32> {
        self.text.chars().next().map(u32::from)
    }
}

/// A compiled program.
#[derive(Debug, Clone)]
pub struct Prog {
    pub(crate) inst: Vec<Inst>,
    pub(crate) start: usize,
    /// Number of capture slots, at least 2 for the whole match.
    pub(crate) num_cap: usize,
    prefix: LiteralPrefix,
    start_cond: Option<EmptyFlags>,
}

impl Prog {
    /// An empty program holding only the permanent `Fail` at pc 0.
    pub(crate) fn new() -> Self {
        Self {
            inst: vec![Inst::new(InstOp::Fail)],
            start: 0,
            num_cap: 2,
            prefix: LiteralPrefix::default(),
            start_cond: None,
        }
    }

    pub fn inst(&self, pc: usize) -> &Inst {
        &self.inst[pc]
    }

    pub fn len(&self) -> usize {
        self.inst.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inst.is_empty()
    }

    pub fn start(&self) -> usize {
        self.start
    }

    pub fn num_cap(&self) -> usize {
        self.num_cap
    }

    pub fn prefix(&self) -> &LiteralPrefix {
        &self.prefix
    }

    /// The conditions every match must start under, or `None` if the
    /// program cannot match at all.
    pub fn start_cond(&self) -> Option<EmptyFlags> {
        self.start_cond
    }

    pub(crate) fn push(&mut self, op: InstOp) -> usize {
        self.inst.push(Inst::new(op));
        self.inst.len() - 1
    }

    /// Computes the cached prefix and start condition. Called once the
    /// program is complete.
    pub(crate) fn finish(&mut self) {
        self.prefix = self.compute_prefix();
        self.start_cond = self.compute_start_cond();
    }

    /// Follows `Nop` and `Capture` instructions from `pc`.
    fn skip_nop(&self, mut pc: usize) -> &Inst {
        let mut i = &self.inst[pc];
        while matches!(i.op, InstOp::Nop | InstOp::Capture) {
            pc = i.out;
            i = &self.inst[pc];
        }
        i
    }

    fn compute_prefix(&self) -> LiteralPrefix {
        let mut i = self.skip_nop(self.start);
        let mut text = String::new();
        while i.is_rune() && i.runes.len() == 1 && !i.is_fold_case() {
            let Some(c) = char::from_u32(i.runes[0]) else {
                break;
            };
            text.push(c);
            i = self.skip_nop(i.out);
        }
        LiteralPrefix {
            utf16: text.encode_utf16().collect(),
            text,
            complete: i.op == InstOp::Match,
        }
    }

    fn compute_start_cond(&self) -> Option<EmptyFlags> {
        let mut flag = EmptyFlags::empty();
        let mut pc = self.start;
        loop {
            let i = &self.inst[pc];
            match i.op {
                InstOp::EmptyWidth => flag |= i.empty_flags(),
                InstOp::Fail => return None,
                InstOp::Capture | InstOp::Nop => {}
                _ => break,
            }
            pc = i.out;
        }
        Some(flag)
    }

    fn next(&self, l: PatchList) -> PatchList {
        let i = &self.inst[l.0 >> 1];
        if l.0 & 1 == 0 {
            PatchList(i.out)
        } else {
            PatchList(i.arg)
        }
    }

    /// Points every field in `l` at `val`.
    pub(crate) fn patch(&mut self, mut l: PatchList, val: usize) {
        while !l.is_empty() {
            let i = &mut self.inst[l.0 >> 1];
            if l.0 & 1 == 0 {
                l = PatchList(i.out);
                i.out = val;
            } else {
                l = PatchList(i.arg);
                i.arg = val;
            }
        }
    }

    /// Concatenates two patch lists.
    pub(crate) fn append(&mut self, l1: PatchList, l2: PatchList) -> PatchList {
        if l1.is_empty() {
            return l2;
        }
        if l2.is_empty() {
            return l1;
        }
        let mut last = l1;
        loop {
            let next = self.next(last);
            if next.is_empty() {
                break;
            }
            last = next;
        }
        let i = &mut self.inst[last.0 >> 1];
        if last.0 & 1 == 0 {
            i.out = l2.0;
        } else {
            i.arg = l2.0;
        }
        l1
    }
}

impl fmt::Display for Prog {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (pc, inst) in self.inst.iter().enumerate() {
            let label = if pc == self.start {
                format!("{pc}*")
            } else {
                pc.to_string()
            };
            writeln!(f, "{label:<8}{inst}")?;
        }
        Ok(())
    }
}
