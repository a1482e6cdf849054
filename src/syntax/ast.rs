//! The abstract syntax tree produced by the parser.
//!
//! Nodes live in an [`Arena`] and refer to their children by [`RegexpId`].
//! The parser recycles discarded nodes through the arena's free list; the
//! simplifier may make two parents point at the same child, turning the
//! tree into a DAG. Everything downstream only ever reads the arena.

use std::fmt;
use std::ops::{Index, IndexMut};

use super::Flags;
use super::charclass::ranges_to_string;
use super::unicode::{MAX_RUNE, is_print};

/// The operator of a node.
///
/// The declaration order matters: class merging during the parse picks
/// the operand with the larger ordinal as the more general one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Op {
    /// Matches no strings.
    NoMatch,
    /// Matches the empty string.
    EmptyMatch,
    /// Matches the runes in sequence.
    Literal,
    /// Matches one rune in the ranges.
    CharClass,
    AnyCharNotNl,
    AnyChar,
    BeginLine,
    EndLine,
    BeginText,
    EndText,
    WordBoundary,
    NoWordBoundary,
    Capture,
    Star,
    Plus,
    Quest,
    Repeat,
    Concat,
    Alternate,
    /// Parse stack only: an open group.
    LeftParen,
    /// Parse stack only: an alternation bar.
    VerticalBar,
}

impl Op {
    pub fn is_pseudo(self) -> bool {
        self >= Op::LeftParen
    }
}

/// Index of a node in its [`Arena`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RegexpId(usize);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Regexp {
    pub op: Op,
    pub flags: Flags,
    pub subs: Vec<RegexpId>,
    /// Literal runes, or `[lo, hi]` pairs for a class.
    pub runes: Vec<u32>,
    pub min: u32,
    /// `None` is unbounded.
    pub max: Option<u32>,
    pub cap: usize,
    pub name: Option<String>,
}

impl Regexp {
    fn new(op: Op) -> Self {
        Self {
            op,
            flags: Flags::empty(),
            subs: Vec::new(),
            runes: Vec::new(),
            min: 0,
            max: None,
            cap: 0,
            name: None,
        }
    }

    pub fn is_non_greedy(&self) -> bool {
        self.flags.contains(Flags::NON_GREEDY)
    }

    pub fn is_fold_case(&self) -> bool {
        self.flags.contains(Flags::FOLD_CASE)
    }
}

#[derive(Debug, Clone, Default)]
pub struct Arena {
    nodes: Vec<Regexp>,
    free: Vec<RegexpId>,
}

impl Arena {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a fresh node, recycling a freed slot when one is available.
    pub fn alloc(&mut self, op: Op) -> RegexpId {
        match self.free.pop() {
            Some(id) => {
                self.nodes[id.0] = Regexp::new(op);
                id
            }
            None => {
                self.nodes.push(Regexp::new(op));
                RegexpId(self.nodes.len() - 1)
            }
        }
    }

    /// Returns a new node with the same fields as `id`. Children are
    /// shared, not copied.
    pub fn alloc_copy(&mut self, id: RegexpId) -> RegexpId {
        let copy = self[id].clone();
        let new = self.alloc(copy.op);
        self[new] = copy;
        new
    }

    /// Returns `id` to the free list. The caller must hold no other
    /// reference to it.
    pub fn free(&mut self, id: RegexpId) {
        debug_assert!(!self.free.contains(&id));
        self.free.push(id);
    }

    /// Number of live nodes.
    pub fn len(&self) -> usize {
        self.nodes.len() - self.free.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Structural equality.
    pub fn equal(&self, x: RegexpId, y: RegexpId) -> bool {
        let (a, b) = (&self[x], &self[y]);
        if a.op != b.op {
            return false;
        }
        match a.op {
            Op::EndText => {
                a.flags.contains(Flags::WAS_DOLLAR) == b.flags.contains(Flags::WAS_DOLLAR)
            }
            Op::Literal => a.runes == b.runes && a.is_fold_case() == b.is_fold_case(),
            Op::CharClass => a.runes == b.runes,
            Op::Alternate | Op::Concat => {
                a.subs.len() == b.subs.len()
                    && a.subs.iter().zip(&b.subs).all(|(&s, &t)| self.equal(s, t))
            }
            Op::Star | Op::Plus | Op::Quest => {
                a.is_non_greedy() == b.is_non_greedy() && self.equal(a.subs[0], b.subs[0])
            }
            Op::Repeat => {
                a.is_non_greedy() == b.is_non_greedy()
                    && a.min == b.min
                    && a.max == b.max
                    && self.equal(a.subs[0], b.subs[0])
            }
            Op::Capture => a.cap == b.cap && a.name == b.name && self.equal(a.subs[0], b.subs[0]),
            _ => true,
        }
    }

    /// The largest capture index in the tree rooted at `id`.
    pub fn max_cap(&self, id: RegexpId) -> usize {
        let re = &self[id];
        let m = if re.op == Op::Capture { re.cap } else { 0 };
        re.subs
            .iter()
            .map(|&sub| self.max_cap(sub))
            .fold(m, usize::max)
    }

    fn collect_cap_names(&self, id: RegexpId, names: &mut [Option<String>]) {
        let re = &self[id];
        if re.op == Op::Capture {
            names[re.cap] = re.name.clone();
        }
        for &sub in &re.subs {
            self.collect_cap_names(sub, names);
        }
    }

    /// Writes `id` in Perl syntax.
    pub fn write_perl(&self, id: RegexpId, out: &mut String) {
        let re = &self[id];
        match re.op {
            Op::NoMatch => out.push_str(r"[^\x00-\x{10FFFF}]"),
            Op::EmptyMatch => out.push_str("(?:)"),
            Op::Star | Op::Plus | Op::Quest | Op::Repeat => {
                let sub = &self[re.subs[0]];
                if sub.op > Op::Capture || (sub.op == Op::Literal && sub.runes.len() > 1) {
                    out.push_str("(?:");
                    self.write_perl(re.subs[0], out);
                    out.push(')');
                } else {
                    self.write_perl(re.subs[0], out);
                }
                match re.op {
                    Op::Star => out.push('*'),
                    Op::Plus => out.push('+'),
                    Op::Quest => out.push('?'),
                    _ => {
                        out.push_str(&format!("{{{}", re.min));
                        if re.max != Some(re.min) {
                            out.push(',');
                            if let Some(max) = re.max {
                                out.push_str(&max.to_string());
                            }
                        }
                        out.push('}');
                    }
                }
                if re.is_non_greedy() {
                    out.push('?');
                }
            }
            Op::Concat => {
                for &sub in &re.subs {
                    if self[sub].op == Op::Alternate {
                        out.push_str("(?:");
                        self.write_perl(sub, out);
                        out.push(')');
                    } else {
                        self.write_perl(sub, out);
                    }
                }
            }
            Op::Alternate => {
                for (i, &sub) in re.subs.iter().enumerate() {
                    if i > 0 {
                        out.push('|');
                    }
                    self.write_perl(sub, out);
                }
            }
            Op::Literal => {
                if re.is_fold_case() {
                    out.push_str("(?i:");
                }
                for &r in &re.runes {
                    escape_rune(out, r);
                }
                if re.is_fold_case() {
                    out.push(')');
                }
            }
            Op::AnyCharNotNl => out.push_str("(?-s:.)"),
            Op::AnyChar => out.push_str("(?s:.)"),
            Op::Capture => {
                match &re.name {
                    Some(name) if !name.is_empty() => {
                        out.push_str("(?P<");
                        out.push_str(name);
                        out.push('>');
                    }
                    _ => out.push('('),
                }
                if self[re.subs[0]].op != Op::EmptyMatch {
                    self.write_perl(re.subs[0], out);
                }
                out.push(')');
            }
            Op::BeginText => out.push_str(r"\A"),
            Op::EndText => {
                if re.flags.contains(Flags::WAS_DOLLAR) {
                    out.push_str("(?-m:$)");
                } else {
                    out.push_str(r"\z");
                }
            }
            Op::BeginLine => out.push_str("(?m:^)"),
            Op::EndLine => out.push_str("(?m:$)"),
            Op::WordBoundary => out.push_str(r"\b"),
            Op::NoWordBoundary => out.push_str(r"\B"),
            Op::CharClass => {
                let r = &re.runes;
                out.push('[');
                if r.is_empty() {
                    out.push_str(r"^\x00-\x{10FFFF}");
                } else if r[0] == 0 && r[r.len() - 1] == MAX_RUNE && r.len() > 2 {
                    // Probably a negated class: print the gaps.
                    out.push('^');
                    for i in (1..r.len() - 1).step_by(2) {
                        write_class_range(out, r[i] + 1, r[i + 1] - 1);
                    }
                } else {
                    for pair in r.chunks_exact(2) {
                        write_class_range(out, pair[0], pair[1]);
                    }
                }
                out.push(']');
            }
            Op::LeftParen | Op::VerticalBar => out.push_str(&format!("{:?}", re.op)),
        }
    }

    /// Writes `id` in the compact debugging form, e.g. `cat{lit{a}star{dot{}}}`.
    pub fn write_dump(&self, id: RegexpId, out: &mut String) {
        let re = &self[id];
        let name = match re.op {
            Op::NoMatch => "no",
            Op::EmptyMatch => "emp",
            Op::Literal if re.runes.len() == 1 => "lit",
            Op::Literal => "str",
            Op::CharClass => "cc",
            Op::AnyCharNotNl => "dnl",
            Op::AnyChar => "dot",
            Op::BeginLine => "bol",
            Op::EndLine => "eol",
            Op::BeginText => "bot",
            Op::EndText => "eot",
            Op::WordBoundary => "wb",
            Op::NoWordBoundary => "nwb",
            Op::Capture => "cap",
            Op::Star => "star",
            Op::Plus => "plus",
            Op::Quest => "que",
            Op::Repeat => "rep",
            Op::Concat => "cat",
            Op::Alternate => "alt",
            Op::LeftParen => "lp",
            Op::VerticalBar => "vb",
        };
        if matches!(re.op, Op::Star | Op::Plus | Op::Quest | Op::Repeat) && re.is_non_greedy() {
            out.push('n');
        }
        out.push_str(name);
        if re.op == Op::Literal && re.is_fold_case() {
            out.push_str("fold");
        }
        out.push('{');
        match re.op {
            Op::Literal => {
                for &r in &re.runes {
                    match char::from_u32(r) {
                        Some(c) => out.push(c),
                        None => out.push_str(&format!("\\x{{{r:x}}}")),
                    }
                }
            }
            Op::CharClass => {
                let s = ranges_to_string(&re.runes);
                out.push_str(&s[1..s.len() - 1]);
            }
            Op::Capture => {
                if let Some(name) = &re.name {
                    out.push_str(name);
                    out.push(':');
                }
                self.write_dump(re.subs[0], out);
            }
            Op::Repeat => {
                match re.max {
                    Some(max) => out.push_str(&format!("{},{} ", re.min, max)),
                    None => out.push_str(&format!("{},-1 ", re.min)),
                }
                self.write_dump(re.subs[0], out);
            }
            _ => {
                for &sub in &re.subs {
                    self.write_dump(sub, out);
                }
            }
        }
        out.push('}');
    }
}

impl Index<RegexpId> for Arena {
    type Output = Regexp;

    fn index(&self, id: RegexpId) -> &Regexp {
        &self.nodes[id.0]
    }
}

impl IndexMut<RegexpId> for Arena {
    fn index_mut(&mut self, id: RegexpId) -> &mut Regexp {
        &mut self.nodes[id.0]
    }
}

fn write_class_range(out: &mut String, lo: u32, hi: u32) {
    if lo == '-' as u32 {
        out.push('\\');
    }
    escape_rune(out, lo);
    if lo != hi {
        out.push('-');
        if hi == '-' as u32 {
            out.push('\\');
        }
        escape_rune(out, hi);
    }
}

const METACHARACTERS: &str = r"\.+*?()|[]{}^$";

/// Writes `r` so that it parses back as itself, inside or outside a class.
pub(crate) fn escape_rune(out: &mut String, r: u32) {
    if is_print(r) {
        if let Some(c) = char::from_u32(r) {
            if METACHARACTERS.contains(c) {
                out.push('\\');
            }
            out.push(c);
            return;
        }
    }
    match r {
        0x09 => out.push_str(r"\t"),
        0x0A => out.push_str(r"\n"),
        0x0C => out.push_str(r"\f"),
        0x0D => out.push_str(r"\r"),
        r if r < 0x100 => out.push_str(&format!("\\x{r:02x}")),
        r => out.push_str(&format!("\\x{{{r:x}}}")),
    }
}

/// A parsed (and possibly simplified) pattern.
#[derive(Debug, Clone)]
pub struct Ast {
    pub arena: Arena,
    pub root: RegexpId,
}

impl Ast {
    pub fn root(&self) -> &Regexp {
        &self.arena[self.root]
    }

    /// The number of capturing groups.
    pub fn max_cap(&self) -> usize {
        self.arena.max_cap(self.root)
    }

    /// Group names indexed by capture index; index 0 is the whole match
    /// and is always `None`.
    pub fn cap_names(&self) -> Vec<Option<String>> {
        let mut names = vec![None; self.max_cap() + 1];
        self.arena.collect_cap_names(self.root, &mut names);
        names
    }

    pub fn dump(&self) -> String {
        let mut out = String::new();
        self.arena.write_dump(self.root, &mut out);
        out
    }
}

impl fmt::Display for Ast {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut out = String::new();
        self.arena.write_perl(self.root, &mut out);
        f.write_str(&out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn arena_recycles_freed_nodes() {
        let mut arena = Arena::new();
        let a = arena.alloc(Op::Literal);
        arena[a].runes.push('x' as u32);
        let b = arena.alloc(Op::Star);
        arena[b].subs.push(a);
        assert_eq!(arena.len(), 2);
        arena.free(b);
        assert_eq!(arena.len(), 1);
        let c = arena.alloc(Op::Plus);
        assert_eq!(c, b);
        assert!(arena[c].subs.is_empty());
        assert_eq!(arena.len(), 2);
    }

    #[test]
    fn structural_equality() {
        let mut arena = Arena::new();
        let lit = |arena: &mut Arena, r: char, flags: Flags| {
            let id = arena.alloc(Op::Literal);
            arena[id].runes.push(r as u32);
            arena[id].flags = flags;
            id
        };
        let a1 = lit(&mut arena, 'a', Flags::empty());
        let a2 = lit(&mut arena, 'a', Flags::empty());
        let a3 = lit(&mut arena, 'a', Flags::FOLD_CASE);
        assert!(arena.equal(a1, a2));
        assert!(!arena.equal(a1, a3));

        let s1 = arena.alloc(Op::Star);
        arena[s1].subs.push(a1);
        let s2 = arena.alloc(Op::Star);
        arena[s2].subs.push(a2);
        assert!(arena.equal(s1, s2));
        arena[s2].flags = Flags::NON_GREEDY;
        assert!(!arena.equal(s1, s2));
    }

    #[test]
    fn escapes() {
        let mut out = String::new();
        for r in ['a', '.', '\n', '\u{7}', 'é'] {
            escape_rune(&mut out, r as u32);
        }
        escape_rune(&mut out, 0xFFFE);
        assert_eq!(out, r"a\.\n\x07é\x{fffe}");
    }
}
