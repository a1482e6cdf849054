//! A recursive-descent parser with an explicit operand stack.
//!
//! The parser reads the pattern left to right and pushes operands and
//! pseudo-operators (`(` and `|`) onto a stack. Concatenation happens
//! lazily: adjacent literals are merged as they are pushed, and a run of
//! operands is collapsed into a single node when a `|`, a `)` or the end of
//! the pattern is reached. Alternations are factored as they are built, so
//! `abc|abd` comes out as `ab[cd]`.

use std::mem;

use log::trace;

use super::Flags;
use super::ast::{Arena, Ast, Op, RegexpId};
use super::char_group::{perl_group, posix_group};
use super::charclass::CharClass;
use super::error::{Error, ErrorKind};
use super::unicode::{MAX_RUNE, min_fold_rune, simple_fold, unicode_table};

/// Largest count accepted in `{n,m}`.
const MAX_REPEAT: u32 = 1000;

/// Parses `pattern` under `flags`.
pub fn parse(pattern: &str, flags: Flags) -> Result<Ast, Error> {
    let ast = Parser::new(pattern, flags).parse()?;
    trace!("parsed {pattern:?} into {} nodes", ast.arena.len());
    Ok(ast)
}

/// A cursor over the pattern. Positions are byte offsets.
#[derive(Debug, Clone)]
struct StringIterator<'p> {
    s: &'p str,
    pos: usize,
}

impl<'p> StringIterator<'p> {
    fn new(s: &'p str) -> Self {
        Self { s, pos: 0 }
    }

    fn pos(&self) -> usize {
        self.pos
    }

    fn rewind_to(&mut self, pos: usize) {
        self.pos = pos;
    }

    fn more(&self) -> bool {
        self.pos < self.s.len()
    }

    fn peek(&self) -> Option<char> {
        self.rest().chars().next()
    }

    /// Skips `n` bytes, which must be ASCII.
    fn skip(&mut self, n: usize) {
        self.pos += n;
    }

    fn skip_str(&mut self, s: &str) {
        self.pos += s.len();
    }

    fn pop(&mut self) -> Option<char> {
        let c = self.peek()?;
        self.pos += c.len_utf8();
        Some(c)
    }

    fn looking_at(&self, c: char) -> bool {
        self.rest().starts_with(c)
    }

    fn looking_at_str(&self, s: &str) -> bool {
        self.rest().starts_with(s)
    }

    fn rest(&self) -> &'p str {
        &self.s[self.pos..]
    }

    fn from(&self, before: usize) -> &'p str {
        &self.s[before..self.pos]
    }
}

struct Parser<'p> {
    whole: &'p str,
    flags: Flags,
    stack: Vec<RegexpId>,
    arena: Arena,
    num_cap: usize,
}

impl<'p> Parser<'p> {
    fn new(whole: &'p str, flags: Flags) -> Self {
        Self {
            whole,
            flags,
            stack: Vec::new(),
            arena: Arena::new(),
            num_cap: 0,
        }
    }

    fn parse(mut self) -> Result<Ast, Error> {
        if self.flags.contains(Flags::LITERAL) {
            let root = self.arena.alloc(Op::Literal);
            self.arena[root].flags = self.flags;
            self.arena[root].runes = self.whole.chars().map(u32::from).collect();
            return Ok(Ast {
                arena: self.arena,
                root,
            });
        }

        let mut t = StringIterator::new(self.whole);
        let mut last_repeat_pos = None;
        while let Some(c) = t.peek() {
            let mut repeat_pos = None;
            match c {
                '(' => {
                    if self.flags.contains(Flags::PERL_X) && t.looking_at_str("(?") {
                        self.parse_perl_flags(&mut t)?;
                    } else {
                        self.num_cap += 1;
                        let re = self.op(Op::LeftParen);
                        self.arena[re].cap = self.num_cap;
                        t.skip(1);
                    }
                }
                '|' => {
                    self.parse_vertical_bar();
                    t.skip(1);
                }
                ')' => {
                    self.parse_right_paren()?;
                    t.skip(1);
                }
                '^' => {
                    if self.flags.contains(Flags::ONE_LINE) {
                        self.op(Op::BeginText);
                    } else {
                        self.op(Op::BeginLine);
                    }
                    t.skip(1);
                }
                '$' => {
                    if self.flags.contains(Flags::ONE_LINE) {
                        let re = self.op(Op::EndText);
                        self.arena[re].flags |= Flags::WAS_DOLLAR;
                    } else {
                        self.op(Op::EndLine);
                    }
                    t.skip(1);
                }
                '.' => {
                    if self.flags.contains(Flags::DOT_NL) {
                        self.op(Op::AnyChar);
                    } else {
                        self.op(Op::AnyCharNotNl);
                    }
                    t.skip(1);
                }
                '[' => self.parse_class(&mut t)?,
                '*' | '+' | '?' => {
                    let before = t.pos();
                    let op = match c {
                        '*' => Op::Star,
                        '+' => Op::Plus,
                        _ => Op::Quest,
                    };
                    t.skip(1);
                    self.repeat(op, 0, None, before, &mut t, last_repeat_pos)?;
                    repeat_pos = Some(before);
                }
                '{' => {
                    let before = t.pos();
                    match parse_repeat(&mut t)? {
                        Some((min, max)) => {
                            self.repeat(Op::Repeat, min, max, before, &mut t, last_repeat_pos)?;
                            repeat_pos = Some(before);
                        }
                        None => {
                            // Not a valid repeat: `{` is a literal.
                            t.rewind_to(before + 1);
                            self.literal('{' as u32);
                        }
                    }
                }
                '\\' => self.parse_backslash(&mut t)?,
                _ => {
                    t.skip(c.len_utf8());
                    self.literal(c as u32);
                }
            }
            last_repeat_pos = repeat_pos;
        }

        self.concat();
        if self.swap_vertical_bar() {
            self.stack.pop();
        }
        self.alternate();

        if self.stack.len() != 1 {
            return Err(Error::new(ErrorKind::MissingParen, self.whole));
        }
        let root = self.stack[0];
        Ok(Ast {
            arena: self.arena,
            root,
        })
    }

    /// Pushes `re`, first merging the two literals below it if possible.
    /// Single-rune classes become literals, and so do two-rune classes
    /// that are a case-folding pair such as `[Aa]`.
    fn push(&mut self, re: RegexpId) {
        let flags = self.flags;
        let node = &self.arena[re];
        if node.op == Op::CharClass && node.runes.len() == 2 && node.runes[0] == node.runes[1] {
            let r = node.runes[0];
            let lit_flags = flags.difference(Flags::FOLD_CASE);
            if self.maybe_concat(Some(r), lit_flags) {
                self.arena.free(re);
                return;
            }
            let node = &mut self.arena[re];
            node.op = Op::Literal;
            node.runes = vec![r];
            node.flags = lit_flags;
        } else if node.op == Op::CharClass && is_fold_pair(&node.runes) {
            let r = node.runes[0];
            let lit_flags = flags.union(Flags::FOLD_CASE);
            if self.maybe_concat(Some(r), lit_flags) {
                self.arena.free(re);
                return;
            }
            let node = &mut self.arena[re];
            node.op = Op::Literal;
            node.runes = vec![r];
            node.flags = lit_flags;
        } else {
            self.maybe_concat(None, Flags::empty());
        }
        self.stack.push(re);
    }

    /// Merges the two literals on top of the stack if they have the same
    /// case folding. When `r` is given, the freed top node is reused to
    /// hold it and `true` is returned: `r` has been pushed.
    fn maybe_concat(&mut self, r: Option<u32>, flags: Flags) -> bool {
        let n = self.stack.len();
        if n < 2 {
            return false;
        }
        let (re1, re2) = (self.stack[n - 1], self.stack[n - 2]);
        let (a, b) = (&self.arena[re1], &self.arena[re2]);
        if a.op != Op::Literal || b.op != Op::Literal || a.is_fold_case() != b.is_fold_case() {
            return false;
        }

        let tail = mem::take(&mut self.arena[re1].runes);
        self.arena[re2].runes.extend(tail);

        if let Some(r) = r {
            self.arena[re1].runes = vec![r];
            self.arena[re1].flags = flags;
            return true;
        }
        self.stack.pop();
        self.arena.free(re1);
        false
    }

    fn literal(&mut self, r: u32) {
        let re = self.arena.alloc(Op::Literal);
        let flags = self.flags;
        self.arena[re].flags = flags;
        self.arena[re].runes = vec![if flags.contains(Flags::FOLD_CASE) {
            min_fold_rune(r)
        } else {
            r
        }];
        self.push(re);
    }

    /// Pushes a fresh node of kind `op` carrying the current flags.
    fn op(&mut self, op: Op) -> RegexpId {
        let re = self.arena.alloc(op);
        self.arena[re].flags = self.flags;
        self.push(re);
        re
    }

    fn push_class(&mut self, mut cc: CharClass) {
        let re = self.arena.alloc(Op::CharClass);
        self.arena[re].flags = self.flags;
        self.arena[re].runes = cc.clean().ranges().to_vec();
        self.push(re);
    }

    /// Applies a repetition operator to the top of the stack. `before` is
    /// where the operator started; `t` is just past it.
    fn repeat(
        &mut self,
        op: Op,
        min: u32,
        max: Option<u32>,
        before: usize,
        t: &mut StringIterator<'p>,
        last_repeat_pos: Option<usize>,
    ) -> Result<(), Error> {
        let mut flags = self.flags;
        if flags.contains(Flags::PERL_X) {
            if t.looking_at('?') {
                t.skip(1);
                flags ^= Flags::NON_GREEDY;
            }
            if let Some(last) = last_repeat_pos {
                // Stacked operators such as a** are rejected, not doubled.
                return Err(Error::new(ErrorKind::InvalidRepeatOp, t.from(last)));
            }
        }
        let sub = match self.stack.last() {
            Some(&sub) if !self.arena[sub].op.is_pseudo() => sub,
            _ => {
                return Err(Error::new(
                    ErrorKind::MissingRepeatArgument,
                    t.from(before),
                ));
            }
        };
        let re = self.arena.alloc(op);
        let node = &mut self.arena[re];
        node.min = min;
        node.max = max;
        node.flags = flags;
        node.subs = vec![sub];
        if let Some(top) = self.stack.last_mut() {
            *top = re;
        }
        Ok(())
    }

    fn concat(&mut self) {
        self.maybe_concat(None, Flags::empty());
        let subs = self.pop_to_pseudo();
        let re = if subs.is_empty() {
            self.arena.alloc(Op::EmptyMatch)
        } else {
            self.collapse(subs, Op::Concat)
        };
        self.push(re);
    }

    fn alternate(&mut self) {
        let subs = self.pop_to_pseudo();
        if let Some(&last) = subs.last() {
            self.clean_alt(last);
        }
        let re = if subs.is_empty() {
            self.arena.alloc(Op::NoMatch)
        } else {
            self.collapse(subs, Op::Alternate)
        };
        self.push(re);
    }

    /// Pops everything above the topmost pseudo-operator.
    fn pop_to_pseudo(&mut self) -> Vec<RegexpId> {
        let i = self
            .stack
            .iter()
            .rposition(|&re| self.arena[re].op.is_pseudo())
            .map_or(0, |p| p + 1);
        self.stack.split_off(i)
    }

    /// Canonicalizes a class that is about to become an alternation branch.
    fn clean_alt(&mut self, re: RegexpId) {
        let node = &mut self.arena[re];
        if node.op != Op::CharClass {
            return;
        }
        let mut cc = CharClass::from_ranges(mem::take(&mut node.runes));
        cc.clean();
        node.runes = cc.into_ranges();
        if node.runes == [0, MAX_RUNE] {
            node.runes.clear();
            node.op = Op::AnyChar;
        } else if node.runes == [0, '\n' as u32 - 1, '\n' as u32 + 1, MAX_RUNE] {
            node.runes.clear();
            node.op = Op::AnyCharNotNl;
        }
    }

    /// Builds an `op` node over `subs`, flattening children of the same
    /// kind. Alternations are factored.
    fn collapse(&mut self, subs: Vec<RegexpId>, op: Op) -> RegexpId {
        if subs.len() == 1 {
            return subs[0];
        }
        let mut flat = Vec::with_capacity(subs.len());
        for sub in subs {
            if self.arena[sub].op == op {
                flat.append(&mut self.arena[sub].subs);
                self.arena.free(sub);
            } else {
                flat.push(sub);
            }
        }
        let re = self.arena.alloc(op);
        if op == Op::Alternate {
            let factored = self.factor(flat);
            if factored.len() == 1 {
                self.arena.free(re);
                return factored[0];
            }
            self.arena[re].subs = factored;
        } else {
            self.arena[re].subs = flat;
        }
        re
    }

    /// Factors common prefixes out of the alternation branches in `sub`.
    fn factor(&mut self, mut sub: Vec<RegexpId>) -> Vec<RegexpId> {
        if sub.len() < 2 {
            return sub;
        }

        // Round 1: common literal prefixes.
        //   abc|abd -> ab(?:c|d)
        let mut out = Vec::with_capacity(sub.len());
        let mut str: Vec<u32> = Vec::new();
        let mut str_flags = Flags::empty();
        let mut start = 0;
        for i in 0..=sub.len() {
            let (istr, iflags) = if i < sub.len() {
                self.leading_string(sub[i])
            } else {
                (Vec::new(), Flags::empty())
            };
            if i < sub.len() && iflags == str_flags {
                let same = str.iter().zip(&istr).take_while(|(a, b)| a == b).count();
                if same > 0 {
                    str.truncate(same);
                    continue;
                }
            }

            if i == start + 1 {
                out.push(sub[start]);
            } else if i > start + 1 {
                let prefix = self.arena.alloc(Op::Literal);
                self.arena[prefix].flags = str_flags;
                self.arena[prefix].runes = str.clone();
                for s in &mut sub[start..i] {
                    *s = self.remove_leading_string(*s, str.len());
                }
                let suffix = self.collapse(sub[start..i].to_vec(), Op::Alternate);
                let re = self.arena.alloc(Op::Concat);
                self.arena[re].subs = vec![prefix, suffix];
                out.push(re);
            }
            start = i;
            str = istr;
            str_flags = iflags;
        }

        // Round 2: common leading sub-expressions with a single path
        // through the automaton.
        //   [a-c]x|[a-c]y -> [a-c](?:x|y)
        let sub = mem::take(&mut out);
        let mut start = 0;
        let mut first: Option<RegexpId> = None;
        for i in 0..=sub.len() {
            let ifirst = if i < sub.len() {
                self.leading_regexp(sub[i])
            } else {
                None
            };
            if let (Some(f), Some(fi)) = (first, ifirst) {
                if self.is_single_path(f) && self.arena.equal(f, fi) {
                    continue;
                }
            }

            match (i - start, first) {
                (0, _) => {}
                (1, _) | (_, None) => out.extend_from_slice(&sub[start..i]),
                (_, Some(prefix)) => {
                    let mut run = sub[start..i].to_vec();
                    for (j, s) in run.iter_mut().enumerate() {
                        // The prefix itself came from the first branch.
                        *s = self.remove_leading_regexp(*s, j != 0);
                    }
                    let suffix = self.collapse(run, Op::Alternate);
                    let re = self.arena.alloc(Op::Concat);
                    self.arena[re].subs = vec![prefix, suffix];
                    out.push(re);
                }
            }
            start = i;
            first = ifirst;
        }

        // Round 3: merge runs of single characters into one class.
        //   a|b|[d-f] -> [abd-f]
        let mut sub = mem::take(&mut out);
        let mut start = 0;
        for i in 0..=sub.len() {
            if i < sub.len() && self.is_char_class(sub[i]) {
                continue;
            }
            if i == start + 1 {
                out.push(sub[start]);
            } else if i > start + 1 {
                // Merge into the most general node of the run.
                let mut max = start;
                for j in start + 1..i {
                    let (m, s) = (&self.arena[sub[max]], &self.arena[sub[j]]);
                    if m.op < s.op || (m.op == s.op && m.runes.len() < s.runes.len()) {
                        max = j;
                    }
                }
                sub.swap(start, max);
                for j in start + 1..i {
                    self.merge_char_class(sub[start], sub[j]);
                    self.arena.free(sub[j]);
                }
                self.clean_alt(sub[start]);
                out.push(sub[start]);
            }
            if i < sub.len() {
                out.push(sub[i]);
            }
            start = i + 1;
        }

        // Round 4: collapse runs of empty matches into one.
        let sub = mem::take(&mut out);
        for (i, &re) in sub.iter().enumerate() {
            if i + 1 < sub.len()
                && self.arena[re].op == Op::EmptyMatch
                && self.arena[sub[i + 1]].op == Op::EmptyMatch
            {
                continue;
            }
            out.push(re);
        }
        out
    }

    /// The literal string `re` starts with, and its fold flag.
    fn leading_string(&self, re: RegexpId) -> (Vec<u32>, Flags) {
        let mut node = &self.arena[re];
        if node.op == Op::Concat && !node.subs.is_empty() {
            node = &self.arena[node.subs[0]];
        }
        if node.op == Op::Literal {
            (node.runes.clone(), node.flags & Flags::FOLD_CASE)
        } else {
            (Vec::new(), Flags::empty())
        }
    }

    /// Removes the first `n` runes of the leading literal of `re`.
    fn remove_leading_string(&mut self, re: RegexpId, n: usize) -> RegexpId {
        if self.arena[re].op == Op::Concat && !self.arena[re].subs.is_empty() {
            let first = self.arena[re].subs[0];
            let sub = self.remove_leading_string(first, n);
            self.arena[re].subs[0] = sub;
            if self.arena[sub].op == Op::EmptyMatch {
                self.arena.free(sub);
                let node = &mut self.arena[re];
                match node.subs.len() {
                    0 | 1 => {
                        node.op = Op::EmptyMatch;
                        node.subs.clear();
                    }
                    2 => {
                        let second = node.subs[1];
                        self.arena.free(re);
                        return second;
                    }
                    _ => {
                        node.subs.remove(0);
                    }
                }
            }
            return re;
        }

        let node = &mut self.arena[re];
        if node.op == Op::Literal {
            node.runes.drain(..n);
            if node.runes.is_empty() {
                node.op = Op::EmptyMatch;
            }
        }
        re
    }

    /// The first sub-expression of `re`, unless it is an empty match.
    fn leading_regexp(&self, re: RegexpId) -> Option<RegexpId> {
        let node = &self.arena[re];
        match node.op {
            Op::EmptyMatch => None,
            Op::Concat if !node.subs.is_empty() => {
                let sub = node.subs[0];
                (self.arena[sub].op != Op::EmptyMatch).then_some(sub)
            }
            _ => Some(re),
        }
    }

    /// Removes the leading sub-expression of `re`, freeing it if `reuse`.
    fn remove_leading_regexp(&mut self, re: RegexpId, reuse: bool) -> RegexpId {
        if self.arena[re].op == Op::Concat && !self.arena[re].subs.is_empty() {
            let first = self.arena[re].subs.remove(0);
            if reuse {
                self.arena.free(first);
            }
            let node = &mut self.arena[re];
            match node.subs.len() {
                0 => node.op = Op::EmptyMatch,
                1 => {
                    let only = node.subs[0];
                    self.arena.free(re);
                    return only;
                }
                _ => {}
            }
            return re;
        }
        if reuse {
            self.arena.free(re);
        }
        self.arena.alloc(Op::EmptyMatch)
    }

    /// Whether `re` matches exactly one rune.
    fn is_char_class(&self, re: RegexpId) -> bool {
        let node = &self.arena[re];
        match node.op {
            Op::Literal => node.runes.len() == 1,
            Op::CharClass | Op::AnyCharNotNl | Op::AnyChar => true,
            _ => false,
        }
    }

    /// Whether factoring `re` out of several branches leaves their order
    /// of preference unchanged: it must have a single path through the
    /// automaton.
    fn is_single_path(&self, re: RegexpId) -> bool {
        let node = &self.arena[re];
        match node.op {
            Op::BeginLine
            | Op::EndLine
            | Op::BeginText
            | Op::EndText
            | Op::WordBoundary
            | Op::NoWordBoundary => true,
            Op::Repeat => node.max == Some(node.min) && self.is_char_class(node.subs[0]),
            _ => self.is_char_class(re),
        }
    }

    /// Adds the runes matched by `src` to `dst`. `dst` must be at least as
    /// general as `src`.
    fn merge_char_class(&mut self, dst: RegexpId, src: RegexpId) {
        let (src_op, src_flags) = (self.arena[src].op, self.arena[src].flags);
        let src_runes = self.arena[src].runes.clone();
        let src_matches_nl = match src_op {
            Op::Literal => src_runes.len() == 1 && src_runes[0] == '\n' as u32,
            Op::CharClass => src_runes
                .chunks_exact(2)
                .any(|p| p[0] <= '\n' as u32 && '\n' as u32 <= p[1]),
            Op::AnyChar => true,
            _ => false,
        };

        let d = &mut self.arena[dst];
        match d.op {
            Op::AnyCharNotNl => {
                if src_matches_nl {
                    d.op = Op::AnyChar;
                }
            }
            Op::CharClass => {
                let mut cc = CharClass::from_ranges(mem::take(&mut d.runes));
                if src_op == Op::Literal {
                    cc.append_literal(src_runes[0], src_flags);
                } else {
                    cc.append_class(&src_runes);
                }
                d.runes = cc.into_ranges();
            }
            Op::Literal => {
                if src_runes[0] == d.runes[0] && src_flags == d.flags {
                    return;
                }
                let mut cc = CharClass::new();
                cc.append_literal(d.runes[0], d.flags)
                    .append_literal(src_runes[0], src_flags);
                d.op = Op::CharClass;
                d.runes = cc.into_ranges();
            }
            _ => {}
        }
    }

    fn parse_vertical_bar(&mut self) {
        self.concat();
        // The concatenation we just parsed is on top of the stack. If it
        // sits above an opening |, swap it below so the | stays on top.
        if !self.swap_vertical_bar() {
            self.op(Op::VerticalBar);
        }
    }

    /// Swaps the top of the stack below a `|` just beneath it, merging
    /// single-character branches into one class along the way. Returns
    /// whether a `|` was found.
    fn swap_vertical_bar(&mut self) -> bool {
        let n = self.stack.len();
        if n >= 3
            && self.arena[self.stack[n - 2]].op == Op::VerticalBar
            && self.is_char_class(self.stack[n - 1])
            && self.is_char_class(self.stack[n - 3])
        {
            let mut re1 = self.stack[n - 1];
            let mut re3 = self.stack[n - 3];
            if self.arena[re1].op > self.arena[re3].op {
                mem::swap(&mut re1, &mut re3);
                self.stack[n - 3] = re3;
            }
            self.merge_char_class(re3, re1);
            self.arena.free(re1);
            self.stack.pop();
            return true;
        }

        if n >= 2 && self.arena[self.stack[n - 2]].op == Op::VerticalBar {
            if n >= 3 {
                self.clean_alt(self.stack[n - 3]);
            }
            self.stack.swap(n - 2, n - 1);
            return true;
        }
        false
    }

    fn parse_right_paren(&mut self) -> Result<(), Error> {
        self.concat();
        if self.swap_vertical_bar() {
            self.stack.pop();
        }
        self.alternate();

        let (Some(re1), Some(re2)) = (self.stack.pop(), self.stack.pop()) else {
            return Err(Error::new(ErrorKind::InternalError, "stack underflow"));
        };
        if self.arena[re2].op != Op::LeftParen {
            return Err(Error::new(ErrorKind::MissingParen, self.whole));
        }
        // Restore the flags in effect when the group was opened.
        self.flags = self.arena[re2].flags;
        if self.arena[re2].cap == 0 {
            self.arena.free(re2);
            self.push(re1);
        } else {
            self.arena[re2].op = Op::Capture;
            self.arena[re2].subs = vec![re1];
            self.push(re2);
        }
        Ok(())
    }

    /// Parses `(?` constructs: named groups, flag changes and flag groups.
    fn parse_perl_flags(&mut self, t: &mut StringIterator<'p>) -> Result<(), Error> {
        let start = t.pos();

        let s = t.rest();
        if s.starts_with("(?P<") {
            let Some(end) = s.find('>') else {
                return Err(Error::new(ErrorKind::InvalidNamedCapture, s));
            };
            let name = &s[4..end];
            t.skip_str(name);
            t.skip(5); // "(?P<>"
            if !is_valid_capture_name(name) {
                return Err(Error::new(ErrorKind::InvalidNamedCapture, &s[..=end]));
            }
            self.num_cap += 1;
            let re = self.op(Op::LeftParen);
            self.arena[re].cap = self.num_cap;
            self.arena[re].name = Some(name.to_string());
            return Ok(());
        }

        t.skip(2); // "(?"
        let mut flags = self.flags;
        let mut negated = false;
        let mut saw_flag = false;
        while let Some(c) = t.pop() {
            match c {
                'i' => {
                    flags.set(Flags::FOLD_CASE, !negated);
                    saw_flag = true;
                }
                'm' => {
                    flags.set(Flags::ONE_LINE, negated);
                    saw_flag = true;
                }
                's' => {
                    flags.set(Flags::DOT_NL, !negated);
                    saw_flag = true;
                }
                'U' => {
                    flags.set(Flags::NON_GREEDY, !negated);
                    saw_flag = true;
                }
                '-' => {
                    if negated {
                        break;
                    }
                    negated = true;
                    saw_flag = false;
                }
                ':' | ')' => {
                    if negated && !saw_flag {
                        break;
                    }
                    if c == ':' {
                        // Open a group; it remembers the outer flags.
                        self.op(Op::LeftParen);
                    }
                    self.flags = flags;
                    return Ok(());
                }
                _ => break,
            }
        }
        Err(Error::new(ErrorKind::InvalidPerlOp, t.from(start)))
    }

    /// Parses a backslash outside of a class.
    fn parse_backslash(&mut self, t: &mut StringIterator<'p>) -> Result<(), Error> {
        let saved = t.pos();
        t.skip(1);
        if self.flags.contains(Flags::PERL_X) {
            match t.pop() {
                Some('A') => {
                    self.op(Op::BeginText);
                    return Ok(());
                }
                Some('b') => {
                    self.op(Op::WordBoundary);
                    return Ok(());
                }
                Some('B') => {
                    self.op(Op::NoWordBoundary);
                    return Ok(());
                }
                Some('C') => {
                    // Any byte; not supported.
                    return Err(Error::new(ErrorKind::InvalidEscape, r"\C"));
                }
                Some('Q') => {
                    let rest = t.rest();
                    let lit = match rest.find(r"\E") {
                        Some(i) => &rest[..i],
                        None => rest,
                    };
                    t.skip_str(lit);
                    if t.looking_at_str(r"\E") {
                        t.skip(2);
                    }
                    for c in lit.chars() {
                        self.literal(c as u32);
                    }
                    return Ok(());
                }
                Some('z') => {
                    self.op(Op::EndText);
                    return Ok(());
                }
                _ => {}
            }
        }
        t.rewind_to(saved);

        if t.looking_at_str(r"\p") || t.looking_at_str(r"\P") {
            let mut cc = CharClass::new();
            if self.parse_unicode_class(t, &mut cc)? {
                self.push_class(cc);
                return Ok(());
            }
        }

        let mut cc = CharClass::new();
        if self.parse_perl_class_escape(t, &mut cc) {
            self.push_class(cc);
            return Ok(());
        }

        t.rewind_to(saved);
        let r = parse_escape(t)?;
        self.literal(r);
        Ok(())
    }

    /// Parses `\d`-style escapes into `cc`. Leaves `t` in an unspecified
    /// position when returning `false`.
    fn parse_perl_class_escape(&self, t: &mut StringIterator<'p>, cc: &mut CharClass) -> bool {
        let before = t.pos();
        if !self.flags.contains(Flags::PERL_X) || t.pop() != Some('\\') || t.pop().is_none() {
            return false;
        }
        let Some(group) = perl_group(t.from(before)) else {
            return false;
        };
        cc.append_group(group, self.flags.contains(Flags::FOLD_CASE));
        true
    }

    /// Parses `[:alnum:]`-style names into `cc`.
    fn parse_named_class(
        &self,
        t: &mut StringIterator<'p>,
        cc: &mut CharClass,
    ) -> Result<bool, Error> {
        let rest = t.rest();
        let Some(i) = rest.find(":]") else {
            return Ok(false);
        };
        let name = &rest[..i + 2];
        t.skip_str(name);
        let Some(group) = posix_group(name) else {
            return Err(Error::new(ErrorKind::InvalidCharRange, name));
        };
        cc.append_group(group, self.flags.contains(Flags::FOLD_CASE));
        Ok(true)
    }

    /// Parses `\p{Name}`, `\pN` and their negations into `cc`.
    fn parse_unicode_class(
        &self,
        t: &mut StringIterator<'p>,
        cc: &mut CharClass,
    ) -> Result<bool, Error> {
        let start = t.pos();
        if !self.flags.contains(Flags::UNICODE_GROUPS)
            || !(t.looking_at_str(r"\p") || t.looking_at_str(r"\P"))
        {
            return Ok(false);
        }
        t.skip(1); // '\\'
        let mut sign: i8 = if t.pop() == Some('P') { -1 } else { 1 };
        let name_start = t.pos();
        let name = match t.pop() {
            None => {
                t.rewind_to(start);
                return Err(Error::new(ErrorKind::InvalidCharRange, t.rest()));
            }
            Some('{') => {
                let rest = t.rest();
                let Some(end) = rest.find('}') else {
                    t.rewind_to(start);
                    return Err(Error::new(ErrorKind::InvalidCharRange, t.rest()));
                };
                let name = &rest[..end];
                t.skip_str(name);
                t.skip(1); // '}'
                name
            }
            // A one-letter name such as \pL.
            Some(_) => t.from(name_start),
        };
        let name = match name.strip_prefix('^') {
            Some(n) => {
                sign = -sign;
                n
            }
            None => name,
        };

        let Some(table) = unicode_table(name) else {
            return Err(Error::new(ErrorKind::InvalidCharRange, t.from(start)));
        };
        if self.flags.contains(Flags::FOLD_CASE) {
            let mut tmp = CharClass::new();
            tmp.append_table(&table.table).append_table(&table.fold).clean();
            cc.append_class_with_sign(tmp.ranges(), sign);
        } else {
            cc.append_table_with_sign(&table.table, sign);
        }
        Ok(true)
    }

    fn parse_class(&mut self, t: &mut StringIterator<'p>) -> Result<(), Error> {
        let start = t.pos();
        t.skip(1); // '['
        let mut cc = CharClass::new();
        let fold = self.flags.contains(Flags::FOLD_CASE);

        let mut negated = false;
        if t.looking_at('^') {
            negated = true;
            t.skip(1);
            // If the class doesn't match newline, add it here so the
            // negation removes it.
            if !self.flags.contains(Flags::CLASS_NL) {
                cc.append_range('\n' as u32, '\n' as u32);
            }
        }

        // ']' and '-' are okay as the first char in a class.
        let mut first = true;
        while !t.looking_at(']') || first {
            // POSIX: - is only okay unescaped as first or last in class.
            // Perl: - is okay anywhere.
            if t.looking_at('-') && !self.flags.contains(Flags::PERL_X) && !first {
                let s = t.rest();
                if s == "-" || !s.starts_with("-]") {
                    t.rewind_to(start);
                    return Err(Error::new(ErrorKind::InvalidCharRange, t.rest()));
                }
            }
            first = false;

            let before = t.pos();

            if t.looking_at_str("[:") {
                if self.parse_named_class(t, &mut cc)? {
                    continue;
                }
                t.rewind_to(before);
            }

            if self.parse_unicode_class(t, &mut cc)? {
                continue;
            }

            if self.parse_perl_class_escape(t, &mut cc) {
                continue;
            }
            t.rewind_to(before);

            let lo = parse_class_char(t, start)?;
            let mut hi = lo;
            if t.looking_at('-') {
                t.skip(1);
                if t.looking_at(']') {
                    // [a-] means (a|-), so put the - back.
                    let p = t.pos();
                    t.rewind_to(p - 1);
                } else {
                    hi = parse_class_char(t, start)?;
                    if hi < lo {
                        return Err(Error::new(ErrorKind::InvalidCharRange, t.from(before)));
                    }
                }
            }
            if fold {
                cc.append_folded_range(lo, hi);
            } else {
                cc.append_range(lo, hi);
            }
        }
        t.skip(1); // ']'

        cc.clean();
        if negated {
            cc.negate();
        }
        let re = self.arena.alloc(Op::CharClass);
        self.arena[re].flags = self.flags;
        self.arena[re].runes = cc.into_ranges();
        self.push(re);
        Ok(())
    }
}

fn is_fold_pair(r: &[u32]) -> bool {
    (r.len() == 4
        && r[0] == r[1]
        && r[2] == r[3]
        && simple_fold(r[0]) == r[2]
        && simple_fold(r[2]) == r[0])
        || (r.len() == 2
            && r[0] + 1 == r[1]
            && simple_fold(r[0]) == r[1]
            && simple_fold(r[1]) == r[0])
}

fn is_valid_capture_name(name: &str) -> bool {
    !name.is_empty() && name.bytes().all(|b| b == b'_' || b.is_ascii_alphanumeric())
}

/// Parses a decimal number without leading zeros. Numbers too long to be
/// a valid count come back as `u32::MAX`.
fn parse_int(t: &mut StringIterator<'_>) -> Option<u32> {
    let start = t.pos();
    while matches!(t.peek(), Some('0'..='9')) {
        t.skip(1);
    }
    let n = t.from(start);
    if n.is_empty() || (n.len() > 1 && n.starts_with('0')) {
        return None;
    }
    if n.len() > 8 {
        return Some(u32::MAX);
    }
    n.parse().ok()
}

/// Parses `{n}`, `{n,}` or `{n,m}`. Returns `None` if `t` does not start
/// with a well-formed repeat, in which case `{` is just a literal.
fn parse_repeat(t: &mut StringIterator<'_>) -> Result<Option<(u32, Option<u32>)>, Error> {
    let start = t.pos();
    if !t.looking_at('{') {
        return Ok(None);
    }
    t.skip(1);
    let Some(min) = parse_int(t) else {
        return Ok(None);
    };
    if !t.more() {
        return Ok(None);
    }
    let max = if !t.looking_at(',') {
        Some(min)
    } else {
        t.skip(1);
        if !t.more() {
            return Ok(None);
        }
        if t.looking_at('}') {
            None
        } else {
            match parse_int(t) {
                Some(max) => Some(max),
                None => return Ok(None),
            }
        }
    };
    if !t.looking_at('}') {
        return Ok(None);
    }
    t.skip(1);
    if min > MAX_REPEAT || max.is_some_and(|max| max > MAX_REPEAT || min > max) {
        return Err(Error::new(ErrorKind::InvalidRepeatSize, t.from(start)));
    }
    Ok(Some((min, max)))
}

fn parse_class_char(t: &mut StringIterator<'_>, whole_class_pos: usize) -> Result<u32, Error> {
    if t.looking_at('\\') {
        return parse_escape(t);
    }
    match t.pop() {
        Some(c) => Ok(c as u32),
        None => Err(Error::new(
            ErrorKind::MissingBracket,
            t.from(whole_class_pos),
        )),
    }
}

/// Parses a single-rune escape such as `\n`, `\x41` or `\.`.
fn parse_escape(t: &mut StringIterator<'_>) -> Result<u32, Error> {
    let start = t.pos();
    t.skip(1); // '\\'
    let Some(c) = t.pop() else {
        return Err(Error::new(ErrorKind::TrailingBackslash, ""));
    };
    let r = match c {
        // Octal escapes. \1-\7 would be backreferences unless followed
        // by another octal digit.
        '1'..='7' if !matches!(t.peek(), Some('0'..='7')) => None,
        '0'..='7' => {
            let mut r = c as u32 - '0' as u32;
            for _ in 1..3 {
                match t.peek() {
                    Some(d @ '0'..='7') => {
                        r = r * 8 + (d as u32 - '0' as u32);
                        t.skip(1);
                    }
                    _ => break,
                }
            }
            Some(r)
        }
        'x' => parse_hex(t),
        'a' => Some(7),
        'f' => Some(0x0C),
        'n' => Some(0x0A),
        'r' => Some(0x0D),
        't' => Some(0x09),
        'v' => Some(0x0B),
        // Only ASCII punctuation may be escaped.
        c if c.is_ascii() && !c.is_ascii_alphanumeric() => Some(c as u32),
        _ => None,
    };
    r.ok_or_else(|| Error::new(ErrorKind::InvalidEscape, t.from(start)))
}

/// Parses the digits of `\xHH` or `\x{H...}`, with `t` just past the `x`.
fn parse_hex(t: &mut StringIterator<'_>) -> Option<u32> {
    match t.pop()? {
        '{' => {
            let mut nhex = 0;
            let mut r = 0;
            loop {
                let c = t.pop()?;
                if c == '}' {
                    break;
                }
                r = r * 16 + c.to_digit(16)?;
                if r > MAX_RUNE {
                    return None;
                }
                nhex += 1;
            }
            (nhex > 0).then_some(r)
        }
        c => {
            let x = c.to_digit(16)?;
            let y = t.pop()?.to_digit(16)?;
            Some(x * 16 + y)
        }
    }
}
