//! Types and API for Regex matching
//!
//! This module defines the [`Regex`] struct, a compiled program plus a pool
//! of [`Machine`]s to run it, and the [`Builder`] used to configure one.

use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};

use log::{debug, trace};

use crate::syntax::{Error, Flags, parse};
use crate::thompson::bytecode::Prog;
use crate::thompson::input::{Utf8Input, Utf16Input};
use crate::thompson::{Machine, compile};
use crate::util::{Anchor, Captures, Input, Match, Span, Text, slot_span};

/// A compiled regular expression.
///
/// A `Regex` is safe to share between threads. Each search borrows a
/// [`Machine`] from an internal pool and returns it when done.
pub struct Regex {
    expr: String,
    prog: Arc<Prog>,
    /// Number of explicit capture groups.
    num_subexp: usize,
    cap_names: Arc<[Option<String>]>,
    longest: bool,
    syntax: String,
    machines: Mutex<Vec<Machine>>,
}

impl Regex {
    /// Compiles `pattern` with Perl syntax. Matches are leftmost-first, as
    /// Perl and most other engines report them.
    pub fn new(pattern: &str) -> Result<Self, Error> {
        Builder::new(pattern).build()
    }

    /// Compiles `pattern` with POSIX egrep syntax. Matches are
    /// leftmost-longest.
    pub fn compile_posix(pattern: &str) -> Result<Self, Error> {
        Builder::posix(pattern).build()
    }

    fn get(&self) -> Machine {
        let cached = self
            .machines
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pop();
        cached.unwrap_or_else(|| {
            trace!("allocating a machine for {:?}", self.expr);
            Machine::new(Arc::clone(&self.prog), self.longest)
        })
    }

    fn put(&self, machine: Machine) {
        self.machines
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(machine);
    }

    /// Drops every cached machine. Machines in use by a concurrent search
    /// are returned to the pool as usual when that search ends.
    pub fn reset(&self) {
        trace!("resetting the machine cache for {:?}", self.expr);
        self.machines
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }

    /// Runs a search for `ncap` capture slots over `text[..end]` from `pos`,
    /// and hands the slots of the match to `f`.
    fn run<R>(
        &self,
        text: Text<'_>,
        pos: usize,
        end: usize,
        anchor: Anchor,
        ncap: usize,
        f: impl FnOnce(&[Option<usize>]) -> R,
    ) -> Option<R> {
        let mut machine = self.get();
        machine.init(ncap);
        let matched = match text {
            Text::Utf8(bytes) => machine.match_input(&Utf8Input::new(bytes, end), pos, anchor),
            Text::Utf16(units) => machine.match_input(&Utf16Input::new(units, end), pos, anchor),
        };
        let result = matched.then(|| f(machine.captures()));
        self.put(machine);
        result
    }

    /// The low-level search. Fills `slots` with the capture positions of
    /// the match: `slots[2k]` and `slots[2k + 1]` bound group `k`, and
    /// groups that did not take part are left as `None`. Slots past the
    /// pattern's groups are set to `None`.
    ///
    /// # Panics
    ///
    /// Panics if `input.span.to` is beyond the end of the text.
    pub fn exec<'s>(&self, input: impl Into<Input<'s>>, slots: &mut [Option<usize>]) -> bool {
        let Input { text, span, anchor } = input.into();
        let len = text.len();
        assert!(
            span.to <= len,
            "end of span {} out of range for text of length {len}",
            span.to
        );
        if span.from > span.to {
            return false;
        }
        let ncap = if slots.len() == 1 { 2 } else { slots.len() };
        self.run(text, span.from, span.to, anchor, ncap, |caps| {
            let n = slots.len();
            slots.copy_from_slice(&caps[..n]);
        })
        .is_some()
    }

    /// Returns true whenever the input matches the regex or not, without
    /// returning the bounds of the match.
    pub fn is_match<'s>(&self, input: impl Into<Input<'s>>) -> bool {
        self.exec(input, &mut [])
    }

    /// Match the regex against the subject and returns the bounds of the
    /// match or None.
    pub fn find<'s>(&self, subject: &'s str) -> Option<Match<'s>> {
        let span = self
            .run(subject.into(), 0, subject.len(), Anchor::Unanchored, 2, |caps| {
                slot_span(caps, 0)
            })
            .flatten()?;
        Some(Match::new(subject, span))
    }

    /// Match the regex against the subject and returns a match with all
    /// its capture group bounds, or None. If only the overall match is
    /// needed, prefer `find`.
    pub fn find_captures<'s>(&self, subject: &'s str) -> Option<Captures<'s>> {
        let ncap = 2 * (self.num_subexp + 1);
        let slots = self.run(
            subject.into(),
            0,
            subject.len(),
            Anchor::Unanchored,
            ncap,
            |caps| Box::<[Option<usize>]>::from(caps),
        )?;
        Captures::new(subject, slots, Arc::clone(&self.cap_names))
    }

    /// Returns an iterator over all non-overlapping matches in the subject.
    pub fn find_iter<'r, 's>(&'r self, subject: &'s str) -> AllMatch<'r, 's> {
        AllMatch {
            searcher: Searcher::new(self, subject, 2),
        }
    }

    /// Returns an iterator over all non-overlapping matches in the subject,
    /// with their capture group bounds.
    pub fn captures_iter<'r, 's>(&'r self, subject: &'s str) -> AllCaptures<'r, 's> {
        AllCaptures {
            searcher: Searcher::new(self, subject, 2 * (self.num_subexp + 1)),
        }
    }

    /// Replaces every match in `src` with `repl`, taken literally.
    pub fn replace_all(&self, src: &str, repl: &str) -> String {
        self.replace_all_with(src, |_| repl.to_string(), 2 * src.len() + 1)
    }

    /// Replaces the first match in `src` with `repl`, taken literally.
    pub fn replace_first(&self, src: &str, repl: &str) -> String {
        self.replace_all_with(src, |_| repl.to_string(), 1)
    }

    /// Replaces up to `max` matches in `src` with the result of `repl` on
    /// the matched text. An empty match right after the previous match is
    /// left alone, except at the very start of `src`.
    pub fn replace_all_with(
        &self,
        src: &str,
        mut repl: impl FnMut(&str) -> String,
        max: usize,
    ) -> String {
        let mut out = String::with_capacity(src.len());
        let mut last_match_end = 0;
        let mut search_pos = 0;
        let mut replaced = 0;
        while search_pos <= src.len() {
            let Some(Span { from, to }) = self
                .run(
                    src.into(),
                    search_pos,
                    src.len(),
                    Anchor::Unanchored,
                    2,
                    |caps| slot_span(caps, 0),
                )
                .flatten()
            else {
                break;
            };

            out.push_str(&src[last_match_end..from]);
            if to > last_match_end || from == 0 {
                out.push_str(&repl(&src[from..to]));
                replaced += 1;
            }
            last_match_end = to;

            // Always move forward by at least one character.
            let width = src[search_pos..].chars().next().map_or(0, char::len_utf8);
            if search_pos + width > to {
                search_pos += width;
            } else if search_pos + 1 > to {
                search_pos += 1;
            } else {
                search_pos = to;
            }
            if replaced >= max {
                break;
            }
        }
        out.push_str(&src[last_match_end..]);
        out
    }

    /// The number of capture groups, not counting the whole match.
    pub fn num_captures(&self) -> usize {
        self.num_subexp
    }

    /// Group names by group index. Index 0 and unnamed groups are `None`.
    pub fn capture_names(&self) -> &[Option<String>] {
        &self.cap_names
    }

    /// The literal every match starts with, and whether it is the whole
    /// match.
    pub fn literal_prefix(&self) -> (&str, bool) {
        let prefix = self.prog.prefix();
        (prefix.as_str(), prefix.is_complete())
    }

    /// The pattern as rebuilt from its syntax tree.
    pub fn syntax(&self) -> &str {
        &self.syntax
    }

    pub fn program(&self) -> &Prog {
        &self.prog
    }

    pub fn as_str(&self) -> &str {
        &self.expr
    }
}

impl fmt::Display for Regex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.expr)
    }
}

impl fmt::Debug for Regex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Regex").field(&self.expr).finish()
    }
}

#[derive(Debug, Clone)]
pub struct Builder<'p> {
    pattern: &'p str,
    flags: Flags,
    longest: bool,
}

impl<'p> Builder<'p> {
    /// Perl syntax, leftmost-first matching.
    pub fn new(pattern: &'p str) -> Self {
        Self {
            pattern,
            flags: Flags::PERL,
            longest: false,
        }
    }

    /// POSIX syntax, leftmost-longest matching.
    pub fn posix(pattern: &'p str) -> Self {
        Self {
            pattern,
            flags: Flags::POSIX,
            longest: true,
        }
    }

    fn set(mut self, flag: Flags, value: bool) -> Self {
        self.flags.set(flag, value);
        self
    }

    /// Replaces every syntax flag at once.
    pub fn flags(mut self, flags: Flags) -> Self {
        self.flags = flags;
        self
    }

    pub fn case_insensitive(self, value: bool) -> Self {
        self.set(Flags::FOLD_CASE, value)
    }

    /// Treat the pattern as a literal string.
    pub fn literal(self, value: bool) -> Self {
        self.set(Flags::LITERAL, value)
    }

    pub fn class_matches_new_line(self, value: bool) -> Self {
        self.set(Flags::CLASS_NL, value)
    }

    pub fn dot_matches_new_line(self, value: bool) -> Self {
        self.set(Flags::DOT_NL, value)
    }

    /// `^` and `$` only match at the start and end of the text.
    pub fn one_line(self, value: bool) -> Self {
        self.set(Flags::ONE_LINE, value)
    }

    pub fn non_greedy(self, value: bool) -> Self {
        self.set(Flags::NON_GREEDY, value)
    }

    pub fn perl_extensions(self, value: bool) -> Self {
        self.set(Flags::PERL_X, value)
    }

    pub fn unicode_groups(self, value: bool) -> Self {
        self.set(Flags::UNICODE_GROUPS, value)
    }

    /// Report the leftmost-longest match instead of the leftmost-first.
    pub fn longest(mut self, value: bool) -> Self {
        self.longest = value;
        self
    }

    pub fn build(self) -> Result<Regex, Error> {
        let ast = parse(self.pattern, self.flags)?;
        let syntax = ast.to_string();
        let num_subexp = ast.max_cap();
        let cap_names: Arc<[Option<String>]> = ast.cap_names().into();
        let prog = compile(ast);
        debug!(
            "compiled {:?}: {} instructions, {} groups, prefix {:?}",
            self.pattern,
            prog.len(),
            num_subexp,
            prog.prefix().as_str()
        );
        Ok(Regex {
            expr: self.pattern.to_string(),
            prog: Arc::new(prog),
            num_subexp,
            cap_names,
            longest: self.longest,
            syntax,
            machines: Mutex::new(Vec::new()),
        })
    }
}

/// The iteration state shared by [`AllMatch`] and [`AllCaptures`].
struct Searcher<'r, 's> {
    re: &'r Regex,
    subject: &'s str,
    pos: usize,
    prev_match_end: Option<usize>,
    ncap: usize,
}

impl<'r, 's> Searcher<'r, 's> {
    fn new(re: &'r Regex, subject: &'s str, ncap: usize) -> Self {
        Self {
            re,
            subject,
            pos: 0,
            prev_match_end: None,
            ncap,
        }
    }

    fn next_slots(&mut self) -> Option<Box<[Option<usize>]>> {
        let end = self.subject.len();
        while self.pos <= end {
            let slots = self.re.run(
                self.subject.into(),
                self.pos,
                end,
                Anchor::Unanchored,
                self.ncap,
                |caps| Box::<[Option<usize>]>::from(caps),
            )?;
            let span = slot_span(&slots, 0)?;
            let mut accept = true;
            if span.to == self.pos {
                // An empty match right after the previous one is skipped.
                if Some(span.from) == self.prev_match_end {
                    accept = false;
                }
                self.pos += self.subject[self.pos..]
                    .chars()
                    .next()
                    .map_or(1, char::len_utf8);
            } else {
                self.pos = span.to;
            }
            self.prev_match_end = Some(span.to);
            if accept {
                return Some(slots);
            }
        }
        None
    }
}

/// Iterator over all matches of a regex.
pub struct AllMatch<'r, 's> {
    searcher: Searcher<'r, 's>,
}

impl<'s> Iterator for AllMatch<'_, 's> {
    type Item = Match<'s>;

    fn next(&mut self) -> Option<Self::Item> {
        let slots = self.searcher.next_slots()?;
        let span = slot_span(&slots, 0)?;
        Some(Match::new(self.searcher.subject, span))
    }
}

/// Iterator over all matches and their capture groups.
pub struct AllCaptures<'r, 's> {
    searcher: Searcher<'r, 's>,
}

impl<'s> Iterator for AllCaptures<'_, 's> {
    type Item = Captures<'s>;

    fn next(&mut self) -> Option<Self::Item> {
        let slots = self.searcher.next_slots()?;
        Captures::new(
            self.searcher.subject,
            slots,
            Arc::clone(&self.searcher.re.cap_names),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spans(re: &Regex, subject: &str) -> Vec<(usize, usize)> {
        re.find_iter(subject)
            .map(|m| (m.start(), m.end()))
            .collect()
    }

    #[test]
    fn find_iter_skips_empty_match_after_match() {
        let re = Regex::new("a*").unwrap();
        assert_eq!(spans(&re, "baaab"), vec![(0, 0), (1, 4), (5, 5)]);
        let re = Regex::new("").unwrap();
        assert_eq!(spans(&re, "é1"), vec![(0, 0), (2, 2), (3, 3)]);
    }

    #[test]
    fn replace() {
        let re = Regex::new("a+").unwrap();
        assert_eq!(re.replace_all("baaab", "X"), "bXb");
        let re = Regex::new("a*").unwrap();
        assert_eq!(re.replace_all("baaab", "X"), "XbXbX");
        assert_eq!(re.replace_first("baaab", "X"), "Xbaaab");
        let re = Regex::new("b").unwrap();
        assert_eq!(re.replace_first("abcb", "X"), "aXcb");
        assert_eq!(
            re.replace_all_with("abcb", |m| m.to_uppercase(), usize::MAX),
            "aBcB"
        );
    }

    #[test]
    fn exec_slots() {
        let re = Regex::new("(b)(x)?").unwrap();
        let mut slots = [Some(99); 8];
        assert!(re.exec("abc", &mut slots));
        assert_eq!(
            slots,
            [Some(1), Some(2), Some(1), Some(2), None, None, None, None]
        );

        // A single slot still reports the start.
        let mut slots = [None];
        assert!(re.exec("abc", &mut slots));
        assert_eq!(slots, [Some(1)]);

        let mut slots = [None; 2];
        assert!(!re.exec(Input::new("abc").span(2..3), &mut slots));
        assert!(!re.exec(Input::new("abc").span(3..2), &mut slots));
    }

    #[test]
    #[should_panic]
    fn exec_end_out_of_range() {
        let re = Regex::new("a").unwrap();
        re.exec(Input::new("abc").span(0..4), &mut []);
    }

    #[test]
    fn metadata() {
        let re = Regex::new(r"(?P<year>\d+)-(\d+)").unwrap();
        assert_eq!(re.num_captures(), 2);
        assert_eq!(
            re.capture_names(),
            &[None, Some("year".to_string()), None]
        );
        assert_eq!(re.as_str(), r"(?P<year>\d+)-(\d+)");
        assert_eq!(re.to_string(), r"(?P<year>\d+)-(\d+)");

        let re = Regex::new("abc").unwrap();
        assert_eq!(re.literal_prefix(), ("abc", true));
        let re = Regex::new("abc+").unwrap();
        assert_eq!(re.literal_prefix(), ("abc", false));
    }

    #[test]
    fn named_groups() {
        let re = Regex::new(r"(?P<key>\w+)=(?P<value>\w*)").unwrap();
        let caps = re.find_captures("x a=b").unwrap();
        assert_eq!(caps.name("key").map(|m| m.as_str()), Some("a"));
        assert_eq!(caps.name("value").map(|m| m.as_str()), Some("b"));
    }

    #[test]
    fn machines_are_pooled() {
        let re = Regex::new("a").unwrap();
        assert!(re.is_match("a"));
        assert!(re.is_match("ba"));
        assert_eq!(re.machines.lock().unwrap().len(), 1);
        re.reset();
        assert!(re.machines.lock().unwrap().is_empty());
        assert!(!re.is_match("b"));
    }
}
