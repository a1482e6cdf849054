//! A Pike VM over [`crate::thompson::bytecode`].
//!
//! The machine runs every thread of the NFA in lock step, one input rune at
//! a time. Threads live in two sparse-set queues indexed by pc, so each pc
//! holds at most one thread per position and a search is linear in the
//! input. Queue order is thread priority, which gives leftmost-first
//! semantics; in longest mode a later, longer match replaces an earlier one.

use std::mem;
use std::sync::Arc;

use crate::thompson::bytecode::{EmptyFlags, InstOp, Prog};
use crate::thompson::input::{MachineInput, Step, empty_op_context};
use crate::util::Anchor;

/// A thread alive at some pc, with its capture slots.
#[derive(Debug, Clone)]
struct Thread {
    cap: Vec<Option<usize>>,
    pc: usize,
}

#[derive(Debug, Default)]
struct Entry {
    pc: usize,
    /// `None` for non-terminal instructions, which are only recorded so
    /// they are not visited twice.
    thread: Option<Thread>,
}

/// A sparse set of pcs in insertion order.
///
/// `sparse` may hold garbage: `pc` is a member only when `sparse[pc]`
/// points back at an entry of `dense` holding `pc`, so clearing is O(1).
#[derive(Debug, Default)]
pub(crate) struct Queue {
    dense: Box<[Entry]>,
    sparse: Box<[usize]>,
    size: usize,
}

impl Queue {
    pub(crate) fn new(n: usize) -> Self {
        Self {
            dense: (0..n).map(|_| Entry::default()).collect(),
            sparse: vec![0; n].into_boxed_slice(),
            size: 0,
        }
    }

    pub(crate) fn contains(&self, pc: usize) -> bool {
        let j = self.sparse[pc];
        j < self.size && self.dense[j].pc == pc
    }

    /// Inserts `pc`, which must not be present, and returns its index.
    pub(crate) fn add(&mut self, pc: usize) -> usize {
        let j = self.size;
        let entry = &mut self.dense[j];
        entry.pc = pc;
        entry.thread = None;
        self.sparse[pc] = j;
        self.size += 1;
        j
    }

    /// Empties the queue, returning its threads to `pool`.
    fn clear(&mut self, pool: &mut Vec<Thread>) {
        for entry in &mut self.dense[..self.size] {
            if let Some(t) = entry.thread.take() {
                pool.push(t);
            }
        }
        self.size = 0;
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.size == 0
    }
}

/// The matching state for one program. Not shareable; a `Regex` keeps a
/// pool of these.
#[derive(Debug)]
pub struct Machine {
    prog: Arc<Prog>,
    longest: bool,
    q0: Queue,
    q1: Queue,
    /// Idle threads, reused to avoid allocating capture vectors.
    pool: Vec<Thread>,
    matched: bool,
    matchcap: Vec<Option<usize>>,
    scratch: Vec<Option<usize>>,
    ncap: usize,
}

impl Machine {
    pub fn new(prog: Arc<Prog>, longest: bool) -> Self {
        let n = prog.len();
        Self {
            prog,
            longest,
            q0: Queue::new(n),
            q1: Queue::new(n),
            pool: Vec::new(),
            matched: false,
            matchcap: Vec::new(),
            scratch: Vec::new(),
            ncap: 0,
        }
    }

    /// Prepares the machine to record `ncap` capture slots.
    pub fn init(&mut self, ncap: usize) {
        if ncap != self.ncap {
            for t in &mut self.pool {
                t.cap.resize(ncap, None);
            }
            self.matchcap.resize(ncap, None);
            self.scratch.resize(ncap, None);
            self.ncap = ncap;
        }
    }

    /// The slots of the last successful match.
    pub fn captures(&self) -> &[Option<usize>] {
        &self.matchcap
    }

    fn alloc(&mut self) -> Thread {
        self.pool.pop().unwrap_or_else(|| Thread {
            cap: vec![None; self.ncap],
            pc: 0,
        })
    }

    /// Runs the program on `input` starting at `pos`. On success the
    /// match is available from [`Machine::captures`].
    pub fn match_input<I: MachineInput + ?Sized>(
        &mut self,
        input: &I,
        mut pos: usize,
        anchor: Anchor,
    ) -> bool {
        let prog = Arc::clone(&self.prog);
        let Some(start_cond) = prog.start_cond() else {
            return false;
        };
        if anchor != Anchor::Unanchored && pos != 0 {
            return false;
        }
        self.matched = false;
        self.matchcap.fill(None);

        let mut runq = mem::take(&mut self.q0);
        let mut nextq = mem::take(&mut self.q1);
        let mut scratch = mem::take(&mut self.scratch);
        let prefix = prog.prefix();
        let end_pos = input.end_pos();

        let lookahead = |pos: usize, cur: Step| {
            if cur.width > 0 {
                input.step(pos + cur.width)
            } else {
                Step::EOF
            }
        };

        let mut cur = input.step(pos);
        let mut next = lookahead(pos, cur);
        let mut flag = if pos == 0 {
            empty_op_context(None, cur.rune)
        } else {
            input.context(pos)
        };

        loop {
            if runq.is_empty() {
                if start_cond.contains(EmptyFlags::BEGIN_TEXT) && pos != 0 {
                    break;
                }
                if self.matched {
                    break;
                }
                if anchor != Anchor::Unanchored && pos != 0 {
                    break;
                }
                if !prefix.is_empty() && cur.rune != prefix.first_rune() && input.can_check_prefix()
                {
                    let Some(advance) = input.index_of_prefix(prefix, pos) else {
                        break;
                    };
                    pos = advance;
                    cur = input.step(pos);
                    next = lookahead(pos, cur);
                    flag = input.context(pos);
                }
            }
            if !self.matched && (pos == 0 || anchor == Anchor::Unanchored) {
                scratch.fill(None);
                if let Some(slot) = scratch.first_mut() {
                    *slot = Some(pos);
                }
                if let Some(t) =
                    self.add(&prog, &mut runq, prog.start(), pos, &mut scratch, flag, None)
                {
                    self.pool.push(t);
                }
            }
            flag = empty_op_context(cur.rune, next.rune);
            self.step(
                &prog,
                &mut runq,
                &mut nextq,
                pos,
                cur.rune,
                flag,
                anchor,
                pos == end_pos,
                &mut scratch,
                cur.width,
            );
            if cur.width == 0 {
                break;
            }
            if self.ncap == 0 && self.matched {
                break;
            }
            pos += cur.width;
            cur = next;
            next = lookahead(pos, cur);
            mem::swap(&mut runq, &mut nextq);
        }

        runq.clear(&mut self.pool);
        nextq.clear(&mut self.pool);
        self.q0 = runq;
        self.q1 = nextq;
        self.scratch = scratch;
        self.matched
    }

    /// Runs every thread in `runq` on the rune `c` at `pos`, in priority
    /// order, feeding survivors into `nextq`. `next_cond` holds after `c`.
    #[allow(clippy::too_many_arguments)]
    fn step(
        &mut self,
        prog: &Prog,
        runq: &mut Queue,
        nextq: &mut Queue,
        pos: usize,
        c: Option<u32>,
        next_cond: EmptyFlags,
        anchor: Anchor,
        at_end: bool,
        scratch: &mut [Option<usize>],
        width: usize,
    ) {
        let longest = self.longest;
        let mut j = 0;
        while j < runq.size {
            let entry = j;
            j += 1;
            let Some(mut t) = runq.dense[entry].thread.take() else {
                continue;
            };
            if longest && self.matched && !t.cap.is_empty() && self.matchcap[0] < t.cap[0] {
                self.pool.push(t);
                continue;
            }
            let inst = prog.inst(t.pc);
            let consumed = match inst.op {
                InstOp::Match => {
                    if anchor == Anchor::AnchorBoth && !at_end {
                        self.pool.push(t);
                        continue;
                    }
                    if !t.cap.is_empty()
                        && (!longest || !self.matched || self.matchcap[1] < Some(pos))
                    {
                        t.cap[1] = Some(pos);
                        self.matchcap.copy_from_slice(&t.cap);
                    }
                    if !longest {
                        // Everything after this thread has lower priority.
                        for rest in &mut runq.dense[j..runq.size] {
                            if let Some(t) = rest.thread.take() {
                                self.pool.push(t);
                            }
                        }
                        runq.size = 0;
                    }
                    self.matched = true;
                    false
                }
                InstOp::Rune => c.is_some_and(|c| inst.match_rune(c)),
                InstOp::Rune1 => c == Some(inst.runes[0]),
                InstOp::RuneAny => c.is_some(),
                InstOp::RuneAnyNotNl => c.is_some_and(|c| c != u32::from(b'\n')),
                op => unreachable!("{op:?} in run queue"),
            };
            if consumed {
                scratch.copy_from_slice(&t.cap);
                let out = inst.out;
                let rest = self.add(prog, nextq, out, pos + width, scratch, next_cond, Some(t));
                if let Some(t) = rest {
                    self.pool.push(t);
                }
            } else {
                self.pool.push(t);
            }
        }
        runq.size = 0;
    }

    /// Adds `pc` and everything reachable from it without consuming input
    /// to `q`. `cap` holds the slots of the thread being extended and is
    /// restored before returning. `t`, if given, is reused for the first
    /// terminal instruction; an unused `t` is handed back.
    #[allow(clippy::too_many_arguments)]
    fn add(
        &mut self,
        prog: &Prog,
        q: &mut Queue,
        pc: usize,
        pos: usize,
        cap: &mut [Option<usize>],
        cond: EmptyFlags,
        mut t: Option<Thread>,
    ) -> Option<Thread> {
        if pc == 0 || q.contains(pc) {
            return t;
        }
        let j = q.add(pc);
        let inst = prog.inst(pc);
        match inst.op {
            InstOp::Fail => {}
            InstOp::Alt | InstOp::AltMatch => {
                t = self.add(prog, q, inst.out, pos, cap, cond, t);
                t = self.add(prog, q, inst.arg, pos, cap, cond, t);
            }
            InstOp::EmptyWidth => {
                if cond.contains(inst.empty_flags()) {
                    t = self.add(prog, q, inst.out, pos, cap, cond, t);
                }
            }
            InstOp::Nop => {
                t = self.add(prog, q, inst.out, pos, cap, cond, t);
            }
            InstOp::Capture => {
                if inst.arg < cap.len() {
                    let old = cap[inst.arg];
                    cap[inst.arg] = Some(pos);
                    if let Some(rest) = self.add(prog, q, inst.out, pos, cap, cond, None) {
                        self.pool.push(rest);
                    }
                    cap[inst.arg] = old;
                } else {
                    t = self.add(prog, q, inst.out, pos, cap, cond, t);
                }
            }
            InstOp::Match
            | InstOp::Rune
            | InstOp::Rune1
            | InstOp::RuneAny
            | InstOp::RuneAnyNotNl => {
                let mut thread = match t.take() {
                    Some(thread) => thread,
                    None => self.alloc(),
                };
                thread.pc = pc;
                thread.cap.copy_from_slice(cap);
                q.dense[j].thread = Some(thread);
            }
        }
        t
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::syntax::{Flags, parse};
    use crate::thompson::compile;
    use crate::thompson::input::{Utf8Input, Utf16Input};

    fn machine(pattern: &str, longest: bool) -> Machine {
        let flags = if longest { Flags::POSIX } else { Flags::PERL };
        let prog = Arc::new(compile(parse(pattern, flags).unwrap()));
        let ncap = prog.num_cap();
        let mut m = Machine::new(prog, longest);
        m.init(ncap);
        m
    }

    fn run(pattern: &str, longest: bool, text: &str, anchor: Anchor) -> Option<Vec<Option<usize>>> {
        let mut m = machine(pattern, longest);
        let input = Utf8Input::new(text.as_bytes(), text.len());
        m.match_input(&input, 0, anchor)
            .then(|| m.captures().to_vec())
    }

    fn span(pattern: &str, text: &str) -> Option<(usize, usize)> {
        run(pattern, false, text, Anchor::Unanchored).map(|c| (c[0].unwrap(), c[1].unwrap()))
    }

    #[test]
    fn queue_is_a_set() {
        let mut q = Queue::new(4);
        assert!(q.is_empty());
        assert_eq!(q.add(2), 0);
        assert_eq!(q.add(0), 1);
        assert!(q.contains(2));
        assert!(q.contains(0));
        assert!(!q.contains(1));
        assert!(!q.contains(3));
        assert_eq!(q.size, 2);

        let mut pool = Vec::new();
        q.clear(&mut pool);
        assert!(q.is_empty());
        // Stale sparse entries do not count.
        assert!(!q.contains(2));
        assert!(!q.contains(0));
    }

    #[test]
    fn first_match_and_longest_match() {
        assert_eq!(
            run("a|ab", false, "ab", Anchor::Unanchored),
            Some(vec![Some(0), Some(1)])
        );
        assert_eq!(
            run("a|ab", true, "ab", Anchor::Unanchored),
            Some(vec![Some(0), Some(2)])
        );
        assert_eq!(
            run("a*?", false, "aaa", Anchor::Unanchored),
            Some(vec![Some(0), Some(0)])
        );
    }

    #[test]
    fn leftmost_wins() {
        assert_eq!(span("b+|a+", "xaabb"), Some((1, 3)));
        assert_eq!(span("bc|abcd", "abcd"), Some((0, 4)));
        assert_eq!(span("x", "abc"), None);
    }

    #[test]
    fn captures() {
        assert_eq!(
            run("(a+)(b)?", false, "xaab", Anchor::Unanchored),
            Some(vec![Some(1), Some(4), Some(1), Some(3), Some(3), Some(4)])
        );
        assert_eq!(
            run("(a)(b)?", false, "ac", Anchor::Unanchored),
            Some(vec![Some(0), Some(1), Some(0), Some(1), None, None])
        );
        // The last iteration wins.
        assert_eq!(
            run("(?:(a)|(b))+", false, "ab", Anchor::Unanchored),
            Some(vec![Some(0), Some(2), Some(0), Some(1), Some(1), Some(2)])
        );
    }

    #[test]
    fn anchors() {
        assert_eq!(run("abc", false, "abcx", Anchor::AnchorBoth), None);
        assert_eq!(
            run("abc", false, "abc", Anchor::AnchorBoth),
            Some(vec![Some(0), Some(3)])
        );
        assert_eq!(run("b", false, "ab", Anchor::AnchorStart), None);
        assert_eq!(
            run("a", false, "ab", Anchor::AnchorStart),
            Some(vec![Some(0), Some(1)])
        );
        assert_eq!(span("^a", "ba"), None);
        assert_eq!(span("a$", "aba"), Some((2, 3)));
        assert_eq!(span("(?m)^b", "a\nb"), Some((2, 3)));
        assert_eq!(span(r"\bfoo\b", "a foo"), Some((2, 5)));
        assert_eq!(span(r"\Bfoo", "a foo"), None);
    }

    #[test]
    fn prefix_skip() {
        assert_eq!(span("abc", "xxxxabc"), Some((4, 7)));
        assert_eq!(span("abc+", "ab abcc"), Some((3, 7)));
        assert_eq!(span("abc", "xxab"), None);
    }

    #[test]
    fn empty_matches() {
        assert_eq!(span("", ""), Some((0, 0)));
        assert_eq!(span("a*", "b"), Some((0, 0)));
        assert_eq!(span("$", "ab"), Some((2, 2)));
    }

    #[test]
    fn match_without_captures() {
        let mut m = machine("a+", false);
        m.init(0);
        let input = Utf8Input::new(b"baa", 3);
        assert!(m.match_input(&input, 0, Anchor::Unanchored));
        assert!(m.captures().is_empty());
        let input = Utf8Input::new(b"bbb", 3);
        assert!(!m.match_input(&input, 0, Anchor::Unanchored));
    }

    #[test]
    fn start_position() {
        let mut m = machine("a", false);
        m.init(2);
        let input = Utf8Input::new(b"aba", 3);
        assert!(m.match_input(&input, 1, Anchor::Unanchored));
        assert_eq!(m.captures(), &[Some(2), Some(3)]);
        assert!(!m.match_input(&input, 1, Anchor::AnchorStart));
    }

    #[test]
    fn machine_is_reusable() {
        let mut m = machine("(x)+", false);
        m.init(4);
        for _ in 0..3 {
            let input = Utf8Input::new(b"axxb", 4);
            assert!(m.match_input(&input, 0, Anchor::Unanchored));
            assert_eq!(m.captures(), &[Some(1), Some(3), Some(2), Some(3)]);
        }
        // Growing the slot count keeps pooled threads consistent.
        m.init(6);
        let input = Utf8Input::new(b"x", 1);
        assert!(m.match_input(&input, 0, Anchor::Unanchored));
        assert_eq!(m.captures(), &[Some(0), Some(1), Some(0), Some(1), None, None]);
    }

    #[test]
    fn utf16() {
        let mut m = machine("é+", false);
        m.init(2);
        let units: Vec<u16> = "aéé😀".encode_utf16().collect();
        let input = Utf16Input::new(&units, units.len());
        assert!(m.match_input(&input, 0, Anchor::Unanchored));
        assert_eq!(m.captures(), &[Some(1), Some(3)]);

        let mut m = machine("😀$", false);
        m.init(2);
        assert!(m.match_input(&input, 0, Anchor::Unanchored));
        assert_eq!(m.captures(), &[Some(3), Some(5)]);
    }

    #[test]
    fn queues_stay_within_program_size() {
        for pattern in ["(a|a|a|a)*a*", "(?:a*)*", "(a*)*(a+)+b"] {
            let mut m = machine(pattern, false);
            let prog = Arc::clone(&m.prog);
            let text = "a".repeat(300);
            let input = Utf8Input::new(text.as_bytes(), text.len());
            let mut runq = Queue::new(prog.len());
            let mut nextq = Queue::new(prog.len());
            let mut scratch = vec![None; m.ncap];
            let mut pos = 0;
            loop {
                let cur = input.step(pos);
                let next = if cur.width > 0 {
                    input.step(pos + cur.width)
                } else {
                    Step::EOF
                };
                let flag = if pos == 0 {
                    empty_op_context(None, cur.rune)
                } else {
                    input.context(pos)
                };
                scratch.fill(None);
                scratch[0] = Some(pos);
                let start = prog.start();
                if let Some(t) = m.add(&prog, &mut runq, start, pos, &mut scratch, flag, None) {
                    m.pool.push(t);
                }
                assert!(runq.size <= prog.len(), "{pattern:?} at {pos}");
                m.step(
                    &prog,
                    &mut runq,
                    &mut nextq,
                    pos,
                    cur.rune,
                    empty_op_context(cur.rune, next.rune),
                    Anchor::Unanchored,
                    pos == text.len(),
                    &mut scratch,
                    cur.width,
                );
                assert!(nextq.size <= prog.len(), "{pattern:?} at {pos}");
                let live = nextq.dense[..nextq.size]
                    .iter()
                    .filter(|e| e.thread.is_some())
                    .count();
                assert!(live <= prog.len(), "{pattern:?} at {pos}");
                if cur.width == 0 {
                    break;
                }
                pos += cur.width;
                mem::swap(&mut runq, &mut nextq);
            }
            runq.clear(&mut m.pool);
            nextq.clear(&mut m.pool);
            // Every thread ever allocated went back to the pool, and there
            // were never more than two queues' worth of them.
            assert!(m.pool.len() <= 2 * prog.len() + 1, "{pattern:?}");
        }
    }

    #[test]
    fn impossible_program() {
        let mut m = machine("[^\\x00-\\x{10FFFF}]", false);
        m.init(2);
        let input = Utf8Input::new(b"abc", 3);
        assert!(!m.match_input(&input, 0, Anchor::Unanchored));
    }
}
