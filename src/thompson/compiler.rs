//! Compiles a simplified [`Ast`] into a [`Prog`].
//!
//! Each node becomes a fragment: an entry pc and a patch list of successor
//! fields still waiting for a target. Fragments are glued together by
//! patching, so every instruction is emitted exactly once.

use log::trace;

use super::bytecode::{EmptyFlags, FOLD, InstOp, PatchList, Prog};
use crate::syntax::ast::{Ast, Op, RegexpId};
use crate::syntax::unicode::{MAX_RUNE, simple_fold};
use crate::syntax::{Flags, simplify};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Frag {
    i: usize,
    out: PatchList,
}

const FAIL: Frag = Frag {
    i: 0,
    out: PatchList::EMPTY,
};

struct Compiler {
    prog: Prog,
}

/// Simplifies `ast` and compiles it.
pub fn compile(ast: Ast) -> Prog {
    let ast = simplify(ast);
    compile_simplified(&ast)
}

/// Compiles an already simplified tree.
///
/// # Panics
///
/// Panics if `ast` still holds a `Repeat` or a parser pseudo-op.
pub fn compile_simplified(ast: &Ast) -> Prog {
    let mut c = Compiler { prog: Prog::new() };
    let f = c.compile(ast, ast.root);
    let m = c.inst(InstOp::Match).i;
    c.prog.patch(f.out, m);
    c.prog.start = f.i;
    c.prog.finish();
    trace!(
        "compiled {} instructions, {} capture slots",
        c.prog.len(),
        c.prog.num_cap()
    );
    c.prog
}

impl Compiler {
    fn inst(&mut self, op: InstOp) -> Frag {
        Frag {
            i: self.prog.push(op),
            out: PatchList::EMPTY,
        }
    }

    fn nop(&mut self) -> Frag {
        let f = self.inst(InstOp::Nop);
        Frag {
            i: f.i,
            out: PatchList::out(f.i),
        }
    }

    fn cap(&mut self, arg: usize) -> Frag {
        let f = self.inst(InstOp::Capture);
        self.prog.inst[f.i].arg = arg;
        if self.prog.num_cap < arg + 1 {
            self.prog.num_cap = arg + 1;
        }
        Frag {
            i: f.i,
            out: PatchList::out(f.i),
        }
    }

    fn cat(&mut self, f1: Frag, f2: Frag) -> Frag {
        if f1 == FAIL || f2 == FAIL {
            return FAIL;
        }
        self.prog.patch(f1.out, f2.i);
        Frag {
            i: f1.i,
            out: f2.out,
        }
    }

    fn alt(&mut self, f1: Frag, f2: Frag) -> Frag {
        if f1 == FAIL {
            return f2;
        }
        if f2 == FAIL {
            return f1;
        }
        let f = self.inst(InstOp::Alt);
        let i = &mut self.prog.inst[f.i];
        i.out = f1.i;
        i.arg = f2.i;
        Frag {
            i: f.i,
            out: self.prog.append(f1.out, f2.out),
        }
    }

    /// An `Alt` with `f1` on the preferred side, or the other side when
    /// `non_greedy`. Returns the alt and its open exit.
    fn loop_alt(&mut self, f1: Frag, non_greedy: bool) -> (usize, PatchList) {
        let f = self.inst(InstOp::Alt);
        let i = &mut self.prog.inst[f.i];
        if non_greedy {
            i.arg = f1.i;
            (f.i, PatchList::out(f.i))
        } else {
            i.out = f1.i;
            (f.i, PatchList::arg(f.i))
        }
    }

    fn quest(&mut self, f1: Frag, non_greedy: bool) -> Frag {
        let (i, out) = self.loop_alt(f1, non_greedy);
        Frag {
            i,
            out: self.prog.append(out, f1.out),
        }
    }

    fn star(&mut self, f1: Frag, non_greedy: bool) -> Frag {
        let (i, out) = self.loop_alt(f1, non_greedy);
        self.prog.patch(f1.out, i);
        Frag { i, out }
    }

    fn plus(&mut self, f1: Frag, non_greedy: bool) -> Frag {
        Frag {
            i: f1.i,
            out: self.star(f1, non_greedy).out,
        }
    }

    fn empty(&mut self, flags: EmptyFlags) -> Frag {
        let f = self.inst(InstOp::EmptyWidth);
        self.prog.inst[f.i].arg = flags.bits() as usize;
        Frag {
            i: f.i,
            out: PatchList::out(f.i),
        }
    }

    fn rune(&mut self, runes: Vec<u32>, flags: Flags) -> Frag {
        let f = self.inst(InstOp::Rune);
        let fold = flags.contains(Flags::FOLD_CASE)
            && runes.len() == 1
            && simple_fold(runes[0]) != runes[0];
        let op = match runes[..] {
            [_] if !fold => InstOp::Rune1,
            [lo, hi] if lo == hi => InstOp::Rune1,
            [0, MAX_RUNE] => InstOp::RuneAny,
            [0, 0x09, 0x0B, MAX_RUNE] => InstOp::RuneAnyNotNl,
            _ => InstOp::Rune,
        };
        let i = &mut self.prog.inst[f.i];
        i.op = op;
        i.arg = if fold { FOLD } else { 0 };
        i.runes = if op == InstOp::Rune1 {
            vec![runes[0]]
        } else {
            runes
        };
        Frag {
            i: f.i,
            out: PatchList::out(f.i),
        }
    }

    fn compile(&mut self, ast: &Ast, re: RegexpId) -> Frag {
        let node = &ast.arena[re];
        match node.op {
            Op::NoMatch => FAIL,
            Op::EmptyMatch => self.nop(),
            Op::Literal => {
                if node.runes.is_empty() {
                    return self.nop();
                }
                let mut f: Option<Frag> = None;
                for &r in &node.runes {
                    let f1 = self.rune(vec![r], node.flags);
                    f = Some(match f {
                        None => f1,
                        Some(f) => self.cat(f, f1),
                    });
                }
                f.unwrap_or(FAIL)
            }
            Op::CharClass if node.runes.is_empty() => FAIL,
            Op::CharClass => self.rune(node.runes.clone(), node.flags),
            Op::AnyCharNotNl => self.rune(vec![0, 0x09, 0x0B, MAX_RUNE], Flags::empty()),
            Op::AnyChar => self.rune(vec![0, MAX_RUNE], Flags::empty()),
            Op::BeginLine => self.empty(EmptyFlags::BEGIN_LINE),
            Op::EndLine => self.empty(EmptyFlags::END_LINE),
            Op::BeginText => self.empty(EmptyFlags::BEGIN_TEXT),
            Op::EndText => self.empty(EmptyFlags::END_TEXT),
            Op::WordBoundary => self.empty(EmptyFlags::WORD_BOUNDARY),
            Op::NoWordBoundary => self.empty(EmptyFlags::NO_WORD_BOUNDARY),
            Op::Capture => {
                let cap = node.cap;
                let sub = node.subs[0];
                let bra = self.cap(cap << 1);
                let sub = self.compile(ast, sub);
                let ket = self.cap(cap << 1 | 1);
                let f = self.cat(bra, sub);
                self.cat(f, ket)
            }
            Op::Star | Op::Plus | Op::Quest => {
                let (op, non_greedy, sub) = (node.op, node.is_non_greedy(), node.subs[0]);
                let f1 = self.compile(ast, sub);
                match op {
                    Op::Star => self.star(f1, non_greedy),
                    Op::Plus => self.plus(f1, non_greedy),
                    _ => self.quest(f1, non_greedy),
                }
            }
            Op::Concat => {
                if node.subs.is_empty() {
                    return self.nop();
                }
                let mut f: Option<Frag> = None;
                for &sub in &node.subs {
                    let f1 = self.compile(ast, sub);
                    f = Some(match f {
                        None => f1,
                        Some(f) => self.cat(f, f1),
                    });
                }
                f.unwrap_or(FAIL)
            }
            Op::Alternate => {
                if node.subs.is_empty() {
                    return self.nop();
                }
                let mut f: Option<Frag> = None;
                for &sub in &node.subs {
                    let f1 = self.compile(ast, sub);
                    f = Some(match f {
                        None => f1,
                        Some(f) => self.alt(f, f1),
                    });
                }
                f.unwrap_or(FAIL)
            }
            Op::Repeat | Op::LeftParen | Op::VerticalBar => {
                unreachable!("cannot compile {:?}: tree is not simplified", node.op)
            }
        }
    }
}
