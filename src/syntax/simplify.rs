//! Rewrites counted repetitions into the star, plus and quest forms the
//! compiler understands.
//!
//! The result may share sub-trees: `x{3}` becomes a concatenation of three
//! references to the same simplified `x`. Nodes that need no rewriting are
//! reused as they are, and a parent is copied only when one of its children
//! changed.

use super::Flags;
use super::ast::{Arena, Ast, Op, RegexpId};

/// Simplifies `ast` in place, returning it with its new root.
pub fn simplify(mut ast: Ast) -> Ast {
    ast.root = simplify_node(&mut ast.arena, ast.root);
    ast
}

fn simplify_node(arena: &mut Arena, re: RegexpId) -> RegexpId {
    match arena[re].op {
        Op::Capture | Op::Concat | Op::Alternate => {
            let mut nre = re;
            for i in 0..arena[re].subs.len() {
                let sub = arena[re].subs[i];
                let nsub = simplify_node(arena, sub);
                if nre == re && nsub != sub {
                    nre = arena.alloc_copy(re);
                    arena[nre].runes.clear();
                }
                if nre != re {
                    arena[nre].subs[i] = nsub;
                }
            }
            nre
        }
        Op::Star | Op::Plus | Op::Quest => {
            let (op, flags, sub) = (arena[re].op, arena[re].flags, arena[re].subs[0]);
            let sub = simplify_node(arena, sub);
            simplify1(arena, op, flags, sub, Some(re))
        }
        Op::Repeat => {
            let (min, max, flags) = (arena[re].min, arena[re].max, arena[re].flags);
            // x{0} matches the empty string; x itself is never looked at.
            if min == 0 && max == Some(0) {
                return arena.alloc(Op::EmptyMatch);
            }
            let sub = arena[re].subs[0];
            let sub = simplify_node(arena, sub);

            let Some(max) = max else {
                // x{n,} is n-1 copies of x followed by x+.
                return match min {
                    0 => simplify1(arena, Op::Star, flags, sub, None),
                    1 => simplify1(arena, Op::Plus, flags, sub, None),
                    _ => {
                        let mut subs = vec![sub; min as usize - 1];
                        subs.push(simplify1(arena, Op::Plus, flags, sub, None));
                        concat(arena, subs)
                    }
                };
            };

            if min == 1 && max == 1 {
                return sub;
            }

            // x{n,m} is n copies of x followed by m-n nested optional
            // copies: x{2,5} = xx(x(x(x)?)?)?
            let mut prefix = vec![sub; min as usize];
            if max > min {
                let mut suffix = simplify1(arena, Op::Quest, flags, sub, None);
                for _ in min + 1..max {
                    let nested = concat(arena, vec![sub, suffix]);
                    suffix = simplify1(arena, Op::Quest, flags, nested, None);
                }
                if prefix.is_empty() {
                    return suffix;
                }
                prefix.push(suffix);
            }
            if !prefix.is_empty() {
                return concat(arena, prefix);
            }

            // min > max
            arena.alloc(Op::NoMatch)
        }
        _ => re,
    }
}

fn concat(arena: &mut Arena, subs: Vec<RegexpId>) -> RegexpId {
    let re = arena.alloc(Op::Concat);
    arena[re].subs = subs;
    re
}

/// Builds `op{sub}`, unless the result would match the same strings as
/// `sub` or as the existing node `re`.
fn simplify1(
    arena: &mut Arena,
    op: Op,
    flags: Flags,
    sub: RegexpId,
    re: Option<RegexpId>,
) -> RegexpId {
    let non_greedy = flags.contains(Flags::NON_GREEDY);
    let s = &arena[sub];
    if s.op == Op::EmptyMatch || (s.op == op && s.is_non_greedy() == non_greedy) {
        return sub;
    }
    if let Some(re) = re {
        let r = &arena[re];
        if r.op == op && r.is_non_greedy() == non_greedy && r.subs[0] == sub {
            return re;
        }
    }
    let nre = arena.alloc(op);
    arena[nre].flags = flags;
    arena[nre].subs = vec![sub];
    nre
}
