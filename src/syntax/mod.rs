//! Pattern syntax: parsing a pattern into an [`ast::Ast`] and simplifying
//! it for the compiler.

use bitflags::bitflags;

pub mod ast;
pub mod char_group;
pub mod charclass;
pub mod error;
pub mod parser;
pub mod simplify;
pub mod unicode;

pub use ast::{Arena, Ast, Op, Regexp, RegexpId};
pub use charclass::CharClass;
pub use error::{Error, ErrorKind};
pub use parser::parse;
pub use simplify::simplify;

bitflags! {
    /// Parser flags. They control the accepted syntax and travel with the
    /// parsed nodes, which remember the flags in effect where they appeared.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct Flags: u16 {
        /// Case-insensitive match.
        const FOLD_CASE      = 0x01;
        /// Treat the whole pattern as a literal string.
        const LITERAL        = 0x02;
        /// Allow negated classes such as `[^a]` to match newline.
        const CLASS_NL       = 0x04;
        /// Allow `.` to match newline.
        const DOT_NL         = 0x08;
        /// `^` and `$` match only at the beginning and end of the text.
        const ONE_LINE       = 0x10;
        /// Repetition operators are non-greedy by default.
        const NON_GREEDY     = 0x20;
        /// Accept the Perl extensions: non-capturing groups, flags, `\d`,
        /// `\A`, `\Q...\E` and friends.
        const PERL_X         = 0x40;
        /// Accept `\p{Name}` and `\pN` Unicode groups.
        const UNICODE_GROUPS = 0x80;
        /// Internal: an end-of-text node that was written as `$`.
        const WAS_DOLLAR     = 0x100;

        const MATCH_NL = Self::CLASS_NL.bits() | Self::DOT_NL.bits();
        /// The syntax accepted by Perl, minus backreferences and lookaround.
        const PERL = Self::CLASS_NL.bits()
            | Self::ONE_LINE.bits()
            | Self::PERL_X.bits()
            | Self::UNICODE_GROUPS.bits();
        /// POSIX egrep syntax.
        const POSIX = 0;
    }
}
