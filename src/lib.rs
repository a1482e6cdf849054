//! A regular expression engine that runs in time linear in the size of the
//! input.
//!
//! Patterns are parsed into a syntax tree ([`syntax`]), compiled into a
//! Thompson NFA program ([`thompson`]) and run by a Pike VM that simulates
//! every NFA thread in lock step. There is no backtracking, so there are no
//! backreferences or lookaround either.
//!
//! ```
//! use pikere::Regex;
//!
//! let re = Regex::new(r"(\w+)@(\w+)").unwrap();
//! let caps = re.find_captures("mail bob@example now").unwrap();
//! assert_eq!(caps.get(1).unwrap().as_str(), "bob");
//! ```

pub mod regex;
pub mod syntax;
pub mod thompson;
pub mod util;

pub use regex::{AllCaptures, AllMatch, Builder, Regex};
pub use syntax::{Error, ErrorKind, Flags};
pub use util::{Anchor, Captures, Input, Match, Span, Text};

/// Escapes every metacharacter in `s`, giving a pattern that matches `s`
/// literally.
pub fn quote_meta(s: &str) -> String {
    let mut out = String::with_capacity(2 * s.len());
    for c in s.chars() {
        if r"\.+*?()|[]{}^$".contains(c) {
            out.push('\\');
        }
        out.push(c);
    }
    out
}
