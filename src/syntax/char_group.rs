//! Named ASCII character groups: the Perl escapes `\d \s \w` and the POSIX
//! bracket names such as `[:alpha:]`.

/// A named group of code points, possibly negated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CharGroup {
    /// `+1` for the group itself, `-1` for its complement.
    pub sign: i8,
    /// Flat `[lo, hi]` pairs.
    pub class: &'static [u32],
}

impl CharGroup {
    const fn pos(class: &'static [u32]) -> Self {
        Self { sign: 1, class }
    }

    const fn neg(class: &'static [u32]) -> Self {
        Self { sign: -1, class }
    }
}

const CODE1: &[u32] = &[0x30, 0x39];
const CODE2: &[u32] = &[0x9, 0xa, 0xc, 0xd, 0x20, 0x20];
const CODE3: &[u32] = &[0x30, 0x39, 0x41, 0x5a, 0x5f, 0x5f, 0x61, 0x7a];

const ALNUM: &[u32] = &[0x30, 0x39, 0x41, 0x5a, 0x61, 0x7a];
const ALPHA: &[u32] = &[0x41, 0x5a, 0x61, 0x7a];
const ASCII: &[u32] = &[0x0, 0x7f];
const BLANK: &[u32] = &[0x9, 0x9, 0x20, 0x20];
const CNTRL: &[u32] = &[0x0, 0x1f, 0x7f, 0x7f];
const DIGIT: &[u32] = &[0x30, 0x39];
const GRAPH: &[u32] = &[0x21, 0x7e];
const LOWER: &[u32] = &[0x61, 0x7a];
const PRINT: &[u32] = &[0x20, 0x7e];
const PUNCT: &[u32] = &[0x21, 0x2f, 0x3a, 0x40, 0x5b, 0x60, 0x7b, 0x7e];
const SPACE: &[u32] = &[0x9, 0xd, 0x20, 0x20];
const UPPER: &[u32] = &[0x41, 0x5a];
const WORD: &[u32] = &[0x30, 0x39, 0x41, 0x5a, 0x5f, 0x5f, 0x61, 0x7a];
const XDIGIT: &[u32] = &[0x30, 0x39, 0x41, 0x46, 0x61, 0x66];

/// Looks up a Perl class escape, written with its backslash: `\d`, `\S`...
pub fn perl_group(name: &str) -> Option<CharGroup> {
    let group = match name {
        r"\d" => CharGroup::pos(CODE1),
        r"\D" => CharGroup::neg(CODE1),
        r"\s" => CharGroup::pos(CODE2),
        r"\S" => CharGroup::neg(CODE2),
        r"\w" => CharGroup::pos(CODE3),
        r"\W" => CharGroup::neg(CODE3),
        _ => return None,
    };
    Some(group)
}

/// Looks up a POSIX class name, written with its brackets: `[:alpha:]`,
/// `[:^space:]`...
pub fn posix_group(name: &str) -> Option<CharGroup> {
    let (negated, bare) = match name
        .strip_prefix("[:")
        .and_then(|n| n.strip_suffix(":]"))
    {
        Some(n) => match n.strip_prefix('^') {
            Some(n) => (true, n),
            None => (false, n),
        },
        None => return None,
    };
    let class = match bare {
        "alnum" => ALNUM,
        "alpha" => ALPHA,
        "ascii" => ASCII,
        "blank" => BLANK,
        "cntrl" => CNTRL,
        "digit" => DIGIT,
        "graph" => GRAPH,
        "lower" => LOWER,
        "print" => PRINT,
        "punct" => PUNCT,
        "space" => SPACE,
        "upper" => UPPER,
        "word" => WORD,
        "xdigit" => XDIGIT,
        _ => return None,
    };
    Some(if negated {
        CharGroup::neg(class)
    } else {
        CharGroup::pos(class)
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lookups() {
        assert_eq!(perl_group(r"\d"), Some(CharGroup::pos(CODE1)));
        assert_eq!(perl_group(r"\W").map(|g| g.sign), Some(-1));
        assert_eq!(perl_group(r"\x"), None);
        assert_eq!(posix_group("[:alpha:]"), Some(CharGroup::pos(ALPHA)));
        assert_eq!(posix_group("[:^space:]"), Some(CharGroup::neg(SPACE)));
        assert_eq!(posix_group("[:foo:]"), None);
        assert_eq!(posix_group("alpha"), None);
    }
}
