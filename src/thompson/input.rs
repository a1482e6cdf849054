//! Rune-level views of the subject text for the matching engine.
//!
//! Positions are always offsets in the encoding's code units: bytes for
//! [`Utf8Input`] and `u16` units for [`Utf16Input`].

use memchr::memmem;

use super::bytecode::{EmptyFlags, LiteralPrefix};
use crate::syntax::unicode::{MAX_RUNE, REPLACEMENT_CHAR};

/// One decoded rune and its width in code units. `rune` is `None` at the
/// end of the input, where `width` is 0.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Step {
    pub rune: Option<u32>,
    pub width: usize,
}

impl Step {
    pub const EOF: Step = Step {
        rune: None,
        width: 0,
    };
}

pub trait MachineInput {
    /// Decodes the rune starting at `pos`.
    fn step(&self, pos: usize) -> Step;

    /// Whether [`MachineInput::index_of_prefix`] is cheap enough to use as
    /// a skip-ahead.
    fn can_check_prefix(&self) -> bool;

    /// The first position at or after `pos` where `prefix` occurs.
    fn index_of_prefix(&self, prefix: &LiteralPrefix, pos: usize) -> Option<usize>;

    /// The zero-width conditions holding at `pos`.
    fn context(&self, pos: usize) -> EmptyFlags;

    fn end_pos(&self) -> usize;
}

/// ASCII word characters, as `\b` sees them.
pub fn is_word_rune(r: Option<u32>) -> bool {
    match r.and_then(|r| u8::try_from(r).ok()) {
        Some(b) => b.is_ascii_alphanumeric() || b == b'_',
        None => false,
    }
}

/// The conditions holding between `r1` and `r2`, where `None` is the edge
/// of the text.
pub fn empty_op_context(r1: Option<u32>, r2: Option<u32>) -> EmptyFlags {
    let mut op = EmptyFlags::empty();
    match r1 {
        None => op |= EmptyFlags::BEGIN_TEXT | EmptyFlags::BEGIN_LINE,
        Some(0x0A) => op |= EmptyFlags::BEGIN_LINE,
        _ => {}
    }
    match r2 {
        None => op |= EmptyFlags::END_TEXT | EmptyFlags::END_LINE,
        Some(0x0A) => op |= EmptyFlags::END_LINE,
        _ => {}
    }
    if is_word_rune(r1) != is_word_rune(r2) {
        op |= EmptyFlags::WORD_BOUNDARY;
    } else {
        op |= EmptyFlags::NO_WORD_BOUNDARY;
    }
    op
}

/// UTF-8 text. Invalid sequences decode as U+FFFD, one byte at a time.
#[derive(Debug, Clone, Copy)]
pub struct Utf8Input<'t> {
    bytes: &'t [u8],
}

impl<'t> Utf8Input<'t> {
    /// A view of `bytes[..end]`; nothing past `end` is ever read.
    pub fn new(bytes: &'t [u8], end: usize) -> Self {
        Self {
            bytes: &bytes[..end],
        }
    }

    fn last_rune_before(&self, pos: usize) -> Option<u32> {
        if pos == 0 {
            return None;
        }
        // A sequence is at most 4 bytes: find the start that ends at pos.
        let lo = pos.saturating_sub(4);
        for start in (lo..pos).rev() {
            let step = decode_utf8(&self.bytes[start..pos]);
            if start + step.width == pos && step.rune != Some(REPLACEMENT_CHAR) {
                return step.rune;
            }
            if self.bytes[start] & 0xC0 != 0x80 {
                break;
            }
        }
        Some(REPLACEMENT_CHAR)
    }
}

const INVALID: Step = Step {
    rune: Some(REPLACEMENT_CHAR),
    width: 1,
};

fn decode_utf8(b: &[u8]) -> Step {
    let Some(&b0) = b.first() else {
        return Step::EOF;
    };
    let (len, init, min) = match b0 {
        0x00..=0x7F => {
            return Step {
                rune: Some(u32::from(b0)),
                width: 1,
            };
        }
        0xC2..=0xDF => (2, u32::from(b0 & 0x1F), 0x80),
        0xE0..=0xEF => (3, u32::from(b0 & 0x0F), 0x800),
        0xF0..=0xF4 => (4, u32::from(b0 & 0x07), 0x10000),
        _ => return INVALID,
    };
    if b.len() < len {
        return INVALID;
    }
    let mut r = init;
    for &c in &b[1..len] {
        if c & 0xC0 != 0x80 {
            return INVALID;
        }
        r = r << 6 | u32::from(c & 0x3F);
    }
    if r < min || r > MAX_RUNE || (0xD800..=0xDFFF).contains(&r) {
        return INVALID;
    }
    Step {
        rune: Some(r),
        width: len,
    }
}

impl MachineInput for Utf8Input<'_> {
    fn step(&self, pos: usize) -> Step {
        match self.bytes.get(pos..) {
            Some(rest) => decode_utf8(rest),
            None => Step::EOF,
        }
    }

    fn can_check_prefix(&self) -> bool {
        true
    }

    fn index_of_prefix(&self, prefix: &LiteralPrefix, pos: usize) -> Option<usize> {
        let hay = self.bytes.get(pos..)?;
        memmem::find(hay, prefix.as_bytes()).map(|i| pos + i)
    }

    fn context(&self, pos: usize) -> EmptyFlags {
        let r1 = self.last_rune_before(pos);
        let r2 = self.step(pos).rune;
        empty_op_context(r1, r2)
    }

    fn end_pos(&self) -> usize {
        self.bytes.len()
    }
}

/// UTF-16 text. A lone surrogate decodes as itself.
#[derive(Debug, Clone, Copy)]
pub struct Utf16Input<'t> {
    units: &'t [u16],
}

fn is_high_surrogate(u: u16) -> bool {
    (0xD800..0xDC00).contains(&u)
}

fn is_low_surrogate(u: u16) -> bool {
    (0xDC00..0xE000).contains(&u)
}

fn combine(hi: u16, lo: u16) -> u32 {
    0x10000 + ((u32::from(hi) - 0xD800) << 10) + (u32::from(lo) - 0xDC00)
}

impl<'t> Utf16Input<'t> {
    pub fn new(units: &'t [u16], end: usize) -> Self {
        Self {
            units: &units[..end],
        }
    }

    fn last_rune_before(&self, pos: usize) -> Option<u32> {
        let lo = *self.units.get(pos.checked_sub(1)?)?;
        if is_low_surrogate(lo) && pos >= 2 {
            let hi = self.units[pos - 2];
            if is_high_surrogate(hi) {
                return Some(combine(hi, lo));
            }
        }
        Some(u32::from(lo))
    }
}

impl MachineInput for Utf16Input<'_> {
    fn step(&self, pos: usize) -> Step {
        let Some(&hi) = self.units.get(pos) else {
            return Step::EOF;
        };
        if is_high_surrogate(hi) {
            if let Some(&lo) = self.units.get(pos + 1) {
                if is_low_surrogate(lo) {
                    return Step {
                        rune: Some(combine(hi, lo)),
                        width: 2,
                    };
                }
            }
        }
        Step {
            rune: Some(u32::from(hi)),
            width: 1,
        }
    }

    fn can_check_prefix(&self) -> bool {
        true
    }

    fn index_of_prefix(&self, prefix: &LiteralPrefix, pos: usize) -> Option<usize> {
        let needle = prefix.as_utf16();
        let hay = self.units.get(pos..)?;
        if needle.is_empty() {
            return Some(pos);
        }
        hay.windows(needle.len())
            .position(|w| w == needle)
            .map(|i| pos + i)
    }

    fn context(&self, pos: usize) -> EmptyFlags {
        let r1 = self.last_rune_before(pos);
        let r2 = self.step(pos).rune;
        empty_op_context(r1, r2)
    }

    fn end_pos(&self) -> usize {
        self.units.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn steps<I: MachineInput>(input: &I) -> Vec<(Option<u32>, usize)> {
        let mut pos = 0;
        let mut out = Vec::new();
        loop {
            let s = input.step(pos);
            out.push((s.rune, s.width));
            if s.width == 0 {
                return out;
            }
            pos += s.width;
        }
    }

    #[test]
    fn utf8_decoding() {
        let text = "aé€😀";
        let input = Utf8Input::new(text.as_bytes(), text.len());
        assert_eq!(
            steps(&input),
            vec![
                (Some('a' as u32), 1),
                (Some('é' as u32), 2),
                (Some('€' as u32), 3),
                (Some('😀' as u32), 4),
                (None, 0),
            ]
        );
    }

    #[test]
    fn utf8_invalid_sequences() {
        let r = Some(REPLACEMENT_CHAR);
        // Lone continuation, overlong, surrogate, truncated, out of range.
        for bytes in [
            &[0x80][..],
            &[0xC0, 0x80],
            &[0xED, 0xA0, 0x80],
            &[0xE2, 0x82],
            &[0xF4, 0x90, 0x80, 0x80],
        ] {
            let input = Utf8Input::new(bytes, bytes.len());
            assert_eq!(input.step(0), Step { rune: r, width: 1 }, "{bytes:x?}");
        }
    }

    #[test]
    fn utf8_end_truncates() {
        let input = Utf8Input::new(b"abc", 2);
        assert_eq!(input.end_pos(), 2);
        assert_eq!(input.step(2), Step::EOF);
        assert_eq!(input.context(2), empty_op_context(Some('b' as u32), None));
    }

    #[test]
    fn utf8_context_looks_back_over_multibyte() {
        let text = "x€y";
        let input = Utf8Input::new(text.as_bytes(), text.len());
        assert_eq!(input.last_rune_before(4), Some('€' as u32));
        assert_eq!(input.last_rune_before(1), Some('x' as u32));
        assert_eq!(input.last_rune_before(0), None);
    }

    #[test]
    fn utf8_prefix_search() {
        let prefix = crate::thompson::compile(
            crate::syntax::parse("ab", crate::syntax::Flags::PERL).unwrap(),
        );
        let input = Utf8Input::new(b"xxabxab", 7);
        assert_eq!(input.index_of_prefix(prefix.prefix(), 0), Some(2));
        assert_eq!(input.index_of_prefix(prefix.prefix(), 3), Some(5));
        assert_eq!(input.index_of_prefix(prefix.prefix(), 6), None);
    }

    #[test]
    fn utf16_decoding() {
        let units: Vec<u16> = "a😀".encode_utf16().collect();
        let input = Utf16Input::new(&units, units.len());
        assert_eq!(
            steps(&input),
            vec![(Some('a' as u32), 1), (Some('😀' as u32), 2), (None, 0)]
        );
        assert_eq!(input.last_rune_before(3), Some('😀' as u32));

        // Unpaired surrogates come through as themselves.
        let lone = [0xD800, u16::from(b'a'), 0xDC00];
        let input = Utf16Input::new(&lone, 3);
        assert_eq!(
            steps(&input),
            vec![
                (Some(0xD800), 1),
                (Some('a' as u32), 1),
                (Some(0xDC00), 1),
                (None, 0)
            ]
        );
    }

    #[test]
    fn utf16_prefix_search() {
        let prefix = crate::thompson::compile(
            crate::syntax::parse("é1", crate::syntax::Flags::PERL).unwrap(),
        );
        let units: Vec<u16> = "aé1é1".encode_utf16().collect();
        let input = Utf16Input::new(&units, units.len());
        assert_eq!(input.index_of_prefix(prefix.prefix(), 0), Some(1));
        assert_eq!(input.index_of_prefix(prefix.prefix(), 2), Some(3));
    }

    #[test]
    fn contexts() {
        use EmptyFlags as E;
        assert_eq!(
            empty_op_context(None, None),
            E::BEGIN_TEXT | E::BEGIN_LINE | E::END_TEXT | E::END_LINE | E::NO_WORD_BOUNDARY
        );
        assert_eq!(
            empty_op_context(Some('\n' as u32), Some('a' as u32)),
            E::BEGIN_LINE | E::WORD_BOUNDARY
        );
        assert_eq!(
            empty_op_context(Some('a' as u32), Some('_' as u32)),
            E::NO_WORD_BOUNDARY
        );
        assert_eq!(
            empty_op_context(Some('é' as u32), Some('\n' as u32)),
            E::END_LINE | E::NO_WORD_BOUNDARY
        );
    }
}
