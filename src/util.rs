/*!
This module contains the types shared by the matching API: the subject text,
search parameters, and match results.
*/

use std::ops::Range;
use std::sync::Arc;

/// The subject of a search, in one of the two supported encodings.
/// Offsets are counted in bytes for UTF-8 and in code units for UTF-16.
#[derive(Debug, Clone, Copy)]
pub enum Text<'s> {
    Utf8(&'s [u8]),
    Utf16(&'s [u16]),
}

impl Text<'_> {
    pub fn len(&self) -> usize {
        match self {
            Text::Utf8(bytes) => bytes.len(),
            Text::Utf16(units) => units.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<'s> From<&'s str> for Text<'s> {
    fn from(value: &'s str) -> Self {
        Text::Utf8(value.as_bytes())
    }
}

impl<'s> From<&'s [u8]> for Text<'s> {
    fn from(value: &'s [u8]) -> Self {
        Text::Utf8(value)
    }
}

impl<'s> From<&'s [u16]> for Text<'s> {
    fn from(value: &'s [u16]) -> Self {
        Text::Utf16(value)
    }
}

/// How a search is tied to the bounds of its span.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Anchor {
    /// The match may start anywhere.
    #[default]
    Unanchored,
    /// The match must start at the beginning of the input.
    AnchorStart,
    /// The match must cover the input from its beginning to the end of
    /// the span.
    AnchorBoth,
}

/// Defines the input parameter to [`crate::Regex::exec`].
/// Since all values other than the text have a default value it's always
/// sufficient to only provide the text, but for cases where we need more
/// control this type comes handy.
#[derive(Debug, Clone)]
pub struct Input<'s> {
    pub text: Text<'s>,
    /// Search within that span. Text after `span.to` is never looked at;
    /// text before `span.from` is only used for `^` and `\b`.
    /// Default: the whole text.
    pub span: Span,
    /// Default: [`Anchor::Unanchored`]
    pub anchor: Anchor,
}

impl<'s> Input<'s> {
    pub fn new(text: impl Into<Text<'s>>) -> Self {
        let text = text.into();
        Self {
            span: (0..text.len()).into(),
            text,
            anchor: Anchor::Unanchored,
        }
    }

    pub fn span(mut self, span: impl Into<Span>) -> Self {
        self.span = span.into();
        self
    }

    pub fn anchor(mut self, anchor: Anchor) -> Self {
        self.anchor = anchor;
        self
    }
}

impl<'s> From<&'s str> for Input<'s> {
    fn from(subject: &'s str) -> Self {
        Self::new(subject)
    }
}

impl<'s> From<&'s [u8]> for Input<'s> {
    fn from(subject: &'s [u8]) -> Self {
        Self::new(subject)
    }
}

impl<'s> From<&'s [u16]> for Input<'s> {
    fn from(subject: &'s [u16]) -> Self {
        Self::new(subject)
    }
}

/// A span in the text. Similar to [`std::ops::Range`], but implements Copy.
#[derive(Copy, Debug, Clone, PartialEq, Eq)]
pub struct Span {
    pub from: usize,
    pub to: usize,
}

impl Span {
    pub fn empty(&self) -> bool {
        self.from == self.to
    }
}

impl From<Range<usize>> for Span {
    fn from(value: Range<usize>) -> Self {
        Self {
            from: value.start,
            to: value.end,
        }
    }
}

impl From<Span> for Range<usize> {
    fn from(val: Span) -> Self {
        val.from..val.to
    }
}

/// Builds the span stored in a pair of capture slots, if the group took
/// part in the match.
pub(crate) fn slot_span(slots: &[Option<usize>], group: usize) -> Option<Span> {
    match (slots.get(2 * group)?, slots.get(2 * group + 1)?) {
        (Some(from), Some(to)) => Some(Span {
            from: *from,
            to: *to,
        }),
        _ => None,
    }
}

/// Successful non-capturing match. Contains only the bounds of the
/// overall match.
#[derive(Copy, Debug, Clone)]
pub struct Match<'s> {
    pub subject: &'s str,
    pub span: Span,
}

impl<'s> Match<'s> {
    pub fn new(subject: &'s str, span: impl Into<Span>) -> Self {
        let span = span.into();
        Self { subject, span }
    }

    pub fn start(&self) -> usize {
        self.span.from
    }

    pub fn end(&self) -> usize {
        self.span.to
    }

    pub fn as_str(&self) -> &'s str {
        &self.subject[self.span.from..self.span.to]
    }
}

/// Successful capturing match. Contains the bounds (if any) of all capture
/// groups defined in the pattern, including the implicit group 0.
#[derive(Debug, Clone)]
pub struct Captures<'s> {
    subject: &'s str,
    /// Bounds of group 0.
    span: Span,
    slots: Box<[Option<usize>]>,
    names: Arc<[Option<String>]>,
}

impl<'s> Captures<'s> {
    /// Returns `None` unless `slots` holds the bounds of group 0.
    pub(crate) fn new(
        subject: &'s str,
        slots: Box<[Option<usize>]>,
        names: Arc<[Option<String>]>,
    ) -> Option<Self> {
        let span = slot_span(&slots, 0)?;
        Some(Self {
            subject,
            span,
            slots,
            names,
        })
    }

    pub fn get(&self, group_index: usize) -> Option<Match<'s>> {
        let span = slot_span(&self.slots, group_index)?;
        Some(Match {
            subject: self.subject,
            span,
        })
    }

    /// The group named `name`, if it exists and took part in the match.
    pub fn name(&self, name: &str) -> Option<Match<'s>> {
        let index = self
            .names
            .iter()
            .position(|n| n.as_deref() == Some(name))?;
        self.get(index)
    }

    pub fn group0(&self) -> Match<'s> {
        Match {
            subject: self.subject,
            span: self.span,
        }
    }

    pub fn group_len(&self) -> usize {
        self.slots.len() / 2
    }

    /// Iterates over every group, in order, including the ones that did
    /// not take part in the match.
    pub fn iter(&self) -> impl Iterator<Item = Option<Match<'s>>> + '_ {
        (0..self.group_len()).map(|i| self.get(i))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn input_defaults() {
        let input = Input::from("abc");
        assert_eq!(input.span, Span { from: 0, to: 3 });
        assert_eq!(input.anchor, Anchor::Unanchored);

        let units = [0x61u16, 0x62];
        let input = Input::new(&units[..]).span(1..2).anchor(Anchor::AnchorBoth);
        assert_eq!(input.text.len(), 2);
        assert_eq!(input.span, Span { from: 1, to: 2 });
        assert_eq!(input.anchor, Anchor::AnchorBoth);
    }

    #[test]
    fn captures_by_index_and_name() {
        let names: Arc<[Option<String>]> = vec![None, Some("x".to_string()), None].into();
        let slots = vec![Some(0), Some(3), Some(1), Some(2), None, None].into_boxed_slice();
        let caps = Captures::new("abc", slots, Arc::clone(&names)).unwrap();
        assert_eq!(caps.group_len(), 3);
        assert_eq!(caps.group0().as_str(), "abc");
        assert_eq!(caps.name("x").map(|m| m.as_str()), Some("b"));
        assert!(caps.name("y").is_none());
        assert!(caps.get(2).is_none());
        assert!(caps.get(3).is_none());
        let groups: Vec<_> = caps.iter().map(|m| m.map(|m| m.as_str())).collect();
        assert_eq!(groups, vec![Some("abc"), Some("b"), None]);

        // Without group 0 there is no match to report.
        let slots = vec![None, None, Some(1), Some(2)].into_boxed_slice();
        assert!(Captures::new("abc", slots, names).is_none());
    }
}
