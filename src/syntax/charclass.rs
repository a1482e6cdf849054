//! A builder for character classes: sets of code points stored as a flat
//! list of inclusive `[lo, hi]` pairs.
//!
//! Most operations append ranges without normalizing. Call
//! [`CharClass::clean`] to sort, merge overlapping and abutting ranges, and
//! obtain the canonical form.

use std::fmt;

use super::Flags;
use super::char_group::CharGroup;
use super::unicode::{MAX_FOLD, MAX_RUNE, MIN_FOLD, RangeEntry, simple_fold};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CharClass {
    ranges: Vec<u32>,
}

impl CharClass {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wraps an existing pair list without copying it.
    pub fn from_ranges(ranges: Vec<u32>) -> Self {
        debug_assert!(ranges.len() % 2 == 0);
        Self { ranges }
    }

    pub fn into_ranges(self) -> Vec<u32> {
        self.ranges
    }

    pub fn ranges(&self) -> &[u32] {
        &self.ranges
    }

    pub fn is_empty(&self) -> bool {
        self.ranges.is_empty()
    }

    /// Sorts the ranges and merges those that overlap or abut.
    pub fn clean(&mut self) -> &mut Self {
        let len = self.ranges.len();
        if len < 4 {
            return self;
        }
        qsort_pairs(&mut self.ranges, 0, len as isize - 2);

        let r = &mut self.ranges;
        let mut w = 2;
        for i in (2..len).step_by(2) {
            let (lo, hi) = (r[i], r[i + 1]);
            if lo <= r[w - 1] + 1 {
                if hi > r[w - 1] {
                    r[w - 1] = hi;
                }
                continue;
            }
            r[w] = lo;
            r[w + 1] = hi;
            w += 2;
        }
        r.truncate(w);
        self
    }

    pub fn append_literal(&mut self, x: u32, flags: Flags) -> &mut Self {
        if flags.contains(Flags::FOLD_CASE) {
            self.append_folded_range(x, x)
        } else {
            self.append_range(x, x)
        }
    }

    /// Appends `lo..=hi`, extending one of the last two ranges instead when
    /// it overlaps or abuts.
    pub fn append_range(&mut self, lo: u32, hi: u32) -> &mut Self {
        let len = self.ranges.len();
        for i in [2, 4] {
            if len >= i {
                let rlo = self.ranges[len - i];
                let rhi = self.ranges[len - i + 1];
                if lo <= rhi + 1 && rlo <= hi + 1 {
                    if lo < rlo {
                        self.ranges[len - i] = lo;
                    }
                    if hi > rhi {
                        self.ranges[len - i + 1] = hi;
                    }
                    return self;
                }
            }
        }
        self.ranges.push(lo);
        self.ranges.push(hi);
        self
    }

    /// Appends `lo..=hi` together with every code point case-equivalent to
    /// a member of it.
    pub fn append_folded_range(&mut self, mut lo: u32, mut hi: u32) -> &mut Self {
        if lo <= MIN_FOLD && hi >= MAX_FOLD {
            // Folding can't add anything outside the range.
            return self.append_range(lo, hi);
        }
        if hi < MIN_FOLD || lo > MAX_FOLD {
            return self.append_range(lo, hi);
        }
        if lo < MIN_FOLD {
            self.append_range(lo, MIN_FOLD - 1);
            lo = MIN_FOLD;
        }
        if hi > MAX_FOLD {
            self.append_range(MAX_FOLD + 1, hi);
            hi = MAX_FOLD;
        }
        for c in lo..=hi {
            self.append_range(c, c);
            let mut f = simple_fold(c);
            while f != c {
                self.append_range(f, f);
                f = simple_fold(f);
            }
        }
        self
    }

    pub fn append_class(&mut self, x: &[u32]) -> &mut Self {
        for pair in x.chunks_exact(2) {
            self.append_range(pair[0], pair[1]);
        }
        self
    }

    pub fn append_folded_class(&mut self, x: &[u32]) -> &mut Self {
        for pair in x.chunks_exact(2) {
            self.append_folded_range(pair[0], pair[1]);
        }
        self
    }

    /// Appends the complement of `x`, which must be sorted.
    pub fn append_negated_class(&mut self, x: &[u32]) -> &mut Self {
        let mut next_lo = 0;
        for pair in x.chunks_exact(2) {
            let (lo, hi) = (pair[0], pair[1]);
            if next_lo < lo {
                self.append_range(next_lo, lo - 1);
            }
            next_lo = hi + 1;
        }
        if next_lo <= MAX_RUNE {
            self.append_range(next_lo, MAX_RUNE);
        }
        self
    }

    pub fn append_table(&mut self, table: &[RangeEntry]) -> &mut Self {
        for &RangeEntry { lo, hi, stride } in table {
            if stride == 1 {
                self.append_range(lo, hi);
                continue;
            }
            for c in (lo..=hi).step_by(stride as usize) {
                self.append_range(c, c);
            }
        }
        self
    }

    pub fn append_negated_table(&mut self, table: &[RangeEntry]) -> &mut Self {
        let mut next_lo = 0;
        for &RangeEntry { lo, hi, stride } in table {
            if stride == 1 {
                if next_lo < lo {
                    self.append_range(next_lo, lo - 1);
                }
                next_lo = hi + 1;
                continue;
            }
            for c in (lo..=hi).step_by(stride as usize) {
                if next_lo < c {
                    self.append_range(next_lo, c - 1);
                }
                next_lo = c + 1;
            }
        }
        if next_lo <= MAX_RUNE {
            self.append_range(next_lo, MAX_RUNE);
        }
        self
    }

    pub fn append_table_with_sign(&mut self, table: &[RangeEntry], sign: i8) -> &mut Self {
        if sign < 0 {
            self.append_negated_table(table)
        } else {
            self.append_table(table)
        }
    }

    /// Replaces the class with its complement. The class must be clean.
    pub fn negate(&mut self) -> &mut Self {
        let mut next_lo = 0;
        let mut w = 0;
        let r = &mut self.ranges;
        for i in (0..r.len()).step_by(2) {
            let (lo, hi) = (r[i], r[i + 1]);
            if next_lo < lo {
                r[w] = next_lo;
                r[w + 1] = lo - 1;
                w += 2;
            }
            next_lo = hi + 1;
        }
        r.truncate(w);
        if next_lo <= MAX_RUNE {
            r.push(next_lo);
            r.push(MAX_RUNE);
        }
        self
    }

    pub fn append_class_with_sign(&mut self, x: &[u32], sign: i8) -> &mut Self {
        if sign < 0 {
            self.append_negated_class(x)
        } else {
            self.append_class(x)
        }
    }

    pub fn append_group(&mut self, group: CharGroup, fold_case: bool) -> &mut Self {
        if fold_case {
            let mut folded = CharClass::new();
            folded.append_folded_class(group.class).clean();
            return self.append_class_with_sign(folded.ranges(), group.sign);
        }
        self.append_class_with_sign(group.class, group.sign)
    }
}

/// Orders pairs by `lo` ascending, then by `hi` descending.
fn cmp_pair(r: &[u32], i: usize, pivot_lo: u32, pivot_hi: u32) -> std::cmp::Ordering {
    r[i].cmp(&pivot_lo).then(pivot_hi.cmp(&r[i + 1]))
}

/// Quicksort over the pairs starting at even indices `left..=right`.
fn qsort_pairs(r: &mut [u32], left: isize, right: isize) {
    use std::cmp::Ordering::{Greater, Less};

    let pivot = (((left + right) / 2) & !1) as usize;
    let (pivot_lo, pivot_hi) = (r[pivot], r[pivot + 1]);
    let (mut i, mut j) = (left, right);

    while i <= j {
        while i < right && cmp_pair(r, i as usize, pivot_lo, pivot_hi) == Less {
            i += 2;
        }
        while j > left && cmp_pair(r, j as usize, pivot_lo, pivot_hi) == Greater {
            j -= 2;
        }
        if i <= j {
            if i != j {
                r.swap(i as usize, j as usize);
                r.swap(i as usize + 1, j as usize + 1);
            }
            i += 2;
            j -= 2;
        }
    }
    if left < j {
        qsort_pairs(r, left, j);
    }
    if i < right {
        qsort_pairs(r, i, right);
    }
}

/// Formats a pair list as `[0x41-0x5a 0x61]`.
pub(crate) fn ranges_to_string(r: &[u32]) -> String {
    let mut s = String::from("[");
    for (i, pair) in r.chunks_exact(2).enumerate() {
        if i > 0 {
            s.push(' ');
        }
        if pair[0] == pair[1] {
            s.push_str(&format!("{:#x}", pair[0]));
        } else {
            s.push_str(&format!("{:#x}-{:#x}", pair[0], pair[1]));
        }
    }
    s.push(']');
    s
}

impl fmt::Display for CharClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&ranges_to_string(&self.ranges))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::syntax::char_group::{perl_group, posix_group};

    fn class(r: &[u32]) -> CharClass {
        CharClass::from_ranges(r.to_vec())
    }

    #[test]
    fn clean_sorts_and_merges() {
        let mut cc = class(&[10, 20, 5, 8, 21, 25, 1, 3, 2, 4]);
        cc.clean();
        assert_eq!(cc.ranges(), &[1, 8, 10, 25]);

        let mut cc = class(&[30, 40, 10, 20, 10, 15]);
        cc.clean();
        assert_eq!(cc.ranges(), &[10, 20, 30, 40]);

        let mut cc = class(&[3, 3]);
        cc.clean();
        assert_eq!(cc.ranges(), &[3, 3]);
    }

    #[test]
    fn append_range_coalesces() {
        let mut cc = CharClass::new();
        cc.append_range('a' as u32, 'c' as u32)
            .append_range('d' as u32, 'f' as u32)
            .append_range('x' as u32, 'z' as u32)
            .append_range('g' as u32, 'g' as u32);
        assert_eq!(cc.ranges(), &[0x61, 0x67, 0x78, 0x7a]);
    }

    #[test]
    fn negate_round_trip() {
        let mut cc = class(&['a' as u32, 'z' as u32]);
        cc.negate();
        assert_eq!(cc.ranges(), &[0, 0x60, 0x7b, MAX_RUNE]);
        cc.negate();
        assert_eq!(cc.ranges(), &[0x61, 0x7a]);

        let mut all = class(&[0, MAX_RUNE]);
        all.negate();
        assert!(all.is_empty());
        all.negate();
        assert_eq!(all.ranges(), &[0, MAX_RUNE]);
    }

    #[test]
    fn folded_upper_case() {
        let mut cc = CharClass::new();
        cc.append_folded_range('A' as u32, 'Z' as u32).clean();
        // Includes KELVIN SIGN (via k) and LONG S (via s).
        assert_eq!(
            cc.ranges(),
            &[0x41, 0x5a, 0x61, 0x7a, 0x17f, 0x17f, 0x212a, 0x212a]
        );
    }

    #[test]
    fn folded_range_outside_fold_window() {
        let mut cc = CharClass::new();
        cc.append_folded_range('0' as u32, '9' as u32);
        assert_eq!(cc.ranges(), &[0x30, 0x39]);
        let mut cc = CharClass::new();
        cc.append_folded_range(0, MAX_RUNE);
        assert_eq!(cc.ranges(), &[0, MAX_RUNE]);
    }

    #[test]
    fn groups() {
        let mut cc = CharClass::new();
        cc.append_group(perl_group(r"\d").unwrap(), false);
        assert_eq!(cc.ranges(), &[0x30, 0x39]);

        let mut cc = CharClass::new();
        cc.append_group(perl_group(r"\D").unwrap(), false);
        assert_eq!(cc.ranges(), &[0, 0x2f, 0x3a, MAX_RUNE]);

        let mut cc = CharClass::new();
        cc.append_group(posix_group("[:upper:]").unwrap(), true).clean();
        assert_eq!(
            cc.ranges(),
            &[0x41, 0x5a, 0x61, 0x7a, 0x17f, 0x17f, 0x212a, 0x212a]
        );
    }

    #[test]
    fn tables() {
        let table = [RangeEntry::new(0x100, 0x105, 2), RangeEntry::new(0x200, 0x210, 1)];
        let mut cc = CharClass::new();
        cc.append_table(&table);
        assert_eq!(cc.ranges(), &[0x100, 0x100, 0x102, 0x102, 0x104, 0x104, 0x200, 0x210]);

        let mut cc = CharClass::new();
        cc.append_negated_table(&table);
        assert_eq!(
            cc.ranges(),
            &[0, 0xff, 0x101, 0x101, 0x103, 0x103, 0x105, 0x1ff, 0x211, MAX_RUNE]
        );
    }

    #[test]
    fn display() {
        let cc = class(&[0x41, 0x5a, 0x61, 0x61]);
        assert_eq!(cc.to_string(), "[0x41-0x5a 0x61]");
    }
}
