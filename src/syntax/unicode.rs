//! Unicode lookups: simple case folding, category and script tables, and
//! printability.
//!
//! The tables themselves come from `regex-syntax`, which already ships the
//! Unicode character database. This module only reshapes them into the
//! forms the parser and the character class builder consume.

use lazy_static::lazy_static;
use regex_syntax::hir::{Class, ClassUnicode, ClassUnicodeRange, HirKind};

/// The highest valid code point.
pub const MAX_RUNE: u32 = 0x10FFFF;

/// The highest ASCII code point.
pub const MAX_ASCII: u32 = 0x7F;

/// The smallest code point that takes part in a non-trivial fold orbit.
pub const MIN_FOLD: u32 = 0x0041;

/// The largest code point that takes part in a non-trivial fold orbit.
pub const MAX_FOLD: u32 = 0x1044F;

/// Substituted for undecodable input.
pub const REPLACEMENT_CHAR: u32 = 0xFFFD;

/// One row of a stride table: every `stride`-th code point in `lo..=hi`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RangeEntry {
    pub lo: u32,
    pub hi: u32,
    pub stride: u32,
}

impl RangeEntry {
    pub const fn new(lo: u32, hi: u32, stride: u32) -> Self {
        Self { lo, hi, stride }
    }
}

/// The ranges of a named category or script, plus the ranges of all code
/// points that fold to a member of it.
#[derive(Debug, Clone)]
pub struct UnicodeTable {
    pub table: Vec<RangeEntry>,
    pub fold: Vec<RangeEntry>,
}

lazy_static! {
    /// `(c, next)` pairs sorted by `c`, where `next` is the successor of `c`
    /// in its simple case-fold orbit. Code points folding only to themselves
    /// are absent.
    static ref FOLD_ORBITS: Vec<(u32, u32)> = build_fold_orbits();

    /// Ranges of the printable code points outside Latin-1.
    static ref PRINTABLE: Vec<(u32, u32)> =
        class_ranges(r"[\p{L}\p{M}\p{N}\p{P}\p{S}]").unwrap_or_default();
}

fn build_fold_orbits() -> Vec<(u32, u32)> {
    let mut orbits = Vec::new();
    for c in MIN_FOLD..=MAX_FOLD {
        let Some(ch) = char::from_u32(c) else {
            continue;
        };
        let mut class = ClassUnicode::new([ClassUnicodeRange::new(ch, ch)]);
        class.case_fold_simple();
        let members: Vec<u32> = class
            .iter()
            .flat_map(|r| r.start() as u32..=r.end() as u32)
            .collect();
        if members.len() < 2 {
            continue;
        }
        // Members are sorted, so the successor is the next larger one,
        // wrapping around to the smallest.
        let next = members
            .iter()
            .copied()
            .find(|&m| m > c)
            .unwrap_or(members[0]);
        orbits.push((c, next));
    }
    orbits
}

/// Returns the smallest code point greater than `r` that is equivalent to
/// it under simple case folding, or the smallest equivalent code point if
/// there is none greater. Returns `r` itself when it folds to nothing else.
pub fn simple_fold(r: u32) -> u32 {
    match FOLD_ORBITS.binary_search_by_key(&r, |&(c, _)| c) {
        Ok(i) => FOLD_ORBITS[i].1,
        Err(_) => r,
    }
}

/// Returns the smallest member of the fold orbit of `r`.
pub fn min_fold_rune(r: u32) -> u32 {
    if !(MIN_FOLD..=MAX_FOLD).contains(&r) {
        return r;
    }
    let mut min = r;
    let mut f = simple_fold(r);
    while f != r {
        min = min.min(f);
        f = simple_fold(f);
    }
    min
}

/// Whether `r` is a letter, mark, number, punctuation, symbol or the ASCII
/// space.
pub fn is_print(r: u32) -> bool {
    if r <= 0xFF {
        return (0x20..0x7F).contains(&r) || (r >= 0xA1 && r != 0xAD);
    }
    PRINTABLE
        .binary_search_by(|&(lo, hi)| {
            if hi < r {
                std::cmp::Ordering::Less
            } else if lo > r {
                std::cmp::Ordering::Greater
            } else {
                std::cmp::Ordering::Equal
            }
        })
        .is_ok()
}

/// General category names accepted by `\p{..}`.
const CATEGORIES: &[&str] = &[
    "C", "Cc", "Cf", "Co", "Cs", "L", "Ll", "Lm", "Lo", "Lt", "Lu", "M", "Mc", "Me", "Mn", "N",
    "Nd", "Nl", "No", "P", "Pc", "Pd", "Pe", "Pf", "Pi", "Po", "Ps", "S", "Sc", "Sk", "Sm", "So",
    "Z", "Zl", "Zp", "Zs",
];

/// Script names accepted by `\p{..}`, sorted.
const SCRIPTS: &[&str] = &[
    "Adlam", "Ahom", "Anatolian_Hieroglyphs", "Arabic", "Armenian", "Avestan",
    "Balinese", "Bamum", "Bassa_Vah", "Batak", "Bengali", "Bhaiksuki",
    "Bopomofo", "Brahmi", "Braille", "Buginese", "Buhid", "Canadian_Aboriginal",
    "Carian", "Caucasian_Albanian", "Chakma", "Cham", "Cherokee", "Chorasmian",
    "Common", "Coptic", "Cuneiform", "Cypriot", "Cypro_Minoan", "Cyrillic",
    "Deseret", "Devanagari", "Dives_Akuru", "Dogra", "Duployan",
    "Egyptian_Hieroglyphs", "Elbasan", "Elymaic", "Ethiopic", "Garay",
    "Georgian", "Glagolitic", "Gothic", "Grantha", "Greek", "Gujarati",
    "Gunjala_Gondi", "Gurmukhi", "Gurung_Khema", "Han", "Hangul",
    "Hanifi_Rohingya", "Hanunoo", "Hatran", "Hebrew", "Hiragana",
    "Imperial_Aramaic", "Inherited", "Inscriptional_Pahlavi",
    "Inscriptional_Parthian", "Javanese", "Kaithi", "Kannada", "Katakana",
    "Kawi", "Kayah_Li", "Kharoshthi", "Khitan_Small_Script", "Khmer", "Khojki",
    "Khudawadi", "Kirat_Rai", "Lao", "Latin", "Lepcha", "Limbu", "Linear_A",
    "Linear_B", "Lisu", "Lycian", "Lydian", "Mahajani", "Makasar", "Malayalam",
    "Mandaic", "Manichaean", "Marchen", "Masaram_Gondi", "Medefaidrin",
    "Meetei_Mayek", "Mende_Kikakui", "Meroitic_Cursive", "Meroitic_Hieroglyphs",
    "Miao", "Modi", "Mongolian", "Mro", "Multani", "Myanmar", "Nabataean",
    "Nag_Mundari", "Nandinagari", "New_Tai_Lue", "Newa", "Nko", "Nushu",
    "Nyiakeng_Puachue_Hmong", "Ogham", "Ol_Chiki", "Ol_Onal", "Old_Hungarian",
    "Old_Italic", "Old_North_Arabian", "Old_Permic", "Old_Persian",
    "Old_Sogdian", "Old_South_Arabian", "Old_Turkic", "Old_Uyghur", "Oriya",
    "Osage", "Osmanya", "Pahawh_Hmong", "Palmyrene", "Pau_Cin_Hau", "Phags_Pa",
    "Phoenician", "Psalter_Pahlavi", "Rejang", "Runic", "Samaritan",
    "Saurashtra", "Sharada", "Shavian", "Siddham", "SignWriting", "Sinhala",
    "Sogdian", "Sora_Sompeng", "Soyombo", "Sundanese", "Sunuwar",
    "Syloti_Nagri", "Syriac", "Tagalog", "Tagbanwa", "Tai_Le", "Tai_Tham",
    "Tai_Viet", "Takri", "Tamil", "Tangsa", "Tangut", "Telugu", "Thaana",
    "Thai", "Tibetan", "Tifinagh", "Tirhuta", "Todhri", "Toto", "Tulu_Tigalari",
    "Ugaritic", "Vai", "Vithkuqi", "Wancho", "Warang_Citi", "Yezidi", "Yi",
    "Zanabazar_Square",
];

/// Looks up a general category or script by name, e.g. `Lu` or `Greek`.
/// Names are matched exactly: `greek`, `Letter` and binary properties such
/// as `Alphabetic` are rejected.
pub fn unicode_table(name: &str) -> Option<UnicodeTable> {
    let known = name == "Any"
        || CATEGORIES.contains(&name)
        || SCRIPTS.binary_search(&name).is_ok();
    if !known {
        return None;
    }
    if name == "Cs" {
        // Surrogates are not chars, so regex-syntax has no table for them.
        let surrogates = vec![RangeEntry::new(0xD800, 0xDFFF, 1)];
        return Some(UnicodeTable {
            table: surrogates.clone(),
            fold: surrogates,
        });
    }
    let class = parse_class(&format!(r"\p{{{name}}}"))?;
    let mut folded = class.clone();
    folded.case_fold_simple();
    Some(UnicodeTable {
        table: to_entries(&class),
        fold: to_entries(&folded),
    })
}

fn parse_class(pattern: &str) -> Option<ClassUnicode> {
    let hir = regex_syntax::ParserBuilder::new()
        .unicode(true)
        .build()
        .parse(pattern)
        .ok()?;
    match hir.kind() {
        HirKind::Class(Class::Unicode(class)) => Some(class.clone()),
        _ => None,
    }
}

fn class_ranges(pattern: &str) -> Option<Vec<(u32, u32)>> {
    let class = parse_class(pattern)?;
    Some(
        class
            .iter()
            .map(|r| (r.start() as u32, r.end() as u32))
            .collect(),
    )
}

fn to_entries(class: &ClassUnicode) -> Vec<RangeEntry> {
    class
        .iter()
        .map(|r| RangeEntry::new(r.start() as u32, r.end() as u32, 1))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fold_orbits() {
        assert_eq!(simple_fold('A' as u32), 'a' as u32);
        assert_eq!(simple_fold('a' as u32), 'A' as u32);
        // K -> k -> KELVIN SIGN -> K
        assert_eq!(simple_fold('K' as u32), 'k' as u32);
        assert_eq!(simple_fold('k' as u32), 0x212A);
        assert_eq!(simple_fold(0x212A), 'K' as u32);
        assert_eq!(simple_fold('1' as u32), '1' as u32);
        assert_eq!(simple_fold(MAX_RUNE), MAX_RUNE);
    }

    #[test]
    fn min_fold() {
        assert_eq!(min_fold_rune('k' as u32), 'K' as u32);
        assert_eq!(min_fold_rune(0x212A), 'K' as u32);
        assert_eq!(min_fold_rune('z' as u32), 'Z' as u32);
        assert_eq!(min_fold_rune('#' as u32), '#' as u32);
    }

    #[test]
    fn tables() {
        let greek = unicode_table("Greek").unwrap();
        assert!(greek.table.iter().any(|e| e.lo <= 0x3B1 && 0x3B1 <= e.hi));
        let upper = unicode_table("Lu").unwrap();
        assert!(upper.table.iter().any(|e| e.lo <= 'A' as u32 && 'A' as u32 <= e.hi));
        assert!(!upper.table.iter().any(|e| e.lo <= 'a' as u32 && 'a' as u32 <= e.hi));
        assert!(upper.fold.iter().any(|e| e.lo <= 'a' as u32 && 'a' as u32 <= e.hi));
        assert!(unicode_table("NotAScript").is_none());
        assert!(unicode_table("L}|x").is_none());
        assert!(unicode_table("Any").is_some());
        assert!(unicode_table("Old_Italic").is_some());
        let surrogates = unicode_table("Cs").unwrap();
        assert_eq!(surrogates.table, vec![RangeEntry::new(0xD800, 0xDFFF, 1)]);
        for name in ["Lower", "Alphabetic", "greek", "Letter", "lu", "Cn"] {
            assert!(unicode_table(name).is_none(), "{name}");
        }
    }

    #[test]
    fn script_names_are_sorted() {
        assert!(SCRIPTS.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn printable() {
        assert!(is_print('a' as u32));
        assert!(is_print(' ' as u32));
        assert!(!is_print('\n' as u32));
        assert!(!is_print(0x7F));
        assert!(is_print(0x3B1));
        assert!(!is_print(0xD800));
    }
}
