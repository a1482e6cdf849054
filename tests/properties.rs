use std::sync::Arc;
use std::thread;

use pikere::syntax::{CharClass, Flags, parse, simplify};
use pikere::thompson::compile;
use pikere::{Anchor, Builder, Input, Regex};
use pretty_assertions::assert_eq;

fn groups(re: &Regex, subject: &str) -> Option<Vec<Option<String>>> {
    let caps = re.find_captures(subject)?;
    Some(caps.iter().map(|g| g.map(|m| m.as_str().to_string())).collect())
}

#[test]
fn string_form_round_trips() {
    for pattern in [
        "a",
        "abc|abd",
        r"(?i)hello\s+world",
        r"(a)(?P<b>b+)?c*?",
        r"[^a-z0-9_]x{2,5}",
        r"(?m)^foo$",
        r"(?s).\b\B\A\z",
        r"[[:alpha:]]\pN\p{Greek}",
        r"a{3,}|b{0}",
        r"\x00\t\n\.",
    ] {
        let ast = parse(pattern, Flags::PERL).unwrap();
        let printed = ast.to_string();
        let reparsed = parse(&printed, Flags::PERL).unwrap();
        assert_eq!(reparsed.dump(), ast.dump(), "{pattern:?} printed as {printed:?}");
        assert_eq!(reparsed.to_string(), printed);
    }
}

#[test]
fn compilation_is_deterministic() {
    for pattern in [r"(\w+)@(\w+)\.com", "a|ab|abc", r"(?i)x{2,4}[[:digit:]]"] {
        let p1 = compile(parse(pattern, Flags::PERL).unwrap()).to_string();
        let p2 = compile(parse(pattern, Flags::PERL).unwrap()).to_string();
        assert_eq!(p1, p2);
    }
}

#[test]
fn matching_is_deterministic() {
    let re = Regex::new(r"(a+)(b*)|c").unwrap();
    let expected = groups(&re, "xcaab");
    for _ in 0..10 {
        assert_eq!(groups(&re, "xcaab"), expected);
    }
}

#[test]
fn first_match_versus_longest_match() {
    let re = Regex::new("a|ab").unwrap();
    assert_eq!(re.find("ab").map(|m| m.as_str()), Some("a"));

    let re = Regex::compile_posix("a|ab").unwrap();
    assert_eq!(re.find("ab").map(|m| m.as_str()), Some("ab"));

    let re = Builder::new("a|ab").longest(true).build().unwrap();
    assert_eq!(re.find("ab").map(|m| m.as_str()), Some("ab"));

    // Leftmost still beats longest.
    let re = Regex::compile_posix("b+|ab").unwrap();
    assert_eq!(re.find("xabbb").map(|m| m.as_str()), Some("ab"));
}

#[test]
fn anchor_both() {
    let re = Regex::new("abc").unwrap();
    let mut slots = [None; 2];
    assert!(!re.exec(Input::new("abcx").anchor(Anchor::AnchorBoth), &mut slots));
    assert!(re.exec(Input::new("abc").anchor(Anchor::AnchorBoth), &mut slots));
    assert_eq!(slots, [Some(0), Some(3)]);

    let re = Regex::new("^abc$").unwrap();
    assert!(re.is_match("abc"));
    assert!(!re.is_match("abcx"));
    assert!(!re.is_match("xabc"));

    // The end of the span counts as the end of the text.
    let re = Regex::new("abc").unwrap();
    assert!(re.exec(
        Input::new("abcx").span(0..3).anchor(Anchor::AnchorBoth),
        &mut slots
    ));
}

#[test]
fn optional_group_does_not_participate() {
    let re = Regex::new("(a)(b)?").unwrap();
    assert_eq!(
        groups(&re, "ac"),
        Some(vec![Some("a".to_string()), Some("a".to_string()), None])
    );
    assert_eq!(
        groups(&re, "ab"),
        Some(vec![
            Some("ab".to_string()),
            Some("a".to_string()),
            Some("b".to_string())
        ])
    );
}

#[test]
fn counted_repetition_bounds() {
    let re = Regex::new("^a{2,3}$").unwrap();
    assert!(!re.is_match("a"));
    assert!(re.is_match("aa"));
    assert!(re.is_match("aaa"));
    assert!(!re.is_match("aaaa"));

    let re = Regex::new("a{2,3}").unwrap();
    let found: Vec<_> = re.find_iter("aaaaaaa").map(|m| m.as_str()).collect();
    assert_eq!(found, vec!["aaa", "aaa"]);
}

#[test]
fn char_class_normal_form() {
    let mut cc = CharClass::from_ranges(vec!['d' as u32, 'f' as u32, 'a' as u32, 'e' as u32]);
    cc.clean();
    assert_eq!(cc.ranges(), &['a' as u32, 'f' as u32]);

    let mut cc = CharClass::new();
    cc.append_range('b' as u32, 'y' as u32).negate();
    assert_eq!(cc.ranges(), &[0, 'a' as u32, 'z' as u32, 0x10FFFF]);
    cc.negate();
    assert_eq!(cc.ranges(), &['b' as u32, 'y' as u32]);
}

#[test]
fn folded_upper_case_range() {
    let mut cc = CharClass::new();
    cc.append_folded_range('A' as u32, 'Z' as u32).clean();
    let ranges = cc.ranges();
    let contains = |r: u32| ranges.chunks(2).any(|p| p[0] <= r && r <= p[1]);
    for c in ('a'..='z').chain('A'..='Z') {
        assert!(contains(c as u32), "{c}");
    }
    // KELVIN SIGN and LONG S fold to k and s.
    assert!(contains(0x212A));
    assert!(contains(0x017F));
    assert!(!contains('0' as u32));
}

#[test]
fn replacement() {
    let re = Regex::new("a+").unwrap();
    assert_eq!(re.replace_all("baaab", "X"), "bXb");
    let re = Regex::new("a*").unwrap();
    assert_eq!(re.replace_all("baaab", "X"), "XbXbX");
}

#[test]
fn utf16_text() {
    let re = Regex::new(r"(é+)$").unwrap();
    let units: Vec<u16> = "x😀éé".encode_utf16().collect();
    let mut slots = [None; 4];
    assert!(re.exec(&units[..], &mut slots));
    assert_eq!(slots, [Some(3), Some(5), Some(3), Some(5)]);

    let re = Regex::new("😀").unwrap();
    assert!(re.exec(&units[..], &mut slots[..2]));
    assert_eq!(&slots[..2], &[Some(1), Some(3)]);
}

#[test]
fn simplified_tree_compiles_to_same_program() {
    let ast = parse("(a{2,3})+", Flags::PERL).unwrap();
    let direct = compile(ast.clone()).to_string();
    let twice = compile(simplify(ast)).to_string();
    assert_eq!(direct, twice);
}

#[test]
fn shared_between_threads() {
    let re = Arc::new(Regex::new(r"(\d+)-(\d+)").unwrap());
    let handles: Vec<_> = (0..4)
        .map(|i| {
            let re = Arc::clone(&re);
            thread::spawn(move || {
                let subject = format!("n{i} {i}{i}-{i}");
                for _ in 0..50 {
                    let caps = re.find_captures(&subject).unwrap();
                    assert_eq!(caps.get(2).unwrap().as_str(), i.to_string());
                }
                re.reset();
            })
        })
        .collect();
    for h in handles {
        h.join().unwrap();
    }
    assert!(re.is_match("1-2"));
}

#[test]
fn syntax_errors_are_reported() {
    let err = Regex::new("a(b").unwrap_err();
    assert_eq!(err.to_string(), "error parsing regexp: missing closing ): `a(b`");
    assert!(Regex::new(r"x\").is_err());
    assert!(Regex::compile_posix(r"\d").is_err());
}
