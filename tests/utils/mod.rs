use pikere::Regex;
use regex as rust_regex;

fn spans<'s>(groups: impl Iterator<Item = Option<pikere::Match<'s>>>) -> Vec<Option<&'s str>> {
    groups.map(|g| g.map(|m| m.as_str())).collect()
}

/// Match a pattern against a given input with both our engine and
/// rust-regex, and compare the result of both compilation and execution.
///
/// Only meaningful where the two syntaxes agree: ASCII inputs, and no
/// constructs that only one side supports.
pub fn check_against_rust(pattern: &str, input: &str) {
    // Reference engine
    let rust = rust_regex::Regex::new(pattern);
    let ours = Regex::new(pattern);

    match (rust, ours) {
        (Ok(rust_re), Ok(re)) => {
            // find
            let rust_match = rust_re.find(input).map(|m| (m.start(), m.end()));
            let my_match = re.find(input).map(|m| (m.start(), m.end()));
            assert_eq!(
                my_match, rust_match,
                "Mismatch for pattern {:?} input {:?} (find)",
                pattern, input
            );

            // is_match
            assert_eq!(
                re.is_match(input),
                rust_match.is_some(),
                "Mismatch for pattern {:?} input {:?} (is_match)",
                pattern,
                input
            );

            // find_iter
            let rust_all: Vec<_> = rust_re
                .find_iter(input)
                .map(|m| (m.start(), m.end()))
                .collect();
            let my_all: Vec<_> = re
                .find_iter(input)
                .map(|m| (m.start(), m.end()))
                .collect();
            assert_eq!(
                my_all, rust_all,
                "Mismatch for pattern {:?} input {:?} (find_iter)",
                pattern, input
            );

            // find_captures
            let rust_groups = rust_re.captures(input).map(|caps| {
                (0..caps.len())
                    .map(|i| caps.get(i).map(|m| m.as_str()))
                    .collect::<Vec<_>>()
            });
            let my_groups = re.find_captures(input).map(|caps| spans(caps.iter()));
            assert_eq!(
                my_groups, rust_groups,
                "Mismatch for pattern {:?} input {:?} (find_captures)",
                pattern, input
            );

            // captures_iter
            let rust_all_caps: Vec<Vec<Option<&str>>> = rust_re
                .captures_iter(input)
                .map(|caps| {
                    (0..caps.len())
                        .map(|i| caps.get(i).map(|m| m.as_str()))
                        .collect()
                })
                .collect();
            let my_all_caps: Vec<Vec<Option<&str>>> =
                re.captures_iter(input).map(|caps| spans(caps.iter())).collect();
            assert_eq!(
                my_all_caps, rust_all_caps,
                "Mismatch for pattern {:?} input {:?} (captures_iter)",
                pattern, input
            );
        }
        (Err(_), Err(_)) => {} // Both failed, that's good
        (Ok(_), Err(e)) => panic!("We failed to compile {pattern:?} but rust-regex succeeded: {e}"),
        (Err(e), Ok(_)) => {
            panic!("rust-regex failed to compile {pattern:?} but we succeeded: {e}")
        }
    }
}
