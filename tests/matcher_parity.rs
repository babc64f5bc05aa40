use csearch_rs::Regexp;

/// The byte matcher must agree with the regex crate on whether a
/// pattern matches, across literals, classes, repetition, alternation
/// and anchors, over both ASCII and multi-byte UTF-8 haystacks.
#[test]
fn agrees_with_regex_crate() {
    let patterns = [
        "abc",
        "a.c",
        "a*bc",
        "a+bc",
        "ab?c",
        "(ab|cd)ef",
        "[a-m]+[n-z]",
        "[^x]y",
        "x{2,3}y",
        "x{3}",
        "x{2,}y",
        "(?i)hello",
        "(?i)[a-f]{3}",
        "^start",
        "end$",
        "(?m)^mid$",
        "he(l|r)lo?",
        r"\d{2,4}-\d{2}",
        r"\w+@\w+",
        r"\p{L}+",
        "f.?o",
        "a(bc)*d",
        "",
    ];
    let haystacks = [
        "",
        "abc",
        "xxabcyy",
        "aaabc",
        "bc",
        "abef",
        "cdef",
        "mnop",
        "xy",
        "zy",
        "xxxy",
        "xxy",
        "xy123-45xy",
        "user@host",
        "HELLO there",
        "start of line",
        "not the start",
        "the end",
        "a\nmid\nb",
        "hello",
        "herlo",
        "héllo wörld",
        "日本語のテキスト",
        "abcbcd",
        "ad",
        "fo",
        "ffo",
    ];

    for pattern in patterns {
        let mut mine = Regexp::compile(pattern).unwrap();
        let oracle = regex::RegexBuilder::new(pattern).build().unwrap();
        for hay in haystacks {
            let got = mine.matches_str(hay, true, true).is_some();
            let want = oracle.is_match(hay);
            assert_eq!(
                got, want,
                "pattern {:?} on {:?}: mine={}, regex={}",
                pattern, hay, got, want
            );
        }
    }
}

/// Earliest-end semantics: the reported offset is the end of the
/// leftmost-shortest match, which is what line-oriented printing needs.
#[test]
fn earliest_end_offsets() {
    let cases = [
        ("abc", "abcabc", Some(3)),
        ("a+", "caaat", Some(2)),
        ("a*", "bbb", Some(0)),
        ("b$", "ab", Some(2)),
        ("^", "anything", Some(0)),
        ("nope", "aaa", None),
    ];
    for (pattern, hay, want) in cases {
        let mut re = Regexp::compile(pattern).unwrap();
        assert_eq!(
            re.matches_str(hay, true, true),
            want,
            "pattern {:?} on {:?}",
            pattern,
            hay
        );
    }
}

/// Buffer boundaries are line boundaries, but only text boundaries
/// when the caller says so.
#[test]
fn text_boundary_flags() {
    let mut re = Regexp::compile(r"\Aabc").unwrap();
    assert_eq!(re.matches_str("abc", true, true), Some(3));
    assert_eq!(re.matches_str("abc", false, true), None);

    let mut re = Regexp::compile(r"abc\z").unwrap();
    assert_eq!(re.matches_str("abc", true, true), Some(3));
    assert_eq!(re.matches_str("abc", true, false), None);

    // ^ under (?m) is a line anchor: satisfied at a buffer start even
    // mid-text, the way the line-at-a-time scanner feeds it.
    let mut re = Regexp::compile("(?m)^abc").unwrap();
    assert_eq!(re.matches_str("abc", false, false), Some(3));
}
