//! Pure DSL markup primitives: optional parts, unsorted parts, tildes,
//! escapes and headword normalization.
//!
//! These functions are total and perform no I/O. Their output defines the
//! index contents, so their behavior is fixed by the on-disk format.

/// Whether `ch` counts as whitespace for DSL parsing.
///
/// Only space and tab qualify. Some dictionaries deliberately use a
/// non-breaking space (U+00A0) to make a headword begin with a visible
/// space, so nbsp is not DSL whitespace.
pub fn is_dsl_ws(ch: char) -> bool {
    ch == ' ' || ch == '\t'
}

/// Trim leading and trailing DSL whitespace (space and tab only).
pub fn trim_dsl_ws(s: &str) -> &str {
    s.trim_matches(|c| is_dsl_ws(c))
}

/// Expand every unescaped `(…)` optional part into its two variants.
///
/// Returns the cross product in with-first, depth-first order: the first
/// alternative retains every group, the last drops them all. A string with
/// `k` top-level groups yields exactly `2^k` alternatives. An unmatched
/// `(` is treated as a literal character.
pub fn expand_optional_parts(s: &str) -> Vec<String> {
    let chars: Vec<char> = s.chars().collect();
    let mut out = Vec::new();
    expand_into(&chars, &mut out);
    out
}

fn expand_into(chars: &[char], out: &mut Vec<String>) {
    let mut i = 0;
    while i < chars.len() {
        match chars[i] {
            '\\' => i += 2,
            '(' => {
                if let Some(close) = find_matching_paren(chars, i) {
                    let head = &chars[..i];
                    let inner = &chars[i + 1..close];
                    let tail = &chars[close + 1..];

                    // With-variant first: the group's content is kept and
                    // may itself contain further groups.
                    let mut with: Vec<char> = Vec::with_capacity(chars.len());
                    with.extend_from_slice(head);
                    with.extend_from_slice(inner);
                    with.extend_from_slice(tail);
                    expand_into(&with, out);

                    let mut without: Vec<char> = Vec::with_capacity(chars.len());
                    without.extend_from_slice(head);
                    without.extend_from_slice(tail);
                    expand_into(&without, out);
                    return;
                }
                i += 1;
            }
            _ => i += 1,
        }
    }
    out.push(chars.iter().collect());
}

fn find_matching_paren(chars: &[char], open: usize) -> Option<usize> {
    let mut depth = 0usize;
    let mut i = open;
    while i < chars.len() {
        match chars[i] {
            '\\' => i += 1,
            '(' => depth += 1,
            ')' => {
                depth -= 1;
                if depth == 0 {
                    return Some(i);
                }
            }
            _ => {}
        }
        i += 1;
    }
    None
}

/// Strip or retain `{…}` unsorted parts.
///
/// With `keep = true` the braces are removed but their content is kept
/// (display form); with `keep = false` the whole segment is removed
/// (keying and tilde values). Nesting is flat: once inside a segment, the
/// first unescaped `}` ends it and inner `{` are literal content. A stray
/// `}` outside any segment is literal.
pub fn process_unsorted_parts(s: &str, keep: bool) -> String {
    let mut out = String::with_capacity(s.len());
    let mut in_braces = false;
    let mut chars = s.chars();
    while let Some(c) = chars.next() {
        match c {
            '\\' => {
                if in_braces && !keep {
                    chars.next();
                } else {
                    out.push('\\');
                    if let Some(n) = chars.next() {
                        out.push(n);
                    }
                }
            }
            '{' if !in_braces => in_braces = true,
            '}' if in_braces => in_braces = false,
            _ => {
                if !in_braces || keep {
                    out.push(c);
                }
            }
        }
    }
    out
}

/// Replace every `~` not preceded by `\` with `tilde_value`. Backslash
/// escapes are preserved literally in this step.
pub fn expand_tildes(s: &str, tilde_value: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut chars = s.chars();
    while let Some(c) = chars.next() {
        match c {
            '\\' => {
                out.push('\\');
                if let Some(n) = chars.next() {
                    out.push(n);
                }
            }
            '~' => out.push_str(tilde_value),
            _ => out.push(c),
        }
    }
    out
}

/// Remove `\` before any character, keeping the character itself.
pub fn unescape_dsl(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut chars = s.chars();
    while let Some(c) = chars.next() {
        if c == '\\' {
            if let Some(n) = chars.next() {
                out.push(n);
            }
        } else {
            out.push(c);
        }
    }
    out
}

/// Normalize a headword for keying: collapse internal whitespace runs to
/// a single space, strip enclosing whitespace and drop trailing
/// superscript homograph markers (¹ ² ³ and U+2070–U+2079).
pub fn normalize_headword(s: &str) -> String {
    let trimmed = s
        .trim_matches(|c: char| c.is_whitespace())
        .trim_end_matches(is_variant_marker);
    let trimmed = trimmed.trim_end_matches(|c: char| c.is_whitespace());

    let mut out = String::with_capacity(trimmed.len());
    let mut in_run = false;
    for c in trimmed.chars() {
        if c.is_whitespace() {
            if !in_run {
                out.push(' ');
                in_run = true;
            }
        } else {
            out.push(c);
            in_run = false;
        }
    }
    out
}

fn is_variant_marker(c: char) -> bool {
    matches!(c, '\u{00b9}' | '\u{00b2}' | '\u{00b3}' | '\u{2070}'..='\u{2079}')
}

/// Whether the first non-whitespace character of `line` is an unescaped `@`.
pub fn is_at_sign_first(line: &str) -> bool {
    line.chars().find(|c| !is_dsl_ws(*c)) == Some('@')
}

/// Remove `{{ … }}` comment regions from one line.
///
/// `in_comment` carries the open-comment state across lines, so a comment
/// opened on one line is closed by `}}` on a later one.
pub fn strip_comments(line: &str, in_comment: &mut bool) -> String {
    let chars: Vec<char> = line.chars().collect();
    let mut out = String::with_capacity(line.len());
    let mut i = 0;
    while i < chars.len() {
        if *in_comment {
            if chars[i] == '}' && chars.get(i + 1) == Some(&'}') {
                *in_comment = false;
                i += 2;
            } else {
                i += 1;
            }
        } else if chars[i] == '{' && chars.get(i + 1) == Some(&'{') {
            *in_comment = true;
            i += 2;
        } else {
            out.push(chars[i]);
            i += 1;
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dsl_whitespace_is_space_and_tab_only() {
        assert!(is_dsl_ws(' '));
        assert!(is_dsl_ws('\t'));
        assert!(!is_dsl_ws('\u{a0}'));
        assert!(!is_dsl_ws('\n'));
    }

    #[test]
    fn optional_parts_expand_with_first() {
        assert_eq!(expand_optional_parts("dog(s)"), vec!["dogs", "dog"]);
        assert_eq!(expand_optional_parts("plain"), vec!["plain"]);

        let two = expand_optional_parts("a(b)c(d)");
        assert_eq!(two, vec!["abcd", "abc", "acd", "ac"]);
        assert_eq!(two.len(), 4);
        // First retains all groups, last drops them all.
        assert_eq!(two.first().unwrap(), "abcd");
        assert_eq!(two.last().unwrap(), "ac");
    }

    #[test]
    fn optional_parts_nested_and_escaped() {
        assert_eq!(expand_optional_parts("a(b(c))"), vec!["abc", "ab", "a"]);
        // Escaped parentheses are literal.
        assert_eq!(expand_optional_parts(r"a\(b\)"), vec![r"a\(b\)"]);
        // Unmatched open paren is literal.
        assert_eq!(expand_optional_parts("a(b"), vec!["a(b"]);
    }

    #[test]
    fn unsorted_parts_keep_and_strip() {
        assert_eq!(process_unsorted_parts("to {the} point", true), "to the point");
        assert_eq!(process_unsorted_parts("to {the} point", false), "to  point");
        // Flat nesting: inner brace is content, first `}` closes.
        assert_eq!(process_unsorted_parts("a{b{c}d", true), "ab{cd");
        // Stray closing brace is literal.
        assert_eq!(process_unsorted_parts("a}b", true), "a}b");
        // Escaped braces are literal and survive both modes.
        assert_eq!(process_unsorted_parts(r"a\{b\}", false), r"a\{b\}");
    }

    #[test]
    fn tilde_expansion() {
        assert_eq!(expand_tildes("foo~bar", "X"), "fooXbar");
        assert_eq!(expand_tildes(r"foo\~bar", "X"), r"foo\~bar");
        assert_eq!(expand_tildes("~ and ~", "cat"), "cat and cat");
    }

    #[test]
    fn unescape_keeps_escaped_char() {
        assert_eq!(unescape_dsl(r"\[word\]"), "[word]");
        assert_eq!(unescape_dsl(r"a\\b"), r"a\b");
        assert_eq!(unescape_dsl("plain"), "plain");
    }

    #[test]
    fn unescape_is_identity_on_clean_ascii() {
        for s in ["cat", "the quick fox", "abc123"] {
            assert_eq!(unescape_dsl(s), s);
        }
    }

    #[test]
    fn normalize_headword_collapses_and_trims() {
        assert_eq!(normalize_headword("  a   b\t c "), "a b c");
        assert_eq!(normalize_headword("word"), "word");
        // Idempotence.
        let once = normalize_headword("  x   y ");
        assert_eq!(normalize_headword(&once), once);
    }

    #[test]
    fn normalize_headword_strips_variant_markers() {
        assert_eq!(normalize_headword("bank¹"), "bank");
        assert_eq!(normalize_headword("bank\u{2072}"), "bank");
        // Plain digits are kept.
        assert_eq!(normalize_headword("route 66"), "route 66");
    }

    #[test]
    fn at_sign_detection() {
        assert!(is_at_sign_first("@card"));
        assert!(is_at_sign_first("  \t@card"));
        assert!(!is_at_sign_first(r"\@card"));
        assert!(!is_at_sign_first("text @card"));
    }

    #[test]
    fn comment_stripping_carries_across_lines() {
        let mut carry = false;
        assert_eq!(strip_comments("a{{hidden}}b", &mut carry), "ab");
        assert!(!carry);

        assert_eq!(strip_comments("start {{open", &mut carry), "start ");
        assert!(carry);
        assert_eq!(strip_comments("still hidden", &mut carry), "");
        assert!(carry);
        assert_eq!(strip_comments("tail}} visible", &mut carry), " visible");
        assert!(!carry);
    }
}
