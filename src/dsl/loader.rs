//! Article loading: walks a decoded article's headword lines to find the
//! one matching the request, and splits off the body.

use super::folding;
use super::markup;

/// Result of resolving an article against a requested headword.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadedArticle {
    /// First headword after unsorted-part removal and optional-part
    /// expansion (first alternative); substituted for `~` in the body.
    pub tilde_value: String,
    /// Raw (pre-folding, post-unsorted-strip) form of the matched
    /// headword, or the fallback described in the module docs.
    pub displayed_headword: String,
    /// Ordinal of the matched headword among this article's headwords.
    pub headword_index: u32,
    /// Everything after the headword lines.
    pub body: String,
}

/// Resolve `article_data` (decoded article text, comments already
/// stripped) against `requested_folded` (the case-folded request).
///
/// Embedded cards are recognized by their leading DSL whitespace; their
/// headword lines carry `@` markers that are peeled off here. When no
/// headword alternative matches, the displayed headword falls back to the
/// tilde value, or to the request itself for embedded cards.
pub fn resolve_article(
    article_data: &str,
    requested_folded: &str,
    ignore_diacritics: bool,
) -> LoadedArticle {
    let chars: Vec<char> = article_data.chars().collect();

    let mut tilde_value = String::new();
    let mut tilde_with_unsorted = String::new();
    let mut displayed_headword = String::new();
    let mut headword_index: u32 = 0;

    let mut pos = 0usize;
    let mut had_first_headword = false;
    let mut found_displayed = false;

    let insided_card = chars.first().map(|&c| markup::is_dsl_ws(c)).unwrap_or(false);

    let requested_for_match = if ignore_diacritics {
        folding::apply_diacritics_only(folding::trim_whitespace(requested_folded))
    } else {
        folding::trim_whitespace(requested_folded).to_string()
    };

    loop {
        let begin = pos;
        pos = find_line_end(&chars, begin);

        if !found_displayed {
            let mut raw_headword: String = chars[begin..pos].iter().collect();

            if insided_card
                && !raw_headword.is_empty()
                && raw_headword.starts_with(|c| markup::is_dsl_ws(c))
            {
                // Headword line of the embedded card: peel off the `@`.
                raw_headword = match raw_headword.find('@') {
                    Some(at) => {
                        let head = folding::trim_whitespace(&raw_headword[at + 1..]).to_string();
                        // A tilde here was expanded against the parent at
                        // indexing time; without the parent it cannot be
                        // reproduced, so the line is skipped.
                        if contains_unescaped_tilde(&head) {
                            String::new()
                        } else {
                            head
                        }
                    }
                    None => raw_headword,
                };
            }

            if !raw_headword.is_empty() {
                if !had_first_headword {
                    let alternatives = markup::expand_optional_parts(&raw_headword);
                    let first = alternatives
                        .into_iter()
                        .next()
                        .unwrap_or_else(|| raw_headword.clone());
                    tilde_with_unsorted = first.clone();
                    tilde_value = markup::process_unsorted_parts(&first, false);
                }

                let mut candidate = raw_headword.clone();
                if had_first_headword {
                    candidate = markup::expand_tildes(&candidate, &tilde_with_unsorted);
                }
                candidate = markup::process_unsorted_parts(&candidate, true);
                candidate = folding::apply_simple_case_only(&candidate);

                for alternative in markup::expand_optional_parts(&candidate) {
                    let normalized =
                        markup::normalize_headword(&markup::unescape_dsl(&alternative));
                    let matches = if ignore_diacritics {
                        folding::apply_diacritics_only(folding::trim_whitespace(&normalized))
                            == requested_for_match
                    } else {
                        folding::trim_whitespace(&normalized) == requested_for_match
                    };

                    if matches {
                        // Build the displayed headword from the raw form.
                        let mut displayed = raw_headword.clone();
                        if had_first_headword {
                            displayed = markup::expand_tildes(&displayed, &tilde_with_unsorted);
                        }
                        displayed_headword = markup::process_unsorted_parts(&displayed, false);
                        found_displayed = true;
                        break;
                    }
                }

                if !found_displayed {
                    headword_index += 1;
                    had_first_headword = true;
                }
            }
        }

        if pos == chars.len() {
            break;
        }

        // Skip the \r / \n / \r\n terminator.
        if chars[pos] == '\r' {
            pos += 1;
        }
        if pos != chars.len() && chars[pos] == '\n' {
            pos += 1;
        }
        if pos == chars.len() {
            break;
        }

        if markup::is_dsl_ws(chars[pos]) {
            if insided_card {
                // Another `@` headword line keeps us in the headword run;
                // anything else starts the body.
                let line_end = find_line_end(&chars, pos);
                let line: String = chars[pos..line_end].iter().collect();
                if !markup::is_at_sign_first(&line) {
                    break;
                }
            } else {
                break;
            }
        }
    }

    if !found_displayed {
        displayed_headword = if insided_card {
            requested_folded.to_string()
        } else {
            tilde_value.clone()
        };
    }

    let body = if pos != chars.len() {
        chars[pos..].iter().collect()
    } else {
        String::new()
    };

    LoadedArticle {
        tilde_value,
        displayed_headword,
        headword_index,
        body,
    }
}

fn find_line_end(chars: &[char], from: usize) -> usize {
    chars[from..]
        .iter()
        .position(|&c| c == '\n' || c == '\r')
        .map(|p| from + p)
        .unwrap_or(chars.len())
}

fn contains_unescaped_tilde(s: &str) -> bool {
    let mut chars = s.chars();
    while let Some(c) = chars.next() {
        match c {
            '\\' => {
                chars.next();
            }
            '~' => return true,
            _ => {}
        }
    }
    false
}
