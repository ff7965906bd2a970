//! Bigram Dice-coefficient string similarity.
//!
//! ## Algorithm
//!
//! 1. Strip all whitespace from both inputs and lowercase them.
//! 2. Both empty → `1.0`; exactly one empty → `0.0`; equal → `1.0`.
//! 3. Either shorter than two characters → `0.0`.
//! 4. Count the bigrams of `first` into a multiset, then walk the bigrams of
//!    `second`, consuming one occurrence per hit.
//! 5. Score = `2 × hits / (|first| + |second| − 2)`.

use std::collections::HashMap;
use std::sync::OnceLock;

use regex::Regex;

/// Score the similarity of two strings in `[0.0, 1.0]`.
pub fn similarity(first: &str, second: &str) -> f64 {
    let first = fold(first);
    let second = fold(second);

    if first.is_empty() && second.is_empty() {
        return 1.0;
    }
    if first.is_empty() || second.is_empty() {
        return 0.0;
    }
    if first == second {
        return 1.0;
    }
    if first.len() < 2 || second.len() < 2 {
        return 0.0;
    }

    let mut bigrams: HashMap<(char, char), usize> = HashMap::with_capacity(first.len());
    for pair in first.windows(2) {
        *bigrams.entry((pair[0], pair[1])).or_insert(0) += 1;
    }

    let mut hits = 0usize;
    for pair in second.windows(2) {
        if let Some(count) = bigrams.get_mut(&(pair[0], pair[1])) {
            if *count > 0 {
                *count -= 1;
                hits += 1;
            }
        }
    }

    (2 * hits) as f64 / (first.len() + second.len() - 2) as f64
}

/// Reduce a command phrase to the plain words the similarity check compares.
///
/// Pattern syntax and punctuation (`&/\#,+()!$~%.'":*?<>{}`) are removed,
/// whitespace runs collapse to a single space and the result is trimmed.
pub fn normalize_phrase(phrase: &str) -> String {
    static WHITESPACE_RUN: OnceLock<Regex> = OnceLock::new();
    let stripped: String = phrase.chars().filter(|c| !is_special(*c)).collect();
    let collapsed = WHITESPACE_RUN
        .get_or_init(|| Regex::new(r"\s{2,}").expect("static regex"))
        .replace_all(&stripped, " ");
    collapsed.trim().to_string()
}

fn is_special(c: char) -> bool {
    matches!(
        c,
        '&' | '/'
            | '\\'
            | '#'
            | ','
            | '+'
            | '('
            | ')'
            | '!'
            | '$'
            | '~'
            | '%'
            | '.'
            | '\''
            | '"'
            | ':'
            | '*'
            | '?'
            | '<'
            | '>'
            | '{'
            | '}'
    )
}

fn fold(s: &str) -> Vec<char> {
    s.chars()
        .filter(|c| !c.is_whitespace())
        .flat_map(char::to_lowercase)
        .collect()
}
