//! Phrase → regex compiler.
//!
//! Literal phrase syntax:
//!
//! | Syntax   | Meaning                                    | Regex           |
//! |----------|--------------------------------------------|-----------------|
//! | `*`      | any text (lazy, captured)                  | `(.*?)`         |
//! | `:name`  | one run of non-whitespace (captured)       | `(\S+)`         |
//! | `(word)` | optional words, surrounding space optional | `\s*(?:word)?\s*` |
//!
//! Everything else matches literally. Regex phrases are used as written.
//! Every matcher is anchored to the whole trimmed input and ignores case.

use std::sync::OnceLock;

use regex::{Regex, RegexBuilder};

use super::Phrase;
use crate::error::{HearkenError, Result};

/// A compiled phrase.
#[derive(Debug, Clone)]
pub struct Matcher {
    regex: Regex,
}

impl Matcher {
    /// Match the whole (trimmed) input, returning captured groups in pattern
    /// order. Optional groups that did not participate yield `""`.
    pub fn captures(&self, input: &str) -> Option<Vec<String>> {
        let caps = self.regex.captures(input.trim())?;
        Some(
            caps.iter()
                .skip(1)
                .map(|group| group.map(|m| m.as_str().to_string()).unwrap_or_default())
                .collect(),
        )
    }

    /// The generated regex source (anchors included).
    pub fn as_str(&self) -> &str {
        self.regex.as_str()
    }
}

/// Compile a phrase into a case-insensitive, fully anchored matcher.
///
/// # Errors
/// `HearkenError::Pattern` if the generated regex is rejected, which can only
/// happen for a user regex that exceeds the regex size limits once anchored.
pub fn compile(phrase: &Phrase) -> Result<Matcher> {
    let body = match phrase {
        Phrase::Literal(text) => literal_to_pattern(text),
        Phrase::Regex(regex) => regex.as_str().to_string(),
    };
    RegexBuilder::new(&format!("^(?:{body})$"))
        .case_insensitive(true)
        .build()
        .map(|regex| Matcher { regex })
        .map_err(|source| HearkenError::Pattern {
            pattern: phrase.to_string(),
            source,
        })
}

fn literal_to_pattern(phrase: &str) -> String {
    static OPTIONAL: OnceLock<Regex> = OnceLock::new();
    let optional = OPTIONAL.get_or_init(|| Regex::new(r"\s*\(([^)]*)\)\s*").expect("static regex"));

    let mut out = String::with_capacity(phrase.len() * 2);
    let mut last = 0;
    for caps in optional.captures_iter(phrase) {
        let (Some(whole), Some(inner)) = (caps.get(0), caps.get(1)) else {
            continue;
        };
        translate_segment(&phrase[last..whole.start()], &mut out);
        out.push_str(r"\s*(?:");
        translate_segment(inner.as_str(), &mut out);
        out.push_str(r")?\s*");
        last = whole.end();
    }
    translate_segment(&phrase[last..], &mut out);
    out
}

fn translate_segment(segment: &str, out: &mut String) {
    let mut chars = segment.chars().peekable();
    let mut buf = [0u8; 4];
    while let Some(c) = chars.next() {
        match c {
            '*' => out.push_str("(.*?)"),
            ':' if chars.peek().is_some_and(|n| is_word_char(*n)) => {
                while chars.peek().is_some_and(|n| is_word_char(*n)) {
                    chars.next();
                }
                out.push_str(r"(\S+)");
            }
            _ => out.push_str(&regex::escape(c.encode_utf8(&mut buf))),
        }
    }
}

fn is_word_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_'
}

#[cfg(test)]
mod tests {
    use super::*;

    fn literal(text: &str) -> Matcher {
        compile(&Phrase::Literal(text.into())).expect("compile literal")
    }

    #[test]
    fn literal_matches_whole_utterance_without_parameters() {
        let m = literal("Hello world");
        assert_eq!(m.captures("hello WORLD"), Some(vec![]));
        assert_eq!(m.captures("  Hello world  "), Some(vec![]));
        assert_eq!(m.captures("Hello world again"), None);
        assert_eq!(m.captures("Say Hello world"), None);
    }

    #[test]
    fn metacharacters_match_literally() {
        let m = literal("what is 2+2? [really] $5.00 a|b");
        assert!(m.captures("what is 2+2? [really] $5.00 a|b").is_some());
        assert!(m.captures("what is 22 really 5a00 a").is_none());
    }

    #[test]
    fn splats_capture_lazily() {
        let m = literal("I want to eat * and *");
        assert_eq!(
            m.captures("I want to eat pizza and fries"),
            Some(vec!["pizza".to_string(), "fries".to_string()])
        );
        assert_eq!(
            m.captures("I want to eat pizza and fries are great"),
            Some(vec!["pizza".to_string(), "fries are great".to_string()])
        );
    }

    #[test]
    fn leading_splat() {
        let m = literal("* and fries are great");
        assert_eq!(
            m.captures("I want to eat pizza and fries are great"),
            Some(vec!["I want to eat pizza".to_string()])
        );
    }

    #[test]
    fn named_parameter_captures_one_word() {
        let m = literal("I :action with my little eye");
        assert_eq!(
            m.captures("I spy with my little eye"),
            Some(vec!["spy".to_string()])
        );
        assert_eq!(m.captures("I really spy with my little eye"), None);
    }

    #[test]
    fn lone_colon_is_literal() {
        let m = literal("note: done");
        assert!(m.captures("note: done").is_some());
    }

    #[test]
    fn optional_words() {
        let m = literal("Hello (to) you");
        assert_eq!(m.captures("Hello to you"), Some(vec![]));
        assert_eq!(m.captures("Hello you"), Some(vec![]));
        assert_eq!(m.captures("Hello there you"), None);
    }

    #[test]
    fn named_parameter_inside_optional_group() {
        let m = literal("play (the song :title)");
        assert_eq!(
            m.captures("play the song yesterday"),
            Some(vec!["yesterday".to_string()])
        );
        assert_eq!(m.captures("play"), Some(vec![String::new()]));
    }

    #[test]
    fn unbalanced_parenthesis_is_literal() {
        let m = literal("smile :)");
        assert!(m.captures("smile :)").is_some());
    }

    #[test]
    fn regex_phrase_is_case_insensitive_and_anchored() {
        let re = Regex::new(r"This is a \s+ test\.+").unwrap();
        let m = compile(&Phrase::Regex(re)).unwrap();
        assert!(m.captures("This is a      test.......").is_some());
        assert!(m.captures("this is a      TEST.......").is_some());
        assert!(m.captures("well This is a  test.").is_none());
    }

    #[test]
    fn regex_groups_become_parameters() {
        let re = Regex::new(r"set timer for (\d+) (minutes|seconds)").unwrap();
        let m = compile(&Phrase::Regex(re)).unwrap();
        assert_eq!(
            m.captures("Set timer for 10 minutes"),
            Some(vec!["10".to_string(), "minutes".to_string()])
        );
    }

    #[test]
    fn wildcard_count_matches_parameter_count() {
        for k in 0..4 {
            let phrase = (0..k).map(|_| "*").collect::<Vec<_>>().join(" then ");
            let phrase = format!("start {phrase}");
            let utterance = (0..k).map(|i| format!("w{i}")).collect::<Vec<_>>().join(" then ");
            let utterance = format!("start {utterance}");
            let params = literal(phrase.trim()).captures(&utterance).unwrap();
            assert_eq!(params.len(), k);
        }
    }
}
