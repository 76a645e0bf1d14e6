//! Name extraction
//!
//! Turns noisy recognizer output into a candidate card name. Everything here is
//! pure and total: any input, including empty or garbage text, yields a
//! defined output.
//!
//! Normalization repeats its passes until the string stops changing, so
//! `normalize_name(normalize_name(x)) == normalize_name(x)`.

use serde::{Deserialize, Serialize};

/// Garbage-token rule table
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NameRules {
    /// Short words that are never noise (articles, pronouns, particles)
    pub common_words: Vec<String>,
    /// Single letters that are words on their own
    pub single_letter_words: Vec<char>,
    /// Minimum length of a valid name
    pub min_length: usize,
    /// Minimum share of letters in a valid name
    pub min_letter_ratio: f32,
}

impl Default for NameRules {
    fn default() -> Self {
        let common_words = [
            "a", "an", "and", "as", "at", "be", "by", "de", "do", "du", "el", "en", "for", "go",
            "he", "her", "his", "in", "is", "it", "its", "la", "le", "me", "my", "no", "of", "on",
            "or", "our", "so", "the", "to", "un", "up", "us", "we", "you",
        ];
        Self {
            common_words: common_words.iter().map(|w| w.to_string()).collect(),
            single_letter_words: vec!['a', 'i', 'o'],
            min_length: 2,
            min_letter_ratio: 0.70,
        }
    }
}

impl NameRules {
    /// Common word in natural casing ("of", "Of", "OF" but not "oF")
    pub fn is_common_word(&self, token: &str) -> bool {
        if !has_natural_casing(token) {
            return false;
        }
        let lower = token.to_lowercase();
        self.common_words.iter().any(|w| w.eq_ignore_ascii_case(&lower))
    }

    fn is_single_letter_word(&self, c: char) -> bool {
        let lower = c.to_ascii_lowercase();
        self.single_letter_words
            .iter()
            .any(|w| w.to_ascii_lowercase() == lower)
    }
}

const MAX_PASSES: usize = 32;

/// Extract the candidate name from raw recognizer output
///
/// The name is printed at the top of the card, so only the first non-empty
/// line is considered. `None` when that line does not normalize to a valid
/// name; later lines (type line, rules text) are never used instead.
pub fn extract_card_name(raw: &str, rules: &NameRules) -> Option<String> {
    let line = raw.lines().find(|line| !line.trim().is_empty())?;
    let name = normalize_name(line, rules);

    is_valid_name(&name, rules).then_some(name)
}

/// Normalize one line of recognizer output
pub fn normalize_name(line: &str, rules: &NameRules) -> String {
    let mut current = line.to_string();
    for _ in 0..MAX_PASSES {
        let next = normalize_pass(&current, rules);
        if next == current {
            break;
        }
        current = next;
    }
    current
}

/// Whether a normalized name is worth looking up
pub fn is_valid_name(name: &str, rules: &NameRules) -> bool {
    let total = name.chars().count();
    if total < rules.min_length.max(1) {
        return false;
    }
    if !name.chars().next().is_some_and(char::is_alphabetic) {
        return false;
    }

    let letters = name.chars().filter(|c| c.is_alphabetic()).count();
    letters as f32 / total as f32 >= rules.min_letter_ratio
}

fn normalize_pass(line: &str, rules: &NameRules) -> String {
    let folded: String = line.chars().map(fold_char).collect();
    let collapsed = collapse_repeated_punctuation(&folded);
    let fixed = fix_lookalikes(&collapsed);
    let trimmed = fixed.trim_matches(|c: char| !c.is_alphabetic());
    let tokens: Vec<&str> = trimmed.split_whitespace().collect();
    filter_garbage(&tokens, rules).join(" ")
}

/// Quote and dash variants to ASCII, recognizer artifacts to spaces
fn fold_char(c: char) -> char {
    match c {
        '\u{2018}' | '\u{2019}' | '\u{201A}' | '\u{201B}' | '\u{2032}' | '`' | '\u{00B4}' => '\'',
        '\u{201C}' | '\u{201D}' | '\u{201E}' | '\u{201F}' | '\u{2033}' => '"',
        '\u{2010}' | '\u{2011}' | '\u{2012}' | '\u{2013}' | '\u{2014}' | '\u{2015}' | '\u{2212}' => '-',
        '[' | ']' | '{' | '}' | '(' | ')' | '<' | '>' | '/' | '\\' | '|' => ' ',
        c if c.is_whitespace() => ' ',
        c => c,
    }
}

fn collapse_repeated_punctuation(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut prev: Option<char> = None;
    for c in s.chars() {
        let is_punct = !c.is_alphanumeric() && !c.is_whitespace();
        if is_punct && prev == Some(c) {
            continue;
        }
        out.push(c);
        prev = Some(c);
    }
    out
}

/// `0` -> `O` and `1` -> `l` when next to a letter and not next to a digit
fn fix_lookalikes(s: &str) -> String {
    let chars: Vec<char> = s.chars().collect();
    chars
        .iter()
        .enumerate()
        .map(|(i, &c)| {
            if c != '0' && c != '1' {
                return c;
            }
            let neighbours = [
                i.checked_sub(1).and_then(|p| chars.get(p)),
                chars.get(i + 1),
            ];
            let near_digit = neighbours.iter().flatten().any(|n| n.is_ascii_digit());
            let near_letter = neighbours.iter().flatten().any(|n| n.is_alphabetic());
            match (c, near_letter && !near_digit) {
                ('0', true) => 'O',
                ('1', true) => 'l',
                _ => c,
            }
        })
        .collect()
}

/// Drop leading noise and stop at the first noise token after the name
fn filter_garbage<'a>(tokens: &[&'a str], rules: &NameRules) -> Vec<&'a str> {
    let mut accepted = Vec::with_capacity(tokens.len());
    for &token in tokens {
        if is_garbage(token, rules) {
            if accepted.is_empty() {
                continue;
            }
            break;
        }
        accepted.push(token);
    }
    accepted
}

fn is_garbage(token: &str, rules: &NameRules) -> bool {
    if rules.is_common_word(token) || has_inner_apostrophe(token) || is_hyphenated_words(token, rules) {
        return false;
    }

    let chars: Vec<char> = token.chars().collect();
    if !chars.iter().any(|c| c.is_alphabetic()) {
        return true;
    }

    match chars.len() {
        1 => !rules.is_single_letter_word(chars[0]),
        2 => true,
        3 => {
            let mixed = chars
                .windows(2)
                .any(|w| w[0].is_lowercase() && w[1].is_uppercase());
            let trailing_caps = chars[1].is_uppercase() && chars[2].is_uppercase();
            mixed || trailing_caps
        }
        _ => false,
    }
}

fn has_inner_apostrophe(token: &str) -> bool {
    let chars: Vec<char> = token.chars().collect();
    chars
        .windows(3)
        .any(|w| w[0].is_alphabetic() && w[1] == '\'' && w[2].is_alphabetic())
}

fn is_hyphenated_words(token: &str, rules: &NameRules) -> bool {
    if !token.contains('-') {
        return false;
    }
    token.split('-').all(|segment| {
        let word = segment.trim_matches('\'');
        let len = word.chars().count();
        len > 0
            && word.chars().all(char::is_alphabetic)
            && (len >= 3
                || rules.is_common_word(word)
                || (len == 1 && word.chars().all(|c| rules.is_single_letter_word(c))))
    })
}

fn has_natural_casing(token: &str) -> bool {
    let mut chars = token.chars().filter(|c| c.is_alphabetic());
    let Some(first) = chars.next() else {
        return false;
    };
    let rest: Vec<char> = chars.collect();
    let rest_lower = rest.iter().all(|c| c.is_lowercase());
    let rest_upper = rest.iter().all(|c| c.is_uppercase());
    rest_lower || (first.is_uppercase() && rest_upper)
}
