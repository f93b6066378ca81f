//! Alert candidate extraction.
//!
//! Turns free-form alert text into an [`AlertQuery`]. Each extraction rule
//! is a separate function so it can be tested on its own;
//! [`extract_candidates`] combines them by set union.
//!
//! | Rule | Function | Feeds |
//! |------|----------|-------|
//! | `[Alerting] <name> alert` header | [`alerting_names`] | names, keywords |
//! | `<code> <name> alert` header | [`coded_names`] | names, keywords |
//! | words of `[Alerting]` names | [`alerting_name_words`] | keywords |
//! | standalone codes (`z735`, `C214`) | [`alert_codes`] | codes, keywords |
//! | `Metrics: <value>` line | [`metrics_keywords`] | keywords |
//!
//! Extraction never fails. Text that matches no rule yields an empty
//! query, which sends the matcher straight to semantic search.

use std::collections::BTreeSet;
use std::sync::LazyLock;

use regex::Regex;

use crate::models::AlertQuery;

static ALERTING_HEADER: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"(?im)\[alerting\][ \t]+(.+?)(?:[ \t]+alert\b|$)").ok());

static CODED_HEADER: LazyLock<Option<Regex>> = LazyLock::new(|| {
    Regex::new(r"(?m)\b[A-Zzc]\d+[a-z]?[.:]?[ \t]+(.+?)(?:[ \t]+(?i:alert)\b|$)").ok()
});

static ALERT_CODE: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"\b[zZcC]\d+[a-z]?\b").ok());

static BARE_CODE: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"^[zc]\d+[a-z]?$").ok());

static METRICS_LINE: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"(?i)metrics?:[ \t]*([^\r\n]+)").ok());

static WORD: LazyLock<Option<Regex>> = LazyLock::new(|| Regex::new(r"\w+").ok());

/// Names shorter than this (in chars) are treated as noise.
const MIN_NAME_CHARS: usize = 4;
/// Keyword tokens need at least this many chars.
const MIN_WORD_CHARS: usize = 3;

fn first_groups<'a>(re: &LazyLock<Option<Regex>>, text: &'a str) -> Vec<&'a str> {
    let Some(re) = re.as_ref() else {
        return Vec::new();
    };
    re.captures_iter(text)
        .filter_map(|caps| caps.get(1))
        .map(|m| m.as_str().trim())
        .collect()
}

fn words(text: &str) -> Vec<String> {
    let Some(re) = WORD.as_ref() else {
        return Vec::new();
    };
    re.find_iter(text)
        .map(|m| m.as_str().to_lowercase())
        .filter(|w| w.chars().count() >= MIN_WORD_CHARS)
        .collect()
}

/// Names from `[Alerting] <name> alert` headers, case-insensitive.
///
/// A trailing `alert` word is not part of the name; without one the name
/// runs to the end of the line.
pub fn alerting_names(text: &str) -> Vec<String> {
    first_groups(&ALERTING_HEADER, text)
        .into_iter()
        .filter(|name| name.chars().count() >= MIN_NAME_CHARS)
        .map(str::to_string)
        .collect()
}

/// Names that follow an alert code, e.g. `z735 Invalid packets alert`.
pub fn coded_names(text: &str) -> Vec<String> {
    first_groups(&CODED_HEADER, text)
        .into_iter()
        .filter(|name| name.chars().count() >= MIN_NAME_CHARS)
        .map(str::to_string)
        .collect()
}

/// Individual words of every `[Alerting]` name.
pub fn alerting_name_words(text: &str) -> Vec<String> {
    alerting_names(text)
        .iter()
        .flat_map(|name| words(name))
        .collect()
}

/// Standalone alert codes such as `z735`, `c217` or `C214`, lower-cased.
pub fn alert_codes(text: &str) -> Vec<String> {
    let Some(re) = ALERT_CODE.as_ref() else {
        return Vec::new();
    };
    re.find_iter(text)
        .map(|m| m.as_str().to_lowercase())
        .collect()
}

/// The value of a `Metrics:` line plus its words.
pub fn metrics_keywords(text: &str) -> Vec<String> {
    let mut out = Vec::new();
    for value in first_groups(&METRICS_LINE, text) {
        out.push(value.to_string());
        out.extend(words(value));
    }
    out
}

/// Parses alert text into an [`AlertQuery`].
pub fn extract_candidates(text: &str) -> AlertQuery {
    let mut candidate_names: Vec<String> = Vec::new();
    for name in alerting_names(text).into_iter().chain(coded_names(text)) {
        if !candidate_names
            .iter()
            .any(|seen| seen.to_lowercase() == name.to_lowercase())
        {
            candidate_names.push(name);
        }
    }

    let mut codes: Vec<String> = Vec::new();
    for code in alert_codes(text) {
        if !codes.contains(&code) {
            codes.push(code);
        }
    }

    let keywords: BTreeSet<String> = candidate_names
        .iter()
        .cloned()
        .chain(alerting_name_words(text))
        .chain(codes.iter().cloned())
        .chain(metrics_keywords(text))
        .map(|k| k.trim().to_lowercase())
        .filter(|k| k.chars().count() > 1)
        .collect();

    AlertQuery {
        raw_text: text.to_string(),
        candidate_names,
        codes,
        keywords,
    }
}

/// First non-empty line of `text`, trimmed. Empty when the text is blank.
pub fn first_line(text: &str) -> &str {
    text.lines()
        .map(str::trim)
        .find(|line| !line.is_empty())
        .unwrap_or("")
}

/// Whether `candidate` names the alert written in `haystack`.
///
/// Case-insensitive. A bare alert code must appear as a whole token
/// (`z73` does not match `z735`). Other candidates match by substring, and
/// `[Alerting] ... alert` shaped candidates also match on the bare name.
pub fn is_exact_match(candidate: &str, haystack: &str) -> bool {
    let candidate = candidate.trim().to_lowercase();
    if candidate.is_empty() {
        return false;
    }
    let haystack = haystack.to_lowercase();

    if BARE_CODE
        .as_ref()
        .is_some_and(|re| re.is_match(&candidate))
    {
        return contains_token(&haystack, &candidate);
    }

    if haystack.contains(&candidate) {
        return true;
    }

    if candidate.starts_with('[') && candidate.contains("alerting") {
        let name = candidate.replace("[alerting]", "").replace("alert", "");
        let name = name.trim();
        if !name.is_empty() && haystack.contains(name) {
            return true;
        }
    }

    false
}

/// Index of the first line of `text` that `candidate` matches exactly.
pub fn matching_line(text: &str, candidate: &str) -> Option<usize> {
    text.lines().position(|line| is_exact_match(candidate, line))
}

fn contains_token(haystack: &str, token: &str) -> bool {
    haystack.match_indices(token).any(|(start, _)| {
        let before = haystack[..start].chars().next_back();
        let after = haystack[start + token.len()..].chars().next();
        !before.is_some_and(char::is_alphanumeric) && !after.is_some_and(char::is_alphanumeric)
    })
}
