//! Response shaping for alert answers.
//!
//! Everything here is pure text processing around the completion call:
//! building the constrained prompt and multi-document context, copying a
//! runbook's "how to respond" field verbatim, and sanitizing model output
//! so that only the runbook text or [`NOT_FOUND`] ever leaves the pipeline.

use std::collections::HashMap;
use std::fmt::Display;
use std::sync::LazyLock;

use regex::Regex;

use crate::keywords::matching_line;
use crate::models::{MatchResult, MatchType};

/// Fixed answer when no runbook entry applies.
pub const NOT_FOUND: &str = "Alert not found in documentation";

/// Generic failure text for anything that goes wrong around the model call.
pub fn error_message(reason: impl Display) -> String {
    format!("An error occurred while processing the request: {reason}")
}

/// Tunables for [`sanitize`] and [`runbook_answer`].
#[derive(Debug, Clone, PartialEq)]
pub struct ResponsePolicy {
    /// Shorter cleaned answers are rejected.
    pub min_chars: usize,
    /// Largest share of all words one long word may take.
    pub repetition_threshold: f64,
    /// Field labels that introduce the remediation text of a runbook entry.
    pub labels: Vec<String>,
}

impl Default for ResponsePolicy {
    fn default() -> Self {
        Self {
            min_chars: 10,
            repetition_threshold: 0.3,
            labels: vec!["Как реагировать".to_string(), "How to respond".to_string()],
        }
    }
}

static WHITESPACE: LazyLock<Option<Regex>> = LazyLock::new(|| Regex::new(r"\s+").ok());

/// Label-style preamble. Plain words need the colon, so an answer that
/// merely starts with "Response" or "Result" is left alone; the phrases
/// that never open a real instruction may omit it.
static PREAMBLE: LazyLock<Option<Regex>> = LazyLock::new(|| {
    Regex::new(
        r"(?i)^(?:(?:answer|response|result|ответ|результат|по документации?)[ \t]*:|(?:найден алерт|alert found)\b[ \t]*:?)[ \t]*",
    )
    .ok()
});

/// Lead-in clause ending at the first colon, e.g. `The correct answer is:`.
static LEAD_IN: LazyLock<Option<Regex>> = LazyLock::new(|| {
    Regex::new(
        r"(?i)^[^:]*?\b(?:найден алерт|соответствует|правильный ответ|окончательный ответ|alert found|matches the alert|correct answer|final answer)\b[^:]*:\s*",
    )
    .ok()
});

const REPETITION_SOURCES: [&str; 10] = [
    r"\[alerting\].*?alert.*?\[alerting\].*?alert",
    r"найден алерт.*?найден алерт",
    r"соответствует.*?соответствует",
    r"правильный ответ.*?правильный ответ",
    r"окончательный ответ.*?окончательный ответ",
    r"ключевые слова.*?ключевые слова",
    r"alert found.*?alert found",
    r"correct answer.*?correct answer",
    r"final answer.*?final answer",
    r"keywords.*?keywords",
];

static REPETITION_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    REPETITION_SOURCES
        .iter()
        .filter_map(|p| Regex::new(p).ok())
        .collect()
});

const ACKNOWLEDGEMENTS: &[&str] = &["yes", "no", "ok", "okay", "fine", "да", "нет", "ок", "хорошо"];

/// Collapses runs of immediately repeated whole-word phrases to one copy.
///
/// `"restart nginx restart nginx"` becomes `"restart nginx"`. Units start and
/// end on word boundaries, so doubled letters inside a word are kept.
/// Expects whitespace already collapsed to single spaces.
pub fn collapse_repeats(text: &str) -> String {
    let chars: Vec<char> = text.chars().collect();
    let mut out = String::with_capacity(text.len());
    let mut i = 0;
    while i < chars.len() {
        if i == 0 || chars[i - 1] == ' ' {
            if let Some((unit_len, run_end)) = repeated_run(&chars, i) {
                out.extend(&chars[i..i + unit_len]);
                i = run_end;
                continue;
            }
        }
        out.push(chars[i]);
        i += 1;
    }
    out.trim_end().to_string()
}

/// Shortest space-terminated unit at `start` that repeats at least once.
///
/// Returns `(unit_len, run_end)`. The last copy may omit the unit's
/// trailing space when it ends the text.
fn repeated_run(chars: &[char], start: usize) -> Option<(usize, usize)> {
    let n = chars.len();
    let rest = n - start;
    for len in 2..=(rest + 1) / 2 {
        if chars[start + len - 1] != ' ' {
            continue;
        }
        let unit = &chars[start..start + len];
        let mut end = start + len;
        let mut copies = 1;
        loop {
            if end + len <= n && chars[end..end + len] == *unit {
                end += len;
                copies += 1;
                continue;
            }
            if end + len - 1 == n && chars[end..n] == unit[..len - 1] {
                end = n;
                copies += 1;
            }
            break;
        }
        if copies > 1 {
            return Some((len, end));
        }
    }
    None
}

fn strip_preamble(text: &str) -> String {
    let mut out = text.to_string();
    if let Some(re) = PREAMBLE.as_ref() {
        out = re.replace(&out, "").into_owned();
    }
    if let Some(re) = LEAD_IN.as_ref() {
        out = re.replace(&out, "").into_owned();
    }
    out.trim().to_string()
}

/// True when one word longer than 3 chars dominates the answer.
pub fn is_word_repetition(text: &str, threshold: f64) -> bool {
    let words: Vec<String> = text.split_whitespace().map(str::to_lowercase).collect();
    if words.is_empty() {
        return true;
    }
    let mut counts: HashMap<&str, usize> = HashMap::new();
    for w in words.iter().filter(|w| w.chars().count() > 3) {
        *counts.entry(w.as_str()).or_default() += 1;
    }
    let max = counts.values().copied().max().unwrap_or(0);
    max as f64 > words.len() as f64 * threshold
}

/// True when the answer matches a known echo/repetition shape.
pub fn is_pattern_repetition(text: &str) -> bool {
    let lower = text.to_lowercase();
    if REPETITION_PATTERNS.iter().any(|re| re.is_match(&lower)) {
        return true;
    }
    // a short sentence naming the alert is the header echoed back
    lower.ends_with('.') && lower.split_whitespace().count() <= 5 && lower.contains("alert")
}

/// Cleans raw model output, or replaces it with [`NOT_FOUND`].
///
/// Steps, in order: collapse whitespace, collapse repeated phrases, strip
/// preambles, reject short answers and bare acknowledgements, reject
/// word-frequency and pattern repetition.
pub fn sanitize(raw: &str, policy: &ResponsePolicy) -> String {
    let collapsed = match WHITESPACE.as_ref() {
        Some(re) => re.replace_all(raw.trim(), " ").into_owned(),
        None => raw.trim().to_string(),
    };
    let deduped = collapse_repeats(&collapsed);
    let answer = strip_preamble(&deduped);

    let bare = answer
        .trim_end_matches(|c: char| c.is_ascii_punctuation())
        .to_lowercase();
    if answer.chars().count() < policy.min_chars || ACKNOWLEDGEMENTS.contains(&bare.as_str()) {
        return NOT_FOUND.to_string();
    }
    if is_word_repetition(&answer, policy.repetition_threshold) {
        return NOT_FOUND.to_string();
    }
    if is_pattern_repetition(&answer) {
        return NOT_FOUND.to_string();
    }
    answer
}

/// Case-insensitive prefix strip that respects char boundaries.
fn strip_prefix_ci<'a>(s: &'a str, prefix: &str) -> Option<&'a str> {
    let mut chars = s.char_indices();
    for p in prefix.chars() {
        let (_, c) = chars.next()?;
        if !c.to_lowercase().eq(p.to_lowercase()) {
            return None;
        }
    }
    let idx = chars.next().map(|(i, _)| i).unwrap_or(s.len());
    Some(&s[idx..])
}

/// Remainder of `line` after one of `labels`, or `None` if no label starts it.
fn label_value<'a>(line: &'a str, labels: &[String]) -> Option<&'a str> {
    let line = line.trim_start().trim_start_matches(['-', '*', '#', '•', ' ']);
    labels.iter().find_map(|label| {
        let rest = strip_prefix_ci(line, label)?;
        if rest.chars().next().is_some_and(char::is_alphanumeric) {
            return None;
        }
        Some(
            rest.trim_start_matches(|c: char| {
                c == '*' || c == ':' || c == '-' || c == '—' || c == '–' || c.is_whitespace()
            })
            .trim_end_matches('*')
            .trim(),
        )
    })
}

fn looks_like_field(line: &str) -> bool {
    let line = line.trim();
    match line.find(':') {
        Some(idx) => idx > 0 && line[..idx].split_whitespace().count() <= 4,
        None => false,
    }
}

/// Verbatim value of the first labelled field at or after line `start_line`.
///
/// The value is the rest of the label line. When that is empty, the
/// following lines up to a blank line or the next `Field:` line are used.
pub fn extract_response_field(text: &str, labels: &[String], start_line: usize) -> Option<String> {
    let lines: Vec<&str> = text.lines().collect();
    for (idx, line) in lines.iter().enumerate().skip(start_line) {
        let Some(value) = label_value(line, labels) else {
            continue;
        };
        if !value.is_empty() {
            return Some(value.to_string());
        }
        let body: Vec<&str> = lines[idx + 1..]
            .iter()
            .map(|l| l.trim())
            .take_while(|l| !l.is_empty() && !looks_like_field(l))
            .collect();
        if !body.is_empty() {
            return Some(body.join("\n"));
        }
    }
    None
}

/// Deterministic answer for an exact match, if the entry has a labelled field.
///
/// Full-text matches search from the line that matched the candidate, so a
/// document holding many entries answers with the right one.
pub fn runbook_answer(result: &MatchResult, policy: &ResponsePolicy) -> Option<String> {
    let start_line = match (result.match_type(), result.matched_candidate.as_deref()) {
        (MatchType::FullText, Some(candidate)) => matching_line(&result.text, candidate).unwrap_or(0),
        (MatchType::Semantic, _) => return None,
        _ => 0,
    };
    extract_response_field(&result.text, &policy.labels, start_line)
}

fn truncate_chars(text: &str, max_chars: usize) -> (&str, bool) {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => (&text[..idx], true),
        None => (text, false),
    }
}

/// Multi-document context: one `Document:` block per result, each excerpted.
pub fn build_context(results: &[MatchResult], excerpt_chars: usize) -> String {
    results
        .iter()
        .map(|r| {
            let (excerpt, truncated) = truncate_chars(&r.text, excerpt_chars);
            let ellipsis = if truncated { "..." } else { "" };
            format!("Document: {}\n{}{}", r.metadata.filename, excerpt, ellipsis)
        })
        .collect::<Vec<_>>()
        .join("\n\n")
}

/// The single completion prompt sent for an alert.
pub fn build_prompt(instructions: &str, context: &str, alert_text: &str, labels: &[String]) -> String {
    let field = labels
        .iter()
        .map(|l| format!("\"{l}\""))
        .collect::<Vec<_>>()
        .join(" / ");
    format!(
        "{instructions}\n\n\
         DOCUMENTATION:\n{context}\n\n\
         ALERT TO LOOK UP:\n{alert_text}\n\n\
         INSTRUCTIONS:\n\
         1. Find the documentation entry whose title names this alert.\n\
         2. Reply with the text of its {field} field, copied exactly.\n\
         3. If no entry names this alert, reply exactly: {NOT_FOUND}\n\n\
         FORBIDDEN:\n\
         - meta-commentary such as \"Analysis:\", \"Result:\" or \"Answer:\"\n\
         - paraphrasing, summarising or explaining the documentation\n\
         - any text besides the copied field or the not-found reply\n\n\
         ANSWER:"
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{MatchMetadata, StoredDocument};

    fn policy() -> ResponsePolicy {
        ResponsePolicy::default()
    }

    #[test]
    fn test_collapse_repeated_phrases() {
        assert_eq!(collapse_repeats("restart nginx restart nginx"), "restart nginx");
        assert_eq!(collapse_repeats("go go go now"), "go now");
        assert_eq!(
            collapse_repeats("найден алерт найден алерт restart nginx restart nginx"),
            "найден алерт restart nginx"
        );
    }

    #[test]
    fn test_collapse_keeps_doubled_letters_and_distinct_words() {
        assert_eq!(collapse_repeats("kill the llama process"), "kill the llama process");
        assert_eq!(collapse_repeats("aaa bbb"), "aaa bbb");
        assert_eq!(collapse_repeats("restart nginx"), "restart nginx");
    }

    #[test]
    fn test_sanitize_scenario_repeated_preamble_and_phrase() {
        let out = sanitize("найден алерт найден алерт restart nginx restart nginx", &policy());
        assert!(out == "restart nginx" || out == NOT_FOUND, "got {out}");
    }

    #[test]
    fn test_sanitize_strips_preamble_and_keeps_answer() {
        let out = sanitize(
            "Answer:   Restart the payment gateway pods and check queue depth",
            &policy(),
        );
        assert_eq!(out, "Restart the payment gateway pods and check queue depth");
    }

    #[test]
    fn test_sanitize_strips_lead_in_clause() {
        let out = sanitize(
            "The correct answer is: Drain node, then reboot and verify health checks",
            &policy(),
        );
        assert_eq!(out, "Drain node, then reboot and verify health checks");
    }

    #[test]
    fn test_sanitize_keeps_answers_starting_with_label_words() {
        for answer in [
            "Response team must restart the payment gateway pods",
            "Result cache on web-01 must be flushed with redis-cli FLUSHALL",
            "Verify the checksum matches the release, then run: systemctl restart nginx",
        ] {
            assert_eq!(sanitize(answer, &policy()), answer);
        }
        assert_eq!(
            sanitize("Result: cache on web-01 must be flushed", &policy()),
            "cache on web-01 must be flushed"
        );
    }

    #[test]
    fn test_lead_in_only_before_first_colon() {
        let out = sanitize(
            "Run: systemctl restart nginx, the final answer is: done",
            &policy(),
        );
        assert_eq!(out, "Run: systemctl restart nginx, the final answer is: done");
    }

    #[test]
    fn test_all_patterns_compile() {
        assert!(WHITESPACE.is_some());
        assert!(PREAMBLE.is_some());
        assert!(LEAD_IN.is_some());
        assert_eq!(REPETITION_PATTERNS.len(), REPETITION_SOURCES.len());
    }

    #[test]
    fn test_sanitize_rejects_short_and_acknowledgements() {
        assert_eq!(sanitize("ok", &policy()), NOT_FOUND);
        assert_eq!(sanitize("Yes.", &policy()), NOT_FOUND);
        assert_eq!(sanitize("   ", &policy()), NOT_FOUND);
    }

    #[test]
    fn test_sanitize_rejects_dominant_word() {
        let out = sanitize(
            "restart service, restart pods, restart nodes, restart everything now",
            &policy(),
        );
        assert_eq!(out, NOT_FOUND);
        assert!(is_word_repetition("disk disk disk full now", 0.3));
        assert!(!is_word_repetition(
            "check disk usage then clean old logs on the host",
            0.3
        ));
    }

    #[test]
    fn test_sanitize_rejects_echoed_header() {
        let out = sanitize(
            "[Alerting] High CPU alert is the same as [Alerting] High CPU alert from before",
            &policy(),
        );
        assert_eq!(out, NOT_FOUND);
        assert_eq!(sanitize("High CPU Usage alert.", &policy()), NOT_FOUND);
    }

    #[test]
    fn test_threshold_is_configurable() {
        let loose = ResponsePolicy {
            repetition_threshold: 0.9,
            ..ResponsePolicy::default()
        };
        let text = "restart service, restart pods, restart nodes, restart everything now";
        assert_eq!(sanitize(text, &loose), text);
    }

    #[test]
    fn test_extract_field_same_line() {
        let text = "[Alerting] High CPU Usage alert\nКак реагировать: restart service X";
        assert_eq!(
            extract_response_field(text, &policy().labels, 0).as_deref(),
            Some("restart service X")
        );
    }

    #[test]
    fn test_extract_field_following_lines() {
        let text = "Disk Full\n\n**How to respond:**\n1. clean /var/log\n2. expand volume\n\nOwner: storage";
        assert_eq!(
            extract_response_field(text, &policy().labels, 0).as_deref(),
            Some("1. clean /var/log\n2. expand volume")
        );
    }

    #[test]
    fn test_extract_field_absent() {
        assert!(extract_response_field("just prose", &policy().labels, 0).is_none());
        assert!(extract_response_field("How to responders: x", &policy().labels, 0).is_none());
    }

    fn result(text: &str, match_type: MatchType, candidate: Option<&str>) -> MatchResult {
        let doc = StoredDocument {
            id: "d".to_string(),
            text: text.to_string(),
            filename: "runbook.md".to_string(),
            file_type: "md".to_string(),
            uploaded_at: String::new(),
        };
        let mut r = MatchResult::exact(&doc, match_type, candidate.unwrap_or(""));
        r.matched_candidate = candidate.map(str::to_string);
        r
    }

    #[test]
    fn test_runbook_answer_full_text_starts_at_matched_entry() {
        let text = "Network runbook\n\
                    z100 Link down\nHow to respond: replace cable\n\n\
                    z735 Invalid packets\nHow to respond: page netops";
        let r = result(text, MatchType::FullText, Some("z735"));
        assert_eq!(runbook_answer(&r, &policy()).as_deref(), Some("page netops"));
    }

    #[test]
    fn test_runbook_answer_never_for_semantic() {
        let mut r = result("How to respond: x y z", MatchType::FirstLine, None);
        r.metadata = MatchMetadata {
            match_type: MatchType::Semantic,
            ..r.metadata
        };
        assert!(runbook_answer(&r, &policy()).is_none());
    }

    #[test]
    fn test_build_context_truncates_per_document() {
        let long = result(&"x".repeat(20), MatchType::FirstLine, None);
        let short = result("short", MatchType::FirstLine, None);
        let ctx = build_context(&[long, short], 10);
        assert_eq!(
            ctx,
            format!("Document: runbook.md\n{}...\n\nDocument: runbook.md\nshort", "x".repeat(10))
        );
    }

    #[test]
    fn test_prompt_carries_context_alert_and_fallback() {
        let p = build_prompt("You are on call.", "CTX", "ALERT", &policy().labels);
        assert!(p.starts_with("You are on call."));
        assert!(p.contains("CTX"));
        assert!(p.contains("ALERT"));
        assert!(p.contains(NOT_FOUND));
        assert!(p.contains("\"How to respond\""));
    }

    #[test]
    fn test_error_message_shape() {
        assert_eq!(
            error_message("timed out"),
            "An error occurred while processing the request: timed out"
        );
    }
}
