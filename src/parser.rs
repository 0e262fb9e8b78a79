//! Response parser and validator
//!
//! Turns raw completion text into a validated `AnalysisResult` in two phases.
//!
//! Structured phase, first JSON object found wins:
//! 1. the body of the first fenced block (```json or bare ```)
//! 2. the whole trimmed text
//! 3. the span from the first `{` to the last `}`
//!
//! When none of those parse, each is retried once after repair:
//! - a `,` followed only by whitespace before `]` or `}` is dropped
//! - text with no `"` at all has every `'` swapped for `"`
//!
//! Object keys are matched ignoring case, `_`, `-` and spaces, so `risk_level`,
//! `riskLevel` and `Risk Level` are the same key.
//!
//! Labelled fallback, applied to the raw text when the structured phase
//! produced nothing valid:
//! 1. a label line is a line that, after leading `#`, `*`, `_`, `>` and an
//!    optional `1.` / `1)` enumerator, starts with a known label followed by
//!    `:` or end of line; text after the colon belongs to that section
//! 2. summary: all non-empty lines of its section joined with single spaces
//! 3. questions: list items (`-`, `*`, `+`, `•`, `1.`, `1)`); a non-item line
//!    directly after an item continues it; with no list items at all, lines
//!    ending in `?` are taken instead
//! 4. risk level: the first whitespace-separated word of its section with
//!    surrounding markdown emphasis, quotes and trailing punctuation removed
//!
//! Validation after either phase: non-empty summary, every question non-empty,
//! question count within bounds, risk level exactly Low/Medium/High ignoring
//! case. Nothing is padded, truncated or defaulted.

use crate::config::QuestionBounds;
use crate::error::AnalysisError;
use crate::models::{AnalysisResult, RiskLevel};
use crate::Result;
use serde_json::{Map, Value};
use tracing::debug;

#[derive(Debug, Clone, Default)]
pub struct ResponseParser {
    bounds: QuestionBounds,
}

/// Fields pulled out of a response before validation.
#[derive(Debug, Default, PartialEq)]
struct Candidate {
    summary: Option<String>,
    questions: Option<Vec<String>>,
    risk_level: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Section {
    Summary,
    Questions,
    Risk,
}

/// Longest alias first within each section.
const LABELS: &[(Section, &[&str])] = &[
    (
        Section::Summary,
        &["analysis summary", "transaction summary", "summary"],
    ),
    (Section::Questions, &["investigative questions", "questions"]),
    (
        Section::Risk,
        &["risk assessment", "risk_level", "risk level", "risklevel", "risk"],
    ),
];

impl ResponseParser {
    pub fn new(bounds: QuestionBounds) -> Self {
        Self { bounds }
    }

    pub fn parse(&self, raw: &str) -> Result<AnalysisResult> {
        let structured = extract_structured(raw).and_then(|c| self.validate(c));
        let structured_err = match structured {
            Ok(result) => return Ok(result),
            Err(reason) => reason,
        };

        debug!(reason = %structured_err, "Structured extraction failed, trying labelled fallback");

        match extract_labelled(raw).and_then(|c| self.validate(c)) {
            Ok(result) => Ok(result),
            Err(fallback_err) => Err(AnalysisError::MalformedResponse {
                reason: format!("structured: {}; labelled: {}", structured_err, fallback_err),
                raw: raw.to_string(),
            }),
        }
    }

    fn validate(&self, candidate: Candidate) -> std::result::Result<AnalysisResult, String> {
        let summary = candidate
            .summary
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .ok_or("missing or empty summary")?;

        let raw_questions = candidate.questions.ok_or("missing questions")?;
        let mut questions = Vec::with_capacity(raw_questions.len());
        for (i, q) in raw_questions.iter().enumerate() {
            let q = q.trim();
            if q.is_empty() {
                return Err(format!("question {} is empty", i + 1));
            }
            questions.push(q.to_string());
        }
        if !self.bounds.contains(questions.len()) {
            return Err(format!(
                "expected {}-{} questions, found {}",
                self.bounds.min,
                self.bounds.max,
                questions.len()
            ));
        }

        let risk_level: RiskLevel = candidate
            .risk_level
            .ok_or("missing risk level")?
            .parse()?;

        Ok(AnalysisResult::new_unchecked(summary, questions, risk_level))
    }
}

//
// ================= Structured phase =================
//

fn extract_structured(raw: &str) -> std::result::Result<Candidate, String> {
    let trimmed = raw.trim();

    let mut attempts: Vec<&str> = Vec::with_capacity(3);
    if let Some(body) = fenced_block(trimmed) {
        attempts.push(body);
    }
    attempts.push(trimmed);
    if let (Some(start), Some(end)) = (trimmed.find('{'), trimmed.rfind('}')) {
        if start < end {
            attempts.push(&trimmed[start..=end]);
        }
    }

    attempts
        .iter()
        .find_map(|text| parse_object(text))
        .or_else(|| {
            attempts
                .iter()
                .filter_map(|text| repair_json(text))
                .find_map(|text| parse_object(&text))
        })
        .ok_or_else(|| "no JSON object found".to_string())
        .and_then(|map| object_to_candidate(&map))
}

fn parse_object(text: &str) -> Option<Map<String, Value>> {
    match serde_json::from_str::<Value>(text) {
        Ok(Value::Object(map)) => Some(map),
        _ => None,
    }
}

/// Near-JSON fixed up for a second parse, or `None` if nothing changed.
fn repair_json(text: &str) -> Option<String> {
    let quoted = if text.contains('"') {
        text.to_string()
    } else {
        text.replace('\'', "\"")
    };

    let chars: Vec<char> = quoted.chars().collect();
    let mut repaired = String::with_capacity(quoted.len());
    let mut in_string = false;
    let mut escaped = false;

    for (i, &c) in chars.iter().enumerate() {
        if in_string {
            repaired.push(c);
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == '"' {
                in_string = false;
            }
            continue;
        }

        match c {
            '"' => {
                in_string = true;
                repaired.push(c);
            }
            ',' => {
                let next = chars[i + 1..].iter().find(|c| !c.is_whitespace());
                if !matches!(next, Some(']') | Some('}')) {
                    repaired.push(c);
                }
            }
            _ => repaired.push(c),
        }
    }

    (repaired != text).then_some(repaired)
}

fn fenced_block(text: &str) -> Option<&str> {
    let start = text.find("```")?;
    let after_fence = &text[start + 3..];
    // Skip the info string (e.g. `json`) up to the end of the line.
    let body_start = after_fence.find('\n').map(|i| i + 1).unwrap_or(0);
    let body = &after_fence[body_start..];
    let end = body.find("```")?;
    Some(body[..end].trim())
}

fn normalize_key(key: &str) -> String {
    key.chars()
        .filter(|c| !matches!(c, '_' | '-' | ' '))
        .flat_map(char::to_lowercase)
        .collect()
}

fn object_to_candidate(map: &Map<String, Value>) -> std::result::Result<Candidate, String> {
    let mut candidate = Candidate::default();

    for (key, value) in map {
        match normalize_key(key).as_str() {
            "summary" | "analysissummary" => {
                let text = value.as_str().ok_or("summary is not a string")?;
                candidate.summary = Some(text.to_string());
            }
            "questions" | "investigativequestions" => {
                let items = value.as_array().ok_or("questions is not an array")?;
                let mut questions = Vec::with_capacity(items.len());
                for (i, item) in items.iter().enumerate() {
                    let text = item
                        .as_str()
                        .ok_or_else(|| format!("question {} is not a string", i + 1))?;
                    questions.push(text.to_string());
                }
                candidate.questions = Some(questions);
            }
            "risklevel" | "risk" | "riskassessment" => {
                let text = value.as_str().ok_or("risk level is not a string")?;
                candidate.risk_level = Some(text.to_string());
            }
            _ => {}
        }
    }

    Ok(candidate)
}

//
// ================= Labelled fallback =================
//

fn extract_labelled(raw: &str) -> std::result::Result<Candidate, String> {
    let mut sections: Vec<(Section, Vec<&str>)> = Vec::new();
    let mut current: Option<usize> = None;

    for line in raw.lines() {
        if let Some((section, rest)) = match_label(line) {
            let index = match sections.iter().position(|(s, _)| *s == section) {
                Some(index) => index,
                None => {
                    sections.push((section, Vec::new()));
                    sections.len() - 1
                }
            };
            if !rest.is_empty() {
                sections[index].1.push(rest);
            }
            current = Some(index);
        } else if let Some(index) = current {
            sections[index].1.push(line);
        }
    }

    if sections.is_empty() {
        return Err("no field labels found".to_string());
    }

    let lines_of = |wanted: Section| {
        sections
            .iter()
            .find(|(s, _)| *s == wanted)
            .map(|(_, lines)| lines.as_slice())
    };

    Ok(Candidate {
        summary: lines_of(Section::Summary).map(join_summary),
        questions: lines_of(Section::Questions).map(collect_questions),
        risk_level: lines_of(Section::Risk).and_then(first_risk_token),
    })
}

fn strip_emphasis(text: &str) -> &str {
    text.trim_matches(|c: char| c == '*' || c == '_' || c.is_whitespace())
}

/// Length of a leading `12.` / `12)` enumerator including following whitespace.
fn enumerator_len(text: &str) -> Option<usize> {
    let digits = text.chars().take_while(|c| c.is_ascii_digit()).count();
    if digits == 0 {
        return None;
    }
    let rest = &text[digits..];
    if !(rest.starts_with('.') || rest.starts_with(')')) {
        return None;
    }
    let after = &rest[1..];
    let spaces = after.len() - after.trim_start().len();
    if spaces == 0 && !after.is_empty() {
        return None;
    }
    Some(digits + 1 + spaces)
}

fn match_label(line: &str) -> Option<(Section, &str)> {
    let mut text = line
        .trim()
        .trim_start_matches(|c: char| matches!(c, '#' | '*' | '_' | '>') || c.is_whitespace());
    if let Some(len) = enumerator_len(text) {
        text = text[len..].trim_start_matches(|c: char| c == '*' || c == '_');
    }

    for (section, aliases) in LABELS {
        for alias in *aliases {
            let Some(head) = text.get(..alias.len()) else {
                continue;
            };
            if !head.eq_ignore_ascii_case(alias) {
                continue;
            }
            let rest = text[alias.len()..].trim_start_matches(|c: char| c == '*' || c == '_');
            let rest = rest.trim_start();
            if rest.is_empty() {
                return Some((*section, ""));
            }
            if let Some(content) = rest.strip_prefix(':') {
                return Some((*section, strip_emphasis(content)));
            }
        }
    }

    None
}

fn join_summary(lines: &[&str]) -> String {
    lines
        .iter()
        .map(|l| strip_emphasis(l))
        .filter(|l| !l.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

fn list_item(line: &str) -> Option<&str> {
    let text = line.trim_start();
    for marker in ['-', '*', '+', '•'] {
        if let Some(rest) = text.strip_prefix(marker) {
            if rest.is_empty() || rest.starts_with(char::is_whitespace) {
                return Some(rest.trim());
            }
        }
    }
    enumerator_len(text).map(|len| text[len..].trim())
}

fn collect_questions(lines: &[&str]) -> Vec<String> {
    let mut items: Vec<String> = Vec::new();
    let mut continuing = false;

    for line in lines {
        if let Some(item) = list_item(line) {
            items.push(item.to_string());
            continuing = true;
        } else if line.trim().is_empty() {
            continuing = false;
        } else if continuing {
            if let Some(last) = items.last_mut() {
                if !last.is_empty() {
                    last.push(' ');
                }
                last.push_str(line.trim());
            }
        }
    }

    if items.is_empty() {
        items = lines
            .iter()
            .map(|l| l.trim())
            .filter(|l| l.ends_with('?'))
            .map(str::to_string)
            .collect();
    }

    items
}

fn first_risk_token(lines: &[&str]) -> Option<String> {
    lines
        .iter()
        .flat_map(|l| l.split_whitespace())
        .next()
        .map(|word| {
            word.trim_matches(|c: char| matches!(c, '*' | '_' | '"' | '\'' | '`'))
                .trim_end_matches(|c: char| matches!(c, '.' | ',' | ';' | ':' | '!'))
                .to_string()
        })
}
