//! Turning raw LLM completions into typed records.
//!
//! The model is asked for a single JSON object but routinely wraps it in
//! prose, fences it, leaves raw newlines inside string values, or embeds
//! unescaped quotes in generated source code. `normalize` works through an
//! ordered chain of strategies and never panics:
//!
//!   1. direct parse of the whole text
//!   2. greedy `{...}` extraction, then parse
//!   3. string repair (interior quotes, raw control chars), then 2 again
//!   4. per-field scraping with regexes
//!
//! If nothing can be established a `ParseFailure` carries a bounded sample
//! of the raw text.

use std::sync::OnceLock;

use regex::Regex;
use serde_json::{Map, Value};
use tracing::{debug, warn};

use crate::domain::{McqQuestion, McqSet, ParseFailure, VisualizationRecord};
use crate::util::trunc_for_log;

fn cached(cell: &'static OnceLock<Regex>, pattern: &str) -> &'static Regex {
  cell.get_or_init(|| Regex::new(pattern).expect("static regex must compile"))
}

/// Greedy outermost-brace span: first `{` to last `}`.
fn object_span_re() -> &'static Regex {
  static RE: OnceLock<Regex> = OnceLock::new();
  cached(&RE, r"(?s)\{.*\}")
}

/// Normalize a visualization completion.
pub fn normalize(raw: &str) -> Result<VisualizationRecord, ParseFailure> {
  if let Some(obj) = extract_json_object(raw) {
    return Ok(VisualizationRecord::from_object(obj));
  }

  debug!(target: "normalize", raw_len = raw.len(), "JSON stages failed; scraping fields");
  let scraped = scrape_fields(raw);
  if scraped.is_empty() {
    warn!(target: "normalize", raw_len = raw.len(), sample = %trunc_for_log(raw, 120), "No field could be recovered");
    return Err(ParseFailure::new(
      "response did not contain a recognizable JSON object or field",
      raw,
    ));
  }
  Ok(scraped)
}

/// JSON stages 1–3. Returns the first top-level object recovered.
pub fn extract_json_object(raw: &str) -> Option<Map<String, Value>> {
  // 1) direct
  if let Some(obj) = parse_object(raw) {
    return Some(obj);
  }
  debug!(target: "normalize", "Direct JSON parse failed");

  // 2) greedy span
  let span = object_span_re().find(raw).map(|m| m.as_str());
  if let Some(s) = span {
    if let Some(obj) = parse_object(s) {
      return Some(obj);
    }
    debug!(target: "normalize", span_len = s.len(), "Extracted span is not valid JSON; repairing");
  }

  // 3) repair, then extract again
  let repaired = repair_strings(span.unwrap_or(raw));
  let s = object_span_re().find(&repaired)?.as_str();
  let obj = parse_object(s);
  if obj.is_none() {
    debug!(target: "normalize", "Repaired JSON still invalid");
  }
  obj
}

fn parse_object(text: &str) -> Option<Map<String, Value>> {
  match serde_json::from_str::<Value>(text.trim()) {
    Ok(Value::Object(map)) => Some(map),
    _ => None,
  }
}

// ---------------- stage 3: string repair ----------------

#[derive(Clone, Copy)]
enum Frame {
  Object { expect_key: bool },
  Array,
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum StrRole {
  Key,
  ObjectValue,
  ArrayValue,
  Bare,
}

/// Re-escape interior double quotes and raw control characters inside JSON
/// string literals. A `"` only terminates a string when the text after it is
/// grammatical for the string's position; otherwise it is escaped.
pub fn repair_strings(text: &str) -> String {
  let mut out = String::with_capacity(text.len() + 16);
  let mut stack: Vec<Frame> = Vec::new();
  let mut role: Option<StrRole> = None;
  let mut chars = text.char_indices();

  while let Some((i, c)) = chars.next() {
    match role {
      Some(r) => match c {
        '\\' => {
          out.push('\\');
          if let Some((_, next)) = chars.next() {
            out.push(next);
          }
        }
        '"' => {
          if closes_string(r, &text[i + 1..]) {
            out.push('"');
            role = None;
          } else {
            out.push_str("\\\"");
          }
        }
        '\n' => out.push_str("\\n"),
        '\r' => out.push_str("\\r"),
        '\t' => out.push_str("\\t"),
        c if c.is_control() => out.push_str(&format!("\\u{:04x}", c as u32)),
        c => out.push(c),
      },
      None => {
        match c {
          '"' => {
            role = Some(match stack.last() {
              Some(Frame::Object { expect_key: true }) => StrRole::Key,
              Some(Frame::Object { expect_key: false }) => StrRole::ObjectValue,
              Some(Frame::Array) => StrRole::ArrayValue,
              None => StrRole::Bare,
            });
          }
          '{' => stack.push(Frame::Object { expect_key: true }),
          '[' => stack.push(Frame::Array),
          '}' | ']' => {
            stack.pop();
          }
          ':' => {
            if let Some(Frame::Object { expect_key }) = stack.last_mut() {
              *expect_key = false;
            }
          }
          ',' => {
            if let Some(Frame::Object { expect_key }) = stack.last_mut() {
              *expect_key = true;
            }
          }
          _ => {}
        }
        out.push(c);
      }
    }
  }
  out
}

fn closes_string(role: StrRole, rest: &str) -> bool {
  let after = rest.trim_start();
  match role {
    StrRole::Bare => true,
    StrRole::Key => after.starts_with(':'),
    StrRole::ObjectValue => {
      after.is_empty()
        || after.starts_with('}')
        || after.strip_prefix(',').is_some_and(starts_with_key)
    }
    StrRole::ArrayValue => {
      after.is_empty()
        || after.starts_with(']')
        || after.strip_prefix(',').is_some_and(|s| s.trim_start().starts_with('"'))
    }
  }
}

/// `"<key>"\s*:` at the start of `s` (after whitespace).
fn starts_with_key(s: &str) -> bool {
  static RE: OnceLock<Regex> = OnceLock::new();
  cached(&RE, r#"^\s*"(?:[^"\\\n]|\\.)*"\s*:"#).is_match(s)
}

// ---------------- stage 4: field scraping ----------------

fn code_fenced_re() -> &'static Regex {
  static RE: OnceLock<Regex> = OnceLock::new();
  cached(&RE, r#"(?s)["']code["']\s*:\s*["']```[A-Za-z0-9_+.-]*[ \t]*(?:\r?\n|\\n)?(.*?)(?:\r?\n|\\n)?```\s*["']"#)
}

fn code_until_comma_re() -> &'static Regex {
  static RE: OnceLock<Regex> = OnceLock::new();
  cached(&RE, r#"(?s)["']code["']\s*:\s*["'](.*?)["']\s*,"#)
}

fn code_loose_re() -> &'static Regex {
  static RE: OnceLock<Regex> = OnceLock::new();
  cached(&RE, r#"(?s)["']code["']\s*:\s*["'](.*?)["']"#)
}

const STRING_FIELDS: [&str; 3] = ["summary", "conceptName", "interactivityNotes"];
const LIST_FIELDS: [&str; 2] = ["keyPrinciples", "learningObjectives"];

fn field_re(template: &str, name: &str) -> Regex {
  Regex::new(&template.replace("{name}", &regex::escape(name))).expect("field regex must compile")
}

/// One pattern per string field; the value is a double-quoted string honoring backslash escapes.
fn string_field_res() -> &'static [Regex; 3] {
  static RES: OnceLock<[Regex; 3]> = OnceLock::new();
  RES.get_or_init(|| STRING_FIELDS.map(|name| field_re(r#"(?s)["']{name}["']\s*:\s*"((?:[^"\\]|\\.)*)""#, name)))
}

fn list_field_res() -> &'static [Regex; 2] {
  static RES: OnceLock<[Regex; 2]> = OnceLock::new();
  RES.get_or_init(|| LIST_FIELDS.map(|name| field_re(r#"(?s)["']{name}["']\s*:\s*\[(.*?)\]"#, name)))
}

/// Last-resort per-field extraction. Missing fields stay empty.
pub fn scrape_fields(text: &str) -> VisualizationRecord {
  let mut rec = VisualizationRecord::default();

  if let Some(c) = code_fenced_re().captures(text) {
    rec.code = unescape_json_fragment(&c[1]);
  } else if let Some(c) = code_until_comma_re()
    .captures(text)
    .or_else(|| code_loose_re().captures(text))
  {
    rec.code = unescape_json_fragment(&c[1]);
  }

  let scrape_str = |re: &Regex| -> String {
    re.captures(text).map(|c| unescape_json_fragment(&c[1])).unwrap_or_default()
  };
  let [summary, concept_name, interactivity_notes] = string_field_res();
  rec.summary = scrape_str(summary);
  rec.concept_name = scrape_str(concept_name);
  rec.interactivity_notes = scrape_str(interactivity_notes);

  let scrape_list = |re: &Regex| -> Vec<String> {
    re.captures(text).map(|c| split_list_items(&c[1])).unwrap_or_default()
  };
  let [key_principles, learning_objectives] = list_field_res();
  rec.key_principles = scrape_list(key_principles);
  rec.learning_objectives = scrape_list(learning_objectives);

  rec
}

/// Split the inside of a `[...]` on commas that are not inside quotes, then
/// strip quote delimiters.
pub fn split_list_items(body: &str) -> Vec<String> {
  let mut items = Vec::new();
  let mut cur = String::new();
  let mut quote: Option<char> = None;
  let mut escaped = false;

  for c in body.chars() {
    if escaped {
      cur.push(c);
      escaped = false;
      continue;
    }
    match (quote, c) {
      (Some(_), '\\') => {
        cur.push(c);
        escaped = true;
      }
      (Some(q), c) if c == q => {
        cur.push(c);
        quote = None;
      }
      (None, '"') | (None, '\'') => {
        cur.push(c);
        quote = Some(c);
      }
      (None, ',') => items.push(std::mem::take(&mut cur)),
      _ => cur.push(c),
    }
  }
  items.push(cur);

  items
    .into_iter()
    .map(|item| strip_quotes(item.trim()))
    .filter(|s| !s.is_empty())
    .collect()
}

fn strip_quotes(s: &str) -> String {
  let inner = s
    .strip_prefix(['"', '\''])
    .unwrap_or(s);
  let inner = inner.strip_suffix(['"', '\'']).unwrap_or(inner);
  unescape_json_fragment(inner)
}

/// Decode JSON string escapes in a fragment captured from between quotes.
/// Falls back to replacing the common escapes when the fragment is not a
/// valid JSON string body (e.g. it holds raw newlines).
pub fn unescape_json_fragment(s: &str) -> String {
  if !s.contains('\\') {
    return s.to_string();
  }
  if let Ok(decoded) = serde_json::from_str::<String>(&format!("\"{s}\"")) {
    return decoded;
  }
  let mut out = String::with_capacity(s.len());
  let mut chars = s.chars();
  while let Some(c) = chars.next() {
    if c != '\\' {
      out.push(c);
      continue;
    }
    match chars.next() {
      Some('n') => out.push('\n'),
      Some('t') => out.push('\t'),
      Some('r') => out.push('\r'),
      Some('"') => out.push('"'),
      Some('\\') => out.push('\\'),
      Some('/') => out.push('/'),
      Some(other) => {
        out.push('\\');
        out.push(other);
      }
      None => out.push('\\'),
    }
  }
  out
}

/// Undo one level of escaping when generated code arrived double-escaped:
/// it contains `\n` sequences but not a single real newline.
pub fn unescape_double_escaped_code(code: &str) -> String {
  if code.contains('\n') || !code.contains("\\n") {
    return code.to_string();
  }
  unescape_json_fragment(code)
}

/// Normalize an MCQ completion. Questions that do not fit the schema (four
/// options, `correctAnswer` in 0..=3) are dropped; an empty set is a failure.
pub fn normalize_mcq(raw: &str) -> Result<McqSet, ParseFailure> {
  let Some(mut obj) = extract_json_object(raw) else {
    warn!(target: "normalize", raw_len = raw.len(), "MCQ response has no JSON object");
    return Err(ParseFailure::new("response did not contain a JSON object", raw));
  };
  let items = match obj.remove("questions") {
    Some(Value::Array(items)) => items,
    _ => return Err(ParseFailure::new("response has no \"questions\" array", raw)),
  };

  let total = items.len();
  let questions: Vec<McqQuestion> = items
    .into_iter()
    .enumerate()
    .filter_map(|(i, item)| match serde_json::from_value::<McqQuestion>(item) {
      Ok(q) if q.correct_answer <= 3 => Some(q),
      Ok(q) => {
        warn!(target: "normalize", index = i, correct_answer = q.correct_answer, "Dropping question with out-of-range answer");
        None
      }
      Err(e) => {
        warn!(target: "normalize", index = i, error = %e, "Dropping malformed question");
        None
      }
    })
    .collect();

  if questions.is_empty() {
    return Err(ParseFailure::new(format!("none of {total} questions were usable"), raw));
  }
  debug!(target: "normalize", kept = questions.len(), total, "MCQ set normalized");
  Ok(McqSet { questions })
}
