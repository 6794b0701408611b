//! Domain models: visualization formats, input sources, the normalized
//! visualization record, MCQ sets and the parse-failure value.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

/// Supported visualization code targets.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
#[serde(rename_all = "lowercase")]
pub enum VisualizationFormat {
  #[default]
  P5js,
  Threejs,
  D3js,
  Mermaidjs,
}

struct FormatEntry {
  format: VisualizationFormat,
  wire: &'static str,
  label: &'static str,
  guidelines: &'static str,
}

const FORMAT_TABLE: [FormatEntry; 4] = [
  FormatEntry {
    format: VisualizationFormat::P5js,
    wire: "p5js",
    label: "p5.js",
    guidelines: "For p5.js visualization:
- Create a complete sketch with both setup() and draw() functions
- Use clear and meaningful variable names for better readability
- Add explanatory comments to clarify key functions and logic
- Implement appropriate user interactions (mouse/keyboard)
- Use color effectively to highlight important elements
- Include animation that demonstrates dynamic principles
- Use an appropriate canvas size (recommended: 400x400 pixels)
- Add visual indicators that explain what's happening
- The generated code must run without errors",
  },
  FormatEntry {
    format: VisualizationFormat::Threejs,
    wire: "threejs",
    label: "Three.js",
    guidelines: "For three.js visualization:
- Provide a valid three.js code snippet
- Give working code without any imports
- For positions use geometry.attributes.position instead of geometry.vertices",
  },
  FormatEntry {
    format: VisualizationFormat::D3js,
    wire: "d3js",
    label: "D3.js",
    guidelines: "For D3.js visualization:
- Create a complete visualization with appropriate SVG elements to represent data effectively
- Use scales and axes appropriately when displaying data
- Implement interactions that reveal additional information
- Use color effectively to distinguish data categories
- Add transitions to show changes over time or between states
- Include appropriate labels or a legend to improve clarity and usability
- Ensure the visualization is self-explanatory",
  },
  FormatEntry {
    format: VisualizationFormat::Mermaidjs,
    wire: "mermaidjs",
    label: "Mermaid.js",
    guidelines: "For Mermaid.js diagram:
- Choose the most suitable diagram type for the concept (flowchart, sequence, class, state, etc.)
- Use clear and concise node labels to improve readability
- Organize nodes logically to show relationships or processes
- Use directional arrows to show flow, transitions or dependencies
- Include a clear starting point in process-based diagrams
- Keep the diagram focused on key elements (avoid excessive detail)
- Give only the diagram source, without any ```mermaid fences",
  },
];

impl VisualizationFormat {
  fn entry(self) -> &'static FormatEntry {
    // Table order mirrors the enum declaration order.
    let e = &FORMAT_TABLE[self as usize];
    debug_assert_eq!(e.format, self);
    e
  }

  /// Key used on the wire and in `codeOutputs`.
  pub fn as_str(self) -> &'static str { self.entry().wire }

  /// Human-facing library name used inside prompts.
  pub fn label(self) -> &'static str { self.entry().label }

  /// Format-specific prompt guidance.
  pub fn guidelines(self) -> &'static str { self.entry().guidelines }
}

impl std::fmt::Display for VisualizationFormat {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.write_str(self.as_str())
  }
}

/// Where the topic text came from.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum InputSource {
  /// `input` is a Wikipedia article URL; the intro extract is fetched.
  Wikipedia,
  /// `input` is free text describing the concept.
  #[serde(alias = "prompt")]
  Concept,
  /// Topic originally came from a flashcard image.
  Image,
}

impl InputSource {
  pub fn as_str(self) -> &'static str {
    match self {
      InputSource::Wikipedia => "wikipedia",
      InputSource::Concept => "concept",
      InputSource::Image => "image",
    }
  }
}

/// Which kind of revision a remix asks for.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Default)]
pub enum RemixVersion {
  /// Nothing displayed: review and fix errors.
  #[default]
  #[serde(rename = "1")]
  Fix,
  /// Rendering works but layout of boxes/labels is off.
  #[serde(rename = "2")]
  Layout,
  /// Add inline controls for key variables.
  #[serde(rename = "3")]
  Interactive,
}

/// Canonical structured output every caller relies on.
/// `code` is always a string, possibly empty.
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct VisualizationRecord {
  pub code: String,
  pub summary: String,
  pub concept_name: String,
  pub key_principles: Vec<String>,
  pub interactivity_notes: String,
  pub learning_objectives: Vec<String>,
  /// Top-level keys outside the six above (e.g. `fixes`, `debugInfo`).
  #[serde(skip)]
  pub extra: Map<String, Value>,
}

impl VisualizationRecord {
  /// Build a record from a parsed JSON object. Wrong-typed or missing fields
  /// fall back to their empty value.
  pub fn from_object(obj: Map<String, Value>) -> Self {
    let mut rec = VisualizationRecord::default();
    for (key, value) in obj {
      match key.as_str() {
        "code" => rec.code = value_to_string(&value),
        "summary" => rec.summary = value_to_string(&value),
        "conceptName" => rec.concept_name = value_to_string(&value),
        "keyPrinciples" => rec.key_principles = value_to_string_list(&value),
        "interactivityNotes" => rec.interactivity_notes = value_to_string(&value),
        "learningObjectives" => rec.learning_objectives = value_to_string_list(&value),
        _ => {
          rec.extra.insert(key, value);
        }
      }
    }
    rec
  }

  /// True when no recognized field carries content.
  pub fn is_empty(&self) -> bool {
    self.code.is_empty()
      && self.summary.is_empty()
      && self.concept_name.is_empty()
      && self.key_principles.is_empty()
      && self.interactivity_notes.is_empty()
      && self.learning_objectives.is_empty()
  }

  /// String-list view of an extra key (e.g. remix `fixes`).
  pub fn extra_list(&self, key: &str) -> Vec<String> {
    self.extra.get(key).map(value_to_string_list).unwrap_or_default()
  }

  /// String view of an extra key; None when absent or null.
  pub fn extra_str(&self, key: &str) -> Option<String> {
    match self.extra.get(key) {
      None | Some(Value::Null) => None,
      Some(v) => Some(value_to_string(v)),
    }
  }
}

fn value_to_string(v: &Value) -> String {
  match v {
    Value::String(s) => s.clone(),
    Value::Null => String::new(),
    Value::Bool(_) | Value::Number(_) => v.to_string(),
    // Nested structures are kept as compact JSON rather than dropped.
    Value::Array(_) | Value::Object(_) => v.to_string(),
  }
}

fn value_to_string_list(v: &Value) -> Vec<String> {
  match v {
    Value::Array(items) => items
      .iter()
      .map(value_to_string)
      .filter(|s| !s.is_empty())
      .collect(),
    Value::Null => Vec::new(),
    other => {
      let s = value_to_string(other);
      if s.is_empty() { Vec::new() } else { vec![s] }
    }
  }
}

/// Returned instead of a record when every extraction strategy failed.
#[derive(Clone, Debug, Error, Serialize, PartialEq, Eq)]
#[error("{error_kind}: {error_details}")]
#[serde(rename_all = "camelCase")]
pub struct ParseFailure {
  pub error_kind: &'static str,
  pub error_details: String,
  pub raw_response_sample: String,
}

pub const RAW_SAMPLE_CHARS: usize = 500;

impl ParseFailure {
  pub fn new(details: impl Into<String>, raw: &str) -> Self {
    Self {
      error_kind: "parse_failed",
      error_details: details.into(),
      raw_response_sample: raw.chars().take(RAW_SAMPLE_CHARS).collect(),
    }
  }
}

/// One multiple-choice question.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct McqQuestion {
  pub question: String,
  pub options: [String; 4],
  pub correct_answer: u8,
  #[serde(default)] pub explanation: String,
  #[serde(default)] pub blooms_level: String,
  #[serde(default)] pub related_learning_objective: String,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
pub struct McqSet {
  pub questions: Vec<McqQuestion>,
}
