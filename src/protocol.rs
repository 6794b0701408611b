//! Public request/response structs for the HTTP endpoints (serde ready).
//! Field names follow the existing frontend (camelCase, `apiKeyFormate`).

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::domain::{InputSource, McqSet, RemixVersion, VisualizationFormat, VisualizationRecord};

//
// Requests
//

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateIn {
  pub source: Option<InputSource>,
  pub input: Option<String>,
  #[serde(default)]
  pub format: VisualizationFormat,
  #[serde(default, alias = "apiKey")]
  pub api_key_formate: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemixIn {
  pub source: Option<InputSource>,
  pub input: Option<String>,
  #[serde(default)]
  pub format: VisualizationFormat,
  pub existing_code: Option<String>,
  #[serde(default)]
  pub remix_version: RemixVersion,
  #[serde(default, alias = "apiKey")]
  pub api_key_formate: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct McqIn {
  pub summary: Option<String>,
  #[serde(default, alias = "apiKey")]
  pub api_key_formate: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageIn {
  pub file: Option<String>,
  #[serde(default, alias = "format")]
  pub formate: VisualizationFormat,
  #[serde(default, alias = "apiKey")]
  pub api_key_formate: Option<String>,
}

//
// Responses
//

#[derive(Debug, Serialize)]
pub struct HealthOut { pub ok: bool }

#[derive(Debug, Serialize, PartialEq)]
pub struct ConceptOut {
  pub name: String,
  pub principles: Vec<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateOut {
  pub success: bool,
  pub summary: String,
  pub code_outputs: BTreeMap<VisualizationFormat, String>,
  pub concept: ConceptOut,
  pub interactivity_notes: Option<String>,
  pub learning_objectives: Vec<String>,
}

impl GenerateOut {
  pub fn from_record(format: VisualizationFormat, rec: VisualizationRecord) -> Self {
    let mut code_outputs = BTreeMap::new();
    code_outputs.insert(format, rec.code);
    Self {
      success: true,
      summary: rec.summary,
      code_outputs,
      concept: ConceptOut { name: rec.concept_name, principles: rec.key_principles },
      interactivity_notes: Some(rec.interactivity_notes).filter(|s| !s.is_empty()),
      learning_objectives: rec.learning_objectives,
    }
  }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RemixOut {
  #[serde(flatten)]
  pub base: GenerateOut,
  pub fixes: Vec<String>,
  pub debug_info: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct McqOut {
  pub success: bool,
  pub mcq: McqSet,
}

#[derive(Debug, Serialize)]
pub struct ImageOut {
  pub success: bool,
  pub format: VisualizationFormat,
  pub prompt_name: String,
  pub prompt: String,
  pub wikipedia_link: String,
  pub summary: String,
  pub code: String,
}

#[derive(Debug, Serialize)]
pub struct ErrorOut {
  pub success: bool,
  pub error: String,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub details: Option<String>,
}
