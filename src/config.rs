//! Service configuration: model settings, retry policy, and prompt templates.
//!
//! Everything has a default; an optional TOML file (MICROSIM_CONFIG_PATH)
//! overrides any subset. See `ServiceConfig` for the expected schema.

use serde::Deserialize;
use tracing::{error, info};

use crate::completion::RetryPolicy;

#[derive(Clone, Debug, Deserialize, Default)]
#[serde(default)]
pub struct ServiceConfig {
  pub models: ModelSettings,
  pub retry: RetrySettings,
  pub prompts: Prompts,
}

/// Model ids and sampling settings per route.
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct ModelSettings {
  pub generate_model: String,
  pub remix_model: String,
  pub mcq_model: String,
  pub image_model: String,
  pub max_tokens: u32,
  pub temperature: f32,
  pub mcq_temperature: f32,
  /// Per-attempt HTTP timeout for provider calls.
  pub timeout_secs: u64,
  /// Largest request body accepted (image uploads dominate).
  pub max_body_bytes: usize,
}

impl Default for ModelSettings {
  fn default() -> Self {
    Self {
      generate_model: "claude-3-7-sonnet-20250219".into(),
      remix_model: "claude-3-7-sonnet-20250219".into(),
      mcq_model: "claude-3-opus-20240229".into(),
      image_model: "claude-3-7-sonnet-20250219".into(),
      max_tokens: 4096,
      temperature: 0.2,
      mcq_temperature: 0.3,
      timeout_secs: 120,
      max_body_bytes: 10 * 1024 * 1024,
    }
  }
}

#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct RetrySettings {
  pub max_retries: usize,
  pub delay_ms: u64,
}

impl Default for RetrySettings {
  fn default() -> Self {
    let p = RetryPolicy::default();
    Self { max_retries: p.max_retries, delay_ms: p.delay.as_millis() as u64 }
  }
}

impl RetrySettings {
  pub fn policy(&self) -> RetryPolicy {
    RetryPolicy::new(self.max_retries, self.delay_ms)
  }
}

/// Prompt templates. Placeholders are `{name}` and are filled with
/// `util::fill_template`.
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct Prompts {
  /// {source} {content} {format} {guidelines}
  pub visualization_template: String,
  /// {format}
  pub remix_fix_preamble: String,
  pub remix_layout_preamble: String,
  pub remix_interactive_preamble: String,
  /// {preamble} {content} {existing_code} {format} {guidelines}
  pub remix_template: String,
  /// {summary}
  pub mcq_template: String,
  /// {format} {guidelines}
  pub image_template: String,
}

impl Default for Prompts {
  fn default() -> Self {
    Self {
      visualization_template: r#"You are an expert educational content creator specializing in converting concepts into interactive visualizations. Your task is to analyze the provided {source} and generate code in {format} that creates an effective educational visualization.

INPUT ({source}):
{content}

VISUALIZATION REQUIREMENTS:
1. Create executable code that clearly demonstrates the main educational concept
2. Focus on visual clarity and interactivity appropriate for learning
3. Include appropriate annotations or labels in the visualization
4. Ensure the code is complete and can run standalone in a browser environment
5. Design the visualization to be engaging for high school or undergraduate students

FORMAT-SPECIFIC GUIDELINES:
{guidelines}

EDUCATIONAL GOALS:
- The visualization should help students understand abstract concepts through visual representation
- Interactive elements should allow exploration of key principles
- The simulation should demonstrate cause-effect relationships where applicable
- Complexity should be appropriate for educational purposes (not overly simplified or complex)

OUTPUT FORMAT:
Return your response as a valid JSON object with the following structure.
IMPORTANT: For the "code" field, ensure all quotes and special characters are properly escaped for JSON.
When including code, escape all double quotes with backslash (\") and escape all newlines with \n.
Do not include any explanation or text outside this JSON structure:

{
  "code": "// Complete, executable code here with all quotes and special characters properly escaped",
  "summary": "2-3 paragraph educational summary explaining the concept",
  "conceptName": "The main concept name",
  "keyPrinciples": ["Principle 1", "Principle 2", "Principle 3"],
  "interactivityNotes": "Brief explanation of how users can interact with the simulation",
  "learningObjectives": ["Learning objective 1", "Learning objective 2"]
}"#.into(),
      remix_fix_preamble: "You are an expert on {format} visualizations. The current simulation didn't display anything. Please review the code and fix any errors for the topic being simulated.".into(),
      remix_layout_preamble: "You are an expert on {format} visualizations. The current simulation is pretty interesting but the layout isn't quite right. Please adjust the boxes and labels so they are laid out clearly without overlapping.".into(),
      remix_interactive_preamble: "You are an expert on {format} visualizations. Please add inline controls for the key variables so the current simulation becomes interactive.".into(),
      remix_template: r#"{preamble}

TOPIC CONTENT:
{content}

CURRENT CODE:
{existing_code}

REQUIREMENTS:
1. Analyze the code thoroughly and identify all issues preventing the simulation from displaying
2. Fix any syntax errors, missing imports, or incorrect API usage
3. Ensure the code follows best practices for {format}
4. Add proper error handling and debugging information
5. Make sure the simulation clearly demonstrates the educational concept
6. Include appropriate user interactions if missing
7. Add comments explaining the fixes and improvements

FORMAT-SPECIFIC REQUIREMENTS:
{guidelines}

OUTPUT FORMAT:
Return your response as a valid JSON object with the following structure:

{
  "code": "// Fixed and working code here",
  "summary": "Detailed explanation of the issues found and how they were fixed",
  "conceptName": "The main concept being demonstrated",
  "keyPrinciples": ["Key principle 1", "Key principle 2"],
  "interactivityNotes": "How to interact with the simulation",
  "learningObjectives": ["Learning objective 1", "Learning objective 2"],
  "fixes": ["List of specific fixes made to the code"],
  "debugInfo": "Any additional debugging information or tips"
}"#.into(),
      mcq_template: r#"You are an expert educational assessment creator specializing in creating high-quality multiple-choice questions for learning platforms. Your task is to create questions based on the following educational content.

SUMMARY:
{summary}

Extract the concept, its key principles and appropriate learning objectives from the summary above.

ASSESSMENT REQUIREMENTS:
1. Create 5 multiple-choice questions that directly align with the learning objectives
2. Each question should have 4 options (A, B, C, D) with only one correct answer
3. Questions should assess different cognitive levels according to Bloom's Taxonomy:
   - Knowledge/Recall (1 question)
   - Comprehension/Understanding (1-2 questions)
   - Application/Analysis (1-2 questions)
   - Evaluation/Synthesis (1 question if appropriate for the topic)
4. Include a brief explanation for why the correct answer is right
5. Ensure questions test conceptual understanding rather than mere factual recall
6. Make questions appropriate for high school or undergraduate students
7. Include at least one question that tests the ability to interpret the visualization

OUTPUT FORMAT:
Return your response as a valid JSON object with the following structure. Do not include any explanation or text outside this JSON structure:

{
  "questions": [
    {
      "question": "Question text here?",
      "options": ["Option A", "Option B", "Option C", "Option D"],
      "correctAnswer": 0,
      "explanation": "Explanation for why the answer is correct",
      "bloomsLevel": "Knowledge/Comprehension/Application/Analysis/Evaluation/Synthesis",
      "relatedLearningObjective": "The specific learning objective this question addresses"
    }
  ]
}"#.into(),
      image_template: "The given image is a flashcard that contains a prompt name, a prompt, a prompt image and a Wikipedia link related to the prompt. Generate {format} code that is ready to run in a browser.\n\n{guidelines}\n\nDo not explain anything. Return ONLY a valid, properly escaped JSON object with the keys: prompt_name, prompt, wikipedia_link, summary (based on the prompt name) and code. Do not wrap it in ```json fences.".into(),
    }
  }
}

/// Load `ServiceConfig` from MICROSIM_CONFIG_PATH. On any parsing/IO error, returns None.
pub fn load_config_from_env() -> Option<ServiceConfig> {
  let path = std::env::var("MICROSIM_CONFIG_PATH").ok()?;
  match std::fs::read_to_string(&path) {
    Ok(s) => match toml::from_str::<ServiceConfig>(&s) {
      Ok(cfg) => {
        info!(target: "microsim_backend", %path, "Loaded service config (TOML)");
        Some(cfg)
      }
      Err(e) => {
        error!(target: "microsim_backend", %path, error = %e, "Failed to parse TOML config");
        None
      }
    },
    Err(e) => {
      error!(target: "microsim_backend", %path, error = %e, "Failed to read TOML config file");
      None
    }
  }
}
