//! Structured output: schema instruction, JSON extraction and validation.

use std::sync::LazyLock;

use regex::Regex;
use serde_json::Value;

use crate::error::ValidationError;

const RAW_PREFIX_CHARS: usize = 200;

static JSON_FENCE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)```json[ \t]*\r?\n(.*?)\r?\n[ \t]*```").expect("fence pattern is valid")
});

/// System-prompt addition asking the model to answer with conforming JSON.
pub fn schema_instruction(schema: &Value) -> String {
    let pretty = serde_json::to_string_pretty(schema).unwrap_or_else(|_| schema.to_string());
    format!(
        "Please provide a response in JSON format that strictly adheres to the following JSON \
         Schema. Do not include any other text or explanations outside of the JSON object. \
         Wrap the JSON in a ```json code block. The schema is as follows:\n\n```json\n{}\n```",
        pretty
    )
}

/// Append the schema instruction to an optional system prompt.
pub fn with_schema_instruction(system: Option<&str>, schema: &Value) -> String {
    let instruction = schema_instruction(schema);
    match system {
        Some(prompt) if !prompt.trim().is_empty() => format!("{}\n\n{}", prompt, instruction),
        _ => instruction,
    }
}

/// Pull a JSON value out of model output.
///
/// A ```json fenced block wins; otherwise the span from the first `{` to the
/// last `}` is used if it parses.
pub fn extract_json(text: &str) -> Option<Value> {
    if let Some(parsed) = JSON_FENCE
        .captures(text)
        .and_then(|caps| serde_json::from_str(caps[1].trim()).ok())
    {
        return Some(parsed);
    }

    let start = text.find('{')?;
    let end = text.rfind('}')?;
    if end <= start {
        return None;
    }
    serde_json::from_str(&text[start..=end]).ok()
}

/// Validate model output against a JSON Schema.
///
/// Empty text is not validated.
pub fn validate_output(text: &str, schema: &Value) -> Result<(), ValidationError> {
    if text.trim().is_empty() {
        return Ok(());
    }

    let validator = jsonschema::validator_for(schema)
        .map_err(|e| ValidationError::InvalidSchema(e.to_string()))?;

    let instance = extract_json(text).ok_or_else(|| ValidationError::NoJson {
        raw_prefix: text.chars().take(RAW_PREFIX_CHARS).collect(),
    })?;

    let violations: Vec<String> = validator
        .iter_errors(&instance)
        .map(|err| {
            let path = err.instance_path.to_string();
            let path = if path.is_empty() { "/".to_string() } else { path };
            format!("{}: {}", path, err)
        })
        .collect();

    if violations.is_empty() {
        Ok(())
    } else {
        Err(ValidationError::Schema { violations })
    }
}
