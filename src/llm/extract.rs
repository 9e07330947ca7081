//! Response text extraction
//!
//! Remote bodies are probed by an ordered list of strategies. The first one
//! that finds text wins; if none match, the whole body is stringified so the
//! caller always gets something to evaluate.

use serde_json::Value;

/// A single probe against a raw response body
pub type Strategy = fn(&Value) -> Option<String>;

/// Strategies in priority order
pub const STRATEGIES: &[(&str, Strategy)] = &[
    ("choices[0].message.content", message_content as Strategy),
    ("choices[0].message.content[].text", message_content_parts as Strategy),
    ("choices[0].text", choice_text as Strategy),
    ("string body", string_body as Strategy),
];

/// Text pulled from a response, and how it was found
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Extracted {
    pub text: String,
    /// Name of the strategy that matched, `None` when the body was stringified
    pub strategy: Option<&'static str>,
}

impl Extracted {
    /// True when no strategy matched and the body was stringified
    pub fn is_fallback(&self) -> bool {
        self.strategy.is_none()
    }
}

/// Extract the top choice's text, degrading to the stringified body
pub fn extract_text(body: &Value) -> Extracted {
    for (name, strategy) in STRATEGIES {
        if let Some(text) = strategy(body) {
            return Extracted {
                text,
                strategy: Some(*name),
            };
        }
    }

    Extracted {
        text: stringify(body),
        strategy: None,
    }
}

fn first_choice(body: &Value) -> Option<&Value> {
    body.get("choices")?.as_array()?.first()
}

fn message_content(body: &Value) -> Option<String> {
    first_choice(body)?
        .get("message")?
        .get("content")?
        .as_str()
        .map(str::to_string)
}

fn message_content_parts(body: &Value) -> Option<String> {
    let parts = first_choice(body)?.get("message")?.get("content")?.as_array()?;
    let texts: Vec<&str> = parts
        .iter()
        .filter_map(|part| part.get("text").and_then(Value::as_str))
        .collect();

    if texts.is_empty() { None } else { Some(texts.join("\n")) }
}

fn choice_text(body: &Value) -> Option<String> {
    first_choice(body)?.get("text")?.as_str().map(str::to_string)
}

fn string_body(body: &Value) -> Option<String> {
    body.as_str().map(str::to_string)
}

fn stringify(body: &Value) -> String {
    // Value's Display never fails and is never empty ("null" at minimum)
    body.to_string()
}
