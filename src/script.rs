use serde_json::Value;

use crate::persona::strip_labels;

/// Text to be voiced: labelled dialogue lines or one continuous monologue.
#[derive(Debug, Clone, PartialEq)]
pub enum Script {
    Dialogue(Vec<String>),
    Monologue(String),
}

impl Script {
    /// Parses a script file. A JSON array is dialogue (non-string entries are
    /// coerced to text), an object with `lines` or `text` is dialogue or
    /// monologue respectively, anything else is a plain-text monologue.
    pub fn parse(contents: &str) -> Script {
        match serde_json::from_str::<Value>(contents) {
            Ok(Value::Array(items)) => Script::Dialogue(items.into_iter().map(coerce).collect()),
            Ok(Value::Object(mut obj)) => {
                if let Some(Value::Array(items)) = obj.remove("lines") {
                    Script::Dialogue(items.into_iter().map(coerce).collect())
                } else if let Some(text) = obj.remove("text") {
                    Script::Monologue(coerce(text))
                } else {
                    Script::Monologue(contents.trim().to_string())
                }
            }
            _ => Script::Monologue(contents.trim().to_string()),
        }
    }

    /// Lines in order; a monologue is a single line.
    pub fn lines(&self) -> Vec<String> {
        match self {
            Script::Dialogue(lines) => lines.clone(),
            Script::Monologue(text) => vec![text.clone()],
        }
    }

    /// Label-free text of the whole script, one line per row.
    pub fn joined_text(&self) -> String {
        self.lines()
            .iter()
            .map(|l| strip_labels(l))
            .filter(|l| !l.is_empty())
            .collect::<Vec<_>>()
            .join("\n")
    }

    pub fn is_empty(&self) -> bool {
        self.lines().iter().all(|l| l.trim().is_empty())
    }
}

fn coerce(value: Value) -> String {
    match value {
        Value::String(s) => s,
        other => {
            tracing::warn!("Non-text script line {}; converting to string", other);
            other.to_string()
        }
    }
}
