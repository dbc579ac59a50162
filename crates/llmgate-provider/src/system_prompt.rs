use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

pub const SYSTEM_INSTRUCTION_FIELD: &str = "systemInstruction";
pub const SYSTEM_INSTRUCTION_LEGACY_FIELD: &str = "system_instruction";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PromptMode {
    #[default]
    Append,
    Replace,
}

/// Prompt-file configuration resolved by the outer layer.
///
/// `file_path` is `None` when no prompt file is configured at all.
/// `content` is `None` when the configured file could not be loaded; a
/// loaded-but-empty file is `Some("")` and is still applied.
#[derive(Debug, Clone, Default)]
pub struct SystemPromptConfig {
    pub file_path: Option<String>,
    pub mode: PromptMode,
    pub content: Option<String>,
}

/// Current system-instruction block, accepting both field spellings.
///
/// The legacy snake_case spelling wins when both are present.
fn system_instruction(body: &Value) -> Option<&Value> {
    match body.get(SYSTEM_INSTRUCTION_LEGACY_FIELD) {
        Some(value) if !value.is_null() => Some(value),
        _ => body
            .get(SYSTEM_INSTRUCTION_FIELD)
            .filter(|value| !value.is_null()),
    }
}

/// Newline-joined text of the instruction's non-empty parts.
pub(crate) fn system_instruction_text(body: &Value) -> String {
    let parts = system_instruction(body)
        .and_then(|instruction| instruction.get("parts"))
        .and_then(Value::as_array);
    let Some(parts) = parts else {
        return String::new();
    };
    parts
        .iter()
        .filter_map(|part| part.get("text").and_then(Value::as_str))
        .filter(|text| !text.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

/// Write a single-part instruction under the canonical field only.
///
/// Upstream rejects payloads carrying both spellings, so any legacy field
/// is removed in the same step.
pub(crate) fn write_system_instruction(body: &mut Value, text: String) {
    let Some(map) = body.as_object_mut() else {
        return;
    };
    map.insert(
        SYSTEM_INSTRUCTION_FIELD.to_string(),
        json!({ "parts": [{ "text": text }] }),
    );
    map.remove(SYSTEM_INSTRUCTION_LEGACY_FIELD);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn legacy_spelling_wins_over_canonical() {
        let body = json!({
            "system_instruction": { "parts": [{ "text": "legacy" }] },
            "systemInstruction": { "parts": [{ "text": "canonical" }] },
        });
        assert_eq!(system_instruction_text(&body), "legacy");
    }

    #[test]
    fn null_legacy_falls_back_to_canonical() {
        let body = json!({
            "system_instruction": null,
            "systemInstruction": { "parts": [{ "text": "canonical" }] },
        });
        assert_eq!(system_instruction_text(&body), "canonical");
    }

    #[test]
    fn parts_join_with_newlines_skipping_empty() {
        let body = json!({
            "systemInstruction": {
                "parts": [{ "text": "a" }, { "text": "" }, { "note": "x" }, { "text": "b" }],
            },
        });
        assert_eq!(system_instruction_text(&body), "a\nb");
    }

    #[test]
    fn missing_instruction_is_empty() {
        assert_eq!(system_instruction_text(&json!({})), "");
    }

    #[test]
    fn write_replaces_and_drops_legacy_field() {
        let mut body = json!({
            "system_instruction": { "parts": [{ "text": "old" }] },
            "contents": [],
        });
        write_system_instruction(&mut body, "new".to_string());
        assert_eq!(
            body["systemInstruction"],
            json!({ "parts": [{ "text": "new" }] })
        );
        assert!(body.get(SYSTEM_INSTRUCTION_LEGACY_FIELD).is_none());
        assert_eq!(body["contents"], json!([]));
    }
}
