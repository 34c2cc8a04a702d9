use std::path::Path;

use anyhow::Context;
use encoding_rs::UTF_8;
use serde::Deserialize;

/// Read a UTF-8 text file, dropping a leading BOM if an editor left one behind.
pub fn read_utf8_file(path: &Path) -> anyhow::Result<String> {
    let bytes = std::fs::read(path).with_context(|| format!("read file: {}", path.display()))?;
    let (text, had_errors) = UTF_8.decode_with_bom_removal(&bytes);
    if had_errors {
        anyhow::bail!("file is not valid UTF-8: {}", path.display());
    }
    Ok(text.into_owned())
}

/// Strip markdown fences and surrounding whitespace from a model answer.
pub fn cleanup_model_text(text: &str) -> String {
    let mut s = text.trim().to_string();
    if s.starts_with("```") {
        if let Some(i) = s.find('\n') {
            s = s[i + 1..].to_string();
        }
        if let Some(end) = s.rfind("```") {
            s = s[..end].to_string();
        }
    }
    s.trim().to_string()
}

/// Parse the first JSON object found in `text`, ignoring any prose before it and
/// anything after the object closes.
pub fn must_extract_json_obj(text: &str) -> anyhow::Result<serde_json::Value> {
    let start = text.find('{').context("no_json_object_start")?;
    let slice = &text[start..];
    let mut de = serde_json::Deserializer::from_str(slice);
    let v: serde_json::Value =
        serde_json::Value::deserialize(&mut de).context("json_parse_failed")?;
    Ok(v)
}

pub fn truncate_chars(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let mut out: String = text.chars().take(max_chars).collect();
    out.push_str("...");
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cleanup_drops_code_fences() {
        let raw = "```json\n{\"intent\": \"x\"}\n```\n";
        assert_eq!(cleanup_model_text(raw), "{\"intent\": \"x\"}");
    }

    #[test]
    fn extracts_object_after_prose() {
        let v = must_extract_json_obj("Sure! {\"a\": 1} trailing").expect("json");
        assert_eq!(v["a"], 1);
        assert!(must_extract_json_obj("no braces here").is_err());
        assert!(must_extract_json_obj("{\"a\": ").is_err());
    }

    #[test]
    fn truncation_counts_chars_not_bytes() {
        assert_eq!(truncate_chars("héllo", 10), "héllo");
        assert_eq!(truncate_chars("héllo", 2), "hé...");
    }
}
