use std::path::Path;

use crate::corpus::TrainingExample;
use crate::textutil::read_utf8_file;

/// A small spread of question shapes for smoke-testing a prompt before a full run.
pub const PROBE_QUESTIONS: [&str; 5] = [
    "How many heads of the publishers are older than 56?",
    "List the name, created state and age of the heads of publishers ordered by age.",
    "What are the maximum and minimum revenue of the publishers?",
    "Compare revenue between Q1 and Q2 for top performing publishers",
    "Show me performance for ABC",
];

pub fn builtin_questions() -> Vec<String> {
    PROBE_QUESTIONS.iter().map(|q| q.to_string()).collect()
}

/// One question per non-blank line.
pub fn load_question_file(path: &Path) -> anyhow::Result<Vec<String>> {
    let text = read_utf8_file(path)?;
    Ok(text
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .map(str::to_string)
        .collect())
}

/// Input, intent and step count for each probe result.
pub fn render_probe_summary(results: &[TrainingExample], asked: usize) -> String {
    let mut out = format!("Processed: {}/{asked} questions\n", results.len());
    for (i, r) in results.iter().enumerate() {
        let intent = r
            .output
            .get("intent")
            .and_then(|v| v.as_str())
            .unwrap_or("N/A");
        out.push_str(&format!("\nResult {}:\n  Input: {}\n  Intent: {intent}\n", i + 1, r.input));
        if let Some(steps) = r.output.get("discovery_results").and_then(|v| v.as_array()) {
            out.push_str(&format!("  Steps: {}\n", steps.len()));
        }
    }
    out
}
