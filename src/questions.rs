use std::path::Path;

use anyhow::Context;
use once_cell::sync::Lazy;
use regex::Regex;

use crate::textutil::read_utf8_file;

static LEADING_NUMBER: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\d+\.\s*").expect("regex"));

/// Trimmed lines, minus blanks and `//` comments.
pub fn question_lines(text: &str) -> Vec<String> {
    text.lines()
        .map(str::trim)
        .filter(|l| !l.is_empty() && !l.starts_with("//"))
        .map(str::to_string)
        .collect()
}

pub fn strip_number(line: &str) -> String {
    LEADING_NUMBER.replace(line, "").into_owned()
}

/// Existing lines verbatim, then generated lines renumbered from `first_number`
/// (defaults to one past the existing count).
pub fn combine_questions(
    existing: &str,
    generated: &str,
    first_number: Option<usize>,
) -> Vec<String> {
    let existing = question_lines(existing);
    let first = first_number.unwrap_or(existing.len() + 1);
    let mut out = existing;
    for (i, q) in question_lines(generated).iter().enumerate() {
        out.push(format!("{}. {}", first + i, strip_number(q)));
    }
    out
}

/// Combine two question files into `output`; returns the number of lines written.
pub fn combine_question_files(
    existing: &Path,
    generated: &Path,
    output: &Path,
    first_number: Option<usize>,
) -> anyhow::Result<usize> {
    let existing_text = read_utf8_file(existing)?;
    let generated_text = read_utf8_file(generated)?;
    let lines = combine_questions(&existing_text, &generated_text, first_number);
    let mut body = String::new();
    for line in &lines {
        body.push_str(line);
        body.push('\n');
    }
    std::fs::write(output, body).with_context(|| format!("write questions: {}", output.display()))?;
    Ok(lines.len())
}
