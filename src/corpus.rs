use std::fs;
use std::io::{BufWriter, Write};
use std::path::Path;

use anyhow::Context;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};

use crate::error::CorpusError;
use crate::textutil::read_utf8_file;

/// Intent written into the skeleton record when labeling cannot produce a parseable answer.
pub const FALLBACK_INTENT: &str = "intents_discovery";

/// Keys every discovery step must carry to count as structurally complete.
pub const REQUIRED_STEP_FIELDS: [&str; 10] = [
    "step_id",
    "sub_question",
    "measures",
    "dimensions",
    "timegrain",
    "timeframe",
    "pattern",
    "segments",
    "breakdowns",
    "unmatched_intents",
];

/// One question plus its annotation.
///
/// The annotation stays a raw JSON value: corpus files are the source of truth and the
/// analyzer has to see absent keys as absent, so nothing here fills in defaults.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TrainingExample {
    pub input: String,
    pub output: Value,
}

impl TrainingExample {
    pub fn new(input: impl Into<String>, output: Value) -> Self {
        Self {
            input: input.into(),
            output,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum StepId {
    #[serde(rename = "step_1")]
    Step1,
    #[serde(rename = "step_2")]
    Step2,
    #[serde(rename = "step_3")]
    Step3,
}

impl StepId {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "step_1" => Some(Self::Step1),
            "step_2" => Some(Self::Step2),
            "step_3" => Some(Self::Step3),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Step1 => "step_1",
            Self::Step2 => "step_2",
            Self::Step3 => "step_3",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AnnotationRecord {
    pub intent: String,
    pub discovery_results: Vec<DiscoveryStep>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DiscoveryStep {
    pub step_id: StepId,
    pub sub_question: String,
    #[serde(default)]
    pub measures: Vec<NamedField>,
    #[serde(default)]
    pub dimensions: Vec<NamedField>,
    #[serde(default)]
    pub timegrain: Option<String>,
    #[serde(default)]
    pub timeframe: Option<String>,
    #[serde(default)]
    pub pattern: Option<String>,
    #[serde(default)]
    pub segments: Vec<String>,
    #[serde(default)]
    pub breakdowns: Vec<String>,
    #[serde(default)]
    pub unmatched_intents: Vec<UnmatchedIntent>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct NamedField {
    pub name: String,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, Value>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct UnmatchedIntent {
    pub phrase: String,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, Value>,
}

impl AnnotationRecord {
    /// Minimal valid record: one `step_1` asking the original question, everything else empty.
    #[must_use]
    pub fn fallback(question: &str) -> Self {
        Self {
            intent: FALLBACK_INTENT.to_string(),
            discovery_results: vec![DiscoveryStep {
                step_id: StepId::Step1,
                sub_question: question.to_string(),
                measures: Vec::new(),
                dimensions: Vec::new(),
                timegrain: None,
                timeframe: None,
                pattern: None,
                segments: Vec::new(),
                breakdowns: Vec::new(),
                unmatched_intents: Vec::new(),
            }],
        }
    }

    pub fn to_value(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }
}

/// Load a whole corpus file (JSON array of examples). A missing file is a configuration error.
pub fn load_corpus(path: &Path) -> anyhow::Result<Vec<TrainingExample>> {
    if !path.exists() {
        return Err(CorpusError::config(format!("input file not found: {}", path.display())).into());
    }
    let text = read_utf8_file(path)?;
    let examples: Vec<TrainingExample> = serde_json::from_str(&text)
        .with_context(|| format!("parse corpus json: {}", path.display()))?;
    Ok(examples)
}

/// Serialize `value` next to `path` and rename it into place, so readers never see a
/// truncated file and a crash mid-write leaves the previous contents untouched.
pub fn write_json_atomic<T: Serialize + ?Sized>(path: &Path, value: &T) -> anyhow::Result<()> {
    let dir = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
        _ => std::path::PathBuf::from("."),
    };
    fs::create_dir_all(&dir).with_context(|| format!("create output dir: {}", dir.display()))?;
    let tmp = tempfile::NamedTempFile::new_in(&dir)
        .with_context(|| format!("create temp file in {}", dir.display()))?;
    {
        let mut w = BufWriter::new(tmp.as_file());
        serde_json::to_writer_pretty(&mut w, value).context("serialize json")?;
        w.flush().context("flush json")?;
    }
    tmp.persist(path)
        .map_err(|e| e.error)
        .with_context(|| format!("write json: {}", path.display()))?;
    Ok(())
}

pub fn write_corpus(path: &Path, examples: &[TrainingExample]) -> anyhow::Result<()> {
    write_json_atomic(path, examples)
}

pub fn file_sha256(path: &Path) -> anyhow::Result<String> {
    let bytes = fs::read(path).with_context(|| format!("read file: {}", path.display()))?;
    Ok(hex::encode(Sha256::digest(&bytes)))
}
