use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context};

use crate::config::LoadedConfig;
use crate::textutil::read_utf8_file;

pub const DEFAULT_PROMPTS_DIR: &str = "prompts";
pub const DEFAULT_LABELING: &str = "labeling.txt";

pub const QUESTION_TOKEN: &str = "{{ context.current_question }}";
pub const MODEL_FILES_TOKEN: &str = "{{ context.model_files }}";

pub const SYSTEM_PROMPT: &str =
    "You are a helpful assistant for BI intent discovery. Always respond with valid JSON.";

/// A labeling template together with the model-context blob pasted into it.
#[derive(Clone, Debug)]
pub struct PromptTemplate {
    template: String,
    context: String,
}

impl PromptTemplate {
    pub fn new(template: impl Into<String>, context: impl Into<String>) -> Self {
        Self {
            template: template.into(),
            context: context.into(),
        }
    }

    /// Template from `[prompts].labeling` (or `prompts/labeling.txt` next to the config)
    /// and context from the `.json` files under `model_dir`.
    pub fn load(cfg: &LoadedConfig, model_dir: Option<&Path>) -> anyhow::Result<Self> {
        let rel = cfg
            .file
            .prompts
            .labeling
            .clone()
            .unwrap_or_else(|| format!("{DEFAULT_PROMPTS_DIR}/{DEFAULT_LABELING}"));
        let path = cfg.resolve(Path::new(&rel));
        if !path.exists() {
            return Err(anyhow!(
                "prompt file not found: {} (run: bi-intent-corpus --init-config)",
                path.display()
            ));
        }
        let template =
            read_utf8_file(&path).with_context(|| format!("read prompt: {}", path.display()))?;
        let context = match model_dir {
            Some(dir) => load_context_files(dir)?,
            None => String::new(),
        };
        Ok(Self { template, context })
    }

    pub fn template(&self) -> &str {
        &self.template
    }

    pub fn context(&self) -> &str {
        &self.context
    }

    pub fn assemble(&self, question: &str) -> String {
        render_template(
            &self.template,
            &[(QUESTION_TOKEN, question), (MODEL_FILES_TOKEN, &self.context)],
        )
    }
}

/// Literal substitution, one token at a time in `vars` order. Unknown tokens stay as written.
pub fn render_template(template: &str, vars: &[(&str, &str)]) -> String {
    let mut out = template.to_string();
    for (token, value) in vars {
        if out.contains(token) {
            out = out.replace(token, value);
        }
    }
    out
}

/// `\n\n[{file}]\n{contents}` for every `.json` file in `dir`, by file name.
/// A missing directory yields an empty blob.
pub fn load_context_files(dir: &Path) -> anyhow::Result<String> {
    if !dir.is_dir() {
        return Ok(String::new());
    }
    let mut files: Vec<PathBuf> = std::fs::read_dir(dir)
        .with_context(|| format!("list model dir: {}", dir.display()))?
        .filter_map(|e| e.ok().map(|e| e.path()))
        .filter(|p| p.is_file() && p.extension().is_some_and(|x| x == "json"))
        .collect();
    files.sort();

    let mut blob = String::new();
    for path in files {
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let contents = read_utf8_file(&path)?;
        blob.push_str(&format!("\n\n[{name}]\n{contents}"));
    }
    Ok(blob)
}

pub fn default_prompt_files() -> Vec<(&'static str, &'static str)> {
    vec![(DEFAULT_LABELING, DEFAULT_LABELING_TEXT)]
}

pub const DEFAULT_LABELING_TEXT: &str = r#"You label business-intelligence questions for an intent discovery model.

Decompose the question into one to three ordered steps. Use one step for a direct
lookup, two when a second query depends on the first, three only when necessary.

Return ONE JSON object and nothing else:
{
  "intent": "intents_discovery",
  "discovery_results": [
    {
      "step_id": "step_1",
      "sub_question": "...",
      "measures": [{"name": "..."}],
      "dimensions": [{"name": "..."}],
      "timegrain": null,
      "timeframe": null,
      "pattern": null,
      "segments": [],
      "breakdowns": [],
      "unmatched_intents": [{"phrase": "..."}]
    }
  ]
}

Rules:
- step_id is "step_1", "step_2" or "step_3", in order.
- Every step carries all ten keys; use null or [] when nothing applies.
- Only use measures and dimensions defined in the model files below.
- Put phrases that match nothing in the model into unmatched_intents.

MODEL FILES:{{ context.model_files }}

QUESTION:
{{ context.current_question }}
"#;
