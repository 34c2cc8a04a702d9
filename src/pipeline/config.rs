use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Context;

use crate::config::{LoadedConfig, VocabularyFile, CONFIG_FILENAME, DEFAULT_VOCABULARY_FILENAME};
use crate::models::openai::DEFAULT_API_KEY_ENV;
use crate::models::OpenAiSettings;
use crate::pipeline::labeler::RetryPolicy;
use crate::pipeline::prompts::{default_prompt_files, PromptTemplate, DEFAULT_PROMPTS_DIR};

pub const DEFAULT_LABEL_INPUT: &str = "training_data_fixed.json";
pub const DEFAULT_LABEL_OUTPUT: &str = "training_data_llm_processed.json";
pub const DEFAULT_MODEL: &str = "gpt-4.1-nano";

/// Request parameters sent with every completion call.
#[derive(Clone, Debug)]
pub struct LlmOptions {
    pub model: String,
    pub temperature: f32,
    pub max_tokens: u32,
    pub json_mode: bool,
    pub api_key_env: String,
    pub base_url: Option<String>,
    pub timeout_secs: Option<u64>,
}

impl LlmOptions {
    pub fn openai_settings(&self) -> anyhow::Result<OpenAiSettings> {
        Ok(OpenAiSettings::from_env(
            &self.api_key_env,
            self.base_url.as_deref(),
            self.timeout_secs,
        )?)
    }
}

/// Command-line values that take precedence over the config file.
#[derive(Clone, Debug, Default)]
pub struct LabelOverrides {
    pub input: Option<PathBuf>,
    pub output: Option<PathBuf>,
    pub model: Option<String>,
    pub model_dir: Option<PathBuf>,
    pub batch_size: Option<usize>,
    pub checkpoint_every: Option<usize>,
    pub max_attempts: Option<u32>,
}

#[derive(Clone, Debug)]
pub struct PipelineConfig {
    pub config_path: PathBuf,

    pub input: PathBuf,
    pub output: PathBuf,

    pub llm: LlmOptions,
    pub retry: RetryPolicy,
    pub batch_size: usize,
    pub checkpoint_every: usize,

    pub trace_dir: PathBuf,
    pub trace_prompts: bool,
    pub log_max_chars: usize,

    pub prompt: PromptTemplate,
}

impl PipelineConfig {
    pub fn from_loaded(cfg: &LoadedConfig, args: LabelOverrides) -> anyhow::Result<Self> {
        let section = &cfg.file.pipeline;
        let llm_section = &cfg.file.llm;

        let input = args
            .input
            .or_else(|| section.input.as_ref().map(|p| cfg.resolve(p)))
            .unwrap_or_else(|| PathBuf::from(DEFAULT_LABEL_INPUT));
        let output = args
            .output
            .or_else(|| section.output.as_ref().map(|p| cfg.resolve(p)))
            .unwrap_or_else(|| PathBuf::from(DEFAULT_LABEL_OUTPUT));

        let llm = LlmOptions {
            model: args
                .model
                .or_else(|| llm_section.model.clone())
                .unwrap_or_else(|| DEFAULT_MODEL.to_string()),
            temperature: llm_section.temperature.unwrap_or(0.1).clamp(0.0, 1.0),
            max_tokens: llm_section.max_tokens.unwrap_or(2048),
            json_mode: llm_section.json_mode.unwrap_or(true),
            api_key_env: llm_section
                .api_key_env
                .clone()
                .unwrap_or_else(|| DEFAULT_API_KEY_ENV.to_string()),
            base_url: llm_section.base_url.clone(),
            timeout_secs: llm_section.timeout_secs,
        };

        let defaults = RetryPolicy::default();
        let retry = RetryPolicy::new(
            args.max_attempts
                .or(section.max_attempts)
                .unwrap_or(defaults.max_attempts),
            section
                .backoff_ms
                .map(Duration::from_millis)
                .unwrap_or(defaults.backoff_unit),
            section
                .inter_call_delay_ms
                .map(Duration::from_millis)
                .unwrap_or(defaults.inter_call_delay),
        );
        let batch_size = args.batch_size.or(section.batch_size).unwrap_or(10).max(1);
        let checkpoint_every = args
            .checkpoint_every
            .or(section.checkpoint_every)
            .unwrap_or(50)
            .max(1);

        let output_dir = output
            .parent()
            .map(|p| p.to_path_buf())
            .unwrap_or_else(|| PathBuf::from("."));
        let trace_dir = section
            .trace_dir
            .clone()
            .unwrap_or_else(|| "_trace".to_string());
        let trace_dir = if Path::new(&trace_dir).is_absolute() {
            PathBuf::from(trace_dir)
        } else {
            output_dir.join(trace_dir)
        };
        let trace_prompts = section.trace_prompts.unwrap_or(false);
        let log_max_chars = section.log_max_chars.unwrap_or(80);

        let model_dir = args
            .model_dir
            .or_else(|| section.model_dir.as_ref().map(|p| cfg.resolve(p)));
        let prompt = PromptTemplate::load(cfg, model_dir.as_deref()).context("load prompt")?;

        Ok(Self {
            config_path: cfg.path.clone(),
            input,
            output,
            llm,
            retry,
            batch_size,
            checkpoint_every,
            trace_dir,
            trace_prompts,
            log_max_chars,
            prompt,
        })
    }
}

/// Write the default config, prompt template and vocabulary table into `dir`.
/// Existing files are left alone unless `force` is set.
pub fn init_default_config(dir: &Path, force: bool) -> anyhow::Result<PathBuf> {
    std::fs::create_dir_all(dir)
        .with_context(|| format!("create config dir: {}", dir.display()))?;
    let cfg_path = dir.join(CONFIG_FILENAME);

    let prompts_dir = dir.join(DEFAULT_PROMPTS_DIR);
    std::fs::create_dir_all(&prompts_dir)
        .with_context(|| format!("create prompts dir: {}", prompts_dir.display()))?;

    for (fname, body) in default_prompt_files() {
        let p = prompts_dir.join(fname);
        if p.exists() && !force {
            continue;
        }
        std::fs::write(&p, body).with_context(|| format!("write prompt: {}", p.display()))?;
    }

    let vocab_path = dir.join(DEFAULT_VOCABULARY_FILENAME);
    if !vocab_path.exists() || force {
        let body = VocabularyFile::builtin().to_toml()?;
        std::fs::write(&vocab_path, body)
            .with_context(|| format!("write vocabulary: {}", vocab_path.display()))?;
    }

    if cfg_path.exists() && !force {
        return Ok(cfg_path);
    }

    std::fs::write(&cfg_path, DEFAULT_CONFIG_TOML)
        .with_context(|| format!("write config: {}", cfg_path.display()))?;
    Ok(cfg_path)
}

const DEFAULT_CONFIG_TOML: &str = r#"[convert]
input = "kaggle_spider_training_data.json"
output = "bi_training_data.json"
samples = 5
# Remove to use the built-in tables.
vocabulary = "vocabulary.toml"

[analyze]
input = "bi_training_data.json"
report = "bi_training_data_analysis.json"

# Score tiers; each list is scanned in order and the first match wins.
# [analyze.score]
# volume_min = [[7000, 20], [5000, 15], [3000, 10]]
# complexity_bands = [[0.3, 0.7, 20], [0.2, 0.8, 15]]
# complexity_outside = 10
# coverage_min = [[20, 20], [15, 15], [10, 10]]
# validity_min = [[0.95, 20], [0.90, 15], [0.80, 10]]
# issues_max = [[0, 20], [10, 15], [50, 10]]
# issues_over = 5

[llm]
model = "gpt-4.1-nano"
temperature = 0.1
max_tokens = 2048
json_mode = true
api_key_env = "OPENAI_API_KEY"
# base_url = "http://localhost:8000"
# timeout_secs = 120

[pipeline]
input = "training_data_fixed.json"
output = "training_data_llm_processed.json"
batch_size = 10
checkpoint_every = 50
max_attempts = 3
backoff_ms = 1000
inter_call_delay_ms = 500
model_dir = "model"

trace_dir = "_trace"
trace_prompts = false
log_max_chars = 80

[prompts]
labeling = "prompts/labeling.txt"
"#;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::load_config;

    #[test]
    fn init_writes_a_loadable_config_and_respects_force() {
        let dir = tempfile::tempdir().expect("tempdir");
        let cfg_path = init_default_config(dir.path(), false).expect("init");
        assert!(dir.path().join("prompts").join("labeling.txt").exists());
        assert!(dir.path().join(DEFAULT_VOCABULARY_FILENAME).exists());
        let cfg = load_config(&cfg_path).expect("load");
        assert_eq!(cfg.pipeline.batch_size, Some(10));
        assert_eq!(cfg.llm.model.as_deref(), Some(DEFAULT_MODEL));

        std::fs::write(&cfg_path, "# edited\n").expect("edit");
        init_default_config(dir.path(), false).expect("init again");
        assert_eq!(std::fs::read_to_string(&cfg_path).expect("read"), "# edited\n");
        init_default_config(dir.path(), true).expect("force");
        assert!(std::fs::read_to_string(&cfg_path).expect("read").contains("[pipeline]"));
    }

    #[test]
    fn cli_overrides_beat_file_values() {
        let dir = tempfile::tempdir().expect("tempdir");
        let cfg_path = init_default_config(dir.path(), false).expect("init");
        let loaded = LoadedConfig::locate(Some(cfg_path), dir.path()).expect("locate");
        let cfg = PipelineConfig::from_loaded(
            &loaded,
            LabelOverrides {
                batch_size: Some(3),
                max_attempts: Some(0),
                ..LabelOverrides::default()
            },
        )
        .expect("config");
        assert_eq!(cfg.batch_size, 3);
        assert_eq!(cfg.checkpoint_every, 50);
        assert_eq!(cfg.retry.max_attempts, 1);
        assert_eq!(cfg.input, dir.path().join(DEFAULT_LABEL_INPUT));
        assert_eq!(cfg.llm.temperature, 0.1);
        assert!(cfg.prompt.context().is_empty());
    }
}
