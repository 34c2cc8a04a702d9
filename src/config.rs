use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};

use anyhow::Context;
use serde::{Deserialize, Serialize};

use crate::error::CorpusError;
use crate::normalize::{
    builtin_dimensions, builtin_measures, builtin_phrase_groups, PhraseGroup, SchemaNormalizer,
};
use crate::quality::ScoreThresholds;
use crate::textutil::read_utf8_file;
use crate::vocabulary::{builtin_openers, builtin_terms, OpenerRule, TermEntry, VocabularyMapping};

pub const CONFIG_FILENAME: &str = "bi-intent-corpus.toml";
pub const CONFIG_ENV: &str = "BI_INTENT_CORPUS_CONFIG";
pub const DEFAULT_VOCABULARY_FILENAME: &str = "vocabulary.toml";

#[derive(Clone, Debug, Deserialize, Default)]
pub struct AppConfig {
    #[serde(default)]
    pub convert: ConvertSection,
    #[serde(default)]
    pub analyze: AnalyzeSection,
    #[serde(default)]
    pub llm: LlmSection,
    #[serde(default)]
    pub pipeline: PipelineSection,
    #[serde(default)]
    pub prompts: PromptsSection,
}

#[derive(Clone, Debug, Deserialize, Default)]
pub struct ConvertSection {
    #[serde(default)]
    pub input: Option<PathBuf>,
    #[serde(default)]
    pub output: Option<PathBuf>,
    /// Number of original/converted question pairs printed after a run.
    #[serde(default)]
    pub samples: Option<usize>,
    /// Optional vocabulary/normalizer table override; relative to the config file.
    #[serde(default)]
    pub vocabulary: Option<PathBuf>,
}

#[derive(Clone, Debug, Deserialize, Default)]
pub struct AnalyzeSection {
    #[serde(default)]
    pub input: Option<PathBuf>,
    #[serde(default)]
    pub report: Option<PathBuf>,
    #[serde(default)]
    pub score: Option<ScoreThresholds>,
}

#[derive(Clone, Debug, Deserialize, Default)]
pub struct LlmSection {
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub temperature: Option<f32>,
    #[serde(default)]
    pub max_tokens: Option<u32>,
    /// Ask the endpoint for `response_format: {type: json_object}`.
    #[serde(default)]
    pub json_mode: Option<bool>,
    #[serde(default)]
    pub base_url: Option<String>,
    #[serde(default)]
    pub api_key_env: Option<String>,
    #[serde(default)]
    pub timeout_secs: Option<u64>,
}

#[derive(Clone, Debug, Deserialize, Default)]
pub struct PipelineSection {
    #[serde(default)]
    pub input: Option<PathBuf>,
    #[serde(default)]
    pub output: Option<PathBuf>,
    #[serde(default)]
    pub batch_size: Option<usize>,
    #[serde(default)]
    pub checkpoint_every: Option<usize>,
    #[serde(default)]
    pub max_attempts: Option<u32>,
    #[serde(default)]
    pub backoff_ms: Option<u64>,
    #[serde(default)]
    pub inter_call_delay_ms: Option<u64>,
    /// Directory whose `.json` files are pasted into the prompt as model context.
    #[serde(default)]
    pub model_dir: Option<PathBuf>,

    #[serde(default)]
    pub trace_dir: Option<String>,
    #[serde(default)]
    pub trace_prompts: Option<bool>,
    #[serde(default)]
    pub log_max_chars: Option<usize>,
}

#[derive(Clone, Debug, Deserialize, Default)]
pub struct PromptsSection {
    #[serde(default)]
    pub labeling: Option<String>,
}

pub fn find_file_upwards(start_dir: &Path, filename: &str, max_levels: usize) -> Option<PathBuf> {
    let mut dir = start_dir;
    for _ in 0..=max_levels {
        let candidate = dir.join(filename);
        if candidate.exists() {
            return Some(candidate);
        }
        dir = dir.parent()?;
    }
    None
}

pub fn find_default_config(workdir: &Path, filename: &str) -> Option<PathBuf> {
    if let Ok(cwd) = std::env::current_dir() {
        if let Some(p) = find_file_upwards(&cwd, filename, 8) {
            return Some(p);
        }
    }
    if let Some(p) = find_file_upwards(workdir, filename, 8) {
        return Some(p);
    }
    if let Ok(exe) = std::env::current_exe() {
        if let Some(dir) = exe.parent() {
            if let Some(p) = find_file_upwards(dir, filename, 10) {
                return Some(p);
            }
        }
    }
    None
}

pub fn load_config(path: &Path) -> anyhow::Result<AppConfig> {
    let text = read_utf8_file(path).with_context(|| format!("read config: {}", path.display()))?;
    let cfg: AppConfig = toml::from_str(&text)
        .map_err(|e| CorpusError::config(format!("parse {}: {e}", path.display())))?;
    Ok(cfg)
}

/// A config file that was located (or defaulted) together with its path.
#[derive(Clone, Debug)]
pub struct LoadedConfig {
    pub path: PathBuf,
    pub file: AppConfig,
}

impl LoadedConfig {
    /// `--config`, then the environment variable, then an upward search from `workdir`.
    /// Nothing found means defaults anchored at `workdir`.
    pub fn locate(explicit: Option<PathBuf>, workdir: &Path) -> anyhow::Result<Self> {
        let cfg_file = explicit
            .or_else(|| std::env::var(CONFIG_ENV).ok().map(PathBuf::from))
            .or_else(|| find_default_config(workdir, CONFIG_FILENAME));

        let mut file = AppConfig::default();
        if let Some(p) = cfg_file.as_ref() {
            if p.exists() {
                file = load_config(p)?;
            }
        }
        let path = cfg_file.unwrap_or_else(|| workdir.join(CONFIG_FILENAME));
        Ok(Self { path, file })
    }

    pub fn config_dir(&self) -> &Path {
        self.path.parent().unwrap_or_else(|| Path::new("."))
    }

    /// Resolve a config-relative path.
    pub fn resolve(&self, p: &Path) -> PathBuf {
        if p.is_relative() {
            self.config_dir().join(p)
        } else {
            p.to_path_buf()
        }
    }
}

/// On-disk form of the substitution and normalization tables. Any section left empty
/// falls back to the built-in table for that section.
#[derive(Clone, Debug, Default, Deserialize, Serialize)]
pub struct VocabularyFile {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub terms: Vec<TermEntry>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub openers: Vec<OpenerRule>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub measures: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub dimensions: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub phrase_groups: Vec<PhraseGroup>,
}

impl VocabularyFile {
    pub fn builtin() -> Self {
        Self {
            terms: builtin_terms(),
            openers: builtin_openers(),
            measures: builtin_measures().into_iter().collect(),
            dimensions: builtin_dimensions().into_iter().collect(),
            phrase_groups: builtin_phrase_groups(),
        }
    }

    pub fn load(path: &Path) -> anyhow::Result<Self> {
        if !path.exists() {
            return Err(CorpusError::config(format!(
                "vocabulary file not found: {}",
                path.display()
            ))
            .into());
        }
        let text = read_utf8_file(path)?;
        let file: Self = toml::from_str(&text)
            .map_err(|e| CorpusError::config(format!("parse {}: {e}", path.display())))?;
        Ok(file)
    }

    pub fn to_toml(&self) -> anyhow::Result<String> {
        toml::to_string_pretty(self).context("serialize vocabulary table")
    }

    /// Compile into the immutable tables used by the converter.
    pub fn into_tables(self) -> anyhow::Result<(VocabularyMapping, SchemaNormalizer)> {
        let terms = if self.terms.is_empty() {
            builtin_terms()
        } else {
            self.terms
        };
        let openers = if self.openers.is_empty() {
            builtin_openers()
        } else {
            self.openers
        };
        let measures: HashMap<String, String> = if self.measures.is_empty() {
            builtin_measures()
        } else {
            self.measures.into_iter().collect()
        };
        let dimensions: HashMap<String, String> = if self.dimensions.is_empty() {
            builtin_dimensions()
        } else {
            self.dimensions.into_iter().collect()
        };
        let groups = if self.phrase_groups.is_empty() {
            builtin_phrase_groups()
        } else {
            self.phrase_groups
        };
        let vocabulary = VocabularyMapping::new(terms, openers)?;
        let normalizer = SchemaNormalizer::new(measures, dimensions, &groups)?;
        Ok((vocabulary, normalizer))
    }
}

/// Tables from `path` when given, otherwise the built-in ones.
pub fn load_tables(path: Option<&Path>) -> anyhow::Result<(VocabularyMapping, SchemaNormalizer)> {
    match path {
        Some(p) => VocabularyFile::load(p)?.into_tables(),
        None => Ok((VocabularyMapping::builtin(), SchemaNormalizer::builtin())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_file_parses_to_defaults() {
        let cfg: AppConfig = toml::from_str("").expect("toml");
        assert!(cfg.llm.model.is_none());
        assert!(cfg.pipeline.batch_size.is_none());
        assert!(cfg.analyze.score.is_none());
    }

    #[test]
    fn score_table_overrides_only_named_tiers() {
        let text = r#"
[analyze.score]
volume_min = [[100, 20], [10, 5]]
issues_over = 0
"#;
        let cfg: AppConfig = toml::from_str(text).expect("toml");
        let score = cfg.analyze.score.expect("score");
        assert_eq!(score.volume_min, vec![(100, 20), (10, 5)]);
        assert_eq!(score.issues_over, 0);
        assert_eq!(score.coverage_min, ScoreThresholds::default().coverage_min);
    }

    #[test]
    fn finds_config_in_a_parent_directory() {
        let dir = tempfile::tempdir().expect("tempdir");
        let nested = dir.path().join("a").join("b");
        std::fs::create_dir_all(&nested).expect("mkdir");
        std::fs::write(dir.path().join(CONFIG_FILENAME), "").expect("write");
        let found = find_file_upwards(&nested, CONFIG_FILENAME, 4).expect("found");
        assert_eq!(found, dir.path().join(CONFIG_FILENAME));
        assert!(find_file_upwards(&nested, "nope.toml", 1).is_none());
    }

    #[test]
    fn explicit_path_wins_and_resolves_relative_entries() {
        let dir = tempfile::tempdir().expect("tempdir");
        let cfg_path = dir.path().join("custom.toml");
        std::fs::write(&cfg_path, "[llm]\nmodel = \"m\"\n").expect("write");
        let loaded = LoadedConfig::locate(Some(cfg_path.clone()), dir.path()).expect("load");
        assert_eq!(loaded.path, cfg_path);
        assert_eq!(loaded.file.llm.model.as_deref(), Some("m"));
        assert_eq!(loaded.resolve(Path::new("x.json")), dir.path().join("x.json"));
    }

    #[test]
    fn vocabulary_file_overrides_selected_sections() {
        let text = r#"
[[terms]]
generic = "ships"
domain = ["ads"]

[measures]
Count = "Volume"
"#;
        let file: VocabularyFile = toml::from_str(text).expect("toml");
        let (vocab, _norm) = file.into_tables().expect("tables");
        assert_eq!(vocab.len(), 1);
        assert_eq!(vocab.rewrite("Count the ships"), "Count the ads");
    }

    #[test]
    fn builtin_vocabulary_file_reparses_to_the_same_tables() {
        let text = VocabularyFile::builtin().to_toml().expect("toml");
        let file: VocabularyFile = toml::from_str(&text).expect("reparse");
        let (vocab, _) = file.into_tables().expect("tables");
        assert_eq!(vocab.len(), VocabularyMapping::builtin().len());
    }

    #[test]
    fn non_idempotent_table_is_a_configuration_error() {
        let text = "[measures]\nCount = \"Total\"\nTotal = \"Sum\"\n";
        let file: VocabularyFile = toml::from_str(text).expect("toml");
        let err = file.into_tables().unwrap_err();
        assert!(matches!(
            err.downcast_ref::<CorpusError>(),
            Some(CorpusError::Configuration(_))
        ));
    }
}
