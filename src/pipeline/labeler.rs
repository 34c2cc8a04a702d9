use std::path::{Path, PathBuf};
use std::time::Duration;

use serde_json::Value;

use crate::corpus::{
    load_corpus, write_corpus, write_json_atomic, AnnotationRecord, TrainingExample,
};
use crate::error::{CorpusError, CorpusResult};
use crate::models::{CompletionBackend, CompletionRequest};
use crate::progress::ConsoleProgress;
use crate::textutil::{cleanup_model_text, must_extract_json_obj, truncate_chars};

use super::config::{LlmOptions, PipelineConfig};
use super::prompts::{PromptTemplate, SYSTEM_PROMPT};
use super::trace::TraceWriter;

/// Bounded retry with exponential backoff on transport failures.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Upper bound on completion calls per question; never below 1.
    pub max_attempts: u32,
    pub backoff_unit: Duration,
    /// Pause after every question that resolved to an annotation.
    pub inter_call_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff_unit: Duration::from_secs(1),
            inter_call_delay: Duration::from_millis(500),
        }
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, backoff_unit: Duration, inter_call_delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            backoff_unit,
            inter_call_delay,
        }
    }

    /// No pauses at all; used by probes against local endpoints and by tests.
    pub fn immediate(max_attempts: u32) -> Self {
        Self::new(max_attempts, Duration::ZERO, Duration::ZERO)
    }

    /// Sleep after the zero-based `attempt` failed with a transport error.
    pub fn backoff_delay(&self, attempt: u32) -> Duration {
        self.backoff_unit
            .saturating_mul(2u32.saturating_pow(attempt))
    }
}

/// How a question resolved when it did not propagate an error.
#[derive(Clone, Debug, PartialEq)]
pub enum LabelOutcome {
    Labeled(Value),
    /// Every allowed attempt answered with something unparseable.
    Fallback(Value),
}

impl LabelOutcome {
    pub fn is_fallback(&self) -> bool {
        matches!(self, Self::Fallback(_))
    }

    pub fn into_output(self) -> Value {
        match self {
            Self::Labeled(v) | Self::Fallback(v) => v,
        }
    }
}

/// `data[start..end]`; `end = None` runs to the end of the corpus.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct LabelWindow {
    pub start: usize,
    pub end: Option<usize>,
}

impl LabelWindow {
    /// Clamp to a corpus of `len` examples.
    pub fn resolve(&self, len: usize) -> (usize, usize) {
        let end = self.end.unwrap_or(len).min(len);
        (self.start.min(end), end)
    }
}

#[derive(Clone, Debug, Default)]
pub struct LabelSummary {
    pub start: usize,
    pub end: usize,
    pub processed: usize,
    pub labeled: usize,
    pub fallbacks: usize,
    /// Questions whose last attempt was a transport failure; the original example is kept.
    pub kept_original: usize,
    pub checkpoints: usize,
    pub checkpoint_path: PathBuf,
    pub issues: Vec<String>,
}

/// `{output}.temp_{start}_{end}`
pub fn checkpoint_path(output: &Path, start: usize, end: usize) -> PathBuf {
    let mut name = output.as_os_str().to_os_string();
    name.push(format!(".temp_{start}_{end}"));
    PathBuf::from(name)
}

/// Clean a raw model answer and accept it only when it carries both top-level keys.
pub fn parse_annotation(text: &str) -> CorpusResult<Value> {
    let cleaned = cleanup_model_text(text);
    let value = must_extract_json_obj(&cleaned).map_err(|e| CorpusError::parse(format!("{e:#}")))?;
    if value.get("intent").is_none() {
        return Err(CorpusError::parse("answer has no intent"));
    }
    match value.get("discovery_results") {
        Some(Value::Array(_)) => Ok(value),
        Some(_) => Err(CorpusError::parse("discovery_results is not a list")),
        None => Err(CorpusError::parse("answer has no discovery_results")),
    }
}

pub struct LabelingPipeline<B: CompletionBackend> {
    backend: B,
    prompt: PromptTemplate,
    llm: LlmOptions,
    retry: RetryPolicy,
    batch_size: usize,
    checkpoint_every: usize,
    log_max_chars: usize,
    progress: ConsoleProgress,
    trace: TraceWriter,
}

impl<B: CompletionBackend> LabelingPipeline<B> {
    pub fn new(
        backend: B,
        prompt: PromptTemplate,
        llm: LlmOptions,
        progress: ConsoleProgress,
    ) -> Self {
        Self {
            backend,
            prompt,
            llm,
            retry: RetryPolicy::default(),
            batch_size: 10,
            checkpoint_every: 50,
            log_max_chars: 80,
            progress,
            trace: TraceWriter::disabled(),
        }
    }

    pub fn from_config(
        cfg: &PipelineConfig,
        backend: B,
        progress: ConsoleProgress,
    ) -> anyhow::Result<Self> {
        let trace = TraceWriter::new(cfg.trace_dir.clone(), cfg.trace_prompts)?;
        Ok(Self::new(backend, cfg.prompt.clone(), cfg.llm.clone(), progress)
            .with_retry(cfg.retry)
            .with_batching(cfg.batch_size, cfg.checkpoint_every)
            .with_trace(trace)
            .with_log_max_chars(cfg.log_max_chars))
    }

    #[must_use]
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry =
            RetryPolicy::new(retry.max_attempts, retry.backoff_unit, retry.inter_call_delay);
        self
    }

    #[must_use]
    pub fn with_batching(mut self, batch_size: usize, checkpoint_every: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self.checkpoint_every = checkpoint_every.max(1);
        self
    }

    #[must_use]
    pub fn with_trace(mut self, trace: TraceWriter) -> Self {
        self.trace = trace;
        self
    }

    #[must_use]
    pub fn with_log_max_chars(mut self, n: usize) -> Self {
        self.log_max_chars = n.max(8);
        self
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    fn request_for(&self, question: &str) -> CompletionRequest {
        CompletionRequest {
            model: self.llm.model.clone(),
            system: SYSTEM_PROMPT.to_string(),
            prompt: self.prompt.assemble(question),
            temperature: self.llm.temperature,
            max_tokens: self.llm.max_tokens,
            json_mode: self.llm.json_mode,
        }
    }

    /// Label one question. At most `max_attempts` completion calls are made.
    ///
    /// The failure kind of the final attempt decides the result: an unparseable answer
    /// yields the fallback skeleton, a transport failure is returned to the caller.
    /// Configuration errors are returned at once.
    pub fn process_question(&mut self, index: usize, question: &str) -> CorpusResult<LabelOutcome> {
        let request = self.request_for(question);
        let max_attempts = self.retry.max_attempts;
        let short = truncate_chars(question, self.log_max_chars.min(50));
        let mut attempt: u32 = 0;
        loop {
            let is_last = attempt + 1 >= max_attempts;
            let _ = self
                .trace
                .write_question_text(index, attempt + 1, "prompt", &request.prompt);
            match self.backend.complete(&request) {
                Ok(text) => {
                    let _ = self
                        .trace
                        .write_question_text(index, attempt + 1, "response", &text);
                    match parse_annotation(&text) {
                        Ok(value) => return Ok(LabelOutcome::Labeled(value)),
                        Err(err) => {
                            self.progress.warn(format!(
                                "Unparseable answer (attempt {}/{max_attempts}) for: {short}: {err}",
                                attempt + 1
                            ));
                            if is_last {
                                return Ok(LabelOutcome::Fallback(
                                    AnnotationRecord::fallback(question).to_value(),
                                ));
                            }
                        }
                    }
                }
                Err(err @ CorpusError::Transport(_)) => {
                    self.progress.warn(format!(
                        "Request failed (attempt {}/{max_attempts}): {err}",
                        attempt + 1
                    ));
                    if is_last {
                        return Err(err);
                    }
                    pause(self.retry.backoff_delay(attempt));
                }
                Err(err) => return Err(err),
            }
            attempt += 1;
        }
    }

    /// Load `input`, label the window, checkpoint along the way and write `output` at the end.
    pub fn run(
        &mut self,
        input: &Path,
        output: &Path,
        window: LabelWindow,
    ) -> anyhow::Result<LabelSummary> {
        self.progress.info(format!("Load corpus: {}", input.display()));
        let data = load_corpus(input)?;
        self.process_corpus(&data, window, output)
    }

    pub fn process_corpus(
        &mut self,
        data: &[TrainingExample],
        window: LabelWindow,
        output: &Path,
    ) -> anyhow::Result<LabelSummary> {
        let (start, end) = window.resolve(data.len());
        let slice = &data[start..end];
        let total = slice.len();
        let mut summary = LabelSummary {
            start,
            end,
            checkpoint_path: checkpoint_path(output, start, end),
            ..LabelSummary::default()
        };
        self.progress.info(format!(
            "Labeling {total} examples (indices {start}..{end}) with {}",
            self.llm.model
        ));

        let mut results: Vec<TrainingExample> = Vec::with_capacity(total);
        for (b, batch) in slice.chunks(self.batch_size).enumerate() {
            let done_before = results.len();
            for (j, example) in batch.iter().enumerate() {
                let index = start + b * self.batch_size + j;
                self.progress.info(format!(
                    "Example {}: {}",
                    index + 1,
                    truncate_chars(&example.input, self.log_max_chars)
                ));
                match self.process_question(index, &example.input) {
                    Ok(outcome) => {
                        if outcome.is_fallback() {
                            summary.fallbacks += 1;
                            summary
                                .issues
                                .push(format!("Example {}: fallback annotation", index + 1));
                        } else {
                            summary.labeled += 1;
                        }
                        results.push(TrainingExample::new(
                            example.input.clone(),
                            outcome.into_output(),
                        ));
                        pause(self.retry.inter_call_delay);
                    }
                    Err(err) if err.is_recoverable() => {
                        self.progress
                            .warn(format!("Failed example {}: {err}; keeping original", index + 1));
                        summary.kept_original += 1;
                        summary.issues.push(format!("Example {}: {err}", index + 1));
                        results.push(example.clone());
                    }
                    Err(err) => return Err(err.into()),
                }
            }
            self.progress.progress("label", results.len(), total);

            if results.len() / self.checkpoint_every > done_before / self.checkpoint_every {
                write_json_atomic(&summary.checkpoint_path, &results)?;
                summary.checkpoints += 1;
                self.progress.info(format!(
                    "Checkpoint {}/{total}: {}",
                    results.len(),
                    summary.checkpoint_path.display()
                ));
            }
        }

        write_corpus(output, &results)?;
        summary.processed = results.len();
        self.progress.info(format!(
            "Wrote {} examples: {}",
            summary.processed,
            output.display()
        ));
        Ok(summary)
    }

    /// Label a handful of free-standing questions; ones that fail outright are skipped.
    pub fn probe(&mut self, questions: &[String]) -> anyhow::Result<Vec<TrainingExample>> {
        let mut out = Vec::with_capacity(questions.len());
        for (i, q) in questions.iter().enumerate() {
            self.progress.info(format!("Probe {}/{}: {q}", i + 1, questions.len()));
            match self.process_question(i, q) {
                Ok(outcome) => {
                    if outcome.is_fallback() {
                        self.progress.warn("fallback annotation used");
                    }
                    out.push(TrainingExample::new(q.clone(), outcome.into_output()));
                }
                Err(err) if err.is_recoverable() => {
                    self.progress.warn(format!("Probe {} failed: {err}", i + 1));
                }
                Err(err) => return Err(err.into()),
            }
        }
        Ok(out)
    }
}

fn pause(d: Duration) {
    if !d.is_zero() {
        std::thread::sleep(d);
    }
}
