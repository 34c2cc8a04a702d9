mod config;
mod labeler;
mod probe;
mod prompts;
mod trace;

pub use config::{
    init_default_config, LabelOverrides, LlmOptions, PipelineConfig, DEFAULT_LABEL_INPUT,
    DEFAULT_LABEL_OUTPUT, DEFAULT_MODEL,
};
pub use labeler::{
    checkpoint_path, parse_annotation, LabelOutcome, LabelSummary, LabelWindow, LabelingPipeline,
    RetryPolicy,
};
pub use probe::{builtin_questions, load_question_file, render_probe_summary, PROBE_QUESTIONS};
pub use prompts::{
    load_context_files, render_template, PromptTemplate, DEFAULT_LABELING_TEXT,
    MODEL_FILES_TOKEN, QUESTION_TOKEN, SYSTEM_PROMPT,
};
pub use trace::TraceWriter;
