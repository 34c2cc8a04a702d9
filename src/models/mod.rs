pub mod openai;

use crate::error::CorpusError;

pub use openai::{OpenAiBackend, OpenAiSettings};

/// One chat-completion call: a fixed system message plus the assembled prompt.
#[derive(Clone, Debug, PartialEq)]
pub struct CompletionRequest {
    pub model: String,
    pub system: String,
    pub prompt: String,
    pub temperature: f32,
    pub max_tokens: u32,
    /// Ask the endpoint to answer with a JSON object.
    pub json_mode: bool,
}

/// The only contract the labeling pipeline has with a model: send a prompt, get text back
/// or a transport error.
pub trait CompletionBackend {
    fn complete(&mut self, request: &CompletionRequest) -> Result<String, CorpusError>;
}

impl<B: CompletionBackend + ?Sized> CompletionBackend for Box<B> {
    fn complete(&mut self, request: &CompletionRequest) -> Result<String, CorpusError> {
        (**self).complete(request)
    }
}
