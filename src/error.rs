use thiserror::Error;

/// Failure classes shared by the converter, the analyzer and the labeling pipeline.
///
/// `Configuration` is fatal for the whole run. `Parse` and `Transport` are
/// recoverable per question: the labeling pipeline retries them and decides
/// between a fallback record and handing the error back to the batch loop.
#[derive(Debug, Error)]
pub enum CorpusError {
    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("parse error: {0}")]
    Parse(String),

    #[error("transport error: {0}")]
    Transport(String),
}

impl CorpusError {
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Configuration(msg.into())
    }

    pub fn parse(msg: impl Into<String>) -> Self {
        Self::Parse(msg.into())
    }

    pub fn transport(msg: impl Into<String>) -> Self {
        Self::Transport(msg.into())
    }

    #[must_use]
    pub fn is_recoverable(&self) -> bool {
        !matches!(self, Self::Configuration(_))
    }
}

pub type CorpusResult<T> = Result<T, CorpusError>;

#[cfg(test)]
mod tests {
    use super::CorpusError;

    #[test]
    fn only_configuration_errors_are_fatal() {
        assert!(!CorpusError::config("missing key").is_recoverable());
        assert!(CorpusError::parse("bad json").is_recoverable());
        assert!(CorpusError::transport("503").is_recoverable());
    }

    #[test]
    fn display_names_the_class() {
        let e = CorpusError::config("empty corpus");
        assert_eq!(e.to_string(), "configuration error: empty corpus");
    }
}
