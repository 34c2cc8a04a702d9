use std::path::Path;

use crate::corpus::{load_corpus, write_corpus, TrainingExample};
use crate::normalize::SchemaNormalizer;
use crate::progress::ConsoleProgress;
use crate::vocabulary::VocabularyMapping;

const PROGRESS_EVERY: usize = 1000;

/// Applies the vocabulary mapper to questions and the schema normalizer to annotations.
pub struct CorpusConverter<'a> {
    vocabulary: &'a VocabularyMapping,
    normalizer: &'a SchemaNormalizer,
}

#[derive(Clone, Debug)]
pub struct ConversionSummary {
    pub converted: usize,
    /// `(original, converted)` questions from the head of the corpus.
    pub samples: Vec<(String, String)>,
}

impl<'a> CorpusConverter<'a> {
    pub fn new(vocabulary: &'a VocabularyMapping, normalizer: &'a SchemaNormalizer) -> Self {
        Self {
            vocabulary,
            normalizer,
        }
    }

    #[must_use]
    pub fn convert_example(&self, example: &TrainingExample) -> TrainingExample {
        TrainingExample {
            input: self.vocabulary.rewrite(&example.input),
            output: self.normalizer.normalize(&example.output),
        }
    }

    /// Convert every example, keeping load order.
    #[must_use]
    pub fn convert_all(
        &self,
        examples: &[TrainingExample],
        progress: &ConsoleProgress,
    ) -> Vec<TrainingExample> {
        let total = examples.len();
        let mut out = Vec::with_capacity(total);
        for (i, ex) in examples.iter().enumerate() {
            if i % PROGRESS_EVERY == 0 {
                progress.progress("convert", i, total);
            }
            out.push(self.convert_example(ex));
        }
        progress.progress("convert", total, total);
        out
    }

    /// Load `input`, convert it completely, then write `output` in one atomic step.
    pub fn run(
        &self,
        input: &Path,
        output: &Path,
        sample_count: usize,
        progress: &ConsoleProgress,
    ) -> anyhow::Result<ConversionSummary> {
        progress.info(format!("Load corpus: {}", input.display()));
        let original = load_corpus(input)?;
        progress.info(format!(
            "Converting {} examples to the BI domain",
            original.len()
        ));
        let converted = self.convert_all(&original, progress);

        progress.info(format!("Write converted corpus: {}", output.display()));
        write_corpus(output, &converted)?;

        let samples = original
            .iter()
            .zip(converted.iter())
            .take(sample_count)
            .map(|(a, b)| (a.input.clone(), b.input.clone()))
            .collect();
        Ok(ConversionSummary {
            converted: converted.len(),
            samples,
        })
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn converts_question_and_annotation_together() {
        let vocab = VocabularyMapping::builtin();
        let norm = SchemaNormalizer::builtin();
        let conv = CorpusConverter::new(&vocab, &norm);
        let ex = TrainingExample::new(
            "How many departments are there?",
            json!({"intent": "i", "discovery_results": [{"measures": [{"name": "Count"}]}]}),
        );
        let out = conv.convert_example(&ex);
        assert_eq!(out.input, "How many publishers are there?");
        assert_eq!(out.output["discovery_results"][0]["measures"][0]["name"], "Total");
    }

    #[test]
    fn failed_load_leaves_no_output() {
        let dir = tempfile::tempdir().expect("tempdir");
        let input = dir.path().join("bad.json");
        std::fs::write(&input, "[{\"input\": \"q\", \"output\": {}}, {\"input\": 3}]").expect("write");
        let output = dir.path().join("out.json");

        let vocab = VocabularyMapping::builtin();
        let norm = SchemaNormalizer::builtin();
        let conv = CorpusConverter::new(&vocab, &norm);
        assert!(conv.run(&input, &output, 5, &ConsoleProgress::quiet()).is_err());
        assert!(!output.exists());
    }
}
