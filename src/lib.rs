pub mod config;
pub mod convert;
pub mod corpus;
pub mod error;
pub mod models;
pub mod normalize;
pub mod pipeline;
pub mod progress;
pub mod quality;
pub mod questions;
pub mod textutil;
pub mod vocabulary;

pub use convert::CorpusConverter;
pub use corpus::TrainingExample;
pub use error::{CorpusError, CorpusResult};
pub use normalize::SchemaNormalizer;
pub use quality::{AnalysisReport, QualityAnalyzer};
pub use vocabulary::VocabularyMapping;
