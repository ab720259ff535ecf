//! Example-driven translation through numeric pattern completion.
//!
//! For each source query the most relevant corpus pairs are retrieved, their
//! target sides are encoded as corpus-local integer codes, and a completion
//! service is asked to continue the pattern. The answer is decoded back to
//! text and scored for plausibility against a fixed reference sample.

pub mod anomaly;
pub mod completion;
pub mod config;
pub mod corpus;
pub mod error;
pub mod index;
pub mod pipeline;
pub mod progress;
pub mod rank;
pub mod record;
pub mod retrieval;
pub mod textutil;
pub mod tokenizer;

pub use anomaly::LinguisticAnomalyDetector;
pub use corpus::Corpus;
pub use error::{CompletionError, CoreError};
pub use index::SimilarityIndex;
pub use rank::DifficultyEstimator;
pub use retrieval::ExampleRetriever;
pub use tokenizer::RelativeTokenizer;
