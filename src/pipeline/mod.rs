mod config;
pub mod prompts;
mod trace;
mod translator;

pub use config::{init_default_config, PipelineConfig};
pub use prompts::PromptSet;
pub use trace::TraceWriter;
pub use translator::{RunSummary, Stage, TranslationPipeline};
