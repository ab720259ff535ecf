use std::fmt;
use std::path::PathBuf;

use anyhow::{bail, Context};

use crate::anomaly::LinguisticAnomalyDetector;
use crate::completion::{extract_target_codes, CompletionBackend};
use crate::corpus::Corpus;
use crate::index::SimilarityIndex;
use crate::progress::ConsoleProgress;
use crate::rank::DifficultyEstimator;
use crate::record::{query_digest, RecordLog, RecordStatus, TranslationRecord};
use crate::retrieval::ExampleRetriever;
use crate::textutil::truncate_chars;
use crate::tokenizer::RelativeTokenizer;

use super::prompts::encode_example_block;
use super::trace::TraceWriter;
use super::PipelineConfig;

/// Lifecycle of one query. Only `Recorded` touches the record log.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Stage {
    Retrieving,
    AwaitingCompletion,
    Parsing,
    Detokenizing,
    Scoring,
    Recorded,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Stage::Retrieving => "retrieving",
            Stage::AwaitingCompletion => "awaiting-completion",
            Stage::Parsing => "parsing",
            Stage::Detokenizing => "detokenizing",
            Stage::Scoring => "scoring",
            Stage::Recorded => "recorded",
        };
        f.write_str(s)
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RunSummary {
    pub records_path: PathBuf,
    pub processed: usize,
    pub failed: usize,
    /// Records in the log after the run, kept prefix included.
    pub total_records: usize,
}

pub struct TranslationPipeline<B> {
    cfg: PipelineConfig,
    corpus: Corpus,
    index: SimilarityIndex,
    detector: LinguisticAnomalyDetector,
    backend: B,
    progress: ConsoleProgress,
    trace: TraceWriter,
}

impl<B: CompletionBackend> TranslationPipeline<B> {
    pub fn new(
        cfg: PipelineConfig,
        corpus: Corpus,
        backend: B,
        progress: ConsoleProgress,
    ) -> anyhow::Result<Self> {
        let index = SimilarityIndex::build(corpus.sources()).context("build similarity index")?;
        let detector =
            LinguisticAnomalyDetector::from_corpus_sample(&corpus, cfg.reference_size, cfg.seed)
                .context("sample anomaly references")?;
        let trace = match TraceWriter::new(cfg.trace_dir.clone(), cfg.trace_prompts) {
            Ok(t) => t,
            Err(e) => {
                tracing::warn!(error = %e, "tracing disabled");
                TraceWriter::disabled()
            }
        };
        tracing::info!(
            lines = corpus.len(),
            vocabulary = index.vocabulary_len(),
            references = detector.reference_len(),
            backend = backend.name(),
            "pipeline ready"
        );
        Ok(Self {
            cfg,
            corpus,
            index,
            detector,
            backend,
            progress,
            trace,
        })
    }

    pub fn detector(&self) -> &LinguisticAnomalyDetector {
        &self.detector
    }

    /// Processes `prompts[resume_from..]`, at most `max_queries` of them, and
    /// appends one record per query. A failed completion becomes a failed
    /// record; the batch keeps going.
    pub fn run<S: AsRef<str>>(
        &mut self,
        prompts: &[S],
        resume_from: usize,
        max_queries: Option<usize>,
    ) -> anyhow::Result<RunSummary> {
        if resume_from > prompts.len() {
            bail!(
                "resume offset {} is past the end of {} prompts",
                resume_from,
                prompts.len()
            );
        }
        let records_path = self.cfg.records_path.clone();
        let mut log = RecordLog::open_for_resume(&records_path, resume_from, prompts)?;

        let end = match max_queries {
            Some(n) => resume_from.saturating_add(n).min(prompts.len()),
            None => prompts.len(),
        };
        let total = end - resume_from;
        self.progress.info(format!(
            "Translate {} queries ({}..{}) via {}",
            total,
            resume_from,
            end,
            self.backend.name()
        ));

        let mut failed = 0usize;
        for (done, idx) in (resume_from..end).enumerate() {
            let record = self.process_query(idx, prompts[idx].as_ref());
            if !record.is_ok() {
                failed += 1;
            }
            log.append(&record)?;
            tracing::debug!(index = idx, stage = %Stage::Recorded, "query done");
            let detail = if record.is_ok() {
                format!(
                    "q{idx} rank={} lad={:.1}",
                    record.rank, record.anomaly_score
                )
            } else {
                format!("q{idx} failed")
            };
            self.progress.step("translate", done + 1, total, Some(&detail));
        }

        self.progress.info(self.detector.to_string());
        Ok(RunSummary {
            records_path,
            processed: total,
            failed,
            total_records: log.len(),
        })
    }

    /// Runs one query through every stage up to, but excluding, `Recorded`.
    pub fn process_query(&mut self, index: usize, query: &str) -> TranslationRecord {
        let mut stage = Stage::Retrieving;
        tracing::debug!(index, %stage, "stage");
        let retrieved = ExampleRetriever::new(&self.corpus, &self.index, self.cfg.retrieval_width)
            .retrieve(query, self.cfg.max_iterations);
        let rank = DifficultyEstimator::new(&self.index, self.cfg.rank_width)
            .with_stall_penalty(self.cfg.stall_penalty)
            .estimate_rank(query, self.cfg.max_rank);
        let examples = retrieved.render();

        let mut tokenizer = RelativeTokenizer::new(self.cfg.granularity)
            .with_placeholder(self.cfg.unknown_placeholder.clone());
        let pairs = encode_example_block(&examples, &mut tokenizer);
        let message = self.cfg.prompts.render_message(&pairs, query);
        self.write_trace(index, "system", &self.cfg.prompts.system);
        self.write_trace(index, "prompt", &message);

        let mut record = TranslationRecord {
            index,
            query: query.to_string(),
            query_digest: query_digest(query),
            examples,
            rank,
            codes: Vec::new(),
            text: String::new(),
            anomaly_score: 0.0,
            combined_score: 0.0,
            status: RecordStatus::Ok,
        };

        stage = Stage::AwaitingCompletion;
        tracing::debug!(index, %stage, rank, examples = retrieved.pairs.len(), "stage");
        let response = match self.backend.complete(&self.cfg.prompts.system, &message) {
            Ok(text) => text,
            Err(e) => {
                tracing::warn!(index, error = %e, "completion failed, recording failure");
                record.status = RecordStatus::Failed {
                    error: e.to_string(),
                };
                return record;
            }
        };
        self.write_trace(index, "response", &response);

        stage = Stage::Parsing;
        tracing::debug!(index, %stage, "stage");
        record.codes = extract_target_codes(&response);

        stage = Stage::Detokenizing;
        tracing::debug!(index, %stage, codes = record.codes.len(), "stage");
        record.text = tokenizer.detokenize(&record.codes);

        stage = Stage::Scoring;
        tracing::debug!(index, %stage, text = %truncate_chars(&record.text, 80), "stage");
        record.anomaly_score = self.detector.detect(&record.text, query);
        record.combined_score = rank as f64 * record.anomaly_score;
        record
    }

    fn write_trace(&self, index: usize, kind: &str, text: &str) {
        if let Err(e) = self.trace.write_query_text(index, kind, text) {
            tracing::warn!(index, kind, error = %e, "trace write failed");
        }
    }
}
