use std::cell::Cell;
use std::path::Path;

use metapattern::completion::{CompletionBackend, RetryPolicy, RetryingBackend};
use metapattern::config::AppConfig;
use metapattern::corpus::{load_data_dir, CorpusFiles};
use metapattern::error::CompletionError;
use metapattern::pipeline::{PipelineConfig, TranslationPipeline};
use metapattern::progress::ConsoleProgress;
use metapattern::record::{read_records, RecordStatus, TranslationRecord};

/// Answers with the codes of the first example target, failing every `fail_every`-th call.
struct Scripted {
    calls: Cell<usize>,
    fail_every: Option<usize>,
}

impl Scripted {
    fn reliable() -> Self {
        Self {
            calls: Cell::new(0),
            fail_every: None,
        }
    }
}

impl CompletionBackend for Scripted {
    fn name(&self) -> &str {
        "scripted"
    }

    fn complete(&self, _system: &str, user: &str) -> Result<String, CompletionError> {
        let n = self.calls.get() + 1;
        self.calls.set(n);
        if matches!(self.fail_every, Some(k) if n % k == 0) {
            return Err(CompletionError::Status {
                backend: "scripted".into(),
                status: 400,
                body: "rejected".into(),
            });
        }
        let codes = user
            .lines()
            .find_map(|l| l.strip_prefix("target: "))
            .unwrap_or("");
        Ok(format!("Reasoning goes here.\ntarget: {codes}"))
    }
}

fn write_data(dir: &Path) {
    std::fs::write(
        dir.join("source.txt"),
        "Und er baute das Haus.\nDie Stadt war groß.\nEr rief den Namen an.\n",
    )
    .unwrap();
    std::fs::write(
        dir.join("target.txt"),
        "And he built the house.\nThe city was great.\nHe called on the name.\n",
    )
    .unwrap();
    std::fs::write(
        dir.join("prompts.txt"),
        "Er baute die Stadt.\nDas Haus war groß.\nUnbekannte Wörter hier.\nEr rief.\n",
    )
    .unwrap();
}

fn config(dir: &Path) -> PipelineConfig {
    let mut file_cfg = AppConfig::default();
    file_cfg.output.trace_prompts = Some(false);
    PipelineConfig::resolve(
        dir.to_path_buf(),
        dir.join("metapattern.toml"),
        file_cfg,
        None,
        None,
    )
    .unwrap()
}

fn run(dir: &Path, resume_from: usize, max_queries: Option<usize>) -> Vec<TranslationRecord> {
    let cfg = config(dir);
    let data = load_data_dir(&cfg.data_dir, &CorpusFiles::default()).unwrap();
    let records_path = cfg.records_path.clone();
    let mut pipeline =
        TranslationPipeline::new(cfg, data.corpus, Scripted::reliable(), ConsoleProgress::new(false))
            .unwrap();
    pipeline.run(&data.prompts, resume_from, max_queries).unwrap();
    read_records(&records_path).unwrap()
}

#[test]
fn full_run_writes_one_record_per_prompt() {
    let dir = tempfile::tempdir().unwrap();
    write_data(dir.path());
    let records = run(dir.path(), 0, None);

    assert_eq!(records.len(), 4);
    assert_eq!(
        records.iter().map(|r| r.index).collect::<Vec<_>>(),
        vec![0, 1, 2, 3]
    );
    assert!(records.iter().all(|r| r.is_ok()));
    for r in &records {
        assert!((0.0..=100.0).contains(&r.anomaly_score));
        assert_eq!(r.combined_score, r.rank as f64 * r.anomaly_score);
    }

    // no corpus overlap: no examples, rank 0, nothing to decode
    let unknown = &records[2];
    assert_eq!(unknown.query, "unbekannte wörter hier");
    assert_eq!(unknown.rank, 0);
    assert_eq!(unknown.examples, "");
    assert!(unknown.codes.is_empty());

    // the scripted answer echoes the first example target
    let first = &records[0];
    assert!(first.rank >= 1);
    assert!(!first.codes.is_empty());
    assert!(!first.text.is_empty());
    assert!(!first.text.contains("[unclear]"));
}

#[test]
fn resumed_run_matches_full_run() {
    let full_dir = tempfile::tempdir().unwrap();
    write_data(full_dir.path());
    let full = run(full_dir.path(), 0, None);

    let split_dir = tempfile::tempdir().unwrap();
    write_data(split_dir.path());
    let first_half = run(split_dir.path(), 0, Some(2));
    assert_eq!(first_half.len(), 2);
    let resumed = run(split_dir.path(), 2, None);

    assert_eq!(resumed, full);
}

#[test]
fn resuming_earlier_reprocesses_without_duplicates() {
    let dir = tempfile::tempdir().unwrap();
    write_data(dir.path());
    let full = run(dir.path(), 0, None);
    let again = run(dir.path(), 1, None);
    assert_eq!(again, full);
}

#[test]
fn failures_are_recorded_and_do_not_stop_the_batch() {
    let dir = tempfile::tempdir().unwrap();
    write_data(dir.path());
    let cfg = config(dir.path());
    let data = load_data_dir(&cfg.data_dir, &CorpusFiles::default()).unwrap();
    let records_path = cfg.records_path.clone();
    let backend = RetryingBackend::new(
        Scripted {
            calls: Cell::new(0),
            fail_every: Some(2),
        },
        RetryPolicy::default(),
    );
    let mut pipeline =
        TranslationPipeline::new(cfg, data.corpus, backend, ConsoleProgress::new(false)).unwrap();
    let summary = pipeline.run(&data.prompts, 0, None).unwrap();
    assert_eq!(summary.processed, 4);
    assert_eq!(summary.failed, 2);

    let records = read_records(&records_path).unwrap();
    assert_eq!(records.len(), 4);
    assert!(records[0].is_ok());
    assert!(matches!(
        &records[1].status,
        RecordStatus::Failed { error } if error.contains("400")
    ));
    assert!(records[2].is_ok());
    assert!(!records[3].is_ok());
}
