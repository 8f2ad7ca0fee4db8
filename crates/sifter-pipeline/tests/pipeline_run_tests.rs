//! End-to-end runs of the pipeline over in-memory collaborators.

mod common;

use common::*;
use sifter_config::ChunkingSettings;
use sifter_core::{
    FlatL2Index, RecordId, RemovalReason, Stage, VecAuditSink, VecSink, VecSource, EXIT_PROCESSING,
    EXIT_VALIDATION,
};
use sifter_pipeline::DedupPipeline;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

#[tokio::test]
async fn test_exact_only_run() {
    let config = base_config().semantic(false).min_length(0).build().unwrap();
    let source = VecSource::from_texts(["Hello World", "hello world", "Hello  World", "Goodbye"]);
    let mut sink = VecSink::default();

    let report = DedupPipeline::new(config)
        .run(&source, &mut sink, None, &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(indices(&sink.records), vec![0, 3]);
    assert_eq!(report.stats.input_rows, 4);
    assert_eq!(report.stats.exact_duplicates, 2);
    assert_eq!(report.stats.after_semantic_rows, 2);
    assert_eq!(report.stats.final_rows, 2);
    assert_eq!(report.stages_run, vec![Stage::ExactDedup, Stage::Validation]);
    assert_eq!(sink.writes, 1);
}

#[tokio::test]
async fn test_full_run_removes_exact_semantic_and_short() {
    let config = base_config().build().unwrap();
    let source = CountingSource::new(&sample_texts());
    let mut sink = VecSink::default();
    let mut audit = VecAuditSink::default();

    let report = DedupPipeline::new(config)
        .with_embedder(embedder(TopicEmbedder::new()))
        .run(&source, &mut sink, Some(&mut audit), &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(indices(&sink.records), vec![0, 1, 3, 7]);

    let stats = &report.stats;
    assert_eq!(stats.input_rows, 8);
    assert_eq!(stats.after_exact_dedup_rows, 7);
    assert_eq!(stats.after_chunking_rows, 7);
    assert_eq!(stats.after_semantic_rows, 5);
    assert_eq!(stats.final_rows, 4);
    assert_eq!(stats.exact_duplicates, 1);
    assert_eq!(stats.semantic_duplicates, 2);
    assert_eq!(stats.validation_drops, 1);
    assert_eq!(stats.total_dropped(), 4);
    assert_eq!(stats.validation_dropped_chars, 4);

    let mut summary: Vec<_> = audit
        .events
        .iter()
        .map(|e| (e.original_index, e.reason, e.canonical_index))
        .collect();
    summary.sort_by_key(|(idx, _, _)| *idx);
    assert_eq!(
        summary,
        vec![
            (2, RemovalReason::ExactDuplicate, Some(0)),
            (4, RemovalReason::SemanticDuplicate, Some(0)),
            (5, RemovalReason::Validation, None),
            (6, RemovalReason::SemanticDuplicate, Some(1)),
        ]
    );
    assert_eq!(report.audit_events, 4);
    assert_eq!(source.opens(), 1);
}

#[tokio::test]
async fn test_duplicates_in_different_batches_are_linked() {
    // Batch size 1 puts every record in its own embedding batch
    let config = base_config().batch_size(1).embed_concurrency(3).build().unwrap();
    let source = VecSource::from_texts([
        "omega: first statement of the idea",
        "sigma: something unrelated",
        "kappa: also unrelated",
        "omega: first statement of the idea, reworded",
    ]);
    let mut sink = VecSink::default();
    let embedder = Arc::new(TopicEmbedder::new());

    let report = DedupPipeline::new(config)
        .with_embedder(embedder.clone())
        .run(&source, &mut sink, None, &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(indices(&sink.records), vec![0, 1, 2]);
    assert_eq!(report.stats.semantic_duplicates, 1);
    assert_eq!(embedder.calls(), 4);
    assert!(embedder.batches.lock().iter().all(|&n| n == 1));
}

#[tokio::test]
async fn test_squared_l2_index_gives_same_output() {
    let mut outputs = Vec::new();
    for use_l2 in [false, true] {
        let config = base_config().dedup_threshold(0.90).build().unwrap();
        let mut pipeline =
            DedupPipeline::new(config).with_embedder(embedder(TopicEmbedder::new()));
        if use_l2 {
            pipeline = pipeline.with_index_factory(|| Box::new(FlatL2Index::new()));
        }
        let mut sink = VecSink::default();
        pipeline
            .run(
                &VecSource::from_texts(sample_texts()),
                &mut sink,
                None,
                &CancellationToken::new(),
            )
            .await
            .unwrap();
        outputs.push(sink.records);
    }
    assert_eq!(outputs[0], outputs[1]);
}

#[tokio::test]
async fn test_chunks_carry_parent_index() {
    let config = base_config()
        .semantic(false)
        .min_length(0)
        .chunking(ChunkingSettings::with_size(20).overlap(5))
        .build()
        .unwrap();
    let source = VecSource::from_texts([
        "one two three four five six seven eight nine ten",
        "short",
    ]);
    let mut sink = VecSink::default();

    let report = DedupPipeline::new(config)
        .run(&source, &mut sink, None, &CancellationToken::new())
        .await
        .unwrap();

    let first: Vec<_> = sink.records.iter().filter(|r| r.original_index() == 0).collect();
    assert!(first.len() > 1);
    for (seq, chunk) in first.iter().enumerate() {
        assert_eq!(chunk.id, RecordId::new(0).chunk(seq as u32));
        assert!(chunk.char_len() <= 20);
    }
    assert_eq!(report.stats.after_chunking_rows, sink.records.len() as u64);
    assert!(report.stages_run.contains(&Stage::Chunking));
}

#[tokio::test]
async fn test_dry_run_skips_sink_but_reports() {
    let config = base_config().dry_run(true).build().unwrap();
    let mut sink = VecSink::default();
    let mut audit = VecAuditSink::default();

    let report = DedupPipeline::new(config)
        .with_embedder(embedder(TopicEmbedder::new()))
        .run(
            &VecSource::from_texts(sample_texts()),
            &mut sink,
            Some(&mut audit),
            &CancellationToken::new(),
        )
        .await
        .unwrap();

    assert!(report.dry_run);
    assert_eq!(sink.writes, 0);
    assert_eq!(report.stats.final_rows, 4);
    assert_eq!(audit.events.len(), 4);
}

#[tokio::test]
async fn test_empty_input_is_validation_error() {
    let config = base_config().semantic(false).build().unwrap();
    let mut sink = VecSink::default();

    let err = DedupPipeline::new(config)
        .run(
            &VecSource::default(),
            &mut sink,
            None,
            &CancellationToken::new(),
        )
        .await
        .unwrap_err();

    assert_eq!(err.exit_code(), EXIT_VALIDATION);
    assert_eq!(err.to_string(), "Input dataset is empty");
    assert_eq!(sink.writes, 0);
}

#[tokio::test]
async fn test_semantic_without_embedder_is_rejected() {
    let config = base_config().build().unwrap();
    let source = CountingSource::new(&sample_texts());
    let mut sink = VecSink::default();

    let err = DedupPipeline::new(config)
        .run(&source, &mut sink, None, &CancellationToken::new())
        .await
        .unwrap_err();

    assert_eq!(err.exit_code(), EXIT_VALIDATION);
    assert!(err.hint().is_some());
    assert_eq!(source.opens(), 0);
}

#[tokio::test]
async fn test_embedder_failure_aborts_without_output() {
    let config = base_config().build().unwrap();
    let mut sink = VecSink::default();
    let mut audit = VecAuditSink::default();
    let embedder = Arc::new(TopicEmbedder::failing_on(2));

    let err = DedupPipeline::new(config)
        .with_embedder(embedder.clone())
        .run(
            &VecSource::from_texts(sample_texts()),
            &mut sink,
            Some(&mut audit),
            &CancellationToken::new(),
        )
        .await
        .unwrap_err();

    assert_eq!(err.exit_code(), EXIT_PROCESSING);
    assert_eq!(embedder.calls(), 2, "processing errors are not retried");
    assert_eq!(sink.writes, 0);
    assert!(audit.events.is_empty());
}

#[tokio::test]
async fn test_short_embedder_response_is_processing_error() {
    let config = base_config().build().unwrap();
    let mut sink = VecSink::default();

    let err = DedupPipeline::new(config)
        .with_embedder(embedder(TopicEmbedder::dropping_one()))
        .run(
            &VecSource::from_texts(sample_texts()),
            &mut sink,
            None,
            &CancellationToken::new(),
        )
        .await
        .unwrap_err();

    assert_eq!(err.category(), "processing");
    assert!(err.to_string().contains("vectors for"));
}

#[tokio::test]
async fn test_audit_write_failure_keeps_the_output() {
    let config = base_config().semantic(false).min_length(0).build().unwrap();
    let source = VecSource::from_texts(["Hello World", "hello world", "Goodbye"]);
    let mut sink = VecSink::default();
    let mut audit = FailingAuditSink::default();

    let report = DedupPipeline::new(config)
        .run(&source, &mut sink, Some(&mut audit), &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(audit.attempts, 1);
    assert_eq!(sink.writes, 1);
    assert_eq!(indices(&sink.records), vec![0, 2]);
    assert_eq!(report.audit_events, 1);
}
