//! The `sifter` command: wire the JSONL adapters and the HTTP embedder into
//! a pipeline run.

use crate::audit::JsonAuditSink;
use crate::cli::Cli;
use crate::embedder::HttpEmbedder;
use crate::jsonl::{JsonlSink, JsonlSource};
use anyhow::Context;
use sifter_config::{PipelineConfig, PipelineConfigBuilder};
use sifter_core::{AuditSink, SifterResult};
use sifter_pipeline::{DedupPipeline, PipelineReport};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Layer the config file (if any) under the command-line flags
pub fn resolve_config(cli: &Cli) -> SifterResult<PipelineConfigBuilder> {
    let file = match &cli.config {
        Some(path) => PipelineConfigBuilder::from_toml_file(path)?,
        None => PipelineConfigBuilder::default(),
    };
    let overrides = cli.overrides(&file);
    Ok(file.merge(overrides))
}

/// Run the pipeline described by `cli`
pub async fn execute(cli: &Cli, cancel: &CancellationToken) -> SifterResult<PipelineReport> {
    let mut builder = resolve_config(cli)?;

    let source = JsonlSource::new(
        &cli.input,
        builder.text_column.as_deref(),
        builder.required_columns.as_deref().unwrap_or_default(),
    )?;
    builder.text_column = Some(source.text_column().to_string());

    if builder.semantic != Some(false) && cli.embed_url.is_none() {
        warn!("no embedding endpoint configured (--embed-url); skipping semantic deduplication");
        builder.semantic = Some(false);
    }

    let config: PipelineConfig = builder.build()?;
    let mut pipeline = DedupPipeline::new(config.clone());
    if let (true, Some(url)) = (config.semantic_enabled(), &cli.embed_url) {
        let embedder = HttpEmbedder::new(url.as_str(), config.model_name(), cli.api_key.clone());
        pipeline = pipeline.with_embedder(Arc::new(embedder));
    }

    let mut sink = JsonlSink::new(&cli.output, config.text_column());
    let mut audit = cli.audit_log.as_ref().map(JsonAuditSink::new);

    info!(input = %cli.input.display(), output = %cli.output.display(), "starting run");
    pipeline
        .run(
            &source,
            &mut sink,
            audit.as_mut().map(|a| a as &mut dyn AuditSink),
            cancel,
        )
        .await
}

/// Human-readable run summary
pub fn summary(report: &PipelineReport) -> String {
    let stats = &report.stats;
    let mut lines = vec![
        format!("run {}", report.run_id),
        format!("  input rows:          {}", stats.input_rows),
        format!("  exact duplicates:    {}", stats.exact_duplicates),
        format!("  semantic duplicates: {}", stats.semantic_duplicates),
        format!("  validation drops:    {}", stats.validation_drops),
        format!("  output rows:         {}", stats.final_rows),
        format!(
            "  est. API savings:    ${:.2}",
            stats.estimated_api_savings()
        ),
    ];
    if stats.degenerate_vectors > 0 {
        lines.push(format!("  degenerate vectors:  {}", stats.degenerate_vectors));
    }
    if let Some(stage) = report.resumed_from() {
        lines.push(format!("  resumed after:       {stage}"));
    }
    if report.dry_run {
        lines.push("  dry run: output not written".to_string());
    }
    lines.join("\n")
}

/// Print the report to stdout, as JSON or as the summary
pub fn print_report(report: &PipelineReport, json: bool) -> anyhow::Result<()> {
    if json {
        let out = serde_json::to_string_pretty(report).context("failed to serialize run report")?;
        println!("{out}");
    } else {
        println!("{}", summary(report));
    }
    Ok(())
}
