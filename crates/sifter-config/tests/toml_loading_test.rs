//! Loading pipeline configuration from TOML files

use sifter_config::{ConfigError, PipelineConfig, PipelineConfigBuilder};
use std::io::Write;
use tempfile::NamedTempFile;

#[test]
fn test_minimal_file_uses_defaults() {
    let builder = PipelineConfigBuilder::from_toml_str("text_column = \"body\"\n").unwrap();
    let config = builder.build().unwrap();
    assert_eq!(config.text_column(), "body");
    assert_eq!(config.batch_size(), 10_000);
}

#[test]
fn test_full_file() {
    let toml = r#"
text_column = "content"
required_columns = ["id", "content"]
dedup_threshold = 0.9
batch_size = 256
min_length = 10
model_name = "bge-small"
embed_concurrency = 4
checkpoint_dir = "/var/tmp/sifter"
resume = true

[chunking]
chunk_size = 400
chunk_overlap = 40
separators = ["\n", " "]

[guard]
warn_ratio = 0.5
fail_ratio = 0.6
"#;
    let mut file = NamedTempFile::new().unwrap();
    file.write_all(toml.as_bytes()).unwrap();

    let config = PipelineConfigBuilder::from_toml_file(file.path())
        .unwrap()
        .build()
        .unwrap();

    assert_eq!(config.dedup_threshold(), 0.9);
    assert_eq!(config.required_columns(), &["id", "content"]);
    assert_eq!(config.embed_concurrency(), 4);
    assert!(config.resume());
    let chunking = config.chunking().unwrap();
    assert_eq!(chunking.chunk_size(), 400);
    assert_eq!(chunking.chunk_overlap(), 40);
    assert_eq!(chunking.separators(), &["\n", " "]);
    assert_eq!(chunking.max_depth(), 8);
    assert_eq!(config.guard().fail_ratio(), 0.6);
}

#[test]
fn test_unknown_keys_rejected() {
    let err = PipelineConfigBuilder::from_toml_str("threshold = 0.5\n").unwrap_err();
    assert!(matches!(err, ConfigError::Parse(_)));
}

#[test]
fn test_invalid_values_fail_at_build_not_parse() {
    let builder = PipelineConfigBuilder::from_toml_str("batch_size = 0\n").unwrap();
    let err = builder.build().unwrap_err();
    assert_eq!(err.field(), Some("batch_size"));
}

#[test]
fn test_missing_file_reports_path() {
    let err = PipelineConfigBuilder::from_toml_file("/definitely/not/here.toml").unwrap_err();
    match err {
        ConfigError::Io { path, .. } => assert!(path.ends_with("here.toml")),
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn test_flags_layer_over_file() {
    let file = PipelineConfigBuilder::from_toml_str("batch_size = 64\nmin_length = 3\n").unwrap();
    let config = file
        .merge(PipelineConfig::builder().min_length(0))
        .build()
        .unwrap();
    assert_eq!(config.batch_size(), 64);
    assert_eq!(config.min_length(), 0);
}
