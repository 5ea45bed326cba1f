mod common;

use std::sync::{Arc, Mutex};

use common::{Collected, TestFixtures, create_temp_order_files};
use schema_stream::{
    BatchConfig, BatchValidator, EngineConfig, ErrorCause, FileDiscovery, FileStatus, RunOptions,
    Schema, SchemaSet, ValidationPhase, ValidationProgress, Validator,
};

#[tokio::test]
async fn test_validate_valid_file() {
    let fixtures = TestFixtures::new();
    let schemas = fixtures.orders_schema_set().await;

    let result = Validator::new()
        .validate_file(fixtures.orders_valid_xml(), &schemas, RunOptions::default())
        .await;

    assert!(result.is_valid(), "unexpected errors: {:?}", result.errors);
    assert_eq!(result.parsed_node_count, 0);
}

#[tokio::test]
async fn test_validate_invalid_file_raises_each_error() {
    let fixtures = TestFixtures::new();
    let schemas = fixtures.orders_schema_set().await;

    let raised = Collected::new();
    let mut validator = Validator::new();
    {
        let raised = raised.clone();
        validator.on_error(move |error| {
            let raised = raised.clone();
            async move {
                raised.push(error.to_string());
            }
        });
    }

    let result = validator
        .validate_file(fixtures.orders_invalid_xml(), &schemas, RunOptions::default())
        .await;

    assert!(result.error_count >= 2);
    assert_eq!(raised.len() as u64, result.error_count);
    assert!(raised.items().iter().all(|line| line.starts_with("line ")));
}

#[tokio::test]
async fn test_validate_bytes_and_stream_agree() {
    let fixtures = TestFixtures::new();
    let schemas = fixtures.orders_schema_set().await;
    let bytes = tokio::fs::read(fixtures.orders_invalid_xml()).await.unwrap();
    let validator = Validator::new();

    let from_bytes = validator
        .validate_bytes(bytes.clone(), &schemas, RunOptions::default())
        .await;
    let from_stream = validator
        .validate_stream(std::io::Cursor::new(bytes), &schemas, RunOptions::default())
        .await;

    assert_eq!(from_bytes.error_count, from_stream.error_count);
    assert!(from_bytes.error_count >= 2);
}

#[tokio::test]
async fn test_validate_with_uncompilable_schema() {
    let fixtures = TestFixtures::new();
    let broken = Schema::from_bytes(
        br#"<?xml version="1.0"?>
<xs:schema xmlns:xs="http://www.w3.org/2001/XMLSchema">
  <xs:element name="Root" type="MissingType"/>
</xs:schema>"#,
    )
    .unwrap();
    let schemas = SchemaSet::new().with(broken);

    let result = Validator::new()
        .validate_file(fixtures.orders_valid_xml(), &schemas, RunOptions::default())
        .await;

    assert_eq!(result.error_count, 1);
    assert!(matches!(
        result.terminal_error().map(|e| e.cause()),
        Some(ErrorCause::SchemaCompilation(_))
    ));
}

#[tokio::test]
async fn test_finished_observer_runs_for_validator() {
    let fixtures = TestFixtures::new();
    let schemas = fixtures.orders_schema_set().await;

    let finished = Collected::new();
    let mut validator = Validator::with_config(EngineConfig::default());
    {
        let finished = finished.clone();
        validator.on_finished(move |result| {
            let finished = finished.clone();
            async move {
                finished.push(result.is_valid());
            }
        });
    }

    validator
        .validate_file(fixtures.orders_valid_xml(), &schemas, RunOptions::default())
        .await;
    validator
        .validate_file(fixtures.orders_invalid_xml(), &schemas, RunOptions::default())
        .await;

    assert_eq!(finished.items(), vec![true, false]);
}

#[tokio::test]
async fn test_batch_validation_of_a_directory() {
    let fixtures = TestFixtures::new();
    let temp_dir = create_temp_order_files(&fixtures).await.unwrap();
    let schemas = fixtures.orders_schema_set().await;

    let phases = Arc::new(Mutex::new(Vec::new()));
    let progress = {
        let phases = Arc::clone(&phases);
        Arc::new(move |progress: ValidationProgress| {
            phases.lock().unwrap().push(progress.phase);
        }) as schema_stream::ProgressCallback
    };

    let validator = BatchValidator::new(schemas, EngineConfig::default(), BatchConfig::default());
    let summary = validator
        .validate_path(temp_dir.path(), &FileDiscovery::new(), Some(progress))
        .await
        .unwrap();

    assert_eq!(summary.total_files, 3);
    assert_eq!(summary.valid_files, 2);
    assert_eq!(summary.invalid_files, 1);
    assert!(summary.has_errors());
    assert!(!summary.all_valid());

    let invalid = summary
        .file_reports
        .iter()
        .find(|report| report.status.is_invalid())
        .unwrap();
    assert!(invalid.path.ends_with("wednesday.xml"));
    assert!(matches!(invalid.status, FileStatus::Invalid { error_count } if error_count >= 2));

    let phases = phases.lock().unwrap();
    assert_eq!(phases.first(), Some(&ValidationPhase::Discovery));
    assert_eq!(phases.last(), Some(&ValidationPhase::Complete));
    assert!(phases.contains(&ValidationPhase::Compiling));
}

#[tokio::test]
async fn test_batch_fail_fast_skips_remaining_files() {
    let fixtures = TestFixtures::new();
    let temp_dir = create_temp_order_files(&fixtures).await.unwrap();
    let schemas = fixtures.orders_schema_set().await;

    let config = BatchConfig {
        max_concurrent_validations: 1,
        fail_fast: true,
        report_errors: true,
    };
    let validator = BatchValidator::new(schemas, EngineConfig::default(), config);
    let summary = validator
        .validate_path(temp_dir.path(), &FileDiscovery::new(), None)
        .await
        .unwrap();

    assert_eq!(summary.total_files, 3);
    assert_eq!(summary.invalid_files, 1);
    assert_eq!(summary.valid_files + summary.skipped_files, 2);
}

#[tokio::test]
async fn test_batch_with_no_matching_files() {
    let fixtures = TestFixtures::new();
    let temp_dir = create_temp_order_files(&fixtures).await.unwrap();
    let schemas = fixtures.orders_schema_set().await;

    let discovery = FileDiscovery::new().with_extensions(vec!["json".to_string()]);
    let validator = BatchValidator::new(schemas, EngineConfig::default(), BatchConfig::default());
    let summary = validator
        .validate_path(temp_dir.path(), &discovery, None)
        .await
        .unwrap();

    assert_eq!(summary.total_files, 0);
    assert!(!summary.has_errors());
}
