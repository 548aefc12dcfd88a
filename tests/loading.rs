mod common;

use common::{cpu_service, service_config, write_checkpoint};
use koelectra_sentiment::{ModelVariant, SentimentError};

#[test]
fn locator_prefers_the_finetuned_checkpoint() {
    let dir = tempfile::tempdir().unwrap();
    let config = service_config(dir.path());
    write_checkpoint(&config.base_model_dir, 2);
    write_checkpoint(&config.finetuned_model_dir, 2);
    let service = cpu_service(config);

    let info = service.model_info();
    assert_eq!(info.variant, ModelVariant::Finetuned);
    assert!(!info.loaded);

    service.predict("좋다").unwrap();
    let info = service.model_info();
    assert_eq!(info.variant, ModelVariant::Finetuned);
    assert!(info.model_path.ends_with("finetuned"));
    assert!(info.loaded);
}

#[test]
fn locator_falls_back_to_the_base_checkpoint() {
    let dir = tempfile::tempdir().unwrap();
    let config = service_config(dir.path());
    write_checkpoint(&config.base_model_dir, 2);
    let service = cpu_service(config);

    service.predict("좋다").unwrap();
    let info = service.model_info();
    assert_eq!(info.variant, ModelVariant::Base);
    assert!(info.model_path.ends_with("base"));
}

#[test]
fn model_info_reflects_the_configuration() {
    let dir = tempfile::tempdir().unwrap();
    let service = cpu_service(service_config(dir.path()));

    let info = service.model_info();
    assert_eq!(info.model_name, "KoELECTRA");
    assert_eq!(info.device, "cpu");
    assert_eq!(info.max_length, 512);
    assert_eq!(info.labels, vec!["부정".to_string(), "긍정".to_string()]);
    assert!(!info.loaded);
}

#[test]
fn checkpoint_with_a_mismatched_head_still_loads() {
    // A three-class head cannot be copied into the two-class network; the
    // encoder weights are, and the head is re-initialized instead.
    let dir = tempfile::tempdir().unwrap();
    let config = service_config(dir.path());
    write_checkpoint(&config.base_model_dir, 3);
    let service = cpu_service(config);

    let prediction = service.predict("배우 연기가 최고").unwrap();
    assert_eq!(prediction.probabilities.len(), 2);
    let sum: f32 = prediction.probabilities.values().sum();
    assert!((sum - 1.0).abs() < 2e-3);
}

#[test]
fn compatible_heads_are_copied_not_reinitialized() {
    // Loading the same checkpoint twice must give identical predictions; if
    // the two-class head were re-initialized on load the confidences would
    // differ between the two instances.
    let dir = tempfile::tempdir().unwrap();
    let config = service_config(dir.path());
    write_checkpoint(&config.base_model_dir, 2);

    let first = cpu_service(config.clone());
    let second = cpu_service(config);

    let a = first.predict("스토리 최고").unwrap();
    let b = second.predict("스토리 최고").unwrap();
    assert_eq!(a.sentiment, b.sentiment);
    assert!((a.confidence - b.confidence).abs() < 1e-7);
}

#[test]
fn missing_checkpoint_surfaces_as_model_unavailable_on_every_call() {
    let dir = tempfile::tempdir().unwrap();
    let service = cpu_service(service_config(dir.path()));

    for _ in 0..2 {
        match service.predict("좋다") {
            Err(SentimentError::ModelUnavailable(reason)) => {
                assert!(reason.contains("does not exist"));
            }
            other => panic!("expected ModelUnavailable, got {other:?}"),
        }
    }
}

#[test]
fn incomplete_checkpoint_directories_are_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let config = service_config(dir.path());
    // Directory exists but has no config.json.
    std::fs::create_dir_all(&config.base_model_dir).unwrap();
    let service = cpu_service(config);

    match service.predict("좋다") {
        Err(SentimentError::ModelUnavailable(reason)) => {
            assert!(reason.contains("config.json"));
        }
        other => panic!("expected ModelUnavailable, got {other:?}"),
    }
}

#[test]
fn reload_picks_up_a_newly_finetuned_checkpoint() {
    let dir = tempfile::tempdir().unwrap();
    let config = service_config(dir.path());
    write_checkpoint(&config.base_model_dir, 2);
    let service = cpu_service(config.clone());

    service.predict("좋다").unwrap();
    assert_eq!(service.model_info().variant, ModelVariant::Base);

    // A fine-tuning run completed: the next reload must switch over.
    write_checkpoint(&config.finetuned_model_dir, 2);
    let info = service.reload().unwrap();
    assert_eq!(info.variant, ModelVariant::Finetuned);
    assert!(info.loaded);

    let prediction = service.predict("좋다").unwrap();
    assert_eq!(prediction.model_info.variant, ModelVariant::Finetuned);
}

#[test]
fn failed_reload_keeps_the_resident_model() {
    let dir = tempfile::tempdir().unwrap();
    let config = service_config(dir.path());
    write_checkpoint(&config.base_model_dir, 2);
    let service = cpu_service(config.clone());
    service.predict("좋다").unwrap();

    // An empty fine-tuned directory wins selection but cannot load.
    std::fs::create_dir_all(&config.finetuned_model_dir).unwrap();
    assert!(service.reload().is_err());

    let info = service.model_info();
    assert!(info.loaded);
    assert_eq!(info.variant, ModelVariant::Base);
    service.predict("좋다").unwrap();
}
