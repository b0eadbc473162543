/// Integration tests for the prediction path
///
/// These tests train a small ensemble once per test and check:
/// - Required-key presence checks
/// - Unseen soil type rejection
/// - Stable predictions for a known vector
/// - The catch-all error for malformed payloads

mod common;

use crop_recommender::error::AppError;
use crop_recommender::ml::PredictionService;
use crop_recommender::models::{SoilSample, FEATURE_KEYS};
use serde_json::{json, Value};

fn service() -> PredictionService {
    PredictionService::new(common::trained_bundle())
}

#[test]
fn test_predicts_expected_crop_for_each_profile() {
    let service = service();

    for profile in 0..common::N_PROFILES {
        let prediction = service
            .predict_payload(&common::payload_for(profile))
            .unwrap();
        assert_eq!(prediction.crop, common::crop_for(profile));
        assert_eq!(prediction.votes.len(), 4);
    }
}

#[test]
fn test_prediction_is_stable() {
    let service = service();
    let payload = common::payload_for(1);

    let first = service.predict_payload(&payload).unwrap();
    for _ in 0..5 {
        let again = service.predict_payload(&payload).unwrap();
        assert_eq!(again.crop, first.crop);
        assert_eq!(again.class_code, first.class_code);
    }
}

#[test]
fn test_every_missing_key_is_reported() {
    let service = service();

    for key in FEATURE_KEYS {
        let mut payload = common::payload_for(0);
        payload.as_object_mut().unwrap().remove(key);

        let err = service.predict_payload(&payload).unwrap_err();
        assert!(matches!(err, AppError::MissingField(_)));
        assert_eq!(err.to_string(), format!("Missing key: {}", key));
    }
}

#[test]
fn test_first_missing_key_wins() {
    let service = service();
    let err = service.predict_payload(&json!({})).unwrap_err();
    assert_eq!(err.to_string(), "Missing key: Soil Type");
}

#[test]
fn test_unseen_soil_type_rejected() {
    let service = service();
    let mut payload = common::payload_for(0);
    payload["Soil Type"] = json!("Laterite soil");

    let err = service.predict_payload(&payload).unwrap_err();
    assert_eq!(
        err.to_string(),
        "Unseen Soil Type: Laterite soil. Please provide a valid Soil Type."
    );
}

#[test]
fn test_soil_type_is_case_sensitive() {
    let service = service();
    let mut payload = common::payload_for(0);
    payload["Soil Type"] = json!("black soil");

    let err = service.predict_payload(&payload).unwrap_err();
    assert!(matches!(err, AppError::UnseenCategory { .. }));
}

#[test]
fn test_non_string_soil_type_is_unseen() {
    let service = service();
    let mut payload = common::payload_for(0);
    payload["Soil Type"] = json!(3);

    let err = service.predict_payload(&payload).unwrap_err();
    assert!(matches!(err, AppError::UnseenCategory { .. }));
}

#[test]
fn test_non_numeric_value_collapses_to_prediction_error() {
    let service = service();
    let mut payload = common::payload_for(0);
    payload["pH"] = json!("seven");

    let err = service.predict_payload(&payload).unwrap_err();
    assert_eq!(err.error_code(), "PREDICTION_ERROR");
}

#[test]
fn test_non_object_body_collapses_to_prediction_error() {
    let service = service();

    for body in [json!([1, 2, 3]), json!("Black soil"), Value::Null] {
        let err = service.predict_payload(&body).unwrap_err();
        assert_eq!(err.error_code(), "PREDICTION_ERROR");
    }
}

#[test]
fn test_extra_keys_are_ignored() {
    let service = service();
    let mut payload = common::payload_for(2);
    payload["Farmer"] = json!("unused");

    let prediction = service.predict_payload(&payload).unwrap();
    assert_eq!(prediction.crop, common::crop_for(2));
}

#[test]
fn test_typed_sample_matches_payload() {
    let service = service();
    let payload = common::payload_for(0);
    let sample: SoilSample = serde_json::from_value(payload.clone()).unwrap();

    let from_payload = service.predict_payload(&payload).unwrap();
    let from_sample = service.predict_sample(&sample).unwrap();
    assert_eq!(from_payload.crop, from_sample.crop);
}

#[test]
fn test_service_exposes_encoder_classes() {
    let service = service();

    assert_eq!(
        service.soil_types(),
        &["Alluvial soil", "Black soil", "Red soil"]
    );
    assert_eq!(service.crops(), &["Cotton", "Groundnut", "Rice"]);

    let stats = service.stats();
    assert_eq!(stats.n_crops, 3);
    assert_eq!(stats.voters, vec!["mlp", "gnb", "knn", "log_reg"]);
}
