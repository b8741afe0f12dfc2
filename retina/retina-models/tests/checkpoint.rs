//! Checkpoint persistence tests for the grading model.
//!
//! These run the full model on a compact backbone so weights stay small.

#![allow(clippy::unwrap_used)]
#![allow(clippy::expect_used)]

use approx::assert_relative_eq;
use burn::tensor::{Distribution, Tensor};
use retina_models::prelude::*;

fn config() -> EfficientNetGatConfig {
    EfficientNetGatConfig::default()
        .with_backbone(BackboneConfig::compact())
        .with_gat_hidden_dim(16)
}

fn model() -> EfficientNetGat<CpuBackend> {
    EfficientNetGat::new(&config(), &Default::default()).unwrap()
}

fn logits(model: &EfficientNetGat<CpuBackend>, images: &Tensor<CpuBackend, 4>) -> Vec<f32> {
    model.forward(images.clone()).into_data().to_vec().unwrap()
}

fn images() -> Tensor<CpuBackend, 4> {
    Tensor::random([2, 3, 32, 32], Distribution::Normal(0.0, 1.0), &Default::default())
}

fn assert_same(a: &[f32], b: &[f32]) {
    assert_eq!(a.len(), b.len());
    for (x, y) in a.iter().zip(b) {
        assert_relative_eq!(x, y, epsilon = 1e-6);
    }
}

#[test]
fn binary_round_trip_preserves_outputs() {
    let dir = tempfile::tempdir().unwrap();
    let images = images();
    let original = model();
    let expected = logits(&original, &images);

    let path = save_checkpoint(&original, dir.path().join("weights"), CheckpointFormat::Binary)
        .unwrap();
    assert_eq!(path.extension().and_then(|e| e.to_str()), Some("bin"));
    assert!(path.exists());

    let fresh = model();
    assert_ne!(logits(&fresh, &images), expected);

    let restored = load_checkpoint(fresh, &path, &[], &Default::default()).unwrap();
    assert_same(&logits(&restored, &images), &expected);
}

#[test]
fn json_round_trip_preserves_outputs() {
    let dir = tempfile::tempdir().unwrap();
    let images = images();
    let original = model();
    let expected = logits(&original, &images);

    let path = save_checkpoint(&original, dir.path().join("weights.json"), CheckpointFormat::Json)
        .unwrap();
    let restored = load_checkpoint(model(), &path, &[], &Default::default()).unwrap();

    assert_same(&logits(&restored, &images), &expected);
}

#[test]
fn restored_model_keeps_grid() {
    let dir = tempfile::tempdir().unwrap();
    let path = save_checkpoint(&model(), dir.path().join("w"), CheckpointFormat::Binary).unwrap();
    let restored = load_checkpoint(model(), &path, &[], &Default::default()).unwrap();

    assert_eq!(restored.graph().edge_count(), 312);
}

#[test]
fn missing_weights_is_an_error() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("best_model.pth");

    let err = load_checkpoint(model(), &path, &config().pytorch_key_remaps(), &Default::default())
        .unwrap_err();

    assert!(matches!(err, ModelError::CheckpointNotFound(_)));
    assert!(err.to_string().contains("best_model.pth"));
}

#[test]
fn unknown_extension_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("model.onnx");
    std::fs::write(&path, b"onnx").unwrap();

    let err = load_checkpoint(model(), &path, &[], &Default::default()).unwrap_err();
    assert!(matches!(err, ModelError::UnsupportedFormat(_)));
}

#[test]
fn corrupt_json_is_a_load_error() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("model.json");
    std::fs::write(&path, "not a record").unwrap();

    let err = load_checkpoint(model(), &path, &[], &Default::default()).unwrap_err();
    assert!(matches!(err, ModelError::LoadCheckpoint { .. }));
}

#[test]
fn pytorch_checkpoints_cannot_be_written() {
    let dir = tempfile::tempdir().unwrap();
    let err = save_checkpoint(&model(), dir.path().join("out"), CheckpointFormat::PyTorch)
        .unwrap_err();

    assert!(matches!(err, ModelError::UnsupportedFormat(_)));
    assert!(!dir.path().join("out.pth").exists());
}

/// State dict written by `tests/fixtures/write_compact_pth.py` with
/// torchvision and `PyTorch` Geometric key names.
fn compact_state_dict() -> std::path::PathBuf {
    std::path::Path::new(env!("CARGO_MANIFEST_DIR")).join("tests/fixtures/compact_state_dict.pth")
}

fn silu(x: f32) -> f32 {
    x / (1.0 + (-x).exp())
}

#[test]
fn pytorch_state_dict_loads_through_key_remaps() {
    let config = config();
    let device = Default::default();
    let model = load_checkpoint(
        model(),
        compact_state_dict(),
        &config.pytorch_key_remaps(),
        &device,
    )
    .unwrap();

    // The head batch norm has zero gamma, so the embedding is silu(beta)
    // and `transform` shifts it by one position.
    let nodes: Vec<f32> = model.node_features(images()).into_data().to_vec().unwrap();
    assert_eq!(nodes.len(), 2 * 98);
    for (i, got) in nodes.iter().enumerate() {
        let channel = (i % 98 + 1) % 98;
        let beta = 0.02 * channel as f32 - 1.0;
        assert_relative_eq!(*got, silu(beta), epsilon = 1e-5);
    }

    // `fc` has zero weight: logits are its bias for every image.
    let rows = logits(&model, &images());
    let expected = [0.5, -1.0, 2.0, 0.25, -0.75];
    assert_eq!(rows.len(), 2 * 5);
    for row in rows.chunks(5) {
        assert_same(row, &expected);
    }
}

#[test]
fn pytorch_state_dict_survives_burn_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    let config = config();
    let device = Default::default();
    let imported =
        load_checkpoint(model(), compact_state_dict(), &config.pytorch_key_remaps(), &device)
            .unwrap();

    let path = save_checkpoint(&imported, dir.path().join("imported"), CheckpointFormat::Binary)
        .unwrap();
    let restored = load_checkpoint(model(), &path, &[], &device).unwrap();

    let images = images();
    assert_same(&logits(&restored, &images), &logits(&imported, &images));
}
