//! Save/load tests across all formats

use super::*;
use crate::Tensor;
use tempfile::TempDir;

fn two_layer_model() -> Model {
    let meta = ModelMetadata::new("classifier", "mlp-classifier")
        .with_custom("layer_sizes", serde_json::json!([3, 2, 1]));
    let params = vec![
        Parameter::new(
            "layers.0.weight",
            vec![3, 2],
            Tensor::from_vec(vec![0.1, -0.2, 0.3, -0.4, 0.5, -0.6], true),
        )
        .unwrap(),
        Parameter::new("layers.0.bias", vec![2], Tensor::from_vec(vec![0.0, 1.0], true)).unwrap(),
        Parameter::new("layers.1.weight", vec![2, 1], Tensor::from_vec(vec![2.0, -3.0], true))
            .unwrap(),
        Parameter::new("layers.1.bias", vec![1], Tensor::from_vec(vec![0.25], true)).unwrap(),
    ];
    Model::new(meta, params)
}

fn assert_same(original: &Model, loaded: &Model) {
    assert_eq!(original.metadata, loaded.metadata);
    assert_eq!(original.parameters.len(), loaded.parameters.len());
    for (a, b) in original.parameters.iter().zip(&loaded.parameters) {
        assert_eq!(a.name, b.name);
        assert_eq!(a.shape, b.shape);
        assert_eq!(a.tensor.data(), b.tensor.data());
    }
}

#[test]
fn test_round_trip_every_format() {
    let dir = TempDir::new().unwrap();
    let model = two_layer_model();

    for format in [ModelFormat::Json, ModelFormat::Yaml, ModelFormat::SafeTensors] {
        let path = dir.path().join(format!("model.{}", format.extension()));
        save_model(&model, &path, &SaveConfig::new(format)).unwrap();
        let loaded = load_model(&path).unwrap();
        assert_same(&model, &loaded);
    }
}

#[test]
fn test_compact_json_is_single_line() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("model.json");
    save_model(&two_layer_model(), &path, &SaveConfig::default().with_pretty(false)).unwrap();

    let content = std::fs::read_to_string(&path).unwrap();
    assert_eq!(content.lines().count(), 1);
    assert!(content.contains("mlp-classifier"));
}

#[test]
fn test_safetensors_keeps_matrix_shape() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("model.safetensors");
    save_model(&two_layer_model(), &path, &SaveConfig::new(ModelFormat::SafeTensors)).unwrap();

    let bytes = std::fs::read(&path).unwrap();
    let tensors = safetensors::SafeTensors::deserialize(&bytes).unwrap();
    assert_eq!(tensors.tensor("layers.0.weight").unwrap().shape(), &[3, 2]);
}

#[test]
fn test_unknown_extension_is_rejected() {
    let dir = TempDir::new().unwrap();
    assert!(matches!(
        load_model(dir.path().join("model.bin")),
        Err(crate::Error::Serialization(_))
    ));
    assert!(load_model(dir.path().join("model")).is_err());
}

#[test]
fn test_missing_file_is_io_error() {
    let dir = TempDir::new().unwrap();
    assert!(matches!(
        load_model(dir.path().join("absent.json")),
        Err(crate::Error::Io(_))
    ));
}
