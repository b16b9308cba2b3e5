//! Model saving functionality

use super::format::{ModelFormat, SaveConfig};
use super::model::Model;
use crate::{Error, Result};
use safetensors::tensor::{Dtype, TensorView};
use std::collections::HashMap;
use std::fs::File;
use std::io::Write;
use std::path::Path;

/// Save a model to a file
///
/// # Arguments
///
/// * `model` - The model to save
/// * `path` - Output file path
/// * `config` - Save configuration (format, options)
///
/// # Example
///
/// ```no_run
/// use cifra::io::{Model, ModelMetadata, ModelParameter, save_model, SaveConfig, ModelFormat};
/// # use cifra::Tensor;
///
/// let params = vec![
///     ModelParameter::new("weight", vec![2], Tensor::from_vec(vec![1.0, 2.0], true)),
/// ];
/// let model = Model::new(ModelMetadata::new("my-model", "linear"), params);
/// let config = SaveConfig::new(ModelFormat::SafeTensors);
///
/// save_model(&model, "model.safetensors", &config).unwrap();
/// ```
pub fn save_model(model: &Model, path: impl AsRef<Path>, config: &SaveConfig) -> Result<()> {
    let path = path.as_ref();

    match config.format {
        ModelFormat::SafeTensors => {
            // SafeTensors is binary format - handle separately
            save_safetensors(model, path)?;
        }
        ModelFormat::Json => {
            let state = model.to_state();
            let data = if config.pretty {
                serde_json::to_string_pretty(&state)
                    .map_err(|e| Error::Serialization(format!("JSON serialization failed: {e}")))?
            } else {
                serde_json::to_string(&state)
                    .map_err(|e| Error::Serialization(format!("JSON serialization failed: {e}")))?
            };
            let mut file = File::create(path)?;
            file.write_all(data.as_bytes())?;
        }
        ModelFormat::Yaml => {
            let state = model.to_state();
            let data = serde_yaml::to_string(&state)
                .map_err(|e| Error::Serialization(format!("YAML serialization failed: {e}")))?;
            let mut file = File::create(path)?;
            file.write_all(data.as_bytes())?;
        }
    }

    Ok(())
}

/// Save model in SafeTensors format (HuggingFace compatible)
fn save_safetensors(model: &Model, path: &Path) -> Result<()> {
    // Collect tensor data with proper lifetime management
    let tensor_data: Vec<(String, Vec<u8>, Vec<usize>)> = model
        .parameters
        .iter()
        .map(|param| {
            let floats = param.tensor.data().to_vec();
            let bytes: Vec<u8> = bytemuck::cast_slice(&floats).to_vec();
            (param.name.clone(), bytes, param.shape.clone())
        })
        .collect();

    // Create TensorViews from collected data
    let mut views: Vec<(&str, TensorView<'_>)> = Vec::with_capacity(tensor_data.len());
    for (name, bytes, shape) in &tensor_data {
        let view = TensorView::new(Dtype::F32, shape.clone(), bytes).map_err(|e| {
            Error::Serialization(format!("invalid tensor '{name}' ({shape:?}): {e:?}"))
        })?;
        views.push((name.as_str(), view));
    }

    // Create metadata with model info
    let mut metadata = HashMap::new();
    metadata.insert("name".to_string(), model.metadata.name.clone());
    metadata.insert(
        "architecture".to_string(),
        model.metadata.architecture.clone(),
    );
    metadata.insert("version".to_string(), model.metadata.version.clone());
    metadata.insert("created".to_string(), model.metadata.created.clone());

    // Serialize to SafeTensors format
    let safetensor_bytes = safetensors::serialize(views, &Some(metadata))
        .map_err(|e| Error::Serialization(format!("SafeTensors serialization failed: {e}")))?;

    std::fs::write(path, safetensor_bytes)?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::{Model, ModelMetadata, ModelParameter};
    use crate::Tensor;
    use tempfile::NamedTempFile;

    fn linear_model(name: &str) -> Model {
        let params = vec![
            ModelParameter::new(
                "weight",
                vec![3, 2],
                Tensor::from_vec(vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0], true),
            ),
            ModelParameter::new("bias", vec![2], Tensor::from_vec(vec![0.1, 0.2], false)),
        ];
        Model::new(ModelMetadata::new(name, "linear"), params)
    }

    #[test]
    fn test_save_model_json() {
        let model = linear_model("test-model");
        let config = SaveConfig::new(ModelFormat::Json);

        let temp_file = NamedTempFile::new().unwrap();
        save_model(&model, temp_file.path(), &config).unwrap();

        let content = std::fs::read_to_string(temp_file.path()).unwrap();
        assert!(!content.is_empty());
        assert!(content.contains("test-model"));
        assert!(content.contains("linear"));
    }

    #[test]
    fn test_save_model_yaml() {
        let model = linear_model("yaml-model");
        let config = SaveConfig::new(ModelFormat::Yaml);

        let temp_file = NamedTempFile::new().unwrap();
        save_model(&model, temp_file.path(), &config).unwrap();

        let content = std::fs::read_to_string(temp_file.path()).unwrap();
        assert!(content.contains("yaml-model"));
        assert!(content.contains("linear"));
    }

    #[test]
    fn test_save_model_json_pretty_vs_compact() {
        let model = linear_model("pretty");

        let pretty_file = NamedTempFile::new().unwrap();
        save_model(
            &model,
            pretty_file.path(),
            &SaveConfig::new(ModelFormat::Json).with_pretty(true),
        )
        .unwrap();
        let pretty = std::fs::read_to_string(pretty_file.path()).unwrap();
        assert!(pretty.contains('\n'));

        let compact_file = NamedTempFile::new().unwrap();
        save_model(
            &model,
            compact_file.path(),
            &SaveConfig::new(ModelFormat::Json).with_pretty(false),
        )
        .unwrap();
        let compact = std::fs::read_to_string(compact_file.path()).unwrap();
        assert_eq!(compact.lines().count(), 1);
    }

    #[test]
    fn test_save_model_empty_params() {
        let model = Model::new(ModelMetadata::new("empty", "test"), vec![]);
        let config = SaveConfig::new(ModelFormat::Json);

        let temp_file = NamedTempFile::new().unwrap();
        save_model(&model, temp_file.path(), &config).unwrap();

        let content = std::fs::read_to_string(temp_file.path()).unwrap();
        assert!(content.contains("empty"));
    }

    #[test]
    fn test_save_model_invalid_path() {
        let model = linear_model("test");
        let config = SaveConfig::new(ModelFormat::Json);

        let result = save_model(&model, "/nonexistent/directory/model.json", &config);
        assert!(result.is_err());
    }

    #[test]
    fn test_save_model_safetensors_preserves_shape() {
        let model = linear_model("safetensor-test");
        let config = SaveConfig::new(ModelFormat::SafeTensors);

        let temp_file = NamedTempFile::new().unwrap();
        save_model(&model, temp_file.path(), &config).unwrap();

        let data = std::fs::read(temp_file.path()).unwrap();
        let loaded = safetensors::SafeTensors::deserialize(&data).unwrap();

        let names = loaded.names();
        assert!(names.contains(&&"weight".to_string()));
        assert!(names.contains(&&"bias".to_string()));

        let weight = loaded.tensor("weight").unwrap();
        assert_eq!(weight.shape(), &[3, 2]);
        let weight_data: &[f32] = bytemuck::cast_slice(weight.data());
        assert_eq!(weight_data, &[1.0, 2.0, 3.0, 4.0, 5.0, 6.0]);
    }

    #[test]
    fn test_save_safetensors_metadata() {
        let model = linear_model("meta-model");
        let config = SaveConfig::new(ModelFormat::SafeTensors);

        let temp_file = NamedTempFile::new().unwrap();
        save_model(&model, temp_file.path(), &config).unwrap();

        let data = std::fs::read(temp_file.path()).unwrap();
        let (_, st_metadata) = safetensors::SafeTensors::read_metadata(&data).unwrap();

        let metadata = st_metadata.metadata();
        assert!(metadata.is_some());
        let meta = metadata.as_ref().unwrap();
        assert_eq!(meta.get("name").unwrap(), "meta-model");
        assert_eq!(meta.get("architecture").unwrap(), "linear");
        assert!(meta.contains_key("created"));
    }

    #[test]
    fn test_save_safetensors_rejects_bad_shape() {
        // Shape claims 4 values; tensor holds 2
        let params = vec![ModelParameter::new(
            "w",
            vec![2, 2],
            Tensor::from_vec(vec![1.0, 2.0], true),
        )];
        let model = Model::new(ModelMetadata::new("bad", "test"), params);
        let config = SaveConfig::new(ModelFormat::SafeTensors);

        let temp_file = NamedTempFile::new().unwrap();
        let result = save_model(&model, temp_file.path(), &config);
        assert!(result.is_err());
    }

    #[test]
    fn test_save_safetensors_invalid_path() {
        let model = linear_model("test");
        let config = SaveConfig::new(ModelFormat::SafeTensors);

        let result = save_model(&model, "/nonexistent/directory/model.safetensors", &config);
        assert!(result.is_err());
    }
}
