//! Model loading functionality

use super::format::ModelFormat;
use super::model::{Model, ModelMetadata, ModelParameter, ModelState};
use crate::{Error, Result, Tensor};
use safetensors::tensor::Dtype;
use std::fs::File;
use std::io::Read;
use std::path::Path;

/// Load a model from a file
///
/// # Arguments
///
/// * `path` - Input file path
///
/// The format is automatically detected from the file extension.
///
/// # Example
///
/// ```no_run
/// use cifra::io::load_model;
///
/// let model = load_model("model.safetensors").unwrap();
/// println!("Loaded model: {}", model.metadata.name);
/// ```
pub fn load_model(path: impl AsRef<Path>) -> Result<Model> {
    let path = path.as_ref();

    // Detect format from extension
    let ext = path
        .extension()
        .and_then(|s| s.to_str())
        .ok_or_else(|| Error::Serialization("File has no extension".to_string()))?;

    let format = ModelFormat::from_extension(ext)
        .ok_or_else(|| Error::Serialization(format!("Unsupported file extension: {ext}")))?;

    // Handle SafeTensors separately (binary format)
    if format == ModelFormat::SafeTensors {
        return load_safetensors(path);
    }

    // Read file content (text formats)
    let mut file = File::open(path)?;

    let mut content = String::new();
    file.read_to_string(&mut content)?;

    // Deserialize based on format
    let state: ModelState = match format {
        ModelFormat::Json => serde_json::from_str(&content)
            .map_err(|e| Error::Serialization(format!("JSON deserialization failed: {e}")))?,
        ModelFormat::Yaml => serde_yaml::from_str(&content)
            .map_err(|e| Error::Serialization(format!("YAML deserialization failed: {e}")))?,
        ModelFormat::SafeTensors => unreachable!(), // Handled above
    };

    Model::from_state(state)
}

/// Load model from SafeTensors format (HuggingFace compatible)
fn load_safetensors(path: &Path) -> Result<Model> {
    let data =
        std::fs::read(path).map_err(|e| Error::Serialization(format!("Failed to read file: {e}")))?;

    // Parse SafeTensors and get metadata
    let (_, st_metadata) = safetensors::SafeTensors::read_metadata(&data)
        .map_err(|e| Error::Serialization(format!("SafeTensors parsing failed: {e}")))?;

    // Extract custom metadata
    let custom_meta = st_metadata.metadata();
    let name = custom_meta
        .as_ref()
        .and_then(|m| m.get("name").cloned())
        .unwrap_or_else(|| "unknown".to_string());
    let architecture = custom_meta
        .as_ref()
        .and_then(|m| m.get("architecture").cloned())
        .unwrap_or_else(|| "unknown".to_string());

    let mut metadata = ModelMetadata::new(name, architecture);
    if let Some(version) = custom_meta.as_ref().and_then(|m| m.get("version").cloned()) {
        metadata.version = version;
    }
    if let Some(created) = custom_meta.as_ref().and_then(|m| m.get("created").cloned()) {
        metadata.created = created;
    }

    // Deserialize to access tensors
    let safetensors = safetensors::SafeTensors::deserialize(&data)
        .map_err(|e| Error::Serialization(format!("SafeTensors parsing failed: {e}")))?;

    // names() order is unstable; sort for deterministic parameter order
    let mut names = safetensors.names();
    names.sort_unstable();

    let mut parameters = Vec::with_capacity(names.len());
    for name in names {
        let view = safetensors
            .tensor(name)
            .map_err(|e| Error::Serialization(format!("Missing tensor '{name}': {e}")))?;
        if view.dtype() != Dtype::F32 {
            return Err(Error::Serialization(format!(
                "unsupported dtype {:?} for tensor '{name}'",
                view.dtype()
            )));
        }

        let data: &[f32] = bytemuck::cast_slice(view.data());
        let tensor = Tensor::from_vec(data.to_vec(), false); // Default to no grad
        parameters.push(ModelParameter::new(name, view.shape().to_vec(), tensor));
    }

    Ok(Model::new(metadata, parameters))
}
