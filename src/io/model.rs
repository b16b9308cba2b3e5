//! Model structure for serialization

use crate::{Error, Result, Tensor};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Model metadata recorded alongside the parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelMetadata {
    /// Model name/identifier
    pub name: String,

    /// Model architecture type (e.g., "cnn", "linear")
    pub architecture: String,

    /// Crate version that produced the snapshot
    pub version: String,

    /// Creation timestamp (RFC 3339)
    pub created: String,

    /// Custom metadata fields
    pub custom: HashMap<String, serde_json::Value>,
}

impl ModelMetadata {
    /// Create new metadata with minimal fields
    pub fn new(name: impl Into<String>, architecture: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            architecture: architecture.into(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            created: Utc::now().to_rfc3339(),
            custom: HashMap::new(),
        }
    }

    /// Add custom metadata field
    pub fn with_custom(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.custom.insert(key.into(), value);
        self
    }
}

/// A named, shaped parameter tensor
///
/// Tensors store their data flat; the shape records the logical
/// dimensions so formats that carry shapes can round-trip them.
#[derive(Debug, Clone)]
pub struct ModelParameter {
    /// Parameter name (e.g., "conv1.weight")
    pub name: String,

    /// Logical shape
    pub shape: Vec<usize>,

    /// Flat parameter data
    pub tensor: Tensor,
}

impl ModelParameter {
    /// Create a named parameter
    pub fn new(name: impl Into<String>, shape: Vec<usize>, tensor: Tensor) -> Self {
        Self {
            name: name.into(),
            shape,
            tensor,
        }
    }
}

/// Information about a model parameter
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParameterInfo {
    /// Parameter name (e.g., "conv1.weight")
    pub name: String,

    /// Parameter shape
    pub shape: Vec<usize>,

    /// Data type (e.g., "f32")
    pub dtype: String,

    /// Whether this parameter requires gradients
    pub requires_grad: bool,
}

/// Serializable model state
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelState {
    /// Model metadata
    pub metadata: ModelMetadata,

    /// Parameter information
    pub parameters: Vec<ParameterInfo>,

    /// Flattened parameter data
    pub data: Vec<f32>,
}

/// High-level model abstraction for I/O
pub struct Model {
    /// Model metadata
    pub metadata: ModelMetadata,

    /// Model parameters
    pub parameters: Vec<ModelParameter>,
}

impl Model {
    /// Create a new model
    pub fn new(metadata: ModelMetadata, parameters: Vec<ModelParameter>) -> Self {
        Self {
            metadata,
            parameters,
        }
    }

    /// Get parameter by name
    ///
    /// Snapshots written from a replicated model may carry a "module."
    /// prefix on every name; lookups accept both spellings.
    pub fn get_parameter(&self, name: &str) -> Option<&ModelParameter> {
        self.parameters
            .iter()
            .find(|p| p.name == name || p.name.strip_prefix("module.") == Some(name))
    }

    /// Get mutable parameter by name
    pub fn get_parameter_mut(&mut self, name: &str) -> Option<&mut ModelParameter> {
        self.parameters
            .iter_mut()
            .find(|p| p.name == name || p.name.strip_prefix("module.") == Some(name))
    }

    /// Convert model to serializable state
    pub fn to_state(&self) -> ModelState {
        let mut data = Vec::new();
        let parameters: Vec<ParameterInfo> = self
            .parameters
            .iter()
            .map(|param| {
                data.extend(param.tensor.data().iter().copied());

                ParameterInfo {
                    name: param.name.clone(),
                    shape: param.shape.clone(),
                    dtype: "f32".to_string(),
                    requires_grad: param.tensor.requires_grad(),
                }
            })
            .collect();

        ModelState {
            metadata: self.metadata.clone(),
            parameters,
            data,
        }
    }

    /// Create model from serializable state
    ///
    /// Fails when a parameter's declared shape does not account for the
    /// flattened data, or the dtype is unsupported.
    pub fn from_state(state: ModelState) -> Result<Self> {
        let mut data_offset = 0;
        let mut parameters = Vec::with_capacity(state.parameters.len());
        for param_info in state.parameters {
            if param_info.dtype != "f32" {
                return Err(Error::Serialization(format!(
                    "unsupported dtype '{}' for parameter '{}'",
                    param_info.dtype, param_info.name
                )));
            }

            let size: usize = param_info.shape.iter().product();
            if data_offset + size > state.data.len() {
                return Err(Error::Serialization(format!(
                    "parameter '{}' declares {} values but only {} remain",
                    param_info.name,
                    size,
                    state.data.len() - data_offset
                )));
            }
            let param_data = state.data[data_offset..data_offset + size].to_vec();
            data_offset += size;

            let tensor = Tensor::from_vec(param_data, param_info.requires_grad);
            parameters.push(ModelParameter::new(param_info.name, param_info.shape, tensor));
        }

        if data_offset != state.data.len() {
            return Err(Error::Serialization(format!(
                "{} trailing values not claimed by any parameter",
                state.data.len() - data_offset
            )));
        }

        Ok(Self {
            metadata: state.metadata,
            parameters,
        })
    }
}
