//! Tensor datatypes, schemas, and wire payloads
//!
//! Schemas describe what a model declares in its `config.json`; tensors are
//! the payloads callers send and backends return. Validation of one against
//! the other lives in the registry.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Tensor element type
///
/// Wire names follow the KServe v2 datatype convention (`FP32`, `INT64`, ...).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DType {
    #[serde(rename = "FP16")]
    Fp16,
    #[serde(rename = "FP32")]
    Fp32,
    #[serde(rename = "FP64")]
    Fp64,
    #[serde(rename = "INT32")]
    Int32,
    #[serde(rename = "INT64")]
    Int64,
    #[serde(rename = "UINT8")]
    Uint8,
    #[serde(rename = "BOOL")]
    Bool,
    #[serde(rename = "BYTES")]
    Bytes,
}

impl DType {
    /// Wire name of this datatype
    pub fn wire_name(&self) -> &'static str {
        match self {
            DType::Fp16 => "FP16",
            DType::Fp32 => "FP32",
            DType::Fp64 => "FP64",
            DType::Int32 => "INT32",
            DType::Int64 => "INT64",
            DType::Uint8 => "UINT8",
            DType::Bool => "BOOL",
            DType::Bytes => "BYTES",
        }
    }

    /// Whether this datatype holds numbers (integer or floating point)
    pub fn is_numeric(&self) -> bool {
        !matches!(self, DType::Bool | DType::Bytes)
    }

    /// Whether this datatype is a floating point type
    pub fn is_float(&self) -> bool {
        matches!(self, DType::Fp16 | DType::Fp32 | DType::Fp64)
    }
}

impl std::fmt::Display for DType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.wire_name())
    }
}

/// Declared shape and datatype of a model input or output
///
/// `dims` uses `-1` for dynamic dimensions. The leading batch dimension is
/// implicit; per-request shapes never include it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TensorSchema {
    pub name: String,
    #[serde(rename = "datatype")]
    pub dtype: DType,
    pub dims: Vec<i64>,
}

impl TensorSchema {
    pub fn new(name: impl Into<String>, dtype: DType, dims: Vec<i64>) -> Self {
        TensorSchema {
            name: name.into(),
            dtype,
            dims,
        }
    }

    /// Check a concrete shape against the declared dims
    ///
    /// Rank must match; a declared `-1` admits any positive extent.
    pub fn shape_matches(&self, shape: &[i64]) -> bool {
        if shape.len() != self.dims.len() {
            return false;
        }
        self.dims
            .iter()
            .zip(shape.iter())
            .all(|(&decl, &got)| got > 0 && (decl == -1 || decl == got))
    }
}

/// Flat tensor payload
///
/// The order of the untagged variants matters: booleans never parse as
/// numbers, integral literals parse as `Int64` before `Fp64`, and strings
/// fall through to `Bytes`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TensorData {
    Bool(Vec<bool>),
    Int64(Vec<i64>),
    Fp64(Vec<f64>),
    Bytes(Vec<String>),
}

impl TensorData {
    /// Number of elements in the payload
    pub fn len(&self) -> usize {
        match self {
            TensorData::Bool(v) => v.len(),
            TensorData::Int64(v) => v.len(),
            TensorData::Fp64(v) => v.len(),
            TensorData::Bytes(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Whether this payload can carry values of the given datatype
    ///
    /// Integral JSON literals are accepted for float datatypes; fractional
    /// literals are not accepted for integer datatypes.
    pub fn matches(&self, dtype: DType) -> bool {
        match self {
            TensorData::Bool(_) => dtype == DType::Bool,
            TensorData::Int64(_) => dtype.is_numeric(),
            TensorData::Fp64(_) => dtype.is_float(),
            TensorData::Bytes(_) => dtype == DType::Bytes,
        }
    }
}

/// A named tensor as carried on the wire and through the scheduler
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tensor {
    pub name: String,
    #[serde(rename = "datatype")]
    pub dtype: DType,
    pub shape: Vec<i64>,
    pub data: TensorData,
}

impl Tensor {
    pub fn new(
        name: impl Into<String>,
        dtype: DType,
        shape: Vec<i64>,
        data: TensorData,
    ) -> Self {
        Tensor {
            name: name.into(),
            dtype,
            shape,
            data,
        }
    }

    /// Number of elements implied by the shape
    pub fn element_count(&self) -> usize {
        self.shape
            .iter()
            .map(|&d| if d > 0 { d as usize } else { 0 })
            .product()
    }
}

/// Validation failure for a single tensor against its schema
#[derive(Debug, Error)]
pub enum SchemaError {
    #[error("tensor {name}: expected datatype {expected}, got {actual}")]
    Dtype {
        name: String,
        expected: DType,
        actual: DType,
    },
    #[error("tensor {name}: shape {shape:?} does not match declared dims {dims:?}")]
    Shape {
        name: String,
        dims: Vec<i64>,
        shape: Vec<i64>,
    },
    #[error("tensor {name}: shape implies {expected} elements, payload has {actual}")]
    ElementCount {
        name: String,
        expected: usize,
        actual: usize,
    },
    #[error("tensor {name}: payload type is not valid for datatype {dtype}")]
    PayloadType { name: String, dtype: DType },
}

/// Validate a tensor against its declared schema
///
/// Checks datatype, rank/dims (with dynamic `-1` dims), payload type, and
/// element count. Never inspects tensor values.
pub fn validate_tensor(schema: &TensorSchema, tensor: &Tensor) -> Result<(), SchemaError> {
    if tensor.dtype != schema.dtype {
        return Err(SchemaError::Dtype {
            name: tensor.name.clone(),
            expected: schema.dtype,
            actual: tensor.dtype,
        });
    }

    if !schema.shape_matches(&tensor.shape) {
        return Err(SchemaError::Shape {
            name: tensor.name.clone(),
            dims: schema.dims.clone(),
            shape: tensor.shape.clone(),
        });
    }

    if !tensor.data.matches(tensor.dtype) {
        return Err(SchemaError::PayloadType {
            name: tensor.name.clone(),
            dtype: tensor.dtype,
        });
    }

    let expected = tensor.element_count();
    let actual = tensor.data.len();
    if expected != actual {
        return Err(SchemaError::ElementCount {
            name: tensor.name.clone(),
            expected,
            actual,
        });
    }

    Ok(())
}
