//! Request and response types for the httpstan API.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

// ---------- Models ----------

/// Request body for `POST /models`.
#[derive(Debug, Clone, Serialize)]
pub struct CreateModelRequest<'a> {
    pub program_code: &'a str,
}

/// Response from `POST /models`.
#[derive(Debug, Clone, Deserialize)]
pub struct CreateModelResponse {
    pub name: String,
    /// Non-fatal compiler output.
    #[serde(default)]
    pub stanc_warnings: Option<String>,
}

/// Request body for `POST /{model}/params`.
#[derive(Debug, Clone, Serialize)]
pub struct ParamsRequest<'a> {
    pub data: &'a Map<String, Value>,
}

/// Response from `POST /{model}/params`.
#[derive(Debug, Clone, Deserialize)]
pub struct ParamsResponse {
    pub params: Vec<ParamInfo>,
}

/// Metadata for one model parameter.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct ParamInfo {
    pub name: String,
    #[serde(default)]
    pub dims: Vec<usize>,
    /// Flattened element names, e.g. `beta.1`, `beta.2`.
    #[serde(default)]
    pub constrained_names: Vec<String>,
}

// ---------- Operations ----------

/// Server-side handle for a long-running unit of work.
///
/// The client never edits an operation; it only replaces its copy with the
/// latest state fetched from the service.
#[derive(Debug, Clone, Deserialize)]
pub struct Operation {
    pub name: String,
    #[serde(default)]
    pub done: bool,
    #[serde(default)]
    pub metadata: Option<OperationMetadata>,
    #[serde(default)]
    pub result: Option<OperationResult>,
}

impl Operation {
    /// Latest progress string, if the service reported one.
    pub fn progress(&self) -> Option<&str> {
        self.metadata
            .as_ref()
            .and_then(|m| m.progress.as_deref())
            .filter(|p| !p.is_empty())
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct OperationMetadata {
    #[serde(default)]
    pub progress: Option<String>,
    #[serde(default)]
    pub fit: Option<FitRef>,
}

/// Outcome stored in a finished operation: either the fit it produced or a status error.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum OperationResult {
    Fit(FitRef),
    Error(OperationStatus),
}

/// Reference to a fit resource, e.g. `models/abc/fits/xyz`.
#[derive(Debug, Clone, Deserialize)]
pub struct FitRef {
    pub name: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct OperationStatus {
    #[serde(default)]
    pub code: Option<Value>,
    pub message: String,
}

// ---------- Errors ----------

/// Error payload carried by non-success responses.
#[derive(Debug, Clone, Default, Deserialize)]
pub(crate) struct ErrorBody {
    #[serde(default)]
    pub message: Option<String>,
}

// ---------- Parameter transforms ----------

#[derive(Debug, Clone, Serialize)]
pub struct WriteArrayRequest<'a> {
    pub data: &'a Map<String, Value>,
    pub unconstrained_parameters: &'a [f64],
    pub include_tparams: bool,
    pub include_gqs: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WriteArrayResponse {
    pub params_r_constrained: Vec<f64>,
}

#[derive(Debug, Clone, Serialize)]
pub struct TransformInitsRequest<'a> {
    pub data: &'a Map<String, Value>,
    pub constrained_parameters: &'a Map<String, Value>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TransformInitsResponse {
    pub params_r_unconstrained: Vec<f64>,
}

#[derive(Debug, Clone, Serialize)]
pub struct LogProbRequest<'a> {
    pub data: &'a Map<String, Value>,
    pub unconstrained_parameters: &'a [f64],
    pub adjust_transform: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LogProbResponse {
    pub log_prob: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct LogProbGradRequest<'a> {
    pub data: &'a Map<String, Value>,
    pub unconstrained_parameters: &'a [f64],
}

#[derive(Debug, Clone, Deserialize)]
pub struct LogProbGradResponse {
    pub log_prob_grad: Vec<f64>,
}
