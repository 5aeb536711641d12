//! Compiled-model descriptor and the parameter transform calls that hang off it.

use crate::client::HttpstanClient;
use crate::error::{Result, StanError};
use crate::types::ParamInfo;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};
use std::collections::HashSet;

/// Digest bytes kept in a model name. 80 bits keeps collisions out of reach for a local cache.
const MODEL_NAME_DIGEST_BYTES: usize = 10;

/// Resource name for a program, e.g. `models/3f1c0a...`.
///
/// Depends on the program text alone, so identical source always maps to the same cache key.
pub fn calculate_model_name(program_code: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(program_code.as_bytes());
    let hash = hasher.finalize();
    let id = hash[..MODEL_NAME_DIGEST_BYTES]
        .iter()
        .map(|byte| format!("{byte:02x}"))
        .collect::<String>();
    format!("models/{id}")
}

/// Seeds are positive; zero is rejected before any request is made.
pub(crate) fn validate_seed(random_seed: Option<u32>) -> Result<()> {
    if random_seed == Some(0) {
        return Err(StanError::Precondition(
            "`random_seed` must be a positive integer".to_string(),
        ));
    }
    Ok(())
}

/// Parameter names and shapes reported by the service.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParameterMetadata {
    pub param_names: Vec<String>,
    /// Names flattened across array and matrix dimensions.
    pub constrained_param_names: Vec<String>,
    /// One shape per entry of `param_names`.
    pub dims: Vec<Vec<usize>>,
}

impl ParameterMetadata {
    /// Collect metadata from the params endpoint, rejecting duplicate names.
    pub fn from_params(params: &[ParamInfo]) -> Result<Self> {
        let mut seen = HashSet::new();
        let mut metadata = Self::default();
        for param in params {
            if !seen.insert(param.name.as_str()) {
                return Err(StanError::Parameter(format!(
                    "duplicate parameter name `{}`",
                    param.name
                )));
            }
            metadata.param_names.push(param.name.clone());
            metadata.dims.push(param.dims.clone());
            metadata
                .constrained_param_names
                .extend(param.constrained_names.iter().cloned());
        }
        Ok(metadata)
    }
}

/// A compiled program bound to a data set and an optional seed.
///
/// Returned by [`crate::build()`]; immutable once constructed.
#[derive(Debug, Clone, PartialEq)]
pub struct Model {
    model_name: String,
    program_code: String,
    data: Map<String, Value>,
    params: ParameterMetadata,
    random_seed: Option<u32>,
}

impl Model {
    /// Assemble a descriptor. `model_name` must be the name computed from `program_code`.
    pub fn new(
        model_name: impl Into<String>,
        program_code: impl Into<String>,
        data: Map<String, Value>,
        params: ParameterMetadata,
        random_seed: Option<u32>,
    ) -> Result<Self> {
        let model_name = model_name.into();
        let program_code = program_code.into();
        if model_name != calculate_model_name(&program_code) {
            return Err(StanError::Precondition(
                "`model_name` does not match `program_code`".to_string(),
            ));
        }
        validate_seed(random_seed)?;
        Ok(Self {
            model_name,
            program_code,
            data,
            params,
            random_seed,
        })
    }

    pub fn model_name(&self) -> &str {
        &self.model_name
    }

    pub fn program_code(&self) -> &str {
        &self.program_code
    }

    pub fn data(&self) -> &Map<String, Value> {
        &self.data
    }

    pub fn params(&self) -> &ParameterMetadata {
        &self.params
    }

    pub fn param_names(&self) -> &[String] {
        &self.params.param_names
    }

    pub fn constrained_param_names(&self) -> &[String] {
        &self.params.constrained_param_names
    }

    pub fn dims(&self) -> &[Vec<usize>] {
        &self.params.dims
    }

    pub fn random_seed(&self) -> Option<u32> {
        self.random_seed
    }

    /// Transform unconstrained parameters to their declared support, optionally
    /// appending transformed parameters and generated quantities.
    pub async fn constrain_pars(
        &self,
        client: &HttpstanClient,
        unconstrained_parameters: &[f64],
        include_tparams: bool,
        include_gqs: bool,
    ) -> Result<Vec<f64>> {
        client
            .write_array(
                &self.model_name,
                &self.data,
                unconstrained_parameters,
                include_tparams,
                include_gqs,
            )
            .await
    }

    /// Transform constrained parameter values, keyed by parameter name, to the unconstrained space.
    pub async fn unconstrain_pars(
        &self,
        client: &HttpstanClient,
        constrained_parameters: &Map<String, Value>,
    ) -> Result<Vec<f64>> {
        client
            .transform_inits(&self.model_name, &self.data, constrained_parameters)
            .await
    }

    /// Log density at the given unconstrained parameters.
    pub async fn log_prob(
        &self,
        client: &HttpstanClient,
        unconstrained_parameters: &[f64],
        adjust_transform: bool,
    ) -> Result<f64> {
        client
            .log_prob(
                &self.model_name,
                &self.data,
                unconstrained_parameters,
                adjust_transform,
            )
            .await
    }

    /// Gradient of the log density at the given unconstrained parameters.
    pub async fn grad_log_prob(
        &self,
        client: &HttpstanClient,
        unconstrained_parameters: &[f64],
    ) -> Result<Vec<f64>> {
        client
            .log_prob_grad(&self.model_name, &self.data, unconstrained_parameters)
            .await
    }
}
