//! httpstan API client.
//!
//! Provides a type-safe interface to httpstan's REST API for:
//! - Model compilation and parameter metadata
//! - Fit creation, operation polling, fit retrieval and deletion
//! - Parameter transforms and log-density evaluation

use crate::config::ServiceConfig;
use crate::error::{Result, StanError};
use crate::types::{
    CreateModelRequest, CreateModelResponse, ErrorBody, LogProbGradRequest, LogProbGradResponse,
    LogProbRequest, LogProbResponse, Operation, ParamInfo, ParamsRequest, ParamsResponse,
    TransformInitsRequest, TransformInitsResponse, WriteArrayRequest, WriteArrayResponse,
};
use bytes::Bytes;
use reqwest::StatusCode;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use tracing::{debug, error, instrument};

/// httpstan API client.
///
/// Cheap to clone; every orchestrator call takes one explicitly.
#[derive(Clone)]
pub struct HttpstanClient {
    http_client: reqwest::Client,
    config: ServiceConfig,
}

impl HttpstanClient {
    /// Create a new client from configuration.
    pub fn new(config: ServiceConfig) -> Result<Self> {
        let http_client = reqwest::Client::builder().timeout(config.timeout).build()?;

        Ok(Self {
            http_client,
            config,
        })
    }

    /// Get the configuration this client was built from.
    pub fn config(&self) -> &ServiceConfig {
        &self.config
    }

    fn url(&self, path: &str) -> String {
        let base = self.config.base_url.trim_end_matches('/');
        let path = path.trim_start_matches('/');
        format!("{base}/{path}")
    }

    /// Make a POST request with a JSON body and return the raw response.
    #[instrument(skip(self, body), fields(url = %url))]
    async fn post<B: Serialize + ?Sized>(&self, url: &str, body: &B) -> Result<reqwest::Response> {
        debug!("POST {}", url);

        let response = self.http_client.post(url).json(body).send().await?;
        Ok(response)
    }

    /// Make a GET request and return the raw response.
    #[instrument(skip(self), fields(url = %url))]
    async fn get(&self, url: &str) -> Result<reqwest::Response> {
        debug!("GET {}", url);

        let response = self.http_client.get(url).send().await?;
        Ok(response)
    }

    /// Read the message carried by a non-success response.
    ///
    /// Prefers the `message` field of a JSON error body; falls back to the raw text.
    async fn error_message(response: reqwest::Response) -> (u16, String) {
        let status = response.status().as_u16();
        let text = response.text().await.unwrap_or_default();
        let message = serde_json::from_str::<ErrorBody>(&text)
            .ok()
            .and_then(|body| body.message)
            .unwrap_or(text);
        error!("API error ({}): {}", status, message);
        (status, message)
    }

    async fn server_error(response: reqwest::Response) -> StanError {
        let (status, message) = Self::error_message(response).await;
        StanError::Server { status, message }
    }

    /// Decode a JSON body, mapping any non-200 status to a runtime error.
    async fn runtime_json<T: DeserializeOwned>(response: reqwest::Response) -> Result<T> {
        if response.status() != StatusCode::OK {
            let (_, message) = Self::error_message(response).await;
            return Err(StanError::Runtime(message));
        }
        Ok(response.json::<T>().await?)
    }

    // =========================================================================
    // Models
    // =========================================================================

    /// Compile a program. Idempotent on the service side.
    #[instrument(skip(self, program_code))]
    pub async fn create_model(&self, program_code: &str) -> Result<CreateModelResponse> {
        let url = self.url("models");
        let response = self.post(&url, &CreateModelRequest { program_code }).await?;

        if response.status() != StatusCode::CREATED {
            let (_, message) = Self::error_message(response).await;
            return Err(StanError::Compilation(message));
        }
        Ok(response.json().await?)
    }

    /// Probe the parameter endpoint; `false` means the program is not compiled yet.
    ///
    /// Only a 404 counts as a miss. Any other status is a cache signal, not a failure.
    #[instrument(skip(self, data))]
    pub async fn is_compiled(&self, model_name: &str, data: &Map<String, Value>) -> Result<bool> {
        let url = self.url(&format!("{model_name}/params"));
        let response = self.post(&url, &ParamsRequest { data }).await?;
        Ok(response.status() != StatusCode::NOT_FOUND)
    }

    /// Fetch parameter metadata for a compiled program and data set.
    #[instrument(skip(self, data))]
    pub async fn model_params(
        &self,
        model_name: &str,
        data: &Map<String, Value>,
    ) -> Result<Vec<ParamInfo>> {
        let url = self.url(&format!("{model_name}/params"));
        let response = self.post(&url, &ParamsRequest { data }).await?;

        if response.status() != StatusCode::OK {
            return Err(Self::server_error(response).await);
        }
        let body: ParamsResponse = response.json().await?;
        Ok(body.params)
    }

    // =========================================================================
    // Fits and operations
    // =========================================================================

    /// Start one sampling run. Returns the operation tracking it.
    #[instrument(skip(self, payload))]
    pub async fn create_fit(&self, model_name: &str, payload: &Map<String, Value>) -> Result<Operation> {
        let url = self.url(&format!("{model_name}/fits"));
        let response = self.post(&url, payload).await?;

        match response.status() {
            StatusCode::CREATED => Ok(response.json().await?),
            StatusCode::UNPROCESSABLE_ENTITY => {
                let detail = response.text().await.unwrap_or_default();
                error!("fit rejected: {}", detail);
                Err(StanError::Validation(detail))
            }
            _ => Err(Self::server_error(response).await),
        }
    }

    /// Fetch the latest state of an operation.
    #[instrument(skip(self))]
    pub async fn get_operation(&self, operation_name: &str) -> Result<Operation> {
        let url = self.url(operation_name);
        let response = self.get(&url).await?;

        if !response.status().is_success() {
            return Err(Self::server_error(response).await);
        }
        Ok(response.json().await?)
    }

    /// Fetch the raw output of a finished fit.
    ///
    /// The body mixes JSON log records with draw lines that may hold `nan`/`inf`,
    /// so it is returned untouched.
    #[instrument(skip(self))]
    pub async fn get_fit(&self, fit_name: &str) -> Result<Bytes> {
        let url = self.url(fit_name);
        let response = self.get(&url).await?;

        if response.status() != StatusCode::OK {
            return Err(Self::server_error(response).await);
        }
        Ok(response.bytes().await?)
    }

    /// Delete a fit from the service cache.
    #[instrument(skip(self))]
    pub async fn delete_fit(&self, fit_name: &str) -> Result<()> {
        let url = self.url(fit_name);
        debug!("DELETE {}", url);

        let response = self.http_client.delete(&url).send().await?;
        match response.status() {
            StatusCode::OK | StatusCode::ACCEPTED | StatusCode::NO_CONTENT => Ok(()),
            _ => Err(Self::server_error(response).await),
        }
    }

    // =========================================================================
    // Parameter transforms
    // =========================================================================

    /// Map unconstrained parameters onto their constrained support.
    #[instrument(skip(self, data, unconstrained_parameters))]
    pub async fn write_array(
        &self,
        model_name: &str,
        data: &Map<String, Value>,
        unconstrained_parameters: &[f64],
        include_tparams: bool,
        include_gqs: bool,
    ) -> Result<Vec<f64>> {
        let url = self.url(&format!("{model_name}/write_array"));
        let request = WriteArrayRequest {
            data,
            unconstrained_parameters,
            include_tparams,
            include_gqs,
        };
        let response = self.post(&url, &request).await?;
        let body: WriteArrayResponse = Self::runtime_json(response).await?;
        Ok(body.params_r_constrained)
    }

    /// Map constrained parameter values back to the unconstrained space.
    #[instrument(skip(self, data, constrained_parameters))]
    pub async fn transform_inits(
        &self,
        model_name: &str,
        data: &Map<String, Value>,
        constrained_parameters: &Map<String, Value>,
    ) -> Result<Vec<f64>> {
        let url = self.url(&format!("{model_name}/transform_inits"));
        let request = TransformInitsRequest {
            data,
            constrained_parameters,
        };
        let response = self.post(&url, &request).await?;
        let body: TransformInitsResponse = Self::runtime_json(response).await?;
        Ok(body.params_r_unconstrained)
    }

    /// Evaluate the log density at unconstrained parameters.
    #[instrument(skip(self, data, unconstrained_parameters))]
    pub async fn log_prob(
        &self,
        model_name: &str,
        data: &Map<String, Value>,
        unconstrained_parameters: &[f64],
        adjust_transform: bool,
    ) -> Result<f64> {
        let url = self.url(&format!("{model_name}/log_prob"));
        let request = LogProbRequest {
            data,
            unconstrained_parameters,
            adjust_transform,
        };
        let response = self.post(&url, &request).await?;
        let body: LogProbResponse = Self::runtime_json(response).await?;
        Ok(body.log_prob)
    }

    /// Evaluate the gradient of the log density at unconstrained parameters.
    #[instrument(skip(self, data, unconstrained_parameters))]
    pub async fn log_prob_grad(
        &self,
        model_name: &str,
        data: &Map<String, Value>,
        unconstrained_parameters: &[f64],
    ) -> Result<Vec<f64>> {
        let url = self.url(&format!("{model_name}/log_prob_grad"));
        let request = LogProbGradRequest {
            data,
            unconstrained_parameters,
        };
        let response = self.post(&url, &request).await?;
        let body: LogProbGradResponse = Self::runtime_json(response).await?;
        Ok(body.log_prob_grad)
    }
}
