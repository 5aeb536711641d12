//! Multi-chain sampling.
//!
//! One fit is created per chain, in chain order. All unfinished operations are
//! then polled in sweeps until every one reports done, with the per-chain
//! iteration counts merged into one progress bar. Finished fits are read back
//! in chain order, so the result never depends on completion order.
//!
//! Polling has no deadline. A chain that never finishes keeps the call alive
//! until the cancellation token fires.

use crate::client::HttpstanClient;
use crate::error::{Result, StanError};
use crate::fit::Fit;
use crate::logs::notable_messages;
use crate::model::Model;
use crate::outcome::{Outcome, run_cancellable};
use crate::progress::{Reporter, Tone};
use crate::types::{Operation, OperationResult};
use bytes::Bytes;
use regex::Regex;
use serde_json::{Map, Value};
use std::sync::LazyLock;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Number of chains when the caller does not say otherwise.
pub const DEFAULT_NUM_CHAINS: usize = 4;

/// Service function used unless the options name another.
pub const DEFAULT_FUNCTION: &str = "stan::services::sample::hmc_nuts_diag_e_adapt";

/// Keys filled in per chain from the model; callers may not set them.
const RESERVED_KEYS: [&str; 3] = ["chain", "data", "random_seed"];

/// Keys with dedicated fields on [`SampleRequest`].
const DEDICATED_KEYS: [&str; 2] = ["num_chains", "init"];

static ITERATION_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"Iteration:\s+(\d+)\s+/\s+(\d+)").expect("iteration pattern is valid")
});

/// Current and maximum iteration from a progress string such as
/// `Iteration:  300 / 2000 [ 15%]  (Warmup)`.
fn parse_iteration(progress: &str) -> Option<(u64, u64)> {
    let caps = ITERATION_RE.captures(progress)?;
    let current = caps.get(1)?.as_str().parse().ok()?;
    let max = caps.get(2)?.as_str().parse().ok()?;
    Some((current, max))
}

/// Arguments for one sampling call.
#[derive(Debug, Clone)]
pub struct SampleRequest {
    /// Sampler arguments, named as in CmdStan (`num_samples`, `adapt_delta`, ...).
    pub options: Map<String, Value>,
    pub num_chains: usize,
    /// One initial-value mapping per chain. `None` means empty mappings.
    pub init: Option<Vec<Map<String, Value>>>,
}

impl Default for SampleRequest {
    fn default() -> Self {
        Self {
            options: Map::new(),
            num_chains: DEFAULT_NUM_CHAINS,
            init: None,
        }
    }
}

impl SampleRequest {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the number of chains.
    pub fn num_chains(mut self, num_chains: usize) -> Self {
        self.num_chains = num_chains;
        self
    }

    /// Add one sampler argument.
    pub fn option(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.options.insert(key.into(), value.into());
        self
    }

    /// Set per-chain initial values.
    pub fn init(mut self, init: Vec<Map<String, Value>>) -> Self {
        self.init = Some(init);
        self
    }
}

/// Warmup, sample, thinning and warmup-retention values in effect for a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SamplerSettings {
    pub num_warmup: u64,
    pub num_samples: u64,
    pub num_thin: u64,
    pub save_warmup: bool,
}

impl Default for SamplerSettings {
    /// Defaults of the `sample` method.
    fn default() -> Self {
        Self {
            num_warmup: 1000,
            num_samples: 1000,
            num_thin: 1,
            save_warmup: false,
        }
    }
}

impl SamplerSettings {
    /// Take each value from `options` when present, else from the method default.
    pub fn resolve(options: &Map<String, Value>) -> Result<Self> {
        let defaults = Self::default();
        Ok(Self {
            num_warmup: count_option(options, "num_warmup", defaults.num_warmup)?,
            num_samples: count_option(options, "num_samples", defaults.num_samples)?,
            num_thin: count_option(options, "num_thin", defaults.num_thin)?,
            save_warmup: flag_option(options, "save_warmup", defaults.save_warmup)?,
        })
    }
}

fn count_option(options: &Map<String, Value>, key: &str, default: u64) -> Result<u64> {
    match options.get(key) {
        None => Ok(default),
        Some(value) => value.as_u64().ok_or_else(|| {
            StanError::Precondition(format!("`{key}` must be a non-negative integer, got {value}"))
        }),
    }
}

fn flag_option(options: &Map<String, Value>, key: &str, default: bool) -> Result<bool> {
    match options.get(key) {
        None => Ok(default),
        Some(Value::Bool(flag)) => Ok(*flag),
        Some(value) => match value.as_u64() {
            Some(0) => Ok(false),
            Some(1) => Ok(true),
            _ => Err(StanError::Precondition(format!(
                "`{key}` must be a boolean, got {value}"
            ))),
        },
    }
}

/// Validated per-chain payloads plus the settings they resolve to.
#[derive(Debug)]
struct SamplePlan {
    payloads: Vec<Map<String, Value>>,
    settings: SamplerSettings,
}

impl SamplePlan {
    /// Check caller preconditions and synthesize one payload per chain.
    fn prepare(model: &Model, request: SampleRequest) -> Result<Self> {
        let SampleRequest {
            options,
            num_chains,
            init,
        } = request;

        for key in RESERVED_KEYS {
            if options.contains_key(key) {
                return Err(StanError::Precondition(format!(
                    "`{key}` is set automatically and may not be passed as an option"
                )));
            }
        }
        for key in DEDICATED_KEYS {
            if options.contains_key(key) {
                return Err(StanError::Precondition(format!(
                    "`{key}` has a dedicated field on the request"
                )));
            }
        }
        if num_chains == 0 {
            return Err(StanError::Precondition(
                "`num_chains` must be at least 1".to_string(),
            ));
        }

        let init = init.unwrap_or_else(|| vec![Map::new(); num_chains]);
        if init.len() != num_chains {
            return Err(StanError::Precondition(format!(
                "Initial values must be provided for each chain: expected {num_chains}, got {}",
                init.len()
            )));
        }

        let settings = SamplerSettings::resolve(&options)?;

        let payloads = init
            .into_iter()
            .enumerate()
            .map(|(idx, chain_init)| {
                let mut payload = Map::new();
                payload.insert("function".into(), Value::from(DEFAULT_FUNCTION));
                payload.extend(options.clone());
                payload.insert("chain".into(), Value::from(idx + 1));
                payload.insert("data".into(), Value::Object(model.data().clone()));
                payload.insert("init".into(), Value::Object(chain_init));
                if let Some(seed) = model.random_seed() {
                    payload.insert("random_seed".into(), Value::from(seed));
                }
                payload
            })
            .collect();

        Ok(Self { payloads, settings })
    }

    fn num_chains(&self) -> usize {
        self.payloads.len()
    }
}

/// Draw samples from `model`, one chain per remote operation.
///
/// Precondition failures are returned before any request is sent. Every other
/// failure aborts the whole call; no partial result is produced.
pub async fn sample(
    client: &HttpstanClient,
    model: &Model,
    request: SampleRequest,
    reporter: &mut dyn Reporter,
    cancel: &CancellationToken,
) -> Outcome<Fit> {
    let plan = match SamplePlan::prepare(model, request) {
        Ok(plan) => plan,
        Err(err) => return Outcome::Failed(err),
    };

    let outcome = run_cancellable(cancel, run(client, model, &plan, &mut *reporter)).await;
    match &outcome {
        Outcome::Completed(_) => {}
        Outcome::Cancelled => {
            reporter.clear();
            warn!(model = %model.model_name(), "sampling cancelled; submitted operations were not cancelled");
        }
        Outcome::Failed(err) => {
            reporter.clear();
            debug!(model = %model.model_name(), error = %err, "sampling failed");
        }
    }
    outcome
}

impl Model {
    /// Draw samples from this model. See [`sample()`].
    pub async fn sample(
        &self,
        client: &HttpstanClient,
        request: SampleRequest,
        reporter: &mut dyn Reporter,
        cancel: &CancellationToken,
    ) -> Outcome<Fit> {
        sample(client, self, request, reporter, cancel).await
    }
}

async fn run(
    client: &HttpstanClient,
    model: &Model,
    plan: &SamplePlan,
    reporter: &mut dyn Reporter,
) -> Result<Fit> {
    reporter.message(Tone::Info, "Sampling...");

    let mut operations = submit(client, model, &plan.payloads).await?;
    poll(
        client,
        &mut operations,
        client.config().poll_interval,
        &mut *reporter,
    )
    .await?;

    let ephemeral = model.random_seed().is_none();
    let outputs = retrieve(client, &operations, ephemeral).await?;

    // The bar stays up until the messages are printed, then is redrawn complete.
    let notable = notable_messages(&outputs);
    reporter.clear();
    if !notable.is_empty() {
        reporter.message(Tone::Comment, "Messages received during sampling:");
        for msg in &notable {
            let text = msg.display_text();
            if !text.trim().is_empty() {
                reporter.message(Tone::Plain, &text);
            }
        }
    }
    reporter.redisplay();
    reporter.finish();
    reporter.message(Tone::Info, "Done.");

    let settings = plan.settings;
    info!(
        model = %model.model_name(),
        chains = plan.num_chains(),
        notable = notable.len(),
        "sampling finished"
    );
    Ok(Fit::new(
        outputs,
        model.params().clone(),
        settings.num_warmup,
        settings.num_samples,
        settings.num_thin,
        settings.save_warmup,
    ))
}

/// Create one fit per chain, strictly in chain order.
async fn submit(
    client: &HttpstanClient,
    model: &Model,
    payloads: &[Map<String, Value>],
) -> Result<Vec<Operation>> {
    let mut operations = Vec::with_capacity(payloads.len());
    for (idx, payload) in payloads.iter().enumerate() {
        let operation = client.create_fit(model.model_name(), payload).await?;
        debug!(chain = idx + 1, operation = %operation.name, "fit submitted");
        operations.push(operation);
    }
    Ok(operations)
}

/// Refresh every unfinished operation once per sweep until all are done.
async fn poll(
    client: &HttpstanClient,
    operations: &mut [Operation],
    interval: Duration,
    reporter: &mut dyn Reporter,
) -> Result<()> {
    let num_chains = operations.len() as u64;
    let mut iterations = vec![0_u64; operations.len()];
    let mut started = false;

    while !operations.iter().all(|op| op.done) {
        for (idx, operation) in operations.iter_mut().enumerate() {
            if operation.done {
                continue;
            }
            let latest = client.get_operation(&operation.name).await?;
            *operation = latest;

            if let Some((iteration, max)) = operation.progress().and_then(parse_iteration) {
                if !started {
                    reporter.start(max.saturating_mul(num_chains));
                    started = true;
                }
                iterations[idx] = iteration;
                reporter.update(iterations.iter().fold(0, |acc, &n| acc.saturating_add(n)));
            }
            if operation.done {
                debug!(chain = idx + 1, operation = %operation.name, "chain finished");
            }
        }
        tokio::time::sleep(interval).await;
    }
    Ok(())
}

/// Read each chain's output in chain order, deleting ephemeral fits after reading.
///
/// A failed chain aborts before any output is read.
async fn retrieve(
    client: &HttpstanClient,
    operations: &[Operation],
    ephemeral: bool,
) -> Result<Vec<Bytes>> {
    let mut fit_names = Vec::with_capacity(operations.len());
    for operation in operations {
        match &operation.result {
            Some(OperationResult::Fit(fit)) => fit_names.push(fit.name.as_str()),
            Some(OperationResult::Error(status)) => {
                return Err(StanError::Runtime(status.message.clone()));
            }
            None => {
                return Err(StanError::Server {
                    status: 200,
                    message: format!("operation `{}` finished without a result", operation.name),
                });
            }
        }
    }

    let mut outputs = Vec::with_capacity(fit_names.len());
    for fit_name in fit_names {
        let output = client.get_fit(fit_name).await?;
        if ephemeral {
            client.delete_fit(fit_name).await?;
            debug!(fit = %fit_name, "ephemeral fit deleted");
        }
        outputs.push(output);
    }
    Ok(outputs)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{ParameterMetadata, calculate_model_name};
    use pretty_assertions::assert_eq;
    use serde_json::json;

    const PROGRAM: &str = "parameters { real y; } model { y ~ normal(0, 1); }";

    fn model(seed: Option<u32>) -> Model {
        let mut data = Map::new();
        data.insert("N".into(), json!(2));
        Model::new(
            calculate_model_name(PROGRAM),
            PROGRAM,
            data,
            ParameterMetadata::default(),
            seed,
        )
        .unwrap()
    }

    #[test]
    fn test_parse_iteration() {
        assert_eq!(parse_iteration("Iteration:    1 / 2000 [  0%]  (Warmup)"), Some((1, 2000)));
        assert_eq!(parse_iteration("Iteration: 2000 / 2000 [100%]  (Sampling)"), Some((2000, 2000)));
        assert_eq!(parse_iteration("Gradient evaluation took 0.1 seconds"), None);
    }

    #[test]
    fn test_default_init_synthesizes_one_empty_mapping_per_chain() {
        let plan = SamplePlan::prepare(&model(None), SampleRequest::new()).unwrap();
        assert_eq!(plan.num_chains(), 4);
        for (idx, payload) in plan.payloads.iter().enumerate() {
            assert_eq!(payload["init"], json!({}));
            assert_eq!(payload["chain"], json!(idx + 1));
            assert_eq!(payload["function"], json!(DEFAULT_FUNCTION));
            assert_eq!(payload["data"], json!({"N": 2}));
            assert!(!payload.contains_key("random_seed"));
        }
    }

    #[test]
    fn test_seed_and_options_are_copied_to_every_chain() {
        let request = SampleRequest::new()
            .num_chains(2)
            .option("num_samples", 200)
            .option("function", "stan::services::sample::hmc_nuts_dense_e_adapt");
        let plan = SamplePlan::prepare(&model(Some(42)), request).unwrap();
        assert_eq!(plan.num_chains(), 2);
        for payload in &plan.payloads {
            assert_eq!(payload["random_seed"], json!(42));
            assert_eq!(payload["num_samples"], json!(200));
            assert_eq!(
                payload["function"],
                json!("stan::services::sample::hmc_nuts_dense_e_adapt")
            );
        }
        assert_eq!(plan.settings.num_samples, 200);
        assert_eq!(plan.settings.num_warmup, 1000);
    }

    #[test]
    fn test_init_count_must_match_chains() {
        let request = SampleRequest::new().num_chains(3).init(vec![Map::new(); 2]);
        let err = SamplePlan::prepare(&model(None), request).unwrap_err();
        assert!(matches!(err, StanError::Precondition(ref msg) if msg.contains("each chain")));
    }

    #[test]
    fn test_reserved_options_are_rejected() {
        for key in ["chain", "data", "random_seed", "num_chains", "init"] {
            let request = SampleRequest::new().option(key, 1);
            let err = SamplePlan::prepare(&model(None), request).unwrap_err();
            assert!(matches!(err, StanError::Precondition(_)), "{key} accepted");
        }
    }

    #[test]
    fn test_zero_chains_rejected() {
        let err = SamplePlan::prepare(&model(None), SampleRequest::new().num_chains(0)).unwrap_err();
        assert!(matches!(err, StanError::Precondition(_)));
    }

    #[test]
    fn test_settings_resolution() {
        let mut options = Map::new();
        assert_eq!(SamplerSettings::resolve(&options).unwrap(), SamplerSettings::default());

        options.insert("num_warmup".into(), json!(150));
        options.insert("num_thin".into(), json!(2));
        options.insert("save_warmup".into(), json!(1));
        let settings = SamplerSettings::resolve(&options).unwrap();
        assert_eq!(
            settings,
            SamplerSettings {
                num_warmup: 150,
                num_samples: 1000,
                num_thin: 2,
                save_warmup: true,
            }
        );

        options.insert("num_samples".into(), json!(-5));
        assert!(SamplerSettings::resolve(&options).is_err());
    }
}
