//! Compilation of a program into a [`Model`].

use crate::client::HttpstanClient;
use crate::data::{Data, normalize};
use crate::error::{Result, StanError};
use crate::model::{Model, ParameterMetadata, calculate_model_name, validate_seed};
use crate::outcome::{Outcome, run_cancellable};
use crate::progress::{Reporter, Tone};
use serde_json::{Map, Value};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// Compile `program_code` on the service and bind it to `data` and `random_seed`.
///
/// Data normalization and seed validation happen before any request. Compilation
/// is always requested, since the service treats it as idempotent; the params
/// probe beforehand only decides whether to announce a cache hit.
pub async fn build(
    client: &HttpstanClient,
    program_code: &str,
    data: &Data,
    random_seed: Option<u32>,
    reporter: &mut dyn Reporter,
    cancel: &CancellationToken,
) -> Outcome<Model> {
    let prepared = validate_seed(random_seed).and_then(|()| normalize(data));
    let data = match prepared {
        Ok(data) => data,
        Err(err) => return Outcome::Failed(err),
    };

    run_cancellable(
        cancel,
        compile(client, program_code, data, random_seed, &mut *reporter),
    )
    .await
}

async fn compile(
    client: &HttpstanClient,
    program_code: &str,
    data: Map<String, Value>,
    random_seed: Option<u32>,
    reporter: &mut dyn Reporter,
) -> Result<Model> {
    let model_name = calculate_model_name(program_code);
    reporter.message(Tone::Info, "Building...");

    let in_cache = client.is_compiled(&model_name, &data).await?;
    if !in_cache {
        reporter.message(Tone::Plain, "This may take some time.");
    }
    debug!(model = %model_name, in_cache, "requesting compilation");

    let created = client.create_model(program_code).await?;
    if created.name != model_name {
        return Err(StanError::Server {
            status: 201,
            message: format!(
                "service named the program `{}`, expected `{}`",
                created.name, model_name
            ),
        });
    }
    if let Some(warnings) = created.stanc_warnings.as_deref().map(str::trim_end) {
        if !warnings.trim().is_empty() {
            reporter.message(Tone::Comment, "Messages from stanc:");
            reporter.message(Tone::Plain, warnings);
        }
    }

    let params = client.model_params(&model_name, &data).await?;
    let metadata = ParameterMetadata::from_params(&params)?;

    if in_cache {
        reporter.message(Tone::Comment, "Found model in cache.");
    }
    reporter.message(Tone::Info, "Done.");
    info!(model = %model_name, params = metadata.param_names.len(), "model built");

    Model::new(model_name, program_code, data, metadata, random_seed)
}
