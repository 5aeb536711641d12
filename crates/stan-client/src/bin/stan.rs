use std::path::{Path, PathBuf};

use anyhow::{Context, bail};
use clap::{Args, Parser, Subcommand};
use serde_json::{Map, Value};
use tracing_subscriber::prelude::*;

use stan_client::config::SERVICE_URL_ENV;
use stan_client::{
    CancellationToken, Data, DataValue, HttpstanClient, Model, Outcome, QuietReporter, Reporter,
    SampleRequest, ServiceConfig, TerminalReporter, build,
};

/// Exit status used when the user interrupts a command.
const EXIT_INTERRUPTED: i32 = 130;

#[derive(Parser, Debug)]
#[command(name = "stan")]
#[command(about = "Compile and sample Stan programs on an httpstan service", version)]
struct Cli {
    /// Base URL of the service, including the API version prefix
    #[arg(long, global = true, env = SERVICE_URL_ENV)]
    url: Option<String>,

    /// Hide the progress bar and status lines
    #[arg(long, short, global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Compile a program and print its parameters
    Build(ModelArgs),

    /// Compile a program and draw samples, one output file per chain
    Sample(SampleArgs),

    /// Evaluate the log density at unconstrained parameter values
    LogProb(LogProbArgs),
}

#[derive(Args, Debug)]
struct ModelArgs {
    /// Stan program file
    program: PathBuf,

    /// JSON file mapping data variable names to values
    #[arg(long)]
    data: Option<PathBuf>,

    /// Positive random seed; seeded fits stay cached on the service
    #[arg(long)]
    seed: Option<u32>,
}

#[derive(Args, Debug)]
struct SampleArgs {
    #[command(flatten)]
    model: ModelArgs,

    #[arg(long, default_value_t = stan_client::DEFAULT_NUM_CHAINS)]
    num_chains: usize,

    #[arg(long)]
    num_samples: Option<u64>,

    #[arg(long)]
    num_warmup: Option<u64>,

    /// JSON file with initial values: one object for all chains, or an array with one per chain
    #[arg(long)]
    init: Option<PathBuf>,

    /// Extra sampler argument as KEY=JSON (e.g. adapt_delta=0.95); repeatable
    #[arg(long = "option", value_parser = parse_option)]
    options: Vec<(String, Value)>,

    /// Directory receiving chain-<id>.jsonl files
    #[arg(long, default_value = ".")]
    output_dir: PathBuf,
}

#[derive(Args, Debug)]
struct LogProbArgs {
    #[command(flatten)]
    model: ModelArgs,

    /// Unconstrained parameter values, comma separated
    #[arg(long, value_delimiter = ',', allow_hyphen_values = true)]
    params: Vec<f64>,

    /// Skip the Jacobian adjustment
    #[arg(long)]
    no_jacobian: bool,

    /// Also print the gradient
    #[arg(long)]
    grad: bool,
}

fn parse_option(raw: &str) -> Result<(String, Value), String> {
    let (key, value) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected KEY=JSON, got `{raw}`"))?;
    let value = serde_json::from_str(value).unwrap_or_else(|_| Value::String(value.to_string()));
    Ok((key.trim().to_string(), value))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing();

    let mut config = ServiceConfig::from_env();
    if let Some(url) = cli.url.as_deref() {
        config = config.base_url(url);
    }
    let client = HttpstanClient::new(config)?;

    let mut reporter: Box<dyn Reporter> = if cli.quiet {
        Box::new(QuietReporter::default())
    } else {
        Box::new(TerminalReporter::stderr())
    };

    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            trigger.cancel();
        }
    });

    let result = match cli.command {
        Command::Build(args) => run_build(&client, &args, reporter.as_mut(), &cancel).await,
        Command::Sample(args) => run_sample(&client, args, reporter.as_mut(), &cancel).await,
        Command::LogProb(args) => run_log_prob(&client, &args, reporter.as_mut(), &cancel).await,
    };

    match result? {
        Some(()) => Ok(()),
        None => std::process::exit(EXIT_INTERRUPTED),
    }
}

/// Logs go to stderr so stdout carries only command output.
fn init_tracing() {
    use tracing_subscriber::{EnvFilter, fmt};
    let _ = tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| "warn".into()))
        .with(fmt::layer().with_writer(std::io::stderr))
        .try_init();
}

fn read_json(path: &Path) -> anyhow::Result<Value> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    serde_json::from_str(&text).with_context(|| format!("{} is not valid JSON", path.display()))
}

fn read_data(path: Option<&Path>) -> anyhow::Result<Data> {
    let Some(path) = path else {
        return Ok(Data::new());
    };
    match read_json(path)? {
        Value::Object(map) => Ok(map
            .into_iter()
            .map(|(name, value)| (name, DataValue::Json(value)))
            .collect()),
        _ => bail!("{} must contain a JSON object", path.display()),
    }
}

fn read_init(path: &Path, num_chains: usize) -> anyhow::Result<Vec<Map<String, Value>>> {
    match read_json(path)? {
        Value::Object(map) => Ok(vec![map; num_chains]),
        Value::Array(items) => items
            .into_iter()
            .map(|item| match item {
                Value::Object(map) => Ok(map),
                _ => bail!("each entry of {} must be a JSON object", path.display()),
            })
            .collect(),
        _ => bail!("{} must contain a JSON object or array", path.display()),
    }
}

/// Build the model named by `args`. `None` means the user interrupted.
async fn load_model(
    client: &HttpstanClient,
    args: &ModelArgs,
    reporter: &mut dyn Reporter,
    cancel: &CancellationToken,
) -> anyhow::Result<Option<Model>> {
    let program_code = std::fs::read_to_string(&args.program)
        .with_context(|| format!("failed to read {}", args.program.display()))?;
    let data = read_data(args.data.as_deref())?;
    let outcome = build(client, &program_code, &data, args.seed, reporter, cancel).await;
    Ok(outcome.into_result()?)
}

async fn run_build(
    client: &HttpstanClient,
    args: &ModelArgs,
    reporter: &mut dyn Reporter,
    cancel: &CancellationToken,
) -> anyhow::Result<Option<()>> {
    let Some(model) = load_model(client, args, reporter, cancel).await? else {
        return Ok(None);
    };

    println!("{}", model.model_name());
    for (name, dims) in model.param_names().iter().zip(model.dims()) {
        let dims = dims
            .iter()
            .map(|d| d.to_string())
            .collect::<Vec<_>>()
            .join(",");
        println!("  {name}[{dims}]");
    }
    Ok(Some(()))
}

async fn run_sample(
    client: &HttpstanClient,
    args: SampleArgs,
    reporter: &mut dyn Reporter,
    cancel: &CancellationToken,
) -> anyhow::Result<Option<()>> {
    let mut request = SampleRequest::new().num_chains(args.num_chains);
    if let Some(n) = args.num_samples {
        request = request.option("num_samples", n);
    }
    if let Some(n) = args.num_warmup {
        request = request.option("num_warmup", n);
    }
    for (key, value) in args.options {
        request = request.option(key, value);
    }
    if let Some(path) = args.init.as_deref() {
        request = request.init(read_init(path, args.num_chains)?);
    }

    let Some(model) = load_model(client, &args.model, reporter, cancel).await? else {
        return Ok(None);
    };

    let fit = match model.sample(client, request, reporter, cancel).await {
        Outcome::Completed(fit) => fit,
        Outcome::Cancelled => return Ok(None),
        Outcome::Failed(err) => return Err(err.into()),
    };

    tokio::fs::create_dir_all(&args.output_dir)
        .await
        .with_context(|| format!("failed to create {}", args.output_dir.display()))?;
    for (idx, output) in fit.stan_outputs().iter().enumerate() {
        let path = args.output_dir.join(format!("chain-{}.jsonl", idx + 1));
        tokio::fs::write(&path, output)
            .await
            .with_context(|| format!("failed to write {}", path.display()))?;
        println!("{}", path.display());
    }
    Ok(Some(()))
}

async fn run_log_prob(
    client: &HttpstanClient,
    args: &LogProbArgs,
    reporter: &mut dyn Reporter,
    cancel: &CancellationToken,
) -> anyhow::Result<Option<()>> {
    let Some(model) = load_model(client, &args.model, reporter, cancel).await? else {
        return Ok(None);
    };

    let log_prob = model.log_prob(client, &args.params, !args.no_jacobian).await?;
    println!("{log_prob}");
    if args.grad {
        let grad = model.grad_log_prob(client, &args.params).await?;
        let grad = grad
            .iter()
            .map(|g| g.to_string())
            .collect::<Vec<_>>()
            .join(",");
        println!("{grad}");
    }
    Ok(Some(()))
}
