//! Client for the httpstan model service.
//!
//! [`build()`] compiles a program and returns a [`Model`]; [`sample()`] runs
//! several chains against it and returns a [`Fit`] holding each chain's raw
//! output in chain order. Both take the service handle explicitly and return
//! an [`Outcome`] so that cancellation is distinguishable from failure.
//!
//! ```ignore
//! let client = HttpstanClient::new(ServiceConfig::from_env())?;
//! let cancel = CancellationToken::new();
//! let mut reporter = TerminalReporter::stderr();
//! let model = build(&client, PROGRAM, &Data::new(), Some(1), &mut reporter, &cancel)
//!     .await
//!     .into_result()?
//!     .expect("not cancelled");
//! let fit = model
//!     .sample(&client, SampleRequest::new().num_chains(2), &mut reporter, &cancel)
//!     .await
//!     .into_result()?;
//! ```

pub mod build;
pub mod client;
pub mod config;
pub mod data;
pub mod error;
pub mod fit;
pub mod logs;
pub mod model;
pub mod outcome;
pub mod progress;
pub mod sample;
pub mod types;

pub use build::build;
pub use client::HttpstanClient;
pub use config::ServiceConfig;
pub use data::{Data, DataValue, normalize};
pub use error::{Result, StanError};
pub use fit::Fit;
pub use logs::{LoggerMessage, notable_messages};
pub use model::{Model, ParameterMetadata, calculate_model_name};
pub use outcome::Outcome;
pub use progress::{QuietReporter, Reporter, TerminalReporter, Tone};
pub use sample::{DEFAULT_NUM_CHAINS, SampleRequest, SamplerSettings, sample};
pub use tokio_util::sync::CancellationToken;
