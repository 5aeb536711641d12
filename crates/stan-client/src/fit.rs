//! Container for the raw output of a multi-chain sampling run.

use crate::model::ParameterMetadata;
use bytes::Bytes;

/// Output of [`crate::sample()`]: one raw stream per chain, in chain-id order.
///
/// Streams are stored as returned by the service. Decoding draws is left to the caller.
#[derive(Debug, Clone)]
pub struct Fit {
    stan_outputs: Vec<Bytes>,
    num_chains: usize,
    params: ParameterMetadata,
    num_warmup: u64,
    num_samples: u64,
    num_thin: u64,
    save_warmup: bool,
}

impl Fit {
    pub(crate) fn new(
        stan_outputs: Vec<Bytes>,
        params: ParameterMetadata,
        num_warmup: u64,
        num_samples: u64,
        num_thin: u64,
        save_warmup: bool,
    ) -> Self {
        Self {
            num_chains: stan_outputs.len(),
            stan_outputs,
            params,
            num_warmup,
            num_samples,
            num_thin,
            save_warmup,
        }
    }

    /// Raw chain outputs; index 0 holds chain 1.
    pub fn stan_outputs(&self) -> &[Bytes] {
        &self.stan_outputs
    }

    /// Raw output for a 1-based chain id.
    pub fn chain_output(&self, chain: usize) -> Option<&Bytes> {
        chain.checked_sub(1).and_then(|idx| self.stan_outputs.get(idx))
    }

    pub fn num_chains(&self) -> usize {
        self.num_chains
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

    pub fn num_warmup(&self) -> u64 {
        self.num_warmup
    }

    pub fn num_samples(&self) -> u64 {
        self.num_samples
    }

    pub fn num_thin(&self) -> u64 {
        self.num_thin
    }

    pub fn save_warmup(&self) -> bool {
        self.save_warmup
    }
}
