#![allow(dead_code)]

use serde_json::{Value, json};
use stan_client::{HttpstanClient, Reporter, ServiceConfig, Tone};
use std::time::Duration;
use wiremock::MockServer;

pub const PROGRAM: &str = "parameters { real y; } model { y ~ normal(0, 1); }";

/// Every call a [`RecordingReporter`] received, in order.
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    Message(Tone, String),
    Start(u64),
    Update(u64),
    Clear,
    Redisplay,
    Finish,
}

#[derive(Debug, Default)]
pub struct RecordingReporter {
    pub events: Vec<Event>,
    started: bool,
}

impl RecordingReporter {
    pub fn messages(&self) -> Vec<String> {
        self.events
            .iter()
            .filter_map(|e| match e {
                Event::Message(_, text) => Some(text.clone()),
                _ => None,
            })
            .collect()
    }

    pub fn starts(&self) -> Vec<u64> {
        self.events
            .iter()
            .filter_map(|e| match e {
                Event::Start(total) => Some(*total),
                _ => None,
            })
            .collect()
    }

    pub fn updates(&self) -> Vec<u64> {
        self.events
            .iter()
            .filter_map(|e| match e {
                Event::Update(current) => Some(*current),
                _ => None,
            })
            .collect()
    }
}

impl Reporter for RecordingReporter {
    fn message(&mut self, tone: Tone, text: &str) {
        self.events.push(Event::Message(tone, text.to_string()));
    }

    fn start(&mut self, total: u64) {
        self.started = true;
        self.events.push(Event::Start(total));
    }

    fn is_started(&self) -> bool {
        self.started
    }

    fn update(&mut self, current: u64) {
        self.events.push(Event::Update(current));
    }

    fn clear(&mut self) {
        self.events.push(Event::Clear);
    }

    fn redisplay(&mut self) {
        self.events.push(Event::Redisplay);
    }

    fn finish(&mut self) {
        self.started = false;
        self.events.push(Event::Finish);
    }
}

pub fn client_for(server: &MockServer) -> HttpstanClient {
    let config = ServiceConfig::new(format!("{}/v1", server.uri()))
        .timeout(Duration::from_secs(5))
        .poll_interval(Duration::from_millis(1));
    HttpstanClient::new(config).expect("client build")
}

/// Path of a resource under the API prefix, e.g. `/v1/models/abc/params`.
pub fn api_path(resource: &str) -> String {
    format!("/v1/{resource}")
}

pub fn operation_json(name: &str, done: bool, progress: Option<&str>, fit: Option<&str>) -> Value {
    let mut op = json!({ "name": name, "done": done });
    if let Some(progress) = progress {
        op["metadata"] = json!({ "progress": progress });
    }
    if let Some(fit) = fit {
        op["result"] = json!({ "name": fit });
    }
    op
}

/// Fit output with one logger record per entry of `logs` followed by a draw line.
pub fn fit_output(logs: &[&str], draw: f64) -> String {
    let mut out = String::new();
    for text in logs {
        out.push_str(&json!({ "topic": "logger", "values": [text] }).to_string());
        out.push('\n');
    }
    out.push_str(&format!(
        "{{\"topic\":\"sample\",\"values\":{{\"lp__\":-0.5,\"y\":{draw}}}}}\n"
    ));
    out
}
