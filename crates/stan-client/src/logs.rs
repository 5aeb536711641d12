//! Classification of logger records embedded in fit output.
//!
//! A fit stream interleaves JSON logger records with draw lines. Draw lines may
//! contain `nan` or `inf`, which no JSON parser accepts, so only lines carrying
//! the logger topic marker are parsed at all.

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::warn;

/// Byte marker identifying a logger record line.
const LOGGER_MARKER: &[u8] = b"\"logger\"";

/// Width of the indentation the sampler uses for continuation lines of its elapsed-time report.
const CONTINUATION_INDENT: usize = 15;

/// One structured record from a fit stream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoggerMessage {
    pub topic: String,
    #[serde(default)]
    pub values: Vec<Value>,
}

impl LoggerMessage {
    /// The record text, e.g. `info:Iteration: 5 / 100`.
    pub fn text(&self) -> &str {
        self.values.first().and_then(Value::as_str).unwrap_or_default()
    }

    /// Whether the record deserves the user's attention.
    ///
    /// Everything from the logger is notable except empty `info:` lines and
    /// `info:` lines reporting iteration progress or elapsed time.
    pub fn is_notable(&self) -> bool {
        if self.topic != "logger" {
            return false;
        }
        let text = self.text();
        match text.strip_prefix("info:") {
            Some(rest) => !(rest.is_empty() || is_benign_info(rest)),
            None => !text.is_empty(),
        }
    }

    /// Text as shown to the user, with the severity prefix replaced by indentation.
    pub fn display_text(&self) -> String {
        self.text().replace("info:", "  ").replace("error:", "  ")
    }
}

fn is_benign_info(rest: &str) -> bool {
    rest.starts_with("Iteration:")
        || rest.starts_with(" Elapsed Time:")
        || leading_spaces(rest) == CONTINUATION_INDENT
}

fn leading_spaces(text: &str) -> usize {
    text.len() - text.trim_start_matches(' ').len()
}

fn contains_marker(line: &[u8]) -> bool {
    line.windows(LOGGER_MARKER.len()).any(|w| w == LOGGER_MARKER)
}

/// Parse the logger records of one stream, in order. Draw lines are skipped unparsed.
pub fn logger_messages(output: &[u8]) -> Vec<LoggerMessage> {
    output
        .split(|&b| b == b'\n')
        .filter(|line| contains_marker(line))
        .filter_map(|line| match serde_json::from_slice::<LoggerMessage>(line) {
            Ok(msg) => Some(msg),
            Err(err) => {
                warn!(error = %err, "skipping malformed logger record");
                None
            }
        })
        .collect()
}

/// Notable records across all chain outputs, in encounter order.
pub fn notable_messages(outputs: &[Bytes]) -> Vec<LoggerMessage> {
    outputs
        .iter()
        .flat_map(|output| logger_messages(output))
        .filter(LoggerMessage::is_notable)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn logger(text: &str) -> LoggerMessage {
        LoggerMessage {
            topic: "logger".into(),
            values: vec![json!(text)],
        }
    }

    #[test]
    fn test_progress_and_timing_are_not_notable() {
        assert!(!logger("info:Iteration: 5 / 100").is_notable());
        assert!(!logger("info:Iteration:    1 / 2000 [  0%]  (Warmup)").is_notable());
        assert!(!logger("info: Elapsed Time: 0.05 seconds (Warm-up)").is_notable());
        assert!(!logger("info:").is_notable());
    }

    #[test]
    fn test_errors_and_other_info_are_notable() {
        assert!(logger("error:bad").is_notable());
        assert!(logger("info:Gradient evaluation took 1.2e-05 seconds").is_notable());
        assert!(logger("warn:Rejecting initial value").is_notable());
    }

    #[test]
    fn test_continuation_indent_must_be_exact() {
        let line = |n: usize| format!("info:{}0.04 seconds (Sampling)", " ".repeat(n));
        assert!(!logger(&line(15)).is_notable());
        assert!(logger(&line(14)).is_notable());
        assert!(logger(&line(16)).is_notable());
    }

    #[test]
    fn test_other_topics_are_ignored() {
        let msg = LoggerMessage {
            topic: "sample".into(),
            values: vec![json!("error:not a logger record")],
        };
        assert!(!msg.is_notable());
    }

    #[test]
    fn test_draw_lines_are_never_parsed() {
        let output = concat!(
            "{\"topic\":\"logger\",\"values\":[\"info:Iteration: 1 / 10\"]}\n",
            "{\"topic\":\"sample\",\"values\":{\"lp__\":nan,\"y\":inf}}\n",
            "{\"topic\":\"logger\",\"values\":[\"error:Exception: bad scale\"]}\n",
            "-1.2,nan,inf\n",
        );
        let messages = logger_messages(output.as_bytes());
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[1].text(), "error:Exception: bad scale");
    }

    #[test]
    fn test_notable_messages_keep_chain_order() {
        let chain1 = Bytes::from_static(
            b"{\"topic\":\"logger\",\"values\":[\"error:first\"]}\n\
              {\"topic\":\"logger\",\"values\":[\"info:Iteration: 1 / 10\"]}\n",
        );
        let chain2 = Bytes::from_static(b"{\"topic\":\"logger\",\"values\":[\"info:second\"]}\n");
        let notable = notable_messages(&[chain1, chain2]);
        let texts: Vec<&str> = notable.iter().map(LoggerMessage::text).collect();
        assert_eq!(texts, vec!["error:first", "info:second"]);
    }

    #[test]
    fn test_display_text_strips_severity() {
        assert_eq!(logger("info:Adjust your expectations").display_text(), "  Adjust your expectations");
        assert_eq!(logger("error:bad").display_text(), "  bad");
    }
}
