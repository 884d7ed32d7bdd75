//! Diagnostic job printing text to standard output.

use super::{JobDefinition, JobType};
use crate::error::DecodeError;
use serde::Deserialize;
use serde_json::{Map, Value};
use std::io::{self, Write};
use tracing::warn;

/// Prints its text. Useful for checking a deployment end to end.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct PrintJob {
    text: String,
}

impl PrintJob {
    /// Create a job printing `text`.
    #[must_use]
    pub fn new(text: impl Into<String>) -> Self {
        Self { text: text.into() }
    }

    /// Text to print.
    #[must_use]
    pub fn text(&self) -> &str {
        &self.text
    }

    /// Write the text followed by a newline.
    ///
    /// # Errors
    ///
    /// Returns error if `out` cannot be written.
    pub fn write_to(&self, out: &mut impl Write) -> io::Result<()> {
        writeln!(out, "{}", self.text)?;
        out.flush()
    }

    /// Print to standard output. Never fails; a closed stdout is only logged.
    pub fn run(&self) {
        if let Err(e) = self.write_to(&mut io::stdout().lock()) {
            warn!(error = %e, "Failed to write to stdout");
        }
    }
}

impl JobDefinition for PrintJob {
    const JOB_TYPE: JobType = JobType::Print;
    const NAME: &'static str = "PrintJob";

    fn from_data(data: Map<String, Value>) -> Result<Self, DecodeError> {
        serde_json::from_value(Value::Object(data))
            .map_err(|e| DecodeError::malformed(format!("{}: {e}", Self::NAME)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_write_to_outputs_text_once() {
        let mut out = Vec::new();
        PrintJob::new("hello").write_to(&mut out).unwrap();
        assert_eq!(String::from_utf8(out).unwrap(), "hello\n");
    }

    #[test]
    fn test_from_data() {
        let Value::Object(data) = json!({"text": "hi", "extra": 1}) else {
            unreachable!()
        };
        assert_eq!(PrintJob::from_data(data).unwrap(), PrintJob::new("hi"));
    }

    #[test]
    fn test_from_data_wrong_type() {
        let Value::Object(data) = json!({"text": 5}) else {
            unreachable!()
        };
        assert!(matches!(
            PrintJob::from_data(data),
            Err(DecodeError::MalformedPayload(_))
        ));
    }
}
