//! OperationOutcome classification
//!
//! A 4xx response carries an OperationOutcome whose `issue[].code` tells a
//! duplicate identifier apart from a refused value.

use super::traits::{Rejection, RejectionKind};
use serde_json::Value;

const INVALID_VALUE_CODES: &[&str] = &[
    "invalid",
    "structure",
    "required",
    "value",
    "invariant",
    "code-invalid",
    "not-found",
    "business-rule",
];

/// Maps a refused response to a [`Rejection`]
pub fn classify(status: u16, body: Value) -> Rejection {
    let issues = body
        .get("issue")
        .and_then(Value::as_array)
        .cloned()
        .unwrap_or_default();

    let codes: Vec<&str> = issues
        .iter()
        .filter_map(|issue| issue.get("code").and_then(Value::as_str))
        .collect();

    let kind = if codes.contains(&"duplicate") || status == 409 {
        RejectionKind::Duplicate
    } else if codes.iter().any(|c| INVALID_VALUE_CODES.contains(c)) {
        RejectionKind::InvalidValue
    } else {
        RejectionKind::Other
    };

    let message = issues
        .iter()
        .find_map(issue_text)
        .or_else(|| body.as_str().map(str::to_string))
        .unwrap_or_else(|| format!("Registry refused the request with status {status}"));

    Rejection {
        status,
        kind,
        message,
        body,
    }
}

fn issue_text(issue: &Value) -> Option<String> {
    issue
        .pointer("/details/text")
        .and_then(Value::as_str)
        .or_else(|| issue.get("diagnostics").and_then(Value::as_str))
        .filter(|s| !s.trim().is_empty())
        .map(str::to_string)
}
