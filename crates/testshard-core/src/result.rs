//! Outcome of a set-reconciliation operation.
//!
//! Results cross the wire as a single line, `ok: <message>` or
//! `conflict: <message>`, so the transport can stay opaque text.

use serde::{Deserialize, Serialize};

use crate::error::ParseError;

/// Success flag plus human-readable detail for a set operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OperationResult {
    pub success: bool,
    pub message: String,
}

impl OperationResult {
    pub fn ok(message: impl Into<String>) -> Self {
        OperationResult {
            success: true,
            message: message.into(),
        }
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        OperationResult {
            success: false,
            message: message.into(),
        }
    }

    /// Render the wire line.
    pub fn render(&self) -> String {
        let status = if self.success { "ok" } else { "conflict" };
        format!("{}: {}", status, self.message)
    }

    /// Parse a wire line produced by [`render`](Self::render).
    pub fn parse(text: &str) -> Result<Self, ParseError> {
        let line = text.trim_end_matches(['\r', '\n']);
        if let Some(message) = line.strip_prefix("ok: ") {
            return Ok(OperationResult::ok(message));
        }
        if let Some(message) = line.strip_prefix("conflict: ") {
            return Ok(OperationResult::conflict(message));
        }
        Err(ParseError::MalformedLine {
            kind: "operation result",
            line: text.to_string(),
        })
    }
}
