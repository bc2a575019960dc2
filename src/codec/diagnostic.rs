//! Non-fatal findings recorded while parsing a page.
//!
//! Parsing never fails on unknown or malformed header and meta lines; instead the line is kept
//! as a deactivated comment and a diagnostic explains why. Collaborators such as a validation
//! engine read these alongside the tree.

use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ParseDiagnostic {
    /// A line that looked like a recognised construct was demoted to an inert comment.
    Deactivated {
        /// 1-based line number within the document
        line_number: usize,
        reason: String,
    },

    /// Something was repaired rather than rejected (an unclosed group attached to the last
    /// step, a modifier that had nothing to modify).
    Warning { line_number: usize, message: String },
}

impl ParseDiagnostic {
    pub fn deactivated(line_number: usize, reason: impl Into<String>) -> Self {
        ParseDiagnostic::Deactivated {
            line_number,
            reason: reason.into(),
        }
    }

    pub fn warning(line_number: usize, message: impl Into<String>) -> Self {
        ParseDiagnostic::Warning {
            line_number,
            message: message.into(),
        }
    }

    pub fn line_number(&self) -> usize {
        match self {
            ParseDiagnostic::Deactivated { line_number, .. }
            | ParseDiagnostic::Warning { line_number, .. } => *line_number,
        }
    }

    pub fn is_deactivation(&self) -> bool {
        matches!(self, ParseDiagnostic::Deactivated { .. })
    }
}

impl Display for ParseDiagnostic {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        match self {
            ParseDiagnostic::Deactivated {
                line_number,
                reason,
            } => write!(f, "line {line_number}: deactivated: {reason}"),
            ParseDiagnostic::Warning {
                line_number,
                message,
            } => write!(f, "line {line_number}: warning: {message}"),
        }
    }
}
