//! User-visible diagnostics.
//!
//! Every lifecycle error is turned into a [`Diagnostic`] at the operation
//! boundary; nothing below it prints or exits.

use serde::Serialize;
use std::fmt;

use crate::error::{AnsiblePlayError, ExecutionError};

/// Severity of a diagnostic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    /// The operation failed.
    Error,
    /// The operation succeeded but something looks off.
    Warning,
}

/// A single diagnostic record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Diagnostic {
    /// Severity.
    pub severity: Severity,
    /// One-line summary.
    pub summary: String,
    /// Longer free-text detail.
    pub detail: String,
    /// Resource attribute the diagnostic is scoped to.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub attribute: Option<String>,
}

/// Ordered collection of diagnostics produced by one operation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct Diagnostics(Vec<Diagnostic>);

impl Diagnostic {
    /// Creates an error diagnostic.
    #[must_use]
    pub fn error(summary: impl Into<String>, detail: impl Into<String>) -> Self {
        Self {
            severity: Severity::Error,
            summary: summary.into(),
            detail: detail.into(),
            attribute: None,
        }
    }

    /// Creates a warning diagnostic.
    #[must_use]
    pub fn warning(summary: impl Into<String>, detail: impl Into<String>) -> Self {
        Self {
            severity: Severity::Warning,
            summary: summary.into(),
            detail: detail.into(),
            attribute: None,
        }
    }

    /// Scopes the diagnostic to a resource attribute.
    #[must_use]
    pub fn with_attribute(mut self, attribute: impl Into<String>) -> Self {
        self.attribute = Some(attribute.into());
        self
    }

    /// Converts an error into an error diagnostic.
    #[must_use]
    pub fn from_error(error: &AnsiblePlayError) -> Self {
        let summary = match error {
            AnsiblePlayError::Provider(_) => "Provider is not configured",
            AnsiblePlayError::Inventory(_) => "Unable to build inventory",
            AnsiblePlayError::Execution(ExecutionError::Cancelled) => "Playbook run cancelled",
            AnsiblePlayError::Execution(ExecutionError::TimedOut { .. }) => "Playbook run timed out",
            AnsiblePlayError::Execution(_) => "Error running playbook",
            AnsiblePlayError::Resource(_) => "Invalid resource attribute",
            AnsiblePlayError::State(_) => "State error",
            _ => "Unexpected error",
        };

        let diagnostic = Self::error(summary, error.to_string());
        match error.attribute() {
            Some(attribute) => diagnostic.with_attribute(attribute),
            None => diagnostic,
        }
    }

    /// Returns true for error severity.
    #[must_use]
    pub fn is_error(&self) -> bool {
        self.severity == Severity::Error
    }
}

impl Diagnostics {
    /// Creates an empty collection.
    #[must_use]
    pub const fn new() -> Self {
        Self(Vec::new())
    }

    /// Appends a diagnostic.
    pub fn push(&mut self, diagnostic: Diagnostic) {
        self.0.push(diagnostic);
    }

    /// Returns true if any diagnostic is an error.
    #[must_use]
    pub fn has_error(&self) -> bool {
        self.0.iter().any(Diagnostic::is_error)
    }

    /// Returns true if there are no diagnostics.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Returns the number of diagnostics.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Iterates over the diagnostics in order.
    pub fn iter(&self) -> std::slice::Iter<'_, Diagnostic> {
        self.0.iter()
    }
}

impl<'a> IntoIterator for &'a Diagnostics {
    type Item = &'a Diagnostic;
    type IntoIter = std::slice::Iter<'a, Diagnostic>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Error => write!(f, "error"),
            Self::Warning => write!(f, "warning"),
        }
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.severity, self.summary)?;
        if let Some(attribute) = &self.attribute {
            write!(f, " (attribute \"{attribute}\")")?;
        }
        if !self.detail.is_empty() {
            write!(f, "\n  {}", self.detail)?;
        }
        Ok(())
    }
}

impl fmt::Display for Diagnostics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, diagnostic) in self.0.iter().enumerate() {
            if i > 0 {
                writeln!(f)?;
            }
            write!(f, "{diagnostic}")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ResourceError;

    #[test]
    fn test_attribute_scoped_error() {
        let error = AnsiblePlayError::Resource(ResourceError::InvalidExtraVars {
            message: String::from("expected value at line 1 column 1"),
        });

        let diagnostic = Diagnostic::from_error(&error);

        assert!(diagnostic.is_error());
        assert_eq!(diagnostic.attribute.as_deref(), Some("extra_vars_json"));
        assert!(diagnostic.detail.contains("expected a valid json object"));
    }

    #[test]
    fn test_has_error() {
        let mut diagnostics = Diagnostics::new();
        diagnostics.push(Diagnostic::warning("Playbook missing", "site.yml"));
        assert!(!diagnostics.has_error());

        diagnostics.push(Diagnostic::from_error(&AnsiblePlayError::internal("boom")));
        assert!(diagnostics.has_error());
        assert_eq!(diagnostics.len(), 2);
    }

    #[test]
    fn test_display() {
        let diagnostic = Diagnostic::error("Error running playbook", "exit status: 2")
            .with_attribute("hosts");
        assert_eq!(
            diagnostic.to_string(),
            "error: Error running playbook (attribute \"hosts\")\n  exit status: 2"
        );
    }
}
