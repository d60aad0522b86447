//! Diagnostics - User-facing validation results
//!
//! Validation never stops at the first problem. Each check appends a
//! [`Diagnostic`] to a [`Diagnostics`] collection and the caller decides what
//! to do once every check has run.

use std::fmt;

/// Severity of a diagnostic
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Error,
    Warning,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Severity::Error => write!(f, "Error"),
            Severity::Warning => write!(f, "Warning"),
        }
    }
}

/// Path to an attribute inside a configuration block (e.g., `assume_role.role_arn`)
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AttributePath(Vec<String>);

impl AttributePath {
    /// The empty path, referring to the whole configuration body
    pub fn root() -> Self {
        Self(Vec::new())
    }

    /// Path to a top-level attribute
    pub fn attr(name: impl Into<String>) -> Self {
        Self(vec![name.into()])
    }

    /// Extend the path with a nested attribute name
    pub fn child(&self, name: impl Into<String>) -> Self {
        let mut steps = self.0.clone();
        steps.push(name.into());
        Self(steps)
    }

    pub fn is_root(&self) -> bool {
        self.0.is_empty()
    }

    pub fn steps(&self) -> &[String] {
        &self.0
    }
}

impl fmt::Display for AttributePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.join("."))
    }
}

/// A single validation result
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostic {
    pub severity: Severity,
    pub summary: String,
    pub detail: String,
    /// Attribute the diagnostic refers to; `None` for sourceless diagnostics
    pub path: Option<AttributePath>,
}

impl Diagnostic {
    /// Error that is not attached to any attribute
    pub fn error(summary: impl Into<String>, detail: impl Into<String>) -> Self {
        Self {
            severity: Severity::Error,
            summary: summary.into(),
            detail: detail.into(),
            path: None,
        }
    }

    /// Warning that is not attached to any attribute
    pub fn warning(summary: impl Into<String>, detail: impl Into<String>) -> Self {
        Self {
            severity: Severity::Warning,
            ..Self::error(summary, detail)
        }
    }

    pub fn attribute_error(
        path: AttributePath,
        summary: impl Into<String>,
        detail: impl Into<String>,
    ) -> Self {
        Self::error(summary, detail).with_path(path)
    }

    pub fn attribute_warning(
        path: AttributePath,
        summary: impl Into<String>,
        detail: impl Into<String>,
    ) -> Self {
        Self::warning(summary, detail).with_path(path)
    }

    pub fn with_path(mut self, path: AttributePath) -> Self {
        self.path = Some(path);
        self
    }

    pub fn is_error(&self) -> bool {
        self.severity == Severity::Error
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.severity, self.summary)?;
        match &self.path {
            Some(path) if !path.is_root() => write!(f, "\n  on {}: ", path)?,
            _ => write!(f, "\n  ")?,
        }
        write!(f, "{}", self.detail.replace('\n', "\n  "))
    }
}

/// Ordered collection of diagnostics
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Diagnostics(Vec<Diagnostic>);

impl Diagnostics {
    pub fn new() -> Self {
        Self(Vec::new())
    }

    pub fn push(&mut self, diagnostic: Diagnostic) {
        self.0.push(diagnostic);
    }

    pub fn extend(&mut self, other: Diagnostics) {
        self.0.extend(other.0);
    }

    pub fn has_errors(&self) -> bool {
        self.0.iter().any(Diagnostic::is_error)
    }

    pub fn errors(&self) -> impl Iterator<Item = &Diagnostic> {
        self.0.iter().filter(|d| d.severity == Severity::Error)
    }

    pub fn warnings(&self) -> impl Iterator<Item = &Diagnostic> {
        self.0.iter().filter(|d| d.severity == Severity::Warning)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Diagnostic> {
        self.0.iter()
    }

    /// Find the first diagnostic with the given summary
    pub fn find(&self, summary: &str) -> Option<&Diagnostic> {
        self.0.iter().find(|d| d.summary == summary)
    }
}

impl From<Diagnostic> for Diagnostics {
    fn from(diagnostic: Diagnostic) -> Self {
        Self(vec![diagnostic])
    }
}

impl FromIterator<Diagnostic> for Diagnostics {
    fn from_iter<I: IntoIterator<Item = Diagnostic>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl IntoIterator for Diagnostics {
    type Item = Diagnostic;
    type IntoIter = std::vec::IntoIter<Diagnostic>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

impl<'a> IntoIterator for &'a Diagnostics {
    type Item = &'a Diagnostic;
    type IntoIter = std::slice::Iter<'a, Diagnostic>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

impl fmt::Display for Diagnostics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, diagnostic) in self.0.iter().enumerate() {
            if i > 0 {
                writeln!(f)?;
            }
            write!(f, "{}", diagnostic)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn attribute_path_display() {
        let path = AttributePath::attr("assume_role").child("role_arn");
        assert_eq!(path.to_string(), "assume_role.role_arn");
        assert!(AttributePath::root().is_root());
    }

    #[test]
    fn has_errors_ignores_warnings() {
        let mut diags = Diagnostics::new();
        diags.push(Diagnostic::warning("Deprecated Parameter", "use x"));
        assert!(!diags.has_errors());

        diags.push(Diagnostic::attribute_error(
            AttributePath::attr("bucket"),
            "Invalid bucket value",
            "must not be empty",
        ));
        assert!(diags.has_errors());
        assert_eq!(diags.errors().count(), 1);
        assert_eq!(diags.warnings().count(), 1);
    }

    #[test]
    fn diagnostic_display() {
        let diag = Diagnostic::attribute_error(
            AttributePath::attr("key"),
            "Invalid key value",
            "must not be empty",
        );
        assert_eq!(
            diag.to_string(),
            "Error: Invalid key value\n  on key: must not be empty"
        );

        let diag = Diagnostic::warning("Deprecated Parameters", "line one\nline two");
        assert_eq!(
            diag.to_string(),
            "Warning: Deprecated Parameters\n  line one\n  line two"
        );
    }
}
