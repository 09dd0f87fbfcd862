use serde::Serialize;
use std::fmt;

use crate::model::{BindingKey, Location, TypeRef};

/// Category of a reported problem
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DiagnosticKind {
    /// A declaration violates structural rules
    InvalidSpecification,
    /// A needed binding key has no provider, link or synthesis path
    IncompleteSpecification,
    /// Two non-partial sources claim the same key
    DuplicateBinding,
    /// More than one eligible constructor for a synthesized type
    AmbiguousConstructor,
    /// No eligible constructor for a synthesized type
    NoEligibleConstructor,
    /// A construction cycle between bindings
    CyclicDependency,
    /// A cache would outlive the object that owns it
    ScopeViolation,
    /// The resolver broke one of its own invariants
    InternalError,
}

impl DiagnosticKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            DiagnosticKind::InvalidSpecification => "invalid-specification",
            DiagnosticKind::IncompleteSpecification => "incomplete-specification",
            DiagnosticKind::DuplicateBinding => "duplicate-binding",
            DiagnosticKind::AmbiguousConstructor => "ambiguous-constructor",
            DiagnosticKind::NoEligibleConstructor => "no-eligible-constructor",
            DiagnosticKind::CyclicDependency => "cyclic-dependency",
            DiagnosticKind::ScopeViolation => "scope-violation",
            DiagnosticKind::InternalError => "internal-error",
        }
    }

    /// Fatal kinds abort the pass for the injector
    pub fn is_fatal(&self) -> bool {
        matches!(self, DiagnosticKind::InternalError)
    }
}

impl fmt::Display for DiagnosticKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Error,
    Warning,
}

/// One reported problem
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Diagnostic {
    pub kind: DiagnosticKind,
    pub severity: Severity,
    pub message: String,
    /// Opaque location token copied from the input record
    pub location: Option<Location>,
    /// Injector whose pass reported this, if any
    pub injector: Option<TypeRef>,
    /// Binding key the problem is about, if any
    pub key: Option<BindingKey>,
}

impl Diagnostic {
    /// Create an error diagnostic
    pub fn error(kind: DiagnosticKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            severity: Severity::Error,
            message: message.into(),
            location: None,
            injector: None,
            key: None,
        }
    }

    /// Create a warning diagnostic
    pub fn warning(kind: DiagnosticKind, message: impl Into<String>) -> Self {
        Self {
            severity: Severity::Warning,
            ..Self::error(kind, message)
        }
    }

    pub fn at(mut self, location: Option<&Location>) -> Self {
        self.location = location.cloned();
        self
    }

    pub fn in_injector(mut self, injector: &TypeRef) -> Self {
        self.injector = Some(injector.clone());
        self
    }

    pub fn about(mut self, key: &BindingKey) -> Self {
        self.key = Some(key.clone());
        self
    }

    pub fn is_error(&self) -> bool {
        self.severity == Severity::Error
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let severity = match self.severity {
            Severity::Error => "error",
            Severity::Warning => "warning",
        };
        write!(f, "{}[{}]: {}", severity, self.kind, self.message)?;
        if let Some(location) = &self.location {
            write!(f, " (at {})", location)?;
        }
        Ok(())
    }
}

/// Aggregated diagnostics of a pass
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct Diagnostics {
    entries: Vec<Diagnostic>,
}

impl Diagnostics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, diagnostic: Diagnostic) {
        self.entries.push(diagnostic);
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Diagnostic> {
        self.entries.iter()
    }

    /// Check if any diagnostic blocks emission
    pub fn has_errors(&self) -> bool {
        self.entries.iter().any(Diagnostic::is_error)
    }

    /// Check if any diagnostic aborts the pass
    pub fn has_fatal(&self) -> bool {
        self.entries.iter().any(|d| d.kind.is_fatal())
    }

    pub fn errors(&self) -> impl Iterator<Item = &Diagnostic> {
        self.entries.iter().filter(|d| d.is_error())
    }

    pub fn warnings(&self) -> impl Iterator<Item = &Diagnostic> {
        self.entries.iter().filter(|d| !d.is_error())
    }

    pub fn of_kind(&self, kind: DiagnosticKind) -> impl Iterator<Item = &Diagnostic> {
        self.entries.iter().filter(move |d| d.kind == kind)
    }

    pub fn count_of(&self, kind: DiagnosticKind) -> usize {
        self.of_kind(kind).count()
    }

    /// Check if some diagnostic of `kind` is about `key`
    pub fn mentions(&self, kind: DiagnosticKind, key: &BindingKey) -> bool {
        self.of_kind(kind).any(|d| d.key.as_ref() == Some(key))
    }

    /// Attribute every unattributed diagnostic to `injector`
    pub fn attribute_to(&mut self, injector: &TypeRef) {
        for diagnostic in &mut self.entries {
            if diagnostic.injector.is_none() {
                diagnostic.injector = Some(injector.clone());
            }
        }
    }

    /// Sort by severity, kind and message for stable reports
    pub fn sort(&mut self) {
        self.entries.sort_by(|a, b| {
            (a.severity, a.kind, &a.message).cmp(&(b.severity, b.kind, &b.message))
        });
    }

    pub fn into_vec(self) -> Vec<Diagnostic> {
        self.entries
    }
}

impl Extend<Diagnostic> for Diagnostics {
    fn extend<I: IntoIterator<Item = Diagnostic>>(&mut self, iter: I) {
        self.entries.extend(iter);
    }
}

impl FromIterator<Diagnostic> for Diagnostics {
    fn from_iter<I: IntoIterator<Item = Diagnostic>>(iter: I) -> Self {
        Self {
            entries: iter.into_iter().collect(),
        }
    }
}

impl IntoIterator for Diagnostics {
    type Item = Diagnostic;
    type IntoIter = std::vec::IntoIter<Diagnostic>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.into_iter()
    }
}

impl<'a> IntoIterator for &'a Diagnostics {
    type Item = &'a Diagnostic;
    type IntoIter = std::slice::Iter<'a, Diagnostic>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.iter()
    }
}

impl fmt::Display for Diagnostics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, diagnostic) in self.entries.iter().enumerate() {
            writeln!(f, "  {}. {}", i + 1, diagnostic)?;
        }
        Ok(())
    }
}
