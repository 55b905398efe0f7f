//! Conversion diagnostics and statistics
//!
//! Every stage of a conversion run records what it found into a single
//! [`ConversionReport`] instead of returning early, so callers can render a
//! complete summary even for partially malformed input.

use serde::{Deserialize, Serialize};
use std::fmt;

/// How severe a diagnostic is
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    /// Aborts the current document, no output is written
    Fatal,
    /// A single malformed record that was skipped
    Parse,
    /// Recorded, conversion proceeds
    Warning,
    /// One mesh asset failed to decode and was replaced by a placeholder
    AssetDecode,
    /// Recorded for the user; strict mode leaves it alone
    Notice,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Severity::Fatal => "error",
            Severity::Parse => "parse error",
            Severity::Warning => "warning",
            Severity::AssetDecode => "asset error",
            Severity::Notice => "note",
        };
        f.write_str(label)
    }
}

/// A single finding, optionally tied to a 1-based source line
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Diagnostic {
    pub severity: Severity,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub line: Option<usize>,
    pub message: String,
}

impl Diagnostic {
    pub fn fatal(message: impl Into<String>) -> Self {
        Self {
            severity: Severity::Fatal,
            line: None,
            message: message.into(),
        }
    }

    pub fn parse(line: usize, message: impl Into<String>) -> Self {
        Self {
            severity: Severity::Parse,
            line: Some(line),
            message: message.into(),
        }
    }

    pub fn warning(message: impl Into<String>) -> Self {
        Self {
            severity: Severity::Warning,
            line: None,
            message: message.into(),
        }
    }

    pub fn warning_at(line: usize, message: impl Into<String>) -> Self {
        Self {
            severity: Severity::Warning,
            line: Some(line),
            message: message.into(),
        }
    }

    pub fn notice_at(line: usize, message: impl Into<String>) -> Self {
        Self {
            severity: Severity::Notice,
            line: Some(line),
            message: message.into(),
        }
    }

    pub fn asset(message: impl Into<String>) -> Self {
        Self {
            severity: Severity::AssetDecode,
            line: None,
            message: message.into(),
        }
    }

    /// Attach a source line if the diagnostic does not carry one yet
    pub fn with_line(mut self, line: usize) -> Self {
        self.line.get_or_insert(line);
        self
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.line {
            Some(line) => write!(f, "{} (line {}): {}", self.severity, line, self.message),
            None => write!(f, "{}: {}", self.severity, self.message),
        }
    }
}

/// Counts of emitted entities
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Statistics {
    pub nodes: usize,
    pub beams: usize,
    pub hydros: usize,
    pub wheels: usize,
    pub flexbodies: usize,
    pub props: usize,
    pub triangles: usize,
    pub visual_triangles: usize,
    pub rails: usize,
    pub slidenodes: usize,
    pub groups: usize,
    pub renamed_meshes: usize,
    pub total_mass: f64,
}

/// Everything a conversion run has to say about one document
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConversionReport {
    /// Input this report belongs to (file name or caller-provided label)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    pub diagnostics: Vec<Diagnostic>,
    pub statistics: Statistics,
}

impl ConversionReport {
    pub fn new(source: Option<String>) -> Self {
        Self {
            source,
            ..Default::default()
        }
    }

    pub fn push(&mut self, diagnostic: Diagnostic) {
        self.diagnostics.push(diagnostic);
    }

    pub fn fatal(&mut self, message: impl Into<String>) {
        self.push(Diagnostic::fatal(message));
    }

    pub fn parse_error(&mut self, line: usize, message: impl Into<String>) {
        self.push(Diagnostic::parse(line, message));
    }

    pub fn warn(&mut self, message: impl Into<String>) {
        self.push(Diagnostic::warning(message));
    }

    pub fn warn_at(&mut self, line: usize, message: impl Into<String>) {
        self.push(Diagnostic::warning_at(line, message));
    }

    pub fn count(&self, severity: Severity) -> usize {
        self.diagnostics
            .iter()
            .filter(|d| d.severity == severity)
            .count()
    }

    pub fn has_fatal(&self) -> bool {
        self.diagnostics
            .iter()
            .any(|d| d.severity == Severity::Fatal)
    }

    /// Diagnostics of one severity, in the order they were recorded
    pub fn of(&self, severity: Severity) -> impl Iterator<Item = &Diagnostic> {
        self.diagnostics
            .iter()
            .filter(move |d| d.severity == severity)
    }

    /// Strict mode: every warning becomes fatal
    pub fn promote_warnings(&mut self) {
        for diagnostic in &mut self.diagnostics {
            if diagnostic.severity == Severity::Warning {
                diagnostic.severity = Severity::Fatal;
            }
        }
    }

    pub fn extend(&mut self, diagnostics: impl IntoIterator<Item = Diagnostic>) {
        self.diagnostics.extend(diagnostics);
    }

    /// One-line summary suitable for log output
    pub fn summary(&self) -> String {
        format!(
            "{} nodes, {} beams, {} errors, {} parse errors, {} warnings, {} asset errors, {} notes",
            self.statistics.nodes,
            self.statistics.beams,
            self.count(Severity::Fatal),
            self.count(Severity::Parse),
            self.count(Severity::Warning),
            self.count(Severity::AssetDecode),
            self.count(Severity::Notice),
        )
    }
}
