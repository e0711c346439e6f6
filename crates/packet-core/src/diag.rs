//! Diagnostic collaborator and the default sinks.

use crate::fault::{DiagnosticClass, DiagnosticKind};

/// One soft condition reported while building or decoding.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub struct Diagnostic {
    /// What happened.
    pub kind: DiagnosticKind,
    /// Human-readable detail.
    pub message: String,
}

impl Diagnostic {
    /// Creates a diagnostic record.
    #[must_use]
    pub fn new(kind: DiagnosticKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

/// Receives every non-fatal condition.
pub trait DiagnosticSink {
    /// Records a diagnostic.
    fn log(&mut self, diagnostic: Diagnostic);
}

/// Forwards diagnostics to `tracing` at warn level.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingDiagnostics;

impl DiagnosticSink for TracingDiagnostics {
    fn log(&mut self, diagnostic: Diagnostic) {
        tracing::warn!(
            kind = diagnostic.kind.label(),
            "{}",
            diagnostic.message
        );
    }
}

/// Saturating per-class counters plus the full record list.
///
/// Records are also forwarded to `tracing` so that a collecting sink never
/// hides conditions from the log.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DiagnosticCounters {
    /// Every record in arrival order.
    pub records: Vec<Diagnostic>,
    /// Last kind seen, if any.
    pub last_kind: Option<DiagnosticKind>,
    /// Reference-class count.
    pub reference_count: u16,
    /// Opcode-class count.
    pub opcode_count: u16,
    /// Message-class count.
    pub message_count: u16,
    /// Shader-class count.
    pub shader_count: u16,
}

impl DiagnosticCounters {
    /// Creates an empty collector.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of records of `kind`.
    #[must_use]
    pub fn count(&self, kind: DiagnosticKind) -> usize {
        self.records.iter().filter(|d| d.kind == kind).count()
    }

    /// Returns true when nothing was logged.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Resets all counters and records.
    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

impl DiagnosticSink for DiagnosticCounters {
    fn log(&mut self, diagnostic: Diagnostic) {
        let counter = match diagnostic.kind.class() {
            DiagnosticClass::Reference => &mut self.reference_count,
            DiagnosticClass::Opcode => &mut self.opcode_count,
            DiagnosticClass::Message => &mut self.message_count,
            DiagnosticClass::Shader => &mut self.shader_count,
        };
        *counter = counter.saturating_add(1);
        self.last_kind = Some(diagnostic.kind);
        TracingDiagnostics.log(diagnostic.clone());
        self.records.push(diagnostic);
    }
}
