//! Bounded buffer of engine diagnostics.
//!
//! Recoverable problems (missing targets, malformed objects, caller errors,
//! storage failures) never interrupt an editing session. They are emitted
//! through the `log` facade and kept in a ring buffer so a status bar or a
//! test can inspect what went wrong.

use std::collections::VecDeque;
use std::fmt;
use std::time::Instant;

/// Default number of diagnostics kept before the oldest is dropped.
pub const DEFAULT_DIAGNOSTICS_CAPACITY: usize = 256;

/// Category of a recorded diagnostic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DiagnosticKind {
    /// A serialized object or script entry had the wrong shape.
    MalformedInput,
    /// An operation referenced a layer or object that no longer exists.
    MissingTarget,
    /// Snapshot storage failed.
    StorageFailure,
    /// The model or scene graph violated a structural invariant and was healed.
    InvariantViolation,
    /// The engine API was used incorrectly (e.g. commit with no transaction).
    CallerError,
}

impl fmt::Display for DiagnosticKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::MalformedInput => "malformed input",
            Self::MissingTarget => "missing target",
            Self::StorageFailure => "storage failure",
            Self::InvariantViolation => "invariant violation",
            Self::CallerError => "caller error",
        };
        f.write_str(name)
    }
}

/// A single captured diagnostic.
#[derive(Debug, Clone)]
pub struct Diagnostic {
    pub level: log::Level,
    pub kind: DiagnosticKind,
    pub message: String,
    pub timestamp: Instant,
}

/// Ring buffer of diagnostics.
#[derive(Debug)]
pub struct Diagnostics {
    entries: VecDeque<Diagnostic>,
    capacity: usize,
}

impl Diagnostics {
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: VecDeque::with_capacity(capacity.min(1024)),
            capacity: capacity.max(1),
        }
    }

    /// Logs the diagnostic and stores it, evicting the oldest entry when full.
    pub fn record(&mut self, level: log::Level, kind: DiagnosticKind, message: impl Into<String>) {
        let message = message.into();
        log::log!(level, "{kind}: {message}");

        if self.entries.len() >= self.capacity {
            self.entries.pop_front();
        }
        self.entries.push_back(Diagnostic {
            level,
            kind,
            message,
            timestamp: Instant::now(),
        });
    }

    /// Shorthand for a [`log::Level::Warn`] diagnostic.
    pub fn warn(&mut self, kind: DiagnosticKind, message: impl Into<String>) {
        self.record(log::Level::Warn, kind, message);
    }

    pub fn entries(&self) -> &VecDeque<Diagnostic> {
        &self.entries
    }

    /// Returns the most recent diagnostic, if any.
    pub fn last(&self) -> Option<&Diagnostic> {
        self.entries.back()
    }

    /// Counts diagnostics of the given kind currently in the buffer.
    pub fn count(&self, kind: DiagnosticKind) -> usize {
        self.entries.iter().filter(|d| d.kind == kind).count()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

impl Default for Diagnostics {
    fn default() -> Self {
        Self::new(DEFAULT_DIAGNOSTICS_CAPACITY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn record_and_count() {
        let mut diagnostics = Diagnostics::default();
        diagnostics.warn(DiagnosticKind::MissingTarget, "layer gone");
        diagnostics.warn(DiagnosticKind::CallerError, "no transaction");
        diagnostics.warn(DiagnosticKind::MissingTarget, "object gone");

        assert_eq!(diagnostics.len(), 3);
        assert_eq!(diagnostics.count(DiagnosticKind::MissingTarget), 2);
        assert_eq!(diagnostics.last().unwrap().message, "object gone");
    }

    #[test]
    fn capacity_evicts_oldest() {
        let mut diagnostics = Diagnostics::new(2);
        diagnostics.warn(DiagnosticKind::MalformedInput, "first");
        diagnostics.warn(DiagnosticKind::MalformedInput, "second");
        diagnostics.warn(DiagnosticKind::MalformedInput, "third");

        let messages: Vec<_> = diagnostics.entries().iter().map(|d| d.message.as_str()).collect();
        assert_eq!(messages, vec!["second", "third"]);
    }

    #[test]
    fn zero_capacity_keeps_one() {
        let mut diagnostics = Diagnostics::new(0);
        diagnostics.warn(DiagnosticKind::StorageFailure, "quota");
        assert_eq!(diagnostics.len(), 1);
    }

    #[test]
    fn kind_display() {
        assert_eq!(DiagnosticKind::InvariantViolation.to_string(), "invariant violation");
    }
}
