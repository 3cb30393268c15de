//! Error taxonomy and the diagnostic sink.

use parking_lot::Mutex;
use thiserror::Error;

use crate::universe::NodeHandle;

/// Errors raised by the renderer node store.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RenderError {
    #[error("unknown node entry type `{0}`")]
    UnknownNodeEntry(String),
    #[error("invalid node handle {0}")]
    InvalidHandle(NodeHandle),
    #[error("node `{node}` has no parameter `{param}`")]
    UnknownParameter { node: String, param: String },
    #[error("value does not fit the declared type of `{param}` on `{node}`")]
    TypeMismatch { node: String, param: String },
}

impl RenderError {
    pub fn kind(&self) -> DiagnosticKind {
        match self {
            RenderError::UnknownNodeEntry(_) | RenderError::InvalidHandle(_) => DiagnosticKind::MissingDependency,
            RenderError::UnknownParameter { .. } => DiagnosticKind::UnknownParameter,
            RenderError::TypeMismatch { .. } => DiagnosticKind::UnsupportedConversion,
        }
    }
}

/// Errors surfaced while translating a primitive or a material.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum TranslateError {
    #[error("material `{material}`: stale node `{node}` is still a terminal")]
    IdentityConflict { material: String, node: String },
    #[error("malformed samples on `{prim}`: {reason}")]
    MalformedSamples { prim: String, reason: String },
    #[error("`{prim}` references missing `{dependency}`")]
    MissingDependency { prim: String, dependency: String },
    #[error("unknown renderer node type `{0}`")]
    UnknownNodeType(String),
    #[error(transparent)]
    Render(#[from] RenderError),
}

impl TranslateError {
    pub fn kind(&self) -> DiagnosticKind {
        match self {
            TranslateError::IdentityConflict { .. } => DiagnosticKind::IdentityConflict,
            TranslateError::MalformedSamples { .. } => DiagnosticKind::MalformedSamples,
            TranslateError::MissingDependency { .. } => DiagnosticKind::MissingDependency,
            TranslateError::UnknownNodeType(_) => DiagnosticKind::MissingDependency,
            TranslateError::Render(_) => DiagnosticKind::MalformedSamples,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DiagnosticKind {
    /// A value could not be converted to the declared parameter type.
    UnsupportedConversion,
    /// A parameter or connection named something the renderer lacks.
    UnknownParameter,
    /// A user-data name collided with a built-in parameter.
    BuiltinCollision,
    MalformedSamples,
    MissingDependency,
    IdentityConflict,
}

impl DiagnosticKind {
    /// Skips log at debug, degradations at warn, identity conflicts at error.
    pub fn level(self) -> log::Level {
        match self {
            DiagnosticKind::UnsupportedConversion
            | DiagnosticKind::UnknownParameter
            | DiagnosticKind::BuiltinCollision => log::Level::Debug,
            DiagnosticKind::MalformedSamples | DiagnosticKind::MissingDependency => log::Level::Warn,
            DiagnosticKind::IdentityConflict => log::Level::Error,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostic {
    pub kind: DiagnosticKind,
    pub prim: String,
    pub message: String,
}

/// Collects diagnostics and mirrors each one into `log`.
#[derive(Debug, Default)]
pub struct Diagnostics {
    record: bool,
    entries: Mutex<Vec<Diagnostic>>,
}

impl Diagnostics {
    pub fn new(record: bool) -> Self {
        Self {
            record,
            entries: Mutex::new(Vec::new()),
        }
    }

    pub fn report(&self, kind: DiagnosticKind, prim: &str, message: impl Into<String>) {
        let message = message.into();
        log::log!(kind.level(), "{prim}: {message}");
        if self.record {
            self.entries.lock().push(Diagnostic {
                kind,
                prim: prim.to_string(),
                message,
            });
        }
    }

    pub fn report_error(&self, prim: &str, err: &TranslateError) {
        self.report(err.kind(), prim, err.to_string());
    }

    pub fn entries(&self) -> Vec<Diagnostic> {
        self.entries.lock().clone()
    }

    pub fn count(&self, kind: DiagnosticKind) -> usize {
        self.entries.lock().iter().filter(|d| d.kind == kind).count()
    }

    pub fn take(&self) -> Vec<Diagnostic> {
        std::mem::take(&mut *self.entries.lock())
    }
}
