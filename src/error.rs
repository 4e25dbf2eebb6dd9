//! Error taxonomy shared by the Format Runner and the JWT stack.
//!
//! Mirrors `brrtrouter`'s `middleware::cors::CorsConfigError`'s hand-written `Display`/
//! `Error` pattern rather than pulling in `thiserror`: callers that need to match on a kind
//! get a plain enum, and everything else travels as `anyhow::Error`.

use std::fmt;

/// Abstract error kind from the taxonomy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Construction-time: unknown operation type, missing required option, option out of range.
    ConfigInvalid,
    /// Per-operation `Validate` step failed.
    ValidationFailed,
    /// Required input source not present (e.g. filesystem requested but not attached).
    InputUnavailable,
    /// Serialization/encoding/decompression failed on malformed input.
    ParseFailed,
    /// Overall runner deadline, per-operation deadline, or JWKS fetch exceeded.
    Timeout,
    /// The runner was closed.
    Stopped,
    /// Token absent, malformed, expired, wrong issuer/audience, unknown kid, disallowed
    /// algorithm, or missing required claim.
    AuthFailed,
    /// Unexpected failure (e.g. a marshaller failed on its own output).
    Internal,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ErrorKind::ConfigInvalid => "config invalid",
            ErrorKind::ValidationFailed => "validation failed",
            ErrorKind::InputUnavailable => "input unavailable",
            ErrorKind::ParseFailed => "parse failed",
            ErrorKind::Timeout => "timeout",
            ErrorKind::Stopped => "stopped",
            ErrorKind::AuthFailed => "auth failed",
            ErrorKind::Internal => "internal",
        };
        f.write_str(s)
    }
}

/// A structured runner error: kind, the offending component, an optional operation index,
/// and a human-readable cause. `Display` renders exactly the triple the spec requires —
/// component, index, and underlying cause — with no stack trace leaking across the boundary.
#[derive(Debug)]
pub struct RunnerError {
    pub kind: ErrorKind,
    pub component: &'static str,
    pub index: Option<usize>,
    pub message: String,
    source: Option<Box<dyn std::error::Error + Send + Sync + 'static>>,
}

impl RunnerError {
    pub fn new(kind: ErrorKind, component: &'static str, message: impl Into<String>) -> Self {
        RunnerError {
            kind,
            component,
            index: None,
            message: message.into(),
            source: None,
        }
    }

    pub fn with_index(mut self, index: usize) -> Self {
        self.index = Some(index);
        self
    }

    pub fn with_source(
        mut self,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        self.source = Some(Box::new(source));
        self
    }

    pub fn config_invalid(component: &'static str, message: impl Into<String>) -> Self {
        Self::new(ErrorKind::ConfigInvalid, component, message)
    }

    pub fn validation_failed(component: &'static str, message: impl Into<String>) -> Self {
        Self::new(ErrorKind::ValidationFailed, component, message)
    }

    pub fn input_unavailable(component: &'static str, message: impl Into<String>) -> Self {
        Self::new(ErrorKind::InputUnavailable, component, message)
    }

    pub fn parse_failed(component: &'static str, message: impl Into<String>) -> Self {
        Self::new(ErrorKind::ParseFailed, component, message)
    }

    pub fn timeout(component: &'static str, message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Timeout, component, message)
    }

    pub fn stopped(component: &'static str) -> Self {
        Self::new(ErrorKind::Stopped, component, format!("{component} stopped"))
    }

    pub fn auth_failed(component: &'static str, message: impl Into<String>) -> Self {
        Self::new(ErrorKind::AuthFailed, component, message)
    }

    pub fn internal(component: &'static str, message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Internal, component, message)
    }
}

impl fmt::Display for RunnerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.index {
            Some(idx) => write!(
                f,
                "{} [{}] operation {}: {}",
                self.component, self.kind, idx, self.message
            ),
            None => write!(f, "{} [{}]: {}", self.component, self.kind, self.message),
        }
    }
}

impl std::error::Error for RunnerError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.source.as_deref().map(|e| e as _)
    }
}
