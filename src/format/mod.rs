//! # Format Runner Module
//!
//! The Format Runner applies a validated, ordered list of [`FormatOperation`]s to a
//! message under a single overall deadline, stopping at the first error. The dispatch
//! table (operation type → [`OperationHandler`]) is the only polymorphic surface — no
//! inheritance, no handler-specific branching anywhere else, the same shape as
//! `brrtrouter`'s `middleware::Middleware` trait-object registry.

mod handlers;
mod operation;

pub use operation::{FormatOperation, InputSource, OutputTarget};

use crate::config::duration;
use crate::error::RunnerError;
use crate::message::Message;
use crate::runner::{Runner, StopSignal};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::time::{Duration, Instant};
use tracing::{debug, error, warn};

/// Per-operation execution context: the ambient deadline threaded through every handler so
/// a single slow operation (e.g. a template render) can bound itself against the remaining
/// budget rather than the full runner timeout.
pub struct ExecContext {
    pub deadline: Instant,
}

impl ExecContext {
    pub fn remaining(&self) -> Duration {
        self.deadline.saturating_duration_since(Instant::now())
    }

    pub fn expired(&self) -> bool {
        Instant::now() >= self.deadline
    }
}

/// Capability interface every operation implements: pure validation, then execution.
pub trait OperationHandler: Send + Sync {
    /// Operation type name this handler is registered under (e.g. `"template"`).
    fn name(&self) -> &'static str;
    /// Pure, side-effect-free check that `op` is well-formed for this handler.
    fn validate(&self, op: &FormatOperation) -> Result<(), RunnerError>;
    /// Apply the operation to `msg`.
    fn execute(&self, ctx: &ExecContext, msg: &mut Message, op: &FormatOperation) -> Result<(), RunnerError>;
}

/// Decode `op.options` into a handler-specific typed options structure. Shared by every
/// handler so option knowledge never leaks into the Format Runner itself (spec §9).
pub(crate) fn parse_options<T: DeserializeOwned>(
    component: &'static str,
    options: &Value,
) -> Result<T, RunnerError> {
    serde_json::from_value(options.clone())
        .map_err(|e| RunnerError::config_invalid(component, format!("invalid options: {e}")))
}

/// `FormatRunner` construction config (spec §6).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FormatRunnerConfig {
    pub operations: Vec<FormatOperation>,
    #[serde(default = "default_timeout", with = "duration")]
    pub timeout: Duration,
    #[serde(default)]
    pub verbose: bool,
}

fn default_timeout() -> Duration {
    Duration::from_secs(30)
}

const MAX_TIMEOUT: Duration = Duration::from_secs(300);

fn default_registry() -> HashMap<&'static str, Box<dyn OperationHandler>> {
    let all: Vec<Box<dyn OperationHandler>> = vec![
        Box::new(handlers::template::TemplateHandler),
        Box::new(handlers::serialize::SerializeHandler),
        Box::new(handlers::encode::EncodeHandler),
        Box::new(handlers::compress::CompressHandler),
        Box::new(handlers::multipart::MultipartHandler),
        Box::new(handlers::extract::ExtractHandler),
        Box::new(handlers::merge::MergeHandler),
        Box::new(handlers::split::SplitHandler),
    ];
    all.into_iter().map(|h| (h.name(), h)).collect()
}

/// Applies an ordered list of [`FormatOperation`]s to a message, subject to a total
/// deadline. Stops at the first error.
pub struct FormatRunner {
    operations: Vec<FormatOperation>,
    handlers: HashMap<&'static str, Box<dyn OperationHandler>>,
    timeout: Duration,
    verbose: bool,
    stop: StopSignal,
}

impl FormatRunner {
    /// Construct a Format Runner from validated configuration.
    ///
    /// Fails with a descriptive error naming the offending operation index when:
    /// `operations` is empty, an operation's `type` doesn't map to a known handler, or a
    /// handler's own `validate` rejects the operation.
    pub fn new(config: FormatRunnerConfig) -> Result<Self, RunnerError> {
        const COMPONENT: &str = "format_runner";

        if config.operations.is_empty() {
            return Err(RunnerError::config_invalid(
                COMPONENT,
                "operations must be non-empty",
            ));
        }
        if config.timeout.is_zero() || config.timeout > MAX_TIMEOUT {
            return Err(RunnerError::config_invalid(
                COMPONENT,
                format!(
                    "timeout must be in (0, {}s], got {:?}",
                    MAX_TIMEOUT.as_secs(),
                    config.timeout
                ),
            ));
        }

        let handlers = default_registry();
        for (idx, op) in config.operations.iter().enumerate() {
            let handler = handlers.get(op.op_type.as_str()).ok_or_else(|| {
                RunnerError::config_invalid(
                    COMPONENT,
                    format!("unknown operation type '{}'", op.op_type),
                )
                .with_index(idx)
            })?;
            handler
                .validate(op)
                .map_err(|e| RunnerError::config_invalid(COMPONENT, e.message).with_index(idx))?;
        }

        Ok(FormatRunner {
            operations: config.operations,
            handlers,
            timeout: config.timeout,
            verbose: config.verbose,
            stop: StopSignal::new(),
        })
    }
}

impl Runner for FormatRunner {
    fn process(&self, msg: &mut Message) -> Result<(), RunnerError> {
        const COMPONENT: &str = "format_runner";
        let deadline = Instant::now() + self.timeout;

        for (idx, op) in self.operations.iter().enumerate() {
            if Instant::now() >= deadline {
                error!(operation_index = idx, "format runner timeout");
                return Err(RunnerError::timeout(
                    COMPONENT,
                    format!("format runner timeout after operation {idx}"),
                ));
            }
            if self.stop.is_stopped() {
                warn!(operation_index = idx, "format runner stopped mid-chain");
                return Err(RunnerError::stopped(COMPONENT).with_index(idx));
            }

            // Handler presence was already proven at construction time.
            let handler = self
                .handlers
                .get(op.op_type.as_str())
                .expect("operation type validated at construction");

            if self.verbose {
                debug!(operation_index = idx, op_type = %op.op_type, "executing operation");
            }

            let ctx = ExecContext { deadline };
            handler.execute(&ctx, msg, op).map_err(|e| {
                RunnerError::new(
                    e.kind,
                    COMPONENT,
                    format!("operation {idx} ({}) failed: {}", op.op_type, e.message),
                )
                .with_index(idx)
            })?;
        }
        Ok(())
    }

    fn close(&self) -> Result<(), RunnerError> {
        self.stop.close();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn op(op_type: &str, options: Value) -> FormatOperation {
        FormatOperation {
            op_type: op_type.to_string(),
            input: InputSource::Data,
            output: OutputTarget::Data,
            options,
        }
    }

    #[test]
    fn construction_rejects_empty_operations() {
        let cfg = FormatRunnerConfig {
            operations: vec![],
            timeout: Duration::from_secs(1),
            verbose: false,
        };
        assert!(FormatRunner::new(cfg).is_err());
    }

    #[test]
    fn construction_rejects_unknown_operation_type() {
        let cfg = FormatRunnerConfig {
            operations: vec![op("not-a-real-type", json!({}))],
            timeout: Duration::from_secs(1),
            verbose: false,
        };
        match FormatRunner::new(cfg) {
            Err(e) => assert_eq!(e.index, Some(0)),
            Ok(_) => panic!("expected construction to fail"),
        }
    }

    #[test]
    fn process_runs_within_timeout_budget() {
        let cfg = FormatRunnerConfig {
            operations: vec![op(
                "encode",
                json!({"encoding": "base64", "operation": "encode"}),
            )],
            timeout: Duration::from_secs(5),
            verbose: false,
        };
        let runner = FormatRunner::new(cfg).unwrap();
        let mut msg = Message::new(b"1".to_vec()).with_data(b"hello".to_vec());
        runner.process(&mut msg).unwrap();
        assert_eq!(msg.data, b"aGVsbG8=".to_vec());
    }

    #[test]
    fn close_then_process_fails_stopped() {
        let cfg = FormatRunnerConfig {
            operations: vec![op(
                "encode",
                json!({"encoding": "base64", "operation": "encode"}),
            )],
            timeout: Duration::from_secs(5),
            verbose: false,
        };
        let runner = FormatRunner::new(cfg).unwrap();
        runner.close().unwrap();
        runner.close().unwrap(); // idempotent
        let mut msg = Message::new(b"1".to_vec()).with_data(b"hello".to_vec());
        let err = runner.process(&mut msg).unwrap_err();
        assert_eq!(err.kind, crate::error::ErrorKind::Stopped);
    }
}
