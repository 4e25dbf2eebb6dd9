//! Expression-language Runner adapter (SPEC_FULL §4.7): a thin, generalized Runner that
//! delegates evaluation to an injected [`ExpressionEngine`], so a format → jwt → expr chain
//! is constructible end to end without this crate providing its own scripting surface.

use crate::error::RunnerError;
use crate::message::Message;
use crate::runner::{Runner, StopSignal};
use serde_json::Value;
use std::collections::HashMap;
use std::time::{Duration, Instant};

const COMPONENT: &str = "expr_runner";

/// The environment an [`ExpressionEngine`] evaluates against: `metadata`, a string view of
/// `data`, and the full message for hook implementations that need direct access.
pub struct ExprEnv<'a> {
    pub metadata: &'a HashMap<String, String>,
    pub data: String,
}

/// Capability interface an external expression engine implements. This crate does not
/// provide one; it only adapts whatever is injected to the Runner contract.
pub trait ExpressionEngine: Send + Sync {
    fn eval(&self, env: &ExprEnv) -> anyhow::Result<Value>;
}

#[derive(Debug, Clone)]
pub struct ExprRunnerConfig {
    pub timeout: Duration,
    pub preserve_payload: bool,
}

/// Adapts an [`ExpressionEngine`] to the Runner contract, applying the `preservePayload`
/// wrapping rule from spec §6 verbatim: without it, the result replaces `data` directly;
/// with it, `data` becomes `{ "payload": <original data>, "result": <result> }`.
pub struct ExprRunner {
    engine: Box<dyn ExpressionEngine>,
    timeout: Duration,
    preserve_payload: bool,
    stop: StopSignal,
}

impl ExprRunner {
    pub fn new(config: ExprRunnerConfig, engine: Box<dyn ExpressionEngine>) -> Self {
        ExprRunner {
            engine,
            timeout: config.timeout,
            preserve_payload: config.preserve_payload,
            stop: StopSignal::new(),
        }
    }
}

impl Runner for ExprRunner {
    fn process(&self, msg: &mut Message) -> Result<(), RunnerError> {
        if self.stop.is_stopped() {
            return Err(RunnerError::stopped(COMPONENT));
        }
        let deadline = Instant::now() + self.timeout;
        let env = ExprEnv {
            metadata: &msg.metadata,
            data: String::from_utf8_lossy(&msg.data).into_owned(),
        };

        let result = self
            .engine
            .eval(&env)
            .map_err(|e| RunnerError::internal(COMPONENT, e.to_string()))?;

        if Instant::now() >= deadline {
            return Err(RunnerError::timeout(COMPONENT, "expression evaluation timeout"));
        }

        let payload = if self.preserve_payload {
            serde_json::json!({ "payload": env.data, "result": result })
        } else {
            result
        };
        msg.data = serde_json::to_vec(&payload)
            .map_err(|e| RunnerError::internal(COMPONENT, format!("json encode: {e}")))?;
        Ok(())
    }

    fn close(&self) -> Result<(), RunnerError> {
        self.stop.close();
        Ok(())
    }
}
