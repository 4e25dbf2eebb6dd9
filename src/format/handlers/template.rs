//! Template handler (spec §4.3.1): render `template`/`templateFile` against `metadata`
//! and `data`, using `minijinja` the same way `brrtrouter`'s `static_files::StaticFiles`
//! renders `.html` files — autoescape explicitly disabled either way (spec §9.1 Open
//! Question 2).

use crate::config::duration;
use crate::error::RunnerError;
use crate::format::{parse_options, ExecContext, FormatOperation, OperationHandler};
use crate::message::Message;
use serde::{Deserialize, Serialize};
use std::sync::mpsc;
use std::time::Duration;

const COMPONENT: &str = "format.template";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Engine {
    Text,
    Html,
}

impl Default for Engine {
    fn default() -> Self {
        Engine::Text
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct TemplateOptions {
    #[serde(default)]
    pub engine: Engine,
    #[serde(default)]
    pub template: Option<String>,
    #[serde(default, rename = "templateFile")]
    pub template_file: Option<String>,
    #[serde(default = "default_max_template_size", rename = "maxTemplateSize")]
    pub max_template_size: usize,
    #[serde(default = "default_timeout", with = "duration")]
    pub timeout: Duration,
}

fn default_max_template_size() -> usize {
    100_000
}

fn default_timeout() -> Duration {
    Duration::from_secs(5)
}

pub struct TemplateHandler;

impl TemplateHandler {
    fn load_source(opts: &TemplateOptions, msg: &Message) -> Result<String, RunnerError> {
        match (&opts.template, &opts.template_file) {
            (Some(t), None) => Ok(t.clone()),
            (None, Some(path)) => {
                let fs = msg.filesystem().ok_or_else(|| {
                    RunnerError::input_unavailable(
                        COMPONENT,
                        "templateFile set but no filesystem attached to message",
                    )
                })?;
                let bytes = fs
                    .read(path)
                    .map_err(|e| RunnerError::input_unavailable(COMPONENT, e.to_string()))?;
                String::from_utf8(bytes)
                    .map_err(|e| RunnerError::parse_failed(COMPONENT, e.to_string()))
            }
            _ => Err(RunnerError::config_invalid(
                COMPONENT,
                "exactly one of template/templateFile must be set",
            )),
        }
    }
}

impl OperationHandler for TemplateHandler {
    fn name(&self) -> &'static str {
        "template"
    }

    fn validate(&self, op: &FormatOperation) -> Result<(), RunnerError> {
        let opts: TemplateOptions = parse_options(COMPONENT, &op.options)?;
        if opts.template.is_some() == opts.template_file.is_some() {
            return Err(RunnerError::validation_failed(
                COMPONENT,
                "exactly one of template/templateFile must be set",
            ));
        }
        if let Some(t) = &opts.template {
            if t.len() > opts.max_template_size {
                return Err(RunnerError::validation_failed(
                    COMPONENT,
                    format!(
                        "template length {} exceeds maxTemplateSize {}",
                        t.len(),
                        opts.max_template_size
                    ),
                ));
            }
        }
        Ok(())
    }

    fn execute(&self, ctx: &ExecContext, msg: &mut Message, op: &FormatOperation) -> Result<(), RunnerError> {
        let opts: TemplateOptions = parse_options(COMPONENT, &op.options)?;
        tracing::trace!(engine = ?opts.engine, "template: rendering, both engines are text-equivalent");
        let source = Self::load_source(&opts, msg)?;
        if source.len() > opts.max_template_size {
            return Err(RunnerError::validation_failed(
                COMPONENT,
                format!(
                    "template length {} exceeds maxTemplateSize {}",
                    source.len(),
                    opts.max_template_size
                ),
            ));
        }

        let data_view = String::from_utf8_lossy(&msg.data).into_owned();
        let metadata = msg.metadata.clone();
        let ctx_value = serde_json::json!({ "metadata": metadata, "data": data_view });

        // Budget against the smaller of the operation's own timeout and the remaining
        // ambient deadline; run on a worker thread so it can be abandoned at the deadline.
        let budget = opts.timeout.min(ctx.remaining());

        let (tx, rx) = mpsc::channel();
        std::thread::spawn(move || {
            let mut env = minijinja::Environment::new();
            // engine=html would normally autoescape; spec decided text-equivalent rendering
            // for both engines, so autoescape stays off regardless of `engine`.
            env.set_auto_escape_callback(|_| minijinja::AutoEscape::None);
            let rendered = env
                .render_str(&source, &ctx_value)
                .map_err(|e| e.to_string());
            let _ = tx.send(rendered);
        });

        match rx.recv_timeout(budget) {
            Ok(Ok(rendered)) => {
                msg.data = rendered.into_bytes();
                Ok(())
            }
            Ok(Err(e)) => Err(RunnerError::parse_failed(COMPONENT, e)),
            Err(_) => Err(RunnerError::timeout(COMPONENT, "template execution timeout")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::format::{InputSource, OutputTarget};
    use serde_json::json;

    fn op(options: serde_json::Value) -> FormatOperation {
        FormatOperation {
            op_type: "template".into(),
            input: InputSource::Data,
            output: OutputTarget::Data,
            options,
        }
    }

    fn ctx() -> ExecContext {
        ExecContext {
            deadline: std::time::Instant::now() + Duration::from_secs(5),
        }
    }

    #[test]
    fn renders_metadata_into_payload() {
        let handler = TemplateHandler;
        let operation = op(json!({ "template": "Name: {{ metadata.name }}", "maxTemplateSize": 1024 }));
        handler.validate(&operation).unwrap();
        let mut msg = Message::new(b"1".to_vec())
            .with_data(b"test".to_vec())
            .with_metadata("name", "John");
        handler.execute(&ctx(), &mut msg, &operation).unwrap();
        assert_eq!(msg.data, b"Name: John".to_vec());
    }

    #[test]
    fn requires_exactly_one_template_source() {
        let handler = TemplateHandler;
        let operation = op(json!({}));
        assert!(handler.validate(&operation).is_err());
        let operation = op(json!({ "template": "a", "templateFile": "b" }));
        assert!(handler.validate(&operation).is_err());
    }

    #[test]
    fn template_file_without_filesystem_fails() {
        let handler = TemplateHandler;
        let operation = op(json!({ "templateFile": "t.tmpl" }));
        handler.validate(&operation).unwrap();
        let mut msg = Message::new(b"1".to_vec());
        let err = handler.execute(&ctx(), &mut msg, &operation).unwrap_err();
        assert_eq!(err.kind, crate::error::ErrorKind::InputUnavailable);
    }
}
