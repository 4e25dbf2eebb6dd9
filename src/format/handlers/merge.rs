//! Merge handler (spec §4.3.7): combine several sources (payload data, metadata, a
//! filesystem file) into a single `{ key → value }` mapping, serialized in one format.
//! Per-source resolution failures are logged and that source is omitted — non-fatal.

use crate::error::RunnerError;
use crate::format::{parse_options, ExecContext, FormatOperation, OperationHandler};
use crate::message::Message;
use serde::Deserialize;
use serde_json::Value;
use tracing::warn;

const COMPONENT: &str = "format.merge";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MergeFormat {
    Json,
    Yaml,
}

impl Default for MergeFormat {
    fn default() -> Self {
        MergeFormat::Json
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Input {
    Data,
    Metadata,
    Filesystem,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MergeSource {
    pub input: Input,
    pub key: String,
    #[serde(default)]
    pub path: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MergeOptions {
    pub sources: Vec<MergeSource>,
    #[serde(default)]
    pub format: MergeFormat,
}

/// Parse as JSON if possible, otherwise keep the raw bytes as a string — the resolution
/// rule §4.3.7 specifies for `data` and `filesystem` sources.
fn parse_json_or_string(raw: &[u8]) -> Value {
    serde_json::from_slice(raw).unwrap_or_else(|_| Value::String(String::from_utf8_lossy(raw).into_owned()))
}

fn resolve_source(msg: &Message, source: &MergeSource) -> Option<Value> {
    match source.input {
        Input::Data => Some(parse_json_or_string(&msg.data)),
        Input::Metadata => {
            let map: serde_json::Map<String, Value> = msg
                .metadata
                .iter()
                .map(|(k, v)| (k.clone(), Value::String(v.clone())))
                .collect();
            Some(Value::Object(map))
        }
        Input::Filesystem => {
            let path = match &source.path {
                Some(p) => p,
                None => {
                    warn!(key = %source.key, "merge: filesystem source missing path, omitting");
                    return None;
                }
            };
            let fs = match msg.filesystem() {
                Some(fs) => fs,
                None => {
                    warn!(key = %source.key, "merge: no filesystem attached, omitting");
                    return None;
                }
            };
            match fs.read(path) {
                Ok(bytes) => Some(parse_json_or_string(&bytes)),
                Err(e) => {
                    warn!(key = %source.key, error = %e, "merge: filesystem read failed, omitting");
                    None
                }
            }
        }
    }
}

pub struct MergeHandler;

impl OperationHandler for MergeHandler {
    fn name(&self) -> &'static str {
        "merge"
    }

    fn validate(&self, op: &FormatOperation) -> Result<(), RunnerError> {
        let opts: MergeOptions = parse_options(COMPONENT, &op.options)?;
        if opts.sources.is_empty() {
            return Err(RunnerError::validation_failed(COMPONENT, "sources must be non-empty"));
        }
        for source in &opts.sources {
            if source.key.is_empty() {
                return Err(RunnerError::validation_failed(COMPONENT, "source key is required"));
            }
            if source.input == Input::Filesystem && source.path.is_none() {
                return Err(RunnerError::validation_failed(
                    COMPONENT,
                    "input=filesystem requires path",
                ));
            }
        }
        Ok(())
    }

    fn execute(&self, _ctx: &ExecContext, msg: &mut Message, op: &FormatOperation) -> Result<(), RunnerError> {
        let opts: MergeOptions = parse_options(COMPONENT, &op.options)?;
        let mut merged = serde_json::Map::new();
        for source in &opts.sources {
            if let Some(value) = resolve_source(msg, source) {
                merged.insert(source.key.clone(), value);
            }
        }
        let merged = Value::Object(merged);
        msg.data = match opts.format {
            MergeFormat::Json => serde_json::to_vec(&merged)
                .map_err(|e| RunnerError::internal(COMPONENT, format!("json encode: {e}")))?,
            MergeFormat::Yaml => serde_yaml::to_string(&merged)
                .map(|s| s.into_bytes())
                .map_err(|e| RunnerError::internal(COMPONENT, format!("yaml encode: {e}")))?,
        };
        Ok(())
    }
}
