//! The `FormatOperation` record and its `input`/`output` enums (spec §3, §4.3).

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Where a handler reads its primary input from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InputSource {
    Data,
    Metadata,
    Filesystem,
    Parts,
}

impl Default for InputSource {
    fn default() -> Self {
        InputSource::Data
    }
}

/// Where a handler writes its primary output to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputTarget {
    Data,
    Metadata,
    Filesystem,
    Parts,
}

impl Default for OutputTarget {
    fn default() -> Self {
        OutputTarget::Data
    }
}

/// One step in a [`crate::format::FormatRunnerConfig`]'s operation list.
///
/// `options` travels as an untyped JSON value from configuration and is decoded into a
/// handler-specific typed options structure by the handler itself, both at `validate` and
/// at `execute` time (spec §9 — "do not spread option knowledge across handler bodies").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FormatOperation {
    #[serde(rename = "type")]
    pub op_type: String,
    #[serde(default)]
    pub input: InputSource,
    #[serde(default)]
    pub output: OutputTarget,
    #[serde(default = "default_options")]
    pub options: Value,
}

fn default_options() -> Value {
    Value::Object(serde_json::Map::new())
}
