//! Serialize handler (spec §4.3.2): decode payload bytes from one structured format and
//! re-encode in another, with optional pretty-printing for JSON/YAML.
//!
//! msgpack is accepted in the enum so existing configs keep validating the shape of the
//! field, but both directions are rejected at `validate` time (spec §9.1 Open Question 1 —
//! promoted from a runtime failure to a validation failure).

use crate::error::RunnerError;
use crate::format::{parse_options, ExecContext, FormatOperation, OperationHandler};
use crate::message::Message;
use serde::Deserialize;
use serde_json::Value;

const COMPONENT: &str = "format.serialize";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Format {
    Json,
    Yaml,
    Cbor,
    Msgpack,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SerializeOptions {
    pub from: Format,
    pub to: Format,
    #[serde(default)]
    pub pretty: bool,
    #[serde(default = "default_indent")]
    pub indent: String,
}

fn default_indent() -> String {
    "  ".to_string()
}

fn decode(format: Format, bytes: &[u8]) -> Result<Value, RunnerError> {
    match format {
        Format::Json => serde_json::from_slice(bytes)
            .map_err(|e| RunnerError::parse_failed(COMPONENT, format!("json decode: {e}"))),
        Format::Yaml => serde_yaml::from_slice(bytes)
            .map_err(|e| RunnerError::parse_failed(COMPONENT, format!("yaml decode: {e}"))),
        Format::Cbor => ciborium::from_reader(bytes)
            .map_err(|e| RunnerError::parse_failed(COMPONENT, format!("cbor decode: {e}"))),
        Format::Msgpack => unreachable!("msgpack rejected at validate()"),
    }
}

fn encode(format: Format, value: &Value, pretty: bool, indent: &str) -> Result<Vec<u8>, RunnerError> {
    match format {
        Format::Json => {
            if pretty {
                let formatter = serde_json::ser::PrettyFormatter::with_indent(indent.as_bytes());
                let mut buf = Vec::new();
                let mut ser = serde_json::Serializer::with_formatter(&mut buf, formatter);
                serde::Serialize::serialize(value, &mut ser)
                    .map_err(|e| RunnerError::internal(COMPONENT, format!("json encode: {e}")))?;
                Ok(buf)
            } else {
                serde_json::to_vec(value)
                    .map_err(|e| RunnerError::internal(COMPONENT, format!("json encode: {e}")))
            }
        }
        Format::Yaml => serde_yaml::to_string(value)
            .map(|s| s.into_bytes())
            .map_err(|e| RunnerError::internal(COMPONENT, format!("yaml encode: {e}"))),
        Format::Cbor => {
            let mut buf = Vec::new();
            ciborium::into_writer(value, &mut buf)
                .map_err(|e| RunnerError::internal(COMPONENT, format!("cbor encode: {e}")))?;
            Ok(buf)
        }
        Format::Msgpack => unreachable!("msgpack rejected at validate()"),
    }
}

pub struct SerializeHandler;

impl OperationHandler for SerializeHandler {
    fn name(&self) -> &'static str {
        "serialize"
    }

    fn validate(&self, op: &FormatOperation) -> Result<(), RunnerError> {
        let opts: SerializeOptions = parse_options(COMPONENT, &op.options)?;
        if opts.from == Format::Msgpack || opts.to == Format::Msgpack {
            return Err(RunnerError::validation_failed(
                COMPONENT,
                "msgpack is not implemented",
            ));
        }
        Ok(())
    }

    fn execute(&self, _ctx: &ExecContext, msg: &mut Message, op: &FormatOperation) -> Result<(), RunnerError> {
        let opts: SerializeOptions = parse_options(COMPONENT, &op.options)?;
        let value = decode(opts.from, &msg.data)?;
        msg.data = encode(opts.to, &value, opts.pretty, &opts.indent)?;
        Ok(())
    }
}
