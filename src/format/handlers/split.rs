//! Split handler (spec §4.3.8): break the payload on a delimiter byte sequence into one
//! [`crate::message::Part`] per chunk, truncated to `maxParts`.

use crate::error::RunnerError;
use crate::format::{parse_options, ExecContext, FormatOperation, OperationHandler, OutputTarget};
use crate::message::{Message, Part};
use serde::Deserialize;

const COMPONENT: &str = "format.split";

#[derive(Debug, Clone, Deserialize)]
pub struct SplitOptions {
    pub delimiter: String,
    #[serde(default = "default_prefix", rename = "partNamePrefix")]
    pub part_name_prefix: String,
    #[serde(default = "default_content_type", rename = "contentType")]
    pub content_type: String,
    #[serde(default = "default_max_parts", rename = "maxParts")]
    pub max_parts: usize,
}

fn default_prefix() -> String {
    "part".to_string()
}

fn default_content_type() -> String {
    "text/plain".to_string()
}

fn default_max_parts() -> usize {
    100
}

pub struct SplitHandler;

impl OperationHandler for SplitHandler {
    fn name(&self) -> &'static str {
        "split"
    }

    fn validate(&self, op: &FormatOperation) -> Result<(), RunnerError> {
        let opts: SplitOptions = parse_options(COMPONENT, &op.options)?;
        if opts.delimiter.is_empty() {
            return Err(RunnerError::validation_failed(COMPONENT, "delimiter must be non-empty"));
        }
        if opts.max_parts == 0 {
            return Err(RunnerError::validation_failed(COMPONENT, "maxParts must be > 0"));
        }
        if op.output != OutputTarget::Parts {
            return Err(RunnerError::validation_failed(COMPONENT, "split requires output=parts"));
        }
        Ok(())
    }

    fn execute(&self, _ctx: &ExecContext, msg: &mut Message, op: &FormatOperation) -> Result<(), RunnerError> {
        let opts: SplitOptions = parse_options(COMPONENT, &op.options)?;

        let chunks: Vec<&[u8]> = if msg.data.is_empty() {
            vec![&msg.data[..]]
        } else {
            split_bytes(&msg.data, opts.delimiter.as_bytes())
        };

        for (idx, chunk) in chunks.into_iter().take(opts.max_parts).enumerate() {
            let mut part = Part::new(format!("{}{idx}", opts.part_name_prefix), chunk.to_vec());
            part.content_type = Some(opts.content_type.clone());
            msg.parts.push(part);
        }
        Ok(())
    }
}

fn split_bytes<'a>(data: &'a [u8], delimiter: &[u8]) -> Vec<&'a [u8]> {
    let mut out = Vec::new();
    let mut rest = data;
    loop {
        match find_subslice(rest, delimiter) {
            Some(pos) => {
                out.push(&rest[..pos]);
                rest = &rest[pos + delimiter.len()..];
            }
            None => {
                out.push(rest);
                break;
            }
        }
    }
    out
}

fn find_subslice(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    if needle.is_empty() || needle.len() > haystack.len() {
        return None;
    }
    haystack.windows(needle.len()).position(|w| w == needle)
}
