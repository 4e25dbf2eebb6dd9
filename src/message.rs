//! # Message Module
//!
//! The message module defines the mutable container that flows through a chain of
//! [`crate::runner::Runner`]s: payload bytes, a string metadata map, an optional ordered
//! list of named parts, and an optional read-only filesystem view.
//!
//! A message is never shared across concurrent consumers: it is processed exclusively by
//! one runner at a time, so no field here needs internal synchronization.

use std::collections::HashMap;
use std::fs;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

/// A named sub-unit of a multipart message, e.g. for HTTP `multipart/form-data` composition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Part {
    /// Part name. Not required to be unique within a message, but recommended.
    pub name: String,
    pub filename: Option<String>,
    pub content_type: Option<String>,
    pub headers: HashMap<String, String>,
    pub data: Vec<u8>,
}

impl Part {
    pub fn new(name: impl Into<String>, data: Vec<u8>) -> Self {
        Part {
            name: name.into(),
            filename: None,
            content_type: None,
            headers: HashMap::new(),
            data,
        }
    }
}

/// Read-only filesystem view resolved by operations that reference file paths
/// (`template.templateFile`, multipart `source=filesystem`, merge `input=filesystem`).
pub trait MessageFilesystem: Send + Sync {
    fn read(&self, path: &str) -> anyhow::Result<Vec<u8>>;
}

/// A filesystem view rooted at a local directory.
///
/// Path traversal is rejected exactly the way [`crate`]'s static-file serving does: any
/// `..` component that would escape the root fails instead of being resolved.
pub struct LocalFilesystem {
    root: PathBuf,
}

impl LocalFilesystem {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        LocalFilesystem { root: root.into() }
    }

    fn resolve(&self, path: &str) -> Option<PathBuf> {
        let clean = path.trim_start_matches('/');
        let mut out = self.root.clone();
        for comp in Path::new(clean).components() {
            match comp {
                Component::Normal(s) => out.push(s),
                Component::CurDir => {}
                Component::ParentDir | Component::RootDir | Component::Prefix(_) => return None,
            }
        }
        Some(out)
    }
}

impl MessageFilesystem for LocalFilesystem {
    fn read(&self, path: &str) -> anyhow::Result<Vec<u8>> {
        let resolved = self
            .resolve(path)
            .ok_or_else(|| anyhow::anyhow!("path '{path}' escapes filesystem root"))?;
        Ok(fs::read(resolved)?)
    }
}

/// The message container that flows through a Runner chain.
///
/// `data` and `metadata` are always present (possibly empty). A handler that writes
/// `output = data` must leave `data` consistent; a handler that writes `output = parts`
/// must only append to `parts`, or clear-then-append when configured to do so.
#[derive(Clone)]
pub struct Message {
    id: Vec<u8>,
    pub data: Vec<u8>,
    pub metadata: HashMap<String, String>,
    pub parts: Vec<Part>,
    filesystem: Option<Arc<dyn MessageFilesystem>>,
}

impl std::fmt::Debug for Message {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Message")
            .field("id", &String::from_utf8_lossy(&self.id))
            .field("data_len", &self.data.len())
            .field("metadata", &self.metadata)
            .field("parts", &self.parts.iter().map(|p| &p.name).collect::<Vec<_>>())
            .field("has_filesystem", &self.filesystem.is_some())
            .finish()
    }
}

impl Message {
    /// Create a message as a source connector would: an opaque id assigned once and
    /// immutable thereafter, with empty payload and metadata.
    pub fn new(id: impl Into<Vec<u8>>) -> Self {
        Message {
            id: id.into(),
            data: Vec::new(),
            metadata: HashMap::new(),
            parts: Vec::new(),
            filesystem: None,
        }
    }

    pub fn with_data(mut self, data: impl Into<Vec<u8>>) -> Self {
        self.data = data.into();
        self
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    pub fn with_filesystem(mut self, fs: Arc<dyn MessageFilesystem>) -> Self {
        self.filesystem = Some(fs);
        self
    }

    pub fn id(&self) -> &[u8] {
        &self.id
    }

    pub fn filesystem(&self) -> Option<&Arc<dyn MessageFilesystem>> {
        self.filesystem.as_ref()
    }

    /// Append a part, or reset the list first when `clear` is set — the one place
    /// `parts` mutation is allowed outside of direct field access.
    pub fn push_part(&mut self, part: Part, clear: bool) {
        if clear {
            self.parts.clear();
        }
        self.parts.push(part);
    }
}
