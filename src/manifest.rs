//! JSON manifest convention for engram archives
//!
//! The archive format treats `manifest.json` as an opaque blob. By
//! convention it holds a JSON object with at least `name` and `version`,
//! plus a `created` Unix timestamp stamped at write time. Any other fields
//! are preserved as-is.
//!
//! ```no_run
//! use engram_archive::{ArchiveReader, ArchiveWriter};
//! # use engram_archive::Result;
//!
//! # fn main() -> Result<()> {
//! let mut writer = ArchiveWriter::create("backup.eng")?;
//! writer.add_json_manifest(&serde_json::json!({
//!     "name": "nightly-backup",
//!     "version": "1.0.0",
//! }))?;
//! writer.finalize()?;
//!
//! let mut reader = ArchiveReader::open("backup.eng")?;
//! let manifest = reader.read_typed_manifest()?.expect("manifest present");
//! assert_eq!(manifest.name, "nightly-backup");
//! # Ok(())
//! # }
//! ```

use crate::archive::{ArchiveReader, ArchiveWriter};
use crate::error::{EngramError, Result};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::io::Write;
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::debug;

/// Typed view of the conventional manifest fields
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Manifest {
    pub name: String,

    pub version: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    /// Creation timestamp (Unix epoch seconds)
    #[serde(default)]
    pub created: u64,

    /// Every other field, kept verbatim
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Manifest {
    pub fn new(name: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            version: version.into(),
            description: None,
            created: now_secs(),
            extra: Map::new(),
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Serialize to pretty JSON
    pub fn to_json(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec_pretty(self)?)
    }

    /// Parse from JSON bytes
    pub fn from_json(data: &[u8]) -> Result<Self> {
        serde_json::from_slice(data).map_err(|e| EngramError::InvalidManifest(e.to_string()))
    }
}

impl<W: Write> ArchiveWriter<W> {
    /// Write a JSON object as `manifest.json`, stamping `created` if absent
    pub fn add_json_manifest(&mut self, manifest: &Value) -> Result<()> {
        let mut object = match manifest {
            Value::Object(object) => object.clone(),
            other => {
                return Err(EngramError::InvalidManifest(format!(
                    "manifest must be a JSON object, got {}",
                    json_kind(other)
                )))
            }
        };

        if !object.contains_key("created") {
            object.insert("created".to_string(), Value::from(now_secs()));
        }

        let data = serde_json::to_vec_pretty(&Value::Object(object))?;
        debug!("Writing JSON manifest ({} bytes)", data.len());
        self.add_manifest(&data)
    }

    /// Write a typed manifest as `manifest.json`
    pub fn add_typed_manifest(&mut self, manifest: &Manifest) -> Result<()> {
        self.add_json_manifest(&serde_json::to_value(manifest)?)
    }
}

impl ArchiveReader {
    /// Read `manifest.json` as JSON, or `None` if the archive has none
    pub fn read_json_manifest(&mut self) -> Result<Option<Value>> {
        match self.read_manifest()? {
            Some(data) => serde_json::from_slice(&data)
                .map(Some)
                .map_err(|e| EngramError::InvalidManifest(e.to_string())),
            None => Ok(None),
        }
    }

    /// Read `manifest.json` into [`Manifest`], or `None` if the archive has none
    pub fn read_typed_manifest(&mut self) -> Result<Option<Manifest>> {
        self.read_manifest()?
            .map(|data| Manifest::from_json(&data))
            .transpose()
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

fn now_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}
