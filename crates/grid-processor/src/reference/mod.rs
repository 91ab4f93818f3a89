//! Kerchunk reference sets.
//!
//! A reference set maps zarr keys (`RAINRATE/.zarray`, `RAINRATE/0.1.2`)
//! to either inline bytes or a byte range inside a remote file. Both the
//! flat version 0 layout and the version 1 layout with `templates` are
//! accepted. Arrays are decoded by zarrs through [`ReferenceStore`].

pub mod store;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use bytes::Bytes;
use serde_json::{Map, Value};
use std::collections::HashMap;
use tracing::warn;

use crate::error::{ForecastError, Result};
pub use store::ReferenceStore;

const BASE64_PREFIX: &str = "base64:";

/// Where the bytes for one key live.
#[derive(Debug, Clone, PartialEq)]
pub enum ChunkRef {
    Inline(Bytes),
    Remote {
        url: String,
        /// `(offset, length)`; `None` means the whole object.
        range: Option<(u64, u64)>,
    },
}

/// Parsed reference set.
#[derive(Debug, Clone, Default)]
pub struct ReferenceSet {
    refs: HashMap<String, ChunkRef>,
}

impl ReferenceSet {
    /// Parse a reference JSON document.
    pub fn from_json(source: &str, bytes: &[u8]) -> Result<Self> {
        let value: Value = serde_json::from_slice(bytes)
            .map_err(|e| ForecastError::load_failure(source, format!("invalid reference JSON: {}", e)))?;
        Self::from_value(source, value)
    }

    pub fn from_value(source: &str, value: Value) -> Result<Self> {
        let Value::Object(mut root) = value else {
            return Err(ForecastError::load_failure(source, "reference set must be a JSON object"));
        };

        let versioned = root.get("version").and_then(Value::as_u64);
        let (entries, templates) = match versioned {
            Some(1) => {
                let templates = match root.remove("templates") {
                    Some(Value::Object(t)) => t
                        .into_iter()
                        .filter_map(|(k, v)| v.as_str().map(|s| (k, s.to_string())))
                        .collect(),
                    _ => Vec::new(),
                };
                if root.get("gen").is_some_and(|g| !g.as_array().is_some_and(Vec::is_empty)) {
                    warn!(source = source, "Ignoring generated references in reference set");
                }
                match root.remove("refs") {
                    Some(Value::Object(refs)) => (refs, templates),
                    _ => {
                        return Err(ForecastError::load_failure(
                            source,
                            "version 1 reference set has no refs object",
                        ))
                    }
                }
            }
            Some(other) => {
                return Err(ForecastError::load_failure(
                    source,
                    format!("unsupported reference set version {}", other),
                ))
            }
            None => (root, Vec::new()),
        };

        let mut refs = HashMap::with_capacity(entries.len());
        for (key, value) in entries {
            let chunk = parse_entry(source, &key, value, &templates)?;
            refs.insert(key, chunk);
        }
        Ok(Self { refs })
    }

    pub fn get(&self, key: &str) -> Option<&ChunkRef> {
        self.refs.get(key)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.refs.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.refs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.refs.is_empty()
    }

    /// Array names, sorted.
    pub fn variables(&self) -> Vec<String> {
        let mut vars: Vec<String> = self
            .refs
            .keys()
            .filter_map(|k| k.strip_suffix("/.zarray"))
            .map(str::to_string)
            .collect();
        vars.sort();
        vars
    }

    /// Inline JSON stored under `key`, if present.
    pub fn metadata_json(&self, key: &str) -> Result<Option<Value>> {
        match self.refs.get(key) {
            None => Ok(None),
            Some(ChunkRef::Inline(bytes)) => serde_json::from_slice(bytes)
                .map(Some)
                .map_err(|e| ForecastError::load_failure(key, format!("invalid metadata JSON: {}", e))),
            Some(ChunkRef::Remote { .. }) => Err(ForecastError::load_failure(
                key,
                "metadata must be stored inline",
            )),
        }
    }

    /// `.zarray` document of a variable.
    pub fn array_metadata(&self, variable: &str) -> Result<Value> {
        self.metadata_json(&format!("{}/.zarray", variable))?
            .ok_or_else(|| ForecastError::MissingVariable(variable.to_string()))
    }

    /// Numeric `fill_value` of a variable's `.zarray`, if any.
    pub fn fill_value(&self, variable: &str) -> Result<Option<f64>> {
        let metadata = self.array_metadata(variable)?;
        Ok(metadata.get("fill_value").and_then(number))
    }

    /// `.zattrs` of a variable; empty when absent.
    pub fn attributes(&self, variable: &str) -> Result<Map<String, Value>> {
        self.attrs_at(&format!("{}/.zattrs", variable))
    }

    /// Root `.zattrs`; empty when absent.
    pub fn global_attributes(&self) -> Result<Map<String, Value>> {
        self.attrs_at(".zattrs")
    }

    fn attrs_at(&self, key: &str) -> Result<Map<String, Value>> {
        match self.metadata_json(key)? {
            None => Ok(Map::new()),
            Some(Value::Object(map)) => Ok(map),
            Some(_) => Err(ForecastError::load_failure(key, "attributes must be a JSON object")),
        }
    }
}

fn parse_entry(
    source: &str,
    key: &str,
    value: Value,
    templates: &[(String, String)],
) -> Result<ChunkRef> {
    let bad = |msg: &str| ForecastError::load_failure(source, format!("reference {}: {}", key, msg));
    match value {
        Value::String(s) => match s.strip_prefix(BASE64_PREFIX) {
            Some(encoded) => BASE64
                .decode(encoded)
                .map(|b| ChunkRef::Inline(Bytes::from(b)))
                .map_err(|e| bad(&format!("invalid base64: {}", e))),
            None => Ok(ChunkRef::Inline(Bytes::from(s))),
        },
        // Some writers embed .zattrs/.zarray as objects instead of strings.
        Value::Object(_) => Ok(ChunkRef::Inline(Bytes::from(value.to_string()))),
        Value::Array(parts) => {
            let url = parts
                .first()
                .and_then(Value::as_str)
                .ok_or_else(|| bad("first element must be a URL"))?;
            let url = render_template(url, templates);
            match parts.len() {
                1 => Ok(ChunkRef::Remote { url, range: None }),
                3 => {
                    let offset = parts[1].as_u64().ok_or_else(|| bad("offset must be an integer"))?;
                    let length = parts[2].as_u64().ok_or_else(|| bad("length must be an integer"))?;
                    Ok(ChunkRef::Remote {
                        url,
                        range: Some((offset, length)),
                    })
                }
                n => Err(bad(&format!("expected 1 or 3 elements, got {}", n))),
            }
        }
        _ => Err(bad("unsupported reference value")),
    }
}

/// A JSON number, or one of the string spellings zarr uses for non-finite
/// floats.
pub(crate) fn number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => match s.as_str() {
            "NaN" => Some(f64::NAN),
            "Infinity" => Some(f64::INFINITY),
            "-Infinity" => Some(f64::NEG_INFINITY),
            _ => None,
        },
        _ => None,
    }
}

/// Substitute `{{name}}` placeholders.
fn render_template(url: &str, templates: &[(String, String)]) -> String {
    if !url.contains("{{") {
        return url.to_string();
    }
    let mut out = url.to_string();
    for (name, value) in templates {
        out = out.replace(&format!("{{{{{}}}}}", name), value);
    }
    out
}
