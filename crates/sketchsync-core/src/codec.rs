//! Snapshot codec.
//!
//! Converts a live [`Scene`] into its canonical store-safe form and back.
//! The canonical form is compact JSON with object keys sorted, `null` fields
//! and `null` array items removed, and freehand path data flattened.
//!
//! Flattening path data is intentionally lossy. Render surfaces describe a
//! stroke as a list of drawing commands (`[["M", 1, 2], ["Q", 3, 4, 5, 6]]`),
//! and document stores commonly refuse arrays nested directly inside arrays.
//! The codec rewrites such data as an SVG path-data string (`"M 1 2 Q 3 4 5 6"`)
//! and thins strokes longer than [`MAX_PATH_COMMANDS`]. Everything else
//! survives a round trip unchanged.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Map, Value};

use crate::error::ParseError;
use crate::scene::{Scene, Shape, ShapeType};

/// Upper bound on drawing commands kept per freehand stroke
pub const MAX_PATH_COMMANDS: usize = 1024;

/// Immutable canonical serialization of a scene at one instant.
///
/// Cloning is cheap; equality is by content.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct Snapshot(Arc<str>);

impl Snapshot {
    /// Wrap an already-serialized payload without validating it.
    ///
    /// Use this for payloads received from a store; run them through
    /// [`deserialize`] before trusting them.
    pub fn from_raw(raw: impl Into<String>) -> Self {
        Self(Arc::from(raw.into()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Size of the payload in bytes
    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Debug for Snapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        const PREVIEW: usize = 48;
        let preview: String = self.0.chars().take(PREVIEW).collect();
        if preview.len() < self.0.len() {
            write!(f, "Snapshot({preview}… {} bytes)", self.0.len())
        } else {
            write!(f, "Snapshot({preview})")
        }
    }
}

impl Serialize for Snapshot {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.0)
    }
}

impl<'de> Deserialize<'de> for Snapshot {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        String::deserialize(deserializer).map(Snapshot::from_raw)
    }
}

/// Serialize a scene into its canonical snapshot form
pub fn serialize(scene: &Scene) -> Snapshot {
    let objects: Vec<Value> = scene.objects.iter().map(shape_to_record).collect();

    let mut root = Map::new();
    root.insert("background".into(), Value::String(scene.background.clone()));
    root.insert("objects".into(), Value::Array(objects));
    Snapshot::from_raw(Value::Object(root).to_string())
}

/// Decode a snapshot back into a scene.
///
/// Fails on anything that is not a complete scene document, including
/// unknown shape tags; there is no partial result.
pub fn deserialize(snapshot: &Snapshot) -> Result<Scene, ParseError> {
    let raw = snapshot.as_str();
    if raw.trim().is_empty() {
        return Err(ParseError::Empty);
    }
    Ok(serde_json::from_str(raw)?)
}

fn shape_to_record(shape: &Shape) -> Value {
    let mut record: BTreeMap<String, Value> = BTreeMap::new();
    for (key, value) in &shape.props {
        let value = if shape.kind == ShapeType::Path && key == "path" {
            flatten_path_data(value)
        } else {
            value.clone()
        };
        if let Some(value) = strip_nulls(value) {
            record.insert(key.clone(), value);
        }
    }
    record.insert("type".into(), Value::String(shape.kind.tag().into()));
    Value::Object(record.into_iter().collect())
}

/// Drop nulls recursively and emit object keys in sorted order
fn strip_nulls(value: Value) -> Option<Value> {
    match value {
        Value::Null => None,
        Value::Array(items) => Some(Value::Array(
            items.into_iter().filter_map(strip_nulls).collect(),
        )),
        Value::Object(map) => {
            let sorted: BTreeMap<String, Value> = map
                .into_iter()
                .filter_map(|(k, v)| strip_nulls(v).map(|v| (k, v)))
                .collect();
            Some(Value::Object(sorted.into_iter().collect()))
        }
        other => Some(other),
    }
}

/// Rewrite command-list path data as a flat SVG path string.
///
/// Data that is already flat is returned unchanged, which keeps the
/// transform idempotent.
fn flatten_path_data(value: &Value) -> Value {
    let Value::Array(commands) = value else {
        return value.clone();
    };
    if !commands.iter().any(Value::is_array) {
        return value.clone();
    }

    let commands: Vec<&Value> = commands.iter().filter(|c| !c.is_null()).collect();
    let tokens: Vec<String> = thin(&commands, MAX_PATH_COMMANDS)
        .into_iter()
        .map(command_tokens)
        .filter(|s| !s.is_empty())
        .collect();
    Value::String(tokens.join(" "))
}

fn command_tokens(command: &Value) -> String {
    match command {
        Value::Array(parts) => parts
            .iter()
            .filter_map(scalar_token)
            .collect::<Vec<_>>()
            .join(" "),
        other => scalar_token(other).unwrap_or_default(),
    }
}

fn scalar_token(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        Value::Array(_) | Value::Object(_) => Some(value.to_string()),
    }
}

/// Uniformly sample at most `max` items, always keeping the first and last
fn thin<T: Copy>(items: &[T], max: usize) -> Vec<T> {
    if items.len() <= max || max < 2 {
        return items.to_vec();
    }
    let last = items.len() - 1;
    (0..max).map(|i| items[i * last / (max - 1)]).collect()
}
