//! Scene and shape types.
//!
//! A Scene is the whole editable document: an ordered list of shapes drawn
//! back-to-front plus a background colour. Shapes are opaque to the sync
//! engine; only the discriminant tag is typed, every other field is carried as
//! a JSON property map and round-tripped untouched.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use uuid::Uuid;

use crate::error::SceneIdError;

/// Background colour of a freshly created scene.
pub const DEFAULT_BACKGROUND: &str = "#ffffff";

/// Longest accepted scene identifier.
const MAX_SCENE_ID_LEN: usize = 128;

/// Identifier of one scene in the document store.
///
/// Restricted to ASCII letters, digits, `-` and `_` so it is safe to use as a
/// file name and as a URL path segment.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct SceneId(String);

impl SceneId {
    /// Generate a fresh random scene identifier
    pub fn generate() -> Self {
        Self(Uuid::new_v4().simple().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl FromStr for SceneId {
    type Err = SceneIdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.is_empty() {
            return Err(SceneIdError::Empty);
        }
        if s.len() > MAX_SCENE_ID_LEN {
            return Err(SceneIdError::TooLong(s.len()));
        }
        if let Some(bad) = s
            .chars()
            .find(|c| !(c.is_ascii_alphanumeric() || *c == '-' || *c == '_'))
        {
            return Err(SceneIdError::InvalidChar(bad));
        }
        Ok(Self(s.to_string()))
    }
}

impl TryFrom<String> for SceneId {
    type Error = SceneIdError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<SceneId> for String {
    fn from(id: SceneId) -> Self {
        id.0
    }
}

impl fmt::Display for SceneId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Discriminant of a shape record, serialized as the `"type"` tag
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ShapeType {
    Rect,
    Circle,
    Text,
    /// Freehand stroke
    Path,
    Polygon,
}

impl ShapeType {
    /// Wire tag for this shape type
    pub fn tag(self) -> &'static str {
        match self {
            ShapeType::Rect => "rect",
            ShapeType::Circle => "circle",
            ShapeType::Text => "text",
            ShapeType::Path => "path",
            ShapeType::Polygon => "polygon",
        }
    }
}

impl fmt::Display for ShapeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}

/// A drawable shape record.
///
/// Geometry and style live in `props`; the engine never looks inside them
/// except to serialize.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Shape {
    #[serde(rename = "type")]
    pub kind: ShapeType,
    #[serde(flatten)]
    pub props: Map<String, Value>,
}

impl Shape {
    /// Create a shape with an empty property map
    pub fn new(kind: ShapeType) -> Self {
        Self {
            kind,
            props: Map::new(),
        }
    }

    /// Set a property, replacing any previous value
    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        let key = key.into();
        // The tag is owned by `kind`; a "type" prop would shadow it on the wire.
        if key != "type" {
            self.props.insert(key, value.into());
        }
        self
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.props.get(key)
    }

    /// Rectangle at (left, top)
    pub fn rect(left: f64, top: f64, width: f64, height: f64, fill: &str) -> Self {
        Self::new(ShapeType::Rect)
            .with("left", left)
            .with("top", top)
            .with("width", width)
            .with("height", height)
            .with("fill", fill)
    }

    /// Circle whose bounding box starts at (left, top)
    pub fn circle(left: f64, top: f64, radius: f64, fill: &str) -> Self {
        Self::new(ShapeType::Circle)
            .with("left", left)
            .with("top", top)
            .with("radius", radius)
            .with("fill", fill)
    }

    pub fn text(left: f64, top: f64, content: &str, font_size: f64, fill: &str) -> Self {
        Self::new(ShapeType::Text)
            .with("left", left)
            .with("top", top)
            .with("text", content)
            .with("fontSize", font_size)
            .with("fill", fill)
    }

    /// Freehand stroke through `points`.
    ///
    /// Path data is stored as drawing commands (`["M", x, y]` followed by
    /// `["L", x, y]`), the nested-array form a render surface produces. The
    /// codec flattens it before it reaches the store.
    pub fn path(points: &[(f64, f64)], stroke: &str, stroke_width: f64) -> Self {
        let commands: Vec<Value> = points
            .iter()
            .enumerate()
            .map(|(i, (x, y))| {
                let op = if i == 0 { "M" } else { "L" };
                json!([op, x, y])
            })
            .collect();
        Self::new(ShapeType::Path)
            .with("path", Value::Array(commands))
            .with("stroke", stroke)
            .with("strokeWidth", stroke_width)
    }

    pub fn polygon(points: &[(f64, f64)], fill: &str) -> Self {
        let points: Vec<Value> = points.iter().map(|(x, y)| json!({ "x": x, "y": y })).collect();
        Self::new(ShapeType::Polygon)
            .with("points", Value::Array(points))
            .with("fill", fill)
    }

    /// Lock the shape against moving, rotating, scaling and selection
    pub fn locked(self) -> Self {
        self.with("lockMovementX", true)
            .with("lockMovementY", true)
            .with("lockRotation", true)
            .with("lockScalingX", true)
            .with("lockScalingY", true)
            .with("selectable", false)
    }

    /// Undo [`Shape::locked`]
    pub fn unlocked(self) -> Self {
        self.with("lockMovementX", false)
            .with("lockMovementY", false)
            .with("lockRotation", false)
            .with("lockScalingX", false)
            .with("lockScalingY", false)
            .with("selectable", true)
    }

    pub fn is_locked(&self) -> bool {
        self.props.get("selectable") == Some(&Value::Bool(false))
    }
}

/// The full editable document
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Scene {
    #[serde(default)]
    pub objects: Vec<Shape>,
    #[serde(default = "default_background")]
    pub background: String,
}

fn default_background() -> String {
    DEFAULT_BACKGROUND.to_string()
}

impl Scene {
    /// Empty scene with the default background
    pub fn new() -> Self {
        Self {
            objects: Vec::new(),
            background: default_background(),
        }
    }

    pub fn with_background(mut self, background: impl Into<String>) -> Self {
        self.background = background.into();
        self
    }

    pub fn push(&mut self, shape: Shape) {
        self.objects.push(shape);
    }

    /// Remove the shape at `index`, if any
    pub fn remove(&mut self, index: usize) -> Option<Shape> {
        if index < self.objects.len() {
            Some(self.objects.remove(index))
        } else {
            None
        }
    }

    pub fn len(&self) -> usize {
        self.objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }
}

impl Default for Scene {
    fn default() -> Self {
        Self::new()
    }
}
