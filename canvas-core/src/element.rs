//! Canvas elements - the drawable units of a canvas.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::{CanvasError, CanvasResult};

/// Identifier for an element, unique within its canvas.
///
/// Identifiers are generated by clients, so they are plain strings rather
/// than a fixed format.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ElementId(String);

impl ElementId {
    /// Create a new random element ID.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Borrow the raw identifier.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for ElementId {
    fn default() -> Self {
        Self::new()
    }
}

impl From<String> for ElementId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl From<&str> for ElementId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl std::fmt::Display for ElementId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// The kind of element and its kind-specific geometry or content.
///
/// Serialized inline with the element under a `type` tag.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase", rename_all_fields = "camelCase")]
pub enum ElementKind {
    /// Axis-aligned rectangle anchored at the element position.
    Rectangle {
        /// Width in canvas units.
        #[serde(default)]
        width: f64,
        /// Height in canvas units.
        #[serde(default)]
        height: f64,
    },

    /// Circle centred on the element position.
    Circle {
        /// Radius in canvas units.
        #[serde(default)]
        radius: f64,
    },

    /// Straight line as a flat `[x0, y0, x1, y1]` list.
    Line {
        /// Flattened point coordinates.
        #[serde(default)]
        points: Vec<f64>,
    },

    /// Freehand path as a flat `[x0, y0, x1, y1, ...]` list.
    Freehand {
        /// Flattened point coordinates.
        #[serde(default)]
        points: Vec<f64>,
    },

    /// A text label.
    Text {
        /// Text content.
        #[serde(default)]
        text: String,
        /// Font size in pixels.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        font_size: Option<f64>,
        /// Font family name.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        font_family: Option<String>,
    },

    /// A runnable code block.
    Code {
        /// Source text.
        #[serde(default)]
        code: String,
        /// Language identifier (e.g. `python`).
        #[serde(default)]
        language: String,
        /// Output of the last execution, empty if never run.
        #[serde(default)]
        output: String,
    },

    /// An embedded image.
    Image {
        /// Image URI or data URL.
        #[serde(default)]
        src: String,
        /// Display width.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        width: Option<f64>,
        /// Display height.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        height: Option<f64>,
    },
}

impl ElementKind {
    /// The wire tag for this kind.
    #[must_use]
    pub const fn type_name(&self) -> &'static str {
        match self {
            Self::Rectangle { .. } => "rectangle",
            Self::Circle { .. } => "circle",
            Self::Line { .. } => "line",
            Self::Freehand { .. } => "freehand",
            Self::Text { .. } => "text",
            Self::Code { .. } => "code",
            Self::Image { .. } => "image",
        }
    }
}

/// Optional transform shared by all element kinds.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Transform {
    /// Rotation in degrees.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rotation: Option<f64>,
    /// Horizontal scale factor.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scale_x: Option<f64>,
    /// Vertical scale factor.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scale_y: Option<f64>,
}

/// Optional stroke and fill styling shared by all element kinds.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Style {
    /// Fill color (CSS color string).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fill: Option<String>,
    /// Stroke color (CSS color string).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stroke: Option<String>,
    /// Stroke width in pixels.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stroke_width: Option<f64>,
}

/// A canvas element: shared base record plus its kind.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Element {
    /// Identifier, unique within the canvas.
    pub id: ElementId,
    /// X position in canvas coordinates.
    #[serde(default)]
    pub x: f64,
    /// Y position in canvas coordinates.
    #[serde(default)]
    pub y: f64,
    /// Kind-specific fields, including the `type` tag.
    #[serde(flatten)]
    pub kind: ElementKind,
    /// Optional rotation and scale.
    #[serde(flatten)]
    pub transform: Transform,
    /// Optional stroke and fill.
    #[serde(flatten)]
    pub style: Style,
}

impl Element {
    /// Create a new element at the origin with a generated ID.
    #[must_use]
    pub fn new(kind: ElementKind) -> Self {
        Self {
            id: ElementId::new(),
            x: 0.0,
            y: 0.0,
            kind,
            transform: Transform::default(),
            style: Style::default(),
        }
    }

    /// Set the element ID.
    #[must_use]
    pub fn with_id(mut self, id: impl Into<ElementId>) -> Self {
        self.id = id.into();
        self
    }

    /// Set the position.
    #[must_use]
    pub fn with_position(mut self, x: f64, y: f64) -> Self {
        self.x = x;
        self.y = y;
        self
    }

    /// Set the styling.
    #[must_use]
    pub fn with_style(mut self, style: Style) -> Self {
        self.style = style;
        self
    }

    /// Set the transform.
    #[must_use]
    pub fn with_transform(mut self, transform: Transform) -> Self {
        self.transform = transform;
        self
    }

    /// Whether this element is a code block.
    #[must_use]
    pub const fn is_code(&self) -> bool {
        matches!(self.kind, ElementKind::Code { .. })
    }
}

/// A shallow merge-patch for an element.
///
/// Every supplied field fully replaces the old value; omitted fields are left
/// untouched. The `type` and `id` of an element never change through a patch.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ElementPatch(Map<String, Value>);

impl ElementPatch {
    /// Create an empty patch.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a patch from an arbitrary JSON value.
    ///
    /// # Errors
    ///
    /// Returns [`CanvasError::InvalidPatch`] if the value is not an object.
    pub fn from_value(value: Value) -> CanvasResult<Self> {
        match value {
            Value::Object(map) => Ok(Self(map)),
            other => Err(CanvasError::InvalidPatch(format!(
                "expected an object, got {other}"
            ))),
        }
    }

    /// Build a patch carrying every field of `element`.
    ///
    /// # Errors
    ///
    /// Returns [`CanvasError::Serialization`] if the element cannot be
    /// serialized.
    pub fn from_element(element: &Element) -> CanvasResult<Self> {
        Self::from_value(serde_json::to_value(element)?)
    }

    /// Set a single field.
    #[must_use]
    pub fn set(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.0.insert(field.into(), value.into());
        self
    }

    /// Fields carried by this patch.
    #[must_use]
    pub fn fields(&self) -> &Map<String, Value> {
        &self.0
    }

    /// Whether the patch carries no fields.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Merge this patch into `element`, returning the patched copy.
    ///
    /// # Errors
    ///
    /// Returns [`CanvasError::TypeChange`] or [`CanvasError::IdChange`] if the
    /// patch tries to alter either, and [`CanvasError::InvalidPatch`] if the
    /// merged fields no longer describe a valid element of its kind.
    pub fn apply(&self, element: &Element) -> CanvasResult<Element> {
        let Value::Object(mut merged) = serde_json::to_value(element)? else {
            return Err(CanvasError::InvalidPatch(
                "element did not serialize to an object".to_string(),
            ));
        };

        if let Some(requested) = self.0.get("type") {
            let current = element.kind.type_name();
            if requested.as_str() != Some(current) {
                return Err(CanvasError::TypeChange {
                    from: current.to_string(),
                    to: requested.to_string(),
                });
            }
        }
        if let Some(requested) = self.0.get("id") {
            if requested.as_str() != Some(element.id.as_str()) {
                return Err(CanvasError::IdChange {
                    from: element.id.to_string(),
                    to: requested.to_string(),
                });
            }
        }

        for (field, value) in &self.0 {
            merged.insert(field.clone(), value.clone());
        }

        serde_json::from_value(Value::Object(merged))
            .map_err(|e| CanvasError::InvalidPatch(e.to_string()))
    }
}
