use serde::Serialize;

/// Which projection an envelope carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Shape {
    Full,
    Compact,
}

/// Result of one tool invocation: machine-readable data plus the text shown
/// to the model. `structured` holds either the full value or the compact
/// projection, as recorded in `shape`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OutputEnvelope {
    pub structured: serde_json::Value,
    pub human_text: String,
    pub shape: Shape,
}

impl OutputEnvelope {
    #[must_use]
    pub fn is_compact(&self) -> bool {
        self.shape == Shape::Compact
    }
}

/// Human-readable rendering of a value.
pub trait Render {
    fn render(&self) -> String;
}

/// A reduced-fidelity projection used when the full value would cost more
/// than the raw CLI output it was parsed from.
pub trait Compact {
    type Compact: Serialize + Render;

    fn to_compact(&self) -> Self::Compact;
}

/// A schema-shaped projection that drops fields callers never read, used as
/// the full form by [`crate::OutputShaper::stripped`].
pub trait Stripped {
    type Schema: Serialize + Render;

    fn to_schema(&self) -> Self::Schema;
}

impl Render for String {
    fn render(&self) -> String {
        self.clone()
    }
}

impl Render for serde_json::Value {
    fn render(&self) -> String {
        serde_json::to_string_pretty(self).unwrap_or_else(|_| self.to_string())
    }
}
