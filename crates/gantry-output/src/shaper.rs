use serde::{Deserialize, Serialize};

use crate::envelope::{Compact, OutputEnvelope, Render, Shape, Stripped};
use crate::error::ShapeError;
use crate::truncate::{MAX_TEXT_BYTES, truncate_text};

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ShaperConfig {
    /// The compact form is chosen when the serialized full form is longer
    /// than `raw_text.len() * compact_ratio`.
    #[serde(default = "default_compact_ratio")]
    pub compact_ratio: f64,
    #[serde(default = "default_max_text_bytes")]
    pub max_text_bytes: usize,
}

fn default_compact_ratio() -> f64 {
    1.0
}

fn default_max_text_bytes() -> usize {
    MAX_TEXT_BYTES
}

impl Default for ShaperConfig {
    fn default() -> Self {
        Self {
            compact_ratio: default_compact_ratio(),
            max_text_bytes: default_max_text_bytes(),
        }
    }
}

/// Packages tool results into [`OutputEnvelope`]s.
#[derive(Debug, Clone, Default)]
pub struct OutputShaper {
    config: ShaperConfig,
}

impl OutputShaper {
    #[must_use]
    pub fn new(config: ShaperConfig) -> Self {
        Self { config }
    }

    #[must_use]
    pub fn config(&self) -> &ShaperConfig {
        &self.config
    }

    /// Full value with its full rendering.
    ///
    /// # Errors
    ///
    /// Returns [`ShapeError::Serialize`] if `data` cannot be turned into JSON.
    pub fn dual<T>(&self, data: &T) -> Result<OutputEnvelope, ShapeError>
    where
        T: Serialize + Render,
    {
        self.envelope(serde_json::to_value(data)?, &data.render(), Shape::Full)
    }

    /// Full form, unless `force_full` is off and the full JSON is longer than
    /// `raw_text` scaled by the compact ratio. With an empty `raw_text` any
    /// non-empty payload compacts.
    ///
    /// # Errors
    ///
    /// Returns [`ShapeError::Serialize`] if either projection cannot be turned
    /// into JSON.
    pub fn compact<T>(
        &self,
        data: &T,
        raw_text: &str,
        force_full: bool,
    ) -> Result<OutputEnvelope, ShapeError>
    where
        T: Serialize + Render + Compact,
    {
        let full = serde_json::to_value(data)?;
        if self.prefers_compact(&full, raw_text, force_full)? {
            return self.compact_envelope(data);
        }
        self.envelope(full, &data.render(), Shape::Full)
    }

    /// Like [`OutputShaper::compact`], but the full form is the stripped
    /// schema projection and sizes are compared on it.
    ///
    /// # Errors
    ///
    /// Returns [`ShapeError::Serialize`] if a projection cannot be turned
    /// into JSON.
    pub fn stripped<T>(
        &self,
        data: &T,
        raw_text: &str,
        force_full: bool,
    ) -> Result<OutputEnvelope, ShapeError>
    where
        T: Stripped + Compact,
    {
        let schema = data.to_schema();
        let full = serde_json::to_value(&schema)?;
        if self.prefers_compact(&full, raw_text, force_full)? {
            return self.compact_envelope(data);
        }
        self.envelope(full, &schema.render(), Shape::Full)
    }

    fn prefers_compact(
        &self,
        full: &serde_json::Value,
        raw_text: &str,
        force_full: bool,
    ) -> Result<bool, ShapeError> {
        if force_full {
            return Ok(false);
        }
        let full_len = serde_json::to_string(full)?.len();
        #[allow(clippy::cast_precision_loss)]
        let threshold = raw_text.len() as f64 * self.config.compact_ratio;
        #[allow(clippy::cast_precision_loss)]
        let compact = full_len as f64 > threshold;
        tracing::debug!(
            full_len,
            raw_len = raw_text.len(),
            ratio = self.config.compact_ratio,
            compact,
            "output shape decision"
        );
        Ok(compact)
    }

    fn compact_envelope<T: Compact>(&self, data: &T) -> Result<OutputEnvelope, ShapeError> {
        let projection = data.to_compact();
        self.envelope(
            serde_json::to_value(&projection)?,
            &projection.render(),
            Shape::Compact,
        )
    }

    fn envelope(
        &self,
        structured: serde_json::Value,
        text: &str,
        shape: Shape,
    ) -> Result<OutputEnvelope, ShapeError> {
        Ok(OutputEnvelope {
            structured,
            human_text: truncate_text(text, self.config.max_text_bytes),
            shape,
        })
    }
}

/// [`OutputShaper::dual`] with default configuration.
///
/// # Errors
///
/// See [`OutputShaper::dual`].
pub fn dual_output<T: Serialize + Render>(data: &T) -> Result<OutputEnvelope, ShapeError> {
    OutputShaper::default().dual(data)
}

/// [`OutputShaper::compact`] with default configuration.
///
/// # Errors
///
/// See [`OutputShaper::compact`].
pub fn compact_dual_output<T>(
    data: &T,
    raw_text: &str,
    force_full: bool,
) -> Result<OutputEnvelope, ShapeError>
where
    T: Serialize + Render + Compact,
{
    OutputShaper::default().compact(data, raw_text, force_full)
}

/// [`OutputShaper::stripped`] with default configuration.
///
/// # Errors
///
/// See [`OutputShaper::stripped`].
pub fn stripped_compact_dual_output<T>(
    data: &T,
    raw_text: &str,
    force_full: bool,
) -> Result<OutputEnvelope, ShapeError>
where
    T: Stripped + Compact,
{
    OutputShaper::default().stripped(data, raw_text, force_full)
}
