//! Decides per call whether a tool returns its full structured result or a
//! compact projection, and packages data and text into one envelope.

pub mod envelope;
pub mod error;
pub mod shaper;
pub mod truncate;

pub use envelope::{Compact, OutputEnvelope, Render, Shape, Stripped};
pub use error::ShapeError;
pub use shaper::{
    OutputShaper, ShaperConfig, compact_dual_output, dual_output, stripped_compact_dual_output,
};
pub use truncate::{MAX_TEXT_BYTES, truncate_text};
