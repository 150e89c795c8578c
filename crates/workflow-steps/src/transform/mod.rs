//! Transform steps
//!
//! Steps that take text in and hand modified text on.

mod concatenate;
mod text_transform;

pub use concatenate::{ConcatenateConfig, ConcatenateStep};
pub use text_transform::{TextOperation, TextTransformConfig, TextTransformStep};
