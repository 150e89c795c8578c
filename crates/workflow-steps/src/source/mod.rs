//! Source steps
//!
//! Steps that start a chain without needing input.

mod text_source;

pub use text_source::{TextSourceConfig, TextSourceStep};
