//! Sink steps
//!
//! Steps that end a chain by writing their input somewhere.

mod text_store;

pub use text_store::{TextStoreConfig, TextStoreStep};
