//! Workflow Steps
//!
//! Built-in step implementations for the Stepflow workflow engine.
//! Every step registers itself with `inventory`, so
//! `StepRegistry::with_builtins()` picks them up once this crate is linked.
//!
//! # Categories
//!
//! - **Source**: Steps that start a chain
//! - **Transform**: Steps that rewrite text on its way through
//! - **Sink**: Steps that write their input out

mod conf;
pub mod sink;
pub mod source;
pub mod transform;

// Re-export all steps for convenience
pub use sink::*;
pub use source::*;
pub use transform::*;
