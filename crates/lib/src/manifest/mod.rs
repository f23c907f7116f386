//! Deployment manifest types.
//!
//! The manifest is the evaluated result of a Lua configuration, containing
//! all hosting and pipeline units ready for validation and synthesis.

mod types;

pub use types::*;
