//! Pipeline unit: a staged continuous-deployment pipeline.

pub mod lua;
mod types;
pub mod validate;

pub use types::*;

/// Metatable `__type` marker for pipeline references returned to Lua.
pub const PIPELINE_REF_TYPE: &str = "PipelineRef";
