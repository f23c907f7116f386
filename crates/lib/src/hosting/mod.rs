//! Hosting unit: a public content bucket fronted by a CDN distribution.

pub mod lua;
mod types;

pub use types::*;

/// Metatable `__type` marker for hosting references returned to Lua.
pub const HOSTING_REF_TYPE: &str = "HostingRef";
