//! stacklua-lib: Core types and logic for stacklua
//!
//! This crate provides the fundamental types used throughout stacklua:
//! - `Hosting`: a content bucket plus the CDN distribution fronting it
//! - `Pipeline`: a staged continuous-deployment pipeline consuming hosting handles
//! - `Manifest`: the complete set of deployment units defined by a config
//! - `Template`: the synthesized provider template
//! - `Snapshot`: recorded synth results for plan/diff

pub mod consts;
pub mod eval;
pub mod hosting;
pub mod init;
pub mod lua;
pub mod manifest;
pub mod paths;
pub mod pipeline;
pub mod placeholder;
pub mod secrets;
pub mod snapshot;
pub mod synth;
pub mod util;
