//! Project introspection and build operations
//!
//! Wraps the meson command-line interface and the ninja backend, memoizes
//! what they report, and derives per-target compile information from the
//! compilation database. `ProjectContext` is the entry point.

pub mod compilation_database;
pub mod compile_info;
pub mod context;
pub mod error;
pub mod introspection;
pub mod meson;
pub mod ninja;
pub mod paths;
pub mod target;


pub use context::{ProjectContext, ProjectTools};
pub use error::ProjectError;
pub use target::Target;
