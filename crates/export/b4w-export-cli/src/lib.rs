//! Headless driver around the bake and export crates: scene file I/O, the
//! armature bake pass, and batch re-export of previously exported files.

pub mod bake;
pub mod config;
pub mod reexport;
pub mod scene_io;

pub use bake::{bake_scene, BakeSummary};
pub use config::ToolConfig;
pub use reexport::{Classification, Report, ReexportOptions};
pub use scene_io::{load_scene, save_scene};
