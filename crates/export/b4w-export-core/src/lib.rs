//! Blend4Web scene export.
//!
//! Walks a [`SceneGraph`] description and serializes it into the versioned
//! JSON manifest with its binary side-car, or into a single HTML bundle for
//! the web player. Animation baking lives in `b4w-bake-core`; this crate
//! only encodes the resulting actions.

pub mod action;
pub mod binary;
pub mod config;
pub mod context;
pub mod error;
pub mod html;
pub mod ids;
pub mod manifest;
pub mod messages;
pub mod packer;
pub mod paths;
pub mod scene;
pub mod template;
pub mod walker;

pub use action::{encode_action, select_action};
pub use binary::{BinaryBuffers, BinaryInfo};
pub use config::{ExportConfig, FORMAT_VERSION};
pub use context::ExportContext;
pub use error::ExportError;
pub use html::{bundle, export_html, extract_data, write_html_export, HtmlParts, WebplayerAssets};
pub use manifest::{ExportManifest, ManifestHeader};
pub use messages::{ExportMessage, MessageType, Messages};
pub use packer::{ResolveStats, ResourcePacker};
pub use scene::SceneGraph;
pub use walker::{export_scene, write_json_export, ExportOutput};
