//! Per-invocation export state.

use hashbrown::HashSet;
use log::{debug, info};

use crate::binary::BinaryBuffers;
use crate::config::ExportConfig;
use crate::error::ExportError;
use crate::messages::Messages;
use crate::packer::{ResolveStats, ResourcePacker};

/// Everything one export run accumulates: packed media, binary sections,
/// the set of datablocks already written, and diagnostics. Each export owns
/// its context exclusively.
#[derive(Debug)]
pub struct ExportContext {
    config: ExportConfig,
    version: (i32, i32),
    packer: ResourcePacker,
    binary: BinaryBuffers,
    exported: HashSet<String>,
    messages: Messages,
    export_path: String,
    html_export: bool,
}

impl ExportContext {
    /// Validate the configuration and set up an empty context.
    pub fn init(config: ExportConfig) -> Result<Self, ExportError> {
        let version = config.version_parts().ok_or_else(|| {
            ExportError::InvalidManifest(format!(
                "format version '{}' is not 'major.minor'",
                config.format_version
            ))
        })?;
        debug!("export context ready (format {})", config.format_version);
        Ok(Self {
            config,
            version,
            packer: ResourcePacker::new(),
            binary: BinaryBuffers::new(),
            exported: HashSet::new(),
            messages: Messages::default(),
            export_path: String::new(),
            html_export: false,
        })
    }

    /// Reset per-export state for a new target file.
    pub fn begin(&mut self, export_path: impl Into<String>, html_export: bool) {
        self.export_path = export_path.into();
        self.html_export = html_export;
        self.packer.clear();
        self.binary.clear();
        self.exported.clear();
        self.messages.clear();
    }

    /// Release the context, returning the lookup statistics of the last run.
    pub fn shutdown(self) -> ResolveStats {
        let stats = self.packer.stats();
        info!(
            "export finished: {} packed, {} from disk, {} missing",
            stats.packed_hits, stats.disk_hits, stats.misses
        );
        stats
    }

    pub fn config(&self) -> &ExportConfig {
        &self.config
    }

    pub fn version(&self) -> (i32, i32) {
        self.version
    }

    pub fn export_path(&self) -> &str {
        &self.export_path
    }

    pub fn is_html_export(&self) -> bool {
        self.html_export
    }

    pub fn packer(&self) -> &ResourcePacker {
        &self.packer
    }

    pub fn packer_mut(&mut self) -> &mut ResourcePacker {
        &mut self.packer
    }

    pub fn binary(&self) -> &BinaryBuffers {
        &self.binary
    }

    pub fn binary_mut(&mut self) -> &mut BinaryBuffers {
        &mut self.binary
    }

    /// Split borrow for encoders that write data and report problems.
    pub fn binary_and_messages_mut(&mut self) -> (&mut BinaryBuffers, &mut Messages) {
        (&mut self.binary, &mut self.messages)
    }

    pub fn messages(&self) -> &Messages {
        &self.messages
    }

    pub fn messages_mut(&mut self) -> &mut Messages {
        &mut self.messages
    }

    pub fn warn(&mut self, text: impl Into<String>) {
        self.messages.warn(text);
    }

    pub fn err(&mut self, text: impl Into<String>) {
        self.messages.err(text);
    }

    /// Record `uuid` as exported; `false` if it already was.
    pub fn mark_exported(&mut self, uuid: &str) -> bool {
        self.exported.insert(uuid.to_string())
    }

    pub fn is_exported(&self, uuid: &str) -> bool {
        self.exported.contains(uuid)
    }
}
