use serde::{Deserialize, Serialize};

/// Scene format version written into every manifest and binary header.
pub const FORMAT_VERSION: &str = "6.03";

/// Runtime textures bundled into every HTML export.
pub const SMAA_TEXTURES: [&str; 2] = ["smaa_area_texture.png", "smaa_search_texture.png"];

/// Export options.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExportConfig {
    /// `major.minor`, both parts numeric.
    pub format_version: String,
    /// Refuse to write anything when warnings or errors were produced.
    pub strict_mode: bool,
    /// Bundle `.altconv.*` media variants into HTML exports.
    pub export_converted_media: bool,
    /// Extra files copied from the webplayer directory into the HTML data map.
    pub runtime_assets: Vec<String>,
    pub template_name: String,
    pub script_name: String,
    pub style_name: String,
    /// Name of the manifest inside the HTML data map.
    pub html_main_file: String,
    pub json_pretty: bool,
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            format_version: FORMAT_VERSION.to_string(),
            strict_mode: false,
            export_converted_media: false,
            runtime_assets: SMAA_TEXTURES.iter().map(|s| s.to_string()).collect(),
            template_name: "webplayer_template.html".to_string(),
            script_name: "webplayer.min.js".to_string(),
            style_name: "webplayer.min.css".to_string(),
            html_main_file: "main.json".to_string(),
            json_pretty: false,
        }
    }
}

impl ExportConfig {
    /// `(major, minor)` of [`ExportConfig::format_version`].
    pub fn version_parts(&self) -> Option<(i32, i32)> {
        parse_version(&self.format_version)
    }
}

/// Parse `"major.minor"`.
pub fn parse_version(version: &str) -> Option<(i32, i32)> {
    let (major, minor) = version.split_once('.')?;
    Some((major.parse().ok()?, minor.parse().ok()?))
}
