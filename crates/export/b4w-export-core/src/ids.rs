//! Content digests and datablock identifiers.

use sha2::{Digest, Sha256};

/// Appended to packed media before hashing in HTML exports so HTML and
/// JSON exports of the same source never share file names.
pub const HTML_EXPORT_SALT: &[u8] = b"%html_export%";

fn hex(bytes: &[u8]) -> String {
    use std::fmt::Write;
    let mut out = String::with_capacity(bytes.len() * 2);
    for b in bytes {
        let _ = write!(out, "{b:02x}");
    }
    out
}

/// Lowercase hex SHA-256 of `data`.
pub fn digest_hex(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hex(&hasher.finalize())
}

/// Digest naming a packed media file.
pub fn media_digest(data: &[u8], html_export: bool) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    if html_export {
        hasher.update(HTML_EXPORT_SALT);
    }
    hex(&hasher.finalize())
}

/// Stable identifier of a datablock: digest of its type, name, and the
/// library it comes from (or the source blend path for local data).
pub fn gen_uuid(rna_type: &str, name: &str, library: Option<&str>, blend_path: &str) -> String {
    gen_uuid_with(rna_type, name, library, blend_path, "")
}

/// [`gen_uuid`] with an extra discriminator, for datablocks exported in
/// several variants.
pub fn gen_uuid_with(
    rna_type: &str,
    name: &str,
    library: Option<&str>,
    blend_path: &str,
    addition: &str,
) -> String {
    let mut s = String::with_capacity(rna_type.len() + name.len() + blend_path.len());
    s.push_str(rna_type);
    s.push_str(name);
    s.push_str(library.unwrap_or(blend_path));
    s.push_str(addition);
    digest_hex(s.as_bytes())
}
