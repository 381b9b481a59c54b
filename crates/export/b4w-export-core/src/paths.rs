//! Purely lexical path handling for manifest paths.
//!
//! Manifest paths always use `/`, never touch the filesystem, and behave
//! the same on every host. Windows drive letters are recognised so that a
//! resource on another drive can be rejected instead of producing a broken
//! relative path.

use crate::error::ExportError;

/// Replace every backslash with a forward slash.
pub fn guard_slashes(path: &str) -> String {
    path.replace('\\', "/")
}

/// Drop Blender's `//` "relative to the blend file" prefix.
pub fn strip_blend_prefix(path: &str) -> &str {
    path.strip_prefix("//").unwrap_or(path)
}

#[derive(Clone, Debug, PartialEq, Eq)]
struct Lexical {
    drive: Option<char>,
    absolute: bool,
    parts: Vec<String>,
}

impl Lexical {
    fn parse(path: &str) -> Self {
        let path = guard_slashes(path);
        let bytes = path.as_bytes();
        let (drive, rest) = if bytes.len() >= 2 && bytes[1] == b':' && bytes[0].is_ascii_alphabetic()
        {
            (Some(bytes[0].to_ascii_uppercase() as char), &path[2..])
        } else {
            (None, path.as_str())
        };
        let absolute = rest.starts_with('/');

        let mut parts: Vec<String> = Vec::new();
        for part in rest.split('/') {
            match part {
                "" | "." => {}
                ".." => match parts.last() {
                    Some(last) if last != ".." => {
                        parts.pop();
                    }
                    // `..` above the root of an absolute path is the root
                    _ if absolute => {}
                    _ => parts.push(part.to_string()),
                },
                _ => parts.push(part.to_string()),
            }
        }
        Self {
            drive,
            absolute,
            parts,
        }
    }

    fn render(&self) -> String {
        let mut out = String::new();
        if let Some(d) = self.drive {
            out.push(d);
            out.push(':');
        }
        if self.absolute {
            out.push('/');
        }
        out.push_str(&self.parts.join("/"));
        if out.is_empty() {
            out.push('.');
        }
        out
    }
}

/// Lexically normalize: collapse separators, drop `.`, resolve `..`.
pub fn normalize(path: &str) -> String {
    Lexical::parse(path).render()
}

pub fn is_absolute(path: &str) -> bool {
    Lexical::parse(path).absolute
}

/// Parent directory, `""` for a bare file name.
pub fn dirname(path: &str) -> &str {
    let idx = path.rfind(['/', '\\']);
    match idx {
        Some(0) => &path[..1],
        Some(i) => &path[..i],
        None => "",
    }
}

/// File name without its directory.
pub fn file_name(path: &str) -> &str {
    match path.rfind(['/', '\\']) {
        Some(i) => &path[i + 1..],
        None => path,
    }
}

/// Split off the extension, including its dot (`"a/b.png"` -> `("a/b", ".png")`).
pub fn split_ext(path: &str) -> (&str, &str) {
    let name_start = path.rfind(['/', '\\']).map_or(0, |i| i + 1);
    match path[name_start..].rfind('.') {
        Some(0) | None => (path, ""),
        Some(i) => path.split_at(name_start + i),
    }
}

/// Join `path` onto `base` unless it is already absolute.
pub fn join(base: &str, path: &str) -> String {
    if base.is_empty() || is_absolute(path) {
        return path.to_string();
    }
    let base = base.trim_end_matches(['/', '\\']);
    format!("{base}/{path}")
}

/// Express `path` relative to the directory `base`.
///
/// Both must be absolute, or both relative to the same directory. Paths on
/// different drives have no relative form and yield [`ExportError::Path`].
pub fn relative_to(path: &str, base: &str) -> Result<String, ExportError> {
    let target = Lexical::parse(path);
    let start = Lexical::parse(base);
    if target.drive != start.drive {
        return Err(ExportError::Path(format!(
            "Loading of resources from different disk is forbidden. Couldn't load {}",
            target.render()
        )));
    }
    if target.absolute != start.absolute {
        return Err(ExportError::Path(format!(
            "Cannot relate '{}' to '{}'",
            target.render(),
            start.render()
        )));
    }

    let common = target
        .parts
        .iter()
        .zip(&start.parts)
        .take_while(|(a, b)| a == b)
        .count();
    let mut parts: Vec<&str> = Vec::new();
    parts.extend(std::iter::repeat("..").take(start.parts.len() - common));
    parts.extend(target.parts[common..].iter().map(String::as_str));
    if parts.is_empty() {
        return Ok(".".to_string());
    }
    Ok(parts.join("/"))
}

/// Path of a resource, given relative to the blend file, rewritten
/// relative to the exported JSON file.
pub fn json_relative_filepath(
    resource: &str,
    blend_path: &str,
    export_path: &str,
) -> Result<String, ExportError> {
    let res = normalize(&join(dirname(blend_path), strip_blend_prefix(resource)));
    let rel = relative_to(&res, dirname(export_path))?;
    Ok(guard_slashes(&normalize(&rel)))
}

/// Source blend file relative to the export file, `""` when the source was
/// never saved.
pub fn blend_relative_to_export(blend_path: &str, export_path: &str) -> Result<String, ExportError> {
    if blend_path.is_empty() {
        return Ok(String::new());
    }
    relative_to(blend_path, dirname(export_path)).map_err(|_| {
        ExportError::Path("Export to different disk is forbidden".to_string())
    })
}
