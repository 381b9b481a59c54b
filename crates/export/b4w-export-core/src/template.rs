//! `$name` / `${name}` placeholder substitution for the player template.
//!
//! `$$` is a literal dollar sign. Any other `$` that does not start a
//! placeholder, or a placeholder without a value, is an error.

use indexmap::IndexMap;

use crate::error::ExportError;

fn is_ident_start(c: char) -> bool {
    c == '_' || c.is_ascii_alphabetic()
}

fn is_ident(c: char) -> bool {
    c == '_' || c.is_ascii_alphanumeric()
}

/// Replace every placeholder in `template` with its value from `values`.
pub fn substitute(template: &str, values: &IndexMap<&str, String>) -> Result<String, ExportError> {
    let mut out = String::with_capacity(template.len() + values.values().map(String::len).sum::<usize>());
    let mut rest = template;

    while let Some(pos) = rest.find('$') {
        out.push_str(&rest[..pos]);
        let after = &rest[pos + 1..];
        let line = template[..template.len() - rest.len() + pos].matches('\n').count() + 1;

        if let Some(tail) = after.strip_prefix('$') {
            out.push('$');
            rest = tail;
            continue;
        }

        let (name, tail) = if let Some(braced) = after.strip_prefix('{') {
            let end = braced.find('}').ok_or_else(|| {
                ExportError::Template(format!("unterminated placeholder on line {line}"))
            })?;
            (&braced[..end], &braced[end + 1..])
        } else {
            let end = after.find(|c: char| !is_ident(c)).unwrap_or(after.len());
            (&after[..end], &after[end..])
        };

        if !name.starts_with(is_ident_start) || !name.chars().all(is_ident) {
            return Err(ExportError::Template(format!(
                "invalid placeholder on line {line}"
            )));
        }
        let value = values
            .get(name)
            .ok_or_else(|| ExportError::Template(format!("no value for '${name}'")))?;
        out.push_str(value);
        rest = tail;
    }
    out.push_str(rest);
    Ok(out)
}
