//! Resource lookup: packed media first, then files next to the export.

use std::borrow::Cow;
use std::cell::Cell;
use std::path::Path;

use indexmap::IndexMap;
use log::debug;

use crate::error::ExportError;
use crate::paths;

/// Lookup counters of one export.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ResolveStats {
    pub packed_hits: usize,
    pub disk_hits: usize,
    pub misses: usize,
}

/// Table of packed media keyed by manifest path, filled once per export and
/// reused by every later lookup.
#[derive(Debug, Default)]
pub struct ResourcePacker {
    packed: IndexMap<String, Vec<u8>>,
    stats: Cell<ResolveStats>,
}

impl ResourcePacker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register packed bytes under a manifest path. Returns `false` when the
    /// path is already known; identical content shares one path.
    pub fn register(&mut self, path: impl Into<String>, bytes: &[u8]) -> bool {
        let path = path.into();
        if self.packed.contains_key(&path) {
            return false;
        }
        self.packed.insert(path, bytes.to_vec());
        true
    }

    pub fn is_packed(&self, path: &str) -> bool {
        self.packed.contains_key(path)
    }

    /// Packed entries in registration order.
    pub fn packed(&self) -> impl Iterator<Item = (&str, &[u8])> {
        self.packed.iter().map(|(k, v)| (k.as_str(), v.as_slice()))
    }

    pub fn len(&self) -> usize {
        self.packed.len()
    }

    pub fn is_empty(&self) -> bool {
        self.packed.is_empty()
    }

    pub fn stats(&self) -> ResolveStats {
        self.stats.get()
    }

    fn count(&self, f: impl FnOnce(&mut ResolveStats)) {
        let mut s = self.stats.get();
        f(&mut s);
        self.stats.set(s);
    }

    /// Bytes of `path`: the packed entry if there is one, otherwise the file
    /// at `base_dir/path`. `Ok(None)` when neither exists; only a failed read
    /// of an existing file is an error.
    pub fn resolve(&self, path: &str, base_dir: &str) -> Result<Option<Cow<'_, [u8]>>, ExportError> {
        if let Some(bytes) = self.packed.get(path) {
            self.count(|s| s.packed_hits += 1);
            debug!("resolved {path} from packed data");
            return Ok(Some(Cow::Borrowed(bytes.as_slice())));
        }

        let full = paths::normalize(&paths::join(base_dir, path));
        if Path::new(&full).is_file() {
            let bytes = std::fs::read(&full).map_err(|e| ExportError::file(full.clone(), e))?;
            self.count(|s| s.disk_hits += 1);
            debug!("resolved {path} from {full}");
            return Ok(Some(Cow::Owned(bytes)));
        }

        self.count(|s| s.misses += 1);
        debug!("could not resolve {path} (looked in {full})");
        Ok(None)
    }

    pub fn clear(&mut self) {
        self.packed.clear();
        self.stats.set(ResolveStats::default());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn packed_wins_over_disk() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.png"), b"disk").unwrap();
        let base = dir.path().to_string_lossy().into_owned();

        let mut packer = ResourcePacker::new();
        assert!(packer.register("a.png", b"packed"));
        assert!(!packer.register("a.png", b"other"));

        let got = packer.resolve("a.png", &base).unwrap().unwrap();
        assert_eq!(&*got, b"packed");

        std::fs::write(dir.path().join("b.png"), b"disk").unwrap();
        let got = packer.resolve("b.png", &base).unwrap().unwrap();
        assert_eq!(&*got, b"disk");
        assert!(matches!(got, Cow::Owned(_)));

        assert!(packer.resolve("missing.png", &base).unwrap().is_none());
        assert_eq!(
            packer.stats(),
            ResolveStats {
                packed_hits: 1,
                disk_hits: 1,
                misses: 1
            }
        );
    }
}
