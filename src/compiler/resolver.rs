//! Import path resolution for the driver.
//!
//! Imports resolve relative to the importing file first, then the driver's
//! base directory. The processing stack detects cycles (a file reached
//! while still being processed); the resolved set memoizes finished files.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

pub struct FileResolver {
    base_dir: PathBuf,
    processing_stack: Vec<PathBuf>,
    resolved_files: HashSet<PathBuf>,
}

impl FileResolver {
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
            processing_stack: Vec::new(),
            resolved_files: HashSet::new(),
        }
    }

    pub fn normalize(&self, path: &Path) -> PathBuf {
        path.canonicalize().unwrap_or_else(|_| path.to_path_buf())
    }

    /// Resolve an import path against the importing file's directory, then
    /// the base directory. Returns the normalized path when found.
    pub fn resolve_import(&self, import_path: &str, importing_file: &Path) -> Option<PathBuf> {
        let importing_dir = importing_file
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .map(Path::to_path_buf)
            .unwrap_or_else(|| self.base_dir.clone());

        let candidate = importing_dir.join(import_path);
        if candidate.exists() {
            return Some(self.normalize(&candidate));
        }

        let fallback = self.base_dir.join(import_path);
        if fallback.exists() {
            return Some(self.normalize(&fallback));
        }

        None
    }

    pub fn is_processing(&self, path: &Path) -> bool {
        let normalized = self.normalize(path);
        self.processing_stack.contains(&normalized)
    }

    pub fn begin_processing(&mut self, path: &Path) {
        self.processing_stack.push(self.normalize(path));
    }

    pub fn end_processing(&mut self, path: &Path) {
        let normalized = self.normalize(path);
        if let Some(pos) = self.processing_stack.iter().rposition(|p| *p == normalized) {
            self.processing_stack.remove(pos);
        }
    }

    pub fn mark_resolved(&mut self, path: &Path) {
        let normalized = self.normalize(path);
        self.resolved_files.insert(normalized);
    }

    pub fn is_resolved(&self, path: &Path) -> bool {
        self.resolved_files.contains(&self.normalize(path))
    }

    /// The files currently being processed, in dependency order, for cycle
    /// diagnostics.
    pub fn processing_stack(&self) -> &[PathBuf] {
        &self.processing_stack
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cycle_detection_via_stack() {
        let mut resolver = FileResolver::new(".");
        let a = Path::new("a.box");
        assert!(!resolver.is_processing(a));
        resolver.begin_processing(a);
        assert!(resolver.is_processing(a));
        resolver.end_processing(a);
        assert!(!resolver.is_processing(a));
    }

    #[test]
    fn test_resolved_memoization() {
        let mut resolver = FileResolver::new(".");
        let a = Path::new("b.box");
        assert!(!resolver.is_resolved(a));
        resolver.mark_resolved(a);
        assert!(resolver.is_resolved(a));
    }

    #[test]
    fn test_missing_import_is_none() {
        let resolver = FileResolver::new(".");
        assert!(resolver
            .resolve_import("definitely_missing.box", Path::new("main.box"))
            .is_none());
    }
}
