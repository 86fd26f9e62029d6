use std::path::Path;

use glob::Pattern;
use tracing::{debug, error};

/// Name of the per-directory ignore file.
pub const IGNORE_FILE_NAME: &str = ".dupeignore";

/// Glob-based exclusion predicate.
///
/// Built once per hash request from the configured patterns plus the nearest
/// `.dupeignore` file, then shared read-only by every worker.
#[derive(Debug, Default)]
pub struct IgnoreFilter {
    patterns: Vec<Pattern>,
}

impl IgnoreFilter {
    pub fn empty() -> Self {
        Self::default()
    }

    /// Compile glob patterns. Invalid patterns are logged and dropped.
    pub fn from_patterns<S: AsRef<str>>(globs: &[S]) -> Self {
        let patterns = globs
            .iter()
            .filter_map(|glob| match Pattern::new(glob.as_ref()) {
                Ok(p) => Some(p),
                Err(e) => {
                    error!("Invalid glob pattern '{}': {}", glob.as_ref(), e);
                    None
                }
            })
            .collect();
        Self { patterns }
    }

    /// Extend this filter with the `.dupeignore` file closest to `path`:
    /// the containing directory for files, the directory itself otherwise.
    pub async fn load_nearest(&mut self, path: &Path, is_directory: bool) {
        let dir = if is_directory {
            path
        } else {
            match path.parent() {
                Some(parent) => parent,
                None => return,
            }
        };

        let ignore_file = dir.join(IGNORE_FILE_NAME);
        let contents = match tokio::fs::read_to_string(&ignore_file).await {
            Ok(contents) => contents,
            // Absent ignore files are the norm.
            Err(_) => return,
        };

        let before = self.patterns.len();
        for line in contents.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            match Pattern::new(line) {
                Ok(p) => self.patterns.push(p),
                Err(e) => error!(
                    "Invalid pattern '{}' in {}: {}",
                    line,
                    ignore_file.display(),
                    e
                ),
            }
        }
        debug!(
            "Loaded {} patterns from {}",
            self.patterns.len() - before,
            ignore_file.display()
        );
    }

    pub fn is_ignored(&self, path: &Path) -> bool {
        self.patterns
            .iter()
            .any(|pattern| pattern.matches_path(path))
    }
}
