use config::{Config, ConfigError, File as ConfigFile};
use serde::Deserialize;
use std::path::Path;

fn default_max_jobs() -> usize {
    32
}

fn default_initial_segment_length() -> u64 {
    8192
}

fn default_cache_path() -> String {
    "Cache.db".to_string()
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    /// Roots to scan. Overlapping entries are pruned before scanning.
    #[serde(default)]
    pub root_paths: Vec<String>,

    /// Glob patterns excluded everywhere, merged with per-tree `.dupeignore`.
    #[serde(default)]
    pub ignore_patterns: Vec<String>,

    /// Permit count of the hashing semaphore: the maximum number of
    /// concurrently open files.
    #[serde(default = "default_max_jobs")]
    pub max_jobs: usize,

    /// Sample window size of the first verification round.
    #[serde(default = "default_initial_segment_length")]
    pub initial_segment_length: u64,

    /// Location of the persistent fingerprint cache.
    #[serde(default = "default_cache_path")]
    pub cache_path: String,

    /// Bulk-load a directory's subtree rows when the directory itself is
    /// found in the persistent cache.
    #[serde(default = "default_true")]
    pub precache_directories: bool,

    /// Serve file lookups from the pre-cached in-memory tier only, never
    /// through single-row persistent queries.
    #[serde(default = "default_true")]
    pub restrict_files_to_mem_cache: bool,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            root_paths: Vec::new(),
            ignore_patterns: Vec::new(),
            max_jobs: default_max_jobs(),
            initial_segment_length: default_initial_segment_length(),
            cache_path: default_cache_path(),
            precache_directories: true,
            restrict_files_to_mem_cache: true,
        }
    }
}

pub fn load_configuration() -> Result<AppConfig, ConfigError> {
    let builder = Config::builder()
        .add_source(ConfigFile::with_name("Config").required(false))
        .build()?;
    builder.try_deserialize::<AppConfig>()
}

/// Collapse the root list so no kept root lies inside another; a subtree is
/// never walked twice.
pub fn non_overlapping_directories(dirs: Vec<String>) -> Vec<String> {
    let mut kept: Vec<String> = Vec::new();

    for candidate in dirs {
        let candidate_path = Path::new(&candidate);

        if kept
            .iter()
            .any(|root| candidate_path.starts_with(Path::new(root)))
        {
            continue;
        }
        // The candidate may itself cover roots accepted earlier.
        kept.retain(|root| !Path::new(root).starts_with(candidate_path));
        kept.push(candidate);
    }

    kept
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documentation() {
        let config = AppConfig::default();
        assert_eq!(config.max_jobs, 32);
        assert_eq!(config.initial_segment_length, 8192);
        assert_eq!(config.cache_path, "Cache.db");
        assert!(config.precache_directories);
        assert!(config.restrict_files_to_mem_cache);
    }

    #[test]
    fn disjoint_roots_are_all_kept() {
        let roots = vec![
            "/srv/media".to_string(),
            "/srv/backups".to_string(),
            "/opt/archive".to_string(),
        ];
        let kept = non_overlapping_directories(roots.clone());
        assert_eq!(kept, roots);
    }

    #[test]
    fn nested_roots_collapse_into_their_ancestor() {
        let roots = vec![
            "/srv/media".to_string(),
            "/srv/media/albums/2024".to_string(),
            "/opt/archive".to_string(),
        ];
        let kept = non_overlapping_directories(roots);
        assert_eq!(kept, vec!["/srv/media".to_string(), "/opt/archive".to_string()]);
    }

    #[test]
    fn ancestor_listed_after_its_children_still_wins() {
        let roots = vec![
            "/srv/media/albums".to_string(),
            "/srv/media/raw".to_string(),
            "/srv/media".to_string(),
        ];
        let kept = non_overlapping_directories(roots);
        assert_eq!(kept, vec!["/srv/media".to_string()]);
    }

    #[test]
    fn name_prefix_is_not_path_overlap() {
        // "/srv/media-old" shares a string prefix with "/srv/media" but is
        // a sibling, not a subtree.
        let roots = vec!["/srv/media".to_string(), "/srv/media-old".to_string()];
        let kept = non_overlapping_directories(roots.clone());
        assert_eq!(kept, roots);
    }
}
