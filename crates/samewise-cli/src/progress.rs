use std::path::Path;
use std::sync::Mutex;

use indicatif::{ProgressBar, ProgressStyle};
use samewise_core::{HashRecord, ProgressReporter};

/// CLI progress reporter using an indicatif byte bar.
///
/// The total grows as workers queue files, so the bar length is adjusted on
/// every report rather than fixed up front.
pub struct CliReporter {
    bar: Mutex<Option<ProgressBar>>,
}

impl CliReporter {
    pub fn new() -> Self {
        Self {
            bar: Mutex::new(None),
        }
    }

    fn ensure_bar(&self) -> ProgressBar {
        let mut guard = self.bar.lock().unwrap();
        guard
            .get_or_insert_with(|| {
                let pb = ProgressBar::new(0);
                pb.set_style(
                    ProgressStyle::with_template(
                        "  {spinner:.cyan} Hashing [{bar:30.cyan/dim}] {bytes}/{total_bytes} ({eta} remaining)",
                    )
                    .unwrap()
                    .progress_chars("━╸─")
                    .tick_chars("⠋⠙⠹⠸⠼⠴⠦⠧⠇⠏"),
                );
                pb.enable_steady_tick(std::time::Duration::from_millis(80));
                pb
            })
            .clone()
    }

    pub fn finish(&self) {
        let mut guard = self.bar.lock().unwrap();
        if let Some(pb) = guard.take() {
            pb.finish_and_clear();
        }
    }
}

impl Default for CliReporter {
    fn default() -> Self {
        Self::new()
    }
}

impl ProgressReporter for CliReporter {
    fn on_hash_queued(&self, _path: &Path, bytes_to_read: u64) {
        let pb = self.ensure_bar();
        pb.inc_length(bytes_to_read);
    }

    fn on_bytes_read(&self, _delta: u64, total_read: u64, total_to_read: u64) {
        let pb = self.ensure_bar();
        if pb.length() != Some(total_to_read) {
            pb.set_length(total_to_read);
        }
        pb.set_position(total_read);
    }

    fn on_entry_hashed(&self, _record: &HashRecord, _from_cache: bool) {}

    fn on_round_started(&self, segment_length: u64, candidate_groups: usize) {
        self.finish();
        let label = if segment_length == 0 {
            "whole contents".to_string()
        } else {
            format!("segment length {}", segment_length)
        };
        eprintln!(
            "  \x1b[36m→\x1b[0m Verifying {} group(s) at {}",
            candidate_groups, label
        );
    }

    fn on_round_complete(&self, _segment_length: u64, surviving_groups: usize) {
        self.finish();
        eprintln!("  \x1b[32m✓\x1b[0m {} group(s) survive", surviving_groups);
    }
}
