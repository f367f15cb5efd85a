//! Disk usage tracking for shard files
//!
//! Shards are created by workers and removed once concatenated into the
//! composite file. Reports cumulative and peak scratch usage.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

/// Per-run tracker; shared by reference between workers
#[derive(Debug, Default)]
pub struct DiskUsage {
    current: AtomicU64,
    peak: AtomicU64,
    cumulative: AtomicU64,
    files: Mutex<Vec<(PathBuf, u64)>>,
}

/// Snapshot of the counters
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DiskUsageSummary {
    pub current: u64,
    pub peak: u64,
    pub cumulative: u64,
}

impl DiskUsage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a file that was just written
    pub fn track_file_created<P: AsRef<Path>>(&self, path: P) {
        let path = path.as_ref();
        if let Ok(metadata) = std::fs::metadata(path) {
            let size = metadata.len();
            self.add_bytes(size);
            if let Ok(mut files) = self.files.lock() {
                files.push((path.to_path_buf(), size));
            }
        }
    }

    /// Record that a tracked file was removed
    pub fn track_file_deleted<P: AsRef<Path>>(&self, path: P) {
        let path = path.as_ref();
        if let Ok(mut files) = self.files.lock() {
            if let Some(pos) = files.iter().position(|(p, _)| p == path) {
                let (_, size) = files.remove(pos);
                self.remove_bytes(size);
            }
        }
    }

    pub fn add_bytes(&self, bytes: u64) {
        self.cumulative.fetch_add(bytes, Ordering::Relaxed);
        let new_current = self.current.fetch_add(bytes, Ordering::Relaxed) + bytes;

        let mut peak = self.peak.load(Ordering::Relaxed);
        while new_current > peak {
            match self
                .peak
                .compare_exchange_weak(peak, new_current, Ordering::Relaxed, Ordering::Relaxed)
            {
                Ok(_) => break,
                Err(p) => peak = p,
            }
        }
    }

    pub fn remove_bytes(&self, bytes: u64) {
        self.current.fetch_sub(bytes, Ordering::Relaxed);
    }

    pub fn current_usage(&self) -> u64 {
        self.current.load(Ordering::Relaxed)
    }

    pub fn peak_usage(&self) -> u64 {
        self.peak.load(Ordering::Relaxed)
    }

    pub fn cumulative_written(&self) -> u64 {
        self.cumulative.load(Ordering::Relaxed)
    }

    pub fn summary(&self) -> DiskUsageSummary {
        DiskUsageSummary {
            current: self.current_usage(),
            peak: self.peak_usage(),
            cumulative: self.cumulative_written(),
        }
    }

    pub fn log_summary(&self) {
        let s = self.summary();
        log::info!("Shard disk usage summary:");
        log::info!("  Current:    {}", format_bytes(s.current));
        log::info!("  Peak:       {}", format_bytes(s.peak));
        log::info!("  Cumulative: {}", format_bytes(s.cumulative));
    }
}

/// Format bytes in human-readable form
pub fn format_bytes(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;
    const GB: u64 = MB * 1024;

    if bytes >= GB {
        format!("{:.2} GB", bytes as f64 / GB as f64)
    } else if bytes >= MB {
        format!("{:.2} MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.2} KB", bytes as f64 / KB as f64)
    } else {
        format!("{} bytes", bytes)
    }
}
