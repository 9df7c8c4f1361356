// SPDX-License-Identifier: GPL-3.0-only

//! Progress arithmetic and a sink that keeps the latest copy state

use std::time::{Duration, Instant};

use crate::copy::ProgressSink;

pub fn compute_progress_percent(done: u64, total: u64) -> f64 {
    if total == 0 {
        return 0.0;
    }

    let ratio = done as f64 / total as f64;
    (ratio * 100.0).clamp(0.0, 100.0)
}

pub fn compute_eta(done: u64, total: u64, started_at: Instant) -> Option<Duration> {
    if total == 0 || done == 0 {
        return None;
    }

    if done >= total {
        return Some(Duration::from_secs(0));
    }

    let elapsed = started_at.elapsed();
    if elapsed.is_zero() {
        return None;
    }

    let throughput = done as f64 / elapsed.as_secs_f64();
    let remaining = (total - done) as f64;
    Some(Duration::from_secs_f64((remaining / throughput).max(0.0)))
}

pub fn format_eta(eta: Option<Duration>) -> String {
    let Some(eta) = eta else {
        return "--:--:--".to_string();
    };

    let total_secs = eta.as_secs();
    let hours = total_secs / 3600;
    let minutes = (total_secs % 3600) / 60;
    let seconds = total_secs % 60;

    format!("{hours:02}:{minutes:02}:{seconds:02}")
}

pub fn format_bytes(bytes: u64) -> String {
    const UNITS: [&str; 6] = ["B", "KiB", "MiB", "GiB", "TiB", "PiB"];
    let mut unit_index = 0;
    let mut value = bytes as f64;

    while value >= 1024.0 && unit_index < UNITS.len() - 1 {
        value /= 1024.0;
        unit_index += 1;
    }

    if unit_index == 0 {
        format!("{} {}", bytes, UNITS[unit_index])
    } else {
        format!("{value:.1} {}", UNITS[unit_index])
    }
}

/// Latest `(done, total)` of a copy, in source sectors
#[derive(Debug, Clone)]
pub struct ProgressTracker {
    sector_size: u64,
    started_at: Instant,
    done: i64,
    total: i64,
    updates: usize,
}

impl ProgressTracker {
    pub fn new(sector_size: u32) -> Self {
        Self {
            sector_size: u64::from(sector_size),
            started_at: Instant::now(),
            done: 0,
            total: 0,
            updates: 0,
        }
    }

    pub fn sectors_done(&self) -> i64 {
        self.done
    }

    pub fn sectors_total(&self) -> i64 {
        self.total
    }

    /// Notifications received so far
    pub fn updates(&self) -> usize {
        self.updates
    }

    pub fn bytes_done(&self) -> u64 {
        self.done.max(0) as u64 * self.sector_size
    }

    pub fn percent(&self) -> f64 {
        compute_progress_percent(self.done.max(0) as u64, self.total.max(0) as u64)
    }

    pub fn eta(&self) -> Option<Duration> {
        compute_eta(
            self.done.max(0) as u64,
            self.total.max(0) as u64,
            self.started_at,
        )
    }

    /// One-line summary, e.g. `42.0% | 1.5 GiB copied | ETA 00:01:10`
    pub fn render(&self) -> String {
        format!(
            "{:>5.1}% | {} copied | ETA {}",
            self.percent(),
            format_bytes(self.bytes_done()),
            format_eta(self.eta())
        )
    }
}

impl ProgressSink for ProgressTracker {
    fn progress(&mut self, sectors_transferred: i64, total_sectors: i64) {
        self.done = sectors_transferred;
        self.total = total_sectors;
        self.updates += 1;
    }
}
