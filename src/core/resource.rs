//! Resource usage - Observed CPU and memory of a live process

use serde::{Deserialize, Serialize};

/// Resource usage of a running application, refreshed every tick
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ResourceUsage {
    /// CPU usage percentage
    pub cpu_percent: f32,
    /// Resident memory in bytes
    pub memory_bytes: u64,
}

impl ResourceUsage {
    /// Format memory as human-readable string
    pub fn memory_string(&self) -> String {
        format_bytes(self.memory_bytes)
    }

    /// Format CPU percentage
    pub fn cpu_string(&self) -> String {
        format!("{:.1}%", self.cpu_percent)
    }

    /// One-line summary for status displays
    pub fn summary(&self) -> String {
        format!("CPU: {} | Mem: {}", self.cpu_string(), self.memory_string())
    }
}

/// Format bytes as human-readable string
pub fn format_bytes(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;
    const GB: u64 = MB * 1024;

    if bytes >= GB {
        format!("{:.2} GB", bytes as f64 / GB as f64)
    } else if bytes >= MB {
        format!("{:.1} MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.1} KB", bytes as f64 / KB as f64)
    } else {
        format!("{} B", bytes)
    }
}
