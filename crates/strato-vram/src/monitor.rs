//! System memory monitoring via `free` and PSI.

use async_trait::async_trait;
use serde::Serialize;
use std::time::Duration;
use tracing::{debug, info, warn};

/// PSI (Pressure Stall Information) averages from `/proc/pressure/memory`.
#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct PsiMetrics {
    /// `some avg10`: share of time at least one task stalled on memory.
    pub some_avg10: f64,
    /// `full avg10`: share of time all tasks stalled on memory.
    pub full_avg10: f64,
}

/// Point-in-time system memory state.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct MemoryStatus {
    /// Total system memory.
    pub total_gb: f64,
    /// Used memory.
    pub used_gb: f64,
    /// Available memory (the `available` column, not `free`).
    pub available_gb: f64,
    /// PSI averages.
    pub psi: PsiMetrics,
}

/// PSI `some avg10` level above which a pressure warning is logged.
const PSI_WARN_THRESHOLD: f64 = 20.0;

/// Fallback snapshot when `free` is unavailable (container without procps).
const FALLBACK_STATUS: MemoryStatus = MemoryStatus {
    total_gb: 128.0,
    used_gb: 100.0,
    available_gb: 28.0,
    psi: PsiMetrics {
        some_avg10: 0.0,
        full_avg10: 0.0,
    },
};

/// Memory monitoring seam.
#[async_trait]
pub trait MemoryMonitor: Send + Sync {
    /// Query system memory.
    async fn status(&self) -> MemoryStatus;

    /// Read PSI averages.
    async fn pressure(&self) -> PsiMetrics;

    /// Flush the buffer cache ahead of a large load. Best effort.
    async fn flush_cache(&self);
}

/// Monitor for unified-memory hosts where `nvidia-smi` reports nothing
/// useful: samples `free -b` and `/proc/pressure/memory`.
#[derive(Debug, Default)]
pub struct UnifiedMemoryMonitor;

impl UnifiedMemoryMonitor {
    /// Create a monitor.
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl MemoryMonitor for UnifiedMemoryMonitor {
    async fn status(&self) -> MemoryStatus {
        let psi = self.pressure().await;
        if psi.some_avg10 > PSI_WARN_THRESHOLD {
            warn!(
                some_avg10 = psi.some_avg10,
                full_avg10 = psi.full_avg10,
                "memory pressure detected"
            );
        }

        let output = tokio::time::timeout(
            Duration::from_secs(5),
            tokio::process::Command::new("free").arg("-b").output(),
        )
        .await;

        match output {
            Ok(Ok(out)) if out.status.success() => {
                match parse_free_output(&String::from_utf8_lossy(&out.stdout)) {
                    Some((total_gb, used_gb, available_gb)) => MemoryStatus {
                        total_gb,
                        used_gb,
                        available_gb,
                        psi,
                    },
                    None => {
                        warn!("could not parse `free -b` output");
                        MemoryStatus { psi, ..FALLBACK_STATUS }
                    },
                }
            },
            Ok(Ok(out)) => {
                warn!(code = ?out.status.code(), "`free -b` failed");
                MemoryStatus { psi, ..FALLBACK_STATUS }
            },
            Ok(Err(e)) => {
                warn!(error = %e, "could not run `free`");
                MemoryStatus { psi, ..FALLBACK_STATUS }
            },
            Err(_) => {
                warn!("`free -b` timed out");
                MemoryStatus { psi, ..FALLBACK_STATUS }
            },
        }
    }

    async fn pressure(&self) -> PsiMetrics {
        match tokio::fs::read_to_string("/proc/pressure/memory").await {
            Ok(content) => parse_psi(&content),
            Err(e) => {
                debug!(error = %e, "could not read PSI");
                PsiMetrics::default()
            },
        }
    }

    async fn flush_cache(&self) {
        info!("flushing buffer cache before large model load");
        let result = tokio::time::timeout(
            Duration::from_secs(10),
            tokio::process::Command::new("sh")
                .arg("-c")
                .arg("sync; echo 3 > /proc/sys/vm/drop_caches")
                .output(),
        )
        .await;

        match result {
            Ok(Ok(out)) if out.status.success() => info!("buffer cache flushed"),
            Ok(Ok(out)) => {
                // Typically EACCES inside a container; the external loader
                // is expected to flush in that deployment.
                warn!(
                    code = ?out.status.code(),
                    "cache flush failed (insufficient permissions?); proceeding"
                );
            },
            Ok(Err(e)) => warn!(error = %e, "cache flush could not run; proceeding"),
            Err(_) => warn!("cache flush timed out; proceeding"),
        }
    }
}

const BYTES_PER_GB: f64 = (1u64 << 30) as f64;

/// Parse `free -b` output: the `Mem:` row's total/used/available columns.
fn parse_free_output(stdout: &str) -> Option<(f64, f64, f64)> {
    let mem_line = stdout.lines().find(|l| l.starts_with("Mem:"))?;
    let parts: Vec<&str> = mem_line.split_whitespace().collect();
    // Mem: total used free shared buff/cache available
    let total: f64 = parts.get(1)?.parse().ok()?;
    let used: f64 = parts.get(2)?.parse().ok()?;
    let available: f64 = parts.get(6)?.parse().ok()?;
    Some((
        total / BYTES_PER_GB,
        used / BYTES_PER_GB,
        available / BYTES_PER_GB,
    ))
}

/// Parse `/proc/pressure/memory`, pulling `avg10` from both rows.
fn parse_psi(content: &str) -> PsiMetrics {
    let mut psi = PsiMetrics::default();
    for line in content.lines() {
        let target = if line.starts_with("some") {
            &mut psi.some_avg10
        } else if line.starts_with("full") {
            &mut psi.full_avg10
        } else {
            continue;
        };
        for part in line.split_whitespace() {
            if let Some(value) = part.strip_prefix("avg10=") {
                if let Ok(parsed) = value.parse() {
                    *target = parsed;
                }
            }
        }
    }
    psi
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_free_output() {
        let stdout = "\
               total        used        free      shared  buff/cache   available
Mem:    137438953472 107374182400  8589934592  1073741824 21474836480 26843545600
Swap:              0           0           0
";
        let (total, used, available) = parse_free_output(stdout).unwrap();
        assert!((total - 128.0).abs() < 0.01);
        assert!((used - 100.0).abs() < 0.01);
        assert!((available - 25.0).abs() < 0.01);
    }

    #[test]
    fn test_parse_free_garbage() {
        assert!(parse_free_output("not free output").is_none());
    }

    #[test]
    fn test_parse_psi() {
        let content = "\
some avg10=12.34 avg60=5.00 avg300=1.00 total=123456
full avg10=3.21 avg60=1.00 avg300=0.10 total=654321
";
        let psi = parse_psi(content);
        assert!((psi.some_avg10 - 12.34).abs() < f64::EPSILON);
        assert!((psi.full_avg10 - 3.21).abs() < f64::EPSILON);
    }

    #[test]
    fn test_parse_psi_empty() {
        let psi = parse_psi("");
        assert!((psi.some_avg10).abs() < f64::EPSILON);
    }
}
