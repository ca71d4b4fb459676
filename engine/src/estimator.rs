//! Percentage, throughput and ETA estimation.
//!
//! Everything here is a pure function of byte counts and elapsed seconds.
//! Elapsed time is measured from job start and byte counts accumulate across
//! every file in the job, so a single ETA covers the whole transfer.

use serde::Serialize;

/// Percent complete in [0, 100]; 0 when there is nothing to copy.
pub fn percent(transferred: u64, total: u64) -> f64 {
    if total == 0 {
        return 0.0;
    }
    (transferred as f64 / total as f64 * 100.0).clamp(0.0, 100.0)
}

/// Average throughput in KiB per second; 0 until time has elapsed.
pub fn throughput_kbps(transferred: u64, elapsed_secs: f64) -> f64 {
    if elapsed_secs > 0.0 {
        (transferred as f64 / 1024.0) / elapsed_secs
    } else {
        0.0
    }
}

/// Seconds remaining at the given throughput, or `None` when throughput is zero.
pub fn eta_seconds(transferred: u64, total: u64, throughput_kbps: f64) -> Option<f64> {
    if !throughput_kbps.is_finite() || throughput_kbps <= 0.0 {
        return None;
    }
    let remaining = total.saturating_sub(transferred) as f64;
    Some((remaining / (throughput_kbps * 1024.0)).max(0.0))
}

/// Human readable ETA with integer truncation at each unit boundary.
pub fn format_eta(eta: Option<f64>) -> String {
    let secs = match eta {
        Some(s) if s.is_finite() => s.max(0.0) as u64,
        _ => return "unknown".to_string(),
    };

    if secs < 60 {
        format!("{} seconds", secs)
    } else if secs < 3600 {
        format!("{} minutes, {} seconds", secs / 60, secs % 60)
    } else {
        format!(
            "{} hours, {} minutes, {} seconds",
            secs / 3600,
            (secs % 3600) / 60,
            secs % 60
        )
    }
}

/// One estimation step.
///
/// `transferred` drives throughput (bytes actually written), `accounted`
/// drives completion (it also includes the unfinished bytes of failed files).
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Estimate {
    pub percent: f64,
    pub throughput_kbps: f64,
    pub eta_seconds: Option<f64>,
}

impl Estimate {
    pub fn compute(transferred: u64, accounted: u64, total: u64, elapsed_secs: f64) -> Self {
        let throughput = throughput_kbps(transferred, elapsed_secs);
        Estimate {
            percent: percent(accounted, total),
            throughput_kbps: throughput,
            eta_seconds: eta_seconds(accounted, total, throughput),
        }
    }
}
