//! Percentage, speed and ETA computation for a running transfer.

use std::time::Duration;

/// Bytes per mebibyte, the unit speeds are displayed in
const BYTES_PER_MIB: f64 = 1_048_576.0;

/// Receiver of per-chunk progress, decoupling the transfer from whoever tracks state.
///
/// Called synchronously from the download loop; implementations must be cheap.
pub trait ProgressCallback: Send + Sync {
    /// `percentage` is 0.0 to 100.0, `speed` is formatted like "1.00 MB/s",
    /// `eta` like "2m 5s" (absent until a positive speed is known).
    fn on_progress(&self, percentage: f64, speed: &str, eta: Option<&str>);
}

impl<F> ProgressCallback for F
where
    F: Fn(f64, &str, Option<&str>) + Send + Sync,
{
    fn on_progress(&self, percentage: f64, speed: &str, eta: Option<&str>) {
        self(percentage, speed, eta)
    }
}

/// Callback that discards every update
pub struct NoProgress;

impl ProgressCallback for NoProgress {
    fn on_progress(&self, _percentage: f64, _speed: &str, _eta: Option<&str>) {}
}

/// One computed progress sample
#[derive(Clone, Debug, PartialEq)]
pub struct ProgressUpdate {
    /// 0.0 to 100.0; exactly 100.0 only once every announced byte is written
    pub percentage: f64,
    /// Average rate since the transfer started
    pub bytes_per_second: f64,
    /// Formatted rate, e.g. "1.00 MB/s"
    pub speed_label: String,
    /// Formatted time remaining; `None` while the rate is not positive
    pub eta_label: Option<String>,
}

/// Tracks bytes written against the announced content length.
#[derive(Debug)]
pub struct ProgressMeter {
    total: Option<u64>,
    written: u64,
}

impl ProgressMeter {
    /// A zero content length is treated as unknown.
    pub fn new(content_length: Option<u64>) -> Self {
        Self {
            total: content_length.filter(|&n| n > 0),
            written: 0,
        }
    }

    /// Total bytes recorded so far
    pub fn bytes_written(&self) -> u64 {
        self.written
    }

    /// Announced content length, if known
    pub fn total(&self) -> Option<u64> {
        self.total
    }

    /// Record `bytes` more written after `elapsed` since the start.
    ///
    /// Returns `None` when the content length is unknown: percentage, speed and
    /// ETA are only reported against a known positive total.
    pub fn record(&mut self, bytes: u64, elapsed: Duration) -> Option<ProgressUpdate> {
        self.written += bytes;
        let total = self.total?;

        let percentage = if self.written >= total {
            100.0
        } else {
            (self.written as f64 / total as f64 * 100.0).min(100.0)
        };

        let elapsed_secs = elapsed.as_secs_f64();
        let bytes_per_second = if elapsed_secs > 0.0 {
            self.written as f64 / elapsed_secs
        } else {
            0.0
        };

        let eta_label = (bytes_per_second > 0.0).then(|| {
            let remaining = total.saturating_sub(self.written) as f64;
            format_eta(remaining / bytes_per_second)
        });

        Some(ProgressUpdate {
            percentage,
            bytes_per_second,
            speed_label: format_speed(bytes_per_second),
            eta_label,
        })
    }
}

/// Format a byte rate as MB/s with two decimals.
pub fn format_speed(bytes_per_second: f64) -> String {
    format!("{:.2} MB/s", bytes_per_second / BYTES_PER_MIB)
}

/// Format seconds as "<minutes>m <seconds>s", flooring to whole seconds.
pub fn format_eta(seconds: f64) -> String {
    let whole = if seconds.is_finite() && seconds > 0.0 {
        seconds.floor() as u64
    } else {
        0
    };
    format!("{}m {}s", whole / 60, whole % 60)
}
