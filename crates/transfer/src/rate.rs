use std::time::Duration;

use crate::INITIAL_TRANSFER_RATE;

/// Worker-local adaptive transfer-rate estimate.
///
/// Seeded at 5 MiB/s. The first measured chunk replaces the seed outright;
/// every later measurement is averaged 50/50 with the running value, which
/// damps the wide per-chunk throughput variance enough for a once-per-second
/// synthetic progress ticker.
#[derive(Debug, Clone)]
pub struct RateEstimator {
    bytes_per_sec: i64,
    calibrated: bool,
}

impl RateEstimator {
    pub fn new() -> Self {
        Self {
            bytes_per_sec: INITIAL_TRANSFER_RATE,
            calibrated: false,
        }
    }

    /// Current estimate in bytes per second.
    pub fn bytes_per_sec(&self) -> i64 {
        self.bytes_per_sec
    }

    /// Folds in one measured transfer of `bytes` over `elapsed`.
    ///
    /// Sub-millisecond transfers are ignored; they carry no usable signal.
    pub fn record(&mut self, bytes: i64, elapsed: Duration) {
        let millis = elapsed.as_millis() as i64;
        if millis <= 0 {
            return;
        }
        let measured = 1000 * bytes / millis;
        self.bytes_per_sec = if self.calibrated {
            (measured + self.bytes_per_sec) / 2
        } else {
            measured
        };
        self.calibrated = true;
    }
}

impl Default for RateEstimator {
    fn default() -> Self {
        Self::new()
    }
}
