use std::sync::atomic::{AtomicU64, Ordering};
use serde_derive::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatsConfig {

    // Span of the smoothed-rate window in seconds.
    pub smoothing_window_secs: u64,

    // Data send rate persisted when the previous session closed.
    pub send_rate_at_close: u64,

}

impl Default for StatsConfig {
    fn default() -> StatsConfig {
        StatsConfig {
            smoothing_window_secs: 60,
            send_rate_at_close: 0,
        }
    }
}

// Settings the engine polls rather than caches. The smoothing window can
// change at runtime; the close-time rate is written back at shutdown.
pub trait SettingsSource: Send + Sync {

    fn smoothing_window_secs(&self) -> u64;

    fn send_rate_at_close(&self) -> u64;

    fn set_send_rate_at_close(&self, rate: u64);

}

// In-memory settings, used when no external configuration store is
// wired up.
#[derive(Debug)]
pub struct MemorySettings {
    smoothing_window_secs: AtomicU64,
    send_rate_at_close: AtomicU64,
}

impl MemorySettings {

    pub fn new(config: StatsConfig) -> MemorySettings {
        MemorySettings {
            smoothing_window_secs: AtomicU64::new(config.smoothing_window_secs),
            send_rate_at_close: AtomicU64::new(config.send_rate_at_close),
        }
    }

    pub fn set_smoothing_window_secs(&self, secs: u64) {
        self.smoothing_window_secs.store(secs, Ordering::Relaxed);
    }
}

impl Default for MemorySettings {
    fn default() -> MemorySettings {
        MemorySettings::new(StatsConfig::default())
    }
}

impl SettingsSource for MemorySettings {

    fn smoothing_window_secs(&self) -> u64 {
        self.smoothing_window_secs.load(Ordering::Relaxed)
    }

    fn send_rate_at_close(&self) -> u64 {
        self.send_rate_at_close.load(Ordering::Relaxed)
    }

    fn set_send_rate_at_close(&self, rate: u64) {
        self.send_rate_at_close.store(rate, Ordering::Relaxed);
    }
}
