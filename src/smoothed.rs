use crate::average::MovingAverage;

// Configurable window bounds, matching the client settings range.
const MIN_WINDOW_SECS: u64 = 30;
const MAX_WINDOW_SECS: u64 = 1800;

fn clamp_window(secs: u64) -> u64 {
    secs.clamp(MIN_WINDOW_SECS, MAX_WINDOW_SECS)
}

// Ticks between recomputes for a given window.
fn interval_for(window_secs: u64) -> u64 {
    (window_secs / 60).max(1)
}

// Coarse smoothed send/receive rates derived from cumulative totals,
// recomputed once per smoothing interval rather than per tick.
#[derive(Debug)]
pub struct SmoothedRateTracker {

    window_secs: u64,

    interval_ticks: u64,

    send_average: MovingAverage,

    recv_average: MovingAverage,

    // Cumulative totals at the last recompute.
    last_sent: u64,

    last_recv: u64,

}

impl SmoothedRateTracker {

    pub fn new(window_secs: u64) -> SmoothedRateTracker {
        let window_secs = clamp_window(window_secs);
        let interval_ticks = interval_for(window_secs);
        let samples = (window_secs / interval_ticks) as usize;
        SmoothedRateTracker {
            window_secs,
            interval_ticks,
            send_average: MovingAverage::new(samples),
            recv_average: MovingAverage::new(samples),
            last_sent: 0,
            last_recv: 0,
        }
    }

    pub fn interval_ticks(&self) -> u64 {
        self.interval_ticks
    }

    // The window is re-polled on every recompute. A change resets the
    // averages rather than rescaling them, so a reconfiguration shows up
    // as a discontinuity in the smoothed rates.
    pub fn recompute(&mut self, window_secs: u64, total_sent: u64, total_recv: u64) {
        let window_secs = clamp_window(window_secs);
        if window_secs != self.window_secs {
            *self = SmoothedRateTracker {
                last_sent: self.last_sent,
                last_recv: self.last_recv,
                ..SmoothedRateTracker::new(window_secs)
            };
        }
        self.send_average.update(total_sent.saturating_sub(self.last_sent) as f64);
        self.recv_average.update(total_recv.saturating_sub(self.last_recv) as f64);
        self.last_sent = total_sent;
        self.last_recv = total_recv;
    }

    // Average per-interval delta spread over the interval, in bytes/sec.
    pub fn send_rate(&self) -> u64 {
        (self.send_average.average() / self.interval_ticks as f64) as u64
    }

    pub fn receive_rate(&self) -> u64 {
        (self.recv_average.average() / self.interval_ticks as f64) as u64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn interval_scales_with_window() {
        assert_eq!(SmoothedRateTracker::new(60).interval_ticks(), 1);
        assert_eq!(SmoothedRateTracker::new(1800).interval_ticks(), 30);
        // Below the minimum the window clamps to 30s.
        assert_eq!(SmoothedRateTracker::new(5).interval_ticks(), 1);
    }

    #[test]
    fn smoothed_rate_tracks_per_interval_deltas() {
        let mut tracker = SmoothedRateTracker::new(60);
        let mut total = 0;
        for _ in 0..60 {
            total += 5000;
            tracker.recompute(60, total, total * 2);
        }
        assert_eq!(tracker.send_rate(), 5000);
        assert_eq!(tracker.receive_rate(), 10_000);
    }

    #[test]
    fn window_change_resets_averages() {
        let mut tracker = SmoothedRateTracker::new(60);
        tracker.recompute(60, 1_000_000, 0);
        assert!(tracker.send_rate() > 0);

        // Reconfigured mid-stream: averages restart, baselines are kept,
        // and the change-tick recompute itself contributes a 0-byte
        // sample to the fresh average.
        tracker.recompute(120, 1_000_000, 0);
        assert_eq!(tracker.interval_ticks(), 2);
        assert_eq!(tracker.send_rate(), 0);

        // Samples so far: [0, 12000]; average 6000 over the 2-tick
        // interval.
        tracker.recompute(120, 1_012_000, 0);
        assert_eq!(tracker.send_rate(), 3000);
    }
}
