use std::collections::VecDeque;
use std::time::Instant;

// Extra slots kept beyond the window so reads can exclude the slot
// currently being filled.
const SLACK_SLOTS: usize = 2;

// Windowed rate estimator. Byte counts land in fixed-width time slots;
// the rate over a span is the sum of the most recent complete slots
// divided by the span. Time is monotonic milliseconds relative to
// construction.
#[derive(Debug)]
pub struct Average {

    // Width of one slot in milliseconds.
    granularity_ms: u64,

    // Number of slots in the default window.
    period: usize,

    slots: Vec<u64>,

    // Absolute index of the most recently touched slot.
    last_slot: u64,

    origin: Instant,

}

impl Average {

    pub fn new(granularity_ms: u64, period: usize) -> Average {
        Average {
            granularity_ms,
            period,
            slots: vec![0; period + SLACK_SLOTS],
            last_slot: 0,
            origin: Instant::now(),
        }
    }

    pub fn add(&mut self, value: u64) {
        self.add_at(self.now_ms(), value);
    }

    // Bytes per second over the default window.
    pub fn rate(&mut self) -> u64 {
        self.rate_at(self.now_ms(), self.period as u64)
    }

    // Bytes per second over an explicit lookback, clamped to the window.
    pub fn rate_over(&mut self, span_secs: u64) -> u64 {
        self.rate_at(self.now_ms(), span_secs)
    }

    fn now_ms(&self) -> u64 {
        self.origin.elapsed().as_millis() as u64
    }

    fn add_at(&mut self, now_ms: u64, value: u64) {
        let slot = self.advance(now_ms);
        let len = self.slots.len() as u64;
        self.slots[(slot % len) as usize] += value;
    }

    fn rate_at(&mut self, now_ms: u64, span: u64) -> u64 {
        let slot = self.advance(now_ms);
        let span = span.clamp(1, self.period as u64);
        let len = self.slots.len() as u64;
        let mut sum = 0;
        // Walk backwards from the last complete slot.
        for i in 0..span {
            if slot <= i {
                break;
            }
            sum += self.slots[((slot - 1 - i) % len) as usize];
        }
        sum * 1000 / (span * self.granularity_ms)
    }

    // Zero any slots gone stale since the last touch and return the
    // current slot index.
    fn advance(&mut self, now_ms: u64) -> u64 {
        let slot = now_ms / self.granularity_ms;
        let len = self.slots.len() as u64;
        if slot > self.last_slot {
            let stale = (slot - self.last_slot).min(len);
            for i in 0..stale {
                self.slots[((self.last_slot + 1 + i) % len) as usize] = 0;
            }
            self.last_slot = slot;
        }
        slot
    }
}

// Immediate moving average over the last `size` samples. Feeding zeros
// decays it toward zero.
#[derive(Debug, Clone)]
pub struct MovingAverage {

    samples: VecDeque<f64>,

    size: usize,

    sum: f64,

}

impl MovingAverage {

    pub fn new(size: usize) -> MovingAverage {
        MovingAverage {
            samples: VecDeque::with_capacity(size),
            size,
            sum: 0.0,
        }
    }

    pub fn update(&mut self, value: f64) -> f64 {
        self.samples.push_back(value);
        self.sum += value;
        if self.samples.len() > self.size {
            if let Some(oldest) = self.samples.pop_front() {
                self.sum -= oldest;
            }
        }
        self.average()
    }

    pub fn average(&self) -> f64 {
        if self.samples.is_empty() {
            0.0
        } else {
            self.sum / self.samples.len() as f64
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_average_reports_zero() {
        let mut avg = Average::new(1000, 10);
        assert_eq!(avg.rate_at(0, 10), 0);
        assert_eq!(avg.rate_at(5_000, 10), 0);
    }

    #[test]
    fn constant_input_converges_to_rate() {
        let mut avg = Average::new(1000, 10);
        // 2000 bytes/sec for 15 seconds.
        for s in 0..15 {
            avg.add_at(s * 1000 + 500, 2000);
        }
        assert_eq!(avg.rate_at(15_000, 10), 2000);
    }

    #[test]
    fn explicit_lookback_uses_requested_span() {
        let mut avg = Average::new(1000, 10);
        for s in 0..10 {
            avg.add_at(s * 1000 + 500, 1000);
        }
        avg.add_at(10_500, 5000);
        // Last two complete seconds: 5000 + 1000.
        assert_eq!(avg.rate_at(11_000, 2), 3000);
        // Lookback clamps to the window.
        assert_eq!(avg.rate_at(11_000, 100), avg.rate_at(11_000, 10));
    }

    #[test]
    fn stale_slots_are_dropped() {
        let mut avg = Average::new(1000, 10);
        avg.add_at(500, 10_000);
        // Nothing for 30 seconds.
        assert_eq!(avg.rate_at(30_500, 10), 0);
    }

    #[test]
    fn moving_average_over_window() {
        let mut avg = MovingAverage::new(3);
        assert_eq!(avg.average(), 0.0);
        avg.update(4.0);
        assert_eq!(avg.average(), 4.0);
        avg.update(6.0);
        avg.update(8.0);
        assert_eq!(avg.average(), 6.0);
        // Oldest sample rolls off.
        avg.update(10.0);
        assert_eq!(avg.average(), 8.0);
    }

    #[test]
    fn moving_average_decays_on_zero_samples() {
        let mut avg = MovingAverage::new(3);
        avg.update(9.0);
        avg.update(0.0);
        avg.update(0.0);
        assert_eq!(avg.average(), 3.0);
        avg.update(0.0);
        assert_eq!(avg.average(), 0.0);
    }
}
