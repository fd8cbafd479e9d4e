use std::sync::atomic::{AtomicU64, Ordering};
use parking_lot::Mutex;
use crate::average::Average;

// Averages cover 10s, sampled at 1s granularity.
const RATE_WINDOW_SECS: usize = 10;
const RATE_GRANULARITY_MS: u64 = 1000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrafficClass {
    Data,
    Protocol,
}

// One direction of one traffic class: a cumulative total plus windowed
// averages with and without LAN traffic.
#[derive(Debug)]
struct Flow {

    total: AtomicU64,

    all: Mutex<Average>,

    no_lan: Mutex<Average>,

}

impl Flow {

    fn new() -> Flow {
        Flow {
            total: AtomicU64::new(0),
            all: Mutex::new(Average::new(RATE_GRANULARITY_MS, RATE_WINDOW_SECS)),
            no_lan: Mutex::new(Average::new(RATE_GRANULARITY_MS, RATE_WINDOW_SECS)),
        }
    }

    fn record(&self, bytes: u64, lan: bool) {
        self.total.fetch_add(bytes, Ordering::Relaxed);
        if !lan {
            self.no_lan.lock().add(bytes);
        }
        self.all.lock().add(bytes);
    }

    fn rate(&self, exclude_lan: bool, lookback: Option<u64>) -> u64 {
        let mut avg = if exclude_lan {
            self.no_lan.lock()
        } else {
            self.all.lock()
        };
        match lookback {
            Some(secs) => avg.rate_over(secs),
            None => avg.rate(),
        }
    }

    fn total(&self) -> u64 {
        self.total.load(Ordering::Relaxed)
    }
}

// Byte-event counters. Recording happens on arbitrary I/O threads,
// concurrently with each other and with the stats worker; inputs are
// trusted non-negative counts.
#[derive(Debug)]
pub struct RateMeter {

    data_sent: Flow,

    data_recv: Flow,

    protocol_sent: Flow,

    protocol_recv: Flow,

    discarded: AtomicU64,

}

impl RateMeter {

    pub fn new() -> RateMeter {
        RateMeter {
            data_sent: Flow::new(),
            data_recv: Flow::new(),
            protocol_sent: Flow::new(),
            protocol_recv: Flow::new(),
            discarded: AtomicU64::new(0),
        }
    }

    pub fn record_data_sent(&self, bytes: u64, lan: bool) {
        self.data_sent.record(bytes, lan);
    }

    pub fn record_data_received(&self, bytes: u64, lan: bool) {
        self.data_recv.record(bytes, lan);
    }

    pub fn record_protocol_sent(&self, bytes: u64, lan: bool) {
        self.protocol_sent.record(bytes, lan);
    }

    pub fn record_protocol_received(&self, bytes: u64, lan: bool) {
        self.protocol_recv.record(bytes, lan);
    }

    pub fn record_discarded(&self, bytes: u64) {
        self.discarded.fetch_add(bytes, Ordering::Relaxed);
    }

    // Bytes/sec over the default window, or an explicit lookback.
    pub fn send_rate(&self, class: TrafficClass, exclude_lan: bool, lookback: Option<u64>) -> u64 {
        match class {
            TrafficClass::Data => self.data_sent.rate(exclude_lan, lookback),
            TrafficClass::Protocol => self.protocol_sent.rate(exclude_lan, lookback),
        }
    }

    pub fn receive_rate(&self, class: TrafficClass, exclude_lan: bool, lookback: Option<u64>) -> u64 {
        match class {
            TrafficClass::Data => self.data_recv.rate(exclude_lan, lookback),
            TrafficClass::Protocol => self.protocol_recv.rate(exclude_lan, lookback),
        }
    }

    pub fn total_data_sent(&self) -> u64 {
        self.data_sent.total()
    }

    pub fn total_data_received(&self) -> u64 {
        self.data_recv.total()
    }

    pub fn total_protocol_sent(&self) -> u64 {
        self.protocol_sent.total()
    }

    pub fn total_protocol_received(&self) -> u64 {
        self.protocol_recv.total()
    }

    pub fn total_discarded(&self) -> u64 {
        self.discarded.load(Ordering::Relaxed)
    }

    // Combined data + protocol totals, used for smoothing.
    pub fn total_sent(&self) -> u64 {
        self.total_data_sent() + self.total_protocol_sent()
    }

    pub fn total_received(&self) -> u64 {
        self.total_data_received() + self.total_protocol_received()
    }
}

impl Default for RateMeter {
    fn default() -> RateMeter {
        RateMeter::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn totals_are_exact_sums() {
        let meter = RateMeter::new();
        meter.record_data_sent(100, false);
        meter.record_data_sent(50, true);
        meter.record_protocol_sent(7, false);
        meter.record_data_received(30, false);
        meter.record_protocol_received(12, true);
        meter.record_discarded(5);

        assert_eq!(meter.total_data_sent(), 150);
        assert_eq!(meter.total_protocol_sent(), 7);
        assert_eq!(meter.total_data_received(), 30);
        assert_eq!(meter.total_protocol_received(), 12);
        assert_eq!(meter.total_discarded(), 5);
        assert_eq!(meter.total_sent(), 157);
        assert_eq!(meter.total_received(), 42);
    }

    #[test]
    fn fresh_meter_reports_zero_rates() {
        let meter = RateMeter::new();
        assert_eq!(meter.send_rate(TrafficClass::Data, false, None), 0);
        assert_eq!(meter.send_rate(TrafficClass::Protocol, true, None), 0);
        assert_eq!(meter.receive_rate(TrafficClass::Data, true, Some(5)), 0);
    }

    #[test]
    fn concurrent_recording_is_lossless() {
        let meter = std::sync::Arc::new(RateMeter::new());
        let mut handles = Vec::new();
        for _ in 0..4 {
            let meter = meter.clone();
            handles.push(std::thread::spawn(move || {
                for _ in 0..1000 {
                    meter.record_data_sent(3, false);
                    meter.record_data_received(2, true);
                }
            }));
        }
        for handle in handles {
            handle.join().expect("recorder thread panicked");
        }
        assert_eq!(meter.total_data_sent(), 12_000);
        assert_eq!(meter.total_data_received(), 8_000);
    }
}
