mod average;
mod config;
mod country;
mod ledger;
mod meter;
mod peer;
mod remote;
mod smoothed;
mod stats;
mod worker;

// The tick driver fires once per second; heavy passes run on multiples.
const RECONCILE_INTERVAL_TICKS: u64 = 60;
const REMOTE_FLUSH_INTERVAL_TICKS: u64 = 10;

// Retention bounds on the remote-stats history.
const HISTORY_MAX_ENTRIES: usize = 100;
const HISTORY_MAX_AGE_MS: u64 = 10 * 60 * 1000;

// Country code used when the resolver can't place an address.
pub const UNKNOWN_CC: &str = "??";

// Code of the synthetic record aggregating traffic across all countries.
pub const ALL_COUNTRIES_CC: &str = "";

// Re-exports
pub use config::{MemorySettings, SettingsSource, StatsConfig};
pub use country::CountryStats;
pub use meter::{RateMeter, TrafficClass};
pub use peer::{CountryResolver, Peer, PeerId, PeerSource, PeerState};
pub use remote::{AggregateRemoteStats, RemoteCountryStats, RemoteSample};
pub use stats::{GlobalStats, Result, StatsError};
pub use worker::StatsJob;
