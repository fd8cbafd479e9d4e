use std::{
    collections::{HashMap, HashSet},
    net::IpAddr,
    sync::Arc,
};
use parking_lot::Mutex;
use crate::peer::{resolve_cc, CountryResolver, Peer, PeerId, PeerSource, PeerState};

// One reconciliation pass's byte deltas keyed by country code,
// (sent, recv).
pub type CountryDeltas = HashMap<String, (i64, i64)>;

// Byte baselines and country resolution for one peer, owned by the
// ledger rather than tagged onto the peer object.
#[derive(Debug, Default)]
struct PeerRecord {

    // Cumulative counters at the first observed transferring state.
    // Nonzero means the stats object carried bytes over from a previous
    // connection to the same peer; those must not be counted again.
    init: Option<(u64, u64)>,

    live: Option<LiveTag>,

    // Counters frozen at removal, in case the stats object is reused.
    fin: Option<(u64, u64)>,

}

#[derive(Debug)]
struct LiveTag {

    // Resolved once per peer and cached.
    cc: String,

    last_sent: u64,

    last_recv: u64,

}

#[derive(Debug)]
struct RemovedPeer {
    id: PeerId,
    address: IpAddr,
    lan: bool,
}

// Tracks per-peer byte deltas across reconciliation passes and resolves
// each peer to a country. Event methods are called from the peer event
// source; `reconcile` runs on the single stats worker.
pub struct PeerTrafficLedger {

    resolver: Arc<dyn CountryResolver>,

    table: Mutex<HashMap<PeerId, PeerRecord>>,

    // Peers removed since the last pass. Guarded separately so removal
    // events never contend with a reconciliation in progress.
    removed: Mutex<Vec<RemovedPeer>>,

    // Peers we are waiting to see enter the transferring state.
    awaiting_transfer: Mutex<HashSet<PeerId>>,

}

impl PeerTrafficLedger {

    pub fn new(resolver: Arc<dyn CountryResolver>) -> PeerTrafficLedger {
        PeerTrafficLedger {
            resolver,
            table: Mutex::new(HashMap::new()),
            removed: Mutex::new(Vec::new()),
            awaiting_transfer: Mutex::new(HashSet::new()),
        }
    }

    pub fn peer_added(&self, peer: &dyn Peer) {
        if peer.state() == PeerState::Transferring {
            self.save_initial(peer);
        } else {
            self.awaiting_transfer.lock().insert(peer.id());
        }
    }

    pub fn peer_state_changed(&self, peer: &dyn Peer, new_state: PeerState) {
        if new_state != PeerState::Transferring {
            return;
        }
        if self.awaiting_transfer.lock().remove(&peer.id()) {
            self.save_initial(peer);
        }
    }

    pub fn peer_removed(&self, peer: &dyn Peer) {
        self.awaiting_transfer.lock().remove(&peer.id());
        let sent = peer.bytes_sent();
        let recv = peer.bytes_received();
        if sent + recv == 0 {
            self.table.lock().remove(&peer.id());
            return;
        }
        self.table.lock().entry(peer.id()).or_default().fin = Some((sent, recv));
        self.removed.lock().push(RemovedPeer {
            id: peer.id(),
            address: peer.address(),
            lan: peer.is_lan_local(),
        });
    }

    fn save_initial(&self, peer: &dyn Peer) {
        let sent = peer.bytes_sent();
        let recv = peer.bytes_received();
        if sent + recv > 0 {
            self.table.lock().entry(peer.id()).or_default().init = Some((sent, recv));
        }
    }

    // Merge the pending-removed set with all active peers into one
    // traversal and produce this pass's per-country deltas. LAN-local
    // peers are excluded throughout.
    pub fn reconcile(&self, peers: &dyn PeerSource) -> CountryDeltas {
        let removed = std::mem::take(&mut *self.removed.lock());
        let groups = peers.peer_groups();

        let mut active_ids = HashSet::new();
        for group in &groups {
            for peer in group {
                active_ids.insert(peer.id());
            }
        }

        let mut deltas = CountryDeltas::new();
        let mut table = self.table.lock();

        for gone in removed {
            let Some(mut record) = table.remove(&gone.id) else {
                continue;
            };
            if !gone.lan {
                if let Some((sent, recv)) = record.fin {
                    self.apply(&mut deltas, &mut record, gone.address, sent, recv);
                }
            }
            // The same identity may already be active again; keep its
            // baseline so carried-over bytes aren't counted twice.
            if record.init.is_some() && active_ids.contains(&gone.id) {
                table.insert(
                    gone.id,
                    PeerRecord {
                        init: record.init,
                        live: None,
                        fin: None,
                    },
                );
            }
        }

        for group in &groups {
            for peer in group {
                if peer.is_lan_local() {
                    continue;
                }
                let sent = peer.bytes_sent();
                let recv = peer.bytes_received();
                if sent + recv == 0 {
                    continue;
                }
                let record = table.entry(peer.id()).or_default();
                self.apply(&mut deltas, record, peer.address(), sent, recv);
            }
        }

        deltas
    }

    // Roll one peer's counters forward against its live tag and fold the
    // delta into the pass map.
    fn apply(
        &self,
        deltas: &mut CountryDeltas,
        record: &mut PeerRecord,
        address: IpAddr,
        sent: u64,
        recv: u64,
    ) {
        if record.live.is_none() {
            // Seed from the init snapshot so bytes carried over a
            // reconnect aren't attributed to this pass.
            let (init_sent, init_recv) = record.init.unwrap_or((0, 0));
            record.live = Some(LiveTag {
                cc: resolve_cc(self.resolver.as_ref(), address),
                last_sent: init_sent,
                last_recv: init_recv,
            });
        }
        if let Some(tag) = record.live.as_mut() {
            let diff_sent = sent as i64 - tag.last_sent as i64;
            let diff_recv = recv as i64 - tag.last_recv as i64;
            if diff_sent + diff_recv > 0 {
                let entry = deltas.entry(tag.cc.clone()).or_insert((0, 0));
                entry.0 += diff_sent;
                entry.1 += diff_recv;
            }
            tag.last_sent = sent;
            tag.last_recv = recv;
        }
    }
}
