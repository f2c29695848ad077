//! Connection Manager — reconciles a [`PeerSet`](crate::subscription::PeerSet)
//! into a pool of [`SubConn`]s, tracks each one's liveness, and regenerates
//! the [`Picker`] on the state-transition edges spec.md §4.5 names.
//!
//! The dial loop (exponential backoff 200 ms → 30 s, `tonic::transport`)
//! is grounded directly in the teacher's `PeerClientPool::connect_to_peers`
//! / `connect_with_backoff` (`grpc.rs`); SubConn bookkeeping and the
//! aggregate-state evaluator are newly modeled from spec.md §4.5/§9,
//! since the teacher has no equivalent state machine.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tonic::transport::{Channel, Endpoint};
use tracing::{info, warn};

use crate::picker::Picker;
use crate::ring::Ring;

/// Liveness state of one [`SubConn`], per spec.md's state table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnState {
    Idle,
    Connecting,
    Ready,
    TransientFailure,
    Shutdown,
}

/// Client-side handle to one peer address.
///
/// Exclusively owned by the [`ConnectionManager`] — callers only ever see
/// a [`Picker`] snapshot's read-only view of this.
#[derive(Debug, Clone)]
pub struct SubConn {
    pub address: String,
    pub state: ConnState,
    pub channel: Option<Channel>,
}

/// Summary liveness of a service's whole connection pool — spec.md §3.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AggregateState {
    Ready,
    Connecting,
    TransientFailure,
}

#[derive(Default)]
struct Counts {
    ready: i64,
    connecting: i64,
    transient_failure: i64,
}

impl Counts {
    fn apply(&mut self, from: Option<ConnState>, to: ConnState) {
        if let Some(from) = from {
            match from {
                ConnState::Ready => self.ready -= 1,
                ConnState::Connecting => self.connecting -= 1,
                ConnState::TransientFailure => self.transient_failure -= 1,
                _ => {}
            }
        }
        match to {
            ConnState::Ready => self.ready += 1,
            ConnState::Connecting => self.connecting += 1,
            ConnState::TransientFailure => self.transient_failure += 1,
            _ => {}
        }
    }

    fn aggregate(&self) -> AggregateState {
        if self.ready > 0 {
            AggregateState::Ready
        } else if self.connecting > 0 {
            AggregateState::Connecting
        } else {
            AggregateState::TransientFailure
        }
    }
}

struct Inner {
    conns: HashMap<String, SubConn>,
    counts: Counts,
    last_aggregate: Option<AggregateState>,
    picker: Option<Arc<Picker>>,
    ring_replicas: usize,
}

/// Owns every [`SubConn`] for one subscribed service, under a single
/// mutex covering membership, state accounting, and picker regeneration
/// (spec.md §5: "a single mutex covering PeerSet mutations, SubConn map
/// updates, state accounting, and picker regeneration").
#[derive(Clone)]
pub struct ConnectionManager {
    inner: Arc<Mutex<Inner>>,
}

impl ConnectionManager {
    pub fn new(ring_replicas: usize) -> Self {
        Self {
            inner: Arc::new(Mutex::new(Inner {
                conns: HashMap::new(),
                counts: Counts::default(),
                last_aggregate: None,
                picker: None,
                ring_replicas,
            })),
        }
    }

    /// Reconcile the pool against `addresses`: create SubConns for new
    /// peers (dialing in the background), mark vanished ones for removal.
    /// Regenerates the picker if any regeneration condition in spec.md
    /// §4.5 holds.
    pub fn reconcile(&self, addresses: &[String]) {
        let wanted: std::collections::HashSet<&String> = addresses.iter().collect();
        let mut to_dial = Vec::new();

        {
            let mut inner = self.inner.lock().unwrap();

            for addr in addresses {
                if !inner.conns.contains_key(addr) {
                    inner.conns.insert(
                        addr.clone(),
                        SubConn {
                            address: addr.clone(),
                            state: ConnState::Idle,
                            channel: None,
                        },
                    );
                    to_dial.push(addr.clone());
                }
            }

            let gone: Vec<String> = inner
                .conns
                .keys()
                .filter(|addr| !wanted.contains(*addr))
                .cloned()
                .collect();
            let mut ready_flip = false;
            for addr in gone {
                ready_flip |= self.remove_locked(&mut inner, &addr);
            }

            self.regenerate_if_needed(&mut inner, ready_flip);
        }

        for addr in to_dial {
            self.request_connect(addr);
        }
    }

    /// RemoveSubConn: the entry is retained until Shutdown is observed
    /// (spec.md §9 Open Question b), then erased. Returns whether this
    /// SubConn was Ready at the moment of removal (a Ready↔non-Ready flip).
    fn remove_locked(&self, inner: &mut Inner, addr: &str) -> bool {
        let ready_flip = self.transition_locked(inner, addr, ConnState::Shutdown);
        inner.conns.remove(addr);
        ready_flip
    }

    fn request_connect(&self, addr: String) {
        self.transition(&addr, ConnState::Connecting);
        let mgr = self.clone();
        tokio::spawn(async move {
            mgr.dial_with_backoff(addr).await;
        });
    }

    async fn dial_with_backoff(&self, addr: String) {
        let uri = if addr.starts_with("http://") || addr.starts_with("https://") {
            addr.clone()
        } else {
            format!("http://{}", addr)
        };
        let endpoint = match Endpoint::from_shared(uri) {
            Ok(ep) => ep,
            Err(e) => {
                warn!(peer = %addr, error = %e, "invalid peer address, abandoning dial");
                self.transition(&addr, ConnState::TransientFailure);
                return;
            }
        };

        let mut backoff = Duration::from_millis(200);
        const MAX_BACKOFF: Duration = Duration::from_secs(30);

        loop {
            // A removal between attempts must stop the dial loop.
            if !self.contains(&addr) {
                return;
            }
            match endpoint.connect().await {
                Ok(channel) => {
                    {
                        let mut inner = self.inner.lock().unwrap();
                        if let Some(sc) = inner.conns.get_mut(&addr) {
                            sc.channel = Some(channel);
                        } else {
                            return;
                        }
                    }
                    self.transition(&addr, ConnState::Ready);
                    info!(peer = %addr, "subconn ready");
                    return;
                }
                Err(e) => {
                    warn!(peer = %addr, backoff_ms = backoff.as_millis(), error = %e, "dial failed, retrying");
                    self.transition(&addr, ConnState::TransientFailure);
                }
            }
            tokio::time::sleep(backoff).await;
            backoff = (backoff * 2).min(MAX_BACKOFF);
            // Idle auto-connect: re-entering Connecting before the next attempt.
            self.transition(&addr, ConnState::Connecting);
        }
    }

    fn contains(&self, addr: &str) -> bool {
        self.inner.lock().unwrap().conns.contains_key(addr)
    }

    fn transition(&self, addr: &str, to: ConnState) {
        let mut inner = self.inner.lock().unwrap();
        let ready_flip = self.transition_locked(&mut inner, addr, to);
        self.regenerate_if_needed(&mut inner, ready_flip);
    }

    /// Applies a transition and updates the delta counters. Unknown
    /// SubConns are ignored per spec.md §4.5. Returns whether this specific
    /// SubConn just crossed the Ready↔non-Ready boundary — one of the
    /// picker-regeneration triggers in spec.md §4.5.
    fn transition_locked(&self, inner: &mut Inner, addr: &str, to: ConnState) -> bool {
        let from = match inner.conns.get(addr) {
            Some(sc) => sc.state,
            None => return false,
        };
        inner.counts.apply(Some(from), to);
        if let Some(sc) = inner.conns.get_mut(addr) {
            sc.state = to;
        }
        if to == ConnState::Idle {
            // Prevent stalled Idle: request-connect is issued by the caller
            // of `reconcile`/`transition` for freshly-created SubConns; an
            // explicit re-entry into Idle (e.g. after a future reset) must
            // also trigger a fresh dial.
            let addr = addr.to_string();
            let mgr = self.clone();
            tokio::spawn(async move { mgr.request_connect(addr) });
        }
        (from == ConnState::Ready) != (to == ConnState::Ready)
    }

    fn regenerate_if_needed(&self, inner: &mut Inner, ready_flip: bool) {
        let aggregate = inner.counts.aggregate();
        let aggregate_flip = match inner.last_aggregate {
            None => true,
            Some(prev) => {
                (prev == AggregateState::TransientFailure) != (aggregate == AggregateState::TransientFailure)
            }
        };
        let no_picker = inner.picker.is_none();

        if !aggregate_flip && !no_picker && !ready_flip {
            return;
        }

        let ready_addrs: Vec<String> = inner
            .conns
            .values()
            .filter(|sc| sc.state == ConnState::Ready)
            .map(|sc| sc.address.clone())
            .collect();

        let mut ring = Ring::new(inner.ring_replicas);
        for addr in &ready_addrs {
            ring.add(addr);
        }

        let sticky_error = matches!(aggregate, AggregateState::TransientFailure);
        inner.picker = Some(Arc::new(Picker::new(ready_addrs, ring, sticky_error)));
        inner.last_aggregate = Some(aggregate);
    }

    /// Current immutable picker snapshot, if one has been generated.
    pub fn picker(&self) -> Option<Arc<Picker>> {
        self.inner.lock().unwrap().picker.clone()
    }

    /// The dialed transport channel for `address`, if its SubConn is
    /// Ready. Callers build their RPC client stubs from this.
    pub fn channel_for(&self, address: &str) -> Option<Channel> {
        self.inner
            .lock()
            .unwrap()
            .conns
            .get(address)
            .and_then(|sc| sc.channel.clone())
    }

    /// Current aggregate liveness of the pool, if any transition has
    /// occurred yet.
    pub fn aggregate_state(&self) -> Option<AggregateState> {
        self.inner.lock().unwrap().last_aggregate
    }

    /// Block until at least one SubConn is Ready — used by dependency
    /// mode `Block` (spec.md §4.4).
    pub async fn wait_ready(&self) {
        loop {
            if matches!(self.aggregate_state(), Some(AggregateState::Ready)) {
                return;
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn aggregate_is_ready_if_any_ready() {
        let mut counts = Counts::default();
        counts.apply(None, ConnState::TransientFailure);
        counts.apply(None, ConnState::Ready);
        assert_eq!(counts.aggregate(), AggregateState::Ready);
    }

    #[test]
    fn aggregate_is_connecting_if_none_ready() {
        let mut counts = Counts::default();
        counts.apply(None, ConnState::Connecting);
        counts.apply(None, ConnState::TransientFailure);
        assert_eq!(counts.aggregate(), AggregateState::Connecting);
    }

    #[test]
    fn aggregate_is_transient_failure_if_all_failing() {
        let mut counts = Counts::default();
        counts.apply(None, ConnState::TransientFailure);
        assert_eq!(counts.aggregate(), AggregateState::TransientFailure);
    }

    #[test]
    fn idle_and_shutdown_do_not_count() {
        let mut counts = Counts::default();
        counts.apply(None, ConnState::Idle);
        counts.apply(None, ConnState::Shutdown);
        assert_eq!(counts.aggregate(), AggregateState::TransientFailure);
    }

    #[tokio::test]
    async fn reconcile_creates_idle_then_dialing_subconns() {
        let mgr = ConnectionManager::new(20);
        mgr.reconcile(&["10.0.0.1:1".to_string()]);
        // No picker yet since no Ready/aggregate-flip condition has fired
        // besides the initial "no picker exists" edge.
        assert!(mgr.picker().is_some());
    }

    #[test]
    fn unknown_subconn_transition_is_ignored() {
        let mgr = ConnectionManager::new(20);
        // Transitioning an address never reconciled must not panic or
        // create an entry.
        mgr.transition("ghost:1", ConnState::Ready);
        assert!(mgr.inner.lock().unwrap().conns.is_empty());
    }

    /// A SubConn becoming Ready must regenerate the picker even when the
    /// aggregate state was already non-TransientFailure (e.g. a sibling is
    /// already Connecting) — spec.md §4.5's "SubConn transitioned
    /// Ready↔non-Ready" regeneration edge, independent of the aggregate
    /// flip edge.
    #[tokio::test]
    async fn ready_flip_regenerates_picker_without_aggregate_flip() {
        let mgr = ConnectionManager::new(20);
        // reconcile() creates both SubConns Idle and immediately requests
        // connect, which synchronously transitions each to Connecting
        // before spawning its (never-polled, single-threaded-runtime) dial
        // task — so both are already Connecting with no further await.
        mgr.reconcile(&["10.0.0.1:1".to_string(), "10.0.0.2:1".to_string()]);
        // Aggregate is already Connecting (non-TransientFailure) from both
        // peers dialing; this Ready transition must not rely on an
        // aggregate flip to regenerate the picker.
        mgr.transition("10.0.0.1:1", ConnState::Ready);

        let picker = mgr.picker().expect("picker must exist");
        assert_eq!(picker.ready_count(), 1);
    }
}
