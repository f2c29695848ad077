//! Subscription Agent — maintains a live [`PeerSet`] for one (env, name)
//! pair via an initial list, a watch consumer, and a reconciliation
//! ticker. Grounded in spec.md §4.4; the reconciliation-ticker shape
//! mirrors the teacher's `keep_alive_interval` background-task pattern
//! (`cita-cloud-cache-common-rs/src/etcd.rs`).

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tracing::{error, warn};

use crate::connection::ConnectionManager;
use crate::descriptor::ServiceDescriptor;
use crate::directory::{DirectoryClient, WatchEvent};
use crate::errors::SubscriptionError;

/// How strict startup is about an initially-empty peer set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DependencyMode {
    /// Subscribe may start with an empty set.
    Normal,
    /// Initial subscription must populate at least one peer.
    Must,
    /// Like `Must`, and additionally block dial until a SubConn is Ready.
    Block,
}

/// Address → descriptor currently believed live.
#[derive(Default)]
pub struct PeerSet {
    peers: Mutex<HashMap<String, ServiceDescriptor>>,
}

impl PeerSet {
    fn addresses(&self) -> Vec<String> {
        self.peers.lock().unwrap().keys().cloned().collect()
    }

    fn insert(&self, descriptor: ServiceDescriptor) {
        self.peers
            .lock()
            .unwrap()
            .insert(descriptor.address.clone(), descriptor);
    }

    fn remove_by_key(&self, key: &str) {
        // Directory keys are `/discovery/{env}/{name}/{address}`; the
        // address is always the final path segment.
        if let Some(address) = key.rsplit('/').next() {
            self.peers.lock().unwrap().remove(address);
        }
    }

    fn replace_all(&self, descriptors: Vec<ServiceDescriptor>) {
        let mut peers = self.peers.lock().unwrap();
        peers.clear();
        for d in descriptors {
            peers.insert(d.address.clone(), d);
        }
    }

    pub fn len(&self) -> usize {
        self.peers.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Drives one service's [`PeerSet`] and its [`ConnectionManager`].
pub struct SubscriptionAgent {
    directory: DirectoryClient,
    prefix: String,
    peer_set: Arc<PeerSet>,
    connections: ConnectionManager,
    reconcile_interval: Duration,
}

impl SubscriptionAgent {
    /// Start subscribing to `/discovery/{env}/{service}/`. On `Must` or
    /// `Block` mode, an initially-empty list aborts startup with
    /// [`SubscriptionError::Empty`].
    pub async fn start(
        directory: DirectoryClient,
        env: &str,
        service: &str,
        mode: DependencyMode,
        ring_replicas: usize,
        reconcile_interval: Duration,
    ) -> Result<Arc<Self>, SubscriptionError> {
        let prefix = format!("/discovery/{}/{}/", env, service);
        let peer_set = Arc::new(PeerSet::default());
        let connections = ConnectionManager::new(ring_replicas);

        let initial = directory
            .get_prefix(&prefix)
            .await
            .map_err(|e| SubscriptionError::Directory(e, prefix.clone()))?;

        let descriptors: Vec<ServiceDescriptor> = initial
            .iter()
            .filter_map(|entry| serde_json::from_slice(&entry.value).ok())
            .collect();

        if descriptors.is_empty() && matches!(mode, DependencyMode::Must | DependencyMode::Block) {
            return Err(SubscriptionError::Empty(prefix));
        }

        peer_set.replace_all(descriptors);
        connections.reconcile(&peer_set.addresses());

        let agent = Arc::new(Self {
            directory,
            prefix,
            peer_set,
            connections,
            reconcile_interval,
        });

        agent.clone().spawn_watch();
        agent.clone().spawn_reconciler();

        if matches!(mode, DependencyMode::Block) {
            agent.connections.wait_ready().await;
        }

        Ok(agent)
    }

    pub fn peer_set(&self) -> &Arc<PeerSet> {
        &self.peer_set
    }

    pub fn connections(&self) -> &ConnectionManager {
        &self.connections
    }

    fn spawn_watch(self: Arc<Self>) {
        tokio::spawn(async move {
            let mut rx = match self.directory.watch_prefix(&self.prefix).await {
                Ok(rx) => rx,
                Err(e) => {
                    error!(error = %e, prefix = %self.prefix, "failed to start watch, relying on reconciliation");
                    return;
                }
            };

            while let Some(event) = rx.recv().await {
                match event {
                    WatchEvent::Put(entry) => {
                        match serde_json::from_slice::<ServiceDescriptor>(&entry.value) {
                            Ok(descriptor) => self.peer_set.insert(descriptor),
                            Err(e) => {
                                warn!(error = %e, key = %entry.key, "undecodable descriptor, skipping");
                                continue;
                            }
                        }
                    }
                    WatchEvent::Delete { key } => self.peer_set.remove_by_key(&key),
                }
                self.connections.reconcile(&self.peer_set.addresses());
            }
        });
    }

    fn spawn_reconciler(self: Arc<Self>) {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(self.reconcile_interval);
            ticker.tick().await; // first tick fires immediately; skip it.
            loop {
                ticker.tick().await;
                match self.directory.get_prefix(&self.prefix).await {
                    Ok(entries) => {
                        let descriptors: Vec<ServiceDescriptor> = entries
                            .iter()
                            .filter_map(|entry| serde_json::from_slice(&entry.value).ok())
                            .collect();
                        self.peer_set.replace_all(descriptors);
                        self.connections.reconcile(&self.peer_set.addresses());
                    }
                    Err(e) => {
                        warn!(error = %e, prefix = %self.prefix, "reconciliation get_prefix failed, retrying next tick");
                    }
                }
            }
        });
    }
}
