//! Directory client — a thin facade over `etcd_client`, grounded in the
//! `Etcd` wrapper pattern (connect/put/get_with_prefix/lease_grant) and
//! in `EtcdRegistry`'s lease bookkeeping for registration use.

use std::time::Duration;

use etcd_client::{
    Client, ConnectOptions, DeleteOptions, GetOptions, PutOptions, WatchOptions,
};
use tokio::sync::mpsc;

use crate::errors::DirectoryError;

/// Lease identifier returned by `grant`, as etcd defines it.
pub type LeaseId = i64;

/// One directory entry returned by [`DirectoryClient::get_prefix`].
#[derive(Debug, Clone)]
pub struct Entry {
    pub key: String,
    pub value: Vec<u8>,
}

/// A single prefix-watch event: either a key appearing/changing, or one
/// disappearing (lease expiry or explicit delete).
#[derive(Debug, Clone)]
pub enum WatchEvent {
    Put(Entry),
    Delete { key: String },
}

/// Thin wrapper over an `etcd_client::Client`, exposing only the
/// operations the discovery subsystem needs: put-with-lease, grant,
/// keepalive, delete, get_prefix, watch_prefix.
#[derive(Clone)]
pub struct DirectoryClient {
    client: Client,
}

impl DirectoryClient {
    /// Connect to the directory store. `timeout` bounds both the initial
    /// connect and subsequent RPCs.
    pub async fn connect(endpoints: &[String], timeout: Duration) -> Result<Self, DirectoryError> {
        let client = Client::connect(
            endpoints,
            Some(
                ConnectOptions::new()
                    .with_connect_timeout(timeout)
                    .with_timeout(timeout),
            ),
        )
        .await
        .map_err(DirectoryError::Connect)?;
        Ok(Self { client })
    }

    /// Request a new lease with the given TTL (seconds).
    pub async fn grant(&self, ttl_secs: i64) -> Result<LeaseId, DirectoryError> {
        let resp = self
            .client
            .clone()
            .lease_grant(ttl_secs, None)
            .await
            .map_err(DirectoryError::Grant)?;
        Ok(resp.id())
    }

    /// Send a single keepalive ping for `lease`. Callers loop this on a
    /// timer; a failure here means the stream broke and the registration
    /// agent must re-register from scratch.
    pub async fn keep_alive(&self, lease: LeaseId) -> Result<(), DirectoryError> {
        let (mut keeper, mut stream) = self
            .client
            .clone()
            .lease_keep_alive(lease)
            .await
            .map_err(DirectoryError::KeepAlive)?;
        keeper.keep_alive().await.map_err(DirectoryError::KeepAlive)?;
        stream
            .message()
            .await
            .map_err(DirectoryError::KeepAlive)?
            .ok_or(DirectoryError::WatchClosed)?;
        Ok(())
    }

    /// Put `key` = `value`, attached to `lease` (0 means no lease).
    pub async fn put(
        &self,
        key: &str,
        value: &[u8],
        lease: LeaseId,
    ) -> Result<(), DirectoryError> {
        let opts = if lease != 0 {
            Some(PutOptions::new().with_lease(lease))
        } else {
            None
        };
        self.client
            .clone()
            .put(key, value, opts)
            .await
            .map_err(DirectoryError::Put)?;
        Ok(())
    }

    pub async fn delete(&self, key: &str) -> Result<(), DirectoryError> {
        self.client
            .clone()
            .delete(key, None)
            .await
            .map_err(DirectoryError::Delete)?;
        Ok(())
    }

    pub async fn delete_prefix(&self, prefix: &str) -> Result<(), DirectoryError> {
        self.client
            .clone()
            .delete(prefix, Some(DeleteOptions::new().with_prefix()))
            .await
            .map_err(DirectoryError::Delete)?;
        Ok(())
    }

    /// Snapshot every entry under `prefix`.
    pub async fn get_prefix(&self, prefix: &str) -> Result<Vec<Entry>, DirectoryError> {
        let resp = self
            .client
            .clone()
            .get(prefix, Some(GetOptions::new().with_prefix()))
            .await
            .map_err(DirectoryError::GetPrefix)?;
        Ok(resp
            .kvs()
            .iter()
            .map(|kv| Entry {
                key: String::from_utf8_lossy(kv.key()).into_owned(),
                value: kv.value().to_vec(),
            })
            .collect())
    }

    /// Watch `prefix` for puts/deletes, forwarding decoded events on an
    /// mpsc channel. The background task exits (dropping the sender, so
    /// receivers observe channel closure) once the watch stream ends.
    pub async fn watch_prefix(
        &self,
        prefix: &str,
    ) -> Result<mpsc::Receiver<WatchEvent>, DirectoryError> {
        let (_watcher, mut stream) = self
            .client
            .clone()
            .watch(prefix, Some(WatchOptions::new().with_prefix()))
            .await
            .map_err(DirectoryError::WatchPrefix)?;

        let (tx, rx) = mpsc::channel(64);
        tokio::spawn(async move {
            loop {
                match stream.message().await {
                    Ok(Some(resp)) => {
                        for event in resp.events() {
                            let Some(kv) = event.kv() else { continue };
                            let key = String::from_utf8_lossy(kv.key()).into_owned();
                            let forwarded = match event.event_type() {
                                etcd_client::EventType::Put => WatchEvent::Put(Entry {
                                    key,
                                    value: kv.value().to_vec(),
                                }),
                                etcd_client::EventType::Delete => WatchEvent::Delete { key },
                            };
                            if tx.send(forwarded).await.is_err() {
                                return;
                            }
                        }
                    }
                    Ok(None) => return,
                    Err(e) => {
                        tracing::warn!(error = %e, "directory watch stream error, closing");
                        return;
                    }
                }
            }
        });
        Ok(rx)
    }
}
