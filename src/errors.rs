//! Error types for the discovery and routing subsystem.
//!
//! Split the way the rest of the corpus splits errors: one enum per
//! concern, `thiserror`-derived, with `Display` messages good enough to
//! log directly.

use thiserror::Error;

/// Malformed registration input. Fatal at startup — callers are expected
/// to let this panic rather than recover (see [`crate::registration`]).
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Register Error=Need Service Env")]
    MissingEnv,

    #[error("Register Error=Please Set Service Name")]
    MissingServiceName,

    #[error("Register Error=Addr Format Invalid: {0}, expected {{ip}}:{{port}}")]
    InvalidAddr(String),

    #[error("Register: Error=Addr Not Exportable, {0}")]
    AddrNotExportable(String),
}

/// Directory/registry errors — transient network or registry failures.
///
/// These are absorbed internally wherever spec.md's propagation policy
/// says they must be (keepalive retries, watch/reconcile logging); they
/// only reach a caller when a dependency mode demands fail-fast startup.
#[derive(Error, Debug)]
pub enum DirectoryError {
    #[error("directory connect failed: {0}")]
    Connect(#[source] etcd_client::Error),

    #[error("directory put failed: {0}")]
    Put(#[source] etcd_client::Error),

    #[error("directory grant failed: {0}")]
    Grant(#[source] etcd_client::Error),

    #[error("directory keepalive failed: {0}")]
    KeepAlive(#[source] etcd_client::Error),

    #[error("directory delete failed: {0}")]
    Delete(#[source] etcd_client::Error),

    #[error("directory get_prefix failed: {0}")]
    GetPrefix(#[source] etcd_client::Error),

    #[error("directory watch_prefix failed: {0}")]
    WatchPrefix(#[source] etcd_client::Error),

    #[error("descriptor decode failed: {0}")]
    Decode(#[source] serde_json::Error),

    #[error("watch stream closed")]
    WatchClosed,
}

/// Subscription startup failure in `Must`/`Block` dependency mode — the
/// initial peer list came back empty or the directory was unreachable.
/// spec.md §4.4: "abort startup by raising a fatal error".
#[derive(Error, Debug)]
pub enum SubscriptionError {
    #[error("Subscribe: Error='{0}' Dir={1}")]
    Directory(#[source] DirectoryError, String),

    #[error("Subscribe: Error='Nodes Was Empty' Dir={0}")]
    Empty(String),
}

/// The hash ring has no members to answer `lookup`.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("ring is empty")]
pub struct RingEmptyError;
