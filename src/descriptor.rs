//! Service descriptors — the record stored under a directory key.
//!
//! Grounded in the original `Service` struct (`discovery.go`) and its
//! inline address validation in `Register`.

use serde::{Deserialize, Serialize};

use crate::errors::ConfigError;

/// An immutable service identity: name, owning host, dial address, and
/// the environment it was registered under.
///
/// Serialized as a compact JSON record when stored in the directory —
/// the same shape the original `Service` struct marshals to.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ServiceDescriptor {
    pub name: String,
    #[serde(default)]
    pub host: String,
    pub address: String,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub environment: Option<String>,
}

impl ServiceDescriptor {
    /// Construct a descriptor with an empty host — [`normalize`] fills it
    /// in from `HOSTNAME` if still empty at registration time.
    pub fn new(name: impl Into<String>, address: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            host: String::new(),
            address: address.into(),
            environment: None,
        }
    }

    pub fn with_host(mut self, host: impl Into<String>) -> Self {
        self.host = host.into();
        self
    }

    /// The directory key this descriptor is stored under once `env` is
    /// known: `/discovery/{env}/{name}/{address}`.
    pub fn directory_key(&self, env: &str) -> String {
        format!("/discovery/{}/{}/{}", env, self.name, self.address)
    }
}

/// Validate and normalize a descriptor's address per spec.md §3:
///
/// - `name` must be non-empty.
/// - `host` defaults to the `HOSTNAME` environment variable.
/// - `address` must be `{ip}:{port}` with a numeric port.
/// - `localhost` / `127.0.0.1` / `0.0.0.0` are rewritten to the host's
///   intranet address; if none can be found, registration is rejected.
///
/// Mirrors the original's inline checks in `Register`, which `panic` on
/// each failure — callers here get a `ConfigError` and decide whether to
/// panic (the registration agent does, matching the original).
pub fn normalize_descriptor(mut d: ServiceDescriptor) -> Result<ServiceDescriptor, ConfigError> {
    if d.name.is_empty() {
        return Err(ConfigError::MissingServiceName);
    }
    if d.host.is_empty() {
        d.host = std::env::var("HOSTNAME").unwrap_or_default();
    }

    let mut parts = d.address.splitn(2, ':');
    let ip = parts.next().unwrap_or("");
    let port = parts.next().ok_or_else(|| ConfigError::InvalidAddr(d.address.clone()))?;
    if port.is_empty() || !port.chars().all(|c| c.is_ascii_digit()) {
        return Err(ConfigError::InvalidAddr(d.address.clone()));
    }

    let mut ip = ip.to_string();
    if ip.is_empty() || ip == "localhost" || ip == "127.0.0.1" || ip == "0.0.0.0" {
        ip = crate::net_util::intranet_ip().unwrap_or_default();
    }
    if ip.is_empty() {
        ip = d.host.clone();
    }
    if ip.is_empty() {
        return Err(ConfigError::AddrNotExportable(d.address.clone()));
    }

    d.address = format!("{}:{}", ip, port);
    Ok(d)
}
