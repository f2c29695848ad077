//! Service-discovery and client-side load-balancing core.
//!
//! A process registers itself as a named service under a shared
//! directory, discovers peers by name, maintains live connections to the
//! current membership, and routes outbound calls using one of three
//! policies: consistent-hash, broadcast-target, or round-robin.
//!
//! Module map, leaves first: [`ring`] → [`directory`] → [`registration`]
//! / [`subscription`] → [`connection`] → [`picker`], tied together by
//! [`context`] and [`broadcast`].

pub mod broadcast;
pub mod config;
pub mod connection;
pub mod context;
pub mod descriptor;
pub mod directory;
pub mod errors;
pub mod net_util;
pub mod picker;
pub mod registration;
pub mod ring;
pub mod subscription;

use std::sync::Arc;

use crate::config::DiscoveryConfig;
use crate::connection::ConnectionManager;
use crate::context::CallContext;
use crate::descriptor::ServiceDescriptor;
use crate::directory::DirectoryClient;
use crate::errors::SubscriptionError;
use crate::picker::{PickResult, Picker};
use crate::registration::RegistrationAgent;
use crate::subscription::{DependencyMode, SubscriptionAgent};

/// Process-wide handle wiring the Directory Client, one Registration
/// Agent, and any number of Subscription Agents — the abstract "Caller
/// API" of spec.md §6.
pub struct Discovery {
    config: DiscoveryConfig,
    directory: DirectoryClient,
    registration: Arc<RegistrationAgent>,
}

/// Read-only handle to a resolved service's connection pool plus its
/// ring-based id splitter.
pub struct ResolvedService {
    connections: ConnectionManager,
}

impl ResolvedService {
    pub fn pick(&self, ctx: &CallContext) -> PickResult {
        match self.connections.picker() {
            Some(picker) => picker.pick(ctx),
            None => PickResult::NoSubConnAvailable,
        }
    }

    pub fn picker(&self) -> Option<Arc<Picker>> {
        self.connections.picker()
    }
}

impl Discovery {
    /// Open the Directory Client. Endpoints are injected here; the core
    /// reads no environment variables itself (spec.md §6).
    pub async fn init(config: DiscoveryConfig) -> Result<Self, crate::errors::DirectoryError> {
        let directory =
            DirectoryClient::connect(&config.endpoints, config.standard_timeout).await?;
        let registration = RegistrationAgent::new(
            directory.clone(),
            config.environment.clone(),
            config.node_expiry,
            config.retry_backoff,
        );
        Ok(Self {
            config,
            directory,
            registration,
        })
    }

    /// Synchronous from the caller's perspective; may panic on malformed
    /// input (spec.md §4.3).
    pub async fn register(&self, descriptor: ServiceDescriptor) {
        self.registration.register(descriptor).await;
    }

    /// Resolve a service by name under the configured environment.
    pub async fn resolve(
        &self,
        name: &str,
        mode: DependencyMode,
    ) -> Result<ResolvedService, SubscriptionError> {
        let agent = SubscriptionAgent::start(
            self.directory.clone(),
            &self.config.environment,
            name,
            mode,
            self.config.ring_replicas,
            self.config.reconcile_interval,
        )
        .await?;
        Ok(ResolvedService {
            connections: agent.connections().clone(),
        })
    }

    /// Teardown: deregisters, closes the directory connection.
    pub async fn close(&self) {
        self.registration.close().await;
    }
}

/// Blocks until SIGINT or SIGTERM is received, then calls `discovery.close()`.
pub async fn wait_for_close(discovery: &Discovery) {
    wait_for_signal().await;
    discovery.close().await;
}

async fn wait_for_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c().await.ok();
    };

    #[cfg(unix)]
    let terminate = async {
        if let Ok(mut sig) =
            tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
        {
            sig.recv().await;
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}

/// Default broadcast iteration cap (spec.md §4.8, §9).
pub const DEFAULT_BROADCAST_CAP: u32 = 10;
