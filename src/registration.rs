//! Registration Agent — registers one local service descriptor under a
//! lease and keeps it alive, re-registering on any stream break.
//!
//! Grounded in the original `Register`'s synchronous-until-durable
//! contract and panic-on-malformed-input behavior, plus the teacher's
//! `keep_service_register` background-retry-loop shape
//! (`cita-cloud-cache-common-rs/src/etcd.rs`).

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tracing::{error, info, warn};

use crate::descriptor::{normalize_descriptor, ServiceDescriptor};
use crate::directory::{DirectoryClient, LeaseId};
use crate::errors::ConfigError;

struct Registered {
    descriptor: ServiceDescriptor,
    key: String,
}

/// Owns the lease(s) backing one process's registered service(s).
pub struct RegistrationAgent {
    directory: DirectoryClient,
    environment: String,
    node_expiry: Duration,
    retry_backoff: Duration,
    closing: Arc<AtomicBool>,
    registered: std::sync::Mutex<Vec<Registered>>,
}

impl RegistrationAgent {
    pub fn new(directory: DirectoryClient, environment: String, node_expiry: Duration, retry_backoff: Duration) -> Arc<Self> {
        Arc::new(Self {
            directory,
            environment,
            node_expiry,
            retry_backoff,
            closing: Arc::new(AtomicBool::new(false)),
            registered: std::sync::Mutex::new(Vec::new()),
        })
    }

    /// Register `descriptor`. Does not return until the descriptor is
    /// durably placed under a fresh lease. Panics on malformed input —
    /// mirrors the original's inline validation panics (spec.md §4.3).
    pub async fn register(self: &Arc<Self>, descriptor: ServiceDescriptor) {
        if self.environment.is_empty() {
            panic!("{}", format_registration_panic(&ConfigError::MissingEnv));
        }

        let descriptor = match normalize_descriptor(descriptor) {
            Ok(d) => d,
            Err(e) => panic!("{}", format_registration_panic(&e)),
        };

        let key = descriptor.directory_key(&self.environment);
        let lease = self
            .grant_and_put(&key, &descriptor)
            .await
            .unwrap_or_else(|e| panic!("Register: Error='{e}' Key={key}"));

        self.registered.lock().unwrap().push(Registered {
            descriptor: descriptor.clone(),
            key: key.clone(),
        });

        self.spawn_keepalive_loop(key, descriptor, lease);
    }

    async fn grant_and_put(&self, key: &str, descriptor: &ServiceDescriptor) -> Result<LeaseId, crate::errors::DirectoryError> {
        let ttl_secs = self.node_expiry.as_secs() as i64;
        let lease = self.directory.grant(ttl_secs).await?;
        let value = serde_json::to_vec(descriptor).expect("ServiceDescriptor always serializes");
        self.directory.put(key, &value, lease).await?;
        Ok(lease)
    }

    fn spawn_keepalive_loop(self: &Arc<Self>, key: String, descriptor: ServiceDescriptor, lease: LeaseId) {
        let agent = self.clone();
        tokio::spawn(async move {
            let mut lease = lease;

            loop {
                if agent.closing.load(Ordering::SeqCst) {
                    return;
                }

                if lease != 0 {
                    match agent.directory.keep_alive(lease).await {
                        Ok(()) => {
                            tokio::time::sleep(agent.node_expiry / 2).await;
                            continue;
                        }
                        Err(e) => {
                            warn!(error = %e, key = %key, "keepalive stream ended, re-registering");
                        }
                    }
                }

                if agent.closing.load(Ordering::SeqCst) {
                    return;
                }

                tokio::time::sleep(agent.retry_backoff).await;
                match agent.grant_and_put(&key, &descriptor).await {
                    Ok(new_lease) => {
                        lease = new_lease;
                        info!(key = %key, "re-registered under fresh lease");
                    }
                    Err(e) => {
                        error!(error = %e, key = %key, "registration retry failed, backing off");
                        lease = 0;
                    }
                }
            }
        });
    }

    /// Sets the closing flag, deletes every registered key (best-effort),
    /// and stops the keepalive loops. Callers must not assume peers
    /// observe the absence immediately (spec.md §4.3).
    pub async fn close(&self) {
        self.closing.store(true, Ordering::SeqCst);
        let entries = std::mem::take(&mut *self.registered.lock().unwrap());
        for entry in entries {
            if let Err(e) = self.directory.delete(&entry.key).await {
                warn!(error = %e, key = %entry.key, "best-effort deregistration failed");
            }
        }
    }
}

fn format_registration_panic(e: &ConfigError) -> String {
    format!("{e}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn malformed_descriptor_message_matches_config_error() {
        let err = ConfigError::MissingServiceName;
        assert_eq!(format_registration_panic(&err), "Register Error=Please Set Service Name");
    }

    #[test]
    fn missing_env_message_matches_config_error() {
        let err = ConfigError::MissingEnv;
        assert_eq!(format_registration_panic(&err), "Register Error=Need Service Env");
    }
}
