//! Listener setup and accept loops.
//!
//! # Responsibilities
//! - Bind one TCP listener per configured port
//! - Enforce max_connections across all listeners via a shared semaphore
//! - Spawn a task per accepted connection
//! - Run the periodic expired-session sweep
//!
//! # Design Decisions
//! - Hosts sharing a port share one listener; the Host header picks
//!   between them after parsing
//! - Port 0 is honored so tests can bind ephemeral ports and read the
//!   real address back with `local_addrs`

use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::net::TcpListener;
use tokio::sync::Semaphore;

use crate::config::{AppConfig, VirtualHost};
use crate::net::connection::{self, Shared};
use crate::session::SessionManager;

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: String,
        source: std::io::Error,
    },
}

/// A bound server, ready to run.
pub struct Server {
    listeners: Vec<(TcpListener, Arc<Vec<Arc<VirtualHost>>>)>,
    shared: Arc<Shared>,
    connection_limit: Arc<Semaphore>,
    sweep_interval: Duration,
}

impl Server {
    /// Bind a listener for every port named in the configuration.
    pub async fn bind(config: AppConfig) -> Result<Self, ServerError> {
        let sessions = SessionManager::new(
            &config.session.cookie_name,
            Duration::from_secs(config.session.max_age_secs),
        );
        let sweep_interval = Duration::from_secs(config.session.sweep_secs);
        let connection_limit = Arc::new(Semaphore::new(config.limits.max_connections));
        let shared = Arc::new(Shared {
            limits: config.limits,
            timeouts: config.timeouts,
            sessions,
        });

        let mut listeners = Vec::new();
        for (port, hosts) in group_by_port(&config.servers) {
            let bind_host = &hosts[0].host;
            let addr = format!("{bind_host}:{port}");
            let listener = TcpListener::bind(&addr)
                .await
                .map_err(|source| ServerError::Bind {
                    addr: addr.clone(),
                    source,
                })?;
            let local = listener.local_addr().map_err(|source| ServerError::Bind {
                addr: addr.clone(),
                source,
            })?;

            tracing::info!(
                address = %local,
                hosts = hosts.len(),
                "listener bound"
            );
            listeners.push((listener, Arc::new(hosts)));
        }

        Ok(Self {
            listeners,
            shared,
            connection_limit,
            sweep_interval,
        })
    }

    /// Addresses actually bound, in configuration order.
    pub fn local_addrs(&self) -> Vec<SocketAddr> {
        self.listeners
            .iter()
            .filter_map(|(l, _)| l.local_addr().ok())
            .collect()
    }

    /// Accept connections until the process is stopped.
    pub async fn run(self) {
        let sweeper_shared = Arc::clone(&self.shared);
        let sweep_interval = self.sweep_interval;
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(sweep_interval);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let removed = sweeper_shared.sessions.cleanup_expired();
                if removed > 0 {
                    tracing::debug!(removed, "expired sessions swept");
                }
            }
        });

        let mut accept_tasks = Vec::new();
        for (listener, hosts) in self.listeners {
            let shared = Arc::clone(&self.shared);
            let limit = Arc::clone(&self.connection_limit);
            accept_tasks.push(tokio::spawn(accept_loop(listener, hosts, shared, limit)));
        }
        for task in accept_tasks {
            let _ = task.await;
        }
    }
}

async fn accept_loop(
    listener: TcpListener,
    hosts: Arc<Vec<Arc<VirtualHost>>>,
    shared: Arc<Shared>,
    limit: Arc<Semaphore>,
) {
    loop {
        let permit = match Arc::clone(&limit).acquire_owned().await {
            Ok(permit) => permit,
            // Closed semaphore means the server is going away.
            Err(_) => return,
        };

        match listener.accept().await {
            Ok((stream, peer)) => {
                let hosts = Arc::clone(&hosts);
                let shared = Arc::clone(&shared);
                tokio::spawn(async move {
                    connection::serve(stream, peer, hosts, shared).await;
                    drop(permit);
                });
            }
            Err(e) => {
                tracing::warn!(error = %e, "accept failed");
                drop(permit);
            }
        }
    }
}

/// Group hosts by port, preserving configuration order within each group.
fn group_by_port(servers: &[VirtualHost]) -> BTreeMap<u16, Vec<Arc<VirtualHost>>> {
    let mut by_port: BTreeMap<u16, Vec<Arc<VirtualHost>>> = BTreeMap::new();
    for server in servers {
        let server = Arc::new(server.clone());
        for port in &server.ports {
            by_port.entry(*port).or_default().push(Arc::clone(&server));
        }
    }
    by_port
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::load_config_str;

    fn two_host_config() -> AppConfig {
        load_config_str(
            r#"
            [[servers]]
            name = "alpha.local"
            host = "127.0.0.1"
            ports = [0]
            default_server = true
            [[servers.routes]]
            path = "/"
            root = "/tmp"

            [[servers]]
            name = "beta.local"
            host = "127.0.0.1"
            ports = [0, 1]
            [[servers.routes]]
            path = "/"
            root = "/tmp"
            "#,
        )
        .unwrap()
    }

    #[test]
    fn hosts_sharing_a_port_share_a_group() {
        let config = two_host_config();
        let groups = group_by_port(&config.servers);
        assert_eq!(groups.len(), 2);
        assert_eq!(groups[&0].len(), 2);
        assert_eq!(groups[&0][0].name, "alpha.local");
        assert_eq!(groups[&1].len(), 1);
    }

    #[tokio::test]
    async fn binds_ephemeral_port() {
        let mut config = two_host_config();
        // Drop the fixed port so the test binds only ephemeral listeners.
        config.servers[1].ports = vec![0];
        let server = Server::bind(config).await.unwrap();
        let addrs = server.local_addrs();
        assert_eq!(addrs.len(), 1);
        assert_ne!(addrs[0].port(), 0);
    }
}
