use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use thiserror::Error;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::debug;

use crate::api::{self, ApiState, DEFAULT_PAGE_LIMIT};
use crate::collab::{CollabError, RouteTable, SessionLifecycle, SessionStatus};
use crate::store::{HubStore, StoreError};

#[derive(Debug, Error)]
pub enum HubError {
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("failed to bind api listener on {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },
    #[error("session restore failed: {0}")]
    Restore(#[from] CollabError),
    #[error("hub store not initialized")]
    NotInitialized,
    #[error("missing admin credential in backing store")]
    MissingCredential,
}

#[derive(Debug, Clone)]
pub struct HubConfig {
    pub db_path: PathBuf,
    pub bind_addr: SocketAddr,
    pub page_limit: u64,
}

impl HubConfig {
    /// Ephemeral port by default so sequential trials never collide.
    pub fn new(db_path: PathBuf) -> Self {
        Self {
            db_path,
            bind_addr: SocketAddr::from(([127, 0, 0, 1], 0)),
            page_limit: DEFAULT_PAGE_LIMIT,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StoreSummary {
    pub tenants: u64,
    pub sessions: u64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RestoreStats {
    pub checked: u64,
    pub running: u64,
}

/// The hub under test, reduced to its public contract: load the seeded
/// backing store, restore per-tenant sessions through the configured
/// collaborators, then serve the tenant-listing API.
pub struct Hub {
    config: HubConfig,
    lifecycle: Arc<dyn SessionLifecycle>,
    routes: Arc<dyn RouteTable>,
    state: Option<Arc<ApiState>>,
}

impl Hub {
    pub fn new(
        config: HubConfig,
        lifecycle: Arc<dyn SessionLifecycle>,
        routes: Arc<dyn RouteTable>,
    ) -> Self {
        Self {
            config,
            lifecycle,
            routes,
            state: None,
        }
    }

    pub fn init_store(&mut self) -> Result<StoreSummary, HubError> {
        let store = HubStore::open(&self.config.db_path)?;
        let tenants = store.tenant_count()?;
        let sessions = store.session_count()?;
        let token = store.admin_token()?.ok_or(HubError::MissingCredential)?;
        debug!(url = %store.url(), tenants, sessions, "backing store ready");
        self.state = Some(Arc::new(ApiState {
            store: Mutex::new(store),
            token,
            page_limit: self.config.page_limit,
        }));
        Ok(StoreSummary { tenants, sessions })
    }

    /// One restore task per tenant with a session, all interleaved on
    /// the current scheduler. The first collaborator failure aborts the
    /// phase.
    pub async fn restore_sessions(&self) -> Result<RestoreStats, HubError> {
        let state = self.state.as_ref().ok_or(HubError::NotInitialized)?;
        let rows = state.store().tenants_with_sessions()?;
        let mut stats = RestoreStats {
            checked: rows.len() as u64,
            running: 0,
        };
        let tasks = rows.into_iter().map(|(name, endpoint)| {
            let lifecycle = Arc::clone(&self.lifecycle);
            let routes = Arc::clone(&self.routes);
            async move {
                match lifecycle.poll(&name).await {
                    SessionStatus::Running => {
                        let spec = format!("/user/{name}/");
                        let target = format!("http://{}:{}", endpoint.ip, endpoint.port);
                        routes
                            .add_route(&spec, &target, serde_json::json!({ "tenant": name }))
                            .await?;
                        Ok::<bool, CollabError>(true)
                    }
                    SessionStatus::Stopped { .. } => Ok(false),
                }
            }
        });
        for restored in futures::future::join_all(tasks).await {
            if restored? {
                stats.running += 1;
            }
        }
        debug!(
            checked = stats.checked,
            running = stats.running,
            "session restore complete"
        );
        Ok(stats)
    }

    pub async fn serve_api(&self) -> Result<ApiHandle, HubError> {
        let state = self.state.clone().ok_or(HubError::NotInitialized)?;
        let listener = tokio::net::TcpListener::bind(self.config.bind_addr)
            .await
            .map_err(|source| HubError::Bind {
                addr: self.config.bind_addr,
                source,
            })?;
        let addr = listener.local_addr().map_err(|source| HubError::Bind {
            addr: self.config.bind_addr,
            source,
        })?;
        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
        let app = api::router(state);
        let task = tokio::spawn(async move {
            axum::serve(listener, app)
                .with_graceful_shutdown(async move {
                    let _ = shutdown_rx.await;
                })
                .await
        });
        debug!(%addr, "api listener bound");
        Ok(ApiHandle {
            addr,
            shutdown: shutdown_tx,
            task,
        })
    }
}

pub struct ApiHandle {
    addr: SocketAddr,
    shutdown: oneshot::Sender<()>,
    task: JoinHandle<std::io::Result<()>>,
}

impl ApiHandle {
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    pub fn base_url(&self) -> String {
        format!("http://{}", self.addr)
    }

    pub fn api_url(&self) -> String {
        format!("http://{}/hub/api", self.addr)
    }

    pub async fn shutdown(self) {
        let ApiHandle {
            shutdown, task, ..
        } = self;
        let _ = shutdown.send(());
        let _ = task.await;
    }
}
